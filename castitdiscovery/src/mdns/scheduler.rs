//! Ordonnancement des requêtes mDNS.
//!
//! Un tour interroge chaque type de service (PTR), puis chaque instance connue
//! (SRV puis TXT). Une requête au plus par tick, espacées de `spacing`. Un
//! nouveau tour démarre toutes les `interval`, au plus `max_rounds` fois ;
//! ensuite seules les relances provoquées par des réponses partent encore.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use castitdns::RecordType;

/// Requête à émettre
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledQuery {
    pub name: String,
    pub qtype: RecordType,
}

impl ScheduledQuery {
    pub fn new(name: &str, qtype: RecordType) -> Self {
        Self {
            name: name.to_string(),
            qtype,
        }
    }
}

/// Étape du tour en cours
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// PTR par type de service ; `next` est l'index du prochain type
    Services { next: usize },
    /// SRV puis TXT par instance, une instance à la fois
    Instances { pending: VecDeque<ScheduledQuery> },
    Done,
}

#[derive(Debug)]
pub struct QueryScheduler {
    service_types: Vec<String>,
    spacing: Duration,
    interval: Duration,
    max_rounds: u32,
    stage: Stage,
    rounds_started: u32,
    round_started_at: Instant,
    /// `None` : plus rien ne partira (espacement hors de portée d'`Instant`)
    next_due: Option<Instant>,
    followups: VecDeque<ScheduledQuery>,
}

impl QueryScheduler {
    /// Le premier tour démarre immédiatement (si `max_rounds > 0`).
    pub fn new(
        service_types: Vec<String>,
        spacing: Duration,
        interval: Duration,
        max_rounds: u32,
        now: Instant,
    ) -> Self {
        let (stage, rounds_started) = if max_rounds == 0 {
            (Stage::Done, 0)
        } else {
            (Stage::Services { next: 0 }, 1)
        };
        Self {
            service_types,
            spacing,
            interval,
            max_rounds,
            stage,
            rounds_started,
            round_started_at: now,
            next_due: Some(now),
            followups: VecDeque::new(),
        }
    }

    /// Ajoute une relance (ignorée si déjà en file)
    pub fn push_followup(&mut self, query: ScheduledQuery) {
        if !self.followups.contains(&query) {
            self.followups.push_back(query);
        }
    }

    /// Prochaine requête à émettre à `now`, s'il y en a une.
    ///
    /// `instances` est la liste des instances connues, lue au passage à
    /// l'étape [`Stage::Instances`].
    pub fn poll(&mut self, now: Instant, instances: &[String]) -> Option<ScheduledQuery> {
        match self.next_due {
            Some(due) if now >= due => {}
            _ => return None,
        }
        let query = match self.followups.pop_front() {
            Some(query) => query,
            None => self.next_round_query(now, instances)?,
        };
        self.next_due = now.checked_add(self.spacing);
        Some(query)
    }

    fn next_round_query(&mut self, now: Instant, instances: &[String]) -> Option<ScheduledQuery> {
        loop {
            match &mut self.stage {
                Stage::Services { next } => {
                    if let Some(service) = self.service_types.get(*next) {
                        *next += 1;
                        return Some(ScheduledQuery::new(service, RecordType::Ptr));
                    }
                    let pending = instances
                        .iter()
                        .flat_map(|instance| {
                            [
                                ScheduledQuery::new(instance, RecordType::Srv),
                                ScheduledQuery::new(instance, RecordType::Txt),
                            ]
                        })
                        .collect();
                    self.stage = Stage::Instances { pending };
                }
                Stage::Instances { pending } => {
                    if let Some(query) = pending.pop_front() {
                        return Some(query);
                    }
                    self.stage = Stage::Done;
                }
                Stage::Done => {
                    if self.rounds_started >= self.max_rounds {
                        return None;
                    }
                    match self.round_started_at.checked_add(self.interval) {
                        Some(due) if now >= due => {}
                        _ => return None,
                    }
                    self.rounds_started += 1;
                    self.round_started_at = now;
                    self.stage = Stage::Services { next: 0 };
                }
            }
        }
    }

    /// Instant du prochain réveil utile, `None` quand plus rien n'est prévu.
    pub fn next_wakeup(&self) -> Option<Instant> {
        if !self.followups.is_empty() || self.stage != Stage::Done {
            return self.next_due;
        }
        if self.rounds_started < self.max_rounds {
            let round_due = self.round_started_at.checked_add(self.interval)?;
            return self.next_due.map(|due| due.max(round_due));
        }
        None
    }

    pub fn stage(&self) -> &Stage {
        &self.stage
    }

    pub fn rounds_started(&self) -> u32 {
        self.rounds_started
    }

    /// Tous les tours ont été joués et aucune relance n'attend
    pub fn is_exhausted(&self) -> bool {
        self.next_wakeup().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPACING: Duration = Duration::from_millis(100);
    const INTERVAL: Duration = Duration::from_secs(10);

    fn scheduler(max_rounds: u32, now: Instant) -> QueryScheduler {
        QueryScheduler::new(
            vec!["_googlecast._tcp.local".into(), "_airplay._tcp.local".into()],
            SPACING,
            INTERVAL,
            max_rounds,
            now,
        )
    }

    #[test]
    fn test_one_query_per_spacing() {
        let t0 = Instant::now();
        let mut s = scheduler(1, t0);
        let first = s.poll(t0, &[]).unwrap();
        assert_eq!(first.name, "_googlecast._tcp.local");
        assert_eq!(first.qtype, RecordType::Ptr);
        assert!(s.poll(t0 + Duration::from_millis(50), &[]).is_none());
        let second = s.poll(t0 + SPACING, &[]).unwrap();
        assert_eq!(second.name, "_airplay._tcp.local");
    }

    #[test]
    fn test_round_walks_instances_after_services() {
        let t0 = Instant::now();
        let mut s = scheduler(1, t0);
        let instances = vec!["TV._googlecast._tcp.local".to_string()];
        let mut seen = Vec::new();
        let mut now = t0;
        while let Some(q) = s.poll(now, &instances) {
            seen.push((q.name, q.qtype));
            now += SPACING;
        }
        assert_eq!(
            seen,
            vec![
                ("_googlecast._tcp.local".to_string(), RecordType::Ptr),
                ("_airplay._tcp.local".to_string(), RecordType::Ptr),
                ("TV._googlecast._tcp.local".to_string(), RecordType::Srv),
                ("TV._googlecast._tcp.local".to_string(), RecordType::Txt),
            ]
        );
        assert_eq!(s.stage(), &Stage::Done);
    }

    #[test]
    fn test_followups_go_first() {
        let t0 = Instant::now();
        let mut s = scheduler(1, t0);
        s.push_followup(ScheduledQuery::new("tv.local", RecordType::A));
        s.push_followup(ScheduledQuery::new("tv.local", RecordType::A));
        assert_eq!(s.poll(t0, &[]).unwrap().qtype, RecordType::A);
        assert_eq!(s.poll(t0 + SPACING, &[]).unwrap().qtype, RecordType::Ptr);
        assert_eq!(s.poll(t0 + SPACING * 2, &[]).unwrap().qtype, RecordType::Ptr);
    }

    #[test]
    fn test_rounds_are_capped() {
        let t0 = Instant::now();
        let mut s = scheduler(3, t0);
        let mut ptr_queries = 0;
        let mut now = t0;
        // Une heure simulée par pas de 50 ms
        while now < t0 + Duration::from_secs(3600) {
            if let Some(q) = s.poll(now, &[]) {
                if q.qtype == RecordType::Ptr {
                    ptr_queries += 1;
                }
            }
            now += Duration::from_millis(50);
        }
        assert_eq!(ptr_queries, 3 * 2);
        assert_eq!(s.rounds_started(), 3);
        assert!(s.is_exhausted());

        // Après le plafond, les relances partent encore
        s.push_followup(ScheduledQuery::new("tv.local", RecordType::A));
        assert!(!s.is_exhausted());
        assert!(s.poll(now, &[]).is_some());
    }

    #[test]
    fn test_new_round_waits_for_interval() {
        let t0 = Instant::now();
        let mut s = scheduler(2, t0);
        s.poll(t0, &[]);
        s.poll(t0 + SPACING, &[]);
        assert!(s.poll(t0 + SPACING * 2, &[]).is_none());
        assert_eq!(s.next_wakeup(), Some(t0 + INTERVAL));
        assert!(s.poll(t0 + INTERVAL, &[]).is_some());
        assert_eq!(s.rounds_started(), 2);
    }

    #[test]
    fn test_huge_interval_stops_after_first_round() {
        let t0 = Instant::now();
        let mut s = QueryScheduler::new(
            vec!["_googlecast._tcp.local".into()],
            SPACING,
            Duration::MAX,
            5,
            t0,
        );
        assert!(s.poll(t0, &[]).is_some());
        assert!(s.poll(t0 + SPACING, &[]).is_none());
        assert!(s.next_wakeup().is_none());
        assert_eq!(s.rounds_started(), 1);
    }

    #[test]
    fn test_huge_spacing_sends_one_query() {
        let t0 = Instant::now();
        let mut s = QueryScheduler::new(
            vec!["_googlecast._tcp.local".into(), "_airplay._tcp.local".into()],
            Duration::MAX,
            INTERVAL,
            1,
            t0,
        );
        assert!(s.poll(t0, &[]).is_some());
        assert!(s.poll(t0 + Duration::from_secs(3600), &[]).is_none());
        assert!(s.next_wakeup().is_none());
    }

    #[test]
    fn test_zero_rounds_sends_nothing() {
        let t0 = Instant::now();
        let mut s = scheduler(0, t0);
        assert!(s.poll(t0, &[]).is_none());
        assert!(s.is_exhausted());
    }
}
