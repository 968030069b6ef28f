//! Cœur du driver mDNS, sans entrée/sortie.
//!
//! Le thread du driver lui passe le temps et les datagrammes reçus ; il
//! répond par des requêtes à émettre et des événements à publier.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use castitdns::{HEADER_LEN, RecordData, RecordType, ResourceRecord, decode_message};
use tracing::{debug, info, trace};

use super::scheduler::{QueryScheduler, ScheduledQuery};
use super::{MdnsEvent, MdnsSettings};
use crate::CAST_CONTROL_PORT;
use crate::classifier::DeviceClassifier;
use crate::device::{DeviceSet, DiscoveredDevice};

/// Effets d'un datagramme
#[derive(Default)]
struct Changes {
    list_changed: bool,
    resolved: Vec<String>,
}

pub struct MdnsEngine {
    classifier: Arc<dyn DeviceClassifier>,
    scheduler: QueryScheduler,
    devices: DeviceSet,
    local_addresses: Vec<Ipv4Addr>,
    /// Noms complets des instances, dans l'ordre de découverte
    instances: Vec<String>,
    /// instance (minuscules) -> appareil
    instance_owner: HashMap<String, String>,
    /// hôte (minuscules) -> appareils
    host_owner: HashMap<String, Vec<String>>,
    /// hôte (minuscules) -> dernière adresse vue
    host_addresses: HashMap<String, Ipv4Addr>,
}

impl MdnsEngine {
    pub fn new(
        settings: &MdnsSettings,
        classifier: Arc<dyn DeviceClassifier>,
        local_addresses: Vec<Ipv4Addr>,
        now: Instant,
    ) -> Self {
        Self {
            classifier,
            scheduler: QueryScheduler::new(
                settings.service_types.clone(),
                settings.query_spacing,
                settings.query_interval,
                settings.max_rounds,
                now,
            ),
            devices: DeviceSet::new(),
            local_addresses,
            instances: Vec::new(),
            instance_owner: HashMap::new(),
            host_owner: HashMap::new(),
            host_addresses: HashMap::new(),
        }
    }

    /// Prochaine requête à émettre
    pub fn poll_query(&mut self, now: Instant) -> Option<ScheduledQuery> {
        self.scheduler.poll(now, &self.instances)
    }

    pub fn next_wakeup(&self) -> Option<Instant> {
        self.scheduler.next_wakeup()
    }

    pub fn scheduler(&self) -> &QueryScheduler {
        &self.scheduler
    }

    pub fn devices(&self) -> &DeviceSet {
        &self.devices
    }

    /// Traite un datagramme reçu.
    ///
    /// Les datagrammes trop courts ou émis par la machine locale sont ignorés.
    /// Les enregistrements sont traités par type (PTR, SRV, TXT, A) pour que
    /// l'ordre des sections n'importe pas.
    pub fn handle_datagram(
        &mut self,
        bytes: &[u8],
        from: SocketAddr,
        now: SystemTime,
    ) -> Vec<MdnsEvent> {
        if bytes.len() < HEADER_LEN {
            trace!(%from, len = bytes.len(), "mDNS: datagram too short, ignored");
            return Vec::new();
        }
        if let IpAddr::V4(ip) = from.ip() {
            if self.local_addresses.contains(&ip) {
                trace!(%from, "mDNS: own datagram, ignored");
                return Vec::new();
            }
        }

        let message = match decode_message(bytes) {
            Ok(message) => message,
            Err(e) => {
                debug!(%from, "mDNS: undecodable datagram: {}", e);
                return Vec::new();
            }
        };
        for err in &message.skipped {
            debug!(%from, "mDNS: record skipped: {}", err);
        }

        let mut changes = Changes::default();
        for rtype in [RecordType::Ptr, RecordType::Srv, RecordType::Txt, RecordType::A] {
            for record in message.records().filter(|r| r.rtype == rtype) {
                self.apply_record(record, now, &mut changes);
            }
        }

        let mut events = Vec::new();
        if changes.list_changed {
            events.push(MdnsEvent::DevicesUpdated(self.devices.names()));
        }
        for name in changes.resolved {
            if let Some(device) = self.devices.get(&name) {
                events.push(MdnsEvent::DeviceResolved(device.clone()));
            }
        }
        events
    }

    fn apply_record(&mut self, record: &ResourceRecord, now: SystemTime, changes: &mut Changes) {
        match &record.data {
            RecordData::Ptr(target) => self.on_ptr(&record.name, target, now, changes),
            RecordData::Srv { port, target, .. } => {
                self.on_srv(&record.name, *port, target, now, changes)
            }
            RecordData::Txt(entries) => self.on_txt(&record.name, entries, now, changes),
            RecordData::A(address) => self.on_a(&record.name, *address, now, changes),
            RecordData::Other => {}
        }
    }

    fn on_ptr(&mut self, owner: &str, target: &str, now: SystemTime, changes: &mut Changes) {
        let Some(kind) = self
            .classifier
            .classify(owner)
            .or_else(|| self.classifier.classify(target))
        else {
            return;
        };
        let label = first_label(target);
        if label.is_empty() || label.starts_with('_') {
            return;
        }
        self.track_instance(target, label);
        if self.devices.upsert(label, kind, now) {
            info!("📺 mDNS: new {} device '{}'", kind, label);
            changes.list_changed = true;
        }
    }

    fn on_srv(
        &mut self,
        owner: &str,
        port: u16,
        host: &str,
        now: SystemTime,
        changes: &mut Changes,
    ) {
        let Some(name) = self.device_for_instance(owner, now, changes) else {
            return;
        };
        let host_key = host.to_ascii_lowercase();
        if let Some(device) = self.devices.get_mut(&name) {
            device.port = Some(port);
            device.host = Some(host.to_string());
        }

        let owners = self.host_owner.entry(host_key.clone()).or_default();
        if !owners.contains(&name) {
            owners.push(name.clone());
        }

        if let Some(address) = self.host_addresses.get(&host_key).copied() {
            self.set_address(&name, address, changes);
        } else {
            // Relancé à chaque SRV tant que l'hôte reste sans adresse
            debug!("mDNS: {} served by {}:{}, resolving host", name, host, port);
            self.scheduler
                .push_followup(ScheduledQuery::new(host, RecordType::A));
        }
    }

    fn on_txt(&mut self, owner: &str, entries: &[String], now: SystemTime, changes: &mut Changes) {
        let Some(name) = self.device_for_instance(owner, now, changes) else {
            return;
        };
        let Some(device) = self.devices.get_mut(&name) else {
            return;
        };
        for entry in entries {
            let (key, value) = entry.split_once('=').unwrap_or((entry.as_str(), ""));
            match key {
                "fn" if !value.is_empty() => device.friendly_name = Some(value.to_string()),
                "md" if !value.is_empty() => device.model = Some(value.to_string()),
                _ => {}
            }
            device.attributes.insert(key.to_string(), value.to_string());
        }
    }

    fn on_a(&mut self, host: &str, address: Ipv4Addr, now: SystemTime, changes: &mut Changes) {
        let host_key = host.to_ascii_lowercase();
        self.host_addresses.insert(host_key.clone(), address);

        let mut owners = self.host_owner.get(&host_key).cloned().unwrap_or_default();
        if owners.is_empty() {
            // Hôte nommé comme l'appareil (A reçu avant le SRV)
            if let Some(name) = self.devices.find_ignore_case(first_label(host)) {
                owners.push(name.to_string());
            }
        }
        for name in owners {
            if let Some(device) = self.devices.get_mut(&name) {
                device.last_seen = now;
            }
            self.set_address(&name, address, changes);
        }
    }

    fn set_address(&mut self, name: &str, address: Ipv4Addr, changes: &mut Changes) {
        let Some(device) = self.devices.get_mut(name) else {
            return;
        };
        if device.address == Some(address) {
            return;
        }
        device.address = Some(address);
        device.control_endpoint = Some(format!("{}:{}", address, CAST_CONTROL_PORT));
        info!("📍 mDNS: {} resolved to {}", name, address);
        if !changes.resolved.iter().any(|n| n == name) {
            changes.resolved.push(name.to_string());
        }
    }

    /// Appareil propriétaire d'un nom d'instance ; une instance classée mais
    /// encore inconnue (annonce spontanée sans PTR) crée l'appareil.
    fn device_for_instance(
        &mut self,
        instance: &str,
        now: SystemTime,
        changes: &mut Changes,
    ) -> Option<String> {
        if let Some(name) = self.instance_owner.get(&instance.to_ascii_lowercase()) {
            let name = name.clone();
            if let Some(device) = self.devices.get_mut(&name) {
                device.last_seen = now;
            }
            return Some(name);
        }
        let kind = self.classifier.classify(instance)?;
        let label = first_label(instance);
        if label.is_empty() || label.starts_with('_') {
            return None;
        }
        self.track_instance(instance, label);
        if self.devices.upsert(label, kind, now) {
            info!("📺 mDNS: new {} device '{}'", kind, label);
            changes.list_changed = true;
        }
        Some(label.to_string())
    }

    /// Enregistre une instance ; une instance nouvelle déclenche SRV et TXT.
    fn track_instance(&mut self, instance: &str, device: &str) {
        let key = instance.to_ascii_lowercase();
        if self.instance_owner.contains_key(&key) {
            return;
        }
        self.instance_owner.insert(key, device.to_string());
        self.instances.push(instance.to_string());
        self.scheduler
            .push_followup(ScheduledQuery::new(instance, RecordType::Srv));
        self.scheduler
            .push_followup(ScheduledQuery::new(instance, RecordType::Txt));
    }

    /// Appareil courant par nom
    pub fn device(&self, name: &str) -> Option<&DiscoveredDevice> {
        self.devices.get(name)
    }
}

fn first_label(name: &str) -> &str {
    name.split('.').next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::KeywordClassifier;
    use crate::device::TransportKind;
    use castitdns::DnsMessage;
    use std::time::Duration;

    fn engine() -> MdnsEngine {
        MdnsEngine::new(
            &MdnsSettings::default(),
            Arc::new(KeywordClassifier::default()),
            vec![Ipv4Addr::new(192, 168, 1, 10), Ipv4Addr::LOCALHOST],
            Instant::now(),
        )
    }

    fn peer() -> SocketAddr {
        SocketAddr::from(([192, 168, 1, 42], 5353))
    }

    fn packet(records: Vec<ResourceRecord>) -> Vec<u8> {
        let mut message = DnsMessage::response();
        message.answers = records;
        message.to_bytes().unwrap()
    }

    fn ptr(target: &str) -> ResourceRecord {
        ResourceRecord::new(
            "_googlecast._tcp.local",
            120,
            RecordData::Ptr(target.to_string()),
        )
        .unwrap()
    }

    fn srv(instance: &str, host: &str) -> ResourceRecord {
        ResourceRecord::new(
            instance,
            120,
            RecordData::Srv {
                priority: 0,
                weight: 0,
                port: 8009,
                target: host.to_string(),
            },
        )
        .unwrap()
    }

    fn a(host: &str, ip: [u8; 4]) -> ResourceRecord {
        ResourceRecord::new(host, 120, RecordData::A(Ipv4Addr::from(ip))).unwrap()
    }

    #[test]
    fn test_ptr_creates_cast_device() {
        let mut engine = engine();
        let events = engine.handle_datagram(
            &packet(vec![ptr("MyCast._googlecast._tcp.local")]),
            peer(),
            SystemTime::now(),
        );
        assert_eq!(
            events,
            vec![MdnsEvent::DevicesUpdated(vec!["MyCast".to_string()])]
        );
        assert_eq!(engine.device("MyCast").unwrap().kind, TransportKind::Cast);
    }

    #[test]
    fn test_ptr_queues_srv_then_txt() {
        let mut engine = engine();
        engine.handle_datagram(
            &packet(vec![ptr("MyCast._googlecast._tcp.local")]),
            peer(),
            SystemTime::now(),
        );
        let now = Instant::now();
        let first = engine.poll_query(now).unwrap();
        assert_eq!(first.name, "MyCast._googlecast._tcp.local");
        assert_eq!(first.qtype, RecordType::Srv);
        let second = engine.poll_query(now + Duration::from_secs(1)).unwrap();
        assert_eq!(second.qtype, RecordType::Txt);
    }

    #[test]
    fn test_service_type_targets_are_not_devices() {
        let mut engine = engine();
        let record = ResourceRecord::new(
            "_services._dns-sd._udp.local",
            120,
            RecordData::Ptr("_googlecast._tcp.local".to_string()),
        )
        .unwrap();
        let events = engine.handle_datagram(&packet(vec![record]), peer(), SystemTime::now());
        assert!(events.is_empty());
        assert!(engine.devices().is_empty());
    }

    #[test]
    fn test_unrelated_ptr_is_ignored() {
        let mut engine = engine();
        let record = ResourceRecord::new(
            "_ipp._tcp.local",
            120,
            RecordData::Ptr("Printer._ipp._tcp.local".to_string()),
        )
        .unwrap();
        assert!(
            engine
                .handle_datagram(&packet(vec![record]), peer(), SystemTime::now())
                .is_empty()
        );
    }

    #[test]
    fn test_local_and_short_datagrams_are_ignored() {
        let mut engine = engine();
        let bytes = packet(vec![ptr("MyCast._googlecast._tcp.local")]);
        let own = SocketAddr::from(([192, 168, 1, 10], 5353));
        assert!(engine.handle_datagram(&bytes, own, SystemTime::now()).is_empty());
        assert!(engine.handle_datagram(&bytes[..11], peer(), SystemTime::now()).is_empty());
        assert!(engine.devices().is_empty());
    }

    #[test]
    fn test_full_triple_resolves_address() {
        let mut engine = engine();
        let instance = "Living-Room-TV._googlecast._tcp.local";
        let events = engine.handle_datagram(
            &packet(vec![
                a("abcd.local", [192, 168, 1, 42]),
                srv(instance, "abcd.local"),
                ptr(instance),
            ]),
            peer(),
            SystemTime::now(),
        );
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            MdnsEvent::DevicesUpdated(vec!["Living-Room-TV".to_string()])
        );
        let MdnsEvent::DeviceResolved(device) = &events[1] else {
            panic!("expected DeviceResolved, got {:?}", events[1]);
        };
        assert_eq!(device.address, Some(Ipv4Addr::new(192, 168, 1, 42)));
        assert_eq!(device.port, Some(8009));
        assert_eq!(device.control_endpoint.as_deref(), Some("192.168.1.42:8008"));
    }

    #[test]
    fn test_same_triple_twice_keeps_one_device_with_latest_address() {
        let mut engine = engine();
        let instance = "MyCast._googlecast._tcp.local";
        engine.handle_datagram(
            &packet(vec![
                ptr(instance),
                a("mycast.local", [192, 168, 1, 42]),
                srv(instance, "mycast.local"),
            ]),
            peer(),
            SystemTime::now(),
        );
        let events = engine.handle_datagram(
            &packet(vec![
                ptr(instance),
                a("mycast.local", [192, 168, 1, 43]),
                srv(instance, "mycast.local"),
            ]),
            peer(),
            SystemTime::now(),
        );
        assert_eq!(engine.devices().len(), 1);
        assert_eq!(
            engine.device("MyCast").unwrap().address,
            Some(Ipv4Addr::new(192, 168, 1, 43))
        );
        // Pas de nouvelle liste, seulement la nouvelle adresse
        assert!(matches!(events.as_slice(), [MdnsEvent::DeviceResolved(_)]));

        // Même adresse une troisième fois : aucun événement
        let events = engine.handle_datagram(
            &packet(vec![ptr(instance), a("mycast.local", [192, 168, 1, 43])]),
            peer(),
            SystemTime::now(),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn test_a_before_srv_across_datagrams() {
        let mut engine = engine();
        let instance = "MyCast._googlecast._tcp.local";
        engine.handle_datagram(&packet(vec![ptr(instance)]), peer(), SystemTime::now());
        engine.handle_datagram(
            &packet(vec![a("host-1.local", [10, 0, 0, 7])]),
            peer(),
            SystemTime::now(),
        );
        let events = engine.handle_datagram(
            &packet(vec![srv(instance, "host-1.local")]),
            peer(),
            SystemTime::now(),
        );
        assert!(matches!(events.as_slice(), [MdnsEvent::DeviceResolved(_)]));
        assert_eq!(
            engine.device("MyCast").unwrap().address,
            Some(Ipv4Addr::new(10, 0, 0, 7))
        );
    }

    fn drain(engine: &mut MdnsEngine, now: &mut Instant) -> Vec<(String, RecordType)> {
        let mut queries = Vec::new();
        while let Some(q) = engine.poll_query(*now) {
            queries.push((q.name, q.qtype));
            *now += Duration::from_secs(1);
        }
        queries
    }

    #[test]
    fn test_unresolved_host_is_queried_again() {
        let mut engine = MdnsEngine::new(
            &MdnsSettings {
                max_rounds: 0,
                ..MdnsSettings::default()
            },
            Arc::new(KeywordClassifier::default()),
            Vec::new(),
            Instant::now(),
        );
        let instance = "MyCast._googlecast._tcp.local";
        let a_query = ("cc.local".to_string(), RecordType::A);
        let mut now = Instant::now();

        // Deux SRV avant l'envoi : une seule requête A en file
        engine.handle_datagram(&packet(vec![srv(instance, "cc.local")]), peer(), SystemTime::now());
        engine.handle_datagram(&packet(vec![srv(instance, "cc.local")]), peer(), SystemTime::now());
        assert_eq!(
            drain(&mut engine, &mut now),
            vec![
                (instance.to_string(), RecordType::Srv),
                (instance.to_string(), RecordType::Txt),
                a_query.clone(),
            ]
        );

        // Réponse A perdue : le SRV suivant relance la résolution
        engine.handle_datagram(&packet(vec![srv(instance, "cc.local")]), peer(), SystemTime::now());
        assert_eq!(drain(&mut engine, &mut now), vec![a_query.clone()]);

        // Une fois l'adresse connue, plus de requête A
        let events = engine.handle_datagram(
            &packet(vec![a("cc.local", [192, 168, 1, 42])]),
            peer(),
            SystemTime::now(),
        );
        assert!(matches!(events.as_slice(), [MdnsEvent::DeviceResolved(_)]));
        engine.handle_datagram(&packet(vec![srv(instance, "cc.local")]), peer(), SystemTime::now());
        assert!(drain(&mut engine, &mut now).is_empty());
    }

    #[test]
    fn test_txt_fills_attributes() {
        let mut engine = engine();
        let instance = "MyCast._googlecast._tcp.local";
        let txt = ResourceRecord::new(
            instance,
            4500,
            RecordData::Txt(vec![
                "fn=Salon".to_string(),
                "md=Chromecast Ultra".to_string(),
                "rs".to_string(),
            ]),
        )
        .unwrap();
        engine.handle_datagram(&packet(vec![ptr(instance), txt]), peer(), SystemTime::now());
        let device = engine.device("MyCast").unwrap();
        assert_eq!(device.friendly_name.as_deref(), Some("Salon"));
        assert_eq!(device.model.as_deref(), Some("Chromecast Ultra"));
        assert_eq!(device.attributes.get("rs").map(String::as_str), Some(""));
        assert_eq!(device.display_name(), "Salon");
    }
}
