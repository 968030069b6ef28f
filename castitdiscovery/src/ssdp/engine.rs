//! Cœur du driver SSDP, sans entrée/sortie : calendrier des M-SEARCH,
//! filtrage des réponses et intégration des descriptions.

use std::collections::{BTreeMap, HashSet};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant, SystemTime};

use tracing::{debug, info, trace, warn};
use url::Url;

use super::RendererEvent;
use super::message::parse_response;
use crate::description::parse_description;
use crate::device::{DeviceSet, TransportKind};
use crate::errors::DescriptionError;

/// M-SEARCH immédiat puis toutes les `interval`, au plus `max_searches` fois.
#[derive(Debug)]
pub struct SearchSchedule {
    interval: Duration,
    max_searches: u32,
    sent: u32,
    /// `None` quand l'intervalle dépasse la portée d'`Instant`
    next_at: Option<Instant>,
}

impl SearchSchedule {
    pub fn new(interval: Duration, max_searches: u32, now: Instant) -> Self {
        Self {
            interval,
            max_searches,
            sent: 0,
            next_at: Some(now),
        }
    }

    /// Un M-SEARCH est-il dû à `now` ? Le compte comme envoyé si oui.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.sent >= self.max_searches {
            return false;
        }
        match self.next_at {
            Some(at) if now >= at => {}
            _ => return false,
        }
        self.sent += 1;
        self.next_at = now.checked_add(self.interval);
        true
    }

    pub fn next_wakeup(&self) -> Option<Instant> {
        if self.sent < self.max_searches {
            self.next_at
        } else {
            None
        }
    }

    pub fn sent(&self) -> u32 {
        self.sent
    }
}

pub struct SsdpEngine {
    search_target: String,
    schedule: SearchSchedule,
    renderers: DeviceSet,
    control_urls: BTreeMap<String, String>,
    /// Descriptions en cours de récupération
    in_flight: HashSet<String>,
    /// Descriptions déjà traitées avec succès
    described: HashSet<String>,
}

impl SsdpEngine {
    pub fn new(search_target: &str, interval: Duration, max_searches: u32, now: Instant) -> Self {
        Self {
            search_target: search_target.to_string(),
            schedule: SearchSchedule::new(interval, max_searches, now),
            renderers: DeviceSet::new(),
            control_urls: BTreeMap::new(),
            in_flight: HashSet::new(),
            described: HashSet::new(),
        }
    }

    pub fn search_target(&self) -> &str {
        &self.search_target
    }

    pub fn poll_search(&mut self, now: Instant) -> bool {
        self.schedule.poll(now)
    }

    pub fn next_wakeup(&self) -> Option<Instant> {
        self.schedule.next_wakeup()
    }

    pub fn searches_sent(&self) -> u32 {
        self.schedule.sent()
    }

    /// Traite un datagramme ; retourne la `LOCATION` à récupérer, si la
    /// réponse vise le bon type et que cette description n'est ni en cours
    /// ni déjà traitée.
    pub fn handle_datagram(&mut self, bytes: &[u8], from: SocketAddr) -> Option<String> {
        let text = String::from_utf8_lossy(bytes);
        let Some(response) = parse_response(&text) else {
            trace!("SSDP: ignoring datagram from {}", from);
            return None;
        };
        if !response.matches(&self.search_target) {
            trace!(
                "SSDP: {} answered for {:?}, not {}",
                from,
                response.target(),
                self.search_target
            );
            return None;
        }
        let Some(location) = response.location() else {
            debug!("SSDP: response from {} without LOCATION", from);
            return None;
        };

        if self.described.contains(location) || self.in_flight.contains(location) {
            return None;
        }
        debug!("SSDP: renderer at {} (from {})", location, from);
        self.in_flight.insert(location.to_string());
        Some(location.to_string())
    }

    /// Abandonne une récupération qui n'a pas pu être lancée
    pub fn cancel_fetch(&mut self, location: &str) {
        self.in_flight.remove(location);
    }

    /// Intègre le résultat d'une récupération de description.
    ///
    /// Le renderer est ajouté, sous son nom, quand la description fournit à
    /// la fois un nom et une URL de contrôle AVTransport. Un nom déjà connu
    /// est ignoré. Un échec rend la `LOCATION` à nouveau récupérable.
    pub fn handle_description(
        &mut self,
        location: &str,
        result: Result<String, DescriptionError>,
        now: SystemTime,
    ) -> Vec<RendererEvent> {
        self.in_flight.remove(location);

        let description = match result.and_then(|xml| parse_description(&xml, location)) {
            Ok(description) => description,
            Err(e) => {
                warn!("SSDP: cannot describe {}: {}", location, e);
                return Vec::new();
            }
        };
        self.described.insert(location.to_string());

        let (Some(name), Some(service)) = (description.display_name(), description.avtransport())
        else {
            debug!("SSDP: {} has no name or no AVTransport service", location);
            return Vec::new();
        };

        if !self.renderers.upsert(name, TransportKind::Dlna, now) {
            debug!("SSDP: renderer {} already known", name);
            return Vec::new();
        }

        let control_url = service.control_url.clone();
        if let Some(renderer) = self.renderers.get_mut(name) {
            renderer.address = host_ipv4(&control_url).or_else(|| host_ipv4(location));
            renderer.control_endpoint = Some(control_url.clone());
            renderer.friendly_name = description.friendly_name.clone();
            renderer.model = description.model_name.clone();
            if let Some(udn) = &description.udn {
                renderer.attributes.insert("udn".to_string(), udn.clone());
            }
            renderer
                .attributes
                .insert("location".to_string(), location.to_string());
        }
        info!("📺 DLNA renderer found: {} -> {}", name, control_url);
        self.control_urls.insert(name.to_string(), control_url);

        vec![
            RendererEvent::RenderersUpdated(self.renderers.names()),
            RendererEvent::RendererUrlsUpdated(self.control_urls.clone()),
        ]
    }

    pub fn renderers(&self) -> &DeviceSet {
        &self.renderers
    }

    /// Nom du renderer -> URL de contrôle AVTransport
    pub fn control_urls(&self) -> &BTreeMap<String, String> {
        &self.control_urls
    }
}

fn host_ipv4(url: &str) -> Option<Ipv4Addr> {
    Url::parse(url).ok()?.host_str()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssdp::message::MEDIA_RENDERER_TARGET;

    const LOCATION: &str = "http://192.168.1.50:8080/desc.xml";

    fn response(location: &str) -> Vec<u8> {
        format!(
            "HTTP/1.1 200 OK\r\n\
             CACHE-CONTROL: max-age=1800\r\n\
             LOCATION: {}\r\n\
             ST: {}\r\n\
             USN: uuid:1234::{}\r\n\r\n",
            location, MEDIA_RENDERER_TARGET, MEDIA_RENDERER_TARGET
        )
        .into_bytes()
    }

    fn description(name: &str) -> String {
        format!(
            "<root><device><friendlyName>{}</friendlyName><modelName>M</modelName>\
             <serviceList><service>\
             <serviceType>urn:schemas-upnp-org:service:AVTransport:1</serviceType>\
             <controlURL>/ctl</controlURL>\
             </service></serviceList></device></root>",
            name
        )
    }

    fn engine(now: Instant) -> SsdpEngine {
        SsdpEngine::new(MEDIA_RENDERER_TARGET, Duration::from_secs(5), 8, now)
    }

    fn from() -> SocketAddr {
        "192.168.1.50:1900".parse().unwrap()
    }

    #[test]
    fn test_schedule_is_bounded() {
        let t0 = Instant::now();
        let mut schedule = SearchSchedule::new(Duration::from_secs(5), 8, t0);
        let mut now = t0;
        let mut sent = 0;
        while now < t0 + Duration::from_secs(600) {
            if schedule.poll(now) {
                sent += 1;
            }
            now += Duration::from_millis(500);
        }
        assert_eq!(sent, 8);
        assert_eq!(schedule.sent(), 8);
        assert!(schedule.next_wakeup().is_none());
    }

    #[test]
    fn test_first_search_is_immediate() {
        let t0 = Instant::now();
        let mut schedule = SearchSchedule::new(Duration::from_secs(5), 2, t0);
        assert!(schedule.poll(t0));
        assert!(!schedule.poll(t0 + Duration::from_secs(1)));
        assert_eq!(schedule.next_wakeup(), Some(t0 + Duration::from_secs(5)));
        assert!(schedule.poll(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn test_huge_interval_means_no_more_searches() {
        let t0 = Instant::now();
        let mut schedule = SearchSchedule::new(Duration::MAX, 3, t0);
        assert!(schedule.poll(t0));
        assert!(schedule.next_wakeup().is_none());
        assert!(!schedule.poll(t0 + Duration::from_secs(3600)));
        assert_eq!(schedule.sent(), 1);
    }

    #[test]
    fn test_response_then_description() {
        let mut engine = engine(Instant::now());
        let location = engine.handle_datagram(&response(LOCATION), from()).unwrap();
        assert_eq!(location, LOCATION);

        let events = engine.handle_description(
            &location,
            Ok(description("LivingRoomTV")),
            SystemTime::now(),
        );
        assert_eq!(
            events[0],
            RendererEvent::RenderersUpdated(vec!["LivingRoomTV".to_string()])
        );
        let RendererEvent::RendererUrlsUpdated(urls) = &events[1] else {
            panic!("unexpected event {:?}", events[1]);
        };
        assert_eq!(urls["LivingRoomTV"], "http://192.168.1.50:8080/ctl");

        let renderer = engine.renderers().get("LivingRoomTV").unwrap();
        assert_eq!(renderer.kind, TransportKind::Dlna);
        assert_eq!(renderer.address, Some(Ipv4Addr::new(192, 168, 1, 50)));
    }

    #[test]
    fn test_same_location_fetched_once() {
        let mut engine = engine(Instant::now());
        assert!(engine.handle_datagram(&response(LOCATION), from()).is_some());
        // en cours
        assert!(engine.handle_datagram(&response(LOCATION), from()).is_none());
        engine.handle_description(LOCATION, Ok(description("TV")), SystemTime::now());
        // traitée
        assert!(engine.handle_datagram(&response(LOCATION), from()).is_none());
    }

    #[test]
    fn test_failed_fetch_can_be_retried() {
        let mut engine = engine(Instant::now());
        engine.handle_datagram(&response(LOCATION), from());
        let events = engine.handle_description(
            LOCATION,
            Err(DescriptionError::Http {
                url: LOCATION.to_string(),
                message: "connection refused".to_string(),
            }),
            SystemTime::now(),
        );
        assert!(events.is_empty());
        assert!(engine.handle_datagram(&response(LOCATION), from()).is_some());
    }

    #[test]
    fn test_duplicate_names_ignored() {
        let mut engine = engine(Instant::now());
        let other = "http://192.168.1.51:8080/desc.xml";
        engine.handle_datagram(&response(LOCATION), from());
        engine.handle_datagram(&response(other), from());
        assert_eq!(
            engine
                .handle_description(LOCATION, Ok(description("TV")), SystemTime::now())
                .len(),
            2
        );
        assert!(engine
            .handle_description(other, Ok(description("TV")), SystemTime::now())
            .is_empty());
        assert_eq!(engine.control_urls().len(), 1);
        assert_eq!(engine.control_urls()["TV"], "http://192.168.1.50:8080/ctl");
    }

    #[test]
    fn test_renderer_without_avtransport_is_skipped() {
        let mut engine = engine(Instant::now());
        engine.handle_datagram(&response(LOCATION), from());
        let xml = description("TV").replace("AVTransport", "RenderingControl");
        assert!(engine
            .handle_description(LOCATION, Ok(xml), SystemTime::now())
            .is_empty());
        assert!(engine.renderers().is_empty());
    }

    #[test]
    fn test_other_targets_ignored() {
        let mut engine = engine(Instant::now());
        let data = String::from_utf8(response(LOCATION))
            .unwrap()
            .replace("MediaRenderer", "MediaServer");
        assert!(engine.handle_datagram(data.as_bytes(), from()).is_none());
        assert!(engine.handle_datagram(b"\xff\xfe garbage", from()).is_none());
    }
}
