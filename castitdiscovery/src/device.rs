//! Appareils découverts et table d'appareils d'un driver.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::Ipv4Addr;
use std::time::{Duration, SystemTime};

/// Protocole de contrôle d'un appareil
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Cast,
    Dlna,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Cast => f.write_str("Cast"),
            TransportKind::Dlna => f.write_str("DLNA"),
        }
    }
}

/// Appareil découvert, identifié par son nom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub name: String,
    pub kind: TransportKind,
    pub address: Option<Ipv4Addr>,
    /// `ip:8008` pour Cast, URL de contrôle AVTransport pour DLNA
    pub control_endpoint: Option<String>,
    /// Port du service (SRV)
    pub port: Option<u16>,
    /// Hôte cible du SRV
    pub host: Option<String>,
    pub friendly_name: Option<String>,
    pub model: Option<String>,
    /// Attributs TXT (`clé=valeur`)
    pub attributes: BTreeMap<String, String>,
    pub last_seen: SystemTime,
}

impl DiscoveredDevice {
    pub fn new(name: &str, kind: TransportKind, now: SystemTime) -> Self {
        Self {
            name: name.to_string(),
            kind,
            address: None,
            control_endpoint: None,
            port: None,
            host: None,
            friendly_name: None,
            model: None,
            attributes: BTreeMap::new(),
            last_seen: now,
        }
    }

    /// Nom à afficher : nom convivial s'il est connu
    pub fn display_name(&self) -> &str {
        self.friendly_name.as_deref().unwrap_or(&self.name)
    }
}

/// Table d'appareils d'un driver, unique par nom, dans l'ordre de découverte.
#[derive(Debug, Clone, Default)]
pub struct DeviceSet {
    order: Vec<String>,
    devices: HashMap<String, DiscoveredDevice>,
}

impl DeviceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Crée l'appareil s'il est inconnu, sinon met à jour sa date de
    /// dernière vue. Retourne `true` si l'appareil vient d'être créé.
    pub fn upsert(&mut self, name: &str, kind: TransportKind, now: SystemTime) -> bool {
        if let Some(device) = self.devices.get_mut(name) {
            device.last_seen = now;
            return false;
        }
        self.order.push(name.to_string());
        self.devices
            .insert(name.to_string(), DiscoveredDevice::new(name, kind, now));
        true
    }

    pub fn get(&self, name: &str) -> Option<&DiscoveredDevice> {
        self.devices.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DiscoveredDevice> {
        self.devices.get_mut(name)
    }

    /// Recherche insensible à la casse
    pub fn find_ignore_case(&self, name: &str) -> Option<&str> {
        self.order
            .iter()
            .find(|known| known.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.devices.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DiscoveredDevice> {
        self.order.iter().filter_map(|name| self.devices.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Appareils non vus depuis plus de `max_age`.
    ///
    /// Rien n'est retiré : le balayage appartient à l'appelant.
    pub fn stale(&self, max_age: Duration, now: SystemTime) -> Vec<String> {
        self.iter()
            .filter(|device| {
                now.duration_since(device.last_seen)
                    .map(|age| age > max_age)
                    .unwrap_or(false)
            })
            .map(|device| device.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upsert_is_idempotent() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1000);
        let mut set = DeviceSet::new();
        assert!(set.upsert("MyCast", TransportKind::Cast, t0));
        assert!(!set.upsert("MyCast", TransportKind::Cast, t0 + Duration::from_secs(5)));
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.get("MyCast").unwrap().last_seen,
            t0 + Duration::from_secs(5)
        );
    }

    #[test]
    fn test_stale_lists_old_entries_only() {
        let t0 = SystemTime::UNIX_EPOCH + Duration::from_secs(1000);
        let mut set = DeviceSet::new();
        set.upsert("old", TransportKind::Cast, t0);
        set.upsert("fresh", TransportKind::Dlna, t0 + Duration::from_secs(50));

        let stale = set.stale(Duration::from_secs(30), t0 + Duration::from_secs(60));
        assert_eq!(stale, vec!["old".to_string()]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_order_and_case_lookup() {
        let now = SystemTime::now();
        let mut set = DeviceSet::new();
        set.upsert("Kitchen", TransportKind::Cast, now);
        set.upsert("Bedroom", TransportKind::Cast, now);
        assert_eq!(set.names(), vec!["Kitchen", "Bedroom"]);
        assert_eq!(set.find_ignore_case("kitchen"), Some("Kitchen"));
        assert_eq!(set.find_ignore_case("garage"), None);
    }
}
