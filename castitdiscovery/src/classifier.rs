//! Classification des noms mDNS en appareils de diffusion.

use crate::device::TransportKind;

/// Mots-clés par défaut (sous-chaînes, insensibles à la casse)
pub const DEFAULT_KEYWORDS: &[&str] = &["googlecast", "chromecast", "casting", "airplay", "raop"];

/// Types de services interrogés par défaut
pub const DEFAULT_SERVICE_TYPES: &[&str] = &["_googlecast._tcp.local", "_airplay._tcp.local"];

/// Décide si un nom (type de service, nom d'instance) désigne un appareil de
/// diffusion, et par quel protocole il se pilote.
pub trait DeviceClassifier: Send + Sync {
    fn classify(&self, name: &str) -> Option<TransportKind>;
}

/// Heuristique historique : sous-chaîne parmi une liste de mots-clés.
///
/// Tout ce qui correspond est piloté en Cast, AirPlay compris.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    keywords: Vec<String>,
}

impl KeywordClassifier {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_ascii_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS)
    }
}

impl DeviceClassifier for KeywordClassifier {
    fn classify(&self, name: &str) -> Option<TransportKind> {
        let lower = name.to_ascii_lowercase();
        self.keywords
            .iter()
            .any(|keyword| lower.contains(keyword.as_str()))
            .then_some(TransportKind::Cast)
    }
}

/// Correspondance exacte sur le type de service : le nom est le type
/// lui-même ou une instance `<label>.<type>`.
#[derive(Debug, Clone)]
pub struct ServiceTypeClassifier {
    service_types: Vec<String>,
}

impl ServiceTypeClassifier {
    pub fn new<I, S>(service_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            service_types: service_types
                .into_iter()
                .map(|t| normalize(t.as_ref()))
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

impl Default for ServiceTypeClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_TYPES)
    }
}

impl DeviceClassifier for ServiceTypeClassifier {
    fn classify(&self, name: &str) -> Option<TransportKind> {
        let name = normalize(name);
        self.service_types
            .iter()
            .any(|service| {
                name == *service
                    || name
                        .strip_suffix(service.as_str())
                        .is_some_and(|prefix| prefix.ends_with('.'))
            })
            .then_some(TransportKind::Cast)
    }
}

fn normalize(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}
