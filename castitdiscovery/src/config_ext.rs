//! Extension pour construire les réglages de découverte depuis castitconfig
//!
//! Même pattern que les autres `config_ext` : un trait implémenté pour
//! `castitconfig::Config`, chaque clé absente retombant sur le défaut.

use std::sync::Arc;
use std::time::Duration;

use castitconfig::Config;

use crate::classifier::{DEFAULT_KEYWORDS, DEFAULT_SERVICE_TYPES, KeywordClassifier};
use crate::description::HttpDescriptionFetcher;
use crate::mdns::MdnsSettings;
use crate::ssdp::{MEDIA_RENDERER_TARGET, SsdpSettings};

/// Trait d'extension pour les réglages mDNS et SSDP
///
/// ```rust,ignore
/// use castitconfig::get_config;
/// use castitdiscovery::DiscoveryConfigExt;
///
/// let config = get_config();
/// let mdns = MdnsDiscovery::new(config.mdns_settings(), config.mdns_classifier());
/// ```
pub trait DiscoveryConfigExt {
    /// Réglages du driver ; `mdns.keywords` passe par [`Self::mdns_classifier`]
    fn mdns_settings(&self) -> MdnsSettings;

    /// Classifieur par mots-clés construit depuis `mdns.keywords`
    fn mdns_classifier(&self) -> Arc<KeywordClassifier>;

    fn ssdp_settings(&self) -> SsdpSettings;

    /// Récupérateur HTTP avec le délai `ssdp.description_timeout_secs`
    fn description_fetcher(&self) -> Arc<HttpDescriptionFetcher>;
}

impl DiscoveryConfigExt for Config {
    fn mdns_settings(&self) -> MdnsSettings {
        let defaults = MdnsSettings::default();
        MdnsSettings {
            service_types: self.get_string_list(&["mdns", "service_types"], DEFAULT_SERVICE_TYPES),
            query_interval: Duration::from_secs(self.get_u64(
                &["mdns", "query_interval_secs"],
                defaults.query_interval.as_secs(),
            )),
            query_spacing: Duration::from_millis(self.get_u64(
                &["mdns", "query_spacing_ms"],
                defaults.query_spacing.as_millis() as u64,
            )),
            max_rounds: to_u32(self.get_u64(&["mdns", "max_rounds"], defaults.max_rounds as u64)),
            ..defaults
        }
    }

    fn mdns_classifier(&self) -> Arc<KeywordClassifier> {
        Arc::new(KeywordClassifier::new(
            self.get_string_list(&["mdns", "keywords"], DEFAULT_KEYWORDS),
        ))
    }

    fn ssdp_settings(&self) -> SsdpSettings {
        let defaults = SsdpSettings::default();
        SsdpSettings {
            search_target: self.get_string(&["ssdp", "search_target"], MEDIA_RENDERER_TARGET),
            search_interval: Duration::from_secs(self.get_u64(
                &["ssdp", "search_interval_secs"],
                defaults.search_interval.as_secs(),
            )),
            max_searches: to_u32(
                self.get_u64(&["ssdp", "max_searches"], defaults.max_searches as u64),
            ),
            mx: to_u32(self.get_u64(&["ssdp", "mx"], defaults.mx as u64)),
            description_timeout: Duration::from_secs(self.get_u64(
                &["ssdp", "description_timeout_secs"],
                defaults.description_timeout.as_secs(),
            )),
            ..defaults
        }
    }

    fn description_fetcher(&self) -> Arc<HttpDescriptionFetcher> {
        Arc::new(HttpDescriptionFetcher::new(self.ssdp_settings().description_timeout))
    }
}

fn to_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
