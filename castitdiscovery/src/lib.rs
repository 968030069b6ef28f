//! # castitdiscovery - Découverte des récepteurs de diffusion
//!
//! Deux drivers indépendants, chacun sur son propre thread :
//!
//! - [`MdnsDiscovery`] : récepteurs Cast (mDNS / DNS-SD sur 224.0.0.251:5353)
//! - [`SsdpDiscovery`] : renderers DLNA/UPnP (SSDP sur 239.255.255.250:1900,
//!   puis description XML par HTTP)
//!
//! Les drivers publient leurs résultats par événements ; chacun possède
//! exclusivement son socket, ses timers et sa table d'appareils.
//!
//! ```no_run
//! use std::sync::Arc;
//! use castitdiscovery::{KeywordClassifier, MdnsDiscovery, MdnsEvent, MdnsSettings};
//!
//! let mut mdns = MdnsDiscovery::new(MdnsSettings::default(), Arc::new(KeywordClassifier::default()));
//! let events = mdns.subscribe();
//! mdns.start()?;
//! while let Ok(event) = events.recv() {
//!     if let MdnsEvent::DevicesUpdated(names) = event {
//!         println!("{names:?}");
//!     }
//! }
//! # Ok::<(), castitdiscovery::DiscoveryError>(())
//! ```

pub mod classifier;
pub mod config_ext;
pub mod description;
pub mod device;
pub mod errors;
pub mod mdns;
mod socket;
pub mod ssdp;
mod state;

pub use classifier::{DeviceClassifier, KeywordClassifier, ServiceTypeClassifier};
pub use config_ext::DiscoveryConfigExt;
pub use description::{
    DescriptionFetcher, DeviceDescription, HttpDescriptionFetcher, ServiceEntry, parse_description,
};
pub use device::{DeviceSet, DiscoveredDevice, TransportKind};
pub use errors::{DescriptionError, DiscoveryError};
pub use mdns::{MdnsDiscovery, MdnsEngine, MdnsEvent, MdnsSettings, QueryScheduler, Stage};
pub use ssdp::{RendererEvent, SsdpDiscovery, SsdpEngine, SsdpResponse, SsdpSettings};
pub use state::DriverState;

/// User-Agent des requêtes émises (M-SEARCH, descriptions)
pub const USER_AGENT: &str = "CastIt/1.0";

/// Port de contrôle HTTP/WebSocket des récepteurs Cast
pub const CAST_CONTROL_PORT: u16 = 8008;
