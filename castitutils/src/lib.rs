//! Utilitaires partagés par les crates CastIt : topologie réseau locale et
//! bus d'événements.

pub mod events;
pub mod network;

pub use events::EventBus;
pub use network::{LocalInterface, guess_local_ip, local_ipv4_addresses, primary_ipv4, usable_interfaces};
