//! # castitdns - Codec de messages DNS pour mDNS
//!
//! Encode les requêtes multicast DNS et décode les réponses (en-tête,
//! questions, enregistrements), compression de noms comprise.
//!
//! Le codec est pur : aucune entrée/sortie, aucun état global. Les drivers de
//! découverte s'en servent sur leur propre thread.
//!
//! ```
//! use castitdns::{decode_message, encode_query, RecordType};
//!
//! let packet = encode_query("_googlecast._tcp.local", RecordType::Ptr).unwrap();
//! let message = decode_message(&packet).unwrap();
//! assert_eq!(message.questions[0].name, "_googlecast._tcp.local");
//! ```

mod errors;
mod message;
mod name;
mod record;

use std::net::Ipv4Addr;

pub use errors::{DecodeError, EncodeError};
pub use message::{DnsMessage, Header, Question, decode_message, encode_query};
pub use name::{MAX_LABEL_LEN, read_name, write_name};
pub use record::{RecordData, RecordType, ResourceRecord};

/// Port mDNS standard
pub const MDNS_PORT: u16 = 5353;

/// Groupe multicast mDNS IPv4
pub const MDNS_IPV4_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 251);

/// Taille de l'en-tête DNS
pub const HEADER_LEN: usize = 12;

/// Classe IN
pub const CLASS_IN: u16 = 0x0001;

/// Bit de poids fort de la classe : unicast-response (questions) ou
/// cache-flush (enregistrements).
pub const CLASS_TOP_BIT: u16 = 0x8000;
