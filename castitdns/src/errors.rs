use thiserror::Error;

/// Erreurs de décodage d'un paquet DNS.
///
/// Au niveau message, seule la troncature de l'en-tête est fatale ; les
/// autres erreurs sont collectées par enregistrement dans
/// [`DnsMessage::skipped`](crate::DnsMessage::skipped).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("packet truncated")]
    Truncated,

    #[error("compression pointer to offset {offset} is outside the packet")]
    PointerOutOfRange { offset: usize },

    #[error("compression pointer loop through offset {offset}")]
    PointerLoop { offset: usize },

    #[error("label length byte 0x{length:02x} exceeds 63")]
    LabelTooLong { length: u8 },

    #[error("malformed rdata for record type {rtype}")]
    InvalidRdata { rtype: u16 },
}

/// Erreurs d'encodage (noms invalides).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("label '{label}' is longer than 63 bytes")]
    LabelTooLong { label: String },

    #[error("empty label in name '{name}'")]
    EmptyLabel { name: String },

    #[error("rdata of {len} bytes does not fit in a record")]
    RdataTooLong { len: usize },

    #[error("TXT string of {len} bytes is longer than 255")]
    TxtTooLong { len: usize },
}
