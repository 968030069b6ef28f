//! Types d'enregistrements et vue typée des rdata.

use std::fmt;
use std::net::Ipv4Addr;

use crate::errors::{DecodeError, EncodeError};
use crate::name::{name_extent, read_name, write_name};
use crate::{CLASS_IN, CLASS_TOP_BIT};

/// Type d'enregistrement (ou de question)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Ptr,
    Txt,
    Aaaa,
    Srv,
    Any,
    Other(u16),
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            12 => RecordType::Ptr,
            16 => RecordType::Txt,
            28 => RecordType::Aaaa,
            33 => RecordType::Srv,
            255 => RecordType::Any,
            other => RecordType::Other(other),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::Ptr => 12,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Srv => 33,
            RecordType::Any => 255,
            RecordType::Other(other) => other,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::Ptr => write!(f, "PTR"),
            RecordType::Txt => write!(f, "TXT"),
            RecordType::Aaaa => write!(f, "AAAA"),
            RecordType::Srv => write!(f, "SRV"),
            RecordType::Any => write!(f, "ANY"),
            RecordType::Other(value) => write!(f, "TYPE{value}"),
        }
    }
}

/// Vue typée des rdata
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    A(Ipv4Addr),
    Ptr(String),
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    Txt(Vec<String>),
    /// Type non interprété (AAAA compris) : seuls les octets bruts sont gardés
    Other,
}

/// Enregistrement de ressource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub name: String,
    pub rtype: RecordType,
    /// Classe brute, bit cache-flush compris
    pub class: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
    pub data: RecordData,
}

impl ResourceRecord {
    /// Construit un enregistrement de classe IN ; les rdata sont encodées
    /// sans compression.
    pub fn new(name: &str, ttl: u32, data: RecordData) -> Result<Self, EncodeError> {
        let (rtype, rdata) = encode_rdata(&data)?;
        Ok(Self {
            name: name.to_string(),
            rtype,
            class: CLASS_IN,
            ttl,
            rdata,
            data,
        })
    }

    /// Enregistrement brut d'un type quelconque
    pub fn raw(name: &str, rtype: RecordType, ttl: u32, rdata: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            rtype,
            class: CLASS_IN,
            ttl,
            rdata,
            data: RecordData::Other,
        }
    }

    pub fn cache_flush(&self) -> bool {
        self.class & CLASS_TOP_BIT != 0
    }

    /// Cible d'un PTR
    pub fn ptr_target(&self) -> Option<&str> {
        match &self.data {
            RecordData::Ptr(target) => Some(target),
            _ => None,
        }
    }
}

fn encode_rdata(data: &RecordData) -> Result<(RecordType, Vec<u8>), EncodeError> {
    let mut rdata = Vec::new();
    let rtype = match data {
        RecordData::A(ip) => {
            rdata.extend_from_slice(&ip.octets());
            RecordType::A
        }
        RecordData::Ptr(target) => {
            write_name(&mut rdata, target)?;
            RecordType::Ptr
        }
        RecordData::Srv {
            priority,
            weight,
            port,
            target,
        } => {
            rdata.extend_from_slice(&priority.to_be_bytes());
            rdata.extend_from_slice(&weight.to_be_bytes());
            rdata.extend_from_slice(&port.to_be_bytes());
            write_name(&mut rdata, target)?;
            RecordType::Srv
        }
        RecordData::Txt(strings) => {
            for entry in strings {
                if entry.len() > 255 {
                    return Err(EncodeError::TxtTooLong { len: entry.len() });
                }
                rdata.push(entry.len() as u8);
                rdata.extend_from_slice(entry.as_bytes());
            }
            if strings.is_empty() {
                rdata.push(0);
            }
            RecordType::Txt
        }
        RecordData::Other => RecordType::Other(0),
    };
    Ok((rtype, rdata))
}

/// Interprète les rdata d'un enregistrement situées à `start..start + len`.
///
/// Les noms contenus dans les rdata peuvent pointer n'importe où dans le
/// paquet, mais leur partie en place doit rester dans les rdata.
pub(crate) fn parse_rdata(
    packet: &[u8],
    start: usize,
    len: usize,
    rtype: RecordType,
) -> Result<RecordData, DecodeError> {
    let end = start + len;
    let invalid = || DecodeError::InvalidRdata {
        rtype: u16::from(rtype),
    };
    let rdata = packet.get(start..end).ok_or(DecodeError::Truncated)?;

    match rtype {
        RecordType::A => {
            let octets: [u8; 4] = rdata.try_into().map_err(|_| invalid())?;
            Ok(RecordData::A(Ipv4Addr::from(octets)))
        }
        RecordType::Ptr => {
            if name_extent(packet, start)? > end {
                return Err(invalid());
            }
            let (target, _) = read_name(packet, start)?;
            Ok(RecordData::Ptr(target))
        }
        RecordType::Srv => {
            if rdata.len() < 7 {
                return Err(invalid());
            }
            if name_extent(packet, start + 6)? > end {
                return Err(invalid());
            }
            let (target, _) = read_name(packet, start + 6)?;
            Ok(RecordData::Srv {
                priority: u16::from_be_bytes([rdata[0], rdata[1]]),
                weight: u16::from_be_bytes([rdata[2], rdata[3]]),
                port: u16::from_be_bytes([rdata[4], rdata[5]]),
                target,
            })
        }
        RecordType::Txt => {
            let mut strings = Vec::new();
            let mut cursor = 0;
            while cursor < rdata.len() {
                let entry_len = rdata[cursor] as usize;
                let entry = rdata
                    .get(cursor + 1..cursor + 1 + entry_len)
                    .ok_or_else(invalid)?;
                if !entry.is_empty() {
                    strings.push(String::from_utf8_lossy(entry).into_owned());
                }
                cursor += 1 + entry_len;
            }
            Ok(RecordData::Txt(strings))
        }
        _ => Ok(RecordData::Other),
    }
}
