//! Messages DNS : en-tête, questions et sections d'enregistrements.

use crate::errors::{DecodeError, EncodeError};
use crate::name::{name_extent, read_name, write_name};
use crate::record::{RecordType, ResourceRecord, parse_rdata};
use crate::{CLASS_IN, CLASS_TOP_BIT, HEADER_LEN};

/// En-tête DNS (12 octets)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub id: u16,
    pub flags: u16,
    pub qd_count: u16,
    pub an_count: u16,
    pub ns_count: u16,
    pub ar_count: u16,
}

impl Header {
    pub const FLAG_RESPONSE: u16 = 0x8000;
    pub const FLAG_AUTHORITATIVE: u16 = 0x0400;
    pub const FLAG_TRUNCATED: u16 = 0x0200;

    pub fn is_response(&self) -> bool {
        self.flags & Self::FLAG_RESPONSE != 0
    }

    fn parse(packet: &[u8]) -> Result<Self, DecodeError> {
        let bytes = packet.get(..HEADER_LEN).ok_or(DecodeError::Truncated)?;
        let word = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);
        Ok(Self {
            id: word(0),
            flags: word(2),
            qd_count: word(4),
            an_count: word(6),
            ns_count: word(8),
            ar_count: word(10),
        })
    }

    fn write(&self, buf: &mut Vec<u8>) {
        for word in [
            self.id,
            self.flags,
            self.qd_count,
            self.an_count,
            self.ns_count,
            self.ar_count,
        ] {
            buf.extend_from_slice(&word.to_be_bytes());
        }
    }
}

/// Question DNS
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub qtype: RecordType,
    pub qclass: u16,
}

impl Question {
    pub fn new(name: &str, qtype: RecordType) -> Self {
        Self {
            name: name.to_string(),
            qtype,
            qclass: CLASS_IN,
        }
    }

    /// Bit unicast-response (QU) de mDNS
    pub fn unicast_response(&self) -> bool {
        self.qclass & CLASS_TOP_BIT != 0
    }
}

/// Message DNS décodé (ou à encoder).
///
/// Les compteurs de l'en-tête sont ceux annoncés par le paquet ; les
/// longueurs des sections sont celles effectivement décodées.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DnsMessage {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authorities: Vec<ResourceRecord>,
    pub additionals: Vec<ResourceRecord>,
    /// Erreurs des questions/enregistrements écartés
    pub skipped: Vec<DecodeError>,
    /// `false` si le décodage s'est arrêté avant la fin annoncée
    pub complete: bool,
}

impl DnsMessage {
    /// Message de réponse mDNS vide (id 0, autoritaire)
    pub fn response() -> Self {
        Self {
            header: Header {
                flags: Header::FLAG_RESPONSE | Header::FLAG_AUTHORITATIVE,
                ..Header::default()
            },
            complete: true,
            ..Self::default()
        }
    }

    /// Tous les enregistrements, sections confondues, dans l'ordre du paquet
    pub fn records(&self) -> impl Iterator<Item = &ResourceRecord> {
        self.answers
            .iter()
            .chain(self.authorities.iter())
            .chain(self.additionals.iter())
    }

    /// Nombre d'enregistrements effectivement décodés
    pub fn record_count(&self) -> usize {
        self.answers.len() + self.authorities.len() + self.additionals.len()
    }

    /// Encode le message sans compression. Les compteurs de l'en-tête sont
    /// recalculés à partir des sections.
    pub fn to_bytes(&self) -> Result<Vec<u8>, EncodeError> {
        let header = Header {
            qd_count: self.questions.len() as u16,
            an_count: self.answers.len() as u16,
            ns_count: self.authorities.len() as u16,
            ar_count: self.additionals.len() as u16,
            ..self.header
        };
        let mut buf = Vec::with_capacity(512);
        header.write(&mut buf);

        for question in &self.questions {
            write_name(&mut buf, &question.name)?;
            buf.extend_from_slice(&u16::from(question.qtype).to_be_bytes());
            buf.extend_from_slice(&question.qclass.to_be_bytes());
        }

        for record in self.records() {
            if record.rdata.len() > u16::MAX as usize {
                return Err(EncodeError::RdataTooLong {
                    len: record.rdata.len(),
                });
            }
            write_name(&mut buf, &record.name)?;
            buf.extend_from_slice(&u16::from(record.rtype).to_be_bytes());
            buf.extend_from_slice(&record.class.to_be_bytes());
            buf.extend_from_slice(&record.ttl.to_be_bytes());
            buf.extend_from_slice(&(record.rdata.len() as u16).to_be_bytes());
            buf.extend_from_slice(&record.rdata);
        }

        Ok(buf)
    }
}

/// Encode une requête mDNS à une question (id 0, classe IN, bit QU à zéro).
pub fn encode_query(name: &str, qtype: RecordType) -> Result<Vec<u8>, EncodeError> {
    let message = DnsMessage {
        questions: vec![Question::new(name, qtype)],
        ..DnsMessage::default()
    };
    message.to_bytes()
}

/// Résultat du décodage d'un élément
enum Step<T> {
    /// Décodé ; position suivante
    Parsed(T, usize),
    /// Écarté mais son étendue est connue ; position suivante
    Skipped(DecodeError, usize),
    /// Étendue inconnue : le reste du paquet est illisible
    Stop(DecodeError),
}

/// Décode un paquet DNS.
///
/// Seul un paquet plus court que l'en-tête est une erreur. Un élément
/// indécodable est écarté (et noté dans `skipped`) ; la lecture s'arrête
/// quand sa longueur est inconnue, en gardant ce qui précède.
pub fn decode_message(packet: &[u8]) -> Result<DnsMessage, DecodeError> {
    let header = Header::parse(packet)?;
    let mut message = DnsMessage {
        header,
        complete: true,
        ..DnsMessage::default()
    };
    let mut pos = HEADER_LEN;

    for _ in 0..header.qd_count {
        match read_question(packet, pos) {
            Step::Parsed(question, next) => {
                message.questions.push(question);
                pos = next;
            }
            Step::Skipped(err, next) => {
                message.skipped.push(err);
                pos = next;
            }
            Step::Stop(err) => {
                message.skipped.push(err);
                message.complete = false;
                return Ok(message);
            }
        }
    }

    let sections = [header.an_count, header.ns_count, header.ar_count];
    for (section, count) in sections.into_iter().enumerate() {
        for _ in 0..count {
            match read_record(packet, pos) {
                Step::Parsed(record, next) => {
                    let target = match section {
                        0 => &mut message.answers,
                        1 => &mut message.authorities,
                        _ => &mut message.additionals,
                    };
                    target.push(record);
                    pos = next;
                }
                Step::Skipped(err, next) => {
                    message.skipped.push(err);
                    pos = next;
                }
                Step::Stop(err) => {
                    message.skipped.push(err);
                    message.complete = false;
                    return Ok(message);
                }
            }
        }
    }

    Ok(message)
}

fn read_question(packet: &[u8], pos: usize) -> Step<Question> {
    let after_name = match name_extent(packet, pos) {
        Ok(next) => next,
        Err(err) => return Step::Stop(err),
    };
    let Some(fixed) = packet.get(after_name..after_name + 4) else {
        return Step::Stop(DecodeError::Truncated);
    };
    let next = after_name + 4;
    let name = match read_name(packet, pos) {
        Ok((name, _)) => name,
        Err(err) => return Step::Skipped(err, next),
    };
    Step::Parsed(
        Question {
            name,
            qtype: RecordType::from(u16::from_be_bytes([fixed[0], fixed[1]])),
            qclass: u16::from_be_bytes([fixed[2], fixed[3]]),
        },
        next,
    )
}

fn read_record(packet: &[u8], pos: usize) -> Step<ResourceRecord> {
    let after_name = match name_extent(packet, pos) {
        Ok(next) => next,
        Err(err) => return Step::Stop(err),
    };
    let Some(fixed) = packet.get(after_name..after_name + 10) else {
        return Step::Stop(DecodeError::Truncated);
    };
    let rtype = RecordType::from(u16::from_be_bytes([fixed[0], fixed[1]]));
    let class = u16::from_be_bytes([fixed[2], fixed[3]]);
    let ttl = u32::from_be_bytes([fixed[4], fixed[5], fixed[6], fixed[7]]);
    let rdlength = u16::from_be_bytes([fixed[8], fixed[9]]) as usize;

    let rdata_start = after_name + 10;
    let next = rdata_start + rdlength;
    let Some(rdata) = packet.get(rdata_start..next) else {
        return Step::Stop(DecodeError::Truncated);
    };

    let name = match read_name(packet, pos) {
        Ok((name, _)) => name,
        Err(err) => return Step::Skipped(err, next),
    };
    let data = match parse_rdata(packet, rdata_start, rdlength, rtype) {
        Ok(data) => data,
        Err(err) => return Step::Skipped(err, next),
    };

    Step::Parsed(
        ResourceRecord {
            name,
            rtype,
            class,
            ttl,
            rdata: rdata.to_vec(),
            data,
        },
        next,
    )
}
