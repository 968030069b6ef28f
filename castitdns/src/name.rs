//! Noms DNS : labels préfixés par leur longueur, compression par pointeurs.

use std::collections::HashSet;

use crate::errors::{DecodeError, EncodeError};

/// Longueur maximale d'un label
pub const MAX_LABEL_LEN: usize = 63;

const POINTER_TAG: u8 = 0xC0;

/// Lit un nom (éventuellement compressé) à partir de `pos`.
///
/// Retourne le nom pointé (`a.b.c`) et la position qui suit les octets du nom
/// à son emplacement d'origine : après le zéro final, ou après le premier
/// pointeur rencontré.
///
/// Chaque offset suivi est mémorisé : revisiter un offset est une boucle.
pub fn read_name(packet: &[u8], pos: usize) -> Result<(String, usize), DecodeError> {
    let mut labels: Vec<String> = Vec::new();
    let mut visited: HashSet<usize> = HashSet::new();
    let mut cursor = pos;
    let mut resume_at: Option<usize> = None;

    loop {
        let length = *packet.get(cursor).ok_or(DecodeError::Truncated)?;
        match length & POINTER_TAG {
            0x00 if length == 0 => {
                let next = resume_at.unwrap_or(cursor + 1);
                return Ok((labels.join("."), next));
            }
            0x00 => {
                let start = cursor + 1;
                let end = start + length as usize;
                let bytes = packet.get(start..end).ok_or(DecodeError::Truncated)?;
                labels.push(String::from_utf8_lossy(bytes).into_owned());
                cursor = end;
            }
            POINTER_TAG => {
                let low = *packet.get(cursor + 1).ok_or(DecodeError::Truncated)?;
                let offset = (((length & !POINTER_TAG) as usize) << 8) | low as usize;
                resume_at.get_or_insert(cursor + 2);
                if offset >= packet.len() {
                    return Err(DecodeError::PointerOutOfRange { offset });
                }
                if !visited.insert(offset) {
                    return Err(DecodeError::PointerLoop { offset });
                }
                cursor = offset;
            }
            _ => return Err(DecodeError::LabelTooLong { length }),
        }
    }
}

/// Mesure l'étendue d'un nom à son emplacement d'origine, sans suivre les
/// pointeurs.
///
/// Sert à sauter un enregistrement dont le nom est indécodable : tant que
/// l'étendue est connue, le décodage du message peut continuer.
pub(crate) fn name_extent(packet: &[u8], pos: usize) -> Result<usize, DecodeError> {
    let mut cursor = pos;
    loop {
        let length = *packet.get(cursor).ok_or(DecodeError::Truncated)?;
        match length & POINTER_TAG {
            0x00 if length == 0 => return Ok(cursor + 1),
            0x00 => {
                cursor += 1 + length as usize;
                if cursor > packet.len() {
                    return Err(DecodeError::Truncated);
                }
            }
            POINTER_TAG => {
                if cursor + 2 > packet.len() {
                    return Err(DecodeError::Truncated);
                }
                return Ok(cursor + 2);
            }
            _ => return Err(DecodeError::LabelTooLong { length }),
        }
    }
}

/// Écrit un nom non compressé. Un point final est toléré ; le nom vide
/// désigne la racine.
pub fn write_name(buf: &mut Vec<u8>, name: &str) -> Result<(), EncodeError> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if !trimmed.is_empty() {
        for label in trimmed.split('.') {
            if label.is_empty() {
                return Err(EncodeError::EmptyLabel {
                    name: name.to_string(),
                });
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(EncodeError::LabelTooLong {
                    label: label.to_string(),
                });
            }
            buf.push(label.len() as u8);
            buf.extend_from_slice(label.as_bytes());
        }
    }
    buf.push(0);
    Ok(())
}
