//! Messages SSDP : M-SEARCH sortant, réponses et annonces entrantes.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddrV4};

use tracing::trace;

use crate::USER_AGENT;

/// Groupe multicast SSDP
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Port SSDP
pub const SSDP_PORT: u16 = 1900;

/// Type de device recherché par défaut
pub const MEDIA_RENDERER_TARGET: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";

/// Construit un M-SEARCH pour `st`, adressé à `group`
pub fn build_msearch(group: SocketAddrV4, st: &str, mx: u32) -> String {
    let mx = mx.max(1); // MX doit être >= 1
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\
         USER-AGENT: {}\r\n\
         \r\n",
        group, mx, st, USER_AGENT
    )
}

/// Nature d'un message SSDP entrant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsdpKind {
    /// `HTTP/1.1 200 OK` en réponse à un M-SEARCH
    SearchResponse,
    /// `NOTIFY` avec `NTS: ssdp:alive`
    Alive,
}

/// Réponse (ou annonce) SSDP : ligne de statut et en-têtes en majuscules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsdpResponse {
    pub kind: SsdpKind,
    pub status_line: String,
    pub headers: HashMap<String, String>,
}

impl SsdpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_uppercase())
            .map(String::as_str)
    }

    /// `ST` d'une réponse, `NT` d'une annonce
    pub fn target(&self) -> Option<&str> {
        match self.kind {
            SsdpKind::SearchResponse => self.header("ST"),
            SsdpKind::Alive => self.header("NT"),
        }
    }

    pub fn location(&self) -> Option<&str> {
        self.header("LOCATION")
    }

    /// La cible correspond-elle au type recherché ?
    pub fn matches(&self, search_target: &str) -> bool {
        self.target()
            .is_some_and(|target| target.trim().eq_ignore_ascii_case(search_target.trim()))
    }
}

/// Analyse un datagramme SSDP.
///
/// Seules les réponses `200` et les annonces `ssdp:alive` sont retenues ;
/// tout le reste (M-SEARCH d'autres control points, byebye, erreurs) donne
/// `None`.
pub fn parse_response(data: &str) -> Option<SsdpResponse> {
    let mut lines = data.lines();
    let status_line = lines.next()?.trim().to_string();
    let upper = status_line.to_ascii_uppercase();
    let headers = parse_headers(lines);

    let kind = if upper.starts_with("HTTP/") && upper.split_whitespace().nth(1) == Some("200") {
        SsdpKind::SearchResponse
    } else if upper.starts_with("NOTIFY ") {
        let nts = headers.get("NTS")?.to_ascii_lowercase();
        if nts != "ssdp:alive" {
            trace!("Ignoring NOTIFY with NTS {}", nts);
            return None;
        }
        SsdpKind::Alive
    } else {
        trace!("Ignoring SSDP message: {}", status_line);
        return None;
    };

    Some(SsdpResponse {
        kind,
        status_line,
        headers,
    })
}

/// En-têtes jusqu'à la première ligne vide, noms en majuscules ; les
/// lignes sans `:` ou sans valeur sont ignorées.
fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    lines
        .map(str::trim)
        .take_while(|line| !line.is_empty())
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            let (name, value) = (name.trim(), value.trim());
            if name.is_empty() || value.is_empty() {
                trace!("Skipping malformed header: '{}'", line);
                return None;
            }
            Some((name.to_ascii_uppercase(), value.to_string()))
        })
        .collect()
}
