//! Pairs HTTP minimaux sur la boucle locale.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};

/// Requête ou réponse HTTP lue sur un flux
pub struct HttpMessage {
    pub start_line: String,
    /// Noms en minuscules
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Lit la ligne de départ, les en-têtes et `Content-Length` octets de corps
/// (ou tout jusqu'à la fermeture si `until_close`).
pub fn read_message<R: Read>(reader: &mut BufReader<R>, until_close: bool) -> HttpMessage {
    let mut start_line = String::new();
    reader.read_line(&mut start_line).unwrap();
    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap() == 0 {
            break;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }

    let mut body = Vec::new();
    if until_close {
        reader.read_to_end(&mut body).unwrap();
    } else if let Some(len) = headers.get("content-length") {
        body.resize(len.parse().unwrap(), 0);
        reader.read_exact(&mut body).unwrap();
    }
    HttpMessage {
        start_line: start_line.trim_end().to_string(),
        headers,
        body,
    }
}

/// Requête brute, lue jusqu'à la fermeture de la connexion
pub fn request(addr: SocketAddr, method: &str, path: &str) -> HttpMessage {
    let mut stream = TcpStream::connect(addr).unwrap();
    write!(
        stream,
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n"
    )
    .unwrap();
    let mut reader = BufReader::new(stream);
    read_message(&mut reader, true)
}

/// Répond `status` avec un corps XML et ferme
pub fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    write!(
        stream,
        "HTTP/1.1 {status}\r\nContent-Type: text/xml; charset=\"utf-8\"\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
    .unwrap();
    stream.flush().unwrap();
}
