use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControlError {
    #[error("Cannot bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error for {url}: {message}")]
    Http { url: String, message: String },
    #[error("HTTP status {status}, body: {body}")]
    Soap {
        action: String,
        status: u16,
        body: String,
    },
    #[error("HTTP status {status}, UPnP error {code}: {description}")]
    SoapFault {
        action: String,
        status: u16,
        code: String,
        description: String,
    },
    #[error("WebSocket error: {0}")]
    WebSocket(String),
    #[error("Invalid address or URL '{0}'")]
    Url(String),
    #[error("Media file not found: {0}")]
    NotFound(PathBuf),
    #[error("Operation '{0}' is not supported by this device")]
    Unsupported(&'static str),
    #[error("XML error: {0}")]
    Xml(String),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<xmltree::Error> for ControlError {
    fn from(err: xmltree::Error) -> Self {
        ControlError::Xml(err.to_string())
    }
}

impl From<tungstenite::Error> for ControlError {
    fn from(err: tungstenite::Error) -> Self {
        ControlError::WebSocket(err.to_string())
    }
}
