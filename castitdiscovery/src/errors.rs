use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Cannot bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot join multicast group {group}: {source}")]
    MulticastJoin {
        group: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Description error: {0}")]
    Description(#[from] DescriptionError),
    #[error("Discovery worker stopped before reporting its state")]
    WorkerLost,
}

#[derive(Error, Debug)]
pub enum DescriptionError {
    #[error("HTTP error for {url}: {message}")]
    Http { url: String, message: String },
    #[error("XML parse error: {0}")]
    Xml(String),
    #[error("Invalid URL '{url}': {source}")]
    Url {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("Missing {0} in device description")]
    MissingField(&'static str),
}
