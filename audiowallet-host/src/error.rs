use thiserror::Error;

/// Host-side faults that are not simply protocol-level `ERROR` replies —
/// things that can go wrong assembling or running the process itself.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to bind session endpoint on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serve websocket connections: {0}")]
    Serve(String),
    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}
