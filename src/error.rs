use std::path::PathBuf;

/// Errors from the Artifact Store (C1). All are surfaced to callers as
/// `500`s; none of them should cause a negative-cache entry to be written,
/// since they reflect local disk problems rather than upstream absence.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to create parent directory for {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write artifact to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to publish artifact to {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to set modification time on {path}: {source}")]
    SetTimes {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Errors from loading and validating `RelayConfig`.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("no upstreams configured")]
    NoUpstreams,
    #[error("invalid bind address {host}:{port}")]
    InvalidBindAddress { host: String, port: u16 },
}
