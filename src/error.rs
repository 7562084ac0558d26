use thiserror::Error;

/// Errors raised while framing, parsing or encoding serial lines.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// A non-empty line without the `KIND:payload` separator.
    #[error("malformed message (no ':' separator): {0}")]
    MalformedMessage(String),

    /// An outbound command that cannot be sent as a single serial line.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

/// Errors surfaced by the transport adapters and the bridge loop.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The broker or local client rejected a publish.
    #[error("publish to {topic} failed: {reason}")]
    PublishFailure { topic: String, reason: String },

    /// Network association or session establishment failed.
    #[error("connection failure: {0}")]
    ConnectionFailure(String),

    /// TLS identity material could not be loaded.
    #[error("tls material {path}: {source}")]
    TlsMaterial {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Wrapper around serialport errors (open, configure).
    #[error("serial error: {0}")]
    Serial(#[from] serialport::Error),

    /// Wrapper around IO errors on the serial link.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
