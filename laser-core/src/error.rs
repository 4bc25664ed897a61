use thiserror::Error;

/// Failures reported by a transport adapter (discovery, commands, stream).
///
/// Messages are kept as strings so the core stays independent of the HTTP and
/// WebSocket crates used by the adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("http request failed: {0}")]
    Http(String),
    #[error("device server answered {status} for {url}")]
    Status { status: u16, url: String },
    #[error("invalid payload: {0}")]
    Decode(String),
    #[error("stream connection failed: {0}")]
    Connect(String),
    #[error("stream error: {0}")]
    Stream(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("device discovery failed: {0}")]
    Discovery(#[source] TransportError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The task issuing the command panicked or was cancelled.
    #[error("command task aborted: {0}")]
    Aborted(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown signal `{0}`")]
pub struct UnknownSignal(pub String);
