use shared::WireError;

/// Failures that stop the server from starting or running.
///
/// Protocol violations by individual clients never surface here; the
/// dispatcher resolves those by dropping packets or closing the offending
/// connection.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("invalid configuration: {0}")]
    Config(String),
}
