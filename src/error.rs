use thiserror::Error;

/// Typed failure domains surfaced by the gateway. Each variant maps to exactly
/// one outbound event kind (or, for `Transport`, to a session teardown) so the
/// connection manager never has to string-match an error message.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("transcription failed: {0}")]
    Transcription(String),

    #[error("segment merge failed: {0}")]
    Merge(String),

    #[error("transport failed: {0}")]
    Transport(String),

    #[error("voice activity detector failed: {0}")]
    Detector(String),
}
