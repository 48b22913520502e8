use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The text and incidental metadata returned for one dispatched segment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub confidence: f32,
}

/// Turns a WAV blob into text. Implementations must be safe to call from a
/// task spawned off the per-connection audio loop; the call may block on
/// network I/O.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, wav_bytes: &[u8], model: &str) -> anyhow::Result<Transcript>;

    /// Readiness probe, exposed via the `health-check` CLI command. Never
    /// dispatches a real transcription; implementations should do the
    /// cheapest call that proves the backend is reachable.
    async fn health_check(&self) -> bool;
}
