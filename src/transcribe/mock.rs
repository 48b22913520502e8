use async_trait::async_trait;

use crate::transcribe::backend::{Transcriber, Transcript};

/// Returns a fixed transcript without touching the network. Selected when
/// `TESTING=true`.
pub struct MockTranscriber {
    pub fixed_text: String,
}

impl MockTranscriber {
    pub fn new(fixed_text: impl Into<String>) -> Self {
        Self {
            fixed_text: fixed_text.into(),
        }
    }
}

impl Default for MockTranscriber {
    fn default() -> Self {
        Self::new("mock transcription")
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _wav_bytes: &[u8], _model: &str) -> anyhow::Result<Transcript> {
        Ok(Transcript {
            text: self.fixed_text.clone(),
            confidence: 0.95,
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}
