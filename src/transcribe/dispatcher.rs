// Encodes a sealed segment to WAV, dispatches it to a `Transcriber` on its
// own task, and reorders completions back into segment_id order before they
// reach the client.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audio::merger::Segment;
use crate::audio::wav;
use crate::error::GatewayError;
use crate::protocol::TranscriptionModel;
use crate::transcribe::backend::Transcriber;

#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Result { text: String, confidence: f32 },
    Error { error: String },
    Skipped { reason: String, duration_seconds: f64 },
}

/// Sent back from a dispatched transcription task once it resolves.
#[derive(Debug, Clone)]
pub struct Completion {
    pub segment_id: u64,
    pub model_used: TranscriptionModel,
    pub outcome: DispatchOutcome,
}

/// A completion that is ready to be turned into an outbound event, released
/// from the reordering buffer in `segment_id` order.
pub type ReadyCompletion = Completion;

pub struct TranscriptionDispatcher {
    transcriber: Arc<dyn Transcriber>,
    sample_rate: u32,
    min_audio_seconds: f32,
    completion_tx: mpsc::UnboundedSender<Completion>,
    next_expected_id: u64,
    held: BTreeMap<u64, Completion>,
}

impl TranscriptionDispatcher {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        sample_rate: u32,
        min_audio_seconds: f32,
        completion_tx: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        Self {
            transcriber,
            sample_rate,
            min_audio_seconds,
            completion_tx,
            next_expected_id: 1,
            held: BTreeMap::new(),
        }
    }

    /// Spawns the transcription (or skip) for one segment on its own task.
    /// Streaming never blocks on this call.
    pub fn dispatch(&self, segment: Segment, model: TranscriptionModel) {
        let samples = segment.pcm.len() / 2;
        let min_samples = (self.sample_rate as f32 * self.min_audio_seconds) as usize;

        let completion_tx = self.completion_tx.clone();
        let segment_id = segment.segment_id;

        if samples < min_samples {
            let duration_seconds = samples as f64 / self.sample_rate as f64;
            let _ = completion_tx.send(Completion {
                segment_id,
                model_used: model,
                outcome: DispatchOutcome::Skipped {
                    reason: "Audio segment too short".to_string(),
                    duration_seconds,
                },
            });
            return;
        }

        let transcriber = Arc::clone(&self.transcriber);
        let sample_rate = self.sample_rate;
        tokio::spawn(async move {
            let outcome = match wav::encode(&segment.pcm, sample_rate) {
                Ok(wav_bytes) => match transcriber.transcribe(&wav_bytes, model.as_str()).await {
                    Ok(transcript) => DispatchOutcome::Result {
                        text: transcript.text,
                        confidence: transcript.confidence,
                    },
                    Err(e) => DispatchOutcome::Error {
                        error: GatewayError::Transcription(e.to_string()).to_string(),
                    },
                },
                Err(e) => DispatchOutcome::Error {
                    error: GatewayError::Transcription(format!("failed to encode segment as WAV: {e}")).to_string(),
                },
            };
            let _ = completion_tx.send(Completion {
                segment_id,
                model_used: model,
                outcome,
            });
        });
    }

    /// Feed one completion into the reordering buffer. Returns every
    /// completion now releasable in `segment_id` order (zero, one, or many
    /// if this completion unblocked a run of already-held out-of-order
    /// results).
    pub fn accept(&mut self, completion: Completion) -> Vec<ReadyCompletion> {
        self.held.insert(completion.segment_id, completion);

        let mut ready = Vec::new();
        while let Some(next) = self.held.remove(&self.next_expected_id) {
            self.next_expected_id += 1;
            ready.push(next);
        }
        ready
    }
}
