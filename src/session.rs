// Owns everything for one live connection: the audio pipeline stages, the
// chosen transcription model, and the channel events flow out on.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::audio::frame_splitter::FrameSplitter;
use crate::audio::merger::{MergerTimeout, Segment, SegmentMerger};
use crate::audio::state_machine::UtteranceStateMachine;
use crate::audio::vad::VoiceActivityDetector;
use crate::config::Config;
use crate::error::GatewayError;
use crate::protocol::{now_timestamp, InboundMessage, OutboundMessage, TranscriptionModel};
use crate::sink::SegmentSink;
use crate::transcribe::backend::Transcriber;
use crate::transcribe::dispatcher::{Completion, DispatchOutcome, TranscriptionDispatcher};

pub struct ClientSession {
    pub client_id: String,
    pub session_dir: String,
    chosen_model: TranscriptionModel,
    segment_counter: u64,
    packet_count: u64,
    sample_rate: u32,
    emit_vad_results: bool,

    frame_splitter: FrameSplitter,
    fsm: UtteranceStateMachine,
    merger: SegmentMerger,
    dispatcher: TranscriptionDispatcher,
    detector: Box<dyn VoiceActivityDetector>,
    speech_threshold: f32,
    sink: Option<Arc<dyn SegmentSink>>,
}

impl ClientSession {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        client_id: String,
        config: &Config,
        transcriber: Arc<dyn Transcriber>,
        detector: Box<dyn VoiceActivityDetector>,
        sink: Option<Arc<dyn SegmentSink>>,
        merger_timer_tx: mpsc::UnboundedSender<MergerTimeout>,
        completion_tx: mpsc::UnboundedSender<Completion>,
    ) -> Self {
        let now = chrono::Local::now();
        let session_dir = format!("{}_{}", now.format("%Y%m%d_%H%M%S"), client_id);

        Self {
            client_id,
            session_dir,
            chosen_model: TranscriptionModel::default(),
            segment_counter: 0,
            packet_count: 0,
            sample_rate: config.audio.sample_rate,
            emit_vad_results: config.server.emit_vad_results,
            frame_splitter: FrameSplitter::new(),
            fsm: UtteranceStateMachine::new(&config.vad, config.audio.sample_rate, config.audio.frame_samples),
            merger: SegmentMerger::new(
                config.merger.min_merge_duration_secs,
                config.merger.merge_timeout_secs,
                merger_timer_tx,
            ),
            dispatcher: TranscriptionDispatcher::new(
                transcriber,
                config.audio.sample_rate,
                config.transcription.min_audio_seconds,
                completion_tx,
            ),
            detector,
            speech_threshold: config.vad.speech_threshold,
            sink,
        }
    }

    /// The `connection_established` event a session sends immediately on
    /// accept, or again whenever the client changes models.
    pub fn announce(&self) -> OutboundMessage {
        OutboundMessage::ConnectionEstablished {
            client_id: self.client_id.clone(),
            message: "Connected".to_string(),
            model: self.chosen_model,
            timestamp: now_timestamp(),
        }
    }

    /// Process one inbound binary (PCM) message. Returns outbound events in
    /// emission order.
    pub fn handle_binary(&mut self, bytes: &[u8]) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        self.packet_count += 1;

        out.push(OutboundMessage::AudioReceived {
            data_size: bytes.len(),
            packet_count: self.packet_count,
            message: "Audio received".to_string(),
            timestamp: now_timestamp(),
        });

        if self.packet_count % 10 == 0 {
            out.push(OutboundMessage::Statistics {
                total_packets: self.packet_count,
                message: "Statistics update".to_string(),
                timestamp: now_timestamp(),
            });
        }

        for frame in self.frame_splitter.push(bytes) {
            let (is_speech, confidence) = self.detector.predict(&frame, self.sample_rate, self.speech_threshold);

            if self.emit_vad_results {
                out.push(OutboundMessage::VadResult {
                    is_speech,
                    confidence,
                    timestamp: now_timestamp(),
                });
            }

            if let Some(utterance) = self.fsm.push_frame(&frame, is_speech) {
                self.seal_utterance(utterance.pcm);
            }
        }

        out
    }

    /// Process one inbound text (control) message.
    pub fn handle_text(&mut self, text: &str) -> Vec<OutboundMessage> {
        match serde_json::from_str::<InboundMessage>(text) {
            Ok(InboundMessage::ModelSelection { model, .. }) => {
                self.chosen_model = model;
                vec![self.announce()]
            }
            Err(e) => vec![OutboundMessage::Error {
                message: GatewayError::Protocol(e.to_string()).to_string(),
                timestamp: now_timestamp(),
            }],
        }
    }

    /// Drain the audio pipeline and merger on disconnect so a trailing short
    /// utterance with no successor still gets a chance at transcription.
    pub fn disconnect(&mut self) {
        if let Some(utterance) = self.fsm.finalize() {
            self.seal_utterance(utterance.pcm);
        }
        let dispatcher = &self.dispatcher;
        let model = self.chosen_model;
        let sample_rate = self.sample_rate;
        let sink = self.sink.clone();
        self.merger.flush_client(|segment| {
            archive_segment(&sink, sample_rate, &segment);
            dispatcher.dispatch(segment, model);
        });
    }

    /// A merger timer fired; apply it and dispatch whatever it released.
    pub fn handle_merger_timeout(&mut self, timeout: MergerTimeout) {
        let dispatcher = &self.dispatcher;
        let model = self.chosen_model;
        let sample_rate = self.sample_rate;
        let sink = self.sink.clone();
        self.merger.handle_timeout(timeout, |segment| {
            archive_segment(&sink, sample_rate, &segment);
            dispatcher.dispatch(segment, model);
        });
    }

    /// A transcription task completed; release whatever is now in order and
    /// turn each into its outbound event. Archival to disk (if enabled)
    /// already happened when the segment was handed to the dispatcher, not
    /// here, since this only carries text results.
    pub fn handle_completion(&mut self, completion: Completion) -> Vec<OutboundMessage> {
        self.dispatcher
            .accept(completion)
            .into_iter()
            .map(|c| self.to_outbound(c))
            .collect()
    }

    fn seal_utterance(&mut self, pcm: Vec<u8>) {
        self.segment_counter += 1;
        let segment_id = self.segment_counter;
        let dispatcher = &self.dispatcher;
        let model = self.chosen_model;
        let sample_rate = self.sample_rate;
        let sink = self.sink.clone();
        self.merger.offer(segment_id, pcm, sample_rate, |segment| {
            archive_segment(&sink, sample_rate, &segment);
            dispatcher.dispatch(segment, model);
        });
    }

    fn to_outbound(&self, completion: Completion) -> OutboundMessage {
        let timestamp = now_timestamp();
        match completion.outcome {
            DispatchOutcome::Result { text, confidence } => OutboundMessage::TranscriptionResult {
                id: format!("{}_{}", self.client_id, completion.segment_id),
                text,
                confidence,
                is_final: true,
                segment_id: completion.segment_id,
                model_used: completion.model_used,
                timestamp,
            },
            DispatchOutcome::Error { error } => OutboundMessage::TranscriptionError {
                segment_id: completion.segment_id,
                error,
                model_used: completion.model_used,
                timestamp,
            },
            DispatchOutcome::Skipped {
                reason,
                duration_seconds,
            } => OutboundMessage::TranscriptionSkipped {
                segment_id: completion.segment_id,
                reason,
                duration_seconds,
                timestamp,
            },
        }
    }

}

/// Fires off a best-effort disk write for a segment handed to the
/// dispatcher, when archival is configured. Runs on its own task since the
/// merger's `on_ready` callbacks are synchronous.
fn archive_segment(sink: &Option<Arc<dyn SegmentSink>>, sample_rate: u32, segment: &Segment) {
    let Some(sink) = sink else { return };
    let sink = Arc::clone(sink);
    let pcm = segment.pcm.clone();
    let segment_index = segment.segment_id as u32;
    tokio::spawn(async move {
        if let Err(e) = sink.write(&pcm, sample_rate, segment_index).await {
            tracing::warn!(error = %e, "failed to archive segment to disk");
        }
    });
}
