// Wire protocol: inbound control messages and outbound events exchanged over
// the `/ws` connection.

use serde::{Deserialize, Serialize};

/// Transcription models a client may select via `model_selection`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TranscriptionModel {
    Whisper1,
    #[serde(rename = "gpt-4o-transcribe")]
    Gpt4oTranscribe,
    #[serde(rename = "gpt-4o-mini-transcribe")]
    Gpt4oMiniTranscribe,
}

impl Default for TranscriptionModel {
    fn default() -> Self {
        Self::Gpt4oTranscribe
    }
}

impl TranscriptionModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Whisper1 => "whisper-1",
            Self::Gpt4oTranscribe => "gpt-4o-transcribe",
            Self::Gpt4oMiniTranscribe => "gpt-4o-mini-transcribe",
        }
    }
}

/// Messages a client may send over the text side of the connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    ModelSelection {
        model: TranscriptionModel,
        #[serde(default)]
        timestamp: Option<f64>,
    },
}

/// Events emitted to the client. `timestamp` is seconds since the Unix epoch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    ConnectionEstablished {
        client_id: String,
        message: String,
        model: TranscriptionModel,
        timestamp: f64,
    },
    AudioReceived {
        data_size: usize,
        packet_count: u64,
        message: String,
        timestamp: f64,
    },
    Statistics {
        total_packets: u64,
        message: String,
        timestamp: f64,
    },
    VadResult {
        is_speech: bool,
        confidence: f32,
        timestamp: f64,
    },
    TranscriptionResult {
        id: String,
        text: String,
        confidence: f32,
        is_final: bool,
        segment_id: u64,
        model_used: TranscriptionModel,
        timestamp: f64,
    },
    TranscriptionError {
        segment_id: u64,
        error: String,
        model_used: TranscriptionModel,
        timestamp: f64,
    },
    TranscriptionSkipped {
        segment_id: u64,
        reason: String,
        duration_seconds: f64,
        timestamp: f64,
    },
    SegmentMergeError {
        error: String,
        timestamp: f64,
    },
    Error {
        message: String,
        timestamp: f64,
    },
}

/// Seconds-since-epoch timestamp attached to every outbound event.
pub fn now_timestamp() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
