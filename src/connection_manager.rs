// Registry of live sessions and the per-connection driving loop: demuxes
// inbound binary/text frames to a `ClientSession`, and fans the session's
// three event sources (inbound socket, merger timers, dispatcher
// completions) into one ordered outbound stream.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};

use crate::audio::vad::{build_detector, VoiceActivityDetector};
use crate::config::Config;
use crate::error::GatewayError;
use crate::protocol::OutboundMessage;
use crate::session::ClientSession;
use crate::sink::{SegmentSink, WavFileSink};
use crate::transcribe::backend::Transcriber;

struct ConnectionMeta {
    connected_at_ms: u128,
}

pub type DetectorFactory = dyn Fn() -> anyhow::Result<Box<dyn VoiceActivityDetector>> + Send + Sync;

/// Tracks which client ids are currently connected. The session state that
/// actually matters for the audio pipeline lives in the connection's own
/// task; this registry exists for introspection (`status`) and so
/// `client_id` allocation never collides.
pub struct ConnectionManager {
    config: Arc<Config>,
    transcriber: Arc<dyn Transcriber>,
    detector_factory: Arc<DetectorFactory>,
    sessions: RwLock<HashMap<String, ConnectionMeta>>,
}

impl ConnectionManager {
    pub fn new(config: Arc<Config>, transcriber: Arc<dyn Transcriber>) -> Self {
        let sample_rate = config.audio.sample_rate;
        let frame_samples = config.audio.frame_samples;
        let testing = Config::testing_mode();
        Self::with_detector_factory(
            config,
            transcriber,
            Arc::new(move || build_detector(sample_rate, frame_samples, testing)),
        )
    }

    /// Like `new`, but takes over how each connection's VAD gets built instead
    /// of deriving it from `Config::testing_mode()`. Lets wire-level tests
    /// supply a detector that isn't the process-global `MockVad`.
    pub fn with_detector_factory(
        config: Arc<Config>,
        transcriber: Arc<dyn Transcriber>,
        detector_factory: Arc<DetectorFactory>,
    ) -> Self {
        Self {
            config,
            transcriber,
            detector_factory,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn active_session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    fn next_client_id() -> String {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0);
        now_ms.to_string()
    }

    /// Drives one accepted WebSocket connection end to end: builds the
    /// session, registers it, demuxes frames until disconnect, then flushes
    /// and deregisters.
    pub async fn run_connection(self: Arc<Self>, socket: WebSocket) {
        let client_id = Self::next_client_id();
        self.sessions.write().await.insert(
            client_id.clone(),
            ConnectionMeta {
                connected_at_ms: SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_millis())
                    .unwrap_or(0),
            },
        );

        if let Err(e) = self.drive(client_id.clone(), socket).await {
            tracing::warn!(client_id = %client_id, error = %e, "session ended with a transport error");
        }

        self.sessions.write().await.remove(&client_id);
    }

    async fn drive(&self, client_id: String, socket: WebSocket) -> anyhow::Result<()> {
        let (mut writer, mut reader) = socket.split();

        let (merger_tx, mut merger_rx) = mpsc::unbounded_channel();
        let (completion_tx, mut completion_rx) = mpsc::unbounded_channel();

        let detector: Box<dyn VoiceActivityDetector> =
            (self.detector_factory)().map_err(|e| GatewayError::Detector(e.to_string()))?;

        let sink: Option<Arc<dyn SegmentSink>> = if self.config.storage.write_segments_to_disk {
            let session_dir = format!(
                "{}_{}",
                chrono::Local::now().format("%Y%m%d_%H%M%S"),
                client_id
            );
            Some(Arc::new(WavFileSink::new(
                &self.config.storage.segments_dir,
                &session_dir,
            )?))
        } else {
            None
        };

        let mut session = ClientSession::new(
            client_id.clone(),
            &self.config,
            Arc::clone(&self.transcriber),
            detector,
            sink,
            merger_tx,
            completion_tx,
        );

        send_all(&mut writer, vec![session.announce()]).await?;

        // A transport failure mid-session must still reach `session.disconnect()`
        // below so the merger's held segment and the FSM's in-progress buffer get
        // flushed; it's captured here and re-raised only after that flush runs,
        // instead of propagating immediately via `?` and skipping it.
        let mut transport_error: Option<anyhow::Error> = None;

        loop {
            tokio::select! {
                inbound = reader.next() => {
                    let Some(message) = inbound else { break };
                    let message = match message {
                        Ok(m) => m,
                        Err(e) => {
                            transport_error = Some(GatewayError::Transport(e.to_string()).into());
                            break;
                        }
                    };
                    let events = match message {
                        Message::Binary(bytes) => session.handle_binary(&bytes),
                        Message::Text(text) => session.handle_text(&text),
                        Message::Close(_) => break,
                        Message::Ping(_) | Message::Pong(_) => Vec::new(),
                    };
                    if let Err(e) = send_all(&mut writer, events).await {
                        transport_error = Some(e);
                        break;
                    }
                }
                Some(timeout) = merger_rx.recv() => {
                    session.handle_merger_timeout(timeout);
                }
                Some(completion) = completion_rx.recv() => {
                    let events = session.handle_completion(completion);
                    if let Err(e) = send_all(&mut writer, events).await {
                        transport_error = Some(e);
                        break;
                    }
                }
            }
        }

        session.disconnect();
        // Give any immediately-ready completion (e.g. a synchronous skip of
        // the final flushed segment) a chance to reach the client before the
        // socket closes; anything slower is discarded per the disconnect
        // semantics in connection_manager's module doc. Best-effort: the
        // writer may already be broken if we got here via `transport_error`.
        while let Ok(completion) = completion_rx.try_recv() {
            let events = session.handle_completion(completion);
            let _ = send_all(&mut writer, events).await;
        }
        let _ = writer.close().await;

        if let Some(e) = transport_error {
            return Err(e);
        }
        Ok(())
    }
}

async fn send_all(
    writer: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    events: Vec<OutboundMessage>,
) -> anyhow::Result<()> {
    for event in events {
        let json = serde_json::to_string(&event)?;
        writer.send(Message::Text(json.into())).await?;
    }
    Ok(())
}
