use std::sync::Arc;

use tokio::sync::mpsc;
use voicegate::audio::merger::MergerTimeout;
use voicegate::audio::vad::VoiceActivityDetector;
use voicegate::config::Config;
use voicegate::protocol::{OutboundMessage, TranscriptionModel};
use voicegate::session::ClientSession;
use voicegate::transcribe::dispatcher::{Completion, DispatchOutcome};
use voicegate::transcribe::mock::MockTranscriber;

/// A detector whose speech/silence call is driven by frame content
/// (all-zero bytes are silence, anything else is speech), so these tests
/// can move the FSM through speech and hangover states deterministically
/// with synthetic frames rather than relying on `MockVad`'s fixed
/// probability, which scores every non-empty frame identically.
#[derive(Default)]
struct AlternatingVad;

impl VoiceActivityDetector for AlternatingVad {
    fn predict(&mut self, frame_bytes: &[u8], _sample_rate: u32, _threshold: f32) -> (bool, f32) {
        let is_speech = frame_bytes.iter().any(|&b| b != 0);
        (is_speech, if is_speech { 1.0 } else { 0.0 })
    }

    fn health_check(&mut self) -> bool {
        true
    }
}

/// A config with a short hangover (2 frames instead of the default 47) so
/// tests can reach genuinely short and mergeable utterances without having
/// to feed tens of thousands of frames. The hangover silence tail is still
/// part of the sealed utterance, matching production behavior exactly.
fn fast_hangover_config() -> Config {
    let mut config = Config::default();
    config.vad.silence_tolerance_secs = 0.05; // ceil(0.05 * 16000 / 512) = 2 frames
    config
}

fn new_session_with(
    config: &Config,
    fixed_text: &str,
) -> (
    ClientSession,
    mpsc::UnboundedReceiver<MergerTimeout>,
    mpsc::UnboundedReceiver<Completion>,
) {
    let (merger_tx, merger_rx) = mpsc::unbounded_channel();
    let (completion_tx, completion_rx) = mpsc::unbounded_channel();
    let session = ClientSession::new(
        "client1".to_string(),
        config,
        Arc::new(MockTranscriber::new(fixed_text)),
        Box::new(AlternatingVad),
        None,
        merger_tx,
        completion_tx,
    );
    (session, merger_rx, completion_rx)
}

fn speech_frame() -> Vec<u8> {
    vec![1u8; 1024]
}

fn silence_frame() -> Vec<u8> {
    vec![0u8; 1024]
}

fn feed(session: &mut ClientSession, frame: &[u8], count: usize) {
    for _ in 0..count {
        session.handle_binary(frame);
    }
}

async fn await_completion(session: &mut ClientSession, rx: &mut mpsc::UnboundedReceiver<Completion>) -> Vec<OutboundMessage> {
    let completion = rx.recv().await.expect("a completion should arrive");
    session.handle_completion(completion)
}

#[tokio::test]
async fn happy_path_single_utterance_produces_one_result() {
    let config = Config::default();
    let (mut session, _merger_rx, mut completion_rx) = new_session_with(&config, "hello there");

    feed(&mut session, &speech_frame(), 20);
    // ceil(1.5 * 16000 / 512) = 47 silence frames seal the utterance.
    feed(&mut session, &silence_frame(), 47);

    let events = await_completion(&mut session, &mut completion_rx).await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        OutboundMessage::TranscriptionResult { segment_id, text, .. } => {
            assert_eq!(*segment_id, 1);
            assert_eq!(text, "hello there");
        }
        other => panic!("expected transcription_result, got {other:?}"),
    }
}

#[tokio::test]
async fn disconnect_mid_utterance_seals_and_skips_a_short_segment() {
    let config = Config::default();
    let (mut session, _merger_rx, mut completion_rx) = new_session_with(&config, "unused");

    // 4 speech frames, never enough silence to reach the hangover threshold:
    // disconnect must seal whatever's buffered so far.
    feed(&mut session, &speech_frame(), 4);
    session.disconnect();

    let events = await_completion(&mut session, &mut completion_rx).await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        OutboundMessage::TranscriptionSkipped {
            segment_id,
            reason,
            duration_seconds,
            ..
        } => {
            assert_eq!(*segment_id, 1);
            assert_eq!(reason, "Audio segment too short");
            assert!((*duration_seconds - 0.128).abs() < 0.01);
        }
        other => panic!("expected transcription_skipped, got {other:?}"),
    }
}

#[tokio::test]
async fn short_utterance_merges_with_prompt_successor() {
    let config = fast_hangover_config();
    let (mut session, _merger_rx, mut completion_rx) = new_session_with(&config, "merged text");

    // first utterance: 5 speech frames + 2 hangover frames = 0.224s, held.
    feed(&mut session, &speech_frame(), 5);
    feed(&mut session, &silence_frame(), 2);

    // second utterance arrives immediately after (well inside the 2s merge
    // window): long enough on its own that the merged segment clears
    // MIN_MERGE_DURATION and dispatches right away.
    feed(&mut session, &speech_frame(), 30);
    feed(&mut session, &silence_frame(), 2);

    let events = await_completion(&mut session, &mut completion_rx).await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        OutboundMessage::TranscriptionResult { segment_id, .. } => assert_eq!(*segment_id, 1),
        other => panic!("expected transcription_result, got {other:?}"),
    }

    // the successor's id (2) was consumed by the merge; the next utterance
    // starts at 3.
    feed(&mut session, &speech_frame(), 30);
    feed(&mut session, &silence_frame(), 2);
    let events = await_completion(&mut session, &mut completion_rx).await;
    match &events[0] {
        OutboundMessage::TranscriptionResult { segment_id, .. } => assert_eq!(*segment_id, 3),
        other => panic!("expected transcription_result, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn merge_timeout_flushes_pending_segment_separately() {
    let config = fast_hangover_config();
    let (mut session, mut merger_rx, mut completion_rx) = new_session_with(&config, "unused");

    feed(&mut session, &speech_frame(), 5);
    feed(&mut session, &silence_frame(), 2);

    tokio::time::advance(std::time::Duration::from_secs(3)).await;
    let timeout = merger_rx.recv().await.expect("merge timeout should fire");
    session.handle_merger_timeout(timeout);

    let first = await_completion(&mut session, &mut completion_rx).await;
    match &first[0] {
        OutboundMessage::TranscriptionResult { segment_id, .. } => assert_eq!(*segment_id, 1),
        other => panic!("expected transcription_result, got {other:?}"),
    }

    feed(&mut session, &speech_frame(), 30);
    feed(&mut session, &silence_frame(), 2);
    let second = await_completion(&mut session, &mut completion_rx).await;
    match &second[0] {
        OutboundMessage::TranscriptionResult { segment_id, .. } => assert_eq!(*segment_id, 2),
        other => panic!("expected transcription_result, got {other:?}"),
    }
}

#[tokio::test]
async fn out_of_order_completions_are_released_in_segment_id_order() {
    let config = Config::default();
    let (mut session, _merger_rx, _completion_rx) = new_session_with(&config, "unused");

    // Segment 2's transcription resolves before segment 1's: the dispatcher
    // must hold it until segment 1 arrives, then release both in order.
    let second = Completion {
        segment_id: 2,
        model_used: TranscriptionModel::Gpt4oTranscribe,
        outcome: DispatchOutcome::Result {
            text: "second".into(),
            confidence: 0.95,
        },
    };
    let first = Completion {
        segment_id: 1,
        model_used: TranscriptionModel::Gpt4oTranscribe,
        outcome: DispatchOutcome::Result {
            text: "first".into(),
            confidence: 0.95,
        },
    };

    assert!(session.handle_completion(second).is_empty());
    let events = session.handle_completion(first);
    assert_eq!(events.len(), 2);
    match (&events[0], &events[1]) {
        (
            OutboundMessage::TranscriptionResult { segment_id: a, text: text_a, .. },
            OutboundMessage::TranscriptionResult { segment_id: b, text: text_b, .. },
        ) => {
            assert_eq!(*a, 1);
            assert_eq!(text_a, "first");
            assert_eq!(*b, 2);
            assert_eq!(text_b, "second");
        }
        other => panic!("expected two transcription_results, got {other:?}"),
    }
}

#[tokio::test]
async fn model_switch_mid_session_only_affects_future_segments() {
    let config = Config::default();
    let (mut session, _merger_rx, mut completion_rx) = new_session_with(&config, "unused");

    feed(&mut session, &speech_frame(), 38);
    feed(&mut session, &silence_frame(), 47);

    session.handle_text(r#"{"type":"model_selection","model":"whisper-1"}"#);

    feed(&mut session, &speech_frame(), 38);
    feed(&mut session, &silence_frame(), 47);

    let first = await_completion(&mut session, &mut completion_rx).await;
    let second = await_completion(&mut session, &mut completion_rx).await;

    match &first[0] {
        OutboundMessage::TranscriptionResult { segment_id, model_used, .. } => {
            assert_eq!(*segment_id, 1);
            assert_eq!(*model_used, TranscriptionModel::Gpt4oTranscribe);
        }
        other => panic!("expected transcription_result, got {other:?}"),
    }
    match &second[0] {
        OutboundMessage::TranscriptionResult { segment_id, model_used, .. } => {
            assert_eq!(*segment_id, 2);
            assert_eq!(*model_used, TranscriptionModel::Whisper1);
        }
        other => panic!("expected transcription_result, got {other:?}"),
    }
}

#[tokio::test]
async fn invalid_control_message_keeps_session_open_for_audio() {
    let config = Config::default();
    let (mut session, _merger_rx, mut completion_rx) = new_session_with(&config, "still works");

    let events = session.handle_text("{not json");
    assert!(matches!(events[0], OutboundMessage::Error { .. }));

    feed(&mut session, &speech_frame(), 20);
    feed(&mut session, &silence_frame(), 47);
    let events = await_completion(&mut session, &mut completion_rx).await;
    assert!(matches!(events[0], OutboundMessage::TranscriptionResult { .. }));
}
