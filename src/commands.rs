use std::sync::Arc;

use anyhow::Result;

use crate::audio::vad::build_detector;
use crate::config::Config;
use crate::sink;
use crate::transcribe::backend::Transcriber;
use crate::transcribe::mock::MockTranscriber;
use crate::transcribe::openai::OpenAiTranscriber;

/// Print segment storage usage under `config.storage.segments_dir`.
pub fn show_status(config: &Config) -> Result<()> {
    let (file_count, total_bytes) = sink::storage_stats(&config.storage.segments_dir)?;
    let total_mb = total_bytes as f64 / 1_048_576.0;

    println!("voicegate status:");
    println!("  Bind address:   {}", config.server.bind_addr);
    println!("  Segments dir:   {}", config.storage.segments_dir.display());
    println!("  Segment files:  {}", file_count);
    println!("  Total size:     {:.1} MB", total_mb);

    Ok(())
}

/// Verify the configured VAD and transcriber adapters are both ready,
/// mirroring the pair of probes the original health service ran per adapter.
pub async fn health_check(config: &Config) -> Result<()> {
    let mut detector = build_detector(
        config.audio.sample_rate,
        config.audio.frame_samples,
        Config::testing_mode(),
    )?;
    let vad_ok = detector.health_check();

    let transcriber: Arc<dyn Transcriber> = if Config::testing_mode() {
        Arc::new(MockTranscriber::default())
    } else {
        Arc::new(OpenAiTranscriber::new(&config.transcription.openai)?)
    };
    let transcriber_ok = transcriber.health_check().await;

    println!("voicegate health-check:");
    println!("  VAD:         {}", if vad_ok { "OK" } else { "FAILED" });
    println!("  Transcriber: {}", if transcriber_ok { "OK" } else { "FAILED" });

    if vad_ok && transcriber_ok {
        Ok(())
    } else {
        anyhow::bail!("health check failed")
    }
}
