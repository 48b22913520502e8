// Voice activity detection: scores one frame of PCM16 audio and reports
// whether it contains speech. Two implementations ship: `SileroVad`, wrapping
// the `voice_activity_detector` crate, and `MockVad`, a fixed-probability
// stub selected when the `TESTING` environment variable is set.

/// Scores a single PCM16LE frame. Implementations must be safe to call
/// synchronously from the per-connection audio task.
pub trait VoiceActivityDetector: Send {
    /// Returns `(is_speech, probability)` for one frame of `frame_bytes`
    /// (PCM16 little-endian) at `sample_rate`, using `threshold` to turn the
    /// continuous probability into the boolean the FSM consumes.
    fn predict(&mut self, frame_bytes: &[u8], sample_rate: u32, threshold: f32) -> (bool, f32);

    /// Readiness probe, exposed via the `health-check` CLI command and the
    /// application health endpoint.
    fn health_check(&mut self) -> bool;
}

pub struct SileroVad {
    detector: voice_activity_detector::VoiceActivityDetector,
}

impl SileroVad {
    pub fn new(sample_rate: u32, chunk_size: usize) -> anyhow::Result<Self> {
        let detector = voice_activity_detector::VoiceActivityDetector::builder()
            .sample_rate(sample_rate)
            .chunk_size(chunk_size)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build Silero VAD: {:?}", e))?;
        Ok(Self { detector })
    }

    fn bytes_to_samples(frame_bytes: &[u8]) -> Vec<i16> {
        frame_bytes
            .chunks_exact(2)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect()
    }
}

impl VoiceActivityDetector for SileroVad {
    fn predict(&mut self, frame_bytes: &[u8], _sample_rate: u32, threshold: f32) -> (bool, f32) {
        let samples = Self::bytes_to_samples(frame_bytes);
        let probability = self.detector.predict(samples);
        (probability > threshold, probability)
    }

    fn health_check(&mut self) -> bool {
        let silence = vec![0u8; 1024];
        let (_, probability) = self.predict(&silence, 16_000, 0.5);
        (0.0..=1.0).contains(&probability)
    }
}

/// Fixed-probability stub used when `TESTING=true`.
pub struct MockVad {
    pub fixed_probability: f32,
}

impl MockVad {
    pub fn new(fixed_probability: f32) -> Self {
        Self { fixed_probability }
    }
}

impl Default for MockVad {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl VoiceActivityDetector for MockVad {
    fn predict(&mut self, frame_bytes: &[u8], _sample_rate: u32, threshold: f32) -> (bool, f32) {
        if frame_bytes.is_empty() {
            return (false, 0.0);
        }
        (self.fixed_probability > threshold, self.fixed_probability)
    }

    fn health_check(&mut self) -> bool {
        true
    }
}

/// Build the configured detector, honoring `TESTING=true`.
pub fn build_detector(
    sample_rate: u32,
    chunk_size: usize,
    testing: bool,
) -> anyhow::Result<Box<dyn VoiceActivityDetector>> {
    if testing {
        Ok(Box::new(MockVad::default()))
    } else {
        Ok(Box::new(SileroVad::new(sample_rate, chunk_size)?))
    }
}
