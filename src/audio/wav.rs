// Encodes raw PCM16 mono bytes into an in-memory WAV (RIFF/WAVE/fmt/data)
// container for the transcriber, and decodes one back for tests.

use std::io::Cursor;

use hound::{SampleFormat, WavSpec, WavWriter};

fn spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Encode little-endian PCM16 mono bytes into a WAV container held in memory.
pub fn encode(pcm: &[u8], sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec(sample_rate))?;
        for chunk in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Decode a WAV container back into little-endian PCM16 mono bytes. Used in
/// tests to assert the encoder round-trips.
pub fn decode(wav_bytes: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut reader = hound::WavReader::new(Cursor::new(wav_bytes))?;
    let mut pcm = Vec::with_capacity(wav_bytes.len());
    for sample in reader.samples::<i16>() {
        pcm.extend_from_slice(&sample?.to_le_bytes());
    }
    Ok(pcm)
}
