// Optional on-disk archival of completed segments as WAV files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::audio::wav;

/// Persists a completed segment. Optional: a session with
/// `write_segments_to_disk = false` never constructs one.
#[async_trait]
pub trait SegmentSink: Send + Sync {
    async fn write(&self, pcm: &[u8], sample_rate: u32, segment_index: u32) -> anyhow::Result<PathBuf>;
}

/// Writes each segment to `segments_dir/{session_dir}/segment_{NNNN}.wav`.
/// `session_dir` is assigned once per connection; file names are unique per
/// session by construction, so concurrent sessions never contend.
pub struct WavFileSink {
    session_dir: PathBuf,
}

impl WavFileSink {
    pub fn new(segments_root: &Path, session_dir_name: &str) -> anyhow::Result<Self> {
        let session_dir = segments_root.join(session_dir_name);
        std::fs::create_dir_all(&session_dir)?;
        Ok(Self { session_dir })
    }
}

#[async_trait]
impl SegmentSink for WavFileSink {
    async fn write(&self, pcm: &[u8], sample_rate: u32, segment_index: u32) -> anyhow::Result<PathBuf> {
        let wav_bytes = wav::encode(pcm, sample_rate)?;
        let path = self.session_dir.join(format!("segment_{segment_index:04}.wav"));
        tokio::fs::write(&path, wav_bytes).await?;
        Ok(path)
    }
}

/// Returns `(total_files, total_bytes)` under the segments root, for the
/// `status` command.
pub fn storage_stats(segments_root: &Path) -> anyhow::Result<(usize, u64)> {
    let mut count = 0;
    let mut bytes = 0;

    if !segments_root.exists() {
        return Ok((0, 0));
    }

    for entry in std::fs::read_dir(segments_root)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            for file in std::fs::read_dir(entry.path())? {
                let file = file?;
                if file.file_type()?.is_file() {
                    count += 1;
                    bytes += file.metadata()?.len();
                }
            }
        }
    }
    Ok((count, bytes))
}
