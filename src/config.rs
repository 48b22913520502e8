use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub vad: VadConfig,
    pub merger: MergerConfig,
    pub transcription: TranscriptionConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Emit a `vad_result` event per frame. Off by default; most clients
    /// only care about utterance-level results.
    pub emit_vad_results: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub frame_samples: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    pub silence_tolerance_secs: f32,
    pub speech_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MergerConfig {
    pub min_merge_duration_secs: f32,
    pub merge_timeout_secs: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub min_audio_seconds: f32,
    pub default_model: String,
    pub openai: OpenAiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub segments_dir: PathBuf,
    pub write_segments_to_disk: bool,
}

// --- Default implementations ---

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            audio: AudioConfig::default(),
            vad: VadConfig::default(),
            merger: MergerConfig::default(),
            transcription: TranscriptionConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            emit_vad_results: false,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            frame_samples: 512,
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            silence_tolerance_secs: 1.5,
            speech_threshold: 0.5,
        }
    }
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            min_merge_duration_secs: 0.8,
            merge_timeout_secs: 2.0,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            min_audio_seconds: 0.3,
            default_model: "gpt-4o-transcribe".to_string(),
            openai: OpenAiConfig::default(),
        }
    }
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        let directory = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voicegate")
            .join("segments");
        Self {
            segments_dir: directory,
            write_segments_to_disk: false,
        }
    }
}

// --- Config loading ---

impl Config {
    /// Load config from an explicit path, or search standard locations, or fall back to defaults.
    ///
    /// After loading, recognized environment variables (`VAD_SILENCE_TOLERANCE`,
    /// `OPENAI_API_KEY`) override the corresponding field.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn load_from_file(path: Option<&Path>) -> anyhow::Result<Self> {
        // 1. Check explicit path
        if let Some(p) = path {
            let content = std::fs::read_to_string(p).map_err(|e| {
                anyhow::anyhow!("Failed to read config file {}: {}", p.display(), e)
            })?;
            let config: Config = toml::from_str(&content)?;
            return Ok(config);
        }

        // 2. Check beside the executable
        if let Ok(exe_path) = std::env::current_exe() {
            let beside_exe = exe_path.parent().map(|p| p.join("voicegate.toml"));
            if let Some(p) = beside_exe {
                if p.exists() {
                    let content = std::fs::read_to_string(&p)?;
                    let config: Config = toml::from_str(&content)?;
                    return Ok(config);
                }
            }
        }

        // 3. Check platform config directory
        if let Some(config_dir) = dirs::config_dir() {
            let platform_config = config_dir.join("voicegate").join("config.toml");
            if platform_config.exists() {
                let content = std::fs::read_to_string(&platform_config)?;
                let config: Config = toml::from_str(&content)?;
                return Ok(config);
            }
        }

        // 4. Fall back to defaults
        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("VAD_SILENCE_TOLERANCE") {
            match raw.parse::<f32>() {
                Ok(secs) => self.vad.silence_tolerance_secs = secs,
                Err(_) => tracing::warn!(
                    "VAD_SILENCE_TOLERANCE={} is not a valid number, ignoring",
                    raw
                ),
            }
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.transcription.openai.api_key = key;
        }
    }

    /// `true` when `TESTING=true` is set: swap in mock VAD and mock transcriber.
    pub fn testing_mode() -> bool {
        std::env::var("TESTING")
            .map(|v| v == "true")
            .unwrap_or(false)
    }
}
