use async_trait::async_trait;
use reqwest::multipart;

use crate::config::OpenAiConfig;
use crate::transcribe::backend::{Transcriber, Transcript};

/// Talks to an OpenAI-compatible `/audio/transcriptions` endpoint.
pub struct OpenAiTranscriber {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiTranscriber {
    pub fn new(config: &OpenAiConfig) -> anyhow::Result<Self> {
        let api_key = if config.api_key.is_empty() {
            std::env::var("OPENAI_API_KEY")
                .map_err(|_| anyhow::anyhow!("OpenAI API key not configured"))?
        } else {
            config.api_key.clone()
        };
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()?;
        Ok(Self {
            base_url: config.base_url.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    async fn transcribe(&self, wav_bytes: &[u8], model: &str) -> anyhow::Result<Transcript> {
        let url = format!("{}/audio/transcriptions", self.base_url);

        let form = multipart::Form::new()
            .part(
                "file",
                multipart::Part::bytes(wav_bytes.to_vec())
                    .file_name("segment.wav")
                    .mime_str("audio/wav")?,
            )
            .text("model", model.to_string())
            .text("response_format", "json");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?;

        let body: serde_json::Value = response.json().await?;
        let text = body["text"].as_str().unwrap_or("").to_string();

        Ok(Transcript {
            text,
            confidence: 0.95,
        })
    }

    /// Lists models as a cheap call that proves the API key and base URL
    /// both work, without spending a transcription request on the probe.
    async fn health_check(&self) -> bool {
        let url = format!("{}/models", self.base_url);
        match self.client.get(&url).bearer_auth(&self.api_key).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "OpenAI health check failed");
                false
            }
        }
    }
}
