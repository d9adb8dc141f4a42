//! Voice transcription — speech-to-text via Whisper-compatible endpoints.
//!
//! Any provider whose model list contains a `whisper` model can serve
//! `POST {base}/audio/transcriptions`.

use std::path::Path;
use std::time::Duration;

use tracing::{debug, error};

use crate::error::ExecutorError;
use crate::provider::Provider;

/// Model used when neither the caller nor config names one.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-large-v3";

/// MIME type sent when the extension is unknown.
const FALLBACK_MIME: &str = "audio/ogg";

/// Uploads audio files to a provider's transcription endpoint.
#[derive(Clone, Debug)]
pub struct Transcriber {
    client: reqwest::Client,
    model: String,
    language: Option<String>,
    timeout: Duration,
}

impl Default for Transcriber {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl Transcriber {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            language: None,
            timeout: Duration::from_secs(60),
        }
    }

    /// Default model and language, used when a call leaves them unset.
    pub fn with_defaults(mut self, model: impl Into<String>, language: Option<String>) -> Self {
        self.model = model.into();
        self.language = language;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The configured model when `provider` declares it, otherwise the
    /// provider's own whisper model.
    pub fn model_for(&self, provider: &Provider) -> String {
        if provider.models.iter().any(|m| *m == self.model) {
            return self.model.clone();
        }
        provider
            .transcription_model()
            .unwrap_or(&self.model)
            .to_string()
    }

    /// Transcribe `file_path` on `provider`. Returns the trimmed text.
    pub async fn transcribe(
        &self,
        provider: &Provider,
        file_path: &Path,
        model: Option<&str>,
        language: Option<&str>,
    ) -> Result<String, ExecutorError> {
        let model = model
            .map(String::from)
            .unwrap_or_else(|| self.model_for(provider));
        let language = language.or(self.language.as_deref());

        let bytes = tokio::fs::read(file_path)
            .await
            .map_err(|e| ExecutorError::Io(format!("{}: {e}", file_path.display())))?;

        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.ogg".to_string());
        let mime = mime_type(file_path);

        debug!(
            provider = %provider.name,
            path = %file_path.display(),
            model = %model,
            mime,
            "transcribing audio"
        );

        let file_part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| ExecutorError::Io(format!("invalid mime type {mime}: {e}")))?;

        let mut form = reqwest::multipart::Form::new().text("model", model);
        if let Some(lang) = language {
            form = form.text("language", lang.to_string());
        }
        let form = form.part("file", file_part);

        let response = self
            .client
            .post(provider.endpoint("audio/transcriptions"))
            .bearer_auth(&provider.api_key)
            .multipart(form)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(provider = %provider.name, status = %status, body = %body, "transcription API error");
            return Err(ExecutorError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response.json().await?;
        let text = json["text"]
            .as_str()
            .ok_or_else(|| ExecutorError::Malformed("response has no text field".to_string()))?
            .trim()
            .to_string();

        debug!(provider = %provider.name, chars = text.len(), "transcription complete");
        Ok(text)
    }
}

/// MIME type guessed from the extension, `audio/ogg` when unknown.
pub fn mime_type(path: &Path) -> &'static str {
    mime_guess::from_path(path).first_raw().unwrap_or(FALLBACK_MIME)
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
