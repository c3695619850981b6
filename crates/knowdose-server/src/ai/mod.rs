//! Generative model proxy: free-text Q&A and medication label analysis.

pub mod gemini;
pub mod prompts;

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use knowdose_core::{CoreError, ImageAnalysisRequest, TextPromptRequest};

use crate::config::PromptVersion;

pub use gemini::GeminiClient;

/// Returned when the model produced no text for a question.
pub const EMPTY_TEXT_FALLBACK: &str = "No response generated.";
/// Returned when the model produced no text for a label analysis.
pub const EMPTY_ANALYSIS_FALLBACK: &str = "{}";

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    /// No API key configured.
    #[error("GEMINI_API_KEY missing; AI unavailable")]
    Unavailable,

    #[error("AI request failed: {0}")]
    Network(String),

    #[error("AI provider returned status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Failed to parse AI response: {0}")]
    Parse(String),
}

/// Base64 image sent inline with a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

impl InlineImage {
    /// Accepts bare base64 or a `data:<mime>;base64,<data>` URL.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidImage` if the data is not valid base64.
    pub fn from_payload(payload: &str) -> Result<Self, CoreError> {
        let payload = payload.trim();
        let (mime_type, data) = match payload.strip_prefix("data:") {
            Some(rest) => {
                let (header, data) = rest
                    .split_once(',')
                    .ok_or_else(|| CoreError::invalid_image("malformed data URL"))?;
                let mime = header
                    .strip_suffix(";base64")
                    .ok_or_else(|| CoreError::invalid_image("data URL must be base64 encoded"))?;
                let mime = if mime.is_empty() { DEFAULT_IMAGE_MIME } else { mime };
                (mime.to_string(), data)
            }
            None => (DEFAULT_IMAGE_MIME.to_string(), payload),
        };

        STANDARD
            .decode(data)
            .map_err(|e| CoreError::invalid_image(format!("imageBase64 is not valid base64: {e}")))?;

        Ok(Self {
            mime_type,
            data: data.to_string(),
        })
    }
}

/// One `generateContent` call.
#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub model: String,
    pub system_instruction: Option<String>,
    pub prompt: String,
    pub image: Option<InlineImage>,
    pub response_mime_type: Option<String>,
}

/// A hosted generative model.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Returns the concatenated response text, possibly empty.
    async fn generate(&self, request: GenerateRequest) -> Result<String, AiError>;
}

/// Builds prompts and forwards them to the configured model.
#[derive(Clone)]
pub struct AiService {
    model: Option<Arc<dyn GenerativeModel>>,
    text_model: String,
    image_model: String,
    prompt_version: PromptVersion,
}

impl AiService {
    pub fn new(
        model: Option<Arc<dyn GenerativeModel>>,
        text_model: impl Into<String>,
        image_model: impl Into<String>,
        prompt_version: PromptVersion,
    ) -> Self {
        Self {
            model,
            text_model: text_model.into(),
            image_model: image_model.into(),
            prompt_version,
        }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    fn model(&self) -> Result<&Arc<dyn GenerativeModel>, AiError> {
        self.model.as_ref().ok_or(AiError::Unavailable)
    }

    pub async fn answer(&self, request: TextPromptRequest) -> Result<String, AiError> {
        let model = self.model()?;
        let text = model
            .generate(GenerateRequest {
                model: self.text_model.clone(),
                system_instruction: Some(prompts::system_prompt(request.lang).to_string()),
                prompt: request.prompt,
                ..GenerateRequest::default()
            })
            .await?;
        Ok(non_empty_or(text, EMPTY_TEXT_FALLBACK))
    }

    /// Runs label analysis. The image must already be decoded and checked.
    pub async fn analyze(
        &self,
        request: &ImageAnalysisRequest,
        image: InlineImage,
    ) -> Result<String, AiError> {
        let model = self.model()?;
        let prompt = prompts::analysis_prompt(
            self.prompt_version,
            request.lang,
            &request.meal_times,
            &request.existing_meds,
        );
        let text = model
            .generate(GenerateRequest {
                model: self.image_model.clone(),
                prompt,
                image: Some(image),
                response_mime_type: Some("application/json".to_string()),
                ..GenerateRequest::default()
            })
            .await?;
        Ok(non_empty_or(text, EMPTY_ANALYSIS_FALLBACK))
    }
}

fn non_empty_or(text: String, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowdose_core::Language;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        reply: String,
        seen: Mutex<Vec<GenerateRequest>>,
    }

    #[async_trait]
    impl GenerativeModel for Recording {
        async fn generate(&self, request: GenerateRequest) -> Result<String, AiError> {
            self.seen.lock().await.push(request);
            Ok(self.reply.clone())
        }
    }

    fn service(model: Arc<Recording>) -> AiService {
        AiService::new(
            Some(model),
            "text-model",
            "image-model",
            PromptVersion::Extended,
        )
    }

    #[test]
    fn parses_bare_and_data_url_images() {
        let bare = InlineImage::from_payload("aGVsbG8gd29ybGQ=").unwrap();
        assert_eq!(bare.mime_type, "image/jpeg");
        assert_eq!(bare.data, "aGVsbG8gd29ybGQ=");

        let url = InlineImage::from_payload("data:image/png;base64,aGVsbG8gd29ybGQ=").unwrap();
        assert_eq!(url.mime_type, "image/png");
        assert_eq!(url.data, "aGVsbG8gd29ybGQ=");
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(InlineImage::from_payload("not base64 at all!!").is_err());
        assert!(InlineImage::from_payload("data:image/png,aGVsbG8=").is_err());
    }

    #[tokio::test]
    async fn without_model_ai_is_unavailable() {
        let service = AiService::new(None, "t", "i", PromptVersion::Basic);
        let err = service
            .answer(TextPromptRequest {
                prompt: "hi".into(),
                lang: Language::En,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Unavailable));
    }

    #[tokio::test]
    async fn text_uses_system_prompt_and_falls_back_when_empty() {
        let model = Arc::new(Recording::default());
        let text = service(model.clone())
            .answer(TextPromptRequest {
                prompt: "Can I take ibuprofen with food?".into(),
                lang: Language::En,
            })
            .await
            .unwrap();
        assert_eq!(text, EMPTY_TEXT_FALLBACK);

        let seen = model.seen.lock().await;
        assert_eq!(seen[0].model, "text-model");
        assert_eq!(
            seen[0].system_instruction.as_deref(),
            Some(prompts::system_prompt(Language::En))
        );
        assert!(seen[0].image.is_none());
    }

    #[tokio::test]
    async fn analysis_requests_json_with_inline_image() {
        let model = Arc::new(Recording {
            reply: r#"{"dailyFrequency":2}"#.into(),
            ..Recording::default()
        });
        let request = ImageAnalysisRequest {
            image_base64: "aGVsbG8gd29ybGQ=".into(),
            lang: Language::Zh,
            meal_times: Default::default(),
            existing_meds: vec![],
        };
        let image = InlineImage::from_payload(&request.image_base64).unwrap();

        let result = service(model.clone()).analyze(&request, image).await.unwrap();
        assert_eq!(result, r#"{"dailyFrequency":2}"#);

        let seen = model.seen.lock().await;
        assert_eq!(seen[0].model, "image-model");
        assert_eq!(seen[0].response_mime_type.as_deref(), Some("application/json"));
        assert!(seen[0].system_instruction.is_none());
        assert!(seen[0].prompt.contains("早餐08:00"));
    }
}
