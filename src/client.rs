//! The model capability consumed by the page pipeline, and its production
//! implementation on top of edgequake-llm providers.
//!
//! The pipeline only ever sees [`ModelClient`] — three calls, all returning
//! plain text. Keeping the trait this narrow means tests drive the whole
//! pipeline with a scripted fake, and swapping providers (OpenAI,
//! Anthropic, Gemini, Ollama, any OpenAI-compatible endpoint) is entirely a
//! construction-time concern.
//!
//! Implementations must be safe for concurrent use: in concurrent mode
//! every page pipeline holds the same `Arc<dyn ModelClient>` and issues
//! calls in parallel.

use crate::config::ExtractionConfig;
use crate::error::TocError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::{
    ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory,
};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Vision/completion capability used by the page pipeline.
///
/// All three calls may fail with a transport/timeout error; the pipeline
/// catches those per-stage rather than letting them abort a page.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Vision call: describe the image per `prompt`, returning raw text.
    async fn analyze_image(&self, image_path: &Path, prompt: &str) -> Result<String, TocError>;

    /// Vision call: transcribe the text content of the image.
    async fn extract_text(&self, image_path: &Path, prompt: &str) -> Result<String, TocError>;

    /// Text-only completion.
    async fn complete(&self, prompt: &str) -> Result<String, TocError>;

    /// Model identifier for metadata/logging, when known.
    fn model_name(&self) -> Option<String> {
        None
    }
}

/// Production [`ModelClient`] backed by an edgequake-llm provider.
pub struct VisionLlmClient {
    provider: Arc<dyn LLMProvider>,
    model_name: Option<String>,
    temperature: f32,
    max_tokens: usize,
}

impl VisionLlmClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ExtractionConfig) -> Self {
        Self {
            provider,
            model_name: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String, TocError> {
        let options = self.options();
        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| TocError::Model {
                message: format!("{e}"),
            })?;
        debug!(
            prompt_tokens = response.prompt_tokens,
            completion_tokens = response.completion_tokens,
            "model call finished"
        );
        Ok(response.content)
    }

    async fn vision_call(&self, image_path: &Path, prompt: &str) -> Result<String, TocError> {
        let image = encode_image_file(image_path).await?;
        let messages = vec![ChatMessage::user_with_images(prompt, vec![image])];
        self.chat(messages).await
    }
}

#[async_trait]
impl ModelClient for VisionLlmClient {
    async fn analyze_image(&self, image_path: &Path, prompt: &str) -> Result<String, TocError> {
        self.vision_call(image_path, prompt).await
    }

    async fn extract_text(&self, image_path: &Path, prompt: &str) -> Result<String, TocError> {
        self.vision_call(image_path, prompt).await
    }

    async fn complete(&self, prompt: &str) -> Result<String, TocError> {
        let messages = vec![ChatMessage::user(prompt)];
        self.chat(messages).await
    }

    fn model_name(&self) -> Option<String> {
        self.model_name.clone()
    }
}

/// Read a rendered page image and wrap it as a base64 attachment.
///
/// PNG is what the renderer writes; `detail: "high"` makes GPT-4-class
/// models use the full image tile budget — without it the small print of a
/// dense TOC page is lost.
async fn encode_image_file(path: &Path) -> Result<ImageData, TocError> {
    let bytes = tokio::fs::read(path).await.map_err(|_| TocError::FileNotFound {
        path: path.to_path_buf(),
    })?;
    let b64 = STANDARD.encode(&bytes);
    debug!(path = %path.display(), bytes = b64.len(), "encoded page image");
    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Resolve the LLM provider, from most-specific to least-specific.
///
/// 1. **Pre-built provider** (`config.provider`) — used as-is; handy in
///    tests and when the caller wants custom middleware.
/// 2. **Named provider + model** (`config.provider_name`) — the factory
///    reads the matching API key from the environment.
/// 3. **Environment pair** (`PDFTOC_PROVIDER` + `PDFTOC_MODEL`) — both set
///    means the execution environment chose; honoured before full
///    auto-detection.
/// 4. **Full auto-detection** (`ProviderFactory::from_env`) — first
///    provider with a usable API key wins.
pub fn resolve_provider(config: &ExtractionConfig) -> Result<Arc<dyn LLMProvider>, TocError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("PDFTOC_PROVIDER"),
        std::env::var("PDFTOC_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| TocError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                 Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or pass --provider.\n\
                 Error: {e}"
            ),
        })?;

    Ok(llm_provider)
}

/// Default vision model when the caller names a provider but no model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, TocError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        TocError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}
