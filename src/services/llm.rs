//! [`TextGenerator`] over an edgequake-llm provider.
//!
//! ## Retry Strategy
//!
//! Retries are off by default: the script rewriter already degrades to the
//! page's original text. When `max_retries > 0`, failed calls back off
//! exponentially (`retry_backoff_ms * 2^(attempt-1)`), so with 500 ms base
//! the waits are 500 ms → 1 s → 2 s.

use super::{GenerationRequest, Role, TextGenerator};
use crate::config::ConversionConfig;
use crate::error::{Pdf2VideoError, ServiceError};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, warn};

const DEFAULT_MODEL: &str = "gpt-4.1-nano";

/// Text generation through any provider edgequake-llm supports.
pub struct LlmTextGenerator {
    provider: Arc<dyn LLMProvider>,
    max_retries: u32,
    retry_backoff_ms: u64,
    timeout: Duration,
}

impl LlmTextGenerator {
    pub fn new(provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            provider,
            max_retries: 0,
            retry_backoff_ms: 500,
            timeout: Duration::from_secs(60),
        }
    }

    /// Resolve the provider from `config` and copy its retry/timeout knobs.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Pdf2VideoError> {
        let provider = resolve_provider(config)?;
        Ok(Self {
            provider,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            timeout: Duration::from_secs(config.api_timeout_secs),
        })
    }

    pub fn with_retries(mut self, max_retries: u32, retry_backoff_ms: u64) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff_ms = retry_backoff_ms;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn call_once(
        &self,
        messages: &[ChatMessage],
        options: &CompletionOptions,
    ) -> Result<String, ServiceError> {
        let response = timeout(self.timeout, self.provider.chat(messages, Some(options)))
            .await
            .map_err(|_| ServiceError::Timeout {
                secs: self.timeout.as_secs(),
            })?
            .map_err(|e| ServiceError::Request(e.to_string()))?;

        debug!(
            "LLM call: {} input tokens, {} output tokens",
            response.prompt_tokens, response.completion_tokens
        );

        let content = response.content.trim().to_string();
        if content.is_empty() {
            return Err(ServiceError::Malformed("empty completion".into()));
        }
        Ok(content)
    }
}

#[async_trait]
impl TextGenerator for LlmTextGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError> {
        let start = Instant::now();
        let messages = build_messages(request);
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        retry_with_backoff(self.max_retries, self.retry_backoff_ms, || {
            self.call_once(&messages, &options)
        })
        .await
        .inspect(|_| debug!("Generation finished in {:?}", start.elapsed()))
    }
}

/// Stands in when no provider could be resolved: every call is
/// [`ServiceError::NotConfigured`], so pages keep their original text.
pub struct DisabledTextGenerator {
    reason: String,
}

impl DisabledTextGenerator {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TextGenerator for DisabledTextGenerator {
    async fn generate(&self, _request: &GenerationRequest) -> Result<String, ServiceError> {
        Err(ServiceError::NotConfigured(self.reason.clone()))
    }
}

fn build_messages(request: &GenerationRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(request.turns.len() + 1);
    if let Some(ref system) = request.system {
        messages.push(ChatMessage::system(system));
    }
    for turn in &request.turns {
        messages.push(match turn.role {
            Role::User => ChatMessage::user(&turn.content),
            Role::Assistant => ChatMessage::assistant(&turn.content),
        });
    }
    messages
}

/// Run `attempt` up to `1 + max_retries` times with exponential backoff.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_ms: u64,
    mut attempt: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ServiceError>>,
{
    let mut last_err = None;

    for n in 0..=max_retries {
        if n > 0 {
            let backoff = backoff_ms * 2u64.pow(n - 1);
            warn!("Retry {}/{} after {}ms", n, max_retries, backoff);
            sleep(Duration::from_millis(backoff)).await;
        }

        match attempt().await {
            Ok(v) => return Ok(v),
            Err(ServiceError::NotConfigured(msg)) => return Err(ServiceError::NotConfigured(msg)),
            Err(e) => {
                warn!("Attempt {} failed: {}", n + 1, e);
                last_err = Some(e);
            }
        }
    }

    Err(last_err.unwrap_or_else(|| ServiceError::Request("no attempts made".into())))
}

// ── Provider resolution ──────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, Pdf2VideoError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        Pdf2VideoError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the LLM provider, from most-specific to least-specific:
///
/// 1. `config.provider` (pre-built, used as-is)
/// 2. `config.provider_name` + `config.model`
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL` when both are set
/// 4. OpenAI when `OPENAI_API_KEY` is set, else `ProviderFactory::from_env`
pub fn resolve_provider(config: &ConversionConfig) -> Result<Arc<dyn LLMProvider>, Pdf2VideoError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_provider(&prov, &model);
        }
    }

    if let Ok(openai_key) = std::env::var("OPENAI_API_KEY") {
        if !openai_key.is_empty() {
            let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
            return create_provider("openai", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| Pdf2VideoError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set OPENAI_API_KEY, ANTHROPIC_API_KEY, or configure a provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Turn;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(3, 1, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ServiceError::Http {
                        status: 503,
                        body: "busy".into(),
                    })
                } else {
                    Ok("done")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_with_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(1, 1, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::Timeout { secs: 5 }) }
        })
        .await;
        assert!(matches!(result, Err(ServiceError::Timeout { secs: 5 })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn not_configured_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = retry_with_backoff(5, 1, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ServiceError::NotConfigured("no key".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_generator_is_not_configured() {
        let gen = DisabledTextGenerator::new("no provider");
        let err = gen
            .generate(&GenerationRequest::prompt("hi", 0.7, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotConfigured(ref r) if r == "no provider"));
    }

    #[test]
    fn messages_keep_turn_order() {
        let request = GenerationRequest {
            system: Some("sys".into()),
            turns: vec![Turn::user("q1"), Turn::assistant("a1"), Turn::user("q2")],
            temperature: 0.6,
            max_tokens: 100,
        };
        let messages = build_messages(&request);
        assert_eq!(messages.len(), 4);
    }
}
