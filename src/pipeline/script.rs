//! Script rewriting: page text → spoken teaching script.
//!
//! One generation call per page. A failed or empty generation is not
//! retried here; the page keeps its original text and the miss is recorded.

use crate::error::SoftMiss;
use crate::model::Outcome;
use crate::prompts::{teacher_script_prompt, TEACHER_SCRIPT_PROMPT};
use crate::services::{GenerationRequest, TextGenerator};
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns page text into narration through a [`TextGenerator`].
#[derive(Clone)]
pub struct ScriptRewriter {
    generator: Arc<dyn TextGenerator>,
    template: String,
    temperature: f32,
    max_tokens: usize,
}

impl ScriptRewriter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            template: TEACHER_SCRIPT_PROMPT.to_string(),
            temperature: 0.7,
            max_tokens: 500,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: usize) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Rewrite `text` as a script.
    ///
    /// On failure the fallback is `text` itself, unchanged. On success the
    /// script is guaranteed to start with `title` (case-insensitive).
    pub async fn rewrite(&self, title: Option<&str>, text: &str, page: usize) -> Outcome<String> {
        if text.trim().is_empty() {
            debug!("Page {}: empty text, skipping script generation", page);
            return Outcome::Ready(text.to_string());
        }

        let prompt = teacher_script_prompt(&self.template, page, title, text);
        let request = GenerationRequest::prompt(prompt, self.temperature, self.max_tokens);

        match self.generator.generate(&request).await {
            Ok(script) if !script.trim().is_empty() => {
                debug!("Page {}: script of {} chars", page, script.len());
                Outcome::Ready(ensure_title_prefix(title, script.trim()))
            }
            Ok(_) => {
                warn!("Page {}: empty script, using original text", page);
                Outcome::degraded(
                    text.to_string(),
                    SoftMiss::ScriptFallback {
                        page,
                        detail: "empty response".into(),
                    },
                )
            }
            Err(e) => {
                warn!("Page {}: script generation failed: {}", page, e);
                Outcome::degraded(
                    text.to_string(),
                    SoftMiss::ScriptFallback {
                        page,
                        detail: e.to_string(),
                    },
                )
            }
        }
    }
}

/// Prepend `"{title}. "` unless `script` already starts with the title.
pub fn ensure_title_prefix(title: Option<&str>, script: &str) -> String {
    let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) else {
        return script.to_string();
    };
    if starts_with_ignore_case(script, title) {
        script.to_string()
    } else {
        format!("{}. {}", title, script)
    }
}

fn starts_with_ignore_case(haystack: &str, prefix: &str) -> bool {
    let mut hay = haystack.chars().flat_map(char::to_lowercase);
    prefix
        .chars()
        .flat_map(char::to_lowercase)
        .all(|p| hay.next() == Some(p))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use async_trait::async_trait;

    struct Fixed(Result<String, ServiceError>);

    #[async_trait]
    impl TextGenerator for Fixed {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, ServiceError> {
            self.0.clone()
        }
    }

    fn rewriter(result: Result<String, ServiceError>) -> ScriptRewriter {
        ScriptRewriter::new(Arc::new(Fixed(result)))
    }

    #[tokio::test]
    async fn failure_returns_original_text_exactly() {
        let r = rewriter(Err(ServiceError::Timeout { secs: 60 }));
        let text = "  Raw page text\nwith lines ";
        let outcome = r.rewrite(Some("Title"), text, 4).await;
        assert!(outcome.is_degraded());
        assert_eq!(outcome.value(), text);
        assert!(matches!(
            outcome.reason(),
            Some(SoftMiss::ScriptFallback { page: 4, .. })
        ));
    }

    #[tokio::test]
    async fn success_gets_title_prefix() {
        let r = rewriter(Ok("Plants turn light into sugar.".into()));
        let outcome = r.rewrite(Some("Photosynthesis"), "text", 1).await;
        assert_eq!(
            outcome.into_value(),
            "Photosynthesis. Plants turn light into sugar."
        );
    }

    #[tokio::test]
    async fn existing_prefix_is_kept() {
        let r = rewriter(Ok("PHOTOSYNTHESIS is how plants eat.".into()));
        let outcome = r.rewrite(Some("Photosynthesis"), "text", 1).await;
        assert_eq!(outcome.into_value(), "PHOTOSYNTHESIS is how plants eat.");
    }

    #[tokio::test]
    async fn empty_response_falls_back() {
        let r = rewriter(Ok("   ".into()));
        let outcome = r.rewrite(None, "original", 2).await;
        assert!(outcome.is_degraded());
        assert_eq!(outcome.value(), "original");
    }

    #[tokio::test]
    async fn empty_text_skips_generation() {
        let r = rewriter(Err(ServiceError::Request("should not be called".into())));
        let outcome = r.rewrite(Some("T"), "  ", 1).await;
        assert!(!outcome.is_degraded());
    }

    #[test]
    fn prefix_without_title_is_identity() {
        assert_eq!(ensure_title_prefix(None, "abc"), "abc");
        assert_eq!(ensure_title_prefix(Some("  "), "abc"), "abc");
    }
}
