//! Interactive questions and summaries over a document's text.
//!
//! Questions are answered from retrieved sections only: the document is
//! chunked, the chunks most relevant to the question are packed into a
//! bounded context, and the model sees that context plus the conversation
//! so far. Unlike the video pipeline there is no degraded answer; a failed
//! generation is returned as [`Pdf2VideoError::Generation`].

use crate::chunk::{build_context, Chunker};
use crate::config::ConversionConfig;
use crate::error::Pdf2VideoError;
use crate::prompts::{
    chat_system_prompt, summary_prompt, SUMMARY_BRIEF, SUMMARY_DETAILED, SUMMARY_STANDARD,
    SUMMARY_SYSTEM_PROMPT,
};
use crate::services::{GenerationRequest, TextGenerator, Turn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info};

const CHAT_TEMPERATURE: f32 = 0.6;
const CHAT_MAX_TOKENS: usize = 1024;
/// Characters of the document a summary is based on.
const SUMMARY_INPUT_CHARS: usize = 30_000;

// ── Reasoning filters ────────────────────────────────────────────────────

static RE_THINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<think>.*?</think>").unwrap());
static RE_REASONING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<reasoning>.*?</reasoning>").unwrap());
static RE_REASONING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^(?:thinking|reasoning):.*$").unwrap());
static RE_REASONING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```(?:thinking|reasoning)\n.*?\n```").unwrap());
static RE_BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

/// Strip model reasoning that leaked into an answer.
pub fn filter_thinking(text: &str) -> String {
    let text = RE_THINK.replace_all(text, "");
    let text = RE_REASONING.replace_all(&text, "");
    let text = RE_REASONING_LINE.replace_all(&text, "");
    let text = RE_REASONING_FENCE.replace_all(&text, "");
    RE_BLANK_RUNS.replace_all(&text, "\n\n").trim().to_string()
}

// ── Summary length ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLength {
    Brief,
    #[default]
    Standard,
    Detailed,
}

impl SummaryLength {
    fn instructions(self) -> &'static str {
        match self {
            SummaryLength::Brief => SUMMARY_BRIEF,
            SummaryLength::Standard => SUMMARY_STANDARD,
            SummaryLength::Detailed => SUMMARY_DETAILED,
        }
    }

    pub fn max_tokens(self) -> usize {
        match self {
            SummaryLength::Brief => 512,
            SummaryLength::Standard => 1024,
            SummaryLength::Detailed => 2048,
        }
    }
}

impl FromStr for SummaryLength {
    type Err = Pdf2VideoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "brief" => Ok(SummaryLength::Brief),
            "standard" => Ok(SummaryLength::Standard),
            "detailed" => Ok(SummaryLength::Detailed),
            other => Err(Pdf2VideoError::InvalidConfig(format!(
                "unknown summary length '{}': expected brief, standard or detailed",
                other
            ))),
        }
    }
}

// ── Chat ─────────────────────────────────────────────────────────────────

/// Retrieval-grounded Q&A and summaries through a [`TextGenerator`].
#[derive(Clone)]
pub struct DocumentChat {
    generator: Arc<dyn TextGenerator>,
    chunker: Chunker,
    max_chunks: usize,
    max_context_chars: usize,
}

impl DocumentChat {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            chunker: Chunker::default(),
            max_chunks: 5,
            max_context_chars: 10_000,
        }
    }

    pub fn from_config(generator: Arc<dyn TextGenerator>, config: &ConversionConfig) -> Self {
        Self {
            generator,
            chunker: Chunker::new(config.chunk_size, config.chunk_overlap),
            max_chunks: config.max_chunks,
            max_context_chars: config.max_context_chars,
        }
    }

    /// The context block the model would see for `question`.
    pub fn context_for(&self, document_text: &str, question: &str) -> String {
        let chunks = self.chunker.create_chunks(document_text);
        let relevant = self
            .chunker
            .get_relevant_chunks(&chunks, question, self.max_chunks);
        debug!(
            "Selected {} of {} chunks for question",
            relevant.len(),
            chunks.len()
        );
        build_context(&relevant, self.max_context_chars)
    }

    /// Answer `question` about `document_text`, continuing `history`.
    pub async fn ask(
        &self,
        document_text: &str,
        history: &[Turn],
        question: &str,
    ) -> Result<String, Pdf2VideoError> {
        let context = self.context_for(document_text, question);
        let mut turns = history.to_vec();
        turns.push(Turn::user(question));

        let request = GenerationRequest {
            system: Some(chat_system_prompt(&context)),
            turns,
            temperature: CHAT_TEMPERATURE,
            max_tokens: CHAT_MAX_TOKENS,
        };
        let answer = self.generator.generate(&request).await?;
        info!("Answered question ({} chars of context)", context.len());
        Ok(filter_thinking(&answer))
    }

    /// Summarise the first 30 000 characters of `document_text`.
    pub async fn summarize(&self, document_text: &str, length: SummaryLength) -> Result<String, Pdf2VideoError> {
        let (document, truncated) = match document_text.char_indices().nth(SUMMARY_INPUT_CHARS) {
            Some((byte_idx, _)) => (&document_text[..byte_idx], true),
            None => (document_text, false),
        };

        let request = GenerationRequest {
            system: Some(SUMMARY_SYSTEM_PROMPT.to_string()),
            turns: vec![Turn::user(summary_prompt(length.instructions(), document, truncated))],
            temperature: CHAT_TEMPERATURE,
            max_tokens: length.max_tokens(),
        };
        let summary = self.generator.generate(&request).await?;
        Ok(filter_thinking(&summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;
    use crate::services::Role;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        requests: Mutex<Vec<GenerationRequest>>,
        reply: String,
    }

    #[async_trait]
    impl TextGenerator for Recording {
        async fn generate(&self, request: &GenerationRequest) -> Result<String, ServiceError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }
    }

    struct Failing;

    #[async_trait]
    impl TextGenerator for Failing {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String, ServiceError> {
            Err(ServiceError::Timeout { secs: 60 })
        }
    }

    #[test]
    fn filters_reasoning_blocks() {
        let raw = "<think>let me see\nhmm</think>\nThinking: step one\nThe answer is **42**.\n\n\n\nDone.";
        assert_eq!(filter_thinking(raw), "The answer is **42**.\n\nDone.");
        assert_eq!(
            filter_thinking("<REASONING>x</REASONING>ok\n```thinking\nnope\n```"),
            "ok"
        );
    }

    #[tokio::test]
    async fn ask_sends_context_history_and_question() {
        let gen = Arc::new(Recording {
            reply: "<think>x</think>Mitochondria make energy.".into(),
            ..Default::default()
        });
        let chat = DocumentChat::new(gen.clone());
        let history = vec![Turn::user("hi"), Turn::assistant("hello")];
        let answer = chat
            .ask("Mitochondria are the powerhouse of the cell.", &history, "What do mitochondria do?")
            .await
            .unwrap();
        assert_eq!(answer, "Mitochondria make energy.");

        let requests = gen.requests.lock().unwrap();
        let req = &requests[0];
        assert!(req.system.as_ref().unwrap().contains("--- Section 1 ---"));
        assert_eq!(req.turns.len(), 3);
        assert_eq!(req.turns[2].role, Role::User);
        assert_eq!(req.turns[2].content, "What do mitochondria do?");
        assert_eq!(req.temperature, 0.6);
    }

    #[tokio::test]
    async fn summary_truncates_long_documents() {
        let gen = Arc::new(Recording {
            reply: "summary".into(),
            ..Default::default()
        });
        let chat = DocumentChat::new(gen.clone());
        let doc = "é".repeat(SUMMARY_INPUT_CHARS + 10);
        chat.summarize(&doc, SummaryLength::Brief).await.unwrap();

        let requests = gen.requests.lock().unwrap();
        assert_eq!(requests[0].max_tokens, 512);
        let prompt = &requests[0].turns[0].content;
        assert!(prompt.contains("(truncated)"));
        assert_eq!(prompt.matches('é').count(), SUMMARY_INPUT_CHARS);
    }

    #[tokio::test]
    async fn generation_failure_is_surfaced() {
        let chat = DocumentChat::new(Arc::new(Failing));
        let err = chat.ask("doc", &[], "q").await.unwrap_err();
        assert!(matches!(err, Pdf2VideoError::Generation(ServiceError::Timeout { .. })));
    }

    #[test]
    fn summary_length_parsing() {
        assert_eq!("Detailed".parse::<SummaryLength>().unwrap(), SummaryLength::Detailed);
        assert_eq!(SummaryLength::Standard.max_tokens(), 1024);
        assert!("long".parse::<SummaryLength>().is_err());
    }
}
