//! Overlapping text chunker with lexical relevance ranking.
//!
//! Used by [`crate::chat`] to keep the context sent to the model within a
//! fixed character budget: the document is cut into overlapping windows,
//! each window is scored against the question's keywords, and the best
//! windows are stitched into a context block.
//!
//! All offsets and lengths are in `char`s, never bytes, so a window never
//! splits a UTF-8 sequence.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").unwrap());

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "is", "at", "which", "on", "a", "an", "and", "or", "but", "in", "with", "to",
        "for", "of", "as", "by", "from", "this", "that", "what", "where", "when", "why", "how",
        "who", "can", "could", "would", "should", "do", "does", "did", "have", "has", "had", "be",
        "been", "being", "are", "was", "were", "it", "its", "they", "them", "their", "me", "you",
        "your", "about", "tell", "explain", "describe",
    ]
    .into_iter()
    .collect()
});

/// Keywords shorter than this are ignored.
const MIN_KEYWORD_LEN: usize = 3;

/// Sentence ends the chunker snaps to: the punctuation and the char after it.
const SENTENCE_BREAKS: [(char, char); 4] = [('.', ' '), ('.', '\n'), ('?', ' '), ('!', ' ')];

/// A bounded window over a document's text.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position in the original chunk sequence.
    pub index: usize,
    /// Char offset of the first char of `text` in the source text.
    pub start: usize,
    pub text: String,
    /// Relevance against the last query; 0.0 until ranked.
    pub score: f64,
}

/// Splits text into overlapping windows and ranks them against a query.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: 2000,
            overlap: 200,
        }
    }
}

impl Chunker {
    /// `overlap` is clamped below `chunk_size`; `chunk_size` is at least 1.
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            overlap: overlap.min(chunk_size - 1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into overlapping chunks.
    ///
    /// Text no longer than `chunk_size` comes back as a single chunk equal to
    /// the input. Otherwise each window is `chunk_size` chars, cut back to
    /// the last sentence end when one exists in its second half, and the
    /// next window starts `overlap` chars before the previous one ended.
    /// Chunks are trimmed.
    pub fn create_chunks(&self, text: &str) -> Vec<Chunk> {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len();

        if len <= self.chunk_size {
            return vec![Chunk {
                index: 0,
                start: 0,
                text: text.to_string(),
                score: 0.0,
            }];
        }

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let mut end = (start + self.chunk_size).min(len);

            if end < len {
                if let Some(cut) = last_sentence_break(&chars[start..end]) {
                    if cut * 2 > self.chunk_size {
                        end = start + cut + 1;
                    }
                }
            }

            let window: String = chars[start..end].iter().collect();
            let leading = window.chars().take_while(|c| c.is_whitespace()).count();
            chunks.push(Chunk {
                index: chunks.len(),
                start: start + leading,
                text: window.trim().to_string(),
                score: 0.0,
            });

            if end >= len {
                break;
            }

            let next = end - self.overlap;
            // A snapped window can be shorter than the overlap.
            start = if next > start { next } else { end };
        }

        debug!("Created {} chunks from {} characters", chunks.len(), len);
        chunks
    }

    /// Rank `chunks` against `query`, returning at most `max_chunks`.
    ///
    /// The sort is stable, so equally scored chunks keep document order. A
    /// query with no usable keywords returns the first `max_chunks` chunks.
    pub fn get_relevant_chunks(&self, chunks: &[Chunk], query: &str, max_chunks: usize) -> Vec<Chunk> {
        let keywords = extract_keywords(query);
        if keywords.is_empty() {
            return chunks.iter().take(max_chunks).cloned().collect();
        }

        let mut scored: Vec<Chunk> = chunks
            .iter()
            .map(|c| Chunk {
                score: score_chunk(&c.text, &keywords),
                ..c.clone()
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(max_chunks);

        debug!(
            "Selected {} relevant chunks from {} total",
            scored.len(),
            chunks.len()
        );
        scored
    }
}

/// Index of the punctuation char of the last sentence break in `window`.
fn last_sentence_break(window: &[char]) -> Option<usize> {
    window
        .windows(2)
        .rposition(|pair| SENTENCE_BREAKS.contains(&(pair[0], pair[1])))
}

/// Lower-cased words of at least three chars that are not stop words.
pub fn extract_keywords(query: &str) -> Vec<String> {
    let lowered = query.to_lowercase();
    WORD_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN && !STOP_WORDS.contains(*w))
        .map(str::to_string)
        .collect()
}

/// Sum over keywords of occurrences × keyword length.
///
/// Longer keywords are more specific, so they weigh more.
pub fn score_chunk(text: &str, keywords: &[String]) -> f64 {
    let lowered = text.to_lowercase();
    keywords
        .iter()
        .map(|k| (lowered.matches(k.as_str()).count() * k.chars().count()) as f64)
        .sum()
}

/// Join chunks into a context block of at most `max_chars` chars.
///
/// Each chunk is wrapped in a `--- Section N ---` marker; assembly stops at
/// the first chunk that would exceed the budget.
pub fn build_context(chunks: &[Chunk], max_chars: usize) -> String {
    let mut context = String::new();
    let mut total = 0;

    for (i, chunk) in chunks.iter().enumerate() {
        let part = format!("\n--- Section {} ---\n{}\n", i + 1, chunk.text);
        let part_len = part.chars().count();
        if total + part_len > max_chars {
            break;
        }
        context.push_str(&part);
        total += part_len;
    }

    context
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentences(n: usize) -> String {
        (0..n)
            .map(|i| format!("Sentence number {i} talks about nothing much."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn short_text_is_single_chunk() {
        let chunker = Chunker::new(100, 10);
        let chunks = chunker.create_chunks("  short text  ");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "  short text  ");
    }

    #[test]
    fn text_exactly_chunk_size_is_single_chunk() {
        let text = "x".repeat(50);
        let chunks = Chunker::new(50, 5).create_chunks(&text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn long_text_chunks_are_bounded() {
        let text = sentences(200);
        let chunker = Chunker::new(300, 50);
        let chunks = chunker.create_chunks(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 300, "chunk {} too long", c.index);
            assert!(!c.text.is_empty());
        }
    }

    #[test]
    fn chunks_snap_to_sentence_end() {
        let text = sentences(50);
        let chunks = Chunker::new(300, 50).create_chunks(&text);
        for c in &chunks[..chunks.len() - 1] {
            assert!(c.text.ends_with('.'), "chunk {} = {:?}", c.index, c.text);
        }
    }

    #[test]
    fn consecutive_chunks_overlap() {
        // No sentence breaks: windows are exact, so the overlap is exact.
        let text: String = (0..1000).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunker = Chunker::new(100, 20);
        let chunks = chunker.create_chunks(&text);
        for pair in chunks.windows(2) {
            let prev_end = pair[0].start + pair[0].text.chars().count();
            assert_eq!(prev_end - pair[1].start, 20);
        }
        let last = chunks.last().unwrap();
        assert_eq!(last.start + last.text.chars().count(), 1000);
    }

    #[test]
    fn start_points_at_trimmed_text() {
        let text = format!("{}. {}", "a".repeat(60), "b".repeat(100));
        let chars: Vec<char> = text.chars().collect();
        let chunks = Chunker::new(80, 0).create_chunks(&text);
        assert!(chunks.len() > 1);
        for c in &chunks {
            let at: String = chars[c.start..].iter().take(c.text.chars().count()).collect();
            assert_eq!(at, c.text, "chunk {}", c.index);
        }
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let text = "é".repeat(450);
        let chunks = Chunker::new(100, 10).create_chunks(&text);
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 100));
    }

    #[test]
    fn keywords_drop_stop_words_and_short_words() {
        let kws = extract_keywords("What is the Photosynthesis rate of an oak?");
        assert_eq!(kws, vec!["photosynthesis", "rate", "oak"]);
    }

    #[test]
    fn score_weights_by_length() {
        let kws = vec!["cell".to_string(), "mitochondria".to_string()];
        let score = score_chunk("The cell has mitochondria. Cell walls.", &kws);
        assert_eq!(score, (2 * 4 + 12) as f64);
    }

    #[test]
    fn unique_keyword_chunk_ranks_first() {
        let chunker = Chunker::default();
        let chunks: Vec<Chunk> = ["alpha text", "beta text", "gamma zebra text"]
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk {
                index: i,
                start: 0,
                text: t.to_string(),
                score: 0.0,
            })
            .collect();
        let ranked = chunker.get_relevant_chunks(&chunks, "tell me about zebra", 2);
        assert_eq!(ranked[0].index, 2);
        assert!(ranked[0].score > 0.0);
    }

    #[test]
    fn ties_keep_document_order() {
        let chunker = Chunker::default();
        let chunks: Vec<Chunk> = (0..4)
            .map(|i| Chunk {
                index: i,
                start: 0,
                text: "same words here".into(),
                score: 0.0,
            })
            .collect();
        let ranked = chunker.get_relevant_chunks(&chunks, "words", 3);
        let order: Vec<usize> = ranked.iter().map(|c| c.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn no_keywords_returns_first_chunks() {
        let chunker = Chunker::default();
        let chunks: Vec<Chunk> = (0..8)
            .map(|i| Chunk {
                index: i,
                start: 0,
                text: format!("chunk {i}"),
                score: 0.0,
            })
            .collect();
        let ranked = chunker.get_relevant_chunks(&chunks, "what is it?", 5);
        let order: Vec<usize> = ranked.iter().map(|c| c.index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn context_respects_budget() {
        let chunks: Vec<Chunk> = (0..3)
            .map(|i| Chunk {
                index: i,
                start: 0,
                text: "x".repeat(40),
                score: 0.0,
            })
            .collect();
        let ctx = build_context(&chunks, 120);
        assert!(ctx.contains("--- Section 1 ---"));
        assert!(ctx.contains("--- Section 2 ---"));
        assert!(!ctx.contains("--- Section 3 ---"));
        assert!(ctx.chars().count() <= 120);
    }
}
