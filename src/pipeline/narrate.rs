//! Narration: script text → audio clip with a known duration.

use crate::error::SoftMiss;
use crate::model::{AudioClip, Outcome};
use crate::services::{MediaProbe, SpeechEngine};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+").unwrap());

/// Synthesises per-page narration and resolves its duration.
///
/// Duration comes from the engine if it reports one, else from the optional
/// [`MediaProbe`], else from the word count at `words_per_minute`.
#[derive(Clone)]
pub struct Narrator {
    engine: Arc<dyn SpeechEngine>,
    probe: Option<Arc<dyn MediaProbe>>,
    words_per_minute: f64,
}

impl Narrator {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        Self {
            engine,
            probe: None,
            words_per_minute: 150.0,
        }
    }

    pub fn with_probe(mut self, probe: Arc<dyn MediaProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_words_per_minute(mut self, wpm: f64) -> Self {
        self.words_per_minute = wpm;
        self
    }

    /// Synthesise `text` into `dir/page_{page}.{ext}`.
    ///
    /// Blank text is a silent page (`Ready(None)`); an engine or write
    /// failure is `Degraded(None)` for this page only.
    pub async fn synthesize(
        &self,
        text: &str,
        page: usize,
        voice: &str,
        dir: &Path,
    ) -> Outcome<Option<AudioClip>> {
        if text.trim().is_empty() {
            debug!("Page {}: no text, silent segment", page);
            return Outcome::Ready(None);
        }

        let speech = match self.engine.synthesize(text, voice).await {
            Ok(s) => s,
            Err(e) => {
                warn!("Page {}: narration failed: {}", page, e);
                return Outcome::degraded(
                    None,
                    SoftMiss::NarrationFailed {
                        page,
                        detail: e.to_string(),
                    },
                );
            }
        };

        let path = dir.join(format!("page_{}.{}", page, speech.extension));
        if let Err(e) = tokio::fs::write(&path, &speech.audio).await {
            warn!("Page {}: could not write audio: {}", page, e);
            return Outcome::degraded(
                None,
                SoftMiss::NarrationFailed {
                    page,
                    detail: format!("writing {}: {}", path.display(), e),
                },
            );
        }

        let duration_secs = match speech.duration_secs {
            Some(d) => d,
            None => self.measure(&path, text).await,
        };
        debug!("Page {}: {:.2}s of narration", page, duration_secs);

        Outcome::Ready(Some(AudioClip {
            path,
            duration_secs,
        }))
    }

    async fn measure(&self, path: &Path, text: &str) -> f64 {
        if let Some(probe) = &self.probe {
            match probe.duration_secs(path).await {
                Ok(d) if d > 0.0 => return d,
                Ok(_) => debug!("Probe reported zero duration for {}", path.display()),
                Err(e) => debug!("Probe failed for {}: {}", path.display(), e),
            }
        }
        estimate_duration(text, self.words_per_minute)
    }
}

/// Seconds needed to speak `text` at `words_per_minute`.
pub fn estimate_duration(text: &str, words_per_minute: f64) -> f64 {
    if words_per_minute <= 0.0 {
        return 0.0;
    }
    let words = WORD_RE.find_iter(text).count() as f64;
    words / words_per_minute * 60.0
}
