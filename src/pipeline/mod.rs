//! Pipeline stages for document-to-video conversion.
//!
//! Each submodule implements one transformation step and knows nothing
//! about jobs or status; the [`crate::orchestrator`] sequences them.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ script ──▶ assets ──▶ narrate ──▶ frame + assemble
//! (pdfium)    (LLM)      (photos)   (TTS)       (image, ffmpeg)
//! ```
//!
//! 1. [`extract`] : PDF bytes to numbered pages with title, bullets and
//!    embedded images; blocking, runs in `spawn_blocking`
//! 2. [`script`]  : per-page teacher script; falls back to the original text
//! 3. [`assets`]  : ordered background strategies, first success wins
//! 4. [`narrate`] : per-page audio clip and duration; silent on failure
//! 5. [`frame`]   : still frame per page
//! 6. [`assemble`]: segment plans, encode, concat, atomic move
//!
//! Stages 2–4 return [`crate::model::Outcome`] and never fail the job.
//! Extraction and assembly return `Result` and do.

pub mod assemble;
pub mod assets;
pub mod extract;
pub mod frame;
pub mod narrate;
pub mod script;
