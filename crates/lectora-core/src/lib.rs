//! Core of the Lectora document reader.
//!
//! The crate turns extracted document text into a sequence of
//! synthesizer-sized chunks, drives a platform speech engine through them one
//! utterance at a time, and maps the engine's boundary callbacks back to a
//! global word index so a UI can highlight the word being spoken.
//!
//! Platform capabilities (speech synthesis, speech recognition, text
//! extraction, key-value persistence) are consumed through traits; nothing in
//! here spawns threads or touches a real clock. Callers pass `Instant`s in and
//! pump [`session::SpeechSessionManager::run_due`] for delayed work.

pub mod chunker;
pub mod config;
pub mod controller;
pub mod document;
pub mod driver;
pub mod engine;
pub mod recognition;
pub mod session;
pub mod snapshot;
pub mod storage;
pub mod timer;
pub mod voice;
pub mod word_index;

pub use chunker::{Chunk, chunk_text};
pub use controller::{ReadingAction, ReadingController, ReadingEvent, ReadingLifecycle};
pub use engine::{EngineEvent, SpeechEngine, UtteranceId, UtteranceRequest};
pub use session::{SessionSettings, SpeechSessionManager};
pub use snapshot::{HighlightRange, ReadingPhase, ReadingSnapshot};
pub use word_index::word_index_from_char_index;
