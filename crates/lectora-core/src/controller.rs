//! Continuous reading state machine.
//!
//! The controller owns the reading session (chunks, position, highlight) and
//! never touches the engine itself: every input arrives as a
//! [`ReadingEvent`] through [`ReadingController::transition`], which returns
//! the [`ReadingAction`]s the session manager must carry out.

use crate::chunker::Chunk;
use crate::snapshot::{HighlightRange, ReadingPhase};
use crate::word_index::{word_end_index, word_index_from_char_index};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadingLifecycle {
    #[default]
    Idle,
    Chunking,
    SpeakingChunk {
        chunk_index: usize,
    },
    Paused {
        chunk_index: usize,
        /// The paused chunk already ended; resuming must speak `chunk_index`
        /// afresh instead of resuming the engine.
        resume_with_speak: bool,
    },
    Finished,
}

impl ReadingLifecycle {
    pub fn phase(self) -> ReadingPhase {
        match self {
            Self::Idle => ReadingPhase::Idle,
            Self::Chunking => ReadingPhase::Chunking,
            Self::SpeakingChunk { .. } => ReadingPhase::SpeakingChunk,
            Self::Paused { .. } => ReadingPhase::Paused,
            Self::Finished => ReadingPhase::Finished,
        }
    }

    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Chunking | Self::SpeakingChunk { .. } | Self::Paused { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadingEvent {
    StartRequested,
    ChunksProduced(Vec<Chunk>),
    /// Word boundary reported by the engine, `char_index` relative to the chunk.
    Boundary {
        chunk_index: usize,
        char_index: usize,
    },
    UtteranceEnded {
        chunk_index: usize,
    },
    PauseRequested,
    ResumeRequested,
    StopRequested,
    /// The engine stopped speaking for reasons outside the session.
    ExternalInterruption,
    /// The document text was replaced underneath the session.
    DocumentChanged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadingAction {
    CancelSpeech,
    ChunkDocument,
    SpeakChunk { chunk_index: usize, text: String },
    PauseSpeech,
    ResumeSpeech,
}

#[derive(Debug, Default)]
pub struct ReadingController {
    lifecycle: ReadingLifecycle,
    chunks: Vec<Chunk>,
    current_chunk_index: usize,
    highlight: Option<HighlightRange>,
    current_word_index: Option<usize>,
}

impl ReadingController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lifecycle(&self) -> ReadingLifecycle {
        self.lifecycle
    }

    pub fn phase(&self) -> ReadingPhase {
        self.lifecycle.phase()
    }

    pub fn is_reading(&self) -> bool {
        self.lifecycle.is_active()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn current_chunk_index(&self) -> usize {
        self.current_chunk_index
    }

    pub fn highlight(&self) -> Option<HighlightRange> {
        self.highlight
    }

    pub fn current_word_index(&self) -> Option<usize> {
        self.current_word_index
    }

    /// Apply `event` against the document text being read.
    pub fn transition(&mut self, event: ReadingEvent, full_text: &str) -> Vec<ReadingAction> {
        match event {
            ReadingEvent::StartRequested => self.on_start_requested(full_text),
            ReadingEvent::ChunksProduced(chunks) => self.on_chunks_produced(chunks),
            ReadingEvent::Boundary {
                chunk_index,
                char_index,
            } => {
                self.on_boundary(chunk_index, char_index, full_text);
                Vec::new()
            }
            ReadingEvent::UtteranceEnded { chunk_index } => self.on_utterance_ended(chunk_index),
            ReadingEvent::PauseRequested => self.on_pause_requested(),
            ReadingEvent::ResumeRequested => self.on_resume_requested(),
            ReadingEvent::StopRequested => self.on_stop(true),
            ReadingEvent::ExternalInterruption => self.on_stop(false),
            ReadingEvent::DocumentChanged => self.on_stop(true),
        }
    }

    fn teardown(&mut self) {
        self.chunks.clear();
        self.current_chunk_index = 0;
        self.highlight = None;
        self.current_word_index = None;
    }

    fn speak_action(&self, chunk_index: usize) -> Option<ReadingAction> {
        self.chunks.get(chunk_index).map(|chunk| ReadingAction::SpeakChunk {
            chunk_index,
            text: chunk.text.clone(),
        })
    }

    fn on_start_requested(&mut self, full_text: &str) -> Vec<ReadingAction> {
        if full_text.trim().is_empty() {
            warn!("Ignoring start request: document has no text");
            return Vec::new();
        }
        self.teardown();
        self.lifecycle = ReadingLifecycle::Chunking;
        info!(chars = full_text.chars().count(), "Starting continuous reading");
        vec![ReadingAction::CancelSpeech, ReadingAction::ChunkDocument]
    }

    fn on_chunks_produced(&mut self, chunks: Vec<Chunk>) -> Vec<ReadingAction> {
        if self.lifecycle != ReadingLifecycle::Chunking {
            debug!(lifecycle = ?self.lifecycle, "Ignoring chunks outside of chunking");
            return Vec::new();
        }
        if chunks.is_empty() {
            warn!("Chunker produced no chunks; returning to idle");
            self.teardown();
            self.lifecycle = ReadingLifecycle::Idle;
            return Vec::new();
        }

        info!(chunk_count = chunks.len(), "Document chunked");
        self.chunks = chunks;
        self.current_chunk_index = 0;
        self.lifecycle = ReadingLifecycle::SpeakingChunk { chunk_index: 0 };
        self.speak_action(0).into_iter().collect()
    }

    fn on_boundary(&mut self, chunk_index: usize, char_index: usize, full_text: &str) {
        let ReadingLifecycle::SpeakingChunk { chunk_index: current } = self.lifecycle else {
            debug!(chunk_index, "Ignoring boundary while not speaking");
            return;
        };
        if current != chunk_index {
            debug!(chunk_index, current, "Ignoring boundary for stale chunk");
            return;
        }
        let Some(chunk) = self.chunks.get(chunk_index) else {
            return;
        };

        let global = chunk.global_start_index + char_index;
        let word_index = word_index_from_char_index(global, full_text);
        self.current_word_index = Some(word_index);
        // A boundary on a break character keeps the previous highlight.
        let end = word_end_index(full_text, global);
        if end != global {
            self.highlight = Some(HighlightRange { start: global, end });
        }
        debug!(chunk_index, char_index, global, word_index, "Word boundary");
    }

    fn on_utterance_ended(&mut self, chunk_index: usize) -> Vec<ReadingAction> {
        let (current, paused) = match self.lifecycle {
            ReadingLifecycle::SpeakingChunk { chunk_index } => (chunk_index, false),
            ReadingLifecycle::Paused { chunk_index, .. } => (chunk_index, true),
            _ => {
                debug!(chunk_index, "Ignoring chunk end outside of reading");
                return Vec::new();
            }
        };
        if current != chunk_index {
            debug!(chunk_index, current, "Ignoring end of stale chunk");
            return Vec::new();
        }

        let next = chunk_index + 1;
        if next >= self.chunks.len() {
            info!(chunk_count = self.chunks.len(), "Finished reading document");
            self.teardown();
            self.lifecycle = ReadingLifecycle::Finished;
            return Vec::new();
        }

        self.current_chunk_index = next;
        if paused {
            debug!(next, "Chunk ended while paused; holding next chunk");
            self.lifecycle = ReadingLifecycle::Paused {
                chunk_index: next,
                resume_with_speak: true,
            };
            return Vec::new();
        }
        debug!(next, total = self.chunks.len(), "Advancing to next chunk");
        self.lifecycle = ReadingLifecycle::SpeakingChunk { chunk_index: next };
        self.speak_action(next).into_iter().collect()
    }

    fn on_pause_requested(&mut self) -> Vec<ReadingAction> {
        let ReadingLifecycle::SpeakingChunk { chunk_index } = self.lifecycle else {
            return Vec::new();
        };
        self.lifecycle = ReadingLifecycle::Paused {
            chunk_index,
            resume_with_speak: false,
        };
        vec![ReadingAction::PauseSpeech]
    }

    fn on_resume_requested(&mut self) -> Vec<ReadingAction> {
        let ReadingLifecycle::Paused {
            chunk_index,
            resume_with_speak,
        } = self.lifecycle
        else {
            return Vec::new();
        };
        self.lifecycle = ReadingLifecycle::SpeakingChunk { chunk_index };
        if resume_with_speak {
            self.speak_action(chunk_index).into_iter().collect()
        } else {
            vec![ReadingAction::ResumeSpeech]
        }
    }

    fn on_stop(&mut self, cancel: bool) -> Vec<ReadingAction> {
        let was_active = self.lifecycle.is_active();
        if was_active {
            info!(lifecycle = ?self.lifecycle, cancel, "Stopping continuous reading");
        }
        self.teardown();
        self.lifecycle = ReadingLifecycle::Idle;
        if was_active && cancel {
            vec![ReadingAction::CancelSpeech]
        } else {
            Vec::new()
        }
    }
}
