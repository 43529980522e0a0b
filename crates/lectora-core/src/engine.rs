//! Speech synthesis engine interface.
//!
//! The engine is a process-wide exclusive resource: it plays at most one
//! utterance, and speaking anything new silences whatever it was doing.
//! Lifecycle events are delivered by the host to
//! [`crate::session::SpeechSessionManager::handle_engine_event`] tagged with
//! the utterance they belong to.

use crate::voice::Voice;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UtteranceId(pub u64);

impl fmt::Display for UtteranceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "utt-{}", self.0)
    }
}

/// Everything the engine needs to vocalize one string. Voice settings are
/// captured when the request is built and never re-applied mid-utterance.
#[derive(Debug, Clone, PartialEq)]
pub struct UtteranceRequest {
    pub id: UtteranceId,
    pub text: String,
    pub voice: Option<Voice>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl UtteranceRequest {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    Word,
    Sentence,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisErrorReason {
    Interrupted,
    Canceled,
    AudioBusy,
    SynthesisFailed,
    Other(String),
}

impl SynthesisErrorReason {
    /// Parse the platform's error code (`"interrupted"`, `"audio-busy"`, ...).
    pub fn from_code(code: &str) -> Self {
        match code {
            "interrupted" => Self::Interrupted,
            "canceled" => Self::Canceled,
            "audio-busy" => Self::AudioBusy,
            "synthesis-failed" => Self::SynthesisFailed,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SynthesisErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Interrupted => "interrupted",
            Self::Canceled => "canceled",
            Self::AudioBusy => "audio-busy",
            Self::SynthesisFailed => "synthesis-failed",
            Self::Other(code) => code.as_str(),
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Start,
    /// `char_index` counts chars from the start of the utterance text.
    Boundary {
        kind: BoundaryKind,
        char_index: usize,
    },
    Pause,
    Resume,
    End,
    Error(SynthesisErrorReason),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("speech synthesis is not supported on this platform")]
    Unsupported,
    #[error("speech engine rejected {id}: {reason}")]
    Rejected { id: UtteranceId, reason: String },
    #[error("speech engine control failed: {0}")]
    Control(String),
}

pub trait SpeechEngine {
    fn is_supported(&self) -> bool;

    /// Voices currently known to the platform; may be empty until the
    /// platform finishes populating its list.
    fn voices(&self) -> Vec<Voice>;

    fn speak(&mut self, request: &UtteranceRequest) -> Result<(), EngineError>;

    /// Drop the active utterance and anything queued behind it.
    fn cancel(&mut self);

    fn pause(&mut self) -> Result<(), EngineError>;

    fn resume(&mut self) -> Result<(), EngineError>;

    /// Whether the engine is currently holding an utterance.
    fn is_speaking(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_round_trip_through_display() {
        for code in ["interrupted", "canceled", "audio-busy", "synthesis-failed", "network"] {
            assert_eq!(SynthesisErrorReason::from_code(code).to_string(), code);
        }
        assert_eq!(
            SynthesisErrorReason::from_code("interrupted"),
            SynthesisErrorReason::Interrupted
        );
    }
}
