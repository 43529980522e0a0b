//! Speech-to-text dictation.

use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionSettings {
    pub lang: String,
    pub continuous: bool,
    pub interim_results: bool,
    pub max_alternatives: u32,
}

impl Default for RecognitionSettings {
    fn default() -> Self {
        Self {
            lang: "es-ES".to_string(),
            continuous: true,
            interim_results: true,
            max_alternatives: 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RecognitionError {
    #[error("speech recognition is not supported on this platform")]
    Unsupported,
    #[error("speech recognition failed to start: {0}")]
    Start(String),
}

pub trait RecognitionEngine {
    fn is_supported(&self) -> bool;
    fn start(&mut self, settings: &RecognitionSettings) -> Result<(), RecognitionError>;
    fn stop(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognitionAlternative {
    pub transcript: String,
    pub is_final: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionErrorReason {
    NoSpeech,
    AudioCapture,
    NotAllowed,
    Network,
    Other(String),
}

impl RecognitionErrorReason {
    pub fn from_code(code: &str) -> Self {
        match code {
            "no-speech" => Self::NoSpeech,
            "audio-capture" => Self::AudioCapture,
            "not-allowed" => Self::NotAllowed,
            "network" => Self::Network,
            other => Self::Other(other.to_string()),
        }
    }

    /// Message suitable for announcing to the user.
    pub fn message(&self) -> &'static str {
        match self {
            Self::NoSpeech => "No speech was detected",
            Self::AudioCapture => "Could not access the microphone",
            Self::NotAllowed => "Microphone permission denied",
            Self::Network => "Network error during speech recognition",
            Self::Other(_) => "Speech recognition error",
        }
    }
}

impl fmt::Display for RecognitionErrorReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            Self::NoSpeech => "no-speech",
            Self::AudioCapture => "audio-capture",
            Self::NotAllowed => "not-allowed",
            Self::Network => "network",
            Self::Other(code) => code.as_str(),
        };
        write!(f, "{code}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Started,
    /// `results` holds every result of the session so far; only those from
    /// `result_index` onward are new.
    Result {
        result_index: usize,
        results: Vec<RecognitionAlternative>,
    },
    Error(RecognitionErrorReason),
    Ended,
}

#[derive(Debug, Default)]
pub struct Dictation {
    settings: RecognitionSettings,
    is_listening: bool,
    transcript: String,
    last_error: Option<RecognitionErrorReason>,
}

impl Dictation {
    pub fn new(settings: RecognitionSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn is_listening(&self) -> bool {
        self.is_listening
    }

    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn last_error(&self) -> Option<&RecognitionErrorReason> {
        self.last_error.as_ref()
    }

    /// Start a fresh dictation; does nothing while already listening.
    pub fn start_listening<R: RecognitionEngine>(&mut self, engine: &mut R) -> bool {
        if self.is_listening || !engine.is_supported() {
            return false;
        }
        self.transcript.clear();
        self.last_error = None;
        match engine.start(&self.settings) {
            Ok(()) => {
                self.is_listening = true;
                true
            }
            Err(err) => {
                warn!("Could not start dictation: {err}");
                false
            }
        }
    }

    pub fn stop_listening<R: RecognitionEngine>(&mut self, engine: &mut R) -> bool {
        if !self.is_listening {
            return false;
        }
        engine.stop();
        self.is_listening = false;
        true
    }

    pub fn handle_event(&mut self, event: RecognitionEvent) {
        match event {
            RecognitionEvent::Started => info!("Dictation started"),
            RecognitionEvent::Result {
                result_index,
                results,
            } => {
                let finished: String = results
                    .iter()
                    .skip(result_index)
                    .filter(|result| result.is_final)
                    .map(|result| result.transcript.as_str())
                    .collect();
                if !finished.is_empty() {
                    debug!(chars = finished.chars().count(), "Dictation transcript updated");
                    self.transcript = finished;
                }
            }
            RecognitionEvent::Error(reason) => {
                warn!(%reason, "Dictation error: {}", reason.message());
                self.is_listening = false;
                self.last_error = Some(reason);
            }
            RecognitionEvent::Ended => {
                info!("Dictation ended");
                self.is_listening = false;
            }
        }
    }
}
