use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration; each TOML table maps to one section struct.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub reading: ReadingConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "crate::config::defaults::default_log_level")]
    pub log_level: LogLevel,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: crate::config::defaults::default_log_level(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReadingConfig {
    #[serde(default = "crate::config::defaults::default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    #[serde(default = "crate::config::defaults::default_break_tolerance")]
    pub break_tolerance: f32,
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: crate::config::defaults::default_max_chunk_chars(),
            break_tolerance: crate::config::defaults::default_break_tolerance(),
        }
    }
}

impl ReadingConfig {
    /// Chunk size actually used; zero would never make progress.
    pub fn effective_max_chunk_chars(&self) -> usize {
        self.max_chunk_chars.max(1)
    }

    pub fn effective_break_tolerance(&self) -> f32 {
        if self.break_tolerance.is_nan() {
            crate::config::defaults::default_break_tolerance()
        } else {
            self.break_tolerance.clamp(0.0, 1.0)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SpeechConfig {
    #[serde(default = "crate::config::defaults::default_cancel_settle_ms")]
    pub cancel_settle_ms: u64,
    #[serde(default = "crate::config::defaults::default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "crate::config::defaults::default_retry_max_chars")]
    pub retry_max_chars: usize,
    #[serde(default = "crate::config::defaults::default_voice_poll_attempts")]
    pub voice_poll_attempts: u32,
    #[serde(default = "crate::config::defaults::default_voice_poll_interval_ms")]
    pub voice_poll_interval_ms: u64,
    #[serde(default = "crate::config::defaults::default_preferred_language")]
    pub preferred_language: String,
    #[serde(default = "crate::config::defaults::default_rate")]
    pub rate: f32,
    #[serde(default = "crate::config::defaults::default_pitch")]
    pub pitch: f32,
    #[serde(default = "crate::config::defaults::default_volume")]
    pub volume: f32,
    /// Pacing for engines that simulate speech, scaled by `rate`.
    #[serde(default = "crate::config::defaults::default_words_per_minute")]
    pub words_per_minute: u32,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            cancel_settle_ms: crate::config::defaults::default_cancel_settle_ms(),
            retry_delay_ms: crate::config::defaults::default_retry_delay_ms(),
            retry_max_chars: crate::config::defaults::default_retry_max_chars(),
            voice_poll_attempts: crate::config::defaults::default_voice_poll_attempts(),
            voice_poll_interval_ms: crate::config::defaults::default_voice_poll_interval_ms(),
            preferred_language: crate::config::defaults::default_preferred_language(),
            rate: crate::config::defaults::default_rate(),
            pitch: crate::config::defaults::default_pitch(),
            volume: crate::config::defaults::default_volume(),
            words_per_minute: crate::config::defaults::default_words_per_minute(),
        }
    }
}

impl SpeechConfig {
    pub fn cancel_settle(&self) -> Duration {
        Duration::from_millis(self.cancel_settle_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn voice_poll_interval(&self) -> Duration {
        Duration::from_millis(self.voice_poll_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DocumentsConfig {
    #[serde(default = "crate::config::defaults::default_max_file_size_mb")]
    pub max_file_size_mb: u64,
    #[serde(default = "crate::config::defaults::default_max_pdf_pages")]
    pub max_pdf_pages: usize,
    #[serde(default = "crate::config::defaults::default_max_word_pages")]
    pub max_word_pages: usize,
    #[serde(default = "crate::config::defaults::default_chars_per_page_estimate")]
    pub chars_per_page_estimate: usize,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: crate::config::defaults::default_max_file_size_mb(),
            max_pdf_pages: crate::config::defaults::default_max_pdf_pages(),
            max_word_pages: crate::config::defaults::default_max_word_pages(),
            chars_per_page_estimate: crate::config::defaults::default_chars_per_page_estimate(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "crate::config::defaults::default_cache_dir")]
    pub cache_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: crate::config::defaults::default_cache_dir(),
        }
    }
}

impl StorageConfig {
    pub fn cache_path(&self) -> PathBuf {
        PathBuf::from(&self.cache_dir)
    }
}

/// Supported logging verbosity levels.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    #[default]
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_filter_str())
    }
}

impl LogLevel {
    pub fn as_filter_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}
