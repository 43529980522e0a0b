//! Configuration for the reader.
//!
//! Settings are loaded from `conf/config.toml` if present. Missing tables or
//! fields fall back to defaults, and an unreadable or invalid file yields the
//! default configuration so the reader can still start.

mod defaults;
mod io;
mod models;

pub use io::{load_config, parse_config, serialize_config};
pub use models::{
    AppConfig, DocumentsConfig, LogLevel, LoggingConfig, ReadingConfig, SpeechConfig,
    StorageConfig,
};
