use super::models::AppConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load configuration from the given path, falling back to defaults on error.
pub fn load_config(path: &Path) -> AppConfig {
    let contents = match fs::read_to_string(path) {
        Ok(data) => {
            info!(path = %path.display(), "Loaded base config");
            data
        }
        Err(err) => {
            warn!(
                path = %path.display(),
                "Falling back to default config: {err}"
            );
            return AppConfig::default();
        }
    };

    match parse_config(&contents) {
        Ok(cfg) => {
            debug!("Parsed configuration from disk");
            cfg
        }
        Err(err) => {
            warn!(path = %path.display(), "Invalid config TOML: {err:#}");
            AppConfig::default()
        }
    }
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    toml::from_str(contents).context("Parsing config TOML")
}

pub fn serialize_config(config: &AppConfig) -> Result<String> {
    toml::to_string(config).context("Serializing config TOML")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.reading.max_chunk_chars, 500);
        assert_eq!(config.speech.preferred_language, "es");
        assert_eq!(config.documents.max_pdf_pages, 3000);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = parse_config(
            r#"
            [logging]
            log_level = "warn"

            [speech]
            rate = 1.5
            "#,
        )
        .unwrap();
        assert_eq!(config.logging.log_level, LogLevel::Warn);
        assert_eq!(config.speech.rate, 1.5);
        assert_eq!(config.speech.retry_max_chars, 200);
        assert_eq!(config.storage.cache_dir, ".cache");
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(parse_config("[speech\nrate = ").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Path::new("does/not/exist/config.toml"));
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn serialized_config_parses_back() {
        let mut config = AppConfig::default();
        config.reading.max_chunk_chars = 320;
        config.speech.preferred_language = "en".to_string();
        let text = serialize_config(&config).unwrap();
        assert_eq!(parse_config(&text).unwrap(), config);
    }

    #[test]
    fn out_of_range_reading_values_are_clamped() {
        let config = parse_config("[reading]\nmax_chunk_chars = 0\nbreak_tolerance = 3.0").unwrap();
        assert_eq!(config.reading.effective_max_chunk_chars(), 1);
        assert_eq!(config.reading.effective_break_tolerance(), 1.0);
    }
}
