//! Command-line reader: loads a document and reads it aloud on the console
//! engine, highlighting progress through the log.
//!
//! Usage: `lectora [--config PATH] (<file> | --text "...")`

mod cancellation;
mod console_engine;

use crate::cancellation::CancellationToken;
use crate::console_engine::ConsoleEngine;
use anyhow::{Context, Result, anyhow, bail};
use lectora_core::config::{AppConfig, load_config};
use lectora_core::document::{
    Document, DocumentKind, DocumentLimits, PlainTextExtractor, TextExtractor, import_document,
};
use lectora_core::storage::{FileStore, SavedDocument, SavedDocuments};
use lectora_core::{SessionSettings, SpeechSessionManager};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

const DEFAULT_CONFIG_PATH: &str = "conf/config.toml";
const MAX_IDLE_WAIT: Duration = Duration::from_millis(20);

#[derive(Debug)]
enum Source {
    File(PathBuf),
    Text(String),
}

#[derive(Debug)]
struct Args {
    config_path: PathBuf,
    source: Source,
}

fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle) {
        error!("{err:?}");
        std::process::exit(1);
    }
}

fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let args = parse_args(env::args().skip(1))?;
    let config = load_config(&args.config_path);
    set_log_level(reload_handle, config.logging.log_level.as_filter_str());
    info!(
        config = %args.config_path.display(),
        level = %config.logging.log_level,
        "Starting lectora"
    );

    let document = load_source(&args.source, &config)?;
    info!(
        title = document.title(),
        kind = %document.kind(),
        chars = document.text().chars().count(),
        "Document ready"
    );

    let mut store = FileStore::new(config.storage.cache_path());
    let mut saved = SavedDocuments::load(&store);
    if saved.add(SavedDocument::from(&document)) {
        saved.save(&mut store);
        info!(saved = saved.documents().len(), "Remembered document");
    }

    let mut manager = SpeechSessionManager::new(
        ConsoleEngine::new(config.speech.words_per_minute),
        SessionSettings::from(&config),
        Box::new(store),
    );
    manager.initialize(Instant::now());
    if let Some(voice) = manager.voice_config().selected_voice() {
        info!(voice = %voice.name, lang = %voice.lang, "Voice selected");
    }
    manager.load_document(document);
    manager.start_reading_document(Instant::now());
    if !manager.is_reading_document() {
        bail!("Nothing to read in the document");
    }

    let cancel = CancellationToken::on_ctrl_c();
    read_until_done(&mut manager, &cancel);
    info!(phase = ?manager.reading_phase(), "Reading finished");
    Ok(())
}

fn read_until_done(manager: &mut SpeechSessionManager<ConsoleEngine>, cancel: &CancellationToken) {
    let mut last_word = None;
    loop {
        if cancel.is_cancelled() {
            manager.stop();
            break;
        }
        let now = Instant::now();
        for (id, event) in manager.engine_mut().poll(now) {
            manager.handle_engine_event(id, event, now);
        }
        manager.run_due(now);
        manager.poll_engine();

        let word = manager.current_word_index();
        if word != last_word {
            if let Some(snapshot) = word.map(|_| manager.snapshot()) {
                debug!(
                    chunk = snapshot.current_chunk_index,
                    word = ?snapshot.current_word_index,
                    start = ?snapshot.highlight_start_index,
                    end = ?snapshot.highlight_end_index,
                    "Highlight moved"
                );
            }
            last_word = word;
        }

        if !manager.is_reading_document() {
            break;
        }
        std::thread::sleep(idle_wait(manager, now));
    }
}

/// Sleep until the session or the engine next has work, capped so Ctrl-C is
/// noticed promptly.
fn idle_wait(manager: &SpeechSessionManager<ConsoleEngine>, now: Instant) -> Duration {
    let wake = [manager.next_deadline(), manager.engine().next_wake()]
        .into_iter()
        .flatten()
        .min();
    match wake {
        Some(at) => at.saturating_duration_since(now).min(MAX_IDLE_WAIT),
        None => MAX_IDLE_WAIT,
    }
}

fn load_source(source: &Source, config: &AppConfig) -> Result<Document> {
    match source {
        Source::Text(text) => Ok(Document::manual("Texto manual", text.clone())),
        Source::File(path) => {
            let bytes =
                fs::read(path).with_context(|| format!("Reading {}", path.display()))?;
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            if is_plain_text(path) {
                let extracted = PlainTextExtractor
                    .extract(&bytes)
                    .with_context(|| format!("Extracting text from {name}"))?;
                return Ok(Document::from_extracted(name, DocumentKind::Manual, extracted));
            }
            let limits = DocumentLimits::from(&config.documents);
            import_document(&name, "", &bytes, &PlainTextExtractor, &limits)
                .with_context(|| format!("Importing {name}"))
        }
    }
}

fn is_plain_text(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("txt"))
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    const USAGE: &str = "Usage: lectora [--config PATH] (<file> | --text \"...\")";
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_PATH);
    let mut source = None;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or_else(|| anyhow!("--config needs a path\n{USAGE}"))?;
                config_path = PathBuf::from(path);
            }
            "--text" => {
                let text = args.next().ok_or_else(|| anyhow!("--text needs a value\n{USAGE}"))?;
                source = Some(Source::Text(text));
            }
            "-h" | "--help" => bail!("{USAGE}"),
            other if other.starts_with("--") => bail!("Unknown option {other}\n{USAGE}"),
            other => {
                let path = PathBuf::from(other);
                if !path.exists() {
                    return Err(anyhow!("File not found: {}", path.display()));
                }
                source = Some(Source::File(path));
            }
        }
    }
    let source = source.ok_or_else(|| anyhow!(USAGE))?;
    Ok(Args {
        config_path,
        source,
    })
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback_filter());
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(filter_layer),
        )
        .init();
    debug!("Logging initialized; override level with logging.log_level or RUST_LOG");
    handle
}

/// Filter used when `RUST_LOG` is unset or a configured level fails to parse.
fn fallback_filter() -> EnvFilter {
    EnvFilter::new("debug")
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| fallback_filter());
    if let Err(err) = handle.modify(|filter| *filter = parsed) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        debug!(%level, "Applied log level from config");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|arg| arg.to_string()))
    }

    #[test]
    fn text_source_with_custom_config() {
        let parsed = args(&["--config", "otra.toml", "--text", "Hola"]).unwrap();
        assert_eq!(parsed.config_path, PathBuf::from("otra.toml"));
        assert!(matches!(parsed.source, Source::Text(ref text) if text == "Hola"));
    }

    #[test]
    fn missing_source_is_an_error() {
        assert!(args(&[]).is_err());
        assert!(args(&["--config", "x.toml"]).is_err());
        assert!(args(&["--text"]).is_err());
        assert!(args(&["--bogus"]).is_err());
    }

    #[test]
    fn logging_falls_back_to_debug() {
        assert_eq!(fallback_filter().to_string(), "debug");
    }

    #[test]
    fn missing_file_is_reported() {
        let err = args(&["no/such/file.txt"]).unwrap_err();
        assert!(err.to_string().contains("File not found"));
    }

    #[test]
    fn unsupported_files_are_rejected_on_import() {
        let config = AppConfig::default();
        let dir = std::env::temp_dir().join(format!("lectora-main-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("notas.md");
        fs::write(&path, "hola").unwrap();
        assert!(load_source(&Source::File(path.clone()), &config).is_err());

        let txt = dir.join("notas.txt");
        fs::write(&txt, "  hola mundo \n").unwrap();
        let document = load_source(&Source::File(txt), &config).unwrap();
        assert_eq!(document.text(), "hola mundo");
        assert_eq!(document.title(), "notas.txt");
        let _ = fs::remove_dir_all(&dir);
    }
}
