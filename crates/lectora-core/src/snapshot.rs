//! Read-only view of the reading session for the UI layer.
//!
//! These types are serialized to the web front end and exported as
//! TypeScript bindings with `ts-rs`.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[ts(export)]
pub struct HighlightRange {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ReadingPhase {
    #[default]
    Idle,
    Chunking,
    SpeakingChunk,
    Paused,
    Finished,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct VoiceSummary {
    pub name: String,
    pub lang: String,
    pub region: String,
    pub local_service: bool,
}

#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct ReadingSnapshot {
    pub is_supported: bool,
    pub phase: ReadingPhase,
    pub is_reading_document: bool,
    pub current_chunk_index: usize,
    pub chunk_count: usize,
    pub current_word_index: Option<usize>,
    pub highlight_start_index: Option<usize>,
    pub highlight_end_index: Option<usize>,
    pub is_playing: bool,
    pub is_paused: bool,
    pub selected_voice: Option<VoiceSummary>,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
    pub document_title: Option<String>,
    pub current_page: usize,
    pub page_count: usize,
}

fn export_single_type<T: TS + 'static>(out_dir: &Path) -> Result<()> {
    T::export_all_to(out_dir).with_context(|| format!("Exporting {}", T::name()))
}

/// Write TypeScript definitions for every snapshot type into `out_dir`,
/// replacing previously generated `.ts` files.
pub fn export_ts_bindings(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("Creating {}", out_dir.display()))?;

    for entry in fs::read_dir(out_dir).with_context(|| format!("Listing {}", out_dir.display()))? {
        let path = entry.context("Reading bindings directory entry")?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("ts") {
            fs::remove_file(&path).with_context(|| format!("Removing {}", path.display()))?;
        }
    }

    export_single_type::<HighlightRange>(out_dir)?;
    export_single_type::<ReadingPhase>(out_dir)?;
    export_single_type::<VoiceSummary>(out_dir)?;
    export_single_type::<ReadingSnapshot>(out_dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speaking_snapshot() -> ReadingSnapshot {
        ReadingSnapshot {
            is_supported: true,
            phase: ReadingPhase::SpeakingChunk,
            is_reading_document: true,
            current_chunk_index: 2,
            chunk_count: 3,
            current_word_index: Some(7),
            highlight_start_index: Some(40),
            highlight_end_index: Some(45),
            is_playing: true,
            is_paused: false,
            selected_voice: None,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
            document_title: Some("Informe".to_string()),
            current_page: 1,
            page_count: 1,
        }
    }

    #[test]
    fn snapshot_serializes_with_snake_case_phase() {
        let json = serde_json::to_value(speaking_snapshot()).unwrap();
        assert_eq!(json["phase"], "speaking_chunk");
        assert_eq!(json["highlight_end_index"], 45);
        assert!(json["selected_voice"].is_null());
    }

    #[test]
    fn export_replaces_stale_bindings() {
        let dir = std::env::temp_dir().join(format!("lectora-bindings-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let stale = dir.join("Stale.ts");
        fs::write(&stale, "export type Stale = never;").unwrap();

        export_ts_bindings(&dir).unwrap();
        assert!(!stale.exists());
        assert!(dir.join("ReadingSnapshot.ts").exists());
        assert!(dir.join("ReadingPhase.ts").exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
