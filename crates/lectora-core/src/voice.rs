//! Voice configuration, ranking, and asynchronous voice-list loading.

use crate::engine::{UtteranceId, UtteranceRequest};
use crate::snapshot::VoiceSummary;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::{Duration, Instant};
use tracing::debug;

pub const MIN_RATE: f32 = 0.5;
pub const MAX_RATE: f32 = 2.0;
pub const MIN_PITCH: f32 = 0.8;
pub const MAX_PITCH: f32 = 1.2;
pub const MIN_VOLUME: f32 = 0.0;
pub const MAX_VOLUME: f32 = 1.0;

const UNRANKED_PRIORITY: u32 = 999;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Voice {
    pub name: String,
    pub lang: String,
    /// Installed on the device rather than served remotely.
    #[serde(default = "default_local_service")]
    pub local_service: bool,
    #[serde(default)]
    pub default: bool,
}

fn default_local_service() -> bool {
    true
}

impl Voice {
    pub fn new(name: impl Into<String>, lang: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lang: lang.into(),
            local_service: true,
            default: false,
        }
    }

    pub fn remote(mut self) -> Self {
        self.local_service = false;
        self
    }

    pub fn summary(&self) -> VoiceSummary {
        VoiceSummary {
            name: self.name.clone(),
            lang: self.lang.clone(),
            region: voice_region(self).to_string(),
            local_service: self.local_service,
        }
    }
}

/// The identifying part of a voice that survives across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedVoice {
    pub name: String,
    pub lang: String,
}

impl From<&Voice> for SavedVoice {
    fn from(voice: &Voice) -> Self {
        Self {
            name: voice.name.clone(),
            lang: voice.lang.clone(),
        }
    }
}

impl SavedVoice {
    pub fn matches(&self, voice: &Voice) -> bool {
        self.name == voice.name && self.lang == voice.lang
    }
}

/// Settings applied to each utterance at creation time.
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceConfig {
    selected_voice: Option<Voice>,
    rate: f32,
    pitch: f32,
    volume: f32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            selected_voice: None,
            rate: 1.0,
            pitch: 1.0,
            volume: 1.0,
        }
    }
}

impl VoiceConfig {
    pub fn new(rate: f32, pitch: f32, volume: f32) -> Self {
        let mut config = Self::default();
        config.set_rate(rate);
        config.set_pitch(pitch);
        config.set_volume(volume);
        config
    }

    pub fn selected_voice(&self) -> Option<&Voice> {
        self.selected_voice.as_ref()
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn select_voice(&mut self, voice: Option<Voice>) {
        self.selected_voice = voice;
    }

    pub fn set_rate(&mut self, rate: f32) -> f32 {
        self.rate = clamp_or(rate, MIN_RATE, MAX_RATE, 1.0);
        self.rate
    }

    pub fn set_pitch(&mut self, pitch: f32) -> f32 {
        self.pitch = clamp_or(pitch, MIN_PITCH, MAX_PITCH, 1.0);
        self.pitch
    }

    pub fn set_volume(&mut self, volume: f32) -> f32 {
        self.volume = clamp_or(volume, MIN_VOLUME, MAX_VOLUME, 1.0);
        self.volume
    }

    pub fn build_request(&self, id: UtteranceId, text: &str) -> UtteranceRequest {
        UtteranceRequest {
            id,
            text: text.to_string(),
            voice: self.selected_voice.clone(),
            rate: self.rate,
            pitch: self.pitch,
            volume: self.volume,
        }
    }
}

fn clamp_or(value: f32, min: f32, max: f32, fallback: f32) -> f32 {
    if value.is_nan() {
        fallback
    } else {
        value.clamp(min, max)
    }
}

struct RegionPriority {
    lang: &'static str,
    region: &'static str,
    priority: u32,
    keywords: &'static [&'static str],
}

const REGION_PRIORITIES: &[RegionPriority] = &[
    RegionPriority {
        lang: "es-es",
        region: "Spain",
        priority: 1,
        keywords: &["spanish", "español", "spain", "castilian"],
    },
    RegionPriority {
        lang: "es-mx",
        region: "Mexico",
        priority: 2,
        keywords: &["mexico", "mexican", "mexicano"],
    },
    RegionPriority {
        lang: "es-ar",
        region: "Argentina",
        priority: 3,
        keywords: &["argentina", "argentino"],
    },
    RegionPriority {
        lang: "es-co",
        region: "Colombia",
        priority: 4,
        keywords: &["colombia", "colombiano"],
    },
    RegionPriority {
        lang: "es-cl",
        region: "Chile",
        priority: 5,
        keywords: &["chile", "chileno"],
    },
    RegionPriority {
        lang: "es-pe",
        region: "Peru",
        priority: 6,
        keywords: &["peru", "peruano"],
    },
    RegionPriority {
        lang: "es-ve",
        region: "Venezuela",
        priority: 7,
        keywords: &["venezuela", "venezolano"],
    },
    RegionPriority {
        lang: "es-ec",
        region: "Ecuador",
        priority: 8,
        keywords: &["ecuador", "ecuatoriano"],
    },
    RegionPriority {
        lang: "es",
        region: "Spanish",
        priority: 21,
        keywords: &["spanish", "español"],
    },
];

/// Human-readable region for a voice: exact language match, then language
/// prefix, then name keywords.
pub fn voice_region(voice: &Voice) -> &'static str {
    let lang = voice.lang.to_lowercase();
    let name = voice.name.to_lowercase();

    REGION_PRIORITIES
        .iter()
        .find(|entry| lang == entry.lang)
        .or_else(|| REGION_PRIORITIES.iter().find(|entry| lang.starts_with(entry.lang)))
        .or_else(|| {
            REGION_PRIORITIES
                .iter()
                .find(|entry| entry.keywords.iter().any(|keyword| name.contains(keyword)))
        })
        .map(|entry| entry.region)
        .unwrap_or("Unknown")
}

/// Whether `voice` speaks `language` (a BCP-47 prefix such as `"es"`).
pub fn speaks_language(voice: &Voice, language: &str) -> bool {
    let language = language.to_lowercase();
    if voice.lang.to_lowercase().starts_with(&language) {
        return true;
    }
    let name = voice.name.to_lowercase();
    REGION_PRIORITIES
        .iter()
        .filter(|entry| entry.lang.starts_with(&language))
        .flat_map(|entry| entry.keywords.iter())
        .any(|keyword| {
            // Country names alone don't identify a language.
            matches!(*keyword, "spanish" | "español" | "castilian") && name.contains(keyword)
        })
}

fn region_priority(voice: &Voice) -> u32 {
    let lang = voice.lang.to_lowercase();
    REGION_PRIORITIES
        .iter()
        .find(|entry| lang.starts_with(entry.lang))
        .map(|entry| entry.priority)
        .unwrap_or(UNRANKED_PRIORITY)
}

/// Offer local voices when any exist, preferred-language voices first (by
/// regional priority), everything else alphabetically.
pub fn rank_voices(voices: Vec<Voice>, preferred_language: &str) -> Vec<Voice> {
    let has_local = voices.iter().any(|voice| voice.local_service);
    let mut ranked: Vec<Voice> = if has_local {
        voices.into_iter().filter(|voice| voice.local_service).collect()
    } else {
        voices
    };

    ranked.sort_by(|a, b| {
        let a_pref = speaks_language(a, preferred_language);
        let b_pref = speaks_language(b, preferred_language);
        match (a_pref, b_pref) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (true, true) => region_priority(a).cmp(&region_priority(b)),
            (false, false) => a.name.cmp(&b.name),
        }
    });
    ranked
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceChoice {
    Restored,
    PreferredLanguage,
    FirstAvailable,
}

/// Pick the voice to use after a (re)load of the voice list.
pub fn choose_voice<'a>(
    ranked: &'a [Voice],
    saved: Option<&SavedVoice>,
    preferred_language: &str,
) -> Option<(&'a Voice, VoiceChoice)> {
    if let Some(saved) = saved {
        if let Some(voice) = ranked.iter().find(|voice| saved.matches(voice)) {
            return Some((voice, VoiceChoice::Restored));
        }
    }
    if let Some(voice) = ranked
        .iter()
        .find(|voice| speaks_language(voice, preferred_language))
    {
        return Some((voice, VoiceChoice::PreferredLanguage));
    }
    ranked.first().map(|voice| (voice, VoiceChoice::FirstAvailable))
}

#[derive(Debug, Clone, PartialEq)]
pub enum VoiceLoadOutcome {
    Ready(Vec<Voice>),
    Retry { at: Instant },
    Unavailable,
}

/// Bounded polling for a voice list the platform fills in asynchronously.
#[derive(Debug, Clone)]
pub struct VoiceLoader {
    attempts: u32,
    max_attempts: u32,
    interval: Duration,
}

impl VoiceLoader {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: 0,
            max_attempts,
            interval,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn poll(&mut self, available: Vec<Voice>, now: Instant) -> VoiceLoadOutcome {
        if !available.is_empty() {
            debug!(count = available.len(), attempts = self.attempts, "Voices available");
            return VoiceLoadOutcome::Ready(available);
        }
        if self.attempts < self.max_attempts {
            self.attempts += 1;
            debug!(attempt = self.attempts, max = self.max_attempts, "Voice list empty; retrying");
            return VoiceLoadOutcome::Retry {
                at: now + self.interval,
            };
        }
        VoiceLoadOutcome::Unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(voices: &[Voice]) -> Vec<&str> {
        voices.iter().map(|voice| voice.name.as_str()).collect()
    }

    #[test]
    fn setters_clamp_to_supported_ranges() {
        let mut config = VoiceConfig::default();
        assert_eq!(config.set_rate(3.0), MAX_RATE);
        assert_eq!(config.set_rate(0.1), MIN_RATE);
        assert_eq!(config.set_pitch(2.0), MAX_PITCH);
        assert_eq!(config.set_volume(-1.0), MIN_VOLUME);
        assert_eq!(config.set_volume(f32::NAN), 1.0);
    }

    #[test]
    fn request_captures_current_settings() {
        let mut config = VoiceConfig::new(1.5, 1.1, 0.4);
        config.select_voice(Some(Voice::new("Monica", "es-ES")));
        let request = config.build_request(UtteranceId(7), "hola");
        config.set_rate(0.5);

        assert_eq!(request.rate, 1.5);
        assert_eq!(request.pitch, 1.1);
        assert_eq!(request.volume, 0.4);
        assert_eq!(request.voice.map(|voice| voice.name), Some("Monica".to_string()));
    }

    #[test]
    fn ranks_spanish_voices_by_region_then_others_alphabetically() {
        let voices = vec![
            Voice::new("Zira", "en-US"),
            Voice::new("Paulina", "es-MX"),
            Voice::new("Alex", "en-US"),
            Voice::new("Jorge", "es-US"),
            Voice::new("Monica", "es-ES"),
        ];
        let ranked = rank_voices(voices, "es");
        assert_eq!(names(&ranked), vec!["Monica", "Paulina", "Jorge", "Alex", "Zira"]);
    }

    #[test]
    fn remote_voices_are_dropped_when_local_ones_exist() {
        let voices = vec![
            Voice::new("Google español", "es-ES").remote(),
            Voice::new("Alex", "en-US"),
        ];
        assert_eq!(names(&rank_voices(voices, "es")), vec!["Alex"]);

        let only_remote = vec![Voice::new("Google español", "es-ES").remote()];
        assert_eq!(rank_voices(only_remote, "es").len(), 1);
    }

    #[test]
    fn region_lookup_falls_back_to_keywords() {
        assert_eq!(voice_region(&Voice::new("Monica", "es-ES")), "Spain");
        assert_eq!(voice_region(&Voice::new("Jorge", "es-US")), "Spanish");
        assert_eq!(voice_region(&Voice::new("Voz Mexicano", "und")), "Mexico");
        assert_eq!(voice_region(&Voice::new("Alex", "en-US")), "Unknown");
    }

    #[test]
    fn choose_voice_prefers_saved_then_language_then_first() {
        let ranked = rank_voices(
            vec![Voice::new("Alex", "en-US"), Voice::new("Monica", "es-ES")],
            "es",
        );
        let saved = SavedVoice {
            name: "Alex".to_string(),
            lang: "en-US".to_string(),
        };
        let (voice, choice) = choose_voice(&ranked, Some(&saved), "es").unwrap();
        assert_eq!((voice.name.as_str(), choice), ("Alex", VoiceChoice::Restored));

        let (voice, choice) = choose_voice(&ranked, None, "es").unwrap();
        assert_eq!(
            (voice.name.as_str(), choice),
            ("Monica", VoiceChoice::PreferredLanguage)
        );

        let english = vec![Voice::new("Alex", "en-US")];
        let (_, choice) = choose_voice(&english, None, "es").unwrap();
        assert_eq!(choice, VoiceChoice::FirstAvailable);
        assert!(choose_voice(&[], None, "es").is_none());
    }

    #[test]
    fn loader_retries_a_bounded_number_of_times() {
        let start = Instant::now();
        let mut loader = VoiceLoader::new(2, Duration::from_millis(100));
        assert_eq!(
            loader.poll(Vec::new(), start),
            VoiceLoadOutcome::Retry {
                at: start + Duration::from_millis(100)
            }
        );
        assert!(matches!(loader.poll(Vec::new(), start), VoiceLoadOutcome::Retry { .. }));
        assert_eq!(loader.poll(Vec::new(), start), VoiceLoadOutcome::Unavailable);

        let voices = vec![Voice::new("Monica", "es-ES")];
        assert_eq!(
            loader.poll(voices.clone(), start),
            VoiceLoadOutcome::Ready(voices)
        );
    }
}
