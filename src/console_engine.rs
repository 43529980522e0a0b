//! A speech engine that "speaks" by printing words to stdout.
//!
//! Words are released at `words_per_minute * rate`, and each one raises a
//! word boundary event the same way a platform synthesizer would. Events are
//! collected with [`ConsoleEngine::poll`] and handed to the session by the
//! run loop.

use lectora_core::engine::{
    BoundaryKind, EngineError, EngineEvent, SpeechEngine, SynthesisErrorReason, UtteranceId,
    UtteranceRequest,
};
use lectora_core::voice::Voice;
use std::io::Write;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

#[derive(Debug)]
struct Playback {
    id: UtteranceId,
    /// `(char offset, word)` for every whitespace-separated word.
    words: Vec<(usize, String)>,
    next_word: usize,
    interval: Duration,
    next_at: Option<Instant>,
    paused_since: Option<Instant>,
    paused: bool,
}

#[derive(Debug)]
pub struct ConsoleEngine {
    words_per_minute: u32,
    current: Option<Playback>,
    pending: Vec<(UtteranceId, EngineEvent)>,
}

impl ConsoleEngine {
    pub fn new(words_per_minute: u32) -> Self {
        Self {
            words_per_minute: words_per_minute.max(1),
            current: None,
            pending: Vec::new(),
        }
    }

    /// Advance playback to `now` and drain the events raised so far.
    pub fn poll(&mut self, now: Instant) -> Vec<(UtteranceId, EngineEvent)> {
        let mut finished = false;
        if let Some(playback) = self.current.as_mut() {
            if playback.paused {
                playback.paused_since.get_or_insert(now);
            } else {
                if let Some(since) = playback.paused_since.take() {
                    if let Some(next_at) = playback.next_at.as_mut() {
                        *next_at += now.saturating_duration_since(since);
                    }
                }
                let next_at = match playback.next_at {
                    Some(at) => at,
                    None => {
                        self.pending.push((playback.id, EngineEvent::Start));
                        playback.next_at = Some(now);
                        now
                    }
                };
                if now >= next_at {
                    finished = speak_due_words(playback, now, &mut self.pending);
                }
            }
        }
        if finished {
            if let Some(playback) = self.current.take() {
                println!();
                self.pending.push((playback.id, EngineEvent::End));
            }
        }
        std::mem::take(&mut self.pending)
    }

    /// When the engine next has something to do, if it is playing.
    pub fn next_wake(&self) -> Option<Instant> {
        self.current
            .as_ref()
            .filter(|playback| !playback.paused)
            .and_then(|playback| playback.next_at)
    }
}

fn speak_due_words(
    playback: &mut Playback,
    now: Instant,
    pending: &mut Vec<(UtteranceId, EngineEvent)>,
) -> bool {
    let mut stdout = std::io::stdout();
    while let Some(next_at) = playback.next_at {
        if next_at > now {
            break;
        }
        let Some((char_index, word)) = playback.words.get(playback.next_word) else {
            return true;
        };
        let _ = write!(stdout, "{word} ");
        trace!(id = %playback.id, char_index, "Word spoken");
        pending.push((
            playback.id,
            EngineEvent::Boundary {
                kind: BoundaryKind::Word,
                char_index: *char_index,
            },
        ));
        playback.next_word += 1;
        playback.next_at = Some(next_at + playback.interval);
    }
    let _ = stdout.flush();
    false
}

fn split_words(text: &str) -> Vec<(usize, String)> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut start = 0;
    for (index, ch) in text.chars().enumerate() {
        if ch.is_whitespace() {
            if !current.is_empty() {
                words.push((start, std::mem::take(&mut current)));
            }
        } else {
            if current.is_empty() {
                start = index;
            }
            current.push(ch);
        }
    }
    if !current.is_empty() {
        words.push((start, current));
    }
    words
}

impl SpeechEngine for ConsoleEngine {
    fn is_supported(&self) -> bool {
        true
    }

    fn voices(&self) -> Vec<Voice> {
        vec![
            Voice::new("Consola Castellano", "es-ES"),
            Voice::new("Console English", "en-US"),
        ]
    }

    fn speak(&mut self, request: &UtteranceRequest) -> Result<(), EngineError> {
        if self.current.is_some() {
            return Err(EngineError::Rejected {
                id: request.id,
                reason: "another utterance is playing".to_string(),
            });
        }
        let words_per_second = self.words_per_minute as f64 * f64::from(request.rate) / 60.0;
        let interval = Duration::from_secs_f64(1.0 / words_per_second.max(0.01));
        debug!(
            id = %request.id,
            voice = request.voice.as_ref().map(|voice| voice.name.as_str()),
            interval_ms = interval.as_millis() as u64,
            "Console engine accepted utterance"
        );
        self.current = Some(Playback {
            id: request.id,
            words: split_words(&request.text),
            next_word: 0,
            interval,
            next_at: None,
            paused_since: None,
            paused: false,
        });
        Ok(())
    }

    fn cancel(&mut self) {
        if let Some(playback) = self.current.take() {
            println!();
            self.pending.push((
                playback.id,
                EngineEvent::Error(SynthesisErrorReason::Canceled),
            ));
        }
    }

    fn pause(&mut self) -> Result<(), EngineError> {
        let playback = self
            .current
            .as_mut()
            .ok_or_else(|| EngineError::Control("nothing is playing".to_string()))?;
        if !playback.paused {
            playback.paused = true;
            self.pending.push((playback.id, EngineEvent::Pause));
        }
        Ok(())
    }

    fn resume(&mut self) -> Result<(), EngineError> {
        let playback = self
            .current
            .as_mut()
            .ok_or_else(|| EngineError::Control("nothing is paused".to_string()))?;
        if playback.paused {
            playback.paused = false;
            self.pending.push((playback.id, EngineEvent::Resume));
        }
        Ok(())
    }

    fn is_speaking(&self) -> bool {
        self.current.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lectora_core::voice::VoiceConfig;

    fn request(id: u64, text: &str) -> UtteranceRequest {
        VoiceConfig::new(2.0, 1.0, 1.0).build_request(UtteranceId(id), text)
    }

    #[test]
    fn words_carry_char_offsets() {
        let words = split_words("  hola  señor mundo");
        assert_eq!(
            words,
            vec![
                (2, "hola".to_string()),
                (8, "señor".to_string()),
                (14, "mundo".to_string())
            ]
        );
    }

    #[test]
    fn plays_words_then_ends() {
        let mut engine = ConsoleEngine::new(60);
        engine.speak(&request(1, "uno dos")).unwrap();
        let start = Instant::now();

        let events = engine.poll(start);
        assert_eq!(events[0], (UtteranceId(1), EngineEvent::Start));
        assert_eq!(events.len(), 2);

        // 60 wpm at rate 2.0 is one word every 500 ms.
        let events = engine.poll(start + Duration::from_millis(500));
        assert!(matches!(
            events.as_slice(),
            [(_, EngineEvent::Boundary { char_index: 4, .. })]
        ));
        let events = engine.poll(start + Duration::from_millis(1000));
        assert_eq!(events, vec![(UtteranceId(1), EngineEvent::End)]);
        assert!(!engine.is_speaking());
    }

    #[test]
    fn cancel_reports_the_dropped_utterance() {
        let mut engine = ConsoleEngine::new(170);
        engine.speak(&request(7, "hola")).unwrap();
        assert!(engine.speak(&request(8, "otra")).is_err());
        engine.cancel();
        assert_eq!(
            engine.poll(Instant::now()),
            vec![(
                UtteranceId(7),
                EngineEvent::Error(SynthesisErrorReason::Canceled)
            )]
        );
    }

    #[test]
    fn pause_holds_words_back() {
        let mut engine = ConsoleEngine::new(60);
        engine.speak(&request(1, "uno dos tres")).unwrap();
        let start = Instant::now();
        engine.poll(start);
        engine.pause().unwrap();
        let events = engine.poll(start + Duration::from_millis(100));
        assert_eq!(events, vec![(UtteranceId(1), EngineEvent::Pause)]);
        assert_eq!(engine.next_wake(), None);

        engine.resume().unwrap();
        let events = engine.poll(start + Duration::from_millis(200));
        assert_eq!(events, vec![(UtteranceId(1), EngineEvent::Resume)]);
        // The 100 ms spent paused pushes the next word back.
        assert_eq!(engine.next_wake(), Some(start + Duration::from_millis(600)));
        assert!(engine.poll(start + Duration::from_millis(550)).is_empty());
        assert_eq!(engine.poll(start + Duration::from_millis(600)).len(), 1);
    }
}
