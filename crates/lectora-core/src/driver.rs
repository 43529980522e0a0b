//! Drives a single utterance at a time through the speech engine.
//!
//! The driver owns the "playing"/"paused" flags the rest of the session
//! observes, applies the settle delay after cancelling, retries short
//! utterances once when the engine reports an interruption, and turns engine
//! lifecycle events into [`DriverNotice`]s for whoever requested the speech.

use crate::engine::{
    BoundaryKind, EngineEvent, SpeechEngine, SynthesisErrorReason, UtteranceId, UtteranceRequest,
};
use crate::timer::TimerQueue;
use crate::voice::VoiceConfig;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct DriverSettings {
    /// Delay between cancelling the engine and speaking the next utterance.
    pub cancel_settle: Duration,
    /// Delay before re-speaking an interrupted utterance.
    pub retry_delay: Duration,
    /// Only utterances shorter than this (in chars) are retried.
    pub retry_max_chars: usize,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            cancel_settle: Duration::from_millis(50),
            retry_delay: Duration::from_millis(100),
            retry_max_chars: 200,
        }
    }
}

/// Who asked for an utterance; notices are routed back by owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceOwner {
    Reading { chunk_index: usize },
    AdHoc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// The utterance is over: finished, failed, or skipped.
    Ended,
    /// Cancelled by something outside the session.
    Canceled,
    /// Word boundary at `char_index` within the utterance text.
    Boundary { char_index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverNotice {
    pub id: UtteranceId,
    pub owner: UtteranceOwner,
    pub kind: NoticeKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spoken {
    /// The utterance will reach the engine after the settle delay.
    Scheduled(UtteranceId),
    /// Nothing to speak; the caller should treat the utterance as ended.
    Skipped(DriverNotice),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Waiting for the settle or retry timer.
    Waiting,
    /// Handed to the engine, no `Start` yet.
    Queued,
    Speaking,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverTimer {
    Start(UtteranceId),
    Retry(UtteranceId),
}

#[derive(Debug)]
struct ActiveUtterance {
    request: UtteranceRequest,
    owner: UtteranceOwner,
    phase: Phase,
    retried: bool,
    resettled: bool,
}

#[derive(Debug)]
pub struct UtteranceDriver {
    settings: DriverSettings,
    supported: bool,
    next_id: u64,
    current: Option<ActiveUtterance>,
    playing: bool,
    paused: bool,
    timers: TimerQueue<DriverTimer>,
}

impl UtteranceDriver {
    pub fn new(settings: DriverSettings) -> Self {
        Self {
            settings,
            supported: false,
            next_id: 0,
            current: None,
            playing: false,
            paused: false,
            timers: TimerQueue::new(),
        }
    }

    pub fn set_supported(&mut self, supported: bool) {
        self.supported = supported;
    }

    pub fn is_supported(&self) -> bool {
        self.supported
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn current_id(&self) -> Option<UtteranceId> {
        self.current.as_ref().map(|active| active.request.id)
    }

    /// Owner of the utterance the driver is still responsible for, whether
    /// it is waiting on a timer, queued in the engine, or speaking.
    pub fn live_owner(&self) -> Option<UtteranceOwner> {
        self.current.as_ref().map(|active| active.owner)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    fn allocate_id(&mut self) -> UtteranceId {
        self.next_id = self.next_id.wrapping_add(1);
        UtteranceId(self.next_id)
    }

    /// Replace whatever is playing with `text`.
    pub fn speak<E: SpeechEngine>(
        &mut self,
        engine: &mut E,
        text: &str,
        voice: &VoiceConfig,
        owner: UtteranceOwner,
        now: Instant,
    ) -> Spoken {
        let id = self.allocate_id();
        if !self.supported || text.trim().is_empty() {
            debug!(%id, supported = self.supported, "Nothing to speak; ending immediately");
            return Spoken::Skipped(DriverNotice {
                id,
                owner,
                kind: NoticeKind::Ended,
            });
        }

        if let Some(previous) = self.current.take() {
            debug!(previous = %previous.request.id, "Superseding active utterance");
        }
        engine.cancel();
        self.timers.clear();
        self.playing = false;
        self.paused = false;

        let request = voice.build_request(id, text);
        debug!(
            %id,
            chars = request.char_len(),
            rate = request.rate,
            pitch = request.pitch,
            volume = request.volume,
            "Scheduling utterance"
        );
        self.current = Some(ActiveUtterance {
            request,
            owner,
            phase: Phase::Waiting,
            retried: false,
            resettled: false,
        });
        self.timers
            .schedule_after(now, self.settings.cancel_settle, DriverTimer::Start(id));
        Spoken::Scheduled(id)
    }

    pub fn pause<E: SpeechEngine>(&mut self, engine: &mut E) -> bool {
        if !self.supported || !self.playing || self.paused {
            return false;
        }
        match engine.pause() {
            Ok(()) => {
                self.paused = true;
                true
            }
            Err(err) => {
                warn!("Error pausing speech: {err}");
                false
            }
        }
    }

    pub fn resume<E: SpeechEngine>(&mut self, engine: &mut E) -> bool {
        if !self.supported || !self.playing || !self.paused {
            return false;
        }
        match engine.resume() {
            Ok(()) => {
                self.paused = false;
                true
            }
            Err(err) => {
                warn!("Error resuming speech: {err}");
                false
            }
        }
    }

    /// Cancel everything. Safe to call repeatedly.
    pub fn stop<E: SpeechEngine>(&mut self, engine: &mut E) {
        if !self.supported {
            return;
        }
        if let Some(active) = self.current.take() {
            debug!(id = %active.request.id, "Stopping utterance");
        }
        engine.cancel();
        self.timers.clear();
        self.playing = false;
        self.paused = false;
    }

    /// Fire settle and retry timers that are due.
    pub fn run_due<E: SpeechEngine>(&mut self, engine: &mut E, now: Instant) -> Vec<DriverNotice> {
        let mut notices = Vec::new();
        for timer in self.timers.take_due(now) {
            let notice = match timer {
                DriverTimer::Start(id) => self.start_utterance(engine, id, now),
                DriverTimer::Retry(id) => self.retry_utterance(engine, id),
            };
            notices.extend(notice);
        }
        notices
    }

    fn start_utterance<E: SpeechEngine>(
        &mut self,
        engine: &mut E,
        id: UtteranceId,
        now: Instant,
    ) -> Option<DriverNotice> {
        let retry_delay = self.settings.retry_delay;
        let active = self.current.as_mut().filter(|active| active.request.id == id)?;

        if engine.is_speaking() && !active.resettled {
            // The cancel didn't take yet; give the engine one more window.
            debug!(%id, "Engine still speaking after cancel; waiting again");
            engine.cancel();
            active.resettled = true;
            self.timers
                .schedule_after(now, retry_delay, DriverTimer::Start(id));
            return None;
        }
        self.hand_to_engine(engine)
    }

    fn retry_utterance<E: SpeechEngine>(
        &mut self,
        engine: &mut E,
        id: UtteranceId,
    ) -> Option<DriverNotice> {
        if self.current_id() != Some(id) {
            return None;
        }
        info!(%id, "Retrying interrupted utterance");
        self.hand_to_engine(engine)
    }

    fn hand_to_engine<E: SpeechEngine>(&mut self, engine: &mut E) -> Option<DriverNotice> {
        let active = self.current.as_mut()?;
        match engine.speak(&active.request) {
            Ok(()) => {
                active.phase = Phase::Queued;
                None
            }
            Err(err) => {
                warn!(id = %active.request.id, "Speech engine refused utterance: {err}");
                self.finish(NoticeKind::Ended)
            }
        }
    }

    fn finish(&mut self, kind: NoticeKind) -> Option<DriverNotice> {
        self.playing = false;
        self.paused = false;
        self.current.take().map(|active| DriverNotice {
            id: active.request.id,
            owner: active.owner,
            kind,
        })
    }

    /// Apply an engine lifecycle event. Events for any utterance other than
    /// the current one are stale and ignored.
    pub fn handle_event(
        &mut self,
        id: UtteranceId,
        event: EngineEvent,
        now: Instant,
    ) -> Option<DriverNotice> {
        let Some(active) = self.current.as_mut().filter(|active| active.request.id == id) else {
            debug!(%id, ?event, "Ignoring event for stale utterance");
            return None;
        };

        match event {
            EngineEvent::Start => {
                active.phase = Phase::Speaking;
                self.playing = true;
                self.paused = false;
                None
            }
            EngineEvent::Boundary {
                kind: BoundaryKind::Word,
                char_index,
            } => Some(DriverNotice {
                id,
                owner: active.owner,
                kind: NoticeKind::Boundary { char_index },
            }),
            EngineEvent::Boundary { .. } => None,
            EngineEvent::Pause => {
                self.paused = true;
                None
            }
            EngineEvent::Resume => {
                self.paused = false;
                None
            }
            EngineEvent::End => self.finish(NoticeKind::Ended),
            EngineEvent::Error(reason) => {
                warn!(%id, %reason, "Speech synthesis error");
                self.playing = false;
                self.paused = false;
                let retryable = reason == SynthesisErrorReason::Interrupted
                    && !active.retried
                    && active.request.char_len() < self.settings.retry_max_chars;
                if retryable {
                    active.retried = true;
                    active.phase = Phase::Waiting;
                    self.timers
                        .schedule_after(now, self.settings.retry_delay, DriverTimer::Retry(id));
                    return None;
                }
                // Our own cancels only ever hit superseded utterances.
                if reason == SynthesisErrorReason::Canceled {
                    return self.finish(NoticeKind::Canceled);
                }
                self.finish(NoticeKind::Ended)
            }
        }
    }

    /// Reconcile with an engine that went quiet on its own. Returns the
    /// owner of the utterance that was dropped, if any.
    pub fn sync_with_engine<E: SpeechEngine>(&mut self, engine: &E) -> Option<UtteranceOwner> {
        let active = self.current.as_ref()?;
        if active.phase != Phase::Speaking || self.paused || engine.is_speaking() {
            return None;
        }
        info!(id = %active.request.id, "Engine stopped speaking without an end event");
        let owner = active.owner;
        self.current = None;
        self.playing = false;
        self.paused = false;
        Some(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::voice::Voice;

    #[derive(Default)]
    struct RecordingEngine {
        spoken: Vec<UtteranceId>,
        cancels: usize,
        speaking: bool,
        refuse: bool,
    }

    impl SpeechEngine for RecordingEngine {
        fn is_supported(&self) -> bool {
            true
        }

        fn voices(&self) -> Vec<Voice> {
            Vec::new()
        }

        fn speak(&mut self, request: &UtteranceRequest) -> Result<(), EngineError> {
            if self.refuse {
                return Err(EngineError::Rejected {
                    id: request.id,
                    reason: "busy".to_string(),
                });
            }
            self.spoken.push(request.id);
            self.speaking = true;
            Ok(())
        }

        fn cancel(&mut self) {
            self.cancels += 1;
            self.speaking = false;
        }

        fn pause(&mut self) -> Result<(), EngineError> {
            Ok(())
        }

        fn resume(&mut self) -> Result<(), EngineError> {
            Ok(())
        }

        fn is_speaking(&self) -> bool {
            self.speaking
        }
    }

    fn driver() -> UtteranceDriver {
        let mut driver = UtteranceDriver::new(DriverSettings::default());
        driver.set_supported(true);
        driver
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn blank_text_ends_immediately() {
        let mut engine = RecordingEngine::default();
        let mut driver = driver();
        let start = Instant::now();
        let spoken = driver.speak(&mut engine, "   ", &VoiceConfig::default(), UtteranceOwner::AdHoc, start);
        assert!(matches!(
            spoken,
            Spoken::Skipped(DriverNotice {
                kind: NoticeKind::Ended,
                ..
            })
        ));
        assert_eq!(engine.cancels, 0);
    }

    #[test]
    fn unsupported_platform_skips_speech() {
        let mut engine = RecordingEngine::default();
        let mut driver = UtteranceDriver::new(DriverSettings::default());
        let start = Instant::now();
        let spoken = driver.speak(&mut engine, "hola", &VoiceConfig::default(), UtteranceOwner::AdHoc, start);
        assert!(matches!(spoken, Spoken::Skipped(_)));
        assert!(engine.spoken.is_empty());
    }

    #[test]
    fn speech_reaches_engine_after_settle_delay() {
        let mut engine = RecordingEngine::default();
        let mut driver = driver();
        let start = Instant::now();
        let Spoken::Scheduled(id) =
            driver.speak(&mut engine, "hola", &VoiceConfig::default(), UtteranceOwner::AdHoc, start)
        else {
            panic!("expected scheduled utterance");
        };
        assert_eq!(engine.cancels, 1);
        assert!(driver.run_due(&mut engine, start + ms(10)).is_empty());
        assert!(engine.spoken.is_empty());

        driver.run_due(&mut engine, start + ms(50));
        assert_eq!(engine.spoken, vec![id]);

        driver.handle_event(id, EngineEvent::Start, start + ms(60));
        assert!(driver.is_playing());
        let notice = driver.handle_event(id, EngineEvent::End, start + ms(90));
        assert_eq!(
            notice,
            Some(DriverNotice {
                id,
                owner: UtteranceOwner::AdHoc,
                kind: NoticeKind::Ended
            })
        );
        assert!(!driver.is_playing());
        assert_eq!(driver.live_owner(), None);
    }

    #[test]
    fn only_word_boundaries_are_forwarded() {
        let mut engine = RecordingEngine::default();
        let mut driver = driver();
        let start = Instant::now();
        let Spoken::Scheduled(id) = driver.speak(
            &mut engine,
            "hola mundo",
            &VoiceConfig::default(),
            UtteranceOwner::Reading { chunk_index: 2 },
            start,
        ) else {
            panic!("expected scheduled utterance");
        };
        driver.run_due(&mut engine, start + ms(50));

        let sentence = EngineEvent::Boundary {
            kind: BoundaryKind::Sentence,
            char_index: 0,
        };
        assert_eq!(driver.handle_event(id, sentence, start), None);

        let word = EngineEvent::Boundary {
            kind: BoundaryKind::Word,
            char_index: 5,
        };
        assert_eq!(
            driver.handle_event(id, word, start),
            Some(DriverNotice {
                id,
                owner: UtteranceOwner::Reading { chunk_index: 2 },
                kind: NoticeKind::Boundary { char_index: 5 }
            })
        );
    }

    #[test]
    fn interrupted_short_utterance_is_retried_once() {
        let mut engine = RecordingEngine::default();
        let mut driver = driver();
        let start = Instant::now();
        let text = "x".repeat(150);
        let Spoken::Scheduled(id) =
            driver.speak(&mut engine, &text, &VoiceConfig::default(), UtteranceOwner::AdHoc, start)
        else {
            panic!("expected scheduled utterance");
        };
        driver.run_due(&mut engine, start + ms(50));
        driver.handle_event(id, EngineEvent::Start, start + ms(55));

        let interrupted = EngineEvent::Error(SynthesisErrorReason::Interrupted);
        assert_eq!(driver.handle_event(id, interrupted.clone(), start + ms(60)), None);
        assert!(!driver.is_playing());
        assert_eq!(driver.live_owner(), Some(UtteranceOwner::AdHoc));

        driver.run_due(&mut engine, start + ms(160));
        assert_eq!(engine.spoken, vec![id, id]);

        let notice = driver.handle_event(id, interrupted, start + ms(170));
        assert_eq!(notice.map(|notice| notice.kind), Some(NoticeKind::Ended));
        driver.run_due(&mut engine, start + ms(400));
        assert_eq!(engine.spoken.len(), 2);
    }

    #[test]
    fn long_or_non_interrupted_errors_end_immediately() {
        let mut engine = RecordingEngine::default();
        let mut driver = driver();
        let start = Instant::now();
        let long = "x".repeat(200);
        let Spoken::Scheduled(id) =
            driver.speak(&mut engine, &long, &VoiceConfig::default(), UtteranceOwner::AdHoc, start)
        else {
            panic!("expected scheduled utterance");
        };
        driver.run_due(&mut engine, start + ms(50));
        let notice = driver.handle_event(
            id,
            EngineEvent::Error(SynthesisErrorReason::Interrupted),
            start + ms(60),
        );
        assert_eq!(notice.map(|notice| notice.kind), Some(NoticeKind::Ended));

        let Spoken::Scheduled(id) =
            driver.speak(&mut engine, "corto", &VoiceConfig::default(), UtteranceOwner::AdHoc, start)
        else {
            panic!("expected scheduled utterance");
        };
        driver.run_due(&mut engine, start + ms(50));
        let notice = driver.handle_event(
            id,
            EngineEvent::Error(SynthesisErrorReason::SynthesisFailed),
            start + ms(60),
        );
        assert_eq!(notice.map(|notice| notice.kind), Some(NoticeKind::Ended));
    }

    #[test]
    fn foreign_cancel_is_reported_as_canceled() {
        let mut engine = RecordingEngine::default();
        let mut driver = driver();
        let start = Instant::now();
        let Spoken::Scheduled(id) =
            driver.speak(&mut engine, "hola", &VoiceConfig::default(), UtteranceOwner::AdHoc, start)
        else {
            panic!("expected scheduled utterance");
        };
        driver.run_due(&mut engine, start + ms(50));
        let notice = driver.handle_event(
            id,
            EngineEvent::Error(SynthesisErrorReason::Canceled),
            start + ms(60),
        );
        assert_eq!(notice.map(|notice| notice.kind), Some(NoticeKind::Canceled));
    }

    #[test]
    fn superseded_utterance_events_are_ignored() {
        let mut engine = RecordingEngine::default();
        let mut driver = driver();
        let start = Instant::now();
        let Spoken::Scheduled(first) =
            driver.speak(&mut engine, "uno", &VoiceConfig::default(), UtteranceOwner::AdHoc, start)
        else {
            panic!("expected scheduled utterance");
        };
        driver.run_due(&mut engine, start + ms(50));
        let Spoken::Scheduled(second) =
            driver.speak(&mut engine, "dos", &VoiceConfig::default(), UtteranceOwner::AdHoc, start + ms(60))
        else {
            panic!("expected scheduled utterance");
        };
        assert_ne!(first, second);
        assert_eq!(driver.handle_event(first, EngineEvent::End, start + ms(70)), None);
        assert_eq!(driver.current_id(), Some(second));
    }

    #[test]
    fn refused_utterance_ends() {
        let mut engine = RecordingEngine {
            refuse: true,
            ..RecordingEngine::default()
        };
        let mut driver = driver();
        let start = Instant::now();
        driver.speak(&mut engine, "hola", &VoiceConfig::default(), UtteranceOwner::AdHoc, start);
        let notices = driver.run_due(&mut engine, start + ms(50));
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Ended);
    }

    #[test]
    fn pause_and_resume_require_playing_state() {
        let mut engine = RecordingEngine::default();
        let mut driver = driver();
        assert!(!driver.pause(&mut engine));

        let start = Instant::now();
        let Spoken::Scheduled(id) =
            driver.speak(&mut engine, "hola", &VoiceConfig::default(), UtteranceOwner::AdHoc, start)
        else {
            panic!("expected scheduled utterance");
        };
        driver.run_due(&mut engine, start + ms(50));
        driver.handle_event(id, EngineEvent::Start, start + ms(55));

        assert!(driver.pause(&mut engine));
        assert!(driver.is_paused());
        assert!(!driver.pause(&mut engine));
        assert!(driver.resume(&mut engine));
        assert!(!driver.is_paused());
    }

    #[test]
    fn engine_going_quiet_drops_the_utterance() {
        let mut engine = RecordingEngine::default();
        let mut driver = driver();
        let start = Instant::now();
        let Spoken::Scheduled(id) = driver.speak(
            &mut engine,
            "hola",
            &VoiceConfig::default(),
            UtteranceOwner::Reading { chunk_index: 0 },
            start,
        ) else {
            panic!("expected scheduled utterance");
        };
        driver.run_due(&mut engine, start + ms(50));
        assert_eq!(driver.sync_with_engine(&engine), None);

        driver.handle_event(id, EngineEvent::Start, start + ms(55));
        engine.speaking = false;
        assert_eq!(
            driver.sync_with_engine(&engine),
            Some(UtteranceOwner::Reading { chunk_index: 0 })
        );
        assert!(!driver.is_playing());
        assert_eq!(driver.live_owner(), None);
    }
}
