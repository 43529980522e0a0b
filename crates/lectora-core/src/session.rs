//! The speech session: one owner for the engine, the utterance driver, the
//! reading controller, voice settings, and the loaded document.
//!
//! All mutation goes through [`SpeechSessionManager`] methods. Host code
//! forwards engine events with [`SpeechSessionManager::handle_engine_event`]
//! and pumps delayed work with [`SpeechSessionManager::run_due`].

use crate::chunker::chunk_text_with_tolerance;
use crate::config::AppConfig;
use crate::controller::{ReadingAction, ReadingController, ReadingEvent, ReadingLifecycle};
use crate::document::{Document, DocumentError};
use crate::driver::{DriverNotice, DriverSettings, NoticeKind, Spoken, UtteranceDriver, UtteranceOwner};
use crate::engine::{EngineEvent, SpeechEngine, UtteranceId};
use crate::snapshot::{ReadingPhase, ReadingSnapshot};
use crate::storage::{PreferenceStore, VoicePreferences};
use crate::timer::TimerQueue;
use crate::voice::{
    SavedVoice, Voice, VoiceConfig, VoiceLoadOutcome, VoiceLoader, choose_voice, rank_voices,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub type EndCallback = Box<dyn FnMut()>;
pub type BoundaryCallback = Box<dyn FnMut(usize)>;

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub driver: DriverSettings,
    pub max_chunk_chars: usize,
    pub break_tolerance: f32,
    pub voice_poll_attempts: u32,
    pub voice_poll_interval: Duration,
    pub preferred_language: String,
    pub rate: f32,
    pub pitch: f32,
    pub volume: f32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for SessionSettings {
    fn from(config: &AppConfig) -> Self {
        let speech = &config.speech;
        Self {
            driver: DriverSettings {
                cancel_settle: speech.cancel_settle(),
                retry_delay: speech.retry_delay(),
                retry_max_chars: speech.retry_max_chars,
            },
            max_chunk_chars: config.reading.effective_max_chunk_chars(),
            break_tolerance: config.reading.effective_break_tolerance(),
            voice_poll_attempts: speech.voice_poll_attempts,
            voice_poll_interval: speech.voice_poll_interval(),
            preferred_language: speech.preferred_language.clone(),
            rate: speech.rate,
            pitch: speech.pitch,
            volume: speech.volume,
        }
    }
}

struct AdHocListener {
    id: UtteranceId,
    on_end: Option<EndCallback>,
    on_boundary: Option<BoundaryCallback>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionTimer {
    ReloadVoices,
}

enum Work {
    Event(ReadingEvent),
    Action(ReadingAction),
    Notice(DriverNotice),
}

pub struct SpeechSessionManager<E: SpeechEngine> {
    engine: E,
    settings: SessionSettings,
    driver: UtteranceDriver,
    voice: VoiceConfig,
    saved_voice: Option<SavedVoice>,
    voices: Vec<Voice>,
    voice_loader: VoiceLoader,
    voices_unavailable: bool,
    controller: ReadingController,
    document: Option<Document>,
    store: Box<dyn PreferenceStore>,
    adhoc: Option<AdHocListener>,
    timers: TimerQueue<SessionTimer>,
    last_tick: Option<Instant>,
}

impl<E: SpeechEngine> SpeechSessionManager<E> {
    pub fn new(engine: E, settings: SessionSettings, store: Box<dyn PreferenceStore>) -> Self {
        let voice = VoiceConfig::new(settings.rate, settings.pitch, settings.volume);
        let voice_loader = VoiceLoader::new(settings.voice_poll_attempts, settings.voice_poll_interval);
        Self {
            engine,
            driver: UtteranceDriver::new(settings.driver.clone()),
            settings,
            voice,
            saved_voice: None,
            voices: Vec::new(),
            voice_loader,
            voices_unavailable: false,
            controller: ReadingController::new(),
            document: None,
            store,
            adhoc: None,
            timers: TimerQueue::new(),
            last_tick: None,
        }
    }

    /// Check platform support, restore saved preferences, and start loading
    /// voices. Without speech support every later operation is a no-op.
    pub fn initialize(&mut self, now: Instant) {
        self.tick(now);
        let supported = self.engine.is_supported();
        self.driver.set_supported(supported);
        if !supported {
            warn!("Speech synthesis is not supported; reading is disabled");
            return;
        }

        if let Some(prefs) = VoicePreferences::load(self.store.as_ref()) {
            self.voice.set_rate(prefs.rate);
            self.voice.set_pitch(prefs.pitch);
            self.voice.set_volume(prefs.volume);
            self.saved_voice = prefs.voice;
            debug!(
                rate = self.voice.rate(),
                pitch = self.voice.pitch(),
                volume = self.voice.volume(),
                "Restored voice preferences"
            );
        }

        self.load_voices(now);
    }

    fn tick(&mut self, now: Instant) {
        if self.last_tick.is_none_or(|last| now > last) {
            self.last_tick = Some(now);
        }
    }

    fn latest_tick(&self) -> Instant {
        self.last_tick.unwrap_or_else(Instant::now)
    }

    pub fn is_supported(&self) -> bool {
        self.driver.is_supported()
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// True once polling gave up without the platform reporting any voice.
    pub fn voices_unavailable(&self) -> bool {
        self.voices_unavailable
    }

    pub fn voice_config(&self) -> &VoiceConfig {
        &self.voice
    }

    /// The platform reported a change in its voice list.
    pub fn voices_changed(&mut self, now: Instant) {
        self.tick(now);
        if !self.driver.is_supported() {
            return;
        }
        self.voice_loader.reset();
        self.timers.retain(|timer| *timer != SessionTimer::ReloadVoices);
        self.load_voices(now);
    }

    fn load_voices(&mut self, now: Instant) {
        match self.voice_loader.poll(self.engine.voices(), now) {
            VoiceLoadOutcome::Ready(available) => self.apply_voices(available),
            VoiceLoadOutcome::Retry { at } => self.timers.schedule(at, SessionTimer::ReloadVoices),
            VoiceLoadOutcome::Unavailable => {
                warn!(attempts = self.voice_loader.attempts(), "Could not load system voices");
                self.voices_unavailable = true;
            }
        }
    }

    fn apply_voices(&mut self, available: Vec<Voice>) {
        self.voices_unavailable = false;
        self.voices = rank_voices(available, &self.settings.preferred_language);

        let keep = self
            .voice
            .selected_voice()
            .map(SavedVoice::from)
            .or_else(|| self.saved_voice.clone());
        let chosen = choose_voice(&self.voices, keep.as_ref(), &self.settings.preferred_language)
            .map(|(voice, how)| (voice.clone(), how));
        match chosen {
            Some((voice, how)) => {
                info!(
                    voice = %voice.name,
                    lang = %voice.lang,
                    choice = ?how,
                    count = self.voices.len(),
                    "Selected voice"
                );
                self.voice.select_voice(Some(voice));
            }
            None => self.voice.select_voice(None),
        }
    }

    pub fn select_voice(&mut self, voice: Voice) {
        info!(voice = %voice.name, lang = %voice.lang, "Voice selected");
        self.saved_voice = Some(SavedVoice::from(&voice));
        self.voice.select_voice(Some(voice));
        self.persist_preferences();
    }

    /// Select a loaded voice by name. Returns false if no such voice exists.
    pub fn select_voice_by_name(&mut self, name: &str) -> bool {
        let Some(voice) = self.voices.iter().find(|voice| voice.name == name).cloned() else {
            warn!(name, "Unknown voice");
            return false;
        };
        self.select_voice(voice);
        true
    }

    pub fn set_rate(&mut self, rate: f32) -> f32 {
        let applied = self.voice.set_rate(rate);
        self.persist_preferences();
        applied
    }

    pub fn set_pitch(&mut self, pitch: f32) -> f32 {
        let applied = self.voice.set_pitch(pitch);
        self.persist_preferences();
        applied
    }

    pub fn set_volume(&mut self, volume: f32) -> f32 {
        let applied = self.voice.set_volume(volume);
        self.persist_preferences();
        applied
    }

    fn persist_preferences(&mut self) {
        let prefs = VoicePreferences {
            voice: self.voice.selected_voice().map(SavedVoice::from),
            rate: self.voice.rate(),
            pitch: self.voice.pitch(),
            volume: self.voice.volume(),
        };
        prefs.save(self.store.as_mut());
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Replace the loaded document. Any reading session is stopped.
    pub fn load_document(&mut self, document: Document) {
        info!(
            title = document.title(),
            kind = %document.kind(),
            pages = document.page_count(),
            "Loading document"
        );
        self.invalidate_reading();
        self.document = Some(document);
    }

    pub fn next_page(&mut self) -> Result<bool, DocumentError> {
        self.change_page(Document::next_page)
    }

    pub fn prev_page(&mut self) -> Result<bool, DocumentError> {
        self.change_page(Document::prev_page)
    }

    pub fn go_to_page(&mut self, page: usize) -> Result<bool, DocumentError> {
        self.change_page(|document| document.go_to_page(page))
    }

    fn change_page(
        &mut self,
        turn: impl FnOnce(&mut Document) -> Result<bool, DocumentError>,
    ) -> Result<bool, DocumentError> {
        let Some(document) = self.document.as_mut() else {
            return Ok(false);
        };
        let changed = turn(document)?;
        if changed {
            self.invalidate_reading();
        }
        Ok(changed)
    }

    fn invalidate_reading(&mut self) {
        if self.controller.lifecycle() != ReadingLifecycle::Idle {
            let now = self.latest_tick();
            self.dispatch(ReadingEvent::DocumentChanged, now);
        }
    }

    pub fn start_reading_document(&mut self, now: Instant) {
        self.tick(now);
        if !self.driver.is_supported() {
            debug!("Ignoring start: speech synthesis unsupported");
            return;
        }
        self.dispatch(ReadingEvent::StartRequested, now);
        self.reconcile(now);
    }

    pub fn stop_reading_document(&mut self) {
        let now = self.latest_tick();
        self.dispatch(ReadingEvent::StopRequested, now);
    }

    pub fn is_reading_document(&self) -> bool {
        self.controller.is_reading()
    }

    pub fn current_word_index(&self) -> Option<usize> {
        self.controller.current_word_index()
    }

    pub fn highlight_start_index(&self) -> Option<usize> {
        self.controller.highlight().map(|range| range.start)
    }

    pub fn highlight_end_index(&self) -> Option<usize> {
        self.controller.highlight().map(|range| range.end)
    }

    pub fn reading_phase(&self) -> ReadingPhase {
        self.controller.phase()
    }

    pub fn controller(&self) -> &ReadingController {
        &self.controller
    }

    /// Speak `text` outside of continuous reading. Any active reading is
    /// interrupted. `on_end` fires immediately when there is nothing to say.
    pub fn speak(
        &mut self,
        text: &str,
        on_end: Option<EndCallback>,
        on_boundary: Option<BoundaryCallback>,
        now: Instant,
    ) -> Option<UtteranceId> {
        self.tick(now);
        if self.adhoc.take().is_some() {
            debug!("Replacing pending ad-hoc utterance");
        }
        let spoken = self
            .driver
            .speak(&mut self.engine, text, &self.voice, UtteranceOwner::AdHoc, now);
        let id = match spoken {
            Spoken::Scheduled(id) => {
                self.adhoc = Some(AdHocListener {
                    id,
                    on_end,
                    on_boundary,
                });
                Some(id)
            }
            Spoken::Skipped(_) => {
                if let Some(mut on_end) = on_end {
                    on_end();
                }
                None
            }
        };
        self.reconcile(now);
        id
    }

    pub fn pause(&mut self) {
        if !self.driver.is_supported() {
            return;
        }
        let speaking_chunk = matches!(
            self.controller.lifecycle(),
            ReadingLifecycle::SpeakingChunk { .. }
        );
        if speaking_chunk {
            if self.driver.is_playing() && !self.driver.is_paused() {
                let now = self.latest_tick();
                self.dispatch(ReadingEvent::PauseRequested, now);
            }
        } else {
            self.driver.pause(&mut self.engine);
        }
    }

    pub fn resume(&mut self, now: Instant) {
        self.tick(now);
        if !self.driver.is_supported() {
            return;
        }
        if matches!(self.controller.lifecycle(), ReadingLifecycle::Paused { .. }) {
            self.dispatch(ReadingEvent::ResumeRequested, now);
        } else {
            self.driver.resume(&mut self.engine);
        }
        self.reconcile(now);
    }

    /// Silence everything and end any reading session. Idempotent.
    pub fn stop(&mut self) {
        let now = self.latest_tick();
        self.dispatch(ReadingEvent::StopRequested, now);
        self.cancel_speech();
    }

    pub fn is_playing(&self) -> bool {
        self.driver.is_playing()
    }

    pub fn is_paused(&self) -> bool {
        self.driver.is_paused()
    }

    /// Deliver an engine lifecycle event for utterance `id`.
    pub fn handle_engine_event(&mut self, id: UtteranceId, event: EngineEvent, now: Instant) {
        self.tick(now);
        if let Some(notice) = self.driver.handle_event(id, event, now) {
            self.process(VecDeque::from([Work::Notice(notice)]), now);
        }
        self.reconcile(now);
    }

    /// Run timers that are due at `now`.
    pub fn run_due(&mut self, now: Instant) {
        self.tick(now);
        for timer in self.timers.take_due(now) {
            match timer {
                SessionTimer::ReloadVoices => self.load_voices(now),
            }
        }
        let notices = self.driver.run_due(&mut self.engine, now);
        if !notices.is_empty() {
            self.process(notices.into_iter().map(Work::Notice).collect(), now);
        }
        self.reconcile(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.timers.next_deadline(), self.driver.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Detect an engine that went silent without telling us, e.g. another
    /// application grabbed the audio output.
    pub fn poll_engine(&mut self) {
        let now = self.latest_tick();
        if let Some(UtteranceOwner::AdHoc) = self.driver.sync_with_engine(&self.engine) {
            if let Some(mut listener) = self.adhoc.take() {
                if let Some(on_end) = listener.on_end.as_mut() {
                    on_end();
                }
            }
        }
        self.reconcile(now);
    }

    fn dispatch(&mut self, event: ReadingEvent, now: Instant) {
        self.process(VecDeque::from([Work::Event(event)]), now);
    }

    fn process(&mut self, mut queue: VecDeque<Work>, now: Instant) {
        while let Some(work) = queue.pop_front() {
            match work {
                Work::Event(event) => {
                    let text = self.document.as_ref().map(Document::text).unwrap_or("");
                    let actions = self.controller.transition(event, text);
                    queue.extend(actions.into_iter().map(Work::Action));
                }
                Work::Action(action) => self.execute(action, now, &mut queue),
                Work::Notice(notice) => self.route_notice(notice, &mut queue),
            }
        }
    }

    fn execute(&mut self, action: ReadingAction, now: Instant, queue: &mut VecDeque<Work>) {
        match action {
            ReadingAction::CancelSpeech => self.cancel_speech(),
            ReadingAction::ChunkDocument => {
                let text = self.document.as_ref().map(Document::text).unwrap_or("");
                let chunks = chunk_text_with_tolerance(
                    text,
                    self.settings.max_chunk_chars,
                    self.settings.break_tolerance,
                );
                queue.push_back(Work::Event(ReadingEvent::ChunksProduced(chunks)));
            }
            ReadingAction::SpeakChunk { chunk_index, text } => {
                self.adhoc = None;
                let owner = UtteranceOwner::Reading { chunk_index };
                match self
                    .driver
                    .speak(&mut self.engine, &text, &self.voice, owner, now)
                {
                    Spoken::Scheduled(id) => debug!(chunk_index, %id, "Chunk scheduled"),
                    Spoken::Skipped(notice) => queue.push_back(Work::Notice(notice)),
                }
            }
            ReadingAction::PauseSpeech => {
                if !self.driver.pause(&mut self.engine) {
                    // The chunk is still playing; reading must follow it.
                    warn!("Engine refused to pause; continuing to read");
                    queue.push_back(Work::Event(ReadingEvent::ResumeRequested));
                }
            }
            ReadingAction::ResumeSpeech => {
                self.driver.resume(&mut self.engine);
            }
        }
    }

    fn route_notice(&mut self, notice: DriverNotice, queue: &mut VecDeque<Work>) {
        match notice.owner {
            UtteranceOwner::Reading { chunk_index } => {
                let event = match notice.kind {
                    NoticeKind::Ended => ReadingEvent::UtteranceEnded { chunk_index },
                    NoticeKind::Canceled => ReadingEvent::ExternalInterruption,
                    NoticeKind::Boundary { char_index } => ReadingEvent::Boundary {
                        chunk_index,
                        char_index,
                    },
                };
                queue.push_back(Work::Event(event));
            }
            UtteranceOwner::AdHoc => {
                let Some(listener) = self.adhoc.as_mut().filter(|listener| listener.id == notice.id)
                else {
                    return;
                };
                match notice.kind {
                    NoticeKind::Boundary { char_index } => {
                        if let Some(on_boundary) = listener.on_boundary.as_mut() {
                            on_boundary(char_index);
                        }
                    }
                    NoticeKind::Ended | NoticeKind::Canceled => {
                        if let Some(on_end) = listener.on_end.as_mut() {
                            on_end();
                        }
                        self.adhoc = None;
                    }
                }
            }
        }
    }

    fn cancel_speech(&mut self) {
        self.driver.stop(&mut self.engine);
        self.adhoc = None;
    }

    /// Continuous reading must notice when the engine is taken away from it.
    fn reconcile(&mut self, now: Instant) {
        let interrupted = match self.controller.lifecycle() {
            ReadingLifecycle::SpeakingChunk { chunk_index } => {
                !self.driver.is_paused()
                    && self.driver.live_owner() != Some(UtteranceOwner::Reading { chunk_index })
            }
            ReadingLifecycle::Paused { .. } => {
                self.driver.live_owner() == Some(UtteranceOwner::AdHoc)
            }
            _ => false,
        };
        if interrupted {
            info!("Speech engine was taken over; ending continuous reading");
            self.dispatch(ReadingEvent::ExternalInterruption, now);
        }
    }

    pub fn snapshot(&self) -> ReadingSnapshot {
        let highlight = self.controller.highlight();
        ReadingSnapshot {
            is_supported: self.driver.is_supported(),
            phase: self.controller.phase(),
            is_reading_document: self.controller.is_reading(),
            current_chunk_index: self.controller.current_chunk_index(),
            chunk_count: self.controller.chunks().len(),
            current_word_index: self.controller.current_word_index(),
            highlight_start_index: highlight.map(|range| range.start),
            highlight_end_index: highlight.map(|range| range.end),
            is_playing: self.driver.is_playing(),
            is_paused: self.driver.is_paused(),
            selected_voice: self.voice.selected_voice().map(Voice::summary),
            rate: self.voice.rate(),
            pitch: self.voice.pitch(),
            volume: self.voice.volume(),
            document_title: self.document.as_ref().map(|doc| doc.title().to_string()),
            current_page: self.document.as_ref().map_or(0, Document::current_page),
            page_count: self.document.as_ref().map_or(0, Document::page_count),
        }
    }
}
