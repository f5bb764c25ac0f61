//! Speech backends: native bridge, browser synthesis, and the beep fallback
//!
//! The host capabilities are narrow traits ([`HostSpeech`], [`SynthSpeech`],
//! [`ToneSink`]); the three [`SpeechBackend`] strategies wrap them and report
//! how the caller learns that the sound is over ([`Completion`]).
//!
//! Selection follows the operator's [`AnnounceMode`]. When the chosen
//! backend is missing or refuses, the pipeline moves down the candidate list
//! and always ends at [`BeepBackend`], so the ducking window closes.

pub mod command;
pub mod page;
pub mod tone;

pub use command::CommandSpeech;
pub use page::PageSpeech;
pub use tone::EventToneSink;
#[cfg(feature = "tone")]
pub use tone::CpalToneSink;

use crate::settings::AnnounceMode;
use chamador_common::events::SpeechBackendKind;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

/// Shortest ducking window granted to estimated speech
pub const MIN_SPEECH_ESTIMATE: Duration = Duration::from_millis(2_000);
/// Longest ducking window granted to estimated speech
pub const MAX_SPEECH_ESTIMATE: Duration = Duration::from_millis(7_000);
/// Speaking speed assumed at rate 1.0
pub const BASE_WORDS_PER_MINUTE: f64 = 150.0;

/// Double-beep pattern
pub const BEEP_FREQUENCY_HZ: f32 = 880.0;
pub const BEEP_FIRST_TONE: Duration = Duration::from_millis(260);
pub const BEEP_GAP: Duration = Duration::from_millis(190);
pub const BEEP_SECOND_TONE: Duration = Duration::from_millis(320);
/// Ducking window for the double beep
pub const BEEP_WINDOW: Duration = Duration::from_millis(1_200);

/// Speech failures; absorbed by the announcer, never surfaced
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpeechError {
    #[error("Speech backend {0} unavailable")]
    BackendUnavailable(SpeechBackendKind),

    #[error("Speech backend {kind} failed: {reason}")]
    BackendFailure {
        kind: SpeechBackendKind,
        reason: String,
    },
}

/// One utterance, already formatted
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub text: String,
    /// BCP-47 style locale, e.g. `pt-BR`
    pub locale: String,
    pub rate: f32,
    pub pitch: f32,
}

/// How the caller learns that the audible output is over
#[derive(Debug)]
pub enum Completion {
    /// The backend will signal (sender dropped counts as done)
    Signal(oneshot::Receiver<()>),
    /// No callback; assume done after this long
    After(Duration),
}

// ========================================
// Host capabilities
// ========================================

/// Device/kiosk speech bridge; no completion callback
pub trait HostSpeech: Send + Sync {
    fn is_available(&self) -> bool;

    /// Start speaking; `locale` uses underscores (`pt_BR`)
    fn speak(&self, text: &str, locale: &str) -> bool;
}

/// Speech synthesis with a genuine completion callback
pub trait SynthSpeech: Send + Sync {
    fn is_available(&self) -> bool;

    /// Drop any queued or speaking utterance
    fn cancel(&self);

    /// Start speaking; `on_done` fires when the utterance ends or errors
    fn speak(&self, utterance: &Utterance, on_done: oneshot::Sender<()>) -> bool;
}

/// Tone generator for the beep fallback
pub trait ToneSink: Send + Sync {
    /// Start a sine tone; returns false if the audio subsystem refused
    fn tone(&self, frequency_hz: f32, duration: Duration) -> bool;
}

// ========================================
// Backends
// ========================================

/// One way of producing audible output
pub trait SpeechBackend: Send + Sync {
    fn kind(&self) -> SpeechBackendKind;

    fn is_available(&self) -> bool;

    /// Start the output for `utterance`
    fn speak(&self, utterance: &Utterance) -> Result<Completion, SpeechError>;
}

/// Native bridge; completion is estimated from the text
pub struct NativeBackend {
    bridge: Arc<dyn HostSpeech>,
}

impl NativeBackend {
    pub fn new(bridge: Arc<dyn HostSpeech>) -> Self {
        Self { bridge }
    }
}

impl SpeechBackend for NativeBackend {
    fn kind(&self) -> SpeechBackendKind {
        SpeechBackendKind::Native
    }

    fn is_available(&self) -> bool {
        self.bridge.is_available()
    }

    fn speak(&self, utterance: &Utterance) -> Result<Completion, SpeechError> {
        if !self.is_available() {
            return Err(SpeechError::BackendUnavailable(self.kind()));
        }
        let locale = native_locale(&utterance.locale);
        if !self.bridge.speak(&utterance.text, &locale) {
            return Err(SpeechError::BackendFailure {
                kind: self.kind(),
                reason: "bridge refused the utterance".to_string(),
            });
        }
        Ok(Completion::After(estimate_speech_duration(
            &utterance.text,
            utterance.rate,
        )))
    }
}

/// Browser-style synthesis; at most one utterance in flight
pub struct BrowserBackend {
    synth: Arc<dyn SynthSpeech>,
}

impl BrowserBackend {
    pub fn new(synth: Arc<dyn SynthSpeech>) -> Self {
        Self { synth }
    }
}

impl SpeechBackend for BrowserBackend {
    fn kind(&self) -> SpeechBackendKind {
        SpeechBackendKind::Browser
    }

    fn is_available(&self) -> bool {
        self.synth.is_available()
    }

    fn speak(&self, utterance: &Utterance) -> Result<Completion, SpeechError> {
        if !self.is_available() {
            return Err(SpeechError::BackendUnavailable(self.kind()));
        }
        self.synth.cancel();

        let (done_tx, done_rx) = oneshot::channel();
        if !self.synth.speak(utterance, done_tx) {
            return Err(SpeechError::BackendFailure {
                kind: self.kind(),
                reason: "synthesizer refused the utterance".to_string(),
            });
        }
        Ok(Completion::Signal(done_rx))
    }
}

/// Two short tones; always available
pub struct BeepBackend {
    sink: Arc<dyn ToneSink>,
}

impl BeepBackend {
    pub fn new(sink: Arc<dyn ToneSink>) -> Self {
        Self { sink }
    }

    /// Play the double beep; the second tone is scheduled on the runtime
    pub fn beep(&self) -> bool {
        if !self.sink.tone(BEEP_FREQUENCY_HZ, BEEP_FIRST_TONE) {
            return false;
        }
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            tokio::time::sleep(BEEP_FIRST_TONE + BEEP_GAP).await;
            if !sink.tone(BEEP_FREQUENCY_HZ, BEEP_SECOND_TONE) {
                debug!("Second beep tone refused");
            }
        });
        true
    }
}

impl SpeechBackend for BeepBackend {
    fn kind(&self) -> SpeechBackendKind {
        SpeechBackendKind::Beep
    }

    fn is_available(&self) -> bool {
        true
    }

    fn speak(&self, _utterance: &Utterance) -> Result<Completion, SpeechError> {
        if self.beep() {
            Ok(Completion::After(BEEP_WINDOW))
        } else {
            Err(SpeechError::BackendFailure {
                kind: self.kind(),
                reason: "tone output refused".to_string(),
            })
        }
    }
}

/// The three strategies, by kind
#[derive(Clone)]
pub struct SpeechBackends {
    pub native: Arc<dyn SpeechBackend>,
    pub browser: Arc<dyn SpeechBackend>,
    pub beep: Arc<dyn SpeechBackend>,
}

impl SpeechBackends {
    pub fn new(
        host: Arc<dyn HostSpeech>,
        synth: Arc<dyn SynthSpeech>,
        tones: Arc<dyn ToneSink>,
    ) -> Self {
        Self {
            native: Arc::new(NativeBackend::new(host)),
            browser: Arc::new(BrowserBackend::new(synth)),
            beep: Arc::new(BeepBackend::new(tones)),
        }
    }

    pub fn get(&self, kind: SpeechBackendKind) -> &Arc<dyn SpeechBackend> {
        match kind {
            SpeechBackendKind::Native => &self.native,
            SpeechBackendKind::Browser => &self.browser,
            SpeechBackendKind::Beep => &self.beep,
        }
    }

    pub fn is_available(&self, kind: SpeechBackendKind) -> bool {
        self.get(kind).is_available()
    }
}

/// Ordered backends to try for a mode; beep is always last
pub fn candidates(mode: AnnounceMode) -> &'static [SpeechBackendKind] {
    use SpeechBackendKind::*;
    match mode {
        AnnounceMode::Auto => &[Native, Browser, Beep],
        AnnounceMode::Fully => &[Native, Beep],
        AnnounceMode::Web => &[Browser, Beep],
        AnnounceMode::Beep => &[Beep],
    }
}

/// Backend the mode selects, before any failure fallback
///
/// Forced modes report the missing capability instead of silently picking
/// another backend; `auto` takes the first available one.
pub fn choose_mode(
    mode: AnnounceMode,
    backends: &SpeechBackends,
) -> Result<SpeechBackendKind, SpeechError> {
    match mode {
        AnnounceMode::Fully => require(SpeechBackendKind::Native, backends),
        AnnounceMode::Web => require(SpeechBackendKind::Browser, backends),
        AnnounceMode::Beep => Ok(SpeechBackendKind::Beep),
        AnnounceMode::Auto => Ok(candidates(mode)
            .iter()
            .copied()
            .find(|kind| backends.is_available(*kind))
            .unwrap_or(SpeechBackendKind::Beep)),
    }
}

fn require(
    kind: SpeechBackendKind,
    backends: &SpeechBackends,
) -> Result<SpeechBackendKind, SpeechError> {
    if backends.is_available(kind) {
        Ok(kind)
    } else {
        Err(SpeechError::BackendUnavailable(kind))
    }
}

/// Estimated speaking time, clamped to the ducking bounds
pub fn estimate_speech_duration(text: &str, rate: f32) -> Duration {
    let words = text.split_whitespace().count().max(1) as f64;
    let rate = if rate.is_finite() && rate > 0.0 {
        f64::from(rate)
    } else {
        1.0
    };
    let ms = words / (BASE_WORDS_PER_MINUTE * rate) * 60_000.0;
    let ms = ms.clamp(
        MIN_SPEECH_ESTIMATE.as_millis() as f64,
        MAX_SPEECH_ESTIMATE.as_millis() as f64,
    );
    Duration::from_millis(ms.round() as u64)
}

/// Locale spelling expected by native bridges (`pt-BR` becomes `pt_BR`)
pub fn native_locale(locale: &str) -> String {
    locale.trim().replace('-', "_")
}
