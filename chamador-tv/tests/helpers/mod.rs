//! Test doubles for chamador-tv integration tests
//!
//! - RecordingPlayer: remembers every volume written
//! - ScriptedBackend: speech backend with fixed availability/outcome
//! - RecordingAnnouncer: logs announcements with their start/end instants
//! - ScriptedFeed: feed whose call subscriptions follow a script
//! - TestTv: context + fakes wired together

#![allow(dead_code)]

use async_trait::async_trait;
use chamador_common::events::{ChamadorEvent, EventBus, SpeechBackendKind};
use chamador_common::feed::{ConfigSnapshot, EventFeed, FeedError, FeedStream};
use chamador_common::model::{ActiveSlot, AnnounceTrigger, CallEvent};
use chamador_common::time::{from_millis, ManualClock};
use chamador_tv::announce::{Announce, AnnouncementReport, AnnouncementRequest};
use chamador_tv::context::TvContext;
use chamador_tv::ducking::{AudioDucker, PlayerControl};
use chamador_tv::settings::OperatingConfig;
use chamador_tv::speech::{Completion, SpeechBackend, SpeechBackends, SpeechError, Utterance};
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;

/// Wall-clock start used by every test (2023-11-14)
pub const START_MS: i64 = 1_700_000_000_000;

// ============================================================================
// Player
// ============================================================================

#[derive(Default)]
pub struct RecordingPlayer {
    volumes: Mutex<Vec<u8>>,
}

impl RecordingPlayer {
    pub fn volumes(&self) -> Vec<u8> {
        self.volumes.lock().unwrap().clone()
    }
}

impl PlayerControl for RecordingPlayer {
    fn set_volume(&self, volume: u8) {
        self.volumes.lock().unwrap().push(volume);
    }

    fn unmute(&self) {}

    fn volume(&self) -> Option<u8> {
        self.volumes.lock().unwrap().last().copied()
    }
}

// ============================================================================
// Speech
// ============================================================================

/// What a scripted backend does when asked to speak
#[derive(Clone, Copy)]
pub enum Outcome {
    /// Accept; done after this long
    After(Duration),
    /// Accept; completion never signalled
    NeverCompletes,
    /// Refuse
    Refuse,
}

pub struct ScriptedBackend {
    kind: SpeechBackendKind,
    available: bool,
    outcome: Outcome,
    calls: AtomicUsize,
    held: Mutex<Vec<tokio::sync::oneshot::Sender<()>>>,
}

impl ScriptedBackend {
    pub fn new(kind: SpeechBackendKind, available: bool, outcome: Outcome) -> Arc<Self> {
        Arc::new(Self {
            kind,
            available,
            outcome,
            calls: AtomicUsize::new(0),
            held: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SpeechBackend for ScriptedBackend {
    fn kind(&self) -> SpeechBackendKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.available
    }

    fn speak(&self, _utterance: &Utterance) -> Result<Completion, SpeechError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.available {
            return Err(SpeechError::BackendUnavailable(self.kind));
        }
        match self.outcome {
            Outcome::After(d) => Ok(Completion::After(d)),
            Outcome::NeverCompletes => {
                let (tx, rx) = tokio::sync::oneshot::channel();
                // Keep the sender alive so the receiver never resolves
                self.held.lock().unwrap().push(tx);
                Ok(Completion::Signal(rx))
            }
            Outcome::Refuse => Err(SpeechError::BackendFailure {
                kind: self.kind,
                reason: "scripted refusal".to_string(),
            }),
        }
    }
}

pub struct Backends {
    pub native: Arc<ScriptedBackend>,
    pub browser: Arc<ScriptedBackend>,
    pub beep: Arc<ScriptedBackend>,
}

impl Backends {
    pub fn new(native: (bool, Outcome), browser: (bool, Outcome)) -> Self {
        Self {
            native: ScriptedBackend::new(SpeechBackendKind::Native, native.0, native.1),
            browser: ScriptedBackend::new(SpeechBackendKind::Browser, browser.0, browser.1),
            beep: ScriptedBackend::new(
                SpeechBackendKind::Beep,
                true,
                Outcome::After(Duration::from_millis(1_200)),
            ),
        }
    }

    pub fn speech(&self) -> SpeechBackends {
        SpeechBackends {
            native: self.native.clone(),
            browser: self.browser.clone(),
            beep: self.beep.clone(),
        }
    }
}

// ============================================================================
// Announcer
// ============================================================================

#[derive(Debug, Clone)]
pub struct Spoken {
    pub name: String,
    pub room: String,
    pub started: Instant,
    pub ended: Instant,
}

/// Takes a fixed time per announcement and logs it
pub struct RecordingAnnouncer {
    took: Duration,
    log: Mutex<Vec<Spoken>>,
}

impl RecordingAnnouncer {
    pub fn new(took: Duration) -> Arc<Self> {
        Arc::new(Self {
            took,
            log: Mutex::new(Vec::new()),
        })
    }

    pub fn spoken(&self) -> Vec<Spoken> {
        self.log.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.spoken().into_iter().map(|s| s.name).collect()
    }
}

#[async_trait]
impl Announce for RecordingAnnouncer {
    async fn announce(&self, request: &AnnouncementRequest) -> AnnouncementReport {
        let started = Instant::now();
        tokio::time::sleep(self.took).await;
        self.log.lock().unwrap().push(Spoken {
            name: request.name.clone(),
            room: request.room.clone(),
            started,
            ended: Instant::now(),
        });
        AnnouncementReport {
            text: request.name.clone(),
            backend: SpeechBackendKind::Beep,
            failures: Vec::new(),
        }
    }
}

// ============================================================================
// Feed
// ============================================================================

type CallsItem = Result<Vec<CallEvent>, FeedError>;

/// Each call subscription replays the next script, then ends
///
/// Once the scripts run out, subscriptions stay open and silent.
pub struct ScriptedFeed {
    scripts: Mutex<VecDeque<Vec<CallsItem>>>,
    subscriptions: AtomicUsize,
}

impl ScriptedFeed {
    pub fn new(scripts: Vec<Vec<CallsItem>>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            subscriptions: AtomicUsize::new(0),
        })
    }

    pub fn call_subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }
}

impl EventFeed for ScriptedFeed {
    fn subscribe_recent_calls(&self, _limit: usize) -> FeedStream<Vec<CallEvent>> {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        match self.scripts.lock().unwrap().pop_front() {
            Some(items) => stream::iter(items).boxed(),
            None => stream::pending().boxed(),
        }
    }

    fn subscribe_announce_trigger(&self) -> FeedStream<AnnounceTrigger> {
        stream::pending().boxed()
    }

    fn subscribe_config(&self) -> FeedStream<ConfigSnapshot> {
        stream::pending().boxed()
    }

    fn subscribe_active_slots(&self) -> FeedStream<Vec<ActiveSlot>> {
        stream::pending().boxed()
    }
}

// ============================================================================
// Wiring
// ============================================================================

pub struct TestTv {
    pub ctx: Arc<TvContext>,
    pub clock: Arc<ManualClock>,
    pub player: Arc<RecordingPlayer>,
    pub ducker: AudioDucker,
}

impl TestTv {
    pub fn new(speech: SpeechBackends, config: OperatingConfig) -> Self {
        let clock = Arc::new(ManualClock::at_millis(START_MS));
        let player = Arc::new(RecordingPlayer::default());
        let bus = Arc::new(EventBus::new(256));
        let ctx = Arc::new(
            TvContext::new(bus, player.clone(), speech)
                .with_clock(clock.clone())
                .with_config(config),
        );
        let ducker = AudioDucker::new(player.clone(), ctx.config.clone(), ctx.bus.clone());
        Self {
            ctx,
            clock,
            player,
            ducker,
        }
    }

    pub fn events(&self) -> broadcast::Receiver<ChamadorEvent> {
        self.ctx.bus.subscribe()
    }
}

/// Drain everything currently buffered on a bus receiver
pub fn drain(rx: &mut broadcast::Receiver<ChamadorEvent>) -> Vec<ChamadorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn call(id: &str, name: &str, room: &str, ms: i64) -> CallEvent {
    CallEvent {
        id: id.to_string(),
        name: name.to_string(),
        room: room.to_string(),
        created_at: from_millis(ms),
        is_test: false,
        is_recall: false,
    }
}

pub fn trigger(nonce: &str, name: &str, room: &str, ms: i64) -> AnnounceTrigger {
    AnnounceTrigger {
        name: name.to_string(),
        room: room.to_string(),
        idle: None,
        nonce: nonce.to_string(),
        triggered_at: Some(from_millis(ms)),
    }
}
