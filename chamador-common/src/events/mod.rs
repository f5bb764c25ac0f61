//! Event types for the Chamador event system
//!
//! Provides the shared event definitions and the EventBus used by the TV
//! engine, its host bridges and the SSE endpoint.

mod types;

pub use types::{AnnounceSource, CallCard, DisplayState, SpeechBackendKind};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Chamador event types
///
/// Events are broadcast via EventBus and serialised for SSE transmission.
/// Some variants are commands for the page-side bridges (speech, tones,
/// player volume); the page acts on them and never feeds state back except
/// through the speech-completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChamadorEvent {
    /// Display state recomputed and different from the previous one
    DisplayChanged {
        state: DisplayState,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Idle display entered or left
    IdleChanged {
        idle: bool,
        forced: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Announcement request accepted by the queue
    AnnouncementQueued {
        name: String,
        room: String,
        source: AnnounceSource,
        /// Requests waiting behind the one in flight (including this one)
        pending: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Announcement dequeued; ducking begins
    AnnouncementStarted {
        name: String,
        room: String,
        text: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Announcement finished; ducking window closed
    AnnouncementFinished {
        name: String,
        room: String,
        backend: SpeechBackendKind,
        /// True when the chosen backend was not the first candidate
        fell_back: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Secondary player lowered for speech
    DuckStarted {
        volume: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Secondary player restored after speech
    DuckEnded {
        volume: u8,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Command for the embedded video player
    PlayerVolumeChanged {
        volume: u8,
        unmuted: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Command for the page speech bridge
    SpeechRequested {
        utterance_id: Uuid,
        text: String,
        lang: String,
        rate: f32,
        pitch: f32,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Command for the page speech bridge: drop an unfinished utterance
    SpeechCancelled {
        utterance_id: Uuid,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Command for the page tone generator
    ToneRequested {
        frequency_hz: f32,
        duration_ms: u64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A feed subscription errored or ended
    FeedInterrupted {
        feed: String,
        message: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl ChamadorEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            ChamadorEvent::DisplayChanged { .. } => "DisplayChanged",
            ChamadorEvent::IdleChanged { .. } => "IdleChanged",
            ChamadorEvent::AnnouncementQueued { .. } => "AnnouncementQueued",
            ChamadorEvent::AnnouncementStarted { .. } => "AnnouncementStarted",
            ChamadorEvent::AnnouncementFinished { .. } => "AnnouncementFinished",
            ChamadorEvent::DuckStarted { .. } => "DuckStarted",
            ChamadorEvent::DuckEnded { .. } => "DuckEnded",
            ChamadorEvent::PlayerVolumeChanged { .. } => "PlayerVolumeChanged",
            ChamadorEvent::SpeechRequested { .. } => "SpeechRequested",
            ChamadorEvent::SpeechCancelled { .. } => "SpeechCancelled",
            ChamadorEvent::ToneRequested { .. } => "ToneRequested",
            ChamadorEvent::FeedInterrupted { .. } => "FeedInterrupted",
        }
    }
}

/// Central event distribution bus
///
/// Thin wrapper over `tokio::sync::broadcast`. Slow subscribers lag and lose
/// the oldest events; emitters never block.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<ChamadorEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use chamador_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(256);
    /// assert_eq!(event_bus.capacity(), 256);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<ChamadorEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)` if at least one subscriber exists.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: ChamadorEvent,
    ) -> Result<usize, broadcast::error::SendError<ChamadorEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: ChamadorEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
