//! Supporting types carried by events and shared with the TV page

use crate::model::ActiveSlot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why an announcement was enqueued
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AnnounceSource {
    /// A new announce-trigger nonce
    Trigger,
    /// A call event flagged as a recall
    Recall,
    /// A test-flagged call event
    Test,
    /// A newly seen ordinary call event
    Call,
}

impl std::fmt::Display for AnnounceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AnnounceSource::Trigger => write!(f, "trigger"),
            AnnounceSource::Recall => write!(f, "recall"),
            AnnounceSource::Test => write!(f, "test"),
            AnnounceSource::Call => write!(f, "call"),
        }
    }
}

/// Audible output strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SpeechBackendKind {
    /// Device/kiosk speech bridge (no completion callback)
    Native,
    /// Standard speech-synthesis capability (genuine completion callback)
    Browser,
    /// Two short synthesized tones
    Beep,
}

impl std::fmt::Display for SpeechBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeechBackendKind::Native => write!(f, "native"),
            SpeechBackendKind::Browser => write!(f, "browser"),
            SpeechBackendKind::Beep => write!(f, "beep"),
        }
    }
}

/// A call as rendered on a card or history chip
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CallCard {
    pub id: String,
    pub name: String,
    pub room: String,
    pub called_at: DateTime<Utc>,
}

/// Everything the TV screen needs to render itself
///
/// The page is a pure function of this value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DisplayState {
    /// Passive (logo) display
    pub is_idle: bool,
    /// Idle because an operator/trigger forced it
    pub forced_idle: bool,
    /// Cards currently calling (0 when idle, otherwise 1 or 2)
    pub current_group: Vec<CallCard>,
    /// Already-called chips, disjoint from `current_group`, at most 2
    pub recent_items: Vec<CallCard>,
    /// Occupied rooms in natural room order
    pub active_slots: Vec<ActiveSlot>,
    pub highlight_color: String,
    pub video_id: Option<String>,
    pub idle_seconds: u32,
}
