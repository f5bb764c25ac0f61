//! Call, trigger and room-slot records
//!
//! These are the records exchanged between the admin producer and the TV
//! consumer. Field names serialise in camelCase to match the stored documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One request to call a patient to a room
///
/// Immutable once recorded. The feed is append-only and delivered newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    /// Opaque unique identifier assigned at creation
    pub id: String,
    /// Display/spoken patient name (may be empty; empty names are never spoken)
    pub name: String,
    /// Room/office token (may be empty)
    #[serde(default)]
    pub room: String,
    /// Server-assigned creation time
    pub created_at: DateTime<Utc>,
    /// Created to verify sound on the TV; never shown in history
    #[serde(default)]
    pub is_test: bool,
    /// Duplicate announcement of an already-recorded call; never counted twice
    #[serde(default)]
    pub is_recall: bool,
}

impl CallEvent {
    /// Creation time in epoch milliseconds
    pub fn created_ms(&self) -> i64 {
        self.created_at.timestamp_millis()
    }

    /// Whether this event belongs in the visible history
    pub fn is_displayable(&self) -> bool {
        !self.is_test && !self.is_recall
    }
}

/// Payload for a call the producer wants recorded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCall {
    pub name: String,
    #[serde(default)]
    pub room: String,
    #[serde(default)]
    pub is_test: bool,
    #[serde(default)]
    pub is_recall: bool,
}

impl NewCall {
    /// Ordinary call
    pub fn call(name: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            room: room.into(),
            ..Default::default()
        }
    }

    /// Test call (spoken, never displayed)
    pub fn test(name: impl Into<String>, room: impl Into<String>) -> Self {
        Self {
            is_test: true,
            ..Self::call(name, room)
        }
    }
}

/// Frequently-overwritten "speak this now" record
///
/// Consumers react to `nonce` changes only. Name and room may repeat between
/// writes, so content equality never means "already handled".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnounceTrigger {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub room: String,
    /// When present, forces (true) or releases (false) the idle display
    #[serde(default)]
    pub idle: Option<bool>,
    /// Changes on every write
    pub nonce: String,
    /// Server-assigned write time, when known
    #[serde(default)]
    pub triggered_at: Option<DateTime<Utc>>,
}

/// Per-room presence record: "room N is calling patient X since T"
///
/// Mutated in place. `ping_nonce` changes on re-announcement without
/// touching `since`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSlot {
    pub room: String,
    pub name: String,
    pub since: DateTime<Utc>,
    #[serde(default)]
    pub ack: bool,
    pub ping_nonce: String,
    #[serde(default)]
    pub last_announced_at: Option<DateTime<Utc>>,
}

/// Natural ordering for room tokens ("2" sorts before "10")
///
/// Numeric tokens sort before non-numeric ones; non-numeric tokens compare
/// lexicographically.
pub fn compare_rooms(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<u64>(), b.trim().parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

/// Sort call events newest first, ties broken by id for a stable order
pub fn sort_newest_first(events: &mut [CallEvent]) {
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
}
