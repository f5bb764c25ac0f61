//! Feed interface between the datastore and the TV engine
//!
//! The engine never talks to the persistence technology directly. It
//! subscribes to four push streams, each delivering the current snapshot
//! first and then every change:
//! - recent calls (newest first, bounded)
//! - the announce trigger record
//! - the configuration collection
//! - the per-room active slots
//!
//! A stream yielding `Err` is a transient failure; a stream ending means the
//! subscription was lost and the consumer should subscribe again.

mod memory;

pub use memory::MemoryFeed;

use crate::model::{ActiveSlot, AnnounceTrigger, CallEvent};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Well-known id of the primary configuration record
pub const MAIN_CONFIG_ID: &str = "main";

/// Feed-side failures (always absorbed by the consumer)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Subscription dropped by the backing store
    #[error("Feed disconnected: {0}")]
    Disconnected(String),

    /// Consumer fell behind and missed updates
    #[error("Feed lagged, {0} updates skipped")]
    Lagged(u64),

    /// A record could not be decoded
    #[error("Feed decode error: {0}")]
    Decode(String),
}

/// Boxed subscription stream
pub type FeedStream<T> = BoxStream<'static, Result<T, FeedError>>;

/// One stored configuration document (raw JSON, possibly partial)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub id: String,
    pub body: serde_json::Value,
}

/// Snapshot of the configuration collection
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub documents: Vec<ConfigDocument>,
}

impl ConfigSnapshot {
    /// Snapshot holding only the primary record
    pub fn main(body: serde_json::Value) -> Self {
        Self {
            documents: vec![ConfigDocument {
                id: MAIN_CONFIG_ID.to_string(),
                body,
            }],
        }
    }

    /// The well-known primary record, if stored
    pub fn primary(&self) -> Option<&serde_json::Value> {
        self.documents
            .iter()
            .find(|d| d.id == MAIN_CONFIG_ID)
            .map(|d| &d.body)
    }

    /// First non-primary record in collection order
    ///
    /// Collection order is not meaningful; callers must not rely on which
    /// record wins when several exist.
    pub fn fallback(&self) -> Option<&serde_json::Value> {
        self.documents
            .iter()
            .find(|d| d.id != MAIN_CONFIG_ID)
            .map(|d| &d.body)
    }

    /// Id of the record the resolver reads: the primary if stored, else the
    /// fallback, else the primary id for a record yet to be created
    pub fn resolved_id(&self) -> &str {
        if self.primary().is_some() {
            return MAIN_CONFIG_ID;
        }
        self.documents
            .iter()
            .find(|d| d.id != MAIN_CONFIG_ID)
            .map_or(MAIN_CONFIG_ID, |d| d.id.as_str())
    }
}

/// Subscribable source of everything the TV engine consumes
pub trait EventFeed: Send + Sync {
    /// Most recent `limit` call events, newest first
    fn subscribe_recent_calls(&self, limit: usize) -> FeedStream<Vec<CallEvent>>;

    /// The announce trigger record, on every write
    fn subscribe_announce_trigger(&self) -> FeedStream<AnnounceTrigger>;

    /// The configuration collection
    fn subscribe_config(&self) -> FeedStream<ConfigSnapshot>;

    /// Per-room active slots
    fn subscribe_active_slots(&self) -> FeedStream<Vec<ActiveSlot>>;
}
