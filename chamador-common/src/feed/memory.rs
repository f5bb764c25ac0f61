//! In-process push feed
//!
//! Snapshot-style records (calls, config, slots) ride on `watch` channels:
//! a slow consumer only ever needs the latest snapshot. Triggers ride on a
//! `broadcast` channel instead, because two quick writes with identical
//! content must both reach the consumer; coalescing them would swallow a
//! re-announcement.

use super::{ConfigSnapshot, EventFeed, FeedError, FeedStream};
use crate::model::{compare_rooms, sort_newest_first, ActiveSlot, AnnounceTrigger, CallEvent};
use futures::stream::{self, StreamExt};
use std::sync::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, WatchStream};

const TRIGGER_CHANNEL_CAPACITY: usize = 64;

/// Feed held entirely in memory
#[derive(Debug)]
pub struct MemoryFeed {
    calls: watch::Sender<Vec<CallEvent>>,
    config: watch::Sender<ConfigSnapshot>,
    slots: watch::Sender<Vec<ActiveSlot>>,
    trigger: Mutex<Option<AnnounceTrigger>>,
    trigger_tx: broadcast::Sender<AnnounceTrigger>,
}

impl MemoryFeed {
    pub fn new() -> Self {
        let (calls, _) = watch::channel(Vec::new());
        let (config, _) = watch::channel(ConfigSnapshot::default());
        let (slots, _) = watch::channel(Vec::new());
        let (trigger_tx, _) = broadcast::channel(TRIGGER_CHANNEL_CAPACITY);
        Self {
            calls,
            config,
            slots,
            trigger: Mutex::new(None),
            trigger_tx,
        }
    }

    /// Replace the call log (re-sorted newest first)
    pub fn publish_calls(&self, mut calls: Vec<CallEvent>) {
        sort_newest_first(&mut calls);
        self.calls.send_replace(calls);
    }

    /// Append one call to the log
    pub fn append_call(&self, event: CallEvent) {
        self.calls.send_modify(|calls| {
            calls.push(event);
            sort_newest_first(calls);
        });
    }

    /// Replace the configuration collection
    pub fn publish_config(&self, snapshot: ConfigSnapshot) {
        self.config.send_replace(snapshot);
    }

    /// Replace the active slots (re-sorted in natural room order)
    pub fn publish_slots(&self, mut slots: Vec<ActiveSlot>) {
        slots.sort_by(|a, b| compare_rooms(&a.room, &b.room));
        self.slots.send_replace(slots);
    }

    /// Overwrite the trigger record and notify every subscriber
    pub fn write_trigger(&self, trigger: AnnounceTrigger) {
        let mut current = self.trigger.lock().unwrap_or_else(|e| e.into_inner());
        *current = Some(trigger.clone());
        // No subscribers is fine; the record is still stored
        let _ = self.trigger_tx.send(trigger);
    }

    pub fn current_calls(&self) -> Vec<CallEvent> {
        self.calls.borrow().clone()
    }

    pub fn current_config(&self) -> ConfigSnapshot {
        self.config.borrow().clone()
    }

    pub fn current_slots(&self) -> Vec<ActiveSlot> {
        self.slots.borrow().clone()
    }

    pub fn current_trigger(&self) -> Option<AnnounceTrigger> {
        self.trigger
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MemoryFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl EventFeed for MemoryFeed {
    fn subscribe_recent_calls(&self, limit: usize) -> FeedStream<Vec<CallEvent>> {
        WatchStream::new(self.calls.subscribe())
            .map(move |calls| Ok(calls.into_iter().take(limit).collect()))
            .boxed()
    }

    fn subscribe_announce_trigger(&self) -> FeedStream<AnnounceTrigger> {
        // Subscribe under the record lock so no write falls between the
        // snapshot and the live stream
        let (rx, current) = {
            let guard = self.trigger.lock().unwrap_or_else(|e| e.into_inner());
            (self.trigger_tx.subscribe(), guard.clone())
        };

        let live = BroadcastStream::new(rx).map(|item| {
            item.map_err(|BroadcastStreamRecvError::Lagged(skipped)| FeedError::Lagged(skipped))
        });

        stream::iter(current.map(Ok)).chain(live).boxed()
    }

    fn subscribe_config(&self) -> FeedStream<ConfigSnapshot> {
        WatchStream::new(self.config.subscribe()).map(Ok).boxed()
    }

    fn subscribe_active_slots(&self) -> FeedStream<Vec<ActiveSlot>> {
        WatchStream::new(self.slots.subscribe()).map(Ok).boxed()
    }
}
