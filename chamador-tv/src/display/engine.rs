//! Display state machine
//!
//! Holds the last-known snapshot of every feed and recomputes the display
//! from scratch whenever any of them (or the clock) moves. Feeds may arrive
//! in any order; nothing here assumes config comes before calls.
//!
//! Re-announcements are detected by identity only: a trigger nonce not seen
//! before, or a call event id not seen before. Content equality never
//! suppresses an announcement.

use super::grouping::{compute_group, filter_history, is_idle, pair_active, recent_items};
use crate::announce::AnnouncementRequest;
use crate::settings::OperatingConfig;
use chamador_common::events::{AnnounceSource, CallCard, DisplayState};
use chamador_common::model::{ActiveSlot, AnnounceTrigger, CallEvent};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayUpdate {
    pub state: DisplayState,
    /// Differs from the previously evaluated state
    pub changed: bool,
    /// `is_idle` flipped (always true on the first evaluation)
    pub idle_changed: bool,
}

/// Grouping engine state
#[derive(Debug)]
pub struct DisplayEngine {
    started_at: DateTime<Utc>,
    config: OperatingConfig,
    history: Vec<CallEvent>,
    slots: Vec<ActiveSlot>,
    forced_idle: bool,
    last_nonce: Option<String>,
    seen_call_ids: HashSet<String>,
    calls_seeded: bool,
    /// Pair (newest id, older id) already collapsed; never shown again
    evicted_pair: Option<(String, String)>,
    last_state: Option<DisplayState>,
}

impl DisplayEngine {
    pub fn new(started_at: DateTime<Utc>, config: OperatingConfig) -> Self {
        Self {
            started_at,
            config,
            history: Vec::new(),
            slots: Vec::new(),
            forced_idle: false,
            last_nonce: None,
            seen_call_ids: HashSet::new(),
            calls_seeded: false,
            evicted_pair: None,
            last_state: None,
        }
    }

    pub fn config(&self) -> &OperatingConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: OperatingConfig) {
        self.config = config;
    }

    pub fn forced_idle(&self) -> bool {
        self.forced_idle
    }

    pub fn history(&self) -> &[CallEvent] {
        &self.history
    }

    /// Apply a recent-calls snapshot; returns announcements for new events
    ///
    /// The first snapshot only seeds the seen set.
    pub fn apply_calls(&mut self, events: Vec<CallEvent>) -> Vec<AnnouncementRequest> {
        let mut requests = Vec::new();

        if self.calls_seeded {
            // Oldest first so announcements follow arrival order
            let mut fresh: Vec<&CallEvent> = events
                .iter()
                .filter(|e| !self.seen_call_ids.contains(&e.id))
                .collect();
            fresh.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

            for event in fresh {
                if let Some(source) = self.source_for(event) {
                    requests.push(AnnouncementRequest::new(&event.name, &event.room, source));
                }
            }
        } else {
            debug!("Seeding {} known call events", events.len());
            self.calls_seeded = true;
        }

        self.seen_call_ids = events.iter().map(|e| e.id.clone()).collect();
        self.history = filter_history(&events);
        requests
    }

    fn source_for(&self, event: &CallEvent) -> Option<AnnounceSource> {
        if event.is_recall {
            Some(AnnounceSource::Recall)
        } else if event.is_test {
            self.config.announce_tests.then_some(AnnounceSource::Test)
        } else {
            self.config
                .announce_new_calls
                .then_some(AnnounceSource::Call)
        }
    }

    /// Apply a trigger write; returns the announcement it asks for, if any
    pub fn apply_trigger(&mut self, trigger: AnnounceTrigger) -> Option<AnnouncementRequest> {
        if self.last_nonce.as_deref() == Some(trigger.nonce.as_str()) {
            return None;
        }

        if let Some(idle) = trigger.idle {
            if idle != self.forced_idle {
                info!("Idle override {}", if idle { "set" } else { "lifted" });
            }
            self.forced_idle = idle;
        }

        let first = self.last_nonce.is_none();
        self.last_nonce = Some(trigger.nonce.clone());

        let stale = trigger
            .triggered_at
            .map_or(true, |at| at < self.started_at);
        if first && stale {
            debug!("Trigger {} predates startup; not announcing", trigger.nonce);
            return None;
        }

        if trigger.name.trim().is_empty() {
            return None;
        }
        Some(AnnouncementRequest::new(
            trigger.name,
            trigger.room,
            AnnounceSource::Trigger,
        ))
    }

    pub fn apply_slots(&mut self, slots: Vec<ActiveSlot>) {
        self.slots = slots;
    }

    /// Recompute the display for `now_ms`
    pub fn evaluate(&mut self, now_ms: i64) -> DisplayUpdate {
        let last_call_at = self.history.first().map(CallEvent::created_ms);
        let idle = is_idle(
            self.forced_idle,
            last_call_at,
            self.config.idle_timeout_ms(),
            now_ms,
        );

        let pair_key = match self.history.as_slice() {
            [newest, older, ..] => Some((newest.id.clone(), older.id.clone())),
            _ => None,
        };
        let mut group = compute_group(&self.history, idle, now_ms);
        if group.len() == 2 && pair_key.is_some() && pair_key == self.evicted_pair {
            group.truncate(1);
        } else if pair_key.is_some() && !pair_active(&self.history, now_ms) {
            // Remember a collapsed pair so a clock step back cannot revive it
            self.evicted_pair = pair_key;
        }
        let recent = recent_items(&self.history, &group);

        let state = DisplayState {
            is_idle: idle,
            forced_idle: self.forced_idle,
            current_group: group.iter().map(to_card).collect(),
            recent_items: recent.iter().map(to_card).collect(),
            active_slots: self.slots.clone(),
            highlight_color: self.config.highlight_color.clone(),
            video_id: self.config.video_id.clone(),
            idle_seconds: self.config.idle_seconds,
        };

        let previous = self.last_state.replace(state.clone());
        let idle_changed = previous.as_ref().map_or(true, |p| p.is_idle != idle);
        let changed = previous.as_ref() != Some(&state);

        DisplayUpdate {
            state,
            changed,
            idle_changed,
        }
    }
}

fn to_card(event: &CallEvent) -> CallCard {
    CallCard {
        id: event.id.clone(),
        name: event.name.clone(),
        room: event.room.clone(),
        called_at: event.created_at,
    }
}
