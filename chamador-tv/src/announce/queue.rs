//! FIFO announcement queue
//!
//! At most one announcement is in flight. A worker task drains the pending
//! list in arrival order; each item holds the floor until both its own
//! announcement has finished and the settle delay (counted from its start)
//! has passed. A burst of N requests yields N sequential announcements.

use super::{Announce, AnnouncementRequest};
use chamador_common::events::{AnnounceSource, ChamadorEvent, EventBus};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

/// Minimum spacing between the starts of two announcements
pub const SETTLE_DELAY: Duration = Duration::from_millis(4_500);

#[derive(Default)]
struct QueueState {
    pending: VecDeque<AnnouncementRequest>,
    playing: bool,
    worker: Option<JoinHandle<()>>,
}

struct QueueInner {
    announcer: Arc<dyn Announce>,
    bus: Arc<EventBus>,
    settle: Duration,
    state: Mutex<QueueState>,
}

impl QueueInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Serializes announcements
#[derive(Clone)]
pub struct AnnouncementQueue {
    inner: Arc<QueueInner>,
}

impl AnnouncementQueue {
    pub fn new(announcer: Arc<dyn Announce>, bus: Arc<EventBus>) -> Self {
        Self::with_settle(announcer, bus, SETTLE_DELAY)
    }

    pub fn with_settle(announcer: Arc<dyn Announce>, bus: Arc<EventBus>, settle: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                announcer,
                bus,
                settle,
                state: Mutex::new(QueueState::default()),
            }),
        }
    }

    /// Queue a request and start draining; blank names are ignored
    ///
    /// Returns whether the request was accepted.
    pub fn enqueue(&self, name: &str, room: &str, source: AnnounceSource) -> bool {
        let name = name.trim();
        if name.is_empty() {
            debug!("Ignoring announcement with empty name ({})", source);
            return false;
        }

        let request = AnnouncementRequest::new(name, room.trim(), source);
        let pending = {
            let mut state = self.inner.lock_state();
            state.pending.push_back(request);
            state.pending.len()
        };

        info!("Queued announcement {} / room '{}' ({} pending)", name, room.trim(), pending);
        self.inner.bus.emit_lossy(ChamadorEvent::AnnouncementQueued {
            name: name.to_string(),
            room: room.trim().to_string(),
            source,
            pending,
            timestamp: chrono::Utc::now(),
        });

        self.drain();
        true
    }

    /// Start the worker if nothing is playing
    pub fn drain(&self) {
        let mut state = self.inner.lock_state();
        if state.playing || state.pending.is_empty() {
            return;
        }
        state.playing = true;

        let inner = Arc::clone(&self.inner);
        state.worker = Some(tokio::spawn(async move {
            loop {
                let next = {
                    let mut state = inner.lock_state();
                    match state.pending.pop_front() {
                        Some(request) => request,
                        None => {
                            state.playing = false;
                            state.worker = None;
                            return;
                        }
                    }
                };

                let started = Instant::now();
                let report = inner.announcer.announce(&next).await;
                debug!("Announcement done via {}", report.backend);
                tokio::time::sleep_until(started + inner.settle).await;
            }
        }));
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock_state().playing
    }

    /// Requests waiting behind the one in flight
    pub fn pending_len(&self) -> usize {
        self.inner.lock_state().pending.len()
    }

    /// Drop pending requests and stop the worker
    ///
    /// An announcement cut off here still restores the player: its duck
    /// token ends when the task is dropped.
    pub fn shutdown(&self) {
        let mut state = self.inner.lock_state();
        state.pending.clear();
        state.playing = false;
        if let Some(worker) = state.worker.take() {
            worker.abort();
        }
    }
}
