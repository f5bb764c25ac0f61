//! Audio ducking of the secondary (video) player
//!
//! # Protocol
//!
//! - `duck_start`: lower the player to the duck volume and unmute it. The
//!   returned [`DuckToken`] is the only way to end the duck.
//! - `DuckToken::end` (or dropping the token): restore the player to the
//!   restore volume after a 120ms debounce. A new duck inside the debounce
//!   cancels the pending restore so the volume does not flap.
//!
//! One token per start, consumed on end, means every start is paired with
//! exactly one end even when the announcing task is cancelled.
//!
//! The player is an external collaborator behind [`PlayerControl`]. Volume
//! writes are last-write-wins, so every write happens under the state lock
//! together with the check that allows it. [`AudioDucker::reconcile`]
//! re-asserts the restore volume only while no duck is active or pending.
//! Player implementations must not call back into the ducker.

use crate::settings::ConfigHandle;
use chamador_common::events::{ChamadorEvent, EventBus};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Delay between the end of speech and the volume restore
pub const RESTORE_DEBOUNCE: Duration = Duration::from_millis(120);

/// Volume control of the embedded video player
pub trait PlayerControl: Send + Sync {
    /// Set volume (0-100)
    fn set_volume(&self, volume: u8);

    fn unmute(&self);

    /// Last known volume, if the player reports one
    fn volume(&self) -> Option<u8>;
}

#[derive(Default)]
struct DuckState {
    /// Ducks started and not yet ended
    active: usize,
    /// Debounced restore waiting to run
    pending_restore: Option<JoinHandle<()>>,
    /// Bumped on every start; a restore only applies to its own generation
    generation: u64,
}

impl DuckState {
    fn ducking(&self) -> bool {
        self.active > 0
            || self
                .pending_restore
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }
}

struct DuckerInner {
    player: Arc<dyn PlayerControl>,
    config: ConfigHandle,
    bus: Arc<EventBus>,
    state: Mutex<DuckState>,
    starts: AtomicU64,
    ends: AtomicU64,
}

/// Lowers and restores the secondary player around announcements
#[derive(Clone)]
pub struct AudioDucker {
    inner: Arc<DuckerInner>,
}

impl AudioDucker {
    pub fn new(player: Arc<dyn PlayerControl>, config: ConfigHandle, bus: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(DuckerInner {
                player,
                config,
                bus,
                state: Mutex::new(DuckState::default()),
                starts: AtomicU64::new(0),
                ends: AtomicU64::new(0),
            }),
        }
    }

    /// Lower the player; keep the token until the speech is over
    pub fn duck_start(&self) -> DuckToken {
        let volume = self.inner.config.get().duck_volume;
        {
            let mut state = self.inner.lock_state();
            state.active += 1;
            state.generation += 1;
            if let Some(pending) = state.pending_restore.take() {
                pending.abort();
            }
            self.inner.player.set_volume(volume);
            self.inner.player.unmute();
        }
        self.inner.starts.fetch_add(1, Ordering::SeqCst);
        debug!("Duck start (volume {})", volume);
        self.inner.bus.emit_lossy(ChamadorEvent::DuckStarted {
            volume,
            timestamp: chrono::Utc::now(),
        });

        DuckToken {
            inner: Some(Arc::clone(&self.inner)),
        }
    }

    /// True while a duck is active or its restore is still pending
    pub fn is_ducking(&self) -> bool {
        self.inner.lock_state().ducking()
    }

    /// Re-assert the restore volume if nothing is ducking
    ///
    /// Returns true when the player was corrected.
    pub fn reconcile(&self) -> bool {
        let state = self.inner.lock_state();
        if state.ducking() {
            return false;
        }
        let restore = self.inner.config.get().restore_volume;
        if self.inner.player.volume() == Some(restore) {
            return false;
        }
        info!("Re-asserting player volume {}", restore);
        self.inner.player.set_volume(restore);
        true
    }

    /// Number of duck starts so far
    pub fn starts(&self) -> u64 {
        self.inner.starts.load(Ordering::SeqCst)
    }

    /// Number of duck ends so far
    pub fn ends(&self) -> u64 {
        self.inner.ends.load(Ordering::SeqCst)
    }
}

impl DuckerInner {
    fn lock_state(&self) -> std::sync::MutexGuard<'_, DuckState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn end(self: &Arc<Self>) {
        let restore = self.config.get().restore_volume;
        self.ends.fetch_add(1, Ordering::SeqCst);
        debug!("Duck end (restoring to {} after debounce)", restore);
        self.bus.emit_lossy(ChamadorEvent::DuckEnded {
            volume: restore,
            timestamp: chrono::Utc::now(),
        });

        let mut state = self.lock_state();
        state.active = state.active.saturating_sub(1);
        if state.active > 0 {
            return;
        }
        let generation = state.generation;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let inner = Arc::clone(self);
                state.pending_restore = Some(handle.spawn(async move {
                    tokio::time::sleep(RESTORE_DEBOUNCE).await;
                    inner.apply_restore(generation);
                }));
            }
            Err(_) => {
                // No runtime (shutdown): restore immediately
                drop(state);
                self.apply_restore(generation);
            }
        }
    }

    fn apply_restore(&self, generation: u64) {
        let state = self.lock_state();
        if state.active > 0 || state.generation != generation {
            return;
        }
        let restore = self.config.get().restore_volume;
        self.player.set_volume(restore);
    }
}

/// Proof of an active duck; ending it (or dropping it) restores the player
#[must_use = "dropping the token ends the duck immediately"]
pub struct DuckToken {
    inner: Option<Arc<DuckerInner>>,
}

impl DuckToken {
    /// End the duck
    pub fn end(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.end();
        }
    }
}

impl Drop for DuckToken {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.end();
        }
    }
}

/// Player bridge for the embedded video page
///
/// Remembers the last commanded volume and publishes every change as
/// `PlayerVolumeChanged` for the page to apply.
pub struct BroadcastPlayer {
    bus: Arc<EventBus>,
    volume: Mutex<Option<u8>>,
}

impl BroadcastPlayer {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            volume: Mutex::new(None),
        }
    }
}

impl PlayerControl for BroadcastPlayer {
    fn set_volume(&self, volume: u8) {
        let volume = volume.min(100);
        *self.volume.lock().unwrap_or_else(|e| e.into_inner()) = Some(volume);
        self.bus.emit_lossy(ChamadorEvent::PlayerVolumeChanged {
            volume,
            unmuted: false,
            timestamp: chrono::Utc::now(),
        });
    }

    fn unmute(&self) {
        let volume = self.volume().unwrap_or(0);
        self.bus.emit_lossy(ChamadorEvent::PlayerVolumeChanged {
            volume,
            unmuted: true,
            timestamp: chrono::Utc::now(),
        });
    }

    fn volume(&self) -> Option<u8> {
        *self.volume.lock().unwrap_or_else(|e| e.into_inner())
    }
}
