//! Browser speech relayed through the TV page
//!
//! The page listens on the SSE stream for `SpeechRequested`, speaks with its
//! own synthesizer, then posts `/api/speech/{utterance_id}/done`. The bridge
//! is only available while a page is connected.

use super::{SynthSpeech, Utterance};
use chamador_common::events::{ChamadorEvent, EventBus};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

struct PendingUtterance {
    id: Uuid,
    done: oneshot::Sender<()>,
}

/// Speech synthesizer living in the connected TV page
pub struct PageSpeech {
    bus: Arc<EventBus>,
    clients: Arc<AtomicUsize>,
    pending: Mutex<Option<PendingUtterance>>,
}

impl PageSpeech {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            clients: Arc::new(AtomicUsize::new(0)),
            pending: Mutex::new(None),
        }
    }

    /// Register a connected page; the page counts until the guard drops
    pub fn connect(&self) -> PageClientGuard {
        let now = self.clients.fetch_add(1, Ordering::SeqCst) + 1;
        info!("TV page connected ({} active)", now);
        PageClientGuard {
            clients: Arc::clone(&self.clients),
        }
    }

    pub fn connected_pages(&self) -> usize {
        self.clients.load(Ordering::SeqCst)
    }

    /// Completion report from the page; false if the id is not the current utterance
    pub fn complete(&self, utterance_id: Uuid) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        match pending.take() {
            Some(current) if current.id == utterance_id => {
                debug!("Page finished utterance {}", utterance_id);
                let _ = current.done.send(());
                true
            }
            other => {
                *pending = other;
                false
            }
        }
    }

    /// Id of the utterance currently awaiting completion
    pub fn pending_utterance(&self) -> Option<Uuid> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|p| p.id)
    }
}

impl SynthSpeech for PageSpeech {
    fn is_available(&self) -> bool {
        self.connected_pages() > 0
    }

    fn cancel(&self) {
        let previous = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(previous) = previous {
            debug!("Cancelling page utterance {}", previous.id);
            self.bus.emit_lossy(ChamadorEvent::SpeechCancelled {
                utterance_id: previous.id,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    fn speak(&self, utterance: &Utterance, on_done: oneshot::Sender<()>) -> bool {
        self.cancel();

        let id = Uuid::new_v4();
        *self.pending.lock().unwrap_or_else(|e| e.into_inner()) = Some(PendingUtterance {
            id,
            done: on_done,
        });

        let sent = self.bus.emit(ChamadorEvent::SpeechRequested {
            utterance_id: id,
            text: utterance.text.clone(),
            lang: utterance.locale.clone(),
            rate: utterance.rate,
            pitch: utterance.pitch,
            timestamp: chrono::Utc::now(),
        });

        if sent.is_err() {
            // Nobody listening; forget the utterance
            self.pending
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            return false;
        }
        true
    }
}

/// Keeps a page counted as connected
pub struct PageClientGuard {
    clients: Arc<AtomicUsize>,
}

impl Drop for PageClientGuard {
    fn drop(&mut self) {
        let left = self.clients.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        info!("TV page disconnected ({} active)", left);
    }
}
