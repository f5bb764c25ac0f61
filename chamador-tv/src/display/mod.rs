//! Display computation: grouping rules, the state machine, and the shared
//! handle the HTTP surface reads from

pub mod engine;
pub mod grouping;

pub use engine::{DisplayEngine, DisplayUpdate};
pub use grouping::{
    compute_group, filter_history, is_idle, recent_items, DUAL_KEEP_MS, GROUP_WINDOW_MS,
    RECENT_LIMIT,
};

use chamador_common::events::DisplayState;
use std::sync::Arc;
use tokio::sync::watch;

/// Latest published display state
#[derive(Debug, Clone)]
pub struct DisplayHandle {
    tx: Arc<watch::Sender<DisplayState>>,
}

impl DisplayHandle {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(DisplayState::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, state: DisplayState) {
        self.tx.send_replace(state);
    }

    pub fn current(&self) -> DisplayState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DisplayState> {
        self.tx.subscribe()
    }
}

impl Default for DisplayHandle {
    fn default() -> Self {
        Self::new()
    }
}
