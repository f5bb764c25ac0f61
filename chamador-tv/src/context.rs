//! Dependencies shared by the engine, the announcer and the HTTP surface
//!
//! Built once at startup and passed down explicitly; nothing in the crate
//! reaches for global state.

use crate::display::DisplayHandle;
use crate::ducking::PlayerControl;
use crate::settings::{ConfigHandle, OperatingConfig};
use crate::speech::SpeechBackends;
use chamador_common::events::EventBus;
use chamador_common::time::{Clock, SystemClock};
use std::sync::Arc;

/// Shared TV context
pub struct TvContext {
    /// Live operating configuration
    pub config: ConfigHandle,
    pub bus: Arc<EventBus>,
    pub clock: Arc<dyn Clock>,
    /// Secondary (video) player
    pub player: Arc<dyn PlayerControl>,
    pub speech: SpeechBackends,
    /// Latest computed display state
    pub display: DisplayHandle,
}

impl TvContext {
    pub fn new(bus: Arc<EventBus>, player: Arc<dyn PlayerControl>, speech: SpeechBackends) -> Self {
        Self {
            config: ConfigHandle::new(OperatingConfig::default()),
            bus,
            clock: Arc::new(SystemClock),
            player,
            speech,
            display: DisplayHandle::new(),
        }
    }

    /// Replace the wall clock (tests, replays)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Start from a given configuration instead of the defaults
    pub fn with_config(self, config: OperatingConfig) -> Self {
        self.config.set(config);
        self
    }
}
