//! Announcement pipeline: phrase formatting, the announcer, and the FIFO queue

pub mod announcer;
pub mod format;
pub mod queue;

pub use announcer::{Announce, AnnouncementReport, Announcer, BROWSER_COMPLETION_CAP};
pub use format::format_phrase;
pub use queue::{AnnouncementQueue, SETTLE_DELAY};

use chamador_common::events::AnnounceSource;

/// A name/room pair waiting to be spoken
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnouncementRequest {
    pub name: String,
    pub room: String,
    pub source: AnnounceSource,
}

impl AnnouncementRequest {
    pub fn new(name: impl Into<String>, room: impl Into<String>, source: AnnounceSource) -> Self {
        Self {
            name: name.into(),
            room: room.into(),
            source,
        }
    }
}
