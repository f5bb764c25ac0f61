//! # Chamador TV
//!
//! TV-side orchestration for the clinic calling display:
//! - Idle/active state machine and call grouping ([`display`])
//! - Announcement formatting, serialization and speech fallback ([`announce`], [`speech`])
//! - Ducking of the embedded video player ([`ducking`])
//! - Runtime configuration resolution ([`settings`])
//! - The single scheduler loop that drives all of it ([`scheduler`])
//! - HTTP/SSE surface for the admin panel and the TV page ([`api`])

pub mod announce;
pub mod api;
pub mod context;
pub mod display;
pub mod ducking;
pub mod error;
pub mod scheduler;
pub mod settings;
pub mod speech;

pub use error::{Error, Result};
