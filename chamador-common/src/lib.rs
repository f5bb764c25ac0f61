//! # Chamador Common Library
//!
//! Shared code for the clinic calling display:
//! - Call/trigger/slot data model
//! - Event types (ChamadorEvent enum) and the EventBus
//! - Bootstrap configuration loading
//! - Feed interface consumed by the TV engine, plus the in-process push feed
//! - SQLite datastore that backs the feed

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod feed;
pub mod model;
pub mod time;

pub use error::{Error, Result};
pub use model::{ActiveSlot, AnnounceTrigger, CallEvent};
