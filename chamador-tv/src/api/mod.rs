//! HTTP API: admin operations, display state, SSE stream, page speech callback

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{create_router, run, AppContext};
