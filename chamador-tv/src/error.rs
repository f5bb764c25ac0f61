//! Error types for chamador-tv
//!
//! Failures inside the announcement pipeline never reach these types; they
//! are absorbed as [`crate::speech::SpeechError`] and degrade to the next
//! backend. These cover startup and the HTTP surface.

use thiserror::Error;

/// Main error type for chamador-tv
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP server errors
    #[error("HTTP server error: {0}")]
    Http(String),

    /// Datastore or shared-library errors
    #[error(transparent)]
    Common(#[from] chamador_common::Error),
}

/// Convenience Result type using chamador-tv Error
pub type Result<T> = std::result::Result<T, Error>;
