//! Datastore: schema initialization and the call store

pub mod init;
pub mod store;

pub use init::*;
pub use store::CallStore;
