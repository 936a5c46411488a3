//! Test doubles for the trait seams.
//!
//! Used by this crate's own tests and available to downstream consumers
//! wiring the core into UI tests.

mod memory_store;
mod mock_auth;
mod mock_transport;

pub use memory_store::MemoryCredentialStore;
pub use mock_auth::MockAuthBackend;
pub use mock_transport::{MockTransport, RecordedRequest};
