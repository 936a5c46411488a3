//! HTTP transport abstraction.
//!
//! `HttpTransport` is the seam between the pipeline and the network so
//! every component above it can be tested against a mock transport.

mod http;
mod pipeline;
mod types;

pub use http::ReqwestTransport;
pub use pipeline::{status_error, TransportPipeline};
pub use types::*;
