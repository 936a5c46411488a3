pub mod config;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod resource;
pub mod session;
pub mod testing;
pub mod transport;
pub mod workflow;

pub use config::{load_config, load_config_from_str, validate_config, Config, ConfigError};
pub use error::ApiError;
pub use monitor::{JobMonitor, JobUpdate};
pub use resource::{
    BroadcastJob, BroadcastRequest, JobStatus, ListParams, Page, ResourceClient, Ticket,
    TicketStatus, TicketUpdate,
};
pub use session::{
    CredentialPair, HttpAuthBackend, Identity, Role, SessionEvent, SessionManager,
    SqliteCredentialStore,
};
pub use transport::{ReqwestTransport, TransportPipeline};
pub use workflow::WorkflowEngine;
