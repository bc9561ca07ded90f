//! AgentCrew HTTP service: multi-agent group chat behind `/agent/completions`.

pub mod error;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::{AppState, BackendSummary};
