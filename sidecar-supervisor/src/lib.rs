//! Sidecar supervisor runtime: launch the service, supervise it, and fall
//! back to a status responder when it cannot run.

mod context;
mod error;
pub mod net;
pub mod reconciler;
mod runtime;
pub mod settings;
pub mod status;

pub use context::SupervisorContext;
pub use error::SupervisorError;
pub use reconciler::{collect_pending_request_ids, Reconciler, TickOutcome};
pub use runtime::{init_tracing, run, start_blocking, Supervisor, Termination};
pub use settings::{ReconcilerSettings, RunMode, StatusSettings, SupervisorSettings};
