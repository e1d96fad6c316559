//! Sidecar core library: environment snapshot, domain types, config synthesis.
//!
//! Public API surface:
//! - [`env`]: [`Env`], the immutable view of process environment inputs
//! - [`types`]: probe trail, mount status and diagnostics snapshot
//! - [`config`]: [`ServiceConfig`] synthesis, validation and persistence
//! - [`error`]: [`ConfigError`]
//! - [`paths`]: defaults and well-known environment keys

pub mod config;
pub mod env;
pub mod error;
pub mod paths;
pub mod types;

pub use config::{AuthMode, BindMode, GatewayAuth, ServiceConfig};
pub use env::Env;
pub use error::ConfigError;
pub use types::{
    Diagnostics, MountStatus, Phase, ProbeResult, ResolvedCommand, StartError,
};
