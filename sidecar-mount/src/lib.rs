//! Storage mount lifecycle: attach an object-storage bucket before the service starts.
//!
//! Missing credentials are a normal "skipped" path. When configured, the mount
//! helper is spawned as a long-running process and the mount table is polled
//! for a bounded number of attempts. `S3_MOUNT_REQUIRED` decides whether a
//! failed mount aborts the run or degrades to local directories.

mod error;
mod lifecycle;
pub mod settings;
pub mod table;

pub use error::MountError;
pub use lifecycle::{mount, mount_if_configured, MountHelper, MountOutcome};
pub use settings::MountSettings;
