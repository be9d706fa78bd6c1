//! Install orchestration: resolving packages into an installation root.

mod context;
mod manager;

pub use context::{MAX_RESOLUTION_DEPTH, RunContext};
pub use manager::PackageManager;
