//! Package identity and install specifications.

mod id;
mod spec;

pub use id::PackageId;
pub use spec::PackageSpec;
