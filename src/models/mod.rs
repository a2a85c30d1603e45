pub mod manifest;
pub mod spec;
pub mod version;

pub use manifest::{Declaration, Entry, Manifest};
pub use spec::{Constraint, MatchSpec, ParseSpecError, VersionOperator, VersionSpec};
pub use version::{ParseVersionError, Version};
