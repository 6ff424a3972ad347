//! The digest pipeline: registry, coordinator, supervisor, and friends.

pub mod coordinator;
pub mod digester;
pub mod digesters;
pub mod ensure;
pub mod registry;
pub mod reindex;
pub mod selection;
pub mod supervisor;
#[cfg(test)]
pub(crate) mod testing;
pub mod text_source;

pub use coordinator::{CoordinateOptions, Coordinator, ProcessOutcome};
pub use digester::{DigestContext, DigestOutput, Digester, OutputSpec, OutputStatus};
pub use registry::Registry;
pub use supervisor::Supervisor;

/// Suffix appended to a digest error once its attempts are exhausted.
pub const MAX_ATTEMPTS_SUFFIX: &str = " (max attempts reached)";

/// Skip reason when a digester does not apply to a file.
pub const NOT_APPLICABLE: &str = "Not applicable";

/// Skip reason when a digester omitted one of its declared outputs.
pub const OUTPUT_NOT_PRODUCED: &str = "Output not produced";

/// Skip reason when a row's digester is no longer registered.
pub const DIGESTER_UNREGISTERED: &str = "Digester no longer registered";
