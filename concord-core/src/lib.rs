//! Structural diff, conflict detection and merging for JSON documents that
//! were edited independently from a common ancestor.

pub mod config;
pub mod conflicts;
pub mod diff;
pub mod errors;
pub mod merge;
pub mod models;
pub mod patches;
pub mod path;

pub use config::*;
pub use conflicts::*;
pub use diff::*;
pub use errors::*;
pub use merge::*;
pub use models::*;
pub use patches::*;
pub use path::*;

pub type DiffResult<T> = Result<T, DiffError>;
