//! Concord - offline-first structural diff and merge for JSON documents
//!
//! This crate provides a unified API over the Concord engine.
//!
//! # Example
//!
//! ```
//! use concord::{detect_conflicts, generate_change_set, DiffConfig, StrategyKind};
//! use serde_json::json;
//! use std::collections::BTreeMap;
//!
//! let base = json!({"status": "open", "tags": ["a", "b"]});
//! let config = DiffConfig::default();
//! let ours = generate_change_set("ours", &base, &json!({"status": "closed", "tags": ["a", "b"]}), BTreeMap::new(), &config)?;
//! let theirs = generate_change_set("theirs", &base, &json!({"status": "archived", "tags": ["a", "b"]}), BTreeMap::new(), &config)?;
//!
//! let report = detect_conflicts(Some(&base), &ours, &theirs)?;
//! let result = StrategyKind::Ours.build().merge(&base, &ours, &theirs, &report.conflicts)?;
//! assert_eq!(result.merged_document["status"], "closed");
//! # Ok::<(), concord::DiffError>(())
//! ```

// Diff engine
pub use concord_core::config::DiffConfig;
pub use concord_core::diff::{
    are_equivalent, calculate_diff, calculate_diff_size, generate_change_set,
};
pub use concord_core::models::{Change, ChangeKind, ChangeSet, Diff, StructuralChange};
pub use concord_core::path::{JsonPath, PathSegment};

// Applying changes
pub use concord_core::patches::{apply_changes, calculate_checksum, to_json_patch};

// Conflicts and merging
pub use concord_core::conflicts::{
    detect_conflicts, detect_multi_way_conflicts, Conflict, ConflictReport, ConflictType,
    ResolutionSuggestion, Severity,
};
pub use concord_core::merge::{
    merge, AutomaticStrategy, CustomStrategy, ManualStrategy, MergeContext, MergeResult,
    MergeStrategy, OursStrategy, ResolutionRule, StrategyKind, TheirsStrategy,
};

pub use concord_core::errors::DiffError;
pub use concord_core::DiffResult;
