//! Merging two change sets that share an ancestor.
//!
//! A strategy only decides what happens to each conflict. Everything else
//! (carrying over compatible changes, deduplication, applying the result to
//! the base document) is done once by [`merge`].

pub mod strategies;

pub use strategies::*;

use crate::conflicts::Conflict;
use crate::errors::DiffError;
use crate::models::{Change, ChangeKind, ChangeSet, Diff, StructuralChange};
use crate::patches::apply_changes;
use crate::path::JsonPath;
use crate::DiffResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};

/// Inputs of the merge a conflict is being resolved for
#[derive(Debug, Clone, Copy)]
pub struct MergeContext<'a> {
    pub base: &'a Value,
    pub change_set_a: &'a ChangeSet,
    pub change_set_b: &'a ChangeSet,
}

pub trait MergeStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Whether this strategy accepts the given conflict set at all
    fn can_handle(&self, conflicts: &[Conflict]) -> bool;

    /// Decide one conflict. `Ok(None)` drops both changes, an error leaves the
    /// conflict unresolved.
    fn resolve_conflict(
        &self,
        conflict: &Conflict,
        context: &MergeContext<'_>,
    ) -> DiffResult<Option<Change>>;

    fn merge(
        &self,
        base: &Value,
        change_set_a: &ChangeSet,
        change_set_b: &ChangeSet,
        conflicts: &[Conflict],
    ) -> DiffResult<MergeResult> {
        merge(self, base, change_set_a, change_set_b, conflicts)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub merged_document: Value,
    pub merged_change_set: ChangeSet,
    pub resolved_conflicts: Vec<Conflict>,
    pub unresolved_conflicts: Vec<Conflict>,
    pub metadata: BTreeMap<String, String>,
}

impl MergeResult {
    /// True when every detected conflict was resolved
    pub fn is_clean(&self) -> bool {
        self.unresolved_conflicts.is_empty()
    }
}

/// Merge `change_set_a` and `change_set_b` onto `base`, resolving each of
/// `conflicts` with `strategy`.
///
/// A conflict the strategy fails to resolve does not abort the merge; it is
/// reported in [`MergeResult::unresolved_conflicts`] and neither side's change
/// for it is applied.
pub fn merge<S>(
    strategy: &S,
    base: &Value,
    change_set_a: &ChangeSet,
    change_set_b: &ChangeSet,
    conflicts: &[Conflict],
) -> DiffResult<MergeResult>
where
    S: MergeStrategy + ?Sized,
{
    if !strategy.can_handle(conflicts) {
        return Err(DiffError::InvalidMergeStrategy {
            reason: format!(
                "strategy '{}' cannot handle the given {} conflict(s)",
                strategy.name(),
                conflicts.len()
            ),
        });
    }

    let conflicting_paths: HashSet<&JsonPath> = conflicts
        .iter()
        .flat_map(Conflict::touched_paths)
        .collect();
    let is_clear = |change: &Change| {
        change
            .touched_paths()
            .iter()
            .all(|p| !conflicting_paths.contains(p))
    };

    let from_a: Vec<Change> = change_set_a
        .changes()
        .iter()
        .filter(|&c| is_clear(c))
        .cloned()
        .collect();
    let from_b: Vec<Change> = change_set_b
        .changes()
        .iter()
        .filter(|&c| is_clear(c) && !from_a.contains(c))
        .cloned()
        .collect();

    let mut merged = from_a;
    merged.extend(from_b);

    let context = MergeContext {
        base,
        change_set_a,
        change_set_b,
    };
    let mut resolved = Vec::new();
    let mut unresolved = Vec::new();
    for conflict in conflicts {
        match strategy.resolve_conflict(conflict, &context) {
            Ok(change) => {
                merged.extend(change);
                resolved.push(conflict.clone());
            }
            Err(e) => {
                tracing::warn!(
                    strategy = %strategy.name(),
                    path = %conflict.path,
                    conflict_type = %conflict.conflict_type,
                    error = %e,
                    "Conflict left unresolved"
                );
                unresolved.push(conflict.clone());
            }
        }
    }

    let changes = dedup_changes(merged);
    let structural_changes = merge_structural_changes(
        change_set_a.structural_changes(),
        change_set_b.structural_changes(),
    );

    let merged_document = apply_changes(base, &changes)?;

    let mut metadata = BTreeMap::new();
    metadata.insert("strategy".to_string(), strategy.name().to_string());
    metadata.insert("change_set_a".to_string(), change_set_a.id().to_string());
    metadata.insert("change_set_b".to_string(), change_set_b.id().to_string());
    metadata.insert("resolved_conflicts".to_string(), resolved.len().to_string());
    metadata.insert("unresolved_conflicts".to_string(), unresolved.len().to_string());

    let diff = Diff {
        changes,
        structural_changes,
        metadata: metadata.clone(),
    };
    let merged_change_set = ChangeSet::new(
        format!("merge({}, {})", change_set_a.name(), change_set_b.name()),
        diff,
        base.clone(),
        merged_document.clone(),
    )?;

    tracing::info!(
        strategy = %strategy.name(),
        changes = merged_change_set.changes().len(),
        resolved = resolved.len(),
        unresolved = unresolved.len(),
        "Merge completed"
    );

    Ok(MergeResult {
        merged_document,
        merged_change_set,
        resolved_conflicts: resolved,
        unresolved_conflicts: unresolved,
        metadata,
    })
}

/// Keep the first change per (kind, touched paths)
fn dedup_changes(changes: Vec<Change>) -> Vec<Change> {
    let mut seen: HashSet<(ChangeKind, Vec<JsonPath>)> = HashSet::new();
    changes
        .into_iter()
        .filter(|c| seen.insert(c.dedup_key()))
        .collect()
}

fn merge_structural_changes(
    a: &[StructuralChange],
    b: &[StructuralChange],
) -> Vec<StructuralChange> {
    let mut seen: HashSet<(&'static str, String)> = HashSet::new();
    a.iter()
        .chain(b)
        .filter(|s| seen.insert((s.kind(), s.path().to_string())))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiffConfig;
    use crate::conflicts::{detect_conflicts, ConflictType};
    use crate::diff::generate_change_set;
    use serde_json::json;

    fn change_set(name: &str, base: &Value, target: Value) -> ChangeSet {
        generate_change_set(name, base, &target, BTreeMap::new(), &DiffConfig::default()).unwrap()
    }

    #[test]
    fn test_conflict_free_merge_applies_both_sides() {
        let base = json!({"title": "Plan", "owner": "kim", "tags": ["a"]});
        let a = change_set("a", &base, json!({"title": "Plan v2", "owner": "kim", "tags": ["a"]}));
        let b = change_set("b", &base, json!({"title": "Plan", "tags": ["a", "b"], "due": 3}));

        let report = detect_conflicts(Some(&base), &a, &b).unwrap();
        assert!(report.is_empty());

        let result = OursStrategy.merge(&base, &a, &b, &report.conflicts).unwrap();
        assert!(result.is_clean());
        assert_eq!(
            result.merged_document,
            json!({"title": "Plan v2", "tags": ["a", "b"], "due": 3})
        );
        assert_eq!(result.merged_change_set.source(), &base);
        assert_eq!(result.merged_change_set.target(), &result.merged_document);
        assert_eq!(result.metadata["strategy"], "ours");
    }

    #[test]
    fn test_identical_changes_are_applied_once() {
        let base = json!({"items": [1]});
        let a = change_set("a", &base, json!({"items": [1], "seen": true}));
        let b = change_set("b", &base, json!({"items": [1], "seen": true}));

        // Both sides add the same field: a low severity AddConflict
        let report = detect_conflicts(None, &a, &b).unwrap();
        assert_eq!(report.conflicts[0].conflict_type, ConflictType::AddConflict);

        let result = AutomaticStrategy.merge(&base, &a, &b, &report.conflicts).unwrap();
        assert!(result.is_clean());
        assert_eq!(result.merged_document, json!({"items": [1], "seen": true}));
        assert_eq!(result.merged_change_set.changes().len(), 1);
    }

    #[test]
    fn test_unresolved_conflict_leaves_base_value() {
        let base = json!({"status": "open", "n": 0});
        let a = change_set("a", &base, json!({"status": "closed", "n": 1}));
        let b = change_set("b", &base, json!({"status": "archived", "n": 0}));
        let report = detect_conflicts(Some(&base), &a, &b).unwrap();

        let result = ManualStrategy.merge(&base, &a, &b, &report.conflicts).unwrap();
        assert!(!result.is_clean());
        assert_eq!(result.unresolved_conflicts.len(), 1);
        assert!(result.resolved_conflicts.is_empty());
        assert_eq!(result.merged_document, json!({"status": "open", "n": 1}));
    }

    #[test]
    fn test_rejected_conflict_set_fails() {
        let base = json!({"title": "x"});
        let a = change_set("a", &base, json!({}));
        let b = change_set("b", &base, json!({"title": "y"}));
        let report = detect_conflicts(Some(&base), &a, &b).unwrap();
        assert!(!report.can_auto_merge);

        let err = AutomaticStrategy
            .merge(&base, &a, &b, &report.conflicts)
            .unwrap_err();
        assert_eq!(err.code(), "invalid_merge_strategy");
    }

    #[test]
    fn test_structural_changes_are_deduplicated() {
        let base = json!({"a": 1});
        let a = change_set("a", &base, json!({"a": 1, "x": 1}));
        let b = change_set("b", &base, json!({"a": 1, "x": 1, "y": 2}));

        let merged = merge_structural_changes(a.structural_changes(), b.structural_changes());
        let paths: Vec<&str> = merged.iter().map(|s| s.path()).collect();
        assert_eq!(paths, vec!["x", "y"]);
    }
}
