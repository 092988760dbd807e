//! Pairwise conflict detection between change sets derived from one ancestor.
//!
//! Two changes conflict when they touch the same path, when one touches an
//! ancestor of the other's path, when a move competes with another change
//! for an array slot, or when one side removes a subtree the other adds into.

use crate::errors::DiffError;
use crate::models::{Change, ChangeSet};
use crate::patches::calculate_checksum;
use crate::path::JsonPath;
use crate::DiffResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConflictType {
    UpdateConflict,
    DeleteUpdateConflict,
    DoubleDelete,
    AddConflict,
    MoveConflict,
    StructuralConflict,
    SemanticConflict,
    Unknown,
}

impl ConflictType {
    /// Severity is fixed per conflict type
    pub fn severity(self) -> Severity {
        match self {
            ConflictType::DeleteUpdateConflict
            | ConflictType::StructuralConflict
            | ConflictType::SemanticConflict => Severity::High,
            ConflictType::UpdateConflict | ConflictType::MoveConflict | ConflictType::Unknown => {
                Severity::Medium
            }
            ConflictType::AddConflict | ConflictType::DoubleDelete => Severity::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// Advisory hint attached to a conflict. Never applied automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolutionSuggestion {
    Automatic { strategy: String, description: String },
    Manual { suggestion: String },
}

/// One incompatibility between a change from each side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: Uuid,
    pub conflict_type: ConflictType,
    pub path: JsonPath,
    /// Change from the first change set
    pub change1: Change,
    /// Change from the second change set
    pub change2: Change,
    pub description: String,
    pub severity: Severity,
    pub resolution: Option<ResolutionSuggestion>,
}

impl Conflict {
    pub fn touched_paths(&self) -> Vec<&JsonPath> {
        let mut paths = self.change1.touched_paths();
        paths.extend(self.change2.touched_paths());
        paths
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
    /// True when no conflict is of high severity
    pub can_auto_merge: bool,
}

impl ConflictReport {
    pub fn new(conflicts: Vec<Conflict>) -> Self {
        let can_auto_merge = conflicts.iter().all(|c| c.severity != Severity::High);
        Self {
            conflicts,
            can_auto_merge,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn highest_severity(&self) -> Option<Severity> {
        self.conflicts.iter().map(|c| c.severity).max()
    }

    pub fn by_type(&self, conflict_type: ConflictType) -> Vec<&Conflict> {
        self.conflicts
            .iter()
            .filter(|c| c.conflict_type == conflict_type)
            .collect()
    }
}

/// Find every pair of changes, one from each set, that cannot both be applied.
///
/// When `base` is given, both change sets must have been computed from it.
pub fn detect_conflicts(
    base: Option<&Value>,
    change_set_a: &ChangeSet,
    change_set_b: &ChangeSet,
) -> DiffResult<ConflictReport> {
    if let Some(base) = base {
        verify_ancestry(base, &[change_set_a, change_set_b])?;
    }

    let conflicts = pairwise_conflicts(change_set_a, change_set_b);
    let report = ConflictReport::new(conflicts);

    tracing::debug!(
        change_set_a = %change_set_a.name(),
        change_set_b = %change_set_b.name(),
        conflicts = report.conflicts.len(),
        can_auto_merge = report.can_auto_merge,
        "Detected conflicts"
    );

    Ok(report)
}

/// Run pairwise detection over every unordered pair of change sets.
///
/// Conflicts repeating an already reported `(path, type)` pair are dropped.
pub fn detect_multi_way_conflicts(
    base: Option<&Value>,
    change_sets: &[ChangeSet],
) -> DiffResult<ConflictReport> {
    if change_sets.len() < 2 {
        return Err(DiffError::ConflictDetectionFailed {
            reason: format!(
                "multi-way detection needs at least two change sets, got {}",
                change_sets.len()
            ),
        });
    }

    if let Some(base) = base {
        let sets: Vec<&ChangeSet> = change_sets.iter().collect();
        verify_ancestry(base, &sets)?;
    }

    let mut seen: HashSet<(JsonPath, ConflictType)> = HashSet::new();
    let mut conflicts = Vec::new();
    for (i, a) in change_sets.iter().enumerate() {
        for b in &change_sets[i + 1..] {
            for conflict in pairwise_conflicts(a, b) {
                if seen.insert((conflict.path.clone(), conflict.conflict_type)) {
                    conflicts.push(conflict);
                }
            }
        }
    }

    let report = ConflictReport::new(conflicts);
    tracing::debug!(
        change_sets = change_sets.len(),
        conflicts = report.conflicts.len(),
        can_auto_merge = report.can_auto_merge,
        "Detected multi-way conflicts"
    );
    Ok(report)
}

/// Classify a pair of changes, or `None` if they are compatible.
pub fn classify(change1: &Change, change2: &Change) -> Option<ConflictType> {
    let same_path = shares_path(change1, change2);
    let overlapping = nested_paths(change1, change2);
    let move_conflict = is_move_conflict(change1, change2);
    let structural = is_structural_conflict(change1, change2);

    if !(same_path || overlapping || move_conflict || structural) {
        return None;
    }

    let equal_path = change1.path() == change2.path();
    let conflict_type = match (change1, change2) {
        (Change::Replace { .. }, Change::Replace { .. }) if equal_path => {
            ConflictType::UpdateConflict
        }
        (Change::Remove { .. }, Change::Replace { .. })
        | (Change::Replace { .. }, Change::Remove { .. })
            if equal_path =>
        {
            ConflictType::DeleteUpdateConflict
        }
        (Change::Remove { .. }, Change::Remove { .. }) if equal_path => ConflictType::DoubleDelete,
        (Change::Add { .. }, Change::Add { .. }) if equal_path => ConflictType::AddConflict,
        _ if move_conflict => ConflictType::MoveConflict,
        _ if structural => ConflictType::StructuralConflict,
        _ => ConflictType::Unknown,
    };
    Some(conflict_type)
}

fn pairwise_conflicts(a: &ChangeSet, b: &ChangeSet) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for change1 in a.changes() {
        for change2 in b.changes() {
            if let Some(conflict_type) = classify(change1, change2) {
                conflicts.push(build_conflict(conflict_type, change1, change2));
            }
        }
    }
    conflicts
}

fn build_conflict(conflict_type: ConflictType, change1: &Change, change2: &Change) -> Conflict {
    let path = conflict_path(change1, change2);
    let description = describe(conflict_type, &path, change1, change2);
    let resolution = suggest_resolution(conflict_type, &path, change1, change2);
    Conflict {
        id: Uuid::new_v4(),
        conflict_type,
        path,
        change1: change1.clone(),
        change2: change2.clone(),
        description,
        severity: conflict_type.severity(),
        resolution,
    }
}

fn shares_path(change1: &Change, change2: &Change) -> bool {
    let paths2 = change2.touched_paths();
    change1
        .touched_paths()
        .iter()
        .any(|p| paths2.contains(p))
}

fn nested_paths(change1: &Change, change2: &Change) -> bool {
    let paths2 = change2.touched_paths();
    change1.touched_paths().iter().any(|p1| {
        paths2
            .iter()
            .any(|p2| p1.is_ancestor_of(p2) || p2.is_ancestor_of(p1))
    })
}

fn is_move_conflict(change1: &Change, change2: &Change) -> bool {
    match (change1, change2) {
        (
            Change::Move {
                from: from1,
                to: to1,
                ..
            },
            Change::Move {
                from: from2,
                to: to2,
                ..
            },
        ) if from1 == from2 || to1 == to2 => true,
        _ => move_source_touched(change1, change2) || move_source_touched(change2, change1),
    }
}

fn move_source_touched(mover: &Change, other: &Change) -> bool {
    match mover {
        Change::Move { from, .. } => other.touches(from),
        _ => false,
    }
}

fn is_structural_conflict(change1: &Change, change2: &Change) -> bool {
    let removes_ancestor_of_add = |remove: &Change, add: &Change| match (remove, add) {
        (Change::Remove { path: removed, .. }, Change::Add { path: added, .. }) => {
            removed.is_ancestor_of(added)
        }
        _ => false,
    };
    removes_ancestor_of_add(change1, change2) || removes_ancestor_of_add(change2, change1)
}

/// Smallest shared path, else the smallest enclosing path, else the smallest
/// primary path. Independent of argument order.
fn conflict_path(change1: &Change, change2: &Change) -> JsonPath {
    let paths1 = change1.touched_paths();
    let paths2 = change2.touched_paths();

    let shared = paths1.iter().filter(|p| paths2.contains(p)).min();
    if let Some(path) = shared {
        return (*path).clone();
    }

    let enclosing = paths1
        .iter()
        .flat_map(|p1| paths2.iter().map(move |p2| (*p1, *p2)))
        .filter_map(|(p1, p2)| {
            if p1.is_ancestor_of(p2) {
                Some(p1)
            } else if p2.is_ancestor_of(p1) {
                Some(p2)
            } else {
                None
            }
        })
        .min();
    if let Some(path) = enclosing {
        return path.clone();
    }

    change1.path().min(change2.path()).clone()
}

fn describe(conflict_type: ConflictType, path: &JsonPath, change1: &Change, change2: &Change) -> String {
    match conflict_type {
        ConflictType::UpdateConflict => format!("Both sides changed '{}' to different values", path),
        ConflictType::DeleteUpdateConflict => {
            format!("One side removed '{}' while the other changed it", path)
        }
        ConflictType::DoubleDelete => format!("Both sides removed '{}'", path),
        ConflictType::AddConflict => format!("Both sides added a value at '{}'", path),
        ConflictType::MoveConflict => format!("Competing moves involving '{}'", path),
        ConflictType::StructuralConflict => format!(
            "Content added under '{}' which the other side removed",
            path
        ),
        ConflictType::SemanticConflict => format!("Semantically incompatible changes at '{}'", path),
        ConflictType::Unknown => format!(
            "Overlapping {} and {} at '{}'",
            change1.kind(),
            change2.kind(),
            path
        ),
    }
}

fn suggest_resolution(
    conflict_type: ConflictType,
    path: &JsonPath,
    change1: &Change,
    change2: &Change,
) -> Option<ResolutionSuggestion> {
    match conflict_type {
        ConflictType::DoubleDelete => Some(ResolutionSuggestion::Automatic {
            strategy: "automatic".to_string(),
            description: format!("Both sides agree that '{}' is removed", path),
        }),
        ConflictType::UpdateConflict => Some(ResolutionSuggestion::Manual {
            suggestion: format!(
                "Choose between {} and {} for '{}'",
                new_value_of(change1),
                new_value_of(change2),
                path
            ),
        }),
        ConflictType::DeleteUpdateConflict => Some(ResolutionSuggestion::Manual {
            suggestion: format!(
                "Decide whether '{}' should be removed or keep the updated value",
                path
            ),
        }),
        ConflictType::AddConflict => Some(ResolutionSuggestion::Manual {
            suggestion: format!(
                "Keep one of the added values at '{}' or combine them",
                path
            ),
        }),
        _ => None,
    }
}

fn new_value_of(change: &Change) -> String {
    match change {
        Change::Add { value, .. } | Change::Move { value, .. } => value.to_string(),
        Change::Replace { new_value, .. } => new_value.to_string(),
        Change::Remove { .. } => "(removed)".to_string(),
    }
}

fn verify_ancestry(base: &Value, change_sets: &[&ChangeSet]) -> DiffResult<()> {
    let base_checksum = calculate_checksum(base)?;
    for set in change_sets {
        if set.source_checksum() != base_checksum {
            return Err(DiffError::ConflictDetectionFailed {
                reason: format!("change set '{}' was not derived from the given base", set.name()),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiffConfig;
    use crate::diff::generate_change_set;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn p(pointer: &str) -> JsonPath {
        JsonPath::from_pointer(pointer).unwrap()
    }

    fn change_set(name: &str, base: &Value, target: Value) -> ChangeSet {
        generate_change_set(name, base, &target, BTreeMap::new(), &DiffConfig::default()).unwrap()
    }

    fn replace(pointer: &str, old: Value, new: Value) -> Change {
        Change::Replace {
            path: p(pointer),
            old_value: old,
            new_value: new,
        }
    }

    fn remove(pointer: &str) -> Change {
        Change::Remove {
            path: p(pointer),
            old_value: json!(0),
        }
    }

    fn add(pointer: &str, value: Value) -> Change {
        Change::Add {
            path: p(pointer),
            value,
        }
    }

    fn mv(from: &str, to: &str) -> Change {
        Change::Move {
            from: p(from),
            to: p(to),
            value: json!("x"),
        }
    }

    #[test]
    fn test_status_update_conflict() {
        let base = json!({"status": "open", "tags": ["a", "b"]});
        let a = change_set("a", &base, json!({"status": "closed", "tags": ["a", "b"]}));
        let b = change_set("b", &base, json!({"status": "archived", "tags": ["a", "b"]}));

        let report = detect_conflicts(Some(&base), &a, &b).unwrap();
        assert_eq!(report.conflicts.len(), 1);

        let conflict = &report.conflicts[0];
        assert_eq!(conflict.conflict_type, ConflictType::UpdateConflict);
        assert_eq!(conflict.severity, Severity::Medium);
        assert_eq!(conflict.path.to_string(), "status");
        assert!(matches!(
            conflict.resolution,
            Some(ResolutionSuggestion::Manual { .. })
        ));
        assert!(report.can_auto_merge);
    }

    #[test]
    fn test_independent_changes_do_not_conflict() {
        let base = json!({"a": 1, "b": 1, "list": [1, 2]});
        let a = change_set("a", &base, json!({"a": 2, "b": 1, "list": [1, 2]}));
        let b = change_set("b", &base, json!({"a": 1, "b": 2, "list": [1, 2, 3]}));

        let report = detect_conflicts(None, &a, &b).unwrap();
        assert!(report.is_empty());
        assert!(report.can_auto_merge);
        assert_eq!(report.highest_severity(), None);
    }

    #[test]
    fn test_classification_rules() {
        assert_eq!(
            classify(&replace("/a", json!(1), json!(2)), &replace("/a", json!(1), json!(3))),
            Some(ConflictType::UpdateConflict)
        );
        assert_eq!(
            classify(&replace("/a", json!(1), json!(2)), &remove("/a")),
            Some(ConflictType::DeleteUpdateConflict)
        );
        assert_eq!(
            classify(&remove("/a"), &replace("/a", json!(1), json!(2))),
            Some(ConflictType::DeleteUpdateConflict)
        );
        assert_eq!(classify(&remove("/a"), &remove("/a")), Some(ConflictType::DoubleDelete));
        assert_eq!(
            classify(&add("/a", json!(1)), &add("/a", json!(2))),
            Some(ConflictType::AddConflict)
        );
        assert_eq!(
            classify(&remove("/a"), &add("/a/b", json!(1))),
            Some(ConflictType::StructuralConflict)
        );
        assert_eq!(
            classify(&replace("/a", json!({}), json!([])), &add("/a/b", json!(1))),
            Some(ConflictType::Unknown)
        );
        assert_eq!(classify(&remove("/a/b"), &remove("/a/c")), None);
    }

    #[test]
    fn test_move_conflicts() {
        // Same source index
        assert_eq!(classify(&mv("/l/0", "/l/2"), &mv("/l/0", "/l/1")), Some(ConflictType::MoveConflict));
        // Same destination index
        assert_eq!(classify(&mv("/l/0", "/l/2"), &mv("/l/1", "/l/2")), Some(ConflictType::MoveConflict));
        // Moved element edited on the other side
        assert_eq!(
            classify(&replace("/l/3", json!(1), json!(2)), &mv("/l/3", "/l/0")),
            Some(ConflictType::MoveConflict)
        );
        // Unrelated moves in different arrays
        assert_eq!(classify(&mv("/l/0", "/l/1"), &mv("/m/0", "/m/1")), None);
    }

    #[test]
    fn test_severity_is_fixed_per_type() {
        assert_eq!(ConflictType::DeleteUpdateConflict.severity(), Severity::High);
        assert_eq!(ConflictType::StructuralConflict.severity(), Severity::High);
        assert_eq!(ConflictType::SemanticConflict.severity(), Severity::High);
        assert_eq!(ConflictType::UpdateConflict.severity(), Severity::Medium);
        assert_eq!(ConflictType::MoveConflict.severity(), Severity::Medium);
        assert_eq!(ConflictType::Unknown.severity(), Severity::Medium);
        assert_eq!(ConflictType::AddConflict.severity(), Severity::Low);
        assert_eq!(ConflictType::DoubleDelete.severity(), Severity::Low);
    }

    #[test]
    fn test_delete_update_blocks_auto_merge() {
        let base = json!({"title": "draft", "body": "x"});
        let a = change_set("a", &base, json!({"body": "x"}));
        let b = change_set("b", &base, json!({"title": "final", "body": "x"}));

        let report = detect_conflicts(Some(&base), &a, &b).unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].conflict_type, ConflictType::DeleteUpdateConflict);
        assert_eq!(report.highest_severity(), Some(Severity::High));
        assert!(!report.can_auto_merge);
    }

    #[test]
    fn test_double_delete_suggests_automatic() {
        let base = json!({"draft": true, "x": 1});
        let a = change_set("a", &base, json!({"x": 1}));
        let b = change_set("b", &base, json!({"x": 2}));

        let report = detect_conflicts(Some(&base), &a, &b).unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.by_type(ConflictType::DoubleDelete).len(), 1);
        assert_eq!(report.highest_severity(), Some(Severity::Low));
        assert!(matches!(
            report.conflicts[0].resolution,
            Some(ResolutionSuggestion::Automatic { .. })
        ));
    }

    #[test]
    fn test_swapped_sides_report_same_pairs() {
        let base = json!({"a": {"b": 1}, "list": ["x", "y", "z"], "c": 1});
        let a = change_set("a", &base, json!({"list": ["z", "x", "y"], "c": 2}));
        let b = change_set("b", &base, json!({"a": {"b": 2, "n": 1}, "list": ["x", "y"], "c": 3}));

        let pairs = |report: ConflictReport| {
            let mut pairs: Vec<(String, ConflictType)> = report
                .conflicts
                .into_iter()
                .map(|c| (c.path.to_string(), c.conflict_type))
                .collect();
            pairs.sort();
            pairs
        };

        let forward = pairs(detect_conflicts(None, &a, &b).unwrap());
        let backward = pairs(detect_conflicts(None, &b, &a).unwrap());
        assert!(!forward.is_empty());
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_base_mismatch_is_rejected() {
        let base = json!({"a": 1});
        let a = change_set("a", &base, json!({"a": 2}));
        let b = change_set("b", &json!({"a": 5}), json!({"a": 3}));

        let err = detect_conflicts(Some(&base), &a, &b).unwrap_err();
        assert!(matches!(err, DiffError::ConflictDetectionFailed { .. }));
        assert!(detect_conflicts(None, &a, &b).is_ok());
    }

    #[test]
    fn test_multi_way_requires_two_sets() {
        let base = json!({"a": 1});
        let a = change_set("a", &base, json!({"a": 2}));
        let err = detect_multi_way_conflicts(Some(&base), &[a]).unwrap_err();
        assert_eq!(err.code(), "conflict_detection_failed");
        assert!(detect_multi_way_conflicts(None, &[]).is_err());
    }

    #[test]
    fn test_multi_way_deduplicates_path_and_type() {
        let base = json!({"a": 1, "b": 1});
        let sets = vec![
            change_set("one", &base, json!({"a": 2, "b": 1})),
            change_set("two", &base, json!({"a": 3, "b": 1})),
            change_set("three", &base, json!({"a": 4, "b": 2})),
        ];

        let report = detect_multi_way_conflicts(Some(&base), &sets).unwrap();
        // Three pairs collide on "a"; only one UpdateConflict survives
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].path, p("/a"));
        assert_eq!(report.conflicts[0].conflict_type, ConflictType::UpdateConflict);
    }

    #[test]
    fn test_conflict_type_strings() {
        assert_eq!(ConflictType::DeleteUpdateConflict.to_string(), "delete_update_conflict");
        assert_eq!(
            "double_delete".parse::<ConflictType>().unwrap(),
            ConflictType::DoubleDelete
        );
        assert_eq!(Severity::High.to_string(), "high");
    }
}
