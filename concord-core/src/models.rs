use crate::errors::DiffError;
use crate::patches::calculate_checksum;
use crate::path::JsonPath;
use crate::DiffResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use uuid::Uuid;

/// Discriminant of a [`Change`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ChangeKind {
    Add,
    Remove,
    Replace,
    Move,
}

/// One atomic modification between two document states.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Change {
    /// A value now exists at `path` that did not exist before
    Add { path: JsonPath, value: Value },
    /// A value that existed at `path` no longer exists
    Remove { path: JsonPath, old_value: Value },
    /// The value at `path` changed in place
    Replace {
        path: JsonPath,
        old_value: Value,
        new_value: Value,
    },
    /// An array element moved from one index to another without modification
    Move {
        from: JsonPath,
        to: JsonPath,
        value: Value,
    },
}

impl Change {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Change::Add { .. } => ChangeKind::Add,
            Change::Remove { .. } => ChangeKind::Remove,
            Change::Replace { .. } => ChangeKind::Replace,
            Change::Move { .. } => ChangeKind::Move,
        }
    }

    /// Primary location of the change (`from` for moves)
    pub fn path(&self) -> &JsonPath {
        match self {
            Change::Add { path, .. } | Change::Remove { path, .. } | Change::Replace { path, .. } => {
                path
            }
            Change::Move { from, .. } => from,
        }
    }

    /// Every location this change reads or writes
    pub fn touched_paths(&self) -> Vec<&JsonPath> {
        match self {
            Change::Move { from, to, .. } => vec![from, to],
            other => vec![other.path()],
        }
    }

    pub fn touches(&self, path: &JsonPath) -> bool {
        self.touched_paths().into_iter().any(|p| p == path)
    }

    /// Values carried by the change, used for size accounting
    pub fn values(&self) -> Vec<&Value> {
        match self {
            Change::Add { value, .. } | Change::Move { value, .. } => vec![value],
            Change::Remove { old_value, .. } => vec![old_value],
            Change::Replace {
                old_value,
                new_value,
                ..
            } => vec![old_value, new_value],
        }
    }

    /// Key identifying "the same operation" regardless of values
    pub fn dedup_key(&self) -> (ChangeKind, Vec<JsonPath>) {
        (
            self.kind(),
            self.touched_paths().into_iter().cloned().collect(),
        )
    }

    /// The change that undoes this one
    pub fn inverse(&self) -> Change {
        match self {
            Change::Add { path, value } => Change::Remove {
                path: path.clone(),
                old_value: value.clone(),
            },
            Change::Remove { path, old_value } => Change::Add {
                path: path.clone(),
                value: old_value.clone(),
            },
            Change::Replace {
                path,
                old_value,
                new_value,
            } => Change::Replace {
                path: path.clone(),
                old_value: new_value.clone(),
                new_value: old_value.clone(),
            },
            Change::Move { from, to, value } => Change::Move {
                from: to.clone(),
                to: from.clone(),
                value: value.clone(),
            },
        }
    }
}

/// Coarse summary observation recorded alongside fine-grained changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructuralChange {
    FieldAdded {
        path: String,
    },
    FieldRemoved {
        path: String,
    },
    TypeChanged {
        path: String,
        from_type: String,
        to_type: String,
    },
    ArraySizeChanged {
        path: String,
        from_size: usize,
        to_size: usize,
    },
}

impl StructuralChange {
    pub fn kind(&self) -> &'static str {
        match self {
            StructuralChange::FieldAdded { .. } => "field_added",
            StructuralChange::FieldRemoved { .. } => "field_removed",
            StructuralChange::TypeChanged { .. } => "type_changed",
            StructuralChange::ArraySizeChanged { .. } => "array_size_changed",
        }
    }

    pub fn path(&self) -> &str {
        match self {
            StructuralChange::FieldAdded { path }
            | StructuralChange::FieldRemoved { path }
            | StructuralChange::TypeChanged { path, .. }
            | StructuralChange::ArraySizeChanged { path, .. } => path,
        }
    }

    pub fn inverse(&self) -> StructuralChange {
        match self {
            StructuralChange::FieldAdded { path } => StructuralChange::FieldRemoved { path: path.clone() },
            StructuralChange::FieldRemoved { path } => StructuralChange::FieldAdded { path: path.clone() },
            StructuralChange::TypeChanged {
                path,
                from_type,
                to_type,
            } => StructuralChange::TypeChanged {
                path: path.clone(),
                from_type: to_type.clone(),
                to_type: from_type.clone(),
            },
            StructuralChange::ArraySizeChanged {
                path,
                from_size,
                to_size,
            } => StructuralChange::ArraySizeChanged {
                path: path.clone(),
                from_size: *to_size,
                to_size: *from_size,
            },
        }
    }
}

/// Result of comparing a source document with a target document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diff {
    pub changes: Vec<Change>,
    pub structural_changes: Vec<StructuralChange>,
    pub metadata: BTreeMap<String, String>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// A diff that turns the target back into the source
    pub fn inverse(&self) -> Diff {
        Diff {
            changes: self.changes.iter().rev().map(Change::inverse).collect(),
            structural_changes: self
                .structural_changes
                .iter()
                .map(StructuralChange::inverse)
                .collect(),
            metadata: self.metadata.clone(),
        }
    }
}

/// A named, immutable diff together with the documents it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSet {
    id: Uuid,
    name: String,
    created_at: DateTime<Utc>,
    diff: Diff,
    source: Value,
    target: Value,
    source_checksum: String,
    target_checksum: String,
}

impl ChangeSet {
    pub fn new(name: impl Into<String>, diff: Diff, source: Value, target: Value) -> DiffResult<Self> {
        let generation_failed = |e: DiffError| DiffError::ChangeSetGenerationFailed {
            reason: e.to_string(),
        };
        let source_checksum = calculate_checksum(&source).map_err(generation_failed)?;
        let target_checksum = calculate_checksum(&target).map_err(generation_failed)?;

        Ok(Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created_at: Utc::now(),
            diff,
            source,
            target,
            source_checksum,
            target_checksum,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn diff(&self) -> &Diff {
        &self.diff
    }

    pub fn changes(&self) -> &[Change] {
        &self.diff.changes
    }

    pub fn structural_changes(&self) -> &[StructuralChange] {
        &self.diff.structural_changes
    }

    pub fn source(&self) -> &Value {
        &self.source
    }

    pub fn target(&self) -> &Value {
        &self.target
    }

    pub fn source_checksum(&self) -> &str {
        &self.source_checksum
    }

    pub fn target_checksum(&self) -> &str {
        &self.target_checksum
    }
}
