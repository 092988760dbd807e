//! Structural diff engine.
//!
//! [`calculate_diff`] walks two documents in parallel and records one
//! [`Change`] per differing location:
//!
//! - objects are compared over the union of their keys (source order first,
//!   then keys only the target has);
//! - arrays are compared either index by index, or with greedy equal-value
//!   matching that reports reordered elements as `Move`s;
//! - anything else that differs becomes a `Replace`.
//!
//! Greedy matching pairs each source element with the first unclaimed equal
//! target element. It is not a minimal edit script: with duplicates such as
//! `[A, A, B] -> [B, A, A]` it may report more moves than strictly needed,
//! but the output is stable and always reconstructs the target.

use crate::config::DiffConfig;
use crate::errors::DiffError;
use crate::models::{Change, ChangeSet, Diff, StructuralChange};
use crate::path::JsonPath;
use crate::DiffResult;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Compare `source` with `target`.
///
/// # Errors
///
/// - `DocumentTooLarge` if either document serializes to more than
///   `config.max_document_size` bytes
/// - `MaxDepthExceeded` if differing containers nest deeper than
///   `config.max_diff_depth`
pub fn calculate_diff(source: &Value, target: &Value, config: &DiffConfig) -> DiffResult<Diff> {
    check_size(source, config)?;
    check_size(target, config)?;

    let mut walker = DiffWalker {
        config,
        changes: Vec::new(),
        structural_changes: Vec::new(),
    };
    walker.diff_values(&JsonPath::root(), Some(source), Some(target), 0)?;

    let changes = if config.optimize_changes {
        optimize_changes(walker.changes)
    } else {
        walker.changes
    };

    let mode = if config.detect_array_moves {
        "move_aware"
    } else {
        "simple"
    };

    let mut metadata = BTreeMap::new();
    metadata.insert("array_mode".to_string(), mode.to_string());
    metadata.insert("optimized".to_string(), config.optimize_changes.to_string());
    metadata.insert("change_count".to_string(), changes.len().to_string());

    tracing::debug!(
        changes = changes.len(),
        structural_changes = walker.structural_changes.len(),
        array_mode = mode,
        "Computed document diff"
    );

    Ok(Diff {
        changes,
        structural_changes: walker.structural_changes,
        metadata,
    })
}

/// Diff two documents and wrap the result in a named [`ChangeSet`].
///
/// Caller-supplied `metadata` is merged over the diff's own metadata.
pub fn generate_change_set(
    name: impl Into<String>,
    source: &Value,
    target: &Value,
    metadata: BTreeMap<String, String>,
    config: &DiffConfig,
) -> DiffResult<ChangeSet> {
    let mut diff = calculate_diff(source, target, config)?;
    diff.metadata.extend(metadata);
    ChangeSet::new(name, diff, source.clone(), target.clone())
}

/// Order-insensitive structural equality
pub fn are_equivalent(a: &Value, b: &Value) -> bool {
    canonicalize(a) == canonicalize(b)
}

/// Copy of `value` with every object's keys sorted
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Total serialized size of every value carried by the diff's changes
pub fn calculate_diff_size(diff: &Diff) -> DiffResult<usize> {
    diff.changes
        .iter()
        .flat_map(|change| change.values())
        .map(serialized_len)
        .sum()
}

/// Collapse each `Remove(p)` immediately followed by `Add(p)` into `Replace(p)`.
pub fn optimize_changes(changes: Vec<Change>) -> Vec<Change> {
    let mut optimized = Vec::with_capacity(changes.len());
    let mut iter = changes.into_iter().peekable();

    while let Some(change) = iter.next() {
        if let Change::Remove { path, old_value } = &change {
            if matches!(iter.peek(), Some(Change::Add { path: next, .. }) if next == path) {
                if let Some(Change::Add { value, .. }) = iter.next() {
                    optimized.push(Change::Replace {
                        path: path.clone(),
                        old_value: old_value.clone(),
                        new_value: value,
                    });
                    continue;
                }
            }
        }
        optimized.push(change);
    }

    optimized
}

/// Greedy equal-value matching of array elements.
///
/// Entry `i` holds the target index matched to source element `i`, if any.
/// Each source element claims the first unclaimed equal target element.
pub fn match_elements(source: &[Value], target: &[Value]) -> Vec<Option<usize>> {
    let mut claimed = vec![false; target.len()];
    source
        .iter()
        .map(|item| {
            let found = (0..target.len()).find(|&j| !claimed[j] && target[j] == *item);
            if let Some(j) = found {
                claimed[j] = true;
            }
            found
        })
        .collect()
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn serialized_len(value: &Value) -> DiffResult<usize> {
    Ok(serde_json::to_vec(value)?.len())
}

fn check_size(document: &Value, config: &DiffConfig) -> DiffResult<()> {
    let actual_size = serde_json::to_vec(document)?.len();
    if actual_size > config.max_document_size {
        tracing::warn!(
            actual_size,
            max_size = config.max_document_size,
            "Document exceeds size limit"
        );
        return Err(DiffError::DocumentTooLarge {
            actual_size,
            max_size: config.max_document_size,
        });
    }
    Ok(())
}

struct DiffWalker<'a> {
    config: &'a DiffConfig,
    changes: Vec<Change>,
    structural_changes: Vec<StructuralChange>,
}

impl DiffWalker<'_> {
    fn diff_values(
        &mut self,
        path: &JsonPath,
        source: Option<&Value>,
        target: Option<&Value>,
        depth: usize,
    ) -> DiffResult<()> {
        match (source, target) {
            (None, None) => {}
            (None, Some(value)) => self.record_add(path, value),
            (Some(old_value), None) => self.record_remove(path, old_value),
            (Some(s), Some(t)) if s == t => {}
            (Some(Value::Object(s)), Some(Value::Object(t))) => {
                self.enter(depth)?;
                let target_only = t.keys().filter(|key| !s.contains_key(*key));
                for key in s.keys().chain(target_only) {
                    self.diff_values(&path.append(key.as_str()), s.get(key), t.get(key), depth + 1)?;
                }
            }
            (Some(Value::Array(s)), Some(Value::Array(t))) => {
                self.enter(depth)?;
                if s.len() != t.len() {
                    self.structural_changes.push(StructuralChange::ArraySizeChanged {
                        path: path.to_string(),
                        from_size: s.len(),
                        to_size: t.len(),
                    });
                }
                if self.config.detect_array_moves {
                    self.diff_array_moves(path, s, t);
                } else {
                    for index in 0..s.len().max(t.len()) {
                        self.diff_values(
                            &path.append_index(index),
                            s.get(index),
                            t.get(index),
                            depth + 1,
                        )?;
                    }
                }
            }
            (Some(old_value), Some(new_value)) => {
                let (from_type, to_type) = (type_name(old_value), type_name(new_value));
                if from_type != to_type {
                    self.structural_changes.push(StructuralChange::TypeChanged {
                        path: path.to_string(),
                        from_type: from_type.to_string(),
                        to_type: to_type.to_string(),
                    });
                }
                self.changes.push(Change::Replace {
                    path: path.clone(),
                    old_value: old_value.clone(),
                    new_value: new_value.clone(),
                });
            }
        }
        Ok(())
    }

    fn diff_array_moves(&mut self, path: &JsonPath, source: &[Value], target: &[Value]) {
        let matches = match_elements(source, target);
        let mut claimed = vec![false; target.len()];

        for (from, matched) in matches.iter().enumerate() {
            if let Some(to) = *matched {
                claimed[to] = true;
                if from != to {
                    self.changes.push(Change::Move {
                        from: path.append_index(from),
                        to: path.append_index(to),
                        value: source[from].clone(),
                    });
                }
            }
        }

        for (from, matched) in matches.iter().enumerate() {
            if matched.is_none() {
                self.record_remove(&path.append_index(from), &source[from]);
            }
        }

        for (to, value) in target.iter().enumerate() {
            if !claimed[to] {
                self.record_add(&path.append_index(to), value);
            }
        }
    }

    fn record_add(&mut self, path: &JsonPath, value: &Value) {
        self.changes.push(Change::Add {
            path: path.clone(),
            value: value.clone(),
        });
        self.structural_changes.push(StructuralChange::FieldAdded {
            path: path.to_string(),
        });
    }

    fn record_remove(&mut self, path: &JsonPath, old_value: &Value) {
        self.changes.push(Change::Remove {
            path: path.clone(),
            old_value: old_value.clone(),
        });
        self.structural_changes.push(StructuralChange::FieldRemoved {
            path: path.to_string(),
        });
    }

    fn enter(&self, depth: usize) -> DiffResult<()> {
        if depth >= self.config.max_diff_depth {
            tracing::warn!(depth, max_depth = self.config.max_diff_depth, "Diff depth limit reached");
            return Err(DiffError::MaxDepthExceeded {
                depth: depth + 1,
                max_depth: self.config.max_diff_depth,
            });
        }
        Ok(())
    }
}
