//! Applying change lists to documents.
//!
//! Array element changes produced by the move-aware diff refer to two
//! coordinate systems: `Remove` paths and `Move.from` address the array as it
//! was before the change list, while `Add` paths and `Move.to` address the
//! array as it is afterwards. They are therefore applied per array as a batch:
//!
//! 1. in-place changes (field `Add`/`Remove`, every `Replace`, changes nested
//!    below array elements) in list order;
//! 2. for each touched array, deepest first: removal of all source indices in
//!    descending order, then insertion of the new elements in ascending
//!    target-index order.
//!
//! Every step is expressed as an RFC 6902 operation and executed with
//! `json_patch`, so the recorded operations form a sequential JSON Patch that
//! reproduces the same result.

use crate::errors::DiffError;
use crate::models::Change;
use crate::path::JsonPath;
use crate::DiffResult;
use json_patch::{AddOperation, Patch, PatchOperation, RemoveOperation, ReplaceOperation};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Default)]
struct ArrayBatch {
    removals: BTreeSet<usize>,
    insertions: Vec<(usize, usize, Value)>,
}

/// Apply `changes` to a copy of `document` and return the result.
pub fn apply_changes(document: &Value, changes: &[Change]) -> DiffResult<Value> {
    let mut result = document.clone();
    execute(&mut result, changes)?;
    Ok(result)
}

/// Express `changes`, relative to `document`, as a sequential JSON Patch.
pub fn to_json_patch(document: &Value, changes: &[Change]) -> DiffResult<Patch> {
    let mut scratch = document.clone();
    let operations = execute(&mut scratch, changes)?;
    Ok(Patch(operations))
}

/// Apply a JSON Patch in place.
pub fn apply_patch(document: &mut Value, patch: &Patch) -> DiffResult<()> {
    json_patch::patch(document, patch)
        .map_err(|e| DiffError::application_failed("", e.to_string()))
}

/// SHA-256 hex digest of the serialized document
pub fn calculate_checksum(value: &Value) -> DiffResult<String> {
    let json_string = serde_json::to_string(value)?;
    let mut hasher = Sha256::new();
    hasher.update(json_string.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

fn execute(document: &mut Value, changes: &[Change]) -> DiffResult<Vec<PatchOperation>> {
    let mut operations = Vec::new();
    let mut batches: BTreeMap<JsonPath, ArrayBatch> = BTreeMap::new();

    for (seq, change) in changes.iter().enumerate() {
        match change {
            Change::Add { path, value } => {
                if path.is_root() {
                    replace_root(document, value, &mut operations);
                } else if let Some((parent, index)) = array_slot(path) {
                    batches
                        .entry(parent)
                        .or_default()
                        .insertions
                        .push((index, seq, value.clone()));
                } else {
                    let op = PatchOperation::Add(AddOperation {
                        path: path.to_pointer().into(),
                        value: value.clone(),
                    });
                    run(document, op, path, &mut operations)?;
                }
            }
            Change::Remove { path, .. } => {
                if path.is_root() {
                    return Err(DiffError::application_failed(
                        path.to_string(),
                        "cannot remove the document root",
                    ));
                }
                if let Some((parent, index)) = array_slot(path) {
                    batches.entry(parent).or_default().removals.insert(index);
                } else {
                    let op = PatchOperation::Remove(RemoveOperation {
                        path: path.to_pointer().into(),
                    });
                    run(document, op, path, &mut operations)?;
                }
            }
            Change::Replace {
                path, new_value, ..
            } => {
                if path.is_root() {
                    replace_root(document, new_value, &mut operations);
                } else {
                    let op = PatchOperation::Replace(ReplaceOperation {
                        path: path.to_pointer().into(),
                        value: new_value.clone(),
                    });
                    run(document, op, path, &mut operations)?;
                }
            }
            Change::Move { from, to, value } => {
                let (Some((from_parent, from_index)), Some((to_parent, to_index))) =
                    (array_slot(from), array_slot(to))
                else {
                    return Err(DiffError::application_failed(
                        from.to_string(),
                        format!("move must address array elements (to: '{}')", to),
                    ));
                };
                batches
                    .entry(from_parent)
                    .or_default()
                    .removals
                    .insert(from_index);
                batches
                    .entry(to_parent)
                    .or_default()
                    .insertions
                    .push((to_index, seq, value.clone()));
            }
        }
    }

    // Inner arrays are addressed through their parents' source indices
    let mut ordered: Vec<(JsonPath, ArrayBatch)> = batches.into_iter().collect();
    ordered.sort_by(|(a, _), (b, _)| b.len().cmp(&a.len()));

    for (parent, batch) in ordered {
        apply_batch(document, &parent, batch, &mut operations)?;
    }

    Ok(operations)
}

fn apply_batch(
    document: &mut Value,
    parent: &JsonPath,
    mut batch: ArrayBatch,
    operations: &mut Vec<PatchOperation>,
) -> DiffResult<()> {
    let source_len = match document.pointer(&parent.to_pointer()) {
        Some(Value::Array(items)) => items.len(),
        Some(other) => {
            return Err(DiffError::application_failed(
                parent.to_string(),
                format!("expected an array, found {}", crate::diff::type_name(other)),
            ))
        }
        None => {
            return Err(DiffError::application_failed(
                parent.to_string(),
                "array does not exist",
            ))
        }
    };

    for &index in batch.removals.iter().rev() {
        let path = parent.append_index(index);
        if index >= source_len {
            return Err(DiffError::application_failed(
                path.to_string(),
                format!("index out of bounds for array of length {}", source_len),
            ));
        }
        let op = PatchOperation::Remove(RemoveOperation {
            path: path.to_pointer().into(),
        });
        run(document, op, &path, operations)?;
    }

    batch.insertions.sort_by_key(|(index, seq, _)| (*index, *seq));

    let mut len = source_len - batch.removals.len();
    let mut previous: Option<usize> = None;
    for (index, _, value) in batch.insertions {
        // Colliding or trailing slots (possible when merging two sides) keep
        // their relative order and append at the end at most.
        let position = previous
            .map_or(index, |prev| index.max(prev + 1))
            .min(len);
        let path = parent.append_index(position);
        let op = PatchOperation::Add(AddOperation {
            path: path.to_pointer().into(),
            value,
        });
        run(document, op, &path, operations)?;
        len += 1;
        previous = Some(position);
    }

    Ok(())
}

fn array_slot(path: &JsonPath) -> Option<(JsonPath, usize)> {
    let index = path.last_index()?;
    Some((path.parent()?, index))
}

fn replace_root(document: &mut Value, value: &Value, operations: &mut Vec<PatchOperation>) {
    *document = value.clone();
    operations.push(PatchOperation::Replace(ReplaceOperation {
        path: String::new().into(),
        value: value.clone(),
    }));
}

fn run(
    document: &mut Value,
    op: PatchOperation,
    path: &JsonPath,
    operations: &mut Vec<PatchOperation>,
) -> DiffResult<()> {
    let patch = Patch(vec![op]);
    json_patch::patch(document, &patch)
        .map_err(|e| DiffError::application_failed(path.to_string(), e.to_string()))?;
    operations.extend(patch.0);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn p(pointer: &str) -> JsonPath {
        JsonPath::from_pointer(pointer).unwrap()
    }

    #[test]
    fn test_apply_field_changes() {
        let doc = json!({"status": "open", "owner": "amy", "tags": []});
        let changes = vec![
            Change::Replace {
                path: p("/status"),
                old_value: json!("open"),
                new_value: json!("closed"),
            },
            Change::Remove {
                path: p("/owner"),
                old_value: json!("amy"),
            },
            Change::Add {
                path: p("/priority"),
                value: json!(2),
            },
        ];

        let result = apply_changes(&doc, &changes).unwrap();
        assert_eq!(result, json!({"status": "closed", "priority": 2, "tags": []}));
        // Input is untouched
        assert_eq!(doc["status"], "open");
    }

    #[test]
    fn test_apply_rotation_with_moves() {
        let doc = json!(["A", "B", "C"]);
        let changes = vec![
            Change::Move {
                from: p("/0"),
                to: p("/1"),
                value: json!("A"),
            },
            Change::Move {
                from: p("/1"),
                to: p("/2"),
                value: json!("B"),
            },
            Change::Move {
                from: p("/2"),
                to: p("/0"),
                value: json!("C"),
            },
        ];

        assert_eq!(apply_changes(&doc, &changes).unwrap(), json!(["C", "A", "B"]));
    }

    #[test]
    fn test_apply_mixed_array_batch() {
        // [A, B, C, D] -> [D, A, X, C]: B removed, D moved to front, X added
        let doc = json!({"items": ["A", "B", "C", "D"]});
        let changes = vec![
            Change::Move {
                from: p("/items/0"),
                to: p("/items/1"),
                value: json!("A"),
            },
            Change::Move {
                from: p("/items/3"),
                to: p("/items/0"),
                value: json!("D"),
            },
            Change::Move {
                from: p("/items/2"),
                to: p("/items/3"),
                value: json!("C"),
            },
            Change::Remove {
                path: p("/items/1"),
                old_value: json!("B"),
            },
            Change::Add {
                path: p("/items/2"),
                value: json!("X"),
            },
        ];

        let result = apply_changes(&doc, &changes).unwrap();
        assert_eq!(result, json!({"items": ["D", "A", "X", "C"]}));
    }

    #[test]
    fn test_exported_patch_reproduces_result() {
        let doc = json!({"items": [1, 2, 3], "meta": {"v": 1}});
        let changes = vec![
            Change::Replace {
                path: p("/meta/v"),
                old_value: json!(1),
                new_value: json!(2),
            },
            Change::Move {
                from: p("/items/2"),
                to: p("/items/0"),
                value: json!(3),
            },
            Change::Remove {
                path: p("/items/0"),
                old_value: json!(1),
            },
        ];

        let expected = apply_changes(&doc, &changes).unwrap();
        let patch = to_json_patch(&doc, &changes).unwrap();

        let mut replayed = doc.clone();
        apply_patch(&mut replayed, &patch).unwrap();
        assert_eq!(replayed, expected);
        assert_eq!(expected, json!({"items": [3, 2], "meta": {"v": 2}}));
    }

    #[test]
    fn test_root_replace() {
        let result = apply_changes(
            &json!(1),
            &[Change::Replace {
                path: JsonPath::root(),
                old_value: json!(1),
                new_value: json!({"a": true}),
            }],
        )
        .unwrap();
        assert_eq!(result, json!({"a": true}));
    }

    #[test]
    fn test_missing_path_fails() {
        let err = apply_changes(
            &json!({"a": 1}),
            &[Change::Replace {
                path: p("/b"),
                old_value: json!(1),
                new_value: json!(2),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, DiffError::ChangeApplicationFailed { ref path, .. } if path == "b"));
    }

    #[test]
    fn test_remove_out_of_bounds_fails() {
        let err = apply_changes(
            &json!({"a": [1]}),
            &[Change::Remove {
                path: p("/a/4"),
                old_value: json!(1),
            }],
        )
        .unwrap_err();
        assert_eq!(err.code(), "change_application_failed");
    }

    #[test]
    fn test_batch_on_non_array_fails() {
        let err = apply_changes(
            &json!({"a": {"0": 1}}),
            &[Change::Remove {
                path: p("/a/0"),
                old_value: json!(1),
            }],
        )
        .unwrap_err();
        assert!(err.to_string().contains("expected an array"));
    }

    #[test]
    fn test_colliding_inserts_keep_order() {
        let doc = json!([1, 2]);
        let changes = vec![
            Change::Add {
                path: p("/1"),
                value: json!("a"),
            },
            Change::Add {
                path: p("/1"),
                value: json!("b"),
            },
            Change::Add {
                path: p("/9"),
                value: json!("z"),
            },
        ];
        assert_eq!(
            apply_changes(&doc, &changes).unwrap(),
            json!([1, "a", "b", 2, "z"])
        );
    }

    #[test]
    fn test_checksum_is_stable() {
        let value = json!({"title": "x"});
        assert_eq!(
            calculate_checksum(&value).unwrap(),
            calculate_checksum(&value.clone()).unwrap()
        );
        assert_eq!(calculate_checksum(&value).unwrap().len(), 64);
    }
}
