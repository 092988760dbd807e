use crate::errors::DiffError;
use crate::DiffResult;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_MAX_DOCUMENT_SIZE: usize = 10 * 1024 * 1024;
pub const DEFAULT_MAX_DIFF_DEPTH: usize = 100;

/// Options controlling how documents are compared.
///
/// Deserializes from partial objects; missing fields take their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiffConfig {
    /// Upper bound on the serialized size of either input, in bytes
    pub max_document_size: usize,
    /// Emit `Move` changes for reordered array elements
    pub detect_array_moves: bool,
    /// Collapse adjacent `Remove` + `Add` at one path into `Replace`
    pub optimize_changes: bool,
    /// Maximum container nesting visited during a diff
    pub max_diff_depth: usize,
}

impl Default for DiffConfig {
    fn default() -> Self {
        Self {
            max_document_size: DEFAULT_MAX_DOCUMENT_SIZE,
            detect_array_moves: true,
            optimize_changes: true,
            max_diff_depth: DEFAULT_MAX_DIFF_DEPTH,
        }
    }
}

impl DiffConfig {
    /// Build a config from `CONCORD_*` environment variables, falling back to
    /// defaults for unset ones.
    pub fn from_env() -> DiffResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> DiffResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            max_document_size: parse_var(
                &lookup,
                "CONCORD_MAX_DOCUMENT_SIZE",
                defaults.max_document_size,
            )?,
            detect_array_moves: parse_var(
                &lookup,
                "CONCORD_DETECT_ARRAY_MOVES",
                defaults.detect_array_moves,
            )?,
            optimize_changes: parse_var(
                &lookup,
                "CONCORD_OPTIMIZE_CHANGES",
                defaults.optimize_changes,
            )?,
            max_diff_depth: parse_var(&lookup, "CONCORD_MAX_DIFF_DEPTH", defaults.max_diff_depth)?,
        })
    }

    pub fn with_max_document_size(mut self, bytes: usize) -> Self {
        self.max_document_size = bytes;
        self
    }

    pub fn with_array_moves(mut self, enabled: bool) -> Self {
        self.detect_array_moves = enabled;
        self
    }

    pub fn with_optimization(mut self, enabled: bool) -> Self {
        self.optimize_changes = enabled;
        self
    }

    pub fn with_max_diff_depth(mut self, depth: usize) -> Self {
        self.max_diff_depth = depth;
        self
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> DiffResult<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| {
            DiffError::Configuration(format!("{} has invalid value '{}': {}", key, raw, e))
        }),
        None => Ok(default),
    }
}
