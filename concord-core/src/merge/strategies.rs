use super::{MergeContext, MergeStrategy};
use crate::conflicts::{Conflict, ConflictType, Severity};
use crate::errors::DiffError;
use crate::models::Change;
use crate::DiffResult;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

/// Built-in strategies, selectable by name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    Ours,
    Theirs,
    Automatic,
    Manual,
}

impl StrategyKind {
    pub fn build(self) -> Box<dyn MergeStrategy> {
        match self {
            StrategyKind::Ours => Box::new(OursStrategy),
            StrategyKind::Theirs => Box::new(TheirsStrategy),
            StrategyKind::Automatic => Box::new(AutomaticStrategy),
            StrategyKind::Manual => Box::new(ManualStrategy),
        }
    }
}

/// Every conflict resolves to the first change set's change.
#[derive(Debug, Clone, Copy, Default)]
pub struct OursStrategy;

impl MergeStrategy for OursStrategy {
    fn name(&self) -> &str {
        "ours"
    }

    fn description(&self) -> &str {
        "Resolve every conflict with the change from the first change set"
    }

    fn can_handle(&self, _conflicts: &[Conflict]) -> bool {
        true
    }

    fn resolve_conflict(
        &self,
        conflict: &Conflict,
        _context: &MergeContext<'_>,
    ) -> DiffResult<Option<Change>> {
        Ok(Some(conflict.change1.clone()))
    }
}

/// Every conflict resolves to the second change set's change.
#[derive(Debug, Clone, Copy, Default)]
pub struct TheirsStrategy;

impl MergeStrategy for TheirsStrategy {
    fn name(&self) -> &str {
        "theirs"
    }

    fn description(&self) -> &str {
        "Resolve every conflict with the change from the second change set"
    }

    fn can_handle(&self, _conflicts: &[Conflict]) -> bool {
        true
    }

    fn resolve_conflict(
        &self,
        conflict: &Conflict,
        _context: &MergeContext<'_>,
    ) -> DiffResult<Option<Change>> {
        Ok(Some(conflict.change2.clone()))
    }
}

/// Resolves only conflicts where picking a side loses nothing important.
///
/// Refuses conflict sets containing a high severity conflict. Double deletes
/// and competing adds go to the first change set; anything else is left for
/// escalation.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutomaticStrategy;

impl MergeStrategy for AutomaticStrategy {
    fn name(&self) -> &str {
        "automatic"
    }

    fn description(&self) -> &str {
        "Resolve low risk conflicts automatically and escalate the rest"
    }

    fn can_handle(&self, conflicts: &[Conflict]) -> bool {
        conflicts.iter().all(|c| c.severity != Severity::High)
    }

    fn resolve_conflict(
        &self,
        conflict: &Conflict,
        _context: &MergeContext<'_>,
    ) -> DiffResult<Option<Change>> {
        match conflict.conflict_type {
            ConflictType::DoubleDelete | ConflictType::AddConflict => {
                Ok(Some(conflict.change1.clone()))
            }
            other => Err(DiffError::merge_failed(
                format!("{} conflicts need manual resolution", other),
                vec![conflict.path.to_string()],
            )),
        }
    }
}

/// Leaves every conflict unresolved for human review.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualStrategy;

impl MergeStrategy for ManualStrategy {
    fn name(&self) -> &str {
        "manual"
    }

    fn description(&self) -> &str {
        "Apply compatible changes and leave every conflict for review"
    }

    fn can_handle(&self, _conflicts: &[Conflict]) -> bool {
        true
    }

    fn resolve_conflict(
        &self,
        conflict: &Conflict,
        _context: &MergeContext<'_>,
    ) -> DiffResult<Option<Change>> {
        Err(DiffError::merge_failed(
            "manual resolution required",
            vec![conflict.path.to_string()],
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResolutionRule {
    TakeFirst,
    TakeSecond,
    /// Drop both changes
    Skip,
    Fail,
}

/// Table-driven strategy keyed by conflict type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomStrategy {
    rules: BTreeMap<ConflictType, ResolutionRule>,
}

impl CustomStrategy {
    pub fn new(rules: impl IntoIterator<Item = (ConflictType, ResolutionRule)>) -> Self {
        Self {
            rules: rules.into_iter().collect(),
        }
    }

    pub fn with_rule(mut self, conflict_type: ConflictType, rule: ResolutionRule) -> Self {
        self.rules.insert(conflict_type, rule);
        self
    }

    pub fn rule_for(&self, conflict_type: ConflictType) -> Option<ResolutionRule> {
        self.rules.get(&conflict_type).copied()
    }
}

impl MergeStrategy for CustomStrategy {
    fn name(&self) -> &str {
        "custom"
    }

    fn description(&self) -> &str {
        "Resolve conflicts with a per-type rule table"
    }

    fn can_handle(&self, conflicts: &[Conflict]) -> bool {
        conflicts
            .iter()
            .all(|c| self.rules.contains_key(&c.conflict_type))
    }

    fn resolve_conflict(
        &self,
        conflict: &Conflict,
        _context: &MergeContext<'_>,
    ) -> DiffResult<Option<Change>> {
        let rule = self.rule_for(conflict.conflict_type).ok_or_else(|| {
            DiffError::merge_failed(
                format!("no rule for {} conflicts", conflict.conflict_type),
                vec![conflict.path.to_string()],
            )
        })?;

        match rule {
            ResolutionRule::TakeFirst => Ok(Some(conflict.change1.clone())),
            ResolutionRule::TakeSecond => Ok(Some(conflict.change2.clone())),
            ResolutionRule::Skip => Ok(None),
            ResolutionRule::Fail => Err(DiffError::merge_failed(
                format!("rule rejects {} conflicts", conflict.conflict_type),
                vec![conflict.path.to_string()],
            )),
        }
    }
}
