//! Issue aggregation — counts the gate reads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::issue::{Issue, IssueCategory, IssueStatus, Severity};

/// Counts over the current issue set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueAggregation {
    /// Issues per category, every category present (zero when empty).
    pub by_category: BTreeMap<IssueCategory, usize>,
    pub total: usize,
    /// Open issues (RAISED, CHALLENGED, UNRESOLVED).
    pub unresolved: usize,
    pub critical_unresolved: usize,
    pub high_unresolved: usize,
    pub resolved: usize,
    pub dismissed: usize,
    pub merged: usize,
    pub split: usize,
    /// Transitions recorded in the current or previous round.
    pub recent_transitions: usize,
}

impl Default for IssueAggregation {
    fn default() -> Self {
        Self {
            by_category: IssueCategory::ALL.into_iter().map(|c| (c, 0)).collect(),
            total: 0,
            unresolved: 0,
            critical_unresolved: 0,
            high_unresolved: 0,
            resolved: 0,
            dismissed: 0,
            merged: 0,
            split: 0,
            recent_transitions: 0,
        }
    }
}

impl IssueAggregation {
    /// Whether the issue set is still changing.
    pub fn is_churning(&self) -> bool {
        self.recent_transitions > 0
    }
}

/// Aggregate `issues` as of `current_round`.
pub fn aggregate_issues(issues: &[Issue], current_round: u32) -> IssueAggregation {
    let mut agg = IssueAggregation::default();
    let recent_from = current_round.saturating_sub(1);

    for issue in issues {
        agg.total += 1;
        *agg.by_category.entry(issue.category).or_insert(0) += 1;

        match issue.status() {
            IssueStatus::Raised | IssueStatus::Challenged | IssueStatus::Unresolved => {
                agg.unresolved += 1;
                match issue.severity() {
                    Severity::Critical => agg.critical_unresolved += 1,
                    Severity::High => agg.high_unresolved += 1,
                    Severity::Medium | Severity::Low => {}
                }
            }
            IssueStatus::Resolved => agg.resolved += 1,
            IssueStatus::Dismissed => agg.dismissed += 1,
            IssueStatus::Merged => agg.merged += 1,
            IssueStatus::Split => agg.split += 1,
        }

        agg.recent_transitions += issue
            .transitions()
            .iter()
            .filter(|t| t.round >= recent_from)
            .count();
    }

    agg
}
