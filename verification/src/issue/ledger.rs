//! Canonical issue set for one session.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::detect::{SplitRequest, TransitionDetection};
use super::lifecycle::{
    apply_transition, change_severity, invalidate_issue, merge_issues, resolve_issue, split_issue,
    validate_issue, IssueDraft, SplitOutcome,
};
use super::model::{Issue, TransitionRecord, TransitionType};
use crate::session::Role;

/// Ordered issue set with unique IDs (compared case-insensitively).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueLedger {
    issues: Vec<Issue>,
}

/// What one [`IssueLedger::apply_detection`] call changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerUpdate {
    /// IDs of newly inserted issues.
    pub added: Vec<String>,
    /// IDs of issues that gained a transition and remain open.
    pub changed: Vec<String>,
    /// IDs of issues that reached `RESOLVED` or a terminal status.
    pub closed: Vec<String>,
    /// Splits need child data from the caller; see [`IssueLedger::split`].
    pub pending_splits: Vec<SplitRequest>,
}

impl IssueLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list, keeping the first of any duplicate IDs.
    pub fn from_issues(issues: impl IntoIterator<Item = Issue>) -> Self {
        let mut ledger = Self::new();
        for issue in issues {
            ledger.insert(issue);
        }
        ledger
    }

    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Issue> {
        self.issues.iter().find(|i| i.has_id(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Insert a new issue. Returns `false` when the ID is already taken.
    pub fn insert(&mut self, issue: Issue) -> bool {
        if self.contains(&issue.id) {
            warn!(issue_id = %issue.id, "Rejecting issue with duplicate ID");
            return false;
        }
        self.issues.push(issue);
        true
    }

    /// Record a caller-raised issue, stamping a `DISCOVERED` transition when
    /// it has no history yet.
    pub fn raise(&mut self, issue: Issue, round: u32, raised_by: Role) -> bool {
        let issue = if issue.transitions().is_empty() {
            let record = TransitionRecord::new(
                TransitionType::Discovered,
                &issue,
                round,
                format!("raised by {}", raised_by),
                raised_by,
            );
            apply_transition(&issue, record)
        } else {
            issue
        };
        self.insert(issue)
    }

    fn replace(&mut self, updated: Issue) {
        if let Some(slot) = self.issues.iter_mut().find(|i| i.has_id(&updated.id)) {
            *slot = updated;
        }
    }

    /// Apply a detection to the set: new issues, recorded transitions, then
    /// merges. Split requests are handed back untouched.
    pub fn apply_detection(
        &mut self,
        detection: TransitionDetection,
        round: u32,
        role: Role,
    ) -> LedgerUpdate {
        let mut update = LedgerUpdate::default();

        for issue in detection.new_issues {
            let id = issue.id.clone();
            if self.insert(issue) {
                update.added.push(id);
            }
        }

        for detected in detection.transitions {
            let Some(current) = self.get(&detected.issue_id).cloned() else {
                continue;
            };
            let record = detected.record;
            // Rebuild against the live value so status from an earlier record
            // in this batch is not overwritten by a stale snapshot.
            let next = match record.kind {
                TransitionType::Discovered => continue,
                TransitionType::Escalated | TransitionType::Demoted => match record.to_severity {
                    Some(to) => change_severity(&current, to, round, &record.reason, role),
                    None => continue,
                },
                TransitionType::Invalidated => {
                    invalidate_issue(&current, round, &record.reason, role)
                }
                TransitionType::Validated => validate_issue(&current, round, &record.reason, role),
                TransitionType::Resolved => resolve_issue(&current, round, &record.reason, role),
                _ => apply_transition(&current, record),
            };
            if next != current {
                Self::note(&mut update, &next);
                self.replace(next);
            }
        }

        for request in detection.merge_requests {
            let Some(target) = self.get(&request.target_id).cloned() else {
                continue;
            };
            let sources: Vec<Issue> = request
                .source_ids
                .iter()
                .filter_map(|id| self.get(id).cloned())
                .collect();
            if sources.is_empty() {
                continue;
            }
            let outcome = merge_issues(&target, &sources, round, role);
            debug!(target = %outcome.target.id, sources = ?request.source_ids, "Merged issues");
            Self::note(&mut update, &outcome.target);
            self.replace(outcome.target);
            for source in outcome.sources {
                Self::note(&mut update, &source);
                self.replace(source);
            }
        }

        update.pending_splits = detection.split_requests;
        update
    }

    /// Split an issue in place, inserting its children.
    pub fn split(
        &mut self,
        id: &str,
        drafts: &[IssueDraft],
        round: u32,
        role: Role,
    ) -> Option<SplitOutcome> {
        let source = self.get(id)?.clone();
        let outcome = split_issue(&source, drafts, round, role);
        if outcome.new_issues.is_empty() {
            return None;
        }
        self.replace(outcome.source.clone());
        for child in &outcome.new_issues {
            self.insert(child.clone());
        }
        Some(outcome)
    }

    /// Mark an issue resolved. Returns `false` for unknown or terminal issues.
    pub fn resolve(&mut self, id: &str, round: u32, reason: &str, role: Role) -> bool {
        let Some(current) = self.get(id).cloned() else {
            return false;
        };
        let next = resolve_issue(&current, round, reason, role);
        let changed = next != current;
        if changed {
            self.replace(next);
        }
        changed
    }

    fn note(update: &mut LedgerUpdate, issue: &Issue) {
        let bucket = if issue.is_open() {
            &mut update.changed
        } else {
            &mut update.closed
        };
        if !bucket.contains(&issue.id) {
            bucket.push(issue.id.clone());
        }
        if !issue.is_open() {
            update.changed.retain(|id| id != &issue.id);
        }
    }
}
