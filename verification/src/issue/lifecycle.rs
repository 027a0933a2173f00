//! Lifecycle operations — pure functions returning updated issue values.
//!
//! None of these mutate their inputs. Terminal issues (`MERGED`, `SPLIT`,
//! `DISMISSED`) come back unchanged from every operation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::{Issue, IssueCategory, IssueStatus, Severity, TransitionRecord, TransitionType};
use crate::session::Role;

/// Result of [`merge_issues`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeOutcome {
    /// Surviving issue, still non-terminal.
    pub target: Issue,
    /// Sources, now `MERGED` with `merged_into` set.
    pub sources: Vec<Issue>,
}

/// Result of [`split_issue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitOutcome {
    /// Parent, now `SPLIT` with `split_into` listing the children.
    pub source: Issue,
    pub new_issues: Vec<Issue>,
}

/// Field overrides for one child of a split. Unset fields inherit from the parent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssueDraft {
    #[serde(default)]
    pub category: Option<IssueCategory>,
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub evidence: Option<String>,
}

impl IssueDraft {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            summary: Some(summary.into()),
            ..Default::default()
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Apply a transition record to an issue, returning the new value.
///
/// Status and severity follow the record; `original_severity` is captured on
/// the first severity change.
pub fn apply_transition(issue: &Issue, record: TransitionRecord) -> Issue {
    if issue.is_terminal() {
        debug!(
            issue_id = %issue.id,
            status = %issue.status(),
            kind = %record.kind,
            "Ignoring transition on terminal issue"
        );
        return issue.clone();
    }
    let mut next = issue.clone();
    next.record(record);
    next
}

/// Move an issue to `new_severity`. `ESCALATED` when the new level ranks
/// higher, otherwise `DEMOTED`. Status is unchanged. Same level is a no-op.
pub fn change_severity(
    issue: &Issue,
    new_severity: Severity,
    round: u32,
    reason: &str,
    triggered_by: Role,
) -> Issue {
    let current = issue.severity();
    if new_severity == current {
        return issue.clone();
    }
    let kind = if new_severity > current {
        TransitionType::Escalated
    } else {
        TransitionType::Demoted
    };
    let record = TransitionRecord::new(kind, issue, round, reason, triggered_by)
        .with_severity(current, new_severity);
    apply_transition(issue, record)
}

/// Fold `sources` into `target`.
///
/// The target gains every source ID in `related_issues` and provenance-tagged
/// excerpts of their description and evidence, recorded as a `REFINED`
/// transition. Each non-terminal source becomes `MERGED` and points at the target.
pub fn merge_issues(
    target: &Issue,
    sources: &[Issue],
    round: u32,
    triggered_by: Role,
) -> MergeOutcome {
    if target.is_terminal() {
        return MergeOutcome {
            target: target.clone(),
            sources: sources.to_vec(),
        };
    }

    let mut merged_target = target.clone();
    let mut out_sources = Vec::with_capacity(sources.len());
    let mut absorbed = Vec::new();

    for source in sources {
        if source.has_id(&target.id) || source.is_terminal() {
            out_sources.push(source.clone());
            continue;
        }

        merged_target.add_related(&source.id);
        let excerpt = if source.description.is_empty() {
            source.summary.as_str()
        } else {
            source.description.as_str()
        };
        merged_target
            .description
            .push_str(&format!("\n\n[merged from {}] {}", source.id, excerpt));
        if !source.evidence.is_empty() {
            merged_target
                .evidence
                .push_str(&format!("\n[{}] {}", source.id, source.evidence));
        }

        let record = TransitionRecord::new(
            TransitionType::MergedInto,
            source,
            round,
            format!("merged into {}", target.id),
            triggered_by,
        )
        .to_status(IssueStatus::Merged);
        let mut merged_source = apply_transition(source, record);
        merged_source.set_merged_into(&target.id);
        out_sources.push(merged_source);
        absorbed.push(source.id.clone());
    }

    if !absorbed.is_empty() {
        let record = TransitionRecord::new(
            TransitionType::Refined,
            &merged_target,
            round,
            format!("absorbed {}", absorbed.join(", ")),
            triggered_by,
        );
        merged_target = apply_transition(&merged_target, record);
    }

    MergeOutcome {
        target: merged_target,
        sources: out_sources,
    }
}

/// Split `source` into one child per draft, IDs `{source}-A`, `{source}-B`, ...
pub fn split_issue(
    source: &Issue,
    drafts: &[IssueDraft],
    round: u32,
    triggered_by: Role,
) -> SplitOutcome {
    if drafts.is_empty() || source.is_terminal() {
        return SplitOutcome {
            source: source.clone(),
            new_issues: Vec::new(),
        };
    }

    let mut children = Vec::with_capacity(drafts.len());
    for (idx, draft) in drafts.iter().enumerate() {
        let id = format!("{}-{}", source.id, child_suffix(idx));
        let child = Issue::new(
            id,
            draft.category.unwrap_or(source.category),
            draft.severity.unwrap_or(source.severity()),
            draft.summary.clone().unwrap_or_else(|| source.summary.clone()),
            triggered_by,
            round,
        )
        .with_location(draft.location.clone().unwrap_or_else(|| source.location.clone()))
        .with_description(
            draft
                .description
                .clone()
                .unwrap_or_else(|| source.description.clone()),
        )
        .with_evidence(draft.evidence.clone().unwrap_or_else(|| source.evidence.clone()));

        let record = TransitionRecord::new(
            TransitionType::SplitFrom,
            &child,
            round,
            format!("split from {}", source.id),
            triggered_by,
        );
        children.push(apply_transition(&child, record));
    }

    let child_ids: Vec<String> = children.iter().map(|c| c.id.clone()).collect();
    let record = TransitionRecord::new(
        TransitionType::SplitInto,
        source,
        round,
        format!("split into {}", child_ids.join(", ")),
        triggered_by,
    )
    .to_status(IssueStatus::Split);
    let mut parent = apply_transition(source, record);
    parent.set_split_into(child_ids);

    SplitOutcome {
        source: parent,
        new_issues: children,
    }
}

/// Dismiss an issue as invalid.
pub fn invalidate_issue(issue: &Issue, round: u32, reason: &str, triggered_by: Role) -> Issue {
    let record = TransitionRecord::new(
        TransitionType::Invalidated,
        issue,
        round,
        reason,
        triggered_by,
    )
        .to_status(IssueStatus::Dismissed);
    apply_transition(issue, record)
}

/// Confirm an issue as real; it stays open as `UNRESOLVED`.
pub fn validate_issue(issue: &Issue, round: u32, reason: &str, triggered_by: Role) -> Issue {
    let record = TransitionRecord::new(
        TransitionType::Validated,
        issue,
        round,
        reason,
        triggered_by,
    )
        .to_status(IssueStatus::Unresolved);
    apply_transition(issue, record)
}

/// Mark an issue's fix as confirmed.
pub fn resolve_issue(issue: &Issue, round: u32, reason: &str, triggered_by: Role) -> Issue {
    if issue.status() == IssueStatus::Resolved {
        return issue.clone();
    }
    let record = TransitionRecord::new(TransitionType::Resolved, issue, round, reason, triggered_by)
        .to_status(IssueStatus::Resolved);
    apply_transition(issue, record)
}

/// Rewrite summary and/or description under a `REFINED` record.
pub fn refine_issue(
    issue: &Issue,
    summary: Option<&str>,
    description: Option<&str>,
    round: u32,
    reason: &str,
    triggered_by: Role,
) -> Issue {
    if issue.is_terminal() || (summary.is_none() && description.is_none()) {
        return issue.clone();
    }
    let record = TransitionRecord::new(TransitionType::Refined, issue, round, reason, triggered_by);
    let mut next = apply_transition(issue, record);
    if let Some(s) = summary {
        next.summary = s.to_string();
    }
    if let Some(d) = description {
        next.description = d.to_string();
    }
    next
}

/// `0 -> A`, `25 -> Z`, `26 -> AA`.
fn child_suffix(mut idx: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (idx % 26) as u8);
        if idx < 26 {
            break;
        }
        idx = idx / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(id: &str, severity: Severity) -> Issue {
        Issue::new(
            id,
            IssueCategory::Security,
            severity,
            format!("summary {}", id),
            Role::Verifier,
            1,
        )
            .with_location("src/auth.rs:10")
            .with_description(format!("description {}", id))
            .with_evidence(format!("evidence {}", id))
    }

    #[test]
    fn test_apply_transition_returns_new_value() {
        let original = issue("SEC-01", Severity::Medium);
        let record = TransitionRecord::new(
            TransitionType::Escalated,
            &original,
            2,
            "worse",
            Role::Critic,
        )
            .with_severity(Severity::Medium, Severity::High);
        let next = apply_transition(&original, record);

        assert_eq!(original.severity(), Severity::Medium);
        assert!(original.transitions().is_empty());
        assert_eq!(next.severity(), Severity::High);
        assert_eq!(next.original_severity(), Some(Severity::Medium));
        assert_eq!(next.transitions().len(), 1);
    }

    #[test]
    fn test_original_severity_kept_from_first_change() {
        let a = issue("SEC-01", Severity::Low);
        let b = change_severity(&a, Severity::High, 2, "r", Role::Critic);
        let c = change_severity(&b, Severity::Medium, 3, "r", Role::Verifier);
        assert_eq!(c.original_severity(), Some(Severity::Low));
        assert_eq!(c.severity(), Severity::Medium);
        assert_eq!(c.transitions().len(), 2);
    }

    #[test]
    fn test_change_severity_kind() {
        let base = issue("SEC-01", Severity::Medium);
        let up = change_severity(&base, Severity::Critical, 2, "exploitable", Role::Critic);
        assert_eq!(up.transitions()[0].kind, TransitionType::Escalated);
        assert_eq!(up.status(), IssueStatus::Raised);

        let down = change_severity(&base, Severity::Low, 2, "mitigated", Role::Critic);
        assert_eq!(down.transitions()[0].kind, TransitionType::Demoted);

        let same = change_severity(&base, Severity::Medium, 2, "noop", Role::Critic);
        assert!(same.transitions().is_empty());
    }

    #[test]
    fn test_merge_issues() {
        let target = issue("SEC-01", Severity::High);
        let a = issue("SEC-02", Severity::Medium);
        let b = issue("SEC-03", Severity::Low);

        let out = merge_issues(&target, &[a, b], 3, Role::Critic);
        assert!(!out.target.is_terminal());
        assert_eq!(out.target.related_issues(), &["SEC-02".to_string(), "SEC-03".to_string()]);
        assert!(out.target.description.contains("[merged from SEC-02]"));
        assert!(out.target.evidence.contains("[SEC-03] evidence SEC-03"));

        for source in &out.sources {
            assert_eq!(source.status(), IssueStatus::Merged);
            assert_eq!(source.merged_into(), Some("SEC-01"));
            assert_eq!(source.transitions().last().unwrap().kind, TransitionType::MergedInto);
        }
    }

    #[test]
    fn test_merge_skips_self_and_terminal_sources() {
        let target = issue("SEC-01", Severity::High);
        let dismissed = invalidate_issue(&issue("SEC-02", Severity::Low), 2, "fp", Role::Critic);
        let out = merge_issues(&target, &[target.clone(), dismissed.clone()], 3, Role::Critic);
        assert!(out.target.related_issues().is_empty());
        assert!(out.target.transitions().is_empty());
        assert_eq!(out.sources[1], dismissed);
    }

    #[test]
    fn test_split_issue_ids_and_inheritance() {
        let source = issue("COR-04", Severity::High);
        let drafts = vec![
            IssueDraft::summary("first half").with_severity(Severity::Critical),
            IssueDraft::summary("second half").with_location("src/other.rs"),
        ];
        let out = split_issue(&source, &drafts, 4, Role::Critic);

        assert_eq!(out.source.status(), IssueStatus::Split);
        assert_eq!(out.source.split_into(), &["COR-04-A".to_string(), "COR-04-B".to_string()]);
        assert_eq!(out.new_issues.len(), 2);
        assert_eq!(out.new_issues[0].id, "COR-04-A");
        assert_eq!(out.new_issues[0].severity(), Severity::Critical);
        assert_eq!(out.new_issues[0].location, "src/auth.rs:10");
        assert_eq!(out.new_issues[1].severity(), Severity::High);
        assert_eq!(out.new_issues[1].location, "src/other.rs");
        for child in &out.new_issues {
            assert_eq!(child.status(), IssueStatus::Raised);
            assert_eq!(child.transitions()[0].kind, TransitionType::SplitFrom);
            assert_eq!(child.raised_in_round, 4);
        }
    }

    #[test]
    fn test_split_with_no_drafts_is_noop() {
        let source = issue("COR-04", Severity::High);
        let out = split_issue(&source, &[], 4, Role::Critic);
        assert_eq!(out.source, source);
        assert!(out.new_issues.is_empty());
    }

    #[test]
    fn test_terminal_issue_never_reopened() {
        let dismissed = invalidate_issue(&issue("SEC-01", Severity::High), 2, "fp", Role::Critic);
        assert_eq!(dismissed.status(), IssueStatus::Dismissed);

        let again = validate_issue(&dismissed, 3, "actually real", Role::Verifier);
        assert_eq!(again.status(), IssueStatus::Dismissed);
        assert_eq!(again.transitions().len(), dismissed.transitions().len());

        let escalated = change_severity(&dismissed, Severity::Critical, 3, "r", Role::Verifier);
        assert_eq!(escalated.severity(), Severity::High);
    }

    #[test]
    fn test_validate_resolve_refine() {
        let base = issue("REL-01", Severity::Medium);
        let validated = validate_issue(&base, 2, "confirmed", Role::Critic);
        assert_eq!(validated.status(), IssueStatus::Unresolved);

        let resolved = resolve_issue(&validated, 3, "fixed", Role::Verifier);
        assert_eq!(resolved.status(), IssueStatus::Resolved);
        assert_eq!(resolve_issue(&resolved, 4, "again", Role::Verifier).transitions().len(), 2);

        let refined = refine_issue(&base, Some("sharper"), None, 2, "clarified", Role::Critic);
        assert_eq!(refined.summary, "sharper");
        assert_eq!(refined.status(), IssueStatus::Raised);
        assert_eq!(refined.transitions()[0].kind, TransitionType::Refined);
    }

    #[test]
    fn test_child_suffix() {
        assert_eq!(child_suffix(0), "A");
        assert_eq!(child_suffix(25), "Z");
        assert_eq!(child_suffix(26), "AA");
        assert_eq!(child_suffix(27), "AB");
    }
}
