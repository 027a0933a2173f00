//! Transition detection — turns free-form round text into lifecycle requests.
//!
//! Pattern families are scanned independently over sentence-sized fragments:
//! severity escalation/demotion, merge/duplicate, split, invalidation and
//! validation. Discovery of new issues only runs for the Critic, whose job
//! is to surface what the Verifier missed.
//!
//! A cue preceded by a negator ("is not a false positive", "should not be
//! merged") is skipped rather than read as its opposite. References to IDs
//! that are not in the current issue set are dropped without error. Nothing
//! here can fail.

use std::collections::HashSet;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::{Issue, IssueCategory, IssueStatus, Severity, TransitionRecord, TransitionType};
use super::patterns::{
    find_ids, infer_category, infer_location, infer_severity, is_negated, line_around, nearest_id,
    split_parts, split_sentences, synthesize_issue_id, truncate, IdMention, DEMOTE_PATTERN,
    DISCOVERY_PATTERN, ESCALATE_PATTERN, ID_PATTERN, INVALIDATE_PATTERN, MERGE_PATTERN,
    SPLIT_PATTERN, VALIDATE_PATTERN,
};
use crate::session::{Role, Session};

const REASON_MAX_CHARS: usize = 200;
const SUMMARY_MAX_CHARS: usize = 160;

/// A proposed transition against an existing or newly discovered issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedTransition {
    pub issue_id: String,
    pub record: TransitionRecord,
}

/// A requested severity move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityChange {
    pub issue_id: String,
    pub from: Severity,
    pub to: Severity,
    pub reason: String,
}

/// Fold `source_ids` into `target_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    pub target_id: String,
    pub source_ids: Vec<String>,
    pub reason: String,
}

/// Split request. Child data is supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRequest {
    pub source_id: String,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_parts: Option<u32>,
}

/// Everything detected in one round's output.
///
/// `transitions` holds the fully determined records (discoveries, severity
/// moves, invalidations, validations). Merges and splits are requests: they
/// touch several issues and are applied through
/// [`merge_issues`](super::lifecycle::merge_issues) and
/// [`split_issue`](super::lifecycle::split_issue).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionDetection {
    pub transitions: Vec<DetectedTransition>,
    pub new_issues: Vec<Issue>,
    pub merge_requests: Vec<MergeRequest>,
    pub split_requests: Vec<SplitRequest>,
    pub severity_changes: Vec<SeverityChange>,
}

impl TransitionDetection {
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
            && self.new_issues.is_empty()
            && self.merge_requests.is_empty()
            && self.split_requests.is_empty()
    }

    /// IDs of issues invalidated by this detection.
    pub fn invalidated_ids(&self) -> impl Iterator<Item = &str> {
        self.transitions
            .iter()
            .filter(|t| t.record.kind == TransitionType::Invalidated)
            .map(|t| t.issue_id.as_str())
    }
}

/// Direction of a severity move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Up,
    Down,
}

/// Accumulates detection results against a fixed snapshot of issues.
///
/// Shared by the heuristic and structured extractors so that both apply the
/// same reference resolution, dedup and tie-break rules.
pub(crate) struct DetectionBuilder<'a> {
    existing: &'a [Issue],
    round: u32,
    role: Role,
    out: TransitionDetection,
    severity_touched: HashSet<String>,
    invalidated: HashSet<String>,
    validations: Vec<DetectedTransition>,
    split_touched: HashSet<String>,
    new_ids: HashSet<String>,
}

impl<'a> DetectionBuilder<'a> {
    pub(crate) fn new(existing: &'a [Issue], round: u32, role: Role) -> Self {
        Self {
            existing,
            round,
            role,
            out: TransitionDetection::default(),
            severity_touched: HashSet::new(),
            invalidated: HashSet::new(),
            validations: Vec::new(),
            split_touched: HashSet::new(),
            new_ids: HashSet::new(),
        }
    }

    /// Resolve a reference case-insensitively against the snapshot.
    fn resolve(&self, reference: &str) -> Option<&'a Issue> {
        let found = self.existing.iter().find(|i| i.has_id(reference.trim()));
        if found.is_none() {
            debug!(reference, round = self.round, "Dropping reference to unknown issue");
        }
        found
    }

    /// Request a severity move. An explicit level is used when it points the
    /// same way as `direction`; otherwise the adjacent rung is taken.
    pub(crate) fn severity(
        &mut self,
        reference: &str,
        direction: Direction,
        explicit: Option<Severity>,
        reason: &str,
    ) {
        let Some(issue) = self.resolve(reference) else {
            return;
        };
        if issue.is_terminal() || self.severity_touched.contains(&issue.id) {
            return;
        }
        let current = issue.severity();
        let target = match (direction, explicit) {
            (Direction::Up, Some(level)) if level > current => level,
            (Direction::Down, Some(level)) if level < current => level,
            (Direction::Up, _) => current.escalated(),
            (Direction::Down, _) => current.demoted(),
        };
        if target == current {
            return;
        }
        self.set_severity(issue, target, reason);
    }

    /// Request an exact severity, direction implied by rank.
    pub(crate) fn severity_to(&mut self, reference: &str, level: Severity, reason: &str) {
        let Some(issue) = self.resolve(reference) else {
            return;
        };
        if issue.is_terminal()
            || self.severity_touched.contains(&issue.id)
            || level == issue.severity()
        {
            return;
        }
        self.set_severity(issue, level, reason);
    }

    fn set_severity(&mut self, issue: &Issue, target: Severity, reason: &str) {
        let current = issue.severity();
        let kind = if target > current {
            TransitionType::Escalated
        } else {
            TransitionType::Demoted
        };
        let reason = truncate(reason, REASON_MAX_CHARS);
        let record = TransitionRecord::new(kind, issue, self.round, reason.clone(), self.role)
            .with_severity(current, target);
        self.severity_touched.insert(issue.id.clone());
        self.out.severity_changes.push(SeverityChange {
            issue_id: issue.id.clone(),
            from: current,
            to: target,
            reason,
        });
        self.out.transitions.push(DetectedTransition {
            issue_id: issue.id.clone(),
            record,
        });
    }

    pub(crate) fn invalidate(&mut self, reference: &str, reason: &str) {
        let Some(issue) = self.resolve(reference) else {
            return;
        };
        if issue.is_terminal() || !self.invalidated.insert(issue.id.clone()) {
            return;
        }
        let record = TransitionRecord::new(
            TransitionType::Invalidated,
            issue,
            self.round,
            truncate(reason, REASON_MAX_CHARS),
            self.role,
        )
        .to_status(IssueStatus::Dismissed);
        self.out.transitions.push(DetectedTransition {
            issue_id: issue.id.clone(),
            record,
        });
    }

    pub(crate) fn validate(&mut self, reference: &str, reason: &str) {
        let Some(issue) = self.resolve(reference) else {
            return;
        };
        if !issue.is_open()
            || issue.status() == IssueStatus::Unresolved
            || self.validations.iter().any(|v| v.issue_id == issue.id)
        {
            return;
        }
        let record = TransitionRecord::new(
            TransitionType::Validated,
            issue,
            self.round,
            truncate(reason, REASON_MAX_CHARS),
            self.role,
        )
        .to_status(IssueStatus::Unresolved);
        self.validations.push(DetectedTransition {
            issue_id: issue.id.clone(),
            record,
        });
    }

    /// Merge a group of mentioned issues. The most severe survives; ties go
    /// to the earliest-raised issue, then to the first mentioned.
    pub(crate) fn merge_group(&mut self, references: &[&str], reason: &str) {
        let mut group: Vec<&'a Issue> = Vec::new();
        for reference in references {
            if let Some(issue) = self.resolve(reference) {
                if !issue.is_terminal() && !group.iter().any(|g| g.id == issue.id) {
                    group.push(issue);
                }
            }
        }
        if group.len() < 2 {
            return;
        }
        let mut target = group[0];
        for candidate in &group[1..] {
            let better = candidate.severity() > target.severity()
                || (candidate.severity() == target.severity()
                    && candidate.raised_in_round < target.raised_in_round);
            if better {
                target = *candidate;
            }
        }
        let sources: Vec<String> = group
            .iter()
            .filter(|g| g.id != target.id)
            .map(|g| g.id.clone())
            .collect();
        self.push_merge(target.id.clone(), sources, reason);
    }

    /// Merge with an explicit target, as named in a structured report.
    pub(crate) fn merge_into(&mut self, target: &str, sources: &[String], reason: &str) {
        let Some(target) = self.resolve(target) else {
            return;
        };
        if target.is_terminal() {
            return;
        }
        let mut resolved = Vec::new();
        for source in sources {
            if let Some(issue) = self.resolve(source) {
                if issue.id != target.id && !issue.is_terminal() && !resolved.contains(&issue.id) {
                    resolved.push(issue.id.clone());
                }
            }
        }
        if !resolved.is_empty() {
            self.push_merge(target.id.clone(), resolved, reason);
        }
    }

    fn push_merge(&mut self, target_id: String, source_ids: Vec<String>, reason: &str) {
        // A source already queued into another merge stays with its first target.
        let already_source: HashSet<&str> = self
            .out
            .merge_requests
            .iter()
            .flat_map(|m| m.source_ids.iter().map(String::as_str))
            .collect();
        let source_ids: Vec<String> = source_ids
            .into_iter()
            .filter(|s| !already_source.contains(s.as_str()))
            .collect();
        if source_ids.is_empty() {
            return;
        }
        if let Some(existing) = self
            .out
            .merge_requests
            .iter_mut()
            .find(|m| m.target_id == target_id)
        {
            for s in source_ids {
                if !existing.source_ids.contains(&s) {
                    existing.source_ids.push(s);
                }
            }
            return;
        }
        self.out.merge_requests.push(MergeRequest {
            target_id,
            source_ids,
            reason: truncate(reason, REASON_MAX_CHARS),
        });
    }

    pub(crate) fn split(&mut self, reference: &str, reason: &str, suggested_parts: Option<u32>) {
        let Some(issue) = self.resolve(reference) else {
            return;
        };
        if issue.is_terminal() || !self.split_touched.insert(issue.id.clone()) {
            return;
        }
        self.out.split_requests.push(SplitRequest {
            source_id: issue.id.clone(),
            reason: truncate(reason, REASON_MAX_CHARS),
            suggested_parts,
        });
    }

    /// Record a newly discovered issue. Without an explicit ID one is
    /// synthesized from the snippet; an ID already known is a duplicate.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn discover(
        &mut self,
        id: Option<&str>,
        category: IssueCategory,
        severity: Severity,
        summary: &str,
        description: &str,
        location: Option<String>,
        evidence: Option<&str>,
    ) {
        let id = match id {
            Some(id) if !id.trim().is_empty() => id.trim().to_uppercase(),
            _ => synthesize_issue_id(category, description),
        };
        let key = id.to_ascii_lowercase();
        if self.existing.iter().any(|i| i.has_id(&id)) || !self.new_ids.insert(key) {
            debug!(issue_id = %id, "Skipping duplicate discovery");
            return;
        }

        let mut issue = Issue::new(
            id.clone(),
            category,
            severity,
            truncate(summary, SUMMARY_MAX_CHARS),
            self.role,
            self.round,
        )
        .with_description(description)
        .with_location(location.unwrap_or_default());
        if let Some(evidence) = evidence {
            issue = issue.with_evidence(evidence);
        }
        let record = TransitionRecord::new(
            TransitionType::Discovered,
            &issue,
            self.round,
            format!("discovered by {}", self.role),
            self.role,
        );
        issue.record(record.clone());
        self.out.transitions.push(DetectedTransition {
            issue_id: id,
            record,
        });
        self.out.new_issues.push(issue);
    }

    /// Finish: invalidation wins over validation for the same issue.
    pub(crate) fn finish(mut self) -> TransitionDetection {
        let invalidated = &self.invalidated;
        self.out.transitions.extend(
            self.validations
                .into_iter()
                .filter(|v| !invalidated.contains(&v.issue_id)),
        );
        self.out
    }
}

/// Scan `output` for lifecycle transitions against `existing`.
///
/// Records are stamped with `session.current_round`.
pub fn detect_issue_transitions(
    session: &Session,
    role: Role,
    output: &str,
    existing: &[Issue],
) -> TransitionDetection {
    let mut builder = DetectionBuilder::new(existing, session.current_round, role);

    for sentence in split_sentences(output) {
        let ids = find_ids(sentence);
        if ids.is_empty() {
            continue;
        }
        scan_severity(&mut builder, sentence, &ids);
        scan_merges(&mut builder, sentence, &ids);
        scan_splits(&mut builder, sentence, &ids);
        scan_verdicts(&mut builder, sentence, &ids);
    }

    if role == Role::Critic {
        scan_discoveries(&mut builder, output, existing);
    }

    builder.finish()
}

fn scan_severity(builder: &mut DetectionBuilder<'_>, sentence: &str, ids: &[IdMention<'_>]) {
    for (pattern, direction) in [
        (&*ESCALATE_PATTERN, Direction::Up),
        (&*DEMOTE_PATTERN, Direction::Down),
    ] {
        for m in pattern.find_iter(sentence) {
            if is_negated(sentence, m.start()) {
                continue;
            }
            if let Some(id) = nearest_id(ids, m.start()) {
                let explicit = infer_severity(&sentence[m.end()..]);
                builder.severity(id, direction, explicit, sentence);
            }
        }
    }
}

fn scan_merges(builder: &mut DetectionBuilder<'_>, sentence: &str, ids: &[IdMention<'_>]) {
    let Some(m) = MERGE_PATTERN
        .find_iter(sentence)
        .find(|m| !is_negated(sentence, m.start()))
    else {
        return;
    };
    if ids.len() < 2 {
        return;
    }
    let before = ids.iter().rev().find(|id| id.end <= m.start());
    let after = ids.iter().find(|id| id.start >= m.end());
    let refs: Vec<&str> = match (before, after) {
        // "A is a duplicate of B"
        (Some(a), Some(b)) => vec![a.text, b.text],
        // "merge A, B and C" / "A and B are duplicates"
        _ => ids.iter().map(|id| id.text).collect(),
    };
    builder.merge_group(&refs, sentence);
}

fn scan_splits(builder: &mut DetectionBuilder<'_>, sentence: &str, ids: &[IdMention<'_>]) {
    let cue = SPLIT_PATTERN
        .find_iter(sentence)
        .find(|m| !is_negated(sentence, m.start()));
    if let Some(m) = cue {
        if let Some(id) = nearest_id(ids, m.start()) {
            builder.split(id, sentence, split_parts(sentence));
        }
    }
}

fn scan_verdicts(builder: &mut DetectionBuilder<'_>, sentence: &str, ids: &[IdMention<'_>]) {
    for start in affirmed_cues(&INVALIDATE_PATTERN, sentence) {
        if let Some(id) = nearest_id(ids, start) {
            builder.invalidate(id, sentence);
        }
    }
    for start in affirmed_cues(&VALIDATE_PATTERN, sentence) {
        if let Some(id) = nearest_id(ids, start) {
            builder.validate(id, sentence);
        }
    }
}

/// Start offsets of the non-negated matches of `pattern`.
fn affirmed_cues(pattern: &Regex, sentence: &str) -> Vec<usize> {
    pattern
        .find_iter(sentence)
        .filter(|m| !is_negated(sentence, m.start()))
        .map(|m| m.start())
        .collect()
}

fn scan_discoveries(builder: &mut DetectionBuilder<'_>, output: &str, existing: &[Issue]) {
    for caps in DISCOVERY_PATTERN.captures_iter(output) {
        let (Some(whole), Some(snippet)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let line = line_around(output, whole.start());
        let mentions_known = ID_PATTERN
            .find_iter(line)
            .any(|m| existing.iter().any(|i| i.has_id(m.as_str())));
        if mentions_known {
            continue;
        }
        let snippet = snippet.as_str().trim();
        let category = infer_category(snippet);
        let severity = infer_severity(snippet).unwrap_or(Severity::Medium);
        builder.discover(
            None,
            category,
            severity,
            snippet,
            snippet,
            infer_location(snippet),
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::VerificationModeConfig;

    fn session_at(round: u32) -> Session {
        let mut session = Session::new(
            "src/",
            "no vulnerabilities",
            VerificationModeConfig::default(),
            10,
        );
        session.current_round = round;
        session
    }

    fn issue(id: &str, severity: Severity) -> Issue {
        Issue::new(id, IssueCategory::Security, severity, "summary", Role::Verifier, 1)
    }

    #[test]
    fn test_escalation_adjacent_rung() {
        let issues = vec![issue("SEC-01", Severity::Medium)];
        let d = detect_issue_transitions(
            &session_at(2),
            Role::Critic,
            "SEC-01 should be escalated.",
            &issues,
        );
        assert_eq!(d.severity_changes.len(), 1);
        assert_eq!(d.severity_changes[0].to, Severity::High);
        assert_eq!(d.transitions[0].record.kind, TransitionType::Escalated);
        assert_eq!(d.transitions[0].record.round, 2);
    }

    #[test]
    fn test_explicit_level_token() {
        let issues = vec![issue("SEC-01", Severity::Medium)];
        let d = detect_issue_transitions(
            &session_at(2),
            Role::Critic,
            "I would escalate sec-01 to critical given the exposure.",
            &issues,
        );
        assert_eq!(d.severity_changes[0].issue_id, "SEC-01");
        assert_eq!(d.severity_changes[0].to, Severity::Critical);
    }

    #[test]
    fn test_demotion_clamped_at_low() {
        let issues = vec![issue("SEC-01", Severity::Low)];
        let d = detect_issue_transitions(
            &session_at(2),
            Role::Critic,
            "SEC-01 is overstated and should be downgraded.",
            &issues,
        );
        assert!(d.severity_changes.is_empty());
    }

    #[test]
    fn test_unknown_reference_dropped() {
        let issues = vec![issue("SEC-01", Severity::Medium)];
        let d = detect_issue_transitions(
            &session_at(2),
            Role::Verifier,
            "COR-99 should be escalated. REL-07 is a false positive.",
            &issues,
        );
        assert!(d.is_empty());
    }

    #[test]
    fn test_duplicate_merge_more_severe_wins() {
        let issues = vec![issue("SEC-01", Severity::Low), issue("SEC-02", Severity::High)];
        let d = detect_issue_transitions(
            &session_at(3),
            Role::Critic,
            "SEC-02 is a duplicate of SEC-01.",
            &issues,
        );
        assert_eq!(d.merge_requests.len(), 1);
        assert_eq!(d.merge_requests[0].target_id, "SEC-02");
        assert_eq!(d.merge_requests[0].source_ids, vec!["SEC-01".to_string()]);
    }

    #[test]
    fn test_merge_tie_goes_to_earlier_raised() {
        let older = issue("SEC-01", Severity::High);
        let newer = Issue::new(
            "SEC-05",
            IssueCategory::Security,
            Severity::High,
            "s",
            Role::Verifier,
            3,
        );
        let d = detect_issue_transitions(
            &session_at(4),
            Role::Critic,
            "Merge SEC-05 and SEC-01.",
            &[older, newer],
        );
        assert_eq!(d.merge_requests[0].target_id, "SEC-01");
    }

    #[test]
    fn test_split_request() {
        let issues = vec![issue("COR-03", Severity::High)];
        let d = detect_issue_transitions(
            &session_at(2),
            Role::Critic,
            "COR-03 conflates two separate issues and should be split.",
            &issues,
        );
        assert_eq!(d.split_requests.len(), 1);
        assert_eq!(d.split_requests[0].source_id, "COR-03");
        assert_eq!(d.split_requests[0].suggested_parts, Some(2));
    }

    #[test]
    fn test_invalidation_wins_over_validation() {
        let issues = vec![issue("SEC-01", Severity::High)];
        let d = detect_issue_transitions(
            &session_at(2),
            Role::Critic,
            "SEC-01 was confirmed earlier. On reflection SEC-01 is a false positive.",
            &issues,
        );
        let kinds: Vec<TransitionType> = d.transitions.iter().map(|t| t.record.kind).collect();
        assert_eq!(kinds, vec![TransitionType::Invalidated]);
        assert_eq!(d.invalidated_ids().collect::<Vec<_>>(), vec!["SEC-01"]);
    }

    #[test]
    fn test_negated_verdicts_ignored() {
        let issues = vec![issue("SEC-01", Severity::Critical)];
        for text in [
            "SEC-01 is not a false positive, it is exploitable.",
            "SEC-01 should not be dismissed.",
            "SEC-01 isn't invalid at all.",
            "SEC-01 was never rejected.",
        ] {
            let d = detect_issue_transitions(&session_at(2), Role::Critic, text, &issues);
            assert_eq!(d.invalidated_ids().count(), 0, "invalidated by {:?}", text);
        }

        let d = detect_issue_transitions(
            &session_at(2),
            Role::Critic,
            "SEC-01 is not confirmed.",
            &issues,
        );
        assert!(d.transitions.is_empty());
    }

    #[test]
    fn test_negated_merge_and_split_ignored() {
        let issues = vec![issue("SEC-01", Severity::High), issue("SEC-02", Severity::High)];
        let d = detect_issue_transitions(
            &session_at(3),
            Role::Critic,
            "SEC-01 is not a duplicate of SEC-02, they are distinct bugs.",
            &issues,
        );
        assert!(d.merge_requests.is_empty());

        let d = detect_issue_transitions(
            &session_at(3),
            Role::Critic,
            "SEC-01 should not be split.",
            &issues,
        );
        assert!(d.split_requests.is_empty());
    }

    #[test]
    fn test_negated_severity_move_ignored() {
        let issues = vec![issue("SEC-01", Severity::Medium)];
        let d = detect_issue_transitions(
            &session_at(2),
            Role::Critic,
            "SEC-01 should not be escalated. There is no need to downgrade SEC-01 either.",
            &issues,
        );
        assert!(d.severity_changes.is_empty());
    }

    #[test]
    fn test_affirmed_cue_after_negated_one() {
        let issues = vec![issue("SEC-01", Severity::High)];
        let d = detect_issue_transitions(
            &session_at(2),
            Role::Critic,
            "SEC-01 is not dismissed lightly: it is a false positive.",
            &issues,
        );
        assert_eq!(d.invalidated_ids().collect::<Vec<_>>(), vec!["SEC-01"]);
    }

    #[test]
    fn test_validation_moves_to_unresolved() {
        let issues = vec![issue("REL-02", Severity::Medium)];
        let d = detect_issue_transitions(
            &session_at(2),
            Role::Critic,
            "REL-02 is confirmed.",
            &issues,
        );
        assert_eq!(d.transitions.len(), 1);
        assert_eq!(d.transitions[0].record.to_status, IssueStatus::Unresolved);
    }

    #[test]
    fn test_discovery_only_for_critic() {
        let text = "New issue: SQL injection in src/db/query.rs:88 allows arbitrary reads, critical.";
        let as_verifier = detect_issue_transitions(&session_at(2), Role::Verifier, text, &[]);
        assert!(as_verifier.new_issues.is_empty());

        let as_critic = detect_issue_transitions(&session_at(2), Role::Critic, text, &[]);
        assert_eq!(as_critic.new_issues.len(), 1);
        let found = &as_critic.new_issues[0];
        assert!(found.id.starts_with("SEC-"));
        assert_eq!(found.category, IssueCategory::Security);
        assert_eq!(found.severity(), Severity::Critical);
        assert_eq!(found.location, "src/db/query.rs:88");
        assert_eq!(found.raised_by, Role::Critic);
        assert_eq!(found.transitions()[0].kind, TransitionType::Discovered);
    }

    #[test]
    fn test_discovery_is_deterministic_and_deduplicated() {
        let text = "New issue: unbounded retry loop in worker.rs can spin forever.";
        let first = detect_issue_transitions(&session_at(2), Role::Critic, text, &[]);
        assert_eq!(first.new_issues.len(), 1);

        let second = detect_issue_transitions(
            &session_at(3),
            Role::Critic,
            text,
            &first.new_issues,
        );
        assert!(second.new_issues.is_empty());

        let repeated = format!("{}\n{}", text, text);
        let twice = detect_issue_transitions(&session_at(2), Role::Critic, &repeated, &[]);
        assert_eq!(twice.new_issues.len(), 1);
        assert_eq!(twice.new_issues[0].id, first.new_issues[0].id);
    }

    #[test]
    fn test_discovery_skips_lines_about_known_issues() {
        let issues = vec![issue("SEC-01", Severity::High)];
        let d = detect_issue_transitions(
            &session_at(2),
            Role::Critic,
            "The verifier missed that SEC-01 also affects the admin path.",
            &issues,
        );
        assert!(d.new_issues.is_empty());
    }

    #[test]
    fn test_terminal_issue_ignored() {
        let dismissed = super::super::lifecycle::invalidate_issue(
            &issue("SEC-01", Severity::High),
            1,
            "fp",
            Role::Critic,
        );
        let d = detect_issue_transitions(
            &session_at(2),
            Role::Critic,
            "SEC-01 should be escalated.",
            &[dismissed],
        );
        assert!(d.is_empty());
    }
}
