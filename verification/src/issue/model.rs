//! Issue model — categories, severities, statuses and the transition record.
//!
//! An [`Issue`] only changes status or severity through a recorded
//! [`TransitionRecord`]. The fields that carry lifecycle state are private;
//! the lifecycle functions in [`super::lifecycle`] are the mutation path.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::session::Role;

/// The five fixed finding categories.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCategory {
    /// Injection, authn/authz, secrets, crypto misuse.
    Security,
    /// Logic errors and wrong results.
    Correctness,
    /// Crashes, races, resource handling, error paths.
    Reliability,
    /// Readability, duplication, structure.
    Maintainability,
    /// Latency, allocation, algorithmic cost.
    Performance,
}

impl IssueCategory {
    /// All categories in canonical order.
    pub const ALL: [IssueCategory; 5] = [
        Self::Security,
        Self::Correctness,
        Self::Reliability,
        Self::Maintainability,
        Self::Performance,
    ];

    /// Three-letter prefix used in issue IDs.
    pub fn code(self) -> &'static str {
        match self {
            Self::Security => "SEC",
            Self::Correctness => "COR",
            Self::Reliability => "REL",
            Self::Maintainability => "MNT",
            Self::Performance => "PRF",
        }
    }

    /// Lowercase name, as matched against round text for coverage.
    pub fn name(self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Correctness => "correctness",
            Self::Reliability => "reliability",
            Self::Maintainability => "maintainability",
            Self::Performance => "performance",
        }
    }

    /// Resolve a three-letter prefix (case-insensitive).
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.code().eq_ignore_ascii_case(code))
    }
}

impl std::fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Ordered severity scale. `Critical` ranks highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Scale from least to most severe.
    pub const SCALE: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Adjacent rung up the scale, clamped at `Critical`.
    pub fn escalated(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Critical => Self::Critical,
        }
    }

    /// Adjacent rung down the scale, clamped at `Low`.
    pub fn demoted(self) -> Self {
        match self {
            Self::Critical => Self::High,
            Self::High => Self::Medium,
            Self::Medium | Self::Low => Self::Low,
        }
    }

    /// Parse a level token such as `high` or `CRITICAL`.
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Lifecycle status of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueStatus {
    /// Newly raised, not yet reviewed by the other role.
    Raised,
    /// Disputed by the other role.
    Challenged,
    /// Confirmed and still open.
    Unresolved,
    /// Fix confirmed.
    Resolved,
    /// Invalidated; never reopened.
    Dismissed,
    /// Folded into another issue; never reopened.
    Merged,
    /// Replaced by child issues; never reopened.
    Split,
}

impl IssueStatus {
    /// Terminal statuses accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Dismissed | Self::Merged | Self::Split)
    }

    /// Whether the issue still blocks convergence at its severity.
    pub fn is_open(self) -> bool {
        matches!(self, Self::Raised | Self::Challenged | Self::Unresolved)
    }
}

impl std::fmt::Display for IssueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Raised => write!(f, "RAISED"),
            Self::Challenged => write!(f, "CHALLENGED"),
            Self::Unresolved => write!(f, "UNRESOLVED"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Dismissed => write!(f, "DISMISSED"),
            Self::Merged => write!(f, "MERGED"),
            Self::Split => write!(f, "SPLIT"),
        }
    }
}

/// Kind of a recorded state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionType {
    Discovered,
    Escalated,
    Demoted,
    MergedInto,
    /// Recorded on each child of a split.
    SplitFrom,
    /// Recorded on the parent of a split.
    SplitInto,
    Invalidated,
    Validated,
    Refined,
    Resolved,
}

impl std::fmt::Display for TransitionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Discovered => "DISCOVERED",
            Self::Escalated => "ESCALATED",
            Self::Demoted => "DEMOTED",
            Self::MergedInto => "MERGED_INTO",
            Self::SplitFrom => "SPLIT_FROM",
            Self::SplitInto => "SPLIT_INTO",
            Self::Invalidated => "INVALIDATED",
            Self::Validated => "VALIDATED",
            Self::Refined => "REFINED",
            Self::Resolved => "RESOLVED",
        };
        write!(f, "{}", s)
    }
}

/// One immutable state change in an issue's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    #[serde(rename = "type")]
    pub kind: TransitionType,
    pub from_status: IssueStatus,
    pub to_status: IssueStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_severity: Option<Severity>,
    /// Round in which the change was recorded.
    pub round: u32,
    pub reason: String,
    pub triggered_by: Role,
    pub timestamp: DateTime<Utc>,
}

impl TransitionRecord {
    /// Start a record against the issue's current state. Status is carried
    /// over unchanged until [`to_status`](Self::to_status) is called.
    pub fn new(
        kind: TransitionType,
        issue: &Issue,
        round: u32,
        reason: impl Into<String>,
        triggered_by: Role,
    ) -> Self {
        Self {
            kind,
            from_status: issue.status,
            to_status: issue.status,
            from_severity: None,
            to_severity: None,
            round,
            reason: reason.into(),
            triggered_by,
            timestamp: Utc::now(),
        }
    }

    /// Set the target status.
    pub fn to_status(mut self, status: IssueStatus) -> Self {
        self.to_status = status;
        self
    }

    /// Record a severity move.
    pub fn with_severity(mut self, from: Severity, to: Severity) -> Self {
        self.from_severity = Some(from);
        self.to_severity = Some(to);
        self
    }
}

/// One tracked finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// `SEC-01` style identifier, unique within a session.
    pub id: String,
    pub category: IssueCategory,
    severity: Severity,
    status: IssueStatus,
    pub summary: String,
    /// `path[:line]` where the finding applies. Empty when unknown.
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub evidence: String,
    #[serde(default)]
    transitions: Vec<TransitionRecord>,
    pub raised_by: Role,
    pub raised_in_round: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_severity: Option<Severity>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    related_issues: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    merged_into: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    split_into: Vec<String>,
}

impl Issue {
    /// Create a new `RAISED` issue with an empty history.
    pub fn new(
        id: impl Into<String>,
        category: IssueCategory,
        severity: Severity,
        summary: impl Into<String>,
        raised_by: Role,
        raised_in_round: u32,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            severity,
            status: IssueStatus::Raised,
            summary: summary.into(),
            location: String::new(),
            description: String::new(),
            evidence: String::new(),
            transitions: Vec::new(),
            raised_by,
            raised_in_round,
            original_severity: None,
            related_issues: Vec::new(),
            merged_into: None,
            split_into: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = evidence.into();
        self
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn status(&self) -> IssueStatus {
        self.status
    }

    /// Append-only transition history.
    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    /// Severity before the first recorded severity change.
    pub fn original_severity(&self) -> Option<Severity> {
        self.original_severity
    }

    pub fn related_issues(&self) -> &[String] {
        &self.related_issues
    }

    pub fn merged_into(&self) -> Option<&str> {
        self.merged_into.as_deref()
    }

    pub fn split_into(&self) -> &[String] {
        &self.split_into
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// File part of `location`, without the line suffix.
    pub fn file(&self) -> Option<&str> {
        let loc = self.location.trim();
        if loc.is_empty() {
            return None;
        }
        let file = match loc.split_once(':') {
            Some((path, rest)) if rest.chars().next().is_some_and(|c| c.is_ascii_digit()) => path,
            _ => loc,
        };
        Some(file.trim()).filter(|f| !f.is_empty())
    }

    /// Whether `id` names this issue (IDs compare case-insensitively).
    pub fn has_id(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }

    /// Apply a record: status and severity follow it, history grows by one.
    pub(super) fn record(&mut self, record: TransitionRecord) {
        if let Some(to) = record.to_severity {
            if to != self.severity && self.original_severity.is_none() {
                self.original_severity = Some(self.severity);
            }
            self.severity = to;
        }
        self.status = record.to_status;
        self.transitions.push(record);
    }

    pub(super) fn add_related(&mut self, id: &str) {
        if !self.related_issues.iter().any(|r| r.eq_ignore_ascii_case(id)) {
            self.related_issues.push(id.to_string());
        }
    }

    pub(super) fn set_merged_into(&mut self, target: &str) {
        self.merged_into = Some(target.to_string());
    }

    pub(super) fn set_split_into(&mut self, children: Vec<String>) {
        self.split_into = children;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ladder_clamps() {
        assert_eq!(Severity::Low.escalated(), Severity::Medium);
        assert_eq!(Severity::Critical.escalated(), Severity::Critical);
        assert_eq!(Severity::High.demoted(), Severity::Medium);
        assert_eq!(Severity::Low.demoted(), Severity::Low);
        assert!(Severity::Critical > Severity::High);
    }

    #[test]
    fn test_category_codes() {
        assert_eq!(IssueCategory::from_code("sec"), Some(IssueCategory::Security));
        assert_eq!(IssueCategory::from_code("PRF"), Some(IssueCategory::Performance));
        assert_eq!(IssueCategory::from_code("XYZ"), None);
    }

    #[test]
    fn test_status_terminal_and_open() {
        assert!(IssueStatus::Merged.is_terminal());
        assert!(IssueStatus::Split.is_terminal());
        assert!(IssueStatus::Dismissed.is_terminal());
        assert!(!IssueStatus::Resolved.is_terminal());
        assert!(!IssueStatus::Resolved.is_open());
        assert!(IssueStatus::Challenged.is_open());
    }

    #[test]
    fn test_issue_file_strips_line() {
        let issue = Issue::new(
            "SEC-01",
            IssueCategory::Security,
            Severity::High,
            "x",
            Role::Verifier,
            1,
        )
            .with_location("src/auth/login.rs:42");
        assert_eq!(issue.file(), Some("src/auth/login.rs"));

        let bare = issue.clone().with_location("src/db.rs");
        assert_eq!(bare.file(), Some("src/db.rs"));

        let none = issue.with_location("  ");
        assert_eq!(none.file(), None);
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_string(&TransitionType::MergedInto).unwrap();
        assert_eq!(json, "\"MERGED_INTO\"");
        let sev: Severity = serde_json::from_str("\"CRITICAL\"").unwrap();
        assert_eq!(sev, Severity::Critical);
    }
}
