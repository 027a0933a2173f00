//! Extraction capability boundary.
//!
//! Two implementations of [`TransitionExtractor`]: the regex heuristic path
//! and a structured path that reads a typed JSON report out of the round
//! output. Which one runs is a configuration flag, not a code path choice.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::debug;

use super::detect::{detect_issue_transitions, DetectionBuilder, Direction, TransitionDetection};
use super::model::{Issue, IssueCategory, Severity};
use super::patterns::{infer_category, infer_location};
use crate::session::{Role, Session};

static JSON_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap());

/// Which extractor the upstream generator can feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionCapability {
    /// Free-form text; pattern matching only.
    #[default]
    Heuristic,
    /// The generator emits a [`StructuredRoundReport`].
    Structured,
}

impl std::str::FromStr for ExtractionCapability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "heuristic" => Ok(Self::Heuristic),
            "structured" => Ok(Self::Structured),
            other => Err(format!("unknown extraction capability: {}", other)),
        }
    }
}

/// Turns one round's output into lifecycle requests.
pub trait TransitionExtractor: Send + Sync {
    fn extract(
        &self,
        session: &Session,
        role: Role,
        output: &str,
        existing: &[Issue],
    ) -> TransitionDetection;

    fn capability(&self) -> ExtractionCapability;
}

/// Build the extractor for a capability flag.
pub fn extractor_for(capability: ExtractionCapability) -> Box<dyn TransitionExtractor> {
    match capability {
        ExtractionCapability::Heuristic => Box::new(HeuristicExtractor),
        ExtractionCapability::Structured => Box::new(StructuredExtractor),
    }
}

/// Pattern-matching extractor.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicExtractor;

impl TransitionExtractor for HeuristicExtractor {
    fn extract(
        &self,
        session: &Session,
        role: Role,
        output: &str,
        existing: &[Issue],
    ) -> TransitionDetection {
        detect_issue_transitions(session, role, output, existing)
    }

    fn capability(&self) -> ExtractionCapability {
        ExtractionCapability::Heuristic
    }
}

/// Reads a [`StructuredRoundReport`]; falls back to the heuristic path when
/// the output carries no parsable report.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructuredExtractor;

impl TransitionExtractor for StructuredExtractor {
    fn extract(
        &self,
        session: &Session,
        role: Role,
        output: &str,
        existing: &[Issue],
    ) -> TransitionDetection {
        match StructuredRoundReport::parse(output) {
            Some(report) => report.into_detection(existing, session.current_round, role),
            None => {
                debug!(
                    session_id = %session.id,
                    "No structured report in output, using heuristic extraction"
                );
                detect_issue_transitions(session, role, output, existing)
            }
        }
    }

    fn capability(&self) -> ExtractionCapability {
        ExtractionCapability::Structured
    }
}

/// Typed round report a capable generator can emit.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StructuredRoundReport {
    #[serde(default)]
    pub new_issues: Vec<StructuredIssue>,
    #[serde(default)]
    pub severity_changes: Vec<StructuredSeverityChange>,
    #[serde(default)]
    pub merges: Vec<StructuredMerge>,
    #[serde(default)]
    pub splits: Vec<StructuredSplit>,
    #[serde(default)]
    pub invalidations: Vec<StructuredVerdict>,
    #[serde(default)]
    pub validations: Vec<StructuredVerdict>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StructuredIssue {
    /// Omit to have an ID derived from the description.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub category: Option<IssueCategory>,
    #[serde(default)]
    pub severity: Option<Severity>,
    pub summary: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SeverityDirection {
    Escalate,
    Demote,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StructuredSeverityChange {
    pub issue_id: String,
    /// Exact new level. When absent, `direction` moves one rung.
    #[serde(default)]
    pub severity: Option<Severity>,
    #[serde(default)]
    pub direction: Option<SeverityDirection>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StructuredMerge {
    pub target_id: String,
    pub source_ids: Vec<String>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StructuredSplit {
    pub issue_id: String,
    #[serde(default)]
    pub parts: Option<u32>,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StructuredVerdict {
    pub issue_id: String,
    #[serde(default)]
    pub reason: String,
}

impl StructuredRoundReport {
    /// JSON schema handed to the generator.
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(StructuredRoundReport)
    }

    /// Find a report in a fenced ```json block, or the whole output.
    pub fn parse(output: &str) -> Option<Self> {
        if let Some(body) = JSON_FENCE.captures(output).and_then(|c| c.get(1)) {
            if let Ok(report) = serde_json::from_str(body.as_str()) {
                return Some(report);
            }
        }
        let trimmed = output.trim();
        if trimmed.starts_with('{') {
            return serde_json::from_str(trimmed).ok();
        }
        None
    }

    /// Resolve the report against the current issues. New issues are
    /// accepted from either role since the report is explicit.
    pub fn into_detection(self, existing: &[Issue], round: u32, role: Role) -> TransitionDetection {
        let mut builder = DetectionBuilder::new(existing, round, role);

        for issue in self.new_issues {
            let description = issue.description.unwrap_or_else(|| issue.summary.clone());
            let category = issue
                .category
                .unwrap_or_else(|| infer_category(&format!("{} {}", issue.summary, description)));
            let location = issue.location.or_else(|| infer_location(&description));
            builder.discover(
                issue.id.as_deref(),
                category,
                issue.severity.unwrap_or(Severity::Medium),
                &issue.summary,
                &description,
                location,
                issue.evidence.as_deref(),
            );
        }

        for change in self.severity_changes {
            match (change.severity, change.direction) {
                (Some(level), _) => builder.severity_to(&change.issue_id, level, &change.reason),
                (None, Some(SeverityDirection::Escalate)) => {
                    builder.severity(&change.issue_id, Direction::Up, None, &change.reason)
                }
                (None, Some(SeverityDirection::Demote)) => {
                    builder.severity(&change.issue_id, Direction::Down, None, &change.reason)
                }
                (None, None) => {}
            }
        }

        for merge in self.merges {
            builder.merge_into(&merge.target_id, &merge.source_ids, &merge.reason);
        }
        for split in self.splits {
            builder.split(&split.issue_id, &split.reason, split.parts);
        }
        for verdict in self.invalidations {
            builder.invalidate(&verdict.issue_id, &verdict.reason);
        }
        for verdict in self.validations {
            builder.validate(&verdict.issue_id, &verdict.reason);
        }

        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::model::IssueStatus;
    use crate::session::VerificationModeConfig;

    fn session() -> Session {
        let mut s = Session::new("repo", "reqs", VerificationModeConfig::default(), 10);
        s.current_round = 2;
        s
    }

    fn existing() -> Vec<Issue> {
        vec![
            Issue::new("SEC-01", IssueCategory::Security, Severity::Medium, "a", Role::Verifier, 1),
            Issue::new("SEC-02", IssueCategory::Security, Severity::Low, "b", Role::Verifier, 1),
            Issue::new(
                "COR-01",
                IssueCategory::Correctness,
                Severity::High,
                "c",
                Role::Verifier,
                1,
            ),
        ]
    }

    #[test]
    fn test_parse_fenced_report() {
        let output = "Review follows.\n```json\n{\"invalidations\": [{\"issueId\": \"COR-01\", \"reason\": \"fp\"}]}\n```\nDone.";
        let report = StructuredRoundReport::parse(output).unwrap();
        assert_eq!(report.invalidations.len(), 1);
        assert!(StructuredRoundReport::parse("just prose").is_none());
    }

    #[test]
    fn test_structured_extraction() {
        let output = r#"{
            "newIssues": [{"summary": "Missing timeout", "category": "RELIABILITY", "severity": "HIGH", "location": "src/net.rs:9"}],
            "severityChanges": [{"issueId": "sec-01", "direction": "escalate", "reason": "reachable"}],
            "merges": [{"targetId": "SEC-01", "sourceIds": ["SEC-02", "XYZ-99"], "reason": "same sink"}],
            "invalidations": [{"issueId": "COR-01", "reason": "guarded upstream"}]
        }"#;
        let issues = existing();
        let d = StructuredExtractor.extract(&session(), Role::Verifier, output, &issues);

        assert_eq!(d.new_issues.len(), 1);
        assert_eq!(d.new_issues[0].category, IssueCategory::Reliability);
        assert_eq!(d.new_issues[0].raised_by, Role::Verifier);
        assert_eq!(d.severity_changes[0].to, Severity::High);
        assert_eq!(d.merge_requests[0].source_ids, vec!["SEC-02".to_string()]);
        assert!(d
            .transitions
            .iter()
            .any(|t| t.issue_id == "COR-01" && t.record.to_status == IssueStatus::Dismissed));
    }

    #[test]
    fn test_structured_falls_back_to_heuristic() {
        let issues = existing();
        let d = StructuredExtractor.extract(
            &session(),
            Role::Critic,
            "COR-01 is a false positive.",
            &issues,
        );
        assert_eq!(d.invalidated_ids().collect::<Vec<_>>(), vec!["COR-01"]);
    }

    #[test]
    fn test_extractor_for_flag() {
        assert_eq!(
            extractor_for(ExtractionCapability::Heuristic).capability(),
            ExtractionCapability::Heuristic
        );
        assert_eq!(
            extractor_for(ExtractionCapability::Structured).capability(),
            ExtractionCapability::Structured
        );
        assert_eq!(
            "STRUCTURED".parse::<ExtractionCapability>(),
            Ok(ExtractionCapability::Structured)
        );
    }

    #[test]
    fn test_schema_names_fields() {
        let schema = serde_json::to_string(&StructuredRoundReport::json_schema()).unwrap();
        assert!(schema.contains("newIssues"));
        assert!(schema.contains("severityChanges"));
    }
}
