//! Coverage signals derived from round text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::session::Round;
use crate::tiering::files::{compile_patterns, matches_any};

static EDGE_CASE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:edge[\s-]cases?|corner[\s-]cases?|boundary|boundaries|off-by-one|empty\s+(?:input|string|list|array|collection)|null|none|zero|negative\s+(?:values?|numbers?)|overflow|underflow|max(?:imum)?\s+(?:length|size|value)|unicode|concurrent\s+access)\b",
    )
    .unwrap()
});

static NEGATIVE_ASSERTION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:no\s+(?:further\s+|additional\s+|other\s+)?(?:issues?|vulnerabilit(?:y|ies)|problems?|bugs?|findings?)\s+(?:were\s+|was\s+)?(?:found|detected|identified|remain)|(?:is|are)\s+not\s+(?:vulnerable|exploitable|reachable|affected)|does\s+not\s+(?:leak|panic|overflow|allow|permit|expose)|cannot\s+be\s+(?:exploited|triggered|bypassed|reached)|ruled\s+out|verified\s+(?:safe|absent)|correctly\s+(?:rejects|handles|validates|sanitizes|escapes))",
    )
    .unwrap()
});

/// Tunables for the text-derived coverage signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageConfig {
    /// Globs naming files that must be discussed before convergence.
    pub high_risk_patterns: Vec<String>,
    /// Edge-case mentions needed across all rounds.
    pub min_edge_case_mentions: usize,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            high_risk_patterns: [
                "*auth*",
                "*security*",
                "*payment*",
                "*crypto*",
                "*secret*",
                "*password*",
                "*credential*",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            min_edge_case_mentions: 1,
        }
    }
}

/// Enough edge-case language across the rounds.
pub fn detect_edge_case_coverage(rounds: &[Round], min_mentions: usize) -> bool {
    let mentions: usize = rounds
        .iter()
        .map(|r| EDGE_CASE_PATTERN.find_iter(&r.output).count())
        .sum();
    mentions >= min_mentions.max(1)
}

/// Some round states what was checked and found absent.
pub fn detect_negative_assertions(rounds: &[Round]) -> bool {
    rounds
        .iter()
        .any(|r| NEGATIVE_ASSERTION_PATTERN.is_match(&r.output))
}

/// Every high-risk file is named in at least one round. Vacuously true when
/// no file matches a high-risk pattern.
pub fn detect_high_risk_coverage(files: &[String], rounds: &[Round], patterns: &[String]) -> bool {
    let compiled = compile_patterns(patterns);
    let texts: Vec<String> = rounds.iter().map(|r| r.output.to_lowercase()).collect();
    files
        .iter()
        .filter(|f| matches_any(&compiled, f))
        .all(|file| {
            let path = file.to_lowercase();
            let name = path.rsplit(['/', '\\']).next().unwrap_or(path.as_str()).to_string();
            texts.iter().any(|t| t.contains(&path) || t.contains(&name))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Role;

    fn rounds(texts: &[&str]) -> Vec<Round> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Round::new(i as u32 + 1, Role::Verifier, *t))
            .collect()
    }

    #[test]
    fn test_edge_cases() {
        assert!(detect_edge_case_coverage(
            &rounds(&["Checked the empty input and overflow paths."]),
            2
        ));
        assert!(!detect_edge_case_coverage(&rounds(&["Looks fine."]), 1));
        assert!(!detect_edge_case_coverage(&rounds(&["One boundary check."]), 2));
    }

    #[test]
    fn test_negative_assertions() {
        assert!(detect_negative_assertions(&rounds(&[
            "The parser does not panic on truncated frames."
        ])));
        assert!(detect_negative_assertions(&rounds(&["No further issues were found."])));
        assert!(!detect_negative_assertions(&rounds(&["SEC-01 is real."])));
    }

    #[test]
    fn test_high_risk_coverage() {
        let patterns = CoverageConfig::default().high_risk_patterns;
        let files = vec!["src/auth/login.rs".to_string(), "src/util.rs".to_string()];
        assert!(!detect_high_risk_coverage(&files, &rounds(&["util.rs is fine"]), &patterns));
        assert!(detect_high_risk_coverage(
            &files,
            &rounds(&["Reviewed login.rs in full"]),
            &patterns
        ));
        assert!(detect_high_risk_coverage(&["src/util.rs".to_string()], &[], &patterns));
    }
}
