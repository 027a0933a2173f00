//! Per-tier file selection.

use super::types::{Tier, TieredConfig};

/// A lowercased glob. `*` matches any run of characters, path separators
/// included, so `*auth*` catches `src/auth/login.rs`; `?` matches one
/// non-separator character. Matching ignores case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PathPattern(Vec<char>);

impl PathPattern {
    pub(crate) fn new(pattern: &str) -> Self {
        Self(pattern.trim().to_lowercase().chars().collect())
    }

    pub(crate) fn matches(&self, path: &str) -> bool {
        let text: Vec<char> = path.to_lowercase().chars().collect();
        glob_match(&self.0, &text)
    }
}

/// Iterative match that only ever retries the most recent `*`, so the cost
/// stays at O(pattern * text) however many stars the pattern holds.
fn glob_match(pattern: &[char], text: &[char]) -> bool {
    let (mut pi, mut ti) = (0, 0);
    // Pattern index after the last `*`, and the text index it was tried at.
    let mut star: Option<(usize, usize)> = None;

    while ti < text.len() {
        match pattern.get(pi) {
            Some('*') => {
                star = Some((pi + 1, ti));
                pi += 1;
                continue;
            }
            Some('?') if text[ti] != '/' => {
                pi += 1;
                ti += 1;
                continue;
            }
            Some(&c) if c != '?' && c == text[ti] => {
                pi += 1;
                ti += 1;
                continue;
            }
            _ => {}
        }
        match star {
            Some((after_star, tried)) => {
                pi = after_star;
                ti = tried + 1;
                star = Some((after_star, tried + 1));
            }
            None => return false,
        }
    }

    pattern[pi..].iter().all(|&c| c == '*')
}

/// Compile globs; blank entries are dropped.
pub(crate) fn compile_patterns(patterns: &[String]) -> Vec<PathPattern> {
    patterns
        .iter()
        .filter(|p| !p.trim().is_empty())
        .map(|p| PathPattern::new(p))
        .collect()
}

pub(crate) fn matches_any(patterns: &[PathPattern], path: &str) -> bool {
    patterns.iter().any(|p| p.matches(path))
}

/// Files matching an always-exhaustive pattern, in input order.
pub fn files_requiring_exhaustive(files: &[String], config: &TieredConfig) -> Vec<String> {
    let patterns = compile_patterns(&config.always_exhaustive_patterns);
    files
        .iter()
        .filter(|f| matches_any(&patterns, f))
        .cloned()
        .collect()
}

/// Select the files a round in `tier` looks at.
///
/// A non-empty `escalation_scope` restricts the selection to exactly those
/// files that are also in `files`. Otherwise `screen` takes the first N files
/// that are not always-exhaustive, `focused` the first N, and `exhaustive`
/// all of them.
pub fn get_files_for_tier(
    files: &[String],
    tier: Tier,
    config: &TieredConfig,
    escalation_scope: &[String],
) -> Vec<String> {
    if !escalation_scope.is_empty() {
        return files
            .iter()
            .filter(|f| escalation_scope.contains(f))
            .cloned()
            .collect();
    }

    let limit = config.tier_config(tier).max_files.unwrap_or(usize::MAX);
    match tier {
        Tier::Screen => {
            let patterns = compile_patterns(&config.always_exhaustive_patterns);
            files
                .iter()
                .filter(|f| !matches_any(&patterns, f))
                .take(limit)
                .cloned()
                .collect()
        }
        Tier::Focused => files.iter().take(limit).cloned().collect(),
        Tier::Exhaustive => files.to_vec(),
    }
}
