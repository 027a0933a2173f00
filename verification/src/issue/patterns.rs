//! Compiled patterns and inference helpers for reading round text.
//!
//! Everything here is heuristic. A miss means "nothing found", never an error.

use regex::Regex;
use std::sync::LazyLock;

use super::model::{IssueCategory, Severity};

/// Issue ID reference: three letters, dash, digits, optional split suffix.
pub(crate) static ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([a-z]{3}-\d+(?:-[a-z]{1,2})?)\b").unwrap());

static SENTENCE_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:[.!?;]+(?:\s+|$)|\n+)").unwrap());

static LEVEL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(critical|high|medium|low)\b").unwrap());

pub(crate) static ESCALATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:escalat\w*|upgrad\w*|more\s+severe|under-?(?:rated|estimated|stated)|raise\s+(?:the\s+)?severity|should\s+be\s+(?:raised|elevated|increased|higher))\b",
    )
    .unwrap()
});

pub(crate) static DEMOTE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:downgrad\w*|demot\w*|less\s+severe|over-?(?:rated|estimated|stated)|lower\s+(?:the\s+)?severity|should\s+be\s+(?:lowered|reduced|decreased|lower))\b",
    )
    .unwrap()
});

pub(crate) static MERGE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:duplicates?|duplicated|same\s+(?:issue|problem|finding|root\s+cause)\s+as|overlaps?|merged?|merging|redundant\s+with|consolidat\w*)\b",
    )
    .unwrap()
});

pub(crate) static SPLIT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:split|separated?\s+into|conflat\w*|decompos\w*)\b").unwrap()
});

static SPLIT_PARTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(two|three|four|five|\d+)\s+(?:separate\s+|distinct\s+|different\s+)?(?:issues|findings|problems|parts|concerns)\b",
    )
    .unwrap()
});

pub(crate) static INVALIDATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:invalid|false\s+positive|not\s+valid|not\s+(?:a\s+)?(?:real|valid|genuine)\s+(?:issue|bug|problem|finding|concern)|not\s+an?\s+(?:issue|bug|problem|vulnerability)|should\s+be\s+dismissed|dismiss(?:ed)?|reject(?:ed)?|incorrectly\s+flagged|no\s+longer\s+(?:applies|relevant))\b",
    )
    .unwrap()
});

pub(crate) static VALIDATE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:confirmed|is\s+valid|valid\s+(?:issue|finding|concern)|legitimate|genuine\s+(?:issue|bug|problem)|real\s+(?:issue|bug|problem))\b",
    )
    .unwrap()
});

pub(crate) static DISCOVERY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)\b(?:new\s+issue|missed\s+issue|additional\s+issue|(?:the\s+)?verifier\s+missed|overlooked|not\s+(?:yet\s+)?(?:raised|reported|flagged))\b\s*(?:that\b|[:\-–—])?\s*(.{10,300})",
    )
    .unwrap()
});

/// A negator closing the text before a cue, at most three words back:
/// "is not a false positive", "shouldn't be dismissed", "never confirmed".
static NEGATION_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\b(?:not|never|no|neither|nor|cannot)\b|n['’]t\b)(?:\s+[\w-]+){0,3}\s*$")
        .unwrap()
});

static LOCATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Za-z0-9_./\\-]*[A-Za-z0-9_-]{2,}\.[A-Za-z][A-Za-z0-9]{0,5})(?::(\d+))?")
        .unwrap()
});

static CATEGORY_HINTS: LazyLock<Vec<(IssueCategory, Regex)>> = LazyLock::new(|| {
    vec![
        (
            IssueCategory::Security,
            Regex::new(
                r"(?i)(secur|inject|xss|csrf|auth|password|secret|credential|token|crypt|sanitiz|privilege|vulnerab|exploit)",
            )
            .unwrap(),
        ),
        (
            IssueCategory::Correctness,
            Regex::new(r"(?i)(correct|wrong|logic|off-by-one|bug|mismatch|miscalculat|invariant)")
                .unwrap(),
        ),
        (
            IssueCategory::Reliability,
            Regex::new(
                r"(?i)(reliab|crash|panic|race|deadlock|timeout|retry|leak|unhandled|exception|null|overflow|error handling)",
            )
            .unwrap(),
        ),
        (
            IssueCategory::Performance,
            Regex::new(
                r"(?i)(perform|slow|latency|throughput|allocat|quadratic|o\(n|n\+1|cache|hot path)",
            )
            .unwrap(),
        ),
        (
            IssueCategory::Maintainability,
            Regex::new(
                r"(?i)(maintain|readab|duplicat|complex|naming|refactor|dead code|magic number|coupling)",
            )
            .unwrap(),
        ),
    ]
});

/// An issue ID reference found in a piece of text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct IdMention<'t> {
    pub start: usize,
    pub end: usize,
    pub text: &'t str,
}

/// Whether the cue starting at byte `pos` of `sentence` is negated.
pub(crate) fn is_negated(sentence: &str, pos: usize) -> bool {
    NEGATION_TAIL.is_match(&sentence[..pos])
}

/// Split text into sentence-sized fragments.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    SENTENCE_BREAK
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// All ID references in `text`, in order.
pub(crate) fn find_ids(text: &str) -> Vec<IdMention<'_>> {
    ID_PATTERN
        .find_iter(text)
        .map(|m| IdMention {
            start: m.start(),
            end: m.end(),
            text: m.as_str(),
        })
        .collect()
}

/// The ID closest before `pos`, else the first one after it.
pub(crate) fn nearest_id<'t>(ids: &[IdMention<'t>], pos: usize) -> Option<&'t str> {
    ids.iter()
        .rev()
        .find(|m| m.end <= pos)
        .or_else(|| ids.iter().find(|m| m.start >= pos))
        .map(|m| m.text)
}

/// First explicit level token in `text`.
pub(crate) fn infer_severity(text: &str) -> Option<Severity> {
    LEVEL_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| Severity::parse(m.as_str()))
}

/// Category with the most keyword hits; `Correctness` when nothing matches.
pub(crate) fn infer_category(text: &str) -> IssueCategory {
    let mut best = (IssueCategory::Correctness, 0usize);
    for (category, pattern) in CATEGORY_HINTS.iter() {
        let hits = pattern.find_iter(text).count();
        if hits > best.1 {
            best = (*category, hits);
        }
    }
    best.0
}

/// First `path.ext[:line]` token in `text`.
pub(crate) fn infer_location(text: &str) -> Option<String> {
    LOCATION_PATTERN.captures(text).map(|c| match c.get(2) {
        Some(line) => format!("{}:{}", &c[1], line.as_str()),
        None => c[1].to_string(),
    })
}

/// Number of parts a split mention asks for, if stated.
pub(crate) fn split_parts(text: &str) -> Option<u32> {
    let token = SPLIT_PARTS.captures(text)?.get(1)?.as_str().to_ascii_lowercase();
    match token.as_str() {
        "two" => Some(2),
        "three" => Some(3),
        "four" => Some(4),
        "five" => Some(5),
        n => n.parse().ok(),
    }
}

/// Deterministic ID for an auto-discovered issue.
///
/// Hash of the category prefix and the whitespace-normalized, lowercased
/// snippet. Paraphrases of one finding get different IDs, and unrelated
/// snippets can collide; callers treat the ID as a dedup key only.
pub(crate) fn synthesize_issue_id(category: IssueCategory, snippet: &str) -> String {
    let normalized = snippet
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let hash = blake3::hash(format!("{}:{}", category.code(), normalized).as_bytes());
    let bytes = hash.as_bytes();
    let n = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) % 10_000;
    format!("{}-{:04}", category.code(), n)
}

/// The full line of `text` containing byte offset `pos`.
pub(crate) fn line_around(text: &str, pos: usize) -> &str {
    let start = text[..pos].rfind('\n').map_or(0, |i| i + 1);
    let end = text[pos..].find('\n').map_or(text.len(), |i| pos + i);
    &text[start..end]
}

/// Truncate to at most `max` chars on a char boundary.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
