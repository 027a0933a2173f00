//! Category coverage and the incremental mention cache.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::issue::{Issue, IssueCategory};
use crate::session::Round;

/// Which categories have been examined so far.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCoverage {
    pub all_categories_examined: bool,
    pub uncovered_categories: Vec<IssueCategory>,
}

/// Category names seen in round text, fed one round at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MentionCache {
    pub categories: BTreeSet<IssueCategory>,
    /// Highest round number already scanned.
    pub last_round: u32,
}

impl MentionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build by scanning every round once.
    pub fn from_rounds(rounds: &[Round]) -> Self {
        let mut cache = Self::new();
        for round in rounds {
            cache.observe(round);
        }
        cache
    }

    /// Scan one round's text. Rounds at or below `last_round` are skipped.
    pub fn observe(&mut self, round: &Round) -> bool {
        if round.number <= self.last_round {
            return false;
        }
        self.categories.extend(mentioned_categories(&round.output));
        self.last_round = round.number;
        true
    }

    pub fn contains(&self, category: IssueCategory) -> bool {
        self.categories.contains(&category)
    }
}

fn mentioned_categories(text: &str) -> impl Iterator<Item = IssueCategory> + '_ {
    let lower = text.to_lowercase();
    IssueCategory::ALL
        .into_iter()
        .filter(move |c| lower.contains(c.name()))
}

/// A category is examined when it holds an issue, or its name appears in any
/// round's output. With a cache, the cache replaces the text scan.
pub fn calculate_category_coverage(
    category_counts: &BTreeMap<IssueCategory, usize>,
    rounds: &[Round],
    issues: &[Issue],
    mention_cache: Option<&MentionCache>,
) -> CategoryCoverage {
    let mut examined: BTreeSet<IssueCategory> = category_counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(category, _)| *category)
        .collect();
    examined.extend(issues.iter().map(|i| i.category));

    match mention_cache {
        Some(cache) => examined.extend(cache.categories.iter().copied()),
        None => {
            for round in rounds {
                examined.extend(mentioned_categories(&round.output));
            }
        }
    }

    let uncovered_categories: Vec<IssueCategory> = IssueCategory::ALL
        .into_iter()
        .filter(|c| !examined.contains(c))
        .collect();

    CategoryCoverage {
        all_categories_examined: uncovered_categories.is_empty(),
        uncovered_categories,
    }
}
