//! Convergence gate — multi-criteria stop/continue decision.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::aggregate::{aggregate_issues, IssueAggregation};
use super::coverage::{calculate_category_coverage, CategoryCoverage, MentionCache};
use super::signals::{
    detect_edge_case_coverage, detect_high_risk_coverage, detect_negative_assertions,
    CoverageConfig,
};
use crate::session::{Round, Session, VerificationMode};

/// Coarse tag for how a session converged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConvergenceType {
    NotConverged,
    Standard,
    FastTrack,
    SinglePass,
}

impl From<VerificationMode> for ConvergenceType {
    fn from(mode: VerificationMode) -> Self {
        match mode {
            VerificationMode::Standard => Self::Standard,
            VerificationMode::FastTrack => Self::FastTrack,
            VerificationMode::SinglePass => Self::SinglePass,
        }
    }
}

/// The boolean coverage inputs to the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CoverageSignals {
    pub all_categories_examined: bool,
    pub has_edge_case_coverage: bool,
    pub has_negative_asserts: bool,
    pub has_high_risk_coverage: bool,
}

impl CoverageSignals {
    /// All four signals set.
    pub fn satisfied() -> Self {
        Self {
            all_categories_examined: true,
            has_edge_case_coverage: true,
            has_negative_asserts: true,
            has_high_risk_coverage: true,
        }
    }
}

/// One unmet gate criterion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConvergenceBlocker {
    CriticalUnresolved { count: usize },
    HighUnresolved { count: usize },
    CategoriesNotExamined,
    MissingEdgeCaseCoverage,
    MissingNegativeAssertions,
    MissingHighRiskCoverage,
    InsufficientRounds { current: u32, required: u32 },
    UnstableRounds { stable: u32, required: u32 },
}

impl std::fmt::Display for ConvergenceBlocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CriticalUnresolved { count } => {
                write!(f, "{} critical issue(s) unresolved", count)
            }
            Self::HighUnresolved { count } => write!(f, "{} high issue(s) unresolved", count),
            Self::CategoriesNotExamined => write!(f, "not all categories examined"),
            Self::MissingEdgeCaseCoverage => write!(f, "no edge-case coverage"),
            Self::MissingNegativeAssertions => write!(f, "no negative assertions"),
            Self::MissingHighRiskCoverage => write!(f, "high-risk files not covered"),
            Self::InsufficientRounds { current, required } => {
                write!(f, "round {} of minimum {}", current, required)
            }
            Self::UnstableRounds { stable, required } => {
                write!(f, "{} stable round(s), {} required", stable, required)
            }
        }
    }
}

/// Gate output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceDecision {
    pub is_converged: bool,
    pub convergence_type: ConvergenceType,
    pub reason: String,
    pub blockers: Vec<ConvergenceBlocker>,
}

/// Apply the gate. Any critical or high unresolved issue blocks regardless of
/// every other input.
pub fn evaluate_convergence(
    session: &Session,
    aggregation: &IssueAggregation,
    rounds_without_new_issues: u32,
    signals: CoverageSignals,
) -> ConvergenceDecision {
    let policy = session.verification_mode.round_policy();
    let mut blockers = Vec::new();

    if aggregation.critical_unresolved > 0 {
        blockers.push(ConvergenceBlocker::CriticalUnresolved {
            count: aggregation.critical_unresolved,
        });
    }
    if aggregation.high_unresolved > 0 {
        blockers.push(ConvergenceBlocker::HighUnresolved {
            count: aggregation.high_unresolved,
        });
    }
    if !signals.all_categories_examined {
        blockers.push(ConvergenceBlocker::CategoriesNotExamined);
    }
    if !signals.has_edge_case_coverage {
        blockers.push(ConvergenceBlocker::MissingEdgeCaseCoverage);
    }
    if !signals.has_negative_asserts {
        blockers.push(ConvergenceBlocker::MissingNegativeAssertions);
    }
    if !signals.has_high_risk_coverage {
        blockers.push(ConvergenceBlocker::MissingHighRiskCoverage);
    }
    if session.current_round < policy.min_rounds {
        blockers.push(ConvergenceBlocker::InsufficientRounds {
            current: session.current_round,
            required: policy.min_rounds,
        });
    }
    if rounds_without_new_issues < policy.stable_rounds_required {
        blockers.push(ConvergenceBlocker::UnstableRounds {
            stable: rounds_without_new_issues,
            required: policy.stable_rounds_required,
        });
    }

    let mode = session.verification_mode.mode;
    if blockers.is_empty() {
        let reason = format!(
            "converged ({}) at round {}: no critical or high issues open, all coverage criteria met, {} stable round(s)",
            mode, session.current_round, rounds_without_new_issues
        );
        info!(session_id = %session.id, round = session.current_round, %mode, "Session converged");
        ConvergenceDecision {
            is_converged: true,
            convergence_type: mode.into(),
            reason,
            blockers,
        }
    } else {
        let reason = blockers
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        debug!(session_id = %session.id, round = session.current_round, %reason, "Not converged");
        ConvergenceDecision {
            is_converged: false,
            convergence_type: ConvergenceType::NotConverged,
            reason,
            blockers,
        }
    }
}

/// Trailing streak of rounds that raised no issue, scanning back from the
/// most recent round.
pub fn count_rounds_without_new_issues(rounds: &[Round]) -> u32 {
    rounds
        .iter()
        .rev()
        .take_while(|r| r.issues_raised.is_empty())
        .count() as u32
}

/// Everything [`check_convergence`] computed on the way to its decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    pub decision: ConvergenceDecision,
    pub aggregation: IssueAggregation,
    pub coverage: CategoryCoverage,
    pub signals: CoverageSignals,
    pub rounds_without_new_issues: u32,
}

/// Aggregate, derive coverage signals from the session's rounds and files,
/// and apply the gate.
pub fn check_convergence(
    session: &Session,
    mention_cache: Option<&MentionCache>,
    config: &CoverageConfig,
) -> ConvergenceReport {
    let issues = session.issues.issues();
    let rounds = session.rounds();
    let aggregation = aggregate_issues(issues, session.current_round);
    let coverage =
        calculate_category_coverage(&aggregation.by_category, rounds, issues, mention_cache);
    let signals = CoverageSignals {
        all_categories_examined: coverage.all_categories_examined,
        has_edge_case_coverage: detect_edge_case_coverage(rounds, config.min_edge_case_mentions),
        has_negative_asserts: detect_negative_assertions(rounds),
        has_high_risk_coverage: detect_high_risk_coverage(
            &session.files,
            rounds,
            &config.high_risk_patterns,
        ),
    };
    let rounds_without_new_issues = count_rounds_without_new_issues(rounds);
    let decision = evaluate_convergence(session, &aggregation, rounds_without_new_issues, signals);

    ConvergenceReport {
        decision,
        aggregation,
        coverage,
        signals,
        rounds_without_new_issues,
    }
}
