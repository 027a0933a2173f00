//! Convergence Evaluator — decides whether a session can stop
//!
//! The current issue set and round history are reduced to counts and four
//! coverage signals, then a gate requires all of:
//!
//! - no critical or high issue left open (hard floor)
//! - every category examined
//! - edge-case coverage, negative assertions, high-risk file coverage
//! - the mode's minimum round and stable-round thresholds
//!
//! All functions are pure and total.

pub mod aggregate;
pub mod coverage;
pub mod gate;
pub mod signals;

pub use aggregate::{aggregate_issues, IssueAggregation};
pub use coverage::{calculate_category_coverage, CategoryCoverage, MentionCache};
pub use gate::{
    check_convergence, count_rounds_without_new_issues, evaluate_convergence, ConvergenceBlocker,
    ConvergenceDecision, ConvergenceReport, ConvergenceType, CoverageSignals,
};
pub use signals::{
    detect_edge_case_coverage, detect_high_risk_coverage, detect_negative_assertions,
    CoverageConfig,
};
