//! Verification Engine Library
//!
//! Core of multi-round adversarial code verification. A Verifier raises
//! issues, a Critic challenges them, and this library turns their free-form
//! round outputs into an auditable issue history and decides when to stop.
//!
//! # Components
//!
//! ## Issue Lifecycle Engine ([`issue`])
//! - Detects discovery, severity change, merge, split, validation and
//!   invalidation requests in round text
//! - Applies them as recorded transitions; terminal issues are never reopened
//! - Heuristic (regex) or structured (JSON report) extraction, chosen by config
//!
//! ## Convergence Evaluator ([`convergence`])
//! - Aggregates the issue set and coverage signals from round history
//! - Multi-criteria gate with per-mode round-stability policy
//!
//! ## Tiered Escalation Scheduler ([`tiering`])
//! - `screen` → `focused` → `exhaustive`, forward only
//! - Rule-driven escalation with soft or hard token budgets
//! - Per-tier file and prompt selection
//!
//! # Usage
//!
//! ```bash
//! # Push one round through a stored session
//! verification-engine submit --session session.json --role critic --output round3.txt --write
//!
//! # Convergence decision for a session
//! verification-engine converge --session session.json
//!
//! # Files a tier would look at
//! verification-engine files --tier screen --files src/auth.rs,src/db.rs
//! ```

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod convergence;
pub mod engine;
pub mod issue;
pub mod session;
pub mod store;
pub mod tiering;

pub use config::{ConfigError, EngineConfig};
pub use convergence::{
    aggregate_issues, calculate_category_coverage, check_convergence,
    count_rounds_without_new_issues, evaluate_convergence, ConvergenceDecision, ConvergenceReport,
    ConvergenceType, CoverageConfig, CoverageSignals, IssueAggregation, MentionCache,
};
pub use engine::{
    EngineError, EngineResult, RoundOutcome, RoundPlan, RoundSubmission, VerificationEngine,
};
pub use issue::{
    detect_issue_transitions, ExtractionCapability, Issue, IssueCategory, IssueDraft, IssueLedger,
    IssueStatus, Severity, TransitionDetection, TransitionRecord, TransitionType,
};
pub use session::{
    Role, Round, RoundPolicy, Session, SessionError, SessionStatus, VerificationMode,
    VerificationModeConfig,
};
pub use store::{InMemoryStore, JsonFileStore, SessionStore, SharedStore, StoreError, StoreResult};
pub use tiering::{
    get_files_for_tier, PipelineState, SchedulerError, Tier, TierScheduler, TieredConfig,
};
