//! Tiered Escalation Scheduler — how much verification effort to spend
//!
//! ```text
//! screen      cheap, wide, shallow: SEC + COR, HIGH and above, 10 files
//!    │         always-exhaustive files (auth, payment, ...) skip this tier
//!    ├─ ≥3 issues found ──────────▶ focused
//!    ├─ ≥1 critical found ────────▶ exhaustive (affected files only)
//!    ▼
//! focused     SEC + COR + REL, MEDIUM and above, 25 files
//!    │
//!    ▼
//! exhaustive  every category, every file
//! ```
//!
//! Tiers only move forward. An exceeded token budget is recorded as a
//! warning and only blocks escalation when the budget is enforced and
//! quality-first is off.

pub mod files;
pub mod scheduler;
pub mod types;

pub use files::{files_requiring_exhaustive, get_files_for_tier};
pub use scheduler::{SchedulerError, SchedulerResult, TierScheduler};
pub use types::{
    EscalationCondition, EscalationReason, EscalationRecord, EscalationRule, EscalationScope,
    PipelineState, Tier, TierCompletion, TierConfig, TierPrompt, TierResult, TieredConfig,
};
