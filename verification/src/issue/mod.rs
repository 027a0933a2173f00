//! Issue Lifecycle Engine — structured findings from free-form round text
//!
//! Round outputs from the Verifier and Critic are scanned for lifecycle
//! requests against the current issue set. Everything here is a pure data
//! transformation: nothing performs I/O and nothing can fail.
//!
//! # Lifecycle
//!
//! ```text
//! RAISED ──validate──▶ UNRESOLVED ──resolve──▶ RESOLVED
//!    │                     │
//!    ├──invalidate─────────┴──────────▶ DISMISSED   (terminal)
//!    ├──merge into another ───────────▶ MERGED      (terminal)
//!    └──split into children ──────────▶ SPLIT       (terminal)
//! ```
//!
//! Severity moves (`ESCALATED` / `DEMOTED`) leave status unchanged.

pub mod detect;
pub mod extractor;
pub mod ledger;
pub mod lifecycle;
pub mod model;
mod patterns;

pub use detect::{
    detect_issue_transitions, DetectedTransition, MergeRequest, SeverityChange, SplitRequest,
    TransitionDetection,
};
pub use extractor::{
    extractor_for, ExtractionCapability, HeuristicExtractor, StructuredExtractor,
    StructuredRoundReport, TransitionExtractor,
};
pub use ledger::{IssueLedger, LedgerUpdate};
pub use lifecycle::{
    apply_transition, change_severity, invalidate_issue, merge_issues, refine_issue,
    resolve_issue, split_issue, validate_issue, IssueDraft, MergeOutcome, SplitOutcome,
};
pub use model::{Issue, IssueCategory, IssueStatus, Severity, TransitionRecord, TransitionType};
