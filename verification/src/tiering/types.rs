//! Tier policy, escalation rules and per-session pipeline state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::issue::{IssueCategory, Severity};
use crate::session::Role;

/// Verification effort levels, strictly ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Cheap, wide, shallow pass.
    #[default]
    Screen,
    /// Narrower pass over more categories.
    Focused,
    /// Everything, every file.
    Exhaustive,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Self::Screen, Self::Focused, Self::Exhaustive];

    /// The next tier up, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Screen => Some(Self::Focused),
            Self::Focused => Some(Self::Exhaustive),
            Self::Exhaustive => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Exhaustive
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Screen => write!(f, "screen"),
            Self::Focused => write!(f, "focused"),
            Self::Exhaustive => write!(f, "exhaustive"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "screen" => Ok(Self::Screen),
            "focused" => Ok(Self::Focused),
            "exhaustive" => Ok(Self::Exhaustive),
            other => Err(format!("unknown tier: {}", other)),
        }
    }
}

/// Static policy for one tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    pub tier: Tier,
    /// Categories the round is asked to examine.
    pub categories: Vec<IssueCategory>,
    /// Findings below this level are out of scope for the tier.
    pub min_severity: Severity,
    /// Fraction of the full token budget a round in this tier may spend.
    pub budget_multiplier: f64,
    /// File cap per round; `None` means no cap.
    #[serde(default)]
    pub max_files: Option<usize>,
    pub verifier_template: String,
    pub critic_template: String,
    pub verifier_word_limit: u32,
    pub critic_word_limit: u32,
}

impl TierConfig {
    /// Built-in policy for a tier.
    pub fn default_for(tier: Tier) -> Self {
        match tier {
            Tier::Screen => Self {
                tier,
                categories: vec![IssueCategory::Security, IssueCategory::Correctness],
                min_severity: Severity::High,
                budget_multiplier: 0.3,
                max_files: Some(10),
                verifier_template: "screen-verifier".to_string(),
                critic_template: "screen-critic".to_string(),
                verifier_word_limit: 400,
                critic_word_limit: 250,
            },
            Tier::Focused => Self {
                tier,
                categories: vec![
                    IssueCategory::Security,
                    IssueCategory::Correctness,
                    IssueCategory::Reliability,
                ],
                min_severity: Severity::Medium,
                budget_multiplier: 0.6,
                max_files: Some(25),
                verifier_template: "focused-verifier".to_string(),
                critic_template: "focused-critic".to_string(),
                verifier_word_limit: 800,
                critic_word_limit: 500,
            },
            Tier::Exhaustive => Self {
                tier,
                categories: IssueCategory::ALL.to_vec(),
                min_severity: Severity::Low,
                budget_multiplier: 1.0,
                max_files: None,
                verifier_template: "exhaustive-verifier".to_string(),
                critic_template: "exhaustive-critic".to_string(),
                verifier_word_limit: 1500,
                critic_word_limit: 1000,
            },
        }
    }

    pub fn template_for(&self, role: Role) -> &str {
        match role {
            Role::Verifier => &self.verifier_template,
            Role::Critic => &self.critic_template,
        }
    }

    pub fn word_limit_for(&self, role: Role) -> u32 {
        match role {
            Role::Verifier => self.verifier_word_limit,
            Role::Critic => self.critic_word_limit,
        }
    }
}

/// What an escalation rule tests after a tier completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationCondition {
    /// Critical issues ≥ threshold.
    CriticalFound,
    /// Issues ≥ threshold.
    IssuesFound,
    /// Reserved; never fires.
    HighRiskFile,
    /// Always fires.
    Manual,
}

impl std::fmt::Display for EscalationCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CriticalFound => write!(f, "critical_found"),
            Self::IssuesFound => write!(f, "issues_found"),
            Self::HighRiskFile => write!(f, "high_risk_file"),
            Self::Manual => write!(f, "manual"),
        }
    }
}

/// Which files the escalated tier looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationScope {
    /// The tier's normal file selection.
    #[default]
    All,
    /// Only files carrying the triggering issues.
    Affected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRule {
    pub condition: EscalationCondition,
    #[serde(default)]
    pub threshold: usize,
    pub target_tier: Tier,
    #[serde(default)]
    pub scope: EscalationScope,
}

impl EscalationRule {
    pub fn new(
        condition: EscalationCondition,
        threshold: usize,
        target_tier: Tier,
        scope: EscalationScope,
    ) -> Self {
        Self {
            condition,
            threshold,
            target_tier,
            scope,
        }
    }

    /// Critical finding jumps straight to exhaustive on the affected files;
    /// a pile of findings moves to focused.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(
                EscalationCondition::CriticalFound,
                1,
                Tier::Exhaustive,
                EscalationScope::Affected,
            ),
            Self::new(EscalationCondition::IssuesFound, 3, Tier::Focused, EscalationScope::All),
        ]
    }
}

/// Tiered execution policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TieredConfig {
    pub enabled: bool,
    pub start_tier: Tier,
    pub auto_escalate: bool,
    /// Evaluated in order; first match wins.
    pub escalation_rules: Vec<EscalationRule>,
    /// Per-tier overrides. Tiers not listed use [`TierConfig::default_for`].
    pub tiers: Vec<TierConfig>,
    pub max_total_tokens: Option<u64>,
    pub enforce_token_budget: bool,
    /// When set, an exceeded budget never suppresses escalation.
    pub quality_first: bool,
    /// Globs for files that skip the screen tier.
    pub always_exhaustive_patterns: Vec<String>,
}

impl Default for TieredConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_tier: Tier::Screen,
            auto_escalate: true,
            escalation_rules: EscalationRule::defaults(),
            tiers: Tier::ALL.into_iter().map(TierConfig::default_for).collect(),
            max_total_tokens: None,
            enforce_token_budget: false,
            quality_first: true,
            always_exhaustive_patterns: [
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
        }
    }
}

impl TieredConfig {
    pub fn tier_config(&self, tier: Tier) -> TierConfig {
        self.tiers
            .iter()
            .find(|t| t.tier == tier)
            .cloned()
            .unwrap_or_else(|| TierConfig::default_for(tier))
    }

    /// Whether an exceeded budget blocks escalation.
    pub fn budget_blocks_escalation(&self) -> bool {
        self.enforce_token_budget && !self.quality_first
    }
}

/// Outcome of one completed tier, as reported by the round driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierResult {
    pub tier: Tier,
    pub tokens_used: u64,
    pub time_ms: u64,
    #[serde(default)]
    pub files_examined: Vec<String>,
    /// Filled in by the scheduler from the issue set.
    #[serde(default)]
    pub issues_found: usize,
    #[serde(default)]
    pub critical_found: usize,
    pub completed_at: DateTime<Utc>,
}

impl TierResult {
    pub fn new(tier: Tier, tokens_used: u64, time_ms: u64) -> Self {
        Self {
            tier,
            tokens_used,
            time_ms,
            files_examined: Vec::new(),
            issues_found: 0,
            critical_found: 0,
            completed_at: Utc::now(),
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files_examined = files;
        self
    }
}

/// Why a tier moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    /// An escalation rule matched after a tier completed.
    Rule {
        condition: EscalationCondition,
        count: usize,
        threshold: usize,
    },
    /// Operator-requested jump.
    Manual { reason: String },
}

impl std::fmt::Display for EscalationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rule {
                condition,
                count,
                threshold,
            } => write!(f, "{}: {} (threshold: {})", condition, count, threshold),
            Self::Manual { reason } => write!(f, "manual: {}", reason),
        }
    }
}

/// Record of a tier move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRecord {
    pub from_tier: Tier,
    pub to_tier: Tier,
    pub reason: EscalationReason,
    /// Files the next tier is restricted to; empty means unrestricted.
    #[serde(default)]
    pub scope: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

/// Tier-scheduling state for one session. The tier never regresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineState {
    pub session_id: String,
    pub current_tier: Tier,
    pub completed_tiers: Vec<Tier>,
    pub tier_results: Vec<TierResult>,
    pub total_tokens_used: u64,
    pub total_time_ms: u64,
    pub escalations: Vec<EscalationRecord>,
    #[serde(default)]
    pub budget_exceeded: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Scope carried from the last escalation into the next round.
    #[serde(default)]
    pub pending_scope: Vec<String>,
    pub started_at: DateTime<Utc>,
}

impl PipelineState {
    pub fn new(session_id: impl Into<String>, start_tier: Tier) -> Self {
        Self {
            session_id: session_id.into(),
            current_tier: start_tier,
            completed_tiers: Vec::new(),
            tier_results: Vec::new(),
            total_tokens_used: 0,
            total_time_ms: 0,
            escalations: Vec::new(),
            budget_exceeded: false,
            warnings: Vec::new(),
            pending_scope: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Token utilization against `max`, or `None` without a budget.
    pub fn utilization(&self, max_total_tokens: Option<u64>) -> Option<f64> {
        match max_total_tokens {
            Some(max) if max > 0 => Some(self.total_tokens_used as f64 / max as f64),
            _ => None,
        }
    }
}

/// Prompt selection for the next round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPrompt {
    pub tier: Tier,
    pub role: Role,
    pub template: String,
    pub word_limit: u32,
    pub categories: Vec<IssueCategory>,
    pub min_severity: Severity,
    pub budget_multiplier: f64,
}

/// What [`TierScheduler::complete_tier`](super::TierScheduler::complete_tier) decided.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCompletion {
    pub completed_tier: Tier,
    pub next_tier: Tier,
    pub escalation: Option<EscalationRecord>,
    /// Target of a matched rule that the budget blocked.
    pub suppressed_escalation: Option<Tier>,
    pub budget_exceeded: bool,
    /// Warnings raised by this completion only.
    pub warnings: Vec<String>,
}

impl TierCompletion {
    pub fn escalated(&self) -> bool {
        self.escalation.is_some()
    }
}
