//! Tier Scheduler — forward-only tier state machine with budget accounting
//!
//! Consumes tier results and the current issue set to decide whether the next
//! round escalates. Pipeline state lives in an injected [`SessionStore`].

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::files::get_files_for_tier;
use super::types::{
    EscalationCondition, EscalationReason, EscalationRecord, EscalationRule, EscalationScope,
    PipelineState, Tier, TierCompletion, TierPrompt, TierResult, TieredConfig,
};
use crate::issue::{Issue, Severity};
use crate::session::Role;
use crate::store::{InMemoryStore, SessionStore, SharedStore, StoreError};

/// Utilization at which a budget warning is recorded.
const BUDGET_WARNING_RATIO: f64 = 0.8;

/// Errors from scheduler operations
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("no pipeline for session {0}")]
    UnknownSession(String),

    #[error("cannot move from {from} to {to}: tiers only move forward")]
    NotForward { from: Tier, to: Tier },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// A matched rule, before budget policy is applied.
struct RuleMatch {
    target: Tier,
    reason: EscalationReason,
    scope: Vec<String>,
}

/// The tier scheduler.
pub struct TierScheduler {
    config: TieredConfig,
    store: SharedStore<PipelineState>,
}

impl TierScheduler {
    /// Scheduler with an in-memory store.
    pub fn new(config: TieredConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryStore::<PipelineState>::new()))
    }

    pub fn with_store(config: TieredConfig, store: SharedStore<PipelineState>) -> Self {
        Self { config, store }
    }

    pub fn config(&self) -> &TieredConfig {
        &self.config
    }

    /// Start a pipeline at the configured start tier. Replaces any existing state.
    pub fn initialize_pipeline(&self, session_id: &str) -> SchedulerResult<PipelineState> {
        let state = PipelineState::new(session_id, self.config.start_tier);
        self.store.save(session_id, &state)?;
        info!(session_id, tier = %state.current_tier, "Pipeline initialized");
        Ok(state)
    }

    pub fn pipeline_state(&self, session_id: &str) -> SchedulerResult<PipelineState> {
        self.store
            .load(session_id)?
            .ok_or_else(|| SchedulerError::UnknownSession(session_id.to_string()))
    }

    /// Prompt selection for `role` in the current tier.
    pub fn current_tier_prompt(&self, session_id: &str, role: Role) -> SchedulerResult<TierPrompt> {
        let state = self.pipeline_state(session_id)?;
        let tier = self.config.tier_config(state.current_tier);
        Ok(TierPrompt {
            tier: state.current_tier,
            role,
            template: tier.template_for(role).to_string(),
            word_limit: tier.word_limit_for(role),
            categories: tier.categories.clone(),
            min_severity: tier.min_severity,
            budget_multiplier: tier.budget_multiplier,
        })
    }

    /// Files for the next round: the pending escalation scope if any, else
    /// the current tier's selection.
    pub fn files_for_next_round(
        &self,
        session_id: &str,
        files: &[String],
    ) -> SchedulerResult<Vec<String>> {
        let state = self.pipeline_state(session_id)?;
        Ok(get_files_for_tier(
            files,
            state.current_tier,
            &self.config,
            &state.pending_scope,
        ))
    }

    /// Record a completed tier and decide on escalation.
    pub fn complete_tier(
        &self,
        session_id: &str,
        mut result: TierResult,
        issues: &[Issue],
    ) -> SchedulerResult<TierCompletion> {
        let mut state = self.pipeline_state(session_id)?;
        let completed = state.current_tier;

        let found: Vec<&Issue> = issues.iter().filter(|i| !i.is_terminal()).collect();
        let critical: Vec<&Issue> = found
            .iter()
            .copied()
            .filter(|i| i.severity() == Severity::Critical)
            .collect();
        result.tier = completed;
        result.issues_found = found.len();
        result.critical_found = critical.len();

        state.total_tokens_used += result.tokens_used;
        state.total_time_ms += result.time_ms;
        if !state.completed_tiers.contains(&completed) {
            state.completed_tiers.push(completed);
        }
        state.tier_results.push(result);
        state.pending_scope.clear();

        let mut warnings = Vec::new();
        let mut blocked = false;
        if let (Some(utilization), Some(max)) = (
            state.utilization(self.config.max_total_tokens),
            self.config.max_total_tokens,
        ) {
            let pct = utilization * 100.0;
            if utilization >= 1.0 {
                state.budget_exceeded = true;
                if self.config.budget_blocks_escalation() {
                    blocked = true;
                    warnings.push(format!(
                        "token budget exceeded ({}/{} tokens, {:.0}%): escalation suppressed",
                        state.total_tokens_used, max, pct
                    ));
                } else {
                    warnings.push(format!(
                        "token budget exceeded ({}/{} tokens, {:.0}%): continuing, quality first",
                        state.total_tokens_used, max, pct
                    ));
                }
            } else if utilization >= BUDGET_WARNING_RATIO {
                warnings.push(format!(
                    "token budget at {:.0}% ({}/{} tokens)",
                    pct, state.total_tokens_used, max
                ));
            }
        }
        for w in &warnings {
            warn!(session_id, tier = %completed, "{}", w);
        }

        let matched = if self.config.auto_escalate && !completed.is_terminal() {
            self.config
                .escalation_rules
                .iter()
                .find_map(|rule| evaluate_rule(rule, completed, found.len(), &critical, &found))
        } else {
            None
        };

        let mut escalation = None;
        let mut suppressed_escalation = None;
        match matched {
            Some(m) if blocked => {
                info!(
                    session_id,
                    from = %completed,
                    to = %m.target,
                    "Escalation suppressed by token budget"
                );
                suppressed_escalation = Some(m.target);
            }
            Some(m) => {
                let record = EscalationRecord {
                    from_tier: completed,
                    to_tier: m.target,
                    reason: m.reason,
                    scope: m.scope,
                    timestamp: Utc::now(),
                };
                info!(
                    session_id,
                    from = %record.from_tier,
                    to = %record.to_tier,
                    reason = %record.reason,
                    scoped_files = record.scope.len(),
                    "Tier escalated"
                );
                state.current_tier = record.to_tier;
                state.pending_scope = record.scope.clone();
                state.escalations.push(record.clone());
                escalation = Some(record);
            }
            None => debug!(session_id, tier = %completed, "No escalation rule matched"),
        }

        state.warnings.extend(warnings.iter().cloned());
        self.store.save(session_id, &state)?;

        Ok(TierCompletion {
            completed_tier: completed,
            next_tier: state.current_tier,
            escalation,
            suppressed_escalation,
            budget_exceeded: state.budget_exceeded,
            warnings,
        })
    }

    /// Manual forward-only jump to `target`.
    pub fn escalate_tier(
        &self,
        session_id: &str,
        target: Tier,
        reason: &str,
        scope: Vec<String>,
    ) -> SchedulerResult<PipelineState> {
        let mut state = self.pipeline_state(session_id)?;
        if target <= state.current_tier {
            return Err(SchedulerError::NotForward {
                from: state.current_tier,
                to: target,
            });
        }
        let record = EscalationRecord {
            from_tier: state.current_tier,
            to_tier: target,
            reason: EscalationReason::Manual {
                reason: reason.to_string(),
            },
            scope,
            timestamp: Utc::now(),
        };
        info!(session_id, from = %record.from_tier, to = %target, reason, "Manual tier escalation");
        state.current_tier = target;
        state.pending_scope = record.scope.clone();
        state.escalations.push(record);
        self.store.save(session_id, &state)?;
        Ok(state)
    }

    /// Drop a session's pipeline. Returns whether one existed.
    pub fn remove_pipeline(&self, session_id: &str) -> SchedulerResult<bool> {
        Ok(self.store.remove(session_id)?)
    }
}

fn evaluate_rule(
    rule: &EscalationRule,
    current: Tier,
    issue_count: usize,
    critical: &[&Issue],
    found: &[&Issue],
) -> Option<RuleMatch> {
    if rule.target_tier <= current {
        return None;
    }
    let (count, triggering) = match rule.condition {
        EscalationCondition::CriticalFound => (critical.len(), critical),
        EscalationCondition::IssuesFound => (issue_count, found),
        EscalationCondition::HighRiskFile => return None,
        EscalationCondition::Manual => (0, found),
    };
    if rule.condition != EscalationCondition::Manual && count < rule.threshold.max(1) {
        return None;
    }
    let scope = match rule.scope {
        EscalationScope::All => Vec::new(),
        EscalationScope::Affected => affected_files(triggering),
    };
    Some(RuleMatch {
        target: rule.target_tier,
        reason: EscalationReason::Rule {
            condition: rule.condition,
            count,
            threshold: rule.threshold,
        },
        scope,
    })
}

/// Distinct files carrying `issues`, in issue order.
fn affected_files(issues: &[&Issue]) -> Vec<String> {
    let mut files: Vec<String> = Vec::new();
    for file in issues.iter().filter_map(|i| i.file()) {
        if !files.iter().any(|f| f == file) {
            files.push(file.to_string());
        }
    }
    files
}
