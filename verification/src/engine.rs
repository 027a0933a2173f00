//! Verification engine — drives one round at a time through the core.
//!
//! `submit_round` works on a copy of the session and only writes it back once
//! every step has succeeded, so a failed submission leaves the session at its
//! last committed state. Callers submit one round at a time per session.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::convergence::{check_convergence, ConvergenceReport, MentionCache};
use crate::issue::{
    extractor_for, Issue, IssueDraft, LedgerUpdate, SplitOutcome, TransitionExtractor,
};
use crate::session::{Role, Round, Session, SessionError, SessionStatus};
use crate::store::{InMemoryStore, JsonFileStore, SharedStore, StoreError};
use crate::tiering::{
    PipelineState, SchedulerError, Tier, TierCompletion, TierPrompt, TierResult, TierScheduler,
};

/// Errors from engine operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("tiered execution is disabled")]
    TieringDisabled,
}

pub type EngineResult<T> = Result<T, EngineError>;

/// One round's input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundSubmission {
    pub role: Role,
    pub output: String,
    /// Issues the caller already structured for this round.
    #[serde(default)]
    pub raised_issues: Vec<Issue>,
    /// IDs whose fix the round confirms.
    #[serde(default)]
    pub resolved_issue_ids: Vec<String>,
    #[serde(default)]
    pub new_files_discovered: Vec<String>,
}

impl RoundSubmission {
    pub fn new(role: Role, output: impl Into<String>) -> Self {
        Self {
            role,
            output: output.into(),
            raised_issues: Vec::new(),
            resolved_issue_ids: Vec::new(),
            new_files_discovered: Vec::new(),
        }
    }

    pub fn with_raised(mut self, issues: Vec<Issue>) -> Self {
        self.raised_issues = issues;
        self
    }

    pub fn with_resolved(mut self, ids: Vec<String>) -> Self {
        self.resolved_issue_ids = ids;
        self
    }

    pub fn with_new_files(mut self, files: Vec<String>) -> Self {
        self.new_files_discovered = files;
        self
    }
}

/// What a submitted round changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundOutcome {
    pub round: u32,
    pub role: Role,
    pub issues_raised: Vec<String>,
    pub issues_resolved: Vec<String>,
    pub ledger: LedgerUpdate,
    pub convergence: ConvergenceReport,
    pub status: SessionStatus,
}

/// What the round driver should run next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundPlan {
    pub round: u32,
    pub role: Role,
    /// Present when tiered execution is enabled.
    pub prompt: Option<TierPrompt>,
    pub files: Vec<String>,
}

/// Facade over lifecycle, convergence and scheduling.
pub struct VerificationEngine {
    config: EngineConfig,
    extractor: Box<dyn TransitionExtractor>,
    scheduler: TierScheduler,
    mentions: SharedStore<MentionCache>,
}

impl VerificationEngine {
    /// Engine with in-memory stores.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_stores(
            config,
            Arc::new(InMemoryStore::<PipelineState>::new()),
            Arc::new(InMemoryStore::<MentionCache>::new()),
        )
    }

    /// Engine persisting pipeline state and mention caches under
    /// `state_dir/pipelines` and `state_dir/mentions`.
    pub fn open(config: EngineConfig, state_dir: impl AsRef<Path>) -> EngineResult<Self> {
        let state_dir = state_dir.as_ref();
        let pipelines = JsonFileStore::open(state_dir.join("pipelines"))?;
        let mentions = JsonFileStore::open(state_dir.join("mentions"))?;
        Ok(Self::with_stores(config, Arc::new(pipelines), Arc::new(mentions)))
    }

    pub fn with_stores(
        config: EngineConfig,
        pipelines: SharedStore<PipelineState>,
        mentions: SharedStore<MentionCache>,
    ) -> Self {
        let extractor = extractor_for(config.extraction);
        let scheduler = TierScheduler::with_store(config.tiered.clone(), pipelines);
        Self {
            config,
            extractor,
            scheduler,
            mentions,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &TierScheduler {
        &self.scheduler
    }

    /// Create a session and, with tiering enabled, its pipeline.
    pub fn start_session(
        &self,
        target: impl Into<String>,
        requirements: impl Into<String>,
        files: Vec<String>,
    ) -> EngineResult<Session> {
        let session = Session::new(target, requirements, self.config.mode, self.config.max_rounds)
            .with_files(files);
        if self.config.tiered.enabled {
            self.scheduler.initialize_pipeline(&session.id)?;
        }
        info!(
            session_id = %session.id,
            mode = %session.verification_mode.mode,
            max_rounds = session.max_rounds,
            "Session started"
        );
        Ok(session)
    }

    /// Run one round: extract, apply, record, then evaluate convergence.
    pub fn submit_round(
        &self,
        session: &mut Session,
        submission: RoundSubmission,
    ) -> EngineResult<RoundOutcome> {
        let mut next = session.clone();
        let number = next.begin_round()?;
        let role = submission.role;

        let mut issues_raised = Vec::new();
        for issue in submission.raised_issues {
            let id = issue.id.clone();
            if next.issues.raise(issue, number, role) {
                issues_raised.push(id);
            }
        }

        let detection = self
            .extractor
            .extract(&next, role, &submission.output, next.issues.issues());
        debug!(
            session_id = %next.id,
            round = number,
            transitions = detection.transitions.len(),
            new_issues = detection.new_issues.len(),
            merges = detection.merge_requests.len(),
            splits = detection.split_requests.len(),
            "Transitions detected"
        );
        let ledger = next.issues.apply_detection(detection, number, role);
        issues_raised.extend(ledger.added.iter().cloned());

        let mut issues_resolved = ledger.closed.clone();
        let reason = format!("fix confirmed by {}", role);
        for id in &submission.resolved_issue_ids {
            if next.issues.resolve(id, number, &reason, role) {
                if let Some(issue) = next.issues.get(id) {
                    if !issues_resolved.contains(&issue.id) {
                        issues_resolved.push(issue.id.clone());
                    }
                }
            }
        }

        let round = Round::new(number, role, submission.output)
            .with_issues_raised(issues_raised.clone())
            .with_issues_resolved(issues_resolved.clone())
            .with_new_files(submission.new_files_discovered);
        next.record_round(round)?;

        let cache = self.update_mention_cache(&next)?;
        let convergence = check_convergence(&next, Some(&cache), &self.config.coverage);

        if convergence.decision.is_converged {
            next.set_status(SessionStatus::Converged);
        } else if next.rounds_exhausted() {
            next.set_status(SessionStatus::MaxRoundsReached);
        }

        info!(
            session_id = %next.id,
            round = number,
            %role,
            raised = issues_raised.len(),
            resolved = issues_resolved.len(),
            status = %next.status,
            "Round recorded"
        );

        *session = next;
        Ok(RoundOutcome {
            round: number,
            role,
            issues_raised,
            issues_resolved,
            ledger,
            convergence,
            status: session.status,
        })
    }

    /// Feed the latest round into the session's cache. A stored copy is only
    /// extended when it is exactly one round behind. Otherwise the cache is
    /// rebuilt from the session's rounds, which also drops text left behind
    /// by a submission whose session was never committed.
    fn update_mention_cache(&self, session: &Session) -> EngineResult<MentionCache> {
        let latest = session.last_round().map(|r| r.number).unwrap_or(0);
        let cache = match (self.mentions.load(&session.id)?, session.last_round()) {
            (Some(mut cache), Some(round)) if cache.last_round + 1 == latest => {
                cache.observe(round);
                cache
            }
            _ => MentionCache::from_rounds(session.rounds()),
        };
        self.mentions.save(&session.id, &cache)?;
        Ok(cache)
    }

    /// Convergence for a session as it stands. A stored cache that does not
    /// match the session's latest round is ignored.
    pub fn check_convergence(&self, session: &Session) -> EngineResult<ConvergenceReport> {
        let latest = session.last_round().map(|r| r.number).unwrap_or(0);
        let cache = self
            .mentions
            .load(&session.id)?
            .filter(|cache| cache.last_round == latest);
        Ok(check_convergence(session, cache.as_ref(), &self.config.coverage))
    }

    /// Split an issue in the session's ledger under the current round.
    pub fn split_issue(
        &self,
        session: &mut Session,
        id: &str,
        drafts: &[IssueDraft],
        role: Role,
    ) -> Option<SplitOutcome> {
        let round = session.current_round;
        session.issues.split(id, drafts, round, role)
    }

    /// Record a completed tier against the session's issues.
    pub fn complete_tier(
        &self,
        session: &Session,
        result: TierResult,
    ) -> EngineResult<TierCompletion> {
        self.ensure_pipeline(session)?;
        Ok(self
            .scheduler
            .complete_tier(&session.id, result, session.issues.issues())?)
    }

    /// Manual forward-only move to `target`.
    pub fn escalate_tier(
        &self,
        session: &Session,
        target: Tier,
        reason: &str,
        scope: Vec<String>,
    ) -> EngineResult<PipelineState> {
        self.ensure_pipeline(session)?;
        Ok(self.scheduler.escalate_tier(&session.id, target, reason, scope)?)
    }

    /// Tier the session's next round runs at.
    pub fn current_tier(&self, session: &Session) -> EngineResult<Tier> {
        self.ensure_pipeline(session)?;
        Ok(self.scheduler.pipeline_state(&session.id)?.current_tier)
    }

    /// Fails when tiering is off; creates the pipeline when the store has none,
    /// as for a session started by an engine with a different store.
    fn ensure_pipeline(&self, session: &Session) -> EngineResult<()> {
        if !self.config.tiered.enabled {
            return Err(EngineError::TieringDisabled);
        }
        match self.scheduler.pipeline_state(&session.id) {
            Ok(_) => Ok(()),
            Err(SchedulerError::UnknownSession(_)) => {
                self.scheduler.initialize_pipeline(&session.id)?;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Role, prompt selection and file scope for the next round.
    pub fn next_round_plan(&self, session: &Session) -> EngineResult<RoundPlan> {
        let role = session.next_role();
        let round = session.last_round().map(|r| r.number).unwrap_or(0) + 1;
        if !self.config.tiered.enabled {
            return Ok(RoundPlan {
                round,
                role,
                prompt: None,
                files: session.files.clone(),
            });
        }
        self.ensure_pipeline(session)?;
        Ok(RoundPlan {
            round,
            role,
            prompt: Some(self.scheduler.current_tier_prompt(&session.id, role)?),
            files: self.scheduler.files_for_next_round(&session.id, &session.files)?,
        })
    }
}
