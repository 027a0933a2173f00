//! Verification session — rounds, roles, mode policy and the issue ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::issue::IssueLedger;

/// The two alternating analytical roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Raises issues.
    Verifier,
    /// Challenges them and surfaces what the Verifier missed.
    Critic,
}

impl Role {
    /// The role that speaks after this one.
    pub fn other(self) -> Self {
        match self {
            Self::Verifier => Self::Critic,
            Self::Critic => Self::Verifier,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Verifier => write!(f, "verifier"),
            Self::Critic => write!(f, "critic"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "verifier" => Ok(Self::Verifier),
            "critic" => Ok(Self::Critic),
            other => Err(format!("unknown role: {}", other)),
        }
    }
}

/// How strict the round-stability part of the convergence gate is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationMode {
    #[default]
    Standard,
    FastTrack,
    SinglePass,
}

impl VerificationMode {
    /// Defaults as `(min_rounds, stable_rounds_required)`.
    pub fn default_policy(self) -> RoundPolicy {
        match self {
            Self::Standard => RoundPolicy {
                min_rounds: 3,
                stable_rounds_required: 2,
            },
            Self::FastTrack => RoundPolicy {
                min_rounds: 2,
                stable_rounds_required: 1,
            },
            Self::SinglePass => RoundPolicy {
                min_rounds: 1,
                stable_rounds_required: 0,
            },
        }
    }
}

impl std::fmt::Display for VerificationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::FastTrack => write!(f, "fast-track"),
            Self::SinglePass => write!(f, "single-pass"),
        }
    }
}

impl std::str::FromStr for VerificationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "standard" => Ok(Self::Standard),
            "fast-track" | "fast" => Ok(Self::FastTrack),
            "single-pass" | "single" => Ok(Self::SinglePass),
            other => Err(format!("unknown verification mode: {}", other)),
        }
    }
}

/// Effective round-stability thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundPolicy {
    pub min_rounds: u32,
    pub stable_rounds_required: u32,
}

/// Per-session mode selection with optional threshold overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationModeConfig {
    pub mode: VerificationMode,
    pub min_rounds: Option<u32>,
    pub stable_rounds_required: Option<u32>,
}

impl VerificationModeConfig {
    pub fn new(mode: VerificationMode) -> Self {
        Self {
            mode,
            ..Default::default()
        }
    }

    pub fn with_min_rounds(mut self, rounds: u32) -> Self {
        self.min_rounds = Some(rounds);
        self
    }

    pub fn with_stable_rounds_required(mut self, rounds: u32) -> Self {
        self.stable_rounds_required = Some(rounds);
        self
    }

    /// Resolve the thresholds the gate applies.
    ///
    /// `standard` overrides may only tighten the defaults. The lighter modes
    /// take overrides as given, with `min_rounds` floored at 1.
    pub fn round_policy(&self) -> RoundPolicy {
        let defaults = self.mode.default_policy();
        match self.mode {
            VerificationMode::Standard => RoundPolicy {
                min_rounds: self.min_rounds.unwrap_or(0).max(defaults.min_rounds),
                stable_rounds_required: self
                    .stable_rounds_required
                    .unwrap_or(0)
                    .max(defaults.stable_rounds_required),
            },
            VerificationMode::FastTrack | VerificationMode::SinglePass => RoundPolicy {
                min_rounds: self.min_rounds.unwrap_or(defaults.min_rounds).max(1),
                stable_rounds_required: self
                    .stable_rounds_required
                    .unwrap_or(defaults.stable_rounds_required),
            },
        }
    }
}

/// Session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    #[default]
    Initialized,
    Verifying,
    Converged,
    MaxRoundsReached,
}

impl SessionStatus {
    /// No further rounds are accepted.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Converged | Self::MaxRoundsReached)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized => write!(f, "INITIALIZED"),
            Self::Verifying => write!(f, "VERIFYING"),
            Self::Converged => write!(f, "CONVERGED"),
            Self::MaxRoundsReached => write!(f, "MAX_ROUNDS_REACHED"),
        }
    }
}

/// One Verifier or Critic turn. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Round {
    /// 1-indexed, strictly increasing within a session.
    pub number: u32,
    pub role: Role,
    pub output: String,
    #[serde(default)]
    pub issues_raised: Vec<String>,
    #[serde(default)]
    pub issues_resolved: Vec<String>,
    #[serde(default)]
    pub new_files_discovered: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl Round {
    pub fn new(number: u32, role: Role, output: impl Into<String>) -> Self {
        Self {
            number,
            role,
            output: output.into(),
            issues_raised: Vec::new(),
            issues_resolved: Vec::new(),
            new_files_discovered: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_issues_raised(mut self, ids: Vec<String>) -> Self {
        self.issues_raised = ids;
        self
    }

    pub fn with_issues_resolved(mut self, ids: Vec<String>) -> Self {
        self.issues_resolved = ids;
        self
    }

    pub fn with_new_files(mut self, files: Vec<String>) -> Self {
        self.new_files_discovered = files;
        self
    }
}

/// Errors from session bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("round {got} does not follow round {last}")]
    NonIncreasingRound { last: u32, got: u32 },

    #[error("session {0} is finished ({1})")]
    Finished(String, SessionStatus),
}

/// One verification engagement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    /// What is being verified (path, repo, package).
    pub target: String,
    pub requirements: String,
    /// Number of the round in progress, or of the last recorded round.
    pub current_round: u32,
    pub max_rounds: u32,
    #[serde(default)]
    pub verification_mode: VerificationModeConfig,
    #[serde(default)]
    pub status: SessionStatus,
    #[serde(default)]
    rounds: Vec<Round>,
    #[serde(default)]
    pub issues: IssueLedger,
    /// Files known to be in scope, in discovery order.
    #[serde(default)]
    pub files: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        target: impl Into<String>,
        requirements: impl Into<String>,
        verification_mode: VerificationModeConfig,
        max_rounds: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target: target.into(),
            requirements: requirements.into(),
            current_round: 0,
            max_rounds,
            verification_mode,
            status: SessionStatus::Initialized,
            rounds: Vec::new(),
            issues: IssueLedger::new(),
            files: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    /// Recorded rounds, oldest first.
    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn last_round(&self) -> Option<&Round> {
        self.rounds.last()
    }

    /// Role due next: Verifier opens, then the roles alternate.
    pub fn next_role(&self) -> Role {
        self.rounds
            .last()
            .map(|r| r.role.other())
            .unwrap_or(Role::Verifier)
    }

    /// Open the next round and return its number.
    pub fn begin_round(&mut self) -> Result<u32, SessionError> {
        if self.status.is_finished() {
            return Err(SessionError::Finished(self.id.clone(), self.status));
        }
        let last = self.rounds.last().map(|r| r.number).unwrap_or(0);
        self.current_round = last + 1;
        self.status = SessionStatus::Verifying;
        self.updated_at = Utc::now();
        Ok(self.current_round)
    }

    /// Append a round. Numbers must be strictly increasing.
    pub fn record_round(&mut self, round: Round) -> Result<(), SessionError> {
        if self.status.is_finished() {
            return Err(SessionError::Finished(self.id.clone(), self.status));
        }
        let last = self.rounds.last().map(|r| r.number).unwrap_or(0);
        if round.number <= last {
            return Err(SessionError::NonIncreasingRound {
                last,
                got: round.number,
            });
        }
        for file in &round.new_files_discovered {
            if !self.files.contains(file) {
                self.files.push(file.clone());
            }
        }
        self.current_round = round.number;
        self.status = SessionStatus::Verifying;
        self.rounds.push(round);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Whether the round budget is spent.
    pub fn rounds_exhausted(&self) -> bool {
        self.current_round >= self.max_rounds
    }

    pub(crate) fn set_status(&mut self, status: SessionStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_overrides_only_tighten() {
        let loose = VerificationModeConfig::new(VerificationMode::Standard)
            .with_min_rounds(1)
            .with_stable_rounds_required(0);
        assert_eq!(
            loose.round_policy(),
            RoundPolicy {
                min_rounds: 3,
                stable_rounds_required: 2
            }
        );

        let strict = VerificationModeConfig::new(VerificationMode::Standard).with_min_rounds(5);
        assert_eq!(strict.round_policy().min_rounds, 5);
    }

    #[test]
    fn test_fast_track_overrides() {
        let cfg = VerificationModeConfig::new(VerificationMode::FastTrack)
            .with_min_rounds(0)
            .with_stable_rounds_required(0);
        assert_eq!(
            cfg.round_policy(),
            RoundPolicy {
                min_rounds: 1,
                stable_rounds_required: 0
            }
        );
        assert_eq!(
            VerificationModeConfig::new(VerificationMode::FastTrack).round_policy(),
            RoundPolicy {
                min_rounds: 2,
                stable_rounds_required: 1
            }
        );
    }

    #[test]
    fn test_mode_wire_names() {
        let json = serde_json::to_string(&VerificationMode::FastTrack).unwrap();
        assert_eq!(json, "\"fast-track\"");
        assert_eq!("single_pass".parse::<VerificationMode>(), Ok(VerificationMode::SinglePass));
        assert_eq!(serde_json::to_string(&Role::Critic).unwrap(), "\"critic\"");
    }

    #[test]
    fn test_rounds_strictly_increase() {
        let mut session = Session::new("src/", "reqs", VerificationModeConfig::default(), 5);
        session.record_round(Round::new(1, Role::Verifier, "a")).unwrap();
        session.record_round(Round::new(2, Role::Critic, "b")).unwrap();
        let err = session.record_round(Round::new(2, Role::Verifier, "c")).unwrap_err();
        assert_eq!(err, SessionError::NonIncreasingRound { last: 2, got: 2 });
        assert_eq!(session.rounds().len(), 2);
        assert_eq!(session.next_role(), Role::Verifier);
    }

    #[test]
    fn test_begin_round_and_finished() {
        let mut session = Session::new("src/", "reqs", VerificationModeConfig::default(), 5);
        assert_eq!(session.begin_round().unwrap(), 1);
        assert_eq!(session.status, SessionStatus::Verifying);
        session.set_status(SessionStatus::Converged);
        assert!(matches!(session.begin_round(), Err(SessionError::Finished(_, _))));
    }

    #[test]
    fn test_new_files_tracked() {
        let mut session = Session::new("src/", "reqs", VerificationModeConfig::default(), 5)
            .with_files(vec!["a.rs".into()]);
        session
            .record_round(
                Round::new(1, Role::Verifier, "x")
                    .with_new_files(vec!["a.rs".into(), "b.rs".into()]),
            )
            .unwrap();
        assert_eq!(session.files, vec!["a.rs".to_string(), "b.rs".to_string()]);
    }
}
