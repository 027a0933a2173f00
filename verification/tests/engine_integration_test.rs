//! End-to-end tests for the verification engine
//!
//! Drives whole sessions round by round: Verifier and Critic outputs go in,
//! issue history, convergence and tier plans come out.

use std::sync::Arc;

use verification_engine::convergence::ConvergenceBlocker;
use verification_engine::tiering::TierResult;
use verification_engine::{
    ConvergenceType, EngineConfig, EngineError, Issue, IssueCategory, IssueDraft, IssueStatus,
    JsonFileStore, MentionCache, PipelineState, Role, RoundSubmission, SessionError,
    SessionStatus, Severity, SharedStore, Tier, TieredConfig, TransitionType, VerificationEngine,
    VerificationMode, VerificationModeConfig,
};

fn fast_track() -> EngineConfig {
    EngineConfig {
        mode: VerificationModeConfig::new(VerificationMode::FastTrack),
        ..Default::default()
    }
}

fn timing_leak() -> Issue {
    Issue::new(
        "SEC-01",
        IssueCategory::Security,
        Severity::High,
        "session token compared with a non-constant-time check",
        Role::Verifier,
        1,
    )
    .with_location("src/auth/session.rs:12")
}

/// Test: raise, confirm, fix, converge across three alternating rounds
#[test]
fn test_fast_track_session_converges() {
    let engine = VerificationEngine::new(fast_track());
    let mut session = engine
        .start_session(
            "session-service",
            "session tokens must not leak",
            vec!["src/auth/session.rs".into(), "src/lib.rs".into()],
        )
        .unwrap();
    assert_eq!(session.status, SessionStatus::Initialized);

    let round1 = engine
        .submit_round(
            &mut session,
            RoundSubmission::new(
                Role::Verifier,
                "Found SEC-01 in src/auth/session.rs:12 where the token is compared with ==.",
            )
            .with_raised(vec![timing_leak()]),
        )
        .unwrap();
    assert_eq!(round1.issues_raised, vec!["SEC-01".to_string()]);
    assert!(!round1.convergence.decision.is_converged);
    assert_eq!(session.next_role(), Role::Critic);

    let round2 = engine
        .submit_round(
            &mut session,
            RoundSubmission::new(
                Role::Critic,
                "SEC-01 is confirmed.\n\
                 Reviewed correctness, reliability, maintainability and performance of \
                 src/auth/session.rs. Edge cases such as empty input and expired tokens are handled. \
                 No other issues were found.",
            ),
        )
        .unwrap();
    assert!(round2.issues_raised.is_empty());
    assert_eq!(session.issues.get("SEC-01").unwrap().status(), IssueStatus::Unresolved);
    assert_eq!(
        round2.convergence.decision.blockers,
        vec![ConvergenceBlocker::HighUnresolved { count: 1 }]
    );

    let round3 = engine
        .submit_round(
            &mut session,
            RoundSubmission::new(
                Role::Verifier,
                "Fixed SEC-01 with a constant-time comparison in src/auth/session.rs.",
            )
            .with_resolved(vec!["SEC-01".into()]),
        )
        .unwrap();

    assert_eq!(round3.issues_resolved, vec!["SEC-01".to_string()]);
    assert!(round3.convergence.decision.is_converged, "{}", round3.convergence.decision.reason);
    assert_eq!(round3.convergence.decision.convergence_type, ConvergenceType::FastTrack);
    assert_eq!(round3.convergence.rounds_without_new_issues, 2);
    assert_eq!(session.status, SessionStatus::Converged);

    let history: Vec<TransitionType> = session
        .issues
        .get("SEC-01")
        .unwrap()
        .transitions()
        .iter()
        .map(|t| t.kind)
        .collect();
    assert_eq!(
        history,
        vec![TransitionType::Discovered, TransitionType::Validated, TransitionType::Resolved]
    );

    let err = engine
        .submit_round(&mut session, RoundSubmission::new(Role::Critic, "late"))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Session(SessionError::Finished(_, SessionStatus::Converged))
    ));
    assert_eq!(session.rounds().len(), 3);
}

/// Test: a session that never settles stops at its round budget
#[test]
fn test_max_rounds_reached() {
    let engine = VerificationEngine::new(EngineConfig {
        max_rounds: 2,
        ..Default::default()
    });
    let mut session = engine.start_session("svc", "reqs", vec![]).unwrap();

    let first = engine
        .submit_round(&mut session, RoundSubmission::new(Role::Verifier, "looked around"))
        .unwrap();
    assert_eq!(first.status, SessionStatus::Verifying);
    let second = engine
        .submit_round(&mut session, RoundSubmission::new(Role::Critic, "looked again"))
        .unwrap();
    assert_eq!(second.status, SessionStatus::MaxRoundsReached);
    assert!(!second.convergence.decision.is_converged);
}

/// Test: a Critic split request is completed through the engine
#[test]
fn test_split_request_then_split() {
    let engine = VerificationEngine::new(EngineConfig::default());
    let mut session = engine.start_session("svc", "reqs", vec![]).unwrap();
    engine
        .submit_round(
            &mut session,
            RoundSubmission::new(Role::Verifier, "Raising SEC-01.")
                .with_raised(vec![timing_leak()]),
        )
        .unwrap();

    let outcome = engine
        .submit_round(
            &mut session,
            RoundSubmission::new(
                Role::Critic,
                "SEC-01 conflates two separate issues and should be split.",
            ),
        )
        .unwrap();
    assert_eq!(outcome.ledger.pending_splits.len(), 1);
    assert_eq!(outcome.ledger.pending_splits[0].suggested_parts, Some(2));

    let split = engine
        .split_issue(
            &mut session,
            "SEC-01",
            &[
                IssueDraft::summary("timing side channel"),
                IssueDraft::summary("token logged on mismatch").with_severity(Severity::Medium),
            ],
            Role::Critic,
        )
        .unwrap();

    assert_eq!(split.new_issues.len(), 2);
    assert_eq!(session.issues.get("SEC-01").unwrap().status(), IssueStatus::Split);
    assert_eq!(session.issues.get("SEC-01-B").unwrap().severity(), Severity::Medium);
    assert_eq!(session.issues.get("SEC-01-A").unwrap().raised_in_round, 2);
}

/// Test: tiered plans narrow to affected files after a critical escalation,
/// with pipeline and mention state kept on disk
#[test]
fn test_tiered_session_with_file_stores() {
    let dir = tempfile::tempdir().unwrap();
    let pipelines: SharedStore<PipelineState> =
        Arc::new(JsonFileStore::open(dir.path().join("pipelines")).unwrap());
    let mentions: SharedStore<MentionCache> =
        Arc::new(JsonFileStore::open(dir.path().join("mentions")).unwrap());
    let config = EngineConfig {
        tiered: TieredConfig {
            enabled: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let engine = VerificationEngine::with_stores(config, pipelines, mentions);

    let mut session = engine
        .start_session(
            "session-service",
            "reqs",
            vec!["src/auth/session.rs".into(), "src/lib.rs".into()],
        )
        .unwrap();

    let plan = engine.next_round_plan(&session).unwrap();
    assert_eq!(plan.round, 1);
    assert_eq!(plan.role, Role::Verifier);
    assert_eq!(plan.prompt.as_ref().unwrap().tier, Tier::Screen);
    assert_eq!(plan.files, vec!["src/lib.rs".to_string()]);

    let bypass = Issue::new(
        "SEC-02",
        IssueCategory::Security,
        Severity::Critical,
        "session fixation",
        Role::Verifier,
        1,
    )
    .with_location("src/auth/session.rs:30");
    engine
        .submit_round(
            &mut session,
            RoundSubmission::new(Role::Verifier, "SEC-02 allows session fixation.")
                .with_raised(vec![bypass]),
        )
        .unwrap();
    assert!(dir
        .path()
        .join("mentions")
        .join(format!("{}.json", session.id))
        .exists());

    let done = engine
        .complete_tier(&session, TierResult::new(Tier::Screen, 1_200, 40))
        .unwrap();
    assert_eq!(done.next_tier, Tier::Exhaustive);

    let plan = engine.next_round_plan(&session).unwrap();
    assert_eq!(plan.round, 2);
    assert_eq!(plan.role, Role::Critic);
    let prompt = plan.prompt.unwrap();
    assert_eq!(prompt.tier, Tier::Exhaustive);
    assert_eq!(prompt.template, "exhaustive-critic");
    assert_eq!(plan.files, vec!["src/auth/session.rs".to_string()]);
}

/// Test: structured extraction reads the JSON report instead of the prose
#[test]
fn test_structured_extraction_config() {
    let config = EngineConfig::from_toml_str("extraction = \"structured\"").unwrap();
    let engine = VerificationEngine::new(config);
    let mut session = engine.start_session("svc", "reqs", vec![]).unwrap();
    engine
        .submit_round(
            &mut session,
            RoundSubmission::new(Role::Verifier, "Raising SEC-01.")
                .with_raised(vec![timing_leak()]),
        )
        .unwrap();

    let output = r#"{"invalidations": [{"issueId": "SEC-01", "reason": "compare is constant-time"}],
"newIssues": [{"id": "REL-04", "summary": "unbounded retry", "severity": "LOW"}]}"#;
    let outcome = engine
        .submit_round(&mut session, RoundSubmission::new(Role::Critic, output))
        .unwrap();

    assert_eq!(outcome.issues_raised, vec!["REL-04".to_string()]);
    assert_eq!(outcome.issues_resolved, vec!["SEC-01".to_string()]);
    assert_eq!(session.issues.get("SEC-01").unwrap().status(), IssueStatus::Dismissed);
    assert_eq!(session.issues.get("REL-04").unwrap().severity(), Severity::Low);
}

/// Test: a Critic affirming a critical issue in negated wording keeps it open
#[test]
fn test_negated_critic_verdict_keeps_critical_open() {
    let engine = VerificationEngine::new(EngineConfig::default());
    let mut session = engine.start_session("svc", "reqs", vec![]).unwrap();
    let bypass = Issue::new(
        "SEC-01",
        IssueCategory::Security,
        Severity::Critical,
        "auth bypass",
        Role::Verifier,
        1,
    );
    let other = Issue::new(
        "SEC-02",
        IssueCategory::Security,
        Severity::High,
        "weak hashing",
        Role::Verifier,
        1,
    );
    engine
        .submit_round(
            &mut session,
            RoundSubmission::new(Role::Verifier, "Raising SEC-01 and SEC-02.")
                .with_raised(vec![bypass, other]),
        )
        .unwrap();

    let outcome = engine
        .submit_round(
            &mut session,
            RoundSubmission::new(
                Role::Critic,
                "SEC-01 is not a false positive; it is exploitable. SEC-01 should not be dismissed.\n\
                 SEC-01 is not a duplicate of SEC-02, they are distinct bugs.",
            ),
        )
        .unwrap();

    assert!(outcome.issues_resolved.is_empty());
    assert!(outcome.ledger.closed.is_empty());
    for id in ["SEC-01", "SEC-02"] {
        assert!(session.issues.get(id).unwrap().is_open(), "{} closed", id);
    }
    assert!(outcome
        .convergence
        .decision
        .blockers
        .contains(&ConvergenceBlocker::CriticalUnresolved { count: 1 }));
}

/// Test: tier state written under a state directory survives an engine restart
#[test]
fn test_state_dir_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig {
        tiered: TieredConfig {
            enabled: true,
            ..Default::default()
        },
        ..Default::default()
    };
    let files = vec!["src/lib.rs".to_string(), "src/db.rs".to_string()];

    let session = {
        let engine = VerificationEngine::open(config.clone(), dir.path()).unwrap();
        let session = engine.start_session("svc", "reqs", files.clone()).unwrap();
        let state = engine
            .escalate_tier(&session, Tier::Focused, "reviewer asked", vec!["src/db.rs".into()])
            .unwrap();
        assert_eq!(state.current_tier, Tier::Focused);
        session
    };
    assert!(dir
        .path()
        .join("pipelines")
        .join(format!("{}.json", session.id))
        .exists());

    let engine = VerificationEngine::open(config, dir.path()).unwrap();
    assert_eq!(engine.current_tier(&session).unwrap(), Tier::Focused);
    let plan = engine.next_round_plan(&session).unwrap();
    assert_eq!(plan.prompt.unwrap().tier, Tier::Focused);
    assert_eq!(plan.files, vec!["src/db.rs".to_string()]);

    let err = engine
        .escalate_tier(&session, Tier::Screen, "back down", vec![])
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::Scheduler(verification_engine::SchedulerError::NotForward { .. })
    ));

    let done = engine
        .complete_tier(&session, TierResult::new(Tier::Focused, 300, 20))
        .unwrap();
    assert_eq!(done.next_tier, Tier::Focused);
}
