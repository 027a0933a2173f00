//! Command-line driver for the verification engine
//!
//! Sessions are stored as JSON documents; each invocation loads one, runs a
//! single operation and prints the result as JSON on stdout. Logs go to stderr.
//! Tier pipelines and mention caches live under `--state-dir`, or in memory for
//! the one invocation when it is not given.
//!
//! # Usage
//!
//! ```bash
//! verification-engine submit --session s.json --role verifier --output round1.txt --write
//! VERIFY_MODE=fast-track verification-engine converge --session s.json
//! verification-engine --state-dir .verify complete-tier --session s.json --tokens 4200
//! verification-engine --state-dir .verify escalate --session s.json --tier exhaustive \
//!     --reason "auth rewrite" --scope src/auth.rs
//! verification-engine files --tier screen --files src/auth.rs,src/db.rs
//! verification-engine schema
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use verification_engine::issue::StructuredRoundReport;
use verification_engine::tiering::TierResult;
use verification_engine::{
    get_files_for_tier, EngineConfig, Role, RoundSubmission, Session, Tier, VerificationEngine,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file (VERIFY_* environment variables override it)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for tier pipelines and mention caches
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start a new session document
    Init {
        /// Where to write the session JSON
        #[arg(long)]
        session: PathBuf,
        #[arg(long)]
        target: String,
        #[arg(long, default_value = "")]
        requirements: String,
        /// Files in scope, comma-separated
        #[arg(long, value_delimiter = ',')]
        files: Vec<String>,
    },

    /// Push one round's output through the engine
    Submit {
        #[arg(long)]
        session: PathBuf,
        /// verifier or critic
        #[arg(long)]
        role: Role,
        /// File holding the round's raw output text
        #[arg(long)]
        output: PathBuf,
        /// Issue IDs whose fix this round confirms, comma-separated
        #[arg(long, value_delimiter = ',')]
        resolved: Vec<String>,
        /// Write the updated session back to --session
        #[arg(long, default_value_t = false)]
        write: bool,
    },

    /// Evaluate convergence for a stored session
    Converge {
        #[arg(long)]
        session: PathBuf,
    },

    /// Role, prompt and files for the next round
    Plan {
        #[arg(long)]
        session: PathBuf,
    },

    /// Record the current tier as finished and apply escalation rules
    CompleteTier {
        #[arg(long)]
        session: PathBuf,
        /// Tokens spent in the tier
        #[arg(long)]
        tokens: u64,
        #[arg(long, default_value_t = 0)]
        time_ms: u64,
    },

    /// Move a session's pipeline forward by hand
    Escalate {
        #[arg(long)]
        session: PathBuf,
        /// focused or exhaustive
        #[arg(long)]
        tier: Tier,
        #[arg(long)]
        reason: String,
        /// Files the escalated round is limited to, comma-separated
        #[arg(long, value_delimiter = ',')]
        scope: Vec<String>,
    },

    /// Select the files a tier would examine
    Files {
        /// screen, focused or exhaustive
        #[arg(long)]
        tier: Tier,
        /// Known files, comma-separated
        #[arg(long, value_delimiter = ',')]
        files: Vec<String>,
        /// Escalation scope, comma-separated
        #[arg(long, value_delimiter = ',')]
        scope: Vec<String>,
    },

    /// Print the JSON schema for structured round reports
    Schema,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("verification_engine=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(args.config.as_deref())?;
    let state_dir = args.state_dir.as_deref();

    match args.command {
        Command::Init {
            session,
            target,
            requirements,
            files,
        } => {
            let engine = open_engine(config, state_dir)?;
            let created = engine.start_session(target, requirements, files)?;
            save_session(&session, &created)?;
            print_json(&created)
        }
        Command::Submit {
            session,
            role,
            output,
            resolved,
            write,
        } => {
            let mut current = load_session(&session)?;
            let text = std::fs::read_to_string(&output)
                .with_context(|| format!("failed to read round output {}", output.display()))?;
            let engine = open_engine(config, state_dir)?;
            let outcome = engine
                .submit_round(
                    &mut current,
                    RoundSubmission::new(role, text).with_resolved(resolved),
                )
                .context("round submission failed")?;
            if write {
                save_session(&session, &current)?;
            }
            print_json(&outcome)
        }
        Command::Converge { session } => {
            let current = load_session(&session)?;
            let engine = open_engine(config, state_dir)?;
            print_json(&engine.check_convergence(&current)?)
        }
        Command::Plan { session } => {
            let current = load_session(&session)?;
            let engine = open_engine(config, state_dir)?;
            print_json(&engine.next_round_plan(&current)?)
        }
        Command::CompleteTier {
            session,
            tokens,
            time_ms,
        } => {
            let current = load_session(&session)?;
            let engine = open_engine(config, state_dir)?;
            let tier = engine.current_tier(&current)?;
            print_json(&engine.complete_tier(&current, TierResult::new(tier, tokens, time_ms))?)
        }
        Command::Escalate {
            session,
            tier,
            reason,
            scope,
        } => {
            let current = load_session(&session)?;
            let engine = open_engine(config, state_dir)?;
            print_json(&engine.escalate_tier(&current, tier, &reason, scope)?)
        }
        Command::Files { tier, files, scope } => {
            print_json(&get_files_for_tier(&files, tier, &config.tiered, &scope))
        }
        Command::Schema => print_json(&StructuredRoundReport::json_schema()),
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let mut config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("invalid VERIFY_* environment override")?;
    Ok(config)
}

fn open_engine(config: EngineConfig, state_dir: Option<&Path>) -> Result<VerificationEngine> {
    match state_dir {
        Some(dir) => VerificationEngine::open(config, dir)
            .with_context(|| format!("failed to open state directory {}", dir.display())),
        None => Ok(VerificationEngine::new(config)),
    }
}

fn load_session(path: &Path) -> Result<Session> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read session {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("invalid session JSON in {}", path.display()))
}

fn save_session(path: &Path, session: &Session) -> Result<()> {
    let content = serde_json::to_string_pretty(session)?;
    std::fs::write(path, content)
        .with_context(|| format!("failed to write session {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
