//! `waypoint` binary for the Waypoint experience progression engine.
//!
//! This is the command-line entry point that wires the progression engine to
//! its `PostgreSQL` adapters. It loads configuration, connects the pool, runs
//! one subcommand and prints the result as JSON on stdout. Logs go to
//! stderr.
//!
//! # Startup Sequence
//!
//! 1. Parse arguments
//! 2. Load configuration from `waypoint-config.yaml` (or `--config`)
//! 3. Initialize structured logging (tracing)
//! 4. Connect to `PostgreSQL`
//! 5. Run the subcommand and print its result

mod cli;
mod error;

use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use waypoint_core::{LoggingConfig, ProgressionEngine, WaypointConfig};
use waypoint_db::{PgProfileSource, PgProgressStore, PgRewardOutbox, PostgresConfig, PostgresPool};
use waypoint_types::{ComponentId, ExperienceId, RequirementResult, RequirementSpec, UserId};

use crate::cli::{Cli, Command, Target};
use crate::error::CliError;

type PgEngine = ProgressionEngine<PgProgressStore, PgProfileSource, PgRewardOutbox>;

/// Output of the `can-start` subcommand.
#[derive(Debug, Serialize)]
struct CanStartReport {
    can_start: bool,
    missing_requirements: Vec<RequirementResult>,
}

/// Application entry point.
///
/// Exit codes: 0 on success, 2 when the engine rejects the request, 3 when
/// a record is missing, 1 for any other failure. On failure an error report
/// with the unmet requirements, if any, is printed on stdout.
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "waypoint command failed");
            eprintln!("error: {e}");
            if let Err(print_err) = print_json(&e.report()) {
                eprintln!("error: {print_err}");
            }
            e.exit_code()
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(&cli)?;
    init_tracing(&config.logging);
    info!(
        config = %cli.config.display(),
        ordering = ?config.progression.component_ordering,
        "Configuration loaded"
    );

    let pool = PostgresPool::connect(&PostgresConfig::from_config(&config.database)).await?;

    let result = if matches!(cli.command, Command::Migrate) {
        pool.run_migrations().await?;
        info!("Migrations applied");
        Ok(())
    } else {
        let engine = ProgressionEngine::new(
            PgProgressStore::new(pool.shared()),
            PgProfileSource::new(pool.shared()),
            PgRewardOutbox::new(pool.shared()),
            config.progression,
        );
        dispatch(&engine, cli.command).await
    };

    pool.close().await;
    result
}

async fn dispatch(engine: &PgEngine, command: Command) -> Result<(), CliError> {
    match command {
        Command::Migrate => Ok(()),
        Command::Start(target) => {
            let (user, experience) = ids(target);
            print_json(&engine.start(user, experience).await?)
        }
        Command::Advance {
            target,
            component,
            data,
        } => {
            let (user, experience) = ids(target);
            let completion_data: serde_json::Value = serde_json::from_str(&data)?;
            let outcome = engine
                .advance(
                    user,
                    experience,
                    ComponentId::new(component),
                    completion_data,
                )
                .await?;
            print_json(&outcome)
        }
        Command::Complete(target) => {
            let (user, experience) = ids(target);
            print_json(&engine.complete(user, experience).await?)
        }
        Command::Status(target) => {
            let (user, experience) = ids(target);
            print_json(&engine.status(user, experience).await?)
        }
        Command::CanStart(target) => {
            let (user, experience) = ids(target);
            let (can_start, missing_requirements) = engine.can_start(user, experience).await?;
            print_json(&CanStartReport {
                can_start,
                missing_requirements,
            })
        }
        Command::Validate { user, requirements } => {
            let specs: Vec<RequirementSpec> = serde_json::from_str(&requirements)?;
            print_json(
                &engine
                    .validate_requirements(UserId::new(user), &specs)
                    .await?,
            )
        }
        Command::Stats { experience } => {
            print_json(&engine.experience_stats(ExperienceId::new(experience)).await?)
        }
        Command::Popular { limit } => print_json(&engine.popular_experiences(limit).await?),
    }
}

/// Load configuration from the `--config` path.
///
/// A missing file falls back to defaults, with `DATABASE_URL` still applied.
fn load_config(cli: &Cli) -> Result<WaypointConfig, CliError> {
    if cli.config.exists() {
        Ok(WaypointConfig::from_file(&cli.config)?)
    } else {
        let mut config = WaypointConfig::default();
        config.apply_env_overrides();
        Ok(config)
    }
}

/// Initialize the tracing subscriber on stderr.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

const fn ids(target: Target) -> (UserId, ExperienceId) {
    (UserId::new(target.user), ExperienceId::new(target.experience))
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
