//! Command-line arguments for the `waypoint` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Drive the Waypoint experience progression engine against `PostgreSQL`.
#[derive(Debug, Parser)]
#[command(name = "waypoint", version, about)]
pub struct Cli {
    /// Path to the YAML configuration file.
    #[arg(long, short, default_value = "waypoint-config.yaml")]
    pub config: PathBuf,

    /// The operation to run.
    #[command(subcommand)]
    pub command: Command,
}

/// A user and the experience they act on.
#[derive(Debug, Clone, Copy, clap::Args)]
pub struct Target {
    /// User id.
    #[arg(long)]
    pub user: i64,

    /// Experience id.
    #[arg(long)]
    pub experience: i64,
}

/// Subcommands. Each prints its result as JSON on stdout.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Apply pending database migrations.
    Migrate,

    /// Start an experience, or resume the one in progress.
    Start(Target),

    /// Report completion of one component.
    Advance {
        /// User and experience.
        #[command(flatten)]
        target: Target,

        /// Component id.
        #[arg(long)]
        component: i64,

        /// JSON payload stored with the completion.
        #[arg(long, default_value = "{}")]
        data: String,
    },

    /// Complete an in-progress experience without its remaining components
    /// (administrative override).
    Complete(Target),

    /// Show where a user stands in an experience.
    Status(Target),

    /// Check whether a user meets an experience's requirements.
    CanStart(Target),

    /// Evaluate an ad-hoc JSON list of requirements for a user.
    Validate {
        /// User id.
        #[arg(long)]
        user: i64,

        /// JSON array of `{"requirement_type", "requirement_value"}` objects.
        #[arg(long)]
        requirements: String,
    },

    /// Show aggregate statistics for one experience.
    Stats {
        /// Experience id.
        #[arg(long)]
        experience: i64,
    },

    /// List the most-started experiences.
    Popular {
        /// Maximum number of experiences.
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_advance_with_defaults() {
        let cli = Cli::try_parse_from([
            "waypoint",
            "advance",
            "--user",
            "7",
            "--experience",
            "1",
            "--component",
            "101",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("waypoint-config.yaml"));
        assert!(matches!(
            cli.command,
            Command::Advance { target: Target { user: 7, experience: 1 }, component: 101, ref data }
                if data == "{}"
        ));
    }

    #[test]
    fn parses_config_override_and_popular_limit() {
        let cli = Cli::try_parse_from([
            "waypoint",
            "--config",
            "/etc/waypoint.yaml",
            "popular",
            "--limit",
            "3",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("/etc/waypoint.yaml"));
        assert!(matches!(cli.command, Command::Popular { limit: 3 }));
    }

    #[test]
    fn start_requires_user_and_experience() {
        assert!(Cli::try_parse_from(["waypoint", "start", "--user", "7"]).is_err());
    }
}
