// src/cli.rs

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::state::Theme;

/// Grade coding-challenge submissions locally or over HTTP.
///
/// `grader.yaml` is the primary source of truth.
/// CLI flags only override config values.
#[derive(Parser, Debug)]
#[command(name = "grader", version, disable_help_subcommand = true)]
pub struct Cli {
    /// Path to config file
    #[arg(long, global = true, default_value = "grader.yaml")]
    pub config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// All supported CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Grade a submission once.
    ///
    /// Exits non-zero unless every test passes.
    Run {
        /// Challenge id from the catalog
        #[arg(short, long)]
        challenge: String,

        /// Submission source file
        #[arg(short, long)]
        file: PathBuf,

        /// Write the sandboxed preview page here
        #[arg(long)]
        preview: Option<PathBuf>,

        /// Send progress to the configured backend
        #[arg(long)]
        submit: bool,

        /// Override sandbox duration budget in milliseconds
        #[arg(long)]
        budget_time: Option<u64>,

        /// Override sandbox memory budget in MB (peak RSS)
        #[arg(long)]
        budget_mem: Option<u64>,
    },

    /// Re-grade a submission every time the file is saved.
    ///
    /// Shows the challenge countdown; running out of time does not stop
    /// grading.
    Watch {
        #[arg(short, long)]
        challenge: String,

        #[arg(short, long)]
        file: PathBuf,
    },

    /// List the challenge catalog.
    List,

    /// Write a challenge's starter code to a file.
    InitSubmission {
        #[arg(short, long)]
        challenge: String,

        /// Defaults to <challenge>.html or <challenge>.js
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Check the catalog for duplicate ids, empty batteries and
    /// test names without a rule.
    Validate,

    /// Show streak and progress.
    Stats,

    /// Set the colour theme.
    Theme {
        #[arg(value_enum)]
        theme: Theme,
    },

    /// Store backend credentials.
    Login {
        #[arg(long)]
        user: String,

        #[arg(long)]
        token: String,
    },

    /// Forget backend credentials.
    Logout,

    /// Serve the HTTP API.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        addr: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_run_with_overrides() {
        let cli = Cli::try_parse_from([
            "grader",
            "run",
            "-c",
            "array-sum",
            "-f",
            "sum.js",
            "--budget-time",
            "500",
            "--config",
            "other.yaml",
        ])
        .unwrap();

        assert_eq!(cli.config, PathBuf::from("other.yaml"));
        match cli.command {
            Command::Run {
                challenge,
                file,
                budget_time,
                submit,
                ..
            } => {
                assert_eq!(challenge, "array-sum");
                assert_eq!(file, PathBuf::from("sum.js"));
                assert_eq!(budget_time, Some(500));
                assert!(!submit);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn theme_accepts_known_values_only() {
        let cli = Cli::try_parse_from(["grader", "theme", "dark"]).unwrap();
        assert!(matches!(cli.command, Command::Theme { theme: Theme::Dark }));
        assert!(Cli::try_parse_from(["grader", "theme", "neon"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
