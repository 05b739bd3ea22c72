//! Command-line interface definition

use carbonlake_common::types::GwpStandard;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::enricher::FailurePolicy;

#[derive(Parser, Debug)]
#[command(name = "carbonlake-calculator")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Debug logging on the console
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enrich every source batch and write it to the configured sinks
    Run,

    /// Load the reference emission factor document into the database
    SeedFactors {
        /// Reference document (JSON array of emission factors)
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Enrich a local NDJSON file and print the result, without any sink
    EnrichFile {
        /// Newline-delimited activity events
        #[arg(short, long)]
        input: PathBuf,

        /// Reference document (JSON array of emission factors)
        #[arg(short, long)]
        factors: PathBuf,

        /// Assessment report supplying the GWP weights
        #[arg(long, default_value = "ar5")]
        gwp: GwpStandard,

        /// Skip events that cannot be enriched instead of failing
        #[arg(long, default_value = "strict")]
        policy: FailurePolicy,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_enrich_file() {
        let cli = Cli::try_parse_from([
            "carbonlake-calculator",
            "enrich-file",
            "--input",
            "events.json",
            "--factors",
            "factors.json",
            "--gwp",
            "AR4",
            "--policy",
            "lenient",
        ])
        .unwrap();

        match cli.command {
            Commands::EnrichFile { gwp, policy, .. } => {
                assert_eq!(gwp, GwpStandard::Ar4);
                assert_eq!(policy, FailurePolicy::Lenient);
            },
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_seed_requires_file() {
        assert!(Cli::try_parse_from(["carbonlake-calculator", "seed-factors"]).is_err());
    }
}
