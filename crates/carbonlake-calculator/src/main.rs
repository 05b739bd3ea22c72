//! CarbonLake Calculator - Main entry point

use anyhow::Result;
use carbonlake_calculator::{
    cli::{Cli, Commands},
    commands,
    config::CalculatorConfig,
    sinks::raw_batch::to_ndjson,
};
use carbonlake_common::logging::{init_logging, LogConfig, LogLevel};
use clap::Parser;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Info })
        .log_file_prefix("carbonlake-calculator")
        .filter_directives(concat!(
            "carbonlake_calculator=debug,sqlx=warn,",
            "aws_config=warn,aws_smithy_runtime=warn",
        ))
        .build();

    // Environment variables take precedence
    let log_config = log_config.merge_env()?;
    let _guard = init_logging(&log_config)?;

    match cli.command {
        Commands::Run => {
            let config = CalculatorConfig::load()?;
            info!(
                source = %config.source.bucket,
                output = %config.output.bucket,
                "Starting CarbonLake calculator"
            );

            let summary = commands::run(&config).await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        },

        Commands::SeedFactors { file } => {
            let config = CalculatorConfig::load()?;
            let stored = commands::seed_factors(&config, &file).await?;
            println!("Seeded {} emission factors", stored);
        },

        Commands::EnrichFile {
            input,
            factors,
            gwp,
            policy,
        } => {
            let report = commands::enrich_file(&input, &factors, gwp, policy).await?;
            println!("{}", to_ndjson(&report.events)?);

            for skipped in &report.skipped {
                eprintln!(
                    "skipped event #{} ({}): {}",
                    skipped.index,
                    skipped.activity_event_id,
                    skipped.reason
                );
            }
        },
    }

    Ok(())
}
