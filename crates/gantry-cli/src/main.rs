//! Gantry - continuous delivery pipeline for the image-conversion service.
//!
//! The `gantry` command drives one pipeline run end to end:
//!
//! - `run`: resolve the account, check out, build, and publish the image
//! - `plan`: print the ordered stage list without executing anything
//!
//! Static configuration (repository URL, image coordinates, notification
//! channel) comes from `GANTRY_*` environment variables; per-run parameters
//! come from the command line.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use gantry_core::{EnvCredentialStore, PipelineParameters, StageDisposition, DEFAULT_REGION};
use gantry_pipeline::{
    AwsAccountDirectory, DeliveryConfig, DeliveryPipeline, GitCheckout, WebhookNotifier,
    WorkspaceCleanup,
};

#[derive(Parser)]
#[command(name = "gantry")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Delivery pipeline for the image-conversion service", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute the delivery pipeline
    Run {
        /// Account name to deploy to (matched exactly against the directory)
        #[arg(short, long, env = "GANTRY_ACCOUNT")]
        account: String,

        /// Deployment region
        #[arg(short, long, default_value = DEFAULT_REGION, env = "GANTRY_REGION")]
        region: String,

        /// Source branch to check out and build
        #[arg(short, long, default_value = "main")]
        branch: String,

        /// Skip the image build cache
        #[arg(long)]
        no_cache: bool,

        /// Who started the run (shown in the failure notification)
        #[arg(long, default_value = "gantry", env = "GANTRY_INITIATED_BY")]
        initiated_by: String,
    },

    /// Print the ordered stage list without executing anything
    Plan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    gantry_core::init_tracing(cli.json, level);

    match cli.command {
        Commands::Run {
            account,
            region,
            branch,
            no_cache,
            initiated_by,
        } => cmd_run(&account, &region, &branch, no_cache, &initiated_by).await,
        Commands::Plan => cmd_plan(),
    }
}

/// Execute one pipeline run and print its summary.
async fn cmd_run(
    account: &str,
    region: &str,
    branch: &str,
    no_cache: bool,
    initiated_by: &str,
) -> Result<()> {
    let config = DeliveryConfig::from_env().context("Failed to load pipeline configuration")?;

    let store = EnvCredentialStore::from_env();
    let directory = AwsAccountDirectory::new(region);
    let notifier = WebhookNotifier::from_env().context("Failed to configure the notifier")?;
    let cleanup = WorkspaceCleanup::new(config.workspace_root.clone());

    let mut params = PipelineParameters::new(account)
        .with_region(region)
        .with_branch(branch);
    params.no_cache = no_cache;
    params.initiated_by = initiated_by.to_string();

    let pipeline = DeliveryPipeline::new(
        &store,
        &directory,
        Arc::new(GitCheckout::new()),
        &notifier,
        &cleanup,
        config,
    );

    println!("Deploying to account: {}", account);
    println!("Region: {} | Branch: {}", region, branch);
    println!();

    let outcome = pipeline.execute(&params).await;

    println!("Run ID: {}", outcome.run_id);
    println!(
        "Status: {}",
        if outcome.succeeded() {
            "✓ SUCCEEDED"
        } else {
            "✗ FAILED"
        }
    );
    println!("Duration: {}ms", outcome.duration_ms);
    println!();

    for report in &outcome.stages {
        let mark = match report.disposition {
            StageDisposition::Passed => "✓",
            StageDisposition::Unstable => "~",
            StageDisposition::Failed => "✗",
        };
        println!("  {} {} ({}ms)", mark, report.name, report.duration_ms);
    }

    if let Some(stage) = &outcome.halted_after {
        println!("\nHalted after unstable stage: {}", stage);
    }

    println!(
        "\nSummary: {}/{} stages passed",
        outcome.passed_count(),
        outcome.stages.len()
    );

    if outcome.succeeded() {
        Ok(())
    } else {
        let stage = outcome.failing_stage.as_deref().unwrap_or("unknown");
        let detail = outcome.error_detail.as_deref().unwrap_or("no detail");
        anyhow::bail!("Pipeline failed at {}: {}", stage, detail)
    }
}

/// Print the ordered stage list.
fn cmd_plan() -> Result<()> {
    let config = DeliveryConfig::from_env().context("Failed to load pipeline configuration")?;

    println!(
        "Pipeline: {} -> {}:{}",
        config.repository_url, config.image.repository, config.image.tag
    );
    println!("Stages:");
    for (index, name) in gantry_pipeline::STAGE_NAMES.iter().enumerate() {
        println!("  {}. {}", index + 1, name);
    }

    Ok(())
}
