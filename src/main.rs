//! fslong-aggregator - FreeSurfer longitudinal results aggregator
//!
//! A CLI gear that searches every subject in a project for analyses of a
//! given processing gear, pulls the whitelisted CSV outputs from the runs
//! that completed, and combines them into one CSV per output type. Subjects
//! and sessions whose processing failed or never ran get placeholder rows so
//! the combined tables cover the whole project roster.
//!
//! Exit codes:
//!   0 - Success (at least one successful analysis, combined CSVs written)
//!   1 - Fatal (not launched under a project, no usable analyses anywhere,
//!       or a platform/request error)

mod aggregate;
mod cli;
mod client;
mod config;
mod models;
mod naming;
mod table;

use anyhow::{Context, Result};
use chrono::Utc;
use cli::Args;
use client::{ClientConfig, PlatformClient};
use config::GearInvocation;
use models::Project;
use regex::Regex;
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let invocation = match load_invocation(&args) {
        Ok(invocation) => invocation,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    init_logging(&args, &invocation);

    info!("fslong-aggregator v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args, invocation).await {
        Ok(code) => {
            if code == 0 {
                info!("fslong-aggregator successfully completed!");
            } else {
                info!("fslong-aggregator failed");
            }
            info!("fslong-aggregator returning {}", code);
            std::process::exit(code);
        }
        Err(e) => {
            error!("Aggregation failed: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Load the gear invocation document (explicit path, default location, or
/// empty when the CLI supplies everything).
fn load_invocation(args: &Args) -> Result<GearInvocation> {
    if let Some(ref path) = args.config {
        return GearInvocation::load(path);
    }

    match GearInvocation::load_default()? {
        Some(invocation) => Ok(invocation),
        None => Ok(GearInvocation::default()),
    }
}

/// Initialize logging from the verbosity flags, falling back to the
/// configured gear-log-level.
fn init_logging(args: &Args, invocation: &GearInvocation) {
    let level = args
        .log_level()
        .unwrap_or_else(|| invocation.config.log_level());

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the complete aggregation workflow. Returns the exit code (0 or 1).
async fn run(args: Args, mut invocation: GearInvocation) -> Result<i32> {
    let start_time = Instant::now();
    info!("Run started at {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));

    invocation.merge_with_args(&args);

    let gear_name = invocation
        .config
        .name_of_gear
        .clone()
        .context("name-of-gear is required (config file or --gear-name)")?;

    let destination = invocation.destination.clone().context(
        "destination is required (config file or --destination-id/--destination-type)",
    )?;

    let api_key = args
        .api_key
        .clone()
        .context("API key is required (--api-key or PLATFORM_API_KEY)")?;

    let client = PlatformClient::new(ClientConfig {
        base_url: args.api_url.clone(),
        api_key,
        timeout_seconds: args.timeout,
    })?;

    info!(
        "Destination: type = {}, id = {}",
        destination.container_type, destination.id
    );

    // Any failure here collapses into the fatal "not at project level"
    // outcome, per the gear contract.
    let project = match resolve_project(&client, &destination.id).await {
        Ok(project) => project,
        Err(e) => {
            error!("{:#}", e);
            info!("This gear must be run at the project level.");
            return Ok(1);
        }
    };
    info!("Project is \"{}\"", project.label);

    let analysis_regex = invocation
        .config
        .analysis_regex
        .as_deref()
        .filter(|pattern| !pattern.is_empty())
        .map(Regex::new)
        .transpose()
        .context("Invalid analysis-regex")?;

    let options = aggregate::AggregateOptions {
        gear_name,
        gear_version: invocation
            .config
            .version_of_gear
            .clone()
            .filter(|version| !version.is_empty()),
        analysis_regex,
        output_dir: args.output_dir.clone(),
    };

    let code = aggregate::run(&client, &project, &options, !args.quiet).await?;
    info!("Duration: {:.1}s", start_time.elapsed().as_secs_f64());
    Ok(code)
}

/// Resolve the destination container to its owning project.
async fn resolve_project(client: &PlatformClient, destination_id: &str) -> Result<Project> {
    let container = client
        .get_container(destination_id)
        .await
        .context("Failed to fetch the destination container")?;

    info!("Running at {} level", container.container_type);

    let project_id = container
        .parents
        .project
        .context("Destination container has no project ancestor")?;

    client
        .get_project(&project_id)
        .await
        .context("Failed to fetch the owning project")
}
