//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use harvester_core::{RunReport, Scheduler};
use harvester_shared::{
    AppConfig, InputSource, TransformStep, init_config, load_config, load_config_from,
};
use harvester_transform::Transform;
use tokio::sync::watch;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Harvester: fetch, transform, and dispatch web data on a schedule.
#[derive(Parser)]
#[command(
    name = "harvester",
    version,
    about = "Fetch web data on a schedule, reshape it, and ship it to metrics stores.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.harvester/harvester.toml).
    #[arg(short, long, env = "HARVESTER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Schedule all autostarted jobs until interrupted.
    Run,

    /// Run a single tick of one job and print its report.
    Once {
        /// Job name as declared under `[jobs.<name>]`.
        job: String,
    },

    /// Validate the config: jobs, destinations, and transform options.
    Check,

    /// List configured jobs.
    Jobs,

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "harvester=info",
        1 => "harvester=debug",
        _ => "harvester=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so console destination output stays machine-readable.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Run => cmd_run(config_path).await,
        Command::Once { job } => cmd_once(config_path, &job).await,
        Command::Check => cmd_check(config_path).await,
        Command::Jobs => cmd_jobs(config_path).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn load(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(path: Option<&Path>) -> Result<()> {
    let config = load(path)?;
    let scheduler = Scheduler::from_config(&config)?;

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("interrupt received, stopping scheduler"),
            Err(e) => warn!(error = %e, "cannot listen for interrupt, stopping scheduler"),
        }
        let _ = tx.send(true);
    });

    scheduler.run(rx).await?;
    Ok(())
}

async fn cmd_once(path: Option<&Path>, name: &str) -> Result<()> {
    let config = load(path)?;
    let scheduler = Scheduler::from_config(&config)?;
    let job = scheduler
        .job(name)
        .ok_or_else(|| eyre!("no job named '{name}' (see `harvester jobs`)"))?;

    let report = job.run().await?;
    print_report(&report)?;

    if !report.all_delivered() {
        return Err(eyre!("one or more outputs were not delivered"));
    }
    Ok(())
}

fn print_report(report: &RunReport) -> Result<()> {
    eprintln!(
        "job '{}' run {} finished in {:?}",
        report.job, report.run_id, report.elapsed
    );
    for miss in &report.input_misses {
        eprintln!("  input step #{} '{}': '{}' matched nothing", miss.index, miss.name, miss.path);
    }
    for outcome in &report.outputs {
        let status = if outcome.success { "ok" } else { "FAILED" };
        match &outcome.error {
            Some(error) => eprintln!(
                "  output #{} -> {}: {status} ({error})",
                outcome.index, outcome.destination
            ),
            None => eprintln!("  output #{} -> {}: {status}", outcome.index, outcome.destination),
        }
    }
    println!("{}", serde_json::to_string_pretty(&report.payload)?);
    Ok(())
}

async fn cmd_check(path: Option<&Path>) -> Result<()> {
    let config = load(path)?;
    let problems = check_config(&config);

    if problems.is_empty() {
        println!(
            "config ok: {} job(s), {} destination(s)",
            config.jobs.len(),
            config.destinations.len()
        );
        return Ok(());
    }

    for problem in &problems {
        println!("error: {problem}");
    }
    Err(eyre!("{} problem(s) found", problems.len()))
}

/// Everything that would fail at startup or on the first tick.
fn check_config(config: &AppConfig) -> Vec<String> {
    let mut problems = Vec::new();

    if let Err(e) = Scheduler::from_config(config) {
        problems.push(e.to_string());
    }

    for (name, job) in &config.jobs {
        for output in &job.outputs {
            if !config.destinations.contains_key(&output.to) {
                problems.push(format!(
                    "jobs.{name}: output refers to unknown destination '{}'",
                    output.to
                ));
            }
        }

        let mut chains: Vec<(String, &[TransformStep])> =
            vec![(format!("jobs.{name}.input"), job.input.transforms.as_slice())];
        if let Some(merge) = &job.input.merge {
            chains.push((format!("jobs.{name}.input.merge"), merge.transforms.as_slice()));
        }
        for (i, output) in job.outputs.iter().enumerate() {
            chains.push((format!("jobs.{name}.outputs[{i}]"), output.transforms.as_slice()));
        }

        for (scope, steps) in chains {
            for (index, step) in steps.iter().enumerate() {
                if let Err(e) = Transform::from_name(&step.name, &step.options) {
                    problems.push(format!("{scope}[{index}] '{}': {e}", step.name));
                }
            }
        }
    }

    problems
}

async fn cmd_jobs(path: Option<&Path>) -> Result<()> {
    let config = load(path)?;
    if config.jobs.is_empty() {
        println!("no jobs configured");
        return Ok(());
    }

    for (name, job) in &config.jobs {
        let input = match job.input.source() {
            Ok(InputSource::Single(request)) => format!("{} {}", request.method, request.url),
            Ok(InputSource::Merge(merge)) => format!("merge of {} requests", merge.requests.len()),
            Err(e) => format!("invalid input: {e}"),
        };
        let outputs: Vec<&str> = job.outputs.iter().map(|o| o.to.as_str()).collect();
        println!(
            "{name}\n  schedule: {} ({}){}{}\n  input:    {input}\n  outputs:  {}",
            job.schedule.cron,
            job.schedule.timezone.as_deref().unwrap_or("UTC"),
            if job.schedule.run_on_init { ", run on init" } else { "" },
            if job.autostart { "" } else { ", manual" },
            outputs.join(", ")
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = load(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
