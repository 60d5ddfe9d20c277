//! Command-line entry point for the snapcheck harness.
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use snapcheck_common::{
    EndpointProbe, Harness, ScenarioSuite, SessionManager, SuiteReport, TargetConfig, init_logging,
    schema,
};

#[derive(Parser)]
#[command(
    name = "snapcheck",
    about = "Configuration verification for snap-packaged services",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit log events as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configuration suite against the installed snap
    Run {
        /// Only run cases whose id contains this substring
        #[arg(long)]
        filter: Option<String>,

        /// List the selected case ids without running anything
        #[arg(long)]
        list: bool,

        /// Print the suite report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Check the metrics endpoint once and print the HTTP status
    Probe {
        /// URL to probe (defaults to the configured endpoint)
        url: Option<String>,
    },

    /// Print the key schema the suite is derived from
    Schema {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify the machine has everything a suite run needs
    Doctor,

    /// Install the snap from a local file and bring the service up
    Up {
        /// Path to the .snap file to install
        snap_file: PathBuf,
    },

    /// Remove the snap and the session files
    Down,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Run { filter, list, json } => run_suite(filter.as_deref(), list, json),
        Commands::Probe { url } => probe(url.as_deref()),
        Commands::Schema { json } => print_schema(json),
        Commands::Doctor => doctor(),
        Commands::Up { snap_file } => up(&snap_file),
        Commands::Down => down(),
    }
}

fn run_suite(filter: Option<&str>, list: bool, json: bool) -> Result<ExitCode> {
    let config = TargetConfig::load()?;
    let harness = Harness::new(config);
    let suite = match filter {
        Some(f) => ScenarioSuite::filtered(&harness, f),
        None => ScenarioSuite::new(&harness),
    };
    if suite.is_empty() {
        anyhow::bail!("no case matches the filter");
    }

    if list {
        for id in suite.case_ids() {
            println!("{id}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    info!(snap = %harness.config().snap, cases = suite.case_ids().len(), "starting suite");
    let report = suite.run();
    if json {
        println!("{}", report.to_json_pretty()?);
    } else {
        print_summary(&report);
    }
    Ok(if report.all_passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_summary(report: &SuiteReport) {
    for outcome in &report.outcomes {
        let verdict = if outcome.passed { "pass" } else { "FAIL" };
        let secs = outcome.duration_ms as f64 / 1000.0;
        match &outcome.error {
            Some(error) => println!("{verdict}  {}  ({secs:.1}s)  {error}", outcome.id),
            None => println!("{verdict}  {}  ({secs:.1}s)", outcome.id),
        }
    }
    let elapsed = report
        .finished_at
        .signed_duration_since(report.started_at)
        .num_seconds();
    let halted = if report.halted {
        ", halted after a failed revert"
    } else {
        ""
    };
    println!();
    println!(
        "{} cases planned, {} passed, {} failed{halted} ({elapsed}s)",
        report.total, report.passed, report.failed
    );
}

fn probe(url: Option<&str>) -> Result<ExitCode> {
    let config = TargetConfig::load()?;
    let target = url.unwrap_or(&config.endpoint).to_string();
    let probe = EndpointProbe::new(config.budgets.endpoint_policy());
    match probe.check(&target) {
        Ok(status) => {
            println!("{target} {status}");
            Ok(if status == 200 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Err(err) => {
            eprintln!("{target} unreachable: {err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_schema(json: bool) -> Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(schema::KEYS)?);
    } else {
        for spec in schema::KEYS {
            let kind = format!("{:?}", spec.kind).to_lowercase();
            match spec.invalid {
                Some(bad) => println!(
                    "{:<40} {kind:<12} valid={:<32} invalid={bad}",
                    spec.name, spec.valid
                ),
                None => println!("{:<40} {kind:<12} valid={}", spec.name, spec.valid),
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn doctor() -> Result<ExitCode> {
    let config = TargetConfig::load()?;
    let harness = Harness::new(config);
    let mut healthy = true;

    // Exercising snap and systemctl through the runner also proves that
    // passwordless sudo works.
    let tools: &[(&str, &[&str])] = &[
        ("snap", &["version"]),
        ("systemctl", &["--version"]),
        ("lsof", &["-v"]),
        ("ps", &["--version"]),
    ];
    for (program, args) in tools {
        let label = format!("{program} {}", args.join(" "));
        match harness.runner().run(program, args) {
            Ok(out) if out.success() => println!("{label:<24} ok"),
            Ok(out) => {
                println!("{label:<24} exit {}", out.exit_code);
                healthy = false;
            }
            Err(err) => {
                println!("{label:<24} {err}");
                healthy = false;
            }
        }
    }

    match harness.service().is_active() {
        Ok(true) => println!("{:<24} active", harness.config().unit()),
        Ok(false) => {
            println!("{:<24} inactive", harness.config().unit());
            healthy = false;
        }
        Err(err) => {
            println!("{:<24} {err}", harness.config().unit());
            healthy = false;
        }
    }

    match harness.probe().check(&harness.config().endpoint) {
        Ok(status) => {
            println!("{:<24} {status}", harness.config().endpoint);
            if status != 200 {
                healthy = false;
            }
        }
        Err(err) => {
            println!("{:<24} {err}", harness.config().endpoint);
            healthy = false;
        }
    }

    Ok(if healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn up(snap_file: &Path) -> Result<ExitCode> {
    let config = TargetConfig::load()?;
    let harness = Harness::new(config);
    let session = SessionManager::new(&harness);
    info!(file = %snap_file.display(), "installing snap");
    session.provision(snap_file)?;
    session.await_ready()?;
    println!(
        "{} is up, endpoint {}",
        harness.config().snap,
        harness.config().endpoint
    );
    Ok(ExitCode::SUCCESS)
}

fn down() -> Result<ExitCode> {
    let config = TargetConfig::load()?;
    let harness = Harness::new(config);
    info!(snap = %harness.config().snap, "removing snap");
    SessionManager::new(&harness).teardown()?;
    println!("session removed");
    Ok(ExitCode::SUCCESS)
}
