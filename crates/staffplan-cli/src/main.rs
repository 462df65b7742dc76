//! staffplan CLI - Staff schedule optimization
//!
//! Usage:
//!   staffplan check <snapshot.json>               Validate and report model size
//!   staffplan solve <snapshot.json> [options]     Generate a schedule
//!   staffplan diagnose <snapshot.json>            Explain why a snapshot is infeasible
//!
//! Exit codes:
//!   0  success
//!   1  error (bad input, invalid rules, solver failure)
//!   2  no feasible schedule exists
//!   3  budget exhausted before a schedule or feasibility was proven

mod report;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use staffplan_core::{
    DemandSeries, EngineConfig, HourlyDemand, ScheduleError, SchedulingMode, Snapshot,
};
use staffplan_solver::{build, compose, Engine, Plan};

/// Exit code when the snapshot admits no schedule
const EXIT_INFEASIBLE: i32 = 2;
/// Exit code when the budget ran out
const EXIT_TIMEOUT: i32 = 3;

#[derive(Parser)]
#[command(name = "staffplan")]
#[command(author, version, about = "Staff schedule optimization engine", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a snapshot and report the size of its model
    Check {
        /// Snapshot file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Generate a schedule
    Solve {
        /// Snapshot file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Engine configuration (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Wall-clock budget in milliseconds, overriding the configuration
        #[arg(short, long, value_name = "MS")]
        budget_ms: Option<u64>,

        /// Hourly demand records (JSON) replacing the snapshot's demand grid
        #[arg(short, long, value_name = "FILE")]
        demand: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run feasibility diagnostics without optimizing
    Diagnose {
        /// Snapshot file (JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Engine configuration (TOML)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let code = match cli.command {
        Commands::Check { file } => cmd_check(&file)?,
        Commands::Solve {
            file,
            config,
            budget_ms,
            demand,
            format,
            output,
        } => cmd_solve(
            &file,
            config.as_deref(),
            budget_ms,
            demand.as_deref(),
            format,
            output.as_deref(),
        )?,
        Commands::Diagnose {
            file,
            config,
            format,
        } => cmd_diagnose(&file, config.as_deref(), format)?,
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

/// RUST_LOG wins when set; otherwise `-v` raises the level from warn
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_snapshot(path: &Path) -> Result<Snapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot: {}", path.display()))?;
    let snapshot: Snapshot = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse snapshot: {}", path.display()))?;
    debug!(
        organization = %snapshot.organization,
        employees = snapshot.employees.len(),
        roles = snapshot.roles.len(),
        "loaded snapshot"
    );
    Ok(snapshot)
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load configuration: {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn load_hourly_demand(path: &Path, snapshot: &Snapshot) -> Result<DemandSeries> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read demand: {}", path.display()))?;
    let records: Vec<HourlyDemand> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse demand: {}", path.display()))?;
    Ok(DemandSeries::from_hourly(
        &snapshot.organization,
        &records,
        &snapshot.horizon,
        snapshot.rules.slot_hours,
    ))
}

fn write_output(content: &str, output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write output: {}", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => print!("{content}"),
    }
    Ok(())
}

fn cmd_check(file: &Path) -> Result<i32> {
    let snapshot = load_snapshot(file)?;
    let mode = SchedulingMode::from_rules(&snapshot.rules).context("Invalid rules")?;
    let plan = Plan::derive(&snapshot, &mode).context("Invalid snapshot")?;
    let mut built = build(&plan);
    let _objective = compose(&mut built, &plan, &EngineConfig::default().weights);

    print!("{}", report::render_check(&snapshot, &mode, &built.model.stats()));
    Ok(0)
}

fn cmd_solve(
    file: &Path,
    config: Option<&Path>,
    budget_ms: Option<u64>,
    demand: Option<&Path>,
    format: Format,
    output: Option<&Path>,
) -> Result<i32> {
    let mut snapshot = load_snapshot(file)?;
    let config = load_config(config)?;
    if let Some(path) = demand {
        snapshot.demand = load_hourly_demand(path, &snapshot)?;
    }
    let mode = SchedulingMode::from_rules(&snapshot.rules).context("Invalid rules")?;
    let budget = budget_ms.map_or_else(|| config.time_budget(), Duration::from_millis);
    let weights = config.weights;
    let engine = Engine::new().with_config(config);

    match engine.generate_schedule(&snapshot, &mode, &weights, budget) {
        Ok(schedule) => {
            let content = match format {
                Format::Text => report::render_schedule(&schedule),
                Format::Json => to_json(&schedule)?,
            };
            write_output(&content, output)?;
            Ok(0)
        }
        Err(ScheduleError::Infeasible { diagnosis }) => {
            let content = match format {
                Format::Text => report::render_diagnosis(&diagnosis),
                Format::Json => to_json(&diagnosis)?,
            };
            write_output(&content, output)?;
            Ok(EXIT_INFEASIBLE)
        }
        Err(ScheduleError::SolverTimeout { best, gap }) => {
            let content = match (format, best) {
                (Format::Text, best) => report::render_timeout(best.as_deref(), gap),
                (Format::Json, best) => to_json(&serde_json::json!({
                    "status": "TIMEOUT",
                    "gap": gap,
                    "best": best,
                }))?,
            };
            write_output(&content, output)?;
            Ok(EXIT_TIMEOUT)
        }
        Err(err) => Err(err).context("Failed to generate schedule"),
    }
}

fn cmd_diagnose(file: &Path, config: Option<&Path>, format: Format) -> Result<i32> {
    let snapshot = load_snapshot(file)?;
    let config = load_config(config)?;
    let mode = SchedulingMode::from_rules(&snapshot.rules).context("Invalid rules")?;
    let engine = Engine::new().with_config(config);

    let diagnosis = match engine.diagnose(&snapshot, &mode) {
        Ok(diagnosis) => diagnosis,
        Err(ScheduleError::SolverTimeout { .. }) => {
            let content: String = match format {
                Format::Text => "Undecided: the budget ran out before feasibility was settled\n".into(),
                Format::Json => to_json(&serde_json::json!({ "status": "TIMEOUT" }))?,
            };
            print!("{content}");
            return Ok(EXIT_TIMEOUT);
        }
        Err(err) => return Err(err).context("Failed to run diagnostics"),
    };
    let code = if diagnosis.is_some() { EXIT_INFEASIBLE } else { 0 };
    let content = match (format, diagnosis) {
        (Format::Text, Some(diagnosis)) => report::render_diagnosis(&diagnosis),
        (Format::Text, None) => "Feasible: a schedule satisfying every hard rule exists\n".into(),
        (Format::Json, diagnosis) => to_json(&serde_json::json!({
            "feasible": diagnosis.is_none(),
            "diagnosis": diagnosis,
        }))?,
    };
    print!("{content}");
    Ok(code)
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    json.push('\n');
    Ok(json)
}
