//! EV fleet simulator entry point: CLI wiring and episode construction.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ev_fleet_sim::config::ScenarioConfig;
use ev_fleet_sim::error::SimError;
use ev_fleet_sim::heuristics::{DispatchStrategy, StrategyKind};
use ev_fleet_sim::io::export::export_csv;
use ev_fleet_sim::model::{CandidateSolver, PowerTrackerModel};
use ev_fleet_sim::sim::engine::Engine;
use ev_fleet_sim::sim::episode::Episode;
use ev_fleet_sim::sim::kpi::KpiReport;
use ev_fleet_sim::sim::replay::EpisodeTrajectory;

/// Tolerance used when checking the simulated schedule against the reference model.
const REFERENCE_TOLERANCE: f64 = 1e-6;

#[derive(Parser)]
#[command(name = "ev-fleet-sim")]
#[command(version, about = "EV fleet charging simulator with transformer limits")]
#[command(
    long_about = "Simulates EV charging at stations behind shared transformers.\n\
    \nEpisodes come from a TOML scenario, a built-in preset or a saved replay.\n\
    If none is given, the baseline preset is used.\n\
    \nExamples:\n  \
    ev-fleet-sim --preset grid_constrained --strategy round_robin\n  \
    ev-fleet-sim --scenario city.toml --replay-out episode.json --lp-out model.lp\n  \
    ev-fleet-sim --replay episode.json --strategy charge_as_late_as_possible"
)]
struct Cli {
    /// Load scenario from a TOML config file
    #[arg(long, conflicts_with_all = ["preset", "replay"])]
    scenario: Option<PathBuf>,

    /// Use a built-in preset (baseline, grid_constrained, overnight)
    #[arg(long, conflicts_with = "replay")]
    preset: Option<String>,

    /// Re-simulate an episode saved with --replay-out
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Override the scenario's random seed
    #[arg(long)]
    seed: Option<u64>,

    /// Override the scenario's dispatch heuristic
    #[arg(long)]
    strategy: Option<StrategyKind>,

    /// Print one line per simulated step
    #[arg(long)]
    steps: bool,

    /// Export step results to CSV
    #[arg(long)]
    telemetry_out: Option<PathBuf>,

    /// Save the episode as a JSON replay
    #[arg(long)]
    replay_out: Option<PathBuf>,

    /// Write the reference model in CPLEX LP format
    #[arg(long)]
    lp_out: Option<PathBuf>,

    /// Check the simulated schedule against the reference model
    #[arg(long)]
    check_reference: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(SimError::InvalidConfig(errors)) => {
            for e in &errors {
                eprintln!("{e}");
            }
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), SimError> {
    let (mut engine, strategy_kind) = if let Some(path) = &cli.replay {
        let trajectory = EpisodeTrajectory::read_json(path)?;
        let engine = Engine::new(trajectory.sim_config(), Episode::from_trajectory(&trajectory)?)?;
        (engine, cli.strategy.unwrap_or_default())
    } else {
        let mut scenario = match (&cli.scenario, &cli.preset) {
            (Some(path), _) => ScenarioConfig::from_toml_file(path)?,
            (None, Some(name)) => ScenarioConfig::from_preset(name)?,
            (None, None) => ScenarioConfig::baseline(),
        };
        if let Some(seed) = cli.seed {
            scenario.simulation.seed = seed;
        }
        if let Some(kind) = cli.strategy {
            scenario.simulation.strategy = kind;
        }
        (Engine::from_scenario(&scenario)?, scenario.simulation.strategy)
    };

    let trajectory = EpisodeTrajectory::capture(&engine);
    let mut strategy = strategy_kind.build(engine.stations())?;
    info!(strategy = strategy.name(), steps = engine.config().simulation_length, "running");
    let results = engine.run(&mut strategy);
    let kpi = KpiReport::from_results(&results, engine.config().score_threshold);

    if cli.steps {
        for r in &results {
            println!("{r}");
        }
        println!();
    }
    println!("{kpi}");

    if let Some(path) = &cli.telemetry_out {
        export_csv(&results, path)?;
        eprintln!("Telemetry written to {}", path.display());
    }
    if let Some(path) = &cli.replay_out {
        trajectory.write_json(path)?;
        eprintln!("Replay written to {}", path.display());
    }

    if cli.lp_out.is_some() || cli.check_reference {
        let model = PowerTrackerModel::build(&trajectory)?;
        if let Some(path) = &cli.lp_out {
            let mut out = BufWriter::new(File::create(path)?);
            model.model().write_lp(&mut out)?;
            out.flush()?;
            eprintln!("Reference model written to {}", path.display());
        }
        if cli.check_reference {
            let candidate = model.assignment_from_results(&results)?;
            let solution = model.solve(&mut CandidateSolver::new(candidate, REFERENCE_TOLERANCE))?;
            println!(
                "Reference model check: {} (objective {:.3})",
                solution.status, solution.objective
            );
        }
    }
    Ok(())
}
