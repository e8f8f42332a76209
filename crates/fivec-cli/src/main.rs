//! `fivec-lease`: operator CLI for the task lease manager

mod scenario;
mod simulate;

use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use fivec_core::LeaseConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::scenario::run_scenarios;
use crate::simulate::{run_simulator, SimulatorConfig};

fn cli() -> Command {
    Command::new("fivec-lease")
        .version(fivec_core::VERSION)
        .about("5C Workspace task lease manager")
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Path to a TOML lease configuration"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .global(true)
                .default_value("info")
                .help("Log filter used when RUST_LOG is unset"),
        )
        .subcommand(
            Command::new("scenario")
                .about("Replay the reference lease scenarios")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run a lease contention simulation")
                .arg(
                    Arg::new("tasks")
                        .long("tasks")
                        .default_value("4")
                        .value_parser(value_parser!(usize))
                        .help("Number of contended tasks"),
                )
                .arg(
                    Arg::new("actors")
                        .long("actors")
                        .default_value("16")
                        .value_parser(value_parser!(usize))
                        .help("Number of concurrent actors"),
                )
                .arg(
                    Arg::new("rounds")
                        .long("rounds")
                        .default_value("200")
                        .value_parser(value_parser!(usize))
                        .help("Acquire attempts per actor"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective configuration as TOML")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .value_parser(value_parser!(PathBuf))
                        .help("Configuration file to inspect instead of --config"),
                ),
        )
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<LeaseConfig> {
    match path {
        Some(path) => LeaseConfig::from_path(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(LeaseConfig::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let level = matches
        .get_one::<String>("log-level")
        .map_or("info", String::as_str);
    init_tracing(level);

    let config_path = matches.get_one::<PathBuf>("config").map(PathBuf::as_path);

    match matches.subcommand() {
        Some(("scenario", args)) => scenario(args, load_config(config_path)?).await,
        Some(("simulate", args)) => simulate(args, load_config(config_path)?).await,
        Some(("config", args)) => {
            let path = args
                .get_one::<PathBuf>("file")
                .map(PathBuf::as_path)
                .or(config_path);
            let config = load_config(path)?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        _ => {
            cli().print_help()?;
            Ok(())
        }
    }
}

async fn scenario(args: &ArgMatches, config: LeaseConfig) -> anyhow::Result<()> {
    let results = run_scenarios(&config).await?;
    let passed = results.iter().all(|r| r.passed);

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for r in &results {
            let mark = if r.passed { "ok" } else { "FAILED" };
            println!("{:<20} {:<7} {}", r.name, mark, r.detail);
        }
    }

    if !passed {
        std::process::exit(1);
    }
    Ok(())
}

async fn simulate(args: &ArgMatches, lease: LeaseConfig) -> anyhow::Result<()> {
    let config = SimulatorConfig {
        seed: args.get_one::<u64>("seed").copied().unwrap_or(42),
        tasks: args.get_one::<usize>("tasks").copied().unwrap_or(4),
        actors: args.get_one::<usize>("actors").copied().unwrap_or(16),
        rounds: args.get_one::<usize>("rounds").copied().unwrap_or(200),
    };

    tracing::info!(
        "Simulating {} actors over {} tasks for {} rounds (seed {})",
        config.actors,
        config.tasks,
        config.rounds,
        config.seed
    );
    let report = run_simulator(config, lease).await?;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.generate_text());
    }

    if !report.passed() {
        std::process::exit(1);
    }
    Ok(())
}
