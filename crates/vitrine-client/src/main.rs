use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vitrine_client::mutations::operations;
use vitrine_client::simulator::{run_simulator, SimulatorConfig};
use vitrine_client::{ClientConfig, Deployment};
use vitrine_mutation::PersistedQueryMap;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .with_target(false)
        .init();

    let cli = Command::new("vitrine")
        .version(vitrine_client::VERSION)
        .about("Gallery client data layer tools")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("simulate")
                .about("Run random mutations against a scripted server and check the cache")
                .arg(
                    Arg::new("mutations")
                        .long("mutations")
                        .default_value("500")
                        .value_parser(value_parser!(u64))
                        .help("Number of mutations to simulate"),
                )
                .arg(
                    Arg::new("failure-rate")
                        .long("failure-rate")
                        .default_value("0.2")
                        .value_parser(value_parser!(f64))
                        .help("Probability that the server fails a mutation"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop simulation on first violation"),
                ),
        )
        .subcommand(
            Command::new("persisted")
                .about("Validate a persisted query map or look up one operation")
                .arg(
                    Arg::new("map")
                        .long("map")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Generated persisted query map (JSON)"),
                )
                .arg(
                    Arg::new("operation")
                        .long("operation")
                        .help("Print the persisted id of this operation"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Print the resolved configuration as TOML")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .value_parser(value_parser!(PathBuf))
                        .help("Config file to load"),
                )
                .arg(
                    Arg::new("environment")
                        .long("environment")
                        .value_parser(value_parser!(Deployment))
                        .help("Override the deployment (production, development, local)"),
                ),
        );

    let matches = cli.get_matches();

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let config = SimulatorConfig {
                seed: args.get_one::<u64>("seed").copied().unwrap_or(42),
                mutations: args.get_one::<u64>("mutations").copied().unwrap_or(500),
                failure_rate: args.get_one::<f64>("failure-rate").copied().unwrap_or(0.2),
                stop_on_first_violation: args.get_flag("stop-on-violation"),
            };
            if !(0.0..=1.0).contains(&config.failure_rate) {
                anyhow::bail!("--failure-rate must be between 0 and 1");
            }

            println!("Running mutation simulator...");
            println!("Mutations: {}", config.mutations);
            println!("Failure Rate: {}", config.failure_rate);
            println!("Seed: {}", config.seed);
            println!();

            let report = run_simulator(config).await;
            println!("{}", report.generate_text());
            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("persisted", args)) => {
            let path = args
                .get_one::<PathBuf>("map")
                .context("--map is required")?;
            let map = PersistedQueryMap::load(path)
                .with_context(|| format!("loading {}", path.display()))?;

            if let Some(operation) = args.get_one::<String>("operation") {
                match map.resolve(operation) {
                    Some(id) => println!("{id}"),
                    None => {
                        eprintln!("{operation} is not in {}", path.display());
                        std::process::exit(1);
                    }
                }
                return Ok(());
            }

            let missing: Vec<&str> = operations::ALL
                .iter()
                .map(|descriptor| descriptor.name)
                .filter(|name| map.resolve(name).is_none())
                .collect();
            println!("Persisted operations: {}", map.len());
            println!("Client operations: {}", operations::ALL.len());
            if missing.is_empty() {
                println!("Every client operation is persisted");
            } else {
                println!("Missing:");
                for name in &missing {
                    println!("  {name}");
                }
                std::process::exit(1);
            }
        }
        Some(("config", args)) => {
            let mut config = match args.get_one::<PathBuf>("file") {
                Some(path) => ClientConfig::load(path)?,
                None => ClientConfig::default(),
            };
            if let Some(environment) = args.get_one::<Deployment>("environment") {
                config = config.with_environment(*environment);
            }
            let resolved = config
                .clone()
                .with_graphql_url(config.graphql_url())
                .with_subscription_url(config.subscription_url());
            print!("{}", resolved.to_toml()?);
        }
        _ => unreachable!("subcommand_required"),
    }

    Ok(())
}
