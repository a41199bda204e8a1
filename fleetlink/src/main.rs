/*!
fleetlink command-line entry point
*/

use std::path::PathBuf;
use std::time::Duration;

use clap::{Arg, ArgMatches, Command, value_parser};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fleetlink::core::{config::BridgeConfig, simulation::Simulation};

fn cli() -> Command {
    Command::new("fleetlink")
        .version(clap::crate_version!())
        .about("Digital-twin and teleoperation bridge between vehicles and a control center")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .help("Path to a TOML config file")
                .value_name("PATH")
                .value_parser(value_parser!(PathBuf))
                .global(true),
        )
        .subcommand(
            Command::new("simulate")
                .about("Run a control center and simulated vehicles on a local broker")
                .arg(
                    Arg::new("vehicles")
                        .short('n')
                        .long("vehicles")
                        .help("Number of simulated vehicles")
                        .value_name("COUNT")
                        .value_parser(value_parser!(usize)),
                )
                .arg(
                    Arg::new("hz")
                        .long("hz")
                        .help("State publish frequency (10-50 Hz)")
                        .value_name("HZ")
                        .value_parser(value_parser!(f64)),
                )
                .arg(
                    Arg::new("duration")
                        .short('d')
                        .long("duration")
                        .help("Stop after this many seconds instead of waiting for Ctrl-C")
                        .value_name("SECS")
                        .value_parser(value_parser!(u64)),
                ),
        )
        .subcommand(Command::new("print-config").about("Print the effective configuration as TOML"))
}

async fn load_config(matches: &ArgMatches) -> Result<BridgeConfig, Box<dyn std::error::Error>> {
    if let Some(path) = matches.get_one::<PathBuf>("config") {
        return Ok(BridgeConfig::load(path).await?);
    }
    match BridgeConfig::default_path() {
        Some(path) if path.exists() => {
            info!("Using config file {:?}", path);
            Ok(BridgeConfig::load(path).await?)
        }
        _ => Ok(BridgeConfig::default()),
    }
}

async fn simulate(
    mut config: BridgeConfig,
    matches: &ArgMatches,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(vehicles) = matches.get_one::<usize>("vehicles") {
        config.simulation.vehicles = *vehicles;
    }
    if let Some(hz) = matches.get_one::<f64>("hz") {
        config.vehicle.publish_hz = *hz;
    }
    let duration = matches.get_one::<u64>("duration").copied();

    let shutdown = async move {
        match duration {
            Some(secs) => {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
        info!("🛑 Shutdown");
    };

    let stats = Simulation::new(config).run(shutdown).await?;
    println!(
        "tracked {} vehicle(s): {} state(s) accepted, {} stale, {} rejected, {} alert(s) in {:.1}s",
        stats.vehicles_tracked,
        stats.states_accepted,
        stats.states_stale,
        stats.messages_rejected,
        stats.alerts_dispatched,
        stats.uptime.as_secs_f64()
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = cli().get_matches();
    let config = load_config(&matches).await?;

    match matches.subcommand() {
        Some(("simulate", sub)) => simulate(config, sub).await?,
        Some(("print-config", _)) => print!("{}", config.to_toml_string()?),
        _ => unreachable!("subcommand_required is set"),
    }

    Ok(())
}
