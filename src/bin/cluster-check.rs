//! Probe a Postgres primary/replica cluster and print its health.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use sql_cluster::config::{load_config, ClusterConfig};
use sql_cluster::driver::postgres::connect_all;
use sql_cluster::observability::{logging, metrics};
use sql_cluster::{Cluster, ClusterHealth};

#[derive(Parser)]
#[command(name = "cluster-check")]
#[command(about = "Report liveness of a primary/replica SQL cluster", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "cluster.toml")]
    config: PathBuf,

    /// Keep running and print health every N seconds
    #[arg(short, long, value_name = "SECS")]
    watch: Option<u64>,

    /// Compact JSON output
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let file = load_config(&cli.config)?;

    if let Err(e) = logging::init(&file.observability.log_level) {
        eprintln!("logging already initialized: {}", e);
    }

    if file.observability.metrics_enabled {
        let addr = file.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let (primary, replicas) = connect_all(
        &file.endpoints.primary,
        &file.endpoints.replicas,
        file.endpoints.max_sessions,
    )?;

    let cluster = Cluster::new(ClusterConfig {
        primary,
        replicas,
        settings: file.cluster,
    })
    .await?;

    match cli.watch {
        None => print_health(cluster.health(), cli.compact)?,
        Some(secs) => {
            let mut ticker = tokio::time::interval(Duration::from_secs(secs.max(1)));
            loop {
                tokio::select! {
                    _ = ticker.tick() => print_health(cluster.health(), cli.compact)?,
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Interrupted");
                        break;
                    }
                }
            }
        }
    }

    cluster.shutdown().await;
    Ok(())
}

fn print_health(health: ClusterHealth, compact: bool) -> serde_json::Result<()> {
    let out = if compact {
        serde_json::to_string(&health)?
    } else {
        serde_json::to_string_pretty(&health)?
    };
    println!("{}", out);
    Ok(())
}
