//! `hivewatcher` binary: parse the command line, connect, and supervise the watcher

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info, Level};

use podping_watcher::clock::SystemClock;
use podping_watcher::{Args, HiveClient, RestartPolicy, Sinks, Supervisor, Watcher, WatcherConfig};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .with_target(false)
        .init();

    let config = match WatcherConfig::from_args(&args, Utc::now()) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return ExitCode::from(2);
        }
    };

    if config.reports_enabled() {
        info!("Starting podping watcher version: {}", env!("CARGO_PKG_VERSION"));
        if config.test_node {
            info!("---------------> Using Test Node {}", config.node_url);
        } else {
            info!("---------------> Using Main Hive Chain {}", config.node_url);
        }
    }

    let client = match HiveClient::new(config.node_url.clone()) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create Hive client: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let sinks = match Sinks::from_targets(&config.sinks).await {
        Ok(sinks) => sinks,
        Err(e) => {
            error!("Failed to open url sink: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let watcher = Watcher::new(config, client.clone(), client, Arc::new(SystemClock), sinks);
    let mut supervisor = Supervisor::new(watcher, RestartPolicy::default());

    let exit = supervisor
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    info!("Total pings relayed: {}", supervisor.watcher().stats().total_pings());
    ExitCode::from(exit.code())
}
