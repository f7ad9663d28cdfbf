//! Live monitor of Sui validator checkpoint attestation.

use clap::{value_parser, Arg, ArgAction, Command};
use prometheus_client::registry::Registry;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use suiwatch::{
    committee::Loader,
    engine::Engine,
    metrics::{self, Metrics},
    rpc::{Client, HttpEventSource, PollerConfig},
    sinks::{Dashboard, DatasetSink, ReportSink, Sink},
    subscriber::{self, Subscriber},
};
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

const DEFAULT_RPC_URL: &str = "https://fullnode.mainnet.sui.io:443";
const RPC_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_BUFFER: usize = 256;

#[tokio::main]
async fn main() {
    let default_url =
        std::env::var("SUI_JSON_RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());
    let matches = Command::new("suiwatch")
        .about("Track Sui validator checkpoint attestation and uptime in near real time")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("rpc-url")
                .long("rpc-url")
                .value_parser(value_parser!(String))
                .default_value(default_url)
                .help("Fullnode JSON-RPC endpoint (also via SUI_JSON_RPC_URL)"),
        )
        .arg(
            Arg::new("plain")
                .long("plain")
                .action(ArgAction::SetTrue)
                .help("Print plain-text reports instead of the dashboard"),
        )
        .arg(
            Arg::new("dataset")
                .long("dataset")
                .value_parser(value_parser!(String))
                .help("Directory for per-epoch signature dataset export"),
        )
        .arg(
            Arg::new("metrics")
                .long("metrics")
                .value_parser(value_parser!(SocketAddr))
                .help("Address to serve Prometheus metrics on (e.g. 127.0.0.1:9184)"),
        )
        .arg(
            Arg::new("retry-delay-ms")
                .long("retry-delay-ms")
                .value_parser(value_parser!(u64))
                .default_value("1000")
                .help("Delay between stream reconnect attempts"),
        )
        .arg(
            Arg::new("poll-interval-ms")
                .long("poll-interval-ms")
                .value_parser(value_parser!(u64))
                .default_value("500")
                .help("Delay between checkpoint polls at the live head"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_parser(value_parser!(String))
                .default_value("info"),
        )
        .get_matches();

    let level = matches
        .get_one::<String>("log-level")
        .expect("log-level has a default")
        .parse::<tracing::Level>()
        .expect("invalid log level");
    // Logs go to stderr so they cannot corrupt the dashboard or reports.
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let url = matches
        .get_one::<String>("rpc-url")
        .expect("rpc-url has a default")
        .clone();
    let plain = matches.get_flag("plain");
    let dataset_dir = matches.get_one::<String>("dataset").cloned();
    let metrics_addr = matches.get_one::<SocketAddr>("metrics").copied();
    let retry_delay =
        Duration::from_millis(*matches.get_one::<u64>("retry-delay-ms").expect("has a default"));
    let poll_interval = Duration::from_millis(
        *matches.get_one::<u64>("poll-interval-ms").expect("has a default"),
    );

    let mut registry = Registry::default();
    let metrics = Metrics::register(&mut registry);

    let client = match Client::new(url.clone(), RPC_TIMEOUT) {
        Ok(client) => client,
        Err(err) => {
            error!(%err, "failed to build rpc client");
            std::process::exit(1);
        }
    };

    info!(url = %url, "loading initial committee");
    let loader = Loader::new(client.clone());
    let initial = match loader.load(None).await {
        Ok((committee, epoch)) => {
            info!(epoch, validators = committee.len(), "initial committee loaded");
            committee
        }
        Err(err) => {
            error!(%err, "failed to load initial committee");
            std::process::exit(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                let _ = shutdown_tx.send(true);
            }
        });
    }

    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    let mut dashboard = None;
    if plain {
        sinks.push(Box::new(ReportSink::stdout()));
    } else {
        let (sink, render) = Dashboard::new();
        sinks.push(Box::new(sink));
        dashboard = Some(render);
    }
    if let Some(dir) = dataset_dir {
        match DatasetSink::new(&dir) {
            Ok(sink) => sinks.push(Box::new(sink)),
            Err(err) => {
                error!(%err, dir = %dir, "failed to create dataset directory");
                std::process::exit(1);
            }
        }
    }

    if let Some(addr) = metrics_addr {
        let registry = Arc::new(registry);
        let shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(err) = metrics::serve(registry, addr, shutdown_rx).await {
                warn!(%err, "metrics server failed");
            }
        });
    }

    let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
    let source = HttpEventSource::new(client, PollerConfig { poll_interval });
    let subscriber = Subscriber::new(
        source,
        subscriber::Config { retry_delay },
        metrics.clone(),
    );
    tokio::spawn(subscriber.run(events_tx, shutdown_rx.clone()));

    let dashboard_handle = dashboard.map(|render| {
        let shutdown_tx = shutdown_tx.clone();
        tokio::spawn(render.run(shutdown_tx))
    });

    let engine = Engine::new(loader, initial, sinks, metrics);
    let result = engine.run(events_rx, shutdown_rx).await;

    // Stop the remaining tasks and wait for the dashboard to restore the
    // terminal before printing anything.
    let _ = shutdown_tx.send(true);
    if let Some(handle) = dashboard_handle {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(%err, "dashboard failed"),
            Err(err) => warn!(%err, "dashboard task panicked"),
        }
    }

    if let Err(fatal) = result {
        error!(%fatal, "aborting");
        std::process::exit(1);
    }
    info!("shutdown complete");
}
