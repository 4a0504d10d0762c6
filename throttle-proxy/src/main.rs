#![forbid(unsafe_code)]

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use throttle_proxy_lib::config::{load_from_path, validate, Config};
use throttle_proxy_lib::telemetry::{init_metrics, init_tracing, start_observability_server};
use throttle_proxy_lib::{proxy, CHUNK_SIZE};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Forward HTTP/CONNECT proxy with a process-wide bandwidth cap")]
struct Cli {
    /// Path to configuration TOML file (optional, built-in defaults otherwise)
    #[arg(short, long, value_name = "FILE", env = "THROTTLE_PROXY_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on, overrides `listen` from the config file
    #[arg(short, long)]
    port: Option<u16>,

    /// Limited bytes per second; values below 4096 disable limiting
    #[arg(short, long, value_name = "BYTES")]
    rate: Option<u64>,

    /// Seconds to back off when a burst exceeds the bucket
    #[arg(long, value_name = "SECS")]
    retry_after: Option<u64>,
}

fn build_config(cli: &Cli) -> throttle_proxy_lib::Result<Config> {
    let mut cfg = match &cli.config {
        Some(path) => load_from_path(path)?,
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        cfg.listen.set_port(port);
    }
    if let Some(rate) = cli.rate {
        cfg.limit.bytes_per_second = rate;
    }
    if let Some(secs) = cli.retry_after {
        cfg.limit.retry_after_secs = secs;
    }
    validate(&cfg).map_err(throttle_proxy_lib::ProxyError::Config)?;
    Ok(cfg)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let cfg = match build_config(&cli) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("failed to load configuration: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = init_tracing(&cfg.logging.level, cfg.logging.show_target) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(1);
    }

    info!(listen = %cfg.listen, config = ?cli.config, "configuration loaded");
    if !cfg.limit.to_rule().is_valid() {
        warn!(
            bytes_per_second = cfg.limit.bytes_per_second,
            minimum = CHUNK_SIZE,
            "limited bytes per second is below one chunk, bandwidth limiting disabled"
        );
    }

    let observability = CancellationToken::new();
    let metrics = match cfg.telemetry.metrics_port {
        Some(port) => match init_metrics() {
            Ok((metrics, registry)) => {
                let token = observability.clone();
                tokio::spawn(async move {
                    if let Err(err) = start_observability_server(port, registry, token).await {
                        error!(%err, "observability server exited with error");
                    }
                });
                Some(metrics)
            }
            Err(err) => {
                error!(%err, "failed to initialize metrics");
                std::process::exit(1);
            }
        },
        None => None,
    };

    let result = proxy::run(Arc::new(cfg), metrics).await;
    observability.cancel();

    if let Err(err) = result {
        error!(%err, "proxy exited with error");
        std::process::exit(1);
    }
}
