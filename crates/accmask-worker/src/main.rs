//! Mask optimization worker binary.

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use accmask_worker::metrics::{init_metrics, metrics_port_from_env};
use accmask_worker::{MaskProcessor, RunConfig};

#[tokio::main]
async fn main() {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let mut env_filter = EnvFilter::from_default_env();
    for directive in ["accmask=info", "ort=warn", "onnxruntime=warn"] {
        match directive.parse() {
            Ok(d) => env_filter = env_filter.add_directive(d),
            Err(e) => eprintln!("Invalid log directive {}: {}", directive, e),
        }
    }

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting accmask-worker");

    if let Some(port) = metrics_port_from_env() {
        if let Err(e) = init_metrics(port) {
            warn!("Metrics disabled: {:#}", e);
        }
    }

    let config = match RunConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!("Run config: {:?}", config);

    let processor = MaskProcessor::new(config);
    tokio::select! {
        result = processor.run() => match result {
            Ok(summary) => match serde_json::to_string(&summary) {
                Ok(json) => info!(summary = %json, "Run finished"),
                Err(_) => info!(?summary, "Run finished"),
            },
            Err(e) => {
                error!(input_error = e.is_input_error(), "Run failed: {}", e);
                std::process::exit(1);
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, no ROI file written");
            std::process::exit(130);
        }
    }
}
