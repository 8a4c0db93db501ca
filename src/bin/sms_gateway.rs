use anyhow::{Context, Result};
use clap::Parser;
use sms_teltonika::TeltonikaConnector;
use sms_web_axum::{AppState, router};
use sms_web_generic::GatewayProcessor;
use smsgate::config::{AppConfig, Overrides};
use smsgate::logging::init_logging;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "sms-gateway")]
#[command(author, version, about = "HTTP gateway that sends SMS through a Teltonika router")]
struct Args {
    /// Path to config file (default: ./config.yaml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen address (default: 0.0.0.0)
    #[arg(long)]
    host: Option<String>,

    /// Listen port (default: 8000)
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(&Overrides {
        config_path: args.config.clone(),
        host: args.host.clone(),
        port: args.port,
        ..Overrides::default()
    })
    .context("loading configuration")?;

    init_logging(&config.logging)?;

    let processor = match config.router.settings() {
        Ok(settings) => {
            info!(router = %settings.base_url(), user = %settings.username, "router configured");
            GatewayProcessor::new(Arc::new(TeltonikaConnector::new(settings)))
        }
        Err(e) => {
            warn!(error = %e, "router not configured, SMS requests will fail");
            GatewayProcessor::unconfigured()
        }
    }
    .with_split(config.split_options())
    .with_fallback_modem(config.router.default_modem.clone());

    let app = router(AppState::new(processor));

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        %addr,
        "starting SMS gateway"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("SMS gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "could not listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
