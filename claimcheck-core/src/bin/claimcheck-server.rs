//! HTTP server for the claimcheck analysis pipeline.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use claimcheck_core::{router, Config, Provider};

#[derive(Debug, Parser)]
#[command(name = "claimcheck-server", version, about = "Analyze text for misinformation over HTTP")]
struct Args {
    /// Address to bind (overrides CLAIMCHECK_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on (overrides CLAIMCHECK_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// LLM provider: gemini, anthropic or openai (overrides CLAIMCHECK_PROVIDER)
    #[arg(long)]
    provider: Option<Provider>,

    /// Model id (overrides CLAIMCHECK_MODEL)
    #[arg(long)]
    model: Option<String>,

    /// Sampling temperature (overrides CLAIMCHECK_TEMPERATURE)
    #[arg(long)]
    temperature: Option<f64>,
}

impl Args {
    fn apply(self, mut config: Config) -> Config {
        if let Some(host) = self.host {
            config = config.with_host(host);
        }
        if let Some(port) = self.port {
            config = config.with_port(port);
        }
        if let Some(provider) = self.provider {
            config = config.with_provider(provider);
        }
        if let Some(model) = self.model {
            config = config.with_model(model);
        }
        if let Some(temperature) = self.temperature {
            config = config.with_temperature(temperature);
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = args.apply(Config::from_env()?);
    let pipeline = config
        .build_pipeline()
        .context("failed to set up the analysis pipeline")?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", config.host, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(
        %addr,
        provider = %config.provider,
        model = %config.model_id(),
        "claimcheck server listening"
    );

    axum::serve(listener, router(Arc::new(pipeline)))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
