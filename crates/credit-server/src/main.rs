mod routes;

use anyhow::Context;
use clap::Parser;
use credit_core::{config::Config, pipeline::AppCore};
use metrics_exporter_prometheus::PrometheusBuilder;
use routes::{router, AppState};
use std::{path::PathBuf, sync::Arc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Credit-risk scoring server.
#[derive(Debug, Parser)]
#[command(name = "credit-server", version)]
struct Args {
    /// JSON config file; flags and env vars override its values
    #[arg(long, env = "CREDIT_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "CREDIT_BIND_ADDR")]
    bind_addr: Option<String>,

    /// e.g. models:/credit_scoring/latest
    #[arg(long, env = "CREDIT_MODEL_URI")]
    model_uri: Option<String>,

    #[arg(long, env = "CREDIT_MODEL_ROOT")]
    model_root: Option<PathBuf>,

    /// directory with encoder.json[.gz] and expected_columns.{json,txt}
    #[arg(long, env = "CREDIT_ARTIFACT_DIR")]
    artifact_dir: Option<PathBuf>,
}

impl Args {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut cfg = match &self.config {
            Some(p) => Config::from_json_file(p)?,
            None => Config::default(),
        };
        if let Some(v) = self.bind_addr {
            cfg.bind_addr = v;
        }
        if let Some(v) = self.model_uri {
            cfg.model_uri = v;
        }
        if let Some(v) = self.model_root {
            cfg.model_root = v;
        }
        if let Some(v) = self.artifact_dir {
            cfg.artifact_dir = v;
        }
        Ok(cfg)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // metrics
    let prom = PrometheusBuilder::new()
        .install_recorder()
        .context("install prometheus recorder")?;

    let cfg = Args::parse().into_config()?;
    tracing::info!(?cfg, "starting");

    // 启动时一次性加载，之后只读共享
    let core = Arc::new(AppCore::load(&cfg).context("load scoring artifacts")?);
    let state = AppState { core, prom };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind_addr)
        .await
        .with_context(|| format!("bind {}", cfg.bind_addr))?;
    tracing::info!("credit-server listening on http://{}", cfg.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")?;

    tracing::info!("shutdown complete, artifacts released");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(err = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                tracing::warn!(err = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, draining");
}
