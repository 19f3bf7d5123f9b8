/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use socknet_core::accounts::register_node;
use socknet_core::api::{router, AppState};
use socknet_core::config::ServerConfig;
use std::path::PathBuf;
use tracing::{error, info, warn};

fn config_arg() -> Result<Option<PathBuf>> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = args.next().context("--config needs a path")?;
                return Ok(Some(PathBuf::from(path)));
            }
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    return Ok(Some(PathBuf::from(path)));
                }
                anyhow::bail!("usage: socknet_server [--config <path>]");
            }
        }
    }
    Ok(None)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("ctrl-c handler failed: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cfg = ServerConfig::load(config_arg()?.as_deref())?;
    if cfg.admin_token.is_none() {
        warn!("no admin token configured, /admin routes are disabled");
    }
    let state = AppState::new(cfg)?;

    for seed in &state.cfg.seed_nodes {
        match register_node(&state.db, seed) {
            Ok(node) => info!(node = %node.url, "seed node registered"),
            Err(e) => warn!(node = %seed.url, "seed node rejected: {e}"),
        }
    }

    let addr = state.cfg.bind;
    info!(
        version = socknet_core::version(),
        node = %state.cfg.node_name,
        public_url = %state.cfg.public_url,
        "socknet listening on http://{addr}"
    );
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}
