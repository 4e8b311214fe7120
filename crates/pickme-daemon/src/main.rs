//! pickme daemon binary.
//!
//! Binds a UNIX-domain socket, opens the index store, and serves NDJSON
//! `search`/`health`/`invalidate`/`stop` requests until told to stop or
//! until the circuit breaker trips.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::FmtSubscriber;

use pickme_core::{Config, Env};
use pickme_daemon::server::serve;
use pickme_daemon::DaemonState;
use pickme_query::Picker;
use pickme_store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    let env = Env::from_process();

    let filter = if env.debug { "debug" } else { "info" };
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("pickme_daemon={filter}")),
        )
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;

    let config = load_config(&env)?;
    if !config.daemon.enabled {
        tracing::info!("daemon.enabled is false, exiting");
        return Ok(());
    }

    let socket_path = socket_path(&config, &env);
    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let store = Store::open(&env.db_path()).await?;
    let picker = Picker::with_env(store, config.clone(), env.clone());
    let state = Arc::new(DaemonState::new(picker, config, env).await);

    let shutdown = Arc::new(AtomicBool::new(false));
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("received ctrl-c, shutting down");
        signal_shutdown.store(true, Ordering::SeqCst);
    });

    let result = serve(state.clone(), socket_path, shutdown).await;

    state.picker.close().await;
    tracing::info!("daemon store closed");

    result.map_err(Into::into)
}

/// Load the config file if present; an absent file is not an error (the
/// daemon runs with defaults), but a malformed one is fatal at startup.
fn load_config(env: &Env) -> Result<Config> {
    let path = env.config_path();
    if !path.exists() {
        return Ok(Config::default());
    }
    let raw = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&raw)
        .with_context(|| format!("invalid configuration in {}", path.display()))
}

fn socket_path(config: &Config, env: &Env) -> PathBuf {
    config
        .daemon
        .socket_path
        .clone()
        .unwrap_or_else(|| env.default_socket_path())
}
