//! `pickme` CLI: the external-shell-facing surface consumed on top of the
//! daemon. Talks to the daemon over its UNIX-domain socket when reachable;
//! falls back to an in-process search when `daemon.fallback_to_cli` allows
//! it.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::FmtSubscriber;

use pickme_core::{Config, Env};

#[derive(Parser)]
#[command(name = "pickme", about = "sub-50ms @file completion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Search the index for files matching a query.
    Search {
        query: String,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        cwd: Option<String>,
    },
    /// Check daemon health; exits 0 iff healthy.
    Health,
    /// Bump the generation counter, optionally scoped to one root.
    Invalidate {
        #[arg(long)]
        root: Option<String>,
    },
    /// Ask the daemon to shut down.
    Stop,
}

fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "pickme_cli=info".into()))
        .compact()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let env = Env::from_process();
    let config = load_config(&env);
    let socket = config
        .daemon
        .socket_path
        .clone()
        .unwrap_or_else(|| env.default_socket_path());

    match cli.command {
        Command::Search { query, limit, cwd } => search(&socket, &env, &config, query, limit, cwd).await,
        Command::Health => health(&socket).await,
        Command::Invalidate { root } => invalidate(&socket, root).await,
        Command::Stop => stop(&socket).await,
    }
}

async fn search(
    socket: &Path,
    env: &Env,
    config: &Config,
    query: String,
    limit: Option<u32>,
    cwd: Option<String>,
) -> Result<ExitCode> {
    if pickme_client::is_daemon_running(socket).await {
        match pickme_client::query_daemon(socket, &query, cwd.as_deref(), limit).await {
            Ok(response) => {
                print_search_results(&response);
                return Ok(ExitCode::SUCCESS);
            }
            Err(err) => {
                eprintln!("{err}");
                return Ok(ExitCode::FAILURE);
            }
        }
    }

    if !config.daemon.fallback_to_cli {
        eprintln!("daemon unreachable and fallback_to_cli is disabled");
        return Ok(ExitCode::FAILURE);
    }

    direct_search(env, config, &query, limit, cwd).await
}

/// In-process search used when the daemon can't be reached.
async fn direct_search(
    env: &Env,
    config: &Config,
    query: &str,
    limit: Option<u32>,
    cwd: Option<String>,
) -> Result<ExitCode> {
    let store = pickme_store::Store::open(&env.db_path()).await?;
    let picker = pickme_query::Picker::with_env(store, config.clone(), env.clone());
    let opts = pickme_query::SearchOptions::new(cwd, limit);
    let results = picker.search(query, &opts).await;
    picker.close().await;

    match results {
        Ok(results) => {
            for result in results {
                println!("{}", result.path);
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_search_results(response: &serde_json::Value) {
    if let Some(results) = response.get("results").and_then(|v| v.as_array()) {
        for entry in results {
            if let Some(path) = entry.get("path").and_then(|v| v.as_str()) {
                println!("{path}");
            }
        }
    }
}

async fn health(socket: &Path) -> Result<ExitCode> {
    if pickme_client::is_daemon_running(socket).await {
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("daemon not reachable");
        Ok(ExitCode::FAILURE)
    }
}

async fn invalidate(socket: &Path, root: Option<String>) -> Result<ExitCode> {
    let payload = json!({"type": "invalidate", "root": root});
    match pickme_client::send_request(socket, payload).await {
        Ok(response) if response.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) => {
            Ok(ExitCode::SUCCESS)
        }
        Ok(response) => {
            eprintln!(
                "{}",
                response
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("invalidate failed")
            );
            Ok(ExitCode::FAILURE)
        }
        Err(err) => {
            eprintln!("{err}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn stop(socket: &Path) -> Result<ExitCode> {
    let payload = json!({"type": "stop"});
    match pickme_client::send_request(socket, payload).await {
        Ok(response) if response.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) => {
            Ok(ExitCode::SUCCESS)
        }
        _ => {
            eprintln!("daemon not reachable");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn load_config(env: &Env) -> Config {
    let path = env.config_path();
    if !path.exists() {
        return Config::default();
    }
    match std::fs::read_to_string(&path) {
        Ok(raw) => toml::from_str(&raw).unwrap_or_default(),
        Err(_) => Config::default(),
    }
}
