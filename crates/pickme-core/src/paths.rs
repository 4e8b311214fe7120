//! Resolution of all on-disk locations the core depends on.
//!
//! Single source of truth, eliminating ad-hoc `dirs::data_dir().join(...)`
//! scattered across crates. Unlike a module-level singleton, [`Env`] is an
//! explicit value constructed once (normally from the process environment)
//! and threaded into the store/daemon constructors, so tests can point the
//! whole core at a scratch directory without touching real env vars.

use std::env;
use std::path::PathBuf;

/// Snapshot of the environment values the core reads to resolve paths.
///
/// Constructed once at process start (`Env::from_process`) and passed down
/// explicitly; nothing in this crate reads `std::env` directly after that.
#[derive(Debug, Clone, Default)]
pub struct Env {
    pub xdg_data_home: Option<PathBuf>,
    pub xdg_config_home: Option<PathBuf>,
    pub home: Option<PathBuf>,
    pub config_path_override: Option<PathBuf>,
    pub debug: bool,
}

impl Env {
    /// Read the real process environment.
    pub fn from_process() -> Self {
        Self {
            xdg_data_home: env::var_os("XDG_DATA_HOME").map(PathBuf::from),
            xdg_config_home: env::var_os("XDG_CONFIG_HOME").map(PathBuf::from),
            home: env::var_os("HOME").map(PathBuf::from).or_else(dirs::home_dir),
            config_path_override: env::var_os("PICKME_CONFIG_PATH").map(PathBuf::from),
            debug: env::var_os("PICKME_DEBUG").is_some(),
        }
    }

    /// `$XDG_DATA_HOME/pickme` or the platform fallback data dir under `pickme`.
    pub fn data_dir(&self) -> PathBuf {
        let base = self
            .xdg_data_home
            .clone()
            .or_else(dirs::data_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("pickme")
    }

    /// `$XDG_CONFIG_HOME/pickme` or the platform fallback config dir under `pickme`.
    pub fn config_dir(&self) -> PathBuf {
        let base = self
            .xdg_config_home
            .clone()
            .or_else(dirs::config_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("pickme")
    }

    /// SQLite database file: `<data_dir>/index.db`.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("index.db")
    }

    /// Config file path, honoring `PICKME_CONFIG_PATH` override.
    pub fn config_path(&self) -> PathBuf {
        self.config_path_override
            .clone()
            .unwrap_or_else(|| self.config_dir().join("config.toml"))
    }

    /// Default UNIX-domain socket path: `<data_dir>/daemon.sock`.
    pub fn default_socket_path(&self) -> PathBuf {
        self.data_dir().join("daemon.sock")
    }

    /// Expand a leading `~/` against the resolved home directory.
    pub fn expand_tilde(&self, path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = &self.home {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }
}
