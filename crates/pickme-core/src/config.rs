//! The parsed configuration value the core consumes.
//!
//! Loading this from a TOML file on disk is out of scope here; an external
//! loader owns that. This module only defines the shape, with `Default`
//! impls so tests and callers that don't need a config file can build one
//! inline.

use std::collections::HashMap;
use std::path::PathBuf;
use serde::{Deserialize, Serialize};

/// One or many root paths a namespace expands to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum NamespaceValue {
    Single(String),
    Many(Vec<String>),
}

impl NamespaceValue {
    pub fn as_roots(&self) -> Vec<String> {
        match self {
            NamespaceValue::Single(s) => vec![s.clone()],
            NamespaceValue::Many(v) => v.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExcludeConfig {
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default = "default_true")]
    pub gitignored_files: bool,
}

impl Default for ExcludeConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            gitignored_files: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DepthConfig {
    #[serde(default = "default_depth")]
    pub default: u32,
    #[serde(default)]
    pub per_root: HashMap<String, u32>,
}

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            default: default_depth(),
            per_root: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitsConfig {
    #[serde(default = "default_max_files")]
    pub max_files_per_root: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_files_per_root: default_max_files(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct IndexConfig {
    #[serde(default)]
    pub roots: Vec<String>,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default)]
    pub exclude: ExcludeConfig,
    #[serde(default)]
    pub depth: DepthConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

/// Weighting coefficients for the in-memory scorer. The SQL ranker hardcodes
/// 1.0 / 0.1 / 1.0; these are for callers that re-score results in process
/// with custom weights.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WeightsConfig {
    #[serde(default = "default_weight_one")]
    pub git_recency: f64,
    #[serde(default = "default_weight_tenth")]
    pub git_frequency: f64,
    #[serde(default = "default_weight_one")]
    pub git_status: f64,
}

impl Default for WeightsConfig {
    fn default() -> Self {
        Self {
            git_recency: 1.0,
            git_frequency: 0.1,
            git_status: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub fallback_to_cli: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            socket_path: None,
            fallback_to_cli: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub namespaces: HashMap<String, NamespaceValue>,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub weights: WeightsConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
}

fn default_true() -> bool {
    true
}

fn default_depth() -> u32 {
    10
}

fn default_max_files() -> u64 {
    200_000
}

fn default_weight_one() -> f64 {
    1.0
}

fn default_weight_tenth() -> f64 {
    0.1
}
