// src/config.rs

use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, path::PathBuf};

/// Root configuration loaded from `grader.yaml`.
///
/// This file controls:
/// - Where the challenge catalog lives
/// - Which Node binary runs JavaScript submissions
/// - Sandbox budgets
/// - Grading behaviour (unknown-rule fallback, markup depth limit)
/// - Where local state is kept and which backend receives progress
///
/// Every section is optional; a missing file means all defaults.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub runtime: Runtime,

    #[serde(default)]
    pub budgets: Budgets,

    #[serde(default)]
    pub grading: GradingConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Catalog configuration section.
///
/// Example:
///
/// catalog:
///   dir: challenges
#[derive(Debug, Deserialize, Default, Clone)]
pub struct CatalogConfig {
    /// Directory of challenge files. The built-in catalog is used when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Runtime binary configuration.
///
/// Example:
///
/// runtime:
///   node: node
///   node_args: ["--permission", "--allow-fs-read=*"]
#[derive(Debug, Deserialize, Clone)]
pub struct Runtime {
    #[serde(default = "default_node")]
    pub node: String,

    /// Extra flags passed to node before the shim path.
    #[serde(default)]
    pub node_args: Vec<String>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self {
            node: default_node(),
            node_args: Vec::new(),
        }
    }
}

fn default_node() -> String {
    "node".to_string()
}

/// Sandbox budgets.
///
/// Example:
///
/// budgets:
///   duration_ms: 3000
///   memory_mb: 128
///   call_timeout_ms: 1000
#[derive(Debug, Deserialize, Clone)]
pub struct Budgets {
    /// Wall-clock limit for the whole sandbox process.
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,

    /// Peak RSS limit for the sandbox process.
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,

    /// Limit for a single `solution(...)` call inside the sandbox.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

impl Default for Budgets {
    fn default() -> Self {
        Self {
            duration_ms: default_duration_ms(),
            memory_mb: default_memory_mb(),
            call_timeout_ms: default_call_timeout_ms(),
        }
    }
}

fn default_duration_ms() -> u64 {
    3000
}

fn default_memory_mb() -> u64 {
    128
}

fn default_call_timeout_ms() -> u64 {
    1000
}

/// What an unrecognised HTML & CSS test name resolves to.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Pass with "Test passed".
    #[default]
    Lenient,
    /// Fail with "Test not implemented".
    Strict,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GradingConfig {
    #[serde(default)]
    pub fallback: FallbackPolicy,

    #[serde(default = "default_max_markup_depth")]
    pub max_markup_depth: usize,

    /// Pause before results are shown (drives the "grading..." indicator).
    #[serde(default)]
    pub delay_ms: u64,
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            fallback: FallbackPolicy::default(),
            max_markup_depth: default_max_markup_depth(),
            delay_ms: 0,
        }
    }
}

fn default_max_markup_depth() -> usize {
    512
}

#[derive(Debug, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_path")]
    pub path: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from(".grader/state.json")
}

/// Backend that receives progress. Progress stays local when unset.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct BackendConfig {
    #[serde(default)]
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct OutputConfig {
    #[serde(default)]
    pub mode: OutputMode,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Coloured human-readable cards.
    #[default]
    Pretty,
    /// One JSON report per run.
    Json,
    /// Plain text, no colour.
    Simple,
}

impl Config {
    /// Load and parse `grader.yaml` from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let cfg: Config =
            serde_yaml::from_str(&raw).context("Failed to parse YAML config")?;

        Ok(cfg)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Ok(Self::default())
        }
    }
}
