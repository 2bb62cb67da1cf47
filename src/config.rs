use std::path::Path;

use anyhow::{Context, ensure};
use serde::Deserialize;

/// Server settings.
///
/// Defaults are overridden by a YAML file named in `LANTERN_CONFIG`, which
/// is in turn overridden by the `LISTEN`, `WORKERS` and `BACKLOG`
/// environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address to listen on, e.g. "0.0.0.0:8080" or "localhost:9898"
    pub listen_addr: String,
    /// Number of worker threads
    pub workers: usize,
    /// Listen backlog passed to the OS
    pub backlog: i32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            workers: 8,
            backlog: 128,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = match lookup("LANTERN_CONFIG") {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(addr) = lookup("LISTEN") {
            cfg.listen_addr = addr;
        }
        if let Some(workers) = lookup("WORKERS") {
            cfg.workers = workers
                .parse()
                .with_context(|| format!("WORKERS is not a number: {workers:?}"))?;
        }
        if let Some(backlog) = lookup("BACKLOG") {
            cfg.backlog = backlog
                .parse()
                .with_context(|| format!("BACKLOG is not a number: {backlog:?}"))?;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(doc: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(doc).context("invalid YAML configuration")
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let doc = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&doc).with_context(|| format!("loading {}", path.display()))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(!self.listen_addr.is_empty(), "listen_addr is empty");
        ensure!(self.workers > 0, "workers must be at least 1");
        ensure!(self.backlog > 0, "backlog must be positive");
        Ok(())
    }
}
