//! Server configuration.
//!
//! Values come from an optional YAML file named by `FILESERVER_CONFIG`,
//! then from individual environment overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// How the accept handler reacts to one listener readiness notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AcceptPolicy {
    /// Accept exactly one pending connection per notification.
    Single,
    /// Accept until the listener reports would-block.
    Drain,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Path handed to `ftok`; created if missing.
    pub key_path: PathBuf,
    pub project_id: i32,
    /// Segment size in bytes, excluding the semaphore header.
    pub capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_path: PathBuf::from("shmfile"),
            project_id: 65,
            capacity: 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub workers: usize,
    /// Flat directory holding every served and uploaded file.
    pub serve_dir: PathBuf,
    /// HTML listing template containing the splice marker line.
    pub template_path: PathBuf,
    pub accept_policy: AcceptPolicy,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8888".to_string(),
            workers: 4,
            serve_dir: PathBuf::from("filedir"),
            template_path: PathBuf::from("html/filelist.html"),
            accept_policy: AcceptPolicy::Single,
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(|key| std::env::var(key).ok())
    }

    /// Builds the configuration using `lookup` in place of the process environment.
    pub fn load_from(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = match lookup("FILESERVER_CONFIG") {
            Some(path) => {
                let raw = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading config file {}", path))?;
                Self::from_yaml_str(&raw)
                    .with_context(|| format!("parsing config file {}", path))?
            }
            None => Self::default(),
        };

        if let Some(addr) = lookup("LISTEN") {
            cfg.listen_addr = addr;
        }
        if let Some(workers) = lookup("WORKERS") {
            cfg.workers = workers
                .parse()
                .with_context(|| format!("invalid WORKERS value {:?}", workers))?;
        }
        if let Some(dir) = lookup("SERVE_DIR") {
            cfg.serve_dir = PathBuf::from(dir);
        }
        if let Some(template) = lookup("TEMPLATE") {
            cfg.template_path = PathBuf::from(template);
        }

        if cfg.workers == 0 {
            anyhow::bail!("worker count must be at least 1");
        }

        Ok(cfg)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(raw)?)
    }
}
