//! Daemon configuration: defaults under `~/.omniview`, an optional
//! `config.yaml` in the data directory, then environment overrides.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::checks::{CheckSettings, ConcurrencyPolicy};
use crate::gateway::gemini::DEFAULT_BASE_URL;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub socket_path: PathBuf,
    /// `None` lets every dispatched probe run at once.
    pub max_concurrent_probes: Option<usize>,
    pub probe_timeout_secs: Option<u64>,
    pub pulse_interval_mins: u64,
    pub gemini_base_url: String,
}

/// Shape of `config.yaml`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    max_concurrent_probes: Option<usize>,
    probe_timeout_secs: Option<u64>,
    pulse_interval_mins: Option<u64>,
    gemini_base_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let data_dir = match std::env::var_os("OMNIVIEW_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::home_dir()
                .context("Cannot determine home directory")?
                .join(".omniview"),
        };

        let mut config = Self::with_data_dir(data_dir);
        let file = config.data_dir.join("config.yaml");
        config.apply_file(&file)?;
        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            db_path: data_dir.join("omniview.db"),
            socket_path: data_dir.join("omniview.sock"),
            max_concurrent_probes: None,
            probe_timeout_secs: None,
            pulse_interval_mins: 15,
            gemini_base_url: DEFAULT_BASE_URL.to_string(),
            data_dir,
        }
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file: FileConfig = serde_yaml::from_str(&raw)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        // 0 means unbounded / no timeout, same as the env overrides
        if let Some(n) = file.max_concurrent_probes {
            self.max_concurrent_probes = (n > 0).then_some(n);
        }
        if let Some(secs) = file.probe_timeout_secs {
            self.probe_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(mins) = file.pulse_interval_mins {
            self.pulse_interval_mins = mins;
        }
        if let Some(url) = file.gemini_base_url {
            self.gemini_base_url = url;
        }
        Ok(())
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(raw) = var("OMNIVIEW_MAX_CONCURRENT_PROBES") {
            let n: usize = raw
                .trim()
                .parse()
                .context("OMNIVIEW_MAX_CONCURRENT_PROBES must be a whole number")?;
            // 0 means unbounded
            self.max_concurrent_probes = (n > 0).then_some(n);
        }
        if let Some(raw) = var("OMNIVIEW_PROBE_TIMEOUT_SECS") {
            let secs: u64 = raw
                .trim()
                .parse()
                .context("OMNIVIEW_PROBE_TIMEOUT_SECS must be a whole number")?;
            self.probe_timeout_secs = (secs > 0).then_some(secs);
        }
        if let Some(url) = var("OMNIVIEW_GEMINI_BASE_URL") {
            self.gemini_base_url = url;
        }
        Ok(())
    }

    pub fn check_settings(&self) -> CheckSettings {
        CheckSettings {
            concurrency: match self.max_concurrent_probes {
                Some(n) => ConcurrencyPolicy::Bounded(n),
                None => ConcurrencyPolicy::Unbounded,
            },
            probe_timeout: self.probe_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn pulse_interval(&self) -> Duration {
        Duration::from_secs(self.pulse_interval_mins.max(1) * 60)
    }
}
