//! Configuration types for Mirage.

mod cache;
mod listen;
mod middleware;

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

pub use cache::CacheConfig;
pub use listen::{ForwardingConfig, ListenConfig, MetricsConfig};
pub use middleware::MiddlewareConfig;

use crate::modes::{Mode, ModeArguments};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Initial mode: capture, simulate, modify, synthesize, spy or diff.
    pub mode: String,
    pub mode_arguments: ModeArguments,

    /// Standalone-server deployment. Requests are answered as the service
    /// itself instead of being proxied, and the destination host is not part of
    /// a request's identity.
    pub webserver: bool,

    pub cache: CacheConfig,
    pub listen: ListenConfig,
    pub metrics: MetricsConfig,

    /// Base URL live requests are sent to in standalone-server deployment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    pub forwarding: ForwardingConfig,

    /// Simulation file imported at start.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub simulation: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub middleware: Option<MiddlewareConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::default().to_string(),
            mode_arguments: ModeArguments::default(),
            webserver: false,
            cache: CacheConfig::default(),
            listen: ListenConfig::default(),
            metrics: MetricsConfig::default(),
            upstream: None,
            forwarding: ForwardingConfig::default(),
            simulation: None,
            middleware: None,
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.mode.parse::<Mode>().is_err() {
            anyhow::bail!(
                "Unknown mode: '{}'. Expected one of: capture, simulate, modify, synthesize, spy, diff",
                self.mode
            );
        }

        if self.cache.enabled && self.cache.capacity == 0 {
            anyhow::bail!("cache.capacity must be greater than 0 when the cache is enabled");
        }

        if self.metrics.enabled && self.metrics.port == self.listen.port {
            anyhow::bail!(
                "metrics.port and listen.port must differ (both are {})",
                self.listen.port
            );
        }

        if let Some(ref simulation) = self.simulation {
            if !simulation.exists() {
                anyhow::bail!("Simulation file not found: {}", simulation.display());
            }
        }

        if let Some(ref middleware) = self.middleware {
            middleware.validate()?;
        }

        Ok(())
    }
}
