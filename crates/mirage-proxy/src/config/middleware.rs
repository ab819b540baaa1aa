//! Middleware script configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A Rhai middleware script, given either as a file or inline.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct MiddlewareConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl MiddlewareConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        match (&self.path, &self.script) {
            (Some(_), Some(_)) => {
                anyhow::bail!("middleware: specify either 'path' or 'script', not both")
            }
            (None, None) => anyhow::bail!("middleware: one of 'path' or 'script' is required"),
            (Some(path), None) if !path.exists() => {
                anyhow::bail!("middleware script not found: {}", path.display())
            }
            _ => Ok(()),
        }
    }

    /// Script source and the label reported when it fails.
    pub fn load(&self) -> Result<(String, String), anyhow::Error> {
        if let Some(path) = &self.path {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read middleware script {}", path.display()))?;
            return Ok((source, path.display().to_string()));
        }
        match &self.script {
            Some(script) => Ok((script.clone(), "inline".to_string())),
            None => anyhow::bail!("middleware: one of 'path' or 'script' is required"),
        }
    }
}
