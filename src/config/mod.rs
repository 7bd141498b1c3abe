pub mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use anyhow::Result;
use std::path::Path;

impl AppConfig {
    /// Load configuration from a file (if it exists) and apply environment
    /// variable overrides for operational knobs. When the file does not
    /// exist, built-in defaults are used — the service is runnable with
    /// zero configuration for local development.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: AppConfig = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            match path.extension().and_then(|e| e.to_str()) {
                Some("toml") => toml::from_str(&content)?,
                Some("json") => serde_json::from_str(&content)?,
                Some(ext) => anyhow::bail!("unsupported config format: .{ext}, use .toml or .json"),
                None => anyhow::bail!("config file has no extension, use .toml or .json"),
            }
        } else {
            tracing::info!(
                "config file not found at {}, using defaults",
                path.display()
            );
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!("loaded application configuration");
        Ok(config)
    }

    /// Apply environment variable overrides. Only operational knobs are
    /// overridable this way — tier tables and overrides are business
    /// policy and come exclusively from the config file.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("COORDINATION_URL") {
            self.coordination.url = v;
        }
        if let Ok(v) = std::env::var("WINDOW_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                self.admission.window_seconds = n;
            }
        }
        if let Ok(v) = std::env::var("MAX_INFLIGHT") {
            if let Ok(n) = v.parse::<usize>() {
                self.admission.max_inflight = n;
            }
        }
        if let Ok(v) = std::env::var("LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Ok(v) = std::env::var("ADMIN_LISTEN_ADDR") {
            self.server.admin_listen_addr = v;
        }
        if let Ok(v) = std::env::var("INPUT_TPM_DEFAULT") {
            if let Ok(n) = v.parse::<u64>() {
                if !self.tiers.input_tpm.contains(&n) {
                    self.tiers.input_tpm.push(n);
                }
            }
        }
        if let Ok(v) = std::env::var("OUTPUT_TPM_DEFAULT") {
            if let Ok(n) = v.parse::<u64>() {
                if !self.tiers.output_tpm.contains(&n) {
                    self.tiers.output_tpm.push(n);
                }
            }
        }
        if let Ok(v) = std::env::var("RPM_DEFAULT") {
            if let Ok(n) = v.parse::<u64>() {
                if !self.tiers.rpm.contains(&n) {
                    self.tiers.rpm.push(n);
                }
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.coordination.url.is_empty() {
            anyhow::bail!("coordination.url must not be empty");
        }
        if self.admission.window_seconds == 0 {
            anyhow::bail!("admission.window_seconds must be greater than zero");
        }
        if self.admission.default_max_out == 0 {
            anyhow::bail!("admission.default_max_out must be greater than zero");
        }
        if self.tiers.input_tpm.is_empty()
            || self.tiers.output_tpm.is_empty()
            || self.tiers.rpm.is_empty()
        {
            anyhow::bail!("tier tables must not be empty");
        }
        Ok(())
    }
}
