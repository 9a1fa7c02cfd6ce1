//! Gear configuration handling.
//!
//! The platform launches this gear with a `config.json` next to the process:
//! a `config` object holding the recognized gear options and a `destination`
//! descriptor identifying the container the job was launched against.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// The full gear invocation document.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GearInvocation {
    /// Recognized gear options.
    #[serde(default)]
    pub config: GearOptions,

    /// Container the job was launched against.
    #[serde(default)]
    pub destination: Option<Destination>,
}

/// Recognized gear options.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GearOptions {
    /// Logging verbosity (DEBUG, INFO, WARNING, ERROR).
    #[serde(default = "default_log_level")]
    pub gear_log_level: String,

    /// Name of the gear whose analyses should be collected.
    #[serde(default)]
    pub name_of_gear: Option<String>,

    /// Exact-match filter on the gear version; empty means any version.
    #[serde(default)]
    pub version_of_gear: Option<String>,

    /// Regular expression filter on analysis labels.
    #[serde(default)]
    pub analysis_regex: Option<String>,
}

impl Default for GearOptions {
    fn default() -> Self {
        Self {
            gear_log_level: default_log_level(),
            name_of_gear: None,
            version_of_gear: None,
            analysis_regex: None,
        }
    }
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl GearOptions {
    /// Map the configured log level onto a tracing level.
    pub fn log_level(&self) -> tracing::Level {
        match self.gear_log_level.to_uppercase().as_str() {
            "DEBUG" => tracing::Level::DEBUG,
            "WARNING" | "WARN" => tracing::Level::WARN,
            "ERROR" | "CRITICAL" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }
}

/// Destination descriptor from the invocation document.
#[derive(Debug, Clone, Deserialize)]
pub struct Destination {
    pub id: String,
    #[serde(rename = "type")]
    pub container_type: String,
}

impl GearInvocation {
    /// Load an invocation document from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let invocation: GearInvocation = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(invocation)
    }

    /// Try to load the invocation from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but
    /// can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new("config.json");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this invocation with CLI arguments.
    ///
    /// CLI arguments take precedence over the invocation document, and only
    /// override when explicitly provided.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref name) = args.gear_name {
            self.config.name_of_gear = Some(name.clone());
        }
        if let Some(ref version) = args.gear_version {
            self.config.version_of_gear = Some(version.clone());
        }
        if let Some(ref pattern) = args.analysis_regex {
            self.config.analysis_regex = Some(pattern.clone());
        }
        if let (Some(id), Some(container_type)) =
            (&args.destination_id, &args.destination_type)
        {
            self.destination = Some(Destination {
                id: id.clone(),
                container_type: container_type.clone(),
            });
        }
    }
}
