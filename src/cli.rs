//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap, including
//! validation and default values. Everything here can also come from the
//! gear's `config.json`; CLI values win when both are present.

use clap::Parser;
use std::path::PathBuf;

/// Aggregate FreeSurfer longitudinal results across a project.
///
/// Searches every subject's analyses for runs of the given gear, downloads
/// the whitelisted CSV outputs from the ones that completed, and combines
/// them into one CSV per output type. Subjects and sessions whose processing
/// failed or never ran get placeholder rows so the combined tables cover the
/// whole project roster.
///
/// Examples:
///   fslong-aggregator --gear-name freesurfer-long --destination-id 5e8f --destination-type analysis
///   fslong-aggregator --config config.json --gear-version 1.2.0
///   fslong-aggregator --config config.json --analysis-regex 'step [0-9]+'
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the gear invocation file
    ///
    /// If not specified, looks for config.json in the current directory.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Id of the container the job was launched against
    #[arg(long, value_name = "ID", requires = "destination_type")]
    pub destination_id: Option<String>,

    /// Type of the container the job was launched against (e.g. analysis)
    #[arg(long, value_name = "TYPE", requires = "destination_id")]
    pub destination_type: Option<String>,

    /// Name of the gear whose analyses should be collected
    #[arg(short = 'g', long, value_name = "NAME")]
    pub gear_name: Option<String>,

    /// Only collect analyses produced by this exact gear version
    #[arg(long, value_name = "VERSION")]
    pub gear_version: Option<String>,

    /// Only collect analyses whose label matches this regular expression
    #[arg(long, value_name = "REGEX")]
    pub analysis_regex: Option<String>,

    /// Platform API base URL
    #[arg(
        long,
        default_value = "http://localhost:8080/api",
        env = "PLATFORM_API_URL",
        value_name = "URL"
    )]
    pub api_url: String,

    /// Platform API key
    #[arg(long, env = "PLATFORM_API_KEY", hide_env_values = true, value_name = "KEY")]
    pub api_key: Option<String>,

    /// Directory where the combined CSV files are written
    #[arg(short, long, default_value = "output", value_name = "DIR")]
    pub output_dir: PathBuf,

    /// Request timeout in seconds
    #[arg(long, default_value = "60", value_name = "SECS")]
    pub timeout: u64,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err("API URL must start with 'http://' or 'https://'".to_string());
        }

        if self.timeout == 0 {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if let Some(ref pattern) = self.analysis_regex {
            if let Err(e) = regex::Regex::new(pattern) {
                return Err(format!("Invalid analysis regex '{}': {}", pattern, e));
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level from the verbosity flags, or `None` when
    /// neither flag was given and the configured gear-log-level applies.
    pub fn log_level(&self) -> Option<tracing::Level> {
        if self.quiet {
            Some(tracing::Level::ERROR)
        } else if self.verbose {
            Some(tracing::Level::DEBUG)
        } else {
            None
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_args() -> Args {
        Args {
            config: None,
            destination_id: None,
            destination_type: None,
            gear_name: None,
            gear_version: None,
            analysis_regex: None,
            api_url: "http://localhost:8080/api".to_string(),
            api_key: Some("test-key".to_string()),
            output_dir: PathBuf::from("output"),
            timeout: 60,
            verbose: false,
            quiet: false,
        }
    }

    #[test]
    fn test_validation_accepts_defaults() {
        assert!(make_args().validate().is_ok());
    }

    #[test]
    fn test_validation_invalid_api_url() {
        let mut args = make_args();
        args.api_url = "localhost:8080".to_string();
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let mut args = make_args();
        args.timeout = 0;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_bad_regex() {
        let mut args = make_args();
        args.analysis_regex = Some("step [".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), None);

        args.verbose = true;
        assert_eq!(args.log_level(), Some(tracing::Level::DEBUG));

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), Some(tracing::Level::ERROR));
    }
}
