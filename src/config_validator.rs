// Configuration validation module for Diarization API
//
// Every parameter is declared once in `CONFIG_PARAMS` with its type, default, range
// and severity. The validator walks the registry, reads each value from the
// environment (seeded by the config loader), and produces either a typed
// `AppConfig` or the full list of problems found.

use std::env;
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use log::{error, info, warn};

use crate::config::AppConfig;

/// Configuration parameter types
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigType {
    String,
    UnsignedInteger,
    IpAddress,
    Port,
    FilePath,
    Enum(&'static [&'static str]),
}

/// Validation severity levels
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidationLevel {
    Critical, // Must be valid for application to start
    Standard, // Invalid values are reported as errors
    Warning,  // Only reported, the value is still used
}

/// Configuration parameter definition
#[derive(Debug, Clone)]
pub struct ConfigParam {
    pub name: &'static str,
    pub description: &'static str,
    pub param_type: ConfigType,
    pub default_value: Option<&'static str>,
    pub validation_level: ValidationLevel,
    pub min_value: Option<u64>,
    pub max_value: Option<u64>,
}

/// Centralized configuration parameter registry
pub const CONFIG_PARAMS: &[ConfigParam] = &[
    // Server Configuration
    ConfigParam {
        name: "DIARIZATION_API_HOST",
        description: "Host IP address for the API server",
        param_type: ConfigType::IpAddress,
        default_value: Some("127.0.0.1"),
        validation_level: ValidationLevel::Critical,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: "DIARIZATION_API_PORT",
        description: "Port for the API server",
        param_type: ConfigType::Port,
        default_value: Some("8000"),
        validation_level: ValidationLevel::Critical,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: "HTTP_WORKER_NUMBER",
        description: "Number of HTTP worker threads (0 = use CPU cores)",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("0"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(0),
        max_value: Some(64),
    },
    ConfigParam {
        name: "DIARIZATION_API_KEY",
        description: "API key expected in the Authorization header (empty = authentication disabled)",
        param_type: ConfigType::String,
        default_value: None,
        validation_level: ValidationLevel::Warning,
        min_value: None,
        max_value: None,
    },
    // Metrics Configuration
    ConfigParam {
        name: "DIARIZATION_API_METRICS_BACKEND",
        description: "Metrics backend type",
        param_type: ConfigType::Enum(&["prometheus", "none", "disabled"]),
        default_value: Some("none"),
        validation_level: ValidationLevel::Standard,
        min_value: None,
        max_value: None,
    },
    // Worker Configuration
    ConfigParam {
        name: "MAX_CONCURRENT_JOBS",
        description: "Number of diarization workers processing jobs in parallel",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("2"),
        validation_level: ValidationLevel::Critical,
        min_value: Some(1),
        max_value: Some(32),
    },
    ConfigParam {
        name: "QUEUE_POLL_TIMEOUT_MS",
        description: "How long an idle worker waits for a job before re-checking for shutdown",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("1000"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(10),
        max_value: Some(60000),
    },
    ConfigParam {
        name: "DIARIZATION_SCRATCH_DIR",
        description: "Directory holding downloaded audio while a job runs",
        param_type: ConfigType::String, // Created at startup
        default_value: Some("/tmp/diarization"),
        validation_level: ValidationLevel::Standard,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: "DOWNLOAD_TIMEOUT_SECONDS",
        description: "Timeout in seconds for each audio download",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("60"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(1),
        max_value: Some(3600),
    },
    // Callback Configuration
    ConfigParam {
        name: "CALLBACK_TIMEOUT_SECONDS",
        description: "Timeout in seconds for each callback attempt",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("30"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(1),
        max_value: Some(600),
    },
    ConfigParam {
        name: "CALLBACK_MAX_RETRIES",
        description: "Total number of callback attempts before giving up",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("3"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(1),
        max_value: Some(10),
    },
    ConfigParam {
        name: "CALLBACK_BACKOFF_BASE_MS",
        description: "Delay before the second callback attempt, doubled after each failure",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("1000"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(0),
        max_value: Some(60000),
    },
    // Engine Configuration
    ConfigParam {
        name: "DIARIZATION_CMD",
        description: "Path to the diarization program or wrapper script",
        param_type: ConfigType::FilePath,
        default_value: Some("/opt/diarization/diarize.sh"),
        validation_level: ValidationLevel::Warning,
        min_value: None,
        max_value: None,
    },
    ConfigParam {
        name: "DIARIZATION_MIN_SPEAKERS",
        description: "Minimum number of speakers passed to the engine",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("2"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(1),
        max_value: Some(20),
    },
    ConfigParam {
        name: "DIARIZATION_MAX_SPEAKERS",
        description: "Maximum number of speakers passed to the engine",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("2"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(1),
        max_value: Some(20),
    },
    ConfigParam {
        name: "DIARIZATION_ENGINE_CONCURRENCY",
        description: "Number of simultaneous engine invocations the host can sustain",
        param_type: ConfigType::UnsignedInteger,
        default_value: Some("1"),
        validation_level: ValidationLevel::Standard,
        min_value: Some(1),
        max_value: Some(32),
    },
];

/// Configuration validation errors with detailed context
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub value: String,
    pub error_type: ConfigErrorType,
    pub message: String,
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigErrorType {
    InvalidValue,
    InvalidFormat,
    InvalidRange,
    FileNotFound,
    Inconsistent,
}

impl ConfigValidationError {
    fn new(
        field: &str,
        value: &str,
        error_type: ConfigErrorType,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
            error_type,
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Configuration error in '{}' ({:?}): {} (value: '{}')",
            self.field, self.error_type, self.message, self.value
        )?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " - Suggestion: {}", suggestion)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConfigValidationError {}

/// Result type for configuration validation
pub type ValidationResult<T> = Result<T, ConfigValidationError>;

/// Configuration validation results
#[derive(Debug, Default)]
pub struct ValidationResults {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResults {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ConfigValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ConfigValidationError) {
        self.warnings.push(warning);
    }

    /// Route a failure according to the parameter's severity
    fn add(&mut self, level: ValidationLevel, error: ConfigValidationError) {
        match level {
            ValidationLevel::Critical | ValidationLevel::Standard => self.add_error(error),
            ValidationLevel::Warning => self.add_warning(error),
        }
    }

    pub fn print_summary(&self) {
        if !self.errors.is_empty() {
            error!(
                "Configuration validation found {} error(s):",
                self.errors.len()
            );
            for (i, err) in self.errors.iter().enumerate() {
                error!("  {}. {}", i + 1, err);
            }
        }

        if !self.warnings.is_empty() {
            warn!(
                "Configuration validation found {} warning(s):",
                self.warnings.len()
            );
            for (i, warning) in self.warnings.iter().enumerate() {
                warn!("  {}. {}", i + 1, warning);
            }
        }

        if self.is_valid() && self.warnings.is_empty() {
            info!("Configuration validation passed successfully");
        } else if self.is_valid() {
            info!(
                "Configuration validation passed with {} warning(s)",
                self.warnings.len()
            );
        }
    }
}

/// Helper functions for common validation patterns
pub mod validators {
    use super::*;

    /// Validate unsigned integer values with optional range
    pub fn validate_unsigned(
        field: &str,
        value: &str,
        min: Option<u64>,
        max: Option<u64>,
    ) -> ValidationResult<u64> {
        let parsed = value.trim().parse::<u64>().map_err(|_| {
            ConfigValidationError::new(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid unsigned integer format",
                "Use a valid positive integer number",
            )
        })?;

        if let Some(min) = min {
            if parsed < min {
                return Err(ConfigValidationError::new(
                    field,
                    value,
                    ConfigErrorType::InvalidRange,
                    format!("Value {} is below minimum {}", parsed, min),
                    format!("Use a value >= {}", min),
                ));
            }
        }

        if let Some(max) = max {
            if parsed > max {
                return Err(ConfigValidationError::new(
                    field,
                    value,
                    ConfigErrorType::InvalidRange,
                    format!("Value {} is above maximum {}", parsed, max),
                    format!("Use a value <= {}", max),
                ));
            }
        }

        Ok(parsed)
    }

    /// Validate enumerated values, case-insensitively. Returns the lowercase value.
    pub fn validate_enum(field: &str, value: &str, valid_values: &[&str]) -> ValidationResult<String> {
        let lowered = value.trim().to_lowercase();
        if valid_values.iter().any(|v| v.eq_ignore_ascii_case(&lowered)) {
            Ok(lowered)
        } else {
            Err(ConfigValidationError::new(
                field,
                value,
                ConfigErrorType::InvalidValue,
                format!("Invalid value, must be one of: {}", valid_values.join(", ")),
                format!("Use one of: {}", valid_values.join(", ")),
            ))
        }
    }

    /// Validate IP address
    pub fn validate_ip_address(field: &str, value: &str) -> ValidationResult<IpAddr> {
        IpAddr::from_str(value.trim()).map_err(|_| {
            ConfigValidationError::new(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid IP address format",
                "Use a valid IPv4 or IPv6 address (e.g., 127.0.0.1 or ::1)",
            )
        })
    }

    /// Validate port number
    pub fn validate_port(field: &str, value: &str) -> ValidationResult<u16> {
        let port = value.trim().parse::<u16>().map_err(|_| {
            ConfigValidationError::new(
                field,
                value,
                ConfigErrorType::InvalidFormat,
                "Invalid port number format",
                "Use a number between 1 and 65535",
            )
        })?;

        if port == 0 {
            return Err(ConfigValidationError::new(
                field,
                value,
                ConfigErrorType::InvalidRange,
                "Port number cannot be 0",
                "Use a port between 1 and 65535",
            ));
        }

        Ok(port)
    }

    /// Validate that a file exists at the given path
    pub fn validate_file_exists(field: &str, value: &str) -> ValidationResult<()> {
        let path = Path::new(value);
        if !path.exists() {
            return Err(ConfigValidationError::new(
                field,
                value,
                ConfigErrorType::FileNotFound,
                "File does not exist",
                "Ensure the file exists and the path is correct",
            ));
        }

        if !path.is_file() {
            return Err(ConfigValidationError::new(
                field,
                value,
                ConfigErrorType::InvalidValue,
                "Path exists but is not a file",
                "Ensure the path points to a file, not a directory",
            ));
        }

        Ok(())
    }
}

/// Validator producing the application configuration
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate every parameter from the process environment
    pub fn validate_and_load() -> Result<AppConfig, ValidationResults> {
        info!("Starting configuration validation...");
        let outcome = Self::validate_with(|name| env::var(name).ok());

        match &outcome {
            Ok((_, warnings)) => {
                let results = ValidationResults {
                    errors: Vec::new(),
                    warnings: warnings.clone(),
                };
                results.print_summary();
            }
            Err(results) => results.print_summary(),
        }

        outcome.map(|(config, _)| config)
    }

    /// Validate every parameter using `lookup` as the value source.
    ///
    /// On success returns the configuration along with any warnings.
    pub fn validate_with<F>(
        lookup: F,
    ) -> Result<(AppConfig, Vec<ConfigValidationError>), ValidationResults>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut results = ValidationResults::new();
        let mut config = AppConfig::default();

        for param in CONFIG_PARAMS {
            let value = lookup(param.name)
                .or_else(|| param.default_value.map(String::from))
                .unwrap_or_default();

            // Empty means "use the built-in default"
            if value.trim().is_empty() {
                continue;
            }

            if let Err(error) = Self::validate_and_store_parameter(param, &value, &mut config) {
                results.add(param.validation_level, error);
            }
        }

        Self::validate_cross_dependencies(&mut results, &config);

        if results.is_valid() {
            Ok((config, results.warnings))
        } else {
            Err(results)
        }
    }

    /// Validate a single parameter and store its value in the config struct
    fn validate_and_store_parameter(
        param: &ConfigParam,
        value: &str,
        config: &mut AppConfig,
    ) -> ValidationResult<()> {
        match param.param_type {
            ConfigType::String => match param.name {
                "DIARIZATION_API_KEY" => config.server.api_key = Some(value.to_string()),
                "DIARIZATION_SCRATCH_DIR" => config.worker.scratch_dir = PathBuf::from(value),
                _ => {}
            },
            ConfigType::UnsignedInteger => {
                let parsed = validators::validate_unsigned(
                    param.name,
                    value,
                    param.min_value,
                    param.max_value,
                )?;
                Self::store_unsigned(param.name, parsed, value, config)?;
            }
            ConfigType::IpAddress => {
                let parsed = validators::validate_ip_address(param.name, value)?;
                if param.name == "DIARIZATION_API_HOST" {
                    config.server.host = parsed;
                }
            }
            ConfigType::Port => {
                let parsed = validators::validate_port(param.name, value)?;
                if param.name == "DIARIZATION_API_PORT" {
                    config.server.port = parsed;
                }
            }
            ConfigType::FilePath => {
                // Stored even when missing: the file may be installed before warmup
                if param.name == "DIARIZATION_CMD" {
                    config.engine.command_path = value.to_string();
                }
                validators::validate_file_exists(param.name, value)?;
            }
            ConfigType::Enum(valid_values) => {
                let parsed = validators::validate_enum(param.name, value, valid_values)?;
                if param.name == "DIARIZATION_API_METRICS_BACKEND" {
                    config.server.metrics_backend = parsed;
                }
            }
        }
        Ok(())
    }

    fn store_unsigned(
        name: &str,
        parsed: u64,
        raw: &str,
        config: &mut AppConfig,
    ) -> ValidationResult<()> {
        let as_usize = || {
            usize::try_from(parsed).map_err(|_| {
                ConfigValidationError::new(
                    name,
                    raw,
                    ConfigErrorType::InvalidRange,
                    "Value does not fit on this platform",
                    "Use a smaller value",
                )
            })
        };
        let as_u32 = || {
            u32::try_from(parsed).map_err(|_| {
                ConfigValidationError::new(
                    name,
                    raw,
                    ConfigErrorType::InvalidRange,
                    "Value does not fit in 32 bits",
                    "Use a smaller value",
                )
            })
        };

        match name {
            "HTTP_WORKER_NUMBER" => config.server.workers = as_usize()?,
            "MAX_CONCURRENT_JOBS" => config.worker.max_concurrent_jobs = as_usize()?,
            "QUEUE_POLL_TIMEOUT_MS" => config.worker.poll_timeout = Duration::from_millis(parsed),
            "DOWNLOAD_TIMEOUT_SECONDS" => {
                config.worker.download_timeout = Duration::from_secs(parsed)
            }
            "CALLBACK_TIMEOUT_SECONDS" => {
                config.worker.callback_timeout = Duration::from_secs(parsed)
            }
            "CALLBACK_MAX_RETRIES" => config.worker.max_retries = as_u32()?,
            "CALLBACK_BACKOFF_BASE_MS" => config.worker.backoff_base = Duration::from_millis(parsed),
            "DIARIZATION_MIN_SPEAKERS" => config.engine.min_speakers = as_u32()?,
            "DIARIZATION_MAX_SPEAKERS" => config.engine.max_speakers = as_u32()?,
            "DIARIZATION_ENGINE_CONCURRENCY" => config.engine.max_concurrency = as_usize()?,
            _ => {}
        }
        Ok(())
    }

    /// Validate cross-parameter dependencies
    fn validate_cross_dependencies(results: &mut ValidationResults, config: &AppConfig) {
        if config.engine.min_speakers > config.engine.max_speakers {
            results.add_error(ConfigValidationError::new(
                "DIARIZATION_MIN_SPEAKERS",
                &config.engine.min_speakers.to_string(),
                ConfigErrorType::Inconsistent,
                format!(
                    "Minimum speakers is greater than maximum speakers ({})",
                    config.engine.max_speakers
                ),
                "Set DIARIZATION_MIN_SPEAKERS <= DIARIZATION_MAX_SPEAKERS",
            ));
        }

        if config.worker.max_concurrent_jobs > config.engine.max_concurrency {
            results.add_warning(ConfigValidationError::new(
                "MAX_CONCURRENT_JOBS",
                &config.worker.max_concurrent_jobs.to_string(),
                ConfigErrorType::Inconsistent,
                format!(
                    "Only {} engine invocation(s) can run at once, extra workers will wait",
                    config.engine.max_concurrency
                ),
                "Raise DIARIZATION_ENGINE_CONCURRENCY if the host has the capacity",
            ));
        }

        if config.worker.poll_timeout > config.worker.download_timeout {
            results.add_warning(ConfigValidationError::new(
                "QUEUE_POLL_TIMEOUT_MS",
                &config.worker.poll_timeout.as_millis().to_string(),
                ConfigErrorType::Inconsistent,
                "Poll timeout is longer than the download timeout, shutdown will be slow",
                "Use a poll timeout of a few seconds at most",
            ));
        }
    }
}

/// Documentation and configuration generation utilities
impl ConfigValidator {
    /// Generate a sample configuration file with all parameters and descriptions
    pub fn generate_sample_config() -> String {
        let mut output = String::new();
        output.push_str("# Diarization API Configuration File\n");
        output.push_str("# Environment variables take precedence over values in this file\n");

        let mut current_category = "";
        for param in CONFIG_PARAMS {
            let category = if param.name.starts_with("DIARIZATION_API") || param.name.starts_with("HTTP_") {
                "Server Configuration"
            } else if param.name.starts_with("CALLBACK_") {
                "Callback Configuration"
            } else if param.name.starts_with("DIARIZATION_") && param.name != "DIARIZATION_SCRATCH_DIR" {
                "Engine Configuration"
            } else {
                "Worker Configuration"
            };

            if category != current_category {
                output.push_str(&format!("\n# ======== {} ========\n", category));
                current_category = category;
            }

            output.push_str(&format!("# {}\n", param.description));
            let value = match (param.param_type, param.default_value) {
                (ConfigType::UnsignedInteger | ConfigType::Port, Some(default)) => default.to_string(),
                (_, Some(default)) => format!("\"{}\"", default),
                (_, None) => "\"\"".to_string(),
            };
            output.push_str(&format!("{} = {}\n\n", param.name, value));
        }
        output
    }
}
