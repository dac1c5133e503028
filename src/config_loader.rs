// Configuration loader for Diarization API
//
// This module loads the flat TOML configuration file and exports its values as
// environment variables, so the validator only ever reads the environment.

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

use log::{debug, info, warn};
use toml::Value;

pub const CONFIG_FILE_PATH: &str = "diarization_api.conf";

/// Loads configuration from the default TOML file
///
/// Configuration precedence (highest to lowest):
/// 1. Environment variables
/// 2. Configuration file values
/// 3. Default values (applied by the validator)
///
/// # Returns
///
/// Returns true if the config file was successfully loaded, false otherwise
pub fn load_config() -> bool {
    load_config_from(Path::new(CONFIG_FILE_PATH))
}

/// Loads configuration from a specific TOML file
pub fn load_config_from(config_path: &Path) -> bool {
    if !config_path.exists() {
        debug!("Configuration file not found at: {}", config_path.display());
        return false;
    }

    let config_content = match fs::read_to_string(config_path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read configuration file: {}", e);
            return false;
        }
    };

    let config_map = match parse_config(&config_content) {
        Ok(map) => map,
        Err(e) => {
            warn!("Failed to parse configuration file: {}", e);
            return false;
        }
    };

    for (key, value) in config_map {
        if env::var(&key).is_err() {
            debug!("Setting env var from config file: {}", key);
            env::set_var(key, value);
        } else {
            debug!("Env var already exists, skipping: {}", key);
        }
    }

    info!("Configuration loaded from {}", config_path.display());
    true
}

/// Flatten a TOML document into string key-value pairs. Arrays and tables are skipped.
pub fn parse_config(content: &str) -> Result<HashMap<String, String>, toml::de::Error> {
    let table: toml::Table = content.parse()?;
    let mut config_map = HashMap::new();

    for (key, value) in table {
        let value = match value {
            Value::String(s) => s,
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Boolean(b) => b.to_string(),
            _ => {
                warn!("Skipping unsupported TOML value type for key: {}", key);
                continue;
            }
        };
        config_map.insert(key, value);
    }

    Ok(config_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_flat_values() {
        let map = parse_config(
            r#"
            DIARIZATION_API_PORT = 8100
            DIARIZATION_SCRATCH_DIR = "/var/tmp/diarization"
            CALLBACK_MAX_RETRIES = 5
            RATIO = 0.5
            VERBOSE = true
            NESTED = { a = 1 }
            LIST = [1, 2]
            "#,
        )
        .expect("valid toml");

        assert_eq!(map["DIARIZATION_API_PORT"], "8100");
        assert_eq!(map["DIARIZATION_SCRATCH_DIR"], "/var/tmp/diarization");
        assert_eq!(map["CALLBACK_MAX_RETRIES"], "5");
        assert_eq!(map["RATIO"], "0.5");
        assert_eq!(map["VERBOSE"], "true");
        assert!(!map.contains_key("NESTED"));
        assert!(!map.contains_key("LIST"));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(parse_config("this is = = not toml").is_err());
    }

    #[test]
    fn test_environment_wins_over_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("diarization_api.conf");
        fs::write(
            &path,
            "LOADER_TEST_FROM_FILE = \"file\"\nLOADER_TEST_ALREADY_SET = \"file\"\n",
        )
        .expect("write config");
        env::set_var("LOADER_TEST_ALREADY_SET", "env");

        assert!(load_config_from(&path));
        assert_eq!(env::var("LOADER_TEST_FROM_FILE").as_deref(), Ok("file"));
        assert_eq!(env::var("LOADER_TEST_ALREADY_SET").as_deref(), Ok("env"));
    }

    #[test]
    fn test_missing_file_is_not_loaded() {
        assert!(!load_config_from(Path::new("/nonexistent/diarization_api.conf")));
    }
}
