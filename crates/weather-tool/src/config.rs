//! Weather tool configuration.
//!
//! Loaded from environment variables. The same variables are read by the
//! gateway when it mounts the tool in-process.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default bind address for the standalone tool server.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8001";

/// Default Open-Meteo API base URL.
pub const DEFAULT_WEATHER_API_URL: &str = "https://api.open-meteo.com";

/// Default timeout for weather API calls in seconds.
pub const DEFAULT_WEATHER_API_TIMEOUT_SECONDS: u64 = 10;

/// Weather tool configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address when running standalone (default: "0.0.0.0:8001").
    pub bind_address: String,

    /// Base URL of the Open-Meteo forecast API.
    pub weather_api_url: String,

    /// Timeout applied to each weather API call.
    pub weather_api_timeout: Duration,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid weather API URL: {0}")]
    InvalidWeatherApiUrl(String),

    #[error("Invalid weather API timeout configuration: {0}")]
    InvalidWeatherApiTimeout(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let weather_api_url = vars
            .get("WEATHER_API_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_WEATHER_API_URL.to_string());

        if !weather_api_url.starts_with("http://") && !weather_api_url.starts_with("https://") {
            return Err(ConfigError::InvalidWeatherApiUrl(format!(
                "WEATHER_API_URL must be an http(s) URL, got '{}'",
                weather_api_url
            )));
        }
        let weather_api_url = weather_api_url.trim_end_matches('/').to_string();

        let timeout_seconds = if let Some(value_str) = vars.get("WEATHER_API_TIMEOUT_SECONDS") {
            let value: u64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidWeatherApiTimeout(format!(
                    "WEATHER_API_TIMEOUT_SECONDS must be a valid positive integer, got '{}': {}",
                    value_str, e
                ))
            })?;

            if value == 0 {
                return Err(ConfigError::InvalidWeatherApiTimeout(
                    "WEATHER_API_TIMEOUT_SECONDS must be greater than 0".to_string(),
                ));
            }

            value
        } else {
            DEFAULT_WEATHER_API_TIMEOUT_SECONDS
        };

        Ok(Config {
            bind_address,
            weather_api_url,
            weather_api_timeout: Duration::from_secs(timeout_seconds),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_defaults() {
        let config = Config::from_vars(&HashMap::new()).expect("defaults should load");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(config.weather_api_url, DEFAULT_WEATHER_API_URL);
        assert_eq!(
            config.weather_api_timeout,
            Duration::from_secs(DEFAULT_WEATHER_API_TIMEOUT_SECONDS)
        );
    }

    #[test]
    fn test_from_vars_custom_values() {
        let vars = HashMap::from([
            ("BIND_ADDRESS".to_string(), "127.0.0.1:9001".to_string()),
            (
                "WEATHER_API_URL".to_string(),
                "http://localhost:9999/".to_string(),
            ),
            ("WEATHER_API_TIMEOUT_SECONDS".to_string(), "3".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("custom values should load");

        assert_eq!(config.bind_address, "127.0.0.1:9001");
        assert_eq!(config.weather_api_url, "http://localhost:9999");
        assert_eq!(config.weather_api_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_rejects_non_http_weather_url() {
        let vars = HashMap::from([(
            "WEATHER_API_URL".to_string(),
            "ftp://weather.example.com".to_string(),
        )]);

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidWeatherApiUrl(_))
        ));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let vars = HashMap::from([(
            "WEATHER_API_TIMEOUT_SECONDS".to_string(),
            "0".to_string(),
        )]);

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidWeatherApiTimeout(msg)) if msg.contains("greater than 0")
        ));
    }

    #[test]
    fn test_rejects_non_numeric_timeout() {
        let vars = HashMap::from([(
            "WEATHER_API_TIMEOUT_SECONDS".to_string(),
            "soon".to_string(),
        )]);

        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidWeatherApiTimeout(_))
        ));
    }
}
