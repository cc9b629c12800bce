//! Weather data provider.
//!
//! [`WeatherProvider`] is the seam between the tool and the outside world;
//! [`OpenMeteoClient`] is the production implementation.

use crate::errors::ProviderError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::instrument;

/// Source of current temperature readings.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    /// Current temperature in °C at the given coordinates.
    async fn current_temperature(&self, lat: f64, lon: f64) -> Result<f64, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    hourly: HourlyForecast,
}

#[derive(Debug, Deserialize)]
struct HourlyForecast {
    temperature_2m: Vec<Option<f64>>,
}

/// Open-Meteo forecast API client.
///
/// Reads the first hourly `temperature_2m` value of the forecast.
pub struct OpenMeteoClient {
    /// API base URL (no trailing slash).
    base_url: String,

    /// HTTP client with request timeout.
    http_client: reqwest::Client,
}

impl OpenMeteoClient {
    /// Create a client for the given base URL.
    pub fn new(base_url: String, timeout: Duration) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(target: "weather.provider", error = %e, "Failed to build HTTP client with custom config, using defaults");
                reqwest::Client::new()
            });

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        }
    }

    fn forecast_url(&self) -> String {
        format!("{}/v1/forecast", self.base_url)
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoClient {
    #[instrument(skip(self))]
    async fn current_temperature(&self, lat: f64, lon: f64) -> Result<f64, ProviderError> {
        let response = self
            .http_client
            .get(self.forecast_url())
            .query(&[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("hourly", "temperature_2m".to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(target: "weather.provider", error = %e, "Weather API request failed");
                ProviderError::Request(e.to_string())
            })?;

        if !response.status().is_success() {
            tracing::error!(
                target: "weather.provider",
                status = %response.status(),
                "Weather API returned error"
            );
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        let forecast: ForecastResponse = response.json().await.map_err(|e| {
            tracing::error!(target: "weather.provider", error = %e, "Failed to parse weather API response");
            ProviderError::InvalidResponse(e.to_string())
        })?;

        forecast
            .hourly
            .temperature_2m
            .first()
            .copied()
            .flatten()
            .ok_or_else(|| {
                ProviderError::InvalidResponse("no hourly temperature values".to_string())
            })
    }
}
