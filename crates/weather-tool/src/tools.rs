//! Tool logic, independent of the MCP transport.

use crate::errors::ToolError;
use crate::provider::WeatherProvider;
use chrono::{DateTime, SecondsFormat, Utc};

/// Name of the temperature lookup tool.
pub const CURRENT_TEMPERATURE: &str = "current_temperature";

/// Name of the clock tool.
pub const GET_TIME: &str = "get_time";

const MAX_LATITUDE: f64 = 90.0;
const MAX_LONGITUDE: f64 = 180.0;

/// Current temperature in °C at (`lat`, `lon`).
///
/// Coordinates are checked before the provider is called.
///
/// # Errors
///
/// - `InvalidArguments` - a coordinate is outside its range
/// - `Provider` - the lookup failed
pub async fn current_temperature(
    provider: &dyn WeatherProvider,
    lat: f64,
    lon: f64,
) -> Result<f64, ToolError> {
    check_coordinate("lat", lat, MAX_LATITUDE)?;
    check_coordinate("lon", lon, MAX_LONGITUDE)?;

    let temperature = provider.current_temperature(lat, lon).await?;
    Ok(temperature)
}

/// `now` as RFC 3339 UTC with second precision, e.g. `2024-05-01T12:00:00Z`.
pub fn format_time(now: DateTime<Utc>) -> String {
    now.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Reject NaN and values outside `±limit`.
fn check_coordinate(name: &str, value: f64, limit: f64) -> Result<(), ToolError> {
    if !(-limit..=limit).contains(&value) {
        return Err(ToolError::InvalidArguments(format!(
            "'{}' must be between -{} and {}",
            name, limit, limit
        )));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::errors::ProviderError;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        result: Result<f64, u16>,
        calls: AtomicUsize,
    }

    impl FixedProvider {
        fn ok(temperature: f64) -> Self {
            Self {
                result: Ok(temperature),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                result: Err(status),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl WeatherProvider for FixedProvider {
        async fn current_temperature(&self, _lat: f64, _lon: f64) -> Result<f64, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.map_err(ProviderError::Status)
        }
    }

    #[tokio::test]
    async fn test_current_temperature_returns_provider_value() {
        let provider = FixedProvider::ok(18.25);
        let temperature = current_temperature(&provider, 48.85, 2.35).await.unwrap();
        assert_eq!(temperature, 18.25);
    }

    #[tokio::test]
    async fn test_boundary_coordinates_are_accepted() {
        let provider = FixedProvider::ok(0.0);
        assert!(current_temperature(&provider, -90.0, 180.0).await.is_ok());
        assert!(current_temperature(&provider, 90.0, -180.0).await.is_ok());
    }

    #[tokio::test]
    async fn test_out_of_range_latitude_is_rejected_before_lookup() {
        let provider = FixedProvider::ok(0.0);
        let err = current_temperature(&provider, 91.0, 0.0).await.unwrap_err();

        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert!(err.to_string().contains("'lat' must be between -90 and 90"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_out_of_range_longitude_and_nan_are_rejected() {
        let provider = FixedProvider::ok(0.0);

        let err = current_temperature(&provider, 0.0, -180.5).await.unwrap_err();
        assert!(err.to_string().contains("'lon'"));

        let err = current_temperature(&provider, f64::NAN, 0.0).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_provider_failure_is_a_provider_error() {
        let provider = FixedProvider::failing(503);
        let err = current_temperature(&provider, 1.0, 1.0).await.unwrap_err();

        assert!(matches!(err, ToolError::Provider(ProviderError::Status(503))));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_format_time_is_utc_with_second_precision() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 7).unwrap();
        assert_eq!(format_time(now), "2024-05-01T12:00:07Z");
    }
}
