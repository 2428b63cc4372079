// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Weather lookup tool
//!
//! Geocodes a place name via OpenStreetMap Nominatim, then fetches current
//! conditions from Open-Meteo.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::Result;
use crate::tools::{SchemaBuilder, Tool, ToolHandler, ToolSpec};

const GEOCODE_URL: &str = "https://nominatim.openstreetmap.org/search";
const FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
// Nominatim ToS requires an identifying User-Agent
const USER_AGENT: &str = "palaver-tools/0.1";

pub struct WeatherTool {
    client: reqwest::Client,
    geocode_url: String,
    forecast_url: String,
}

impl WeatherTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(USER_AGENT)
            .build()
            .expect("valid reqwest client config");
        Self {
            client,
            geocode_url: GEOCODE_URL.to_string(),
            forecast_url: FORECAST_URL.to_string(),
        }
    }

    pub fn with_base_urls(mut self, geocode_url: impl Into<String>, forecast_url: impl Into<String>) -> Self {
        self.geocode_url = geocode_url.into();
        self.forecast_url = forecast_url.into();
        self
    }

    async fn geocode(&self, place: &str) -> Result<Option<(String, String, String)>> {
        let response = self
            .client
            .get(&self.geocode_url)
            .query(&[("q", place), ("format", "json"), ("limit", "1")])
            .send()
            .await?
            .error_for_status()?;

        let data: Vec<Value> = response.json().await?;
        let Some(first) = data.first() else {
            return Ok(None);
        };
        let lat = first["lat"].as_str().unwrap_or_default().to_string();
        let lon = first["lon"].as_str().unwrap_or_default().to_string();
        let display = first["display_name"].as_str().unwrap_or(place).to_string();
        Ok(Some((lat, lon, display)))
    }

    fn describe_weather_code(code: i64) -> &'static str {
        match code {
            0 => "Clear sky",
            1 => "Mainly clear",
            2 => "Partly cloudy",
            3 => "Overcast",
            45 => "Foggy",
            48 => "Depositing rime fog",
            51 => "Light drizzle",
            53 => "Moderate drizzle",
            55 => "Dense drizzle",
            61 => "Slight rain",
            63 => "Moderate rain",
            65 => "Heavy rain",
            71 => "Slight snow",
            73 => "Moderate snow",
            75 => "Heavy snow",
            77 => "Snow grains",
            80 => "Slight rain showers",
            81 => "Moderate rain showers",
            82 => "Violent rain showers",
            85 => "Slight snow showers",
            86 => "Heavy snow showers",
            95 => "Thunderstorm",
            96 => "Thunderstorm with hail",
            99 => "Thunderstorm with heavy hail",
            _ => "Unknown",
        }
    }
}

impl Default for WeatherTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolHandler for WeatherTool {
    async fn call(&self, input: Value) -> Result<Value> {
        let Some(place) = input["place"].as_str().filter(|p| !p.trim().is_empty()) else {
            return Ok(json!({ "error": "place is required", "success": false }));
        };

        let Some((lat, lon, display_name)) = self.geocode(place).await? else {
            return Ok(json!({
                "error": format!("Location not found: {}", place),
                "success": false
            }));
        };

        let response = self
            .client
            .get(&self.forecast_url)
            .query(&[
                ("latitude", lat.as_str()),
                ("longitude", lon.as_str()),
                (
                    "current",
                    "temperature_2m,relative_humidity_2m,weather_code,wind_speed_10m,precipitation",
                ),
                ("timezone", "auto"),
                ("forecast_days", "1"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let data: Value = response.json().await?;
        let current = &data["current"];
        let conditions =
            Self::describe_weather_code(current["weather_code"].as_i64().unwrap_or(-1));

        Ok(json!({
            "success": true,
            "location": display_name,
            "conditions": conditions,
            "temperature": { "value": current["temperature_2m"], "unit": "°C" },
            "humidity": { "value": current["relative_humidity_2m"], "unit": "%" },
            "wind_speed": { "value": current["wind_speed_10m"], "unit": "km/h" },
            "precipitation": { "value": current["precipitation"], "unit": "mm" },
        }))
    }
}

/// Spec for the weather tool
pub fn spec() -> ToolSpec {
    ToolSpec {
        name: "get_weather".to_string(),
        description: "Get current weather conditions for a location. Use this when asked about \
                      the weather, temperature, or outdoor conditions in a specific place."
            .to_string(),
        input_schema: SchemaBuilder::new()
            .string("place", "City or place name, e.g. 'Tokyo' or 'Berlin, Germany'", true)
            .build(),
    }
}

/// Build the registered tool
pub fn build() -> Tool {
    Tool::new(spec(), Arc::new(WeatherTool::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_shape() {
        let spec = spec();
        assert_eq!(spec.name, "get_weather");
        assert_eq!(spec.input_schema["required"][0], "place");
    }

    #[test]
    fn test_weather_code_descriptions() {
        assert_eq!(WeatherTool::describe_weather_code(0), "Clear sky");
        assert_eq!(WeatherTool::describe_weather_code(95), "Thunderstorm");
        assert_eq!(WeatherTool::describe_weather_code(1234), "Unknown");
    }

    #[tokio::test]
    async fn test_missing_place_is_soft_error() {
        let tool = WeatherTool::new();
        let result = tool.call(serde_json::json!({})).await.unwrap();
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().contains("place"));
    }

    #[tokio::test]
    async fn test_geocode_and_forecast_against_mock() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "lat": "35.68", "lon": "139.69", "display_name": "Tokyo, Japan" }
            ])))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "current": {
                    "temperature_2m": 18.4,
                    "relative_humidity_2m": 61,
                    "weather_code": 2,
                    "wind_speed_10m": 9.7,
                    "precipitation": 0.0
                }
            })))
            .mount(&server)
            .await;

        let tool = WeatherTool::new().with_base_urls(
            format!("{}/search", server.uri()),
            format!("{}/forecast", server.uri()),
        );
        let result = tool
            .call(serde_json::json!({ "place": "Tokyo" }))
            .await
            .unwrap();

        assert_eq!(result["success"], true);
        assert_eq!(result["location"], "Tokyo, Japan");
        assert_eq!(result["conditions"], "Partly cloudy");
        assert_eq!(result["temperature"]["value"], 18.4);
    }

    #[tokio::test]
    async fn test_unknown_location_is_soft_error() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let tool = WeatherTool::new().with_base_urls(
            format!("{}/search", server.uri()),
            format!("{}/forecast", server.uri()),
        );
        let result = tool
            .call(serde_json::json!({ "place": "Atlantis" }))
            .await
            .unwrap();
        assert_eq!(result["success"], false);
        assert!(result["error"].as_str().unwrap().contains("Atlantis"));
    }
}
