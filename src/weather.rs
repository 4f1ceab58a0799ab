//! Current-conditions lookup for the weather slot of the context vector.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codes;

pub const DEFAULT_ENDPOINT: &str = "https://api.openweathermap.org/data/2.5/weather";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum WeatherError {
    #[error("Weather service error: {0}")]
    ExternalService(#[from] ureq::Error),
    #[error("Malformed weather response: {0}")]
    MalformedResponse(String),
}

/// Weather code plus temperature in the configured units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WeatherReport {
    pub code: u8,
    pub temperature: f64,
}

impl Default for WeatherReport {
    /// Clouds, 20 degrees.
    fn default() -> Self {
        Self {
            code: codes::WEATHER.default,
            temperature: 20.0,
        }
    }
}

/// Anything that can answer "what is the weather in this city". Never fails.
pub trait WeatherSource: Send + Sync {
    fn resolve(&self, city: &str) -> WeatherReport;
}

#[derive(Debug, Deserialize)]
struct CurrentWeather {
    #[serde(default)]
    weather: Vec<Condition>,
    main: Option<Readings>,
}

#[derive(Debug, Deserialize)]
struct Condition {
    main: String,
}

#[derive(Debug, Deserialize)]
struct Readings {
    temp: f64,
}

/// OpenWeatherMap current-weather client with a bounded timeout.
pub struct WeatherResolver {
    agent: ureq::Agent,
    endpoint: String,
    api_key: String,
    units: String,
}

impl WeatherResolver {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration, units: &str) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            endpoint: endpoint.to_string(),
            api_key: api_key.to_string(),
            units: units.to_string(),
        }
    }

    /// One request, no retry.
    pub fn fetch(&self, city: &str) -> Result<WeatherReport, WeatherError> {
        log::debug!("Fetching weather for {city}");
        let body: CurrentWeather = self
            .agent
            .get(&self.endpoint)
            .query("q", city)
            .query("units", &self.units)
            .query("appid", &self.api_key)
            .call()?
            .body_mut()
            .read_json()?;
        report_from(body)
    }
}

impl WeatherSource for WeatherResolver {
    fn resolve(&self, city: &str) -> WeatherReport {
        match self.fetch(city) {
            Ok(report) => report,
            Err(e) => {
                let fallback = WeatherReport::default();
                log::warn!(
                    "Weather lookup for {city} failed: {e}. Using code {} at {}",
                    fallback.code,
                    fallback.temperature
                );
                fallback
            }
        }
    }
}

/// An unrecognized condition keeps its temperature and takes the default code.
fn report_from(body: CurrentWeather) -> Result<WeatherReport, WeatherError> {
    let condition = body
        .weather
        .first()
        .ok_or_else(|| WeatherError::MalformedResponse("empty 'weather' array".into()))?;
    let temperature = body
        .main
        .ok_or_else(|| WeatherError::MalformedResponse("missing 'main' block".into()))?
        .temp;
    let code = codes::WEATHER.get(&condition.main).unwrap_or_else(|| {
        log::warn!("Unknown weather condition '{}'", condition.main);
        codes::WEATHER.default
    });
    Ok(WeatherReport { code, temperature })
}

/// Fixed answer, for offline runs and tests.
pub struct StaticWeather(pub WeatherReport);

impl WeatherSource for StaticWeather {
    fn resolve(&self, _city: &str) -> WeatherReport {
        self.0
    }
}
