//! OpenWeather current-conditions provider.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::OpenWeatherConfig;
use crate::exposition::{self, Gauge};
use url::Url;

use crate::providers::{endpoint, get_text, http_client};
use crate::source::{MetricSource, SourceError};

pub const NAME: &str = "openweather";
pub const DEPENDENCY: &str = "OPENWEATHER_API";
pub const DESCRIPTION: &str = "Get Json weather";

/// Units requested from the API. Temperatures come back in Fahrenheit.
const UNITS: &str = "imperial";

/// The `main` block of a current weather response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MainReadings {
    pub temp: f64,
    pub pressure: f64,
    pub humidity: f64,
    pub temp_min: f64,
    pub temp_max: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Weather {
    pub main: MainReadings,
}

impl Weather {
    pub fn gauges(&self) -> Vec<Gauge> {
        let main = &self.main;
        vec![
            Gauge::new(
                "openweather_temperature",
                "Temperature, Fahrenheit",
                main.temp,
            ),
            Gauge::new(
                "openweather_pressure",
                "Atmospheric pressure (on the sea level, if there is no sea_level or grnd_level data), hPa",
                main.pressure,
            ),
            Gauge::new("openweather_humidity", "Humidity, %", main.humidity),
            Gauge::new(
                "openweather_temperature_min",
                "Minimum temperature at the moment. This is deviation from current temp that is possible for large cities and megalopolises geographically expanded (use these parameter optionally). Fahrenheit",
                main.temp_min,
            ),
            Gauge::new(
                "openweather_temperature_max",
                "Maximum temperature at the moment. This is deviation from current temp that is possible for large cities and megalopolises geographically expanded (use these parameter optionally). Fahrenheit",
                main.temp_max,
            ),
        ]
    }

    pub fn render(&self) -> String {
        exposition::render(&self.gauges())
    }
}

/// Polls current weather for one city. The API key travels as a query parameter.
pub struct OpenWeatherSource {
    client: reqwest::Client,
    url: Url,
    city_id: String,
    token: String,
}

impl OpenWeatherSource {
    pub fn new(config: &OpenWeatherConfig) -> reqwest::Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            url: endpoint(&config.base_url, &["data", "2.5", "weather"]),
            city_id: config.city_id.clone(),
            token: config.token.clone(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl MetricSource for OpenWeatherSource {
    fn name(&self) -> &str {
        NAME
    }

    fn dependency(&self) -> &str {
        DEPENDENCY
    }

    fn description(&self) -> &str {
        DESCRIPTION
    }

    async fn fetch(&self) -> Result<String, SourceError> {
        let request = self.client.get(self.url.clone()).query(&[
            ("id", self.city_id.as_str()),
            ("units", UNITS),
            ("appid", self.token.as_str()),
        ]);
        get_text(request, DEPENDENCY).await
    }

    fn render(&self, body: &str) -> Result<String, SourceError> {
        let weather: Weather =
            serde_json::from_str(body).map_err(|e| SourceError::decode(DEPENDENCY, e))?;
        Ok(weather.render())
    }
}
