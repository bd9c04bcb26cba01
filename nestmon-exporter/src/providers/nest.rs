//! Nest thermostat provider.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::NestConfig;
use crate::exposition::{self, Gauge, GaugeValue};
use url::Url;

use crate::providers::{endpoint, get_text, http_client};
use crate::source::{MetricSource, SourceError};

pub const NAME: &str = "nest";
pub const DEPENDENCY: &str = "NEST_API";
pub const DESCRIPTION: &str = "Get Json Thermostat data";

/// HVAC heating/cooling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HvacMode {
    Off,
    Eco,
    Cool,
    Heat,
    HeatCool,
}

impl HvacMode {
    pub fn code(self) -> i64 {
        match self {
            HvacMode::Off => 0,
            HvacMode::Eco => 1,
            HvacMode::Cool => 2,
            HvacMode::Heat => 3,
            HvacMode::HeatCool => 4,
        }
    }
}

/// Whether the HVAC system is actively running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HvacState {
    Heating,
    Cooling,
    Off,
}

impl HvacState {
    pub fn code(self) -> i64 {
        match self {
            HvacState::Heating => 1,
            HvacState::Cooling => -1,
            HvacState::Off => 0,
        }
    }
}

/// Thermostat fields exported as gauges.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Thermostat {
    pub last_connection: DateTime<Utc>,
    pub is_online: bool,
    pub can_cool: bool,
    pub can_heat: bool,
    pub has_fan: bool,
    pub has_leaf: bool,
    pub target_temperature_f: i64,
    pub target_temperature_high_f: i64,
    pub target_temperature_low_f: i64,
    pub eco_temperature_high_f: i64,
    pub eco_temperature_low_f: i64,
    pub hvac_mode: HvacMode,
    pub ambient_temperature_f: i64,
    pub humidity: i64,
    pub hvac_state: HvacState,
}

impl Thermostat {
    /// Gauges in export order, with `last_connection` measured from `now`.
    pub fn gauges(&self, now: DateTime<Utc>) -> Vec<Gauge> {
        vec![
            Gauge::new(
                "last_connection",
                "Number of seconds since the last successful interaction with the Nest service.",
                GaugeValue::elapsed(now - self.last_connection),
            ),
            Gauge::new(
                "is_online",
                "Device connection status with the Nest service.",
                self.is_online,
            ),
            Gauge::new(
                "can_cool",
                "System ability to cool (has AC).",
                self.can_cool,
            ),
            Gauge::new("can_heat", "System ability to heat.", self.can_heat),
            Gauge::new(
                "has_fan",
                "System ability to control the fan independently from heating or cooling.",
                self.has_fan,
            ),
            Gauge::new(
                "has_leaf",
                "Displayed when the thermostat is set to an energy-saving temperature.",
                self.has_leaf,
            ),
            Gauge::new(
                "target_temperature_f",
                "Desired temperature, in full degrees Fahrenheit (1F). Used when hvac_mode = heat or cool.",
                self.target_temperature_f,
            ),
            Gauge::new(
                "target_temperature_high_f",
                "Maximum target temperature, displayed in whole degrees Fahrenheit (1F). Used when hvac_mode = heat-cool (HeatCool mode).",
                self.target_temperature_high_f,
            ),
            Gauge::new(
                "target_temperature_low_f",
                "Minimum target temperature, displayed in whole degrees Fahrenheit (1F). Used when hvac_mode = heat-cool (HeatCool mode).",
                self.target_temperature_low_f,
            ),
            Gauge::new(
                "eco_temperature_high_f",
                "Maximum Eco Temperature, displayed in whole degrees Fahrenheit (1F). Used when hvac_mode = eco.",
                self.eco_temperature_high_f,
            ),
            Gauge::new(
                "eco_temperature_low_f",
                "Minimum Eco Temperature, displayed in whole degrees Fahrenheit (1F). Used when hvac_mode = eco.",
                self.eco_temperature_low_f,
            ),
            Gauge::new(
                "hvac_mode",
                "Indicates HVAC system heating/cooling modes, like HeatCool for systems with heating and cooling capacity, or Eco Temperatures for energy savings. (0=off, 1=eco, 2=cool, 3=heat, 4=heat-cool)",
                self.hvac_mode.code(),
            ),
            Gauge::new(
                "ambient_temperature_f",
                "Temperature, measured at the device, in whole degrees Fahrenheit (1F).",
                self.ambient_temperature_f,
            ),
            Gauge::new(
                "humidity",
                "Humidity, in percent (%) format, measured at the device, rounded to the nearest 5%.",
                self.humidity,
            ),
            Gauge::new(
                "hvac_state",
                "Indicates whether HVAC system is actively heating, cooling or is off. Use this value to indicate HVAC activity state. (0=off, 1=heating, -1=cooling)",
                self.hvac_state.code(),
            ),
        ]
    }

    /// Render as exposition text.
    pub fn render(&self, now: DateTime<Utc>) -> String {
        exposition::render(&self.gauges(now))
    }
}

/// Polls one thermostat through the Nest developer API.
pub struct NestSource {
    client: reqwest::Client,
    url: Url,
    token: String,
}

impl NestSource {
    pub fn new(config: &NestConfig) -> reqwest::Result<Self> {
        Ok(Self {
            client: http_client(config.timeout)?,
            url: endpoint(
                &config.base_url,
                &["devices", "thermostats", config.device_id.as_str()],
            ),
            token: config.token.clone(),
        })
    }

    /// Thermostat endpoint this source polls.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl MetricSource for NestSource {
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
        get_text(
            self.client.get(self.url.clone()).bearer_auth(&self.token),
            DEPENDENCY,
        )
        .await
    }

    fn render(&self, body: &str) -> Result<String, SourceError> {
        let thermostat: Thermostat =
            serde_json::from_str(body).map_err(|e| SourceError::decode(DEPENDENCY, e))?;
        Ok(thermostat.render(Utc::now()))
    }
}
