use serde::{Deserialize, Serialize};
use std::fmt;

/// Offset between Kelvin and Celsius.
pub const KELVIN_OFFSET: f64 = 273.15;

/// Condition label the device shows when no position could be obtained.
pub const ERROR_CONDITION: &str = "error";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// A raw reading as the weather provider reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub temperature_k: f64,
    /// Provider's numeric weather-condition id (e.g. 500 = light rain).
    pub condition_id: i64,
    /// Provider's short condition group, e.g. "Rain".
    pub condition: String,
}

/// Icon set baked into the device firmware. The discriminants are the wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum WeatherIcon {
    Clear = 0,
    Clouds = 1,
    Rain = 2,
    Snow = 3,
}

impl WeatherIcon {
    /// Map a provider condition id onto the device icon set.
    ///
    /// Thresholds are fixed by the icons shipped on the device: everything
    /// below 600 (thunderstorm, drizzle, rain) shows rain, the 6xx group shows
    /// snow, ids above 800 show clouds and the rest (7xx atmosphere, 800) clear.
    pub fn from_condition_id(id: i64) -> Self {
        if id < 600 {
            Self::Rain
        } else if id < 700 {
            Self::Snow
        } else if id > 800 {
            Self::Clouds
        } else {
            Self::Clear
        }
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

impl From<WeatherIcon> for u8 {
    fn from(icon: WeatherIcon) -> Self {
        icon.code()
    }
}

impl TryFrom<u8> for WeatherIcon {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Clear),
            1 => Ok(Self::Clouds),
            2 => Ok(Self::Rain),
            3 => Ok(Self::Snow),
            other => Err(format!("unknown weather icon code {other}")),
        }
    }
}

/// Convert Kelvin to whole degrees Celsius.
///
/// Halves round towards positive infinity, matching the values the device
/// has always been sent.
pub fn kelvin_to_celsius(kelvin: f64) -> i32 {
    (kelvin - KELVIN_OFFSET + 0.5).floor() as i32
}

/// Normalized reading ready to be relayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub icon: WeatherIcon,
    pub temperature_c: i32,
    pub condition: String,
}

impl WeatherReading {
    pub fn from_observation(obs: &Observation) -> Self {
        Self {
            icon: WeatherIcon::from_condition_id(obs.condition_id),
            temperature_c: kelvin_to_celsius(obs.temperature_k),
            condition: obs.condition.to_lowercase(),
        }
    }
}

/// The fixed-shape record sent to the device.
///
/// On the wire it is a dictionary with numeric keys: `0` icon, `1`
/// temperature, `2` condition label. The error record leaves out key `0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceMessage {
    #[serde(rename = "0", default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<WeatherIcon>,
    #[serde(rename = "1")]
    pub temperature: i32,
    #[serde(rename = "2")]
    pub condition: String,
}

impl DeviceMessage {
    /// Sent when no location is available at all.
    pub fn location_error() -> Self {
        Self {
            icon: None,
            temperature: 0,
            condition: ERROR_CONDITION.to_string(),
        }
    }
}

impl From<&WeatherReading> for DeviceMessage {
    fn from(reading: &WeatherReading) -> Self {
        Self {
            icon: Some(reading.icon),
            temperature: reading.temperature_c,
            condition: reading.condition.clone(),
        }
    }
}
