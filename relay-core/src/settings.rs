//! Settings page shown on the phone.
//!
//! The page itself is rendered elsewhere; this module only describes it and
//! interprets what comes back when the user closes it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::RefreshPolicy;

pub const REFRESH_WEATHER_ID: &str = "refresh-weather";
pub const REFRESH_GPS_ID: &str = "refresh-gps";

/// One element of the declarative settings page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SettingsItem {
    Heading {
        #[serde(rename = "defaultValue")]
        default_value: String,
    },
    Text {
        #[serde(rename = "defaultValue")]
        default_value: String,
    },
    Section {
        items: Vec<SettingsItem>,
    },
    Submit {
        id: String,
        #[serde(rename = "defaultValue")]
        default_value: String,
    },
}

impl SettingsItem {
    fn heading(text: &str) -> Self {
        Self::Heading {
            default_value: text.to_string(),
        }
    }

    fn text(text: impl Into<String>) -> Self {
        Self::Text {
            default_value: text.into(),
        }
    }

    fn submit(id: &str, label: &str) -> Self {
        Self::Submit {
            id: id.to_string(),
            default_value: label.to_string(),
        }
    }
}

/// Build the settings page for the given policy.
pub fn descriptor(policy: &RefreshPolicy) -> Vec<SettingsItem> {
    vec![
        SettingsItem::heading("Sliding Text++ Settings"),
        SettingsItem::text("View weather and GPS status, and manually refresh data."),
        SettingsItem::Section {
            items: vec![
                SettingsItem::heading("Status Information"),
                SettingsItem::text(
                    "Check the app logs for current weather and GPS status. \
                     Stats are logged when you open this page.",
                ),
            ],
        },
        SettingsItem::Section {
            items: vec![
                SettingsItem::heading("Manual Refresh"),
                SettingsItem::submit(REFRESH_WEATHER_ID, "Refresh Weather Now"),
                SettingsItem::submit(REFRESH_GPS_ID, "Refresh GPS Location"),
            ],
        },
        SettingsItem::Section {
            items: vec![
                SettingsItem::heading("Info"),
                SettingsItem::text(format!(
                    "Weather updates every {}",
                    describe(policy.weather_update_interval)
                )),
                SettingsItem::text(format!(
                    "GPS cached for {}",
                    describe(policy.gps_cache_duration)
                )),
            ],
        },
    ]
}

fn describe(d: chrono::Duration) -> String {
    let minutes = d.num_minutes();
    if minutes >= 60 && minutes % 60 == 0 {
        let hours = minutes / 60;
        format!("{hours} hour{}", if hours == 1 { "" } else { "s" })
    } else {
        format!("{minutes} minute{}", if minutes == 1 { "" } else { "s" })
    }
}

/// Something the user asked for on the settings page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsAction {
    RefreshWeather,
    RefreshGps,
}

/// Interpret the response delivered when the settings page closes.
///
/// `Ok(None)` means the user cancelled. Otherwise the returned actions are in
/// execution order: weather first, then GPS.
pub fn parse_response(raw: &str) -> Result<Option<Vec<SettingsAction>>, serde_json::Error> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(raw)?;
    let Value::Object(dict) = value else {
        return Ok(Some(Vec::new()));
    };

    let mut actions = Vec::new();
    if dict.get(REFRESH_WEATHER_ID).is_some_and(truthy) {
        actions.push(SettingsAction::RefreshWeather);
    }
    if dict.get(REFRESH_GPS_ID).is_some_and(truthy) {
        actions.push(SettingsAction::RefreshGps);
    }
    Ok(Some(actions))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) => true,
        // The page may wrap values as {"value": ...}.
        Value::Object(obj) => obj.get("value").is_none_or(truthy),
    }
}
