use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::{
    error::FetchError,
    model::{Coordinates, Observation},
};

use super::WeatherFetcher;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
const USER_AGENT: &str = concat!("weather-relay/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// OpenWeather endpoint to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Current,
    Forecast,
}

impl Endpoint {
    fn path(&self) -> &'static str {
        match self {
            Endpoint::Current => "weather",
            Endpoint::Forecast => "forecast",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OpenWeatherFetcher {
    api_key: String,
    endpoint: Endpoint,
    base_url: String,
    http: Client,
}

impl OpenWeatherFetcher {
    pub fn new(api_key: String, endpoint: Endpoint) -> Result<Self, FetchError> {
        // Only the connect phase is bounded; the request itself runs to completion.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            api_key,
            endpoint,
            base_url: DEFAULT_BASE_URL.to_string(),
            http,
        })
    }

    /// Point the fetcher at another host, e.g. a mock server in tests.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self) -> String {
        format!("{}/{}", self.base_url, self.endpoint.path())
    }

    async fn get(&self, at: Coordinates) -> Result<String, FetchError> {
        if self.api_key.is_empty() {
            return Err(FetchError::MissingApiKey);
        }

        let url = self.url();
        let lat = at.latitude.to_string();
        let lon = at.longitude.to_string();
        tracing::debug!("Fetching {url}?lat={lat}&lon={lon}&cnt=1&appid=API_KEY");

        let res = self
            .http
            .get(&url)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("cnt", "1"),
                ("appid", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(transport)?;

        let status = res.status();
        let body = res.text().await.map_err(transport)?;

        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        tracing::trace!("OpenWeather response: {body}");
        Ok(body)
    }
}

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    id: i64,
    main: String,
}

#[derive(Debug, Deserialize)]
struct OwEntry {
    main: OwMain,
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    list: Vec<OwEntry>,
}

impl OwEntry {
    fn into_observation(self) -> Result<Observation, FetchError> {
        let weather = self
            .weather
            .into_iter()
            .next()
            .ok_or_else(|| FetchError::Parse("response contained no weather conditions".into()))?;

        Ok(Observation {
            temperature_k: self.main.temp,
            condition_id: weather.id,
            condition: weather.main,
        })
    }
}

fn parse_body(endpoint: Endpoint, body: &str) -> Result<Observation, FetchError> {
    let entry = match endpoint {
        Endpoint::Current => {
            serde_json::from_str::<OwEntry>(body).map_err(|e| FetchError::Parse(e.to_string()))?
        }
        Endpoint::Forecast => {
            let parsed: OwForecastResponse =
                serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;
            parsed
                .list
                .into_iter()
                .next()
                .ok_or_else(|| FetchError::Parse("forecast response contained no entries".into()))?
        }
    };

    entry.into_observation()
}

#[async_trait]
impl WeatherFetcher for OpenWeatherFetcher {
    async fn fetch(&self, at: Coordinates) -> Result<Observation, FetchError> {
        let body = self.get(at).await?;
        parse_body(self.endpoint, &body)
    }
}

/// reqwest puts the request URL, `appid` included, into its error text.
fn transport(err: reqwest::Error) -> FetchError {
    FetchError::Transport(err.without_url())
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_current_weather_body() {
        let body = r#"{
            "coord": {"lon": 4.9, "lat": 52.37},
            "weather": [{"id": 803, "main": "Clouds", "description": "broken clouds"}],
            "main": {"temp": 288.4, "feels_like": 287.9, "humidity": 81},
            "name": "Amsterdam"
        }"#;

        let obs = parse_body(Endpoint::Current, body).unwrap();
        assert_eq!(obs.condition_id, 803);
        assert_eq!(obs.condition, "Clouds");
        assert!((obs.temperature_k - 288.4).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_first_forecast_entry() {
        let body = r#"{
            "cod": "200",
            "cnt": 2,
            "list": [
                {"dt": 1, "main": {"temp": 270.0}, "weather": [{"id": 601, "main": "Snow"}]},
                {"dt": 2, "main": {"temp": 280.0}, "weather": [{"id": 800, "main": "Clear"}]}
            ]
        }"#;

        let obs = parse_body(Endpoint::Forecast, body).unwrap();
        assert_eq!(obs.condition_id, 601);
        assert_eq!(obs.condition, "Snow");
    }

    #[test]
    fn empty_forecast_list_is_a_parse_error() {
        let err = parse_body(Endpoint::Forecast, r#"{"list": []}"#).unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[test]
    fn missing_weather_array_entry_is_a_parse_error() {
        let err = parse_body(Endpoint::Current, r#"{"main": {"temp": 280.0}, "weather": []}"#)
            .unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[test]
    fn truncates_long_bodies() {
        let long = "x".repeat(500);
        let truncated = truncate_body(&long);
        assert_eq!(truncated.len(), 203);
        assert!(truncated.ends_with("..."));
        assert_eq!(truncate_body("short"), "short");
    }

    #[tokio::test]
    async fn empty_key_short_circuits_without_request() {
        let fetcher = OpenWeatherFetcher::new(String::new(), Endpoint::Current)
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let err = fetcher.fetch(Coordinates::new(0.0, 0.0)).await.unwrap_err();
        assert!(matches!(err, FetchError::MissingApiKey));
    }

    #[tokio::test]
    async fn transport_error_does_not_leak_key() {
        let fetcher = OpenWeatherFetcher::new("SECRETKEY0123456789".into(), Endpoint::Current)
            .unwrap()
            .with_base_url("http://127.0.0.1:9");
        let err = fetcher.fetch(Coordinates::new(1.0, 2.0)).await.unwrap_err();

        assert!(matches!(err, FetchError::Transport(_)));
        assert!(!err.to_string().contains("SECRETKEY"));
        assert!(!format!("{err:?}").contains("SECRETKEY"));
    }
}
