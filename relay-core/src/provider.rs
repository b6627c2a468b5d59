use crate::{
    Config,
    error::FetchError,
    model::{Coordinates, Observation},
    provider::{
        fixed::FixedWeatherFetcher,
        openweather::{Endpoint, OpenWeatherFetcher},
    },
};
use async_trait::async_trait;
use std::{convert::TryFrom, fmt::Debug};

pub mod fixed;
pub mod openweather;

/// Which weather source the relay uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetcherKind {
    /// OpenWeather "current weather" endpoint, a single reading.
    Current,
    /// OpenWeather "forecast" endpoint, first upcoming 3-hour slot.
    Forecast,
    /// Canned reading, no network access. Useful for checking the device link.
    Fixed,
}

impl FetcherKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetcherKind::Current => "current",
            FetcherKind::Forecast => "forecast",
            FetcherKind::Fixed => "fixed",
        }
    }

    pub const fn all() -> &'static [FetcherKind] {
        &[FetcherKind::Current, FetcherKind::Forecast, FetcherKind::Fixed]
    }

    /// How often the relay re-checks staleness when driven by this source.
    pub fn default_poll_secs(&self) -> u64 {
        match self {
            FetcherKind::Forecast => 5 * 60,
            FetcherKind::Current | FetcherKind::Fixed => 15 * 60,
        }
    }

    pub fn needs_api_key(&self) -> bool {
        !matches!(self, FetcherKind::Fixed)
    }
}

impl std::fmt::Display for FetcherKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for FetcherKind {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "current" => Ok(FetcherKind::Current),
            "forecast" => Ok(FetcherKind::Forecast),
            "fixed" => Ok(FetcherKind::Fixed),
            _ => Err(anyhow::anyhow!(
                "Unknown weather fetcher '{value}'. Supported fetchers: current, forecast, fixed."
            )),
        }
    }
}

/// Source of weather observations for a pair of coordinates.
#[async_trait]
pub trait WeatherFetcher: Send + Sync + Debug {
    async fn fetch(&self, at: Coordinates) -> Result<Observation, FetchError>;
}

/// Build the fetcher selected in the config.
pub fn fetcher_from_config(config: &Config) -> anyhow::Result<Box<dyn WeatherFetcher>> {
    let kind = config.fetcher_kind()?;
    let api_key = config.api_key.clone().unwrap_or_default();

    let boxed: Box<dyn WeatherFetcher> = match kind {
        FetcherKind::Fixed => Box::new(FixedWeatherFetcher::default()),
        FetcherKind::Current | FetcherKind::Forecast => {
            let endpoint = if kind == FetcherKind::Current {
                Endpoint::Current
            } else {
                Endpoint::Forecast
            };
            let mut fetcher = OpenWeatherFetcher::new(api_key, endpoint)?;
            if let Some(base) = &config.base_url {
                fetcher = fetcher.with_base_url(base);
            }
            Box::new(fetcher)
        }
    };

    Ok(boxed)
}
