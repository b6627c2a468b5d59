//! Position sources for the relay.
//!
//! A bridge process rarely has a GPS receiver of its own, so besides fixed
//! coordinates from the config there is an IP-based lookup. Both sit behind
//! [`LocationProvider`] so the engine does not care which one it talks to.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

use crate::{error::LocationError, model::Coordinates};

pub const DEFAULT_IP_LOOKUP_URL: &str = "http://ip-api.com/json";

/// Knobs passed along with every position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationOptions {
    /// Give up on the fix after this long.
    pub timeout: Duration,
    /// A fix younger than this may be served without asking again.
    pub maximum_age: Duration,
}

impl Default for LocationOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            maximum_age: Duration::from_secs(60),
        }
    }
}

#[async_trait]
pub trait LocationProvider: Send + Sync + Debug {
    async fn current_position(&self, options: &LocationOptions)
    -> Result<Coordinates, LocationError>;
}

/// Where the relay gets its position from, as written in the config file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LocationSource {
    Static { latitude: f64, longitude: f64 },
    #[default]
    Ip,
}

impl std::fmt::Display for LocationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LocationSource::Static {
                latitude,
                longitude,
            } => write!(f, "static ({latitude:.4}, {longitude:.4})"),
            LocationSource::Ip => f.write_str("ip lookup"),
        }
    }
}

impl LocationSource {
    pub fn into_provider(self) -> Result<Box<dyn LocationProvider>, LocationError> {
        let boxed: Box<dyn LocationProvider> = match self {
            LocationSource::Static {
                latitude,
                longitude,
            } => Box::new(StaticLocation::new(Coordinates::new(latitude, longitude))),
            LocationSource::Ip => Box::new(IpLocation::new()?),
        };
        Ok(boxed)
    }
}

/// Always reports the same coordinates.
#[derive(Debug, Clone)]
pub struct StaticLocation {
    coordinates: Coordinates,
}

impl StaticLocation {
    pub fn new(coordinates: Coordinates) -> Self {
        Self { coordinates }
    }
}

#[async_trait]
impl LocationProvider for StaticLocation {
    async fn current_position(
        &self,
        _options: &LocationOptions,
    ) -> Result<Coordinates, LocationError> {
        Ok(self.coordinates)
    }
}

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    message: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

/// Approximate position from the public IP address.
#[derive(Debug)]
pub struct IpLocation {
    url: String,
    http: Client,
    last_fix: Mutex<Option<(Instant, Coordinates)>>,
}

impl IpLocation {
    pub fn new() -> Result<Self, LocationError> {
        let http = Client::builder()
            .build()
            .map_err(|e| LocationError::PositionUnavailable(e.to_string()))?;

        Ok(Self {
            url: DEFAULT_IP_LOOKUP_URL.to_string(),
            http,
            last_fix: Mutex::new(None),
        })
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    fn recent_fix(&self, maximum_age: Duration) -> Option<Coordinates> {
        let guard = self.last_fix.lock().unwrap_or_else(PoisonError::into_inner);
        guard
            .as_ref()
            .filter(|(at, _)| at.elapsed() < maximum_age)
            .map(|(_, coords)| *coords)
    }

    fn remember(&self, coords: Coordinates) {
        let mut guard = self.last_fix.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = Some((Instant::now(), coords));
    }

    async fn lookup(&self, timeout: Duration) -> Result<Coordinates, LocationError> {
        let map_err = |e: reqwest::Error| {
            if e.is_timeout() {
                LocationError::Timeout(timeout)
            } else {
                LocationError::PositionUnavailable(e.to_string())
            }
        };

        let res = self
            .http
            .get(&self.url)
            .timeout(timeout)
            .send()
            .await
            .map_err(map_err)?;

        match res.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(LocationError::PermissionDenied(format!(
                    "lookup service answered {}",
                    res.status()
                )));
            }
            status if !status.is_success() => {
                return Err(LocationError::PositionUnavailable(format!(
                    "lookup service answered {status}"
                )));
            }
            _ => {}
        }

        let body: IpApiResponse = res.json().await.map_err(map_err)?;

        match (body.status.as_str(), body.lat, body.lon) {
            ("success", Some(lat), Some(lon)) => Ok(Coordinates::new(lat, lon)),
            _ => Err(LocationError::PositionUnavailable(
                body.message
                    .unwrap_or_else(|| format!("lookup status '{}'", body.status)),
            )),
        }
    }
}

#[async_trait]
impl LocationProvider for IpLocation {
    async fn current_position(
        &self,
        options: &LocationOptions,
    ) -> Result<Coordinates, LocationError> {
        if let Some(coords) = self.recent_fix(options.maximum_age) {
            tracing::debug!("Reusing IP fix younger than {:?}", options.maximum_age);
            return Ok(coords);
        }

        let coords = self.lookup(options.timeout).await?;
        self.remember(coords);
        Ok(coords)
    }
}
