//! Refresh policy: decides when to ask for a new position, when to fetch
//! weather, and what to tell the device.
//!
//! Positions are expensive (GPS drains the phone battery), so a fix is kept
//! for [`RefreshPolicy::gps_cache_duration`] while weather is refreshed every
//! [`RefreshPolicy::weather_update_interval`]. Every failure is absorbed here
//! and reported through [`RefreshOutcome`]; nothing propagates to the caller.

use chrono::{DateTime, Utc};
use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use crate::{
    error::LocationError,
    location::{LocationOptions, LocationProvider},
    model::{Coordinates, DeviceMessage, WeatherReading},
    provider::WeatherFetcher,
    settings::SettingsAction,
    sink::MessageSink,
};

/// Source of "now" for staleness checks.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    /// A position fix younger than this is reused without asking the provider.
    pub gps_cache_duration: chrono::Duration,
    /// Weather younger than this is left alone unless a refresh is forced.
    pub weather_update_interval: chrono::Duration,
    pub location: LocationOptions,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            gps_cache_duration: chrono::Duration::hours(3),
            weather_update_interval: chrono::Duration::minutes(15),
            location: LocationOptions::default(),
        }
    }
}

/// Last successful position fix.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationCache {
    pub coordinates: Coordinates,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct EngineState {
    location: Option<LocationCache>,
    /// Set only after the device accepted a weather message.
    last_weather_at: Option<DateTime<Utc>>,
}

/// Where the coordinates used for a fetch came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixSource {
    /// Cached fix still inside the cache window; provider not asked.
    Cached,
    /// New fix from the provider.
    Fresh,
    /// Provider failed; fell back to an expired cached fix.
    Stale,
}

/// What a refresh cycle ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Weather still fresh; nothing was called.
    Skipped,
    Delivered {
        reading: WeatherReading,
        fix: FixSource,
    },
    FetchFailed {
        fix: FixSource,
    },
    DeliveryFailed {
        reading: WeatherReading,
        fix: FixSource,
    },
    /// No position and nothing cached; the error record was sent (`notified`
    /// tells whether the device accepted it).
    LocationUnavailable {
        notified: bool,
    },
}

/// Snapshot for the status block shown when the settings page opens.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub now: DateTime<Utc>,
    pub last_weather_at: Option<DateTime<Utc>>,
    pub location: Option<LocationCache>,
    pub api_key_configured: bool,
}

/// Human "time ago" used in status output.
pub fn time_ago(now: DateTime<Utc>, at: Option<DateTime<Utc>>) -> String {
    let Some(at) = at else {
        return "Never".to_string();
    };
    match age_minutes(now - at) {
        0 => "Just now".to_string(),
        minutes => format!("{minutes} minute(s) ago"),
    }
}

fn age_minutes(age: chrono::Duration) -> i64 {
    (age.num_milliseconds() as f64 / 60_000.0).round() as i64
}

impl fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Current Status ---")?;
        writeln!(
            f,
            "Last Weather Update: {}",
            time_ago(self.now, self.last_weather_at)
        )?;
        writeln!(
            f,
            "Last GPS Update: {}",
            time_ago(self.now, self.location.map(|l| l.fetched_at))
        )?;
        match &self.location {
            Some(cache) => writeln!(f, "Cached Location: {}", cache.coordinates)?,
            None => writeln!(f, "Cached Location: None")?,
        }
        writeln!(
            f,
            "API Key Status: {}",
            if self.api_key_configured {
                "Configured"
            } else {
                "Missing"
            }
        )?;
        write!(f, "---------------------")
    }
}

/// Owns the cached position and weather timestamps for one paired device.
#[derive(Debug)]
pub struct RefreshEngine {
    policy: RefreshPolicy,
    clock: Box<dyn Clock>,
    location: Box<dyn LocationProvider>,
    fetcher: Box<dyn WeatherFetcher>,
    sink: Box<dyn MessageSink>,
    api_key_configured: bool,
    state: Mutex<EngineState>,
    // Held for a whole cycle so overlapping triggers run one after another.
    cycle: tokio::sync::Mutex<()>,
}

impl RefreshEngine {
    pub fn new(
        location: Box<dyn LocationProvider>,
        fetcher: Box<dyn WeatherFetcher>,
        sink: Box<dyn MessageSink>,
    ) -> Self {
        Self {
            policy: RefreshPolicy::default(),
            clock: Box::new(SystemClock),
            location,
            fetcher,
            sink,
            api_key_configured: true,
            state: Mutex::new(EngineState::default()),
            cycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_policy(mut self, policy: RefreshPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Only reported in [`EngineStatus`]; fetches are attempted either way.
    pub fn with_api_key_configured(mut self, configured: bool) -> Self {
        self.api_key_configured = configured;
        self
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn status(&self) -> EngineStatus {
        let state = self.lock_state();
        EngineStatus {
            now: self.clock.now(),
            last_weather_at: state.last_weather_at,
            location: state.location,
            api_key_configured: self.api_key_configured,
        }
    }

    pub fn cached_location(&self) -> Option<LocationCache> {
        self.lock_state().location
    }

    /// Forget the cached fix so the next cycle asks the provider.
    pub fn invalidate_location(&self) {
        self.lock_state().location = None;
    }

    /// Refresh if the weather is stale (or unconditionally when `force`).
    pub async fn maybe_refresh(&self, force: bool) -> RefreshOutcome {
        let _cycle = self.cycle.lock().await;
        self.run_cycle(force).await
    }

    pub async fn refresh_weather(&self) -> RefreshOutcome {
        self.maybe_refresh(true).await
    }

    /// Drop the cached fix, then force a full refresh with a new one.
    pub async fn refresh_gps(&self) -> RefreshOutcome {
        let _cycle = self.cycle.lock().await;
        self.invalidate_location();
        self.run_cycle(true).await
    }

    /// Run the actions picked on the settings page, in order.
    pub async fn apply_settings(&self, actions: &[SettingsAction]) -> Vec<RefreshOutcome> {
        let mut outcomes = Vec::with_capacity(actions.len());
        for action in actions {
            let outcome = match action {
                SettingsAction::RefreshWeather => {
                    tracing::info!("Refresh weather requested from settings");
                    self.refresh_weather().await
                }
                SettingsAction::RefreshGps => {
                    tracing::info!("Refresh GPS requested from settings");
                    self.refresh_gps().await
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    async fn run_cycle(&self, force: bool) -> RefreshOutcome {
        let now = self.clock.now();
        let (cached, last_weather_at) = {
            let state = self.lock_state();
            (state.location, state.last_weather_at)
        };

        let weather_age = last_weather_at.map(|at| now - at);
        let stale = weather_age.is_none_or(|age| age >= self.policy.weather_update_interval);
        let age_label = weather_age.map_or_else(|| "never".to_string(), |a| {
            format!("{} minutes", age_minutes(a))
        });

        if !force && !stale {
            tracing::debug!("Weather is fresh, skipping update (age: {age_label})");
            return RefreshOutcome::Skipped;
        }
        tracing::info!("Weather update needed (age: {age_label}, forced: {force})");

        let (coordinates, fix) = match self.resolve_location(now, cached).await {
            Some(found) => found,
            None => return self.notify_location_error().await,
        };

        self.relay_weather(coordinates, fix).await
    }

    async fn resolve_location(
        &self,
        now: DateTime<Utc>,
        cached: Option<LocationCache>,
    ) -> Option<(Coordinates, FixSource)> {
        if let Some(cache) = cached {
            let age = now - cache.fetched_at;
            if age < self.policy.gps_cache_duration {
                tracing::debug!(
                    "Using cached GPS location (age: {} minutes)",
                    age_minutes(age)
                );
                return Some((cache.coordinates, FixSource::Cached));
            }
        }

        tracing::info!("Requesting fresh location");
        match self.request_position().await {
            Ok(coordinates) => {
                let fetched_at = self.clock.now();
                self.lock_state().location = Some(LocationCache {
                    coordinates,
                    fetched_at,
                });
                tracing::info!("Location cached: {coordinates}");
                Some((coordinates, FixSource::Fresh))
            }
            Err(err) => {
                tracing::warn!("Location error ({}): {err}", err.code());
                cached.map(|cache| {
                    tracing::info!("Using cached location due to location error");
                    (cache.coordinates, FixSource::Stale)
                })
            }
        }
    }

    async fn request_position(&self) -> Result<Coordinates, LocationError> {
        let options = self.policy.location;
        tokio::time::timeout(options.timeout, self.location.current_position(&options))
            .await
            .unwrap_or(Err(LocationError::Timeout(options.timeout)))
    }

    async fn notify_location_error(&self) -> RefreshOutcome {
        let notified = match self.sink.send(&DeviceMessage::location_error()).await {
            Ok(()) => {
                tracing::info!("Error message sent to device");
                true
            }
            Err(err) => {
                tracing::error!("Failed to send error to device: {err}");
                false
            }
        };
        RefreshOutcome::LocationUnavailable { notified }
    }

    async fn relay_weather(&self, coordinates: Coordinates, fix: FixSource) -> RefreshOutcome {
        let observation = match self.fetcher.fetch(coordinates).await {
            Ok(observation) => observation,
            Err(err) => {
                tracing::error!("Weather fetch failed: {err}");
                return RefreshOutcome::FetchFailed { fix };
            }
        };

        let reading = WeatherReading::from_observation(&observation);
        let message = DeviceMessage::from(&reading);
        tracing::debug!(
            icon = reading.icon.code(),
            temperature = reading.temperature_c,
            condition = %reading.condition,
            "Sending weather to device"
        );

        match self.sink.send(&message).await {
            Ok(()) => {
                self.lock_state().last_weather_at = Some(self.clock.now());
                tracing::info!(
                    "Weather sent: {} °C, {}",
                    reading.temperature_c,
                    reading.condition
                );
                RefreshOutcome::Delivered { reading, fix }
            }
            Err(err) => {
                tracing::error!("Failed to send weather: {err}");
                RefreshOutcome::DeliveryFailed { reading, fix }
            }
        }
    }
}
