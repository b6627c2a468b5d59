use std::{sync::Arc, time::Duration};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
    time::{MissedTickBehavior, interval_at},
};

use crate::{
    config::Config, engine::RefreshEngine, provider::fetcher_from_config, settings,
    sink::MessageSink,
};

/// Assemble an engine from the config, relaying to `sink`.
pub fn engine_from_config(
    config: &Config,
    sink: Box<dyn MessageSink>,
) -> anyhow::Result<RefreshEngine> {
    let fetcher = fetcher_from_config(config)?;
    let location = config.location.clone().into_provider()?;

    Ok(RefreshEngine::new(location, fetcher, sink)
        .with_policy(config.refresh_policy())
        .with_api_key_configured(config.has_api_key()))
}

/// External events that drive the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// The device asked for an update.
    DeviceMessage,
    RefreshWeather,
    RefreshGps,
    /// Settings page closed; `None` if it was dismissed without a response.
    SettingsClosed(Option<String>),
    /// Settings page opened; log the current status.
    ShowStatus,
}

impl Trigger {
    /// Parse a command line such as `refresh-gps` or `settings {"refresh-weather":true}`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (command, rest) = match line.split_once(char::is_whitespace) {
            Some((command, rest)) => (command, Some(rest.trim())),
            None => (line, None),
        };

        match command {
            "message" => Some(Trigger::DeviceMessage),
            settings::REFRESH_WEATHER_ID => Some(Trigger::RefreshWeather),
            settings::REFRESH_GPS_ID => Some(Trigger::RefreshGps),
            "status" => Some(Trigger::ShowStatus),
            "settings" => Some(Trigger::SettingsClosed(
                rest.filter(|r| !r.is_empty()).map(str::to_string),
            )),
            _ => None,
        }
    }
}

/// Feed command lines from `input` into `triggers` until the input ends.
///
/// Returns at EOF or once the relay has stopped listening. The sender is
/// borrowed, so the channel stays open and the relay keeps polling.
pub async fn forward_lines<R>(input: R, triggers: &mpsc::Sender<Trigger>) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match Trigger::parse(&line) {
            Some(trigger) => {
                if triggers.send(trigger).await.is_err() {
                    break;
                }
            }
            None => tracing::warn!("Unknown command: {}", line.trim()),
        }
    }
    Ok(())
}

/// Handle one trigger to completion.
pub async fn dispatch(engine: &RefreshEngine, trigger: Trigger) {
    match trigger {
        Trigger::DeviceMessage => {
            tracing::info!("Received message from device, checking weather");
            engine.maybe_refresh(false).await;
        }
        Trigger::RefreshWeather => {
            engine.refresh_weather().await;
        }
        Trigger::RefreshGps => {
            engine.refresh_gps().await;
        }
        Trigger::ShowStatus => {
            tracing::info!("Opening configuration page\n{}", engine.status());
        }
        Trigger::SettingsClosed(None) => {
            tracing::info!("Configuration cancelled");
        }
        Trigger::SettingsClosed(Some(raw)) => match settings::parse_response(&raw) {
            Ok(Some(actions)) => {
                tracing::debug!("Config response: {raw}");
                engine.apply_settings(&actions).await;
            }
            Ok(None) => tracing::info!("Configuration cancelled"),
            Err(err) => tracing::warn!("Ignoring malformed settings response: {err}"),
        },
    }
}

/// Drive the engine until the trigger channel closes.
///
/// Starts with a forced refresh, then checks staleness every `poll_interval`.
pub async fn run(
    engine: Arc<RefreshEngine>,
    mut triggers: mpsc::Receiver<Trigger>,
    poll_interval: Duration,
) {
    tracing::info!("Relay ready, polling every {poll_interval:?}");
    engine.maybe_refresh(true).await;

    let start = tokio::time::Instant::now() + poll_interval;
    let mut ticker = interval_at(start, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                tracing::debug!("Checking if weather update needed...");
                engine.maybe_refresh(false).await;
            }
            trigger = triggers.recv() => match trigger {
                Some(trigger) => dispatch(&engine, trigger).await,
                None => break,
            },
        }
    }

    tracing::info!("Trigger channel closed, relay stopping");
}
