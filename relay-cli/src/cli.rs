use std::sync::Arc;

use anyhow::{Context, bail};
use chrono::Local;
use clap::{Parser, Subcommand};
use inquire::{CustomType, Password, PasswordDisplayMode, Select};
use relay_core::{
    Config, FetcherKind, JsonLinesSink, LocationSource, RefreshOutcome, service,
    settings,
};
use tokio::{io::BufReader, sync::mpsc};

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather-relay", version, about = "Weather relay for the paired watch")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the relay. Device messages go to stdout, events are read from stdin.
    ///
    /// Accepted stdin lines: `message`, `refresh-weather`, `refresh-gps`,
    /// `status`, `settings <json>`.
    Run,

    /// Force a single refresh and exit.
    Once,

    /// Print the settings page descriptor as JSON.
    Settings,

    /// Interactively set the API key, weather source and location source.
    Configure,

    /// Show the effective configuration.
    Status,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Run => run_relay().await,
            Command::Once => run_once().await,
            Command::Settings => print_settings(),
            Command::Configure => configure(),
            Command::Status => print_status(),
        }
    }
}

async fn run_relay() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.warn_if_key_missing()?;

    let engine = Arc::new(service::engine_from_config(
        &config,
        Box::new(JsonLinesSink::stdout()),
    )?);
    let (tx, rx) = mpsc::channel(16);
    let relay = tokio::spawn(service::run(engine, rx, config.poll_interval()?));

    tokio::select! {
        read = service::forward_lines(BufReader::new(tokio::io::stdin()), &tx) => {
            read.context("Failed to read from stdin")?;
            tracing::info!("Device event input closed, polling continues until interrupted");
            tokio::signal::ctrl_c().await.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Interrupted");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
        }
    }

    drop(tx);
    relay.await.context("Relay task failed")?;
    Ok(())
}

async fn run_once() -> anyhow::Result<()> {
    let config = Config::load()?;
    config.warn_if_key_missing()?;

    let engine = service::engine_from_config(&config, Box::new(JsonLinesSink::stdout()))?;

    match engine.refresh_weather().await {
        RefreshOutcome::Delivered { reading, fix } => {
            eprintln!(
                "{}: {} °C, {} (location {fix:?})",
                Local::now().format("%H:%M"),
                reading.temperature_c,
                reading.condition
            );
            Ok(())
        }
        RefreshOutcome::LocationUnavailable { .. } => bail!("No location available"),
        RefreshOutcome::FetchFailed { .. } => bail!("Weather fetch failed, see log"),
        RefreshOutcome::DeliveryFailed { .. } => bail!("Could not write the device message"),
        RefreshOutcome::Skipped => Ok(()),
    }
}

fn print_settings() -> anyhow::Result<()> {
    let config = Config::load()?;
    let items = settings::descriptor(&config.refresh_policy());
    let json = serde_json::to_string_pretty(&items).context("Failed to encode settings page")?;
    println!("{json}");
    Ok(())
}

fn print_status() -> anyhow::Result<()> {
    let config = Config::load()?;
    let policy = config.refresh_policy();

    println!("Config file:      {}", Config::config_file_path()?.display());
    println!("API key:          {}", config.masked_api_key());
    println!("Weather source:   {}", config.fetcher_kind()?);
    println!("Location source:  {}", config.location);
    println!(
        "Weather interval: {} min",
        policy.weather_update_interval.num_minutes()
    );
    println!("GPS cache:        {} min", policy.gps_cache_duration.num_minutes());
    println!("Poll interval:    {:?}", config.poll_interval()?);
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum SourceChoice {
    Ip,
    Static,
}

impl std::fmt::Display for SourceChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceChoice::Ip => f.write_str("IP lookup"),
            SourceChoice::Static => f.write_str("Fixed coordinates"),
        }
    }
}

fn configure() -> anyhow::Result<()> {
    let path = Config::config_file_path()?;
    let mut config = Config::load_from(&path)?;

    let kind = Select::new("Weather source:", FetcherKind::all().to_vec())
        .with_starting_cursor(
            FetcherKind::all()
                .iter()
                .position(|k| Some(*k) == config.fetcher_kind().ok())
                .unwrap_or(0),
        )
        .prompt()?;
    config.set_fetcher(kind);

    if kind.needs_api_key() {
        let key = Password::new("OpenWeather API key (empty keeps the current one):")
            .with_display_mode(PasswordDisplayMode::Masked)
            .without_confirmation()
            .prompt()?;
        if !key.trim().is_empty() {
            config.api_key = Some(key.trim().to_string());
        }
    }

    let source = Select::new("Location source:", vec![SourceChoice::Ip, SourceChoice::Static])
        .prompt()?;
    config.location = match source {
        SourceChoice::Ip => LocationSource::Ip,
        SourceChoice::Static => {
            let latitude = CustomType::<f64>::new("Latitude:")
                .with_error_message("Please enter a number")
                .prompt()?;
            let longitude = CustomType::<f64>::new("Longitude:")
                .with_error_message("Please enter a number")
                .prompt()?;
            if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                bail!("Coordinates out of range: {latitude}, {longitude}");
            }
            LocationSource::Static {
                latitude,
                longitude,
            }
        }
    };

    config.save_to(&path)?;
    println!("Saved {}", path.display());
    println!("API key: {}", config.masked_api_key());
    Ok(())
}
