//! Core library for the wearable weather relay.
//!
//! This crate defines:
//! - The refresh policy deciding when to locate, fetch and relay
//! - Abstractions over position sources, weather providers and the device link
//! - Configuration, the settings page and the event loop driving it all
//!
//! It is used by `relay-cli`, but the engine can be embedded in any bridge
//! process that can supply its three collaborators.

pub mod config;
pub mod engine;
pub mod error;
pub mod location;
pub mod model;
pub mod provider;
pub mod service;
pub mod settings;
pub mod sink;

pub use config::Config;
pub use engine::{Clock, FixSource, RefreshEngine, RefreshOutcome, RefreshPolicy, SystemClock};
pub use error::{FetchError, LocationError, SinkError};
pub use location::{LocationOptions, LocationProvider, LocationSource};
pub use model::{Coordinates, DeviceMessage, Observation, WeatherIcon, WeatherReading};
pub use provider::{FetcherKind, WeatherFetcher};
pub use service::Trigger;
pub use sink::{JsonLinesSink, MessageSink};
