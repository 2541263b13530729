//! Core library for the `airquality` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Station and reading provider capabilities, with the EPA Victoria client
//! - The distance-ordered station directory used during setup
//! - The reading resolver that falls back across averaging windows
//!
//! It is used by `airquality-cli`, but can also be embedded by other hosts.

pub mod config;
pub mod directory;
pub mod error;
pub mod geocode;
pub mod model;
pub mod provider;
pub mod resolver;
pub mod sensor;

pub use config::{Config, SelectedStation};
pub use directory::{build_directory, haversine_km, nearest, rank_by_distance};
pub use error::AirQualityError;
pub use model::{
    Coordinates, Granularity, MeasurementBundle, RankedStation, ResolvedReading, Station,
};
pub use provider::{ReadingProvider, StationProvider, epa::EpaClient};
pub use resolver::{ReadingResolver, ResolverOptions, SensorState};
