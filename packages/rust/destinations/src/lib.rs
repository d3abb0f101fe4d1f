//! Output destinations for harvester.
//!
//! Adapters:
//! - [`ConsoleDestination`]: JSON lines on stdout
//! - [`VictoriaMetricsDestination`]: JSON line import API
//! - [`InfluxDbDestination`]: v2 line protocol write API
//!
//! [`Dispatcher`] routes each output to its named destination and keeps
//! failures local to that output.

mod console;
mod dispatcher;
mod influxdb;
mod traits;
mod victoriametrics;

pub use console::ConsoleDestination;
pub use dispatcher::{
    DESTINATION_KINDS, Dispatcher, Registered, build_client, build_destination,
};
pub use influxdb::InfluxDbDestination;
pub use traits::Destination;
pub use victoriametrics::VictoriaMetricsDestination;
