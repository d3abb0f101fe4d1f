//! Job execution for harvester.
//!
//! This crate ties inputs, transforms, and destinations together:
//! - [`fetch`]: HTTP requests and payload decoding
//! - [`runner`]: one tick of a job, from fetch to dispatch
//! - [`scheduler`]: cron-driven, single-flight ticking of all jobs

pub mod fetch;
pub mod runner;
pub mod scheduler;

pub use fetch::{Fetched, HttpFetcher};
pub use runner::{DispatchOutcome, Job, RunPhase, RunReport, inject_metadata, join_merged};
pub use scheduler::Scheduler;
