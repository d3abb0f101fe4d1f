//! Transformation registry and chain application for harvester.
//!
//! This crate provides:
//! - [`path`]: addressing expressions (`$.a.b[*]`, `..name`, slices, unions)
//! - [`registry`]: the closed set of named transforms and their typed options
//! - [`chain`]: ordered step application with source/destination placement
//!
//! Transforms never mutate the caller's value: a chain works on its own copy.

pub mod chain;
pub mod error;
pub mod ops;
pub mod path;
pub mod registry;
pub mod value;

pub use chain::{ChainOutput, SoftMiss, apply_chain};
pub use error::TransformError;
pub use path::{JsonPath, PathError, interpolation, query};
pub use registry::{TRANSFORM_NAMES, Transform, apply_transformation};
