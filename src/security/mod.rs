//! Security audit engine for watched skill directories.
//!
//! See [`owlwatch`] for the module overview, event pipeline,
//! and public API documentation.

mod alert;
mod audit;
mod burst;
mod classifier;
mod engine;
mod error;
mod integrity;
mod owlwatch;
mod persist;
mod report;
mod throttle;

// The owlwatch.rs facade controls the entire public API surface.
pub use self::owlwatch::*;
