//! OwlWatch - security auditing for watched skill directories
//!
//! This crate provides:
//! - A security engine classifying file events, with SHA-256 integrity
//!   baselines, burst detection and a rotating audit log
//! - Markdown audit reports
//! - A notify-based watcher feeding the engine from several roots
//! - The `owlwatch` command line

pub mod cli;
pub mod concurrency;
pub mod config;
pub mod paths;
pub mod security;
pub mod watcher;

pub use config::Config;
