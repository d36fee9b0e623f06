//! Prestalink CLI - Command-line interface for the prestalink connector
//!
//! This crate provides the CLI application that ties together all prestalink components.

pub mod config;

pub use config::{unique_ids, Command, Config};
