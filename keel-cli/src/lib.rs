//! Keel CLI - command-line interface for the Keel schema reconciler.
//!
//! Reads `keel.toml`, loads the catalog manifest it points to, and runs the
//! reconciler against the configured database.

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
