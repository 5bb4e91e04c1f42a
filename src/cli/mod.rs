//! CLI module for the router
//!
//! Handles command-line argument parsing.

pub mod args;

pub use args::{Args, Commands, SnapshotCommand};
