//! bugfixer library crate
//!
//! Generates minimal patches for a catalog of planted defects in a target
//! codebase and writes a plain-text report. The binary in `main.rs` is a thin
//! CLI over [`runner::RunController`] and [`snapshot::inspect`].

pub mod catalog;
pub mod config;
pub mod error;
pub mod llm;
pub mod logging;
pub mod report;
pub mod runner;
pub mod snapshot;
pub mod static_context;

pub use error::{Error, Result};
