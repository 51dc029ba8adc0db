//! Shared utilities for stock-research
//!
//! This crate provides the ambient pieces used across the workspace:
//! tracing setup, application metadata, and small environment helpers.

pub mod config;
pub mod logging;

pub use config::{AppInfo, env_parse, env_var};
pub use logging::{LogFormat, init_tracing};
