#![allow(clippy::result_large_err)]

pub mod app;
pub mod audit;
pub mod config;
pub mod dsn;
pub mod env_check;
pub mod error;
pub mod integration;
pub mod logging;
pub mod metrics;
pub mod probes;
pub mod readiness;
pub mod retry;
pub mod telemetry;
