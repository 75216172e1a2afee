//! Mask optimization worker.
//!
//! This crate provides:
//! - Environment-driven run configuration
//! - Orchestration of one run from encoded variants to ROI control stream
//! - Structured run logging
//! - Prometheus exporter setup

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod processor;

pub use config::RunConfig;
pub use error::{WorkerError, WorkerResult};
pub use logging::RunLogger;
pub use processor::{MaskProcessor, RunSummary};
