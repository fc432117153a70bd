pub mod collector;
pub mod config;
pub mod error;
pub mod instrumentation;
pub mod labels;
pub mod metrics;
pub mod middleware;
pub mod process;
#[cfg(feature = "prometheus")]
pub mod prometheus;
pub mod stats;
