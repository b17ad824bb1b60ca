pub mod config;
pub mod dataset;
pub mod error;
pub mod rating;
pub mod telemetry;
