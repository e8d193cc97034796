pub mod config;
pub mod engine;
pub mod error;
pub mod market_data;
pub mod telemetry;
pub mod view;
