pub mod bootstrap;
pub mod config;
pub mod repositories;
pub mod services;
pub mod telemetry;
