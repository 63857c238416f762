pub mod analysis;
pub mod api;
pub mod cache;
pub mod catalog;
pub mod config;
pub mod enricher;
pub mod error;
pub mod logger;
pub mod orchestrator;
pub mod query;
pub mod scheduler;
