pub mod accounting;
pub mod config;
pub mod coordination;
pub mod engine;
pub mod error;
pub mod generator;
pub mod http;
pub mod metrics;
pub mod server;
