#![warn(missing_docs)]
//! Beacon is an incident alerting pipeline: it deduplicates, rate-limits and
//! batches incidents across workers and delivers them to a chat endpoint.

pub mod config;
pub mod context;
pub mod delivery;
pub mod engine;
pub mod http_client;
pub mod http_server;
pub mod models;
pub mod persistence;
pub mod providers;
pub mod supervisor;
pub mod test_helpers;
