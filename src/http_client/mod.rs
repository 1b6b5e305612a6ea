//! This module provides the HTTP client shared by delivery channels.

mod client;

pub use client::create_http_client;
