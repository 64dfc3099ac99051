//! # Kogase API Server Library
//!
//! HTTP surface of the Kogase telemetry service: SDK ingestion with project
//! API keys, and the dashboard API with session tokens.
//!
//! ## Modules
//!
//! - `app`: Application state, router builder and authentication layers
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `extract`: Request extractors
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
