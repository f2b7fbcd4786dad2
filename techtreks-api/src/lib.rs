//! # TechTreks API Server Library
//!
//! HTTP surface of the TechTreks marketplace backend: registration with email
//! verification, cookie sessions and direct messages.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Security headers, rate limiting, session cookies
//! - `routes`: API route handlers
//! - `sweeper`: Background purge of expired records

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod sweeper;
