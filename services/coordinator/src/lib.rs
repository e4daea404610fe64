//! Clothing-loop coordinator service library crate.
//!
//! # Purpose
//! Exposes the HTTP API, credential handling, configuration, notification
//! seam, and storage backends for use by the binary and tests.
pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod notify;
pub mod observability;
pub mod store;
