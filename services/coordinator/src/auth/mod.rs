//! Coordinator credential handling.
//!
//! # Purpose
//! Extracts bearer credentials from requests, resolves them to principals,
//! and runs the one-time code and session lifecycle on top of the store.
pub mod session;
pub mod token;
