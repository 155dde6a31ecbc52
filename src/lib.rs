//! News Dashboard - A multi-source news aggregator
//!
//! This crate pulls top headlines from NewsAPI, Event Registry and the
//! New York Times, normalizes them into one article shape, and serves the
//! merged list as JSON and as a login-gated web dashboard.

pub mod aggregator;
pub mod article;
pub mod auth;
pub mod config;
pub mod dashboard;
pub mod routes;
pub mod sources;
pub mod stats;
