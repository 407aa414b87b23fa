//! Weather Aggregator
//!
//! Accepts batches of city names, looks up current conditions for each city
//! in a background worker, and records a per-city outcome plus an aggregate
//! status (`SUCCESS`, `PARTIAL` or `FAILED`) for the batch.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
