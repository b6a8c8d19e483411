//! services/api/src/lib.rs
//!
//! The library half of the `api` service: adapters for the core ports, configuration,
//! and the axum web surface. The binaries in `src/bin` wire these together.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
