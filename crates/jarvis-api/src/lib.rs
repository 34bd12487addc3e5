//! HTTP boundary for the JARVIS dispatcher.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
