//! Core subsystem: error types and fixed operating parameters.

pub mod config;
pub mod errors;
