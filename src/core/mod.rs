//! Core runtime infrastructure.
//!
//! This module contains the essential components for running Trellis:
//! - [`config`] - Configuration parsing and validation
//! - [`runtime`] - Runtime wiring and background refresh
//! - [`error`] - Error types and RESP error mapping

pub mod config;
pub mod error;
pub mod runtime;
