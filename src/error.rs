//! Error types for Portward
//!
//! This module defines all custom error types used throughout the application.

use std::io;
use thiserror::Error;

/// Main error type for Portward operations
#[derive(Error, Debug)]
pub enum PortwardError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Address resolution error
    #[error("Address resolution error: {0}")]
    Resolve(String),

    /// Listener bind error
    #[error("Bind error: {0}")]
    Bind(String),

    /// Upstream connection error
    #[error("Connection error: {0}")]
    Connection(String),
}
