//! Error types for Threatmap operations.
//!
//! This module provides the main error type [`ThreatmapError`] which wraps
//! the error conditions that can occur while loading, editing and sharing a
//! threat model.

use std::io;

use thiserror::Error;

use threatmap_yaml::error::ParseError;

use crate::share::CodecError;

/// The main error type for Threatmap operations.
///
/// # Diagnostic Variants
///
/// The `Parse` variant carries the diagnostics together with the source text
/// they point into, so callers can render labelled snippets.
#[derive(Debug, Error)]
pub enum ThreatmapError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{err}")]
    Parse { err: ParseError, src: String },

    #[error("Share codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ThreatmapError {
    /// Create a new `Parse` error with the associated source code.
    pub fn new_parse_error(err: ParseError, src: impl Into<String>) -> Self {
        Self::Parse {
            err,
            src: src.into(),
        }
    }
}
