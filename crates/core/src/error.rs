//! Error types for Wirechat Core

use std::path::PathBuf;

use thiserror::Error;

use crate::frame::MAX_BODY_LENGTH;

/// Header decoding failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HeaderError {
    #[error("Malformed {field} field: {text:?}")]
    Malformed { field: &'static str, text: String },

    #[error("Body length {0} exceeds maximum {MAX_BODY_LENGTH}")]
    Oversized(usize),

    #[error("Unknown message kind: {0}")]
    UnknownKind(u16),
}

/// Header encoding failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("{field} {value} does not fit in {width} columns")]
    Overflow {
        field: &'static str,
        value: String,
        width: usize,
    },

    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },
}

/// Configuration loading failures
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] EncodeError),
}
