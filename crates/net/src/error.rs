//! Network error types

use std::io;

use wirechat_core::EncodeError;

/// Network result type
pub type Result<T> = std::result::Result<T, Error>;

/// Network errors
///
/// Only failures that happen before the connection task exists show up here.
/// Once the task runs, I/O errors end the connection and are reported as a
/// [`CloseReason`](crate::CloseReason) instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: io::Error,
    },

    #[error("No endpoints found for {host}:{port}")]
    NoEndpoints { host: String, port: u16 },

    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("Not connected")]
    NotConnected,
}
