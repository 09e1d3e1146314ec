//! Wirechat Core Library
//!
//! Frame codec and session configuration for the Wirechat client. Pure data,
//! no I/O beyond reading the config file.

pub mod config;
pub mod error;
pub mod frame;

pub use config::{ConfigFile, SessionConfig, SessionSection};
pub use error::{ConfigError, EncodeError, HeaderError};
pub use frame::{MessageFrame, MessageKind, HEADER_LENGTH, MAX_BODY_LENGTH};
