//! Application error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(#[from] wirechat_core::ConfigError),

    #[error("Network error: {0}")]
    Net(#[from] wirechat_net::Error),

    #[error("Failed to start runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Connect failed: {0}")]
    ConnectFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
