//! Command line arguments

use std::path::PathBuf;

use clap::Parser;
use wirechat_core::{ConfigError, ConfigFile, SessionConfig, SessionSection};

/// Terminal client for the fixed-header chat protocol
#[derive(Debug, Parser)]
#[command(name = "wirechat", version)]
pub struct Args {
    /// Server host name or address
    pub host: String,

    /// Server port
    pub port: u16,

    /// Config file (defaults to wirechat.toml in the platform config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Sender display name
    #[arg(long)]
    pub name: Option<String>,

    /// Sender identifier written into every header
    #[arg(long, allow_negative_numbers = true)]
    pub sender_id: Option<f64>,

    /// Receiver identifier written into every header
    #[arg(long, allow_negative_numbers = true)]
    pub receiver_id: Option<f64>,
}

impl Args {
    /// Merge the config file with command line overrides
    pub fn session(&self) -> Result<SessionConfig, ConfigError> {
        let file = match &self.config {
            Some(path) => ConfigFile::load(path)?,
            None => ConfigFile::load_default()?,
        };
        file.merge(SessionSection {
            name: self.name.clone(),
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
        })
        .into_session()
    }
}
