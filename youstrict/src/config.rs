//! Runtime configuration resolved from CLI flags, environment and defaults.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::cli::Cli;

/// Port the server listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 58240;

/// Per-user directory holding the server's PID and port files.
const SERVER_DIR: &str = ".youstrict";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Where the secure store keeps its files.
    pub data_dir: PathBuf,
    /// Port for `serve`, and for spawning a server when none is running.
    pub port: u16,
}

impl Config {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let data_dir = match &cli.data_dir {
            Some(dir) => dir.clone(),
            None => default_data_dir()?,
        };
        Ok(Self {
            data_dir,
            port: cli.port,
        })
    }
}

/// `<local data dir>/youstrict`.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_local_dir().context("Could not find local data directory")?;
    Ok(base.join("youstrict"))
}

/// `~/.youstrict`, where PID and port files live.
pub fn server_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not find home directory")?;
    Ok(home.join(SERVER_DIR))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn explicit_flags_win() {
        let cli = Cli::parse_from(["youstrict", "--data-dir", "/tmp/ys", "--port", "9000", "status"]);
        let config = Config::from_cli(&cli).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/tmp/ys"));
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["youstrict", "status", "--port", "9001"]);
        assert_eq!(cli.port, 9001);
    }
}
