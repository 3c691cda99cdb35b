//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_PORT;
use crate::models::DEFAULT_MINUTES;
use crate::session::AppState;

/// YouStrict - timed, parent-approved video sessions
#[derive(Parser, Debug)]
#[command(name = "youstrict")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory for the secure session store
    #[arg(long, global = true, env = "YOUSTRICT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Server port
    #[arg(short, long, global = true, env = "YOUSTRICT_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the session server
    Serve {
        /// Open the status page in a browser
        #[arg(long)]
        open: bool,
    },

    /// Show the current session
    Status,

    /// Solve the parent challenge and start a session
    Start {
        /// Minutes to allow (15, 30, 60, or 5-180 in steps of 5); prompts when omitted
        #[arg(short, long)]
        minutes: Option<u32>,
    },

    /// End the current session now
    End,

    /// Re-read the stored session
    Reload,

    /// Show when a session started now would end
    Preview {
        /// Minutes to preview
        #[arg(short, long, default_value_t = DEFAULT_MINUTES)]
        minutes: u32,
    },

    /// Tell the server the app changed visibility
    Lifecycle {
        #[arg(value_enum)]
        state: Visibility,
    },

    /// Navigate to a screen, subject to the guard
    Navigate {
        /// Path such as `/`, `/select-duration` or `/videos`
        path: String,
    },

    /// Follow the countdown until the session ends
    Watch,
}

/// App visibility as given on the command line.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Visibility {
    Foreground,
    Background,
}

impl From<Visibility> for AppState {
    fn from(v: Visibility) -> Self {
        match v {
            Visibility::Foreground => Self::Foreground,
            Visibility::Background => Self::Background,
        }
    }
}
