//! Command-line argument parsing for Lullaby.

use clap::Parser;


/// Lullaby - a breathing-practice player for the terminal.
#[derive( Parser, Debug )]
#[command( name = "lullaby" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Progress poll interval in milliseconds.
    #[arg( long )]
    pub poll_ms: Option<u64>,

    /// Show engine failures in the status line instead of only logging them.
    #[arg( long )]
    pub surface_errors: bool,

    /// Start playing as soon as the session is ready.
    #[arg( short, long )]
    pub autoplay: bool,

    /// Log filter, e.g. "debug" or "lullaby_core=trace".
    #[arg( long, default_value = "info" )]
    pub log_level: String,
}
