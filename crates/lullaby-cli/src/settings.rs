//! Application settings management
//!
//! Persistent defaults for polling and error reporting, overridable from
//! the command line.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use lullaby_core::ErrorReporting;
use serde::{ Deserialize, Serialize };

use crate::cli::Args;


/// Serialized form of [`ErrorReporting`].
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize )]
#[serde( rename_all = "lowercase" )]
pub enum ErrorMode {
    #[default]
    Swallow,
    Surface,
}


impl From<ErrorMode> for ErrorReporting {
    fn from( mode: ErrorMode ) -> Self {
        match mode {
            ErrorMode::Swallow => ErrorReporting::Swallow,
            ErrorMode::Surface => ErrorReporting::Surface,
        }
    }
}


/// Application settings.
#[derive( Debug, Clone, Serialize, Deserialize )]
#[serde( default )]
pub struct Settings {
    /// Progress poll interval in milliseconds
    pub poll_interval_ms: u64,

    /// Whether engine failures reach the status line
    pub error_reporting: ErrorMode,

    /// Start playing once the session is ready
    pub autoplay: bool,
}


impl Default for Settings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            error_reporting: ErrorMode::Swallow,
            autoplay: false,
        }
    }
}


impl Settings {
    /// Returns the path to the settings file.
    fn settings_path() -> Option<PathBuf> {
        dirs::config_dir().map( |p| p.join( "lullaby" ).join( "settings.json" ) )
    }


    /// Returns the path of the log file.
    pub fn log_path() -> Option<PathBuf> {
        dirs::data_local_dir().map( |p| p.join( "lullaby" ).join( "lullaby.log" ) )
    }


    /// Loads settings from disk, or returns defaults if not found.
    pub fn load() -> Self {
        let path = match Self::settings_path() {
            Some( p ) => p,
            None => return Self::default(),
        };

        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string( &path ) {
            Ok( contents ) => Self::parse( &contents ),
            Err( e ) => {
                tracing::warn!( "Failed to read settings: {}", e );
                Self::default()
            }
        }
    }


    fn parse( contents: &str ) -> Self {
        serde_json::from_str( contents ).unwrap_or_else( |e| {
            tracing::warn!( "Invalid settings file, using defaults: {}", e );
            Self::default()
        })
    }


    /// Applies command-line overrides.
    pub fn merge_args( mut self, args: &Args ) -> Self {
        if let Some( ms ) = args.poll_ms {
            self.poll_interval_ms = ms;
        }
        if args.surface_errors {
            self.error_reporting = ErrorMode::Surface;
        }
        if args.autoplay {
            self.autoplay = true;
        }
        self
    }


    /// Poll interval, never below 10 ms.
    pub fn poll_interval( &self ) -> Duration {
        Duration::from_millis( self.poll_interval_ms.max( 10 ) )
    }


    pub fn error_reporting( &self ) -> ErrorReporting {
        self.error_reporting.into()
    }
}


#[cfg( test )]
mod tests {
    use clap::Parser;

    use super::*;


    #[test]
    fn test_missing_fields_use_defaults() {
        let settings = Settings::parse( r#"{ "autoplay": true }"# );
        assert!( settings.autoplay );
        assert_eq!( settings.poll_interval_ms, 200 );
        assert_eq!( settings.error_reporting(), ErrorReporting::Swallow );
    }


    #[test]
    fn test_error_mode_lowercase() {
        let settings = Settings::parse( r#"{ "error_reporting": "surface" }"# );
        assert_eq!( settings.error_reporting(), ErrorReporting::Surface );
    }


    #[test]
    fn test_garbage_falls_back() {
        let settings = Settings::parse( "not json" );
        assert_eq!( settings.poll_interval_ms, 200 );
    }


    #[test]
    fn test_args_override() {
        let args = Args::parse_from([ "lullaby", "--poll-ms", "50", "--surface-errors" ]);
        let settings = Settings::default().merge_args( &args );
        assert_eq!( settings.poll_interval(), Duration::from_millis( 50 ) );
        assert_eq!( settings.error_reporting(), ErrorReporting::Surface );
        assert!( !settings.autoplay );
    }
}
