//! Slash command parsing.
//!
//! The screen's command line accepts the same intents as its buttons,
//! plus seeking and repeat control.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::track::RepeatMode;


/// Errors that can occur during command parsing.
#[derive( Debug, Error, PartialEq, Eq )]
pub enum CommandError {
    #[error( "Unknown command: {0}" )]
    Unknown( String ),

    #[error( "Invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "Missing argument: {0}" )]
    MissingArgument( String ),
}


/// Parsed slash command.
#[derive( Debug, Clone, PartialEq )]
pub enum Command {
    // Transport
    Play,
    Pause,
    Toggle,
    Next,
    Prev,
    Seek { position: Duration },

    // Queue
    Shuffle,
    Repeat { mode: Option<RepeatMode> },

    // Screen
    Back,
    Explore,
    Help,
    Quit,
}


impl FromStr for RepeatMode {
    type Err = CommandError;


    fn from_str( s: &str ) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Ok( RepeatMode::Off ),
            "track" | "one" | "1" => Ok( RepeatMode::Track ),
            "queue" | "all" | "2" => Ok( RepeatMode::Queue ),
            _ => Err( CommandError::InvalidArgument(
                format!( "Invalid repeat mode: '{}'. Use 'off', 'track', or 'queue'", s )
            )),
        }
    }
}


impl Command {
    /// Parses a command string (without the leading `/`).
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() ).filter( |s| !s.is_empty() );

        match cmd.as_str() {
            "play" | "p" => Ok( Command::Play ),
            "pause" | "pa" => Ok( Command::Pause ),
            "toggle" | "t" => Ok( Command::Toggle ),
            "next" | "n" => Ok( Command::Next ),
            "prev" | "previous" | "pr" => Ok( Command::Prev ),
            "seek" | "sk" => {
                let time_str = args
                    .ok_or_else( || CommandError::MissingArgument( "time position".into() ) )?;
                let position = parse_time( time_str )?;
                Ok( Command::Seek { position } )
            }

            "shuffle" | "sh" => Ok( Command::Shuffle ),
            "repeat" | "rep" => {
                let mode = args.map( |s| s.parse() ).transpose()?;
                Ok( Command::Repeat { mode } )
            }

            "back" | "b" => Ok( Command::Back ),
            "explore" | "similar" => Ok( Command::Explore ),
            "help" | "h" => Ok( Command::Help ),
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }
}


/// Parses a time string like "1:30" or "90" into a Duration.
fn parse_time( s: &str ) -> Result<Duration, CommandError> {
    let s = s.trim();

    if let Some(( min, sec )) = s.split_once( ':' ) {
        let minutes: u64 = min.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid minutes: {}", min ) ) )?;
        let seconds: u64 = sec.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) )?;
        if seconds >= 60 {
            return Err( CommandError::InvalidArgument( format!( "Invalid seconds: {}", sec ) ) );
        }
        let total = minutes.checked_mul( 60 )
            .and_then( |m| m.checked_add( seconds ) )
            .ok_or_else( || CommandError::InvalidArgument( format!( "Time out of range: {}", s ) ) )?;
        Ok( Duration::from_secs( total ) )
    } else {
        let seconds: u64 = s.parse()
            .map_err( |_| CommandError::InvalidArgument( format!( "Invalid time: {}", s ) ) )?;
        Ok( Duration::from_secs( seconds ) )
    }
}


/// Returns help text listing all available commands.
pub fn help_text() -> &'static str {
    r#"Transport:
  /play            Start playback          [p]
  /pause           Pause playback
  /toggle          Play or pause           [Space]
  /next            Next track              [→]
  /prev            Previous track          [←]
  /seek <time>     Seek (e.g. 1:30)

Queue:
  /shuffle         Shuffle the queue       [s]
  /repeat [mode]   Repeat off/track/queue  [r]

Screen:
  /explore         Explore similar         [e]
  /back            Go back                 [Esc]
  /help            Show this help          [?]
  /quit            Exit                    [q]"#
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_transport() {
        assert_eq!( Command::parse( "toggle" ).unwrap(), Command::Toggle );
        assert_eq!( Command::parse( "  N " ).unwrap(), Command::Next );
        assert_eq!( Command::parse( "previous" ).unwrap(), Command::Prev );
    }


    #[test]
    fn test_parse_seek() {
        let cmd = Command::parse( "seek 1:30" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 90 ) } );
    }


    #[test]
    fn test_parse_seek_seconds() {
        let cmd = Command::parse( "sk 45" ).unwrap();
        assert_eq!( cmd, Command::Seek { position: Duration::from_secs( 45 ) } );
    }


    #[test]
    fn test_parse_seek_rejects_bad_seconds() {
        assert!( matches!( Command::parse( "seek 1:75" ), Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_seek_rejects_overflowing_minutes() {
        assert!( matches!(
            Command::parse( "seek 307445734561825861:00" ),
            Err( CommandError::InvalidArgument( _ ) )
        ));
    }


    #[test]
    fn test_parse_repeat_with_mode() {
        let cmd = Command::parse( "repeat all" ).unwrap();
        assert_eq!( cmd, Command::Repeat { mode: Some( RepeatMode::Queue ) } );
    }


    #[test]
    fn test_parse_repeat_cycle() {
        let cmd = Command::parse( "repeat" ).unwrap();
        assert_eq!( cmd, Command::Repeat { mode: None } );
    }


    #[test]
    fn test_parse_unknown() {
        assert!( matches!( Command::parse( "foobar" ), Err( CommandError::Unknown( _ ) ) ) );
        assert!( matches!( Command::parse( "" ), Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_missing_arg() {
        assert!( matches!( Command::parse( "seek" ), Err( CommandError::MissingArgument( _ ) ) ) );
    }
}
