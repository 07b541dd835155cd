//! Playback engine contract
//!
//! The engine owns decoding, output, media-session integration and the
//! authoritative queue. This crate only talks to it through the
//! [`PlaybackEngine`] trait, so a host injects its native player and tests
//! inject [`crate::sim::SimulatedEngine`].

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::track::{ RepeatMode, Track };


/// Errors reported by the engine.
#[derive( Debug, Clone, PartialEq, Eq, Error )]
pub enum EngineError {
    #[error( "Player is not initialized" )]
    NotInitialized,

    #[error( "Queue is empty" )]
    EmptyQueue,

    #[error( "Track index out of range: {0}" )]
    IndexOutOfRange( usize ),

    #[error( "Command rejected: {0}" )]
    Rejected( String ),
}


/// Transport state as reported by the engine.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum EngineState {
    /// Nothing loaded, or not set up.
    #[default]
    None,
    Ready,
    Paused,
    Playing,
    Buffering,
    Stopped,
}


impl EngineState {
    /// Only `Playing` counts as playing; buffering is not.
    pub fn is_playing( self ) -> bool {
        self == EngineState::Playing
    }
}


/// Remote-control capabilities advertised to the OS media session.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum Capability {
    Play,
    Pause,
    SkipToNext,
    SkipToPrevious,
    SeekTo,
}


/// What the engine does when the host process is killed.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum AppKilledBehavior {
    ContinuePlayback,
    PausePlayback,
    #[default]
    StopPlaybackAndRemoveNotification,
}


/// Options applied once after setup.
#[derive( Debug, Clone, PartialEq )]
pub struct EngineOptions {
    pub capabilities: Vec<Capability>,
    /// Subset shown in compact notifications
    pub compact_capabilities: Vec<Capability>,
    /// How often the engine emits its own progress events
    pub progress_update_interval: Duration,
    pub app_killed_behavior: AppKilledBehavior,
}


impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            capabilities: vec![
                Capability::Play,
                Capability::Pause,
                Capability::SkipToNext,
                Capability::SkipToPrevious,
                Capability::SeekTo,
            ],
            compact_capabilities: vec![
                Capability::Play,
                Capability::Pause,
                Capability::SkipToNext,
            ],
            progress_update_interval: Duration::from_secs( 2 ),
            app_killed_behavior: AppKilledBehavior::default(),
        }
    }
}


/// Position, duration and buffered amount of the active track, in seconds.
///
/// The engine is authoritative and may briefly report a position past the
/// duration while seeking.
#[derive( Debug, Clone, Copy, PartialEq, Default )]
pub struct Progress {
    pub position: f64,
    pub duration: f64,
    pub buffered: f64,
}


/// Events pushed by the engine.
#[derive( Debug, Clone, PartialEq )]
pub enum EngineEvent {
    /// The active track changed. `None` when the queue was emptied.
    TrackChanged { index: Option<usize> },
    StateChanged { state: EngineState },
    /// The last track finished and repeat is off.
    QueueEnded,
    Error { message: String },
}


/// External playback engine.
///
/// All methods except [`PlaybackEngine::setup`] and
/// [`PlaybackEngine::subscribe`] fail with [`EngineError::NotInitialized`]
/// until setup has run.
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    /// One-time setup. Fails if the engine is already set up.
    async fn setup( &self ) -> Result<(), EngineError>;

    async fn update_options( &self, options: EngineOptions ) -> Result<(), EngineError>;

    /// Appends tracks to the end of the queue.
    async fn add( &self, tracks: Vec<Track> ) -> Result<(), EngineError>;

    /// Stops playback and clears the queue.
    async fn reset( &self ) -> Result<(), EngineError>;

    async fn queue( &self ) -> Result<Vec<Track>, EngineError>;

    /// Index of the active track, `None` when the queue is empty.
    async fn current_track( &self ) -> Result<Option<usize>, EngineError>;

    async fn state( &self ) -> Result<EngineState, EngineError>;

    async fn play( &self ) -> Result<(), EngineError>;

    async fn pause( &self ) -> Result<(), EngineError>;

    async fn skip_to_next( &self ) -> Result<(), EngineError>;

    async fn skip_to_previous( &self ) -> Result<(), EngineError>;

    async fn seek_to( &self, position: Duration ) -> Result<(), EngineError>;

    async fn set_repeat_mode( &self, mode: RepeatMode ) -> Result<(), EngineError>;

    async fn repeat_mode( &self ) -> Result<RepeatMode, EngineError>;

    async fn progress( &self ) -> Result<Progress, EngineError>;

    /// Subscribes to pushed engine events.
    fn subscribe( &self ) -> broadcast::Receiver<EngineEvent>;
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_default_options_capabilities() {
        let options = EngineOptions::default();
        assert_eq!( options.capabilities.len(), 5 );
        assert!( options.capabilities.contains( &Capability::SeekTo ) );
        assert!( !options.compact_capabilities.contains( &Capability::SkipToPrevious ) );
        assert_eq!( options.progress_update_interval, Duration::from_secs( 2 ) );
    }


    #[test]
    fn test_only_playing_is_playing() {
        assert!( EngineState::Playing.is_playing() );
        assert!( !EngineState::Buffering.is_playing() );
        assert!( !EngineState::Paused.is_playing() );
        assert!( !EngineState::Ready.is_playing() );
    }
}
