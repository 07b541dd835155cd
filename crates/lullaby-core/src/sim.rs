//! In-process simulated engine
//!
//! Implements [`PlaybackEngine`] against a virtual clock. The terminal host
//! runs on it in place of a native player. Engines built with
//! [`SimulatedEngine::recording`] also keep a call log that tests read to
//! assert exactly which commands were issued and in what order.

use std::sync::{ Mutex, MutexGuard, PoisonError };
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::engine::{ EngineError, EngineEvent, EngineOptions, EngineState, PlaybackEngine, Progress };
use crate::track::{ RepeatMode, Track };


const EVENT_CAPACITY: usize = 64;


/// One recorded call into the engine.
#[derive( Debug, Clone, PartialEq )]
pub enum EngineCall {
    Setup,
    UpdateOptions,
    Add { ids: Vec<String> },
    Reset,
    Queue,
    CurrentTrack,
    State,
    Play,
    Pause,
    SkipToNext,
    SkipToPrevious,
    SeekTo( Duration ),
    SetRepeatMode( RepeatMode ),
    RepeatMode,
    Progress,
}


impl EngineCall {
    /// Returns true for calls that change playback.
    pub fn is_transport( &self ) -> bool {
        matches!(
            self,
            EngineCall::Play
                | EngineCall::Pause
                | EngineCall::SkipToNext
                | EngineCall::SkipToPrevious
                | EngineCall::SeekTo( _ )
        )
    }
}


#[derive( Debug, Default )]
struct Inner {
    initialized: bool,
    options: Option<EngineOptions>,
    queue: Vec<Track>,
    index: Option<usize>,
    state: EngineState,
    repeat: RepeatMode,
    /// Position at the last clock stop
    offset: f64,
    playing_since: Option<Instant>,
    /// Only filled when recording
    calls: Vec<EngineCall>,
    recording: bool,
    fail_setup: bool,
    fail_commands: bool,
    fail_next_add: bool,
}


impl Inner {
    fn position( &self ) -> f64 {
        self.offset + self.playing_since
            .map( |t| t.elapsed().as_secs_f64() )
            .unwrap_or( 0.0 )
    }


    fn duration( &self ) -> f64 {
        self.index
            .and_then( |i| self.queue.get( i ) )
            .map( |t| t.duration_secs )
            .unwrap_or( 0.0 )
    }


    fn ensure_ready( &self ) -> Result<(), EngineError> {
        if self.initialized {
            Ok(())
        } else {
            Err( EngineError::NotInitialized )
        }
    }


    fn ensure_accepts_commands( &self, events: &mut Vec<EngineEvent> ) -> Result<(), EngineError> {
        self.ensure_ready()?;
        if self.fail_commands {
            let message = "injected failure".to_string();
            events.push( EngineEvent::Error { message: message.clone() } );
            return Err( EngineError::Rejected( message ) );
        }
        Ok(())
    }


    fn stop_clock( &mut self ) {
        self.offset = self.position();
        self.playing_since = None;
    }


    fn set_state( &mut self, state: EngineState, events: &mut Vec<EngineEvent> ) {
        if self.state != state {
            self.state = state;
            events.push( EngineEvent::StateChanged { state } );
        }
        if state.is_playing() {
            if self.playing_since.is_none() {
                self.playing_since = Some( Instant::now() );
            }
        } else {
            self.stop_clock();
        }
    }


    fn load( &mut self, index: usize, events: &mut Vec<EngineEvent> ) {
        self.index = Some( index );
        self.offset = 0.0;
        self.playing_since = self.state.is_playing().then( Instant::now );
        events.push( EngineEvent::TrackChanged { index: Some( index ) } );
    }


    /// Advances past a finished track according to the repeat mode.
    fn settle( &mut self, events: &mut Vec<EngineEvent> ) {
        let duration = self.duration();
        if !self.state.is_playing() || duration <= 0.0 || self.position() < duration {
            return;
        }
        let Some( current ) = self.index else { return };

        match self.repeat {
            RepeatMode::Track => self.load( current, events ),
            RepeatMode::Queue => self.load( ( current + 1 ) % self.queue.len(), events ),
            RepeatMode::Off if current + 1 < self.queue.len() => self.load( current + 1, events ),
            RepeatMode::Off => {
                self.set_state( EngineState::Stopped, events );
                self.offset = duration;
                events.push( EngineEvent::QueueEnded );
            }
        }
    }


    fn skip( &mut self, forward: bool, events: &mut Vec<EngineEvent> ) -> Result<(), EngineError> {
        if self.queue.is_empty() {
            return Err( EngineError::EmptyQueue );
        }
        let len = self.queue.len();
        let current = self.index.unwrap_or( 0 );
        let wrap = self.repeat == RepeatMode::Queue;

        let target = if forward {
            if current + 1 < len {
                current + 1
            } else if wrap {
                0
            } else {
                return Err( EngineError::Rejected( "No next track".into() ) );
            }
        } else if current > 0 {
            current - 1
        } else if wrap {
            len - 1
        } else {
            return Err( EngineError::Rejected( "No previous track".into() ) );
        };

        let resume = self.state.is_playing();
        self.set_state( EngineState::Buffering, events );
        self.load( target, events );
        self.set_state( if resume { EngineState::Playing } else { EngineState::Ready }, events );
        Ok(())
    }
}


/// Engine simulated in memory with a virtual playback clock.
#[derive( Debug )]
pub struct SimulatedEngine {
    inner: Mutex<Inner>,
    events: broadcast::Sender<EngineEvent>,
}


impl SimulatedEngine {
    /// Creates an engine that has not been set up yet.
    pub fn new() -> Self {
        let ( events, _ ) = broadcast::channel( EVENT_CAPACITY );
        Self {
            inner: Mutex::new( Inner::default() ),
            events,
        }
    }


    /// Creates an engine that logs every call it receives.
    pub fn recording() -> Self {
        let engine = Self::new();
        engine.inner().recording = true;
        engine
    }


    fn inner( &self ) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else( PoisonError::into_inner )
    }


    /// Records the call, runs `f` under the lock, then emits collected events.
    fn with<T>(
        &self,
        call: EngineCall,
        f: impl FnOnce( &mut Inner, &mut Vec<EngineEvent> ) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut events = Vec::new();
        let result = {
            let mut inner = self.inner();
            if inner.recording {
                inner.calls.push( call );
            }
            f( &mut inner, &mut events )
        };
        for event in events {
            // No subscribers is fine
            let _ = self.events.send( event );
        }
        result
    }


    /// Makes the next setup attempts fail.
    pub fn fail_setup( &self, fail: bool ) {
        self.inner().fail_setup = fail;
    }


    /// Makes the next `add` fail once.
    pub fn fail_next_add( &self ) {
        self.inner().fail_next_add = true;
    }


    /// Makes transport commands fail.
    pub fn fail_commands( &self, fail: bool ) {
        self.inner().fail_commands = fail;
    }


    /// Returns every call recorded so far, oldest first.
    pub fn calls( &self ) -> Vec<EngineCall> {
        self.inner().calls.clone()
    }


    /// Returns the recorded transport commands only.
    pub fn transport_calls( &self ) -> Vec<EngineCall> {
        self.inner().calls.iter().filter( |c| c.is_transport() ).cloned().collect()
    }


    /// Counts received calls equal to `call`.
    pub fn count( &self, call: &EngineCall ) -> usize {
        self.inner().calls.iter().filter( |c| *c == call ).count()
    }


    /// Forgets the recorded calls.
    pub fn clear_calls( &self ) {
        self.inner().calls.clear();
    }


    /// Options applied after setup, if any.
    pub fn options( &self ) -> Option<EngineOptions> {
        self.inner().options.clone()
    }


    /// Whether setup has completed.
    pub fn is_initialized( &self ) -> bool {
        self.inner().initialized
    }
}


impl Default for SimulatedEngine {
    fn default() -> Self {
        Self::new()
    }
}


#[async_trait]
impl PlaybackEngine for SimulatedEngine {
    async fn setup( &self ) -> Result<(), EngineError> {
        self.with( EngineCall::Setup, |inner, _| {
            if inner.fail_setup {
                return Err( EngineError::Rejected( "setup failed".into() ) );
            }
            if inner.initialized {
                return Err( EngineError::Rejected( "The player has already been initialized".into() ) );
            }
            inner.initialized = true;
            tracing::debug!( "Simulated engine set up" );
            Ok(())
        })
    }


    async fn update_options( &self, options: EngineOptions ) -> Result<(), EngineError> {
        self.with( EngineCall::UpdateOptions, |inner, _| {
            inner.ensure_ready()?;
            inner.options = Some( options );
            Ok(())
        })
    }


    async fn add( &self, tracks: Vec<Track> ) -> Result<(), EngineError> {
        let ids = tracks.iter().map( |t| t.id.clone() ).collect();
        self.with( EngineCall::Add { ids }, |inner, events| {
            inner.ensure_ready()?;
            if std::mem::take( &mut inner.fail_next_add ) {
                return Err( EngineError::Rejected( "injected add failure".into() ) );
            }
            if tracks.is_empty() {
                return Ok(());
            }
            inner.queue.extend( tracks );
            if inner.index.is_none() {
                inner.load( 0, events );
                inner.set_state( EngineState::Ready, events );
            }
            Ok(())
        })
    }


    async fn reset( &self ) -> Result<(), EngineError> {
        self.with( EngineCall::Reset, |inner, events| {
            inner.ensure_ready()?;
            inner.set_state( EngineState::None, events );
            inner.queue.clear();
            inner.index = None;
            inner.offset = 0.0;
            events.push( EngineEvent::TrackChanged { index: None } );
            Ok(())
        })
    }


    async fn queue( &self ) -> Result<Vec<Track>, EngineError> {
        self.with( EngineCall::Queue, |inner, _| {
            inner.ensure_ready()?;
            Ok( inner.queue.clone() )
        })
    }


    async fn current_track( &self ) -> Result<Option<usize>, EngineError> {
        self.with( EngineCall::CurrentTrack, |inner, events| {
            inner.ensure_ready()?;
            inner.settle( events );
            Ok( inner.index )
        })
    }


    async fn state( &self ) -> Result<EngineState, EngineError> {
        self.with( EngineCall::State, |inner, events| {
            inner.ensure_ready()?;
            inner.settle( events );
            Ok( inner.state )
        })
    }


    async fn play( &self ) -> Result<(), EngineError> {
        self.with( EngineCall::Play, |inner, events| {
            inner.ensure_accepts_commands( events )?;
            if inner.queue.is_empty() {
                return Err( EngineError::EmptyQueue );
            }
            if inner.state == EngineState::Stopped {
                inner.offset = 0.0;
            }
            inner.set_state( EngineState::Playing, events );
            Ok(())
        })
    }


    async fn pause( &self ) -> Result<(), EngineError> {
        self.with( EngineCall::Pause, |inner, events| {
            inner.ensure_accepts_commands( events )?;
            if inner.state.is_playing() {
                inner.set_state( EngineState::Paused, events );
            }
            Ok(())
        })
    }


    async fn skip_to_next( &self ) -> Result<(), EngineError> {
        self.with( EngineCall::SkipToNext, |inner, events| {
            inner.ensure_accepts_commands( events )?;
            inner.skip( true, events )
        })
    }


    async fn skip_to_previous( &self ) -> Result<(), EngineError> {
        self.with( EngineCall::SkipToPrevious, |inner, events| {
            inner.ensure_accepts_commands( events )?;
            inner.skip( false, events )
        })
    }


    async fn seek_to( &self, position: Duration ) -> Result<(), EngineError> {
        self.with( EngineCall::SeekTo( position ), |inner, events| {
            inner.ensure_accepts_commands( events )?;
            if inner.queue.is_empty() {
                return Err( EngineError::EmptyQueue );
            }
            inner.offset = position.as_secs_f64();
            if inner.playing_since.is_some() {
                inner.playing_since = Some( Instant::now() );
            }
            Ok(())
        })
    }


    async fn set_repeat_mode( &self, mode: RepeatMode ) -> Result<(), EngineError> {
        self.with( EngineCall::SetRepeatMode( mode ), |inner, _| {
            inner.ensure_ready()?;
            inner.repeat = mode;
            Ok(())
        })
    }


    async fn repeat_mode( &self ) -> Result<RepeatMode, EngineError> {
        self.with( EngineCall::RepeatMode, |inner, _| {
            inner.ensure_ready()?;
            Ok( inner.repeat )
        })
    }


    async fn progress( &self ) -> Result<Progress, EngineError> {
        self.with( EngineCall::Progress, |inner, events| {
            inner.ensure_ready()?;
            inner.settle( events );
            let duration = inner.duration();
            Ok( Progress {
                position: inner.position(),
                duration,
                buffered: duration,
            })
        })
    }


    fn subscribe( &self ) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::track::seed_playlist;


    async fn ready_engine() -> SimulatedEngine {
        let engine = SimulatedEngine::recording();
        engine.setup().await.unwrap();
        engine.add( seed_playlist() ).await.unwrap();
        engine
    }


    #[tokio::test]
    async fn test_queries_fail_before_setup() {
        let engine = SimulatedEngine::recording();
        assert_eq!( engine.current_track().await, Err( EngineError::NotInitialized ) );
        assert_eq!( engine.queue().await, Err( EngineError::NotInitialized ) );
    }


    #[tokio::test]
    async fn test_second_setup_is_rejected() {
        let engine = SimulatedEngine::recording();
        engine.setup().await.unwrap();
        assert!( engine.is_initialized() );
        assert!( matches!( engine.setup().await, Err( EngineError::Rejected( _ ) ) ) );
    }


    #[tokio::test]
    async fn test_failed_setup_leaves_engine_uninitialized() {
        let engine = SimulatedEngine::recording();
        engine.fail_setup( true );
        assert!( engine.setup().await.is_err() );
        assert!( !engine.is_initialized() );
        assert_eq!( engine.count( &EngineCall::Setup ), 1 );
    }


    #[tokio::test]
    async fn test_add_selects_first_track() {
        let engine = ready_engine().await;
        assert_eq!( engine.current_track().await.unwrap(), Some( 0 ) );
        assert_eq!( engine.state().await.unwrap(), EngineState::Ready );
    }


    #[tokio::test( start_paused = true )]
    async fn test_position_follows_clock_while_playing() {
        let engine = ready_engine().await;
        engine.play().await.unwrap();
        tokio::time::advance( Duration::from_secs( 5 ) ).await;
        engine.pause().await.unwrap();
        tokio::time::advance( Duration::from_secs( 5 ) ).await;

        let progress = engine.progress().await.unwrap();
        assert!( ( progress.position - 5.0 ).abs() < 0.01 );
        assert_eq!( progress.duration, 60.0 );
    }


    #[tokio::test( start_paused = true )]
    async fn test_track_end_advances_and_emits_event() {
        let engine = ready_engine().await;
        let mut events = engine.subscribe();
        engine.play().await.unwrap();
        tokio::time::advance( Duration::from_secs( 61 ) ).await;

        assert_eq!( engine.current_track().await.unwrap(), Some( 1 ) );
        let mut saw_change = false;
        while let Ok( event ) = events.try_recv() {
            if event == ( EngineEvent::TrackChanged { index: Some( 1 ) } ) {
                saw_change = true;
            }
        }
        assert!( saw_change );
    }


    #[tokio::test( start_paused = true )]
    async fn test_queue_ends_without_repeat() {
        let engine = ready_engine().await;
        engine.skip_to_next().await.unwrap();
        engine.skip_to_next().await.unwrap();
        engine.play().await.unwrap();
        tokio::time::advance( Duration::from_secs( 61 ) ).await;

        assert_eq!( engine.state().await.unwrap(), EngineState::Stopped );
        assert_eq!( engine.current_track().await.unwrap(), Some( 2 ) );
    }


    #[tokio::test]
    async fn test_skip_wraps_only_with_queue_repeat() {
        let engine = ready_engine().await;
        assert!( engine.skip_to_previous().await.is_err() );

        engine.set_repeat_mode( RepeatMode::Queue ).await.unwrap();
        engine.skip_to_previous().await.unwrap();
        assert_eq!( engine.current_track().await.unwrap(), Some( 2 ) );
        engine.skip_to_next().await.unwrap();
        assert_eq!( engine.current_track().await.unwrap(), Some( 0 ) );
    }


    #[tokio::test]
    async fn test_skip_keeps_playing() {
        let engine = ready_engine().await;
        engine.play().await.unwrap();
        engine.skip_to_next().await.unwrap();
        assert_eq!( engine.state().await.unwrap(), EngineState::Playing );
    }


    #[tokio::test]
    async fn test_reset_empties_queue() {
        let engine = ready_engine().await;
        engine.reset().await.unwrap();
        assert!( engine.queue().await.unwrap().is_empty() );
        assert_eq!( engine.current_track().await.unwrap(), None );
        assert_eq!( engine.play().await, Err( EngineError::EmptyQueue ) );
    }


    #[tokio::test]
    async fn test_injected_command_failure() {
        let engine = ready_engine().await;
        let mut events = engine.subscribe();
        engine.fail_commands( true );
        assert!( matches!( engine.play().await, Err( EngineError::Rejected( _ ) ) ) );
        assert_eq!( engine.count( &EngineCall::Play ), 1 );
        assert!( matches!( events.try_recv(), Ok( EngineEvent::Error { .. } ) ) );
    }


    #[tokio::test]
    async fn test_plain_engine_keeps_no_call_log() {
        let engine = SimulatedEngine::new();
        engine.setup().await.unwrap();
        engine.add( seed_playlist() ).await.unwrap();
        for _ in 0..1000 {
            engine.progress().await.unwrap();
            engine.state().await.unwrap();
        }
        assert!( engine.calls().is_empty() );
        assert_eq!( engine.count( &EngineCall::Progress ), 0 );
    }


    #[tokio::test]
    async fn test_call_log_order() {
        let engine = SimulatedEngine::recording();
        engine.setup().await.unwrap();
        engine.clear_calls();
        engine.add( seed_playlist() ).await.unwrap();
        engine.play().await.unwrap();
        engine.pause().await.unwrap();

        assert_eq!( engine.transport_calls(), vec![ EngineCall::Play, EngineCall::Pause ] );
        assert!( matches!( engine.calls()[ 0 ], EngineCall::Add { ref ids } if ids.len() == 3 ) );
    }
}
