//! Engine adapter
//!
//! Thin façade over the injected engine: idempotent setup, seeding the
//! session queue, and forwarding transport commands. Commands return the
//! engine's result untouched; whether to surface or swallow a failure is
//! decided by the caller through [`ErrorReporting`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::engine::{ EngineError, EngineEvent, EngineOptions, EngineState, PlaybackEngine, Progress };
use crate::track::{ seed_playlist, RepeatMode, Track };


/// How setup and command failures reach the caller.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum ErrorReporting {
    /// Log the failure and report success.
    #[default]
    Swallow,

    /// Return the failure to the caller.
    Surface,
}


/// Result of [`PlaybackEngineAdapter::initialize`].
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum InitOutcome {
    /// Setup ran during this call.
    Ready,

    /// The engine answered a query, so it was already set up.
    AlreadyReady,

    /// Setup failed. Only returned under [`ErrorReporting::Surface`].
    Failed( EngineError ),
}


impl InitOutcome {
    pub fn is_ready( &self ) -> bool {
        matches!( self, InitOutcome::Ready | InitOutcome::AlreadyReady )
    }
}


/// Result of [`PlaybackEngineAdapter::load_default_queue_if_empty`].
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum SeedOutcome {
    Seeded { count: usize },
    AlreadyLoaded { count: usize },
}


/// Façade over a shared [`PlaybackEngine`].
#[derive( Clone )]
pub struct PlaybackEngineAdapter {
    engine: Arc<dyn PlaybackEngine>,
    options: EngineOptions,
    reporting: ErrorReporting,
}


impl PlaybackEngineAdapter {
    /// Creates an adapter with default options and swallowed setup errors.
    pub fn new( engine: Arc<dyn PlaybackEngine> ) -> Self {
        Self {
            engine,
            options: EngineOptions::default(),
            reporting: ErrorReporting::default(),
        }
    }


    /// Overrides the options applied after setup.
    pub fn with_options( mut self, options: EngineOptions ) -> Self {
        self.options = options;
        self
    }


    pub fn with_error_reporting( mut self, reporting: ErrorReporting ) -> Self {
        self.reporting = reporting;
        self
    }


    pub fn error_reporting( &self ) -> ErrorReporting {
        self.reporting
    }


    /// Sets up the engine unless it already answers queries.
    ///
    /// A failed current-track query means the engine was never set up, so
    /// setup and options are applied inline. Under
    /// [`ErrorReporting::Swallow`] a failed setup is logged and still
    /// reported as [`InitOutcome::Ready`].
    pub async fn initialize( &self ) -> InitOutcome {
        match self.engine.current_track().await {
            Ok( _ ) => {
                tracing::debug!( "Engine already set up" );
                return InitOutcome::AlreadyReady;
            }
            Err( e ) => tracing::debug!( "Engine not set up yet: {}", e ),
        }

        let result = match self.engine.setup().await {
            Ok(()) => self.engine.update_options( self.options.clone() ).await,
            Err( e ) => Err( e ),
        };

        match ( result, self.reporting ) {
            ( Ok(()), _ ) => {
                tracing::info!( "Engine set up" );
                InitOutcome::Ready
            }
            ( Err( e ), ErrorReporting::Swallow ) => {
                tracing::warn!( "Engine setup failed, continuing: {}", e );
                InitOutcome::Ready
            }
            ( Err( e ), ErrorReporting::Surface ) => {
                tracing::error!( "Engine setup failed: {}", e );
                InitOutcome::Failed( e )
            }
        }
    }


    /// Seeds the session playlist with repeat-queue when the queue is empty.
    pub async fn load_default_queue_if_empty( &self ) -> Result<SeedOutcome, EngineError> {
        let queued = self.engine.queue().await?.len();
        if queued > 0 {
            tracing::debug!( "Queue already holds {} tracks", queued );
            return Ok( SeedOutcome::AlreadyLoaded { count: queued } );
        }

        let tracks = seed_playlist();
        let count = tracks.len();
        self.engine.add( tracks ).await?;
        self.engine.set_repeat_mode( RepeatMode::Queue ).await?;

        tracing::info!( "Seeded queue with {} tracks", count );
        Ok( SeedOutcome::Seeded { count } )
    }


    /// Runs the screen start-up sequence: initialize, then seed if empty.
    ///
    /// The screen may leave its loading indicator when this returns an
    /// outcome that [`InitOutcome::is_ready`].
    pub async fn prepare_session( &self ) -> Result<InitOutcome, EngineError> {
        let outcome = self.initialize().await;
        if outcome.is_ready() {
            self.load_default_queue_if_empty().await?;
        }
        Ok( outcome )
    }


    /// Returns a read-only copy of the engine queue.
    pub async fn queue_snapshot( &self ) -> Result<Vec<Track>, EngineError> {
        self.engine.queue().await
    }


    pub async fn state( &self ) -> Result<EngineState, EngineError> {
        self.engine.state().await
    }


    pub async fn current_index( &self ) -> Result<Option<usize>, EngineError> {
        self.engine.current_track().await
    }


    pub async fn progress( &self ) -> Result<Progress, EngineError> {
        self.engine.progress().await
    }


    pub async fn repeat_mode( &self ) -> Result<RepeatMode, EngineError> {
        self.engine.repeat_mode().await
    }


    pub fn subscribe( &self ) -> broadcast::Receiver<EngineEvent> {
        self.engine.subscribe()
    }


    pub async fn play( &self ) -> Result<(), EngineError> {
        tracing::debug!( "play" );
        self.engine.play().await
    }


    pub async fn pause( &self ) -> Result<(), EngineError> {
        tracing::debug!( "pause" );
        self.engine.pause().await
    }


    pub async fn skip_next( &self ) -> Result<(), EngineError> {
        tracing::debug!( "skip next" );
        self.engine.skip_to_next().await
    }


    pub async fn skip_previous( &self ) -> Result<(), EngineError> {
        tracing::debug!( "skip previous" );
        self.engine.skip_to_previous().await
    }


    pub async fn seek( &self, position: Duration ) -> Result<(), EngineError> {
        tracing::debug!( "seek to {:?}", position );
        self.engine.seek_to( position ).await
    }


    pub async fn set_repeat_mode( &self, mode: RepeatMode ) -> Result<(), EngineError> {
        tracing::debug!( "repeat {:?}", mode );
        self.engine.set_repeat_mode( mode ).await
    }


    /// Empties the engine queue.
    pub async fn clear_queue( &self ) -> Result<(), EngineError> {
        self.engine.reset().await
    }


    pub async fn append( &self, tracks: Vec<Track> ) -> Result<(), EngineError> {
        self.engine.add( tracks ).await
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::engine::Capability;
    use crate::sim::{ EngineCall, SimulatedEngine };
    use crate::track::SEED_TRACK_COUNT;


    fn adapter_with( engine: &Arc<SimulatedEngine> ) -> PlaybackEngineAdapter {
        PlaybackEngineAdapter::new( engine.clone() )
    }


    #[tokio::test]
    async fn test_initialize_runs_setup_once() {
        let engine = Arc::new( SimulatedEngine::recording() );
        let adapter = adapter_with( &engine );

        let first = adapter.initialize().await;
        let second = adapter.initialize().await;

        assert_eq!( first, InitOutcome::Ready );
        assert_eq!( second, InitOutcome::AlreadyReady );
        assert!( first.is_ready() && second.is_ready() );
        assert_eq!( engine.count( &EngineCall::Setup ), 1 );
        assert_eq!( engine.options(), Some( EngineOptions::default() ) );
    }


    #[tokio::test]
    async fn test_initialize_applies_custom_options() {
        let engine = Arc::new( SimulatedEngine::recording() );
        let options = EngineOptions {
            compact_capabilities: vec![ Capability::Play ],
            progress_update_interval: Duration::from_secs( 5 ),
            ..EngineOptions::default()
        };
        let adapter = adapter_with( &engine ).with_options( options.clone() );

        assert_eq!( adapter.initialize().await, InitOutcome::Ready );
        assert_eq!( engine.options(), Some( options ) );
    }


    #[tokio::test]
    async fn test_initialize_twice_has_no_duplicate_queue_entries() {
        let engine = Arc::new( SimulatedEngine::recording() );
        let adapter = adapter_with( &engine );

        adapter.prepare_session().await.unwrap();
        adapter.prepare_session().await.unwrap();

        assert_eq!( adapter.queue_snapshot().await.unwrap().len(), SEED_TRACK_COUNT );
    }


    #[tokio::test]
    async fn test_setup_failure_swallowed_by_default() {
        let engine = Arc::new( SimulatedEngine::recording() );
        engine.fail_setup( true );
        let adapter = adapter_with( &engine );

        assert_eq!( adapter.initialize().await, InitOutcome::Ready );
    }


    #[tokio::test]
    async fn test_setup_failure_surfaced_when_asked() {
        let engine = Arc::new( SimulatedEngine::recording() );
        engine.fail_setup( true );
        let adapter = adapter_with( &engine ).with_error_reporting( ErrorReporting::Surface );

        let outcome = adapter.initialize().await;
        assert!( matches!( outcome, InitOutcome::Failed( EngineError::Rejected( _ ) ) ) );
        assert!( !outcome.is_ready() );
    }


    #[tokio::test]
    async fn test_seed_on_empty_queue() {
        let engine = Arc::new( SimulatedEngine::recording() );
        let adapter = adapter_with( &engine );
        adapter.initialize().await;

        let outcome = adapter.load_default_queue_if_empty().await.unwrap();
        assert_eq!( outcome, SeedOutcome::Seeded { count: 3 } );

        let ids: Vec<_> = adapter.queue_snapshot().await.unwrap().into_iter().map( |t| t.id ).collect();
        assert_eq!( ids, vec![ "1", "2", "3" ] );
        assert_eq!( adapter.repeat_mode().await.unwrap(), RepeatMode::Queue );
    }


    #[tokio::test]
    async fn test_seed_is_noop_on_non_empty_queue() {
        let engine = Arc::new( SimulatedEngine::recording() );
        let adapter = adapter_with( &engine );
        adapter.initialize().await;
        adapter.append( vec![ Track::new( "x", "asset://x", "X", "Y", 30.0 ) ] ).await.unwrap();
        engine.clear_calls();

        let outcome = adapter.load_default_queue_if_empty().await.unwrap();
        assert_eq!( outcome, SeedOutcome::AlreadyLoaded { count: 1 } );
        assert_eq!( engine.calls(), vec![ EngineCall::Queue ] );
    }


    #[tokio::test]
    async fn test_prepare_session_skips_seed_when_setup_fails() {
        let engine = Arc::new( SimulatedEngine::recording() );
        engine.fail_setup( true );
        let adapter = adapter_with( &engine ).with_error_reporting( ErrorReporting::Surface );

        let outcome = adapter.prepare_session().await.unwrap();
        assert!( !outcome.is_ready() );
        assert_eq!( engine.count( &EngineCall::Queue ), 0 );
    }


    #[tokio::test]
    async fn test_swallowed_setup_failure_still_fails_seeding() {
        let engine = Arc::new( SimulatedEngine::recording() );
        engine.fail_setup( true );
        let adapter = adapter_with( &engine );

        assert_eq!( adapter.prepare_session().await, Err( EngineError::NotInitialized ) );
    }


    #[tokio::test]
    async fn test_commands_forward_errors() {
        let engine = Arc::new( SimulatedEngine::recording() );
        let adapter = adapter_with( &engine );
        assert_eq!( adapter.play().await, Err( EngineError::NotInitialized ) );
    }
}
