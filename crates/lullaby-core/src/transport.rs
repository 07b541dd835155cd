//! Transport control
//!
//! Turns user intents into engine commands. Failures pass through
//! [`ErrorReporting`]: swallowed ones are logged and reported as success.
//!
//! Neither the toggle nor the shuffle is atomic. The toggle reads the
//! engine state and then acts on it, so a lock-screen command landing in
//! between makes it act on stale state. The shuffle empties the engine
//! queue before re-adding the permuted tracks, and a play or skip issued in
//! that window hits an empty queue. Queue mutations are not serialized.
//! If the re-add itself fails, the original order is added back once; if
//! that fails too the engine is left with an empty queue.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;

use crate::adapter::{ ErrorReporting, PlaybackEngineAdapter };
use crate::engine::EngineError;
use crate::projector::PlaybackStateProjector;
use crate::track::RepeatMode;


/// Command issued by [`TransportController::toggle_play_pause`].
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum ToggleAction {
    Played,
    Paused,
}


/// Translates user intents into engine commands.
pub struct TransportController {
    adapter: PlaybackEngineAdapter,
    projector: Option<Arc<PlaybackStateProjector>>,
}


impl TransportController {
    pub fn new( adapter: PlaybackEngineAdapter ) -> Self {
        Self { adapter, projector: None }
    }


    /// Refreshes this projector's cached queue after a shuffle.
    pub fn with_projector( mut self, projector: Arc<PlaybackStateProjector> ) -> Self {
        self.projector = Some( projector );
        self
    }


    fn report<T: Default>( &self, action: &str, result: Result<T, EngineError> ) -> Result<T, EngineError> {
        match ( result, self.adapter.error_reporting() ) {
            ( Ok( value ), _ ) => Ok( value ),
            ( Err( e ), ErrorReporting::Swallow ) => {
                tracing::warn!( "{} failed: {}", action, e );
                Ok( T::default() )
            }
            ( Err( e ), ErrorReporting::Surface ) => Err( e ),
        }
    }


    /// Pauses if the engine reports playing, otherwise plays.
    ///
    /// Returns `None` when the failure was swallowed.
    pub async fn toggle_play_pause( &self ) -> Result<Option<ToggleAction>, EngineError> {
        let result = self.toggle().await.map( Some );
        self.report( "toggle", result )
    }


    async fn toggle( &self ) -> Result<ToggleAction, EngineError> {
        if self.adapter.state().await?.is_playing() {
            self.adapter.pause().await?;
            Ok( ToggleAction::Paused )
        } else {
            self.adapter.play().await?;
            Ok( ToggleAction::Played )
        }
    }


    pub async fn play( &self ) -> Result<(), EngineError> {
        let result = self.adapter.play().await;
        self.report( "play", result )
    }


    pub async fn pause( &self ) -> Result<(), EngineError> {
        let result = self.adapter.pause().await;
        self.report( "pause", result )
    }


    pub async fn next( &self ) -> Result<(), EngineError> {
        let result = self.adapter.skip_next().await;
        self.report( "next", result )
    }


    pub async fn previous( &self ) -> Result<(), EngineError> {
        let result = self.adapter.skip_previous().await;
        self.report( "previous", result )
    }


    pub async fn seek( &self, position: Duration ) -> Result<(), EngineError> {
        let result = self.adapter.seek( position ).await;
        self.report( "seek", result )
    }


    pub async fn set_repeat( &self, mode: RepeatMode ) -> Result<(), EngineError> {
        let result = self.adapter.set_repeat_mode( mode ).await;
        self.report( "repeat", result )
    }


    /// Advances repeat Off → Track → Queue → Off and returns the new mode.
    pub async fn cycle_repeat( &self ) -> Result<RepeatMode, EngineError> {
        let result = self.advance_repeat().await;
        self.report( "repeat", result )
    }


    async fn advance_repeat( &self ) -> Result<RepeatMode, EngineError> {
        let mode = self.adapter.repeat_mode().await?.next();
        self.adapter.set_repeat_mode( mode ).await?;
        Ok( mode )
    }


    /// Reorders the engine queue uniformly at random.
    ///
    /// Returns the number of re-added tracks.
    pub async fn shuffle( &self ) -> Result<usize, EngineError> {
        let result = self.shuffle_queue().await;
        self.report( "shuffle", result )
    }


    async fn shuffle_queue( &self ) -> Result<usize, EngineError> {
        let original = self.adapter.queue_snapshot().await?;
        self.adapter.clear_queue().await?;

        let mut queue = original.clone();
        {
            let mut rng = rand::thread_rng();
            queue.shuffle( &mut rng );
        }
        let count = queue.len();

        if let Err( e ) = self.adapter.append( queue ).await {
            tracing::warn!( "Re-adding shuffled queue failed, restoring original order: {}", e );
            if let Err( restore ) = self.adapter.append( original ).await {
                tracing::error!( "Restoring queue failed: {}", restore );
            }
            if let Some( projector ) = &self.projector {
                if let Err( refresh ) = projector.refresh_queue().await {
                    tracing::warn!( "Queue refresh failed: {}", refresh );
                }
            }
            return Err( e );
        }
        tracing::info!( "Shuffled {} tracks", count );

        if let Some( projector ) = &self.projector {
            projector.refresh_queue().await?;
        }
        Ok( count )
    }
}


#[cfg( test )]
mod tests {
    use std::collections::BTreeSet;

    use async_trait::async_trait;
    use tokio::sync::{ broadcast, Notify };

    use super::*;
    use crate::engine::{ EngineEvent, EngineOptions, EngineState, PlaybackEngine, Progress };
    use crate::sim::{ EngineCall, SimulatedEngine };
    use crate::track::Track;


    async fn seeded( reporting: ErrorReporting ) -> ( Arc<SimulatedEngine>, TransportController ) {
        let engine = Arc::new( SimulatedEngine::recording() );
        let adapter = PlaybackEngineAdapter::new( engine.clone() ).with_error_reporting( reporting );
        adapter.prepare_session().await.unwrap();
        engine.clear_calls();
        ( engine, TransportController::new( adapter ) )
    }


    #[tokio::test]
    async fn test_toggle_pauses_when_playing() {
        let ( engine, controller ) = seeded( ErrorReporting::Swallow ).await;
        engine.play().await.unwrap();
        engine.clear_calls();

        let action = controller.toggle_play_pause().await.unwrap();
        assert_eq!( action, Some( ToggleAction::Paused ) );
        assert_eq!( engine.transport_calls(), vec![ EngineCall::Pause ] );
    }


    #[tokio::test]
    async fn test_toggle_plays_when_paused() {
        let ( engine, controller ) = seeded( ErrorReporting::Swallow ).await;
        engine.play().await.unwrap();
        engine.pause().await.unwrap();
        engine.clear_calls();

        let action = controller.toggle_play_pause().await.unwrap();
        assert_eq!( action, Some( ToggleAction::Played ) );
        assert_eq!( engine.transport_calls(), vec![ EngineCall::Play ] );
    }


    #[tokio::test]
    async fn test_play_then_toggle_scenario() {
        let engine = Arc::new( SimulatedEngine::recording() );
        let adapter = PlaybackEngineAdapter::new( engine.clone() );
        assert!( adapter.initialize().await.is_ready() );
        adapter.load_default_queue_if_empty().await.unwrap();
        let ids: Vec<_> = adapter.queue_snapshot().await.unwrap().into_iter().map( |t| t.id ).collect();
        assert_eq!( ids, vec![ "1", "2", "3" ] );

        let controller = TransportController::new( adapter );
        controller.play().await.unwrap();
        assert_eq!( engine.state().await.unwrap(), EngineState::Playing );
        controller.toggle_play_pause().await.unwrap();

        assert_eq!( engine.count( &EngineCall::Pause ), 1 );
        assert_eq!( engine.count( &EngineCall::Play ), 1 );
    }


    #[tokio::test]
    async fn test_shuffle_is_permutation() {
        let ( engine, controller ) = seeded( ErrorReporting::Swallow ).await;
        let before: BTreeSet<_> = engine.queue().await.unwrap().into_iter().map( |t| t.id ).collect();

        for _ in 0..20 {
            assert_eq!( controller.shuffle().await.unwrap(), 3 );
            let after: Vec<_> = engine.queue().await.unwrap().into_iter().map( |t| t.id ).collect();
            assert_eq!( after.len(), before.len() );
            assert_eq!( after.into_iter().collect::<BTreeSet<_>>(), before );
        }
    }


    #[tokio::test]
    async fn test_shuffle_refreshes_projector_queue() {
        let ( engine, controller ) = seeded( ErrorReporting::Swallow ).await;
        let adapter = PlaybackEngineAdapter::new( engine.clone() );
        let projector = Arc::new( PlaybackStateProjector::new( adapter ) );
        let controller = controller.with_projector( projector.clone() );

        controller.shuffle().await.unwrap();
        assert_eq!( projector.snapshot().queue, engine.queue().await.unwrap() );
    }


    #[tokio::test]
    async fn test_next_and_previous_pass_through() {
        let ( engine, controller ) = seeded( ErrorReporting::Swallow ).await;
        controller.next().await.unwrap();
        controller.previous().await.unwrap();
        assert_eq!( engine.transport_calls(), vec![ EngineCall::SkipToNext, EngineCall::SkipToPrevious ] );
    }


    #[tokio::test]
    async fn test_cycle_repeat_from_queue() {
        let ( engine, controller ) = seeded( ErrorReporting::Swallow ).await;
        assert_eq!( controller.cycle_repeat().await.unwrap(), RepeatMode::Off );
        assert_eq!( controller.cycle_repeat().await.unwrap(), RepeatMode::Track );
        assert_eq!( engine.repeat_mode().await.unwrap(), RepeatMode::Track );
    }


    #[tokio::test]
    async fn test_command_failure_swallowed() {
        let ( engine, controller ) = seeded( ErrorReporting::Swallow ).await;
        engine.fail_commands( true );
        assert_eq!( controller.toggle_play_pause().await, Ok( None ) );
        assert_eq!( controller.next().await, Ok(()) );
    }


    #[tokio::test]
    async fn test_command_failure_surfaced() {
        let ( engine, controller ) = seeded( ErrorReporting::Surface ).await;
        engine.fail_commands( true );
        assert!( matches!( controller.toggle_play_pause().await, Err( EngineError::Rejected( _ ) ) ) );
        assert!( controller.seek( Duration::from_secs( 10 ) ).await.is_err() );
    }


    #[tokio::test]
    async fn test_failed_readd_restores_original_order() {
        let ( engine, controller ) = seeded( ErrorReporting::Swallow ).await;
        let before = engine.queue().await.unwrap();
        engine.fail_next_add();

        assert_eq!( controller.shuffle().await, Ok( 0 ) );
        assert_eq!( engine.queue().await.unwrap(), before );
    }


    #[tokio::test]
    async fn test_failed_readd_surfaced() {
        let ( engine, controller ) = seeded( ErrorReporting::Surface ).await;
        engine.fail_next_add();

        assert!( matches!( controller.shuffle().await, Err( EngineError::Rejected( _ ) ) ) );
        assert_eq!( engine.queue().await.unwrap().len(), 3 );
    }


    /// Delegates to a simulated engine but holds `add` until released.
    struct GatedEngine {
        inner: SimulatedEngine,
        entered: Notify,
        release: Notify,
    }


    #[async_trait]
    impl PlaybackEngine for GatedEngine {
        async fn setup( &self ) -> Result<(), EngineError> { self.inner.setup().await }
        async fn update_options( &self, options: EngineOptions ) -> Result<(), EngineError> { self.inner.update_options( options ).await }
        async fn add( &self, tracks: Vec<Track> ) -> Result<(), EngineError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.add( tracks ).await
        }
        async fn reset( &self ) -> Result<(), EngineError> { self.inner.reset().await }
        async fn queue( &self ) -> Result<Vec<Track>, EngineError> { self.inner.queue().await }
        async fn current_track( &self ) -> Result<Option<usize>, EngineError> { self.inner.current_track().await }
        async fn state( &self ) -> Result<EngineState, EngineError> { self.inner.state().await }
        async fn play( &self ) -> Result<(), EngineError> { self.inner.play().await }
        async fn pause( &self ) -> Result<(), EngineError> { self.inner.pause().await }
        async fn skip_to_next( &self ) -> Result<(), EngineError> { self.inner.skip_to_next().await }
        async fn skip_to_previous( &self ) -> Result<(), EngineError> { self.inner.skip_to_previous().await }
        async fn seek_to( &self, position: Duration ) -> Result<(), EngineError> { self.inner.seek_to( position ).await }
        async fn set_repeat_mode( &self, mode: RepeatMode ) -> Result<(), EngineError> { self.inner.set_repeat_mode( mode ).await }
        async fn repeat_mode( &self ) -> Result<RepeatMode, EngineError> { self.inner.repeat_mode().await }
        async fn progress( &self ) -> Result<Progress, EngineError> { self.inner.progress().await }
        fn subscribe( &self ) -> broadcast::Receiver<EngineEvent> { self.inner.subscribe() }
    }


    #[tokio::test]
    async fn test_commands_during_shuffle_hit_empty_queue() {
        let inner = SimulatedEngine::recording();
        inner.setup().await.unwrap();
        inner.add( crate::track::seed_playlist() ).await.unwrap();
        let engine = Arc::new( GatedEngine { inner, entered: Notify::new(), release: Notify::new() } );

        let controller = Arc::new( TransportController::new(
            PlaybackEngineAdapter::new( engine.clone() ).with_error_reporting( ErrorReporting::Surface ),
        ));
        let shuffling = tokio::spawn({
            let controller = controller.clone();
            async move { controller.shuffle().await }
        });

        engine.entered.notified().await;
        assert!( engine.queue().await.unwrap().is_empty() );
        assert_eq!( controller.next().await, Err( EngineError::EmptyQueue ) );

        engine.release.notify_one();
        assert_eq!( shuffling.await.unwrap(), Ok( 3 ) );
        assert_eq!( engine.queue().await.unwrap().len(), 3 );
    }
}
