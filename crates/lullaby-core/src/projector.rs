//! Playback state projection
//!
//! Mirrors the engine into a [`PlaybackSnapshot`] the screen can render.
//! Two sources feed it: the engine's track-changed events, and a fixed
//! interval poll of progress and transport state. The poll is the only tick
//! source for the progress slider.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::adapter::PlaybackEngineAdapter;
use crate::engine::{ EngineError, EngineEvent, Progress };
use crate::track::Track;


/// Default progress poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis( 200 );


/// Formats seconds as `MM:SS`.
///
/// Minutes are unbounded and padded to at least two digits. Fractions are
/// truncated; negative and non-finite inputs render as `00:00`.
pub fn format_time( seconds: f64 ) -> String {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds.trunc() as u64
    } else {
        0
    };
    format!( "{:02}:{:02}", secs / 60, secs % 60 )
}


/// UI-facing view of the engine. Possibly stale.
#[derive( Debug, Clone, PartialEq, Default )]
pub struct PlaybackSnapshot {
    pub position_secs: f64,
    pub duration_secs: f64,
    pub playing: bool,
    /// Ignored while `queue` is empty
    pub current_index: usize,
    pub queue: Vec<Track>,
}


impl PlaybackSnapshot {
    /// Returns the current track, or `None` if the index is stale.
    pub fn current_track( &self ) -> Option<&Track> {
        self.queue.get( self.current_index )
    }


    /// Slider position in `[0, 1]`.
    pub fn slider_fraction( &self ) -> f64 {
        if self.duration_secs > 0.0 {
            ( self.position_secs / self.duration_secs ).clamp( 0.0, 1.0 )
        } else {
            0.0
        }
    }


    pub fn position_label( &self ) -> String {
        format_time( self.position_secs )
    }


    pub fn duration_label( &self ) -> String {
        format_time( self.duration_secs )
    }


    fn apply_progress( &mut self, progress: Progress ) {
        let duration = sanitize( progress.duration );
        let mut position = sanitize( progress.position );
        if duration > 0.0 {
            position = position.min( duration );
        }
        self.duration_secs = duration;
        self.position_secs = position;
    }
}


fn sanitize( seconds: f64 ) -> f64 {
    if seconds.is_finite() && seconds > 0.0 { seconds } else { 0.0 }
}


/// Projects engine state into a watch channel of snapshots.
pub struct PlaybackStateProjector {
    adapter: PlaybackEngineAdapter,
    poll_interval: Duration,
    snapshot: watch::Sender<PlaybackSnapshot>,
}


impl PlaybackStateProjector {
    pub fn new( adapter: PlaybackEngineAdapter ) -> Self {
        let ( snapshot, _ ) = watch::channel( PlaybackSnapshot::default() );
        Self {
            adapter,
            poll_interval: DEFAULT_POLL_INTERVAL,
            snapshot,
        }
    }


    pub fn with_poll_interval( mut self, interval: Duration ) -> Self {
        self.poll_interval = interval;
        self
    }


    pub fn poll_interval( &self ) -> Duration {
        self.poll_interval
    }


    /// Returns a receiver that always holds the latest snapshot.
    pub fn subscribe( &self ) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot.subscribe()
    }


    /// Returns a copy of the latest snapshot.
    pub fn snapshot( &self ) -> PlaybackSnapshot {
        self.snapshot.borrow().clone()
    }


    fn update( &self, f: impl FnOnce( &mut PlaybackSnapshot ) ) {
        self.snapshot.send_if_modified( |snapshot| {
            let before = snapshot.clone();
            f( snapshot );
            *snapshot != before
        });
    }


    /// Re-reads the engine queue into the cached copy.
    pub async fn refresh_queue( &self ) -> Result<(), EngineError> {
        let queue = self.adapter.queue_snapshot().await?;
        tracing::debug!( "Queue refreshed: {} tracks", queue.len() );
        self.update( |s| s.queue = queue );
        Ok(())
    }


    /// Re-reads the active track index.
    pub async fn refresh_index( &self ) -> Result<(), EngineError> {
        let index = self.adapter.current_index().await?.unwrap_or( 0 );
        self.update( |s| s.current_index = index );
        Ok(())
    }


    /// Polls progress and transport state once.
    pub async fn poll_progress( &self ) -> Result<(), EngineError> {
        let progress = self.adapter.progress().await?;
        let playing = self.adapter.state().await?.is_playing();
        self.update( |s| {
            s.apply_progress( progress );
            s.playing = playing;
        });
        Ok(())
    }


    /// Applies one pushed engine event.
    pub async fn handle_event( &self, event: EngineEvent ) -> Result<(), EngineError> {
        match event {
            EngineEvent::TrackChanged { .. } => self.refresh_index().await,
            EngineEvent::StateChanged { state } => {
                self.update( |s| s.playing = state.is_playing() );
                Ok(())
            }
            EngineEvent::QueueEnded => {
                self.update( |s| s.playing = false );
                Ok(())
            }
            EngineEvent::Error { message } => {
                tracing::warn!( "Engine reported: {}", message );
                Ok(())
            }
        }
    }


    /// Spawns the projection loop on the current runtime.
    pub fn start( self ) -> ProjectorHandle {
        let projector = Arc::new( self );
        let snapshot = projector.subscribe();
        let ( shutdown_tx, shutdown_rx ) = watch::channel( false );
        let task = tokio::spawn( Arc::clone( &projector ).run( shutdown_rx ) );

        ProjectorHandle {
            projector,
            snapshot,
            shutdown: shutdown_tx,
            task,
        }
    }


    async fn run( self: Arc<Self>, mut shutdown: watch::Receiver<bool> ) {
        let mut events = self.adapter.subscribe();
        let mut events_open = true;

        if let Err( e ) = self.refresh_queue().await {
            tracing::debug!( "Initial queue read failed: {}", e );
        }
        if let Err( e ) = self.refresh_index().await {
            tracing::debug!( "Initial index read failed: {}", e );
        }

        let mut ticker = tokio::time::interval( self.poll_interval );
        ticker.set_missed_tick_behavior( MissedTickBehavior::Skip );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err( e ) = self.poll_progress().await {
                        tracing::trace!( "Progress poll failed: {}", e );
                    }
                }
                event = events.recv(), if events_open => match event {
                    Ok( event ) => {
                        if let Err( e ) = self.handle_event( event ).await {
                            tracing::debug!( "Event handling failed: {}", e );
                        }
                    }
                    Err( RecvError::Lagged( skipped ) ) => {
                        tracing::warn!( "Missed {} engine events, resyncing", skipped );
                        let _ = self.refresh_index().await;
                    }
                    Err( RecvError::Closed ) => {
                        tracing::debug!( "Engine event channel closed" );
                        events_open = false;
                    }
                },
            }
        }

        tracing::debug!( "Projector stopped" );
    }
}


/// Running projection loop. Dropping it stops further updates.
pub struct ProjectorHandle {
    projector: Arc<PlaybackStateProjector>,
    snapshot: watch::Receiver<PlaybackSnapshot>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}


impl ProjectorHandle {
    pub fn projector( &self ) -> &Arc<PlaybackStateProjector> {
        &self.projector
    }


    /// Returns a new receiver of snapshots.
    pub fn subscribe( &self ) -> watch::Receiver<PlaybackSnapshot> {
        self.snapshot.clone()
    }


    pub fn snapshot( &self ) -> PlaybackSnapshot {
        self.snapshot.borrow().clone()
    }


    /// Stops the loop and waits for it to exit.
    pub async fn stop( self ) {
        let _ = self.shutdown.send( true );
        if let Err( e ) = self.task.await {
            tracing::warn!( "Projector task ended abnormally: {}", e );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;
    use crate::engine::PlaybackEngine;
    use crate::sim::SimulatedEngine;


    async fn seeded() -> ( Arc<SimulatedEngine>, PlaybackEngineAdapter ) {
        let engine = Arc::new( SimulatedEngine::recording() );
        let adapter = PlaybackEngineAdapter::new( engine.clone() );
        adapter.prepare_session().await.unwrap();
        ( engine, adapter )
    }


    #[test]
    fn test_format_examples() {
        assert_eq!( format_time( 65.0 ), "01:05" );
        assert_eq!( format_time( 599.0 ), "09:59" );
        assert_eq!( format_time( 3600.0 ), "60:00" );
        assert_eq!( format_time( 0.0 ), "00:00" );
    }


    #[test]
    fn test_format_grid() {
        for s in 0..6000u32 {
            let expected = format!( "{:02}:{:02}", s / 60, s % 60 );
            assert_eq!( format_time( s as f64 ), expected, "seconds = {}", s );
        }
    }


    #[test]
    fn test_format_defensive_inputs() {
        assert_eq!( format_time( -5.0 ), "00:00" );
        assert_eq!( format_time( f64::NAN ), "00:00" );
        assert_eq!( format_time( f64::INFINITY ), "00:00" );
        assert_eq!( format_time( 59.99 ), "00:59" );
        assert_eq!( format_time( 6000.0 ), "100:00" );
    }


    #[test]
    fn test_progress_is_clamped() {
        let mut snapshot = PlaybackSnapshot::default();
        snapshot.apply_progress( Progress { position: 75.0, duration: 60.0, buffered: 60.0 } );
        assert_eq!( snapshot.position_secs, 60.0 );
        assert_eq!( snapshot.slider_fraction(), 1.0 );

        snapshot.apply_progress( Progress { position: -1.0, duration: f64::NAN, buffered: 0.0 } );
        assert_eq!( snapshot.position_secs, 0.0 );
        assert_eq!( snapshot.duration_secs, 0.0 );
        assert_eq!( snapshot.slider_fraction(), 0.0 );
    }


    #[test]
    fn test_stale_index_has_no_track() {
        let snapshot = PlaybackSnapshot { current_index: 4, ..Default::default() };
        assert!( snapshot.current_track().is_none() );
    }


    #[tokio::test]
    async fn test_track_changed_refetches_index() {
        let ( engine, adapter ) = seeded().await;
        let projector = PlaybackStateProjector::new( adapter );
        projector.refresh_queue().await.unwrap();

        engine.skip_to_next().await.unwrap();
        projector.handle_event( EngineEvent::TrackChanged { index: Some( 1 ) } ).await.unwrap();

        let snapshot = projector.snapshot();
        assert_eq!( snapshot.current_index, 1 );
        assert_eq!( snapshot.current_track().map( |t| t.title.as_str() ), Some( "Beatles" ) );
    }


    #[tokio::test( start_paused = true )]
    async fn test_poll_reads_position_and_state() {
        let ( engine, adapter ) = seeded().await;
        let projector = PlaybackStateProjector::new( adapter );

        engine.play().await.unwrap();
        tokio::time::advance( Duration::from_secs( 12 ) ).await;
        projector.poll_progress().await.unwrap();

        let snapshot = projector.snapshot();
        assert!( snapshot.playing );
        assert_eq!( snapshot.position_label(), "00:12" );
        assert_eq!( snapshot.duration_label(), "01:00" );
    }


    #[tokio::test( start_paused = true )]
    async fn test_running_loop_follows_track_end() {
        let ( engine, adapter ) = seeded().await;
        let handle = PlaybackStateProjector::new( adapter ).start();
        let mut rx = handle.subscribe();

        engine.play().await.unwrap();
        tokio::time::sleep( Duration::from_secs( 61 ) ).await;
        rx.wait_for( |s| s.current_index == 1 ).await.unwrap();

        let snapshot = handle.snapshot();
        assert_eq!( snapshot.queue.len(), 3 );
        assert!( snapshot.position_secs < 60.0 );
        handle.stop().await;
    }


    #[tokio::test( start_paused = true )]
    async fn test_stopped_loop_publishes_nothing() {
        let ( engine, adapter ) = seeded().await;
        let handle = PlaybackStateProjector::new( adapter ).start();
        let rx = handle.subscribe();
        tokio::time::sleep( Duration::from_millis( 500 ) ).await;
        handle.stop().await;

        let before = rx.borrow().clone();
        engine.play().await.unwrap();
        tokio::time::sleep( Duration::from_secs( 5 ) ).await;
        assert_eq!( *rx.borrow(), before );
    }


    #[tokio::test]
    async fn test_poll_interval_defaults_and_overrides() {
        let ( _engine, adapter ) = seeded().await;
        let projector = PlaybackStateProjector::new( adapter.clone() );
        assert_eq!( projector.poll_interval(), DEFAULT_POLL_INTERVAL );

        let projector = PlaybackStateProjector::new( adapter ).with_poll_interval( Duration::from_secs( 1 ) );
        assert_eq!( projector.poll_interval(), Duration::from_secs( 1 ) );
    }


    #[tokio::test]
    async fn test_error_event_leaves_snapshot_alone() {
        let ( _engine, adapter ) = seeded().await;
        let projector = PlaybackStateProjector::new( adapter );
        projector.refresh_queue().await.unwrap();
        let before = projector.snapshot();

        projector.handle_event( EngineEvent::Error { message: "decoder stalled".into() } ).await.unwrap();
        assert_eq!( projector.snapshot(), before );
    }
}
