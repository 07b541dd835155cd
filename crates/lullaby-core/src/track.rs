//! Track and queue types
//!
//! Tracks are immutable once queued. The engine owns the authoritative
//! queue; everything here is a cached copy used for display.


/// Opaque locator of a bundled asset, handed to the engine untouched.
pub type TrackSource = String;


/// A single queued track.
#[derive( Debug, Clone, PartialEq )]
pub struct Track {
    /// Unique within a queue
    pub id: String,
    pub source: TrackSource,
    pub title: String,
    pub artist: String,
    pub duration_secs: f64,
}


impl Track {
    /// Creates a new track.
    pub fn new(
        id: impl Into<String>,
        source: impl Into<TrackSource>,
        title: impl Into<String>,
        artist: impl Into<String>,
        duration_secs: f64,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            title: title.into(),
            artist: artist.into(),
            duration_secs,
        }
    }
}


/// Repeat mode applied by the engine when a track ends.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum RepeatMode {
    #[default]
    Off,
    Track,
    Queue,
}


impl RepeatMode {
    /// Returns the next mode in the Off → Track → Queue cycle.
    pub fn next( self ) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::Track,
            RepeatMode::Track => RepeatMode::Queue,
            RepeatMode::Queue => RepeatMode::Off,
        }
    }


    /// Returns a short label for the status line.
    pub fn label( &self ) -> &'static str {
        match self {
            RepeatMode::Off => "off",
            RepeatMode::Track => "track",
            RepeatMode::Queue => "queue",
        }
    }
}


/// Asset locators of the bundled session audio.
pub mod assets {
    pub const SONG_2: &str = "asset://songs/song2";
    pub const SONG_3: &str = "asset://songs/song3";
}


/// Number of tracks in the bundled session playlist.
pub const SEED_TRACK_COUNT: usize = 3;


/// Returns the bundled session playlist in playback order.
///
/// The first two entries intentionally share an asset.
pub fn seed_playlist() -> Vec<Track> {
    vec![
        Track::new( "1", assets::SONG_2, "Free_Test", "Free_Test", 60.0 ),
        Track::new( "2", assets::SONG_2, "Beatles", "HeyJude", 60.0 ),
        Track::new( "3", assets::SONG_3, "BertieHiggins", "Casablanca", 60.0 ),
    ]
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_seed_playlist_order() {
        let ids: Vec<_> = seed_playlist().into_iter().map( |t| t.id ).collect();
        assert_eq!( ids, vec![ "1", "2", "3" ] );
        assert_eq!( ids.len(), SEED_TRACK_COUNT );
    }


    #[test]
    fn test_seed_playlist_durations() {
        assert!( seed_playlist().iter().all( |t| t.duration_secs == 60.0 ) );
    }


    #[test]
    fn test_repeat_cycle() {
        assert_eq!( RepeatMode::Off.next(), RepeatMode::Track );
        assert_eq!( RepeatMode::Track.next(), RepeatMode::Queue );
        assert_eq!( RepeatMode::Queue.next(), RepeatMode::Off );
    }
}
