//! Screen state for the TUI.
//!
//! Defines the loading phase, overlays, and the focusable transport row.

use lullaby_core::Command;
use std::time::Duration;


/// Lifecycle of the screen.
#[derive( Debug, Clone, PartialEq, Eq, Default )]
pub enum Phase {
    /// Loading indicator until setup and seeding complete.
    #[default]
    Loading,

    Ready,

    /// Start-up failed: a surfaced setup error, or seeding the queue
    /// failed, which happens in either reporting mode.
    Failed( String ),
}


/// Overlay drawn on top of the screen.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum Overlay {
    #[default]
    None,

    /// Command reference.
    Help,
}


/// Buttons of the transport row, left to right.
#[derive( Debug, Clone, Copy, PartialEq, Eq, Default )]
pub enum Control {
    Restart,
    Previous,
    #[default]
    PlayPause,
    Next,
    Shuffle,
}


impl Control {
    pub const ALL: [Control; 5] = [
        Control::Restart,
        Control::Previous,
        Control::PlayPause,
        Control::Next,
        Control::Shuffle,
    ];


    /// Returns the control to the right, wrapping.
    pub fn next( self ) -> Self {
        match self {
            Control::Restart => Control::Previous,
            Control::Previous => Control::PlayPause,
            Control::PlayPause => Control::Next,
            Control::Next => Control::Shuffle,
            Control::Shuffle => Control::Restart,
        }
    }


    /// Returns the control to the left, wrapping.
    pub fn prev( self ) -> Self {
        match self {
            Control::Restart => Control::Shuffle,
            Control::Previous => Control::Restart,
            Control::PlayPause => Control::Previous,
            Control::Next => Control::PlayPause,
            Control::Shuffle => Control::Next,
        }
    }


    /// Glyph drawn for the control. Play/pause shows pause while playing.
    pub fn glyph( &self, playing: bool ) -> &'static str {
        match self {
            Control::Restart => "↺",
            Control::Previous => "⏮",
            Control::PlayPause if playing => "⏸",
            Control::PlayPause => "▶",
            Control::Next => "⏭",
            Control::Shuffle => "🔀",
        }
    }


    /// Command run when the control is activated.
    pub fn command( &self ) -> Command {
        match self {
            Control::Restart => Command::Seek { position: Duration::ZERO },
            Control::Previous => Command::Prev,
            Control::PlayPause => Command::Toggle,
            Control::Next => Command::Next,
            Control::Shuffle => Command::Shuffle,
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_focus_wraps_both_ways() {
        for control in Control::ALL {
            assert_eq!( control.next().prev(), control );
        }
        assert_eq!( Control::Shuffle.next(), Control::Restart );
    }


    #[test]
    fn test_play_glyph_follows_state() {
        assert_eq!( Control::PlayPause.glyph( true ), "⏸" );
        assert_eq!( Control::PlayPause.glyph( false ), "▶" );
    }
}
