//! Lullaby Core - Player state synchronization
//!
//! This crate mirrors an external playback engine into UI-facing state
//! and turns user intents into engine commands. The engine itself is
//! injected through the [`PlaybackEngine`] trait.

pub mod adapter;
pub mod command;
pub mod engine;
pub mod projector;
pub mod sim;
pub mod track;
pub mod transport;

pub use adapter::{ ErrorReporting, InitOutcome, PlaybackEngineAdapter, SeedOutcome };
pub use command::{ Command, CommandError };
pub use engine::{ EngineError, EngineEvent, EngineOptions, EngineState, PlaybackEngine, Progress };
pub use projector::{ format_time, PlaybackSnapshot, PlaybackStateProjector, ProjectorHandle };
pub use sim::SimulatedEngine;
pub use track::{ RepeatMode, Track };
pub use transport::{ ToggleAction, TransportController };
