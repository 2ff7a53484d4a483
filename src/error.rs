//! Error types for bandstand.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by playback and playlist handling.
#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("track unavailable: {}: {reason}", .path.display())]
    TrackUnavailable { path: PathBuf, reason: String },

    #[error("audio device error: {0}")]
    Device(String),

    #[error("no tracks found in the music directory")]
    EmptyPlaylist,
}

/// Errors from the spectrum analyzer. Only ever indicates mis-wiring;
/// data-quality problems (silence, clipping) never error.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SpectrumError {
    #[error("invalid analysis window size: got {got}, expected {expected}")]
    InvalidWindowSize { got: usize, expected: usize },
}
