//! Playback state machine.
//!
//! Owns the transport state, the volume, and the generation counter that
//! tags every live stream. All commands return immediately; stream
//! opening is deferred to the next engine tick, and every action that
//! changes the underlying stream bumps the generation *first* so in-flight
//! analyzer windows from the old stream are cleanly superseded.

use std::fmt;
use std::time::Duration;

use crate::config::VOLUME_STEP;
use crate::playlist::Track;
use crate::source::{AudioBackend, AudioStream, TapWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Loading,
    Playing,
    Paused,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Stopped => write!(f, "Stopped"),
            PlaybackState::Loading => write!(f, "Loading"),
            PlaybackState::Playing => write!(f, "Playing"),
            PlaybackState::Paused => write!(f, "Paused"),
        }
    }
}

/// Outcomes of a tick that the playlist controller must react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerEvent {
    /// A pending load finished and audio is flowing.
    Loaded,
    /// The backend could not open the pending track.
    LoadFailed,
    /// The current stream ran out (natural end or seek past the end).
    TrackEnded,
}

/// Read-only view of the transport for the renderer.
#[derive(Debug, Clone)]
pub struct TransportSnapshot {
    pub state: PlaybackState,
    pub position: Duration,
    pub duration: Option<Duration>,
    pub volume: f32,
    pub title: Option<String>,
}

struct Session<S> {
    track: Track,
    stream: S,
}

struct PendingLoad {
    track: Track,
    start: Duration,
    /// Seeks keep their transport state; a seek issued while paused
    /// reopens the stream paused.
    paused: bool,
}

pub struct Player<B: AudioBackend> {
    backend: B,
    state: PlaybackState,
    generation: u64,
    volume: f32,
    window: usize,
    session: Option<Session<B::Stream>>,
    pending: Option<PendingLoad>,
}

impl<B: AudioBackend> Player<B> {
    pub fn new(backend: B, window: usize) -> Self {
        Player {
            backend,
            state: PlaybackState::Stopped,
            generation: 0,
            volume: 0.7,
            window,
            session: None,
            pending: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.session
            .as_ref()
            .map(|s| &s.track)
            .or(self.pending.as_ref().map(|p| &p.track))
    }

    /// Sample rate of the live stream, for the analyzer's band map.
    pub fn sample_rate(&self) -> Option<u32> {
        self.session.as_ref().map(|s| s.stream.sample_rate())
    }

    /// Queue a new track. The current stream is dropped on the spot,
    /// which silences it; the replacement opens on the next tick. Any
    /// windows still in flight carry the superseded generation.
    pub fn load(&mut self, track: Track) {
        self.generation += 1;
        log::info!("loading {:?} (generation {})", track.title, self.generation);
        self.session = None;
        self.pending = Some(PendingLoad { track, start: Duration::ZERO, paused: false });
        self.state = PlaybackState::Loading;
    }

    pub fn stop(&mut self) {
        self.session = None;
        self.pending = None;
        self.state = PlaybackState::Stopped;
    }

    /// Toggle pause. No-op unless something is playing or paused.
    pub fn play_pause(&mut self) {
        match self.state {
            PlaybackState::Playing => {
                if let Some(s) = self.session.as_mut() {
                    s.stream.pause();
                }
                self.state = PlaybackState::Paused;
            }
            PlaybackState::Paused => {
                if let Some(s) = self.session.as_mut() {
                    s.stream.resume();
                }
                self.state = PlaybackState::Playing;
            }
            PlaybackState::Stopped | PlaybackState::Loading => {}
        }
    }

    /// Seek relative to the current position. The target clamps to
    /// `[0, duration]`; running past the end reports `TrackEnded` just
    /// like natural exhaustion so the controller can auto-advance.
    pub fn seek_by(&mut self, delta: Duration, backward: bool) -> Option<PlayerEvent> {
        let session = self.session.as_ref()?;
        let position = session.stream.position();
        let target = if backward {
            position.saturating_sub(delta)
        } else {
            position + delta
        };

        if let Some(duration) = session.track.duration {
            if !backward && target >= duration {
                return Some(PlayerEvent::TrackEnded);
            }
        }

        self.generation += 1;
        log::debug!("seek to {:.1}s (generation {})", target.as_secs_f64(), self.generation);
        self.pending = Some(PendingLoad {
            track: session.track.clone(),
            start: target,
            paused: self.state == PlaybackState::Paused,
        });
        None
    }

    pub fn volume_up(&mut self) {
        self.set_volume(self.volume + VOLUME_STEP);
    }

    pub fn volume_down(&mut self) {
        self.set_volume(self.volume - VOLUME_STEP);
    }

    /// Clamped to `[0.0, 1.0]`, applied immediately, generation untouched.
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(s) = self.session.as_mut() {
            s.stream.set_volume(self.volume);
        }
    }

    /// Advance the machine one tick: open any pending stream and detect
    /// exhaustion. Never blocks on audio.
    pub fn tick(&mut self) -> Option<PlayerEvent> {
        if let Some(pending) = self.pending.take() {
            return Some(self.open_pending(pending));
        }

        if self.state == PlaybackState::Playing
            && self.session.as_ref().is_some_and(|s| s.stream.is_exhausted())
        {
            return Some(PlayerEvent::TrackEnded);
        }
        None
    }

    fn open_pending(&mut self, pending: PendingLoad) -> PlayerEvent {
        match self.backend.open(
            &pending.track,
            pending.start,
            self.generation,
            self.volume,
            self.window,
        ) {
            Ok(mut stream) => {
                if pending.paused {
                    stream.pause();
                    self.state = PlaybackState::Paused;
                } else {
                    self.state = PlaybackState::Playing;
                }
                self.session = Some(Session { track: pending.track, stream });
                PlayerEvent::Loaded
            }
            Err(e) => {
                log::warn!("{e}");
                self.session = None;
                self.state = PlaybackState::Stopped;
                PlayerEvent::LoadFailed
            }
        }
    }

    /// Latest analysis window, gated by transport state: the analyzer only
    /// consumes samples while actually playing.
    pub fn read_window(&mut self) -> Option<TapWindow> {
        if self.state != PlaybackState::Playing {
            return None;
        }
        self.session.as_mut()?.stream.read_window(self.window)
    }

    pub fn transport(&self) -> TransportSnapshot {
        let position = self
            .session
            .as_ref()
            .map(|s| s.stream.position())
            .or(self.pending.as_ref().map(|p| p.start))
            .unwrap_or(Duration::ZERO);
        let track = self.current_track();
        TransportSnapshot {
            state: self.state,
            position,
            duration: track.and_then(|t| t.duration),
            volume: self.volume,
            title: track.map(|t| t.title.clone()),
        }
    }

    #[cfg(test)]
    pub fn stream_mut(&mut self) -> Option<&mut B::Stream> {
        self.session.as_mut().map(|s| &mut s.stream)
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[cfg(test)]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}
