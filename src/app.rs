//! Application state and command dispatch.
//!
//! `App` wires the playlist to the playback state machine and feeds the
//! spectrum analyzer once per render tick. Playlist policy lives here:
//! wraparound advance, auto-advance on track end, reload that preserves
//! the cursor, and the skip-once rule for unreadable tracks.

use std::path::PathBuf;

use crate::analyzer::{SpectrumAnalyzer, SpectrumFrame};
use crate::config::{AnalyzerConfig, SEEK_STEP};
use crate::error::PlayerError;
use crate::player::{PlaybackState, Player, PlayerEvent, TransportSnapshot};
use crate::playlist::{Direction, Playlist, ReloadOutcome, Track, scan_tracks};
use crate::source::AudioBackend;

/// Everything a keypress can mean. The key → command mapping lives in
/// `main`; everything downstream works on this closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    PlayPause,
    Next,
    Prev,
    SeekForward,
    SeekBackward,
    VolumeUp,
    VolumeDown,
    ReloadPlaylist,
    Quit,
}

pub struct App<B: AudioBackend> {
    player: Player<B>,
    playlist: Playlist,
    analyzer: SpectrumAnalyzer,
    music_dir: PathBuf,
    /// One failed load may skip forward; a second consecutive failure
    /// stops playback instead of looping through a broken playlist.
    skip_attempted: bool,
    running: bool,
}

impl<B: AudioBackend> App<B> {
    pub fn new(backend: B, tracks: Vec<Track>, music_dir: PathBuf, config: AnalyzerConfig) -> Self {
        App {
            player: Player::new(backend, config.window_size),
            playlist: Playlist::new(tracks),
            analyzer: SpectrumAnalyzer::new(config, 44100),
            music_dir,
            skip_attempted: false,
            running: true,
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    /// Start playing the track under the cursor, typically at startup.
    pub fn autoplay(&mut self) -> Result<(), PlayerError> {
        match self.playlist.current().cloned() {
            Some(track) => {
                self.player.load(track);
                Ok(())
            }
            None => Err(PlayerError::EmptyPlaylist),
        }
    }

    pub fn dispatch(&mut self, command: Command) {
        log::debug!("command: {command:?}");
        match command {
            Command::PlayPause => {
                if self.player.state() == PlaybackState::Stopped {
                    let _ = self.autoplay();
                } else {
                    self.player.play_pause();
                }
            }
            Command::Next => self.advance(Direction::Next),
            Command::Prev => self.advance(Direction::Prev),
            Command::SeekForward => {
                if self.player.seek_by(SEEK_STEP, false) == Some(PlayerEvent::TrackEnded) {
                    self.on_track_end();
                }
            }
            Command::SeekBackward => {
                let _ = self.player.seek_by(SEEK_STEP, true);
            }
            Command::VolumeUp => self.player.volume_up(),
            Command::VolumeDown => self.player.volume_down(),
            Command::ReloadPlaylist => {
                let tracks = scan_tracks(&self.music_dir);
                self.reload_with(tracks);
            }
            Command::Quit => {
                self.player.stop();
                self.running = false;
            }
        }
    }

    /// One engine tick: resolve pending loads, react to track end or
    /// failure, then produce the next spectrum frame.
    pub fn tick(&mut self) -> SpectrumFrame {
        match self.player.tick() {
            Some(PlayerEvent::Loaded) => {
                self.skip_attempted = false;
                if let Some(rate) = self.player.sample_rate() {
                    self.analyzer.set_sample_rate(rate);
                }
            }
            Some(PlayerEvent::TrackEnded) => self.on_track_end(),
            Some(PlayerEvent::LoadFailed) => {
                if !self.skip_attempted && self.playlist.len() > 1 {
                    self.skip_attempted = true;
                    log::warn!("track failed to load, skipping to the next one");
                    self.advance(Direction::Next);
                } else {
                    self.skip_attempted = false;
                    self.player.stop();
                }
            }
            None => {}
        }

        let window = self.player.read_window();
        let playing = self.player.state() == PlaybackState::Playing;
        self.analyzer.tick(window, self.player.generation(), playing)
    }

    fn advance(&mut self, direction: Direction) {
        if let Some(track) = self.playlist.advance(direction).cloned() {
            self.player.load(track);
        }
    }

    /// Natural exhaustion or a seek past the end: wrap to the next track
    /// for continuous play, or stop when the playlist is empty.
    fn on_track_end(&mut self) {
        if self.playlist.is_empty() {
            self.player.stop();
        } else {
            self.advance(Direction::Next);
        }
    }

    /// Swap in a fresh scan. The live session survives as long as its
    /// path is still on disk; otherwise playback stops.
    fn reload_with(&mut self, tracks: Vec<Track>) {
        let keep = self
            .player
            .current_track()
            .or(self.playlist.current())
            .map(|t| t.path.clone());
        let outcome = self.playlist.reload(tracks, keep.as_deref());

        let track_loaded = self.player.current_track().is_some();
        if track_loaded && outcome == ReloadOutcome::Reset {
            log::info!("current track disappeared on reload, stopping");
            self.player.stop();
        }
    }

    // --- Renderer surface ---

    pub fn transport(&self) -> TransportSnapshot {
        self.player.transport()
    }

    pub fn current_frame(&self) -> SpectrumFrame {
        self.analyzer.frame()
    }

    /// 1-based cursor and playlist length, `(0, 0)` when empty.
    pub fn playlist_status(&self) -> (usize, usize) {
        if self.playlist.is_empty() {
            (0, 0)
        } else {
            (self.playlist.cursor() + 1, self.playlist.len())
        }
    }
}
