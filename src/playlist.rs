//! Track discovery and playlist ordering.
//!
//! The playlist is rebuilt wholesale by [`Playlist::reload`]; nothing else
//! ever changes membership or order. The cursor always indexes a valid
//! track unless the list is empty.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use symphonia::core::{
    formats::FormatOptions, io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
};

pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "wav", "aac", "m4a"];

/// One playable file. Immutable once discovered.
#[derive(Debug, Clone)]
pub struct Track {
    pub path: PathBuf,
    pub title: String,
    pub duration: Option<Duration>,
}

impl Track {
    pub fn new(path: PathBuf, duration: Option<Duration>) -> Self {
        let title = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "Unknown".into());
        Track { path, title, duration }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

/// Whether a reload could keep the cursor on the same track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Kept,
    Reset,
}

#[derive(Debug, Default)]
pub struct Playlist {
    tracks: Vec<Track>,
    cursor: usize,
}

impl Playlist {
    /// Build a playlist from discovered tracks: unique by path, sorted
    /// case-insensitively by display title.
    pub fn new(mut tracks: Vec<Track>) -> Self {
        tracks.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
        let mut seen = HashSet::new();
        tracks.retain(|t| seen.insert(t.path.clone()));
        Playlist { tracks, cursor: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.cursor)
    }

    /// Move the cursor one step with wraparound in both directions.
    /// No-op on an empty playlist.
    pub fn advance(&mut self, direction: Direction) -> Option<&Track> {
        if self.tracks.is_empty() {
            return None;
        }
        self.cursor = match direction {
            Direction::Next => (self.cursor + 1) % self.tracks.len(),
            Direction::Prev => (self.cursor + self.tracks.len() - 1) % self.tracks.len(),
        };
        self.current()
    }

    /// Replace the whole track list. The cursor stays on `keep` if that
    /// path survived the rescan, otherwise it resets to the start.
    pub fn reload(&mut self, tracks: Vec<Track>, keep: Option<&Path>) -> ReloadOutcome {
        *self = Playlist::new(tracks);
        if let Some(path) = keep {
            if let Some(idx) = self.tracks.iter().position(|t| t.path == path) {
                self.cursor = idx;
                return ReloadOutcome::Kept;
            }
        }
        ReloadOutcome::Reset
    }
}

pub fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| AUDIO_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Scan a directory (non-recursively) for audio files, probing each for
/// its duration. Unreadable directories yield an empty list.
pub fn scan_tracks(dir: &Path) -> Vec<Track> {
    let entries = match fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()),
        Err(e) => {
            log::warn!("cannot read {}: {e}", dir.display());
            return Vec::new();
        }
    };

    let mut tracks = Vec::new();
    for entry in entries {
        let path = entry.path();
        if path.is_file() && is_audio_file(&path) {
            let duration = probe_duration(&path);
            tracks.push(Track::new(path, duration));
        }
    }
    log::debug!("scanned {}: {} track(s)", dir.display(), tracks.len());
    tracks
}

/// Container-level duration lookup. Tracks whose format does not carry a
/// frame count (or that fail to probe at all) simply have no duration.
fn probe_duration(path: &Path) -> Option<Duration> {
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let stream = MediaSourceStream::new(Box::new(fs::File::open(path).ok()?), Default::default());
    let format = symphonia::default::get_probe()
        .format(&hint, stream, &FormatOptions::default(), &MetadataOptions::default())
        .ok()?
        .format;

    let params = &format.default_track()?.codec_params;
    let elapsed = params.time_base?.calc_time(params.n_frames?);
    Some(Duration::from_secs_f64(elapsed.seconds as f64 + elapsed.frac))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(name: &str) -> Track {
        Track::new(PathBuf::from(format!("/music/{name}")), None)
    }

    fn playlist(names: &[&str]) -> Playlist {
        Playlist::new(names.iter().map(|n| track(n)).collect())
    }

    // --- Ordering ---

    #[test]
    fn sorts_by_title_case_insensitive() {
        let pl = playlist(&["b.mp3", "A.mp3", "c.mp3"]);
        let titles: Vec<&str> = (0..pl.len())
            .map(|i| pl.tracks[i].title.as_str())
            .collect();
        assert_eq!(titles, ["A.mp3", "b.mp3", "c.mp3"]);
    }

    #[test]
    fn dedupes_by_path() {
        let pl = Playlist::new(vec![track("a.mp3"), track("a.mp3"), track("b.mp3")]);
        assert_eq!(pl.len(), 2);
    }

    #[test]
    fn dedupes_repeated_path_among_same_titled_tracks() {
        // Same file name in two directories, one path repeated; after the
        // title sort the repeats are not adjacent.
        let here = Track::new(PathBuf::from("/music/one/x.mp3"), None);
        let there = Track::new(PathBuf::from("/music/two/x.mp3"), None);
        let pl = Playlist::new(vec![here.clone(), there, here]);
        assert_eq!(pl.len(), 2);
    }

    // --- Cursor movement ---

    #[test]
    fn advance_next_wraps_from_last_to_first() {
        let mut pl = playlist(&["a.mp3", "b.mp3", "c.mp3"]);
        pl.cursor = 2;
        pl.advance(Direction::Next);
        assert_eq!(pl.cursor(), 0);
    }

    #[test]
    fn advance_prev_wraps_from_first_to_last() {
        let mut pl = playlist(&["a.mp3", "b.mp3", "c.mp3"]);
        pl.advance(Direction::Prev);
        assert_eq!(pl.cursor(), 2);
    }

    #[test]
    fn advance_on_empty_playlist_is_noop() {
        let mut pl = Playlist::default();
        assert!(pl.advance(Direction::Next).is_none());
        assert!(pl.current().is_none());
    }

    #[test]
    fn single_track_wraps_to_itself() {
        let mut pl = playlist(&["a.mp3"]);
        pl.advance(Direction::Next);
        assert_eq!(pl.cursor(), 0);
    }

    // --- Reload ---

    #[test]
    fn reload_preserves_cursor_by_path() {
        let mut pl = playlist(&["a.mp3", "b.mp3", "c.mp3"]);
        pl.cursor = 1;
        let keep = pl.current().unwrap().path.clone();

        // New scan picks up an extra file that sorts before "b.mp3".
        let rescan = vec![track("a.mp3"), track("aa.mp3"), track("b.mp3"), track("c.mp3")];
        let outcome = pl.reload(rescan, Some(&keep));

        assert_eq!(outcome, ReloadOutcome::Kept);
        assert_eq!(pl.current().unwrap().path, keep);
        assert_eq!(pl.cursor(), 2);
    }

    #[test]
    fn reload_resets_cursor_when_track_removed() {
        let mut pl = playlist(&["a.mp3", "b.mp3"]);
        pl.cursor = 1;
        let keep = pl.current().unwrap().path.clone();

        let outcome = pl.reload(vec![track("a.mp3")], Some(&keep));
        assert_eq!(outcome, ReloadOutcome::Reset);
        assert_eq!(pl.cursor(), 0);
    }

    #[test]
    fn reload_with_nothing_playing_resets() {
        let mut pl = playlist(&["a.mp3"]);
        assert_eq!(pl.reload(vec![track("b.mp3")], None), ReloadOutcome::Reset);
        assert_eq!(pl.cursor(), 0);
    }

    // --- Discovery ---

    #[test]
    fn recognizes_audio_extensions() {
        assert!(is_audio_file(Path::new("song.MP3")));
        assert!(is_audio_file(Path::new("song.flac")));
        assert!(!is_audio_file(Path::new("cover.jpg")));
        assert!(!is_audio_file(Path::new("song")));
    }

    #[test]
    fn scan_filters_non_audio_files() {
        let dir = std::env::temp_dir().join(format!("bandstand-scan-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("b.mp3"), b"not really audio").unwrap();
        fs::write(dir.join("a.wav"), b"not really audio").unwrap();
        fs::write(dir.join("notes.txt"), b"text").unwrap();

        let pl = Playlist::new(scan_tracks(&dir));
        let titles: Vec<&str> = pl.tracks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["a.wav", "b.mp3"]);
        // Garbage bytes cannot be probed for a duration.
        assert!(pl.tracks.iter().all(|t| t.duration.is_none()));

        fs::remove_dir_all(&dir).unwrap();
    }
}
