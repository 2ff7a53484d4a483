//! Sample source adapter.
//!
//! Wraps the rodio playback backend behind the [`AudioBackend`] /
//! [`AudioStream`] traits so the state machine never touches rodio
//! directly. A [`TappedSource`] sits between the decoder and the sink,
//! mixing the samples it passes through down to mono and pushing them
//! into a shared ring buffer for the analyzer to read at its own pace.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink, Source};

use crate::error::PlayerError;
use crate::playlist::Track;

/// Ring capacity as a multiple of the analysis window, so a late render
/// tick still finds a full window of recent samples.
const RING_WINDOWS: usize = 4;

/// One analysis window pulled from the tap, tagged with the generation of
/// the stream that produced it.
#[derive(Debug, Clone)]
pub struct TapWindow {
    pub generation: u64,
    pub samples: Vec<f32>,
}

/// Bounded mono sample ring shared between the playback thread (writer)
/// and the render loop (reader).
pub struct TapBuffer {
    generation: u64,
    capacity: usize,
    samples: VecDeque<f32>,
    written: u64,
    consumed: u64,
}

pub type SharedTap = Arc<Mutex<TapBuffer>>;

impl TapBuffer {
    pub fn new(generation: u64, capacity: usize) -> Self {
        TapBuffer {
            generation,
            capacity,
            samples: VecDeque::with_capacity(capacity),
            written: 0,
            consumed: 0,
        }
    }

    fn push(&mut self, sample: f32) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        self.written += 1;
    }

    /// Copy out the most recent `len` samples, or `None` if the buffer
    /// does not hold a full window yet or nothing arrived since the last
    /// read. Never blocks the writer for long.
    fn window(&mut self, len: usize) -> Option<TapWindow> {
        if self.samples.len() < len || self.written == self.consumed {
            return None;
        }
        self.consumed = self.written;
        let skip = self.samples.len() - len;
        Some(TapWindow {
            generation: self.generation,
            samples: self.samples.iter().skip(skip).copied().collect(),
        })
    }
}

/// Source wrapper that taps samples into a [`TapBuffer`] while passing
/// them through to the sink unchanged.
struct TappedSource<S> {
    inner: S,
    tap: SharedTap,
    channels: u16,
    acc: f32,
    acc_count: u16,
}

impl<S> TappedSource<S>
where
    S: Source<Item = f32>,
{
    fn new(source: S, tap: SharedTap) -> Self {
        let channels = source.channels().max(1);
        TappedSource {
            inner: source,
            tap,
            channels,
            acc: 0.0,
            acc_count: 0,
        }
    }
}

impl<S> Iterator for TappedSource<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = self.inner.next()?;
        self.acc += sample;
        self.acc_count += 1;
        if self.acc_count == self.channels {
            let mono = self.acc / self.channels as f32;
            self.acc = 0.0;
            self.acc_count = 0;
            if let Ok(mut tap) = self.tap.try_lock() {
                tap.push(mono);
            }
        }
        Some(sample)
    }
}

impl<S> Source for TappedSource<S>
where
    S: Source<Item = f32>,
{
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

/// Opens live streams for tracks. The production implementation is
/// [`RodioBackend`]; tests substitute a mock.
pub trait AudioBackend {
    type Stream: AudioStream;

    /// Open `track` positioned at `start`, producing a stream whose tap
    /// windows carry `generation`.
    fn open(
        &mut self,
        track: &Track,
        start: Duration,
        generation: u64,
        volume: f32,
        window: usize,
    ) -> Result<Self::Stream, PlayerError>;
}

/// One loaded track's live stream.
pub trait AudioStream {
    /// Latest `len` mono samples, non-blocking. `None` when no full fresh
    /// window is available.
    fn read_window(&mut self, len: usize) -> Option<TapWindow>;
    fn set_volume(&mut self, volume: f32);
    fn pause(&mut self);
    fn resume(&mut self);
    fn position(&self) -> Duration;
    fn is_exhausted(&self) -> bool;
    /// Sample rate of the decoded stream, for band mapping.
    fn sample_rate(&self) -> u32;
}

pub struct RodioBackend {
    stream: OutputStream,
}

impl RodioBackend {
    pub fn new() -> Result<Self, PlayerError> {
        let stream = OutputStreamBuilder::from_default_device()
            .map_err(|e| PlayerError::Device(format!("no audio device: {e}")))?
            .open_stream_or_fallback()
            .map_err(|e| PlayerError::Device(format!("cannot open audio stream: {e}")))?;
        Ok(RodioBackend { stream })
    }
}

impl AudioBackend for RodioBackend {
    type Stream = RodioStream;

    fn open(
        &mut self,
        track: &Track,
        start: Duration,
        generation: u64,
        volume: f32,
        window: usize,
    ) -> Result<RodioStream, PlayerError> {
        let unavailable = |reason: String| PlayerError::TrackUnavailable {
            path: track.path.clone(),
            reason,
        };

        let file = fs::File::open(&track.path).map_err(|e| unavailable(e.to_string()))?;
        let buf = io::BufReader::new(file);
        let mut source = Decoder::new(buf).map_err(|e| unavailable(e.to_string()))?;
        if !start.is_zero() {
            // Decoders that cannot seek just play from the top.
            let _ = source.try_seek(start);
        }
        let sample_rate = source.sample_rate();

        let tap: SharedTap = Arc::new(Mutex::new(TapBuffer::new(generation, window * RING_WINDOWS)));
        let sink = Sink::connect_new(self.stream.mixer());
        sink.set_volume(volume);
        sink.append(TappedSource::new(source, Arc::clone(&tap)));

        Ok(RodioStream {
            sink,
            tap,
            base: start,
            sample_rate,
        })
    }
}

/// Live rodio stream. Dropping it drops the sink, which stops the audio.
pub struct RodioStream {
    sink: Sink,
    tap: SharedTap,
    base: Duration,
    sample_rate: u32,
}

impl AudioStream for RodioStream {
    fn read_window(&mut self, len: usize) -> Option<TapWindow> {
        self.tap.lock().ok()?.window(len)
    }

    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume);
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn resume(&mut self) {
        self.sink.play();
    }

    fn position(&self) -> Duration {
        self.base + self.sink.get_pos()
    }

    fn is_exhausted(&self) -> bool {
        self.sink.empty()
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}
