//! 64-band spectrum analyzer.
//!
//! Converts fixed-size mono sample windows into smoothed band magnitudes
//! plus falling peak markers. Bars rise instantly and fall exponentially;
//! peaks fall linearly and never drop below their bar. Windows from a
//! superseded stream generation are dropped without touching the state.

use std::ops::Range;
use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

use crate::config::{AnalyzerConfig, MIN_BAND_FREQ_HZ, SPECTRUM_BANDS};
use crate::error::SpectrumError;
use crate::source::TapWindow;

/// Bars below this are snapped to zero so silence actually reaches 0.0
/// instead of decaying forever.
const SILENCE_FLOOR: f32 = 1e-4;

/// One complete snapshot of the spectrum display, replaced wholesale each
/// render tick. `peaks[i] >= bars[i]` always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    pub bars: [f32; SPECTRUM_BANDS],
    pub peaks: [f32; SPECTRUM_BANDS],
    pub generation: u64,
}

impl Default for SpectrumFrame {
    fn default() -> Self {
        SpectrumFrame {
            bars: [0.0; SPECTRUM_BANDS],
            peaks: [0.0; SPECTRUM_BANDS],
            generation: 0,
        }
    }
}

pub struct SpectrumAnalyzer {
    config: AnalyzerConfig,
    sample_rate: u32,
    fft: Arc<dyn Fft<f32>>,
    /// Precomputed Hann coefficients, one per window sample.
    hann: Vec<f32>,
    /// Scales a full-scale sine on a bin center to a magnitude of ~1.0:
    /// 2 / sum(window).
    norm: f32,
    /// FFT bin range per band, a contiguous partition of the usable bins
    /// with geometric (log-frequency) edges. Bass gets the fine end.
    bands: Vec<Range<usize>>,
    scratch: Vec<Complex<f32>>,
    frame: SpectrumFrame,
}

impl SpectrumAnalyzer {
    pub fn new(config: AnalyzerConfig, sample_rate: u32) -> Self {
        let n = config.window_size;
        debug_assert!(n.is_power_of_two() && n >= 2 * SPECTRUM_BANDS);

        let hann: Vec<f32> = (0..n)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos())
            })
            .collect();
        let norm = 2.0 / hann.iter().sum::<f32>();

        let mut planner = FftPlanner::new();
        SpectrumAnalyzer {
            fft: planner.plan_fft_forward(n),
            bands: build_bands(n, sample_rate),
            hann,
            norm,
            scratch: vec![Complex::new(0.0, 0.0); n],
            frame: SpectrumFrame::default(),
            config,
            sample_rate,
        }
    }

    pub fn window_size(&self) -> usize {
        self.config.window_size
    }

    /// Rebuild the band map when a new stream decodes at a different rate.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate != self.sample_rate && sample_rate > 0 {
            self.sample_rate = sample_rate;
            self.bands = build_bands(self.config.window_size, sample_rate);
        }
    }

    /// Latest published snapshot.
    pub fn frame(&self) -> SpectrumFrame {
        self.frame.clone()
    }

    /// Per-tick entry point. A fresh window from the current generation is
    /// analyzed; a stale one is dropped without touching the bars; no
    /// window at all (buffer not caught up, paused, stopped) decays the
    /// display toward zero.
    pub fn tick(
        &mut self,
        window: Option<TapWindow>,
        session_generation: u64,
        playing: bool,
    ) -> SpectrumFrame {
        match window {
            Some(w) if playing && w.generation == session_generation => {
                if let Err(e) = self.analyze(&w.samples, w.generation) {
                    log::error!("analyzer mis-wired: {e}");
                    self.decay();
                }
            }
            Some(_) => {} // stale generation: dropped silently
            None => {
                self.decay();
            }
        }
        self.frame()
    }

    /// Run one full analysis pass over `samples`.
    pub fn analyze(
        &mut self,
        samples: &[f32],
        generation: u64,
    ) -> Result<&SpectrumFrame, SpectrumError> {
        let n = self.config.window_size;
        if samples.len() != n {
            return Err(SpectrumError::InvalidWindowSize {
                got: samples.len(),
                expected: n,
            });
        }

        for (i, (&s, &w)) in samples.iter().zip(self.hann.iter()).enumerate() {
            self.scratch[i] = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        for (band, range) in self.bands.iter().enumerate() {
            // Max, not average: keeps narrow tones as sharp single bars.
            let mut magnitude = 0.0f32;
            for bin in &self.scratch[range.clone()] {
                magnitude = magnitude.max(bin.norm() * self.norm);
            }
            let value = magnitude.min(1.0);

            let bar = &mut self.frame.bars[band];
            *bar = if value > *bar {
                value
            } else {
                *bar * self.config.attack_decay
            };
            if *bar < SILENCE_FLOOR {
                *bar = 0.0;
            }
            self.frame.peaks[band] = (self.frame.peaks[band] - self.config.peak_fall)
                .max(value)
                .max(*bar);
        }
        self.frame.generation = generation;
        Ok(&self.frame)
    }

    /// Decay every bar and peak one tick toward zero at the normal fall
    /// rates, so pausing or stopping fades the display instead of
    /// freezing or snapping it.
    pub fn decay(&mut self) -> &SpectrumFrame {
        for band in 0..SPECTRUM_BANDS {
            let bar = &mut self.frame.bars[band];
            *bar *= self.config.attack_decay;
            if *bar < SILENCE_FLOOR {
                *bar = 0.0;
            }
            self.frame.peaks[band] = (self.frame.peaks[band] - self.config.peak_fall)
                .max(*bar)
                .max(0.0);
        }
        &self.frame
    }

    #[cfg(test)]
    fn band_of_bin(&self, bin: usize) -> Option<usize> {
        self.bands.iter().position(|r| r.contains(&bin))
    }
}

/// Assign FFT bins to the 64 logical bands with geometric frequency edges
/// from [`MIN_BAND_FREQ_HZ`] up to Nyquist. Every band covers at least one
/// bin and the ranges are half-open and contiguous, so any one bin (and
/// any frequency exactly on a band edge) belongs to exactly one band.
fn build_bands(window_size: usize, sample_rate: u32) -> Vec<Range<usize>> {
    let nyquist = window_size / 2;
    let bin_hz = sample_rate as f32 / window_size as f32;
    let f_min = MIN_BAND_FREQ_HZ.max(bin_hz);
    let ratio = (sample_rate as f32 / 2.0) / f_min;

    let mut bands = Vec::with_capacity(SPECTRUM_BANDS);
    let mut start = ((f_min / bin_hz) as usize).clamp(1, nyquist - 1);
    for band in 0..SPECTRUM_BANDS {
        let edge = f_min * ratio.powf((band + 1) as f32 / SPECTRUM_BANDS as f32);
        let end = ((edge / bin_hz).round() as usize)
            .max(start + 1)
            .min(nyquist);
        bands.push(start..end);
        start = end;
    }
    bands
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 44100;

    fn analyzer() -> SpectrumAnalyzer {
        SpectrumAnalyzer::new(AnalyzerConfig::default(), SAMPLE_RATE)
    }

    /// Full-scale sine exactly on DFT bin `bin`.
    fn sine_on_bin(bin: usize, n: usize) -> Vec<f32> {
        (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * bin as f32 * i as f32 / n as f32).sin())
            .collect()
    }

    fn dominant_band(frame: &SpectrumFrame) -> usize {
        frame
            .bars
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0
    }

    // --- Band mapping ---

    #[test]
    fn bands_partition_usable_bins() {
        let a = analyzer();
        assert_eq!(a.bands.len(), SPECTRUM_BANDS);
        for pair in a.bands.windows(2) {
            assert_eq!(pair[0].end, pair[1].start, "bands must be contiguous");
        }
        for range in &a.bands {
            assert!(range.start < range.end, "every band covers a bin");
        }
        assert!(a.bands[0].start >= 1, "DC bin excluded");
        assert_eq!(a.bands.last().unwrap().end, a.config.window_size / 2);
    }

    #[test]
    fn bass_bands_are_narrower_than_treble_bands() {
        let a = analyzer();
        let low = a.bands[0].len();
        let high = a.bands[SPECTRUM_BANDS - 1].len();
        assert!(high > low, "log mapping: treble spans more bins ({high} vs {low})");
    }

    // --- analyze ---

    #[test]
    fn outputs_are_in_unit_range() {
        let mut a = analyzer();
        let n = a.window_size();
        // Clipping-level square-ish input must still stay in range.
        let loud: Vec<f32> = (0..n).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let frame = a.analyze(&loud, 1).unwrap();
        assert_eq!(frame.bars.len(), SPECTRUM_BANDS);
        assert_eq!(frame.peaks.len(), SPECTRUM_BANDS);
        for band in 0..SPECTRUM_BANDS {
            assert!((0.0..=1.0).contains(&frame.bars[band]));
            assert!((0.0..=1.0).contains(&frame.peaks[band]));
        }
    }

    #[test]
    fn rejects_wrong_window_length() {
        let mut a = analyzer();
        let err = a.analyze(&[0.0; 100], 0).unwrap_err();
        assert_eq!(
            err,
            SpectrumError::InvalidWindowSize { got: 100, expected: 1024 }
        );
    }

    #[test]
    fn pure_sine_lights_a_single_dominant_band() {
        let mut a = analyzer();
        let band = 40;
        let bin = (a.bands[band].start + a.bands[band].end) / 2;
        let frame = a.analyze(&sine_on_bin(bin, 1024), 1).unwrap().clone();

        assert_eq!(dominant_band(&frame), band);
        assert!(frame.bars[band] > 0.9, "full-scale sine reads ~1.0, got {}", frame.bars[band]);
    }

    #[test]
    fn band_edge_frequency_maps_to_exactly_one_band() {
        let a = analyzer();
        // A bin on the boundary between two bands belongs to the upper one
        // (half-open ranges), never to both.
        let edge_bin = a.bands[30].start;
        assert_eq!(a.band_of_bin(edge_bin), Some(30));
        assert_eq!(a.band_of_bin(edge_bin - 1), Some(29));

        let mut a = a;
        let frame = a.analyze(&sine_on_bin(edge_bin, 1024), 1).unwrap();
        assert_eq!(dominant_band(frame), 30);
    }

    #[test]
    fn normalization_is_derived_from_window_energy() {
        let a = analyzer();
        // Hann coherent gain is N/2, so the scale works out to ~4/N.
        let expected = 4.0 / a.window_size() as f32;
        assert!((a.norm - expected).abs() / expected < 0.01);
    }

    // --- Temporal behavior ---

    #[test]
    fn peaks_never_drop_below_bars() {
        let mut a = analyzer();
        let loud = sine_on_bin(100, 1024);
        let quiet: Vec<f32> = loud.iter().map(|s| s * 0.05).collect();

        a.analyze(&loud, 1).unwrap();
        for step in 0..60 {
            let frame = if step % 3 == 0 {
                a.analyze(&quiet, 1).unwrap().clone()
            } else {
                a.decay().clone()
            };
            for band in 0..SPECTRUM_BANDS {
                assert!(
                    frame.peaks[band] >= frame.bars[band],
                    "band {band} at step {step}: peak {} < bar {}",
                    frame.peaks[band],
                    frame.bars[band]
                );
            }
        }
    }

    #[test]
    fn bars_rise_instantly_and_fall_exponentially() {
        let mut a = analyzer();
        let band = 40;
        let bin = (a.bands[band].start + a.bands[band].end) / 2;

        a.analyze(&sine_on_bin(bin, 1024), 1).unwrap();
        let risen = a.frame.bars[band];
        assert!(risen > 0.9);

        a.analyze(&vec![0.0; 1024], 1).unwrap();
        let fallen = a.frame.bars[band];
        let decay = a.config.attack_decay;
        assert!((fallen - risen * decay).abs() < 1e-5);
    }

    #[test]
    fn silence_decays_everything_to_zero_within_bounded_ticks() {
        let mut a = analyzer();
        a.analyze(&sine_on_bin(64, 1024), 1).unwrap();

        let silence = vec![0.0f32; 1024];
        for _ in 0..200 {
            let frame = a.analyze(&silence, 1).unwrap();
            for band in 0..SPECTRUM_BANDS {
                assert!(frame.bars[band] >= 0.0);
                assert!(frame.peaks[band] >= 0.0);
            }
        }
        assert!(a.frame.bars.iter().all(|&b| b == 0.0));
        assert!(a.frame.peaks.iter().all(|&p| p == 0.0));
    }

    #[test]
    fn decay_tick_fades_without_input() {
        let mut a = analyzer();
        a.analyze(&sine_on_bin(64, 1024), 1).unwrap();
        let before: f32 = a.frame.bars.iter().sum();
        a.decay();
        let after: f32 = a.frame.bars.iter().sum();
        assert!(after < before);
    }

    // --- Generation gating ---

    #[test]
    fn stale_generation_window_is_a_noop() {
        let mut a = analyzer();
        a.analyze(&sine_on_bin(64, 1024), 1).unwrap();
        let before = a.frame();

        let stale = TapWindow { generation: 1, samples: sine_on_bin(200, 1024) };
        let after = a.tick(Some(stale), 2, true);

        assert_eq!(after, before, "stale window must not alter bar/peak state");
    }

    #[test]
    fn matching_generation_window_updates_the_frame() {
        let mut a = analyzer();
        let fresh = TapWindow { generation: 3, samples: sine_on_bin(64, 1024) };
        let frame = a.tick(Some(fresh), 3, true);
        assert_eq!(frame.generation, 3);
        assert!(frame.bars.iter().any(|&b| b > 0.5));
    }

    #[test]
    fn ticks_without_windows_fade_to_zero_with_peaks_above_bars() {
        let mut a = analyzer();
        let band = 20;
        let bin = (a.bands[band].start + a.bands[band].end) / 2;
        let fresh = TapWindow { generation: 1, samples: sine_on_bin(bin, 1024) };
        let frame = a.tick(Some(fresh), 1, true);
        assert_eq!(dominant_band(&frame), band);
        assert!(frame.bars[band] > 0.9);

        for _ in 0..300 {
            let frame = a.tick(None, 1, true);
            for b in 0..SPECTRUM_BANDS {
                assert!(frame.peaks[b] >= frame.bars[b]);
            }
        }
        let settled = a.frame();
        assert!(settled.bars.iter().all(|&v| v == 0.0));
        assert!(settled.peaks.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn missing_window_decays() {
        let mut a = analyzer();
        a.analyze(&sine_on_bin(64, 1024), 1).unwrap();
        let before: f32 = a.frame.bars.iter().sum();
        let frame = a.tick(None, 1, true);
        assert!(frame.bars.iter().sum::<f32>() < before);
    }
}
