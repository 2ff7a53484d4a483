//! Tuning constants for the player and the spectrum analyzer.

use std::time::Duration;

/// Number of frequency bands in the spectrum display.
pub const SPECTRUM_BANDS: usize = 64;

/// Visual refresh cadence (~20 Hz).
pub const TICK_RATE: Duration = Duration::from_millis(50);

/// Seek step for the arrow keys.
pub const SEEK_STEP: Duration = Duration::from_secs(10);

/// Volume step per keypress.
pub const VOLUME_STEP: f32 = 0.1;

/// Lowest frequency assigned to band 0. Bins below this are skipped
/// together with DC.
pub const MIN_BAND_FREQ_HZ: f32 = 50.0;

/// Aesthetic tuning for the analyzer. Bars rise instantly and fall
/// exponentially; peak markers fall linearly and rest on the bars.
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    /// FFT window length in samples (power of two).
    pub window_size: usize,
    /// Per-tick multiplier applied to a falling bar, in (0, 1).
    pub attack_decay: f32,
    /// Subtracted from each peak marker per tick.
    pub peak_fall: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        AnalyzerConfig {
            window_size: 1024,
            attack_decay: 0.85,
            peak_fall: 0.02,
        }
    }
}
