use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use serde::{Deserialize, Serialize};

/// Target frequency band and decision threshold for the wingbeat classifier.
///
/// Two calibrations are in deployment; which one applies depends on the mic
/// hardware and the species being tracked, so the band is configuration and
/// never hard-coded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandProfile {
    pub freq_min_hz: f64,
    pub freq_max_hz: f64,
    pub ratio_threshold: f64,
}

impl BandProfile {
    /// Low-frequency wingbeat fundamental (large species, quiet arrays).
    pub fn low_band() -> Self {
        Self {
            freq_min_hz: 85.0,
            freq_max_hz: 150.0,
            ratio_threshold: 0.01,
        }
    }

    /// Higher harmonic band used with close-range single-mic captures.
    pub fn wingbeat_band() -> Self {
        Self {
            freq_min_hz: 650.0,
            freq_max_hz: 850.0,
            ratio_threshold: 0.15,
        }
    }
}

impl Default for BandProfile {
    fn default() -> Self {
        Self::low_band()
    }
}

/// Pure per-chunk classifier: is spectral energy concentrated in the wingbeat
/// band?
pub struct WingbeatDetector {
    profile: BandProfile,
    sample_rate_hz: u32,
    planner: FftPlanner<f64>,
}

impl WingbeatDetector {
    pub fn new(profile: BandProfile, sample_rate_hz: u32) -> Self {
        Self {
            profile,
            sample_rate_hz,
            planner: FftPlanner::new(),
        }
    }

    pub fn profile(&self) -> &BandProfile {
        &self.profile
    }

    /// Fraction of total spectral magnitude inside the target band.
    /// `None` when the chunk has no spectral energy at all (silence).
    pub fn band_energy_ratio(&mut self, chunk: &[i16]) -> Option<f64> {
        if chunk.is_empty() {
            return None;
        }
        let n = chunk.len();
        let fft = self.planner.plan_fft_forward(n);
        let mut buf: Vec<Complex<f64>> = chunk
            .iter()
            .map(|&s| Complex::new(s as f64, 0.0))
            .collect();
        fft.process(&mut buf);

        // Real-input spectrum: bins 0..=n/2 carry the non-negative
        // frequencies, bin k sits at k * fs / n Hz.
        let bin_hz = self.sample_rate_hz as f64 / n as f64;
        let mut band = 0.0;
        let mut total = 0.0;
        for (k, value) in buf.iter().take(n / 2 + 1).enumerate() {
            let magnitude = value.norm();
            total += magnitude;
            let freq = k as f64 * bin_hz;
            if freq >= self.profile.freq_min_hz && freq <= self.profile.freq_max_hz {
                band += magnitude;
            }
        }

        if total == 0.0 {
            return None;
        }
        Some(band / total)
    }

    /// True iff the band-energy ratio exceeds the profile threshold.
    /// Silence never divides by zero; it simply is not a wingbeat.
    pub fn is_wingbeat(&mut self, chunk: &[i16]) -> bool {
        match self.band_energy_ratio(chunk) {
            Some(ratio) => ratio > self.profile.ratio_threshold,
            None => false,
        }
    }
}
