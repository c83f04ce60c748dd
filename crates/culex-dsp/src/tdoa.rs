use serde::{Deserialize, Serialize};

use crate::gcc_phat::{GccError, GccPhatEstimator};

/// Speed of sound in air at roughly 20 C, m/s.
pub const SOUND_SPEED_M_S: f64 = 343.2;

/// Two logical microphones and the physical distance between them.
///
/// The spacing bounds the largest physically possible delay:
/// `max_tau = spacing / speed_of_sound`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MicPair {
    pub a: usize,
    pub b: usize,
    pub spacing_m: f64,
}

impl MicPair {
    pub fn new(a: usize, b: usize, spacing_m: f64) -> Self {
        Self { a, b, spacing_m }
    }

    pub fn max_tau(&self) -> f64 {
        self.spacing_m / SOUND_SPEED_M_S
    }
}

/// A clamped pairwise delay and the angle it implies.
#[derive(Debug, Clone, Copy)]
pub struct TdoaEstimate {
    pub pair: (usize, usize),
    pub tau_s: f64,
    pub angle_deg: f64,
}

impl TdoaEstimate {
    /// Clamp a raw delay to the pair's physical bound and derive the angle.
    /// Clamping (never rejection) keeps the `asin` argument in `[-1, 1]`.
    pub fn from_raw(tau_s: f64, pair: &MicPair) -> Self {
        let max_tau = pair.max_tau();
        let tau = tau_s.clamp(-max_tau, max_tau);
        Self {
            pair: (pair.a, pair.b),
            tau_s: tau,
            angle_deg: (tau / max_tau).asin().to_degrees(),
        }
    }

    /// Neutral estimate substituted when cross-correlation fails on a pair.
    pub fn zero(pair: &MicPair) -> Self {
        Self {
            pair: (pair.a, pair.b),
            tau_s: 0.0,
            angle_deg: 0.0,
        }
    }
}

/// Pairwise time-difference-of-arrival estimation on top of GCC-PHAT.
pub struct TdoaEstimator {
    sample_rate_hz: u32,
    interp: usize,
    gcc: GccPhatEstimator,
}

impl TdoaEstimator {
    pub fn new(sample_rate_hz: u32) -> Self {
        Self {
            sample_rate_hz,
            interp: 1,
            gcc: GccPhatEstimator::new(),
        }
    }

    /// Spectrum zero-padding factor for sub-sample delay resolution.
    pub fn with_interp(mut self, interp: usize) -> Self {
        self.interp = interp.max(1);
        self
    }

    /// Estimate the delay between two equal-length mono signals.
    ///
    /// The raw delay is clamped to `[-max_tau, max_tau]` before conversion,
    /// so the `asin` argument always stays within `[-1, 1]`. Failure on a
    /// pair is surfaced as `Err` for the combiner to aggregate.
    pub fn estimate(
        &mut self,
        sig_a: &[f64],
        sig_b: &[f64],
        pair: &MicPair,
    ) -> Result<TdoaEstimate, GccError> {
        let max_tau = pair.max_tau();
        if !(max_tau > 0.0) {
            return Err(GccError::DegenerateInput);
        }

        let raw = self.gcc.estimate(
            sig_a,
            sig_b,
            self.sample_rate_hz as f64,
            Some(max_tau),
            self.interp,
        )?;

        Ok(TdoaEstimate::from_raw(raw.tau_s, pair))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;

    fn noise(len: usize, seed: u64) -> Vec<f64> {
        let mut state = seed | 1;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                ((state >> 33) as f64 / (1u64 << 31) as f64) - 1.0
            })
            .collect()
    }

    fn delayed(signal: &[f64], by: usize) -> Vec<f64> {
        let mut out = vec![0.0; signal.len()];
        for i in by..signal.len() {
            out[i] = signal[i - by];
        }
        out
    }

    #[test]
    fn known_delay_within_one_sample() {
        // 2-sample delay at 16 kHz is 125 us; a 10 cm pair allows ~291 us
        let pair = MicPair::new(0, 1, 0.10);
        let reference = noise(2048, 7);
        let sig = delayed(&reference, 2);
        let mut est = TdoaEstimator::new(RATE);
        let result = est.estimate(&sig, &reference, &pair).unwrap();
        let true_tau = 2.0 / RATE as f64;
        assert!((result.tau_s - true_tau).abs() <= 1.0 / RATE as f64);
    }

    #[test]
    fn excess_delay_clamps_to_max_tau() {
        // 8 cm spacing allows at most ~233 us (~3.7 samples at 16 kHz);
        // feed a 20-sample delay and expect exact clamping.
        let pair = MicPair::new(0, 1, 0.08);
        let reference = noise(2048, 21);
        let sig = delayed(&reference, 20);
        let mut est = TdoaEstimator::new(RATE);
        let result = est.estimate(&sig, &reference, &pair).unwrap();
        assert!(result.tau_s.abs() <= pair.max_tau());
        // Angle never leaves the asin domain
        assert!(result.angle_deg.abs() <= 90.0);
    }

    #[test]
    fn raw_delay_beyond_bound_clamps_exactly() {
        let pair = MicPair::new(0, 1, 0.08);
        let max_tau = pair.max_tau();

        let over = TdoaEstimate::from_raw(max_tau * 3.0, &pair);
        assert_eq!(over.tau_s, max_tau);
        assert!((over.angle_deg - 90.0).abs() < 1e-9);

        let under = TdoaEstimate::from_raw(-max_tau * 3.0, &pair);
        assert_eq!(under.tau_s, -max_tau);
        assert!((under.angle_deg + 90.0).abs() < 1e-9);
    }

    #[test]
    fn degenerate_pair_is_an_error() {
        let pair = MicPair::new(0, 1, 0.10);
        let zeros = vec![0.0; 512];
        let mut est = TdoaEstimator::new(RATE);
        assert!(est.estimate(&zeros, &zeros, &pair).is_err());
    }

    #[test]
    fn zero_spacing_is_an_error() {
        let pair = MicPair::new(0, 1, 0.0);
        let sig = noise(512, 3);
        let mut est = TdoaEstimator::new(RATE);
        assert!(est.estimate(&sig, &sig, &pair).is_err());
    }

    #[test]
    fn zero_substitute_has_neutral_angle() {
        let pair = MicPair::new(2, 3, 0.08127);
        let zero = TdoaEstimate::zero(&pair);
        assert_eq!(zero.pair, (2, 3));
        assert_eq!(zero.tau_s, 0.0);
        assert_eq!(zero.angle_deg, 0.0);
    }
}
