use serde::{Deserialize, Serialize};

use crate::tdoa::{MicPair, TdoaEstimate, TdoaEstimator};

/// Diagonal mic spacing of the deployed 4-mic circular array, meters.
pub const QUAD_DIAGONAL_SPACING_M: f64 = 0.08127;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoaStrategy {
    /// Two orthogonal diagonal baselines of a 4-mic ring, combined through
    /// the calibrated branch table of that layout.
    FixedQuad,
    /// All adjacent pairs of an N-mic array; the pair closest to broadside
    /// wins.
    AdjacentPairs,
}

/// Converts pairwise TDOA estimates into one bearing in `[0, 360)` degrees.
///
/// Per-pair cross-correlation failures are aggregated here: a failed pair
/// contributes a zero delay and zero angle instead of aborting the window.
pub struct DoaCombiner {
    strategy: DoaStrategy,
    spacing_m: f64,
    estimator: TdoaEstimator,
}

impl DoaCombiner {
    pub fn new(strategy: DoaStrategy, spacing_m: f64, sample_rate_hz: u32) -> Self {
        Self {
            strategy,
            spacing_m,
            estimator: TdoaEstimator::new(sample_rate_hz),
        }
    }

    pub fn strategy(&self) -> DoaStrategy {
        self.strategy
    }

    /// Compute a bearing from demultiplexed per-microphone signals, given in
    /// array order. `None` means the direction is unknown (too few mics),
    /// which is a benign outcome, not an error.
    pub fn bearing(&mut self, mics: &[Vec<f64>]) -> Option<f64> {
        match self.strategy {
            DoaStrategy::FixedQuad => self.fixed_quad(mics),
            DoaStrategy::AdjacentPairs => self.adjacent_pairs(mics),
        }
    }

    fn fixed_quad(&mut self, mics: &[Vec<f64>]) -> Option<f64> {
        if mics.len() < 4 {
            tracing::debug!(
                "FixedQuad needs 4 microphones, got {}; direction unknown",
                mics.len()
            );
            return None;
        }
        // Diagonal pairs of the ring: (0,2) and (1,3).
        let pair0 = MicPair::new(0, 2, self.spacing_m);
        let pair1 = MicPair::new(1, 3, self.spacing_m);
        let theta0 = self.estimate_or_zero(mics, pair0).angle_deg;
        let theta1 = self.estimate_or_zero(mics, pair1).angle_deg;
        Some(fixed_quad_bearing(theta0, theta1))
    }

    fn adjacent_pairs(&mut self, mics: &[Vec<f64>]) -> Option<f64> {
        if mics.len() < 2 {
            tracing::debug!("DOA undefined with {} microphone(s)", mics.len());
            return None;
        }
        let estimates: Vec<TdoaEstimate> = (0..mics.len() - 1)
            .map(|i| self.estimate_or_zero(mics, MicPair::new(i, i + 1, self.spacing_m)))
            .collect();
        select_best(&estimates)
    }

    fn estimate_or_zero(&mut self, mics: &[Vec<f64>], pair: MicPair) -> TdoaEstimate {
        match self.estimator.estimate(&mics[pair.a], &mics[pair.b], &pair) {
            Ok(estimate) => estimate,
            Err(e) => {
                tracing::debug!(
                    "TDOA failed for pair ({}, {}): {}; substituting zero",
                    pair.a,
                    pair.b,
                    e
                );
                TdoaEstimate::zero(&pair)
            }
        }
    }
}

/// Branch table of the deployed 4-mic layout.
///
/// The constants (the 120-degree rotation, the sign flips, the +90+180
/// offset) are calibration artifacts tuned against that physical array.
/// They are preserved literally; do not re-derive them geometrically.
pub fn fixed_quad_bearing(theta0: f64, theta1: f64) -> f64 {
    let bearing = if theta0.abs() < theta1.abs() {
        if theta1 > 0.0 {
            (theta0 + 360.0).rem_euclid(360.0)
        } else {
            180.0 - theta0
        }
    } else if theta0 < 0.0 {
        (theta1 + 360.0).rem_euclid(360.0)
    } else {
        (180.0 - theta1 + 90.0 + 180.0).rem_euclid(360.0)
    };
    (-bearing + 120.0).rem_euclid(360.0)
}

/// Pick the estimate whose delay is smallest in magnitude (closest to
/// broadside, hence most reliable) and wrap its angle into `[0, 360)`.
pub fn select_best(estimates: &[TdoaEstimate]) -> Option<f64> {
    estimates
        .iter()
        .min_by(|x, y| x.tau_s.abs().total_cmp(&y.tau_s.abs()))
        .map(|best| best.angle_deg.rem_euclid(360.0))
}
