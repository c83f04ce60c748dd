use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use thiserror::Error;

const SPECTRUM_EPSILON: f64 = 1e-12;

#[derive(Error, Debug)]
pub enum GccError {
    #[error("signals too short for cross-correlation ({len} samples)")]
    TooShort { len: usize },

    #[error("degenerate input: cross-power spectrum has no energy")]
    DegenerateInput,
}

/// Result of one cross-correlation: the estimated delay of the first signal
/// relative to the reference, and the correlation peak magnitude.
#[derive(Debug, Clone, Copy)]
pub struct GccPhat {
    pub tau_s: f64,
    pub confidence: f64,
}

/// Generalized Cross-Correlation with PHAse Transform.
///
/// Whitening the cross-power spectrum before the inverse transform sharpens
/// the correlation peak, which keeps sub-sample delay estimates usable under
/// reverberation. The planner caches FFTs across calls, so one estimator can
/// serve a whole session of identically-sized windows.
pub struct GccPhatEstimator {
    planner: FftPlanner<f64>,
}

impl Default for GccPhatEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl GccPhatEstimator {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Estimate the delay of `sig` relative to `refsig` in seconds.
    ///
    /// Positive delay means `sig` lags the reference. The search is limited
    /// to `max_tau` when given, and `interp` zero-pads the spectrum for
    /// `1/interp`-sample time resolution.
    pub fn estimate(
        &mut self,
        sig: &[f64],
        refsig: &[f64],
        fs: f64,
        max_tau: Option<f64>,
        interp: usize,
    ) -> Result<GccPhat, GccError> {
        let shortest = sig.len().min(refsig.len());
        if shortest < 2 {
            return Err(GccError::TooShort { len: shortest });
        }
        let interp = interp.max(1);
        let n = sig.len() + refsig.len();

        let fft = self.planner.plan_fft_forward(n);
        let mut spec_a = pad_complex(sig, n);
        let mut spec_b = pad_complex(refsig, n);
        fft.process(&mut spec_a);
        fft.process(&mut spec_b);

        // PHAT weighting: keep only the phase of the cross-power spectrum.
        let mut whitened = Vec::with_capacity(n);
        let mut has_energy = false;
        for k in 0..n {
            let cross = spec_a[k] * spec_b[k].conj();
            let mag = cross.norm();
            if mag > SPECTRUM_EPSILON {
                has_energy = true;
                whitened.push(cross / mag);
            } else {
                whitened.push(Complex::new(0.0, 0.0));
            }
        }
        if !has_energy {
            return Err(GccError::DegenerateInput);
        }

        // Zero-pad the spectrum (preserving conjugate symmetry) so the
        // inverse transform lands on an interp-times finer time grid.
        let ni = n * interp;
        let mut cc = vec![Complex::new(0.0, 0.0); ni];
        let half = n / 2;
        cc[..=half].copy_from_slice(&whitened[..=half]);
        for k in 1..(n - half) {
            cc[ni - k] = whitened[n - k];
        }
        let ifft = self.planner.plan_fft_inverse(ni);
        ifft.process(&mut cc);

        let mut max_shift = ni / 2;
        if let Some(mt) = max_tau {
            let limit = (interp as f64 * fs * mt).floor() as usize;
            max_shift = max_shift.min(limit.max(1));
        }

        // Peak search over lags [-max_shift, max_shift]; negative lags wrap
        // to the tail of the inverse transform.
        let mut best_shift: isize = -(max_shift as isize);
        let mut best_val = f64::NEG_INFINITY;
        for shift in -(max_shift as isize)..=(max_shift as isize) {
            let idx = if shift < 0 {
                (ni as isize + shift) as usize
            } else {
                shift as usize
            };
            let val = cc[idx].re.abs();
            if val > best_val {
                best_val = val;
                best_shift = shift;
            }
        }

        Ok(GccPhat {
            tau_s: best_shift as f64 / (interp as f64 * fs),
            confidence: best_val / ni as f64,
        })
    }
}

fn pad_complex(signal: &[f64], n: usize) -> Vec<Complex<f64>> {
    let mut out = Vec::with_capacity(n);
    out.extend(signal.iter().map(|&s| Complex::new(s, 0.0)));
    out.resize(n, Complex::new(0.0, 0.0));
    out
}
