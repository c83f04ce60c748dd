use std::fs;
use std::path::Path;

use culex_audio::ArrayConfig;
use culex_dsp::{BandProfile, DoaStrategy, QUAD_DIAGONAL_SPACING_M};
use culex_foundation::AppError;
use serde::{Deserialize, Serialize};

/// When the orchestrator asks for a bearing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerPolicy {
    /// Accumulate a fixed window of chunks; resolve once when more than half
    /// were positive.
    WindowedRatio,
    /// Resolve on the very first positive chunk, no windowing.
    Immediate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Exact input device name; `None` picks the first device with enough
    /// channels.
    pub device: Option<String>,
    pub array: ArrayConfig,
    pub band: BandProfile,
    pub strategy: DoaStrategy,
    pub policy: TriggerPolicy,
    /// Detection window length for the windowed-ratio policy.
    pub window_ms: u64,
    /// Baseline length between the mics of a pair, meters.
    pub spacing_m: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: None,
            array: ArrayConfig::six_channel_array(),
            band: BandProfile::low_band(),
            strategy: DoaStrategy::FixedQuad,
            policy: TriggerPolicy::WindowedRatio,
            window_ms: 200,
            spacing_m: QUAD_DIAGONAL_SPACING_M,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file, or fall back to defaults when no path
    /// is given. Unknown fields are tolerated; missing ones take defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, AppError> {
        let settings = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|e| {
                    AppError::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                toml::from_str(&raw)
                    .map_err(|e| AppError::Config(format!("{}: {}", path.display(), e)))?
            }
            None => Self::default(),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        self.array.validate()?;
        if self.spacing_m <= 0.0 {
            return Err(AppError::Config("mic spacing must be positive".into()));
        }
        if self.band.freq_min_hz >= self.band.freq_max_hz {
            return Err(AppError::Config("band freq_min must be below freq_max".into()));
        }
        if self.policy == TriggerPolicy::WindowedRatio && self.window_chunks() == 0 {
            return Err(AppError::Config(
                "window_ms shorter than one chunk".into(),
            ));
        }
        Ok(())
    }

    /// Chunks per detection window (window duration / chunk duration).
    pub fn window_chunks(&self) -> usize {
        (self.window_ms as f32 / self.array.chunk_duration_ms()) as usize
    }
}
