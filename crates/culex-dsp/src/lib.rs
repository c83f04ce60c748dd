pub mod detector;
pub mod doa;
pub mod gcc_phat;
pub mod tdoa;

// Core exports
pub use detector::{BandProfile, WingbeatDetector};
pub use doa::{fixed_quad_bearing, select_best, DoaCombiner, DoaStrategy, QUAD_DIAGONAL_SPACING_M};
pub use gcc_phat::{GccError, GccPhat, GccPhatEstimator};
pub use tdoa::{MicPair, TdoaEstimate, TdoaEstimator, SOUND_SPEED_M_S};
