mod contour;
mod yin;

pub use contour::{is_voiced, PitchContour, PitchContourBuilder, SpuriousHold};
pub use yin::{PitchEstimate, PitchEstimator, YinEstimator, UNVOICED};
