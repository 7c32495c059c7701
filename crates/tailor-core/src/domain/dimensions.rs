//! Image dimensions and the resize law.

use serde::{Deserialize, Serialize};

use super::errors::TransformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions after resizing to `target_width`, keeping the aspect ratio.
    ///
    /// `height = round(target_width * height / width)`, at least 1. The
    /// requested height never takes part in this.
    pub fn fit_width(self, target_width: u32) -> Result<Dimensions, TransformError> {
        if self.width == 0 {
            return Err(TransformError::ZeroWidth);
        }
        let numerator = u64::from(target_width) * u64::from(self.height);
        let denominator = u64::from(self.width);
        // round half up without going through floats
        let height = (2 * numerator + denominator) / (2 * denominator);
        let height = u32::try_from(height).unwrap_or(u32::MAX).max(1);
        Ok(Dimensions::new(target_width, height))
    }
}
