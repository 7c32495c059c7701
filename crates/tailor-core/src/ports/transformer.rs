//! ImageTransformer port - デコード・リサイズ・エンコード
//!
//! CPU バウンドなので同期 trait。ステージ側で spawn_blocking して呼ぶ。

use std::path::Path;

use crate::domain::{Dimensions, TransformError};

/// Resizes the image at `source` to `width` (aspect preserved, see
/// [`Dimensions::fit_width`]) and writes it to `dest`.
///
/// Returns the output dimensions.
pub trait ImageTransformer: Send + Sync {
    fn resize(&self, source: &Path, dest: &Path, width: u32) -> Result<Dimensions, TransformError>;
}
