//! ImageCrateTransformer - `image` クレートによるリサイズ
//!
//! - 出力フォーマットは出力ファイルの拡張子から決める（不明ならソースの検出結果）
//! - JPEG は品質 95 で書き出す
//! - 出力のピクセル数が上限を超えたら `TooLarge`。ソースのデコードも `image::Limits` で確保量を抑える
//!   （巨大な確保に失敗するとプロセスごと abort するため、確保の前に止める）

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader, Limits};

use crate::domain::{Dimensions, TransformError};
use crate::ports::ImageTransformer;

pub const DEFAULT_JPEG_QUALITY: u8 = 95;

/// 40 megapixels, about 160 MB as RGBA8.
pub const DEFAULT_MAX_PIXELS: u64 = 40_000_000;

/// Worst case bytes per pixel of a decoded image (RGBA, 32-bit float).
const MAX_BYTES_PER_PIXEL: u64 = 16;

#[derive(Debug, Clone, Copy)]
pub struct ImageCrateTransformer {
    jpeg_quality: u8,
    max_pixels: u64,
    filter: FilterType,
}

impl Default for ImageCrateTransformer {
    fn default() -> Self {
        Self {
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            max_pixels: DEFAULT_MAX_PIXELS,
            filter: FilterType::Triangle,
        }
    }
}

impl ImageCrateTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Upper bound on `width * height` of both the decoded source and the output.
    pub fn with_max_pixels(mut self, max_pixels: u64) -> Self {
        self.max_pixels = max_pixels.max(1);
        self
    }

    fn decode_limits(&self) -> Limits {
        let mut limits = Limits::default();
        limits.max_alloc = Some(self.max_pixels.saturating_mul(MAX_BYTES_PER_PIXEL));
        limits
    }

    fn check_pixels(&self, target: Dimensions) -> Result<(), TransformError> {
        let pixels = u64::from(target.width) * u64::from(target.height);
        if pixels > self.max_pixels {
            return Err(TransformError::TooLarge {
                width: target.width,
                height: target.height,
                limit: self.max_pixels,
            });
        }
        Ok(())
    }

    fn encode(
        &self,
        image: &DynamicImage,
        format: ImageFormat,
        dest: &Path,
    ) -> Result<(), TransformError> {
        let encode_err = |message: String| TransformError::Encode {
            path: dest.to_path_buf(),
            message,
        };

        let file = File::create(dest).map_err(|e| encode_err(e.to_string()))?;
        let mut writer = BufWriter::new(file);
        match format {
            ImageFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality);
                rgb.write_with_encoder(encoder)
                    .map_err(|e| encode_err(e.to_string()))?;
            }
            other => image
                .write_to(&mut writer, other)
                .map_err(|e| encode_err(e.to_string()))?,
        }
        writer.flush().map_err(|e| encode_err(e.to_string()))
    }
}

impl ImageTransformer for ImageCrateTransformer {
    fn resize(&self, source: &Path, dest: &Path, width: u32) -> Result<Dimensions, TransformError> {
        let decode_err = |message: String| TransformError::Decode {
            path: source.to_path_buf(),
            message,
        };

        let mut reader = ImageReader::open(source)
            .and_then(|r| r.with_guessed_format())
            .map_err(|e| decode_err(e.to_string()))?;
        // caps what the decoder may allocate for the source
        reader.limits(self.decode_limits());
        let detected = reader.format();
        let image = reader.decode().map_err(|e| decode_err(e.to_string()))?;

        let target = Dimensions::new(image.width(), image.height()).fit_width(width)?;
        self.check_pixels(target)?;
        let resized = image.resize_exact(target.width, target.height, self.filter);

        let format = ImageFormat::from_path(dest)
            .ok()
            .filter(|f| f.writing_enabled())
            .or(detected)
            .ok_or_else(|| TransformError::Encode {
                path: dest.to_path_buf(),
                message: "cannot determine output format".to_string(),
            })?;
        self.encode(&resized, format, dest)?;

        Ok(target)
    }
}
