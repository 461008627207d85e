//! アップロード前の画像準備
//!
//! 長辺を `max_image_size` 以下に縮小し、JPEG で再圧縮する（拡大はしない）。
//! 元のファイルをそのまま送る場合は `InferenceClient::upload_file` を使う。

use std::io::Cursor;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use photo_uploader_common::UploadRequest;

use crate::config::Config;
use crate::error::{Result, UploaderError};

#[derive(Debug, Clone, Copy)]
pub struct PrepareOptions {
    pub max_image_size: u32,
    pub jpeg_quality: u8,
}

impl From<&Config> for PrepareOptions {
    fn from(config: &Config) -> Self {
        Self {
            max_image_size: config.max_image_size,
            jpeg_quality: config.jpeg_quality,
        }
    }
}

/// ファイルからアップロード要求を作る
pub fn prepare_upload(
    path: &Path,
    location: &str,
    options: &PrepareOptions,
) -> Result<UploadRequest> {
    let original = std::fs::read(path)?;
    let bytes = compress_jpeg(&original, options.max_image_size, options.jpeg_quality)?;

    tracing::debug!(path = %path.display(), bytes = bytes.len(), "prepared upload");
    Ok(UploadRequest::new(bytes, location))
}

/// デコード → 縮小 → JPEG 再エンコード
pub fn compress_jpeg(bytes: &[u8], max_size: u32, quality: u8) -> Result<Vec<u8>> {
    let image =
        image::load_from_memory(bytes).map_err(|e| UploaderError::ImageLoad(e.to_string()))?;
    let image = downscale(image, max_size);

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
    // JPEG はアルファ非対応
    image
        .to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| UploaderError::ImageLoad(e.to_string()))?;

    Ok(out.into_inner())
}

fn downscale(image: DynamicImage, max_size: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if max_size == 0 || width == 0 || height == 0 {
        return image;
    }

    let scale = f64::min(
        max_size as f64 / width as f64,
        max_size as f64 / height as f64,
    );
    if scale >= 1.0 {
        return image;
    }

    let new_width = ((width as f64 * scale).round() as u32).max(1);
    let new_height = ((height as f64 * scale).round() as u32).max(1);
    image.resize_exact(new_width, new_height, FilterType::Triangle)
}
