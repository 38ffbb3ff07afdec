//! Client-side image compression before upload.
//!
//! Decoding and re-encoding run on the blocking pool; the caller simply
//! awaits the result. Non-image files pass through untouched.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::{user_category, DbState};
use crate::error::{AppError, AppResult};

/// Quality is never lowered below this while chasing `max_size_bytes`.
const MIN_QUALITY: u8 = 30;
const QUALITY_STEP: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionSettings {
    pub enabled: bool,
    /// JPEG quality, 1 to 100.
    pub quality: u8,
    /// Longest side in pixels after downscaling.
    pub max_dimension: u32,
    pub max_size_bytes: usize,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            quality: 80,
            max_dimension: 1920,
            max_size_bytes: 1024 * 1024,
        }
    }
}

impl CompressionSettings {
    pub fn validate(&self) -> AppResult<()> {
        if !(1..=100).contains(&self.quality) {
            return Err(AppError::validation("A qualidade deve estar entre 1 e 100"));
        }
        if self.max_dimension == 0 {
            return Err(AppError::validation("A dimensão máxima deve ser maior que zero"));
        }
        if self.max_size_bytes == 0 {
            return Err(AppError::validation("O tamanho máximo deve ser maior que zero"));
        }
        Ok(())
    }

    /// Stored settings for `user_id`; missing or unreadable keys take the
    /// default.
    pub fn load(db: &DbState, user_id: &str) -> Self {
        let category = user_category(user_id);
        let defaults = Self::default();
        let read = |key: &str| db.get(&category, &format!("compression.{key}"));
        Self {
            enabled: read("enabled")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enabled),
            quality: read("quality")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.quality),
            max_dimension: read("max_dimension")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_dimension),
            max_size_bytes: read("max_size_bytes")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_size_bytes),
        }
    }

    pub fn save(&self, db: &DbState, user_id: &str) -> AppResult<()> {
        self.validate()?;
        let category = user_category(user_id);
        db.set(&category, "compression.enabled", &self.enabled.to_string())?;
        db.set(&category, "compression.quality", &self.quality.to_string())?;
        db.set(
            &category,
            "compression.max_dimension",
            &self.max_dimension.to_string(),
        )?;
        db.set(
            &category,
            "compression.max_size_bytes",
            &self.max_size_bytes.to_string(),
        )?;
        info!(user_id, settings = ?self, "compression settings saved");
        Ok(())
    }
}

/// A file ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub fn is_compressible(content_type: &str) -> bool {
    matches!(content_type, "image/jpeg" | "image/jpg" | "image/png")
}

/// Downscale and re-encode as JPEG when it helps. The original payload is
/// returned when compression is disabled, the type is not a raster image,
/// or the re-encoded file would not be smaller.
pub async fn compress_image(payload: Payload, settings: CompressionSettings) -> AppResult<Payload> {
    if !settings.enabled || !is_compressible(&payload.content_type) {
        return Ok(payload);
    }
    settings.validate()?;

    tokio::task::spawn_blocking(move || compress_blocking(payload, &settings))
        .await
        .map_err(|e| AppError::Image(format!("compression task failed: {e}")))?
}

fn compress_blocking(payload: Payload, settings: &CompressionSettings) -> AppResult<Payload> {
    let decoded = image::load_from_memory(&payload.bytes)?;
    let resized = downscale(decoded, settings.max_dimension);
    let rgb = resized.to_rgb8();

    let mut quality = settings.quality;
    let mut encoded = encode_jpeg(&rgb, quality)?;
    while encoded.len() > settings.max_size_bytes && quality > MIN_QUALITY {
        quality = quality.saturating_sub(QUALITY_STEP).max(MIN_QUALITY);
        encoded = encode_jpeg(&rgb, quality)?;
    }

    debug!(
        original = payload.bytes.len(),
        compressed = encoded.len(),
        quality,
        "image compressed"
    );

    if encoded.len() >= payload.bytes.len() {
        return Ok(payload);
    }
    Ok(Payload {
        bytes: encoded,
        content_type: "image/jpeg".to_string(),
    })
}

fn downscale(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (w, h) = image.dimensions();
    if w.max(h) <= max_dimension {
        return image;
    }
    // `resize` keeps the aspect ratio inside the bounding box
    image.resize(max_dimension, max_dimension, FilterType::Triangle)
}

fn encode_jpeg(rgb: &image::RgbImage, quality: u8) -> AppResult<Vec<u8>> {
    let mut out = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder.encode_image(rgb)?;
    Ok(out)
}
