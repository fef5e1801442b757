//! Image records and upload policy.
//!
//! Uploads are limited by MIME type, byte size and pixel count. Images over
//! the pixel budget are scaled down, not rejected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TovectorError};
use crate::{ImageId, UserId};

/// Maximum upload size in bytes (35 MB).
pub const MAX_UPLOAD_BYTES: usize = 35 * 1024 * 1024;

/// Maximum pixel count (width × height) accepted without resizing.
pub const MAX_PIXELS: u64 = 33_554_432;

/// MIME type of derived vector images.
pub const SVG_MIME_TYPE: &str = "image/svg+xml";

/// Raster formats accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageKind {
    /// `image/jpeg`
    Jpeg,
    /// `image/png`
    Png,
}

impl ImageKind {
    /// Parse an accepted MIME type. Only the exact `image/jpeg` and
    /// `image/png` strings are accepted.
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    /// Canonical MIME type.
    #[must_use]
    pub const fn mime_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    /// File extension used in storage paths.
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// Limits applied to uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    /// Maximum file size in bytes.
    pub max_bytes: usize,
    /// Maximum width × height before the image is scaled down.
    pub max_pixels: u64,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_bytes: MAX_UPLOAD_BYTES,
            max_pixels: MAX_PIXELS,
        }
    }
}

impl UploadPolicy {
    /// Check the declared content type.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedMediaType` unless the type is JPEG or PNG.
    pub fn check_mime(&self, mime: &str) -> Result<ImageKind> {
        ImageKind::from_mime(mime).ok_or_else(|| TovectorError::UnsupportedMediaType(mime.into()))
    }

    /// Check the file size.
    ///
    /// # Errors
    ///
    /// Returns `FileTooLarge` when `size` exceeds `max_bytes`.
    pub fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_bytes {
            return Err(TovectorError::FileTooLarge {
                size,
                max: self.max_bytes,
            });
        }
        Ok(())
    }

    /// Dimensions to resize to, or `None` when the image is within budget.
    #[must_use]
    pub fn target_dimensions(&self, width: u32, height: u32) -> Option<(u32, u32)> {
        if u64::from(width) * u64::from(height) <= self.max_pixels {
            return None;
        }
        Some(fit_to_pixel_budget(width, height, self.max_pixels))
    }

    /// Size limit in whole megabytes, for error messages.
    #[must_use]
    pub const fn max_megabytes(&self) -> usize {
        self.max_bytes / (1024 * 1024)
    }
}

/// Scale `width × height` down by `sqrt(max_pixels / (width × height))`.
///
/// Each side is rounded; if rounding overshoots the budget the sides are
/// floored instead. Sides never drop below one pixel and never grow.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn fit_to_pixel_budget(width: u32, height: u32, max_pixels: u64) -> (u32, u32) {
    let total = u64::from(width) * u64::from(height);
    if total <= max_pixels || total == 0 {
        return (width, height);
    }

    let scale = (max_pixels as f64 / total as f64).sqrt();
    let scaled_w = f64::from(width) * scale;
    let scaled_h = f64::from(height) * scale;

    let clamp = |v: f64, limit: u32| (v as u32).clamp(1, limit);

    let (mut w, mut h) = (clamp(scaled_w.round(), width), clamp(scaled_h.round(), height));
    if u64::from(w) * u64::from(h) > max_pixels {
        w = clamp(scaled_w.floor(), width);
        h = clamp(scaled_h.floor(), height);
    }
    // Extreme aspect ratios: one side pinned at 1 can leave the other too long.
    if u64::from(w) * u64::from(h) > max_pixels {
        h = u32::try_from(max_pixels / u64::from(w)).unwrap_or(u32::MAX).max(1);
    }
    if u64::from(w) * u64::from(h) > max_pixels {
        w = u32::try_from(max_pixels / u64::from(h)).unwrap_or(u32::MAX).max(1);
    }
    (w, h)
}

/// Object storage path for a user's file: `{user_id}/{image_id}.{ext}`.
#[must_use]
pub fn storage_path(user_id: &UserId, image_id: &ImageId, extension: &str) -> String {
    format!("{user_id}/{image_id}.{extension}")
}

/// Metadata row for a stored image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Image id.
    pub id: ImageId,
    /// Owner.
    pub user_id: UserId,
    /// Path within the storage bucket.
    pub path: String,
    /// File name as uploaded.
    pub original_name: String,
    /// Stored MIME type.
    pub mime_type: String,
    /// Stored size in bytes.
    pub size: i64,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Whether the upload was scaled down to the pixel budget.
    pub was_resized: bool,
    /// Raster image this one was derived from.
    pub parent_id: Option<ImageId>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl ImageRecord {
    /// Whether this is a derived vector image.
    #[must_use]
    pub fn is_vector(&self) -> bool {
        self.mime_type == SVG_MIME_TYPE
    }

    /// Whether `user_id` owns this image.
    #[must_use]
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        self.user_id == *user_id
    }
}
