//! Raster decoding and pixel-budget resizing.
//!
//! Decoding runs on the blocking pool; a 35 MB PNG can take a noticeable
//! amount of CPU.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageReader};

use tovector_core::{ImageKind, UploadPolicy};

/// Errors from image processing.
#[derive(Debug, thiserror::Error)]
pub enum ImagingError {
    /// The bytes are not a valid image of the declared format.
    #[error("invalid image data: {0}")]
    Decode(String),

    /// Re-encoding the resized image failed.
    #[error("failed to encode image: {0}")]
    Encode(String),

    /// The blocking task panicked or was cancelled.
    #[error("image task failed: {0}")]
    Task(String),
}

/// An upload ready to be stored.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    /// Bytes to store: the original, or the re-encoded resized image.
    pub bytes: Vec<u8>,
    /// Stored width.
    pub width: u32,
    /// Stored height.
    pub height: u32,
    /// Whether the image was scaled down.
    pub was_resized: bool,
}

const fn image_format(kind: ImageKind) -> ImageFormat {
    match kind {
        ImageKind::Jpeg => ImageFormat::Jpeg,
        ImageKind::Png => ImageFormat::Png,
    }
}

/// Decode `bytes` as `kind` and scale down to the policy's pixel budget.
///
/// # Errors
///
/// Returns `Decode` if the bytes do not decode, `Encode` if the resized
/// image cannot be written back.
pub async fn prepare_upload(
    bytes: Vec<u8>,
    kind: ImageKind,
    policy: UploadPolicy,
) -> Result<PreparedImage, ImagingError> {
    tokio::task::spawn_blocking(move || prepare_blocking(bytes, kind, policy))
        .await
        .map_err(|e| ImagingError::Task(e.to_string()))?
}

fn prepare_blocking(
    bytes: Vec<u8>,
    kind: ImageKind,
    policy: UploadPolicy,
) -> Result<PreparedImage, ImagingError> {
    let format = image_format(kind);

    let mut reader = ImageReader::with_format(Cursor::new(bytes.as_slice()), format);
    reader.no_limits();
    let decoded = reader
        .decode()
        .map_err(|e| ImagingError::Decode(e.to_string()))?;

    let (width, height) = (decoded.width(), decoded.height());

    let Some((target_w, target_h)) = policy.target_dimensions(width, height) else {
        return Ok(PreparedImage {
            bytes,
            width,
            height,
            was_resized: false,
        });
    };

    tracing::debug!(width, height, target_w, target_h, "Scaling image to pixel budget");

    let resized = decoded.resize_exact(target_w, target_h, FilterType::Lanczos3);
    let resized = match kind {
        ImageKind::Jpeg => DynamicImage::ImageRgb8(resized.to_rgb8()),
        ImageKind::Png => resized,
    };

    let mut out = Cursor::new(Vec::new());
    resized
        .write_to(&mut out, format)
        .map_err(|e| ImagingError::Encode(e.to_string()))?;

    Ok(PreparedImage {
        bytes: out.into_inner(),
        width: target_w,
        height: target_h,
        was_resized: true,
    })
}
