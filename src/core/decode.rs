use image::{DynamicImage, ImageError, ImageFormat, ImageReader, Limits};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("image payload is empty")]
    Empty,

    #[error("payload is not a recognized image format")]
    UnrecognizedFormat,

    #[error("unsupported image format: {format:?} (expected PNG or JPEG)")]
    UnsupportedFormat { format: ImageFormat },

    #[error("malformed {format:?} data: {source}")]
    Malformed {
        format: ImageFormat,
        #[source]
        source: ImageError,
    },

    #[error("{format:?} image exceeds decode limits: {source}")]
    LimitsExceeded {
        format: ImageFormat,
        #[source]
        source: ImageError,
    },
}

/// Upper bounds applied while decoding, so an adversarial header cannot
/// request an unbounded allocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodeLimits {
    pub max_width: Option<u32>,
    pub max_height: Option<u32>,
    pub max_alloc: Option<u64>,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_width: Some(16_384),
            max_height: Some(16_384),
            max_alloc: Some(512 * 1024 * 1024),
        }
    }
}

impl DecodeLimits {
    fn to_image_limits(self) -> Limits {
        let mut limits = Limits::no_limits();
        limits.max_image_width = self.max_width;
        limits.max_image_height = self.max_height;
        limits.max_alloc = self.max_alloc;
        limits
    }
}

/// A decoded raster image.
#[derive(Debug, Clone)]
pub struct PixelGrid {
    image: DynamicImage,
    format: Option<ImageFormat>,
}

impl PixelGrid {
    /// Wrap an already decoded image, e.g. one produced in memory by a host.
    pub fn from_image(image: DynamicImage) -> Self {
        Self {
            image,
            format: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Format sniffed from the byte stream, `None` for grids built in memory.
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

/// Decode a PNG or JPEG byte stream. The format is taken from the stream's
/// signature; file names play no part here.
pub fn decode(bytes: &[u8], limits: &DecodeLimits) -> Result<PixelGrid, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }

    let format = image::guess_format(bytes).map_err(|_| DecodeError::UnrecognizedFormat)?;
    if !matches!(format, ImageFormat::Png | ImageFormat::Jpeg) {
        return Err(DecodeError::UnsupportedFormat { format });
    }

    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits.to_image_limits());

    let image = reader.decode().map_err(|source| match source {
        ImageError::Limits(_) => DecodeError::LimitsExceeded { format, source },
        _ => DecodeError::Malformed { format, source },
    })?;

    log::debug!(
        "decoded {:?} image {}x{} ({} bytes)",
        format,
        image.width(),
        image.height(),
        bytes.len()
    );

    Ok(PixelGrid {
        image,
        format: Some(format),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    fn encode(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            let intensity = ((x + y) % 256) as u8;
            Rgb([intensity, intensity, intensity])
        });
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_decodes_png() {
        let bytes = encode(&gradient_image(40, 30), ImageFormat::Png);
        let grid = decode(&bytes, &DecodeLimits::default()).unwrap();

        assert_eq!(grid.width(), 40);
        assert_eq!(grid.height(), 30);
        assert_eq!(grid.format(), Some(ImageFormat::Png));
        assert_eq!(grid.image().color().channel_count(), 3);
    }

    #[test]
    fn test_decodes_jpeg() {
        let bytes = encode(&gradient_image(64, 48), ImageFormat::Jpeg);
        let grid = decode(&bytes, &DecodeLimits::default()).unwrap();

        assert_eq!((grid.width(), grid.height()), (64, 48));
        assert_eq!(grid.format(), Some(ImageFormat::Jpeg));
    }

    #[test]
    fn test_empty_payload_is_rejected() {
        let err = decode(&[], &DecodeLimits::default()).unwrap_err();
        assert!(matches!(err, DecodeError::Empty));
    }

    #[test]
    fn test_non_image_bytes_are_rejected() {
        let err = decode(b"definitely not a png", &DecodeLimits::default()).unwrap_err();
        assert!(matches!(err, DecodeError::UnrecognizedFormat));
    }

    #[test]
    fn test_truncated_png_is_malformed() {
        let bytes = encode(&gradient_image(32, 32), ImageFormat::Png);
        let truncated = &bytes[..bytes.len() / 2];

        let err = decode(truncated, &DecodeLimits::default()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Malformed {
                format: ImageFormat::Png,
                ..
            }
        ));
    }

    #[test]
    fn test_other_formats_are_unsupported() {
        let bytes = encode(&gradient_image(8, 8), ImageFormat::Bmp);
        let err = decode(&bytes, &DecodeLimits::default()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnsupportedFormat {
                format: ImageFormat::Bmp
            }
        ));
    }

    #[test]
    fn test_limits_are_enforced() {
        let bytes = encode(&gradient_image(64, 64), ImageFormat::Png);
        let limits = DecodeLimits {
            max_width: Some(32),
            max_height: Some(32),
            max_alloc: None,
        };

        let err = decode(&bytes, &limits).unwrap_err();
        assert!(matches!(err, DecodeError::LimitsExceeded { .. }));

        assert!(decode(&bytes, &DecodeLimits::default()).is_ok());
    }
}
