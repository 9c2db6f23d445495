//! Boot logo resource.
//!
//! A logo is 1024 bytes: two 512-byte planes holding the same 1-bit bitmap,
//! the first in row-major order and the second in column-major order. Each
//! plane starts with a width/height byte pair; pixels are packed MSB first.

use std::path::Path;

use tracing::debug;

use crate::error::{Error, FormatError};
use crate::protocol::constants::LOGO_SIZE;

const PLANE_SIZE: usize = LOGO_SIZE / 2;
const HEADER_SIZE: usize = 2;

/// Largest pixel count a plane can hold.
pub const MAX_LOGO_PIXELS: u32 = ((PLANE_SIZE - HEADER_SIZE) * 8) as u32;

/// Luminance at or above which a pixel is lit.
pub const LUMA_THRESHOLD: u8 = 32;

/// Dimension rule applied when converting an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoFormat {
    /// Exact dimensions required by the device.
    Fixed { width: u8, height: u8 },
    /// Any size with both sides a multiple of 8 that fits in a plane.
    Generalized,
}

impl LogoFormat {
    /// The classic 64x40 eVic logo.
    pub const DEFAULT: LogoFormat = LogoFormat::Fixed {
        width: 64,
        height: 40,
    };

    pub fn validate(&self, width: u32, height: u32) -> Result<(), FormatError> {
        let ok = match *self {
            LogoFormat::Fixed {
                width: w,
                height: h,
            } => width == w as u32 && height == h as u32,
            LogoFormat::Generalized => {
                width > 0
                    && height > 0
                    && width <= u8::MAX as u32
                    && height <= u8::MAX as u32
                    && width % 8 == 0
                    && height % 8 == 0
                    && width * height <= MAX_LOGO_PIXELS
            }
        };
        if ok {
            Ok(())
        } else {
            Err(FormatError::UnsupportedLogoDimensions { width, height })
        }
    }
}

/// A 1024-byte logo resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logo {
    data: Vec<u8>,
}

impl Logo {
    /// Wrap an existing 1024-byte logo resource.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        if bytes.len() != LOGO_SIZE {
            return Err(FormatError::InvalidLogoSize(bytes.len()));
        }
        Ok(Self {
            data: bytes.to_vec(),
        })
    }

    /// Build a logo from 8-bit grayscale pixels in row-major order.
    pub fn from_luma(
        width: u32,
        height: u32,
        pixels: &[u8],
        invert: bool,
        format: LogoFormat,
    ) -> Result<Self, FormatError> {
        format.validate(width, height)?;
        let (w, h) = (width as usize, height as usize);
        if pixels.len() != w * h {
            return Err(FormatError::ImageDecode(format!(
                "expected {} pixels, got {}",
                w * h,
                pixels.len()
            )));
        }

        let lit = |x: usize, y: usize| (pixels[y * w + x] >= LUMA_THRESHOLD) != invert;

        let mut data = vec![0u8; LOGO_SIZE];
        for plane in [0, PLANE_SIZE] {
            data[plane] = width as u8;
            data[plane + 1] = height as u8;
        }

        for y in 0..h {
            for x in 0..w {
                if lit(x, y) {
                    set_bit(&mut data[HEADER_SIZE..PLANE_SIZE], y * w + x);
                    set_bit(&mut data[PLANE_SIZE + HEADER_SIZE..], x * h + y);
                }
            }
        }

        debug!(width, height, invert, "Logo converted");
        Ok(Self { data })
    }

    /// Decode an image file (PNG, BMP, GIF) and convert it.
    pub fn from_image_file(
        path: impl AsRef<Path>,
        invert: bool,
        format: LogoFormat,
    ) -> Result<Self, Error> {
        let img = image::open(path.as_ref())
            .map_err(|e| FormatError::ImageDecode(e.to_string()))?
            .to_luma8();
        let (width, height) = img.dimensions();
        Ok(Self::from_luma(width, height, img.as_raw(), invert, format)?)
    }

    pub fn width(&self) -> u8 {
        self.data[0]
    }

    pub fn height(&self) -> u8 {
        self.data[1]
    }

    /// Whether pixel (x, y) is lit, read from the row-major plane. `None`
    /// outside the logo or past the end of the plane.
    pub fn pixel(&self, x: usize, y: usize) -> Option<bool> {
        let width = self.width() as usize;
        if x >= width || y >= self.height() as usize {
            return None;
        }
        let index = y * width + x;
        let byte = self.data[HEADER_SIZE..PLANE_SIZE].get(index / 8)?;
        Some(byte & (0x80 >> (index % 8)) != 0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

fn set_bit(buf: &mut [u8], index: usize) {
    buf[index / 8] |= 0x80 >> (index % 8);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker(width: u32, height: u32) -> Vec<u8> {
        (0..height)
            .flat_map(|y| (0..width).map(move |x| if (x + y) % 2 == 0 { 255 } else { 0 }))
            .collect()
    }

    #[test]
    fn test_headers_duplicated() {
        let logo = Logo::from_luma(64, 40, &checker(64, 40), false, LogoFormat::DEFAULT).unwrap();
        let b = logo.as_bytes();
        assert_eq!(b.len(), LOGO_SIZE);
        assert_eq!((b[0], b[1]), (64, 40));
        assert_eq!((b[512], b[513]), (64, 40));
    }

    #[test]
    fn test_row_plane_packing() {
        let logo = Logo::from_luma(64, 40, &checker(64, 40), false, LogoFormat::DEFAULT).unwrap();
        // Row 0 starts lit: 1010_1010
        assert_eq!(logo.as_bytes()[2], 0xAA);
        // Row 1 starts dark: 0101_0101
        assert_eq!(logo.as_bytes()[2 + 8], 0x55);
        assert_eq!(logo.pixel(0, 0), Some(true));
        assert_eq!(logo.pixel(1, 0), Some(false));
        assert_eq!(logo.pixel(1, 1), Some(true));
    }

    #[test]
    fn test_column_plane_packing() {
        let mut pixels = vec![0u8; 64 * 40];
        // Light the whole first column.
        for y in 0..40 {
            pixels[y * 64] = 200;
        }
        let logo = Logo::from_luma(64, 40, &pixels, false, LogoFormat::DEFAULT).unwrap();
        let col = &logo.as_bytes()[514..];
        assert_eq!(&col[..5], &[0xFF; 5]);
        assert_eq!(col[5], 0);
    }

    #[test]
    fn test_threshold_and_invert() {
        let mut pixels = vec![31u8; 64 * 40];
        pixels[0] = 32;
        let logo = Logo::from_luma(64, 40, &pixels, false, LogoFormat::DEFAULT).unwrap();
        assert_eq!(logo.pixel(0, 0), Some(true));
        assert_eq!(logo.pixel(1, 0), Some(false));

        let inverted = Logo::from_luma(64, 40, &pixels, true, LogoFormat::DEFAULT).unwrap();
        assert_eq!(inverted.pixel(0, 0), Some(false));
        assert_eq!(inverted.pixel(1, 0), Some(true));
    }

    #[test]
    fn test_fixed_dimensions_enforced() {
        let err = Logo::from_luma(64, 48, &checker(64, 48), false, LogoFormat::DEFAULT)
            .unwrap_err();
        assert_eq!(
            err,
            FormatError::UnsupportedLogoDimensions {
                width: 64,
                height: 48
            }
        );
    }

    #[test]
    fn test_generalized_dimensions() {
        let f = LogoFormat::Generalized;
        assert!(f.validate(64, 48).is_ok());
        assert!(f.validate(96, 40).is_ok());
        assert!(f.validate(64, 63).is_err());
        assert!(f.validate(128, 64).is_err());
        assert!(f.validate(0, 8).is_err());

        let logo = Logo::from_luma(64, 48, &checker(64, 48), false, f).unwrap();
        assert_eq!((logo.width(), logo.height()), (64, 48));
    }

    #[test]
    fn test_pixel_count_mismatch() {
        assert!(matches!(
            Logo::from_luma(64, 40, &[0u8; 10], false, LogoFormat::DEFAULT),
            Err(FormatError::ImageDecode(_))
        ));
    }

    #[test]
    fn test_from_png_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        let mut img = image::GrayImage::new(64, 40);
        img.put_pixel(3, 0, image::Luma([255]));
        img.save(&path).unwrap();

        let logo = Logo::from_image_file(&path, false, LogoFormat::DEFAULT).unwrap();
        assert_eq!(logo.pixel(3, 0), Some(true));
        assert_eq!(logo.pixel(0, 0), Some(false));
        assert_eq!(logo.as_bytes()[2], 0x10);

        assert!(matches!(
            Logo::from_image_file(dir.path().join("missing.png"), false, LogoFormat::DEFAULT),
            Err(Error::Format(FormatError::ImageDecode(_)))
        ));
    }

    #[test]
    fn test_pixel_out_of_range() {
        let logo = Logo::from_luma(64, 40, &checker(64, 40), false, LogoFormat::DEFAULT).unwrap();
        assert_eq!(logo.pixel(63, 39), Some(false));
        assert_eq!(logo.pixel(64, 0), None);
        assert_eq!(logo.pixel(0, 40), None);

        // Header claims more pixels than a plane holds.
        let mut raw = vec![0u8; LOGO_SIZE];
        raw[0] = 255;
        raw[1] = 255;
        let logo = Logo::from_bytes(&raw).unwrap();
        assert_eq!(logo.pixel(0, 0), Some(false));
        assert_eq!(logo.pixel(254, 254), None);
    }

    #[test]
    fn test_from_bytes() {
        assert!(Logo::from_bytes(&[0u8; LOGO_SIZE]).is_ok());
        assert_eq!(
            Logo::from_bytes(&[0u8; 12]).unwrap_err(),
            FormatError::InvalidLogoSize(12)
        );
    }
}
