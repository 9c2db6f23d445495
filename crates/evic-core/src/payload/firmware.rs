//! APROM firmware images.
//!
//! Vendor images are distributed with a position-dependent XOR cipher. The
//! keystream depends only on the image length and byte index, so the same
//! transform both encrypts and decrypts.

use std::borrow::Cow;

use tracing::debug;

use crate::error::FormatError;
use crate::protocol::constants::{APROM_MARKER, CIPHER_KEY};

/// Whether an image buffer is still ciphered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Encrypted,
    Plain,
}

/// Apply the firmware cipher. `convert(&convert(x)) == x`.
pub fn convert(data: &[u8]) -> Vec<u8> {
    let n = data.len();
    let base = n.wrapping_add(CIPHER_KEY).wrapping_sub(n / CIPHER_KEY);
    data.iter()
        .enumerate()
        .map(|(i, &b)| b ^ (base.wrapping_add(i) & 0xFF) as u8)
        .collect()
}

/// Decode the maximum supported hardware version stored after a product ID.
///
/// One decimal digit per byte: `[1, 1, 1]` is hardware 1.11 (111).
pub fn decode_max_hw_version(digits: [u8; 3]) -> u32 {
    digits[0] as u32 * 100 + digits[1] as u32 * 10 + digits[2] as u32
}

/// Result of a successful firmware verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareMatch {
    /// Product ID found in the image.
    pub product_id: String,
    /// Offset of its first occurrence.
    pub offset: usize,
    /// Highest hardware version the image supports.
    pub max_hw_version: u32,
}

/// An immutable firmware image buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage {
    data: Vec<u8>,
    encoding: Encoding,
}

impl FirmwareImage {
    pub fn new(data: Vec<u8>, encoding: Encoding) -> Self {
        Self { data, encoding }
    }

    /// Image as distributed by the vendor.
    pub fn encrypted(data: Vec<u8>) -> Self {
        Self::new(data, Encoding::Encrypted)
    }

    pub fn plain(data: Vec<u8>) -> Self {
        Self::new(data, Encoding::Plain)
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Decrypted copy of this image (a clone if already plain).
    pub fn to_plain(&self) -> FirmwareImage {
        match self.encoding {
            Encoding::Plain => self.clone(),
            Encoding::Encrypted => Self::plain(convert(&self.data)),
        }
    }

    /// Encrypted copy of this image (a clone if already encrypted).
    pub fn to_encrypted(&self) -> FirmwareImage {
        match self.encoding {
            Encoding::Encrypted => self.clone(),
            Encoding::Plain => Self::encrypted(convert(&self.data)),
        }
    }

    fn plain_bytes(&self) -> Cow<'_, [u8]> {
        match self.encoding {
            Encoding::Plain => Cow::Borrowed(&self.data),
            Encoding::Encrypted => Cow::Owned(convert(&self.data)),
        }
    }

    /// Whether the plain image contains `needle`.
    pub fn contains(&self, needle: &[u8]) -> bool {
        find(&self.plain_bytes(), needle).is_some()
    }

    /// Verify the image against a device.
    ///
    /// Checks the manufacturer marker, then looks for the candidate product
    /// IDs in order. The three bytes after the first hit hold the highest
    /// supported hardware version, which must not be below `hw_version`.
    pub fn verify<S: AsRef<str>>(
        &self,
        candidates: &[S],
        hw_version: u32,
    ) -> Result<FirmwareMatch, FormatError> {
        let data = self.plain_bytes();

        if find(&data, APROM_MARKER).is_none() {
            return Err(FormatError::ManufacturerMismatch);
        }

        let (product_id, offset) = candidates
            .iter()
            .find_map(|id| {
                let id = id.as_ref();
                find(&data, id.as_bytes()).map(|pos| (id.to_string(), pos))
            })
            .ok_or_else(|| FormatError::UnsupportedDevice {
                candidates: candidates.iter().map(|c| c.as_ref().to_string()).collect(),
            })?;

        let start = offset + product_id.len();
        let max_hw_version = data
            .get(start..start + 3)
            .map(|d| decode_max_hw_version([d[0], d[1], d[2]]))
            .unwrap_or(0);

        debug!(
            product_id = %product_id,
            offset,
            max_hw_version,
            hw_version,
            "Firmware product ID located"
        );

        if max_hw_version < hw_version {
            return Err(FormatError::HardwareVersionTooOld {
                max: max_hw_version,
                actual: hw_version,
            });
        }

        Ok(FirmwareMatch {
            product_id,
            offset,
            max_hw_version,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Position of the first occurrence of `needle` in `haystack`.
pub(crate) fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plain() -> Vec<u8> {
        let mut data = vec![0xA5u8; 256];
        data.extend_from_slice(APROM_MARKER);
        data.extend_from_slice(&[0u8; 32]);
        data.extend_from_slice(b"E052");
        data.extend_from_slice(&[1, 1, 1]);
        data.extend_from_slice(&[0x5Au8; 200]);
        data
    }

    #[test]
    fn test_convert_involution() {
        for len in [0usize, 1, 63, 4096, CIPHER_KEY + 17] {
            let data: Vec<u8> = (0..len).map(|i| (i * 7 + 3) as u8).collect();
            assert_eq!(convert(&convert(&data)), data, "len={len}");
        }
        assert!(convert(&[]).is_empty());
    }

    #[test]
    fn test_convert_keystream() {
        // n=4, floor(4 / 408376) = 0, keystream starts at (4 + 408376) mod 256
        let ks0 = ((4 + CIPHER_KEY) & 0xFF) as u8;
        let out = convert(&[0, 0, 0, 0]);
        assert_eq!(out[0], ks0);
        assert_eq!(out[1], ks0.wrapping_add(1));
        assert_eq!(out[3], ks0.wrapping_add(3));
    }

    #[test]
    fn test_convert_large_image_subtracts_quotient() {
        let n = CIPHER_KEY * 2;
        let out = convert(&vec![0u8; n]);
        let expected = ((n + CIPHER_KEY - 2) & 0xFF) as u8;
        assert_eq!(out[0], expected);
    }

    #[test]
    fn test_decode_max_hw_version() {
        assert_eq!(decode_max_hw_version([1, 1, 1]), 111);
        assert_eq!(decode_max_hw_version([1, 0, 3]), 103);
        assert_eq!(decode_max_hw_version([0, 0, 0]), 0);
    }

    #[test]
    fn test_encrypt_decrypt_verify() {
        let plain = FirmwareImage::plain(sample_plain());
        let encrypted = plain.to_encrypted();
        assert_ne!(encrypted.as_bytes(), plain.as_bytes());

        let decrypted = encrypted.to_plain();
        assert_eq!(decrypted, plain);

        let m = decrypted.verify(&["E052"], 106).unwrap();
        assert_eq!(m.product_id, "E052");
        assert_eq!(m.max_hw_version, 111);
        assert_eq!(m.offset, 256 + APROM_MARKER.len() + 32);

        // Encrypted images are verified on their plain bytes.
        assert!(encrypted.verify(&["E052"], 111).is_ok());
    }

    #[test]
    fn test_verify_wrong_device() {
        let fw = FirmwareImage::plain(sample_plain());
        let err = fw.verify(&["W007"], 106).unwrap_err();
        assert_eq!(
            err,
            FormatError::UnsupportedDevice {
                candidates: vec!["W007".to_string()]
            }
        );
    }

    #[test]
    fn test_verify_hw_too_new() {
        let fw = FirmwareImage::plain(sample_plain());
        let err = fw.verify(&["E052"], 999).unwrap_err();
        assert_eq!(
            err,
            FormatError::HardwareVersionTooOld {
                max: 111,
                actual: 999
            }
        );
    }

    #[test]
    fn test_verify_missing_marker() {
        let fw = FirmwareImage::plain(b"E052\x01\x01\x01".to_vec());
        assert_eq!(
            fw.verify(&["E052"], 100).unwrap_err(),
            FormatError::ManufacturerMismatch
        );
    }

    #[test]
    fn test_verify_candidate_order() {
        let mut data = sample_plain();
        data.extend_from_slice(b"W007");
        data.extend_from_slice(&[1, 0, 6]);
        let fw = FirmwareImage::plain(data);

        let m = fw.verify(&["W007", "E052"], 100).unwrap();
        assert_eq!(m.product_id, "W007");
        assert_eq!(m.max_hw_version, 106);
    }

    #[test]
    fn test_verify_id_at_end_of_image() {
        let mut data = APROM_MARKER.to_vec();
        data.extend_from_slice(b"E052\x01");
        let fw = FirmwareImage::plain(data);
        assert!(matches!(
            fw.verify(&["E052"], 1),
            Err(FormatError::HardwareVersionTooOld { max: 0, .. })
        ));
    }

    #[test]
    fn test_contains() {
        let fw = FirmwareImage::plain(sample_plain()).to_encrypted();
        assert!(fw.contains(b"E052"));
        assert!(!fw.contains(b"W007"));
    }
}
