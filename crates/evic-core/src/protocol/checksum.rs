//! Additive checksum shared by command frames and the data flash.

/// Sum of all bytes modulo 2^32.
///
/// Detects truncation and corruption only; it is not a MAC.
pub fn checksum(data: &[u8]) -> u32 {
    data.iter().fold(0u32, |acc, &b| acc.wrapping_add(b as u32))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_sum() {
        assert_eq!(checksum(b"HIDC"), 0x48 + 0x49 + 0x44 + 0x43);
        assert_eq!(checksum(&[0xFF; 4]), 0x3FC);
    }

    #[test]
    fn test_order_independent() {
        let data: Vec<u8> = (0..=255u8).collect();
        let mut reversed = data.clone();
        reversed.reverse();
        assert_eq!(checksum(&data), checksum(&reversed));
        assert_eq!(checksum(&data), checksum(&data));
    }

    #[test]
    fn test_large_buffer_no_overflow() {
        let data = vec![0xFFu8; 1 << 20];
        assert_eq!(checksum(&data), 0xFF * (1 << 20));
    }
}
