//! 8-bit payload checksum shared by the cartridge and the host.
//!
//! The cartridge firmware uses CRC-8 with polynomial 0x07, a zero seed and no
//! reflection or final XOR, which is `CRC_8_SMBUS` in the `crc` catalogue.

use crc::{CRC_8_SMBUS, Crc, Digest};

static CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Running checksum over a byte stream.
///
/// The state is an ordinary value: create it with [`Checksum::new`], feed it
/// with [`Checksum::update`] as bytes arrive and consume it with
/// [`Checksum::finalize`].
#[derive(Clone)]
pub struct Checksum {
    digest: Digest<'static, u8>,
}

impl Checksum {
    pub fn new() -> Self {
        Self {
            digest: CRC8.digest(),
        }
    }

    pub fn update(&mut self, bytes: &[u8]) {
        self.digest.update(bytes);
    }

    pub fn push(&mut self, byte: u8) {
        self.digest.update(&[byte]);
    }

    pub fn finalize(self) -> u8 {
        self.digest.finalize()
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Checksum {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Checksum").finish_non_exhaustive()
    }
}

/// Checksum of a complete payload.
pub fn checksum(bytes: &[u8]) -> u8 {
    CRC8.checksum(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_payload_is_seed() {
        assert_eq!(checksum(&[]), 0x00);
        assert_eq!(Checksum::new().finalize(), 0x00);
    }

    #[test]
    fn catalogue_check_value() {
        assert_eq!(checksum(b"123456789"), 0xF4);
    }

    #[test]
    fn streaming_matches_one_shot() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut sum = Checksum::new();
        for chunk in data.chunks(7) {
            sum.update(chunk);
        }
        assert_eq!(sum.finalize(), checksum(&data));

        let mut sum = Checksum::new();
        data.iter().for_each(|&b| sum.push(b));
        assert_eq!(sum.finalize(), checksum(&data));
    }

    #[test]
    fn repeated_runs_agree() {
        let data = b"SEGA SEGASATURN ";
        assert_eq!(checksum(data), checksum(data));
    }

    #[test]
    fn order_matters() {
        assert_ne!(checksum(&[0x01, 0x02, 0x03]), checksum(&[0x03, 0x02, 0x01]));
    }

    #[test]
    fn single_byte_corruption_is_detected() {
        let data: Vec<u8> = (0..200u32).map(|i| (i * 7) as u8).collect();
        let reference = checksum(&data);
        for i in 0..data.len() {
            let mut corrupted = data.clone();
            corrupted[i] ^= 0x5A;
            assert_ne!(checksum(&corrupted), reference, "corruption at {i}");
        }
    }
}
