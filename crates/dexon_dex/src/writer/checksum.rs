//! Header checksum and signature.

use sha1::{Digest, Sha1};

const CHECKSUM_OFFSET: usize = 0x08;
const SIGNATURE_OFFSET: usize = 0x0C;
const SIGNATURE_END: usize = 0x20;

/// Writes the SHA-1 signature and then the Adler-32 checksum into a
/// complete image. The checksum covers the signature, so the order matters.
pub(crate) fn seal_header(image: &mut [u8]) {
    if image.len() <= SIGNATURE_END {
        return;
    }
    let signature = Sha1::digest(&image[SIGNATURE_END..]);
    image[SIGNATURE_OFFSET..SIGNATURE_END].copy_from_slice(&signature[..20]);

    let checksum = adler32(&image[SIGNATURE_OFFSET..]);
    image[CHECKSUM_OFFSET..SIGNATURE_OFFSET].copy_from_slice(&checksum.to_le_bytes());
}

pub(crate) fn adler32(data: &[u8]) -> u32 {
    const MOD: u32 = 65_521;
    // Largest run before `b` can overflow a u32.
    const NMAX: usize = 5552;
    let mut a = 1u32;
    let mut b = 0u32;
    for chunk in data.chunks(NMAX) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= MOD;
        b %= MOD;
    }
    (b << 16) | a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adler32_empty() {
        assert_eq!(adler32(&[]), 1);
    }

    #[test]
    fn adler32_known_value() {
        assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
    }

    #[test]
    fn adler32_long_input_matches_naive() {
        let data: Vec<u8> = (0..20_000u32).map(|i| (i * 31 % 251) as u8).collect();
        let (mut a, mut b) = (1u32, 0u32);
        for &byte in &data {
            a = (a + u32::from(byte)) % 65_521;
            b = (b + a) % 65_521;
        }
        assert_eq!(adler32(&data), (b << 16) | a);
    }

    #[test]
    fn seal_writes_signature_then_checksum() {
        let mut image = vec![0u8; 0x80];
        image[..8].copy_from_slice(b"dex\n035\0");
        for (i, byte) in image.iter_mut().enumerate().skip(0x20) {
            *byte = i as u8;
        }
        seal_header(&mut image);

        let signature = Sha1::digest(&image[0x20..]);
        assert_eq!(&image[0x0C..0x20], &signature[..]);
        let checksum = u32::from_le_bytes([image[8], image[9], image[10], image[11]]);
        assert_eq!(checksum, adler32(&image[0x0C..]));
    }

    #[test]
    fn short_buffer_untouched() {
        let mut image = vec![0u8; 0x10];
        seal_header(&mut image);
        assert!(image.iter().all(|&b| b == 0));
    }
}
