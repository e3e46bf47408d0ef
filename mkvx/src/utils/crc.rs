//! CRC validation utilities for audio frames.
//!
//! Table-driven CRC-16 in the non-reflected, augmented form: feeding a
//! message followed by its checksum leaves a zero register, which is how
//! AC-3 `crc2`, E-AC-3 and FLAC frame checksums are verified. AC-3 `crc1`
//! sits in front of the bytes it protects and is checked the same way.
//!
//! FLAC frame headers carry their own CRC-8.

/// CRC parameters: polynomial and initial register value.
pub struct Algorithm<T> {
    poly: T,
    init: T,
}

/// CRC-16 algorithm of ATSC A/52 (AC-3 and E-AC-3 frame checks).
pub const CRC_AC3_ALG: Algorithm<u16> = Algorithm {
    poly: 0x8005,
    init: 0x0000,
};

/// CRC-8 of FLAC frame headers.
pub const CRC_FLAC8_ALG: Algorithm<u8> = Algorithm {
    poly: 0x07,
    init: 0x00,
};

/// Computes CRC-16 checksum using specified polynomial.
#[inline(always)]
pub const fn crc16(poly: u16, mut value: u16, len: usize) -> u16 {
    value <<= 8;

    let mut i = 0;
    while i < len {
        value = (value << 1) ^ (((value >> 15) & 1) * poly);
        i += 1;
    }

    value
}

#[inline(always)]
const fn crc16_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < table.len() {
        table[i] = crc16(poly, i as u16, 8);
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc16 {
    pub poly: u16,
    pub init: u16,
    table: [u16; 256],
}

impl Crc16 {
    pub const fn new(algorithm: &Algorithm<u16>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            table: crc16_table(algorithm.poly),
        }
    }

    const fn table_entry(&self, index: u16) -> u16 {
        self.table[(index & 0xFF) as usize]
    }

    #[inline(always)]
    pub const fn update(&self, mut crc: u16, bytes: &[u8]) -> u16 {
        let mut i = 0;

        while i < bytes.len() {
            crc = self.table_entry(crc >> 8) ^ (crc << 8) ^ bytes[i] as u16;
            i += 1;
        }

        crc
    }

    /// Register value after `bytes`; zero when `bytes` ends with a valid checksum.
    #[inline(always)]
    pub const fn residue(&self, bytes: &[u8]) -> u16 {
        self.update(self.init, bytes)
    }

    /// The checksum to append to `bytes` so that [`Crc16::residue`] becomes zero.
    pub const fn checksum(&self, bytes: &[u8]) -> u16 {
        self.update(self.residue(bytes), &[0, 0])
    }

    /// The checksum to prepend to `bytes` so that [`Crc16::residue`] becomes zero.
    ///
    /// Only defined for a zero initial register.
    pub const fn prefix_checksum(&self, bytes: &[u8]) -> u16 {
        // x^-1 modulo the polynomial
        let inverse = (self.poly >> 1) | 0x8000;
        let mut crc = self.residue(bytes);

        let mut i = 0;
        while i < bytes.len() * 8 {
            crc = (crc >> 1) ^ ((crc & 1) * inverse);
            i += 1;
        }

        crc
    }
}

pub static CRC_AC3: Crc16 = Crc16::new(&CRC_AC3_ALG);

const fn crc8_table(poly: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < table.len() {
        let mut value = i as u8;
        let mut bit = 0;
        while bit < 8 {
            value = (value << 1) ^ (((value >> 7) & 1) * poly);
            bit += 1;
        }
        table[i] = value;
        i += 1;
    }

    table
}

#[derive(Debug)]
pub struct Crc8 {
    pub poly: u8,
    pub init: u8,
    table: [u8; 256],
}

impl Crc8 {
    pub const fn new(algorithm: &Algorithm<u8>) -> Self {
        Self {
            poly: algorithm.poly,
            init: algorithm.init,
            table: crc8_table(algorithm.poly),
        }
    }

    pub const fn checksum(&self, bytes: &[u8]) -> u8 {
        let mut crc = self.init;

        let mut i = 0;
        while i < bytes.len() {
            crc = self.table[(crc ^ bytes[i]) as usize];
            i += 1;
        }

        crc
    }
}

pub static CRC_FLAC8: Crc8 = Crc8::new(&CRC_FLAC8_ALG);

#[test]
fn ac3_crc_check_value() {
    // CRC-16/UMTS check value
    assert_eq!(CRC_AC3.checksum(b"123456789"), 0xFEE8);
}

#[test]
fn flac_crc8_check_value() {
    // CRC-8/SMBUS check value
    assert_eq!(CRC_FLAC8.checksum(b"123456789"), 0xF4);
    assert_eq!(CRC_FLAC8.checksum(&[]), 0);
}

#[test]
fn prepended_checksum_zeroes_residue() {
    let payload: Vec<u8> = (0..150u32).map(|i| (i * 13 + 5) as u8).collect();
    let crc = CRC_AC3.prefix_checksum(&payload);

    let mut data = crc.to_be_bytes().to_vec();
    data.extend_from_slice(&payload);
    assert_eq!(CRC_AC3.residue(&data), 0);

    data[40] ^= 0x01;
    assert_ne!(CRC_AC3.residue(&data), 0);
}

#[test]
fn appended_checksum_zeroes_residue() {
    let mut data: Vec<u8> = (0..200u32).map(|i| (i * 7 + 3) as u8).collect();
    let crc = CRC_AC3.checksum(&data);
    data.extend_from_slice(&crc.to_be_bytes());

    assert_eq!(CRC_AC3.residue(&data), 0);

    data[17] ^= 0x10;
    assert_ne!(CRC_AC3.residue(&data), 0);
}
