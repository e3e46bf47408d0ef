//! Utility functions and supporting infrastructure.
//!
//! Provides the byte cursor, bit-level reading, CRC validation and error
//! types shared by the demultiplexing pipeline.

pub mod bitstream_io;
pub mod crc;
pub mod cursor;
pub mod errors;
#[cfg(any(test, feature = "fixtures"))]
pub mod fixture;
