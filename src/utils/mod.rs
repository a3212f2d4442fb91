//! # Utility Functions and Types
//!
//! Bit-level reading/writing used by every codec parser, and the MPEG-2
//! CRC32 used to validate PSI sections.
//!
//! ```rust
//! use tsreform::utils::{BitReader, BitWriter};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut writer = BitWriter::new();
//! writer.write_golomb(5);
//! writer.byte_align(false);
//! let bytes = writer.finish()?;
//!
//! let mut reader = BitReader::new(&bytes);
//! assert_eq!(reader.read_golomb()?, 5);
//! # Ok(())
//! # }
//! ```

/// Bitstream reader and writer
pub mod bits;

/// MPEG-2 CRC32
pub mod crc;

pub use bits::*;
pub use crc::{crc32_mpeg2, section_crc_ok};

/// Greatest common divisor, never zero.
pub fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a.max(1)
    } else {
        gcd(b, a % b)
    }
}
