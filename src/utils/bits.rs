use crate::error::{ReformError, Result};

/// A bit-level reader over a borrowed byte buffer.
///
/// Reads are MSB-first and never look past the end of the slice; a read that
/// would need more bits than remain fails with [`ReformError::Eof`] and leaves
/// the cursor where it was.
///
/// ```
/// use tsreform::utils::BitReader;
///
/// let data = [0b10110011];
/// let mut reader = BitReader::new(&data);
///
/// assert_eq!(reader.read_bit().unwrap(), true);
/// assert_eq!(reader.read_bits(3).unwrap(), 0b011);
/// ```
pub struct BitReader<'a> {
    data: &'a [u8],
    byte_offset: usize,
    bit_offset: u8,
}

impl<'a> BitReader<'a> {
    /// Creates a new BitReader from a byte slice
    pub fn new(data: &'a [u8]) -> Self {
        BitReader {
            data,
            byte_offset: 0,
            bit_offset: 0,
        }
    }

    /// Reads a single bit. Returns true for 1, false for 0.
    pub fn read_bit(&mut self) -> Result<bool> {
        if self.byte_offset >= self.data.len() {
            return Err(ReformError::Eof);
        }

        let bit = (self.data[self.byte_offset] >> (7 - self.bit_offset)) & 1;
        self.bit_offset += 1;

        if self.bit_offset == 8 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }

        Ok(bit == 1)
    }

    /// Reads `n` bits (n <= 32) as a big-endian number.
    pub fn read_bits(&mut self, n: u32) -> Result<u32> {
        if n > 32 {
            return Err(ReformError::Codec(format!("cannot read {} bits at once", n)));
        }
        if self.available_bits() < n as usize {
            return Err(ReformError::Eof);
        }

        let mut value = 0u64;
        let mut remaining = n;
        while remaining > 0 {
            let left_in_byte = 8 - self.bit_offset as u32;
            let take = left_in_byte.min(remaining);
            let byte = self.data[self.byte_offset] as u64;
            let shift = left_in_byte - take;
            let bits = (byte >> shift) & ((1u64 << take) - 1);
            value = (value << take) | bits;

            self.bit_offset += take as u8;
            if self.bit_offset == 8 {
                self.bit_offset = 0;
                self.byte_offset += 1;
            }
            remaining -= take;
        }

        Ok(value as u32)
    }

    /// Reads `n` bits (n <= 64). Used for 33-bit timestamps.
    pub fn read_bits_u64(&mut self, n: u32) -> Result<u64> {
        if n > 64 {
            return Err(ReformError::Codec(format!("cannot read {} bits at once", n)));
        }
        if n <= 32 {
            return Ok(self.read_bits(n)? as u64);
        }
        if self.available_bits() < n as usize {
            return Err(ReformError::Eof);
        }
        let high = self.read_bits(n - 32)? as u64;
        let low = self.read_bits(32)? as u64;
        Ok((high << 32) | low)
    }

    /// Reads an unsigned exponential Golomb code, ue(v).
    ///
    /// Counts `k` leading zero bits, then reads `k` more bits; the value is
    /// `2^k - 1 + suffix`.
    pub fn read_golomb(&mut self) -> Result<u32> {
        let start = (self.byte_offset, self.bit_offset);
        let mut leading_zeros = 0;
        loop {
            match self.read_bit() {
                Ok(true) => break,
                Ok(false) => {
                    leading_zeros += 1;
                    if leading_zeros > 31 {
                        (self.byte_offset, self.bit_offset) = start;
                        return Err(ReformError::Codec("invalid Golomb code".into()));
                    }
                }
                Err(e) => {
                    (self.byte_offset, self.bit_offset) = start;
                    return Err(e);
                }
            }
        }

        if leading_zeros == 0 {
            return Ok(0);
        }

        match self.read_bits(leading_zeros) {
            Ok(info) => Ok(((1u64 << leading_zeros) + info as u64 - 1) as u32),
            Err(e) => {
                (self.byte_offset, self.bit_offset) = start;
                Err(e)
            }
        }
    }

    /// Reads a signed exponential Golomb code, se(v).
    ///
    /// Maps the unsigned code `k` to `(-1)^(k+1) * ceil(k/2)`.
    pub fn read_signed_golomb(&mut self) -> Result<i32> {
        let k = self.read_golomb()?;
        if k == 0 {
            return Ok(0);
        }

        let magnitude = ((k as u64 + 1) >> 1) as i32;
        let sign = if k & 1 == 1 { 1 } else { -1 };
        Ok(sign * magnitude)
    }

    /// Skips `n` bits.
    pub fn skip_bits(&mut self, n: usize) -> Result<()> {
        if self.available_bits() < n {
            return Err(ReformError::Eof);
        }
        let pos = self.position() + n;
        self.byte_offset = pos / 8;
        self.bit_offset = (pos % 8) as u8;
        Ok(())
    }

    /// Skips to the next byte boundary.
    pub fn align_byte(&mut self) {
        if self.bit_offset != 0 {
            self.bit_offset = 0;
            self.byte_offset += 1;
        }
    }

    /// Whether the cursor sits on a byte boundary.
    pub fn is_aligned(&self) -> bool {
        self.bit_offset == 0
    }

    /// Current cursor position in bits from the start of the buffer.
    pub fn position(&self) -> usize {
        self.byte_offset * 8 + self.bit_offset as usize
    }

    /// Number of bits left to read.
    pub fn available_bits(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.position())
    }

    /// H.264 `more_rbsp_data()`: true while anything other than the trailing
    /// stop bit and its zero padding remains.
    pub fn more_rbsp_data(&self) -> bool {
        let pos = self.position();
        let total = self.data.len() * 8;
        if pos >= total {
            return false;
        }
        let last_one = self
            .data
            .iter()
            .rposition(|&b| b != 0)
            .map(|i| i * 8 + 7 - self.data[i].trailing_zeros() as usize);
        match last_one {
            Some(stop_bit) => pos < stop_bit,
            None => false,
        }
    }
}

/// MSB-first bit writer accumulating into a growable buffer.
///
/// ```
/// use tsreform::utils::BitWriter;
///
/// let mut writer = BitWriter::new();
/// writer.write_bits(0b101, 3);
/// writer.byte_align(true);
/// assert_eq!(writer.finish().unwrap(), vec![0b1011_1111]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    data: Vec<u8>,
    current: u8,
    bit_count: u8,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            data: Vec::with_capacity(bytes),
            current: 0,
            bit_count: 0,
        }
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.current = (self.current << 1) | bit as u8;
        self.bit_count += 1;
        if self.bit_count == 8 {
            self.data.push(self.current);
            self.current = 0;
            self.bit_count = 0;
        }
    }

    /// Writes the low `n` bits of `value` (n <= 32), most significant first.
    pub fn write_bits(&mut self, value: u32, n: u32) {
        debug_assert!(n <= 32);
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    /// Writes the low `n` bits of a 64-bit value (n <= 64).
    pub fn write_bits_u64(&mut self, value: u64, n: u32) {
        debug_assert!(n <= 64);
        for i in (0..n).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bit_count == 0 {
            self.data.extend_from_slice(bytes);
        } else {
            for &b in bytes {
                self.write_bits(b as u32, 8);
            }
        }
    }

    /// Writes ue(v).
    pub fn write_golomb(&mut self, value: u32) {
        let coded = value as u64 + 1;
        let len = 64 - coded.leading_zeros();
        for _ in 0..len - 1 {
            self.write_bit(false);
        }
        self.write_bits_u64(coded, len);
    }

    /// Writes se(v).
    pub fn write_signed_golomb(&mut self, value: i32) {
        let k = if value > 0 {
            (value as u32) * 2 - 1
        } else {
            value.unsigned_abs() * 2
        };
        self.write_golomb(k);
    }

    /// Copies `n` bits out of a reader, in chunks of up to 32.
    pub fn copy_bits(&mut self, reader: &mut BitReader<'_>, mut n: usize) -> Result<()> {
        while n > 0 {
            let take = n.min(32) as u32;
            let v = reader.read_bits(take)?;
            self.write_bits(v, take);
            n -= take as usize;
        }
        Ok(())
    }

    /// Pads to the next byte boundary with `pad` bits.
    pub fn byte_align(&mut self, pad: bool) {
        while self.bit_count != 0 {
            self.write_bit(pad);
        }
    }

    pub fn is_aligned(&self) -> bool {
        self.bit_count == 0
    }

    pub fn bits_written(&self) -> usize {
        self.data.len() * 8 + self.bit_count as usize
    }

    /// Returns the written bytes; fails unless the writer is byte aligned.
    pub fn finish(self) -> Result<Vec<u8>> {
        if self.bit_count != 0 {
            return Err(ReformError::Codec(format!(
                "flush at non byte boundary ({} dangling bits)",
                self.bit_count
            )));
        }
        Ok(self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_read_bits() {
        let data = [0b10110011];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(5).unwrap(), 0b10011);

        // cross-byte boundary
        let data = [0b10110011, 0b01011010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(3).unwrap(), 0b101);
        assert_eq!(reader.read_bits(8).unwrap(), 0b10011010);

        let data = [0b10101010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(0).unwrap(), 0);

        let data = [0xFF];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_bits(33).is_err());

        let data = [0b10110011, 0b11001100, 0b10101010];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(20).unwrap(), 0b10110011110011001010);

        let data = [0xDE, 0xAD, 0xBE, 0xEF, 0x80];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.read_bits(32).unwrap(), 0xDEADBEEF);
        assert!(reader.read_bit().unwrap());
    }

    #[test]
    fn test_read_golomb() {
        let test_cases = [
            ([0b10000000], 0, "1"),
            ([0b01000000], 1, "010"),
            ([0b01100000], 2, "011"),
            ([0b00100000], 3, "00100"),
            ([0b00110000], 5, "00110"),
            ([0b00101000], 4, "00101"),
            ([0b00111000], 6, "00111"),
            ([0b00010000], 7, "0001000"),
            ([0b00010010], 8, "0001001"),
        ];

        for (input, expected, pattern) in test_cases.iter() {
            let mut reader = BitReader::new(input);
            let result = reader.read_golomb().unwrap();
            assert_eq!(result, *expected, "Failed for pattern {}", pattern);

            let mut writer = BitWriter::new();
            writer.write_golomb(*expected);
            writer.byte_align(false);
            assert_eq!(&writer.finish().unwrap()[..], &input[..]);
        }

        let data = [0x00];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_golomb().is_err());
    }

    #[test]
    fn test_signed_golomb() {
        let test_cases = [
            ([0b10000000], 0),
            ([0b01000000], 1),
            ([0b01100000], -1),
            ([0b00100000], 2),
            ([0b00101000], -2),
            ([0b00110000], 3),
            ([0b00111000], -3),
            ([0b00010000], 4),
            ([0b00010010], -4),
        ];

        for (input, expected) in test_cases.iter() {
            let mut reader = BitReader::new(input);
            assert_eq!(reader.read_signed_golomb().unwrap(), *expected);
        }
    }

    #[test]
    fn test_error_cases() {
        let data = [0xFF];
        let mut reader = BitReader::new(&data);
        reader.read_bits(8).unwrap();
        assert!(matches!(reader.read_bit(), Err(ReformError::Eof)));

        // 40 zeros
        let data = vec![0; 5];
        let mut reader = BitReader::new(&data);
        assert!(reader.read_golomb().is_err());

        // a failed read leaves the cursor in place
        let data = [0xAB, 0xCD];
        let mut reader = BitReader::new(&data);
        reader.read_bits(4).unwrap();
        assert!(reader.read_bits(13).is_err());
        assert_eq!(reader.position(), 4);
        assert!(reader.skip_bits(13).is_err());
        assert_eq!(reader.read_bits(12).unwrap(), 0xBCD);

        let data = [0xFF, 0x00];
        let mut reader = BitReader::new(&data);
        reader.read_bits(3).unwrap();
        assert_eq!(reader.position(), 3);
        reader.align_byte();
        assert_eq!(reader.position(), 8);
        assert_eq!(reader.available_bits(), 8);
    }

    #[test]
    fn test_more_rbsp_data() {
        // payload bit, then stop bit
        let data = [0b1100_0000];
        let mut reader = BitReader::new(&data);
        assert!(reader.more_rbsp_data());
        reader.read_bit().unwrap();
        assert!(!reader.more_rbsp_data());
    }

    #[test]
    fn test_writer_alignment() {
        let mut writer = BitWriter::new();
        writer.write_bits(0b1, 1);
        assert!(!writer.is_aligned());
        assert_eq!(writer.bits_written(), 1);
        assert!(writer.clone().finish().is_err());

        writer.byte_align(false);
        writer.write_bits(0xABC, 12);
        writer.byte_align(true);
        assert_eq!(writer.finish().unwrap(), vec![0x80, 0xAB, 0xCF]);
    }

    #[test]
    fn test_copy_bits() {
        let src = [0b1010_1100, 0b0101_0011, 0xFF];
        let mut reader = BitReader::new(&src);
        reader.skip_bits(3).unwrap();
        let mut writer = BitWriter::new();
        writer.copy_bits(&mut reader, 13).unwrap();
        writer.write_bits(0, 3);
        assert_eq!(writer.finish().unwrap(), vec![0b0110_0010, 0b1001_1000]);
    }

    #[quickcheck]
    fn prop_read_bits_matches_manual(data: Vec<u8>, n: u8) -> bool {
        let n = (n % 33) as usize;
        let mut reader = BitReader::new(&data);
        match reader.read_bits(n as u32) {
            Ok(result) => {
                let mut expected = 0u64;
                for i in 0..n {
                    let bit = (data[i / 8] >> (7 - (i % 8))) & 1;
                    expected = (expected << 1) | bit as u64;
                }
                result as u64 == expected
            }
            Err(_) => data.len() * 8 < n,
        }
    }

    #[quickcheck]
    fn prop_golomb_round_trip(values: Vec<u32>, signed: Vec<i16>) -> bool {
        let values: Vec<u32> = values.into_iter().map(|v| v >> 1).collect();
        let mut writer = BitWriter::new();
        for &v in &values {
            writer.write_golomb(v);
        }
        for &s in &signed {
            writer.write_signed_golomb(s as i32);
        }
        writer.byte_align(false);
        let encoded = writer.finish().unwrap();

        let mut reader = BitReader::new(&encoded);
        values.iter().all(|&v| reader.read_golomb().ok() == Some(v))
            && signed
                .iter()
                .all(|&s| reader.read_signed_golomb().ok() == Some(s as i32))
    }

    #[quickcheck]
    fn prop_writer_reader_fixed_width(fields: Vec<(u32, u8)>) -> bool {
        let fields: Vec<(u32, u32)> = fields
            .into_iter()
            .map(|(v, n)| {
                let n = (n % 32) as u32 + 1;
                let mask = if n == 32 { u32::MAX } else { (1u32 << n) - 1 };
                (v & mask, n)
            })
            .collect();
        let mut writer = BitWriter::new();
        for &(v, n) in &fields {
            writer.write_bits(v, n);
        }
        writer.byte_align(false);
        let bytes = writer.finish().unwrap();
        let mut reader = BitReader::new(&bytes);
        fields.iter().all(|&(v, n)| reader.read_bits(n).ok() == Some(v))
    }
}
