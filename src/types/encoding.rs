//! Big-endian binary encoding shared by the assembler, the image loader and the VM.
//!
//! Every multi-byte integer in a bytecode image is big-endian. Besides the
//! fixed-width [`Encode`]/[`Decode`] impls for `u8..u64`, this module has the
//! variable-width helpers used for operands whose size is chosen by a
//! [`DataType`](crate::virtual_machine::operand::DataType) tag at run time.

use bytevm_derive::Error;

/// Sink for writing encoded bytes.
pub trait EncodeSink {
    /// Writes the given bytes to the sink.
    fn write(&mut self, bytes: &[u8]);
}

impl EncodeSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

/// Counter for computing encoded size without allocating memory.
#[derive(Default)]
pub struct SizeCounter {
    len: usize,
}

impl SizeCounter {
    pub fn len(&self) -> usize {
        self.len
    }
}

impl EncodeSink for SizeCounter {
    fn write(&mut self, bytes: &[u8]) {
        self.len += bytes.len();
    }
}

/// Trait for types that can be serialized to big-endian binary form.
pub trait Encode {
    /// Writes the binary representation to the given sink.
    fn encode<S: EncodeSink>(&self, out: &mut S);

    /// Serializes to a new buffer with exact capacity.
    fn to_bytes(&self) -> Vec<u8> {
        let mut counter = SizeCounter::default();
        self.encode(&mut counter);

        let mut out = Vec::with_capacity(counter.len());
        self.encode(&mut out);
        out
    }
}

/// Errors that can occur during decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input: needed {needed} byte(s), {available} available")]
    UnexpectedEof { needed: usize, available: usize },
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

/// Trait for types that can be deserialized from big-endian binary form.
pub trait Decode: Sized {
    /// Reads a value and advances `input` past the consumed bytes.
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError>;
}

/// Reads exactly `n` bytes from the input, advancing the slice.
pub fn read_bytes<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], DecodeError> {
    if input.len() < n {
        return Err(DecodeError::UnexpectedEof {
            needed: n,
            available: input.len(),
        });
    }
    let (bytes, rest) = input.split_at(n);
    *input = rest;
    Ok(bytes)
}

macro_rules! impl_int {
    ($($t:ty),*) => {
        $(
            impl Encode for $t {
                fn encode<S: EncodeSink>(&self, out: &mut S) {
                    out.write(&self.to_be_bytes());
                }
            }

            impl Decode for $t {
                fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
                    let bytes = read_bytes(input, size_of::<$t>())?;
                    let mut raw = [0u8; size_of::<$t>()];
                    raw.copy_from_slice(bytes);
                    Ok(<$t>::from_be_bytes(raw))
                }
            }
        )*
    };
}

impl_int!(u8, u16, u32, u64);

/// Returns true if `value` can be stored in `width` bytes without loss.
pub const fn fits_in_width(value: u64, width: usize) -> bool {
    width >= 8 || value >> (width * 8) == 0
}

/// Appends the low `width` bytes of `value`, most significant first.
///
/// `width` must be in `1..=8`. Higher bytes of `value` are discarded.
pub fn encode_uint<S: EncodeSink>(value: u64, width: usize, out: &mut S) {
    let bytes = value.to_be_bytes();
    out.write(&bytes[8 - width.min(8)..]);
}

/// Writes the low `dest.len()` bytes of `value` into `dest`, most significant first.
pub fn write_uint(value: u64, dest: &mut [u8]) {
    let bytes = value.to_be_bytes();
    let width = dest.len().min(8);
    dest[..width].copy_from_slice(&bytes[8 - width..]);
}

/// Interprets up to 8 big-endian bytes as an unsigned integer.
pub fn decode_uint(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64)
}

/// Reads a `width`-byte big-endian unsigned integer, advancing the slice.
pub fn read_uint(input: &mut &[u8], width: usize) -> Result<u64, DecodeError> {
    read_bytes(input, width).map(decode_uint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_are_big_endian() {
        assert_eq!(0x0102u16.to_bytes(), vec![0x01, 0x02]);
        assert_eq!(0x01020304u32.to_bytes(), vec![1, 2, 3, 4]);
        assert_eq!(1u64.to_bytes(), vec![0, 0, 0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn decode_advances_cursor() {
        let data = [0x00, 0x2A, 0xFF, 0x01];
        let mut input = &data[..];
        assert_eq!(u16::decode(&mut input).unwrap(), 42);
        assert_eq!(u8::decode(&mut input).unwrap(), 0xFF);
        assert_eq!(input, &[0x01]);
    }

    #[test]
    fn decode_reports_short_input() {
        let mut input = &[0u8; 3][..];
        assert_eq!(
            u64::decode(&mut input),
            Err(DecodeError::UnexpectedEof {
                needed: 8,
                available: 3
            })
        );
    }

    #[test]
    fn encode_uint_truncates_to_width() {
        let mut out = Vec::new();
        encode_uint(0x1122_3344, 2, &mut out);
        assert_eq!(out, vec![0x33, 0x44]);

        out.clear();
        encode_uint(5, 8, &mut out);
        assert_eq!(out, vec![0, 0, 0, 0, 0, 0, 0, 5]);
    }

    #[test]
    fn write_uint_fills_destination() {
        let mut dest = [0xAAu8; 4];
        write_uint(0x0102, &mut dest);
        assert_eq!(dest, [0, 0, 1, 2]);
    }

    #[test]
    fn decode_uint_handles_every_width() {
        assert_eq!(decode_uint(&[]), 0);
        assert_eq!(decode_uint(&[0x7F]), 0x7F);
        assert_eq!(decode_uint(&[0x12, 0x34, 0x56]), 0x123456);
        assert_eq!(decode_uint(&[0xFF; 8]), u64::MAX);
    }

    #[test]
    fn width_limits() {
        assert!(fits_in_width(0xFF, 1));
        assert!(!fits_in_width(0x100, 1));
        assert!(fits_in_width(0xFFFF, 2));
        assert!(!fits_in_width(0x1_0000, 2));
        assert!(fits_in_width(u64::MAX, 8));
    }
}
