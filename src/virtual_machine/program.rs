//! Bytecode image format.
//!
//! ```text
//! [0..8)    start address        u64
//! [8..16)   symbol table start   u64 (always HEADER_LEN)
//! [16..24)  symbol table end     u64
//! [24]      address width        u8, one of 2, 4, 8
//! [start..end)  entries: `width`-byte address + 1-byte DataType tag
//! [end..)       Text, then Data, then Bss
//! ```
//!
//! All integers are big-endian. Addresses are offsets into the body, so the
//! first Text byte is address 0.

use crate::types::encoding::{Decode, DecodeError, Encode, EncodeSink, encode_uint, read_uint};
use crate::virtual_machine::errors::VMError;
use crate::virtual_machine::operand::DataType;
use std::collections::HashMap;

/// Bytes before the first symbol table entry.
pub const HEADER_LEN: usize = 25;

/// Width hint recorded for a referenced symbol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SymbolEntry {
    pub address: u64,
    pub data_type: DataType,
}

/// Decoded bytecode image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    /// Address of `_start`, or 0.
    pub start: u64,
    /// Byte width of each entry's address field.
    pub address_width: u8,
    pub symbols: Vec<SymbolEntry>,
    /// Text, Data and Bss concatenated.
    pub body: Vec<u8>,
}

impl Image {
    /// Builds an image, de-duplicating symbol entries by address and picking
    /// the narrowest address width that holds every entry.
    ///
    /// When several labels share an address, an entry with a recorded width
    /// wins over an `Unset` one.
    pub fn new(start: u64, mut symbols: Vec<SymbolEntry>, body: Vec<u8>) -> Self {
        symbols.sort_by_key(|entry| (entry.address, entry.data_type == DataType::Unset));
        symbols.dedup_by_key(|entry| entry.address);

        let widest = symbols.iter().map(|entry| entry.address).max().unwrap_or(0);
        Self {
            start,
            address_width: DataType::smallest_address_width(widest).size() as u8,
            symbols,
            body,
        }
    }

    /// Offset one past the last symbol table byte.
    pub fn symbol_table_end(&self) -> usize {
        HEADER_LEN + self.symbols.len() * (self.address_width as usize + 1)
    }

    /// Address to DataType map used by the VM for width inference.
    pub fn symbol_table(&self) -> HashMap<u64, DataType> {
        self.symbols
            .iter()
            .map(|entry| (entry.address, entry.data_type))
            .collect()
    }

    /// Parses and validates an image.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, VMError> {
        if bytes.len() < HEADER_LEN {
            return Err(VMError::TruncatedImage {
                needed: HEADER_LEN,
                available: bytes.len(),
            });
        }

        let mut input = bytes;
        let start = u64::decode(&mut input).map_err(truncated)?;
        let table_start = u64::decode(&mut input).map_err(truncated)?;
        let table_end = u64::decode(&mut input).map_err(truncated)?;
        let address_width = u8::decode(&mut input).map_err(truncated)?;

        if !matches!(address_width, 2 | 4 | 8) {
            return Err(VMError::InvalidSymbolTable(format!(
                "address width {address_width} is not 2, 4 or 8"
            )));
        }
        if table_start < HEADER_LEN as u64 || table_start > table_end {
            return Err(VMError::InvalidSymbolTable(format!(
                "bounds {table_start}..{table_end} overlap the header or are reversed"
            )));
        }
        if table_end > bytes.len() as u64 {
            return Err(VMError::TruncatedImage {
                needed: table_end as usize,
                available: bytes.len(),
            });
        }

        let table_start = table_start as usize;
        let table_end = table_end as usize;
        let entry_len = address_width as usize + 1;
        if (table_end - table_start) % entry_len != 0 {
            return Err(VMError::InvalidSymbolTable(format!(
                "{} byte(s) is not a whole number of {entry_len}-byte entries",
                table_end - table_start
            )));
        }

        let mut table = &bytes[table_start..table_end];
        let mut symbols = Vec::with_capacity(table.len() / entry_len);
        while !table.is_empty() {
            let address = read_uint(&mut table, address_width as usize).map_err(truncated)?;
            let tag_offset = (table_end - table.len()) as u64;
            let tag = u8::decode(&mut table).map_err(truncated)?;
            let data_type = DataType::try_from(tag).map_err(|_| VMError::InvalidDataType {
                tag,
                offset: tag_offset,
            })?;
            symbols.push(SymbolEntry { address, data_type });
        }

        Ok(Self {
            start,
            address_width,
            symbols,
            body: bytes[table_end..].to_vec(),
        })
    }
}

impl Encode for Image {
    fn encode<S: EncodeSink>(&self, out: &mut S) {
        self.start.encode(out);
        (HEADER_LEN as u64).encode(out);
        (self.symbol_table_end() as u64).encode(out);
        self.address_width.encode(out);
        for entry in &self.symbols {
            encode_uint(entry.address, self.address_width as usize, out);
            (entry.data_type as u8).encode(out);
        }
        out.write(&self.body);
    }
}

fn truncated(err: DecodeError) -> VMError {
    match err {
        DecodeError::UnexpectedEof { needed, available } => {
            VMError::TruncatedImage { needed, available }
        }
        DecodeError::InvalidValue(message) => VMError::InvalidSymbolTable(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(address: u64, data_type: DataType) -> SymbolEntry {
        SymbolEntry { address, data_type }
    }

    #[test]
    fn header_layout() {
        let image = Image::new(4, vec![entry(6, DataType::Word)], vec![0xAA, 0xBB]);
        let bytes = image.to_bytes();

        assert_eq!(&bytes[0..8], &4u64.to_be_bytes());
        assert_eq!(&bytes[8..16], &25u64.to_be_bytes());
        assert_eq!(&bytes[16..24], &28u64.to_be_bytes());
        assert_eq!(bytes[24], 2);
        assert_eq!(&bytes[25..28], &[0, 6, 2]);
        assert_eq!(&bytes[28..], &[0xAA, 0xBB]);
    }

    #[test]
    fn new_dedups_and_sizes_addresses() {
        let image = Image::new(
            0,
            vec![
                entry(0x1_0000, DataType::Byte),
                entry(3, DataType::Word),
                entry(0x1_0000, DataType::Byte),
            ],
            vec![],
        );
        assert_eq!(image.symbols.len(), 2);
        assert_eq!(image.address_width, 4);
    }

    #[test]
    fn shared_address_keeps_recorded_width() {
        let image = Image::new(
            0,
            vec![entry(28, DataType::Unset), entry(28, DataType::Word)],
            vec![],
        );
        assert_eq!(image.symbols, vec![entry(28, DataType::Word)]);
    }

    #[test]
    fn empty_table_uses_narrowest_width() {
        let image = Image::new(0, vec![], vec![1, 2, 3]);
        assert_eq!(image.address_width, 2);
        assert_eq!(image.symbol_table_end(), HEADER_LEN);
    }

    #[test]
    fn from_bytes_round_trip() {
        let image = Image::new(
            2,
            vec![entry(1, DataType::Dword), entry(9, DataType::Unset)],
            vec![9, 8, 7],
        );
        assert_eq!(Image::from_bytes(&image.to_bytes()).unwrap(), image);
    }

    #[test]
    fn from_bytes_rejects_short_header() {
        assert!(matches!(
            Image::from_bytes(&[0u8; 10]),
            Err(VMError::TruncatedImage {
                needed: HEADER_LEN,
                available: 10
            })
        ));
    }

    #[test]
    fn from_bytes_rejects_bad_width() {
        let mut bytes = Image::new(0, vec![], vec![]).to_bytes();
        bytes[24] = 3;
        assert!(matches!(
            Image::from_bytes(&bytes),
            Err(VMError::InvalidSymbolTable(_))
        ));
    }

    #[test]
    fn from_bytes_rejects_undersized_table() {
        let mut bytes = Image::new(0, vec![entry(1, DataType::Byte)], vec![0; 4]).to_bytes();
        // shrink the table end by one byte so the entry is cut short
        bytes[16..24].copy_from_slice(&27u64.to_be_bytes());
        assert!(matches!(
            Image::from_bytes(&bytes),
            Err(VMError::InvalidSymbolTable(_))
        ));
    }

    #[test]
    fn from_bytes_rejects_table_past_end() {
        let mut bytes = Image::new(0, vec![], vec![]).to_bytes();
        bytes[16..24].copy_from_slice(&100u64.to_be_bytes());
        assert!(matches!(
            Image::from_bytes(&bytes),
            Err(VMError::TruncatedImage { needed: 100, .. })
        ));
    }

    #[test]
    fn from_bytes_rejects_unknown_data_type() {
        let mut bytes = Image::new(0, vec![entry(1, DataType::Byte)], vec![]).to_bytes();
        bytes[27] = 7;
        assert!(matches!(
            Image::from_bytes(&bytes),
            Err(VMError::InvalidDataType { tag: 7, offset: 27 })
        ));
    }
}
