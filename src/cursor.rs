use byteorder::{ByteOrder, LittleEndian};

use crate::error::ReadError;

/// The width of address-sized fields, as selected by the stream header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WordSize {
    Four,
    Eight,
}

impl WordSize {
    /// The header flag byte for this word size.
    pub fn flag(self) -> u8 {
        match self {
            WordSize::Eight => 0,
            WordSize::Four => 1,
        }
    }

    pub fn from_flag(flag: u8) -> Option<Self> {
        match flag {
            0 => Some(WordSize::Eight),
            1 => Some(WordSize::Four),
            _ => None,
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            WordSize::Four => 4,
            WordSize::Eight => 8,
        }
    }
}

/// Little-endian reads over a byte slice.
///
/// Every read either returns a value and advances, or returns
/// [`ReadError::NeedMoreData`] and leaves the position untouched. This lets
/// a caller which only has part of a stream buffered retry the same read once
/// more bytes have arrived.
#[derive(Debug, Clone)]
pub struct BinaryCursor<'a> {
    data: &'a [u8],
    pos: usize,
    base_offset: u64,
    word_size: WordSize,
    version: u16,
}

impl<'a> BinaryCursor<'a> {
    /// Create a cursor over `data`. `base_offset` is the stream offset of
    /// `data[0]` and is only used for diagnostics.
    pub fn new(data: &'a [u8], base_offset: u64, word_size: WordSize, version: u16) -> Self {
        Self {
            data,
            pos: 0,
            base_offset,
            word_size,
            version,
        }
    }

    /// The format version of the stream this cursor reads from.
    pub fn version(&self) -> u16 {
        self.version
    }

    pub fn word_size(&self) -> WordSize {
        self.word_size
    }

    /// The number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The stream offset of the next unread byte.
    pub fn offset(&self) -> u64 {
        self.base_offset + self.pos as u64
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn peek(&self, len: usize) -> Result<&'a [u8], ReadError> {
        let end = self.pos.checked_add(len).ok_or(ReadError::NeedMoreData)?;
        self.data.get(self.pos..end).ok_or(ReadError::NeedMoreData)
    }

    /// Consume exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], ReadError> {
        let bytes = self.peek(len)?;
        self.pos += len;
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReadError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, ReadError> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReadError> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    pub fn read_u64(&mut self) -> Result<u64, ReadError> {
        Ok(LittleEndian::read_u64(self.read_bytes(8)?))
    }

    /// Read an address-sized value; its width depends on the header's word size.
    pub fn read_addr(&mut self) -> Result<u64, ReadError> {
        match self.word_size {
            WordSize::Four => self.read_u32().map(u64::from),
            WordSize::Eight => self.read_u64(),
        }
    }

    /// Read a blob with a u32 length prefix.
    pub fn read_blob(&mut self) -> Result<&'a [u8], ReadError> {
        let len = LittleEndian::read_u32(self.peek(4)?) as usize;
        let total = len.checked_add(4).ok_or(ReadError::NeedMoreData)?;
        let bytes = self.peek(total)?;
        self.pos += total;
        Ok(&bytes[4..])
    }

    /// Read a UTF-8 string with a u32 length prefix.
    pub fn read_string(&mut self) -> Result<&'a str, ReadError> {
        let offset = self.offset();
        let bytes = self.read_blob()?;
        std::str::from_utf8(bytes).map_err(|_| ReadError::StringUtf8 { offset })
    }
}
