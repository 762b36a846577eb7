use byteorder::{LittleEndian, WriteBytesExt};

use crate::cursor::WordSize;
use crate::header::LogHeader;

/// Serializes records in the binary layout understood by the readers in this crate.
///
/// Writing into a `Vec<u8>` cannot fail, so none of these methods return errors.
#[derive(Debug, Clone)]
pub struct LogWriter {
    buf: Vec<u8>,
    word_size: WordSize,
}

impl LogWriter {
    /// Create a writer and emit `header` at the start of the output.
    pub fn new(header: &LogHeader) -> Self {
        let mut writer = Self::without_header(header.word_size);
        writer.u8(header.format_flag);
        writer.u16(header.version);
        writer.u8(header.word_size.flag());
        writer.string(&header.machine);
        writer
    }

    /// Create a writer for a record body, with no header.
    pub fn without_header(word_size: WordSize) -> Self {
        Self {
            buf: Vec::new(),
            word_size,
        }
    }

    pub fn u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        let _ = self.buf.write_u16::<LittleEndian>(value);
        self
    }

    pub fn u32(&mut self, value: u32) -> &mut Self {
        let _ = self.buf.write_u32::<LittleEndian>(value);
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        let _ = self.buf.write_u64::<LittleEndian>(value);
        self
    }

    /// Write an address-sized value. On 4-byte streams the upper half is dropped.
    pub fn addr(&mut self, value: u64) -> &mut Self {
        match self.word_size {
            WordSize::Four => self.u32(value as u32),
            WordSize::Eight => self.u64(value),
        }
    }

    pub fn blob(&mut self, bytes: &[u8]) -> &mut Self {
        self.u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn string(&mut self, s: &str) -> &mut Self {
        self.blob(s.as_bytes())
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
