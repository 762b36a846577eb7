use std::io::Read;

use crate::read_exact::ReadUntilFullOrEof;

/// The first four bytes of every zstd frame.
pub const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Reads a byte stream in fixed-size chunks and keeps the unconsumed bytes
/// contiguous, so that a variable-length record can be decoded straight from
/// a slice.
///
/// Works with `Read` implementations which "grow", i.e. read() might return
/// 0 during one call and >0 during the next call (because the file now contains
/// more bytes).
pub struct ChunkedReader<R: Read> {
    reader: R,
    /// Always stays the same size, and is always the destination of reader reads
    chunk: Vec<u8>,
    /// Read but not yet consumed bytes start at `read_pos`.
    data: Vec<u8>,
    read_pos: usize,
    /// The stream offset of `data[read_pos]`.
    offset: u64,
    encoding: Encoding,
}

enum Encoding {
    /// Not enough bytes seen yet to tell whether the stream is compressed.
    Undecided,
    Plain,
    #[cfg(feature = "zstd")]
    Zstd(Box<ZstdStream>),
}

impl<R: Read> ChunkedReader<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk: vec![0; chunk_size.max(16)],
            data: Vec::new(),
            read_pos: 0,
            offset: 0,
            encoding: Encoding::Undecided,
        }
    }

    /// The bytes which have been read but not consumed.
    pub fn unread(&self) -> &[u8] {
        &self.data[self.read_pos..]
    }

    /// The stream offset of the first unread byte. For compressed streams this
    /// is an offset into the decompressed data.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn consume(&mut self, len: usize) {
        assert!(len <= self.data.len() - self.read_pos);
        self.read_pos += len;
        self.offset += len as u64;
    }

    /// Read another chunk from the underlying reader. Returns whether any new
    /// bytes became available.
    pub fn fill_more(&mut self) -> Result<bool, std::io::Error> {
        if self.read_pos > 0 && self.read_pos * 2 >= self.data.len() {
            self.data.drain(..self.read_pos);
            self.read_pos = 0;
        }

        loop {
            let len = self.reader.read_until_full_or_eof(&mut self.chunk)?;
            if len == 0 {
                return Ok(false);
            }
            let before = self.data.len();
            match &mut self.encoding {
                Encoding::Plain => self.data.extend_from_slice(&self.chunk[..len]),
                #[cfg(feature = "zstd")]
                Encoding::Zstd(stream) => stream.feed(&self.chunk[..len], &mut self.data)?,
                Encoding::Undecided => {
                    self.data.extend_from_slice(&self.chunk[..len]);
                    self.detect_encoding()?;
                }
            }
            if self.data.len() > before {
                return Ok(true);
            }
        }
    }

    #[cfg(feature = "zstd")]
    fn detect_encoding(&mut self) -> Result<(), std::io::Error> {
        let seen = &self.data[self.read_pos..];
        let prefix_len = seen.len().min(ZSTD_MAGIC.len());
        if seen[..prefix_len] != ZSTD_MAGIC[..prefix_len] {
            self.encoding = Encoding::Plain;
        } else if prefix_len == ZSTD_MAGIC.len() {
            log::debug!("Input is zstd-compressed");
            let compressed = self.data.split_off(self.read_pos);
            let mut stream = Box::new(ZstdStream::new());
            stream.feed(&compressed, &mut self.data)?;
            self.encoding = Encoding::Zstd(stream);
        }
        Ok(())
    }

    #[cfg(not(feature = "zstd"))]
    fn detect_encoding(&mut self) -> Result<(), std::io::Error> {
        self.encoding = Encoding::Plain;
        Ok(())
    }
}

/// Decompression state for a zstd stream which arrives in arbitrary chunks.
#[cfg(feature = "zstd")]
struct ZstdStream {
    dctx: zstd_safe::DCtx<'static>,
    out: Vec<u8>,
}

#[cfg(feature = "zstd")]
impl ZstdStream {
    fn new() -> Self {
        Self {
            dctx: zstd_safe::DCtx::create(),
            out: vec![0; 128 * 1024],
        }
    }

    /// Decompress `input` and append the output to `data`.
    fn feed(&mut self, input: &[u8], data: &mut Vec<u8>) -> Result<(), std::io::Error> {
        let input_len = input.len();
        let mut input = zstd_safe::InBuffer::around(input);
        loop {
            let mut output = zstd_safe::OutBuffer::around(&mut self.out[..]);
            self.dctx
                .decompress_stream(&mut output, &mut input)
                .map_err(|code| {
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        format!("Zstd decompression failed: {}", zstd_safe::get_error_name(code)),
                    )
                })?;
            let produced = output.pos();
            data.extend_from_slice(&self.out[..produced]);
            // A full output buffer can mean that more output is pending.
            if produced < self.out.len() && input.pos() == input_len {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::ChunkedReader;

    #[test]
    fn reads_across_chunks() {
        let bytes: Vec<u8> = (0..100).collect();
        let mut reader = ChunkedReader::new(&bytes[..], 16);
        assert!(reader.unread().is_empty());
        assert!(reader.fill_more().unwrap());
        assert_eq!(reader.unread().len(), 16);
        reader.consume(10);
        assert_eq!(reader.offset(), 10);
        assert!(reader.fill_more().unwrap());
        assert_eq!(reader.unread()[0], 10);
        assert_eq!(reader.unread().len(), 22);
        while reader.fill_more().unwrap() {}
        assert_eq!(reader.unread().len(), 90);
        assert_eq!(reader.unread().last(), Some(&99));
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn decompresses_across_chunks() {
        let bytes: Vec<u8> = (0..4000u32).map(|i| (i % 251) as u8).collect();
        let mut compressed = vec![0; zstd_safe::compress_bound(bytes.len())];
        let len = zstd_safe::compress(&mut compressed[..], &bytes, 3).unwrap();
        compressed.truncate(len);

        let mut reader = ChunkedReader::new(&compressed[..], 16);
        while reader.fill_more().unwrap() {}
        assert_eq!(reader.unread(), &bytes[..]);
    }
}
