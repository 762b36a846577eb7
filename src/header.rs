use crate::cursor::{BinaryCursor, WordSize};
use crate::error::{Error, ReadError};

/// The header at the start of both the sampled profile and the JIT log.
///
/// ```plaintext
/// [format flag: u8][version: u16 LE][word size flag: u8][machine name: u32 LE length + UTF-8]
/// ```
///
/// The format flag tells the two streams apart. The word size flag selects the
/// width of every address-sized field which follows the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogHeader {
    pub format_flag: u8,
    /// The format version. Each stream has its own version counter.
    pub version: u16,
    /// The width of address-sized fields. `0` in the header means 8 bytes, `1` means 4 bytes.
    pub word_size: WordSize,
    /// The name of the machine architecture the runtime was built for, e.g. `x86_64`.
    pub machine: String,
}

impl LogHeader {
    /// The smallest possible header: flag, version, word size and an empty machine name.
    pub const MIN_SIZE: usize = 1 + 2 + 1 + 4;

    /// Try to parse a header from the start of `data`.
    ///
    /// Returns `Ok(None)` if `data` ends before the header is complete. A wrong
    /// format flag is reported as soon as the first byte is available.
    /// On success, returns the header and its size in bytes.
    pub fn parse(data: &[u8], expected_flag: u8) -> Result<Option<(Self, usize)>, Error> {
        let Some(&format_flag) = data.first() else {
            return Ok(None);
        };
        if format_flag != expected_flag {
            return Err(Error::UnexpectedFormatFlag {
                expected: expected_flag,
                found: format_flag,
            });
        }

        // The word size is not known yet; the header itself has no address-sized fields.
        let mut cursor = BinaryCursor::new(&data[1..], 1, WordSize::Eight, 0);
        match Self::parse_after_flag(format_flag, &mut cursor) {
            Ok(header) => Ok(Some((header, 1 + cursor.position()))),
            Err(HeaderReadError::Read(ReadError::NeedMoreData)) => Ok(None),
            Err(HeaderReadError::Read(ReadError::StringUtf8 { .. })) => Err(Error::MachineNameUtf8),
            Err(HeaderReadError::WordSize(flag)) => Err(Error::InvalidWordSize(flag)),
        }
    }

    fn parse_after_flag(
        format_flag: u8,
        cursor: &mut BinaryCursor,
    ) -> Result<Self, HeaderReadError> {
        let version = cursor.read_u16()?;
        let word_size_flag = cursor.read_u8()?;
        let word_size =
            WordSize::from_flag(word_size_flag).ok_or(HeaderReadError::WordSize(word_size_flag))?;
        let machine = cursor.read_string()?.to_owned();
        Ok(Self {
            format_flag,
            version,
            word_size,
            machine,
        })
    }
}

enum HeaderReadError {
    Read(ReadError),
    WordSize(u8),
}

impl From<ReadError> for HeaderReadError {
    fn from(err: ReadError) -> Self {
        HeaderReadError::Read(err)
    }
}
