use std::io::{ErrorKind, Read};

pub trait ReadUntilFullOrEof {
    /// Fills as much of `dest` as the reader can currently provide, stopping
    /// at EOF. Interrupted reads are retried.
    ///
    /// On a file which is still being written, EOF only means "no more bytes
    /// for now"; a later call can return more data.
    fn read_until_full_or_eof(&mut self, dest: &mut [u8]) -> Result<usize, std::io::Error>;
}

impl<R: Read> ReadUntilFullOrEof for R {
    fn read_until_full_or_eof(&mut self, mut dest: &mut [u8]) -> Result<usize, std::io::Error> {
        let mut total_read = 0;
        while !dest.is_empty() {
            match self.read(dest) {
                Ok(0) => break,
                Ok(n) => {
                    total_read += n;
                    dest = &mut dest[n..];
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(total_read)
    }
}
