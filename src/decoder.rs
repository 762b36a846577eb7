use std::io::Read;
use std::ops::RangeInclusive;

use crate::chunked_reader::{ChunkedReader, ZSTD_MAGIC};
use crate::cursor::BinaryCursor;
use crate::error::{DecodeError, DecodeFault, Error};
use crate::header::LogHeader;

/// A decoding routine for one marker.
///
/// A routine must read its whole payload before it touches the model or the
/// context. If a read fails with `NeedMoreData`, the decoder buffers more input
/// and runs the routine again from the start of the record.
pub type RecordFn<M> =
    fn(&mut M, &mut <M as LogModel>::Context, &mut BinaryCursor) -> Result<(), DecodeError>;

/// The model which a stream of marker records is decoded into.
pub trait LogModel: Sized {
    /// Decoding state which is not part of the model, such as the current trace.
    type Context: Default;

    /// The first byte of every stream of this format.
    const FORMAT_FLAG: u8;

    /// Create an empty model for a stream with this header.
    fn from_header(header: LogHeader) -> Self;

    /// The routine table for a format version, or `None` if the version is unsupported.
    fn registry(version: u16) -> Option<MarkerRegistry<Self>>;

    /// Called after every successfully decoded record. `end_offset` is the
    /// stream offset just past the record.
    fn record_decoded(&mut self, end_offset: u64);

    /// Called once if decoding stops at a structural fault.
    fn record_fault(&mut self, fault: DecodeFault);

    /// Whether the model has seen the end of its stream, e.g. a trailer record.
    fn is_complete(&self) -> bool {
        false
    }
}

/// Maps the marker bytes of one format version to their decoding routines.
///
/// Markers of a version form one contiguous range. A byte outside the range,
/// or inside it but without a routine, is a decode fault.
pub struct MarkerRegistry<M: LogModel> {
    version: u16,
    first_marker: u8,
    routines: Vec<Option<RecordFn<M>>>,
}

impl<M: LogModel> MarkerRegistry<M> {
    pub fn new(version: u16, markers: RangeInclusive<u8>) -> Self {
        let first_marker = *markers.start();
        let count = markers.count();
        Self {
            version,
            first_marker,
            routines: vec![None; count],
        }
    }

    /// Bind `routine` to `marker`. Markers outside the registry's range are ignored.
    pub fn register(&mut self, marker: u8, routine: RecordFn<M>) -> &mut Self {
        match self.slot(marker) {
            Some(index) => self.routines[index] = Some(routine),
            None => log::debug!(
                "Ignoring routine for marker {marker:#04x}, outside the range of version {}",
                self.version
            ),
        }
        self
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    /// The inclusive range of valid markers.
    pub fn markers(&self) -> RangeInclusive<u8> {
        let last = self.first_marker as usize + self.routines.len().saturating_sub(1);
        self.first_marker..=last as u8
    }

    pub fn lookup(&self, marker: u8) -> Result<RecordFn<M>, DecodeError> {
        self.slot(marker)
            .and_then(|index| self.routines[index])
            .ok_or(DecodeError::UnknownMarker {
                marker,
                version: self.version,
            })
    }

    fn slot(&self, marker: u8) -> Option<usize> {
        let index = usize::from(marker.checked_sub(self.first_marker)?);
        (index < self.routines.len()).then_some(index)
    }
}

/// The result of one call to [`LogReader::next_record`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    /// A record was decoded and applied to the model.
    Decoded { marker: u8, offset: u64 },
    /// The next record is not completely available yet. On a stream which is
    /// still being written, calling `next_record` later may succeed.
    Pending,
    /// The stream ended cleanly.
    End,
    /// Decoding stopped at a structural fault, which has been handed to the model.
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Streaming,
    Done,
    Faulted,
}

/// Decodes a marker-dispatched stream into a [`LogModel`].
///
/// This reader works with complete files as well as with partial files which
/// are still being written to.
pub struct LogReader<R: Read, M: LogModel> {
    reader: ChunkedReader<R>,
    header: LogHeader,
    registry: MarkerRegistry<M>,
    model: M,
    context: M::Context,
    state: State,
}

impl<R: Read, M: LogModel> LogReader<R, M> {
    /// Create a new `LogReader` and parse the header. The reader does its own
    /// buffering, so there is no need to wrap a [`File`](std::fs::File) into a `BufReader`.
    pub fn new(reader: R) -> Result<Self, Error> {
        Self::new_with_buffer_size(reader, 4 * 1024)
    }

    /// Create a new `LogReader`, with a manually-specified buffer chunk size.
    pub fn new_with_buffer_size(reader: R, buffer_size: usize) -> Result<Self, Error> {
        let mut reader = ChunkedReader::new(reader, buffer_size);
        let (header, header_size) = loop {
            match LogHeader::parse(reader.unread(), M::FORMAT_FLAG) {
                Ok(Some(parsed)) => break parsed,
                Ok(None) => {
                    if !reader.fill_more()? {
                        return Err(Error::NotEnoughBytesForHeader);
                    }
                }
                Err(Error::UnexpectedFormatFlag { .. }) if reader.unread().starts_with(&ZSTD_MAGIC) => {
                    return Err(Error::CompressedInputUnsupported)
                }
                Err(e) => return Err(e),
            }
        };
        reader.consume(header_size);
        let registry = M::registry(header.version).ok_or(Error::UnsupportedVersion(header.version))?;
        Self::with_registry(reader, header, registry)
    }

    fn with_registry(
        reader: ChunkedReader<R>,
        header: LogHeader,
        registry: MarkerRegistry<M>,
    ) -> Result<Self, Error> {
        log::debug!(
            "Decoding format {:#04x} version {} ({:?} words, machine {:?})",
            header.format_flag,
            header.version,
            header.word_size,
            header.machine
        );
        let model = M::from_header(header.clone());
        Ok(Self {
            reader,
            header,
            registry,
            model,
            context: Default::default(),
            state: State::Streaming,
        })
    }

    /// The stream header.
    pub fn header(&self) -> &LogHeader {
        &self.header
    }

    /// The model decoded so far.
    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    /// The offset of the next record's marker byte.
    pub fn next_record_offset(&self) -> u64 {
        self.reader.offset()
    }

    /// Decode the next record.
    pub fn next_record(&mut self) -> Result<RecordStatus, std::io::Error> {
        match self.state {
            State::Done => return Ok(RecordStatus::End),
            State::Faulted => return Ok(RecordStatus::Faulted),
            State::Streaming => {}
        }
        if self.model.is_complete() {
            self.state = State::Done;
            return Ok(RecordStatus::End);
        }

        loop {
            let data = self.reader.unread();
            let Some(&marker) = data.first() else {
                if self.reader.fill_more()? {
                    continue;
                }
                return Ok(RecordStatus::Pending);
            };
            let offset = self.reader.offset();

            let routine = match self.registry.lookup(marker) {
                Ok(routine) => routine,
                Err(error) => {
                    return Ok(self.fault(DecodeFault {
                        offset,
                        marker: Some(marker),
                        error,
                    }))
                }
            };

            let mut cursor = BinaryCursor::new(
                &data[1..],
                offset + 1,
                self.header.word_size,
                self.header.version,
            );
            match routine(&mut self.model, &mut self.context, &mut cursor) {
                Ok(()) => {
                    let len = 1 + cursor.position();
                    self.reader.consume(len);
                    log::trace!("Decoded marker {marker:#04x} at offset {offset} ({len} bytes)");
                    self.model.record_decoded(offset + len as u64);
                    return Ok(RecordStatus::Decoded { marker, offset });
                }
                Err(e) if e.is_incomplete() => {
                    if !self.reader.fill_more()? {
                        return Ok(RecordStatus::Pending);
                    }
                }
                Err(error) => {
                    return Ok(self.fault(DecodeFault {
                        offset,
                        marker: Some(marker),
                        error,
                    }))
                }
            }
        }
    }

    /// Decode all remaining records and return the model.
    ///
    /// Structural faults do not make this fail; they are recorded on the model.
    /// A partial record at the end of the stream is recorded as a
    /// [`DecodeError::Truncated`] fault.
    pub fn read_to_end(mut self) -> Result<M, std::io::Error> {
        loop {
            match self.next_record()? {
                RecordStatus::Decoded { .. } => {}
                RecordStatus::End | RecordStatus::Faulted => break,
                RecordStatus::Pending => {
                    self.finish();
                    break;
                }
            }
        }
        Ok(self.model)
    }

    /// Declare that no more bytes will arrive.
    pub fn finish(&mut self) {
        if self.state != State::Streaming {
            return;
        }
        match self.reader.unread().first() {
            Some(&marker) => {
                let offset = self.reader.offset();
                self.fault(DecodeFault {
                    offset,
                    marker: Some(marker),
                    error: DecodeError::Truncated,
                });
            }
            None => self.state = State::Done,
        }
    }

    fn fault(&mut self, fault: DecodeFault) -> RecordStatus {
        log::debug!("Decoding stopped: {fault}");
        self.model.record_fault(fault);
        self.state = State::Faulted;
        RecordStatus::Faulted
    }
}

#[cfg(test)]
mod test {
    use super::{LogModel, LogReader, MarkerRegistry, RecordStatus};
    use crate::cursor::{BinaryCursor, WordSize};
    use crate::error::{DecodeError, DecodeFault, Error};
    use crate::header::LogHeader;
    use crate::writer::LogWriter;

    #[derive(Default)]
    struct Sum {
        total: u64,
        records: u64,
        fault: Option<DecodeFault>,
    }

    impl LogModel for Sum {
        type Context = ();
        const FORMAT_FLAG: u8 = 0x77;

        fn from_header(_header: LogHeader) -> Self {
            Self::default()
        }

        fn registry(version: u16) -> Option<MarkerRegistry<Self>> {
            if version != 1 {
                return None;
            }
            let mut registry = MarkerRegistry::new(version, 0x01..=0x03);
            registry
                .register(0x01, read_add)
                .register(0x03, read_add_two);
            Some(registry)
        }

        fn record_decoded(&mut self, _end_offset: u64) {
            self.records += 1;
        }

        fn record_fault(&mut self, fault: DecodeFault) {
            self.fault = Some(fault);
        }
    }

    fn read_add(model: &mut Sum, _: &mut (), cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
        model.total += cursor.read_u64()?;
        Ok(())
    }

    fn read_add_two(model: &mut Sum, _: &mut (), cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
        let a = cursor.read_addr()?;
        let b = cursor.read_addr()?;
        model.total += a + b;
        Ok(())
    }

    fn header(version: u16) -> LogHeader {
        LogHeader {
            format_flag: 0x77,
            version,
            word_size: WordSize::Four,
            machine: "test".into(),
        }
    }

    #[test]
    fn registry_range() {
        let registry = Sum::registry(1).unwrap();
        assert_eq!(registry.markers(), 0x01..=0x03);
        assert!(registry.lookup(0x01).is_ok());
        assert!(matches!(
            registry.lookup(0x02),
            Err(DecodeError::UnknownMarker { marker: 2, version: 1 })
        ));
        assert!(registry.lookup(0x00).is_err());
        assert!(registry.lookup(0x04).is_err());
    }

    #[test]
    fn decodes_across_small_chunks() {
        let mut writer = LogWriter::new(&header(1));
        for i in 0..20u64 {
            writer.u8(0x01).u64(i);
            writer.u8(0x03).addr(1).addr(2);
        }
        let bytes = writer.into_bytes();
        let sum = LogReader::<_, Sum>::new_with_buffer_size(&bytes[..], 16)
            .unwrap()
            .read_to_end()
            .unwrap();
        assert_eq!(sum.total, 190 + 60);
        assert_eq!(sum.records, 40);
        assert_eq!(sum.fault, None);
    }

    #[test]
    fn unknown_marker_keeps_earlier_records() {
        let mut writer = LogWriter::new(&header(1));
        writer.u8(0x01).u64(5);
        let fault_offset = writer.len() as u64;
        writer.u8(0x02).u64(6);
        let bytes = writer.into_bytes();
        let mut reader = LogReader::<_, Sum>::new(&bytes[..]).unwrap();
        assert!(matches!(reader.next_record().unwrap(), RecordStatus::Decoded { marker: 1, .. }));
        assert_eq!(reader.next_record().unwrap(), RecordStatus::Faulted);
        assert_eq!(reader.next_record().unwrap(), RecordStatus::Faulted);
        let sum = reader.into_model();
        assert_eq!(sum.total, 5);
        let fault = sum.fault.unwrap();
        assert_eq!(fault.offset, fault_offset);
        assert_eq!(fault.marker, Some(0x02));
    }

    #[test]
    fn truncated_record() {
        let mut writer = LogWriter::new(&header(1));
        writer.u8(0x01).u64(5).u8(0x01).u32(7);
        let bytes = writer.into_bytes();
        let sum = LogReader::<_, Sum>::new(&bytes[..]).unwrap().read_to_end().unwrap();
        assert_eq!(sum.total, 5);
        assert_eq!(sum.fault.unwrap().error, DecodeError::Truncated);
    }

    #[test]
    fn fatal_header_errors() {
        let bytes = LogWriter::new(&header(9)).into_bytes();
        assert!(matches!(
            LogReader::<_, Sum>::new(&bytes[..]),
            Err(Error::UnsupportedVersion(9))
        ));
        assert!(matches!(
            LogReader::<_, Sum>::new(&[0x77, 1][..]),
            Err(Error::NotEnoughBytesForHeader)
        ));
        assert!(matches!(
            LogReader::<_, Sum>::new(&[0x10, 1, 0, 0, 0, 0, 0, 0][..]),
            Err(Error::UnexpectedFormatFlag { .. })
        ));
    }

    #[test]
    fn resumes_when_more_data_arrives() {
        use std::cell::RefCell;
        use std::rc::Rc;

        /// A reader over a buffer which another party keeps appending to.
        struct Growing(Rc<RefCell<Vec<u8>>>, usize);
        impl std::io::Read for Growing {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let data = self.0.borrow();
                let n = buf.len().min(data.len() - self.1);
                buf[..n].copy_from_slice(&data[self.1..self.1 + n]);
                self.1 += n;
                Ok(n)
            }
        }

        let shared = Rc::new(RefCell::new(LogWriter::new(&header(1)).into_bytes()));
        shared.borrow_mut().extend_from_slice(&[0x01, 7, 0, 0]);
        let mut reader = LogReader::<_, Sum>::new(Growing(shared.clone(), 0)).unwrap();
        assert_eq!(reader.next_record().unwrap(), RecordStatus::Pending);
        shared.borrow_mut().extend_from_slice(&[0, 0, 0, 0, 0]);
        assert!(matches!(reader.next_record().unwrap(), RecordStatus::Decoded { .. }));
        assert_eq!(reader.next_record().unwrap(), RecordStatus::Pending);
        reader.finish();
        assert_eq!(reader.next_record().unwrap(), RecordStatus::End);
        assert_eq!(reader.model().total, 7);
    }
}
