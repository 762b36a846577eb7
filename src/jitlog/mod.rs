//! Decoding of jitlog files, which a tracing JIT writes while it compiles.
//!
//! A jitlog is a stream of marker records. Each record either starts a new
//! trace, switches the current trace to another compilation stage, appends an
//! operation to the active stage, or relates earlier records to each other,
//! e.g. by stitching a bridge onto the guard it was compiled for.
//!
//! The result of decoding is a [`TraceForest`]. Decoding never fails after the
//! header was read: if a record is malformed, decoding stops and the forest
//! keeps everything up to that record, together with a [`DecodeFault`](crate::DecodeFault).
//!
//! # Example
//!
//! ```no_run
//! # fn wrapper() -> Result<(), jitprof_data::Error> {
//! let file = std::fs::File::open("out.jitlog")?;
//! let forest = jitprof_data::jitlog::decode_jitlog(file)?;
//! for trace in forest.traces() {
//!     println!("{:?} {:#x}, entered {} times", trace.kind(), trace.unique_id(), trace.enter_count());
//! }
//! if let Some(fault) = forest.fault() {
//!     eprintln!("stopped early: {fault}");
//! }
//! # Ok(())
//! # }
//! ```

mod anomaly;
mod forest;
mod marks;
mod merge_point;
mod ops;
mod patch;
mod source;
mod trace;

use std::io::Read;

pub use anomaly::Anomaly;
pub use forest::{TraceForest, COUNTER_BRIDGE, COUNTER_ENTRY, COUNTER_LABEL};
pub use marks::*;
pub use merge_point::{
    FieldDecoder, FieldKind, MergePointType, INTEGER_TAG, STRING_PREFIX_ONLY, STRING_STANDALONE,
    STRING_WITH_PREFIX,
};
pub use ops::{CoreDump, Descr, FlatOp, MergePoint, MergePointValue, Operation};
pub use patch::{apply_patches, CodePatch};
pub use source::{SourceLine, SourceLineCache, SourceProvider};
pub use trace::{OpRef, PointInTrace, Stage, StageKind, Trace, TraceKind, TraceLink};

use crate::decoder::{LogModel, LogReader, MarkerRegistry};
use crate::error::{DecodeFault, Error};
use crate::header::LogHeader;

impl LogModel for TraceForest {
    /// The trace which the last START_TRACE record opened.
    type Context = Option<u64>;

    const FORMAT_FLAG: u8 = JITLOG_FORMAT_FLAG;

    fn from_header(header: LogHeader) -> Self {
        TraceForest::new(header)
    }

    fn registry(version: u16) -> Option<MarkerRegistry<Self>> {
        marks::registry(version)
    }

    fn record_decoded(&mut self, end_offset: u64) {
        self.note_record(end_offset);
    }

    fn record_fault(&mut self, fault: DecodeFault) {
        self.set_fault(fault);
    }
}

/// A streaming reader for jitlog files.
pub type JitLogReader<R> = LogReader<R, TraceForest>;

/// Decode a whole jitlog.
pub fn decode_jitlog<R: Read>(reader: R) -> Result<TraceForest, Error> {
    Ok(JitLogReader::new(reader)?.read_to_end()?)
}

/// Decode a jitlog held in memory.
pub fn decode_jitlog_bytes(data: &[u8]) -> Result<TraceForest, Error> {
    decode_jitlog(data)
}
