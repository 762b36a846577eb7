//! Decoding of sampled stack profiles.
//!
//! A profile stream consists of stack samples, declarations which name the
//! virtual (interpreter level) and native addresses found in those samples,
//! some metadata, and a trailer.

mod marks;

use std::collections::BTreeMap;
use std::io::Read;

pub use marks::*;

use crate::decoder::{LogModel, LogReader, MarkerRegistry};
use crate::error::{DecodeFault, Error};
use crate::header::LogHeader;

/// The kind of code a sampled frame address points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Interpreter or native code, or a virtual address.
    Code,
    /// Machine code emitted by the JIT.
    Jitted,
}

/// A frame as it appears in the stream, before address resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawFrame {
    pub kind: FrameKind,
    pub addr: u64,
}

/// One stack sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    /// How many ticks this sample stands for.
    pub count: u64,
    /// The stack, root first.
    pub frames: Vec<RawFrame>,
    pub thread_id: u64,
    /// Resident memory at sampling time. Only present from version 3 on.
    pub memory_kb: Option<u64>,
    /// Whether the sample was taken while the JIT was compiling.
    pub jitting: bool,
}

/// The wall clock time at which profiling started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTime {
    pub secs: u64,
    pub micros: u64,
    /// The time zone abbreviation, e.g. "UTC".
    pub zone: String,
}

/// A decoded sampled profile.
#[derive(Debug, Clone)]
pub struct Profile {
    header: LogHeader,
    pub(crate) samples: Vec<Sample>,
    pub(crate) virtual_ips: BTreeMap<u64, String>,
    pub(crate) native_symbols: BTreeMap<u64, String>,
    pub(crate) meta: Vec<(String, String)>,
    pub(crate) start_time: Option<StartTime>,
    pub(crate) complete: bool,
    decoded_until: u64,
    fault: Option<DecodeFault>,
}

impl Profile {
    pub fn new(header: LogHeader) -> Self {
        Self {
            header,
            samples: Vec::new(),
            virtual_ips: BTreeMap::new(),
            native_symbols: BTreeMap::new(),
            meta: Vec::new(),
            start_time: None,
            complete: false,
            decoded_until: 0,
            fault: None,
        }
    }

    pub fn header(&self) -> &LogHeader {
        &self.header
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Virtual addresses and the names of the functions they stand for.
    pub fn virtual_ips(&self) -> &BTreeMap<u64, String> {
        &self.virtual_ips
    }

    pub fn native_symbols(&self) -> &BTreeMap<u64, String> {
        &self.native_symbols
    }

    /// Metadata key/value pairs, in stream order.
    pub fn meta(&self) -> &[(String, String)] {
        &self.meta
    }

    /// The last value recorded for a metadata key.
    pub fn meta_value(&self, key: &str) -> Option<&str> {
        self.meta
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn start_time(&self) -> Option<&StartTime> {
        self.start_time.as_ref()
    }

    /// Whether the trailer was seen.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn decoded_until(&self) -> u64 {
        self.decoded_until
    }

    pub fn fault(&self) -> Option<&DecodeFault> {
        self.fault.as_ref()
    }

    /// The sum of all sample counts.
    pub fn total_ticks(&self) -> u64 {
        self.samples.iter().fold(0u64, |acc, s| acc.saturating_add(s.count))
    }

    pub(crate) fn declare_virtual_ip(&mut self, addr: u64, name: &str) {
        if let Some(previous) = self.virtual_ips.get(&addr) {
            if previous != name {
                log::warn!("Virtual address {addr:#x} renamed from {previous:?} to {name:?}");
            }
        }
        self.virtual_ips.insert(addr, name.to_owned());
    }

    pub(crate) fn declare_native_symbol(&mut self, addr: u64, name: &str) {
        self.native_symbols.insert(addr, name.to_owned());
    }
}

impl LogModel for Profile {
    type Context = ();

    const FORMAT_FLAG: u8 = PROFILE_FORMAT_FLAG;

    fn from_header(header: LogHeader) -> Self {
        Profile::new(header)
    }

    fn registry(version: u16) -> Option<MarkerRegistry<Self>> {
        marks::registry(version)
    }

    fn record_decoded(&mut self, end_offset: u64) {
        self.decoded_until = end_offset;
    }

    fn record_fault(&mut self, fault: DecodeFault) {
        self.fault = Some(fault);
    }

    fn is_complete(&self) -> bool {
        self.complete
    }
}

/// A streaming reader for sampled profiles.
pub type ProfileReader<R> = LogReader<R, Profile>;

/// Decode a whole profile.
pub fn decode_profile<R: Read>(reader: R) -> Result<Profile, Error> {
    Ok(ProfileReader::new(reader)?.read_to_end()?)
}
