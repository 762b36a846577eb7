//! The pprof `Profile` protobuf message, and conversion of resolved samples into it.
//!
//! The messages follow `proto/profile.proto` of the pprof project. Only the
//! fields we fill in are declared; prost skips unknown fields when decoding.

use std::collections::HashMap;

use crate::address_space::{Frame, LibraryId};
use crate::stats::Stats;

#[derive(Clone, PartialEq, prost_derive::Message)]
pub struct Profile {
    #[prost(message, repeated, tag = "1")]
    pub sample_type: Vec<ValueType>,
    #[prost(message, repeated, tag = "2")]
    pub sample: Vec<Sample>,
    #[prost(message, repeated, tag = "3")]
    pub mapping: Vec<Mapping>,
    #[prost(message, repeated, tag = "4")]
    pub location: Vec<Location>,
    #[prost(message, repeated, tag = "5")]
    pub function: Vec<Function>,
    /// Index 0 must be the empty string.
    #[prost(string, repeated, tag = "6")]
    pub string_table: Vec<String>,
    #[prost(int64, tag = "9")]
    pub time_nanos: i64,
    #[prost(message, optional, tag = "11")]
    pub period_type: Option<ValueType>,
    #[prost(int64, tag = "12")]
    pub period: i64,
    #[prost(int64, repeated, tag = "13")]
    pub comment: Vec<i64>,
}

#[derive(Clone, PartialEq, prost_derive::Message)]
pub struct ValueType {
    #[prost(int64, tag = "1")]
    pub r#type: i64,
    #[prost(int64, tag = "2")]
    pub unit: i64,
}

#[derive(Clone, PartialEq, prost_derive::Message)]
pub struct Sample {
    /// Leaf first.
    #[prost(uint64, repeated, tag = "1")]
    pub location_id: Vec<u64>,
    #[prost(int64, repeated, tag = "2")]
    pub value: Vec<i64>,
    #[prost(message, repeated, tag = "3")]
    pub label: Vec<Label>,
}

#[derive(Clone, PartialEq, prost_derive::Message)]
pub struct Label {
    #[prost(int64, tag = "1")]
    pub key: i64,
    #[prost(int64, tag = "2")]
    pub str: i64,
    #[prost(int64, tag = "3")]
    pub num: i64,
}

#[derive(Clone, PartialEq, prost_derive::Message)]
pub struct Mapping {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(uint64, tag = "2")]
    pub memory_start: u64,
    #[prost(uint64, tag = "3")]
    pub memory_limit: u64,
    #[prost(int64, tag = "5")]
    pub filename: i64,
    #[prost(bool, tag = "7")]
    pub has_functions: bool,
}

#[derive(Clone, PartialEq, prost_derive::Message)]
pub struct Location {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(uint64, tag = "2")]
    pub mapping_id: u64,
    #[prost(uint64, tag = "3")]
    pub address: u64,
    #[prost(message, repeated, tag = "4")]
    pub line: Vec<Line>,
}

#[derive(Clone, PartialEq, prost_derive::Message)]
pub struct Line {
    #[prost(uint64, tag = "1")]
    pub function_id: u64,
    #[prost(int64, tag = "2")]
    pub line: i64,
}

#[derive(Clone, PartialEq, prost_derive::Message)]
pub struct Function {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(int64, tag = "2")]
    pub name: i64,
    #[prost(int64, tag = "3")]
    pub system_name: i64,
    #[prost(int64, tag = "4")]
    pub filename: i64,
}

#[derive(Default)]
struct StringTable {
    strings: Vec<String>,
    index: HashMap<String, i64>,
}

impl StringTable {
    fn new() -> Self {
        let mut table = Self::default();
        table.intern("");
        table
    }

    fn intern(&mut self, s: &str) -> i64 {
        if let Some(&index) = self.index.get(s) {
            return index;
        }
        let index = self.strings.len() as i64;
        self.strings.push(s.to_owned());
        self.index.insert(s.to_owned(), index);
        index
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Convert resolved samples into a pprof profile.
///
/// Every distinct frame becomes one function and one location. Samples carry
/// a `thread` number label and a `tag` string label with their topmost tag.
pub fn build_profile(stats: &Stats<'_>) -> Profile {
    let mut strings = StringTable::new();
    let space = stats.address_space();

    let mapping: Vec<Mapping> = space
        .libraries()
        .iter()
        .enumerate()
        .map(|(index, lib)| Mapping {
            id: index as u64 + 1,
            memory_start: lib.start,
            memory_limit: lib.end,
            filename: strings.intern(&lib.name),
            has_functions: !lib.symbols().is_empty(),
        })
        .collect();

    let mut functions = Vec::new();
    let mut locations = Vec::new();
    let mut location_ids: HashMap<Frame, u64> = HashMap::new();
    let mut location_for = |frame: &Frame, strings: &mut StringTable| -> u64 {
        if let Some(&id) = location_ids.get(frame) {
            return id;
        }
        let id = locations.len() as u64 + 1;
        let name = strings.intern(&frame.name);
        let filename = frame
            .library
            .and_then(|LibraryId(index)| space.libraries().get(index))
            .map_or(0, |lib| strings.intern(&lib.name));
        functions.push(Function {
            id,
            name,
            system_name: name,
            filename,
        });
        locations.push(Location {
            id,
            mapping_id: frame.library.map_or(0, |LibraryId(index)| index as u64 + 1),
            address: frame.addr,
            line: vec![Line {
                function_id: id,
                line: 0,
            }],
        });
        location_ids.insert(frame.clone(), id);
        id
    };

    let thread_key = strings.intern("thread");
    let tag_key = strings.intern("tag");
    let mut samples = Vec::new();
    for sample in stats.samples() {
        let location_id = sample
            .frames
            .iter()
            .rev()
            .map(|frame| location_for(frame, &mut strings))
            .collect();
        let mut label = vec![Label {
            key: thread_key,
            str: 0,
            num: to_i64(sample.thread_id),
        }];
        if let Some(tag) = sample.topmost_tag() {
            label.push(Label {
                key: tag_key,
                str: strings.intern(tag.name()),
                num: 0,
            });
        }
        samples.push(Sample {
            location_id,
            value: vec![to_i64(sample.count)],
            label,
        });
    }

    let sample_type = vec![ValueType {
        r#type: strings.intern("samples"),
        unit: strings.intern("count"),
    }];
    let time_nanos = stats
        .profile()
        .start_time()
        .map_or(0, |t| to_i64(t.secs.saturating_mul(1_000_000_000).saturating_add(t.micros.saturating_mul(1000))));
    let comment = stats
        .profile()
        .meta()
        .iter()
        .map(|(key, value)| strings.intern(&format!("{key}={value}")))
        .collect();

    Profile {
        sample_type,
        sample: samples,
        mapping,
        location: locations,
        function: functions,
        string_table: strings.strings,
        time_nanos,
        period_type: None,
        period: 0,
        comment,
    }
}
