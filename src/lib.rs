//! A decoder for the logs which an instrumented language runtime writes while
//! it is profiled: jitlogs, which describe the traces its tracing JIT
//! compiled, and sampled stack profiles.
//!
//! Both formats consist of a short header and a sequence of records, each of
//! which starts with a marker byte. The [`jitlog`] module decodes jitlogs into
//! a [`TraceForest`](jitlog::TraceForest), the [`profile`] module decodes
//! sampled profiles into a [`Profile`](profile::Profile).
//!
//! Samples are resolved against an [`AddressSpace`], tagged with a
//! [`StackTag`] per frame, and aggregated in a [`CallTree`] by [`Stats`].
//!
//! # Example
//!
//! ```no_run
//! use jitprof_data::{AddressSpace, Library, Stats};
//!
//! # fn wrapper() -> Result<(), jitprof_data::Error> {
//! let profile = jitprof_data::profile::decode_profile(std::fs::File::open("out.prof")?)?;
//! let forest = jitprof_data::jitlog::decode_jitlog(std::fs::File::open("out.jitlog")?)?;
//!
//! let libraries = vec![Library::new("/usr/lib/libc.so.6", 0x7f00_0000_0000, 0x7f00_0020_0000)];
//! let space = AddressSpace::from_profile(&profile, libraries, Some(&forest));
//! let stats = Stats::new(&profile, &space);
//! println!("{} ticks", stats.total_ticks());
//! for (tag, ticks) in stats.tag_totals().iter() {
//!     println!("{tag}: {ticks}");
//! }
//! # Ok(())
//! # }
//! ```

mod address_space;
mod calltree;
mod chunked_reader;
mod cursor;
mod decoder;
mod error;
mod header;
pub mod jitlog;
mod library_kind;
pub mod pprof;
pub mod profile;
mod read_exact;
mod stats;
mod tagger;
mod writer;

pub use address_space::{AddressSpace, Frame, Library, LibraryId, Symbol};
pub use calltree::{CallTree, NodeId, NodeRef, TagCounts, ROOT_NAME};
pub use chunked_reader::ZSTD_MAGIC;
pub use cursor::{BinaryCursor, WordSize};
pub use decoder::{LogModel, LogReader, MarkerRegistry, RecordFn, RecordStatus};
pub use error::{DecodeError, DecodeFault, Error, ReadError};
pub use header::LogHeader;
pub use library_kind::{LibraryKind, JIT_LIBRARY_NAME, NATIVE_LIBRARY_NAME, VIRTUAL_LIBRARY_NAME};
pub use stats::{ResolvedSample, Stats};
pub use tagger::{special_function_tag, strip_clone_suffix, tag_stack, topmost_tag, StackTag};
pub use writer::LogWriter;
