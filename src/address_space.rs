use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::jitlog::{TraceForest, TraceKind};
use crate::library_kind::{LibraryKind, JIT_LIBRARY_NAME, NATIVE_LIBRARY_NAME, VIRTUAL_LIBRARY_NAME};
use crate::profile::{FrameKind, Profile, RawFrame, Sample};

/// A named address in a library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub addr: u64,
    /// The end of the symbol, if known. Addresses between the end and the
    /// next symbol do not resolve to this symbol.
    pub end: Option<u64>,
    pub name: String,
}

/// A contiguous mapped range of code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Library {
    pub name: String,
    pub start: u64,
    /// Exclusive.
    pub end: u64,
    /// Whether the addresses in this library stand for interpreter level functions.
    pub is_virtual: bool,
    kind: LibraryKind,
    /// Sorted by address.
    symbols: Vec<Symbol>,
    /// Only addresses which are exactly a symbol's address resolve.
    exact: bool,
}

impl Library {
    pub fn new(name: &str, start: u64, end: u64) -> Self {
        let kind = LibraryKind::detect(name);
        Self {
            name: name.to_owned(),
            start,
            end,
            is_virtual: kind == LibraryKind::Virtual,
            kind,
            symbols: Vec::new(),
            exact: false,
        }
    }

    /// Mark the addresses of this library as interpreter level functions.
    pub fn with_virtual(mut self, is_virtual: bool) -> Self {
        self.is_virtual = is_virtual;
        self
    }

    /// Add symbols. They do not need to be sorted.
    pub fn with_symbols(mut self, symbols: impl IntoIterator<Item = (u64, String)>) -> Self {
        self.symbols.extend(
            symbols
                .into_iter()
                .map(|(addr, name)| Symbol { addr, end: None, name }),
        );
        self.symbols.sort_by_key(|symbol| symbol.addr);
        self
    }

    /// The pseudo-library for all traces of a forest which were assembled.
    pub fn jit(forest: &TraceForest) -> Self {
        let (start, end) = forest.code_bounds().unwrap_or((0, 0));
        let mut library = Self::new(JIT_LIBRARY_NAME, start, end);
        library.symbols = forest
            .traces()
            .filter_map(|trace| {
                let (start, end) = trace.addrs()?;
                let kind = match trace.kind() {
                    TraceKind::Loop => "loop",
                    TraceKind::Bridge => "bridge",
                };
                Some(Symbol {
                    addr: start,
                    end: Some(end),
                    name: format!("jit:{kind}#{:#x}", trace.unique_id()),
                })
            })
            .collect();
        library.symbols.sort_by_key(|symbol| symbol.addr);
        library
    }

    /// A library spanning the given symbols.
    fn from_symbol_map(name: &str, symbols: &BTreeMap<u64, String>) -> Option<Self> {
        let start = *symbols.keys().next()?;
        let end = symbols.keys().next_back()?.saturating_add(1);
        let library = Self::new(name, start, end)
            .with_symbols(symbols.iter().map(|(addr, name)| (*addr, name.clone())));
        Some(library)
    }

    /// The profile's map of virtual addresses. Its ids are opaque, so an
    /// address between two ids belongs to neither.
    fn virtual_ips(symbols: &BTreeMap<u64, String>) -> Option<Self> {
        let mut library = Self::from_symbol_map(VIRTUAL_LIBRARY_NAME, symbols)?;
        library.exact = true;
        Some(library)
    }

    pub fn kind(&self) -> &LibraryKind {
        &self.kind
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end
    }

    /// The symbol with the greatest address at or below `addr`.
    pub fn symbol_for(&self, addr: u64) -> Option<&Symbol> {
        let index = self.symbols.partition_point(|symbol| symbol.addr <= addr);
        let symbol = &self.symbols[index.checked_sub(1)?];
        match symbol.end {
            Some(end) if addr >= end => None,
            _ => Some(symbol),
        }
    }

    fn exact_symbol(&self, addr: u64) -> Option<&Symbol> {
        let index = self.symbols.binary_search_by_key(&addr, |symbol| symbol.addr).ok()?;
        Some(&self.symbols[index])
    }
}

/// An index into [`AddressSpace::libraries`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LibraryId(pub usize);

/// A resolved stack frame.
///
/// Two frames are equal if they have the same name and virtualness; the
/// address and library do not take part in comparisons, so that samples at
/// different addresses of the same function land in the same call tree node.
#[derive(Debug, Clone)]
pub struct Frame {
    pub name: String,
    pub addr: u64,
    pub library: Option<LibraryId>,
    pub is_virtual: bool,
}

impl Frame {
    /// A frame for an address that could not be resolved.
    pub fn unknown(addr: u64) -> Self {
        Self {
            name: format!("{addr:#x}"),
            addr,
            library: None,
            is_virtual: false,
        }
    }

    /// A frame with just a name, e.g. for building call trees by hand.
    pub fn named(name: &str, is_virtual: bool) -> Self {
        Self {
            name: name.to_owned(),
            addr: 0,
            library: None,
            is_virtual,
        }
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.is_virtual == other.is_virtual
    }
}

impl Eq for Frame {}

impl Hash for Frame {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.is_virtual.hash(state);
    }
}

/// Resolves sampled addresses to symbols.
///
/// Libraries are kept sorted by start address, so every lookup is a pair of
/// binary searches. The JIT pseudo-library is always present, even if no
/// trace was assembled.
#[derive(Debug, Clone)]
pub struct AddressSpace {
    libraries: Vec<Library>,
    /// Libraries which resolve by range, sorted by start address.
    ranges: Vec<LibraryId>,
    /// Libraries which only resolve exact symbol addresses.
    exact: Vec<LibraryId>,
    jit: LibraryId,
}

impl AddressSpace {
    pub fn new(libraries: Vec<Library>) -> Self {
        let mut libraries = libraries;
        if !libraries.iter().any(|lib| lib.kind == LibraryKind::Jit) {
            libraries.push(Library::new(JIT_LIBRARY_NAME, 0, 0));
        }
        libraries.sort_by_key(|lib| lib.start);

        let mut jit = LibraryId(0);
        let mut exact = Vec::new();
        let mut ranges: Vec<LibraryId> = Vec::new();
        for (index, lib) in libraries.iter().enumerate() {
            let id = LibraryId(index);
            if lib.kind == LibraryKind::Jit {
                jit = id;
            }
            if lib.exact {
                exact.push(id);
                continue;
            }
            if let Some(&prev) = ranges.last() {
                let prev: &Library = &libraries[prev.0];
                if prev.end > lib.start && lib.start < lib.end {
                    log::warn!(
                        "Library {} at {:#x} overlaps {} which ends at {:#x}",
                        lib.name,
                        lib.start,
                        prev.name,
                        prev.end
                    );
                }
            }
            ranges.push(id);
        }
        Self {
            libraries,
            ranges,
            exact,
            jit,
        }
    }

    /// Build the address space for a profile: the given libraries, the
    /// profile's virtual and native symbols, and the traces of `forest`.
    pub fn from_profile(profile: &Profile, libraries: Vec<Library>, forest: Option<&TraceForest>) -> Self {
        let mut libraries = libraries;
        if let Some(forest) = forest {
            libraries.push(Library::jit(forest));
        }
        libraries.extend(Library::virtual_ips(profile.virtual_ips()));
        libraries.extend(Library::from_symbol_map(NATIVE_LIBRARY_NAME, profile.native_symbols()));
        Self::new(libraries)
    }

    pub fn libraries(&self) -> &[Library] {
        &self.libraries
    }

    pub fn library(&self, id: LibraryId) -> Option<&Library> {
        self.libraries.get(id.0)
    }

    /// The id of the JIT pseudo-library.
    pub fn jit_library(&self) -> LibraryId {
        self.jit
    }

    pub fn is_jit(&self, frame: &Frame) -> bool {
        frame.library == Some(self.jit)
    }

    /// Whether a frame is in kernel, vdso or C runtime code.
    pub fn is_external(&self, frame: &Frame) -> bool {
        frame
            .library
            .and_then(|id| self.library(id))
            .is_some_and(|lib| lib.kind.is_external())
    }

    /// Resolve an address to the nearest symbol at or below it. Never
    /// fails: unknown addresses get a hex label.
    pub fn lookup(&self, addr: u64) -> Frame {
        if let Some(frame) = self.lookup_exact(addr) {
            return frame;
        }
        let index = self
            .ranges
            .partition_point(|&id| self.libraries[id.0].start <= addr);
        let Some(&id) = index.checked_sub(1).and_then(|i| self.ranges.get(i)) else {
            return Frame::unknown(addr);
        };
        let lib = &self.libraries[id.0];
        if !lib.contains(addr) {
            return Frame::unknown(addr);
        }
        match lib.symbol_for(addr) {
            Some(symbol) => Frame {
                name: symbol.name.clone(),
                addr: symbol.addr,
                library: Some(id),
                is_virtual: lib.is_virtual,
            },
            None => Frame {
                name: format!("{addr:#x}"),
                addr,
                library: Some(id),
                is_virtual: false,
            },
        }
    }

    fn lookup_exact(&self, addr: u64) -> Option<Frame> {
        self.exact.iter().find_map(|&id| {
            let lib = &self.libraries[id.0];
            let symbol = lib.exact_symbol(addr)?;
            Some(Frame {
                name: symbol.name.clone(),
                addr,
                library: Some(id),
                is_virtual: lib.is_virtual,
            })
        })
    }

    /// Resolve one raw frame. JIT frames which are not inside a known trace
    /// still count as JIT code.
    pub fn resolve_frame(&self, raw: RawFrame) -> Frame {
        let frame = self.lookup(raw.addr);
        match (raw.kind, frame.library) {
            (FrameKind::Jitted, None) => Frame {
                name: format!("jit:{:#x}", raw.addr),
                addr: raw.addr,
                library: Some(self.jit),
                is_virtual: false,
            },
            _ => frame,
        }
    }

    /// Resolve the stack of a sample, root first.
    pub fn resolve_stack(&self, sample: &Sample) -> Vec<Frame> {
        sample.frames.iter().map(|&raw| self.resolve_frame(raw)).collect()
    }

    /// Resolve the stack of a sample, optionally keeping only virtual frames.
    pub fn filter_stack(&self, sample: &Sample, only_virtual: bool) -> Vec<Frame> {
        let mut frames = self.resolve_stack(sample);
        if only_virtual {
            frames.retain(|frame| frame.is_virtual);
        }
        frames
    }
}
