use std::fmt;

use crate::address_space::{AddressSpace, Frame};

/// The category of a stack frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StackTag {
    /// Native code of the runtime, or interpreter glue.
    C,
    /// JIT-compiled code.
    Jit,
    /// Tracing, blackholing or compiling: code which is not yet optimized.
    Warmup,
    GcMajor,
    GcMinor,
    /// Kernel, vdso or C runtime code.
    Ext,
}

impl StackTag {
    pub const ALL: [StackTag; 6] = [
        StackTag::C,
        StackTag::Jit,
        StackTag::Warmup,
        StackTag::GcMajor,
        StackTag::GcMinor,
        StackTag::Ext,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StackTag::C => "C",
            StackTag::Jit => "JIT",
            StackTag::Warmup => "WARMUP",
            StackTag::GcMajor => "GC:MAJOR",
            StackTag::GcMinor => "GC:MINOR",
            StackTag::Ext => "EXT",
        }
    }

    pub fn is_gc(self) -> bool {
        matches!(self, StackTag::GcMajor | StackTag::GcMinor)
    }
}

impl fmt::Display for StackTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime functions which put a whole subtree into one category.
const SPECIAL_FUNCTIONS: &[(&str, StackTag)] = &[
    ("pypy_g_resume_in_blackhole", StackTag::Warmup),
    ("pypy_g_blackhole_from_resumedata", StackTag::Warmup),
    ("pypy_g_compile_and_run_once", StackTag::Warmup),
    ("pypy_g_send_bridge_to_backend", StackTag::Warmup),
    ("pypy_g_IncrementalMiniMarkGC_major_collection_step", StackTag::GcMajor),
    ("pypy_g_IncrementalMiniMarkGC_minor_collection", StackTag::GcMinor),
    ("pypy_g_IncrementalMiniMarkGC_collect_and_reserve", StackTag::GcMinor),
];

/// Compiler-generated clone suffixes, e.g. `foo.part.3` or `foo.cold`.
const CLONE_SUFFIXES: &[&str] = &["part", "isra", "constprop", "cold", "lto_priv"];

/// Strip compiler-generated clone suffixes from a symbol name.
pub fn strip_clone_suffix(name: &str) -> &str {
    let mut name = name;
    while let Some(dot) = memchr::memrchr(b'.', name.as_bytes()) {
        let (base, last) = (&name[..dot], &name[dot + 1..]);
        if CLONE_SUFFIXES.contains(&last) {
            name = base;
            continue;
        }
        // `foo.part.3`: a counter follows the suffix name.
        if !last.is_empty() && last.bytes().all(|b| b.is_ascii_digit()) {
            if let Some(inner) = memchr::memrchr(b'.', base.as_bytes()) {
                if CLONE_SUFFIXES.contains(&&base[inner + 1..]) {
                    name = &base[..inner];
                    continue;
                }
            }
        }
        break;
    }
    name
}

/// The category of a runtime function with a fixed category.
pub fn special_function_tag(name: &str) -> Option<StackTag> {
    let name = strip_clone_suffix(name);
    SPECIAL_FUNCTIONS
        .iter()
        .find(|(special, _)| *special == name)
        .map(|(_, tag)| *tag)
}

/// The tag of a frame from the frame alone, given the tag of its caller.
fn base_tag(space: &AddressSpace, frame: &Frame, caller: Option<StackTag>) -> StackTag {
    if space.is_jit(frame) {
        return StackTag::Jit;
    }
    if let Some(tag) = special_function_tag(&frame.name) {
        return tag;
    }
    if caller == Some(StackTag::Ext) || space.is_external(frame) {
        return StackTag::Ext;
    }
    StackTag::C
}

/// Tag every frame of a stack, root first.
///
/// Warmup spreads from a warmup function to everything it calls, and so does
/// garbage collection, except that warmup wins over it. JIT and external code,
/// and virtual frames, break the spreading.
pub fn tag_stack(space: &AddressSpace, frames: &[Frame]) -> Vec<StackTag> {
    let mut tags = Vec::with_capacity(frames.len());
    let mut caller: Option<StackTag> = None;
    for frame in frames {
        let base = base_tag(space, frame, caller);
        let tag = if frame.is_virtual || matches!(base, StackTag::Jit | StackTag::Ext) {
            base
        } else {
            match caller {
                Some(StackTag::Warmup) => StackTag::Warmup,
                Some(gc) if gc.is_gc() => {
                    if base == StackTag::Warmup {
                        StackTag::Warmup
                    } else {
                        gc
                    }
                }
                _ => base,
            }
        };
        tags.push(tag);
        caller = Some(tag);
    }
    tags
}

/// The tag of the last (innermost) frame of a stack, or `C` for an empty stack.
pub fn topmost_tag(space: &AddressSpace, frames: &[Frame]) -> StackTag {
    tag_stack(space, frames).last().copied().unwrap_or(StackTag::C)
}
