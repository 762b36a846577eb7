use std::collections::{BTreeMap, BTreeSet, HashMap};

use linear_map::LinearMap;

use super::merge_point::FieldDecoder;
use super::ops::{FlatOp, MergePoint, Operation};

/// The compilation stage a list of operations belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StageKind {
    /// The operations as recorded by the tracer.
    NoOpt,
    /// The operations after the optimizer ran.
    Opt,
    /// The operations that were handed to the backend, with machine code.
    Asm,
}

impl StageKind {
    pub fn name(self) -> &'static str {
        match self {
            StageKind::NoOpt => "noopt",
            StageKind::Opt => "opt",
            StageKind::Asm => "asm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Flat(usize),
    MergePoint(usize),
}

/// The operations of one compilation stage of a trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    kind: StageKind,
    ops: Vec<FlatOp>,
    merge_points: Vec<MergePoint>,
    order: Vec<Entry>,
    /// The merge point layout, declared by INIT_MERGE_POINT.
    pub(crate) field_decoders: Option<Vec<FieldDecoder>>,
}

impl Stage {
    pub(crate) fn new(kind: StageKind) -> Self {
        Self {
            kind,
            ops: Vec::new(),
            merge_points: Vec::new(),
            order: Vec::new(),
            field_decoders: None,
        }
    }

    pub fn kind(&self) -> StageKind {
        self.kind
    }

    /// The flat operations, without merge points.
    pub fn ops(&self) -> &[FlatOp] {
        &self.ops
    }

    pub fn op(&self, index: usize) -> Option<&FlatOp> {
        self.ops.get(index)
    }

    pub fn merge_points(&self) -> &[MergePoint] {
        &self.merge_points
    }

    /// The declared merge point layout, if any.
    pub fn field_decoders(&self) -> Option<&[FieldDecoder]> {
        self.field_decoders.as_deref()
    }

    /// All operations and merge points, in the order in which they were logged.
    pub fn operations(&self) -> impl Iterator<Item = Operation<'_>> + '_ {
        self.order.iter().map(move |entry| match *entry {
            Entry::Flat(i) => Operation::Flat(&self.ops[i]),
            Entry::MergePoint(i) => Operation::MergePoint(&self.merge_points[i]),
        })
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn push_op(&mut self, mut op: FlatOp) -> usize {
        let index = self.ops.len();
        op.index = index;
        self.ops.push(op);
        self.order.push(Entry::Flat(index));
        index
    }

    pub(crate) fn push_merge_point(&mut self, mut mp: MergePoint) -> usize {
        let index = self.merge_points.len();
        mp.index = index;
        self.merge_points.push(mp);
        self.order.push(Entry::MergePoint(index));
        index
    }

    pub(crate) fn last_op_mut(&mut self) -> Option<&mut FlatOp> {
        self.ops.last_mut()
    }
}

/// Whether a trace was compiled for a loop or for a bridge out of a failing guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceKind {
    Loop,
    Bridge,
}

impl TraceKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "loop" => Some(TraceKind::Loop),
            "bridge" => Some(TraceKind::Bridge),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TraceKind::Loop => "loop",
            TraceKind::Bridge => "bridge",
        }
    }
}

/// Identifies an operation within a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OpRef {
    pub stage: StageKind,
    pub index: usize,
}

/// A trace, or an operation within a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointInTrace {
    pub trace: u64,
    /// `None` refers to the trace entry.
    pub op: Option<OpRef>,
}

impl PointInTrace {
    pub fn entry(trace: u64) -> Self {
        Self { trace, op: None }
    }

    pub fn op(trace: u64, op: OpRef) -> Self {
        Self { trace, op: Some(op) }
    }
}

/// A control transfer from an operation of one trace to another trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceLink {
    pub origin: PointInTrace,
    pub target: PointInTrace,
}

/// One compiled trace.
///
/// Traces refer to each other by unique id; the [`TraceForest`](super::TraceForest)
/// owns all of them and resolves the ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub(crate) unique_id: u64,
    pub(crate) kind: TraceKind,
    pub(crate) jd_name: Option<String>,
    pub(crate) attached_descr: u64,
    pub(crate) input_args: Vec<String>,
    pub(crate) stages: LinearMap<StageKind, Stage>,
    pub(crate) active_stage: Option<StageKind>,
    pub(crate) addrs: Option<(u64, u64)>,
    pub(crate) enter_count: u64,
    pub(crate) point_counters: HashMap<OpRef, u64>,
    pub(crate) links_out: Vec<TraceLink>,
    pub(crate) links_in: Vec<TraceLink>,
    pub(crate) source_lines: BTreeMap<String, BTreeSet<u64>>,
    pub(crate) aborted: bool,
    pub(crate) unrolled: bool,
}

impl Trace {
    pub(crate) fn new(unique_id: u64, kind: TraceKind, attached_descr: u64, jd_name: Option<String>) -> Self {
        Self {
            unique_id,
            kind,
            jd_name,
            attached_descr,
            input_args: Vec::new(),
            stages: LinearMap::new(),
            active_stage: None,
            addrs: None,
            enter_count: 0,
            point_counters: HashMap::new(),
            links_out: Vec::new(),
            links_in: Vec::new(),
            source_lines: BTreeMap::new(),
            aborted: false,
            unrolled: false,
        }
    }

    pub fn unique_id(&self) -> u64 {
        self.unique_id
    }

    pub fn kind(&self) -> TraceKind {
        self.kind
    }

    /// The name of the JIT driver which compiled this trace. Not present before version 2.
    pub fn jit_driver(&self) -> Option<&str> {
        self.jd_name.as_deref()
    }

    /// For bridges, the descriptor number of the guard this trace is attached to.
    pub fn attached_descr(&self) -> u64 {
        self.attached_descr
    }

    pub fn input_args(&self) -> &[String] {
        &self.input_args
    }

    pub fn stage(&self, kind: StageKind) -> Option<&Stage> {
        self.stages.get(&kind)
    }

    /// The stages in the order in which they were first entered.
    pub fn stages(&self) -> impl Iterator<Item = &Stage> {
        self.stages.values()
    }

    pub fn active_stage(&self) -> Option<StageKind> {
        self.active_stage
    }

    pub fn op(&self, op: OpRef) -> Option<&FlatOp> {
        self.stage(op.stage)?.op(op.index)
    }

    /// The `[start, end)` range of the assembled machine code.
    pub fn addrs(&self) -> Option<(u64, u64)> {
        self.addrs
    }

    pub fn contains_addr(&self, addr: u64) -> bool {
        matches!(self.addrs, Some((start, end)) if start <= addr && addr < end)
    }

    /// How often the trace was entered, according to the runtime's counters.
    pub fn enter_count(&self) -> u64 {
        self.enter_count
    }

    pub fn point_counter(&self, op: OpRef) -> u64 {
        self.point_counters.get(&op).copied().unwrap_or(0)
    }

    pub fn point_counters(&self) -> &HashMap<OpRef, u64> {
        &self.point_counters
    }

    pub fn links_out(&self) -> &[TraceLink] {
        &self.links_out
    }

    pub fn links_in(&self) -> &[TraceLink] {
        &self.links_in
    }

    /// The trace this one was attached to, if any.
    pub fn parent(&self) -> Option<u64> {
        self.links_in
            .iter()
            .map(|link| link.origin.trace)
            .find(|&origin| origin != self.unique_id)
    }

    /// The ids of the traces this trace can transfer control to.
    pub fn bridges(&self) -> impl Iterator<Item = u64> + '_ {
        self.links_out.iter().map(|link| link.target.trace)
    }

    /// The interpreter source lines covered by this trace, per file.
    pub fn source_lines(&self) -> &BTreeMap<String, BTreeSet<u64>> {
        &self.source_lines
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Whether the tracer re-entered the `noopt` stage while it was active,
    /// which happens when a loop body is unrolled.
    pub fn is_unrolled(&self) -> bool {
        self.unrolled
    }

    /// Enter a stage, creating it if it does not exist.
    pub(crate) fn enter_stage(&mut self, kind: StageKind) {
        if kind == StageKind::NoOpt && self.active_stage == Some(StageKind::NoOpt) {
            self.unrolled = true;
            return;
        }
        if !self.stages.contains_key(&kind) {
            self.stages.insert(kind, Stage::new(kind));
        }
        self.active_stage = Some(kind);
    }

    pub(crate) fn active_stage_mut(&mut self) -> Option<(StageKind, &mut Stage)> {
        let kind = self.active_stage?;
        Some((kind, self.stages.get_mut(&kind)?))
    }
}
