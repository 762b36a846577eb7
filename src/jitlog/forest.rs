use std::collections::{BTreeMap, HashMap};

use crate::error::{DecodeError, DecodeFault};
use crate::header::LogHeader;

use super::anomaly::Anomaly;
use super::merge_point::{FieldDecoder, FieldKind, MergePointType};
use super::ops::{CoreDump, Descr, FlatOp, MergePoint, MergePointValue};
use super::patch::{apply_patches, CodePatch};
use super::source::{SourceLine, SourceLineCache, SourceProvider};
use super::trace::{OpRef, PointInTrace, StageKind, Trace, TraceKind, TraceLink};

/// The counter kinds of JITLOG_COUNTER records.
pub const COUNTER_ENTRY: u8 = b'e';
pub const COUNTER_LABEL: u8 = b'l';
pub const COUNTER_BRIDGE: u8 = b'b';

/// The structural model of a jitlog: all traces, how they are linked, and
/// the global indexes needed to resolve later records against earlier ones.
#[derive(Debug, Clone)]
pub struct TraceForest {
    header: LogHeader,
    traces: HashMap<u64, Trace>,
    /// Trace ids in the order in which the traces were started.
    order: Vec<u64>,
    opcodes: Option<HashMap<u16, String>>,
    /// Start address of the assembled code -> trace id.
    addr_to_trace: BTreeMap<u64, u64>,
    descr_to_point: HashMap<u64, PointInTrace>,
    labels: HashMap<u64, PointInTrace>,
    jumps: HashMap<u64, PointInTrace>,
    /// Descriptor number -> the increment_debug_counter operation following it.
    counter_points: HashMap<u64, PointInTrace>,
    patches: Vec<CodePatch>,
    source_cache: SourceLineCache,
    time: u64,
    decoded_until: u64,
    anomalies: Vec<Anomaly>,
    fault: Option<DecodeFault>,
}

impl TraceForest {
    pub fn new(header: LogHeader) -> Self {
        Self {
            header,
            traces: HashMap::new(),
            order: Vec::new(),
            opcodes: None,
            addr_to_trace: BTreeMap::new(),
            descr_to_point: HashMap::new(),
            labels: HashMap::new(),
            jumps: HashMap::new(),
            counter_points: HashMap::new(),
            patches: Vec::new(),
            source_cache: SourceLineCache::new(),
            time: 0,
            decoded_until: 0,
            anomalies: Vec::new(),
            fault: None,
        }
    }

    pub fn header(&self) -> &LogHeader {
        &self.header
    }

    pub fn version(&self) -> u16 {
        self.header.version
    }

    pub fn get(&self, unique_id: u64) -> Option<&Trace> {
        self.traces.get(&unique_id)
    }

    /// All traces, in the order in which they were started.
    pub fn traces(&self) -> impl Iterator<Item = &Trace> + '_ {
        self.order.iter().filter_map(move |id| self.traces.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The trace whose assembled code starts at `addr`.
    pub fn trace_at_start(&self, addr: u64) -> Option<&Trace> {
        self.traces.get(self.addr_to_trace.get(&addr)?)
    }

    /// The trace whose assembled code contains `addr`.
    pub fn trace_containing(&self, addr: u64) -> Option<&Trace> {
        let (_, id) = self.addr_to_trace.range(..=addr).next_back()?;
        self.traces.get(id).filter(|trace| trace.contains_addr(addr))
    }

    /// The trace this trace is attached to.
    pub fn parent(&self, trace: &Trace) -> Option<&Trace> {
        self.traces.get(&trace.parent()?)
    }

    pub fn opcode_name(&self, opnum: u16) -> Option<&str> {
        self.opcodes.as_ref()?.get(&opnum).map(String::as_str)
    }

    /// The operation a descriptor number was first registered for.
    pub fn point_for_descr(&self, descr: u64) -> Option<PointInTrace> {
        self.descr_to_point.get(&descr).copied()
    }

    pub fn label(&self, descr: u64) -> Option<PointInTrace> {
        self.labels.get(&descr).copied()
    }

    pub fn jump(&self, descr: u64) -> Option<PointInTrace> {
        self.jumps.get(&descr).copied()
    }

    pub fn patches(&self) -> &[CodePatch] {
        &self.patches
    }

    pub fn source_cache(&self) -> &SourceLineCache {
        &self.source_cache
    }

    /// The logical time: the number of records decoded so far.
    pub fn time(&self) -> u64 {
        self.time
    }

    /// The stream offset just past the last successfully decoded record.
    pub fn decoded_until(&self) -> u64 {
        self.decoded_until
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }

    /// The structural fault which stopped decoding, if any.
    pub fn fault(&self) -> Option<&DecodeFault> {
        self.fault.as_ref()
    }

    /// The lowest start and highest end address over all assembled traces.
    pub fn code_bounds(&self) -> Option<(u64, u64)> {
        let start = self.traces.values().filter_map(|t| t.addrs()).map(|(s, _)| s).min()?;
        let end = self.traces.values().filter_map(|t| t.addrs()).map(|(_, e)| e).max()?;
        Some((start, end))
    }

    /// The machine code of an operation as it looked at logical time `time`,
    /// with all code patches recorded up to then applied.
    pub fn core_dump_at(&self, trace: u64, op: OpRef, time: u64) -> Option<Vec<u8>> {
        let trace = self.traces.get(&trace)?;
        let (start, end) = trace.addrs()?;
        let dump = trace.op(op)?.core_dump.as_ref()?;
        let snippet_addr = start.checked_add(u64::from(dump.offset))?;
        Some(apply_patches(&dump.bytes, snippet_addr, start..end, &self.patches, time))
    }

    /// Ask `provider` for the text of every source line referenced by a merge
    /// point and store it in the source cache. Returns the number of lines added.
    pub fn extract_source_code_lines(&mut self, provider: &mut impl SourceProvider) -> usize {
        let mut added = 0;
        for id in &self.order {
            let Some(trace) = self.traces.get(id) else {
                continue;
            };
            for (file, lines) in trace.source_lines() {
                for &line in lines {
                    let Ok(line) = u16::try_from(line) else {
                        log::debug!("Skipping line {line} of {file}, too large for a source record");
                        continue;
                    };
                    if self.source_cache.get(file, line).is_some() {
                        continue;
                    }
                    if let Some(raw) = provider.source_line(file, line) {
                        if self.source_cache.insert(file, line, SourceLine::from_raw(&raw)) {
                            added += 1;
                        }
                    }
                }
            }
        }
        added
    }

    fn report(&mut self, anomaly: Anomaly) {
        log::warn!("{anomaly}");
        self.anomalies.push(anomaly);
    }

    fn current_trace_mut(&mut self, current: Option<u64>) -> Result<&mut Trace, DecodeError> {
        let id = current.ok_or(DecodeError::NoCurrentTrace)?;
        self.traces.get_mut(&id).ok_or(DecodeError::UnknownTrace(id))
    }

    /// Register a descriptor, keeping the first registration.
    fn register_descr(&mut self, descr: u64, point: PointInTrace) {
        match self.descr_to_point.get(&descr) {
            Some(&kept) => self.report(Anomaly::DuplicateDescr { descr, kept }),
            None => {
                self.descr_to_point.insert(descr, point);
            }
        }
    }

    fn link(&mut self, origin: PointInTrace, target: PointInTrace) {
        let link = TraceLink { origin, target };
        if let Some(trace) = self.traces.get_mut(&origin.trace) {
            trace.links_out.push(link);
        }
        if let Some(trace) = self.traces.get_mut(&target.trace) {
            trace.links_in.push(link);
        }
    }

    fn unlink_from(&mut self, origin: PointInTrace) {
        let Some(trace) = self.traces.get_mut(&origin.trace) else {
            return;
        };
        let mut removed = Vec::new();
        trace.links_out.retain(|link| {
            let keep = link.origin != origin;
            if !keep {
                removed.push(*link);
            }
            keep
        });
        for link in removed {
            if let Some(target) = self.traces.get_mut(&link.target.trace) {
                target.links_in.retain(|l| *l != link);
            }
        }
    }

    pub(crate) fn note_record(&mut self, end_offset: u64) {
        self.time += 1;
        self.decoded_until = end_offset;
    }

    pub(crate) fn set_fault(&mut self, fault: DecodeFault) {
        self.fault = Some(fault);
    }

    pub(crate) fn declare_opcodes(&mut self, opcodes: HashMap<u16, String>) -> Result<(), DecodeError> {
        if self.opcodes.is_some() {
            return Err(DecodeError::OpcodeTableRedeclared);
        }
        self.opcodes = Some(opcodes);
        Ok(())
    }

    pub(crate) fn start_trace(
        &mut self,
        current: &mut Option<u64>,
        unique_id: u64,
        kind: &str,
        attached_descr: u64,
        jd_name: Option<&str>,
    ) -> Result<(), DecodeError> {
        let kind = TraceKind::parse(kind).ok_or_else(|| DecodeError::UnknownTraceKind(kind.to_owned()))?;
        if self.traces.contains_key(&unique_id) {
            return Err(DecodeError::DuplicateTrace(unique_id));
        }
        let jd_name = jd_name.filter(|name| !name.is_empty()).map(str::to_owned);
        self.traces
            .insert(unique_id, Trace::new(unique_id, kind, attached_descr, jd_name));
        self.order.push(unique_id);
        *current = Some(unique_id);
        Ok(())
    }

    pub(crate) fn enter_stage(
        &mut self,
        current: Option<u64>,
        unique_id: u64,
        kind: StageKind,
    ) -> Result<(), DecodeError> {
        if current != Some(unique_id) {
            return Err(DecodeError::TraceIdMismatch {
                expected: current,
                found: unique_id,
            });
        }
        self.current_trace_mut(current)?.enter_stage(kind);
        Ok(())
    }

    pub(crate) fn set_input_args(&mut self, current: Option<u64>, args: &str) -> Result<(), DecodeError> {
        let trace = self.current_trace_mut(current)?;
        trace.input_args = args
            .split(',')
            .filter(|arg| !arg.is_empty())
            .map(str::to_owned)
            .collect();
        Ok(())
    }

    pub(crate) fn add_operation(
        &mut self,
        current: Option<u64>,
        offset: u64,
        opnum: u16,
        args: &str,
        fail_args: Option<&str>,
        descr_number: Option<u64>,
    ) -> Result<(), DecodeError> {
        let opname = self
            .opcode_name(opnum)
            .ok_or(DecodeError::UnknownOpcode { opnum, offset })?
            .to_owned();
        let (result, args, label) = FlatOp::split_args(args, descr_number.is_some());
        let descr = descr_number.map(|number| Descr {
            label: label.unwrap_or_default(),
            number,
        });

        let trace = self.current_trace_mut(current)?;
        let trace_id = trace.unique_id;
        let (stage_kind, stage) = trace
            .active_stage_mut()
            .ok_or(DecodeError::NoActiveStage(trace_id))?;
        let is_label = opname == "label";
        let is_jump = opname == "jump";
        let is_counter = opname == "increment_debug_counter";
        let index = stage.push_op(FlatOp {
            index: 0,
            opnum,
            opname,
            args,
            result,
            descr,
            core_dump: None,
            fail_args: fail_args.and_then(FlatOp::split_fail_args),
        });
        let counted_descr = if is_counter {
            index
                .checked_sub(1)
                .and_then(|prev| stage.op(prev))
                .and_then(|prev| prev.descr.as_ref())
                .map(|descr| descr.number)
        } else {
            None
        };

        let point = PointInTrace::op(
            trace_id,
            OpRef {
                stage: stage_kind,
                index,
            },
        );
        if let Some(number) = descr_number {
            self.register_descr(number, point);
            if is_label {
                self.labels.entry(number).or_insert(point);
            } else if is_jump {
                self.jumps.entry(number).or_insert(point);
            }
        }
        if let Some(number) = counted_descr {
            self.counter_points.insert(number, point);
        }
        Ok(())
    }

    pub(crate) fn set_addr_bounds(&mut self, current: Option<u64>, start: u64, end: u64) -> Result<(), DecodeError> {
        let trace = self.current_trace_mut(current)?;
        let trace_id = trace.unique_id;
        if trace.addrs.is_some() {
            self.report(Anomaly::AddressBoundsReassigned { trace: trace_id });
            return Ok(());
        }
        trace.addrs = Some((start, end));
        if let Some(previous) = self.addr_to_trace.insert(start, trace_id) {
            if previous != trace_id {
                self.report(Anomaly::AddressCollision {
                    addr: start,
                    previous,
                    trace: trace_id,
                });
            }
        }
        Ok(())
    }

    pub(crate) fn attach_core_dump(&mut self, current: Option<u64>, offset: u16, bytes: &[u8]) -> Result<(), DecodeError> {
        let trace = self.current_trace_mut(current)?;
        let trace_id = trace.unique_id;
        let (_, stage) = trace
            .active_stage_mut()
            .ok_or(DecodeError::NoActiveStage(trace_id))?;
        let anomaly = match stage.last_op_mut() {
            None => Anomaly::CoreDumpWithoutOperation { trace: trace_id },
            Some(op) if op.core_dump.is_some() => Anomaly::CoreDumpReassigned {
                trace: trace_id,
                index: op.index,
            },
            Some(op) => {
                op.core_dump = Some(CoreDump {
                    offset,
                    bytes: bytes.to_vec(),
                });
                return Ok(());
            }
        };
        self.report(anomaly);
        Ok(())
    }

    pub(crate) fn init_merge_point(&mut self, current: Option<u64>, decoders: Vec<FieldDecoder>) -> Result<(), DecodeError> {
        let trace = self.current_trace_mut(current)?;
        let trace_id = trace.unique_id;
        let (_, stage) = trace
            .active_stage_mut()
            .ok_or(DecodeError::NoActiveStage(trace_id))?;
        stage.field_decoders = Some(decoders);
        Ok(())
    }

    pub(crate) fn merge_point_decoders(&self, current: Option<u64>) -> Result<&[FieldDecoder], DecodeError> {
        let id = current.ok_or(DecodeError::NoCurrentTrace)?;
        let trace = self.traces.get(&id).ok_or(DecodeError::UnknownTrace(id))?;
        let stage = trace
            .active_stage()
            .and_then(|kind| trace.stage(kind))
            .ok_or(DecodeError::NoActiveStage(id))?;
        stage.field_decoders().ok_or(DecodeError::MergePointLayoutMissing)
    }

    pub(crate) fn set_common_prefix(&mut self, current: Option<u64>, field: u8, prefix: &str) -> Result<(), DecodeError> {
        let trace = self.current_trace_mut(current)?;
        let trace_id = trace.unique_id;
        let (_, stage) = trace
            .active_stage_mut()
            .ok_or(DecodeError::NoActiveStage(trace_id))?;
        let decoder = stage
            .field_decoders
            .as_mut()
            .ok_or(DecodeError::MergePointLayoutMissing)?
            .get_mut(usize::from(field))
            .filter(|decoder| decoder.kind == FieldKind::String)
            .ok_or(DecodeError::InvalidPrefixField(field))?;
        decoder.set_prefix(prefix.to_owned());
        Ok(())
    }

    pub(crate) fn add_merge_point(
        &mut self,
        current: Option<u64>,
        values: Vec<(MergePointType, MergePointValue)>,
    ) -> Result<(), DecodeError> {
        let trace = self.current_trace_mut(current)?;
        let trace_id = trace.unique_id;
        let merge_point = MergePoint {
            index: 0,
            values: values.into_iter().collect(),
        };
        if let (Some(file), Some(line)) = (merge_point.filename(), merge_point.line()) {
            trace
                .source_lines
                .entry(file.to_owned())
                .or_default()
                .insert(line);
        }
        let (_, stage) = trace
            .active_stage_mut()
            .ok_or(DecodeError::NoActiveStage(trace_id))?;
        stage.push_merge_point(merge_point);
        Ok(())
    }

    pub(crate) fn stitch_bridge(&mut self, descr: u64, target_addr: u64) -> Result<(), DecodeError> {
        let bridge = *self
            .addr_to_trace
            .get(&target_addr)
            .ok_or(DecodeError::NoTraceAtAddress(target_addr))?;
        let Some(origin) = self.point_for_descr(descr) else {
            self.report(Anomaly::MissingBridgeOrigin { descr, bridge });
            return Ok(());
        };
        self.link(origin, PointInTrace::entry(bridge));
        Ok(())
    }

    pub(crate) fn redirect_assembler(&mut self, old_descr: u64, new_descr: u64, target: u64) -> Result<(), DecodeError> {
        if !self.traces.contains_key(&target) {
            return Err(DecodeError::UnknownTrace(target));
        }
        let Some(origin) = self.point_for_descr(old_descr) else {
            self.report(Anomaly::MissingRedirectOrigin { descr: old_descr });
            return Ok(());
        };
        self.unlink_from(origin);
        self.link(origin, PointInTrace::entry(target));
        if new_descr != old_descr {
            self.register_descr(new_descr, origin);
        }
        Ok(())
    }

    pub(crate) fn add_counter(&mut self, addr: u64, kind: u8, count: u64) {
        if let Some(trace) = self.traces.get_mut(&addr) {
            trace.enter_count = trace.enter_count.saturating_add(count);
            return;
        }
        let point = match kind {
            COUNTER_LABEL => self.labels.get(&addr).copied(),
            COUNTER_ENTRY => self.counter_points.get(&addr).copied(),
            COUNTER_BRIDGE => match self.descr_to_point.get(&addr).copied() {
                // A bridge counter counts entries into the bridge attached to the guard.
                Some(origin) => self
                    .bridge_target(origin)
                    .map(PointInTrace::entry)
                    .or(Some(origin)),
                None => None,
            },
            _ => None,
        };
        let attributed = match point.and_then(|point| Some((point.op, self.traces.get_mut(&point.trace)?))) {
            Some((None, trace)) => {
                trace.enter_count = trace.enter_count.saturating_add(count);
                true
            }
            Some((Some(op), trace)) => {
                let total = trace.point_counters.entry(op).or_insert(0);
                *total = total.saturating_add(count);
                true
            }
            None => false,
        };
        if !attributed {
            self.report(Anomaly::UnattributedCounter {
                addr,
                kind: char::from(kind),
                count,
            });
        }
    }

    fn bridge_target(&self, origin: PointInTrace) -> Option<u64> {
        self.traces
            .get(&origin.trace)?
            .links_out
            .iter()
            .rev()
            .find(|link| link.origin == origin)
            .map(|link| link.target.trace)
    }

    pub(crate) fn abort_trace(&mut self, unique_id: u64) {
        match self.traces.get_mut(&unique_id) {
            Some(trace) => trace.aborted = true,
            None => self.report(Anomaly::UnknownAbortedTrace(unique_id)),
        }
    }

    pub(crate) fn add_source_line(&mut self, file: &str, line: u16, indent: u8, text: &str) {
        self.source_cache.insert(
            file,
            line,
            SourceLine {
                indent,
                text: text.to_owned(),
            },
        );
    }

    pub(crate) fn add_patch(&mut self, addr: u64, bytes: &[u8]) {
        self.patches.push(CodePatch {
            time: self.time,
            addr,
            bytes: bytes.to_vec(),
        });
    }
}
