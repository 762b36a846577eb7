use std::collections::HashMap;

use jitprof_data::jitlog::*;
use jitprof_data::{DecodeError, Error, LogHeader, LogWriter, WordSize};

const OPCODES: &[(u16, &str)] = &[
    (0, "label"),
    (1, "int_add"),
    (2, "guard_true"),
    (3, "jump"),
    (4, "increment_debug_counter"),
    (5, "finish"),
];

fn writer(version: u16) -> LogWriter {
    writer_with_word_size(version, WordSize::Eight)
}

fn writer_with_word_size(version: u16, word_size: WordSize) -> LogWriter {
    let mut w = LogWriter::new(&LogHeader {
        format_flag: JITLOG_FORMAT_FLAG,
        version,
        word_size,
        machine: "x86_64".into(),
    });
    w.u8(MARK_RESOP_META).u16(OPCODES.len() as u16);
    for &(opnum, name) in OPCODES {
        w.u16(opnum).string(name);
    }
    w
}

fn start_trace(w: &mut LogWriter, version: u16, id: u64, kind: &str, attached_descr: u64) {
    w.u8(MARK_START_TRACE).addr(id).string(kind).addr(attached_descr);
    if version >= 2 {
        w.string("pypyjit");
    }
}

fn op(w: &mut LogWriter, version: u16, opnum: u16, args: &str) {
    w.u8(MARK_RESOP).u16(opnum).string(args);
    if version >= 2 {
        w.string("");
    }
}

fn op_descr(w: &mut LogWriter, version: u16, opnum: u16, args: &str, descr: u64) {
    w.u8(MARK_RESOP_DESCR).u16(opnum).string(args);
    if version >= 2 {
        w.string("p0,i1");
    }
    w.addr(descr);
}

fn decode(w: LogWriter) -> TraceForest {
    decode_jitlog_bytes(&w.into_bytes()).unwrap()
}

/// A loop at 0x5000 with a guard (descr 0x10) and a bridge at 0x6000
/// attached to that guard.
fn loop_with_bridge(version: u16) -> LogWriter {
    let mut w = writer(version);
    start_trace(&mut w, version, 0x100, "loop", 0);
    w.u8(MARK_INPUT_ARGS).string("p0,i1");
    w.u8(MARK_TRACE).addr(0x100);
    op_descr(&mut w, version, 0, ",p0,i1,<Label0x20>", 0x20);
    op(&mut w, version, 1, "i2,i1,1");
    op_descr(&mut w, version, 2, ",i2,<Guard0x10>", 0x10);
    op_descr(&mut w, version, 3, ",p0,i2,<Label0x20>", 0x21);
    w.u8(MARK_ASM_ADDR).addr(0x5000).addr(0x5100);

    start_trace(&mut w, version, 0x200, "bridge", 0x10);
    w.u8(MARK_TRACE).addr(0x200);
    op(&mut w, version, 5, ",i2");
    w.u8(MARK_ASM_ADDR).addr(0x6000).addr(0x6040);
    w.u8(MARK_STITCH_BRIDGE).addr(0x10).addr(0x6000);
    w
}

#[test]
fn asm_addr_sets_bounds_and_address_index() {
    let mut w = writer(3);
    start_trace(&mut w, 3, 0x100, "loop", 0);
    w.u8(MARK_TRACE).addr(0x100);
    w.u8(MARK_ASM_ADDR).addr(0x5000).addr(0x5100);
    let forest = decode(w);

    assert_eq!(forest.fault(), None);
    let trace = forest.get(0x100).unwrap();
    assert_eq!(trace.addrs(), Some((0x5000, 0x5100)));
    assert_eq!(trace.kind(), TraceKind::Loop);
    assert_eq!(trace.jit_driver(), Some("pypyjit"));
    assert_eq!(forest.trace_at_start(0x5000).map(Trace::unique_id), Some(0x100));
    assert_eq!(forest.trace_containing(0x50ff).map(Trace::unique_id), Some(0x100));
    assert!(forest.trace_containing(0x5100).is_none());
    assert_eq!(forest.time(), 4);
}

#[test]
fn operations_and_indexes() {
    let forest = decode(loop_with_bridge(2));
    assert_eq!(forest.fault(), None);
    assert!(forest.anomalies().is_empty());

    let trace = forest.get(0x100).unwrap();
    assert_eq!(trace.input_args(), ["p0", "i1"]);
    let stage = trace.stage(StageKind::NoOpt).unwrap();
    assert_eq!(stage.ops().len(), 4);
    let add = &stage.ops()[1];
    assert_eq!(add.opname, "int_add");
    assert_eq!(add.result.as_deref(), Some("i2"));
    assert_eq!(add.args, ["i1", "1"]);
    let guard = &stage.ops()[2];
    assert_eq!(guard.descr.as_ref().unwrap().label, "<Guard0x10>");
    assert_eq!(guard.fail_args.as_deref(), Some(&["p0".to_string(), "i1".to_string()][..]));
    assert_eq!(guard.to_string(), "guard_true(i2, descr=<Guard0x10>) [p0, i1]");

    let guard_point = PointInTrace::op(
        0x100,
        OpRef {
            stage: StageKind::NoOpt,
            index: 2,
        },
    );
    assert_eq!(forest.point_for_descr(0x10), Some(guard_point));
    assert_eq!(forest.label(0x20).map(|p| p.op.unwrap().index), Some(0));
    assert_eq!(forest.jump(0x21).map(|p| p.op.unwrap().index), Some(3));
    assert_eq!(forest.opcode_name(4), Some("increment_debug_counter"));
}

#[test]
fn stitched_bridge_links_both_traces() {
    let forest = decode(loop_with_bridge(2));
    let lp = forest.get(0x100).unwrap();
    let bridge = forest.get(0x200).unwrap();

    assert_eq!(lp.links_out().len(), 1);
    assert_eq!(lp.links_out()[0].target, PointInTrace::entry(0x200));
    assert_eq!(bridge.links_in(), lp.links_out());
    assert_eq!(bridge.attached_descr(), 0x10);
    assert_eq!(forest.parent(bridge).map(Trace::unique_id), Some(0x100));
    assert_eq!(lp.bridges().collect::<Vec<_>>(), [0x200]);
    let ids: Vec<u64> = forest.traces().map(Trace::unique_id).collect();
    assert_eq!(ids, [0x100, 0x200]);
}

#[test]
fn stitch_problems() {
    let mut w = loop_with_bridge(2);
    w.u8(MARK_STITCH_BRIDGE).addr(0x77).addr(0x6000);
    let forest = decode(w);
    assert_eq!(
        forest.anomalies(),
        [Anomaly::MissingBridgeOrigin {
            descr: 0x77,
            bridge: 0x200
        }]
    );
    assert_eq!(forest.fault(), None);

    let mut w = loop_with_bridge(2);
    w.u8(MARK_STITCH_BRIDGE).addr(0x10).addr(0x9999);
    let forest = decode(w);
    assert_eq!(
        forest.fault().map(|f| &f.error),
        Some(&DecodeError::NoTraceAtAddress(0x9999))
    );
    assert_eq!(forest.len(), 2);
}

#[test]
fn redirect_assembler_relinks_guard() {
    let mut w = loop_with_bridge(3);
    start_trace(&mut w, 3, 0x300, "loop", 0);
    w.u8(MARK_TRACE).addr(0x300);
    w.u8(MARK_REDIRECT_ASSEMBLER).addr(0x10).addr(0x11).addr(0x300);
    let forest = decode(w);
    assert_eq!(forest.fault(), None);

    let lp = forest.get(0x100).unwrap();
    assert_eq!(lp.bridges().collect::<Vec<_>>(), [0x300]);
    assert!(forest.get(0x200).unwrap().links_in().is_empty());
    assert_eq!(forest.get(0x300).unwrap().links_in().len(), 1);
    assert_eq!(forest.point_for_descr(0x11), forest.point_for_descr(0x10));

    let mut w = loop_with_bridge(3);
    w.u8(MARK_REDIRECT_ASSEMBLER).addr(0x10).addr(0x11).addr(0x4444);
    let forest = decode(w);
    assert_eq!(
        forest.fault().map(|f| &f.error),
        Some(&DecodeError::UnknownTrace(0x4444))
    );
}

#[test]
fn unknown_opcode_keeps_earlier_traces() {
    let mut w = loop_with_bridge(2);
    start_trace(&mut w, 2, 0x300, "loop", 0);
    w.u8(MARK_TRACE).addr(0x300);
    let marker_offset = w.len() as u64;
    op(&mut w, 2, 99, "i5,i4");
    op(&mut w, 2, 1, "i6,i5,1");
    let forest = decode(w);

    let fault = forest.fault().unwrap();
    assert_eq!(fault.offset, marker_offset);
    assert_eq!(fault.marker, Some(MARK_RESOP));
    assert_eq!(
        fault.error,
        DecodeError::UnknownOpcode {
            opnum: 99,
            offset: marker_offset + 1
        }
    );
    assert_eq!(forest.decoded_until(), marker_offset);
    assert_eq!(forest.len(), 3);
    assert_eq!(forest.get(0x100).unwrap().stage(StageKind::NoOpt).unwrap().ops().len(), 4);
    assert!(forest.get(0x300).unwrap().stage(StageKind::NoOpt).unwrap().is_empty());
}

#[test]
fn structural_faults() {
    let mut w = writer(2);
    w.u8(MARK_RESOP_META).u16(0);
    let forest = decode(w);
    assert_eq!(
        forest.fault().map(|f| &f.error),
        Some(&DecodeError::OpcodeTableRedeclared)
    );

    let mut w = writer(2);
    start_trace(&mut w, 2, 0x100, "loop", 0);
    start_trace(&mut w, 2, 0x100, "loop", 0);
    assert_eq!(
        decode(w).fault().map(|f| &f.error),
        Some(&DecodeError::DuplicateTrace(0x100))
    );

    let mut w = writer(2);
    start_trace(&mut w, 2, 0x100, "entry", 0);
    assert_eq!(
        decode(w).fault().map(|f| &f.error),
        Some(&DecodeError::UnknownTraceKind("entry".into()))
    );

    let mut w = writer(2);
    start_trace(&mut w, 2, 0x100, "loop", 0);
    w.u8(MARK_TRACE_OPT).addr(0x101);
    assert_eq!(
        decode(w).fault().map(|f| &f.error),
        Some(&DecodeError::TraceIdMismatch {
            expected: Some(0x100),
            found: 0x101
        })
    );

    let mut w = writer(2);
    w.u8(MARK_TRACE).addr(0x100);
    assert_eq!(
        decode(w).fault().map(|f| &f.error),
        Some(&DecodeError::TraceIdMismatch {
            expected: None,
            found: 0x100
        })
    );

    let mut w = writer(2);
    start_trace(&mut w, 2, 0x100, "loop", 0);
    op(&mut w, 2, 1, "i2,i1,1");
    assert_eq!(
        decode(w).fault().map(|f| &f.error),
        Some(&DecodeError::NoActiveStage(0x100))
    );
}

#[test]
fn counter_ticks() {
    let mut w = loop_with_bridge(2);
    for count in [15, 0, 15] {
        w.u8(MARK_JITLOG_COUNTER).addr(0x100).u8(COUNTER_ENTRY).u64(count);
    }
    w.u8(MARK_JITLOG_COUNTER).addr(0xdead).u8(COUNTER_ENTRY).u64(5);
    let forest = decode(w);

    assert_eq!(forest.get(0x100).unwrap().enter_count(), 30);
    assert_eq!(forest.get(0x200).unwrap().enter_count(), 0);
    assert_eq!(
        forest.anomalies(),
        [Anomaly::UnattributedCounter {
            addr: 0xdead,
            kind: 'e',
            count: 5
        }]
    );
}

#[test]
fn huge_counter_ticks_saturate() {
    let mut w = loop_with_bridge(2);
    let half = u64::MAX / 2 + 1;
    for _ in 0..2 {
        w.u8(MARK_JITLOG_COUNTER).addr(0x100).u8(COUNTER_ENTRY).u64(half);
        w.u8(MARK_JITLOG_COUNTER).addr(0x20).u8(COUNTER_LABEL).u64(half);
    }
    let forest = decode(w);

    assert_eq!(forest.fault(), None);
    let trace = forest.get(0x100).unwrap();
    assert_eq!(trace.enter_count(), u64::MAX);
    assert_eq!(trace.point_counters().values().copied().collect::<Vec<_>>(), [u64::MAX]);
}

#[test]
fn typed_counters_attribute_to_points() {
    let mut w = loop_with_bridge(2);
    // Counts entries into the bridge attached to guard 0x10.
    w.u8(MARK_JITLOG_COUNTER).addr(0x10).u8(COUNTER_BRIDGE).u64(7);
    // Counts iterations at the label.
    w.u8(MARK_JITLOG_COUNTER).addr(0x20).u8(COUNTER_LABEL).u64(3);
    let forest = decode(w);
    assert!(forest.anomalies().is_empty());
    assert_eq!(forest.get(0x200).unwrap().enter_count(), 7);
    let label = OpRef {
        stage: StageKind::NoOpt,
        index: 0,
    };
    assert_eq!(forest.get(0x100).unwrap().point_counter(label), 3);
}

#[test]
fn increment_debug_counter_binds_preceding_descr() {
    let mut w = writer(2);
    start_trace(&mut w, 2, 0x100, "loop", 0);
    w.u8(MARK_TRACE_OPT).addr(0x100);
    op_descr(&mut w, 2, 0, ",p0,<Label0x30>", 0x30);
    op(&mut w, 2, 4, ",ConstInt(1)");
    w.u8(MARK_JITLOG_COUNTER).addr(0x30).u8(COUNTER_ENTRY).u64(11);
    let forest = decode(w);
    let counter = OpRef {
        stage: StageKind::Opt,
        index: 1,
    };
    assert_eq!(forest.get(0x100).unwrap().point_counter(counter), 11);
    assert!(forest.anomalies().is_empty());
}

#[test]
fn soft_anomalies() {
    let mut w = loop_with_bridge(2);
    // Same descr again, and the bridge's bounds at the loop's address.
    start_trace(&mut w, 2, 0x300, "loop", 0);
    w.u8(MARK_TRACE).addr(0x300);
    op_descr(&mut w, 2, 2, ",i9,<Guard0x10>", 0x10);
    w.u8(MARK_ASM_ADDR).addr(0x5000).addr(0x5080);
    w.u8(MARK_ASM_ADDR).addr(0x7000).addr(0x7080);
    w.u8(MARK_ABORT_TRACE).addr(0x400);
    w.u8(MARK_ABORT_TRACE).addr(0x300);
    let forest = decode(w);

    assert_eq!(forest.fault(), None);
    assert_eq!(forest.anomalies().len(), 4);
    assert!(matches!(
        forest.anomalies()[0],
        Anomaly::DuplicateDescr { descr: 0x10, .. }
    ));
    assert_eq!(
        forest.anomalies()[1],
        Anomaly::AddressCollision {
            addr: 0x5000,
            previous: 0x100,
            trace: 0x300
        }
    );
    assert_eq!(
        forest.anomalies()[2],
        Anomaly::AddressBoundsReassigned { trace: 0x300 }
    );
    assert_eq!(forest.anomalies()[3], Anomaly::UnknownAbortedTrace(0x400));
    assert_eq!(forest.point_for_descr(0x10).unwrap().trace, 0x100);
    assert!(forest.get(0x300).unwrap().is_aborted());
}

#[test]
fn reentering_noopt_appends_to_the_same_stage() {
    let mut w = writer(2);
    start_trace(&mut w, 2, 0x100, "loop", 0);
    w.u8(MARK_TRACE).addr(0x100);
    op(&mut w, 2, 1, "i2,i1,1");
    w.u8(MARK_TRACE).addr(0x100);
    op(&mut w, 2, 1, "i3,i2,1");
    let forest = decode(w);
    assert_eq!(forest.fault(), None);
    let trace = forest.get(0x100).unwrap();
    assert!(trace.is_unrolled());
    assert_eq!(trace.stages().count(), 1);
    assert_eq!(trace.stage(StageKind::NoOpt).unwrap().ops().len(), 2);
}

fn merge_point_trace() -> LogWriter {
    let mut w = writer(2);
    start_trace(&mut w, 2, 0x100, "loop", 0);
    w.u8(MARK_TRACE).addr(0x100);
    w.u8(MARK_INIT_MERGE_POINT).u8(3);
    w.u8(MergePointType::FILENAME.0).u8(b's');
    w.u8(MergePointType::LINENO.0).u8(b'i');
    w.u8(MergePointType::SCOPE.0).u8(b's');
    w.u8(MARK_COMMON_PREFIX).u8(0).string("/src/");
    w.u8(MARK_MERGE_POINT);
    w.u8(STRING_WITH_PREFIX).string("app.py");
    w.u8(INTEGER_TAG).u64(12);
    w.u8(STRING_STANDALONE).string("compute");
    op(&mut w, 2, 1, "i2,i1,1");
    w.u8(MARK_COMMON_PREFIX).u8(0).string("/src/app.py");
    w.u8(MARK_MERGE_POINT);
    w.u8(STRING_PREFIX_ONLY);
    w.u8(INTEGER_TAG).u64(13);
    w.u8(STRING_STANDALONE).string("compute");
    w
}

#[test]
fn merge_points() {
    let forest = decode(merge_point_trace());
    assert_eq!(forest.fault(), None);
    let trace = forest.get(0x100).unwrap();
    let stage = trace.stage(StageKind::NoOpt).unwrap();
    assert_eq!(stage.merge_points().len(), 2);
    assert_eq!(stage.ops().len(), 1);

    let rendered: Vec<String> = stage.operations().map(|op| op.to_string()).collect();
    assert_eq!(
        rendered,
        [
            "debug_merge_point(<compute> /src/app.py:12)",
            "i2 = int_add(i1, 1)",
            "debug_merge_point(<compute> /src/app.py:13)",
        ]
    );
    let locations: Vec<_> = stage.operations().filter_map(|op| op.source_location()).collect();
    assert_eq!(locations, [("/src/app.py", 12), ("/src/app.py", 13)]);

    let lines: Vec<u64> = trace.source_lines()["/src/app.py"].iter().copied().collect();
    assert_eq!(lines, [12, 13]);
}

#[test]
fn merge_point_faults() {
    let mut w = writer(2);
    start_trace(&mut w, 2, 0x100, "loop", 0);
    w.u8(MARK_TRACE).addr(0x100);
    w.u8(MARK_MERGE_POINT).u8(0);
    assert_eq!(
        decode(w).fault().map(|f| &f.error),
        Some(&DecodeError::MergePointLayoutMissing)
    );

    let mut w = merge_point_trace();
    w.u8(MARK_COMMON_PREFIX).u8(1).string("12");
    assert_eq!(
        decode(w).fault().map(|f| &f.error),
        Some(&DecodeError::InvalidPrefixField(1))
    );

    let mut w = merge_point_trace();
    w.u8(MARK_MERGE_POINT).u8(0x42);
    assert_eq!(
        decode(w).fault().map(|f| &f.error),
        Some(&DecodeError::InvalidValueTag(0x42))
    );
}

#[test]
fn source_lines_round_trip() {
    let mut forest = decode(merge_point_trace());
    let mut files = HashMap::new();
    files.insert(
        "/src/app.py".to_string(),
        (1..=20).map(|i| format!("    line {i}\n")).collect::<String>(),
    );
    assert_eq!(forest.extract_source_code_lines(&mut files), 2);
    assert_eq!(forest.extract_source_code_lines(&mut files), 0);
    let cache = forest.source_cache().clone();
    let line = cache.get("/src/app.py", 12).unwrap();
    assert_eq!((line.indent, line.text.as_str()), (4, "line 12"));

    let mut w = writer(2);
    cache.encode(&mut w);
    // A later duplicate of line 12 must not replace the first one.
    w.u8(MARK_SOURCE_CODE).string("/src/app.py").u16(1);
    w.u16(12).u8(0).string("replaced");
    w.u8(MARK_SOURCE_CODE).string("other.py").u16(2);
    w.u16(1).u8(0).string("import os");
    w.u16(1).u8(2).string("import sys");
    let decoded = decode(w);
    assert_eq!(decoded.fault(), None);

    let mut expected = cache.clone();
    expected.insert("other.py", 1, SourceLine::from_raw("import os"));
    assert_eq!(decoded.source_cache(), &expected);
}

#[test]
fn core_dumps_with_patches() {
    let mut w = writer(3);
    start_trace(&mut w, 3, 0x100, "loop", 0);
    w.u8(MARK_TRACE_ASM).addr(0x100);
    op(&mut w, 3, 1, "i2,i1,1");
    w.u8(MARK_ASM).u16(0x10).blob(&[0x90; 8]);
    op(&mut w, 3, 2, ",i2");
    w.u8(MARK_ASM_ADDR).addr(0x5000).addr(0x5100);
    w.u8(MARK_CODE_PATCH).addr(0x5012).blob(&[0xcc, 0xcc]);
    w.u8(MARK_CODE_PATCH).addr(0x9000).blob(&[0xcc]);
    w.u8(MARK_CODE_PATCH).addr(0x5016).blob(&[0xe9, 1, 2, 3, 4]);
    let forest = decode(w);
    assert_eq!(forest.fault(), None);

    let op = OpRef {
        stage: StageKind::Asm,
        index: 0,
    };
    let first = forest.patches()[0].time;
    assert_eq!(forest.core_dump_at(0x100, op, first - 1), Some(vec![0x90; 8]));
    assert_eq!(
        forest.core_dump_at(0x100, op, first),
        Some(vec![0x90, 0x90, 0xcc, 0xcc, 0x90, 0x90, 0x90, 0x90])
    );
    let now = forest.time();
    let patched = forest.core_dump_at(0x100, op, now).unwrap();
    assert_eq!(patched, [0x90, 0x90, 0xcc, 0xcc, 0x90, 0x90, 0xe9, 1]);

    let second = OpRef {
        stage: StageKind::Asm,
        index: 1,
    };
    assert_eq!(forest.core_dump_at(0x100, second, now), None);
}

#[test]
fn version_gating() {
    let mut w = writer(2);
    w.u8(MARK_CODE_PATCH).addr(0x5000).blob(&[1]);
    let fault = decode(w).fault().cloned().unwrap();
    assert_eq!(
        fault.error,
        DecodeError::UnknownMarker {
            marker: MARK_CODE_PATCH,
            version: 2
        }
    );

    // Version 1 has no jit driver name and no fail args.
    let mut w = writer(1);
    start_trace(&mut w, 1, 0x100, "loop", 0);
    w.u8(MARK_TRACE).addr(0x100);
    op(&mut w, 1, 1, "i2,i1,1");
    let forest = decode(w);
    assert_eq!(forest.fault(), None);
    let trace = forest.get(0x100).unwrap();
    assert_eq!(trace.jit_driver(), None);
    assert_eq!(trace.stage(StageKind::NoOpt).unwrap().ops()[0].fail_args, None);
}

#[test]
fn four_byte_words() {
    let mut w = writer_with_word_size(2, WordSize::Four);
    start_trace(&mut w, 2, 0x100, "loop", 0);
    w.u8(MARK_TRACE).addr(0x100);
    w.u8(MARK_ASM_ADDR).addr(0x5000).addr(0x5100);
    let forest = decode(w);
    assert_eq!(forest.header().word_size, WordSize::Four);
    assert_eq!(forest.get(0x100).unwrap().addrs(), Some((0x5000, 0x5100)));
}

#[test]
fn truncated_stream() {
    let bytes = loop_with_bridge(2).into_bytes();
    let forest = decode_jitlog_bytes(&bytes[..bytes.len() - 3]).unwrap();
    assert_eq!(forest.fault().map(|f| &f.error), Some(&DecodeError::Truncated));
    assert_eq!(forest.len(), 2);
    assert!(forest.get(0x200).unwrap().links_in().is_empty());
}

#[test]
fn fatal_header_errors() {
    assert!(matches!(
        decode_jitlog_bytes(&[0x50, 1, 0, 0, 0, 0, 0, 0]),
        Err(Error::UnexpectedFormatFlag {
            expected: 0x23,
            found: 0x50
        })
    ));
    let w = LogWriter::new(&LogHeader {
        format_flag: JITLOG_FORMAT_FLAG,
        version: 4,
        word_size: WordSize::Eight,
        machine: String::new(),
    });
    assert!(matches!(
        decode_jitlog_bytes(w.as_bytes()),
        Err(Error::UnsupportedVersion(4))
    ));
}

#[cfg(feature = "zstd")]
#[test]
fn compressed_stream() {
    let bytes = loop_with_bridge(2).into_bytes();
    let mut compressed = vec![0; zstd_safe::compress_bound(bytes.len())];
    let len = zstd_safe::compress(&mut compressed[..], &bytes, 3).unwrap();
    compressed.truncate(len);
    assert_eq!(compressed[..4], jitprof_data::ZSTD_MAGIC);

    let forest = decode_jitlog_bytes(&compressed).unwrap();
    assert_eq!(forest.fault(), None);
    assert_eq!(forest.len(), 2);
    assert_eq!(forest.get(0x200).unwrap().links_in().len(), 1);
}
