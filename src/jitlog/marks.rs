//! Marker bytes of the jitlog format and the routines which decode them.

use std::collections::HashMap;

use crate::cursor::BinaryCursor;
use crate::decoder::MarkerRegistry;
use crate::error::DecodeError;

use super::forest::TraceForest;
use super::merge_point::FieldDecoder;
use super::trace::StageKind;

/// The format flag of jitlog streams.
pub const JITLOG_FORMAT_FLAG: u8 = 0x23;
pub const JITLOG_VERSIONS: std::ops::RangeInclusive<u16> = 1..=3;

pub const MARK_INPUT_ARGS: u8 = 0x10;
pub const MARK_RESOP_META: u8 = 0x11;
pub const MARK_RESOP: u8 = 0x12;
pub const MARK_RESOP_DESCR: u8 = 0x13;
pub const MARK_ASM_ADDR: u8 = 0x14;
pub const MARK_ASM: u8 = 0x15;
pub const MARK_TRACE: u8 = 0x16;
pub const MARK_TRACE_OPT: u8 = 0x17;
pub const MARK_TRACE_ASM: u8 = 0x18;
pub const MARK_STITCH_BRIDGE: u8 = 0x19;
pub const MARK_START_TRACE: u8 = 0x1a;
pub const MARK_JITLOG_COUNTER: u8 = 0x1b;
pub const MARK_INIT_MERGE_POINT: u8 = 0x1c;
pub const MARK_MERGE_POINT: u8 = 0x1d;
pub const MARK_COMMON_PREFIX: u8 = 0x1e;
pub const MARK_ABORT_TRACE: u8 = 0x1f;
pub const MARK_SOURCE_CODE: u8 = 0x20;
pub const MARK_REDIRECT_ASSEMBLER: u8 = 0x21;
pub const MARK_CODE_PATCH: u8 = 0x22;

type Current = Option<u64>;

/// The routine table for a jitlog version.
pub fn registry(version: u16) -> Option<MarkerRegistry<TraceForest>> {
    let last = match version {
        1 | 2 => MARK_SOURCE_CODE,
        3 => MARK_CODE_PATCH,
        _ => return None,
    };
    let mut registry = MarkerRegistry::new(version, MARK_INPUT_ARGS..=last);
    registry
        .register(MARK_INPUT_ARGS, read_input_args)
        .register(MARK_RESOP_META, read_resop_meta)
        .register(MARK_RESOP, read_resop)
        .register(MARK_RESOP_DESCR, read_resop_descr)
        .register(MARK_ASM_ADDR, read_asm_addr)
        .register(MARK_ASM, read_asm)
        .register(MARK_TRACE, read_trace_noopt)
        .register(MARK_TRACE_OPT, read_trace_opt)
        .register(MARK_TRACE_ASM, read_trace_asm)
        .register(MARK_STITCH_BRIDGE, read_stitch_bridge)
        .register(MARK_START_TRACE, read_start_trace)
        .register(MARK_JITLOG_COUNTER, read_counter)
        .register(MARK_INIT_MERGE_POINT, read_init_merge_point)
        .register(MARK_MERGE_POINT, read_merge_point)
        .register(MARK_COMMON_PREFIX, read_common_prefix)
        .register(MARK_ABORT_TRACE, read_abort_trace)
        .register(MARK_SOURCE_CODE, read_source_code);
    if version >= 3 {
        registry
            .register(MARK_REDIRECT_ASSEMBLER, read_redirect_assembler)
            .register(MARK_CODE_PATCH, read_code_patch);
    }
    Some(registry)
}

fn read_input_args(forest: &mut TraceForest, current: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let args = cursor.read_string()?;
    forest.set_input_args(*current, args)
}

fn read_resop_meta(forest: &mut TraceForest, _: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let count = cursor.read_u16()?;
    let mut opcodes = HashMap::with_capacity(usize::from(count));
    for _ in 0..count {
        let opnum = cursor.read_u16()?;
        let name = cursor.read_string()?;
        opcodes.insert(opnum, name.to_owned());
    }
    forest.declare_opcodes(opcodes)
}

fn read_resop(forest: &mut TraceForest, current: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let offset = cursor.offset();
    let opnum = cursor.read_u16()?;
    let args = cursor.read_string()?;
    let fail_args = read_fail_args(cursor)?;
    forest.add_operation(*current, offset, opnum, args, fail_args, None)
}

fn read_resop_descr(forest: &mut TraceForest, current: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let offset = cursor.offset();
    let opnum = cursor.read_u16()?;
    let args = cursor.read_string()?;
    let fail_args = read_fail_args(cursor)?;
    let descr = cursor.read_addr()?;
    forest.add_operation(*current, offset, opnum, args, fail_args, Some(descr))
}

fn read_fail_args<'a>(cursor: &mut BinaryCursor<'a>) -> Result<Option<&'a str>, DecodeError> {
    if cursor.version() < 2 {
        return Ok(None);
    }
    Ok(Some(cursor.read_string()?))
}

fn read_asm_addr(forest: &mut TraceForest, current: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let start = cursor.read_addr()?;
    let end = cursor.read_addr()?;
    forest.set_addr_bounds(*current, start, end)
}

fn read_asm(forest: &mut TraceForest, current: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let offset = cursor.read_u16()?;
    let bytes = cursor.read_blob()?;
    forest.attach_core_dump(*current, offset, bytes)
}

fn read_trace_noopt(forest: &mut TraceForest, current: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let id = cursor.read_addr()?;
    forest.enter_stage(*current, id, StageKind::NoOpt)
}

fn read_trace_opt(forest: &mut TraceForest, current: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let id = cursor.read_addr()?;
    forest.enter_stage(*current, id, StageKind::Opt)
}

fn read_trace_asm(forest: &mut TraceForest, current: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let id = cursor.read_addr()?;
    forest.enter_stage(*current, id, StageKind::Asm)
}

fn read_stitch_bridge(forest: &mut TraceForest, _: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let descr = cursor.read_addr()?;
    let target = cursor.read_addr()?;
    forest.stitch_bridge(descr, target)
}

fn read_start_trace(forest: &mut TraceForest, current: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let id = cursor.read_addr()?;
    let kind = cursor.read_string()?;
    let attached_descr = cursor.read_addr()?;
    let jd_name = if cursor.version() >= 2 {
        Some(cursor.read_string()?)
    } else {
        None
    };
    forest.start_trace(current, id, kind, attached_descr, jd_name)
}

fn read_counter(forest: &mut TraceForest, _: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let addr = cursor.read_addr()?;
    let kind = cursor.read_u8()?;
    let count = cursor.read_u64()?;
    forest.add_counter(addr, kind, count);
    Ok(())
}

fn read_init_merge_point(forest: &mut TraceForest, current: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let count = cursor.read_u8()?;
    let decoders = (0..count)
        .map(|_| FieldDecoder::parse_declaration(cursor))
        .collect::<Result<Vec<_>, _>>()?;
    forest.init_merge_point(*current, decoders)
}

fn read_merge_point(forest: &mut TraceForest, current: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let decoders = forest.merge_point_decoders(*current)?;
    let mut values = Vec::with_capacity(decoders.len());
    // At most 255 fields were declared, so the position cannot overflow.
    for (decoder, position) in decoders.iter().zip(0u8..) {
        values.push((decoder.field, decoder.decode(position, cursor)?));
    }
    forest.add_merge_point(*current, values)
}

fn read_common_prefix(forest: &mut TraceForest, current: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let field = cursor.read_u8()?;
    let prefix = cursor.read_string()?;
    forest.set_common_prefix(*current, field, prefix)
}

fn read_abort_trace(forest: &mut TraceForest, _: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let id = cursor.read_addr()?;
    forest.abort_trace(id);
    Ok(())
}

fn read_source_code(forest: &mut TraceForest, _: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let file = cursor.read_string()?;
    let count = cursor.read_u16()?;
    let mut lines = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let line = cursor.read_u16()?;
        let indent = cursor.read_u8()?;
        let text = cursor.read_string()?;
        lines.push((line, indent, text));
    }
    for (line, indent, text) in lines {
        forest.add_source_line(file, line, indent, text);
    }
    Ok(())
}

fn read_redirect_assembler(forest: &mut TraceForest, _: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let old_descr = cursor.read_addr()?;
    let new_descr = cursor.read_addr()?;
    let target = cursor.read_addr()?;
    forest.redirect_assembler(old_descr, new_descr, target)
}

fn read_code_patch(forest: &mut TraceForest, _: &mut Current, cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let addr = cursor.read_addr()?;
    let bytes = cursor.read_blob()?;
    forest.add_patch(addr, bytes);
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{registry, MARK_CODE_PATCH, MARK_INPUT_ARGS, MARK_SOURCE_CODE};
    use crate::error::DecodeError;

    #[test]
    fn version_ranges() {
        assert_eq!(registry(1).unwrap().markers(), MARK_INPUT_ARGS..=MARK_SOURCE_CODE);
        assert_eq!(registry(2).unwrap().markers(), MARK_INPUT_ARGS..=MARK_SOURCE_CODE);
        assert_eq!(registry(3).unwrap().markers(), MARK_INPUT_ARGS..=MARK_CODE_PATCH);
        assert!(registry(0).is_none());
        assert!(registry(4).is_none());
        assert!(matches!(
            registry(2).unwrap().lookup(MARK_CODE_PATCH),
            Err(DecodeError::UnknownMarker { marker: 0x22, version: 2 })
        ));
        let v3 = registry(3).unwrap();
        for marker in v3.markers() {
            assert!(v3.lookup(marker).is_ok(), "marker {marker:#x}");
        }
    }
}
