//! Marker bytes of the sampled profile format and the routines which decode them.

use crate::cursor::BinaryCursor;
use crate::decoder::MarkerRegistry;
use crate::error::DecodeError;

use super::{FrameKind, Profile, RawFrame, Sample, StartTime};

/// The format flag of sampled profile streams.
pub const PROFILE_FORMAT_FLAG: u8 = 0x50;
pub const PROFILE_VERSIONS: std::ops::RangeInclusive<u16> = 1..=3;

pub const MARKER_STACKTRACE: u8 = 0x01;
pub const MARKER_VIRTUAL_IP: u8 = 0x02;
pub const MARKER_TRAILER: u8 = 0x03;
pub const MARKER_META: u8 = 0x04;
pub const MARKER_NATIVE_SYMBOL: u8 = 0x05;
pub const MARKER_TIME_N_ZONE: u8 = 0x06;

/// The deepest stack a sample may have.
pub const MAX_STACK_DEPTH: u64 = 65536;

/// The raw frame kind values of STACKTRACE records.
pub const FRAME_KIND_CODE: u64 = 1;
pub const FRAME_KIND_JITTED: u64 = 3;
/// Marks a sample taken while the JIT was compiling.
pub const FRAME_KIND_JITTING: u64 = 4;

/// The routine table for a profile version.
pub fn registry(version: u16) -> Option<MarkerRegistry<Profile>> {
    let last = match version {
        1 => MARKER_META,
        2 | 3 => MARKER_TIME_N_ZONE,
        _ => return None,
    };
    let mut registry = MarkerRegistry::new(version, MARKER_STACKTRACE..=last);
    registry
        .register(MARKER_STACKTRACE, read_stacktrace)
        .register(MARKER_VIRTUAL_IP, read_virtual_ip)
        .register(MARKER_TRAILER, read_trailer)
        .register(MARKER_META, read_meta);
    if version >= 2 {
        registry
            .register(MARKER_NATIVE_SYMBOL, read_native_symbol)
            .register(MARKER_TIME_N_ZONE, read_time_and_zone);
    }
    Some(registry)
}

fn read_stacktrace(profile: &mut Profile, _: &mut (), cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let count = cursor.read_addr()?;
    let depth = cursor.read_addr()?;
    if depth > MAX_STACK_DEPTH {
        return Err(DecodeError::StackTooDeep(depth));
    }
    let mut frames = Vec::with_capacity(depth as usize);
    let mut jitting = false;
    for _ in 0..depth {
        let kind = cursor.read_addr()?;
        let addr = cursor.read_addr()?;
        let kind = match kind {
            FRAME_KIND_CODE => FrameKind::Code,
            FRAME_KIND_JITTED => FrameKind::Jitted,
            FRAME_KIND_JITTING => {
                jitting = true;
                continue;
            }
            other => return Err(DecodeError::UnknownFrameKind(other)),
        };
        frames.push(RawFrame { kind, addr });
    }
    let thread_id = cursor.read_addr()?;
    let memory_kb = if cursor.version() >= 3 {
        Some(cursor.read_addr()?)
    } else {
        None
    };
    // The stream lists the leaf first.
    frames.reverse();
    profile.samples.push(Sample {
        count,
        frames,
        thread_id,
        memory_kb,
        jitting,
    });
    Ok(())
}

fn read_virtual_ip(profile: &mut Profile, _: &mut (), cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let addr = cursor.read_addr()?;
    let name = cursor.read_string()?;
    profile.declare_virtual_ip(addr, name);
    Ok(())
}

fn read_trailer(profile: &mut Profile, _: &mut (), _: &mut BinaryCursor) -> Result<(), DecodeError> {
    profile.complete = true;
    Ok(())
}

fn read_meta(profile: &mut Profile, _: &mut (), cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let key = cursor.read_string()?;
    let value = cursor.read_string()?;
    profile.meta.push((key.to_owned(), value.to_owned()));
    Ok(())
}

fn read_native_symbol(profile: &mut Profile, _: &mut (), cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let addr = cursor.read_addr()?;
    let name = cursor.read_string()?;
    profile.declare_native_symbol(addr, name);
    Ok(())
}

fn read_time_and_zone(profile: &mut Profile, _: &mut (), cursor: &mut BinaryCursor) -> Result<(), DecodeError> {
    let secs = cursor.read_u64()?;
    let micros = cursor.read_u64()?;
    let zone = cursor.read_bytes(8)?;
    let zone_len = memchr::memchr(0, zone).unwrap_or(zone.len());
    let zone = String::from_utf8_lossy(&zone[..zone_len]).into_owned();
    profile.start_time = Some(StartTime { secs, micros, zone });
    Ok(())
}
