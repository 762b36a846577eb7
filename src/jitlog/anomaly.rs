use super::trace::PointInTrace;

/// A recoverable oddity in a jitlog.
///
/// Unlike a [`DecodeFault`](crate::DecodeFault), an anomaly does not stop
/// decoding. Anomalies are collected on the forest and logged as warnings.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Anomaly {
    #[error("Descriptor {descr:#x} was registered twice, keeping the first registration at {kept:?}")]
    DuplicateDescr { descr: u64, kept: PointInTrace },

    #[error("Trace {trace:#x} already has address bounds")]
    AddressBoundsReassigned { trace: u64 },

    #[error("Trace {trace:#x} starts at {addr:#x}, where trace {previous:#x} was before")]
    AddressCollision { addr: u64, previous: u64, trace: u64 },

    #[error("Trace {trace:#x} got machine code before any operation")]
    CoreDumpWithoutOperation { trace: u64 },

    #[error("Operation {index} of trace {trace:#x} already has machine code")]
    CoreDumpReassigned { trace: u64, index: usize },

    #[error("Bridge {bridge:#x} is attached to descriptor {descr:#x}, which is unknown")]
    MissingBridgeOrigin { descr: u64, bridge: u64 },

    #[error("Redirected descriptor {descr:#x} is unknown")]
    MissingRedirectOrigin { descr: u64 },

    #[error("Counter {addr:#x} of kind {kind:?} with count {count} matches no trace")]
    UnattributedCounter { addr: u64, kind: char, count: u64 },

    #[error("Aborted trace {0:#x} was never started")]
    UnknownAbortedTrace(u64),
}
