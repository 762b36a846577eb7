use std::fmt;

use linear_map::LinearMap;

use super::merge_point::MergePointType;

/// A descriptor attached to an operation: the label printed in the trace, and
/// the number which other records use to refer to this operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descr {
    pub label: String,
    pub number: u64,
}

/// A captured snippet of the machine code emitted for one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreDump {
    /// The offset of the snippet from the start of the trace's assembled code.
    pub offset: u16,
    pub bytes: Vec<u8>,
}

/// One operation of a trace stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlatOp {
    /// The position of this operation in its stage's operation list.
    pub index: usize,
    pub opnum: u16,
    pub opname: String,
    pub args: Vec<String>,
    pub result: Option<String>,
    pub descr: Option<Descr>,
    /// Only operations of the `asm` stage have a core dump, and only if the
    /// runtime logged one.
    pub core_dump: Option<CoreDump>,
    /// The values kept alive when a guard fails. Only present from version 2 on.
    pub fail_args: Option<Vec<String>>,
}

impl FlatOp {
    /// Split `res,arg0,arg1,...` into the result name and the arguments.
    ///
    /// An empty result name means the operation produces no value. If
    /// `has_descr` is set, the last argument is the descriptor label.
    pub(crate) fn split_args(list: &str, has_descr: bool) -> (Option<String>, Vec<String>, Option<String>) {
        let mut parts = list.split(',');
        let result = parts
            .next()
            .filter(|res| !res.is_empty())
            .map(str::to_owned);
        let mut args: Vec<String> = parts.map(str::to_owned).collect();
        let label = if has_descr { args.pop() } else { None };
        (result, args, label)
    }

    /// Parse a comma-separated fail argument list. An empty list is `None`.
    pub(crate) fn split_fail_args(list: &str) -> Option<Vec<String>> {
        if list.is_empty() {
            return None;
        }
        Some(list.split(',').map(str::to_owned).collect())
    }

    pub fn is_guard(&self) -> bool {
        self.opname.starts_with("guard_")
    }
}

impl fmt::Display for FlatOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(result) = &self.result {
            write!(f, "{result} = ")?;
        }
        write!(f, "{}({}", self.opname, self.args.join(", "))?;
        if let Some(descr) = &self.descr {
            if !self.args.is_empty() {
                f.write_str(", ")?;
            }
            write!(f, "descr={}", descr.label)?;
        }
        f.write_str(")")?;
        if let Some(fail_args) = &self.fail_args {
            write!(f, " [{}]", fail_args.join(", "))?;
        }
        Ok(())
    }
}

/// A decoded merge point field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergePointValue {
    Str(String),
    Int(u64),
}

impl MergePointValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            MergePointValue::Str(s) => Some(s),
            MergePointValue::Int(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<u64> {
        match self {
            MergePointValue::Int(i) => Some(*i),
            MergePointValue::Str(_) => None,
        }
    }
}

/// A debug annotation tying a position in the trace to an interpreter source location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePoint {
    /// The position of this merge point in its stage's merge point list.
    pub index: usize,
    pub values: LinearMap<MergePointType, MergePointValue>,
}

impl MergePoint {
    pub fn get(&self, field: MergePointType) -> Option<&MergePointValue> {
        self.values.get(&field)
    }

    pub fn filename(&self) -> Option<&str> {
        self.get(MergePointType::FILENAME)?.as_str()
    }

    pub fn line(&self) -> Option<u64> {
        self.get(MergePointType::LINENO)?.as_int()
    }

    pub fn scope(&self) -> Option<&str> {
        self.get(MergePointType::SCOPE)?.as_str()
    }

    pub fn opcode(&self) -> Option<&str> {
        self.get(MergePointType::OPCODE)?.as_str()
    }

    pub fn bytecode_index(&self) -> Option<u64> {
        self.get(MergePointType::INDEX)?.as_int()
    }
}

impl fmt::Display for MergePoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("debug_merge_point(")?;
        if let Some(scope) = self.scope() {
            write!(f, "<{scope}> ")?;
        }
        match (self.filename(), self.line()) {
            (Some(file), Some(line)) => write!(f, "{file}:{line}")?,
            (Some(file), None) => f.write_str(file)?,
            (None, Some(line)) => write!(f, "line {line}")?,
            (None, None) => {}
        }
        if let Some(index) = self.bytecode_index() {
            write!(f, " #{index}")?;
        }
        if let Some(opcode) = self.opcode() {
            write!(f, " {opcode}")?;
        }
        f.write_str(")")
    }
}

/// An entry of a stage, in the order in which it was logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation<'a> {
    Flat(&'a FlatOp),
    MergePoint(&'a MergePoint),
}

impl<'a> Operation<'a> {
    pub fn core_dump(&self) -> Option<&'a CoreDump> {
        match self {
            Operation::Flat(op) => op.core_dump.as_ref(),
            Operation::MergePoint(_) => None,
        }
    }

    pub fn descr(&self) -> Option<&'a Descr> {
        match self {
            Operation::Flat(op) => op.descr.as_ref(),
            Operation::MergePoint(_) => None,
        }
    }

    /// The source location, for merge points which carry one.
    pub fn source_location(&self) -> Option<(&'a str, u64)> {
        match self {
            Operation::Flat(_) => None,
            Operation::MergePoint(mp) => Some((mp.filename()?, mp.line()?)),
        }
    }
}

impl fmt::Display for Operation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Flat(op) => op.fmt(f),
            Operation::MergePoint(mp) => mp.fmt(f),
        }
    }
}
