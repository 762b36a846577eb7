use crate::cursor::BinaryCursor;
use crate::error::DecodeError;

use super::ops::MergePointValue;

/// The meaning of a merge point field.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MergePointType(pub u8);

impl MergePointType {
    pub const FILENAME: Self = Self(0x01);
    pub const LINENO: Self = Self(0x02);
    pub const INDEX: Self = Self(0x04);
    pub const SCOPE: Self = Self(0x08);
    pub const OPCODE: Self = Self(0x10);
}

impl std::fmt::Debug for MergePointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::FILENAME => "FILENAME".fmt(f),
            Self::LINENO => "LINENO".fmt(f),
            Self::INDEX => "INDEX".fmt(f),
            Self::SCOPE => "SCOPE".fmt(f),
            Self::OPCODE => "OPCODE".fmt(f),
            other => f.write_fmt(format_args!("Unknown MergePointType {:#04x}", other.0)),
        }
    }
}

/// How a field's values are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// `'s'`: a tag byte selecting one of three prefix-compressed encodings.
    String,
    /// `'i'`: a `0x00` tag byte followed by a little-endian u64.
    Integer,
}

impl FieldKind {
    pub fn from_char(c: u8) -> Option<Self> {
        match c {
            b's' => Some(FieldKind::String),
            b'i' => Some(FieldKind::Integer),
            _ => None,
        }
    }

    pub fn as_char(self) -> u8 {
        match self {
            FieldKind::String => b's',
            FieldKind::Integer => b'i',
        }
    }
}

/// Reuse the declared prefix as the whole value.
pub const STRING_PREFIX_ONLY: u8 = 0xef;
/// The declared prefix followed by a length-prefixed suffix.
pub const STRING_WITH_PREFIX: u8 = 0x00;
/// A length-prefixed string which ignores the prefix.
pub const STRING_STANDALONE: u8 = 0xff;
pub const INTEGER_TAG: u8 = 0x00;

/// Decodes the values of one merge point field.
///
/// Merge points are logged extremely often and most string values share a
/// long prefix (file path, scope name) with the previous one, so string
/// fields can refer back to a prefix declared by a COMMON_PREFIX record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecoder {
    pub field: MergePointType,
    pub kind: FieldKind,
    prefix: Option<String>,
}

impl FieldDecoder {
    pub fn new(field: MergePointType, kind: FieldKind) -> Self {
        Self {
            field,
            kind,
            prefix: None,
        }
    }

    /// Read one field declaration: a semantic type byte and a kind char.
    pub fn parse_declaration(cursor: &mut BinaryCursor) -> Result<Self, DecodeError> {
        let field = MergePointType(cursor.read_u8()?);
        let kind_char = cursor.read_u8()?;
        let kind = FieldKind::from_char(kind_char).ok_or(DecodeError::UnknownFieldKind(kind_char))?;
        Ok(Self::new(field, kind))
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub(crate) fn set_prefix(&mut self, prefix: String) {
        self.prefix = Some(prefix);
    }

    /// Decode one value. `position` is this decoder's index in the stage's
    /// field list, used for error reporting.
    pub fn decode(
        &self,
        position: u8,
        cursor: &mut BinaryCursor,
    ) -> Result<MergePointValue, DecodeError> {
        let tag = cursor.read_u8()?;
        match (self.kind, tag) {
            (FieldKind::Integer, INTEGER_TAG) => Ok(MergePointValue::Int(cursor.read_u64()?)),
            (FieldKind::String, STRING_PREFIX_ONLY) => {
                let prefix = self
                    .prefix
                    .as_ref()
                    .ok_or(DecodeError::MissingCommonPrefix(position))?;
                Ok(MergePointValue::Str(prefix.clone()))
            }
            (FieldKind::String, STRING_WITH_PREFIX) => {
                let prefix = self
                    .prefix
                    .as_ref()
                    .ok_or(DecodeError::MissingCommonPrefix(position))?;
                let suffix = cursor.read_string()?;
                Ok(MergePointValue::Str(format!("{prefix}{suffix}")))
            }
            (FieldKind::String, STRING_STANDALONE) => {
                Ok(MergePointValue::Str(cursor.read_string()?.to_owned()))
            }
            (_, tag) => Err(DecodeError::InvalidValueTag(tag)),
        }
    }
}
