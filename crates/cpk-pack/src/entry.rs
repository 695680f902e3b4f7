use cpk_types::{ObjectKind, Oid, RawObject};

/// How an object arrives at the pack writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PackObjectKind {
    /// Complete object with its full data.
    Full(ObjectKind),
    /// Git-style copy/insert delta against `base`. The resolved object takes
    /// the base's kind.
    Delta { base: Oid },
}

impl PackObjectKind {
    /// Type byte in the pack format. Deltas never reach the wire, but keep a
    /// reserved byte so a stray one is reported rather than misread.
    pub fn type_byte(&self) -> u8 {
        match self {
            Self::Full(ObjectKind::Commit) => 1,
            Self::Full(ObjectKind::Tree) => 2,
            Self::Full(ObjectKind::Blob) => 3,
            Self::Full(ObjectKind::Tag) => 4,
            Self::Delta { .. } => 6,
        }
    }

    /// Parse a full-object type byte.
    pub fn kind_from_type_byte(byte: u8) -> Option<ObjectKind> {
        match byte {
            1 => Some(ObjectKind::Commit),
            2 => Some(ObjectKind::Tree),
            3 => Some(ObjectKind::Blob),
            4 => Some(ObjectKind::Tag),
            _ => None,
        }
    }
}

/// An object handed to the pack writer by the local repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceObject {
    pub oid: Oid,
    pub kind: PackObjectKind,
    pub data: Vec<u8>,
}

impl SourceObject {
    pub fn full(obj: RawObject) -> Self {
        Self {
            oid: obj.oid,
            kind: PackObjectKind::Full(obj.kind),
            data: obj.data,
        }
    }

    pub fn delta(oid: Oid, base: Oid, delta: Vec<u8>) -> Self {
        Self {
            oid,
            kind: PackObjectKind::Delta { base },
            data: delta,
        }
    }
}

impl From<RawObject> for SourceObject {
    fn from(obj: RawObject) -> Self {
        Self::full(obj)
    }
}
