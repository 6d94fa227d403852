use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::PropertyType;

/// Every failure the codec can report. Structural errors are fatal for the
/// whole file: once an offset is wrong nothing after it can be located.
#[derive(Debug, Error)]
pub enum FbxError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{}", if *ascii { "ASCII FBX files are not supported" } else { "invalid binary FBX header magic" })]
    InvalidHeader { ascii: bool },

    #[error("FBX version {found} unsupported, must be {minimum} or later")]
    UnsupportedVersion { found: u32, minimum: u32 },

    #[error("failed to read nested block sentinel at offset {offset}, expected all bytes to be 0")]
    MalformedSentinel { offset: u64 },

    #[error("scope length not reached: expected offset {expected}, found {found}")]
    LengthMismatch { expected: u64, found: u64 },

    #[error("records nested deeper than {limit} levels at offset {offset}")]
    TooDeep { offset: u64, limit: usize },

    #[error("unexpected end of data at offset {offset}")]
    Truncated { offset: u64 },

    #[error("corrupt array: expected {expected} bytes, decoded {found}")]
    CorruptArray { expected: usize, found: usize },

    #[error("unknown array encoding {0}")]
    UnknownArrayEncoding(u32),

    #[error("failed to inflate array: {0}")]
    Inflate(#[source] io::Error),

    #[error("invalid property type tag {tag:#04x} at offset {offset}")]
    UnknownPropertyType { tag: u8, offset: u64 },

    #[error("cannot store {found} as {expected:?}")]
    TypeMismatch { expected: PropertyType, found: String },

    #[error("element id is {0} bytes long, must be shorter than 256")]
    IdTooLong(usize),

    #[error("{what} ({value}) does not fit the record header")]
    TooLarge { what: &'static str, value: u64 },

    #[error("root element must have an empty id and no properties")]
    InvalidRoot,

    #[error("scope length not reached, something is wrong (expected {expected}, wrote {written})")]
    OffsetMismatch { expected: u64, written: u64 },

    #[error("property {name:?}: {reason}")]
    UnexpectedProperty { name: String, reason: String },

    #[error("unable to generate an UUID for key {0}")]
    UuidExhausted(String),

    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: Box<FbxError>,
    },
}

impl FbxError {
    /// Attach the path of the file being processed.
    pub(crate) fn at(self, path: PathBuf) -> FbxError {
        FbxError::File { path, source: Box::new(self) }
    }

    /// The error without any path context.
    pub fn inner(&self) -> &FbxError {
        match self {
            FbxError::File { source, .. } => source.inner(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, FbxError>;
