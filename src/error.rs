//! Error types for record parsing, packing, and trace assembly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MseedError {
    #[error("data is not miniSEED")]
    NotSeedData,

    #[error("wrong record length: need {expected} bytes, have {actual}")]
    WrongLength { expected: usize, actual: usize },

    #[error("record length {0} out of range")]
    OutOfRange(usize),

    #[error("unknown data encoding format: {0}")]
    UnknownFormat(u8),

    #[error("CRC-32C mismatch: stored {stored:#010X}, computed {computed:#010X}")]
    InvalidCrc { stored: u32, computed: u32 },

    #[error("invalid source identifier: {0}")]
    InvalidSourceId(String),

    #[error("invalid source identifier parts: {0}")]
    InvalidParts(String),

    #[error("source ID not found: {0}")]
    NotFound(String),

    #[error("data samples already unpacked")]
    AlreadyUnpacked,

    #[error("no record list available to unpack")]
    NoRecordList,

    #[error("record has no time coverage")]
    NoCoverage,

    #[error("blockette 1000 not found")]
    MissingBlockette1000,

    #[error("steim decode error: {0}")]
    SteimDecode(String),

    #[error("sample count mismatch: header says {expected}, decoded {actual}")]
    SampleCountMismatch { expected: usize, actual: usize },

    #[error("encode error: {0}")]
    EncodeError(String),

    #[error("invalid time: {0}")]
    InvalidTime(String),

    #[error("invalid sample type: {0:?}")]
    InvalidSampleType(char),

    #[error("invalid extra headers: {0}")]
    ExtraHeaders(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid state: {0}")]
    InvalidState(String),
}

pub type Result<T> = std::result::Result<T, MseedError>;
