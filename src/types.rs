//! Shared types: [`FormatVersion`], [`ByteOrder`], [`EncodingFormat`] and
//! [`SampleType`].

use std::fmt;

use crate::{MseedError, Result};

/// miniSEED format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FormatVersion {
    /// miniSEED v2 (SEED Manual, 48-byte fixed header + blockettes).
    V2,
    /// miniSEED v3 (FDSN, 40-byte fixed header, little-endian).
    V3,
}

impl FormatVersion {
    /// Convert a major version number (2 or 3).
    pub fn from_u8(version: u8) -> Result<Self> {
        match version {
            2 => Ok(Self::V2),
            3 => Ok(Self::V3),
            other => Err(MseedError::InvalidState(format!(
                "invalid miniSEED format version: {other}"
            ))),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::V2 => 2,
            Self::V3 => 3,
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V2 => write!(f, "miniSEED v2"),
            Self::V3 => write!(f, "miniSEED v3"),
        }
    }
}

/// Byte order for multi-byte fields in a miniSEED record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    /// Byte order of the host.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }
}

/// Encoding format of the data payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodingFormat {
    /// UTF-8 text (code 0).
    Text,
    /// 16-bit signed integer (code 1).
    Int16,
    /// 32-bit signed integer (code 3).
    Int32,
    /// 32-bit IEEE float (code 4).
    Float32,
    /// 64-bit IEEE double (code 5).
    Float64,
    /// Steim-1 compressed integers (code 10).
    Steim1,
    /// Steim-2 compressed integers (code 11).
    Steim2,
}

impl EncodingFormat {
    /// Convert a raw encoding code to an `EncodingFormat`.
    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(Self::Text),
            1 => Ok(Self::Int16),
            3 => Ok(Self::Int32),
            4 => Ok(Self::Float32),
            5 => Ok(Self::Float64),
            10 => Ok(Self::Steim1),
            11 => Ok(Self::Steim2),
            _ => Err(MseedError::UnknownFormat(code)),
        }
    }

    /// Convert to the raw encoding code.
    pub fn to_code(self) -> u8 {
        match self {
            Self::Text => 0,
            Self::Int16 => 1,
            Self::Int32 => 3,
            Self::Float32 => 4,
            Self::Float64 => 5,
            Self::Steim1 => 10,
            Self::Steim2 => 11,
        }
    }

    pub fn is_steim(self) -> bool {
        matches!(self, Self::Steim1 | Self::Steim2)
    }

    /// Sample type produced when decoding this encoding.
    pub fn sample_type(self) -> SampleType {
        match self {
            Self::Text => SampleType::Text,
            Self::Int16 | Self::Int32 | Self::Steim1 | Self::Steim2 => SampleType::Int,
            Self::Float32 => SampleType::Float,
            Self::Float64 => SampleType::Double,
        }
    }
}

impl fmt::Display for EncodingFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "Text"),
            Self::Int16 => write!(f, "INT16"),
            Self::Int32 => write!(f, "INT32"),
            Self::Float32 => write!(f, "FLOAT32"),
            Self::Float64 => write!(f, "FLOAT64"),
            Self::Steim1 => write!(f, "Steim1"),
            Self::Steim2 => write!(f, "Steim2"),
        }
    }
}

/// In-memory sample type: `i` (int32), `f` (float32), `d` (float64) or `t` (text).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    Int,
    Float,
    Double,
    Text,
}

impl SampleType {
    pub fn from_char(c: char) -> Result<Self> {
        match c {
            'i' => Ok(Self::Int),
            'f' => Ok(Self::Float),
            'd' => Ok(Self::Double),
            't' => Ok(Self::Text),
            other => Err(MseedError::InvalidSampleType(other)),
        }
    }

    pub fn as_char(self) -> char {
        match self {
            Self::Int => 'i',
            Self::Float => 'f',
            Self::Double => 'd',
            Self::Text => 't',
        }
    }

    /// Size in bytes of one decoded sample.
    pub fn size(self) -> usize {
        match self {
            Self::Int | Self::Float => 4,
            Self::Double => 8,
            Self::Text => 1,
        }
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "int32"),
            Self::Float => write!(f, "float32"),
            Self::Double => write!(f, "float64"),
            Self::Text => write!(f, "text"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_codes_roundtrip() {
        for code in [0u8, 1, 3, 4, 5, 10, 11] {
            assert_eq!(EncodingFormat::from_code(code).unwrap().to_code(), code);
        }
    }

    #[test]
    fn test_unknown_encoding() {
        assert!(matches!(
            EncodingFormat::from_code(2),
            Err(MseedError::UnknownFormat(2))
        ));
    }

    #[test]
    fn test_sample_type_chars() {
        for c in ['i', 'f', 'd', 't'] {
            assert_eq!(SampleType::from_char(c).unwrap().as_char(), c);
        }
        assert!(SampleType::from_char('x').is_err());
    }

    #[test]
    fn test_format_version() {
        assert_eq!(FormatVersion::from_u8(2).unwrap(), FormatVersion::V2);
        assert_eq!(FormatVersion::V3.as_u8(), 3);
        assert!(FormatVersion::from_u8(4).is_err());
    }
}
