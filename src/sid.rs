//! FDSN Source Identifier (SID).
//!
//! The canonical form is `FDSN:NET_STA_LOC_BAND_SOURCE_SUBSOURCE`, where a
//! SEED channel code such as `BHZ` is split into band (`B`), source (`H`)
//! and subsource (`Z`).

use std::fmt;

use crate::{MseedError, Result};

/// Maximum length of a source identifier in bytes.
pub const MAX_SID_LEN: usize = 64;

/// Maximum length of each network/station/location/channel part.
pub const MAX_PART_LEN: usize = 10;

const FDSN_PREFIX: &str = "FDSN:";

/// FDSN Source Identifier.
///
/// # Examples
///
/// ```
/// use miniseed_trace::SourceId;
///
/// let sid = SourceId::from_parts("IU", "ANMO", "00", "BHZ").unwrap();
/// assert_eq!(sid.as_str(), "FDSN:IU_ANMO_00_B_H_Z");
///
/// let (net, sta, loc, cha) = sid.to_parts().unwrap();
/// assert_eq!((net.as_str(), sta.as_str(), loc.as_str(), cha.as_str()),
///            ("IU", "ANMO", "00", "BHZ"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceId {
    raw: String,
}

impl SourceId {
    /// Parse a source identifier string.
    ///
    /// Accepts either the full `FDSN:` prefixed form or just the
    /// underscore-separated components, which get the prefix added.
    pub fn parse(s: &str) -> Result<Self> {
        let raw = if s.contains(':') {
            s.to_string()
        } else {
            format!("{FDSN_PREFIX}{s}")
        };
        if raw.len() > MAX_SID_LEN {
            return Err(MseedError::InvalidSourceId(format!(
                "{raw}: longer than {MAX_SID_LEN} bytes"
            )));
        }
        Ok(Self { raw })
    }

    /// Build a source identifier from SEED network, station, location and
    /// channel codes.
    ///
    /// A 3-character channel is expanded to `BAND_SOURCE_SUBSOURCE`; a
    /// channel that is already underscore-separated must have exactly three
    /// components; anything else is kept as a single component.
    pub fn from_parts(network: &str, station: &str, location: &str, channel: &str) -> Result<Self> {
        let invalid = |why: &str| {
            MseedError::InvalidParts(format!("{network},{station},{location},{channel}: {why}"))
        };

        for part in [network, station, location] {
            if part.len() > MAX_PART_LEN {
                return Err(invalid("part longer than 10 characters"));
            }
            if part.contains(['_', ':']) {
                return Err(invalid("part contains a delimiter"));
            }
        }
        if channel.contains(':') {
            return Err(invalid("channel contains a delimiter"));
        }

        let expanded = if channel.contains('_') {
            if channel.split('_').count() != 3 {
                return Err(invalid("channel must have band, source and subsource"));
            }
            channel.to_string()
        } else if channel.chars().count() == 3 {
            let chars: Vec<String> = channel.chars().map(String::from).collect();
            chars.join("_")
        } else {
            if channel.len() > MAX_PART_LEN {
                return Err(invalid("channel longer than 10 characters"));
            }
            channel.to_string()
        };

        let raw = format!("{FDSN_PREFIX}{network}_{station}_{location}_{expanded}");
        if raw.len() > MAX_SID_LEN {
            return Err(invalid("identifier longer than 64 bytes"));
        }
        Ok(Self { raw })
    }

    /// Split into (network, station, location, channel).
    ///
    /// Fails for identifiers without the `FDSN:` prefix or with the wrong
    /// number of components.
    pub fn to_parts(&self) -> Result<(String, String, String, String)> {
        let invalid = |why: &str| MseedError::InvalidSourceId(format!("{}: {why}", self.raw));

        let body = self
            .raw
            .strip_prefix(FDSN_PREFIX)
            .ok_or_else(|| invalid("missing FDSN: prefix"))?;
        let components: Vec<&str> = body.split('_').collect();
        if components.len() < 4 {
            return Err(invalid("expected at least network, station, location and channel"));
        }

        let channel = match &components[3..] {
            [single] => single.to_string(),
            [band, source, subsource] => {
                if [band, source, subsource].iter().all(|c| c.chars().count() == 1) {
                    format!("{band}{source}{subsource}")
                } else {
                    format!("{band}_{source}_{subsource}")
                }
            }
            _ => return Err(invalid("channel must have one or three components")),
        };

        let (network, station, location) = (components[0], components[1], components[2]);
        for part in [network, station, location] {
            if part.len() > MAX_PART_LEN {
                return Err(invalid("part longer than 10 characters"));
            }
        }

        Ok((
            network.to_string(),
            station.to_string(),
            location.to_string(),
            channel,
        ))
    }

    /// Return the raw source identifier string.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Network code, empty when the identifier is not in FDSN form.
    pub fn network(&self) -> &str {
        self.component(0)
    }

    /// Station code, empty when the identifier is not in FDSN form.
    pub fn station(&self) -> &str {
        self.component(1)
    }

    /// Location code, empty when the identifier is not in FDSN form.
    pub fn location(&self) -> &str {
        self.component(2)
    }

    fn component(&self, index: usize) -> &str {
        self.raw
            .strip_prefix(FDSN_PREFIX)
            .and_then(|body| body.split('_').nth(index))
            .unwrap_or("")
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

impl AsRef<str> for SourceId {
    fn as_ref(&self) -> &str {
        &self.raw
    }
}
