//! Nanosecond-epoch timestamps and their header and string representations.
//!
//! Time values throughout the crate are [`NsTime`]: signed nanoseconds since
//! the Unix/POSIX epoch. [`NanoTime`] is the broken-down year/day-of-year
//! form stored in v3 headers, and [`BTime`] the legacy v2 form with
//! 0.0001-second resolution.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};

use crate::{MseedError, Result};

/// Nanoseconds since 1970-01-01T00:00:00Z.
pub type NsTime = i64;

/// Nanoseconds per second.
pub const NS_PER_SEC: i64 = 1_000_000_000;

/// Nanosecond-precision broken-down timestamp (year + day-of-year + time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NanoTime {
    pub year: u16,
    pub day: u16,        // 1-366
    pub hour: u8,        // 0-23
    pub minute: u8,      // 0-59
    pub second: u8,      // 0-60 (60 for leap second in v3)
    pub nanosecond: u32, // 0-999_999_999
}

impl NanoTime {
    /// 1970-001 00:00:00.000000000.
    pub fn epoch() -> Self {
        Self {
            year: 1970,
            day: 1,
            hour: 0,
            minute: 0,
            second: 0,
            nanosecond: 0,
        }
    }

    /// Break an epoch time down into header fields.
    pub fn from_nstime(nstime: NsTime) -> Result<Self> {
        let secs = nstime.div_euclid(NS_PER_SEC);
        let nanos = nstime.rem_euclid(NS_PER_SEC) as u32;
        let dt = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| MseedError::InvalidTime(format!("{nstime} out of range")))?;
        let year = u16::try_from(dt.year())
            .map_err(|_| MseedError::InvalidTime(format!("year {} not representable", dt.year())))?;
        Ok(Self {
            year,
            day: dt.ordinal() as u16,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second() as u8,
            nanosecond: nanos,
        })
    }

    /// Convert header fields to an epoch time.
    ///
    /// A leap second (`second == 60`) lands on the first second of the
    /// following minute.
    pub fn to_nstime(&self) -> Result<NsTime> {
        let invalid = || MseedError::InvalidTime(self.to_string());
        if self.hour > 23
            || self.minute > 59
            || self.second > 60
            || self.nanosecond >= 1_000_000_000
        {
            return Err(invalid());
        }
        let midnight = NaiveDate::from_yo_opt(self.year as i32, self.day as u32)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .ok_or_else(invalid)?
            .and_utc()
            .timestamp();
        let secs = midnight
            + self.hour as i64 * 3600
            + self.minute as i64 * 60
            + self.second as i64;
        secs.checked_mul(NS_PER_SEC)
            .and_then(|ns| ns.checked_add(self.nanosecond as i64))
            .ok_or_else(invalid)
    }

    /// Create a NanoTime from a legacy [`BTime`] value.
    pub fn from_btime(bt: &BTime) -> Self {
        Self {
            year: bt.year,
            day: bt.day,
            hour: bt.hour,
            minute: bt.minute,
            second: bt.second,
            nanosecond: bt.fract as u32 * 100_000, // 0.0001s = 100µs = 100_000ns
        }
    }

    /// Convert to a legacy [`BTime`] value, truncating to 0.0001-second units.
    pub fn to_btime(self) -> BTime {
        BTime {
            year: self.year,
            day: self.day,
            hour: self.hour,
            minute: self.minute,
            second: self.second,
            fract: (self.nanosecond / 100_000) as u16,
        }
    }
}

impl Default for NanoTime {
    fn default() -> Self {
        Self::epoch()
    }
}

impl fmt::Display for NanoTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:03} {:02}:{:02}:{:02}.{:09}",
            self.year, self.day, self.hour, self.minute, self.second, self.nanosecond
        )
    }
}

impl From<BTime> for NanoTime {
    fn from(bt: BTime) -> Self {
        Self::from_btime(&bt)
    }
}

impl From<NanoTime> for BTime {
    fn from(nt: NanoTime) -> Self {
        nt.to_btime()
    }
}

/// Legacy BTIME timestamp (10 bytes in the miniSEED v2 fixed header).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BTime {
    pub year: u16,
    pub day: u16,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub fract: u16, // 0.0001 second units
}

impl fmt::Display for BTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:03} {:02}:{:02}:{:02}.{:04}",
            self.year, self.day, self.hour, self.minute, self.second, self.fract
        )
    }
}

/// Output layout for [`nstime_to_timestr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeFormat {
    /// `YYYY-MM-DDThh:mm:ss.sssssssss`
    IsoMonthDay,
    /// `YYYY-MM-DDThh:mm:ss.sssssssssZ`
    #[default]
    IsoMonthDayZ,
    /// `YYYY-MM-DDThh:mm:ss.sssssssss (doy)`
    IsoMonthDayDoy,
    /// `YYYY-MM-DDThh:mm:ss.sssssssssZ (doy)`
    IsoMonthDayDoyZ,
    /// `YYYY-MM-DD hh:mm:ss.sssssssss`
    IsoMonthDaySpace,
    /// `YYYY-MM-DD hh:mm:ss.sssssssssZ`
    IsoMonthDaySpaceZ,
    /// `YYYY,DDD,hh:mm:ss.sssssssss`
    SeedOrdinal,
    /// `ssssssssss.sssssssss`
    UnixEpoch,
    /// `sssssssssssssssssss`
    NanosecondEpoch,
}

/// Sub-second resolution for [`nstime_to_timestr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubSecond {
    None,
    Micro,
    Nano,
    /// Microseconds if the sub-second part is non-zero, otherwise none.
    MicroNone,
    /// Nanoseconds if the sub-second part is non-zero, otherwise none.
    NanoNone,
    /// Nanoseconds if there are sub-microseconds, otherwise microseconds.
    NanoMicro,
    /// Nanoseconds, microseconds or nothing, whichever is exact.
    #[default]
    NanoMicroNone,
}

fn subsecond_str(nanos: u32, subsecond: SubSecond) -> String {
    let micro = || format!(".{:06}", nanos / 1000);
    let nano = || format!(".{nanos:09}");
    match subsecond {
        SubSecond::None => String::new(),
        SubSecond::Micro => micro(),
        SubSecond::Nano => nano(),
        SubSecond::MicroNone if nanos != 0 => micro(),
        SubSecond::NanoNone if nanos != 0 => nano(),
        SubSecond::MicroNone | SubSecond::NanoNone => String::new(),
        SubSecond::NanoMicro if nanos % 1000 != 0 => nano(),
        SubSecond::NanoMicro => micro(),
        SubSecond::NanoMicroNone if nanos % 1000 != 0 => nano(),
        SubSecond::NanoMicroNone if nanos != 0 => micro(),
        SubSecond::NanoMicroNone => String::new(),
    }
}

/// Format an epoch time as a date-time string.
pub fn nstime_to_timestr(
    nstime: NsTime,
    format: TimeFormat,
    subsecond: SubSecond,
) -> Result<String> {
    const ISO: &str = "%Y-%m-%dT%H:%M:%S";
    const SPACE: &str = "%Y-%m-%d %H:%M:%S";
    let text = match format {
        TimeFormat::NanosecondEpoch => nstime.to_string(),
        TimeFormat::UnixEpoch => {
            let sign = if nstime < 0 { "-" } else { "" };
            let abs = nstime.unsigned_abs();
            let secs = abs / NS_PER_SEC as u64;
            let nanos = (abs % NS_PER_SEC as u64) as u32;
            format!("{sign}{secs}{}", subsecond_str(nanos, subsecond))
        }
        TimeFormat::IsoMonthDay => calendar_timestr(nstime, subsecond, ISO, "", false)?,
        TimeFormat::IsoMonthDayZ => calendar_timestr(nstime, subsecond, ISO, "Z", false)?,
        TimeFormat::IsoMonthDayDoy => calendar_timestr(nstime, subsecond, ISO, "", true)?,
        TimeFormat::IsoMonthDayDoyZ => calendar_timestr(nstime, subsecond, ISO, "Z", true)?,
        TimeFormat::IsoMonthDaySpace => calendar_timestr(nstime, subsecond, SPACE, "", false)?,
        TimeFormat::IsoMonthDaySpaceZ => calendar_timestr(nstime, subsecond, SPACE, "Z", false)?,
        TimeFormat::SeedOrdinal => {
            calendar_timestr(nstime, subsecond, "%Y,%j,%H:%M:%S", "", false)?
        }
    };
    Ok(text)
}

fn calendar_timestr(
    nstime: NsTime,
    subsecond: SubSecond,
    pattern: &str,
    zone: &str,
    with_doy: bool,
) -> Result<String> {
    let secs = nstime.div_euclid(NS_PER_SEC);
    let nanos = nstime.rem_euclid(NS_PER_SEC) as u32;
    let dt = DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| MseedError::InvalidTime(format!("{nstime} out of range")))?;
    let mut text = format!("{}{}{zone}", dt.format(pattern), subsecond_str(nanos, subsecond));
    if with_doy {
        text.push_str(&format!(" ({})", dt.format("%j")));
    }
    Ok(text)
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%jT%H:%M:%S%.f",
    "%Y,%j,%H:%M:%S%.f",
    "%Y,%j,%H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y-%j", "%Y,%j"];

/// Parse a date-time string into an epoch time.
///
/// Accepted forms: ISO 8601 month-day (`T` or space separator, optional
/// trailing `Z` and ` (doy)` annotation, partial times), year-day
/// (`YYYY-DDD`), SEED ordinal (`YYYY,DDD[,hh:mm[:ss.fff]]`), a bare year,
/// and Unix epoch seconds with an optional fraction.
pub fn timestr_to_nstime(timestr: &str) -> Result<NsTime> {
    let invalid = || MseedError::InvalidTime(timestr.to_string());
    let mut body = timestr.trim();

    // Drop a trailing day-of-year annotation, e.g. " (058)"
    if let Some(open) = body.rfind(" (") {
        if body.ends_with(')') {
            body = body[..open].trim_end();
        }
    }
    let body = body
        .strip_suffix('Z')
        .or_else(|| body.strip_suffix('z'))
        .unwrap_or(body);
    if body.is_empty() {
        return Err(invalid());
    }

    if is_epoch_string(body) {
        return parse_epoch(body).ok_or_else(invalid);
    }

    if body.len() <= 4 && body.bytes().all(|b| b.is_ascii_digit()) {
        let year: i32 = body.parse().map_err(|_| invalid())?;
        return NaiveDate::from_yo_opt(year, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .and_then(|dt| dt.and_utc().timestamp_nanos_opt())
            .ok_or_else(invalid);
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(body, fmt) {
            return dt.and_utc().timestamp_nanos_opt().ok_or_else(invalid);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(body, fmt) {
            return date
                .and_hms_opt(0, 0, 0)
                .and_then(|dt| dt.and_utc().timestamp_nanos_opt())
                .ok_or_else(invalid);
        }
    }
    Err(invalid())
}

fn is_epoch_string(s: &str) -> bool {
    let unsigned = s.strip_prefix('-').unwrap_or(s);
    if unsigned.is_empty() || !unsigned.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return false;
    }
    if unsigned.bytes().filter(|&b| b == b'.').count() > 1 {
        return false;
    }
    s.starts_with('-') || unsigned.contains('.') || unsigned.len() > 4
}

fn parse_epoch(s: &str) -> Option<NsTime> {
    let (negative, unsigned) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let (whole, frac) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    let secs: i64 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut nanos: i64 = 0;
    for (i, digit) in frac.bytes().enumerate() {
        if i >= 9 {
            break;
        }
        nanos += (digit - b'0') as i64 * 10i64.pow(8 - i as u32);
    }
    let total = secs.checked_mul(NS_PER_SEC)?.checked_add(nanos)?;
    Some(if negative { -total } else { total })
}

/// Nominal sample rate in samples per second.
///
/// A negative raw value is a sample period in seconds.
pub fn sample_rate_hz(raw: f64) -> f64 {
    if raw < 0.0 { -1.0 / raw } else { raw }
}

/// Sample period in nanoseconds, rounded; zero for a zero rate.
pub fn sample_period_ns(raw_rate: f64) -> i64 {
    let hz = sample_rate_hz(raw_rate);
    if hz == 0.0 {
        return 0;
    }
    (1e9 / hz).round() as i64
}

/// Time of the sample `offset` samples after `nstime`.
pub fn sample_time(nstime: NsTime, offset: i64, raw_rate: f64) -> NsTime {
    let hz = sample_rate_hz(raw_rate);
    if hz == 0.0 || offset == 0 {
        return nstime;
    }
    nstime + (offset as f64 / hz * 1e9).round() as i64
}
