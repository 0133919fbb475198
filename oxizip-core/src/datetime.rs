//! MS-DOS date/time stamps.
//!
//! ZIP headers carry modification times as two packed 16-bit words with
//! 2-second resolution and a 1980 epoch. Conversions here treat the stamp as
//! UTC; the format itself has no zone.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Packed DOS time and date words as stored in ZIP headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DosDateTime {
    /// hour(5) | minute(6) | second/2(5)
    pub time: u16,
    /// (year-1980)(7) | month(4) | day(5)
    pub date: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the earliest representable stamp.
    pub const EPOCH: Self = Self {
        time: 0,
        date: (1 << 5) | 1,
    };

    /// Wrap raw header words.
    pub fn from_raw(time: u16, date: u16) -> Self {
        Self { time, date }
    }

    /// Build from civil fields, clamping into 1980..=2107.
    pub fn from_civil(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
    ) -> Self {
        if year < 1980 {
            return Self::EPOCH;
        }
        if year > 2107 {
            return Self {
                time: (23 << 11) | (59 << 5) | 29,
                date: (127 << 9) | (12 << 5) | 31,
            };
        }
        let date = (((year - 1980) as u16) << 9)
            | ((month.clamp(1, 12) as u16) << 5)
            | day.clamp(1, 31) as u16;
        let time = ((hour.min(23) as u16) << 11)
            | ((minute.min(59) as u16) << 5)
            | (second.min(59) / 2) as u16;
        Self { time, date }
    }

    /// Convert a `SystemTime`.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs() as i64,
            Err(_) => return Self::EPOCH,
        };
        let days = secs.div_euclid(86400);
        let rem = secs.rem_euclid(86400) as u32;
        let (year, month, day) = civil_from_days(days);
        Self::from_civil(year, month, day, rem / 3600, (rem % 3600) / 60, rem % 60)
    }

    /// Current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Year (1980-2107).
    pub fn year(&self) -> i32 {
        1980 + (self.date >> 9) as i32
    }

    /// Month (1-12).
    pub fn month(&self) -> u32 {
        ((self.date >> 5) & 0x0F) as u32
    }

    /// Day of month (1-31).
    pub fn day(&self) -> u32 {
        (self.date & 0x1F) as u32
    }

    /// Hour (0-23).
    pub fn hour(&self) -> u32 {
        (self.time >> 11) as u32
    }

    /// Minute (0-59).
    pub fn minute(&self) -> u32 {
        ((self.time >> 5) & 0x3F) as u32
    }

    /// Second (0-58, even).
    pub fn second(&self) -> u32 {
        ((self.time & 0x1F) as u32) * 2
    }

    /// Convert to `SystemTime`.
    pub fn to_system_time(&self) -> SystemTime {
        let days = days_from_civil(self.year(), self.month().max(1), self.day().max(1));
        let secs = days * 86400
            + (self.hour() * 3600 + self.minute() * 60 + self.second()) as i64;
        UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
    }

    /// High byte of the time word, used as the ZipCrypto check byte when
    /// the CRC is deferred to a data descriptor.
    pub fn check_byte(&self) -> u8 {
        (self.time >> 8) as u8
    }
}

impl Default for DosDateTime {
    fn default() -> Self {
        Self::EPOCH
    }
}

impl std::fmt::Display for DosDateTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second()
        )
    }
}

// Howard Hinnant's civil calendar algorithms.
fn days_from_civil(year: i32, month: u32, day: u32) -> i64 {
    let y = (if month <= 2 { year - 1 } else { year }) as i64;
    let era = y.div_euclid(400);
    let yoe = y - era * 400;
    let m = month as i64;
    let doy = (153 * (if m > 2 { m - 3 } else { m + 9 }) + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146097 + doe - 719468
}

fn civil_from_days(days: i64) -> (i32, u32, u32) {
    let z = days + 719468;
    let era = z.div_euclid(146097);
    let doe = z - era * 146097;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = (yoe + era * 400 + if month <= 2 { 1 } else { 0 }) as i32;
    (year, month, day)
}
