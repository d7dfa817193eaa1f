use crate::decimal::Decimal;
use std::fmt;
use std::str::FromStr;

/// A timezone offset in minutes from UTC, as carried by `xsd:dateTime` et al.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Hash)]
pub struct TimezoneOffset {
    minutes: i16,
}

impl TimezoneOffset {
    pub const UTC: Self = Self { minutes: 0 };

    pub fn new(minutes: i16) -> Self {
        Self { minutes }
    }

    pub fn minutes(self) -> i16 {
        self.minutes
    }
}

impl fmt::Display for TimezoneOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.minutes == 0 {
            return write!(f, "Z");
        }
        let sign = if self.minutes < 0 { '-' } else { '+' };
        let abs = self.minutes.unsigned_abs();
        write!(f, "{sign}{:02}:{:02}", abs / 60, abs % 60)
    }
}

/// `xsd:dateTime`, stored as a proleptic-Gregorian civil timestamp plus an
/// optional timezone. Only the fields the evaluator's accessor functions and
/// ORDER BY comparisons need are kept; sub-nanosecond precision is not
/// modeled.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Hash)]
pub struct DateTime {
    year: i32,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    /// Seconds scaled by 10^9 so fractional seconds compare exactly.
    nanosecond_of_minute: u32,
    timezone: Option<TimezoneOffset>,
}

impl DateTime {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        year: i32,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: f64,
        timezone: Option<TimezoneOffset>,
    ) -> Option<Self> {
        if !(1..=12).contains(&month) || !(1..=31).contains(&day) || hour > 24 || minute > 59 {
            return None;
        }
        if !(0.0..60.0).contains(&second) {
            return None;
        }
        Some(Self {
            year,
            month,
            day,
            hour,
            minute,
            nanosecond_of_minute: (second * 1_000_000_000.0) as u32,
            timezone,
        })
    }

    pub fn year(self) -> i32 {
        self.year
    }

    pub fn month(self) -> u8 {
        self.month
    }

    pub fn day(self) -> u8 {
        self.day
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }

    pub fn second(self) -> Decimal {
        Decimal::from_f64(f64::from(self.nanosecond_of_minute) / 1_000_000_000.0)
            .unwrap_or_default()
    }

    pub fn timezone(self) -> Option<TimezoneOffset> {
        self.timezone
    }

    /// The current instant, in UTC. Each call reads the system clock fresh;
    /// callers that need one stable value for an entire query evaluation
    /// (`NOW()`) must capture it once and reuse it.
    pub fn now() -> Self {
        let dur = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let secs = dur.as_secs() as i64;
        let days = secs.div_euclid(86400);
        let secs_of_day = secs.rem_euclid(86400);
        let (year, month, day) = civil_from_days(days);
        Self {
            year,
            month,
            day,
            hour: (secs_of_day / 3600) as u8,
            minute: ((secs_of_day % 3600) / 60) as u8,
            nanosecond_of_minute: (secs_of_day % 60) as u32 * 1_000_000_000 + dur.subsec_nanos(),
            timezone: Some(TimezoneOffset::UTC),
        }
    }

    /// Days since the epoch (1970-01-01), via a standard civil-from-days
    /// computation; used only to order/compare dates with different
    /// timezones consistently.
    fn days_since_epoch(self) -> i64 {
        days_from_civil(self.year, self.month, self.day)
    }

    /// Seconds since the Unix epoch, normalized to UTC.
    pub fn to_epoch_seconds(self) -> f64 {
        let offset_minutes = self.timezone.map_or(0, TimezoneOffset::minutes);
        let days = self.days_since_epoch();
        let seconds_of_day =
            i64::from(self.hour) * 3600 + i64::from(self.minute) * 60 - i64::from(offset_minutes) * 60;
        (days * 86400 + seconds_of_day) as f64 + f64::from(self.nanosecond_of_minute) / 1_000_000_000.0
    }
}

/// Inverse of [`days_from_civil`] (Howard Hinnant's `civil_from_days`).
fn civil_from_days(z: i64) -> (i32, u8, u8) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let year = if m <= 2 { y + 1 } else { y } as i32;
    (year, m, d)
}

fn days_from_civil(y: i32, m: u8, d: u8) -> i64 {
    let y = if m <= 2 { i64::from(y) - 1 } else { i64::from(y) };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = (y - era * 400) as i64;
    let mp = (i64::from(m) + 9) % 12;
    let doy = (153 * mp + 2) / 5 + i64::from(d) - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:09.6}",
            self.year,
            self.month,
            self.day,
            self.hour,
            self.minute,
            f64::from(self.nanosecond_of_minute) / 1_000_000_000.0
        )?;
        if let Some(tz) = self.timezone {
            write!(f, "{tz}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParseDateTimeError;

impl fmt::Display for ParseDateTimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid xsd:dateTime lexical form")
    }
}

impl std::error::Error for ParseDateTimeError {}

impl FromStr for DateTime {
    type Err = ParseDateTimeError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (date_time, tz) = split_timezone(input);
        let (date, time) = date_time.split_once('T').ok_or(ParseDateTimeError)?;
        let (year, month, day) = parse_date(date)?;
        let (hour, minute, second) = parse_time(time)?;
        Self::new(year, month, day, hour, minute, second, tz).ok_or(ParseDateTimeError)
    }
}

fn split_timezone(input: &str) -> (&str, Option<TimezoneOffset>) {
    if let Some(rest) = input.strip_suffix('Z') {
        return (rest, Some(TimezoneOffset::UTC));
    }
    // Look for a +HH:MM or -HH:MM suffix after the time part (avoid the
    // leading '-' of a BCE year).
    if input.len() > 6 {
        let tail = &input[input.len() - 6..];
        let mut chars = tail.chars();
        let sign = chars.next();
        if matches!(sign, Some('+') | Some('-'))
            && tail.as_bytes()[3] == b':'
            && tail[1..3].bytes().all(|b| b.is_ascii_digit())
            && tail[4..6].bytes().all(|b| b.is_ascii_digit())
        {
            let hours: i16 = tail[1..3].parse().unwrap_or(0);
            let minutes: i16 = tail[4..6].parse().unwrap_or(0);
            let total = hours * 60 + minutes;
            let offset = if sign == Some('-') { -total } else { total };
            return (&input[..input.len() - 6], Some(TimezoneOffset::new(offset)));
        }
    }
    (input, None)
}

fn parse_date(input: &str) -> Result<(i32, u8, u8), ParseDateTimeError> {
    let mut parts = input.rsplitn(3, '-');
    let day: u8 = parts.next().ok_or(ParseDateTimeError)?.parse().map_err(|_| ParseDateTimeError)?;
    let month: u8 = parts.next().ok_or(ParseDateTimeError)?.parse().map_err(|_| ParseDateTimeError)?;
    let year_str = parts.next().ok_or(ParseDateTimeError)?;
    let year: i32 = year_str.parse().map_err(|_| ParseDateTimeError)?;
    Ok((year, month, day))
}

fn parse_time(input: &str) -> Result<(u8, u8, f64), ParseDateTimeError> {
    let mut parts = input.splitn(3, ':');
    let hour: u8 = parts.next().ok_or(ParseDateTimeError)?.parse().map_err(|_| ParseDateTimeError)?;
    let minute: u8 = parts.next().ok_or(ParseDateTimeError)?.parse().map_err(|_| ParseDateTimeError)?;
    let second: f64 = parts.next().ok_or(ParseDateTimeError)?.parse().map_err(|_| ParseDateTimeError)?;
    Ok((hour, minute, second))
}

/// `xsd:duration` decomposed into a month component and a seconds component,
/// matching the `xsd:dayTimeDuration` / `xsd:yearMonthDuration` split used by
/// the arithmetic and comparison functions.
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Copy, Default, Hash)]
pub struct Duration {
    months: i64,
    seconds_nanos: i64,
}

impl Duration {
    pub fn new(months: i64, seconds: f64) -> Self {
        Self {
            months,
            seconds_nanos: (seconds * 1_000_000_000.0) as i64,
        }
    }

    pub fn months(self) -> i64 {
        self.months
    }

    pub fn seconds(self) -> f64 {
        self.seconds_nanos as f64 / 1_000_000_000.0
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        Some(Self {
            months: self.months.checked_add(rhs.months)?,
            seconds_nanos: self.seconds_nanos.checked_add(rhs.seconds_nanos)?,
        })
    }

    pub fn checked_neg(self) -> Option<Self> {
        Some(Self {
            months: self.months.checked_neg()?,
            seconds_nanos: self.seconds_nanos.checked_neg()?,
        })
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.months == 0 && self.seconds_nanos == 0 {
            return write!(f, "PT0S");
        }
        let negative = self.months < 0 || self.seconds_nanos < 0;
        if negative {
            write!(f, "-")?;
        }
        write!(f, "P")?;
        let years = self.months.unsigned_abs() / 12;
        let months = self.months.unsigned_abs() % 12;
        if years > 0 {
            write!(f, "{years}Y")?;
        }
        if months > 0 {
            write!(f, "{months}M")?;
        }
        let total_seconds = self.seconds_nanos.unsigned_abs() / 1_000_000_000;
        let days = total_seconds / 86400;
        let hours = (total_seconds % 86400) / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;
        if days > 0 {
            write!(f, "{days}D")?;
        }
        if hours > 0 || minutes > 0 || seconds > 0 {
            write!(f, "T")?;
            if hours > 0 {
                write!(f, "{hours}H")?;
            }
            if minutes > 0 {
                write!(f, "{minutes}M")?;
            }
            if seconds > 0 {
                write!(f, "{seconds}S")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn civil_days_round_trip() {
        for days in [-719_468, -1, 0, 1, 10_957, 19_723, 54_786] {
            let (y, m, d) = civil_from_days(days);
            assert_eq!(days_from_civil(y, m, d), days, "for {y:04}-{m:02}-{d:02}");
        }
    }

    #[test]
    fn now_is_plausible() {
        let now = DateTime::now();
        assert!(now.year() >= 2026);
        assert_eq!(now.timezone(), Some(TimezoneOffset::UTC));
        assert!(now.month() >= 1 && now.month() <= 12);
    }
}
