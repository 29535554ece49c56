// SPDX-License-Identifier: Apache-2.0

//! Timestamp layouts for `ts` captures.
//!
//! Layouts are written in Go reference-time notation (`02/Jan/2006:15:04:05 -0700`)
//! and translated once into chrono format strings.

use chrono::format::ParseErrorKind;
use chrono::{
    DateTime, Datelike, FixedOffset, Local, LocalResult, NaiveDate, NaiveDateTime, NaiveTime,
    TimeZone, Utc,
};
use chrono_tz::Tz;

use crate::error::{Error, Result};

/// Go reference layouts with a modifier shorthand
const NAMED_LAYOUTS: &[(&str, &str)] = &[
    ("ansic", "Mon Jan _2 15:04:05 2006"),
    ("unix", "Mon Jan _2 15:04:05 MST 2006"),
    ("rubydate", "Mon Jan 02 15:04:05 -0700 2006"),
    ("rfc822", "02 Jan 06 15:04 MST"),
    ("rfc822z", "02 Jan 06 15:04 -0700"),
    ("rfc850", "Monday, 02-Jan-06 15:04:05 MST"),
    ("rfc1123", "Mon, 02 Jan 2006 15:04:05 MST"),
    ("rfc1123z", "Mon, 02 Jan 2006 15:04:05 -0700"),
    ("httpd", "02/Jan/2006:15:04:05 -0700"),
];

/// Go layout elements, longest first so `January` wins over `Jan`
const GO_TOKENS: &[(&str, &str)] = &[
    ("January", "%B"),
    ("Monday", "%A"),
    ("Z07:00", "%:z"),
    ("-07:00", "%:z"),
    ("Z0700", "%z"),
    ("-0700", "%z"),
    ("2006", "%Y"),
    ("-07", "%#z"),
    ("Jan", "%b"),
    ("Mon", "%a"),
    ("MST", "%Z"),
    ("_2", "%e"),
    ("01", "%m"),
    ("02", "%d"),
    ("03", "%I"),
    ("04", "%M"),
    ("05", "%S"),
    ("06", "%y"),
    ("15", "%H"),
    ("PM", "%p"),
    ("pm", "%P"),
    ("1", "%m"),
    ("2", "%d"),
    ("3", "%I"),
    ("4", "%M"),
    ("5", "%S"),
];

/// Zone abbreviations with a fixed offset in seconds
const ZONE_ABBREVIATIONS: &[(&str, i32)] = &[
    ("UTC", 0),
    ("GMT", 0),
    ("Z", 0),
    ("EST", -5 * 3600),
    ("EDT", -4 * 3600),
    ("CST", -6 * 3600),
    ("CDT", -5 * 3600),
    ("MST", -7 * 3600),
    ("MDT", -6 * 3600),
    ("PST", -8 * 3600),
    ("PDT", -7 * 3600),
];

/// A Go reference layout translated to a chrono format
#[derive(Debug, Clone, PartialEq)]
pub struct GoLayout {
    format: String,
    numeric_zone: bool,
    named_zone: bool,
}

impl GoLayout {
    pub fn parse(layout: &str) -> Self {
        let mut format = String::with_capacity(layout.len() * 2);
        let mut numeric_zone = false;
        let mut named_zone = false;
        let mut rest = layout;

        'outer: while !rest.is_empty() {
            // fractional seconds: .000 or .999 runs
            if let Some(frac) = rest.strip_prefix('.') {
                let digits = frac
                    .chars()
                    .take_while(|c| *c == '0' || *c == '9')
                    .count();
                if digits > 0 && format.ends_with("%S") {
                    format.push_str("%.f");
                    rest = &frac[digits..];
                    continue;
                }
            }

            for (token, spec) in GO_TOKENS {
                if let Some(after) = rest.strip_prefix(token) {
                    match *spec {
                        "%z" | "%:z" | "%#z" => numeric_zone = true,
                        "%Z" => named_zone = true,
                        _ => {}
                    }
                    format.push_str(spec);
                    rest = after;
                    continue 'outer;
                }
            }

            let mut chars = rest.chars();
            if let Some(c) = chars.next() {
                if c == '%' {
                    format.push_str("%%");
                } else {
                    format.push(c);
                }
            }
            rest = chars.as_str();
        }

        Self {
            format,
            numeric_zone,
            named_zone,
        }
    }

    pub fn format(&self) -> &str {
        &self.format
    }

    fn parse_value(&self, value: &str, tz: &TimeZoneSetting) -> Option<DateTime<Utc>> {
        if self.numeric_zone {
            if let Ok(ts) = DateTime::parse_from_str(value, &self.format) {
                return Some(ts.with_timezone(&Utc));
            }
            // Go's Z07:00 also accepts a literal Z for UTC
            let zulu = value.strip_suffix('Z')?;
            let ts = DateTime::parse_from_str(&format!("{}+00:00", zulu), &self.format).ok()?;
            return Some(ts.with_timezone(&Utc));
        }

        let naive = parse_naive(value, &self.format)?;
        if self.named_zone {
            if let Some(offset) = zone_abbreviation_offset(value) {
                return offset
                    .from_local_datetime(&naive)
                    .single()
                    .map(|ts| ts.with_timezone(&Utc));
            }
        }
        tz.localize(&naive)
    }
}

/// Layouts without a time of day resolve to midnight, layouts without a date
/// to January 1st of year 0.
fn parse_naive(value: &str, format: &str) -> Option<NaiveDateTime> {
    match NaiveDateTime::parse_from_str(value, format) {
        Ok(naive) => Some(naive),
        Err(e) if e.kind() == ParseErrorKind::NotEnough => {
            if let Ok(date) = NaiveDate::parse_from_str(value, format) {
                return date.and_hms_opt(0, 0, 0);
            }
            let time = NaiveTime::parse_from_str(value, format).ok()?;
            Some(NaiveDate::from_ymd_opt(0, 1, 1)?.and_time(time))
        }
        Err(_) => None,
    }
}

fn zone_abbreviation_offset(value: &str) -> Option<FixedOffset> {
    value
        .split(|c: char| !c.is_ascii_alphabetic())
        .find_map(|word| {
            ZONE_ABBREVIATIONS
                .iter()
                .find(|(abbr, _)| *abbr == word)
                .map(|(_, secs)| *secs)
        })
        .and_then(FixedOffset::east_opt)
}

/// How a captured timestamp string is interpreted
#[derive(Debug, Clone, PartialEq)]
pub enum TimestampLayout {
    /// Bare `ts`: try every known layout
    Any,
    Rfc3339,
    Syslog,
    Epoch,
    EpochMilli,
    EpochNano,
    Layout(GoLayout),
}

impl TimestampLayout {
    /// Parses the part of a modifier after `ts`, e.g. `-httpd` or `-"2006-01-02"`.
    pub fn from_modifier(modifier: &str) -> Option<Self> {
        let rest = modifier.strip_prefix("ts")?;
        if rest.is_empty() {
            return Some(TimestampLayout::Any);
        }
        let name = rest.strip_prefix('-')?;

        if let Some(quoted) = name.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
            return Some(TimestampLayout::Layout(GoLayout::parse(quoted)));
        }

        match name {
            "rfc3339" | "rfc3339nano" => Some(TimestampLayout::Rfc3339),
            "syslog" => Some(TimestampLayout::Syslog),
            "epoch" => Some(TimestampLayout::Epoch),
            "epochmilli" => Some(TimestampLayout::EpochMilli),
            "epochnano" => Some(TimestampLayout::EpochNano),
            _ => NAMED_LAYOUTS
                .iter()
                .find(|(short, _)| *short == name)
                .map(|(_, layout)| TimestampLayout::Layout(GoLayout::parse(layout))),
        }
    }

    pub fn parse(&self, value: &str, tz: &TimeZoneSetting) -> Option<DateTime<Utc>> {
        let value = value.trim();
        match self {
            TimestampLayout::Any => parse_any(value, tz),
            TimestampLayout::Rfc3339 => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|ts| ts.with_timezone(&Utc)),
            TimestampLayout::Syslog => parse_syslog(value, tz),
            TimestampLayout::Epoch => parse_epoch_seconds(value),
            TimestampLayout::EpochMilli => value
                .parse::<i64>()
                .ok()
                .and_then(DateTime::from_timestamp_millis),
            TimestampLayout::EpochNano => value
                .parse::<i64>()
                .ok()
                .map(DateTime::from_timestamp_nanos),
            TimestampLayout::Layout(layout) => layout.parse_value(value, tz),
        }
    }
}

fn parse_any(value: &str, tz: &TimeZoneSetting) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Some(ts) = NAMED_LAYOUTS
        .iter()
        .find_map(|(_, layout)| GoLayout::parse(layout).parse_value(value, tz))
    {
        return Some(ts);
    }
    parse_syslog(value, tz)
}

/// Syslog timestamps carry no year, the current one is assumed.
fn parse_syslog(value: &str, tz: &TimeZoneSetting) -> Option<DateTime<Utc>> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    let with_year = format!("{} {}", Utc::now().year(), normalized);
    let naive = NaiveDateTime::parse_from_str(&with_year, "%Y %b %d %H:%M:%S").ok()?;
    tz.localize(&naive)
}

fn parse_epoch_seconds(value: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = match value.split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (value, ""),
    };
    let secs: i64 = secs.parse().ok()?;
    let nanos = if frac.is_empty() {
        0
    } else {
        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let digits: String = frac.chars().chain(std::iter::repeat('0')).take(9).collect();
        digits.parse::<u32>().ok()?
    };
    DateTime::from_timestamp(secs, nanos)
}

/// Zone applied to timestamps that carry no offset of their own
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum TimeZoneSetting {
    #[default]
    Utc,
    Local,
    Named(Tz),
}

impl TimeZoneSetting {
    pub fn from_config(name: Option<&str>) -> Result<Self> {
        match name.map(str::trim) {
            None | Some("") | Some("UTC") => Ok(TimeZoneSetting::Utc),
            Some("Local") | Some("local") => Ok(TimeZoneSetting::Local),
            Some(name) => name
                .parse::<Tz>()
                .map(TimeZoneSetting::Named)
                .map_err(|_| Error::InvalidTimezone(name.to_string())),
        }
    }

    /// Ambiguous local times resolve to the earlier instant.
    pub fn localize(&self, naive: &NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            TimeZoneSetting::Utc => Some(Utc.from_utc_datetime(naive)),
            TimeZoneSetting::Local => earliest(Local.from_local_datetime(naive)),
            TimeZoneSetting::Named(tz) => earliest(tz.from_local_datetime(naive)),
        }
    }
}

fn earliest<T: TimeZone>(result: LocalResult<DateTime<T>>) -> Option<DateTime<Utc>> {
    result.earliest().map(|ts| ts.with_timezone(&Utc))
}
