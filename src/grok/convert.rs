// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

use crate::record::FieldValue;

/// A captured value that does not fit its declared type. Never fatal, the
/// pattern is treated as not matching the line.
#[derive(Error, Debug, PartialEq)]
pub enum ConvertError {
    #[error("invalid integer: {0:?}")]
    Int(String),

    #[error("invalid float: {0:?}")]
    Float(String),

    #[error("invalid boolean: {0:?}")]
    Bool(String),

    #[error("invalid duration: {0:?}")]
    Duration(String),

    #[error("timestamp {value:?} does not match layout {layout}")]
    Timestamp { value: String, layout: String },
}

pub fn to_int(raw: &str) -> Result<FieldValue, ConvertError> {
    raw.parse::<i64>()
        .map(FieldValue::Int)
        .map_err(|_| ConvertError::Int(raw.to_string()))
}

pub fn to_float(raw: &str) -> Result<FieldValue, ConvertError> {
    raw.parse::<f64>()
        .map(FieldValue::Float)
        .map_err(|_| ConvertError::Float(raw.to_string()))
}

pub fn to_bool(raw: &str) -> Result<FieldValue, ConvertError> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(FieldValue::Bool(true)),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(FieldValue::Bool(false)),
        _ => Err(ConvertError::Bool(raw.to_string())),
    }
}

/// Strings lose the double quotes around them
pub fn to_text(raw: &str) -> FieldValue {
    FieldValue::String(raw.trim_matches('"').to_string())
}

pub fn to_duration(raw: &str) -> Result<FieldValue, ConvertError> {
    parse_go_duration(raw)
        .map(FieldValue::Int)
        .ok_or_else(|| ConvertError::Duration(raw.to_string()))
}

/// Parses Go duration syntax (`1h2m`, `5.432µs`, `-1.5s`) into nanoseconds.
pub fn parse_go_duration(raw: &str) -> Option<i64> {
    let (negative, mut rest) = match raw.as_bytes().first() {
        Some(b'-') => (true, &raw[1..]),
        Some(b'+') => (false, &raw[1..]),
        _ => (false, raw),
    };

    if rest == "0" {
        return Some(0);
    }
    if rest.is_empty() {
        return None;
    }

    let mut total: i128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let unit_len = rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() || *c == '.')
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        let scale: i128 = match &rest[..unit_len] {
            "ns" => 1,
            "us" | "\u{00b5}s" | "\u{03bc}s" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3600 * 1_000_000_000,
            _ => return None,
        };
        rest = &rest[unit_len..];

        let whole: i128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        let mut value = whole.checked_mul(scale)?;

        // fraction, truncated toward zero at nanosecond precision
        let mut place = scale;
        for digit in frac_part.bytes() {
            place /= 10;
            if place == 0 {
                break;
            }
            value += i128::from(digit - b'0') * place;
        }

        total = total.checked_add(value)?;
        if total > i128::from(i64::MAX) + 1 {
            return None;
        }
    }

    let signed = if negative { -total } else { total };
    i64::try_from(signed).ok()
}
