//! Cell <-> attribute value conversion
//!
//! Import tries a fixed, ordered list of accepted formats per target type; the
//! first one that parses wins. Export is lenient: a value that does not fit its
//! declared kind is written as text instead of failing.

use crate::error::{FlatsheetError, FlatsheetResult};
use crate::types::{format_number, CellKind, CellValue};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value;

/// Accepted date patterns, tried in order
pub const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%Y%m%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%d-%b-%Y",
];

/// Accepted date-time patterns, tried in order
pub const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S",
];

const JSON_DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
}

pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "yes" | "y" | "1" | "on" => Some(true),
        "false" | "no" | "n" | "0" | "off" => Some(false),
        _ => None,
    }
}

/// Numbers may carry thousands separators ("1,234.5")
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Serial of 9999-12-31, the last day Excel can show
pub const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Excel serial day number (1900 system) to a timestamp
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || !(0.0..=MAX_EXCEL_SERIAL).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    let days = serial.trunc() as i64;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;
    let offset = Duration::try_days(days)?.checked_add(&Duration::try_seconds(seconds)?)?;
    epoch.checked_add_signed(offset)
}

fn coercion_failure(cell: &CellValue, kind: CellKind) -> FlatsheetError {
    FlatsheetError::TypeCoercionFailure {
        value: cell.render(),
        target: kind.name().to_string(),
    }
}

fn integral(n: f64) -> Option<i64> {
    (n.fract() == 0.0 && n.abs() < 9.0e15).then_some(n as i64)
}

fn number_json(n: f64) -> Value {
    match integral(n) {
        Some(i) => Value::from(i),
        None => Value::from(n),
    }
}

fn datetime_json(dt: NaiveDateTime) -> Value {
    Value::String(dt.format(JSON_DATETIME_FORMAT).to_string())
}

fn date_json(d: NaiveDate) -> Value {
    Value::String(d.format("%Y-%m-%d").to_string())
}

/// Convert an imported cell into the attribute value for `kind`
///
/// Blank cells become `null`.
pub fn cell_to_json(cell: &CellValue, kind: CellKind) -> FlatsheetResult<Value> {
    if cell.is_blank() {
        return Ok(Value::Null);
    }

    let fail = || coercion_failure(cell, kind);

    let value = match kind {
        CellKind::Auto => match cell {
            CellValue::Text(s) => Value::String(s.clone()),
            CellValue::Number(n) => number_json(*n),
            CellValue::Bool(b) => Value::Bool(*b),
            CellValue::Date(d) => date_json(*d),
            CellValue::DateTime(dt) => datetime_json(*dt),
            CellValue::Empty => Value::Null,
        },
        CellKind::Text => Value::String(cell.render()),
        CellKind::Integer => {
            let n = match cell {
                CellValue::Number(n) => *n,
                CellValue::Text(s) => parse_number(s).ok_or_else(fail)?,
                _ => return Err(fail()),
            };
            Value::from(integral(n).ok_or_else(fail)?)
        }
        CellKind::Float => match cell {
            CellValue::Number(n) => Value::from(*n),
            CellValue::Text(s) => Value::from(parse_number(s).ok_or_else(fail)?),
            _ => return Err(fail()),
        },
        CellKind::Bool => match cell {
            CellValue::Bool(b) => Value::Bool(*b),
            CellValue::Number(n) if *n == 0.0 || *n == 1.0 => Value::Bool(*n == 1.0),
            CellValue::Text(s) => Value::Bool(parse_bool(s).ok_or_else(fail)?),
            _ => return Err(fail()),
        },
        CellKind::Date => match cell {
            CellValue::Date(d) => date_json(*d),
            CellValue::DateTime(dt) => date_json(dt.date()),
            CellValue::Number(n) => date_json(excel_serial_to_datetime(*n).ok_or_else(fail)?.date()),
            CellValue::Text(s) => {
                let date = parse_date(s)
                    .or_else(|| parse_datetime(s).map(|dt| dt.date()))
                    .ok_or_else(fail)?;
                date_json(date)
            }
            _ => return Err(fail()),
        },
        CellKind::DateTime => match cell {
            CellValue::DateTime(dt) => datetime_json(*dt),
            CellValue::Date(d) => datetime_json(d.and_time(NaiveTime::MIN)),
            CellValue::Number(n) => datetime_json(excel_serial_to_datetime(*n).ok_or_else(fail)?),
            CellValue::Text(s) => {
                let dt = parse_datetime(s)
                    .or_else(|| parse_date(s).map(|d| d.and_time(NaiveTime::MIN)))
                    .ok_or_else(fail)?;
                datetime_json(dt)
            }
            _ => return Err(fail()),
        },
    };

    Ok(value)
}

/// Convert an attribute value into the exported cell for `kind`
pub fn json_to_cell(value: &Value, kind: CellKind) -> CellValue {
    match value {
        Value::Null => CellValue::Empty,
        Value::Bool(b) => match kind {
            CellKind::Text => CellValue::Text(b.to_string()),
            _ => CellValue::Bool(*b),
        },
        Value::Number(n) => {
            let f = n.as_f64().unwrap_or_default();
            match kind {
                CellKind::Text => CellValue::Text(format_number(f)),
                CellKind::Date => excel_serial_to_datetime(f)
                    .map(|dt| CellValue::Date(dt.date()))
                    .unwrap_or(CellValue::Number(f)),
                _ => CellValue::Number(f),
            }
        }
        Value::String(s) => string_to_cell(s, kind),
        Value::Array(_) | Value::Object(_) => CellValue::Text(value.to_string()),
    }
}

fn string_to_cell(s: &str, kind: CellKind) -> CellValue {
    let parsed = match kind {
        CellKind::Date => parse_date(s)
            .or_else(|| parse_datetime(s).map(|dt| dt.date()))
            .map(CellValue::Date),
        CellKind::DateTime => parse_datetime(s).map(CellValue::DateTime),
        CellKind::Integer | CellKind::Float => parse_number(s).map(CellValue::Number),
        CellKind::Bool => parse_bool(s).map(CellValue::Bool),
        CellKind::Auto | CellKind::Text => None,
    };
    parsed.unwrap_or_else(|| CellValue::Text(s.to_string()))
}

/// Text form of a value inside a joined (wildcard) cell
pub fn json_to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| n.to_string()),
        other => other.to_string(),
    }
}
