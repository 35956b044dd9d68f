use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, Timelike};

/// Token a null cell contributes to a derived primary key.
pub const NULL_KEY_TOKEN: &str = "<NA>";

const PLACEHOLDER_TOKENS: &[&str] = &["na", "n/a", "nan", "null", "none", "<na>"];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%Y/%m/%d",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%Y%m%d",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

// Month-granularity layouts resolve to the first day of the month.
const MONTH_FORMATS: &[&str] = &["%Y-%m", "%m/%Y", "%Y/%m", "%m.%Y", "%b %Y", "%B %Y"];

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

/// A single field of a record; `None` is the null marker.
pub type Cell = Option<Value>;

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => {
                if dt.num_seconds_from_midnight() == 0 && dt.nanosecond() == 0 {
                    dt.format("%Y-%m-%d").to_string()
                } else {
                    dt.format("%Y-%m-%d %H:%M:%S").to_string()
                }
            }
        }
    }

    pub fn is_textual_or_numeric(&self) -> bool {
        matches!(self, Value::String(_) | Value::Integer(_) | Value::Float(_))
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Value::Date(_) | Value::DateTime(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

pub fn is_placeholder(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty()
        || PLACEHOLDER_TOKENS
            .iter()
            .any(|token| trimmed.eq_ignore_ascii_case(token))
}

/// Converts a raw source field into a cell; blanks and placeholder tokens become null.
pub fn parse_raw_cell(raw: &str) -> Cell {
    if is_placeholder(raw) {
        None
    } else {
        Some(Value::String(raw.to_string()))
    }
}

pub fn render_cell(cell: &Cell) -> String {
    cell.as_ref().map(Value::as_display).unwrap_or_default()
}

pub fn key_token(cell: &Cell) -> String {
    match cell {
        Some(value) => value.as_display(),
        None => NULL_KEY_TOKEN.to_string(),
    }
}

/// Parses a date or timestamp in any of the accepted layouts. Returns `None`
/// rather than an error so callers can degrade the cell to null.
pub fn parse_lenient_datetime(value: &str) -> Option<Value> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(Value::DateTime(parsed));
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Some(Value::Date(parsed));
        }
    }
    let with_day = format!("{trimmed} 01");
    for fmt in MONTH_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(&with_day, &format!("{fmt} %d")) {
            return Some(Value::Date(parsed));
        }
    }
    None
}

/// Date alignment of an arbitrary cell; temporal values pass through untouched.
pub fn to_datetime(value: &Value) -> Option<Value> {
    match value {
        Value::Date(_) | Value::DateTime(_) => Some(value.clone()),
        other => parse_lenient_datetime(&other.as_display()),
    }
}

/// Strips currency decoration. `(x)` marks a negative; a bracketed value
/// that also carries its own sign is rejected.
pub(crate) fn clean_numeric(raw: &str) -> Option<(String, bool)> {
    let mut text = raw.trim();
    let mut negative = false;
    if text.starts_with('(') && text.ends_with(')') && text.len() > 2 {
        negative = true;
        text = &text[1..text.len() - 1];
    }
    let cleaned = text
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect::<String>();
    if negative && cleaned.starts_with(['-', '+']) {
        return None;
    }
    Some((cleaned, negative))
}

pub fn parse_float_text(raw: &str) -> Option<f64> {
    let (cleaned, negative) = clean_numeric(raw)?;
    let parsed: f64 = cleaned.parse().ok()?;
    if !parsed.is_finite() {
        return None;
    }
    Some(if negative { -parsed } else { parsed })
}

pub fn cast_float(value: &Value) -> Result<f64, String> {
    match value {
        Value::Float(f) => Ok(*f),
        Value::Integer(i) => Ok(*i as f64),
        Value::String(s) => {
            parse_float_text(s).ok_or_else(|| format!("'{s}' is not a valid float"))
        }
        other => Err(format!("'{other}' is a date and cannot become a float")),
    }
}

pub fn cast_integer(value: &Value) -> Result<i64, String> {
    let from_float = |f: f64, shown: &dyn fmt::Display| {
        if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
            Ok(f as i64)
        } else {
            Err(format!("'{shown}' has a fractional part or is out of range"))
        }
    };
    match value {
        Value::Integer(i) => Ok(*i),
        Value::Float(f) => from_float(*f, f),
        Value::String(s) => {
            let (cleaned, negative) =
                clean_numeric(s).ok_or_else(|| format!("'{s}' has a sign inside brackets"))?;
            if let Ok(parsed) = cleaned.parse::<i64>() {
                return if negative {
                    parsed
                        .checked_neg()
                        .ok_or_else(|| format!("'{s}' is out of range for an integer"))
                } else {
                    Ok(parsed)
                };
            }
            let parsed =
                parse_float_text(s).ok_or_else(|| format!("'{s}' is not a valid integer"))?;
            from_float(parsed, s)
        }
        other => Err(format!("'{other}' is a date and cannot become an integer")),
    }
}
