//! Timestamps travel as RFC 3339 strings; there is no date object type.

use super::ModuleHandle;
use crate::runtime::error::{ScriptError, ScriptResult};
use crate::runtime::native::{Args, CallContext};
use crate::runtime::values::Value;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

pub(super) fn module() -> ModuleHandle {
    ModuleHandle::new("datetime")
        .function("now", now)
        .function("utcnow", utcnow)
        .function("parse", parse)
        .function("format", format)
        .function("timestamp", timestamp)
        .function("add_seconds", add_seconds)
}

fn parse_datetime(text: &str) -> ScriptResult<DateTime<FixedOffset>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt);
    }
    for pattern in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, pattern) {
            return Ok(naive.and_utc().fixed_offset());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc().fixed_offset());
        }
    }
    Err(ScriptError::value_error(format!(
        "unrecognised date/time '{}'",
        text
    )))
}

fn render(dt: DateTime<FixedOffset>) -> Value {
    Value::Str(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

fn now(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("datetime.now", 0, 0, &[])?;
    Ok(render(Local::now().fixed_offset()))
}

fn utcnow(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("datetime.utcnow", 0, 0, &[])?;
    Ok(render(Utc::now().fixed_offset()))
}

fn parse(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("datetime.parse", 1, 1, &[])?;
    Ok(render(parse_datetime(args.str("datetime.parse", 0)?)?))
}

fn format(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("datetime.format", 2, 2, &[])?;
    let dt = parse_datetime(args.str("datetime.format", 0)?)?;
    let pattern = args.str("datetime.format", 1)?;
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(ScriptError::value_error(format!(
            "invalid format string '{}'",
            pattern
        )));
    }
    Ok(Value::Str(dt.format_with_items(items.into_iter()).to_string()))
}

fn timestamp(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("datetime.timestamp", 1, 1, &[])?;
    let dt = parse_datetime(args.str("datetime.timestamp", 0)?)?;
    Ok(Value::Float(dt.timestamp_millis() as f64 / 1000.0))
}

fn add_seconds(_ctx: &mut dyn CallContext, args: Args) -> ScriptResult<Value> {
    args.check("datetime.add_seconds", 2, 2, &[])?;
    let dt = parse_datetime(args.str("datetime.add_seconds", 0)?)?;
    let seconds = args.number("datetime.add_seconds", 1)?;
    let delta = Duration::try_milliseconds((seconds * 1000.0).round() as i64)
        .ok_or(ScriptError::Overflow)?;
    dt.checked_add_signed(delta)
        .map(render)
        .ok_or(ScriptError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_plain_dates() {
        let dt = parse_datetime("2024-03-01").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_datetime("yesterday").is_err());
    }
}
