//! Schedule expressions.
//!
//! Accepts six-field expressions (`SEC MIN HOUR DOM MON DOW`), five-field
//! expressions (seconds implied as `0`), descriptor macros (`@daily`,
//! `@hourly`, ...) and `@every <duration>` (e.g. `@every 1m30s`).
//!
//! Day-of-week follows classic cron numbering: `0` (or `7`) is Sunday,
//! `6` is Saturday. The `cron` crate counts Sunday as `1`, so numeric
//! weekday values are shifted before parsing.
//!
//! When both day-of-month and day-of-week are restricted, a day matching
//! either field fires (`0 0 0 1 * 1` runs on the 1st and on every Monday).

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeZone};
use gantry_core::{GantryError, Result};

/// A parsed, validated schedule.
#[derive(Debug, Clone)]
pub enum Expression {
    /// Calendar schedule. Two schedules when day-of-month and day-of-week
    /// are both restricted; the earliest of them fires.
    Cron(Vec<cron::Schedule>),
    /// Fixed delay between runs.
    Every(Duration),
}

impl Expression {
    /// Parse and validate an expression.
    pub fn parse(expr: &str) -> Result<Self> {
        let trimmed = expr.trim();

        if let Some(spec) = trimmed.strip_prefix("@every") {
            let every = parse_every(spec.trim()).ok_or_else(|| invalid(expr, "bad @every duration"))?;
            if every < Duration::from_secs(1) {
                return Err(invalid(expr, "@every must be at least 1s"));
            }
            return Ok(Self::Every(every));
        }

        let normalized = normalize(trimmed).map_err(|reason| invalid(expr, reason))?;
        normalized
            .iter()
            .map(|n| cron::Schedule::from_str(n).map_err(|e| invalid(expr, e)))
            .collect::<Result<Vec<_>>>()
            .map(Self::Cron)
    }

    /// Next fire time strictly after `after`.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        match self {
            Self::Cron(schedules) => schedules
                .iter()
                .filter_map(|s| s.after(after).next())
                .min(),
            Self::Every(every) => {
                let step = chrono::Duration::from_std(*every).ok()?;
                after.clone().checked_add_signed(step)
            }
        }
    }
}

fn invalid(expr: &str, reason: impl std::fmt::Display) -> GantryError {
    GantryError::InvalidCronExpression {
        expr: expr.to_string(),
        reason: reason.to_string(),
    }
}

/// Rewrite an expression into the six-field dialect the `cron` crate parses.
///
/// The `cron` crate requires day-of-month and day-of-week to both match, so
/// an expression restricting both is split into one schedule per field.
fn normalize(expr: &str) -> std::result::Result<Vec<String>, String> {
    if let Some(macro_name) = expr.strip_prefix('@') {
        let descriptor = match macro_name {
            "yearly" | "annually" => "@yearly",
            "monthly" => "@monthly",
            "weekly" => "@weekly",
            "daily" | "midnight" => "@daily",
            "hourly" => "@hourly",
            other => return Err(format!("unknown descriptor @{other}")),
        };
        return Ok(vec![descriptor.to_string()]);
    }

    let mut fields: Vec<String> = expr.split_whitespace().map(str::to_string).collect();
    match fields.len() {
        5 => fields.insert(0, "0".into()),
        6 => {}
        n => return Err(format!("expected 5 or 6 fields, got {n}")),
    }
    fields[5] = shift_day_of_week(&fields[5])?;

    if !is_restricted(&fields[3]) || !is_restricted(&fields[5]) {
        return Ok(vec![fields.join(" ")]);
    }
    let mut by_month_day = fields.clone();
    by_month_day[5] = "*".into();
    let mut by_weekday = fields;
    by_weekday[3] = "*".into();
    Ok(vec![by_month_day.join(" "), by_weekday.join(" ")])
}

/// A day field starting with `*` or `?` matches every day, even with a step.
fn is_restricted(field: &str) -> bool {
    !field.starts_with(['*', '?'])
}

/// Map `0-6` (Sunday first, `7` alias for Sunday) onto the crate's `1-7`.
fn shift_day_of_week(field: &str) -> std::result::Result<String, String> {
    let items = field
        .split(',')
        .map(|item| {
            let (range, step) = match item.split_once('/') {
                Some((range, step)) => (range, Some(step)),
                None => (item, None),
            };
            let shifted = if range == "*" || range == "?" {
                range.to_string()
            } else if range.contains('-') {
                range
                    .split('-')
                    .map(|day| shift_day(day, false))
                    .collect::<std::result::Result<Vec<_>, _>>()?
                    .join("-")
            } else {
                shift_day(range, true)?
            };
            Ok(match step {
                Some(step) => format!("{shifted}/{step}"),
                None => shifted,
            })
        })
        .collect::<std::result::Result<Vec<_>, String>>()?;
    Ok(items.join(","))
}

fn shift_day(token: &str, allow_seven: bool) -> std::result::Result<String, String> {
    match token.parse::<u8>() {
        Ok(n @ 0..=6) => Ok((n + 1).to_string()),
        Ok(7) if allow_seven => Ok("1".into()),
        Ok(n) => Err(format!("day-of-week {n} out of range 0-6")),
        // Names (MON, Tue, ...) pass through untouched.
        Err(_) => Ok(token.to_string()),
    }
}

/// Parse `1h30m`, `90s`, `500ms` style durations.
fn parse_every(spec: &str) -> Option<Duration> {
    let mut total = Duration::ZERO;
    let mut digits = String::new();
    let mut seen_unit = false;
    let mut chars = spec.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits.parse().ok()?;
        digits.clear();
        let part = match c {
            'h' => Duration::from_secs(n.checked_mul(3600)?),
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                Duration::from_millis(n)
            }
            'm' => Duration::from_secs(n.checked_mul(60)?),
            's' => Duration::from_secs(n),
            _ => return None,
        };
        total = total.checked_add(part)?;
        seen_unit = true;
    }

    if !digits.is_empty() || !seen_unit {
        return None;
    }
    Some(total)
}
