//! Calendar-based timer schedules.
//!
//! Seven-field expressions (second, minute, hour, day-of-month, month,
//! day-of-week, year) supporting wildcards, single values, lists, ranges,
//! and increments. Month and day-of-week accept three-letter names;
//! day-of-week 7 is Sunday like 0.

use crate::error::FormatError;
use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

const MONTH_NAMES: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];
const DAY_NAMES: [&str; 7] = ["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// Search horizon for the next expiration when the year field is a
/// wildcard. A schedule with no match within this window is dormant.
const SEARCH_YEARS: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldValues {
    Wildcard,
    Set(BTreeSet<u32>),
}

/// One parsed schedule field: the original expression plus the expanded
/// value set over the field's domain.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduleField {
    expr: String,
    values: FieldValues,
}

impl ScheduleField {
    fn matches(&self, value: u32) -> bool {
        match &self.values {
            FieldValues::Wildcard => true,
            FieldValues::Set(set) => set.contains(&value),
        }
    }

    fn first_at_or_after(&self, value: u32, max: u32) -> Option<u32> {
        match &self.values {
            FieldValues::Wildcard => (value <= max).then_some(value),
            FieldValues::Set(set) => set.range(value..=max).next().copied(),
        }
    }
}

fn parse_unit(text: &str, min: u32, max: u32, names: Option<&[&str]>) -> Result<u32, FormatError> {
    let lowered = text.trim().to_ascii_lowercase();
    if let Some(names) = names {
        if let Some(index) = names.iter().position(|n| *n == lowered) {
            // Name tables are zero-based for days, one-based for months.
            return Ok(index as u32 + min.min(1));
        }
    }
    let value: u32 = lowered
        .parse()
        .map_err(|_| FormatError::Malformed(format!("schedule value {text:?} is not valid")))?;
    if value < min || value > max {
        return Err(FormatError::Malformed(format!(
            "schedule value {value} outside {min}..={max}"
        )));
    }
    Ok(value)
}

fn parse_field(
    expr: &str,
    min: u32,
    max: u32,
    names: Option<&[&str]>,
) -> Result<ScheduleField, FormatError> {
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return Err(FormatError::Malformed("empty schedule field".to_string()));
    }
    if trimmed == "*" {
        return Ok(ScheduleField {
            expr: trimmed.to_string(),
            values: FieldValues::Wildcard,
        });
    }

    let mut values = BTreeSet::new();
    for part in trimmed.split(',') {
        let part = part.trim();
        if let Some((start, increment)) = part.split_once('/') {
            let start = if start.trim() == "*" {
                min
            } else {
                parse_unit(start, min, max, names)?
            };
            let increment: u32 = increment.trim().parse().map_err(|_| {
                FormatError::Malformed(format!("schedule increment {increment:?} is not valid"))
            })?;
            if increment == 0 {
                return Err(FormatError::Malformed(
                    "schedule increment must be positive".to_string(),
                ));
            }
            let mut v = start;
            while v <= max {
                values.insert(v);
                v += increment;
            }
        } else if let Some((lo, hi)) = part.split_once('-') {
            let lo = parse_unit(lo, min, max, names)?;
            let hi = parse_unit(hi, min, max, names)?;
            if lo <= hi {
                values.extend(lo..=hi);
            } else {
                // Wrapping range, e.g. Fri-Mon.
                values.extend(lo..=max);
                values.extend(min..=hi);
            }
        } else {
            values.insert(parse_unit(part, min, max, names)?);
        }
    }
    Ok(ScheduleField {
        expr: trimmed.to_string(),
        values: FieldValues::Set(values),
    })
}

/// Serialized form: the seven expression strings, defaulted the way the
/// component model defaults them (midnight every day).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    #[serde(default = "default_zero")]
    pub second: String,
    #[serde(default = "default_zero")]
    pub minute: String,
    #[serde(default = "default_zero")]
    pub hour: String,
    #[serde(default = "default_wildcard")]
    pub day_of_month: String,
    #[serde(default = "default_wildcard")]
    pub month: String,
    #[serde(default = "default_wildcard")]
    pub day_of_week: String,
    #[serde(default = "default_wildcard")]
    pub year: String,
}

fn default_zero() -> String {
    "0".to_string()
}

fn default_wildcard() -> String {
    "*".to_string()
}

impl Default for ScheduleSpec {
    fn default() -> Self {
        Self {
            second: default_zero(),
            minute: default_zero(),
            hour: default_zero(),
            day_of_month: default_wildcard(),
            month: default_wildcard(),
            day_of_week: default_wildcard(),
            year: default_wildcard(),
        }
    }
}

/// A parsed calendar schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSchedule {
    second: ScheduleField,
    minute: ScheduleField,
    hour: ScheduleField,
    day_of_month: ScheduleField,
    month: ScheduleField,
    day_of_week: ScheduleField,
    year: ScheduleField,
}

impl TryFrom<ScheduleSpec> for CalendarSchedule {
    type Error = FormatError;

    fn try_from(spec: ScheduleSpec) -> Result<Self, FormatError> {
        Ok(Self {
            second: parse_field(&spec.second, 0, 59, None)?,
            minute: parse_field(&spec.minute, 0, 59, None)?,
            hour: parse_field(&spec.hour, 0, 23, None)?,
            day_of_month: parse_field(&spec.day_of_month, 1, 31, None)?,
            month: parse_field(&spec.month, 1, 12, Some(&MONTH_NAMES))?,
            day_of_week: parse_day_of_week(&spec.day_of_week)?,
            year: parse_field(&spec.year, 1970, 9999, None)?,
        })
    }
}

fn parse_day_of_week(expr: &str) -> Result<ScheduleField, FormatError> {
    // 7 is accepted as an alias for Sunday (0).
    let field = parse_field(expr, 0, 7, Some(&DAY_NAMES))?;
    Ok(match field.values {
        FieldValues::Wildcard => field,
        FieldValues::Set(set) => ScheduleField {
            expr: field.expr,
            values: FieldValues::Set(set.into_iter().map(|d| d % 7).collect()),
        },
    })
}

impl From<&CalendarSchedule> for ScheduleSpec {
    fn from(schedule: &CalendarSchedule) -> Self {
        Self {
            second: schedule.second.expr.clone(),
            minute: schedule.minute.expr.clone(),
            hour: schedule.hour.expr.clone(),
            day_of_month: schedule.day_of_month.expr.clone(),
            month: schedule.month.expr.clone(),
            day_of_week: schedule.day_of_week.expr.clone(),
            year: schedule.year.expr.clone(),
        }
    }
}

impl fmt::Display for CalendarSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {} {} {}",
            self.second.expr,
            self.minute.expr,
            self.hour.expr,
            self.day_of_month.expr,
            self.month.expr,
            self.day_of_week.expr,
            self.year.expr
        )
    }
}

impl CalendarSchedule {
    pub fn parse(spec: ScheduleSpec) -> Result<Self, FormatError> {
        Self::try_from(spec)
    }

    pub fn spec(&self) -> ScheduleSpec {
        ScheduleSpec::from(self)
    }

    fn date_matches(&self, date: chrono::NaiveDate) -> bool {
        self.year.matches(date.year() as u32)
            && self.month.matches(date.month())
            && self.day_of_month.matches(date.day())
            && self
                .day_of_week
                .matches(date.weekday().num_days_from_sunday())
    }

    /// Smallest matching time-of-day at or after (h, m, s), if any.
    fn time_at_or_after(&self, hour: u32, minute: u32, second: u32) -> Option<(u32, u32, u32)> {
        let mut h = hour;
        let mut m = minute;
        let mut s = second;
        while let Some(hh) = self.hour.first_at_or_after(h, 23) {
            if hh != h {
                m = 0;
                s = 0;
            }
            if let Some(mm) = self.minute.first_at_or_after(m, 59) {
                if mm != m {
                    s = 0;
                }
                if let Some(ss) = self.second.first_at_or_after(s, 59) {
                    return Some((hh, mm, ss));
                }
                // No second fits in this minute; try the next minute.
                m = mm + 1;
                s = 0;
                if m <= 59 {
                    continue;
                }
            }
            h = hh + 1;
            m = 0;
            s = 0;
            if h > 23 {
                return None;
            }
        }
        None
    }

    /// The first expiration strictly after `after`, or `None` if the
    /// schedule never fires again within its horizon.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after + Duration::seconds(1);
        let horizon = match &self.year.values {
            FieldValues::Wildcard => start.year() + SEARCH_YEARS,
            FieldValues::Set(years) => *years.iter().next_back()? as i32,
        };

        let mut date = start.date_naive();
        let mut first_day = true;
        while date.year() <= horizon {
            if self.date_matches(date) {
                let (h, m, s) = if first_day {
                    (start.hour(), start.minute(), start.second())
                } else {
                    (0, 0, 0)
                };
                if let Some((hh, mm, ss)) = self.time_at_or_after(h, m, s) {
                    return Utc
                        .with_ymd_and_hms(date.year(), date.month(), date.day(), hh, mm, ss)
                        .single();
                }
            }
            date = date.succ_opt()?;
            first_day = false;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn schedule(spec: ScheduleSpec) -> CalendarSchedule {
        CalendarSchedule::parse(spec).unwrap()
    }

    #[test]
    fn test_default_spec_is_daily_midnight() {
        let s = schedule(ScheduleSpec::default());
        assert_eq!(
            s.next_after(at(2026, 8, 27, 10, 30, 0)),
            Some(at(2026, 8, 28, 0, 0, 0))
        );
    }

    #[test]
    fn test_next_is_strictly_after() {
        let s = schedule(ScheduleSpec {
            second: "0".into(),
            minute: "30".into(),
            hour: "10".into(),
            ..ScheduleSpec::default()
        });
        // Exactly at an expiration: next is tomorrow's.
        assert_eq!(
            s.next_after(at(2026, 8, 27, 10, 30, 0)),
            Some(at(2026, 8, 28, 10, 30, 0))
        );
    }

    #[test]
    fn test_lists_ranges_and_increments() {
        let s = schedule(ScheduleSpec {
            second: "0".into(),
            minute: "*/15".into(),
            hour: "9-11".into(),
            ..ScheduleSpec::default()
        });
        assert_eq!(
            s.next_after(at(2026, 8, 27, 9, 16, 0)),
            Some(at(2026, 8, 27, 9, 30, 0))
        );
        assert_eq!(
            s.next_after(at(2026, 8, 27, 11, 45, 0)),
            Some(at(2026, 8, 28, 9, 0, 0))
        );

        let s = schedule(ScheduleSpec {
            second: "0".into(),
            minute: "0".into(),
            hour: "8,12,17".into(),
            ..ScheduleSpec::default()
        });
        assert_eq!(
            s.next_after(at(2026, 8, 27, 12, 0, 1)),
            Some(at(2026, 8, 27, 17, 0, 0))
        );
    }

    #[test]
    fn test_day_of_week_names_and_wrap() {
        let s = schedule(ScheduleSpec {
            second: "0".into(),
            minute: "0".into(),
            hour: "6".into(),
            day_of_week: "Fri-Mon".into(),
            ..ScheduleSpec::default()
        });
        // 2026-08-27 is a Thursday; next match is Friday the 28th.
        assert_eq!(
            s.next_after(at(2026, 8, 27, 12, 0, 0)),
            Some(at(2026, 8, 28, 6, 0, 0))
        );
        // Saturday and Sunday match via the wrap; Tuesday does not.
        assert!(s.date_matches(at(2026, 8, 30, 0, 0, 0).date_naive()));
        assert!(!s.date_matches(at(2026, 9, 1, 0, 0, 0).date_naive()));
    }

    #[test]
    fn test_seven_is_sunday() {
        let s = schedule(ScheduleSpec {
            day_of_week: "7".into(),
            ..ScheduleSpec::default()
        });
        // 2026-08-30 is a Sunday.
        assert!(s.date_matches(at(2026, 8, 30, 0, 0, 0).date_naive()));
    }

    #[test]
    fn test_month_names() {
        let s = schedule(ScheduleSpec {
            month: "Dec".into(),
            day_of_month: "25".into(),
            ..ScheduleSpec::default()
        });
        assert_eq!(
            s.next_after(at(2026, 8, 27, 0, 0, 0)),
            Some(at(2026, 12, 25, 0, 0, 0))
        );
    }

    #[test]
    fn test_bounded_year_exhausts() {
        let s = schedule(ScheduleSpec {
            year: "2025".into(),
            ..ScheduleSpec::default()
        });
        assert_eq!(s.next_after(at(2026, 1, 1, 0, 0, 0)), None);
    }

    #[test]
    fn test_invalid_fields_are_rejected() {
        for spec in [
            ScheduleSpec {
                second: "61".into(),
                ..ScheduleSpec::default()
            },
            ScheduleSpec {
                minute: "*/0".into(),
                ..ScheduleSpec::default()
            },
            ScheduleSpec {
                month: "Frost".into(),
                ..ScheduleSpec::default()
            },
            ScheduleSpec {
                hour: "".into(),
                ..ScheduleSpec::default()
            },
        ] {
            assert!(CalendarSchedule::parse(spec).is_err());
        }
    }

    #[test]
    fn test_spec_round_trips() {
        let spec = ScheduleSpec {
            second: "0".into(),
            minute: "*/10".into(),
            hour: "9-17".into(),
            day_of_month: "*".into(),
            month: "jan,jul".into(),
            day_of_week: "mon-fri".into(),
            year: "*".into(),
        };
        let s = schedule(spec.clone());
        assert_eq!(s.spec(), spec);
    }
}
