//! Weekly opening-hours evaluation.
//!
//! Implements a practical subset of the OSM `opening_hours` syntax:
//! `24/7`, `;`-separated rules, `off`/`closed` rules, day ranges and
//! lists with two-letter abbreviations and week wraparound, and
//! comma-separated `HH:MM-HH:MM` ranges that may span midnight. Holiday
//! selectors, seasonal qualifiers and nested exceptions are not
//! supported; fragments that do not parse are skipped rather than
//! failing the whole evaluation.

use chrono::{Datelike, Local, Timelike, Weekday};
use serde::Serialize;

/// Whether a POI is open at a given instant. `Unknown` covers absent or
/// unparseable schedules; whether that counts as open or closed is
/// caller policy, not decided here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenState {
    Open,
    Closed,
    Unknown,
}

/// Day selector of one schedule rule. Days are indexed 0 = Monday
/// through 6 = Sunday.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DayMatcher {
    Always,
    Single(u8),
    /// Inclusive circular range; wraps across the week boundary when the
    /// end day precedes the start day.
    Range(u8, u8),
    List(Vec<u8>),
}

impl DayMatcher {
    fn matches(&self, day: u8) -> bool {
        match self {
            DayMatcher::Always => true,
            DayMatcher::Single(d) => *d == day,
            DayMatcher::Range(start, end) => {
                if start <= end {
                    day >= *start && day <= *end
                } else {
                    day >= *start || day <= *end
                }
            }
            DayMatcher::List(days) => days.contains(&day),
        }
    }
}

/// Half-open interval of minutes of the day. `end < start` means the
/// range spans midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: u16,
    pub end: u16,
}

impl TimeRange {
    fn contains(&self, minute: u16) -> bool {
        if self.end < self.start {
            minute >= self.start || minute < self.end
        } else {
            minute >= self.start && minute < self.end
        }
    }
}

/// One clause of a weekly schedule. A rule marked `closed` never
/// contributes an open match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRule {
    pub days: DayMatcher,
    pub ranges: Vec<TimeRange>,
    pub closed: bool,
}

fn parse_day(token: &str) -> Option<u8> {
    match token {
        "Mo" => Some(0),
        "Tu" => Some(1),
        "We" => Some(2),
        "Th" => Some(3),
        "Fr" => Some(4),
        "Sa" => Some(5),
        "Su" => Some(6),
        _ => None,
    }
}

fn parse_day_matcher(token: &str) -> Option<DayMatcher> {
    if let Some((start, end)) = token.split_once('-') {
        return Some(DayMatcher::Range(parse_day(start)?, parse_day(end)?));
    }
    if token.contains(',') {
        let days = token.split(',').map(parse_day).collect::<Option<Vec<_>>>()?;
        return Some(DayMatcher::List(days));
    }
    parse_day(token).map(DayMatcher::Single)
}

fn parse_minute(token: &str) -> Option<u16> {
    let (h, m) = token.split_once(':')?;
    let h: u16 = h.parse().ok()?;
    let m: u16 = m.parse().ok()?;
    if h > 24 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

fn parse_time_range(token: &str) -> Option<TimeRange> {
    let (start, end) = token.split_once('-')?;
    Some(TimeRange {
        start: parse_minute(start)?,
        end: parse_minute(end)?,
    })
}

fn parse_rule(rule: &str) -> Option<ScheduleRule> {
    let rule = rule.trim();
    if rule.is_empty() {
        return None;
    }

    // A leading day specification is optional; without one the rule
    // applies to every day.
    let (days, time_spec) = match rule.split_once(char::is_whitespace) {
        Some((first, rest)) => match parse_day_matcher(first) {
            Some(days) => (days, rest.trim()),
            None => (DayMatcher::Always, rule),
        },
        None => match parse_day_matcher(rule) {
            // A bare day specification carries nothing to match against.
            Some(_) => return None,
            None => (DayMatcher::Always, rule),
        },
    };

    if time_spec.eq_ignore_ascii_case("off") || time_spec.eq_ignore_ascii_case("closed") {
        return Some(ScheduleRule {
            days,
            ranges: Vec::new(),
            closed: true,
        });
    }

    let ranges: Vec<TimeRange> = time_spec
        .split(',')
        .filter_map(|t| parse_time_range(t.trim()))
        .collect();

    if ranges.is_empty() {
        return None;
    }

    Some(ScheduleRule {
        days,
        ranges,
        closed: false,
    })
}

/// Parses a raw schedule string into its recognizable rules, skipping
/// fragments the grammar does not cover.
pub fn parse_schedule(raw: &str) -> Vec<ScheduleRule> {
    raw.split(';').filter_map(parse_rule).collect()
}

/// Evaluates a raw schedule string at the given weekday and minute of
/// the day.
pub fn evaluate_at(raw: &str, weekday: Weekday, minute: u16) -> OpenState {
    let raw = raw.trim();
    if raw.is_empty() {
        return OpenState::Unknown;
    }
    if raw == "24/7" {
        return OpenState::Open;
    }

    let rules = parse_schedule(raw);
    if rules.is_empty() {
        return OpenState::Unknown;
    }

    let day = weekday.num_days_from_monday() as u8;
    for rule in &rules {
        if rule.closed || !rule.days.matches(day) {
            continue;
        }
        if rule.ranges.iter().any(|r| r.contains(minute)) {
            return OpenState::Open;
        }
    }

    OpenState::Closed
}

/// Evaluates a schedule against the local clock.
pub fn evaluate_now(raw: &str) -> OpenState {
    let now = Local::now();
    evaluate_at(raw, now.weekday(), (now.hour() * 60 + now.minute()) as u16)
}
