//! Deterministic parser for capture instructions.
//!
//! Converts one casual line of user text into a structured capture via
//! ordered pattern matching. Identical input always yields identical
//! output or the same structured error; no AI is ever consulted here.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::ParseError;
use crate::model::{RecurFrequency, RecurrencePreset, TimeOfDayWindow, Weekday};

/// What a parsed instruction asks the system to do.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureAction {
    /// Repeating obligation materialized as habit occurrences.
    TaskSeries { preset: RecurrencePreset },
    /// Repeating user-reserved time, written through to the calendar.
    TimeBlock { preset: RecurrencePreset },
    /// A single non-recurring calendar event ("next tue 2:30pm").
    OneOffEvent { weekday: Weekday, time: NaiveTime },
    /// A plain task that may not start before a date ("sometime next week").
    DeferredTask { start_after: NaiveDate },
}

/// Structured result of parsing one instruction.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCapture {
    pub title: String,
    pub ai_excluded: bool,
    pub action: CaptureAction,
}

impl ParsedCapture {
    pub fn entity_kind(&self) -> &'static str {
        match self.action {
            CaptureAction::TaskSeries { .. } => "task_series",
            CaptureAction::TimeBlock { .. } => "time_block",
            CaptureAction::OneOffEvent { .. } => "one_off_event",
            CaptureAction::DeferredTask { .. } => "deferred_task",
        }
    }
}

static WEEKDAY_ALIASES: Lazy<Vec<(Regex, Weekday)>> = Lazy::new(|| {
    vec![
        (re(r"\b(mon|monday|mondays)\b"), Weekday::Mo),
        (re(r"\b(tue|tues|tuesday|tuesdays)\b"), Weekday::Tu),
        (re(r"\b(wed|weds|wednesday|wednesdays)\b"), Weekday::We),
        (re(r"\b(thu|thur|thurs|thursday|thursdays)\b"), Weekday::Th),
        (re(r"\b(fri|friday|fridays)\b"), Weekday::Fr),
        (re(r"\b(sat|saturday|saturdays)\b"), Weekday::Sa),
        (re(r"\b(sun|sunday|sundays)\b"), Weekday::Su),
    ]
});

static TIME_RE: Lazy<Regex> =
    Lazy::new(|| re(r"\b(?P<h>\d{1,2})(?::(?P<m>\d{2}))?\s*(?P<ampm>am|pm)?\b"));

static TIME_RANGE_RE: Lazy<Regex> =
    Lazy::new(|| re(r"(.+?)\s*(?:to|\-|\u{2013}|\u{2014})\s*(.+)"));

static EVERY_N_RE: Lazy<Regex> =
    Lazy::new(|| re(r"\bevery\s+(\d+)\s+(day|days|week|weeks|month|months|year|years)\b"));

static COUNT_PER_WEEK_RE: Lazy<Regex> = Lazy::new(|| re(r"\b(\d+)\s*(x|times)\s*(per\s*)?week\b"));

static AT_TIME_RE: Lazy<Regex> = Lazy::new(|| re(r"\bat\s+(.+)$"));

static DURATION_MIN_RE: Lazy<Regex> =
    Lazy::new(|| re(r"\bfor\s+(\d+(?:\.\d+)?)\s*(min|mins|minute|minutes)\b"));

static DURATION_HOUR_RE: Lazy<Regex> =
    Lazy::new(|| re(r"\bfor\s+(\d+(?:\.\d+)?)\s*(hr|hrs|hour|hours)\b"));

static NEXT_WEEK_RE: Lazy<Regex> = Lazy::new(|| re(r"\b(sometime\s+)?next\s+week\b"));

static NEXT_WEEKDAY_RE: Lazy<Regex> = Lazy::new(|| {
    re(r"\bnext\s+(mon|monday|tue|tues|tuesday|wed|weds|wednesday|thu|thur|thurs|thursday|fri|friday|sat|saturday|sun|sunday)\b")
});

static DAILY_RE: Lazy<Regex> = Lazy::new(|| re(r"\bevery\s+day\b|\bdaily\b"));
static WEEKLY_RE: Lazy<Regex> = Lazy::new(|| re(r"\bevery\s+week\b|\bweekly\b|\bper\s+week\b"));
static MONTHLY_RE: Lazy<Regex> = Lazy::new(|| re(r"\bevery\s+month\b|\bmonthly\b"));
static YEARLY_RE: Lazy<Regex> = Lazy::new(|| re(r"\bevery\s+year\b|\byearly\b|\bper\s+year\b"));
static ONCE_PER_YEAR_RE: Lazy<Regex> = Lazy::new(|| re(r"\bonce\s+per\s+year\b"));

fn re(pattern: &str) -> Regex {
    Regex::new(&format!("(?i){pattern}")).expect("valid pattern")
}

/// Hour-disambiguation context for bare times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeContext {
    /// Part of an explicit range: keep 24h literals.
    Range,
    /// Attached to a weekday ("tues at 4:30"): 1..=7 reads as PM.
    WeekdayTime,
}

/// Parse a single instruction into a structured capture.
///
/// Shapes beyond the recurrence grammar are ordered first so that
/// "next tue" is never mistaken for a weekly series:
/// - "sometime next week" → deferred task with `start_after`
/// - "next tue 2:30pm" → one-off calendar event
///
/// Everything else follows the recurrence grammar (daily/weekly/monthly/
/// yearly frequencies, weekday lists, "N times per week", time ranges
/// that may span midnight, time-of-day words for task series).
pub fn parse_capture_instruction(
    text: &str,
    now: DateTime<Utc>,
) -> Result<ParsedCapture, ParseError> {
    let raw = text.trim();
    if raw.is_empty() {
        return Err(ParseError::MissingInstruction);
    }

    let ai_excluded = raw.starts_with('.');
    let normalized = raw.trim_start_matches('.').trim().to_string();
    // Title derivation stays mechanical: the normalized instruction.
    let title = normalized.clone();

    let has_recurrence_marker = EVERY_N_RE.is_match(&normalized)
        || DAILY_RE.is_match(&normalized)
        || WEEKLY_RE.is_match(&normalized)
        || MONTHLY_RE.is_match(&normalized)
        || YEARLY_RE.is_match(&normalized)
        || ONCE_PER_YEAR_RE.is_match(&normalized)
        || COUNT_PER_WEEK_RE.is_match(&normalized);

    if !has_recurrence_marker {
        if NEXT_WEEK_RE.is_match(&normalized) {
            let start_after = next_monday(now.date_naive());
            return Ok(ParsedCapture {
                title,
                ai_excluded,
                action: CaptureAction::DeferredTask { start_after },
            });
        }
        if let Some(m) = NEXT_WEEKDAY_RE.captures(&normalized) {
            let weekday = weekday_from_alias(&m[1]).ok_or(ParseError::InvalidTime)?;
            // A one-off needs a concrete time; without one it degrades to
            // a deferred task pinned at that weekday.
            let after_kw = &normalized[m.get(0).expect("match").end()..];
            match find_time(after_kw, TimeContext::WeekdayTime)? {
                Some(time) => {
                    return Ok(ParsedCapture {
                        title,
                        ai_excluded,
                        action: CaptureAction::OneOffEvent { weekday, time },
                    });
                }
                None => {
                    let start_after = next_weekday_date(now.date_naive(), weekday);
                    return Ok(ParsedCapture {
                        title,
                        ai_excluded,
                        action: CaptureAction::DeferredTask { start_after },
                    });
                }
            }
        }
    }

    // Recurrence grammar.
    let weekdays = extract_weekdays(&normalized);
    let time_range = extract_time_range(&normalized);
    let duration_min = extract_duration_minutes(&normalized);

    // "tues at 4:30" / "tues and thurs 2:30pm".
    let mut weekday_time: Option<NaiveTime> = None;
    if !weekdays.is_empty() {
        if let Some(m) = AT_TIME_RE.captures(&normalized) {
            weekday_time = parse_time_token(&m[1], TimeContext::WeekdayTime).ok();
        }
        if weekday_time.is_none() && time_range.is_none() {
            if let Some(last) = TIME_RE.find_iter(&normalized).last() {
                weekday_time = parse_time_token(last.as_str(), TimeContext::WeekdayTime).ok();
            }
        }
    }

    let is_time_block = time_range.is_some() || (!weekdays.is_empty() && weekday_time.is_some());

    // Frequency / interval.
    let mut freq: Option<RecurFrequency> = None;
    let mut interval: u32 = 1;
    if let Some(m) = EVERY_N_RE.captures(&normalized) {
        interval = m[1].parse().unwrap_or(1);
        let unit = m[2].to_lowercase();
        freq = Some(if unit.starts_with("day") {
            RecurFrequency::Daily
        } else if unit.starts_with("week") {
            RecurFrequency::Weekly
        } else if unit.starts_with("month") {
            RecurFrequency::Monthly
        } else {
            RecurFrequency::Yearly
        });
    }

    if freq.is_none() {
        freq = if DAILY_RE.is_match(&normalized) {
            Some(RecurFrequency::Daily)
        } else if WEEKLY_RE.is_match(&normalized) {
            Some(RecurFrequency::Weekly)
        } else if MONTHLY_RE.is_match(&normalized) {
            Some(RecurFrequency::Monthly)
        } else if YEARLY_RE.is_match(&normalized) || ONCE_PER_YEAR_RE.is_match(&normalized) {
            Some(RecurFrequency::Yearly)
        } else {
            None
        };
    }

    // Default: a weekday implies weekly; bare instructions read as daily.
    let mut freq = freq.unwrap_or(if weekdays.is_empty() {
        RecurFrequency::Daily
    } else {
        RecurFrequency::Weekly
    });

    // "3 times per week".
    let mut count_per_period: Option<u32> = None;
    if let Some(m) = COUNT_PER_WEEK_RE.captures(&normalized) {
        count_per_period = m[1].parse().ok();
        freq = RecurFrequency::Weekly;
    }

    // Time-of-day windows apply to task series only.
    let tod_window = if is_time_block {
        None
    } else {
        detect_time_of_day_window(&normalized)
    };

    let by_weekday = (freq == RecurFrequency::Weekly
        && !weekdays.is_empty()
        && count_per_period.is_none())
    .then(|| weekdays.clone());

    let mut preset = RecurrencePreset {
        frequency: freq,
        interval,
        by_weekday,
        count_per_period,
        time_start: is_time_block
            .then(|| time_range.map(|(start, _)| start).or(weekday_time))
            .flatten(),
        time_end: is_time_block
            .then(|| time_range.map(|(_, end)| end))
            .flatten(),
        time_of_day_window: tod_window,
        start_date: Some(now.date_naive()),
        until_date: None,
    };

    if !is_time_block {
        return Ok(ParsedCapture {
            title,
            ai_excluded,
            action: CaptureAction::TaskSeries { preset },
        });
    }

    // Time blocks need enough structure to land on a calendar.
    let Some(start) = preset.time_start else {
        return Err(ParseError::MissingTimeStart);
    };
    if preset.time_end.is_none() {
        let end = match duration_min {
            Some(minutes) => add_minutes_wrapping(start, i64::from(minutes)),
            None => NaiveTime::from_hms_opt((start.hour() + 1) % 24, start.minute(), 0)
                .expect("valid time"),
        };
        preset.time_end = Some(end);
    }
    if freq == RecurFrequency::Weekly && preset.by_weekday.as_deref().unwrap_or(&[]).is_empty() {
        if weekdays.is_empty() {
            return Err(ParseError::MissingByWeekday);
        }
        preset.by_weekday = Some(weekdays);
    }

    Ok(ParsedCapture {
        title,
        ai_excluded,
        action: CaptureAction::TimeBlock { preset },
    })
}

/// All mentioned weekdays, deduped in mention order of the alias table.
fn extract_weekdays(text: &str) -> Vec<Weekday> {
    let mut out = Vec::new();
    for (pattern, day) in WEEKDAY_ALIASES.iter() {
        if pattern.is_match(text) && !out.contains(day) {
            out.push(*day);
        }
    }
    out
}

fn weekday_from_alias(alias: &str) -> Option<Weekday> {
    let lower = alias.to_lowercase();
    WEEKDAY_ALIASES
        .iter()
        .find(|(pattern, _)| pattern.is_match(&lower))
        .map(|(_, day)| *day)
}

fn parse_time_token(token: &str, context: TimeContext) -> Result<NaiveTime, ParseError> {
    let caps = TIME_RE
        .captures(token.trim())
        .ok_or(ParseError::InvalidTime)?;
    let mut hour: u32 = caps["h"].parse().map_err(|_| ParseError::InvalidTime)?;
    let minute: u32 = caps
        .name("m")
        .map(|m| m.as_str().parse())
        .transpose()
        .map_err(|_| ParseError::InvalidTime)?
        .unwrap_or(0);
    let ampm = caps
        .name("ampm")
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default();

    if hour > 23 || minute > 59 {
        return Err(ParseError::InvalidTime);
    }

    if !ampm.is_empty() {
        if hour == 12 {
            hour = 0;
        }
        if ampm == "pm" {
            hour += 12;
        }
    } else if context == TimeContext::WeekdayTime && (1..=7).contains(&hour) {
        // "kids practice tues 4:30" means 16:30, not 04:30.
        hour += 12;
    }

    if hour > 23 {
        return Err(ParseError::InvalidTime);
    }
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or(ParseError::InvalidTime)
}

/// First time-like token in `text`, or `None`; hard errors only for
/// out-of-range literals next to an am/pm marker.
fn find_time(text: &str, context: TimeContext) -> Result<Option<NaiveTime>, ParseError> {
    match TIME_RE.find(text) {
        Some(m) => match parse_time_token(m.as_str(), context) {
            Ok(time) => Ok(Some(time)),
            Err(ParseError::InvalidTime) => Err(ParseError::InvalidTime),
            Err(_) => Ok(None),
        },
        None => Ok(None),
    }
}

/// "11pm to 7am", "11pm-7am", en-dash, em-dash. May span midnight.
fn extract_time_range(text: &str) -> Option<(NaiveTime, NaiveTime)> {
    let caps = TIME_RANGE_RE.captures(text)?;
    let start = parse_time_token(&caps[1], TimeContext::Range).ok()?;
    let end = parse_time_token(&caps[2], TimeContext::Range).ok()?;
    Some((start, end))
}

/// Explicit duration like "for 90 min" or "for 1.5 hours".
fn extract_duration_minutes(text: &str) -> Option<u32> {
    if let Some(m) = DURATION_MIN_RE.captures(text) {
        let minutes: f64 = m[1].parse().ok()?;
        return Some((minutes.round() as u32).max(1));
    }
    if let Some(m) = DURATION_HOUR_RE.captures(text) {
        let hours: f64 = m[1].parse().ok()?;
        return Some(((hours * 60.0).round() as u32).max(1));
    }
    None
}

fn detect_time_of_day_window(text: &str) -> Option<TimeOfDayWindow> {
    let t = text.to_lowercase();
    if t.contains("wake up") || t.contains("wakeup") || t.contains("wake-up") {
        return Some(TimeOfDayWindow::WakeUp);
    }
    if t.contains("morning") {
        return Some(TimeOfDayWindow::Morning);
    }
    if t.contains("afternoon") {
        return Some(TimeOfDayWindow::Afternoon);
    }
    if t.contains("evening") {
        return Some(TimeOfDayWindow::Evening);
    }
    if t.contains("night") {
        return Some(TimeOfDayWindow::Night);
    }
    None
}

fn add_minutes_wrapping(time: NaiveTime, minutes: i64) -> NaiveTime {
    time.overflowing_add_signed(Duration::minutes(minutes)).0
}

/// First Monday strictly after `today`.
fn next_monday(today: NaiveDate) -> NaiveDate {
    let mut day = today.succ_opt().expect("in range");
    while day.weekday() != chrono::Weekday::Mon {
        day = day.succ_opt().expect("in range");
    }
    day
}

/// Next calendar date falling on `weekday`, today included.
fn next_weekday_date(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let target = weekday.to_chrono();
    let mut day = today;
    while day.weekday() != target {
        day = day.succ_opt().expect("in range");
    }
    day
}
