//! Recurrence presets and the series/time-block entities they drive.
//!
//! Presets are the canonical internal representation for repeating
//! obligations. Users never enter RRULE strings; RRULE is export-only
//! (see [`crate::recurrence::rrule`]).

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::KernelError;
use crate::model::task::TaskCategory;

/// Recurrence frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurFrequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl RecurFrequency {
    pub fn as_code(&self) -> &'static str {
        match self {
            RecurFrequency::Daily => "daily",
            RecurFrequency::Weekly => "weekly",
            RecurFrequency::Monthly => "monthly",
            RecurFrequency::Yearly => "yearly",
        }
    }
}

/// Weekday, in ISO order Monday..Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Weekday {
    Mo,
    Tu,
    We,
    Th,
    Fr,
    Sa,
    Su,
}

impl Weekday {
    pub fn from_chrono(day: chrono::Weekday) -> Self {
        match day {
            chrono::Weekday::Mon => Weekday::Mo,
            chrono::Weekday::Tue => Weekday::Tu,
            chrono::Weekday::Wed => Weekday::We,
            chrono::Weekday::Thu => Weekday::Th,
            chrono::Weekday::Fri => Weekday::Fr,
            chrono::Weekday::Sat => Weekday::Sa,
            chrono::Weekday::Sun => Weekday::Su,
        }
    }

    pub fn to_chrono(self) -> chrono::Weekday {
        match self {
            Weekday::Mo => chrono::Weekday::Mon,
            Weekday::Tu => chrono::Weekday::Tue,
            Weekday::We => chrono::Weekday::Wed,
            Weekday::Th => chrono::Weekday::Thu,
            Weekday::Fr => chrono::Weekday::Fri,
            Weekday::Sa => chrono::Weekday::Sat,
            Weekday::Su => chrono::Weekday::Sun,
        }
    }

    /// iCalendar BYDAY code.
    pub fn rrule_code(&self) -> &'static str {
        match self {
            Weekday::Mo => "MO",
            Weekday::Tu => "TU",
            Weekday::We => "WE",
            Weekday::Th => "TH",
            Weekday::Fr => "FR",
            Weekday::Sa => "SA",
            Weekday::Su => "SU",
        }
    }
}

/// Named time-of-day windows, local to the user's calendar timezone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeOfDayWindow {
    WakeUp,
    Morning,
    Afternoon,
    Evening,
    Night,
}

/// Simple recurrence definition.
///
/// Times are interpreted in the user's calendar timezone for time blocks;
/// a `time_end` earlier than `time_start` spans midnight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrencePreset {
    pub frequency: RecurFrequency,
    /// Every N units (days/weeks/months/years); at least 1.
    pub interval: u32,
    /// For weekly recurrence: the weekdays on which it occurs,
    /// deduplicated in mention order.
    pub by_weekday: Option<Vec<Weekday>>,
    /// For patterns like "3 times per week".
    pub count_per_period: Option<u32>,
    pub time_start: Option<NaiveTime>,
    pub time_end: Option<NaiveTime>,
    /// Task-series windowing.
    pub time_of_day_window: Option<TimeOfDayWindow>,
    pub start_date: Option<NaiveDate>,
    pub until_date: Option<NaiveDate>,
}

impl RecurrencePreset {
    pub fn new(frequency: RecurFrequency) -> Self {
        Self {
            frequency,
            interval: 1,
            by_weekday: None,
            count_per_period: None,
            time_start: None,
            time_end: None,
            time_of_day_window: None,
            start_date: None,
            until_date: None,
        }
    }

    /// Dedupe weekdays preserving mention order and enforce invariants.
    pub fn normalize(mut self) -> Result<Self, KernelError> {
        if self.interval == 0 {
            return Err(KernelError::Validation("interval must be >= 1".into()));
        }
        if let (Some(start), Some(until)) = (self.start_date, self.until_date) {
            if until < start {
                return Err(KernelError::Validation(
                    "until_date must be >= start_date".into(),
                ));
            }
        }
        if let Some(days) = self.by_weekday.take() {
            let mut seen = std::collections::HashSet::new();
            let unique: Vec<Weekday> = days.into_iter().filter(|d| seen.insert(*d)).collect();
            self.by_weekday = (!unique.is_empty()).then_some(unique);
        }
        Ok(self)
    }
}

/// A repeating task template; the materializer turns it into concrete
/// open tasks, at most one at a time (habit semantics).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringTaskSeries {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title_template: String,
    pub notes_template: Option<String>,
    pub estimated_duration_min_default: u32,
    pub category_default: TaskCategory,
    pub recurrence_preset: RecurrencePreset,
    pub ai_excluded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RecurringTaskSeries {
    pub fn new(
        user_id: Uuid,
        title_template: impl Into<String>,
        preset: RecurrencePreset,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title_template: title_template.into(),
            notes_template: None,
            estimated_duration_min_default: crate::model::task::DEFAULT_DURATION_MIN,
            category_default: TaskCategory::Unknown,
            recurrence_preset: preset,
            ai_excluded: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

/// User-reserved recurring time. Treated as a hard, non-movable
/// reservation by the scheduler; its calendar event is intentionally not
/// marked managed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringTimeBlock {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub recurrence_preset: RecurrencePreset,
    pub calendar_event_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RecurringTimeBlock {
    pub fn new(
        user_id: Uuid,
        title: impl Into<String>,
        preset: RecurrencePreset,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            title: title.into(),
            recurrence_preset: preset,
            calendar_event_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_dedupes_weekdays_in_mention_order() {
        let preset = RecurrencePreset {
            by_weekday: Some(vec![Weekday::Th, Weekday::Tu, Weekday::Th, Weekday::Tu]),
            ..RecurrencePreset::new(RecurFrequency::Weekly)
        };
        let preset = preset.normalize().unwrap();
        assert_eq!(preset.by_weekday, Some(vec![Weekday::Th, Weekday::Tu]));
    }

    #[test]
    fn normalize_rejects_inverted_date_range() {
        let preset = RecurrencePreset {
            start_date: Some(NaiveDate::from_ymd_opt(2026, 5, 1).unwrap()),
            until_date: Some(NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()),
            ..RecurrencePreset::new(RecurFrequency::Daily)
        };
        assert!(preset.normalize().is_err());
    }

    #[test]
    fn weekday_codes_round_trip_through_serde() {
        let day: Weekday = serde_json::from_str("\"tu\"").unwrap();
        assert_eq!(day, Weekday::Tu);
        assert_eq!(serde_json::to_string(&day).unwrap(), "\"tu\"");
    }
}
