//! Export recurrence presets to iCalendar RRULE strings.
//!
//! Export-only: we never reparse an RRULE we produced, so calendar-side
//! edits to recurrence semantics cannot silently alter stored presets.

use crate::model::{RecurFrequency, RecurrencePreset};

/// Render `preset` as an RRULE (without the leading `RRULE:` prefix).
///
/// UNTIL is kept date-only (end of day UTC) to avoid timezone drift.
pub fn preset_to_rrule(preset: &RecurrencePreset) -> String {
    let mut parts: Vec<String> = Vec::new();

    let freq = match preset.frequency {
        RecurFrequency::Daily => "DAILY",
        RecurFrequency::Weekly => "WEEKLY",
        RecurFrequency::Monthly => "MONTHLY",
        RecurFrequency::Yearly => "YEARLY",
    };
    parts.push(format!("FREQ={freq}"));

    if preset.interval > 1 {
        parts.push(format!("INTERVAL={}", preset.interval));
    }
    if let Some(days) = &preset.by_weekday {
        if !days.is_empty() {
            let byday: Vec<&str> = days.iter().map(|d| d.rrule_code()).collect();
            parts.push(format!("BYDAY={}", byday.join(",")));
        }
    }
    if let Some(until) = preset.until_date {
        parts.push(format!("UNTIL={}T235959Z", until.format("%Y%m%d")));
    }

    parts.join(";")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Weekday;
    use chrono::NaiveDate;

    #[test]
    fn weekly_with_days() {
        let preset = RecurrencePreset {
            by_weekday: Some(vec![Weekday::Tu, Weekday::Th]),
            ..RecurrencePreset::new(RecurFrequency::Weekly)
        };
        assert_eq!(preset_to_rrule(&preset), "FREQ=WEEKLY;BYDAY=TU,TH");
    }

    #[test]
    fn interval_omitted_when_one() {
        let preset = RecurrencePreset::new(RecurFrequency::Daily);
        assert_eq!(preset_to_rrule(&preset), "FREQ=DAILY");
    }

    #[test]
    fn interval_and_until() {
        let preset = RecurrencePreset {
            interval: 3,
            until_date: NaiveDate::from_ymd_opt(2026, 12, 31),
            ..RecurrencePreset::new(RecurFrequency::Monthly)
        };
        assert_eq!(
            preset_to_rrule(&preset),
            "FREQ=MONTHLY;INTERVAL=3;UNTIL=20261231T235959Z"
        );
    }
}
