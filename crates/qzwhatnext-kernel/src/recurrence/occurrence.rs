//! Occurrence enumeration for recurrence presets.
//!
//! Pure day-level evaluation: does a preset occur on a given day, and
//! which day is the next occurrence inside a window. The habit policy
//! itself (at most one open occurrence) lives in the runtime
//! materializer; this module only answers calendar questions.

use chrono::{Datelike, Duration, NaiveDate, NaiveTime};
use std::collections::BTreeMap;

use crate::model::{
    FlexibilityWindow, RecurFrequency, RecurrencePreset, TimeOfDayWindow, Weekday,
};

/// Fixed local time-of-day windows. NIGHT spans midnight.
const WINDOWS: [(TimeOfDayWindow, (u32, u32), (u32, u32)); 5] = [
    (TimeOfDayWindow::WakeUp, (5, 0), (6, 30)),
    (TimeOfDayWindow::Morning, (6, 30), (11, 0)),
    (TimeOfDayWindow::Afternoon, (11, 0), (17, 0)),
    (TimeOfDayWindow::Evening, (17, 0), (21, 0)),
    (TimeOfDayWindow::Night, (21, 0), (2, 0)),
];

/// Concrete flexibility window for `day` under a named window.
pub fn flexibility_window_for_day(day: NaiveDate, window: TimeOfDayWindow) -> FlexibilityWindow {
    let (_, (sh, sm), (eh, em)) = WINDOWS
        .iter()
        .find(|(w, _, _)| *w == window)
        .copied()
        .expect("window table is total");
    let start_t = NaiveTime::from_hms_opt(sh, sm, 0).expect("valid time");
    let end_t = NaiveTime::from_hms_opt(eh, em, 0).expect("valid time");
    let start = day.and_time(start_t).and_utc();
    let mut end = day.and_time(end_t).and_utc();
    if end_t <= start_t {
        end += Duration::days(1);
    }
    FlexibilityWindow { start, end }
}

/// Whether `preset` occurs on `day`, anchored at its start date.
pub fn occurs_on_day(preset: &RecurrencePreset, day: NaiveDate) -> bool {
    if preset.start_date.is_some_and(|start| day < start) {
        return false;
    }
    if preset.until_date.is_some_and(|until| day > until) {
        return false;
    }
    let interval = i64::from(preset.interval.max(1));

    match preset.frequency {
        RecurFrequency::Daily => {
            let anchor = preset.start_date.unwrap_or(day);
            let delta = (day - anchor).num_days();
            delta >= 0 && delta % interval == 0
        }
        RecurFrequency::Weekly => {
            let anchor = preset.start_date.unwrap_or(day);
            let week_delta = (day - anchor).num_days().div_euclid(7);
            if week_delta < 0 || week_delta % interval != 0 {
                return false;
            }
            match &preset.by_weekday {
                Some(days) => days.contains(&Weekday::from_chrono(day.weekday())),
                None => true,
            }
        }
        RecurFrequency::Monthly => {
            let anchor = preset.start_date.unwrap_or(day);
            if day.day() != anchor.day() {
                return false;
            }
            let months = (i64::from(day.year()) - i64::from(anchor.year())) * 12
                + (i64::from(day.month()) - i64::from(anchor.month()));
            months >= 0 && months % interval == 0
        }
        RecurFrequency::Yearly => {
            let anchor = preset.start_date.unwrap_or(day);
            if (day.month(), day.day()) != (anchor.month(), anchor.day()) {
                return false;
            }
            let years = i64::from(day.year()) - i64::from(anchor.year());
            years >= 0 && years % interval == 0
        }
    }
}

/// Pick `n` days from a sorted week, spread by evenly-spaced indices.
///
/// Index collisions resolve by scanning forward, then backward, so the
/// choice is deterministic for every `(days, n)`.
pub fn choose_n_days_in_week(days: &[NaiveDate], n: usize) -> Vec<NaiveDate> {
    if n == 0 {
        return Vec::new();
    }
    if days.len() <= n {
        return days.to_vec();
    }
    let step = if n > 1 {
        (days.len() - 1) as f64 / (n - 1) as f64
    } else {
        0.0
    };
    let mut used = std::collections::HashSet::new();
    let mut picks = Vec::with_capacity(n);
    for i in 0..n {
        let idx = round_half_even(i as f64 * step).clamp(0, days.len() as i64 - 1) as usize;
        let mut chosen = days[idx];
        if used.contains(&chosen) {
            let mut j = idx;
            while j < days.len() && used.contains(&days[j]) {
                j += 1;
            }
            if j >= days.len() {
                j = idx;
                while used.contains(&days[j]) {
                    if j == 0 {
                        break;
                    }
                    j -= 1;
                }
            }
            chosen = days[j];
        }
        used.insert(chosen);
        picks.push(chosen);
    }
    picks.sort();
    picks.dedup();
    picks
}

fn round_half_even(x: f64) -> i64 {
    let floor = x.floor();
    let frac = x - floor;
    let floor_i = floor as i64;
    if frac > 0.5 {
        floor_i + 1
    } else if frac < 0.5 {
        floor_i
    } else if floor_i % 2 == 0 {
        floor_i
    } else {
        floor_i + 1
    }
}

/// First day in `[window_start, window_end)` on which `preset` occurs.
///
/// For weekly presets with `count_per_period`, days are partitioned by
/// ISO week and the chosen days of the first non-empty week are
/// consulted; only the first is returned (habit: one occurrence).
pub fn next_occurrence(
    preset: &RecurrencePreset,
    window_start: NaiveDate,
    window_end: NaiveDate,
) -> Option<NaiveDate> {
    if preset.frequency == RecurFrequency::Weekly {
        if let Some(count) = preset.count_per_period {
            let anchor = preset.start_date.unwrap_or(window_start);
            let interval = i64::from(preset.interval.max(1));
            let mut week_map: BTreeMap<(i32, u32), Vec<NaiveDate>> = BTreeMap::new();
            let mut day = window_start;
            while day < window_end {
                let in_bounds = !preset.start_date.is_some_and(|s| day < s)
                    && !preset.until_date.is_some_and(|u| day > u);
                if in_bounds {
                    let week_delta = (day - anchor).num_days().div_euclid(7);
                    if week_delta >= 0 && week_delta % interval == 0 {
                        let iso = day.iso_week();
                        week_map
                            .entry((iso.year(), iso.week()))
                            .or_default()
                            .push(day);
                    }
                }
                day = day.succ_opt()?;
            }
            for (_, mut days) in week_map {
                days.sort();
                let chosen = choose_n_days_in_week(&days, count as usize);
                if let Some(first) = chosen.first() {
                    return Some(*first);
                }
            }
            return None;
        }
    }

    let mut day = window_start;
    while day < window_end {
        if occurs_on_day(preset, day) {
            return Some(day);
        }
        day = day.succ_opt()?;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn preset(frequency: RecurFrequency) -> RecurrencePreset {
        RecurrencePreset::new(frequency)
    }

    #[test]
    fn daily_every_other_day() {
        let p = RecurrencePreset {
            interval: 2,
            start_date: Some(date(2026, 3, 2)),
            ..preset(RecurFrequency::Daily)
        };
        assert!(occurs_on_day(&p, date(2026, 3, 2)));
        assert!(!occurs_on_day(&p, date(2026, 3, 3)));
        assert!(occurs_on_day(&p, date(2026, 3, 4)));
        assert!(!occurs_on_day(&p, date(2026, 3, 1)));
    }

    #[test]
    fn weekly_by_weekday() {
        let p = RecurrencePreset {
            by_weekday: Some(vec![Weekday::Tu, Weekday::Th]),
            start_date: Some(date(2026, 3, 2)),
            ..preset(RecurFrequency::Weekly)
        };
        assert!(occurs_on_day(&p, date(2026, 3, 3))); // Tuesday
        assert!(!occurs_on_day(&p, date(2026, 3, 4))); // Wednesday
        assert!(occurs_on_day(&p, date(2026, 3, 5))); // Thursday
    }

    #[test]
    fn monthly_anchors_to_day_of_month() {
        let p = RecurrencePreset {
            interval: 3,
            start_date: Some(date(2026, 1, 15)),
            ..preset(RecurFrequency::Monthly)
        };
        assert!(occurs_on_day(&p, date(2026, 4, 15)));
        assert!(!occurs_on_day(&p, date(2026, 2, 15)));
        assert!(!occurs_on_day(&p, date(2026, 4, 16)));
    }

    #[test]
    fn yearly_anchors_to_month_day() {
        let p = RecurrencePreset {
            start_date: Some(date(2026, 10, 1)),
            ..preset(RecurFrequency::Yearly)
        };
        assert!(occurs_on_day(&p, date(2027, 10, 1)));
        assert!(!occurs_on_day(&p, date(2027, 10, 2)));
    }

    #[test]
    fn until_date_bounds_occurrences() {
        let p = RecurrencePreset {
            start_date: Some(date(2026, 3, 1)),
            until_date: Some(date(2026, 3, 10)),
            ..preset(RecurFrequency::Daily)
        };
        assert!(occurs_on_day(&p, date(2026, 3, 10)));
        assert!(!occurs_on_day(&p, date(2026, 3, 11)));
    }

    #[test]
    fn next_occurrence_returns_first_matching_day() {
        let p = RecurrencePreset {
            by_weekday: Some(vec![Weekday::Fr]),
            start_date: Some(date(2026, 3, 2)),
            ..preset(RecurFrequency::Weekly)
        };
        assert_eq!(
            next_occurrence(&p, date(2026, 3, 2), date(2026, 3, 9)),
            Some(date(2026, 3, 6))
        );
    }

    #[test]
    fn choose_n_days_spreads_evenly() {
        let days: Vec<NaiveDate> = (2..=8).map(|d| date(2026, 3, d)).collect();
        let picks = choose_n_days_in_week(&days, 3);
        assert_eq!(picks, vec![date(2026, 3, 2), date(2026, 3, 5), date(2026, 3, 8)]);
    }

    #[test]
    fn choose_n_days_when_fewer_candidates() {
        let days = vec![date(2026, 3, 2), date(2026, 3, 3)];
        assert_eq!(choose_n_days_in_week(&days, 3), days);
    }

    #[test]
    fn choose_n_days_is_deterministic() {
        let days: Vec<NaiveDate> = (2..=8).map(|d| date(2026, 3, d)).collect();
        assert_eq!(
            choose_n_days_in_week(&days, 3),
            choose_n_days_in_week(&days, 3)
        );
    }

    #[test]
    fn count_per_week_yields_first_chosen_day() {
        let p = RecurrencePreset {
            count_per_period: Some(3),
            start_date: Some(date(2026, 3, 2)),
            ..preset(RecurFrequency::Weekly)
        };
        // Window covering the full anchor week (Mon..Sun).
        let next = next_occurrence(&p, date(2026, 3, 2), date(2026, 3, 9));
        assert_eq!(next, Some(date(2026, 3, 2)));
    }

    #[test]
    fn night_window_spans_midnight() {
        let w = flexibility_window_for_day(date(2026, 3, 2), TimeOfDayWindow::Night);
        assert_eq!(w.start.date_naive(), date(2026, 3, 2));
        assert_eq!(w.end.date_naive(), date(2026, 3, 3));
    }

    #[test]
    fn morning_window_times() {
        let w = flexibility_window_for_day(date(2026, 3, 2), TimeOfDayWindow::Morning);
        assert_eq!(w.start.time(), NaiveTime::from_hms_opt(6, 30, 0).unwrap());
        assert_eq!(w.end.time(), NaiveTime::from_hms_opt(11, 0, 0).unwrap());
    }
}
