use chrono::{Duration, NaiveDateTime, NaiveTime};

use crate::config::NIGHT_FLOOR_MINUTES;
use crate::types::Keyword;

// ---------------------------------------------------------------------------
// Night window
// ---------------------------------------------------------------------------

/// A daily wall-clock window, inclusive of start and exclusive of end.
/// Windows that span midnight (23:00–07:00) are handled by the wrap branch.
#[derive(Debug, Clone, Copy)]
pub struct NightWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl NightWindow {
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start < self.end {
            self.start <= t && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NightPolicy {
    pub enabled: bool,
    pub window: NightWindow,
}

impl NightPolicy {
    /// Whether night throttling applies to this keyword right now.
    /// A keyword's own night_mode flag takes precedence over the global one.
    pub fn applies(&self, keyword: &Keyword, now: NaiveTime) -> bool {
        keyword.night_mode.unwrap_or(self.enabled) && self.window.contains(now)
    }
}

// ---------------------------------------------------------------------------
// Due computation
// ---------------------------------------------------------------------------

/// Effective polling interval at the given instant. During the night window
/// the interval is floored to one hour; it is never shortened.
pub fn effective_interval(keyword: &Keyword, policy: &NightPolicy, now: NaiveDateTime) -> Duration {
    let interval = Duration::minutes(i64::from(keyword.interval_minutes));
    if policy.applies(keyword, now.time()) {
        interval.max(Duration::minutes(i64::from(NIGHT_FLOOR_MINUTES)))
    } else {
        interval
    }
}

/// Pure due check. The caller supplies `now` and the keyword's last completed
/// run; a keyword that never ran is always due. Interval edits take effect
/// here on the next evaluation; last_run is never recomputed.
pub fn is_due(
    keyword: &Keyword,
    policy: &NightPolicy,
    now: NaiveDateTime,
    last_run: Option<NaiveDateTime>,
) -> bool {
    let Some(last) = last_run else {
        return true;
    };
    now - last >= effective_interval(keyword, policy, now)
}

/// Earliest instant the keyword becomes due again, for display. None when it
/// is due immediately (never ran). Estimated with the window state at `now`;
/// crossing a window boundary before then shifts the real instant.
pub fn next_due_at(
    keyword: &Keyword,
    policy: &NightPolicy,
    now: NaiveDateTime,
    last_run: Option<NaiveDateTime>,
) -> Option<NaiveDateTime> {
    last_run.map(|last| last + effective_interval(keyword, policy, now))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyword(interval_minutes: u32) -> Keyword {
        Keyword {
            id: "bike".to_string(),
            term: "bike".to_string(),
            interval_minutes,
            min_price: None,
            max_price: None,
            result_limit: 5,
            night_mode: None,
        }
    }

    fn night(enabled: bool) -> NightPolicy {
        NightPolicy {
            enabled,
            window: NightWindow {
                start: NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
                end: NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            },
        }
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2024, 6, 10)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn midnight_spanning_window_membership() {
        let w = night(true).window;
        assert!(w.contains(NaiveTime::from_hms_opt(23, 30, 0).unwrap()));
        assert!(w.contains(NaiveTime::from_hms_opt(2, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(22, 59, 0).unwrap()));
    }

    #[test]
    fn window_start_inclusive_end_exclusive() {
        let w = night(true).window;
        assert!(w.contains(NaiveTime::from_hms_opt(23, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(7, 0, 0).unwrap()));
        assert!(w.contains(NaiveTime::from_hms_opt(6, 59, 59).unwrap()));
    }

    #[test]
    fn non_wrapping_window_membership() {
        let w = NightWindow {
            start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        };
        assert!(w.contains(NaiveTime::from_hms_opt(9, 0, 0).unwrap()));
        assert!(w.contains(NaiveTime::from_hms_opt(12, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(17, 0, 0).unwrap()));
        assert!(!w.contains(NaiveTime::from_hms_opt(3, 0, 0).unwrap()));
    }

    #[test]
    fn never_ran_is_always_due() {
        assert!(is_due(&keyword(30), &night(true), at(23, 30), None));
        assert!(is_due(&keyword(30), &night(false), at(12, 0), None));
    }

    #[test]
    fn due_follows_interval_outside_night_window() {
        let kw = keyword(30);
        let policy = night(true);
        assert!(!is_due(&kw, &policy, at(12, 10), Some(at(12, 0))));
        assert!(!is_due(&kw, &policy, at(12, 29), Some(at(12, 0))));
        assert!(is_due(&kw, &policy, at(12, 30), Some(at(12, 0))));
    }

    #[test]
    fn night_window_floors_interval_to_an_hour() {
        let kw = keyword(30);
        let policy = night(true);
        // 40 minutes since last run, inside the window: interval says due,
        // the hourly floor says not yet.
        assert!(!is_due(&kw, &policy, at(23, 40), Some(at(23, 0))));
        assert!(is_due(&kw, &policy, at(0, 0) + Duration::days(1), Some(at(23, 0))));
    }

    #[test]
    fn night_floor_never_shortens_long_intervals() {
        let kw = keyword(90);
        let policy = night(true);
        assert!(!is_due(&kw, &policy, at(0, 30) + Duration::days(1), Some(at(23, 30))));
        assert!(is_due(&kw, &policy, at(1, 0) + Duration::days(1), Some(at(23, 30))));
    }

    #[test]
    fn night_mode_disabled_globally_uses_plain_interval() {
        let kw = keyword(30);
        assert!(is_due(&kw, &night(false), at(23, 30), Some(at(23, 0))));
    }

    #[test]
    fn keyword_override_opts_out_of_night_throttling() {
        let mut kw = keyword(30);
        kw.night_mode = Some(false);
        assert!(is_due(&kw, &night(true), at(23, 30), Some(at(23, 0))));
    }

    #[test]
    fn keyword_override_opts_in_despite_global_off() {
        let mut kw = keyword(30);
        kw.night_mode = Some(true);
        assert!(!is_due(&kw, &night(false), at(23, 30), Some(at(23, 0))));
    }

    #[test]
    fn interval_edit_applies_on_next_evaluation() {
        let mut kw = keyword(30);
        let policy = night(false);
        let last = Some(at(12, 0));
        assert!(!is_due(&kw, &policy, at(12, 20), last));
        kw.interval_minutes = 15;
        assert!(is_due(&kw, &policy, at(12, 20), last));
    }

    #[test]
    fn at_most_one_run_per_simulated_night_hour() {
        // Walk a simulated night minute by minute; count how often a run
        // would fire with last_run advancing on each fire.
        let kw = keyword(15);
        let policy = night(true);
        let mut last: Option<NaiveDateTime> = None;
        let mut runs = 0;
        let start = at(23, 0);
        for minute in 0..(8 * 60) {
            let now = start + Duration::minutes(minute);
            if is_due(&kw, &policy, now, last) {
                runs += 1;
                last = Some(now);
            }
        }
        // 23:00–07:00 is eight window hours; the first run fires immediately.
        assert!(runs <= 9, "ran {runs} times during the night window");
    }

    #[test]
    fn next_due_reflects_effective_interval() {
        let kw = keyword(30);
        let policy = night(true);
        assert_eq!(next_due_at(&kw, &policy, at(12, 5), Some(at(12, 0))), Some(at(12, 30)));
        assert_eq!(
            next_due_at(&kw, &policy, at(23, 5), Some(at(23, 0))),
            Some(at(23, 0) + Duration::minutes(60))
        );
        assert_eq!(next_due_at(&kw, &policy, at(12, 0), None), None);
    }
}
