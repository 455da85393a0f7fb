/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 27/1/26
******************************************************************************/

//! Session time window scheduling.
//!
//! A schedule answers two questions for the session engine:
//! [`SessionSchedule::is_session_time`] (is the session allowed to be up
//! right now) and [`SessionSchedule::is_new_session`] (did a window
//! boundary fall strictly between the logical session's creation and
//! now, which forces a sequence number reset).
//!
//! Windows are daily (start/end time of day) or weekly (start day/time to
//! end day/time), evaluated in a configurable fixed UTC offset.

use chrono::{Datelike, Duration, FixedOffset, NaiveTime, Weekday};
use fixline_core::types::UtcTimestamp;

/// Weekly or daily session window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSchedule {
    start_time: Option<NaiveTime>,
    end_time: Option<NaiveTime>,
    start_day: Option<Weekday>,
    end_day: Option<Weekday>,
    /// Offset the window times are expressed in.
    utc_offset: FixedOffset,
    non_stop: bool,
}

impl SessionSchedule {
    /// A schedule with no window: always in session, never a new session.
    #[must_use]
    pub fn non_stop() -> Self {
        Self {
            start_time: None,
            end_time: None,
            start_day: None,
            end_day: None,
            utc_offset: FixedOffset::east_opt(0).expect("zero offset"),
            non_stop: true,
        }
    }

    /// A daily window from `start` to `end` (times of day; `end < start`
    /// spans midnight).
    #[must_use]
    pub fn daily(start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            start_time: Some(start),
            end_time: Some(end),
            start_day: None,
            end_day: None,
            utc_offset: FixedOffset::east_opt(0).expect("zero offset"),
            non_stop: false,
        }
    }

    /// A weekly window from `start_day`/`start` to `end_day`/`end`.
    #[must_use]
    pub fn weekly(start_day: Weekday, start: NaiveTime, end_day: Weekday, end: NaiveTime) -> Self {
        Self {
            start_time: Some(start),
            end_time: Some(end),
            start_day: Some(start_day),
            end_day: Some(end_day),
            utc_offset: FixedOffset::east_opt(0).expect("zero offset"),
            non_stop: false,
        }
    }

    /// Sets the UTC offset the window times are expressed in.
    #[must_use]
    pub fn with_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }

    /// Returns true if `now` falls inside the scheduled window.
    #[must_use]
    pub fn is_session_time(&self, now: UtcTimestamp) -> bool {
        match self.latest_start(now) {
            None => true,
            Some(start) => {
                let end = self.window_end(start);
                let local = now.datetime().with_timezone(&self.utc_offset);
                local >= start && local <= end
            }
        }
    }

    /// Returns true if a window start boundary falls strictly between
    /// `creation` and `now`.
    #[must_use]
    pub fn is_new_session(&self, creation: UtcTimestamp, now: UtcTimestamp) -> bool {
        match self.latest_start(now) {
            None => false,
            Some(start) => {
                let creation_local = creation.datetime().with_timezone(&self.utc_offset);
                creation_local < start
            }
        }
    }

    /// The most recent window start at or before `now`, in local offset
    /// time. `None` when the schedule has no window.
    fn latest_start(
        &self,
        now: UtcTimestamp,
    ) -> Option<chrono::DateTime<FixedOffset>> {
        if self.non_stop {
            return None;
        }
        let start_time = self.start_time?;
        let local = now.datetime().with_timezone(&self.utc_offset);

        match self.start_day {
            None => {
                let today = local.date_naive().and_time(start_time);
                let start = if local.time() >= start_time {
                    today
                } else {
                    today - Duration::days(1)
                };
                start.and_local_timezone(self.utc_offset).single()
            }
            Some(start_day) => {
                // walk back to the most recent occurrence of start_day@start_time
                let mut date = local.date_naive();
                for _ in 0..8 {
                    if date.weekday() == start_day {
                        let candidate = date.and_time(start_time);
                        if candidate <= local.naive_local() {
                            return candidate.and_local_timezone(self.utc_offset).single();
                        }
                    }
                    date -= Duration::days(1);
                }
                None
            }
        }
    }

    /// The end of the window opened at `start`.
    fn window_end(
        &self,
        start: chrono::DateTime<FixedOffset>,
    ) -> chrono::DateTime<FixedOffset> {
        let end_time = self.end_time.unwrap_or(NaiveTime::MIN);
        let mut end = match (self.start_day, self.end_day) {
            (Some(start_day), Some(end_day)) => {
                let span = (end_day.num_days_from_monday() + 7
                    - start_day.num_days_from_monday())
                    % 7;
                start.date_naive().and_time(end_time) + Duration::days(i64::from(span))
            }
            _ => start.date_naive().and_time(end_time),
        };
        if end <= start.naive_local() {
            end += match self.start_day {
                Some(_) => Duration::days(7),
                None => Duration::days(1),
            };
        }
        end.and_local_timezone(self.utc_offset)
            .single()
            .unwrap_or(start)
    }
}

impl Default for SessionSchedule {
    fn default() -> Self {
        Self::non_stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> UtcTimestamp {
        UtcTimestamp::from_ymd_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_non_stop() {
        let schedule = SessionSchedule::non_stop();
        let now = at(2026, 1, 27, 3, 0);
        assert!(schedule.is_session_time(now));
        assert!(!schedule.is_new_session(at(2020, 1, 1, 0, 0), now));
    }

    #[test]
    fn test_daily_window() {
        let schedule = SessionSchedule::daily(t(8, 0), t(17, 0));
        assert!(schedule.is_session_time(at(2026, 1, 27, 8, 0)));
        assert!(schedule.is_session_time(at(2026, 1, 27, 12, 0)));
        assert!(schedule.is_session_time(at(2026, 1, 27, 17, 0)));
        assert!(!schedule.is_session_time(at(2026, 1, 27, 7, 59)));
        assert!(!schedule.is_session_time(at(2026, 1, 27, 17, 1)));
    }

    #[test]
    fn test_daily_window_spanning_midnight() {
        let schedule = SessionSchedule::daily(t(22, 0), t(6, 0));
        assert!(schedule.is_session_time(at(2026, 1, 27, 23, 0)));
        assert!(schedule.is_session_time(at(2026, 1, 28, 5, 0)));
        assert!(!schedule.is_session_time(at(2026, 1, 28, 12, 0)));
    }

    #[test]
    fn test_daily_new_session_across_boundary() {
        let schedule = SessionSchedule::daily(t(8, 0), t(17, 0));
        // created during Monday's window, checked during Tuesday's
        let creation = at(2026, 1, 26, 9, 0);
        assert!(schedule.is_new_session(creation, at(2026, 1, 27, 9, 0)));
        // same window: no boundary crossed
        assert!(!schedule.is_new_session(at(2026, 1, 27, 8, 30), at(2026, 1, 27, 9, 0)));
    }

    #[test]
    fn test_weekly_window() {
        // Monday 08:00 through Friday 17:00
        let schedule = SessionSchedule::weekly(Weekday::Mon, t(8, 0), Weekday::Fri, t(17, 0));
        // 2026-01-26 is a Monday
        assert!(schedule.is_session_time(at(2026, 1, 26, 8, 0)));
        assert!(schedule.is_session_time(at(2026, 1, 28, 3, 0)));
        assert!(schedule.is_session_time(at(2026, 1, 30, 17, 0)));
        assert!(!schedule.is_session_time(at(2026, 1, 30, 17, 1)));
        assert!(!schedule.is_session_time(at(2026, 1, 31, 12, 0)));
        assert!(!schedule.is_session_time(at(2026, 1, 26, 7, 0)));
    }

    #[test]
    fn test_weekly_new_session() {
        let schedule = SessionSchedule::weekly(Weekday::Mon, t(8, 0), Weekday::Fri, t(17, 0));
        // created during the previous week's window
        let creation = at(2026, 1, 22, 12, 0);
        assert!(schedule.is_new_session(creation, at(2026, 1, 26, 9, 0)));
        // created after this week's start
        assert!(!schedule.is_new_session(at(2026, 1, 26, 8, 30), at(2026, 1, 28, 9, 0)));
    }

    #[test]
    fn test_utc_offset_shifts_window() {
        // 08:00-17:00 at UTC+5 is 03:00-12:00 UTC
        let offset = FixedOffset::east_opt(5 * 3600).unwrap();
        let schedule = SessionSchedule::daily(t(8, 0), t(17, 0)).with_utc_offset(offset);
        assert!(schedule.is_session_time(at(2026, 1, 27, 3, 0)));
        assert!(schedule.is_session_time(at(2026, 1, 27, 11, 59)));
        assert!(!schedule.is_session_time(at(2026, 1, 27, 13, 0)));
    }
}
