use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::models::{Task, TaskStatus};

/// The enumerated query shapes the remote repository understands. A cache
/// entry is scoped to exactly one key and is never compared cross-filter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilterKey {
    Today,
    Upcoming,
    All,
}

impl FilterKey {
    pub const ALL: [FilterKey; 3] = [FilterKey::Today, FilterKey::Upcoming, FilterKey::All];

    pub fn index(self) -> usize {
        match self {
            FilterKey::Today => 0,
            FilterKey::Upcoming => 1,
            FilterKey::All => 2,
        }
    }

    /// Due-date window for this filter, or `None` when unbounded.
    ///
    /// The "today" label on the UI suggests a one-day window, but the query
    /// has always used two days either side; kept as-is.
    pub fn window(self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            FilterKey::Today => Some((now - Duration::days(2), now + Duration::days(2))),
            FilterKey::Upcoming => Some((now - Duration::days(1), now + Duration::days(7))),
            FilterKey::All => None,
        }
    }

    pub fn excludes_done(self) -> bool {
        !matches!(self, FilterKey::All)
    }

    /// Local membership check, mirroring the server-side evaluation. Used for
    /// optimistic insertion into cached snapshots and by test doubles.
    pub fn matches(self, task: &Task, now: DateTime<Utc>) -> bool {
        if self.excludes_done() && task.status == TaskStatus::Done {
            return false;
        }
        match self.window(now) {
            Some((start, end)) => task.due_date >= start && task.due_date <= end,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Importance;
    use chrono::TimeZone;

    fn task_due(due: DateTime<Utc>, status: TaskStatus) -> Task {
        Task {
            id: "t".to_string(),
            title: String::new(),
            description: String::new(),
            status,
            due_date: due,
            completed_date: None,
            importance: Importance::Normal,
            images: vec![],
            is_repeating: false,
            repeat_every_days: None,
            assignee_id: None,
        }
    }

    #[test]
    fn today_window_is_two_days_either_side() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        let (start, end) = FilterKey::Today.window(now).unwrap();
        assert_eq!(start, now - Duration::days(2));
        assert_eq!(end, now + Duration::days(2));
    }

    #[test]
    fn upcoming_spans_yesterday_through_a_week_ahead() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        let (start, end) = FilterKey::Upcoming.window(now).unwrap();
        assert_eq!(start, now - Duration::days(1));
        assert_eq!(end, now + Duration::days(7));
    }

    #[test]
    fn done_tasks_are_excluded_except_from_all() {
        let now = Utc.with_ymd_and_hms(2024, 1, 10, 12, 0, 0).unwrap();
        let done = task_due(now, TaskStatus::Done);
        assert!(!FilterKey::Today.matches(&done, now));
        assert!(!FilterKey::Upcoming.matches(&done, now));
        assert!(FilterKey::All.matches(&done, now));
    }

    #[test]
    fn filter_key_round_trips_through_its_string_form() {
        for key in FilterKey::ALL {
            let parsed: FilterKey = key.to_string().parse().unwrap();
            assert_eq!(parsed, key);
        }
    }
}
