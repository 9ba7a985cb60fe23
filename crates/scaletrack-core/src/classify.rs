//! Derived task state: overdue detection, due buckets, badges and the
//! upcoming sort order.

use std::cmp::Ordering;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use scaletrack_shared::{DUE_DATE_FORMAT, Task, TaskPriority, TaskStatus};

const DISPLAY_DATE_FORMAT: &str = "%b %-d, %Y";

/// Where a task sits relative to today.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueState {
    Completed,
    Overdue,
    DueToday,
    DueTomorrow,
    Later,
    /// The stored due date could not be read.
    Unknown,
}

/// Reads a `due_date` column. Accepts plain ISO dates and full RFC 3339
/// timestamps (date part only).
#[must_use]
pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, DUE_DATE_FORMAT)
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

#[must_use]
pub fn parse_due_time(raw: &str) -> Option<NaiveTime> {
    let trimmed = raw.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .ok()
}

/// Pending and due strictly before `today`. The time of day is not
/// considered, and an unreadable date is never overdue.
#[must_use]
pub fn is_overdue(task: &Task, today: NaiveDate) -> bool {
    task.status == TaskStatus::Pending
        && parse_due_date(&task.due_date).is_some_and(|due| due < today)
}

#[must_use]
pub fn due_state(task: &Task, today: NaiveDate) -> DueState {
    if task.status == TaskStatus::Completed {
        return DueState::Completed;
    }
    let Some(due) = parse_due_date(&task.due_date) else {
        return DueState::Unknown;
    };
    if is_overdue(task, today) {
        DueState::Overdue
    } else if due == today {
        DueState::DueToday
    } else if due == today + Duration::days(1) {
        DueState::DueTomorrow
    } else {
        DueState::Later
    }
}

/// Status as a view should show it: pending tasks past their date read as
/// overdue.
#[must_use]
pub fn effective_status(task: &Task, today: NaiveDate) -> TaskStatus {
    if is_overdue(task, today) {
        TaskStatus::Overdue
    } else {
        task.status
    }
}

/// Badge weight. Display only; never used for ordering.
#[must_use]
pub fn priority_rank(priority: TaskPriority) -> u8 {
    match priority {
        TaskPriority::High => 3,
        TaskPriority::Medium => 2,
        TaskPriority::Low => 1,
    }
}

#[must_use]
pub fn priority_badge(priority: TaskPriority) -> &'static str {
    match priority {
        TaskPriority::High => "high",
        TaskPriority::Medium => "medium",
        TaskPriority::Low => "low",
    }
}

#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DISPLAY_DATE_FORMAT).to_string()
}

/// Human form of a `due_date` column, or the raw text when it does not
/// parse.
#[must_use]
pub fn format_due_date(raw: &str) -> String {
    parse_due_date(raw)
        .map(format_date)
        .unwrap_or_else(|| raw.to_string())
}

/// Due date ascending, then due time ascending with untimed tasks last on
/// their day. Unreadable dates sort after every readable one, by raw text.
#[must_use]
pub fn upcoming_order(a: &Task, b: &Task) -> Ordering {
    compare_readable(
        &a.due_date,
        &b.due_date,
        parse_due_date(&a.due_date),
        parse_due_date(&b.due_date),
    )
    .then_with(|| compare_due_times(a.due_time.as_deref(), b.due_time.as_deref()))
}

pub fn sort_upcoming(tasks: &mut [Task]) {
    tasks.sort_by(upcoming_order);
}

fn compare_due_times(a: Option<&str>, b: Option<&str>) -> Ordering {
    match (a, b) {
        (Some(left), Some(right)) => {
            compare_readable(left, right, parse_due_time(left), parse_due_time(right))
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Parsed values first in their own order, then unparsed ones by raw text.
/// Never mixes the two comparisons, so the result is a total order.
fn compare_readable<T: Ord>(
    left_raw: &str,
    right_raw: &str,
    left: Option<T>,
    right: Option<T>,
) -> Ordering {
    match (left, right) {
        (Some(l), Some(r)) => l.cmp(&r),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => left_raw.cmp(right_raw),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use scaletrack_shared::{OwnerId, Task, TaskId, TaskPriority, TaskStatus};
    use uuid::Uuid;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn task(due_date: &str, due_time: Option<&str>) -> Task {
        let now = Utc::now();
        Task {
            id: TaskId::new(),
            title: format!("task due {due_date}"),
            description: None,
            due_date: due_date.to_string(),
            due_time: due_time.map(str::to_string),
            status: TaskStatus::Pending,
            priority: TaskPriority::Medium,
            related: None,
            owner: OwnerId(Uuid::nil()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn pending_task_before_today_is_overdue() {
        let today = date(2024, 3, 10);
        for due in ["2024-03-09", "2024-01-01", "2023-12-31"] {
            assert!(is_overdue(&task(due, None), today), "{due} should be overdue");
        }
        assert!(!is_overdue(&task("2024-03-10", Some("00:01")), today));
        assert!(!is_overdue(&task("2024-03-11", None), today));
    }

    #[test]
    fn completed_task_is_never_overdue() {
        let today = date(2024, 3, 10);
        for due in ["2020-01-01", "2024-03-09", "2024-03-10", "2030-01-01"] {
            let mut done = task(due, None);
            done.status = TaskStatus::Completed;
            assert!(!is_overdue(&done, today));
            assert_eq!(due_state(&done, today), DueState::Completed);
        }
    }

    #[test]
    fn unreadable_due_date_fails_open() {
        let today = date(2024, 3, 10);
        let broken = task("next-ish", None);
        assert!(!is_overdue(&broken, today));
        assert_eq!(due_state(&broken, today), DueState::Unknown);
        assert_eq!(effective_status(&broken, today), TaskStatus::Pending);
        assert_eq!(format_due_date(&broken.due_date), "next-ish");
    }

    #[test]
    fn due_state_buckets_relative_to_today() {
        let today = date(2024, 3, 10);
        assert_eq!(due_state(&task("2024-03-09", None), today), DueState::Overdue);
        assert_eq!(due_state(&task("2024-03-10", None), today), DueState::DueToday);
        assert_eq!(due_state(&task("2024-03-11", None), today), DueState::DueTomorrow);
        assert_eq!(due_state(&task("2024-03-17", None), today), DueState::Later);
        assert_eq!(
            effective_status(&task("2024-03-09", None), today),
            TaskStatus::Overdue
        );
    }

    #[test]
    fn timestamp_due_dates_use_their_date_part() {
        assert_eq!(parse_due_date("2024-03-01T18:30:00Z"), Some(date(2024, 3, 1)));
        assert_eq!(format_due_date("2024-03-01"), "Mar 1, 2024");
    }

    #[test]
    fn priority_rank_orders_high_over_low() {
        assert!(priority_rank(TaskPriority::High) > priority_rank(TaskPriority::Medium));
        assert!(priority_rank(TaskPriority::Medium) > priority_rank(TaskPriority::Low));
    }

    #[test]
    fn timed_tasks_sort_before_untimed_on_the_same_day() {
        let mut tasks = vec![
            task("2024-03-02", None),
            task("2024-03-01", Some("09:00")),
            task("2024-03-01", None),
        ];
        sort_upcoming(&mut tasks);
        let keys: Vec<(String, Option<String>)> = tasks
            .into_iter()
            .map(|t| (t.due_date, t.due_time))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2024-03-01".to_string(), Some("09:00".to_string())),
                ("2024-03-01".to_string(), None),
                ("2024-03-02".to_string(), None),
            ]
        );
    }

    #[test]
    fn due_times_compare_across_formats() {
        let mut tasks = vec![
            task("2024-03-01", Some("14:00:00")),
            task("2024-03-01", Some("09:30")),
        ];
        sort_upcoming(&mut tasks);
        assert_eq!(tasks[0].due_time.as_deref(), Some("09:30"));
    }

    #[test]
    fn unreadable_dates_sort_after_readable_ones() {
        let a = task("2024-03-09", None);
        let b = task("2024-03-09T23:00:00Z", None);
        let c = task("2024-03-09A", None);
        assert_eq!(upcoming_order(&a, &b), Ordering::Equal);
        assert_eq!(upcoming_order(&a, &c), Ordering::Less);
        assert_eq!(upcoming_order(&b, &c), Ordering::Less);
    }

    #[test]
    fn mixed_due_shapes_sort_without_panicking() {
        let dates = ["2024-03-09", "2024-03-09T23:00:00Z", "2024-03-09A", "2024-03-08", "soon"];
        let times = [None, Some("09:00"), Some("9am-ish"), Some("08:15:00")];
        let mut tasks: Vec<Task> = (0..200)
            .map(|n| task(dates[n % dates.len()], times[(n / 3) % times.len()]))
            .collect();
        sort_upcoming(&mut tasks);

        for pair in tasks.windows(2) {
            assert_ne!(upcoming_order(&pair[0], &pair[1]), Ordering::Greater);
        }
        let first_unreadable = tasks
            .iter()
            .position(|t| parse_due_date(&t.due_date).is_none())
            .expect("unreadable dates present");
        assert!(
            tasks[first_unreadable..]
                .iter()
                .all(|t| parse_due_date(&t.due_date).is_none())
        );
        assert_eq!(tasks[0].due_date, "2024-03-08");
    }
}
