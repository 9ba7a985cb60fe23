//! Agenda grouping: tasks bucketed by due date under a header label.

use std::collections::BTreeMap;

use chrono::{Duration, NaiveDate};
use scaletrack_shared::{DUE_DATE_FORMAT, Task};

use crate::classify::{format_date, parse_due_date};

#[derive(Debug, Clone, PartialEq)]
pub struct TaskGroup {
    /// ISO date of the group, or the raw column text when it did not parse.
    pub key: String,
    pub date: Option<NaiveDate>,
    pub label: String,
    pub tasks: Vec<Task>,
}

/// Header for a group dated `date`, as seen on `today`.
#[must_use]
pub fn group_label(date: NaiveDate, today: NaiveDate) -> String {
    if date == today {
        "Today".to_string()
    } else if date == today + Duration::days(1) {
        "Tomorrow".to_string()
    } else if date < today {
        format!("Overdue - {}", format_date(date))
    } else {
        format_date(date)
    }
}

/// Buckets `tasks` by due date. Groups come back in ascending date order
/// with unreadable dates last; each group keeps the input order.
#[must_use]
pub fn group_by_due_date(tasks: &[Task], today: NaiveDate) -> Vec<TaskGroup> {
    let mut dated: BTreeMap<NaiveDate, Vec<Task>> = BTreeMap::new();
    let mut undated: BTreeMap<String, Vec<Task>> = BTreeMap::new();

    for task in tasks {
        match parse_due_date(&task.due_date) {
            Some(date) => dated.entry(date).or_default().push(task.clone()),
            None => undated
                .entry(task.due_date.clone())
                .or_default()
                .push(task.clone()),
        }
    }

    let mut groups = Vec::with_capacity(dated.len() + undated.len());
    groups.extend(dated.into_iter().map(|(date, tasks)| TaskGroup {
        key: date.format(DUE_DATE_FORMAT).to_string(),
        date: Some(date),
        label: group_label(date, today),
        tasks,
    }));
    groups.extend(undated.into_iter().map(|(raw, tasks)| TaskGroup {
        label: raw.clone(),
        key: raw,
        date: None,
        tasks,
    }));
    groups
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate, Utc};
    use scaletrack_shared::{OwnerId, Task, TaskId, TaskPriority, TaskStatus};
    use uuid::Uuid;

    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 10).expect("valid date")
    }

    fn task(title: &str, due_date: &str) -> Task {
        let now = Utc::now();
        Task {
            id: TaskId::new(),
            title: title.to_string(),
            description: None,
            due_date: due_date.to_string(),
            due_time: None,
            status: TaskStatus::Pending,
            priority: TaskPriority::Low,
            related: None,
            owner: OwnerId(Uuid::nil()),
            created_at: now,
            updated_at: now,
        }
    }

    fn iso(date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    #[test]
    fn labels_yesterday_today_tomorrow_next_week() {
        let today = today();
        let tasks = vec![
            task("next week", &iso(today + Duration::days(7))),
            task("tomorrow", &iso(today + Duration::days(1))),
            task("today", &iso(today)),
            task("yesterday", &iso(today - Duration::days(1))),
        ];

        let groups = group_by_due_date(&tasks, today);
        let labels: Vec<&str> = groups.iter().map(|g| g.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Overdue - Mar 9, 2024", "Today", "Tomorrow", "Mar 17, 2024"]
        );
        let keys: Vec<&str> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["2024-03-09", "2024-03-10", "2024-03-11", "2024-03-17"]);
    }

    #[test]
    fn groups_keep_source_order_within_a_day() {
        let tasks = vec![
            task("mist", "2024-03-12"),
            task("feed", "2024-03-11"),
            task("weigh", "2024-03-12"),
            task("clean", "2024-03-12"),
        ];
        let groups = group_by_due_date(&tasks, today());
        assert_eq!(groups.len(), 2);
        let titles: Vec<&str> = groups[1].tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["mist", "weigh", "clean"]);
    }

    #[test]
    fn unreadable_dates_group_last_under_raw_label() {
        let tasks = vec![task("odd", "someday"), task("feed", "2024-03-11")];
        let groups = group_by_due_date(&tasks, today());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[1].label, "someday");
        assert_eq!(groups[1].date, None);
    }

    #[test]
    fn grouping_is_deterministic_for_fixed_today() {
        let tasks = vec![task("a", "2024-03-01"), task("b", "2024-03-20")];
        assert_eq!(group_by_due_date(&tasks, today()), group_by_due_date(&tasks, today()));
    }

    #[test]
    fn empty_input_yields_no_groups() {
        assert!(group_by_due_date(&[], today()).is_empty());
    }
}
