//! Overdue / upcoming / all partitions of a task list, relative to a given day.

use chrono::{Days, NaiveDate};

use crate::models::Task;

/// How far ahead, in days, a due date still counts as upcoming.
pub const UPCOMING_WINDOW_DAYS: u64 = 7;

/// Which tasks the `all` list shows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum View {
    #[default]
    Active,
    Archived,
}

impl View {
    pub fn includes(self, task: &Task) -> bool {
        match self {
            View::Active => !task.fields.archived,
            View::Archived => task.fields.archived,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buckets<'a> {
    pub overdue: Vec<&'a Task>,
    pub upcoming: Vec<&'a Task>,
    pub all: Vec<&'a Task>,
}

pub fn bucket(tasks: &[Task], today: NaiveDate, view: View) -> Buckets<'_> {
    let horizon = today
        .checked_add_days(Days::new(UPCOMING_WINDOW_DAYS))
        .unwrap_or(NaiveDate::MAX);

    let mut buckets = Buckets::default();
    for task in tasks {
        if view.includes(task) {
            buckets.all.push(task);
        }
        if task.fields.archived || task.fields.completed {
            continue;
        }
        let Some(due) = task.fields.due_date else {
            continue;
        };
        if due < today {
            buckets.overdue.push(task);
        } else if due <= horizon {
            buckets.upcoming.push(task);
        }
    }

    // sort_by_key is stable, so equal due dates keep source order
    buckets.overdue.sort_by_key(|task| task.fields.due_date);
    buckets.upcoming.sort_by_key(|task| task.fields.due_date);
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskFields;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn task(id: i64, due: Option<NaiveDate>) -> Task {
        Task {
            id,
            created_date: date(2024, 1, 1),
            fields: TaskFields {
                due_date: due,
                ..TaskFields::titled(format!("task {id}"))
            },
        }
    }

    fn ids(tasks: &[&Task]) -> Vec<i64> {
        tasks.iter().map(|t| t.id).collect()
    }

    #[test]
    fn test_overdue_and_upcoming_sorted_by_due_date() {
        let today = date(2024, 3, 10);
        let tasks = vec![
            task(1, Some(date(2024, 3, 9))),
            task(2, Some(date(2024, 3, 12))),
            task(3, Some(date(2024, 2, 1))),
            task(4, Some(date(2024, 3, 10))),
            task(5, None),
        ];

        let b = bucket(&tasks, today, View::Active);
        assert_eq!(ids(&b.overdue), vec![3, 1]);
        assert_eq!(ids(&b.upcoming), vec![4, 2]);
        assert_eq!(ids(&b.all), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_upcoming_window_is_inclusive() {
        let today = date(2024, 3, 10);
        let tasks = vec![
            task(1, Some(date(2024, 3, 17))),
            task(2, Some(date(2024, 3, 18))),
        ];

        let b = bucket(&tasks, today, View::Active);
        assert_eq!(ids(&b.upcoming), vec![1]);
        assert!(b.overdue.is_empty());
    }

    #[test]
    fn test_completed_and_archived_never_bucketed() {
        let today = date(2024, 3, 10);
        let mut done = task(1, Some(date(2024, 3, 1)));
        done.fields.completed = true;
        let mut shelved = task(2, Some(date(2024, 3, 11)));
        shelved.fields.archived = true;
        let tasks = vec![done, shelved];

        let active = bucket(&tasks, today, View::Active);
        assert!(active.overdue.is_empty());
        assert!(active.upcoming.is_empty());
        assert_eq!(ids(&active.all), vec![1]);

        let archived = bucket(&tasks, today, View::Archived);
        assert_eq!(ids(&archived.all), vec![2]);
    }

    #[test]
    fn test_equal_due_dates_keep_source_order() {
        let today = date(2024, 3, 10);
        let due = Some(date(2024, 3, 11));
        let tasks = vec![task(9, due), task(3, due), task(5, due)];

        let b = bucket(&tasks, today, View::Active);
        assert_eq!(ids(&b.upcoming), vec![9, 3, 5]);
    }

    proptest! {
        #[test]
        fn prop_bucket_membership_matches_due_offset(
            offsets in proptest::collection::vec(proptest::option::of(-30i64..30), 0..40)
        ) {
            let today = date(2024, 6, 15);
            let tasks: Vec<Task> = offsets
                .iter()
                .enumerate()
                .map(|(i, off)| task(i as i64, off.map(|o| today + chrono::Duration::days(o))))
                .collect();

            let b = bucket(&tasks, today, View::Active);
            for (i, off) in offsets.iter().enumerate() {
                let id = i as i64;
                let in_overdue = b.overdue.iter().any(|t| t.id == id);
                let in_upcoming = b.upcoming.iter().any(|t| t.id == id);
                match off {
                    Some(o) if *o < 0 => prop_assert!(in_overdue && !in_upcoming),
                    Some(o) if *o <= 7 => prop_assert!(in_upcoming && !in_overdue),
                    _ => prop_assert!(!in_overdue && !in_upcoming),
                }
            }
            prop_assert!(b.overdue.windows(2).all(|w| w[0].fields.due_date <= w[1].fields.due_date));
            prop_assert!(b.upcoming.windows(2).all(|w| w[0].fields.due_date <= w[1].fields.due_date));
        }
    }
}
