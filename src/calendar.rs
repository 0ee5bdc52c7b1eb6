use chrono::{Datelike, Months, NaiveDate, NaiveTime};

use crate::error::{Result, ValidationError};
use crate::models::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayCell {
    pub date: NaiveDate,
    /// Non-archived tasks starting or due on `date`, each counted once.
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Month {
    pub first: NaiveDate,
}

impl Month {
    pub fn new(year: i32, month: u32) -> Result<Self> {
        NaiveDate::from_ymd_opt(year, month, 1)
            .map(|first| Self { first })
            .ok_or_else(|| ValidationError::InvalidMonth(month).into())
    }

    pub fn containing(date: NaiveDate) -> Self {
        Self {
            first: date.with_day(1).unwrap_or(date),
        }
    }

    /// Parses `YYYY-MM`.
    pub fn parse(text: &str) -> Result<Self> {
        let unparseable = || ValidationError::Unparseable {
            field: "month",
            value: text.to_string(),
        };
        let (year, month) = text.trim().split_once('-').ok_or_else(unparseable)?;
        let year: i32 = year.parse().map_err(|_| unparseable())?;
        let month: u32 = month.parse().map_err(|_| unparseable())?;
        Self::new(year, month)
    }

    pub fn year(self) -> i32 {
        self.first.year()
    }

    pub fn month(self) -> u32 {
        self.first.month()
    }

    pub fn previous(self) -> Self {
        Self {
            first: self.first.checked_sub_months(Months::new(1)).unwrap_or(self.first),
        }
    }

    pub fn next(self) -> Self {
        Self {
            first: self.first.checked_add_months(Months::new(1)).unwrap_or(self.first),
        }
    }

    pub fn days(self) -> u32 {
        let next = self.next().first;
        if next == self.first {
            // last representable month
            return 31;
        }
        next.signed_duration_since(self.first).num_days() as u32
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date.year() == self.year() && date.month() == self.month()
    }

    pub fn label(self) -> String {
        self.first.format("%B %Y").to_string()
    }

    /// `YYYY-MM`, the inverse of [`Month::parse`].
    pub fn key(self) -> String {
        self.first.format("%Y-%m").to_string()
    }

    pub fn grid(self, tasks: &[Task]) -> Vec<Option<DayCell>> {
        let leading = self.first.weekday().num_days_from_sunday() as usize;
        let mut cells = vec![None; leading];
        cells.extend(self.first.iter_days().take_while(|d| self.contains(*d)).map(|date| {
            Some(DayCell {
                date,
                count: tasks_on(date, tasks).count(),
            })
        }));
        cells
    }
}

/// Sunday-first grid for `month` of `year`, padded with `None` before the 1st.
pub fn month_grid(year: i32, month: u32, tasks: &[Task]) -> Result<Vec<Option<DayCell>>> {
    Ok(Month::new(year, month)?.grid(tasks))
}

/// Non-archived tasks starting or due on `date`.
pub fn tasks_on(date: NaiveDate, tasks: &[Task]) -> impl Iterator<Item = &Task> {
    tasks.iter().filter(move |task| {
        !task.fields.archived
            && (task.fields.start_date == Some(date) || task.fields.due_date == Some(date))
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OccurrenceKind {
    Start,
    Due,
}

impl OccurrenceKind {
    pub fn label(self) -> &'static str {
        match self {
            OccurrenceKind::Start => "Starts",
            OccurrenceKind::Due => "Due",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence<'a> {
    pub task: &'a Task,
    pub kind: OccurrenceKind,
    /// `None` means the task has no time for this event ("all day").
    pub time: Option<NaiveTime>,
}

impl Occurrence<'_> {
    /// Untimed starts sort first in the day, untimed dues last.
    pub fn sort_key(&self) -> NaiveTime {
        self.time.unwrap_or(match self.kind {
            OccurrenceKind::Start => NaiveTime::MIN,
            OccurrenceKind::Due => NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN),
        })
    }
}

pub fn timeline_for_day(date: NaiveDate, tasks: &[Task]) -> Vec<Occurrence<'_>> {
    let mut occurrences = Vec::new();
    for task in tasks.iter().filter(|t| !t.fields.archived) {
        let starts_today = task.fields.start_date == Some(date);
        if starts_today {
            occurrences.push(Occurrence {
                task,
                kind: OccurrenceKind::Start,
                time: task.fields.start_time,
            });
        }
        if task.fields.due_date == Some(date) && !starts_today {
            occurrences.push(Occurrence {
                task,
                kind: OccurrenceKind::Due,
                time: task.fields.end_time,
            });
        }
    }
    occurrences.sort_by_key(Occurrence::sort_key);
    occurrences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TaskFields;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn scheduled(id: i64, start: Option<NaiveDate>, due: Option<NaiveDate>) -> Task {
        Task {
            id,
            created_date: date(2024, 1, 1),
            fields: TaskFields {
                start_date: start,
                due_date: due,
                ..TaskFields::titled(format!("task {id}"))
            },
        }
    }

    fn count_on(cells: &[Option<DayCell>], day: NaiveDate) -> usize {
        cells
            .iter()
            .flatten()
            .find(|c| c.date == day)
            .map(|c| c.count)
            .unwrap()
    }

    #[test]
    fn test_march_2024_example() {
        let mut task = scheduled(1, Some(date(2024, 3, 1)), Some(date(2024, 3, 3)));
        task.fields.start_time = Some(time(9, 0));
        task.fields.end_time = Some(time(17, 0));
        let tasks = vec![task];

        let cells = month_grid(2024, 3, &tasks).unwrap();
        assert_eq!(count_on(&cells, date(2024, 3, 1)), 1);
        assert_eq!(count_on(&cells, date(2024, 3, 2)), 0);
        assert_eq!(count_on(&cells, date(2024, 3, 3)), 1);

        let first = timeline_for_day(date(2024, 3, 1), &tasks);
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].kind, OccurrenceKind::Start);
        assert_eq!(first[0].time, Some(time(9, 0)));

        let third = timeline_for_day(date(2024, 3, 3), &tasks);
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].kind, OccurrenceKind::Due);
        assert_eq!(third[0].time, Some(time(17, 0)));
    }

    #[test]
    fn test_grid_padding_and_length() {
        // 1 March 2024 is a Friday
        let cells = month_grid(2024, 3, &[]).unwrap();
        assert!(cells[..5].iter().all(Option::is_none));
        assert_eq!(cells[5].unwrap().date, date(2024, 3, 1));
        assert_eq!(cells.iter().flatten().count(), 31);

        // 1 September 2024 is a Sunday
        let cells = month_grid(2024, 9, &[]).unwrap();
        assert_eq!(cells[0].unwrap().date, date(2024, 9, 1));
    }

    #[test]
    fn test_leap_february() {
        assert_eq!(month_grid(2024, 2, &[]).unwrap().iter().flatten().count(), 29);
        assert_eq!(month_grid(2023, 2, &[]).unwrap().iter().flatten().count(), 28);
        assert_eq!(Month::new(2100, 2).unwrap().days(), 28);
        assert_eq!(Month::new(2000, 2).unwrap().days(), 29);
    }

    #[test]
    fn test_invalid_month_rejected() {
        assert!(month_grid(2024, 13, &[]).is_err());
        assert!(month_grid(2024, 0, &[]).is_err());
        assert!(Month::parse("2024-xx").is_err());
    }

    #[test]
    fn test_same_day_start_and_due_counts_once() {
        let day = date(2024, 5, 2);
        let tasks = vec![scheduled(1, Some(day), Some(day))];

        let cells = month_grid(2024, 5, &tasks).unwrap();
        assert_eq!(count_on(&cells, day), 1);

        let timeline = timeline_for_day(day, &tasks);
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0].kind, OccurrenceKind::Start);
    }

    #[test]
    fn test_archived_tasks_excluded() {
        let day = date(2024, 5, 2);
        let mut task = scheduled(1, Some(day), None);
        task.fields.archived = true;
        let tasks = vec![task];

        assert_eq!(count_on(&month_grid(2024, 5, &tasks).unwrap(), day), 0);
        assert!(timeline_for_day(day, &tasks).is_empty());
    }

    #[test]
    fn test_untimed_defaults_order() {
        let day = date(2024, 5, 2);
        let mut timed = scheduled(1, Some(day), None);
        timed.fields.start_time = Some(time(12, 0));
        let untimed_due = scheduled(2, None, Some(day));
        let untimed_start = scheduled(3, Some(day), None);
        let tasks = vec![untimed_due, timed, untimed_start];

        let order: Vec<i64> = timeline_for_day(day, &tasks).iter().map(|o| o.task.id).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[test]
    fn test_undated_task_has_no_occurrences() {
        let tasks = vec![scheduled(1, None, None)];
        let cells = month_grid(2024, 3, &tasks).unwrap();
        assert!(cells.iter().flatten().all(|c| c.count == 0));
        assert!(timeline_for_day(date(2024, 3, 1), &tasks).is_empty());
    }

    #[test]
    fn test_month_navigation_wraps_years() {
        let jan = Month::new(2024, 1).unwrap();
        assert_eq!(jan.previous(), Month::new(2023, 12).unwrap());
        assert_eq!(Month::new(2023, 12).unwrap().next(), jan);
        assert_eq!(Month::parse("2024-03").unwrap().key(), "2024-03");
        assert_eq!(jan.label(), "January 2024");
    }

    proptest! {
        #[test]
        fn prop_cell_count_matches_filter(
            spans in proptest::collection::vec((0u32..31, 0u32..31, any::<bool>()), 0..30)
        ) {
            let base = date(2024, 7, 1);
            let tasks: Vec<Task> = spans
                .iter()
                .enumerate()
                .map(|(i, (s, d, archived))| {
                    let mut t = scheduled(
                        i as i64,
                        Some(base + chrono::Duration::days(*s as i64)),
                        Some(base + chrono::Duration::days(*d as i64)),
                    );
                    t.fields.archived = *archived;
                    t
                })
                .collect();

            let cells = month_grid(2024, 7, &tasks).unwrap();
            for cell in cells.iter().flatten() {
                let expected = tasks
                    .iter()
                    .filter(|t| !t.fields.archived)
                    .filter(|t| t.fields.start_date == Some(cell.date) || t.fields.due_date == Some(cell.date))
                    .count();
                prop_assert_eq!(cell.count, expected);

                let timeline = timeline_for_day(cell.date, &tasks);
                prop_assert!(timeline.windows(2).all(|w| w[0].sort_key() <= w[1].sort_key()));
                let due_on_start_day = timeline
                    .iter()
                    .any(|o| o.kind == OccurrenceKind::Due && o.task.fields.start_date == Some(cell.date));
                prop_assert!(!due_on_start_day);
            }
        }

        #[test]
        fn prop_equal_keys_keep_input_order(n in 1usize..20) {
            let day = date(2024, 7, 4);
            let tasks: Vec<Task> = (0..n)
                .map(|i| {
                    let mut t = scheduled(i as i64, Some(day), None);
                    t.fields.start_time = Some(time(10, 30));
                    t
                })
                .collect();

            let order: Vec<i64> = timeline_for_day(day, &tasks).iter().map(|o| o.task.id).collect();
            prop_assert_eq!(order, (0..n as i64).collect::<Vec<_>>());
        }
    }
}
