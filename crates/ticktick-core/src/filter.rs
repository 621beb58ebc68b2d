//! Date predicates, text search, and the composed task filter.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};

use crate::error::{Error, Result};
use crate::timezone::{normalize_instant, resolve_timezone};
use crate::types::{is_inbox_id, DateFilterKind, Priority, Task};

/// A fixed reference point for one query.
///
/// `now` is sampled once when the clock is built, so every task in a
/// query run is judged against the same instant even if the run spans
/// midnight. Per-task dates are still derived in each task's own
/// resolved zone.
#[derive(Debug, Clone)]
pub struct QueryClock {
    now: DateTime<Utc>,
    default_tz: Option<String>,
    week_start: Weekday,
}

impl QueryClock {
    pub fn new(default_tz: Option<String>, week_start: Weekday) -> Self {
        Self {
            now: Utc::now(),
            default_tz,
            week_start,
        }
    }

    /// Clock pinned to a fixed instant. Test hook.
    pub fn at(now: DateTime<Utc>, default_tz: Option<String>, week_start: Weekday) -> Self {
        Self {
            now,
            default_tz,
            week_start,
        }
    }

    /// Due date and "today" as calendar dates in the task's resolved
    /// zone. `None` when the task has no parseable due date.
    fn due_and_today(&self, task: &Task) -> Option<(NaiveDate, NaiveDate)> {
        let raw = task.due_date.as_deref()?;
        let due = normalize_instant(raw).ok()?;
        let zone = resolve_timezone(task.time_zone.as_deref(), self.default_tz.as_deref());
        Some((zone.date_of(due), zone.date_of(self.now)))
    }

    pub fn is_due_today(&self, task: &Task) -> bool {
        matches!(self.due_and_today(task), Some((due, today)) if due == today)
    }

    /// Due on a calendar day strictly before today. Completed tasks are
    /// never overdue.
    pub fn is_overdue(&self, task: &Task) -> bool {
        if task.is_completed() {
            return false;
        }
        matches!(self.due_and_today(task), Some((due, today)) if due < today)
    }

    /// Due exactly `days` days from today (0 = today, 1 = tomorrow).
    /// Offsets past the calendar's range cannot match anything.
    pub fn is_due_in_days(&self, task: &Task, days: i64) -> bool {
        let Some((due, today)) = self.due_and_today(task) else {
            return false;
        };
        let Some(delta) = Duration::try_days(days) else {
            return false;
        };
        match today.checked_add_signed(delta) {
            Some(target) => due == target,
            None => false,
        }
    }

    /// Due inside the current calendar week, anchored at the configured
    /// week start.
    pub fn is_due_this_week(&self, task: &Task) -> bool {
        match self.due_and_today(task) {
            Some((due, today)) => {
                let week = today.week(self.week_start);
                week.first_day() <= due && due <= week.last_day()
            }
            None => false,
        }
    }
}

/// Case-insensitive substring match over title, content, and checklist
/// item titles.
pub fn matches_search(task: &Task, term: &str) -> bool {
    let needle = term.to_lowercase();
    if task.title.to_lowercase().contains(&needle) {
        return true;
    }
    if let Some(content) = &task.content {
        if content.to_lowercase().contains(&needle) {
            return true;
        }
    }
    task.items
        .iter()
        .any(|item| item.title.to_lowercase().contains(&needle))
}

/// A concrete date window after filter-argument validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    Today,
    Tomorrow,
    Overdue,
    NextSevenDays,
    InDays(i64),
}

impl DateWindow {
    /// Validate a filter kind plus its optional day offset.
    pub fn resolve(kind: DateFilterKind, custom_days: Option<i64>) -> Result<Self> {
        match kind {
            DateFilterKind::Today => Ok(DateWindow::Today),
            DateFilterKind::Tomorrow => Ok(DateWindow::Tomorrow),
            DateFilterKind::Overdue => Ok(DateWindow::Overdue),
            DateFilterKind::Next7Days => Ok(DateWindow::NextSevenDays),
            DateFilterKind::Custom => match custom_days {
                Some(days) if days >= 0 => Ok(DateWindow::InDays(days)),
                Some(days) => Err(Error::InvalidFilterArgument(format!(
                    "custom_days must be non-negative, got {days}"
                ))),
                None => Err(Error::InvalidFilterArgument(
                    "custom date filter requires custom_days".to_string(),
                )),
            },
        }
    }

    pub fn matches(&self, task: &Task, clock: &QueryClock) -> bool {
        match self {
            DateWindow::Today => clock.is_due_today(task),
            DateWindow::Tomorrow => clock.is_due_in_days(task, 1),
            DateWindow::Overdue => clock.is_overdue(task),
            DateWindow::NextSevenDays => (0..7).any(|d| clock.is_due_in_days(task, d)),
            DateWindow::InDays(days) => clock.is_due_in_days(task, *days),
        }
    }
}

/// Composed filter for the unified query tool. All present criteria
/// must hold; an empty filter admits every task.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub date: Option<DateWindow>,
    pub priority: Option<Priority>,
    pub search: Option<String>,
    pub project_id: Option<String>,
}

impl TaskFilter {
    /// Build a filter from raw tool arguments, validating each criterion.
    pub fn build(
        date: Option<(DateFilterKind, Option<i64>)>,
        priority: Option<i64>,
        search: Option<String>,
        project_id: Option<String>,
    ) -> Result<Self> {
        let date = date
            .map(|(kind, days)| DateWindow::resolve(kind, days))
            .transpose()?;
        let priority = priority.map(Priority::try_from).transpose()?;
        let search = search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(Self {
            date,
            priority,
            search,
            project_id,
        })
    }

    pub fn matches(&self, task: &Task, clock: &QueryClock) -> bool {
        if let Some(window) = &self.date {
            if !window.matches(task, clock) {
                return false;
            }
        }
        if let Some(priority) = &self.priority {
            if task.priority != *priority {
                return false;
            }
        }
        if let Some(term) = &self.search {
            if !matches_search(task, term) {
                return false;
            }
        }
        if let Some(project_id) = &self.project_id {
            let same = if is_inbox_id(project_id) {
                is_inbox_id(&task.project_id)
            } else {
                task.project_id == *project_id
            };
            if !same {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChecklistItem;

    fn task(due: Option<&str>, tz: Option<&str>) -> Task {
        Task {
            id: "t1".to_string(),
            project_id: "p1".to_string(),
            title: "Quarterly report".to_string(),
            content: Some("draft the summary".to_string()),
            desc: None,
            start_date: None,
            due_date: due.map(str::to_string),
            time_zone: tz.map(str::to_string),
            priority: Priority::Medium,
            status: 0,
            is_all_day: false,
            parent_id: None,
            reminders: None,
            repeat_flag: None,
            sort_order: None,
            items: vec![ChecklistItem {
                id: None,
                title: "Collect figures".to_string(),
                status: 0,
            }],
        }
    }

    fn clock_at(iso: &str) -> QueryClock {
        let now = DateTime::parse_from_rfc3339(iso).unwrap().with_timezone(&Utc);
        QueryClock::at(now, None, Weekday::Mon)
    }

    #[test]
    fn test_due_today_utc() {
        let clock = clock_at("2025-03-10T12:00:00Z");
        assert!(clock.is_due_today(&task(Some("2025-03-10T23:00:00Z"), Some("UTC"))));
        assert!(!clock.is_due_today(&task(Some("2025-03-11T01:00:00Z"), Some("UTC"))));
    }

    #[test]
    fn test_due_today_respects_task_zone() {
        // 16:30 UTC March 10 is March 11 in Shanghai. At 15:00 UTC March 10
        // Shanghai is already on March 10 23:00, so both dates land on the
        // 11th once local midnight passes; here now is 17:00 UTC, i.e.
        // March 11 01:00 Shanghai, and the task is due "today" there.
        let clock = clock_at("2025-03-10T17:00:00Z");
        let t = task(Some("2025-03-10T16:30:00Z"), Some("Asia/Shanghai"));
        assert!(clock.is_due_today(&t));
        // Same instants judged in UTC: both still March 10.
        let t = task(Some("2025-03-10T16:30:00Z"), Some("UTC"));
        assert!(clock.is_due_today(&t));
    }

    #[test]
    fn test_overdue_is_calendar_based() {
        let clock = clock_at("2025-03-10T12:00:00Z");
        // Earlier today, but same calendar day: not overdue.
        assert!(!clock.is_overdue(&task(Some("2025-03-10T08:00:00Z"), Some("UTC"))));
        // Yesterday: overdue.
        assert!(clock.is_overdue(&task(Some("2025-03-09T23:59:00Z"), Some("UTC"))));
    }

    #[test]
    fn test_completed_never_overdue() {
        let clock = clock_at("2025-03-10T12:00:00Z");
        let mut t = task(Some("2025-03-01T00:00:00Z"), Some("UTC"));
        t.status = 2;
        assert!(!clock.is_overdue(&t));
    }

    #[test]
    fn test_due_in_days() {
        let clock = clock_at("2025-03-10T12:00:00Z");
        let t = task(Some("2025-03-13T09:00:00Z"), Some("UTC"));
        assert!(clock.is_due_in_days(&t, 3));
        assert!(!clock.is_due_in_days(&t, 2));
    }

    #[test]
    fn test_due_in_days_extreme_offset_is_no_match() {
        // Offsets beyond the calendar's range must not panic; nothing
        // can be due that far out.
        let clock = clock_at("2025-03-10T12:00:00Z");
        let t = task(Some("2025-03-13T09:00:00Z"), Some("UTC"));
        assert!(!clock.is_due_in_days(&t, i64::MAX));
        assert!(!clock.is_due_in_days(&t, 1_000_000_000));
    }

    #[test]
    fn test_due_this_week_monday_anchor() {
        // March 10 2025 is a Monday; the week runs through Sunday the 16th.
        let clock = clock_at("2025-03-12T12:00:00Z");
        assert!(clock.is_due_this_week(&task(Some("2025-03-10T09:00:00Z"), Some("UTC"))));
        assert!(clock.is_due_this_week(&task(Some("2025-03-16T09:00:00Z"), Some("UTC"))));
        assert!(!clock.is_due_this_week(&task(Some("2025-03-17T09:00:00Z"), Some("UTC"))));
        assert!(!clock.is_due_this_week(&task(Some("2025-03-09T09:00:00Z"), Some("UTC"))));
    }

    #[test]
    fn test_unparseable_due_matches_nothing() {
        let clock = clock_at("2025-03-10T12:00:00Z");
        let t = task(Some("whenever"), Some("UTC"));
        assert!(!clock.is_due_today(&t));
        assert!(!clock.is_overdue(&t));
        assert!(!clock.is_due_this_week(&t));
    }

    #[test]
    fn test_no_due_date_matches_nothing() {
        let clock = clock_at("2025-03-10T12:00:00Z");
        let t = task(None, None);
        assert!(!clock.is_due_today(&t));
        assert!(!clock.is_overdue(&t));
    }

    #[test]
    fn test_search_matches_title_content_items() {
        let t = task(None, None);
        assert!(matches_search(&t, "quarterly"));
        assert!(matches_search(&t, "SUMMARY"));
        assert!(matches_search(&t, "figures"));
        assert!(!matches_search(&t, "invoice"));
    }

    #[test]
    fn test_window_resolve_custom() {
        assert_eq!(
            DateWindow::resolve(DateFilterKind::Custom, Some(4)).unwrap(),
            DateWindow::InDays(4)
        );
        assert!(DateWindow::resolve(DateFilterKind::Custom, None).is_err());
        assert!(DateWindow::resolve(DateFilterKind::Custom, Some(-1)).is_err());
        // A huge offset resolves but can never match.
        let clock = clock_at("2025-03-10T12:00:00Z");
        let window = DateWindow::resolve(DateFilterKind::Custom, Some(i64::MAX)).unwrap();
        assert!(!window.matches(&task(Some("2025-03-13T09:00:00Z"), Some("UTC")), &clock));
    }

    #[test]
    fn test_next_seven_days_window() {
        let clock = clock_at("2025-03-10T12:00:00Z");
        let window = DateWindow::resolve(DateFilterKind::Next7Days, None).unwrap();
        assert!(window.matches(&task(Some("2025-03-10T09:00:00Z"), Some("UTC")), &clock));
        assert!(window.matches(&task(Some("2025-03-16T09:00:00Z"), Some("UTC")), &clock));
        assert!(!window.matches(&task(Some("2025-03-17T09:00:00Z"), Some("UTC")), &clock));
        assert!(!window.matches(&task(Some("2025-03-09T09:00:00Z"), Some("UTC")), &clock));
    }

    #[test]
    fn test_filter_composes_with_and() {
        let clock = clock_at("2025-03-10T12:00:00Z");
        let filter = TaskFilter::build(
            Some((DateFilterKind::Today, None)),
            Some(3),
            Some("report".to_string()),
            Some("p1".to_string()),
        )
        .unwrap();
        let t = task(Some("2025-03-10T20:00:00Z"), Some("UTC"));
        assert!(filter.matches(&t, &clock));
        let mut wrong_priority = t.clone();
        wrong_priority.priority = Priority::High;
        assert!(!filter.matches(&wrong_priority, &clock));
    }

    #[test]
    fn test_empty_filter_admits_everything() {
        let clock = clock_at("2025-03-10T12:00:00Z");
        let filter = TaskFilter::build(None, None, None, None).unwrap();
        assert!(filter.matches(&task(None, None), &clock));
        assert!(filter.matches(&task(Some("garbage"), None), &clock));
    }

    #[test]
    fn test_filter_blank_search_dropped() {
        let filter = TaskFilter::build(None, None, Some("   ".to_string()), None).unwrap();
        assert!(filter.search.is_none());
    }

    #[test]
    fn test_filter_rejects_bad_priority() {
        assert!(TaskFilter::build(None, Some(7), None, None).is_err());
    }

    #[test]
    fn test_filter_inbox_case_folded() {
        let clock = clock_at("2025-03-10T12:00:00Z");
        let filter = TaskFilter::build(None, None, None, Some("INBOX".to_string())).unwrap();
        let mut t = task(None, None);
        t.project_id = "inbox".to_string();
        assert!(filter.matches(&t, &clock));
        t.project_id = "p1".to_string();
        assert!(!filter.matches(&t, &clock));
    }
}
