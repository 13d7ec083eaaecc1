use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::stats::{Outcome, Stats};
use crate::task::{Interval, Task, TaskKind, TaskType};

/// Unvalidated input for a new task, as collected by a presentation adapter.
#[derive(Debug, Clone)]
pub struct TaskDraft {
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub deadline: Option<NaiveDate>,
    pub interval: Option<Interval>,
}

impl TaskDraft {
    pub fn fixed(title: impl Into<String>, deadline: NaiveDate) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            task_type: TaskType::Fixed,
            deadline: Some(deadline),
            interval: None,
        }
    }

    pub fn recurring(title: impl Into<String>, interval: Interval) -> Self {
        Self {
            title: title.into(),
            description: String::new(),
            task_type: TaskType::Recurring,
            deadline: None,
            interval: Some(interval),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Replacement values for an existing task; `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<NaiveDate>,
    pub interval: Option<Interval>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.deadline.is_none()
            && self.interval.is_none()
    }
}

/// What `complete` did to the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// Fixed task finished and removed.
    Removed { task: Task, outcome: Outcome },
    /// Recurring cycle finished; task hidden until `next_deadline`.
    Cycled {
        id: u64,
        outcome: Outcome,
        interval: Interval,
        next_deadline: NaiveDate,
    },
}

impl Completion {
    pub fn outcome(&self) -> Outcome {
        match self {
            Completion::Removed { outcome, .. } | Completion::Cycled { outcome, .. } => *outcome,
        }
    }
}

/// Insertion-ordered task collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskStore {
    tasks: Vec<Task>,
}

impl TaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn find(&self, id: u64) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub(crate) fn tasks_mut(&mut self) -> &mut Vec<Task> {
        &mut self.tasks
    }

    /// Millisecond timestamp, bumped past every existing id so ids stay
    /// unique and increasing even within the same millisecond. When the
    /// largest id is `u64::MAX` the first free id from the timestamp is used.
    pub fn next_id(&self, now: DateTime<Utc>) -> u64 {
        let stamp = u64::try_from(now.timestamp_millis()).unwrap_or(0);
        let Some(max) = self.tasks.iter().map(|t| t.id).max() else {
            return stamp;
        };
        match max.checked_add(1) {
            Some(after_existing) => stamp.max(after_existing),
            None => (stamp..=u64::MAX)
                .chain(0..stamp)
                .find(|id| self.find(*id).is_none())
                .unwrap_or(stamp),
        }
    }

    #[instrument(skip(self, draft, now), fields(task_type = ?draft.task_type))]
    pub fn create(&mut self, draft: TaskDraft, now: DateTime<Utc>, today: NaiveDate) -> Result<&Task> {
        let title = validate_title(&draft.title)?;
        let id = self.next_id(now);

        let mut task = match draft.task_type {
            TaskType::Fixed => {
                let deadline = draft
                    .deadline
                    .ok_or_else(|| Error::validation("a fixed task needs a deadline"))?;
                Task::new_fixed(id, title, deadline, now)
            }
            TaskType::Recurring => {
                let interval = draft.interval.unwrap_or_default();
                Task::new_recurring(id, title, interval, today, now)
            }
        };
        task.description = draft.description.trim().to_string();

        info!(id, deadline = %task.deadline, "task created");
        self.tasks.push(task);
        let idx = self.tasks.len() - 1;
        Ok(&self.tasks[idx])
    }

    #[instrument(skip(self, patch))]
    pub fn update(&mut self, id: u64, patch: TaskPatch, today: NaiveDate) -> Result<&Task> {
        let idx = self.position(id)?;

        let title = patch.title.as_deref().map(validate_title).transpose()?;
        if patch.interval.is_some() && self.tasks[idx].is_fixed() {
            return Err(Error::validation(
                "a fixed task has no recurrence interval",
            ));
        }

        let task = &mut self.tasks[idx];
        if let Some(title) = title {
            task.title = title;
        }
        if let Some(description) = patch.description {
            task.description = description.trim().to_string();
        }
        if let TaskKind::Recurring { interval, .. } = &mut task.kind
            && let Some(new_interval) = patch.interval
        {
            *interval = new_interval;
            task.deadline = new_interval.next_date(today);
        }
        if let Some(deadline) = patch.deadline {
            task.deadline = deadline;
        }

        debug!(id, deadline = %task.deadline, "task updated");
        Ok(task)
    }

    /// Removes a task without touching stats.
    #[instrument(skip(self))]
    pub fn remove(&mut self, id: u64) -> Option<Task> {
        let idx = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(idx))
    }

    /// Permanent removal; always counted as missed.
    #[instrument(skip(self, stats))]
    pub fn delete(&mut self, id: u64, stats: &mut Stats) -> Result<Task> {
        let task = self.remove(id).ok_or(Error::NotFound(id))?;
        stats.record(Outcome::Missed);
        info!(id, task_type = ?task.task_type(), "task deleted");
        Ok(task)
    }

    /// Finishes a fixed task or the current cycle of a recurring one. A task
    /// hidden today has nothing left to finish and is rejected.
    #[instrument(skip(self, stats))]
    pub fn complete(&mut self, id: u64, stats: &mut Stats, today: NaiveDate) -> Result<Completion> {
        let idx = self.position(id)?;
        if self.tasks[idx].is_hidden(today) {
            return Err(Error::validation(format!(
                "task {id} is already completed for today"
            )));
        }
        let outcome = if self.tasks[idx].deadline >= today {
            Outcome::OnTime
        } else {
            Outcome::Missed
        };

        let completion = match &mut self.tasks[idx].kind {
            TaskKind::Fixed => {
                let task = self.tasks.remove(idx);
                Completion::Removed { task, outcome }
            }
            TaskKind::Recurring {
                interval,
                completed_today,
            } => {
                let interval = *interval;
                *completed_today = Some(today);
                let next_deadline = interval.next_date(today);
                self.tasks[idx].deadline = next_deadline;
                Completion::Cycled {
                    id,
                    outcome,
                    interval,
                    next_deadline,
                }
            }
        };

        stats.record(outcome);
        info!(id, ?outcome, "task completed");
        Ok(completion)
    }

    fn position(&self, id: u64) -> Result<usize> {
        self.tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or(Error::NotFound(id))
    }
}

fn validate_title(raw: &str) -> Result<String> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(Error::validation("a task needs a title"));
    }
    Ok(title.to_string())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 9, 9, 0, 0).single().expect("valid now")
    }

    #[test]
    fn create_rejects_blank_title() {
        let mut store = TaskStore::default();
        let err = store
            .create(TaskDraft::fixed("   ", date(2024, 1, 10)), now(), date(2024, 1, 9))
            .expect_err("blank title must fail");
        assert!(matches!(err, Error::Validation(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn create_fixed_requires_deadline() {
        let mut store = TaskStore::default();
        let mut draft = TaskDraft::fixed("Pay rent", date(2024, 1, 10));
        draft.deadline = None;
        let err = store.create(draft, now(), date(2024, 1, 9)).expect_err("must fail");
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn ids_increase_within_one_millisecond() {
        let mut store = TaskStore::default();
        let today = date(2024, 1, 9);
        let first = store
            .create(TaskDraft::fixed("a", today), now(), today)
            .expect("create")
            .id;
        let second = store
            .create(TaskDraft::fixed("b", today), now(), today)
            .expect("create")
            .id;
        assert!(second > first);
    }

    #[test]
    fn update_preserves_identity_and_stamp() {
        let mut store = TaskStore::default();
        let mut stats = Stats::default();
        let today = date(2024, 1, 9);
        let id = store
            .create(TaskDraft::recurring("Stretch", Interval::Daily), now(), today)
            .expect("create")
            .id;
        store.complete(id, &mut stats, today).expect("complete");

        let patch = TaskPatch {
            title: Some("Stretch more".into()),
            interval: Some(Interval::Weekly),
            ..TaskPatch::default()
        };
        let task = store.update(id, patch, today).expect("update");

        assert_eq!(task.id, id);
        assert_eq!(task.title, "Stretch more");
        assert_eq!(task.interval(), Some(Interval::Weekly));
        assert_eq!(task.deadline, date(2024, 1, 16));
        assert_eq!(task.completed_today(), Some(today));
        assert_eq!(task.created_at, now());
    }

    #[test]
    fn update_rejects_interval_on_fixed_task() {
        let mut store = TaskStore::default();
        let today = date(2024, 1, 9);
        let id = store
            .create(TaskDraft::fixed("Pay rent", date(2024, 1, 10)), now(), today)
            .expect("create")
            .id;
        let before = store.clone();

        let patch = TaskPatch {
            title: Some("Pay rent now".into()),
            interval: Some(Interval::Weekly),
            ..TaskPatch::default()
        };
        assert!(store.update(id, patch, today).is_err());
        assert_eq!(store, before);
    }

    #[test]
    fn late_recurring_completion_does_not_compound() {
        let mut store = TaskStore::default();
        let mut stats = Stats::default();
        let created_on = date(2024, 1, 1);
        let id = store
            .create(TaskDraft::recurring("Report", Interval::Weekly), now(), created_on)
            .expect("create")
            .id;

        let late_day = date(2024, 1, 12);
        let completion = store.complete(id, &mut stats, late_day).expect("complete");

        assert_eq!(completion.outcome(), Outcome::Missed);
        assert_eq!(stats.deleted_or_expired, 1);
        assert_eq!(store.find(id).expect("kept").deadline, date(2024, 1, 19));
    }

    #[test]
    fn second_completion_on_the_same_day_is_rejected() {
        let mut store = TaskStore::default();
        let mut stats = Stats::default();
        let today = date(2024, 3, 4);
        let id = store
            .create(TaskDraft::recurring("Review budget", Interval::Weekly), now(), today)
            .expect("create")
            .id;
        store.complete(id, &mut stats, today).expect("first completion");
        let (store_before, stats_before) = (store.clone(), stats);

        let err = store.complete(id, &mut stats, today).expect_err("already done today");
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(store, store_before);
        assert_eq!(stats, stats_before);
        assert_eq!(stats.total_finished, 1);

        let next_day = date(2024, 3, 5);
        store.complete(id, &mut stats, next_day).expect("new day, new completion");
        assert_eq!(stats.total_finished, 2);
    }

    #[test]
    fn legacy_completed_flag_blocks_completion() {
        let mut store = TaskStore::default();
        let mut stats = Stats::default();
        let today = date(2024, 1, 9);
        let id = store
            .create(TaskDraft::fixed("Old", date(2024, 1, 10)), now(), today)
            .expect("create")
            .id;
        store.tasks_mut()[0].completed = true;

        assert!(store.complete(id, &mut stats, today).is_err());
        assert_eq!(store.len(), 1);
        assert_eq!(stats, Stats::default());
    }

    #[test]
    fn fixed_task_moved_into_the_past_completes_late() {
        let mut store = TaskStore::default();
        let mut stats = Stats::default();
        let today = date(2024, 1, 9);
        let id = store
            .create(TaskDraft::fixed("Renew permit", date(2024, 1, 20)), now(), today)
            .expect("create")
            .id;
        let patch = TaskPatch {
            deadline: Some(date(2024, 1, 5)),
            ..TaskPatch::default()
        };
        store.update(id, patch, today).expect("update");

        let completion = store.complete(id, &mut stats, today).expect("complete");

        assert!(matches!(completion, Completion::Removed { .. }));
        assert_eq!(completion.outcome(), Outcome::Missed);
        assert!(store.is_empty());
        assert_eq!(stats.completed_on_time, 0);
        assert_eq!(stats.deleted_or_expired, 1);
        assert_eq!(stats.total_finished, 1);
    }

    #[test]
    fn completing_on_the_deadline_day_is_on_time() {
        let mut store = TaskStore::default();
        let mut stats = Stats::default();
        let today = date(2024, 1, 9);
        let fixed = store
            .create(TaskDraft::fixed("Pay rent", today), now(), today)
            .expect("create")
            .id;
        let recurring = store
            .create(TaskDraft::recurring("Stretch", Interval::Daily), now(), date(2024, 1, 8))
            .expect("create")
            .id;
        assert_eq!(store.find(recurring).expect("created").deadline, today);

        assert_eq!(
            store.complete(fixed, &mut stats, today).expect("complete").outcome(),
            Outcome::OnTime
        );
        assert_eq!(
            store.complete(recurring, &mut stats, today).expect("complete").outcome(),
            Outcome::OnTime
        );
        assert_eq!(stats.completed_on_time, 2);
        assert_eq!(stats.deleted_or_expired, 0);
    }

    #[test]
    fn imported_max_id_does_not_overflow() {
        let mut store = TaskStore::new(vec![Task::new_fixed(
            u64::MAX,
            "imported".into(),
            date(2024, 1, 10),
            now(),
        )]);
        let today = date(2024, 1, 9);
        let id = store
            .create(TaskDraft::fixed("fresh", today), now(), today)
            .expect("create")
            .id;

        assert_ne!(id, u64::MAX);
        assert_eq!(store.len(), 2);
        assert_eq!(store.find(id).expect("created").title, "fresh");
    }

    #[test]
    fn delete_counts_as_missed_even_when_early() {
        let mut store = TaskStore::default();
        let mut stats = Stats::default();
        let today = date(2024, 1, 9);
        let id = store
            .create(TaskDraft::fixed("Far away", date(2025, 1, 1)), now(), today)
            .expect("create")
            .id;

        store.delete(id, &mut stats).expect("delete");
        assert!(store.is_empty());
        assert_eq!(stats.deleted_or_expired, 1);
        assert_eq!(stats.total_finished, 1);
        assert!(matches!(store.delete(id, &mut stats), Err(Error::NotFound(_))));
        assert_eq!(stats.total_finished, 1);
    }
}
