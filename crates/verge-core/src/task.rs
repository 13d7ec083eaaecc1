use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Fixed,
    Recurring,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Interval {
    /// The due date one interval after `from`. Monthly steps keep the day of
    /// month, clamped to the end of shorter months.
    pub fn next_date(self, from: NaiveDate) -> NaiveDate {
        let next = match self {
            Interval::Daily => from.checked_add_signed(Duration::days(1)),
            Interval::Weekly => from.checked_add_signed(Duration::days(7)),
            Interval::Monthly => from.checked_add_months(Months::new(1)),
        };
        next.unwrap_or(from)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Daily => "daily",
            Interval::Weekly => "weekly",
            Interval::Monthly => "monthly",
        }
    }

    pub fn reappears_text(self) -> &'static str {
        match self {
            Interval::Daily => "tomorrow",
            Interval::Weekly => "next week",
            Interval::Monthly => "next month",
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" | "day" | "d" => Ok(Interval::Daily),
            "weekly" | "week" | "w" => Ok(Interval::Weekly),
            "monthly" | "month" | "m" => Ok(Interval::Monthly),
            other => Err(Error::validation(format!(
                "unknown recurrence interval: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
    Fixed,
    Recurring {
        interval: Interval,
        /// Set when the current cycle was completed; hides the task until
        /// the next cycle starts.
        completed_today: Option<NaiveDate>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TaskRecord", into = "TaskRecord")]
pub struct Task {
    pub id: u64,
    pub title: String,
    pub description: String,
    pub deadline: NaiveDate,
    pub kind: TaskKind,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn new_fixed(id: u64, title: String, deadline: NaiveDate, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title,
            description: String::new(),
            deadline,
            kind: TaskKind::Fixed,
            completed: false,
            created_at: now,
        }
    }

    /// First occurrence is one interval after `today`, never today itself.
    pub fn new_recurring(
        id: u64,
        title: String,
        interval: Interval,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title,
            description: String::new(),
            deadline: interval.next_date(today),
            kind: TaskKind::Recurring {
                interval,
                completed_today: None,
            },
            completed: false,
            created_at: now,
        }
    }

    pub fn task_type(&self) -> TaskType {
        match self.kind {
            TaskKind::Fixed => TaskType::Fixed,
            TaskKind::Recurring { .. } => TaskType::Recurring,
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self.kind, TaskKind::Fixed)
    }

    pub fn interval(&self) -> Option<Interval> {
        match self.kind {
            TaskKind::Fixed => None,
            TaskKind::Recurring { interval, .. } => Some(interval),
        }
    }

    pub fn completed_today(&self) -> Option<NaiveDate> {
        match self.kind {
            TaskKind::Fixed => None,
            TaskKind::Recurring {
                completed_today, ..
            } => completed_today,
        }
    }

    /// Hidden from the projection on `today`.
    pub fn is_hidden(&self, today: NaiveDate) -> bool {
        self.completed || self.completed_today() == Some(today)
    }

    pub fn type_label(&self) -> String {
        match self.kind {
            TaskKind::Fixed => "Fixed Deadline".to_string(),
            TaskKind::Recurring { interval, .. } => format!("Recurring ({interval})"),
        }
    }
}

/// On-disk and export layout of a task. Accepts records written by every
/// earlier schema version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskRecord {
    id: u64,
    title: String,
    #[serde(default)]
    description: String,
    deadline: NaiveDate,
    #[serde(default)]
    completed: bool,
    #[serde(default)]
    task_type: Option<TaskType>,
    #[serde(default)]
    recurrence_interval: Option<Interval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completed_today: Option<NaiveDate>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRecord> for Task {
    type Error = Error;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        let kind = match record.task_type.unwrap_or(TaskType::Fixed) {
            TaskType::Fixed => TaskKind::Fixed,
            TaskType::Recurring => TaskKind::Recurring {
                interval: record.recurrence_interval.unwrap_or_default(),
                completed_today: record.completed_today,
            },
        };

        // Legacy ids are millisecond timestamps taken at creation.
        let created_at = match record.created_at {
            Some(created_at) => created_at,
            None => i64::try_from(record.id)
                .ok()
                .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
                .unwrap_or_default(),
        };

        Ok(Self {
            id: record.id,
            title: record.title,
            description: record.description,
            deadline: record.deadline,
            kind,
            completed: record.completed,
            created_at,
        })
    }
}

impl From<Task> for TaskRecord {
    fn from(task: Task) -> Self {
        let (task_type, recurrence_interval, completed_today) = match task.kind {
            TaskKind::Fixed => (TaskType::Fixed, None, None),
            TaskKind::Recurring {
                interval,
                completed_today,
            } => (TaskType::Recurring, Some(interval), completed_today),
        };

        Self {
            id: task.id,
            title: task.title,
            description: task.description,
            deadline: task.deadline,
            completed: task.completed,
            task_type: Some(task_type),
            recurrence_interval,
            completed_today,
            created_at: Some(task.created_at),
        }
    }
}
