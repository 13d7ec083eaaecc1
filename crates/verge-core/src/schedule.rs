use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;

use crate::clock::days_until;
use crate::task::Task;

/// Tasks due in fewer than this many days are critical.
pub const CRITICAL_DAYS: i64 = 3;

/// Upper bound (inclusive) of the caution band.
const CAUTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Overdue(i64),
    DueToday,
    Warning(i64),
    Caution(i64),
    Safe(i64),
}

impl Urgency {
    pub fn classify(days: i64) -> Self {
        match days {
            d if d < 0 => Urgency::Overdue(-d),
            0 => Urgency::DueToday,
            d if d < CRITICAL_DAYS => Urgency::Warning(d),
            d if d <= CAUTION_DAYS => Urgency::Caution(d),
            d => Urgency::Safe(d),
        }
    }

    pub fn for_deadline(deadline: NaiveDate, today: NaiveDate) -> Self {
        Self::classify(days_until(deadline, today))
    }

    pub fn is_critical(self) -> bool {
        matches!(
            self,
            Urgency::Overdue(_) | Urgency::DueToday | Urgency::Warning(_)
        )
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Urgency::Overdue(days) => write!(f, "Overdue by {days} days"),
            Urgency::DueToday => f.write_str("DUE TODAY"),
            Urgency::Warning(days) | Urgency::Caution(days) | Urgency::Safe(days) => {
                write!(f, "{days} days left")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Counts {
    pub fixed: usize,
    pub recurring: usize,
    pub critical: usize,
}

/// Read-only EDF view of the visible tasks for one day.
#[derive(Debug, Clone)]
pub struct Projection<'a> {
    pub today: NaiveDate,
    pub fixed: Vec<&'a Task>,
    pub recurring: Vec<&'a Task>,
    pub critical: Vec<&'a Task>,
}

impl Projection<'_> {
    pub fn counts(&self) -> Counts {
        Counts {
            fixed: self.fixed.len(),
            recurring: self.recurring.len(),
            critical: self.critical.len(),
        }
    }
}

/// Earliest deadline first; equal deadlines keep creation order.
pub fn edf_order(a: &Task, b: &Task) -> Ordering {
    a.deadline.cmp(&b.deadline).then(a.id.cmp(&b.id))
}

pub fn is_critical(task: &Task, today: NaiveDate) -> bool {
    Urgency::for_deadline(task.deadline, today).is_critical()
}

pub fn project(tasks: &[Task], today: NaiveDate) -> Projection<'_> {
    let visible: Vec<&Task> = tasks.iter().filter(|t| !t.is_hidden(today)).collect();

    let (mut fixed, mut recurring): (Vec<&Task>, Vec<&Task>) =
        visible.iter().copied().partition(|t| t.is_fixed());
    fixed.sort_by(|a, b| edf_order(a, b));
    recurring.sort_by(|a, b| edf_order(a, b));

    let mut critical: Vec<&Task> = visible
        .into_iter()
        .filter(|t| is_critical(t, today))
        .collect();
    critical.sort_by(|a, b| edf_order(a, b));

    Projection {
        today,
        fixed,
        recurring,
        critical,
    }
}
