//! The owned application state: task store, stats and the datastore they
//! are saved to.
//!
//! Every mutation goes through `&mut Session`, validates before it touches
//! anything, and ends at a save point. A failed save is logged and leaves the
//! in-memory state authoritative until the next successful one.

use tracing::{debug, info, instrument, warn};

use crate::clock::Clock;
use crate::datastore::{Backend, DataStore};
use crate::error::Result;
use crate::lifecycle::{self, DayWatcher, RolloverReport, Ticker};
use crate::schedule::{self, Projection};
use crate::stats::Stats;
use crate::store::{Completion, TaskDraft, TaskPatch, TaskStore};
use crate::task::Task;
use crate::transfer::ExportDocument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveStatus {
    Saved,
    /// The last save failed; state lives only in memory.
    Degraded,
}

#[derive(Debug)]
pub struct Session<B, C> {
    store: TaskStore,
    stats: Stats,
    data: DataStore<B>,
    clock: C,
    watcher: DayWatcher,
    save_status: SaveStatus,
}

impl<B: Backend, C: Clock> Session<B, C> {
    /// Loads persisted state. Load failures are logged and the session starts
    /// empty rather than failing.
    #[instrument(skip_all)]
    pub fn open(data: DataStore<B>, clock: C) -> Self {
        let tasks = data.load_tasks().unwrap_or_else(|err| {
            warn!(error = %err, "failed loading tasks; starting empty");
            Vec::new()
        });
        let stats = data.load_stats().unwrap_or_else(|err| {
            warn!(error = %err, "failed loading stats; starting from zero");
            Stats::default()
        });
        let last_check = data.load_last_check().unwrap_or_else(|err| {
            warn!(error = %err, "failed loading last rollover check");
            None
        });

        info!(tasks = tasks.len(), total_finished = stats.total_finished, "session opened");
        Self {
            store: TaskStore::new(tasks),
            stats,
            data,
            clock,
            watcher: DayWatcher::new(last_check),
            save_status: SaveStatus::Saved,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        self.store.tasks()
    }

    pub fn find(&self, id: u64) -> Option<&Task> {
        self.store.find(id)
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn data(&self) -> &DataStore<B> {
        &self.data
    }

    pub fn save_status(&self) -> SaveStatus {
        self.save_status
    }

    /// Application-start trigger: always runs a lifecycle pass and records
    /// the day as seen.
    #[instrument(skip(self))]
    pub fn start(&mut self) -> RolloverReport {
        let today = self.clock.today();
        self.watcher.poll(today);
        self.run_rollover()
    }

    /// Day-change trigger: runs a pass only when the calendar day moved
    /// since the last check.
    #[instrument(skip(self))]
    pub fn check_day(&mut self) -> Option<RolloverReport> {
        let today = self.clock.today();
        if !self.watcher.poll(today) {
            return None;
        }
        Some(self.run_rollover())
    }

    /// Polls for day changes on every tick until the ticker stops.
    pub fn watch<T, F>(&mut self, ticker: &mut T, mut on_rollover: F)
    where
        T: Ticker,
        F: FnMut(&Self, RolloverReport),
    {
        info!("watching for day changes");
        while ticker.tick() {
            if let Some(report) = self.check_day() {
                on_rollover(self, report);
            }
        }
        info!("watch stopped");
    }

    fn run_rollover(&mut self) -> RolloverReport {
        let today = self.clock.today();
        let report = lifecycle::rollover(&mut self.store, &mut self.stats, today);
        if report.changed() {
            self.save();
        }
        if let Err(err) = self.data.save_last_check(today) {
            warn!(error = %err, "failed saving last rollover check");
        }
        report
    }

    #[instrument(skip(self, draft))]
    pub fn create(&mut self, draft: TaskDraft) -> Result<Task> {
        let now = self.clock.now();
        let today = self.clock.today();
        let task = self.store.create(draft, now, today)?.clone();
        self.save_tasks();
        Ok(task)
    }

    #[instrument(skip(self, patch))]
    pub fn update(&mut self, id: u64, patch: TaskPatch) -> Result<Task> {
        let today = self.clock.today();
        let task = self.store.update(id, patch, today)?.clone();
        self.save_tasks();
        Ok(task)
    }

    #[instrument(skip(self))]
    pub fn complete(&mut self, id: u64) -> Result<Completion> {
        let today = self.clock.today();
        let completion = self.store.complete(id, &mut self.stats, today)?;
        self.save();
        Ok(completion)
    }

    #[instrument(skip(self))]
    pub fn delete(&mut self, id: u64) -> Result<Task> {
        let task = self.store.delete(id, &mut self.stats)?;
        self.save();
        Ok(task)
    }

    #[instrument(skip(self))]
    pub fn reset_stats(&mut self) {
        self.stats.reset();
        self.save_stats();
    }

    pub fn projection(&self) -> Projection<'_> {
        schedule::project(self.store.tasks(), self.clock.today())
    }

    pub fn export(&self) -> ExportDocument {
        ExportDocument::new(self.store.tasks(), self.stats, self.clock.now())
    }

    /// Replaces tasks and stats wholesale.
    #[instrument(skip(self, doc), fields(tasks = doc.tasks.len()))]
    pub fn import(&mut self, doc: ExportDocument) {
        self.store = TaskStore::new(doc.tasks);
        self.stats = doc.stats;
        self.save();
    }

    /// Writes tasks and stats; returns the resulting status.
    pub fn save(&mut self) -> SaveStatus {
        let tasks_ok = self.write_tasks();
        let stats_ok = self.write_stats();
        self.mark(tasks_ok && stats_ok)
    }

    fn save_tasks(&mut self) -> SaveStatus {
        let ok = self.write_tasks();
        self.mark(ok)
    }

    fn save_stats(&mut self) -> SaveStatus {
        let ok = self.write_stats();
        self.mark(ok)
    }

    fn write_tasks(&self) -> bool {
        match self.data.save_tasks(self.store.tasks()) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "failed to save tasks; keeping in-memory state");
                false
            }
        }
    }

    fn write_stats(&self) -> bool {
        match self.data.save_stats(&self.stats) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "failed to save stats; keeping in-memory state");
                false
            }
        }
    }

    fn mark(&mut self, ok: bool) -> SaveStatus {
        self.save_status = if ok {
            SaveStatus::Saved
        } else {
            SaveStatus::Degraded
        };
        debug!(status = ?self.save_status, "save point");
        self.save_status
    }
}
