use std::io::{self, IsTerminal, Write};

use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::clock::format_display_date;
use crate::config::Config;
use crate::lifecycle::RolloverReport;
use crate::schedule::{Projection, Urgency, is_critical};
use crate::session::SaveStatus;
use crate::stats::Stats;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    /// Colour follows the `color` setting, and only ever applies to a
    /// terminal.
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let wanted = cfg.get_switch("color")?.unwrap_or(true);
        Ok(Self {
            color: wanted && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all)]
    pub fn print_projection<W: Write>(
        &self,
        out: &mut W,
        view: &Projection<'_>,
        show_critical: bool,
    ) -> anyhow::Result<()> {
        let counts = view.counts();
        writeln!(
            out,
            "Fixed {}  Recurring {}  Critical {}",
            counts.fixed, counts.recurring, counts.critical
        )?;

        if show_critical && !view.critical.is_empty() {
            writeln!(out)?;
            writeln!(out, "{}", self.paint("Critical", "1;31"))?;
            self.print_task_table(out, &view.critical, view.today)?;
        }

        writeln!(out)?;
        writeln!(out, "{}", self.paint("Fixed deadlines", "1"))?;
        self.print_task_table(out, &view.fixed, view.today)?;

        writeln!(out)?;
        writeln!(out, "{}", self.paint("Recurring", "1"))?;
        self.print_task_table(out, &view.recurring, view.today)?;
        Ok(())
    }

    pub fn print_task_table<W: Write>(
        &self,
        out: &mut W,
        tasks: &[&Task],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks yet")?;
            return Ok(());
        }

        let headers = vec![
            "#".to_string(),
            "ID".to_string(),
            "Title".to_string(),
            "Deadline".to_string(),
            "Urgency".to_string(),
            "Type".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for (idx, task) in tasks.iter().enumerate() {
            let urgency = Urgency::for_deadline(task.deadline, today);
            let position = (idx + 1).to_string();
            let position = if is_critical(task, today) {
                self.paint(&position, "31")
            } else {
                position
            };

            rows.push(vec![
                position,
                self.paint(&task.id.to_string(), "33"),
                task.title.clone(),
                format_display_date(task.deadline),
                self.paint_urgency(urgency),
                task.type_label(),
            ]);
        }

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip_all, fields(id = task.id))]
    pub fn print_task_info<W: Write>(
        &self,
        out: &mut W,
        task: &Task,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        writeln!(out, "id          {}", task.id)?;
        writeln!(out, "title       {}", task.title)?;
        if !task.description.is_empty() {
            writeln!(out, "description {}", task.description)?;
        }
        writeln!(out, "type        {}", task.type_label())?;
        writeln!(out, "deadline    {}", format_display_date(task.deadline))?;
        writeln!(
            out,
            "urgency     {}",
            self.paint_urgency(Urgency::for_deadline(task.deadline, today))
        )?;
        if let Some(done) = task.completed_today() {
            writeln!(out, "completed   {}", done.format("%Y-%m-%d"))?;
        }
        writeln!(out, "created     {}", task.created_at.format("%Y-%m-%dT%H:%M:%SZ"))?;
        Ok(())
    }

    pub fn print_stats<W: Write>(&self, out: &mut W, stats: &Stats) -> anyhow::Result<()> {
        writeln!(out, "Completion score  {}%", stats.completion_score())?;
        writeln!(out, "On time           {}", stats.completed_on_time)?;
        writeln!(out, "Missed or deleted {}", stats.deleted_or_expired)?;
        writeln!(out, "Total finished    {}", stats.total_finished)?;
        Ok(())
    }

    pub fn print_rollover<W: Write>(&self, out: &mut W, report: &RolloverReport) -> anyhow::Result<()> {
        writeln!(
            out,
            "Revealed {}, advanced {}, expired {}.",
            report.revealed, report.advanced, report.expired
        )?;
        Ok(())
    }

    pub fn print_save_status<W: Write>(&self, out: &mut W, status: SaveStatus) -> anyhow::Result<()> {
        if status == SaveStatus::Degraded {
            writeln!(out, "{}", self.paint("Save failed; changes kept in memory only.", "31"))?;
        }
        Ok(())
    }

    fn paint_urgency(&self, urgency: Urgency) -> String {
        let code = match urgency {
            Urgency::Overdue(_) | Urgency::DueToday => "1;31",
            Urgency::Warning(_) => "33",
            Urgency::Caution(_) => "36",
            Urgency::Safe(_) => "32",
        };
        self.paint(&urgency.to_string(), code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::schedule::project;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn table_shows_urgency_and_type() {
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().expect("valid now");
        let tasks = vec![Task::new_fixed(1, "Pay rent".into(), date(2024, 1, 10), created)];
        let view = project(&tasks, date(2024, 1, 9));

        let mut out = Vec::new();
        Renderer::plain()
            .print_projection(&mut out, &view, true)
            .expect("render");
        let text = String::from_utf8(out).expect("utf8");

        assert!(text.contains("Critical 1"));
        assert!(text.contains("Pay rent"));
        assert!(text.contains("Jan 10, 2024"));
        assert!(text.contains("1 days left"));
        assert!(text.contains("Fixed Deadline"));
        assert!(text.contains("No tasks yet"));
    }

    #[test]
    fn strip_ansi_measures_visible_text() {
        assert_eq!(strip_ansi("\x1b[31mlate\x1b[0m"), "late");
    }
}
