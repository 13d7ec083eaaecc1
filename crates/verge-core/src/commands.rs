use std::fs;
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument};

use crate::cli::Command;
use crate::clock::{Clock, format_display_date, parse_date_expr};
use crate::config::Config;
use crate::datastore::Backend;
use crate::error::Error;
use crate::lifecycle::IntervalTicker;
use crate::render::Renderer;
use crate::session::Session;
use crate::stats::Outcome;
use crate::store::{Completion, TaskDraft, TaskPatch};
use crate::task::{Interval, TaskType};
use crate::transfer::{self, parse_import};

const DEFAULT_WATCH_INTERVAL_SECS: u64 = 60;

/// Runs one command against an open session. Output goes to `out`;
/// confirmations are read from stdin unless `--yes` was given.
#[instrument(skip(session, cfg, renderer, out))]
pub fn dispatch<B, C, W>(
    session: &mut Session<B, C>,
    cfg: &Config,
    renderer: &Renderer,
    command: Command,
    out: &mut W,
) -> anyhow::Result<()>
where
    B: Backend,
    C: Clock,
    W: Write,
{
    let report = session.start();
    debug!(?report, "start-of-run rollover");

    match command {
        Command::List { critical } => cmd_list(session, renderer, critical, out),
        Command::Add {
            title,
            description,
            due,
            every,
        } => cmd_add(session, renderer, &title.join(" "), description, due, every, out),
        Command::Edit {
            id,
            title,
            description,
            due,
            every,
        } => cmd_edit(session, renderer, id, title, description, due, every, out),
        Command::Done { id } => cmd_done(session, renderer, id, out),
        Command::Delete { id, yes } => cmd_delete(session, renderer, id, yes, out),
        Command::Info { id } => cmd_info(session, renderer, id, out),
        Command::Stats { reset, yes } => cmd_stats(session, renderer, reset, yes, out),
        Command::Export { output } => cmd_export(session, output.as_deref(), out),
        Command::Import { file, yes } => cmd_import(session, renderer, &file, yes, out),
        Command::Rollover => {
            // The start-of-run pass already did the work.
            renderer.print_rollover(out, &report)
        }
        Command::Watch { interval, count } => cmd_watch(session, cfg, renderer, interval, count, out),
    }
}

fn cmd_list<B: Backend, C: Clock, W: Write>(
    session: &Session<B, C>,
    renderer: &Renderer,
    critical: bool,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command list");
    let view = session.projection();
    renderer.print_projection(out, &view, critical)?;
    let stats = session.stats();
    writeln!(out)?;
    writeln!(out, "Completion score {}%", stats.completion_score())?;
    Ok(())
}

fn cmd_add<B: Backend, C: Clock, W: Write>(
    session: &mut Session<B, C>,
    renderer: &Renderer,
    title: &str,
    description: Option<String>,
    due: Option<String>,
    every: Option<String>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command add");
    let today = session.clock().today();

    let draft = match (due, every) {
        (_, Some(every)) => TaskDraft {
            title: title.to_string(),
            description: String::new(),
            task_type: TaskType::Recurring,
            deadline: None,
            interval: Some(every.parse::<Interval>()?),
        },
        (due, None) => TaskDraft {
            title: title.to_string(),
            description: String::new(),
            task_type: TaskType::Fixed,
            deadline: due.as_deref().map(|raw| parse_date_expr(raw, today)).transpose()?,
            interval: None,
        },
    }
    .with_description(description.unwrap_or_default());

    let task = session.create(draft)?;
    writeln!(
        out,
        "Created task {} due {}.",
        task.id,
        format_display_date(task.deadline)
    )?;
    renderer.print_save_status(out, session.save_status())
}

#[allow(clippy::too_many_arguments)]
fn cmd_edit<B: Backend, C: Clock, W: Write>(
    session: &mut Session<B, C>,
    renderer: &Renderer,
    id: u64,
    title: Option<String>,
    description: Option<String>,
    due: Option<String>,
    every: Option<String>,
    out: &mut W,
) -> anyhow::Result<()> {
    info!(id, "command edit");
    let today = session.clock().today();

    let patch = TaskPatch {
        title,
        description,
        deadline: due.as_deref().map(|raw| parse_date_expr(raw, today)).transpose()?,
        interval: every.as_deref().map(str::parse::<Interval>).transpose()?,
    };
    if patch.is_empty() {
        return Err(anyhow!("edit needs at least one of --title, --description, --due, --every"));
    }

    let task = session.update(id, patch)?;
    writeln!(out, "Updated task {}.", task.id)?;
    renderer.print_save_status(out, session.save_status())
}

fn cmd_done<B: Backend, C: Clock, W: Write>(
    session: &mut Session<B, C>,
    renderer: &Renderer,
    id: u64,
    out: &mut W,
) -> anyhow::Result<()> {
    info!(id, "command done");
    let completion = session.complete(id)?;
    let timing = match completion.outcome() {
        Outcome::OnTime => "on time",
        Outcome::Missed => "late",
    };

    match completion {
        Completion::Removed { task, .. } => {
            writeln!(out, "Completed {} ({timing}) and removed it.", task.title)?;
        }
        Completion::Cycled {
            interval,
            next_deadline,
            ..
        } => {
            writeln!(
                out,
                "Completed ({timing}). Will reappear {}, due {}.",
                interval.reappears_text(),
                format_display_date(next_deadline)
            )?;
        }
    }
    renderer.print_save_status(out, session.save_status())
}

fn cmd_delete<B: Backend, C: Clock, W: Write>(
    session: &mut Session<B, C>,
    renderer: &Renderer,
    id: u64,
    yes: bool,
    out: &mut W,
) -> anyhow::Result<()> {
    info!(id, "command delete");
    let task = session.find(id).ok_or(Error::NotFound(id))?;
    let prompt = if task.is_fixed() {
        format!("Delete \"{}\" permanently?", task.title)
    } else {
        format!(
            "Delete recurring task \"{}\" permanently? It will not reappear.",
            task.title
        )
    };
    if !yes && !confirm(&prompt)? {
        writeln!(out, "Delete cancelled.")?;
        return Ok(());
    }

    let task = session.delete(id)?;
    let noun = if task.is_fixed() {
        "Task"
    } else {
        "Recurring task"
    };
    writeln!(out, "{noun} {} permanently deleted.", task.id)?;
    renderer.print_save_status(out, session.save_status())
}

fn cmd_info<B: Backend, C: Clock, W: Write>(
    session: &Session<B, C>,
    renderer: &Renderer,
    id: u64,
    out: &mut W,
) -> anyhow::Result<()> {
    let task = session.find(id).ok_or(Error::NotFound(id))?;
    renderer.print_task_info(out, task, session.clock().today())
}

fn cmd_stats<B: Backend, C: Clock, W: Write>(
    session: &mut Session<B, C>,
    renderer: &Renderer,
    reset: bool,
    yes: bool,
    out: &mut W,
) -> anyhow::Result<()> {
    if reset {
        if !yes && !confirm("Reset all completion statistics to zero?")? {
            writeln!(out, "Reset cancelled.")?;
            return Ok(());
        }
        session.reset_stats();
        writeln!(out, "Completion statistics reset.")?;
        renderer.print_save_status(out, session.save_status())?;
    }
    renderer.print_stats(out, &session.stats())
}

#[instrument(skip(session, out))]
fn cmd_export<B: Backend, C: Clock, W: Write>(
    session: &Session<B, C>,
    output: Option<&Path>,
    out: &mut W,
) -> anyhow::Result<()> {
    let doc = session.export();
    let json = doc.to_json()?;

    match output {
        Some(path) if path == Path::new("-") => {
            writeln!(out, "{json}")?;
        }
        _ => {
            let path = output.map(Path::to_path_buf).unwrap_or_else(|| {
                transfer::default_file_name(session.clock().today()).into()
            });
            fs::write(&path, format!("{json}\n"))
                .with_context(|| format!("failed writing {}", path.display()))?;
            writeln!(out, "Exported {} tasks to {}.", doc.tasks.len(), path.display())?;
        }
    }
    Ok(())
}

#[instrument(skip(session, renderer, out))]
fn cmd_import<B: Backend, C: Clock, W: Write>(
    session: &mut Session<B, C>,
    renderer: &Renderer,
    file: &Path,
    yes: bool,
    out: &mut W,
) -> anyhow::Result<()> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("failed reading {}", file.display()))?;
    let doc = parse_import(&raw)?;

    let prompt = format!(
        "This will replace your current data with {} tasks. Continue?",
        doc.tasks.len()
    );
    if !yes && !confirm(&prompt)? {
        writeln!(out, "Import cancelled.")?;
        return Ok(());
    }

    let count = doc.tasks.len();
    session.import(doc);
    writeln!(out, "Imported {count} tasks.")?;
    renderer.print_save_status(out, session.save_status())
}

fn cmd_watch<B: Backend, C: Clock, W: Write>(
    session: &mut Session<B, C>,
    cfg: &Config,
    renderer: &Renderer,
    interval: Option<u64>,
    count: Option<u64>,
    out: &mut W,
) -> anyhow::Result<()> {
    let secs = match interval {
        Some(secs) => secs,
        None => cfg
            .get_u64("watch.interval")?
            .unwrap_or(DEFAULT_WATCH_INTERVAL_SECS),
    };
    if secs == 0 {
        return Err(anyhow!("watch interval must be at least one second"));
    }
    info!(secs, ?count, "command watch");

    let mut ticker = IntervalTicker::new(Duration::from_secs(secs));
    if let Some(count) = count {
        ticker = ticker.limit(count);
    }
    let mut failure = None;
    session.watch(&mut ticker, |session, report| {
        if failure.is_some() {
            return;
        }
        let printed = writeln!(out, "{}:", session.clock().today())
            .map_err(anyhow::Error::from)
            .and_then(|()| renderer.print_rollover(out, &report))
            .and_then(|()| out.flush().map_err(anyhow::Error::from));
        if let Err(err) = printed {
            failure = Some(err);
        }
    });
    failure.map_or(Ok(()), Err)
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    let mut stderr = io::stderr().lock();
    write!(stderr, "{prompt} (yes/no) ")?;
    stderr.flush()?;

    let mut answer = String::new();
    io::stdin()
        .lock()
        .read_line(&mut answer)
        .context("failed reading confirmation")?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
