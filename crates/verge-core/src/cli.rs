use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((key, value)) if !key.trim().is_empty() => Ok(Self {
                key: key.trim().to_string(),
                value: value.trim().to_string(),
            }),
            _ => Err(anyhow!("expected KEY=VALUE, got: {s}")),
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "verge",
    version,
    about = "Verge: earliest-deadline-first task tracker",
    disable_help_subcommand = true,
    infer_subcommands = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Show fixed and recurring tasks in deadline order.
    List {
        /// Also show tasks due in under three days.
        #[arg(long)]
        critical: bool,
    },
    /// Add a fixed task (--due) or a recurring one (--every).
    Add {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
        #[arg(short = 'd', long)]
        description: Option<String>,
        #[arg(long, conflicts_with = "every")]
        due: Option<String>,
        #[arg(long)]
        every: Option<String>,
    },
    /// Change title, description, deadline or interval.
    Edit {
        id: u64,
        #[arg(long)]
        title: Option<String>,
        #[arg(short = 'd', long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        every: Option<String>,
    },
    /// Complete a task or the current cycle of a recurring task.
    Done { id: u64 },
    /// Remove a task permanently; counts as missed.
    Delete {
        id: u64,
        #[arg(long)]
        yes: bool,
    },
    Info { id: u64 },
    /// Show the completion score.
    Stats {
        #[arg(long)]
        reset: bool,
        #[arg(long)]
        yes: bool,
    },
    /// Write a backup document.
    Export {
        /// Output file; `-` for stdout.
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },
    /// Replace all tasks and stats from a backup document.
    Import {
        file: PathBuf,
        #[arg(long)]
        yes: bool,
    },
    /// Run the daily lifecycle pass now.
    Rollover,
    /// Poll for day changes and roll over when one happens.
    Watch {
        #[arg(long)]
        interval: Option<u64>,
        /// Stop after this many polls.
        #[arg(long)]
        count: Option<u64>,
    },
}

impl Command {
    /// Commands usable as `default.command`.
    pub fn from_default_name(name: &str) -> anyhow::Result<Self> {
        match name.trim() {
            "list" => Ok(Command::List { critical: false }),
            "critical" => Ok(Command::List { critical: true }),
            "stats" => Ok(Command::Stats {
                reset: false,
                yes: false,
            }),
            "rollover" => Ok(Command::Rollover),
            other => Err(anyhow!("unsupported default.command: {other}")),
        }
    }
}

/// `RUST_LOG` wins; otherwise `-q`/`-qq` lower and `-v`/`-vv`/`-vvv` raise the
/// default `warn` level.
pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let level = match (quiet, verbose) {
        (2.., _) => "error",
        (1, _) | (0, 0) => "warn",
        (0, 1) => "info",
        (0, 2) => "debug",
        (0, _) => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow!("invalid log filter: {e}"))?;

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
    if let Err(err) = installed {
        debug!(error = %err, "tracing subscriber already installed");
    }
    Ok(())
}

/// Pulls positional `rc.key=value` overrides out of the argument list before
/// clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut rc_overrides = Vec::new();

    for (idx, arg) in raw.iter().enumerate() {
        let override_pair = (idx > 0)
            .then(|| arg.to_str())
            .flatten()
            .and_then(|text| text.strip_prefix("rc."))
            .and_then(|rest| rest.split_once('='))
            .filter(|(key, _)| !key.is_empty());

        match override_pair {
            Some((key, value)) => {
                debug!(key, value, "positional rc override");
                rc_overrides.push((format!("rc.{key}"), value.to_string()));
            }
            None => cleaned.push(arg.clone()),
        }
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides,
    })
}
