pub mod cli;
pub mod clock;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod error;
pub mod lifecycle;
pub mod render;
pub mod schedule;
pub mod session;
pub mod stats;
pub mod store;
pub mod task;
pub mod transfer;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

pub use error::{Error, Result};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;
    info!(verbose = cli.verbose, quiet = cli.quiet, "starting verge");
    debug!(?pre.rc_overrides, "positional rc overrides");

    let mut cfg = config::Config::load(cli.config.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;
    let backend = datastore::FileBackend::open(&data_dir)
        .with_context(|| format!("failed to open datastore at {}", data_dir.display()))?;
    let mut session = session::Session::open(datastore::DataStore::new(backend), clock::SystemClock);
    let renderer = render::Renderer::new(&cfg)?;

    let command = match cli.command {
        Some(command) => command,
        None => {
            let name = cfg.get("default.command").unwrap_or_else(|| "list".to_string());
            debug!(command = %name, "no explicit command, using default");
            cli::Command::from_default_name(&name)?
        }
    };

    let mut stdout = std::io::stdout().lock();
    commands::dispatch(&mut session, &cfg, &renderer, command, &mut stdout)?;

    info!("done");
    Ok(())
}
