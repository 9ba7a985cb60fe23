pub mod app;
pub mod backend;
pub mod classify;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod error;
pub mod group;
pub mod memory;
pub mod notify;
pub mod render;
pub mod store;
pub mod sync;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli =
    cli::GlobalCli::parse_from(raw_args);

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting scaletrack CLI"
  );

  let mut cfg = config::Config::load(
    cli.config.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  )?;
  if let Some(owner) = cli.owner {
    cfg.owner = Some(owner);
  }
  debug!(?cfg, "resolved configuration");

  let clock = cfg.clock()?;
  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let backend = Arc::new(
    datastore::FileBackend::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?
  );

  let store = Arc::new(
    store::TaskStore::new(
      backend.clone(),
      cfg.session()
    )
    .with_limit(cfg.upcoming_limit)
  );
  let app = app::App {
    backend,
    commands: commands::TaskCommands::new(
      store,
      Arc::new(notify::TracingNotifier)
    ),
    clock,
    renderer: render::Renderer::detect()
  };

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async \
         runtime"
      )?;

  runtime.block_on(app.dispatch(
    cli
      .command
      .unwrap_or(cli::Command::Upcoming)
  ))?;

  info!("done");
  Ok(())
}
