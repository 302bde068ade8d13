pub mod cli;
pub mod commands;
pub mod config;
pub mod dashboard;
pub mod debounce;
pub mod error;
pub mod form;
pub mod gateway;
pub mod mutation;
pub mod render;
pub mod session;
pub mod shell;
pub mod stats;
pub mod view;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
pub use commands::requires_login;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting tasklane CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.rc_file.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let session =
    session::Session::open(&data_dir)
      .with_context(|| {
        format!(
          "failed to open session in {}",
          data_dir.display()
        )
      })?;

  let gateway =
    Arc::new(gateway::HttpGateway::new(
      &cfg.api_url(),
      cfg.api_timeout()?,
      session.clone()
    )?);

  let renderer =
    render::Renderer::new(&cfg)?;
  let inv =
    cli::Invocation::parse(cli.rest)?;

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  let mut ctx = commands::Context {
    cfg,
    session,
    gateway,
    renderer
  };
  runtime.block_on(commands::dispatch(
    &mut ctx, inv
  ))?;

  info!("done");
  Ok(())
}
