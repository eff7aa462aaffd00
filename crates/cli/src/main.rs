mod cmd;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cmd::{BuildArgs, ResetArgs, StatusArgs, SysdepsArgs};
use output::print_error;

/// mbuild - build module sets from source, preferring system packages
#[derive(Parser)]
#[command(name = "mbuild")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Configuration file (default: <config dir>/mbuild/config.toml)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Module set file, overriding the configured one
  #[arg(long, global = true)]
  moduleset: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Build modules and their dependencies
  Build(BuildArgs),

  /// Check and install system dependencies
  Sysdeps(SysdepsArgs),

  /// Show recorded build progress
  Status(StatusArgs),

  /// Forget build progress so modules are rebuilt from scratch
  Reset(ResetArgs),
}

fn main() -> ExitCode {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  match run(cli) {
    Ok(code) => code,
    Err(e) => {
      print_error(&format!("{:#}", e));
      ExitCode::FAILURE
    }
  }
}

fn init_tracing(verbose: bool) {
  let default = if verbose { "debug" } else { "warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
  let session = cmd::Session::load(cli.config.as_deref(), cli.moduleset)?;

  match cli.command {
    Commands::Build(args) => cmd::cmd_build(&session, args),
    Commands::Sysdeps(args) => cmd::cmd_sysdeps(&session, args),
    Commands::Status(args) => cmd::cmd_status(&session, args, cli.verbose),
    Commands::Reset(args) => cmd::cmd_reset(&session, args),
  }
}
