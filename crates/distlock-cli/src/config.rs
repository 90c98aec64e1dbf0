//! Command line and configuration loading for the `distlock` binary
//!
//! Lock settings are layered, later sources winning:
//! built-in defaults, the config file, `DISTLOCK_*` environment variables,
//! then command line flags.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use config::{Config, Environment, File};
use distlock_core::{LockConfig, LockOptions};

/// Default config file, optional
pub const DEFAULT_CONFIG_FILE: &str = "conf/distlock.yml";

/// Prefix of the environment variables read into `LockConfig`
pub const ENV_PREFIX: &str = "DISTLOCK";

/// Command line arguments
#[derive(Debug, Parser)]
#[command(name = "distlock", version, about = "Run commands under a distributed lock")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a command while holding a lock
    Run(RunArgs),
}

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Lock key shared by every process that must not run concurrently
    #[arg(short = 'k', long = "key")]
    pub key: String,

    /// Lock ttl in seconds
    #[arg(long = "ttl")]
    pub ttl: Option<u64>,

    /// Maximum time to wait for the lock, in seconds
    #[arg(long = "wait")]
    pub wait: Option<u64>,

    /// Pause between acquisition attempts, in seconds
    #[arg(long = "retry")]
    pub retry: Option<u64>,

    /// Storage node address, repeat for each node
    #[arg(short = 'n', long = "node")]
    pub nodes: Vec<String>,

    /// Config file
    #[arg(short = 'c', long = "config", env = "DISTLOCK_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Write lock counters in Prometheus text format to this file on exit
    #[arg(long = "metrics-file", env = "DISTLOCK_METRICS_FILE")]
    pub metrics_file: Option<PathBuf>,

    /// Fail with exit code 75 instead of skipping when the lock is busy
    #[arg(long = "require")]
    pub require: bool,

    /// Command to run and its arguments
    #[arg(required = true, last = true, num_args = 1..)]
    pub command: Vec<String>,
}

/// Load the lock configuration for `args` from the process environment.
pub fn load(args: &RunArgs) -> anyhow::Result<LockConfig> {
    load_with_env(args, environment())
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("nodes")
}

/// Load the lock configuration for `args` with an explicit environment source.
pub fn load_with_env(args: &RunArgs, env: Environment) -> anyhow::Result<LockConfig> {
    let mut builder = Config::builder()
        .add_source(File::from(args.config.as_path()).required(false))
        .add_source(env);

    if !args.nodes.is_empty() {
        builder = builder.set_override("nodes", args.nodes.clone())?;
    }
    if let Some(ttl) = args.ttl {
        builder = builder.set_override("ttl_ms", secs_to_millis(ttl))?;
    }
    if let Some(wait) = args.wait {
        builder = builder.set_override("wait_ms", secs_to_millis(wait))?;
    }
    if let Some(retry) = args.retry {
        builder = builder.set_override("retry_ms", secs_to_millis(retry))?;
    }

    let config: LockConfig = builder.build()?.try_deserialize()?;
    config.validate()?;
    if config.nodes.is_empty() {
        anyhow::bail!(
            "no lock nodes configured: pass --node, set {}_NODES or list nodes in {}",
            ENV_PREFIX,
            args.config.display()
        );
    }
    Ok(config)
}

/// Lock options for one run, taken from the merged configuration
pub fn run_options(config: &LockConfig) -> LockOptions {
    config.default_options()
}

fn secs_to_millis(secs: u64) -> u64 {
    secs.saturating_mul(1000)
}
