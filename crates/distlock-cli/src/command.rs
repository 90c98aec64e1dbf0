//! `distlock run`: execute a command while holding a lock
//!
//! Exit codes:
//! - the command's own exit code when it ran
//! - 0 when the lock stayed busy and `--require` was not given
//! - 75 (`EX_TEMPFAIL`) when the lock stayed busy and `--require` was given
//! - 130 when the wait was cancelled by Ctrl+C or SIGTERM
//! - 1 for any other failure

use std::io;
use std::process::ExitStatus;

use distlock_core::{CancellationToken, DistributedLockService, LockError, LockOptions};
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::{self, RunArgs};
use crate::startup::cancel_on_shutdown;

/// Lock stayed busy and the caller required it
pub const EXIT_CONTENDED: u8 = 75;

/// Wait cancelled by a signal
pub const EXIT_CANCELLED: u8 = 130;

/// Generic failure
pub const EXIT_FAILURE: u8 = 1;

/// How a run ended
#[derive(Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// The command ran; carries its exit code
    Completed(u8),
    /// Lock busy, command skipped
    Skipped,
    /// Lock busy with `--require`
    Contended,
    /// Wait cancelled
    Cancelled,
}

impl RunOutcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            RunOutcome::Completed(code) => *code,
            RunOutcome::Skipped => 0,
            RunOutcome::Contended => EXIT_CONTENDED,
            RunOutcome::Cancelled => EXIT_CANCELLED,
        }
    }
}

/// Load configuration, connect to the nodes and run the command.
pub async fn run(args: RunArgs) -> anyhow::Result<RunOutcome> {
    let config = config::load(&args)?;
    let stores = distlock_redis::connect_all(&config)?;
    let service = DistributedLockService::from_config(&config, stores)?;
    let options = config::run_options(&config);
    let cancel = cancel_on_shutdown();

    execute(&service, &args.key, &args.command, options, args.require, &cancel).await
}

/// Run `command` under `key` on an already built service.
///
/// Without `require` the fire-and-forget path is used and a busy lock skips
/// the command; with `require` the result-returning path reports it.
pub async fn execute(
    service: &DistributedLockService,
    key: &str,
    command: &[String],
    options: LockOptions,
    require: bool,
    cancel: &CancellationToken,
) -> anyhow::Result<RunOutcome> {
    let result = if require {
        service
            .call_future_with_lock(key, spawn(command), options, cancel)
            .await
            .map(Some)
    } else {
        let mut status = None;
        let ran = service
            .run_future_with_lock(key, async { status = Some(spawn(command).await) }, options, cancel)
            .await;
        ran.map(|()| status)
    };

    match result {
        Ok(Some(status)) => {
            let code = exit_code(status?);
            info!(key = %key, code, "Command finished under lock");
            Ok(RunOutcome::Completed(code))
        }
        Ok(None) => {
            info!(key = %key, "Lock busy, command skipped");
            Ok(RunOutcome::Skipped)
        }
        Err(LockError::LockContended { key }) => {
            warn!(key = %key, "Lock busy, giving up");
            Ok(RunOutcome::Contended)
        }
        Err(LockError::Cancelled { key }) => {
            warn!(key = %key, "Lock wait cancelled");
            Ok(RunOutcome::Cancelled)
        }
        Err(e) => Err(e.into()),
    }
}

async fn spawn(command: &[String]) -> io::Result<ExitStatus> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "no command given"))?;

    Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| io::Error::new(e.kind(), format!("failed to run '{}': {}", program, e)))
}

fn exit_code(status: ExitStatus) -> u8 {
    if let Some(code) = status.code() {
        return u8::try_from(code).unwrap_or(EXIT_FAILURE);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        // Shell convention for a child killed by a signal
        if let Some(signal) = status.signal() {
            return u8::try_from(128 + signal).unwrap_or(EXIT_FAILURE);
        }
    }

    EXIT_FAILURE
}
