//! Dispatch and shared outcome assembly.

mod full;
mod simple;

use crate::{
    status::ExitDetails, taint, ByteCounts, Capture, Error, ExecResult, ExecuteOptions, Verdict,
    DEBUG_ENV,
};
use std::process;

/// Runs `opts` through the multiplexing executor, or the `system` bypass
/// when requested.
pub fn execute(opts: &ExecuteOptions) -> Result<ExecResult, Error> {
    validate(opts)?;
    if opts.system {
        return run_system(opts);
    }
    full::run(opts)
}

/// Runs `opts` through the merged-output bulk reader: no tee, no stdin
/// forwarding, one pipe drained with large reads. The cheaper choice
/// when throughput matters.
pub fn execute_simple(opts: &ExecuteOptions) -> Result<ExecResult, Error> {
    validate(opts)?;
    simple::run(opts)
}

fn validate(opts: &ExecuteOptions) -> Result<(), Error> {
    if opts.cmd.is_empty() {
        return Err(Error::Options("empty command"));
    }
    if opts.is_helper && opts.is_binary {
        return Err(Error::Options("is_helper and is_binary are incompatible"));
    }
    Ok(())
}

/// Resolves the two mirror flags: `is_binary` and the debug environment
/// variable force both on.
pub(crate) fn mirror_flags(opts: &ExecuteOptions) -> (bool, bool) {
    let debug = std::env::var_os(DEBUG_ENV).map_or(false, |value| !value.is_empty());
    if opts.is_binary || debug {
        (true, true)
    } else {
        (opts.noisy_stdout, opts.noisy_stderr)
    }
}

pub(crate) fn build_command(opts: &ExecuteOptions) -> process::Command {
    let mut cmd = process::Command::new(&opts.cmd[0]);
    cmd.args(&opts.cmd[1..]);
    for (key, value) in &opts.env {
        cmd.env(key, value);
    }
    if let Some(dir) = &opts.cwd {
        cmd.current_dir(dir);
    }
    cmd
}

/// Outcome for a spawn that never produced a child.
pub(crate) fn spawn_failed(opts: &ExecuteOptions, err: &std::io::Error) -> ExecResult {
    tracing::warn!(cmd = ?opts.cmd[0], error = %err, "unable to launch command");
    ExecResult {
        verdict: Verdict::ExecFailed,
        message: format!("failed to execute ({})", err),
        raw: None,
        code: None,
        status: None,
        signal: None,
        coredump: false,
        stdout: None,
        stderr: None,
        output: None,
        bytes: ByteCounts::default(),
    }
}

/// Assembles the outcome record once the child was reaped.
pub(crate) fn finish(
    opts: &ExecuteOptions,
    details: ExitDetails,
    stdout: Option<Capture>,
    stderr: Option<Capture>,
    output: Option<Vec<u8>>,
    bytes: ByteCounts,
) -> ExecResult {
    let verdict = match details.status {
        Some(0) | None => Verdict::Ok,
        Some(_) if opts.must_succeed => Verdict::ErrNonZeroExit,
        Some(_) => Verdict::OkNonZeroExit,
    };
    ExecResult {
        verdict,
        message: details.message,
        raw: Some(details.raw),
        code: details.code,
        status: details.status,
        signal: details.signal,
        coredump: details.coredump,
        stdout,
        stderr,
        output,
        bytes,
    }
}

fn run_system(opts: &ExecuteOptions) -> Result<ExecResult, Error> {
    use std::os::unix::process::ExitStatusExt;

    taint::screen(&opts.cmd);
    let mut cmd = build_command(opts);
    let exit = match cmd.status() {
        Ok(exit) => exit,
        Err(err) => return Ok(spawn_failed(opts, &err)),
    };
    let details = crate::status::decode_wait_status(exit.into_raw());
    Ok(finish(opts, details, None, None, None, ByteCounts::default()))
}
