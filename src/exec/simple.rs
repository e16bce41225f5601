//! Merged-output executor: one pipe, bulk reads, blocking wait.

use crate::{
    exec, fd::Fd, pipe, status, taint, ByteCounts, Error, ExecResult, ExecuteOptions, READ_CHUNK,
};
use std::fs::File;
use std::io;
use std::os::unix::io::FromRawFd;
use std::process::Stdio;

pub(crate) fn run(opts: &ExecuteOptions) -> Result<ExecResult, Error> {
    taint::screen(&opts.cmd);

    let (merged_rx, merged_tx) = pipe::setup_pipe()?;
    let stderr_tx = merged_tx.duplicate()?;

    let mut cmd = exec::build_command(opts);
    cmd.stdin(Stdio::piped());
    cmd.stdout(stdio_from(merged_tx));
    cmd.stderr(stdio_from(stderr_tx));

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => return Ok(exec::spawn_failed(opts, &err)),
    };
    // The parent's copies of the write end live inside `cmd`; they must
    // go away or the drain below never sees EOF.
    drop(cmd);
    // The child gets no input on this path.
    drop(child.stdin.take());

    let mut output = Vec::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match merged_rx.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => output.extend_from_slice(&buf[..n]),
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::warn!(error = %err, "read from merged output failed, aborting drain");
                break;
            }
        }
    }
    drop(merged_rx);

    let details = status::wait_child(child.id() as libc::pid_t);
    let bytes = ByteCounts {
        stdout: output.len() as u64,
        ..ByteCounts::default()
    };
    Ok(exec::finish(opts, details, None, None, Some(output), bytes))
}

fn stdio_from(fd: Fd) -> Stdio {
    // Safety: ownership of the descriptor transfers into the File.
    Stdio::from(unsafe { File::from_raw_fd(fd.into_raw()) })
}
