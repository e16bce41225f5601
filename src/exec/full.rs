//! Multiplexing executor: three pipes to the child, a poll-driven read
//! set, resilient tee writes and the stdout byte budget.

use crate::{
    exec, fd,
    fd::Fd,
    filter::MirrorFilter,
    status,
    status::ExitDetails,
    taint, ByteCounts, Capture, Error, ExecResult, ExecuteOptions, READ_CHUNK,
};
use std::io;
use std::os::unix::io::IntoRawFd;
use std::process::Stdio;

/// Outer poll timeout. Kept short so loop-level checks run even while
/// the child is silent.
const POLL_INTERVAL_MS: libc::c_int = 50;

/// Info-level log budget per call, shared across all streams.
const INFO_BUDGET: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamTag {
    ChildStdout,
    ChildStderr,
    CallerStdin,
}

impl StreamTag {
    fn is_child_side(self) -> bool {
        !matches!(self, StreamTag::CallerStdin)
    }

    fn label(self) -> &'static str {
        match self {
            StreamTag::ChildStdout => "stdout",
            StreamTag::ChildStderr => "stderr",
            StreamTag::CallerStdin => "stdin",
        }
    }
}

struct Watched {
    fd: Fd,
    tag: StreamTag,
}

/// Caps info-level diagnostics per call so a wedged descriptor cannot
/// flood the logs.
struct InfoBudget {
    left: u32,
}

impl InfoBudget {
    fn new() -> InfoBudget {
        InfoBudget { left: INFO_BUDGET }
    }

    fn allow(&mut self) -> bool {
        if self.left == 0 {
            return false;
        }
        self.left -= 1;
        true
    }
}

/// Reaps the child on every exit path so no zombie survives the call.
struct Reaper {
    pid: libc::pid_t,
    reaped: bool,
}

impl Reaper {
    fn new(pid: libc::pid_t) -> Reaper {
        Reaper { pid, reaped: false }
    }

    fn reap(&mut self) -> ExitDetails {
        self.reaped = true;
        status::wait_child(self.pid)
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        if !self.reaped {
            status::wait_child(self.pid);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOutcome {
    Done,
    /// This write cycle failed; the next one may succeed.
    Aborted,
    /// The target descriptor is gone for good.
    Closed,
}

/// Writes `buf` in bounded chunks, tolerating partial progress. `EPIPE`
/// and `EBADF` mean the target is permanently gone; any other failure
/// aborts only the current cycle.
fn write_resilient(
    raw: libc::c_int,
    buf: &[u8],
    label: &'static str,
    budget: &mut InfoBudget,
) -> WriteOutcome {
    let mut off = 0;
    while off < buf.len() {
        let end = buf.len().min(off + READ_CHUNK);
        match fd::write_fd(raw, &buf[off..end]) {
            Ok(0) => {
                if budget.allow() {
                    tracing::info!(stream = label, "write made no progress, aborting this cycle");
                }
                return WriteOutcome::Aborted;
            }
            Ok(n) => off += n,
            Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => match err.raw_os_error() {
                Some(libc::EPIPE) | Some(libc::EBADF) => {
                    if budget.allow() {
                        tracing::info!(stream = label, "target closed, disabling writes to it");
                    }
                    return WriteOutcome::Closed;
                }
                _ => {
                    if budget.allow() {
                        tracing::info!(stream = label, error = %err, "write failed, aborting this cycle");
                    }
                    return WriteOutcome::Aborted;
                }
            },
        }
    }
    WriteOutcome::Done
}

pub(crate) fn run(opts: &ExecuteOptions) -> Result<ExecResult, Error> {
    taint::screen(&opts.cmd);

    let mut cmd = exec::build_command(opts);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => return Ok(exec::spawn_failed(opts, &err)),
    };

    let mut reaper = Reaper::new(child.id() as libc::pid_t);

    let mut child_stdin = child
        .stdin
        .take()
        .map(|stdin| Fd::new(stdin.into_raw_fd()));
    let child_stdout = Fd::new(child.stdout.take().expect("stdout was piped").into_raw_fd());
    let child_stderr = Fd::new(child.stderr.take().expect("stderr was piped").into_raw_fd());

    let (mut noisy_stdout, mut noisy_stderr) = exec::mirror_flags(opts);
    let mut budget = InfoBudget::new();
    let mut bytes = ByteCounts::default();

    if let Some(data) = &opts.stdin_str {
        // One burst, then EOF for the child.
        if let Some(stdin_fd) = child_stdin.take() {
            match write_resilient(stdin_fd.as_raw(), data, "child stdin", &mut budget) {
                WriteOutcome::Done => bytes.stdin += data.len() as u64,
                WriteOutcome::Aborted | WriteOutcome::Closed => {
                    tracing::warn!("could not deliver prepared stdin to child");
                }
            }
        }
    }

    let mut watched = vec![
        Watched {
            fd: child_stdout,
            tag: StreamTag::ChildStdout,
        },
        Watched {
            fd: child_stderr,
            tag: StreamTag::ChildStderr,
        },
    ];
    if opts.stdin_str.is_none() && opts.expects_stdin {
        match fd::dup_fd(libc::STDIN_FILENO) {
            Ok(stdin_dup) => watched.push(Watched {
                fd: stdin_dup,
                tag: StreamTag::CallerStdin,
            }),
            Err(err) => tracing::warn!(error = %err, "cannot subscribe to caller stdin"),
        }
    }

    let mut cap_stdout = if opts.is_binary { None } else { Some(Capture::new()) };
    let mut cap_stderr = if opts.is_binary { None } else { Some(Capture::new()) };
    let mut mirror_filter = if opts.is_helper { Some(MirrorFilter::new()) } else { None };
    let mut buf = vec![0u8; READ_CHUNK];
    let mut mirror_buf: Vec<u8> = Vec::new();

    // Caller stdin alone must not keep the loop alive.
    while watched.iter().any(|w| w.tag.is_child_side()) {
        let mut pollfds: Vec<libc::pollfd> = watched
            .iter()
            .map(|w| libc::pollfd {
                fd: w.fd.as_raw(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        let ret = unsafe {
            libc::poll(
                pollfds.as_mut_ptr(),
                pollfds.len() as libc::nfds_t,
                POLL_INTERVAL_MS,
            )
        };
        if ret == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            tracing::warn!(error = %err, "poll failed, abandoning the read set");
            break;
        }
        if ret == 0 {
            continue;
        }

        let mut dead: Vec<libc::c_int> = Vec::new();
        let mut force_close = false;

        'ready: for pollfd in &pollfds {
            let readable = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
            if pollfd.revents & readable == 0 {
                continue;
            }
            let raw = pollfd.fd;
            let tag = match watched.iter().find(|w| w.fd.as_raw() == raw) {
                Some(entry) => entry.tag,
                None => continue,
            };

            // Drain whatever is queued before returning to the outer poll.
            loop {
                let n = match fd::read_fd(raw, &mut buf) {
                    Err(ref err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        if budget.allow() {
                            tracing::info!(stream = tag.label(), error = %err, "read failed, dropping descriptor");
                        }
                        dead.push(raw);
                        break;
                    }
                    Ok(0) => {
                        dead.push(raw);
                        if tag == StreamTag::CallerStdin {
                            // Nothing more to forward; let the child see
                            // EOF as well.
                            child_stdin = None;
                        }
                        break;
                    }
                    Ok(n) => n,
                };
                let chunk = &buf[..n];
                match tag {
                    StreamTag::ChildStderr => {
                        bytes.stderr += n as u64;
                        if let Some(cap) = cap_stderr.as_mut() {
                            cap.push(chunk);
                        }
                        if noisy_stderr {
                            let outcome =
                                write_resilient(libc::STDERR_FILENO, chunk, "stderr", &mut budget);
                            if outcome == WriteOutcome::Closed {
                                noisy_stderr = false;
                            }
                        }
                    }
                    StreamTag::ChildStdout => {
                        bytes.stdout += n as u64;
                        if let Some(cap) = cap_stdout.as_mut() {
                            cap.push(chunk);
                        }
                        if noisy_stdout {
                            let outcome = match mirror_filter.as_mut() {
                                Some(filter) => {
                                    mirror_buf.clear();
                                    filter.feed(chunk, &mut mirror_buf);
                                    if mirror_buf.is_empty() {
                                        WriteOutcome::Done
                                    } else {
                                        write_resilient(
                                            libc::STDOUT_FILENO,
                                            &mirror_buf,
                                            "stdout",
                                            &mut budget,
                                        )
                                    }
                                }
                                None => write_resilient(
                                    libc::STDOUT_FILENO,
                                    chunk,
                                    "stdout",
                                    &mut budget,
                                ),
                            };
                            if outcome == WriteOutcome::Closed {
                                noisy_stdout = false;
                            }
                        }
                        if let Some(limit) = opts.max_stdout_bytes {
                            if bytes.stdout >= limit {
                                force_close = true;
                                break 'ready;
                            }
                        }
                    }
                    StreamTag::CallerStdin => {
                        bytes.stdin += n as u64;
                        let target = child_stdin.as_ref().map(|stdin_fd| stdin_fd.as_raw());
                        match target {
                            Some(raw_stdin) => {
                                let outcome =
                                    write_resilient(raw_stdin, chunk, "child stdin", &mut budget);
                                if outcome == WriteOutcome::Closed {
                                    // Child stopped reading; unsubscribe
                                    // from caller stdin as well.
                                    child_stdin = None;
                                    dead.push(raw);
                                    break;
                                }
                            }
                            None => {
                                dead.push(raw);
                                break;
                            }
                        }
                    }
                }
                // Zero-timeout re-poll: keep reading while more is queued,
                // bounding outer-poll round-trips under a chatty child.
                match fd::poll_in(raw, 0) {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(err) => {
                        if budget.allow() {
                            tracing::info!(stream = tag.label(), error = %err, "re-poll failed, dropping descriptor");
                        }
                        dead.push(raw);
                        break;
                    }
                }
            }

            // Show partial progress lines before their terminator arrives.
            if tag == StreamTag::ChildStdout && noisy_stdout {
                if let Some(filter) = mirror_filter.as_mut() {
                    mirror_buf.clear();
                    filter.flush_partial(&mut mirror_buf);
                    if !mirror_buf.is_empty() {
                        let outcome = write_resilient(
                            libc::STDOUT_FILENO,
                            &mirror_buf,
                            "stdout",
                            &mut budget,
                        );
                        if outcome == WriteOutcome::Closed {
                            noisy_stdout = false;
                        }
                    }
                }
            }
        }

        if force_close {
            // Budget hit: drop every descriptor we own. The child sees
            // EPIPE on its next write and winds down.
            watched.clear();
            child_stdin = None;
            break;
        }
        watched.retain(|w| !dead.contains(&w.fd.as_raw()));
    }

    drop(watched);
    drop(child_stdin);

    let details = reaper.reap();
    Ok(exec::finish(opts, details, cap_stdout, cap_stderr, None, bytes))
}
