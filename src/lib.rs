/*!
 * This crate runs a child command and shuttles bytes between the caller's
 * standard streams and the child's: output is captured, optionally
 * mirrored back to the caller's terminal, budgeted, and the child's exit
 * is reported as one structured record.
 *
 * The multiplexed path ([`execute`]) drives up to four descriptors with
 * `poll` and understands in-band `JSON_START`/`JSON_END` helper
 * envelopes; [`execute_simple`] trades tee and stdin forwarding for bulk
 * reads on a single merged pipe.
 */

mod command;
pub mod envelope;
mod error;
mod exec;
mod fd;
mod filter;
mod pipe;
pub mod status;
mod taint;

pub use command::Command;
pub use envelope::{HelperError, HelperReply, JSON_END, JSON_START};
pub use error::Error;
pub use exec::{execute, execute_simple};
pub use status::ExitDetails;

use std::borrow::Cow;
use std::ffi::OsString;
use std::path::PathBuf;

/// Environment variable forcing both mirror flags on when set non-empty.
pub const DEBUG_ENV: &str = "FERRY_DEBUG";

/// Size of one `read` from a child pipe. A capped stdout may overshoot
/// its budget by at most this much.
pub const READ_CHUNK: usize = 65_535;

/// What to run and how to shuttle its bytes.
///
/// `cmd` is an argv vector; the first token is the executable and no
/// shell is involved. Everything else defaults to off.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub cmd: Vec<OsString>,
    /// Forward caller stdin to the child until EOF on either side.
    /// Loses to `stdin_str` when both are set.
    pub expects_stdin: bool,
    /// Fixed bytes written to child stdin in one burst before the
    /// multiplex loop starts; child stdin is closed afterwards.
    pub stdin_str: Option<Vec<u8>>,
    /// Mirror captured child stdout to caller stdout.
    pub noisy_stdout: bool,
    /// Mirror captured child stderr to caller stderr.
    pub noisy_stderr: bool,
    /// Redact helper envelopes from the mirrored stdout stream.
    /// Capture is unaffected.
    pub is_helper: bool,
    /// Stream binary output: forces both mirrors on and suppresses
    /// capture, leaving only byte counts and exit information.
    pub is_binary: bool,
    /// Promote a non-zero exit to an error verdict.
    pub must_succeed: bool,
    /// Tear the child down once this many stdout bytes were seen.
    pub max_stdout_bytes: Option<u64>,
    /// Fire-and-wait with inherited descriptors, bypassing the multiplex
    /// loop entirely.
    pub system: bool,
    /// Extra environment for the child, on top of the caller's.
    pub env: Vec<(OsString, OsString)>,
    /// Child working directory.
    pub cwd: Option<PathBuf>,
}

/// Outcome kind of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Child exited 0, or was signalled (`signal` carries the detail).
    Ok,
    /// Non-zero exit, tolerated.
    OkNonZeroExit,
    /// Non-zero exit under `must_succeed`.
    ErrNonZeroExit,
    /// The spawn itself failed; there was no child to reap.
    ExecFailed,
    /// Helper mode: no envelope captured.
    HelperReturnEmpty,
    /// Helper mode: envelope captured but not decodable.
    HelperReturnInvalid,
}

impl Verdict {
    /// Canonical wire code, as helpers and logs spell it.
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Ok => "OK",
            Verdict::OkNonZeroExit => "OK_NON_ZERO_EXIT",
            Verdict::ErrNonZeroExit => "ERR_NON_ZERO_EXIT",
            Verdict::ExecFailed => "ERR_EXEC_FAILED",
            Verdict::HelperReturnEmpty => "ERR_HELPER_RETURN_EMPTY",
            Verdict::HelperReturnInvalid => "ERR_HELPER_RETURN_INVALID",
        }
    }

    pub fn is_err(self) -> bool {
        matches!(
            self,
            Verdict::ErrNonZeroExit
                | Verdict::ExecFailed
                | Verdict::HelperReturnEmpty
                | Verdict::HelperReturnInvalid
        )
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl serde::Serialize for Verdict {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Bytes observed on each stream during one execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ByteCounts {
    pub stdin: u64,
    pub stdout: u64,
    pub stderr: u64,
}

/// Captured output of one stream, byte-exact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capture(Vec<u8>);

impl Capture {
    pub(crate) fn new() -> Capture {
        Capture::default()
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) {
        self.0.extend_from_slice(chunk);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Splits on the line terminator. Joining the lines back with `"\n"`
    /// (plus the trailing terminator, when the capture ends in one)
    /// reproduces the captured bytes exactly.
    pub fn lines(&self) -> Vec<&[u8]> {
        if self.0.is_empty() {
            return Vec::new();
        }
        let mut lines: Vec<&[u8]> = self.0.split(|&byte| byte == b'\n').collect();
        if self.0.ends_with(b"\n") {
            lines.pop();
        }
        lines
    }

    /// [`lines`](Capture::lines), decoded lossily for text consumers.
    pub fn lines_lossy(&self) -> Vec<Cow<'_, str>> {
        self.lines().into_iter().map(String::from_utf8_lossy).collect()
    }
}

impl serde::Serialize for Capture {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.lines_lossy())
    }
}

/// Structured outcome of one execution.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ExecResult {
    pub verdict: Verdict,
    /// Human summary of how the child ended.
    pub message: String,
    /// Raw wait status; `None` when the spawn failed.
    pub raw: Option<i32>,
    /// Exit byte of the raw status (`raw >> 8`).
    pub code: Option<i32>,
    /// Exit status of a normal termination. Exactly one of `status` and
    /// `signal` is set for a reaped child.
    pub status: Option<i32>,
    /// Symbolic terminating signal, e.g. `"SIGKILL"`.
    pub signal: Option<String>,
    pub coredump: bool,
    /// Captured stdout (multiplexed path; absent under `is_binary`).
    pub stdout: Option<Capture>,
    /// Captured stderr (multiplexed path; absent under `is_binary`).
    pub stderr: Option<Capture>,
    /// Merged stdout+stderr (simple path only).
    #[serde(serialize_with = "ser_bytes_lossy")]
    pub output: Option<Vec<u8>>,
    pub bytes: ByteCounts,
}

impl ExecResult {
    /// True for a clean, zero exit.
    pub fn success(&self) -> bool {
        self.verdict == Verdict::Ok && self.status == Some(0)
    }

    /// Decodes the helper envelope out of captured stdout.
    pub fn helper_payload(&self) -> Result<serde_json::Value, HelperError> {
        let stdout = self.stdout.as_ref().ok_or(HelperError::Empty)?;
        envelope::decode_payload(stdout.lines_lossy())
    }

    /// Projects the helper envelope into its agreed fields.
    pub fn helper_reply(&self) -> Result<HelperReply, HelperError> {
        let stdout = self.stdout.as_ref().ok_or(HelperError::Empty)?;
        HelperReply::from_lines(stdout.lines_lossy())
    }
}

fn ser_bytes_lossy<S: serde::Serializer>(
    bytes: &Option<Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(bytes) => serializer.serialize_some(&String::from_utf8_lossy(bytes)),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::Capture;

    #[test]
    fn lines_drop_the_trailing_terminator_only() {
        let mut capture = Capture::new();
        capture.push(b"a\nb\n");
        assert_eq!(capture.lines(), vec![b"a".as_ref(), b"b".as_ref()]);

        let mut unterminated = Capture::new();
        unterminated.push(b"a\nb");
        assert_eq!(unterminated.lines(), vec![b"a".as_ref(), b"b".as_ref()]);
    }

    #[test]
    fn empty_capture_has_no_lines() {
        assert!(Capture::new().lines().is_empty());
    }

    #[test]
    fn interior_empty_lines_survive() {
        let mut capture = Capture::new();
        capture.push(b"a\n\nb\n");
        assert_eq!(
            capture.lines(),
            vec![b"a".as_ref(), b"".as_ref(), b"b".as_ref()]
        );
    }
}
