use crate::{Error, ExecResult, ExecuteOptions};
use std::ffi::OsStr;
use std::path::Path;

/// Execution builder.
///
/// ```no_run
/// # fn main() -> Result<(), ferry::Error> {
/// let result = ferry::Command::new("/usr/bin/uptime").noisy_stdout(true).run()?;
/// assert!(result.success());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct Command {
    opts: ExecuteOptions,
}

impl Command {
    pub fn new<S: AsRef<OsStr>>(program: S) -> Command {
        let mut opts = ExecuteOptions::default();
        opts.cmd.push(program.as_ref().to_os_string());
        Command { opts }
    }

    pub fn arg<S: AsRef<OsStr>>(&mut self, a: S) -> &mut Self {
        self.opts.cmd.push(a.as_ref().to_os_string());
        self
    }

    pub fn args(&mut self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> &mut Self {
        self.opts
            .cmd
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn env(&mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> &mut Self {
        self.opts
            .env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    pub fn current_dir<S: AsRef<Path>>(&mut self, dir: S) -> &mut Self {
        self.opts.cwd.replace(dir.as_ref().to_path_buf());
        self
    }

    /// Forward caller stdin to the child until EOF.
    pub fn expects_stdin(&mut self, yes: bool) -> &mut Self {
        self.opts.expects_stdin = yes;
        self
    }

    /// Hand the child these bytes on stdin, then close it.
    pub fn stdin_bytes(&mut self, data: impl Into<Vec<u8>>) -> &mut Self {
        self.opts.stdin_str.replace(data.into());
        self
    }

    pub fn noisy_stdout(&mut self, yes: bool) -> &mut Self {
        self.opts.noisy_stdout = yes;
        self
    }

    pub fn noisy_stderr(&mut self, yes: bool) -> &mut Self {
        self.opts.noisy_stderr = yes;
        self
    }

    /// Expect a helper envelope; redact it from the mirrored stdout.
    pub fn helper(&mut self, yes: bool) -> &mut Self {
        self.opts.is_helper = yes;
        self
    }

    /// Stream binary output: mirrors on, capture off.
    pub fn binary(&mut self, yes: bool) -> &mut Self {
        self.opts.is_binary = yes;
        self
    }

    pub fn must_succeed(&mut self, yes: bool) -> &mut Self {
        self.opts.must_succeed = yes;
        self
    }

    pub fn max_stdout_bytes(&mut self, cap: u64) -> &mut Self {
        self.opts.max_stdout_bytes.replace(cap);
        self
    }

    /// Fire-and-wait with inherited descriptors.
    pub fn system(&mut self, yes: bool) -> &mut Self {
        self.opts.system = yes;
        self
    }

    /// The assembled options record.
    pub fn options(&self) -> ExecuteOptions {
        self.opts.clone()
    }

    /// Runs through the multiplexing executor.
    pub fn run(&mut self) -> Result<ExecResult, Error> {
        crate::execute(&self.opts)
    }

    /// Runs through the merged-output bulk reader.
    pub fn run_simple(&mut self) -> Result<ExecResult, Error> {
        crate::execute_simple(&self.opts)
    }
}
