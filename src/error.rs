/// Errors raised by the engine itself.
///
/// How the *child* fared is never an `Error`: non-zero exits, signals and
/// unusable helper envelopes are all surfaced through
/// [`ExecResult`](crate::ExecResult).
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("unusable options: {0}")]
    Options(&'static str),
    #[error("syscall failed with error code {}", code)]
    Syscall { code: i32 },
}
