use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

/// Screens argument tokens before the spawn.
///
/// A token with an embedded NUL can never reach `execve` intact; warn and
/// let the spawn fail on its own.
pub(crate) fn screen(cmd: &[OsString]) {
    for (index, arg) in cmd.iter().enumerate() {
        if is_tainted(arg) {
            tracing::warn!(index, arg = ?arg, "argument failed taint screening");
        }
    }
}

fn is_tainted(arg: &OsStr) -> bool {
    arg.as_bytes().contains(&0)
}

#[cfg(test)]
mod tests {
    use super::is_tainted;
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    #[test]
    fn plain_tokens_pass() {
        assert!(!is_tainted(OsStr::new("/bin/ls")));
        assert!(!is_tainted(OsStr::new("--color=auto")));
        assert!(!is_tainted(OsStr::new("")));
    }

    #[test]
    fn embedded_nul_is_flagged() {
        assert!(is_tainted(OsStr::from_bytes(b"ls\0-la")));
        assert!(is_tainted(OsStr::from_bytes(b"\0")));
    }
}
