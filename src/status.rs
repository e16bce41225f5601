//! Decoding of raw `waitpid` statuses.
//!
//! Conventional encoding: low 7 bits carry the terminating signal number,
//! bit 7 the core-dump flag, the upper byte the exit code.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Signal-number → symbolic-name table, derived once from the host's
/// signal set. Read-only after startup.
static SIGNAL_NAMES: Lazy<HashMap<i32, &'static str>> = Lazy::new(|| {
    nix::sys::signal::Signal::iterator()
        .map(|sig| (sig as i32, sig.as_str()))
        .collect()
});

/// Symbolic name for `signo`, if the host knows the number.
pub fn signal_name(signo: i32) -> Option<&'static str> {
    SIGNAL_NAMES.get(&signo).copied()
}

/// Decoded form of one raw wait status.
#[derive(Debug, Clone, Default)]
pub struct ExitDetails {
    /// The integer as returned by `waitpid`.
    pub raw: i32,
    /// Exit byte (`raw >> 8`), regardless of how the child ended.
    pub code: Option<i32>,
    /// Exit status of a normal termination; `None` when signalled.
    pub status: Option<i32>,
    /// Terminating signal, e.g. `"SIGKILL"`; numeric text when the host
    /// has no name for it.
    pub signal: Option<String>,
    pub coredump: bool,
    /// Human summary, e.g. `"status 0"` or `"signal 9 (SIGKILL)"`.
    pub message: String,
}

/// Maps a raw wait status onto [`ExitDetails`]. `-1` means the wait call
/// itself failed; the current errno is folded into the message.
pub fn decode_wait_status(raw: i32) -> ExitDetails {
    if raw == -1 {
        let err = errno::errno();
        return ExitDetails {
            raw,
            message: format!("error: failed to execute ({})", err),
            ..ExitDetails::default()
        };
    }
    let signo = raw & 0x7f;
    if signo != 0 {
        let coredump = raw & 0x80 != 0;
        let name = match signal_name(signo) {
            Some(name) => name.to_string(),
            None => signo.to_string(),
        };
        let mut message = format!("signal {} ({})", signo, name);
        if coredump {
            message.push_str(" and coredump");
        }
        ExitDetails {
            raw,
            code: Some(raw >> 8),
            status: None,
            signal: Some(name),
            coredump,
            message,
        }
    } else {
        let status = raw >> 8;
        ExitDetails {
            raw,
            code: Some(status),
            status: Some(status),
            signal: None,
            coredump: false,
            message: format!("status {}", status),
        }
    }
}

/// Blocks until `pid` exits, retrying EINTR, and decodes the status.
pub(crate) fn wait_child(pid: libc::pid_t) -> ExitDetails {
    let mut status: libc::c_int = 0;
    loop {
        let ret = unsafe { libc::waitpid(pid, &mut status, 0) };
        if ret == -1 {
            if errno::errno().0 == libc::EINTR {
                continue;
            }
            return decode_wait_status(-1);
        }
        return decode_wait_status(status);
    }
}

#[cfg(test)]
mod tests {
    use super::decode_wait_status;

    #[test]
    fn clean_exit() {
        let details = decode_wait_status(0);
        assert_eq!(details.status, Some(0));
        assert_eq!(details.code, Some(0));
        assert!(details.signal.is_none());
        assert!(!details.coredump);
        assert_eq!(details.message, "status 0");
    }

    #[test]
    fn non_zero_exit_lives_in_the_upper_byte() {
        let details = decode_wait_status(3 << 8);
        assert_eq!(details.status, Some(3));
        assert_eq!(details.code, Some(3));
        assert!(details.signal.is_none());
        assert_eq!(details.message, "status 3");
    }

    #[test]
    fn killed_by_signal() {
        let details = decode_wait_status(9);
        assert_eq!(details.status, None);
        assert_eq!(details.signal.as_deref(), Some("SIGKILL"));
        assert!(!details.coredump);
        assert_eq!(details.message, "signal 9 (SIGKILL)");
    }

    #[test]
    fn coredump_bit_is_reported() {
        let details = decode_wait_status(6 | 0x80);
        assert_eq!(details.signal.as_deref(), Some("SIGABRT"));
        assert!(details.coredump);
        assert_eq!(details.message, "signal 6 (SIGABRT) and coredump");
    }

    #[test]
    fn unknown_signal_falls_back_to_its_number() {
        let details = decode_wait_status(0x7f);
        assert_eq!(details.signal.as_deref(), Some("127"));
        assert_eq!(details.message, "signal 127 (127)");
    }

    #[test]
    fn exactly_one_of_status_and_signal() {
        for raw in [0, 1 << 8, 255 << 8, 9, 15, 6 | 0x80] {
            let details = decode_wait_status(raw);
            assert!(details.status.is_some() ^ details.signal.is_some(), "raw={}", raw);
        }
    }
}
