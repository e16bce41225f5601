use crate::{error::Error, fd::Fd};

/// Creates a close-on-exec pipe; returns `(read end, write end)`.
pub(crate) fn setup_pipe() -> Result<(Fd, Fd), Error> {
    let mut ends = [0 as libc::c_int; 2];
    let ret = unsafe { libc::pipe2(ends.as_mut_ptr(), libc::O_CLOEXEC) };
    if ret == -1 {
        return Err(Error::Syscall {
            code: errno::errno().0,
        });
    }
    Ok((Fd::new(ends[0]), Fd::new(ends[1])))
}
