use crate::error::Error;
use libc::c_void;
use std::{io, os::unix::io::RawFd};

/// Owned file descriptor. Closes on drop.
pub(crate) struct Fd(RawFd);

impl Fd {
    pub fn new(inner: RawFd) -> Fd {
        Fd(inner)
    }

    pub fn as_raw(&self) -> RawFd {
        self.0
    }

    pub fn into_raw(self) -> RawFd {
        let this = std::mem::ManuallyDrop::new(self);
        this.0
    }

    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        read_fd(self.0, buf)
    }

    pub fn duplicate(&self) -> Result<Fd, Error> {
        dup_fd(self.0)
    }
}

impl Drop for Fd {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}

pub(crate) fn read_fd(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    let ret = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()) };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret as usize)
}

pub(crate) fn write_fd(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    let ret = unsafe { libc::write(fd, buf.as_ptr() as *const c_void, buf.len()) };
    if ret == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(ret as usize)
}

pub(crate) fn dup_fd(fd: RawFd) -> Result<Fd, Error> {
    let ret = unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 0) };
    if ret == -1 {
        return Err(Error::Syscall {
            code: errno::errno().0,
        });
    }
    Ok(Fd::new(ret))
}

/// Polls a single descriptor for readability. A zero timeout answers
/// "is more queued right now".
pub(crate) fn poll_in(fd: RawFd, timeout_ms: libc::c_int) -> io::Result<bool> {
    let mut pollfd = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    loop {
        let ret = unsafe { libc::poll(&mut pollfd, 1, timeout_ms) };
        if ret == -1 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        let readable = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
        return Ok(ret > 0 && pollfd.revents & readable != 0);
    }
}
