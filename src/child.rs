//! Per-child supervision: race-free `wait`, `try_wait`, and `kill` on a
//! single OS child shared between threads.

use std::fmt;
use std::io;
use std::sync::Mutex;

/// Exit status of a child process.
///
/// This is an opaque wrapper around the platform's native representation:
/// the raw status from `waitpid()` on Unix, the exit code from
/// `GetExitCodeProcess()` on Windows.
#[derive(Eq, PartialEq, Hash, Copy, Clone)]
pub struct ExitStatus(os::RawExitStatus);

impl ExitStatus {
    pub(crate) fn from_raw(raw: os::RawExitStatus) -> ExitStatus {
        ExitStatus(raw)
    }

    /// True if the child exited with status 0.
    pub fn success(&self) -> bool {
        self.code() == Some(0)
    }
}

/// One spawned OS child, and the state needed to coordinate concurrent
/// waiters and killers on it.
///
/// The invariants: the child is reaped at most once; after reaping, the
/// status slot is filled; `kill` after reaping is a silent no-op; and a
/// non-blocking probe never reaps a child out from under a blocked waiter.
/// Two locks divide the work. The status lock is held only briefly, to
/// read or write the status slot or make a non-blocking OS call. The wait
/// lock is held for the whole of a blocking wait.
pub(crate) struct Child {
    pid: u32,
    #[allow(dead_code)]
    ext: os::ExtChildState,
    status: Mutex<Option<ExitStatus>>,
    wait_lock: Mutex<()>,
}

impl Child {
    pub fn new(pid: u32, ext: os::ExtChildState) -> Child {
        Child {
            pid,
            ext,
            status: Mutex::new(None),
            wait_lock: Mutex::new(()),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Block until the child exits, reap it, and return its status. Returns
    /// the cached status immediately if the child was already reaped.
    pub fn wait(&self) -> io::Result<ExitStatus> {
        self.os_wait()
    }

    /// Return the child's status if it has exited, without blocking.
    pub fn try_wait(&self) -> io::Result<Option<ExitStatus>> {
        self.os_try_wait()
    }

    /// Forcibly terminate the child: `SIGKILL` on Unix, `TerminateProcess`
    /// on Windows. Does nothing if the child was already reaped.
    pub fn kill(&self) -> io::Result<()> {
        self.os_kill()
    }
}

impl fmt::Debug for Child {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.status.lock().unwrap();
        f.debug_struct("Child")
            .field("pid", &self.pid)
            .field("status", &*status)
            .finish()
    }
}

#[cfg(unix)]
mod os {
    use super::*;
    use crate::posix;

    pub type ExtChildState = ();
    pub type RawExitStatus = i32;

    impl ExitStatus {
        /// Returns the exit code if the child exited voluntarily (not
        /// killed by a signal).
        pub fn code(&self) -> Option<i32> {
            libc::WIFEXITED(self.0).then(|| libc::WEXITSTATUS(self.0))
        }

        /// Returns the signal number if the child was killed by a signal.
        pub fn signal(&self) -> Option<i32> {
            libc::WIFSIGNALED(self.0).then(|| libc::WTERMSIG(self.0))
        }
    }

    impl fmt::Display for ExitStatus {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            if libc::WIFEXITED(self.0) {
                write!(f, "exit code {}", libc::WEXITSTATUS(self.0))
            } else if libc::WIFSIGNALED(self.0) {
                write!(f, "signal {}", libc::WTERMSIG(self.0))
            } else {
                write!(f, "unrecognized wait status: {} {:#x}", self.0, self.0)
            }
        }
    }

    impl fmt::Debug for ExitStatus {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "ExitStatus({})", self)
        }
    }

    impl Child {
        pub(super) fn os_wait(&self) -> io::Result<ExitStatus> {
            let _wait_guard = self.wait_lock.lock().unwrap();
            {
                let status = self.status.lock().unwrap();
                if let Some(status) = *status {
                    return Ok(status);
                }
            }
            // Block with the status lock released, so concurrent try_wait
            // and kill callers still get a timely answer. WNOWAIT keeps the
            // pid allocated until the reap below, which closes the window
            // where kill could signal a recycled pid.
            posix::wait_without_reaping(self.pid)?;
            let mut status = self.status.lock().unwrap();
            if let Some(status) = *status {
                Ok(status)
            } else {
                let reaped = ExitStatus::from_raw(posix::reap(self.pid)?);
                *status = Some(reaped);
                Ok(reaped)
            }
        }

        pub(super) fn os_try_wait(&self) -> io::Result<Option<ExitStatus>> {
            {
                let status = self.status.lock().unwrap();
                if let Some(status) = *status {
                    return Ok(Some(status));
                }
                // Probe under the status lock. A blocking waiter is inside
                // waitid at this point, not holding the lock, and cannot
                // reap until we release it.
                if !posix::try_wait_without_reaping(self.pid)? {
                    return Ok(None);
                }
            }
            // The child has exited, so this wait cannot block.
            self.os_wait().map(Some)
        }

        pub(super) fn os_kill(&self) -> io::Result<()> {
            let status = self.status.lock().unwrap();
            if status.is_some() {
                return Ok(());
            }
            // Signal with the raw syscall. Going through anything that
            // polls before signaling could reap the child here and free
            // the pid for reuse while a waiter still expects it.
            posix::kill_pid(self.pid, libc::SIGKILL)
        }
    }
}

#[cfg(windows)]
pub(crate) use os::ExtChildState;

#[cfg(windows)]
mod os {
    use super::*;
    use crate::win32;
    use std::time::Duration;

    #[derive(Debug)]
    pub struct ExtChildState(pub(crate) win32::Handle);

    pub type RawExitStatus = u32;

    impl ExitStatus {
        /// Returns the exit code. Always available for a finished child on
        /// Windows.
        pub fn code(&self) -> Option<i32> {
            Some(self.0 as i32)
        }

        /// Returns the signal number if the child was killed by a signal.
        /// Always `None` on Windows.
        pub fn signal(&self) -> Option<i32> {
            None
        }
    }

    impl fmt::Display for ExitStatus {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "exit code {}", self.0)
        }
    }

    impl fmt::Debug for ExitStatus {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "ExitStatus({})", self)
        }
    }

    impl Child {
        pub(super) fn os_wait(&self) -> io::Result<ExitStatus> {
            let _wait_guard = self.wait_lock.lock().unwrap();
            {
                let status = self.status.lock().unwrap();
                if let Some(status) = *status {
                    return Ok(status);
                }
            }
            // The process handle is immutable; waiting on it does not need
            // the status lock. Windows has no reaping, so there is no pid
            // recycling hazard while the handle stays open.
            match win32::WaitForSingleObject(&self.ext.0, None)? {
                win32::WaitEvent::OBJECT_0 | win32::WaitEvent::ABANDONED => {}
                win32::WaitEvent::TIMEOUT => {
                    return Err(io::Error::other("infinite wait timed out"));
                }
            }
            let mut status = self.status.lock().unwrap();
            if let Some(status) = *status {
                Ok(status)
            } else {
                let code = win32::GetExitCodeProcess(&self.ext.0)?;
                let finished = ExitStatus::from_raw(code);
                *status = Some(finished);
                Ok(finished)
            }
        }

        pub(super) fn os_try_wait(&self) -> io::Result<Option<ExitStatus>> {
            {
                let status = self.status.lock().unwrap();
                if let Some(status) = *status {
                    return Ok(Some(status));
                }
                match win32::WaitForSingleObject(&self.ext.0, Some(Duration::ZERO))? {
                    win32::WaitEvent::OBJECT_0 | win32::WaitEvent::ABANDONED => {}
                    win32::WaitEvent::TIMEOUT => return Ok(None),
                }
            }
            self.os_wait().map(Some)
        }

        pub(super) fn os_kill(&self) -> io::Result<()> {
            let mut status = self.status.lock().unwrap();
            if status.is_some() {
                return Ok(());
            }
            if let Err(err) = win32::TerminateProcess(&self.ext.0, 1) {
                // TerminateProcess racing with normal exit can report
                // ACCESS_DENIED; treat that as already-finished.
                if err.raw_os_error() != Some(win32::ERROR_ACCESS_DENIED as i32) {
                    return Err(err);
                }
                let code = win32::GetExitCodeProcess(&self.ext.0)?;
                if code == win32::STILL_ACTIVE {
                    return Err(err);
                }
                *status = Some(ExitStatus::from_raw(code));
            }
            Ok(())
        }
    }
}
