//! Thin safe wrappers over the libc calls used by the spawn, supervision,
//! and pipe machinery.

use std::ffi::{CString, OsStr, OsString};
use std::fs::File;
use std::io::{Error, Result};
use std::mem::MaybeUninit;
use std::os::raw::c_char;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::PathBuf;
use std::ptr;

fn check_err<T: Ord + Default>(num: T) -> Result<T> {
    if num < T::default() {
        return Err(Error::last_os_error());
    }
    Ok(num)
}

fn os_to_cstring(s: &OsStr) -> Result<CString> {
    let bytes = s.as_bytes();
    if bytes.iter().any(|&b| b == 0) {
        return Err(Error::from_raw_os_error(libc::EINVAL));
    }
    // Unix paths *are* C strings once interior NULs are ruled out.
    Ok(CString::new(bytes).expect("converting OsStr to C string"))
}

/// Create an anonymous pipe with both ends close-on-exec.
///
/// Children receive their copy through `dup2`, which clears the flag on the
/// duplicate only, so nothing library-opened leaks across an exec.
pub fn pipe() -> Result<(File, File)> {
    let mut fds = [0 as libc::c_int; 2];
    #[cfg(any(target_os = "linux", target_os = "android"))]
    {
        check_err(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;
    }
    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    {
        check_err(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
        for &fd in &fds {
            set_cloexec(fd)?;
        }
    }
    Ok(unsafe { (File::from_raw_fd(fds[0]), File::from_raw_fd(fds[1])) })
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn set_cloexec(fd: RawFd) -> Result<()> {
    let old = check_err(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
    check_err(unsafe { libc::fcntl(fd, libc::F_SETFD, old | libc::FD_CLOEXEC) })?;
    Ok(())
}

/// Duplicate a descriptor to a close-on-exec copy numbered 3 or above, so
/// the copy can never collide with a standard stream slot.
pub fn dup_above_stdio(fd: RawFd) -> Result<File> {
    let new_fd = check_err(unsafe { libc::fcntl(fd, libc::F_DUPFD_CLOEXEC, 3) })?;
    Ok(unsafe { File::from_raw_fd(new_fd) })
}

/// Fork. Returns `Some(child_pid)` in the parent and `None` in the child.
///
/// # Safety
///
/// The child may only perform async-signal-safe work before exec; callers
/// must prepare everything the child needs before forking.
pub unsafe fn fork() -> Result<Option<u32>> {
    match check_err(unsafe { libc::fork() })? {
        0 => Ok(None),
        pid => Ok(Some(pid as u32)),
    }
}

pub fn dup2(oldfd: RawFd, newfd: RawFd) -> Result<()> {
    check_err(unsafe { libc::dup2(oldfd, newfd) })?;
    Ok(())
}

pub fn chdir(dir: &CString) -> Result<()> {
    check_err(unsafe { libc::chdir(dir.as_ptr()) })?;
    Ok(())
}

pub fn setpgid(pid: u32, pgid: u32) -> Result<()> {
    check_err(unsafe { libc::setpgid(pid as libc::pid_t, pgid as libc::pid_t) })?;
    Ok(())
}

pub fn _exit(status: u8) -> ! {
    unsafe { libc::_exit(status as libc::c_int) }
}

pub fn kill_pid(pid: u32, signal: libc::c_int) -> Result<()> {
    check_err(unsafe { libc::kill(pid as libc::pid_t, signal) })?;
    Ok(())
}

/// Reset SIGPIPE handling in the forked child to the defaults Unix programs
/// expect. libstd ignores SIGPIPE and signal-handling libraries often set a
/// mask; children inherit both unless we clean up here.
pub fn reset_sigpipe() -> Result<()> {
    unsafe {
        let mut set = MaybeUninit::<libc::sigset_t>::zeroed();
        check_err(libc::sigemptyset(set.as_mut_ptr()))?;
        check_err(libc::pthread_sigmask(
            libc::SIG_SETMASK,
            set.as_ptr(),
            ptr::null_mut(),
        ))?;
        if libc::signal(libc::SIGPIPE, libc::SIG_DFL) == libc::SIG_ERR {
            return Err(Error::last_os_error());
        }
    }
    Ok(())
}

/// Block until the child exits, without freeing its pid.
///
/// This is the `waitid(P_PID, WEXITED | WNOWAIT)` probe: the child stays
/// reapable afterwards, so a concurrent `kill` can never signal a recycled
/// pid.
pub fn wait_without_reaping(pid: u32) -> Result<()> {
    loop {
        let mut siginfo = MaybeUninit::<libc::siginfo_t>::zeroed();
        let ret = unsafe {
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                siginfo.as_mut_ptr(),
                libc::WEXITED | libc::WNOWAIT,
            )
        };
        if ret == 0 {
            return Ok(());
        }
        let err = Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

/// Non-blocking form of [`wait_without_reaping`]. Returns whether the child
/// has exited. With `WNOHANG`, a still-running child leaves `si_pid` zero
/// in the zeroed siginfo.
pub fn try_wait_without_reaping(pid: u32) -> Result<bool> {
    loop {
        let mut siginfo: libc::siginfo_t = unsafe { MaybeUninit::zeroed().assume_init() };
        let ret = unsafe {
            libc::waitid(
                libc::P_PID,
                pid as libc::id_t,
                &mut siginfo,
                libc::WEXITED | libc::WNOWAIT | libc::WNOHANG,
            )
        };
        if ret == 0 {
            return Ok(siginfo_pid(&siginfo) != 0);
        }
        let err = Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn siginfo_pid(siginfo: &libc::siginfo_t) -> libc::pid_t {
    unsafe { siginfo.si_pid() }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn siginfo_pid(siginfo: &libc::siginfo_t) -> libc::pid_t {
    siginfo.si_pid
}

/// Reap an exited child and return its raw wait status. Only call this once
/// the child is known to have exited; it never blocks in that case.
pub fn reap(pid: u32) -> Result<i32> {
    let mut status = 0 as libc::c_int;
    loop {
        let ret = unsafe { libc::waitpid(pid as libc::pid_t, &mut status, 0) };
        if ret == pid as libc::pid_t {
            return Ok(status);
        }
        // waitpid with an explicit pid only ever returns that pid or -1.
        let err = Error::last_os_error();
        if err.raw_os_error() != Some(libc::EINTR) {
            return Err(err);
        }
    }
}

/// Exec state assembled in the parent, before the fork, so that the child
/// needs no allocations on its way to `execve`.
pub struct PreparedExec {
    // The CString vectors own the bytes the pointer arrays refer to. Both
    // live on the heap, so moving a PreparedExec does not invalidate them.
    #[allow(dead_code)]
    owned_argv: Vec<CString>,
    #[allow(dead_code)]
    owned_env: Vec<CString>,
    candidates: Vec<CString>,
    argv_ptrs: Vec<*const c_char>,
    env_ptrs: Vec<*const c_char>,
}

/// Build the exec state: the argv and `NAME=value` environment strings, and
/// the list of paths to try, in order, for the program itself.
pub fn prep_exec(
    candidates: Vec<PathBuf>,
    argv: &[OsString],
    env: &[OsString],
) -> Result<PreparedExec> {
    let candidates = candidates
        .iter()
        .map(|p| os_to_cstring(p.as_os_str()))
        .collect::<Result<Vec<_>>>()?;
    let owned_argv = argv
        .iter()
        .map(|a| os_to_cstring(a))
        .collect::<Result<Vec<_>>>()?;
    let owned_env = env
        .iter()
        .map(|e| os_to_cstring(e))
        .collect::<Result<Vec<_>>>()?;
    let mut argv_ptrs: Vec<*const c_char> = owned_argv.iter().map(|c| c.as_ptr()).collect();
    argv_ptrs.push(ptr::null());
    let mut env_ptrs: Vec<*const c_char> = owned_env.iter().map(|c| c.as_ptr()).collect();
    env_ptrs.push(ptr::null());
    Ok(PreparedExec {
        owned_argv,
        owned_env,
        candidates,
        argv_ptrs,
        env_ptrs,
    })
}

impl PreparedExec {
    /// Try `execve` on each candidate in turn, in the forked child. Only
    /// returns if every attempt failed; like `execvp`, a permission error
    /// takes precedence over "no such file" in the reported error.
    pub fn exec(&self) -> Error {
        let mut saw_eacces = false;
        for candidate in &self.candidates {
            unsafe {
                libc::execve(
                    candidate.as_ptr(),
                    self.argv_ptrs.as_ptr(),
                    self.env_ptrs.as_ptr(),
                );
            }
            let err = Error::last_os_error();
            match err.raw_os_error() {
                Some(libc::EACCES) => saw_eacces = true,
                Some(libc::ENOENT) | Some(libc::ENOTDIR) => {}
                _ => return err,
            }
        }
        if saw_eacces {
            Error::from_raw_os_error(libc::EACCES)
        } else {
            Error::from_raw_os_error(libc::ENOENT)
        }
    }
}
