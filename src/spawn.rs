//! Process creation: stdio plumbing, the process-wide spawn lock, and the
//! platform-specific spawn paths.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs::File;
use std::io::{self, ErrorKind};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::child::Child;

pub(crate) use os::NULL_DEVICE;

// Every spawn happens while this is held. On Windows, a child's stdio
// handles are temporarily inheritable around CreateProcess, and two
// unserialized spawns would cross-inherit each other's pipe ends.
static SPAWN_LOCK: Mutex<()> = Mutex::new(());

/// Where one of a child's standard streams comes from: one of the parent's
/// own standard descriptors, or an open file or pipe end.
#[derive(Clone, Debug)]
pub(crate) enum StdioValue {
    ParentStdin,
    ParentStdout,
    ParentStderr,
    File(Arc<File>),
}

/// The mutable spawn-time state passed to `before_spawn` hooks, just before
/// a command is started.
///
/// Hooks may inspect and extend the argv and request spawn options such as
/// a fresh process group.
#[derive(Debug)]
pub struct SpawnConfig {
    pub(crate) argv: Vec<OsString>,
    pub(crate) options: os::OsOptions,
}

impl SpawnConfig {
    pub(crate) fn new(argv: Vec<OsString>) -> SpawnConfig {
        SpawnConfig {
            argv,
            options: Default::default(),
        }
    }

    /// The argv about to be spawned, program name first.
    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }

    /// Appends an argument to the argv.
    pub fn arg(&mut self, arg: impl AsRef<OsStr>) {
        self.argv.push(arg.as_ref().to_owned());
    }

    /// Requests that the child be started in a new process group: `setpgid`
    /// on Unix, `CREATE_NEW_PROCESS_GROUP` on Windows.
    pub fn new_process_group(&mut self) {
        #[cfg(unix)]
        {
            self.options.new_process_group = true;
        }
        #[cfg(windows)]
        {
            self.options.creation_flags |= crate::win32::CREATE_NEW_PROCESS_GROUP;
        }
    }

    /// Adds to the flags passed as `dwCreationFlags` to `CreateProcess`.
    #[cfg(windows)]
    pub fn creation_flags(&mut self, flags: u32) {
        self.options.creation_flags |= flags;
    }
}

/// Start one child under the spawn lock and wrap it in a [`Child`]
/// supervisor. The stdio values are dropped before this returns; the child
/// owns its own duplicates.
pub(crate) fn spawn(
    config: SpawnConfig,
    stdio: (StdioValue, StdioValue, StdioValue),
    env: &HashMap<OsString, OsString>,
    cwd: Option<&Path>,
) -> io::Result<Child> {
    if config.argv.is_empty() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            "argv must not be empty",
        ));
    }
    let _spawn_guard = SPAWN_LOCK.lock().unwrap();
    os::spawn(config, stdio, env, cwd)
}

/// Create an anonymous pipe, `(read, write)`, not inherited by unrelated
/// spawns.
pub(crate) fn pipe() -> io::Result<(File, File)> {
    os::make_pipe()
}

// `NAME=value` strings in a deterministic order. The map has unique keys
// (case-normalized at insertion), so no dedup pass is needed.
fn format_env(env: &HashMap<OsString, OsString>) -> Vec<OsString> {
    let mut formatted: Vec<OsString> = env
        .iter()
        .map(|(k, v)| {
            let mut entry = k.clone();
            entry.push("=");
            entry.push(v);
            entry
        })
        .collect();
    formatted.sort();
    formatted
}

#[cfg(unix)]
pub(crate) mod os {
    use super::*;
    use crate::posix;
    use std::ffi::CString;
    use std::io::{Read, Write};
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::io::{AsRawFd, RawFd};
    use std::path::PathBuf;

    pub const NULL_DEVICE: &str = "/dev/null";

    #[derive(Clone, Debug, Default)]
    pub struct OsOptions {
        pub(crate) new_process_group: bool,
    }

    pub(crate) fn make_pipe() -> io::Result<(File, File)> {
        posix::pipe()
    }

    /// Read exactly N bytes, or return None on immediate EOF. Similar to
    /// read_exact(), but distinguishes between no read and partial read
    /// (which is treated as error).
    fn read_exact_or_eof<const N: usize>(source: &mut File) -> io::Result<Option<[u8; N]>> {
        let mut buf = [0u8; N];
        let mut total_read = 0;
        while total_read < N {
            let n = source.read(&mut buf[total_read..])?;
            if n == 0 {
                break;
            }
            total_read += n;
        }
        match total_read {
            0 => Ok(None),
            n if n == N => Ok(Some(buf)),
            _ => Err(io::ErrorKind::UnexpectedEof.into()),
        }
    }

    pub(crate) fn spawn(
        config: SpawnConfig,
        stdio: (StdioValue, StdioValue, StdioValue),
        env: &HashMap<OsString, OsString>,
        cwd: Option<&Path>,
    ) -> io::Result<Child> {
        let candidates = exec_candidates(&config.argv[0], env);
        let env_block = super::format_env(env);
        let prepared = posix::prep_exec(candidates, &config.argv, &env_block)?;
        let cwd = match cwd {
            Some(dir) => Some(
                CString::new(dir.as_os_str().as_bytes())
                    .map_err(|_| io::Error::from_raw_os_error(libc::EINVAL))?,
            ),
            None => None,
        };

        // Resolve the three stream sources to raw fds, keeping any
        // duplicates alive until after the fork.
        let mut keep_alive = Vec::new();
        let child_fds = [
            prepare_fd(&stdio.0, 0, &mut keep_alive)?,
            prepare_fd(&stdio.1, 1, &mut keep_alive)?,
            prepare_fd(&stdio.2, 2, &mut keep_alive)?,
        ];

        let mut exec_fail_pipe = posix::pipe()?;
        let pid;
        unsafe {
            match posix::fork()? {
                Some(child_pid) => pid = child_pid,
                None => {
                    drop(exec_fail_pipe.0);
                    let err = exec_child(&prepared, child_fds, cwd.as_ref(), &config.options);
                    let error_code = err.raw_os_error().unwrap_or(-1) as u32;
                    exec_fail_pipe.1.write_all(&error_code.to_le_bytes()).ok();
                    posix::_exit(127);
                }
            }
        }

        // Close the parent's copies of the child-end fds promptly after the
        // fork, before blocking on the exec-fail pipe.
        drop(keep_alive);
        drop(stdio);

        drop(exec_fail_pipe.1);
        match read_exact_or_eof::<4>(&mut exec_fail_pipe.0)? {
            None => Ok(Child::new(pid, ())),
            Some(error_buf) => {
                // The child has already called _exit; reap it so a failed
                // spawn doesn't leave a zombie.
                posix::reap(pid).ok();
                let error_code = u32::from_le_bytes(error_buf);
                Err(io::Error::from_raw_os_error(error_code as i32))
            }
        }
    }

    // Everything here must be async-signal-safe: no allocation, no locks.
    // The PreparedExec and cwd CString were built before the fork.
    fn exec_child(
        prepared: &posix::PreparedExec,
        child_fds: [RawFd; 3],
        cwd: Option<&CString>,
        options: &OsOptions,
    ) -> io::Error {
        let setup = (|| -> io::Result<()> {
            if let Some(cwd) = cwd {
                posix::chdir(cwd)?;
            }
            for (target, source) in child_fds.iter().enumerate() {
                if *source != target as RawFd {
                    posix::dup2(*source, target as RawFd)?;
                }
            }
            posix::reset_sigpipe()?;
            if options.new_process_group {
                posix::setpgid(0, 0)?;
            }
            Ok(())
        })();
        match setup {
            Ok(()) => prepared.exec(),
            Err(err) => err,
        }
    }

    fn prepare_fd(
        value: &StdioValue,
        target: RawFd,
        keep_alive: &mut Vec<File>,
    ) -> io::Result<RawFd> {
        let source = match value {
            StdioValue::ParentStdin => 0,
            StdioValue::ParentStdout => 1,
            StdioValue::ParentStderr => 2,
            StdioValue::File(file) => return Ok(file.as_raw_fd()),
        };
        if source == target {
            return Ok(target);
        }
        // A standard stream landing in a foreign slot (stdout swapped onto
        // stderr, say). Duplicate it above the stdio range so the dup2 pass
        // in the child cannot clobber a source before consuming it.
        let dup = posix::dup_above_stdio(source)?;
        let fd = dup.as_raw_fd();
        keep_alive.push(dup);
        Ok(fd)
    }

    // The program is located in the parent, where errors are reportable.
    // A name containing a separator is used as-is; the child's chdir has
    // already happened by exec time, which is why relative exe paths get
    // canonicalized during evaluation when `dir` is in play.
    fn exec_candidates(program: &OsStr, env: &HashMap<OsString, OsString>) -> Vec<PathBuf> {
        let has_separator = program
            .to_string_lossy()
            .chars()
            .any(std::path::is_separator);
        if has_separator {
            return vec![PathBuf::from(program)];
        }
        let path_var = env
            .get(OsStr::new("PATH"))
            .cloned()
            .or_else(|| std::env::var_os("PATH"));
        match path_var {
            Some(path_var) => std::env::split_paths(&path_var)
                .map(|dir| dir.join(program))
                .collect(),
            None => vec![PathBuf::from(program)],
        }
    }
}

#[cfg(windows)]
pub(crate) mod os {
    use super::*;
    use crate::child::ExtChildState;
    use crate::win32;
    use std::os::windows::ffi::OsStrExt;
    use std::os::windows::io::{AsRawHandle, RawHandle};
    use winapi::um::winbase::{STD_ERROR_HANDLE, STD_INPUT_HANDLE, STD_OUTPUT_HANDLE};

    pub const NULL_DEVICE: &str = "nul";

    #[derive(Clone, Debug, Default)]
    pub struct OsOptions {
        pub(crate) creation_flags: u32,
    }

    pub(crate) fn make_pipe() -> io::Result<(File, File)> {
        win32::make_pipe()
    }

    pub(crate) fn spawn(
        config: SpawnConfig,
        stdio: (StdioValue, StdioValue, StdioValue),
        env: &HashMap<OsString, OsString>,
        cwd: Option<&Path>,
    ) -> io::Result<Child> {
        let cmdline = win32::assemble_cmdline(&config.argv)?;
        let env_block = format_env_block(env);
        let handles = (
            raw_handle(&stdio.0)?,
            raw_handle(&stdio.1)?,
            raw_handle(&stdio.2)?,
        );

        // File-backed handles are non-inheritable by construction; flip
        // them on only for the duration of CreateProcess. The caller holds
        // the spawn lock, so no concurrent spawn sees them inheritable.
        let mut flipped = Vec::new();
        for value in [&stdio.0, &stdio.1, &stdio.2] {
            if let StdioValue::File(file) = value {
                win32::SetHandleInformation(file, win32::HANDLE_FLAG_INHERIT, 1)?;
                flipped.push(Arc::clone(file));
            }
        }
        let result = win32::CreateProcess(
            &cmdline,
            Some(&env_block),
            cwd.map(|dir| dir.as_os_str()),
            config.options.creation_flags,
            Some(handles.0),
            Some(handles.1),
            Some(handles.2),
        );
        for file in &flipped {
            let _ = win32::SetHandleInformation(file, win32::HANDLE_FLAG_INHERIT, 0);
        }
        let (handle, pid) = result?;
        Ok(Child::new(pid, ExtChildState(handle)))
    }

    fn raw_handle(value: &StdioValue) -> io::Result<RawHandle> {
        match value {
            StdioValue::File(file) => Ok(file.as_raw_handle()),
            StdioValue::ParentStdin => win32::get_std_handle(STD_INPUT_HANDLE),
            StdioValue::ParentStdout => win32::get_std_handle(STD_OUTPUT_HANDLE),
            StdioValue::ParentStderr => win32::get_std_handle(STD_ERROR_HANDLE),
        }
    }

    fn format_env_block(env: &HashMap<OsString, OsString>) -> Vec<u16> {
        let entries = super::format_env(env);
        let mut block = vec![];
        for entry in &entries {
            block.extend(entry.encode_wide());
            block.push(0);
        }
        if entries.is_empty() {
            block.push(0);
        }
        block.push(0);
        block
    }
}
