//! The handle tree: live references to a started expression, mirroring its
//! shape, with `wait`, `try_wait`, `kill`, and `pids` on every level.

use std::error::Error;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use once_cell::sync::OnceCell;

use crate::capture::OutputCapture;
use crate::child::{Child, ExitStatus};

/// The result of a finished expression: the aggregated exit status, plus
/// whatever was captured from the standard streams.
///
/// The captured fields are `None` unless the corresponding capture modifier
/// appeared somewhere in the expression.
#[derive(Clone, Debug)]
pub struct Output {
    /// The aggregated exit status of the expression.
    pub status: ExitStatus,
    /// Captured standard output, if requested.
    pub stdout: Option<Vec<u8>>,
    /// Captured standard error, if requested.
    pub stderr: Option<Vec<u8>>,
}

/// The error for a checked non-zero exit status.
///
/// Carried inside the `io::Error` returned by `run`, `read`, and `wait`;
/// recover it with [`io::Error::get_ref`] and a downcast:
///
/// ```
/// # use tubes::{cmd, StatusError};
/// let err = cmd!("false").run().unwrap_err();
/// let status_err: &StatusError = err.get_ref().unwrap().downcast_ref().unwrap();
/// assert_eq!(status_err.output.status.code(), Some(1));
/// ```
#[derive(Clone, Debug)]
pub struct StatusError {
    /// The rendering of the expression that failed.
    pub expression: String,
    /// The full output, including the offending status and anything
    /// captured before the failure surfaced.
    pub output: Output,
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command {} exited with {}",
            self.expression, self.output.status
        )
    }
}

impl Error for StatusError {}

/// The status of a (sub-)expression together with its checking policy.
/// `checked` starts true at every command and is cleared by an `unchecked`
/// modifier above it, after pipeline aggregation has already seen the true
/// value.
#[derive(Clone, Debug)]
pub(crate) struct ExecStatus {
    pub status: ExitStatus,
    pub checked: bool,
}

impl ExecStatus {
    fn is_checked_error(&self) -> bool {
        self.checked && !self.status.success()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum WaitMode {
    /// Block until everything has exited, then join the capture drains.
    Blocking,
    /// Poll; never block on a still-running process.
    Nonblocking,
    /// Block until everything has exited, but do not join the capture
    /// drains: a surviving grandchild may hold a capture write end open
    /// indefinitely.
    Killing,
}

impl WaitMode {
    fn blocking(self) -> bool {
        !matches!(self, WaitMode::Nonblocking)
    }
}

/// A live reference to a started expression.
///
/// Dropping a handle does **not** clean up after the expression: a handle
/// abandoned without [`wait`](Self::wait) (or [`kill`](Self::kill) followed
/// by a wait) leaks zombie processes on Unix. Always wait on handles, or
/// wrap them in something scoped that does.
#[derive(Debug)]
pub struct Handle {
    node: HandleNode,
    rendered: String,
    stdout_capture: OutputCapture,
    stderr_capture: OutputCapture,
    result: OnceCell<(ExecStatus, Output)>,
    killed: AtomicBool,
}

impl Handle {
    pub(crate) fn new(
        node: HandleNode,
        rendered: String,
        stdout_capture: OutputCapture,
        stderr_capture: OutputCapture,
    ) -> Handle {
        Handle {
            node,
            rendered,
            stdout_capture,
            stderr_capture,
            result: OnceCell::new(),
            killed: AtomicBool::new(false),
        }
    }

    /// Block until every process in the expression exits, join the capture
    /// drains, and return the collected [`Output`].
    ///
    /// Returns an error wrapping a [`StatusError`] if the aggregated status
    /// is a checked non-zero. Repeated waits return the same result.
    pub fn wait(&self) -> io::Result<&Output> {
        let output = self.wait_inner(WaitMode::Blocking)?;
        Ok(output.expect("blocking wait must produce a result"))
    }

    /// Like [`wait`](Self::wait), but returns `Ok(None)` instead of
    /// blocking if some process is still running.
    pub fn try_wait(&self) -> io::Result<Option<&Output>> {
        self.wait_inner(WaitMode::Nonblocking)
    }

    /// Forcibly terminate every process in the expression and reap them.
    ///
    /// Idempotent. This does not produce a status error itself, but a later
    /// [`wait`](Self::wait) surfaces the (now non-zero) status unless
    /// `unchecked` was applied.
    pub fn kill(&self) -> io::Result<()> {
        self.killed.store(true, Ordering::Relaxed);
        self.node.kill()?;
        // Reap the children, but leave the capture drains alone: a
        // grandchild that survived the kill may hold a capture write end
        // open, and joining would block on it.
        self.node.wait(WaitMode::Killing)?;
        Ok(())
    }

    /// The process IDs of the commands in the expression, in left-to-right
    /// pipeline order.
    pub fn pids(&self) -> Vec<u32> {
        let mut pids = Vec::new();
        self.node.pids(&mut pids);
        pids
    }

    pub(crate) fn is_killed(&self) -> bool {
        self.killed.load(Ordering::Relaxed)
    }

    fn wait_inner(&self, mode: WaitMode) -> io::Result<Option<&Output>> {
        let Some(status) = self.node.wait(mode)? else {
            return Ok(None);
        };
        let (final_status, output) = self.result.get_or_try_init(|| {
            let stdout = self.stdout_capture.join_drain()?;
            let stderr = self.stderr_capture.join_drain()?;
            let output = Output {
                status: status.status,
                stdout,
                stderr,
            };
            Ok::<_, io::Error>((status, output))
        })?;
        if final_status.is_checked_error() {
            return Err(io::Error::other(StatusError {
                expression: self.rendered.clone(),
                output: output.clone(),
            }));
        }
        Ok(Some(output))
    }
}

#[derive(Debug)]
pub(crate) enum HandleNode {
    Child(ChildHandle),
    Pipe(Box<PipeHandle>),
    StdinBytes(Box<StdinBytesHandle>),
    Unchecked(Box<HandleNode>),
}

impl HandleNode {
    pub fn wait(&self, mode: WaitMode) -> io::Result<Option<ExecStatus>> {
        match self {
            HandleNode::Child(child) => child.wait(mode),
            HandleNode::Pipe(pipe) => pipe.wait(mode),
            HandleNode::StdinBytes(stdin_bytes) => stdin_bytes.wait(mode),
            HandleNode::Unchecked(inner) => Ok(inner.wait(mode)?.map(|mut status| {
                status.checked = false;
                status
            })),
        }
    }

    pub fn kill(&self) -> io::Result<()> {
        match self {
            HandleNode::Child(child) => child.child.kill(),
            HandleNode::Pipe(pipe) => {
                let left = pipe.left.kill();
                let right = pipe.right.kill();
                left.and(right)
            }
            HandleNode::StdinBytes(stdin_bytes) => stdin_bytes.inner.kill(),
            HandleNode::Unchecked(inner) => inner.kill(),
        }
    }

    pub fn pids(&self, pids: &mut Vec<u32>) {
        match self {
            HandleNode::Child(child) => pids.push(child.child.pid()),
            HandleNode::Pipe(pipe) => {
                pipe.left.pids(pids);
                pipe.right.pids(pids);
            }
            HandleNode::StdinBytes(stdin_bytes) => stdin_bytes.inner.pids(pids),
            HandleNode::Unchecked(inner) => inner.pids(pids),
        }
    }
}

#[derive(Debug)]
pub(crate) struct ChildHandle {
    child: Child,
}

impl ChildHandle {
    pub fn new(child: Child) -> ChildHandle {
        ChildHandle { child }
    }

    fn wait(&self, mode: WaitMode) -> io::Result<Option<ExecStatus>> {
        let status = if mode.blocking() {
            Some(self.child.wait()?)
        } else {
            self.child.try_wait()?
        };
        Ok(status.map(|status| ExecStatus {
            status,
            checked: true,
        }))
    }
}

#[derive(Debug)]
pub(crate) struct PipeHandle {
    pub left: HandleNode,
    pub right: HandleNode,
}

impl PipeHandle {
    fn wait(&self, mode: WaitMode) -> io::Result<Option<ExecStatus>> {
        // Always visit both sides, so that a failure (or a kill) on one
        // side never leaves the other unreaped.
        let left = self.left.wait(mode);
        let right = self.right.wait(mode);
        let (left, right) = (left?, right?);
        Ok(match (left, right) {
            (Some(left), Some(right)) => Some(pipe_status(left, right)),
            _ => None,
        })
    }
}

/// The status of a pipeline, from the statuses of its two sides. A checked
/// failure on the right wins, then a checked failure on the left, then an
/// unchecked non-zero on the right; otherwise the left status stands.
fn pipe_status(left: ExecStatus, right: ExecStatus) -> ExecStatus {
    if right.is_checked_error() {
        right
    } else if left.is_checked_error() {
        left
    } else if !right.status.success() {
        right
    } else {
        left
    }
}

#[derive(Debug)]
pub(crate) struct StdinBytesHandle {
    inner: HandleNode,
    writer: Mutex<Option<JoinHandle<io::Result<()>>>>,
}

impl StdinBytesHandle {
    pub fn new(inner: HandleNode, writer: JoinHandle<io::Result<()>>) -> StdinBytesHandle {
        StdinBytesHandle {
            inner,
            writer: Mutex::new(Some(writer)),
        }
    }

    fn wait(&self, mode: WaitMode) -> io::Result<Option<ExecStatus>> {
        let Some(status) = self.inner.wait(mode)? else {
            return Ok(None);
        };
        // The child is gone, so its stdin pipe is closed and the writer is
        // finishing if it hasn't already; joining is bounded. Broken pipe
        // was absorbed on the writer thread itself.
        if let Some(writer) = self.writer.lock().unwrap().take() {
            writer.join().expect("stdin writer thread panicked")?;
        }
        Ok(Some(status))
    }
}

/// A handle that streams the standard output of a started expression.
///
/// Created by [`Expression::reader`](crate::Expression::reader). Reading to
/// EOF performs the inner wait, so a checked non-zero status turns into a
/// read error. Dropping the reader before EOF kills the expression and
/// reaps it; an explicit [`kill`](Self::kill) does the same while keeping
/// the reader usable for observing the resulting status.
#[derive(Debug)]
pub struct ReaderHandle {
    handle: Handle,
    reader: File,
}

impl ReaderHandle {
    pub(crate) fn new(handle: Handle, reader: File) -> ReaderHandle {
        ReaderHandle { handle, reader }
    }

    /// Non-blocking wait on the inner expression; see [`Handle::try_wait`].
    pub fn try_wait(&self) -> io::Result<Option<&Output>> {
        self.handle.try_wait()
    }

    /// Forcibly terminate the inner expression and reap it; see
    /// [`Handle::kill`].
    ///
    /// Returns in bounded time even if something still holds the output
    /// pipe open. A read after a kill reports the killed status rather
    /// than touching the pipe.
    pub fn kill(&self) -> io::Result<()> {
        self.handle.kill()
    }

    /// The process IDs of the expression's commands; see [`Handle::pids`].
    pub fn pids(&self) -> Vec<u32> {
        self.handle.pids()
    }
}

impl Read for ReaderHandle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.handle.is_killed() {
            // A grandchild may keep the pipe open long after the kill;
            // don't risk blocking on it. The wait surfaces the status.
            self.handle.wait()?;
            return Ok(0);
        }
        let n = self.reader.read(buf)?;
        if n == 0 && !buf.is_empty() {
            // EOF: every writer is gone. Wait, so that a checked failure
            // becomes a read error here instead of being lost.
            self.handle.wait()?;
        }
        Ok(n)
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        // An abandoned reader would leak zombies; kill and reap instead.
        let _ = self.handle.kill();
    }
}
