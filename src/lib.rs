//! Composition and execution of child processes as expression trees.
//!
//! The entry point to the crate is the [`cmd`] function (and its variadic
//! twin, the [`cmd!`] macro), which builds an immutable [`Expression`]
//! describing one command. Methods on `Expression` layer on redirections,
//! environment edits, working-directory overrides, and status-checking
//! policy, and [`pipe`](Expression::pipe) composes two expressions the way
//! `|` does in the shell. Nothing runs until an execution verb is called.
//!
//! Compared to `std::process`, the crate provides:
//!
//! * Whole pipelines as values, with an exit-status rule that refuses to
//!   let an ignored failure on one side mask a real one on the other.
//!
//! * Deadlock-free capture of standard output and standard error, drained
//!   by background threads however much the children write.
//!
//! * `wait`, `try_wait`, and `kill` that are safe to race from multiple
//!   threads: a child is reaped exactly once, its exit status is never
//!   lost, and a kill can never signal a process id that the OS has
//!   already recycled.
//!
//! * Cleanup on the error paths: if the right side of a pipeline fails to
//!   spawn, the already-running left side is killed and reaped before the
//!   error is returned.
//!
//! # Examples
//!
//! Run a command and capture its output:
//!
//! ```
//! # fn main() -> std::io::Result<()> {
//! use tubes::cmd;
//!
//! let output = cmd!("echo", "hi").read()?;
//! assert_eq!(output, "hi");
//! # Ok(())
//! # }
//! ```
//!
//! Build a pipeline, feed it input, and collect both output streams:
//!
//! ```
//! # fn main() -> std::io::Result<()> {
//! use tubes::cmd;
//!
//! let output = cmd!("sort")
//!     .pipe(cmd!("uniq"))
//!     .stdin_bytes("b\na\nb\n")
//!     .stdout_capture()
//!     .stderr_capture()
//!     .run()?;
//! assert_eq!(output.stdout.as_deref(), Some(&b"a\nb\n"[..]));
//! # Ok(())
//! # }
//! ```
//!
//! A non-zero exit status is an error by default; opt out per
//! sub-expression with [`unchecked`](Expression::unchecked):
//!
//! ```
//! # fn main() -> std::io::Result<()> {
//! use tubes::cmd;
//!
//! assert!(cmd!("false").run().is_err());
//! let output = cmd!("false").unchecked().run()?;
//! assert_eq!(output.status.code(), Some(1));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod capture;
mod child;
mod expr;
mod handle;
mod spawn;

#[cfg(unix)]
mod posix;

#[cfg(windows)]
mod win32;

pub use crate::child::ExitStatus;
pub use crate::expr::{Expression, IntoExecutable, cmd};
pub use crate::handle::{Handle, Output, ReaderHandle, StatusError};
pub use crate::spawn::SpawnConfig;

#[cfg(test)]
mod tests {
    mod common;
    mod expr;
    mod handle;
    mod pipeline;
    #[cfg(unix)]
    mod child;
}
