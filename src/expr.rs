//! The expression tree and its interpreter.
//!
//! An [`Expression`] is an immutable description of a command, a pipeline,
//! or a modifier layered over either. Evaluation walks the tree once,
//! threading an execution context downward and assembling a mirrored
//! handle tree upward, spawning every command along the way.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::capture::OutputCapture;
use crate::handle::{
    ChildHandle, Handle, HandleNode, Output, PipeHandle, ReaderHandle, StdinBytesHandle, WaitMode,
};
use crate::spawn::{self, SpawnConfig, StdioValue};

/// Build a command expression from a program name and its arguments.
///
/// The program may be a string, which is looked up in the `PATH`, or a
/// path, which is not: a relative `Path` gets a leading `./` so that it
/// always names a local file. Arguments are anything convertible to an
/// `OsString`.
///
/// For a variable argument list written out inline, see [`cmd!`].
///
/// # Example
///
/// ```
/// # fn main() -> std::io::Result<()> {
/// let output = tubes::cmd("echo", ["hello", "world"]).read()?;
/// assert_eq!(output, "hello world");
/// # Ok(())
/// # }
/// ```
pub fn cmd<T, U>(program: T, args: U) -> Expression
where
    T: IntoExecutable,
    U: IntoIterator,
    U::Item: Into<OsString>,
{
    let mut argv = vec![program.into_executable()];
    argv.extend(args.into_iter().map(Into::into));
    Expression(Arc::new(ExpressionInner::Cmd(argv)))
}

/// Build a command expression from a program and inline arguments.
///
/// This is [`cmd`] with the argument list spelled out:
///
/// ```
/// # fn main() -> std::io::Result<()> {
/// let output = tubes::cmd!("echo", "hello", "world").read()?;
/// assert_eq!(output, "hello world");
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! cmd {
    ( $program:expr $(, $arg:expr )* $(,)? ) => {{
        let args: std::vec::Vec<std::ffi::OsString> =
            std::vec![$( std::convert::Into::<std::ffi::OsString>::into($arg) ),*];
        $crate::cmd($program, args)
    }};
}

/// An immutable description of one command, or a composition of commands,
/// together with redirections, environment edits, working-directory
/// overrides, and status-checking policy.
///
/// Expressions are cheap to clone and freely shareable: a sub-expression
/// may appear under several parents, and evaluating the same expression
/// twice produces independent processes with independent side effects.
///
/// Nothing runs until one of the execution verbs is called: [`run`],
/// [`read`], [`start`], or [`reader`].
///
/// # Example
///
/// ```
/// # fn main() -> std::io::Result<()> {
/// use tubes::cmd;
/// let output = cmd!("echo", "hi").pipe(cmd!("tr", "i", "o")).read()?;
/// assert_eq!(output, "ho");
/// # Ok(())
/// # }
/// ```
///
/// [`run`]: Self::run
/// [`read`]: Self::read
/// [`start`]: Self::start
/// [`reader`]: Self::reader
#[derive(Clone)]
#[must_use]
pub struct Expression(Arc<ExpressionInner>);

impl Expression {
    fn new(inner: ExpressionInner) -> Expression {
        Expression(Arc::new(inner))
    }

    fn modify(&self, modifier: Modifier) -> Expression {
        Expression::new(ExpressionInner::Io(modifier, self.clone()))
    }

    // Execution verbs

    /// Evaluate the expression, wait for every process in it to finish,
    /// and return the collected [`Output`].
    ///
    /// Returns an error wrapping a [`StatusError`](crate::StatusError) if
    /// the final status is a non-zero exit not suppressed by
    /// [`unchecked`](Self::unchecked).
    pub fn run(&self) -> io::Result<Output> {
        Ok(self.start()?.wait()?.clone())
    }

    /// Like [`run`](Self::run), with the standard output captured and
    /// decoded as UTF-8: CRLF and lone CR become LF, and a single trailing
    /// newline is stripped, like shell command substitution.
    pub fn read(&self) -> io::Result<String> {
        let output = self.stdout_capture().run()?;
        let bytes = output.stdout.expect("stdout must be captured");
        let mut out = String::from_utf8(bytes)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        if out.contains('\r') {
            out = out.replace("\r\n", "\n").replace('\r', "\n");
        }
        if out.ends_with('\n') {
            out.pop();
        }
        Ok(out)
    }

    /// Evaluate the expression (spawn every command in it) and return a
    /// [`Handle`] without waiting.
    ///
    /// The handle must be waited on (or killed and waited on); abandoning
    /// it leaks zombie processes on Unix.
    pub fn start(&self) -> io::Result<Handle> {
        let stdout_capture = OutputCapture::new();
        let stderr_capture = OutputCapture::new();
        let node = {
            let context = EvalContext::new(&stdout_capture, &stderr_capture);
            self.0.eval(context)?
        };
        // The evaluation contexts are gone; dropping our write ends leaves
        // the children holding the only ones, so the drains can reach EOF.
        stdout_capture.close_write();
        stderr_capture.close_write();
        stdout_capture.start_drain();
        stderr_capture.start_drain();
        Ok(Handle::new(
            node,
            self.to_string(),
            stdout_capture,
            stderr_capture,
        ))
    }

    /// Evaluate the expression with standard output captured, and return a
    /// [`ReaderHandle`] that streams it.
    ///
    /// Reading to EOF performs the inner wait, so a checked non-zero status
    /// surfaces as a read error. Dropping the reader before EOF kills the
    /// expression.
    pub fn reader(&self) -> io::Result<ReaderHandle> {
        let captured = self.stdout_capture();
        let stdout_capture = OutputCapture::new();
        let stderr_capture = OutputCapture::new();
        let node = {
            let context = EvalContext::new(&stdout_capture, &stderr_capture);
            captured.0.eval(context)?
        };
        stdout_capture.close_write();
        stderr_capture.close_write();
        // The caller streams stdout at its own pace; only stderr (if
        // captured) gets a drain thread.
        stderr_capture.start_drain();
        let read_end = stdout_capture
            .take_read_end()
            .expect("implicit stdout capture not allocated");
        let handle = Handle::new(node, self.to_string(), stdout_capture, stderr_capture);
        Ok(ReaderHandle::new(handle, read_end))
    }

    // Composition

    /// Connect this expression's standard output to `right`'s standard
    /// input, like `|` in the shell.
    ///
    /// The two sides run concurrently. The combined exit status prefers, in
    /// order: a checked failure on the right, a checked failure on the
    /// left, an unchecked non-zero status on the right, and otherwise the
    /// left status.
    pub fn pipe(&self, right: Expression) -> Expression {
        Expression::new(ExpressionInner::Pipe(self.clone(), right))
    }

    // stdin

    /// Feed the given bytes to the child's standard input through a pipe.
    ///
    /// A background thread performs the write. If the child exits without
    /// reading all of it, the resulting broken pipe is ignored; the child's
    /// exit status tells the story.
    pub fn stdin_bytes(&self, bytes: impl Into<Vec<u8>>) -> Expression {
        self.modify(Modifier::StdinBytes(Arc::new(bytes.into())))
    }

    /// Open the file at `path` and use it as the child's standard input.
    pub fn stdin_path(&self, path: impl Into<PathBuf>) -> Expression {
        self.modify(Modifier::StdinPath(path.into()))
    }

    /// Use an already open file as the child's standard input.
    pub fn stdin_file(&self, file: File) -> Expression {
        self.modify(Modifier::StdinFile(Arc::new(file)))
    }

    /// Read the child's standard input from the null device.
    pub fn stdin_null(&self) -> Expression {
        self.modify(Modifier::StdinNull)
    }

    // stdout

    /// Create (or truncate) the file at `path` and send the child's
    /// standard output there.
    pub fn stdout_path(&self, path: impl Into<PathBuf>) -> Expression {
        self.modify(Modifier::StdoutPath(path.into()))
    }

    /// Use an already open file as the child's standard output.
    pub fn stdout_file(&self, file: File) -> Expression {
        self.modify(Modifier::StdoutFile(Arc::new(file)))
    }

    /// Discard the child's standard output.
    pub fn stdout_null(&self) -> Expression {
        self.modify(Modifier::StdoutNull)
    }

    /// Capture the child's standard output into [`Output::stdout`].
    ///
    /// Capture requests anywhere in one expression share a single pipe per
    /// stream, drained by a background thread, so capturing cannot deadlock
    /// however much the children write.
    pub fn stdout_capture(&self) -> Expression {
        self.modify(Modifier::StdoutCapture)
    }

    /// Send the child's standard output wherever its standard error
    /// currently goes, like `1>&2` in the shell.
    pub fn stdout_to_stderr(&self) -> Expression {
        self.modify(Modifier::StdoutToStderr)
    }

    /// Swap the child's standard output and standard error.
    pub fn stdout_stderr_swap(&self) -> Expression {
        self.modify(Modifier::StdoutStderrSwap)
    }

    // stderr

    /// Create (or truncate) the file at `path` and send the child's
    /// standard error there.
    pub fn stderr_path(&self, path: impl Into<PathBuf>) -> Expression {
        self.modify(Modifier::StderrPath(path.into()))
    }

    /// Use an already open file as the child's standard error.
    pub fn stderr_file(&self, file: File) -> Expression {
        self.modify(Modifier::StderrFile(Arc::new(file)))
    }

    /// Discard the child's standard error.
    pub fn stderr_null(&self) -> Expression {
        self.modify(Modifier::StderrNull)
    }

    /// Capture the child's standard error into [`Output::stderr`].
    pub fn stderr_capture(&self) -> Expression {
        self.modify(Modifier::StderrCapture)
    }

    /// Send the child's standard error wherever its standard output
    /// currently goes, like `2>&1` in the shell.
    pub fn stderr_to_stdout(&self) -> Expression {
        self.modify(Modifier::StderrToStdout)
    }

    // environment

    /// Run the child in the given working directory.
    ///
    /// Note the interaction with relative program paths: a program like
    /// `./foo/bar` is resolved against the *parent's* working directory,
    /// not against `dir`.
    pub fn dir(&self, path: impl Into<PathBuf>) -> Expression {
        self.modify(Modifier::Dir(path.into()))
    }

    /// Set an environment variable for the child. On Windows the name is
    /// matched case-insensitively.
    pub fn env(&self, name: impl Into<OsString>, value: impl Into<OsString>) -> Expression {
        self.modify(Modifier::Env(name.into(), value.into()))
    }

    /// Remove an environment variable from the child's environment.
    /// Removing a variable that isn't set does nothing.
    pub fn env_remove(&self, name: impl Into<OsString>) -> Expression {
        self.modify(Modifier::EnvRemove(name.into()))
    }

    /// Replace the child's entire environment with the given map.
    pub fn full_env<T, K, V>(&self, env: T) -> Expression
    where
        T: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let map = env
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.modify(Modifier::FullEnv(map))
    }

    // policy

    /// Don't treat a non-zero exit status of this sub-expression as an
    /// error.
    ///
    /// The numeric status is preserved in [`Output::status`]; only the
    /// error-on-wait behavior is suppressed, and only for this sub-tree.
    pub fn unchecked(&self) -> Expression {
        self.modify(Modifier::Unchecked)
    }

    /// Run a hook just before each command beneath this expression is
    /// spawned. Hooks may append arguments and set spawn options through
    /// the [`SpawnConfig`]; outer hooks run before inner ones.
    pub fn before_spawn<F>(&self, hook: F) -> Expression
    where
        F: Fn(&mut SpawnConfig) -> io::Result<()> + Send + Sync + 'static,
    {
        self.modify(Modifier::BeforeSpawn(SpawnHook {
            inner: Arc::new(hook),
        }))
    }
}

impl fmt::Display for Expression {
    /// Renders the expression as the builder calls that reconstruct it,
    /// e.g. `cmd!("echo", "hi").pipe(cmd!("wc", "-c"))`. Opaque payloads
    /// (open files, hooks) render as `..`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

enum ExpressionInner {
    Cmd(Vec<OsString>),
    Pipe(Expression, Expression),
    Io(Modifier, Expression),
}

impl ExpressionInner {
    fn eval(&self, context: EvalContext<'_>) -> io::Result<HandleNode> {
        match self {
            ExpressionInner::Cmd(argv) => eval_cmd(argv, context),
            ExpressionInner::Pipe(left, right) => eval_pipe(left, right, context),
            ExpressionInner::Io(modifier, inner) => eval_io(modifier, inner, context),
        }
    }
}

impl fmt::Display for ExpressionInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExpressionInner::Cmd(argv) => {
                write!(f, "cmd!(")?;
                for (i, arg) in argv.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{:?}", arg.to_string_lossy())?;
                }
                write!(f, ")")
            }
            ExpressionInner::Pipe(left, right) => write!(f, "{}.pipe({})", left, right),
            ExpressionInner::Io(modifier, inner) => write!(f, "{}.{}", inner, modifier),
        }
    }
}

enum Modifier {
    StdinBytes(Arc<Vec<u8>>),
    StdinPath(PathBuf),
    StdinFile(Arc<File>),
    StdinNull,
    StdoutPath(PathBuf),
    StdoutFile(Arc<File>),
    StdoutNull,
    StdoutCapture,
    StdoutToStderr,
    StdoutStderrSwap,
    StderrPath(PathBuf),
    StderrFile(Arc<File>),
    StderrNull,
    StderrCapture,
    StderrToStdout,
    Dir(PathBuf),
    Env(OsString, OsString),
    EnvRemove(OsString),
    FullEnv(HashMap<OsString, OsString>),
    Unchecked,
    BeforeSpawn(SpawnHook),
}

impl fmt::Display for Modifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn lossy(os: &OsStr) -> String {
            format!("{:?}", os.to_string_lossy())
        }
        match self {
            Modifier::StdinBytes(bytes) => {
                write!(f, "stdin_bytes(b\"{}\")", bytes.escape_ascii())
            }
            Modifier::StdinPath(path) => write!(f, "stdin_path({})", lossy(path.as_os_str())),
            Modifier::StdinFile(_) => write!(f, "stdin_file(..)"),
            Modifier::StdinNull => write!(f, "stdin_null()"),
            Modifier::StdoutPath(path) => write!(f, "stdout_path({})", lossy(path.as_os_str())),
            Modifier::StdoutFile(_) => write!(f, "stdout_file(..)"),
            Modifier::StdoutNull => write!(f, "stdout_null()"),
            Modifier::StdoutCapture => write!(f, "stdout_capture()"),
            Modifier::StdoutToStderr => write!(f, "stdout_to_stderr()"),
            Modifier::StdoutStderrSwap => write!(f, "stdout_stderr_swap()"),
            Modifier::StderrPath(path) => write!(f, "stderr_path({})", lossy(path.as_os_str())),
            Modifier::StderrFile(_) => write!(f, "stderr_file(..)"),
            Modifier::StderrNull => write!(f, "stderr_null()"),
            Modifier::StderrCapture => write!(f, "stderr_capture()"),
            Modifier::StderrToStdout => write!(f, "stderr_to_stdout()"),
            Modifier::Dir(path) => write!(f, "dir({})", lossy(path.as_os_str())),
            Modifier::Env(name, value) => {
                write!(f, "env({}, {})", lossy(name), lossy(value))
            }
            Modifier::EnvRemove(name) => write!(f, "env_remove({})", lossy(name)),
            Modifier::FullEnv(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort();
                write!(f, "full_env(vec![")?;
                for (i, (name, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "({}, {})", lossy(name), lossy(value))?;
                }
                write!(f, "])")
            }
            Modifier::Unchecked => write!(f, "unchecked()"),
            Modifier::BeforeSpawn(_) => write!(f, "before_spawn(..)"),
        }
    }
}

#[derive(Clone)]
struct SpawnHook {
    inner: Arc<dyn Fn(&mut SpawnConfig) -> io::Result<()> + Send + Sync>,
}

/// The execution context threaded down through evaluation. Contexts are
/// never shared mutably: each edge that changes one works on its own copy,
/// so sibling sub-expressions can't observe each other's modifications.
#[derive(Clone)]
struct EvalContext<'a> {
    stdin: StdioValue,
    stdout: StdioValue,
    stderr: StdioValue,
    dir: Option<PathBuf>,
    env: HashMap<OsString, OsString>,
    stdout_capture: &'a OutputCapture,
    stderr_capture: &'a OutputCapture,
    before_spawn_hooks: Vec<SpawnHook>,
}

impl<'a> EvalContext<'a> {
    fn new(stdout_capture: &'a OutputCapture, stderr_capture: &'a OutputCapture) -> EvalContext<'a> {
        EvalContext {
            stdin: StdioValue::ParentStdin,
            stdout: StdioValue::ParentStdout,
            stderr: StdioValue::ParentStderr,
            dir: None,
            env: std::env::vars_os()
                .map(|(name, value)| (canonicalize_env_var_name(name), value))
                .collect(),
            stdout_capture,
            stderr_capture,
            before_spawn_hooks: Vec::new(),
        }
    }
}

fn eval_cmd(argv: &[OsString], context: EvalContext<'_>) -> io::Result<HandleNode> {
    let EvalContext {
        stdin,
        stdout,
        stderr,
        dir,
        env,
        before_spawn_hooks,
        ..
    } = context;
    let mut argv = argv.to_vec();
    if dir.is_some() {
        argv[0] = canonicalize_exe_path(&argv[0])?;
    }
    let mut config = SpawnConfig::new(argv);
    // Outermost hooks run first.
    for hook in &before_spawn_hooks {
        (hook.inner)(&mut config)?;
    }
    let child = spawn::spawn(config, (stdin, stdout, stderr), &env, dir.as_deref())?;
    Ok(HandleNode::Child(ChildHandle::new(child)))
}

fn eval_pipe(
    left: &Expression,
    right: &Expression,
    context: EvalContext<'_>,
) -> io::Result<HandleNode> {
    let (read_end, write_end) = spawn::pipe()?;
    let mut left_context = context.clone();
    left_context.stdout = StdioValue::File(Arc::new(write_end));
    let left_node = left.0.eval(left_context)?;
    let mut right_context = context;
    right_context.stdin = StdioValue::File(Arc::new(read_end));
    let right_node = match right.0.eval(right_context) {
        Ok(node) => node,
        Err(err) => {
            // The left side is already running; kill and reap it before
            // surfacing the failure, or it would be leaked as a zombie.
            // The capture drains are not joined here (they haven't even
            // started). The spawn error wins over any cleanup error.
            let _ = left_node.kill();
            let _ = left_node.wait(WaitMode::Killing);
            return Err(err);
        }
    };
    Ok(HandleNode::Pipe(Box::new(PipeHandle {
        left: left_node,
        right: right_node,
    })))
}

fn eval_io(
    modifier: &Modifier,
    inner: &Expression,
    mut context: EvalContext<'_>,
) -> io::Result<HandleNode> {
    match modifier {
        Modifier::StdinBytes(bytes) => {
            let (read_end, mut write_end) = spawn::pipe()?;
            let bytes = Arc::clone(bytes);
            // The child may exit without reading its input; that broken
            // pipe is not an error, the exit status tells the story.
            let writer = std::thread::spawn(move || match write_end.write_all(&bytes) {
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => Ok(()),
                other => other,
            });
            context.stdin = StdioValue::File(Arc::new(read_end));
            let inner_node = inner.0.eval(context)?;
            return Ok(HandleNode::StdinBytes(Box::new(StdinBytesHandle::new(
                inner_node, writer,
            ))));
        }
        Modifier::StdinPath(path) => {
            context.stdin = StdioValue::File(Arc::new(File::open(path)?));
        }
        Modifier::StdinFile(file) => {
            context.stdin = StdioValue::File(Arc::clone(file));
        }
        Modifier::StdinNull => {
            context.stdin = StdioValue::File(Arc::new(open_null(true)?));
        }
        Modifier::StdoutPath(path) => {
            context.stdout = StdioValue::File(Arc::new(File::create(path)?));
        }
        Modifier::StdoutFile(file) => {
            context.stdout = StdioValue::File(Arc::clone(file));
        }
        Modifier::StdoutNull => {
            context.stdout = StdioValue::File(Arc::new(open_null(false)?));
        }
        Modifier::StdoutCapture => {
            context.stdout = StdioValue::File(context.stdout_capture.write_end()?);
        }
        Modifier::StdoutToStderr => {
            context.stdout = context.stderr.clone();
        }
        Modifier::StdoutStderrSwap => {
            mem::swap(&mut context.stdout, &mut context.stderr);
        }
        Modifier::StderrPath(path) => {
            context.stderr = StdioValue::File(Arc::new(File::create(path)?));
        }
        Modifier::StderrFile(file) => {
            context.stderr = StdioValue::File(Arc::clone(file));
        }
        Modifier::StderrNull => {
            context.stderr = StdioValue::File(Arc::new(open_null(false)?));
        }
        Modifier::StderrCapture => {
            context.stderr = StdioValue::File(context.stderr_capture.write_end()?);
        }
        Modifier::StderrToStdout => {
            context.stderr = context.stdout.clone();
        }
        Modifier::Dir(path) => {
            context.dir = Some(path.clone());
        }
        Modifier::Env(name, value) => {
            context
                .env
                .insert(canonicalize_env_var_name(name.clone()), value.clone());
        }
        Modifier::EnvRemove(name) => {
            context.env.remove(&canonicalize_env_var_name(name.clone()));
        }
        Modifier::FullEnv(map) => {
            context.env = map
                .iter()
                .map(|(name, value)| (canonicalize_env_var_name(name.clone()), value.clone()))
                .collect();
        }
        Modifier::Unchecked => {
            let inner_node = inner.0.eval(context)?;
            return Ok(HandleNode::Unchecked(Box::new(inner_node)));
        }
        Modifier::BeforeSpawn(hook) => {
            context.before_spawn_hooks.push(hook.clone());
        }
    }
    inner.0.eval(context)
}

fn open_null(for_read: bool) -> io::Result<File> {
    if for_read {
        OpenOptions::new().read(true).open(spawn::NULL_DEVICE)
    } else {
        OpenOptions::new().write(true).open(spawn::NULL_DEVICE)
    }
}

// Windows environments are case-insensitive; upper-casing names at every
// insertion, lookup, and deletion makes the map behave the same way.
fn canonicalize_env_var_name(name: OsString) -> OsString {
    if !cfg!(windows) {
        return name;
    }
    match name.into_string() {
        Ok(name) => name.to_uppercase().into(),
        Err(name) => name,
    }
}

// Exec happens after the child's chdir, so a relative program path with a
// separator would resolve against the child's directory. Resolve it against
// ours instead. A bare program name is left alone for the PATH search.
fn canonicalize_exe_path(exe_name: &OsStr) -> io::Result<OsString> {
    let has_separator = exe_name
        .to_string_lossy()
        .chars()
        .any(std::path::is_separator);
    let path = Path::new(exe_name);
    if has_separator && path.is_relative() {
        Ok(fs::canonicalize(path)?.into_os_string())
    } else {
        Ok(exe_name.to_owned())
    }
}

/// A type that can name the program of a command expression.
///
/// Strings pass through untouched and are subject to the operating system's
/// `PATH` search. Paths are taken to name a file: a relative path gets a
/// leading `./`, so `Path::new("foo.sh")` runs the local script rather than
/// hitting the `PATH`.
pub trait IntoExecutable {
    /// Perform the conversion.
    fn into_executable(self) -> OsString;
}

impl IntoExecutable for &Path {
    fn into_executable(self) -> OsString {
        dotify_relative_exe_path(self).into_os_string()
    }
}

impl IntoExecutable for PathBuf {
    fn into_executable(self) -> OsString {
        dotify_relative_exe_path(&self).into_os_string()
    }
}

impl IntoExecutable for &PathBuf {
    fn into_executable(self) -> OsString {
        dotify_relative_exe_path(self).into_os_string()
    }
}

impl IntoExecutable for &str {
    fn into_executable(self) -> OsString {
        self.into()
    }
}

impl IntoExecutable for String {
    fn into_executable(self) -> OsString {
        self.into()
    }
}

impl IntoExecutable for &String {
    fn into_executable(self) -> OsString {
        self.into()
    }
}

impl IntoExecutable for &OsStr {
    fn into_executable(self) -> OsString {
        self.to_owned()
    }
}

impl IntoExecutable for OsString {
    fn into_executable(self) -> OsString {
        self
    }
}

impl IntoExecutable for &OsString {
    fn into_executable(self) -> OsString {
        self.clone()
    }
}

// Joining onto "." turns "foo/bar" into "./foo/bar", so the program always
// names a file instead of triggering a PATH search.
fn dotify_relative_exe_path(path: &Path) -> PathBuf {
    if path.is_relative() {
        Path::new(".").join(path)
    } else {
        path.to_path_buf()
    }
}
