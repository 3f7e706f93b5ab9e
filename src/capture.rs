//! Capture-pipe coordination: one lazily-created pipe per captured stream,
//! shared by every sub-expression that asks for it, drained to a buffer by
//! a background thread once evaluation has finished.

use std::fs::File;
use std::io::{self, Read};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::spawn;

/// Coordinates a single captured stream (stdout or stderr) across one
/// evaluation of an expression.
///
/// The pipe is created on the first request for the write end, and the same
/// end is handed to every later request, so multiple capture redirects in
/// one expression share a destination. After evaluation the evaluator calls
/// [`close_write`](Self::close_write), leaving the children holding the
/// only write ends, and [`start_drain`](Self::start_drain) to begin reading
/// in the background. The drain is joined at wait time, never at kill time.
#[derive(Debug)]
pub(crate) struct OutputCapture {
    state: Mutex<State>,
}

#[derive(Debug)]
enum State {
    Unused,
    Allocated {
        read: Option<File>,
        write: Option<Arc<File>>,
    },
    Draining(Option<JoinHandle<io::Result<Vec<u8>>>>),
    Drained(io::Result<Vec<u8>>),
}

impl OutputCapture {
    pub fn new() -> OutputCapture {
        OutputCapture {
            state: Mutex::new(State::Unused),
        }
    }

    /// Lazily create the pipe and return the shared write end.
    pub fn write_end(&self) -> io::Result<Arc<File>> {
        let mut state = self.state.lock().unwrap();
        if let State::Unused = *state {
            let (read, write) = spawn::pipe()?;
            *state = State::Allocated {
                read: Some(read),
                write: Some(Arc::new(write)),
            };
        }
        match &*state {
            State::Allocated {
                write: Some(write), ..
            } => Ok(Arc::clone(write)),
            _ => unreachable!("capture write end requested after evaluation finished"),
        }
    }

    /// Drop our clone of the write end. Once the evaluation contexts are
    /// gone too, the spawned children hold the only copies, and the drain
    /// will see EOF when the last of them exits.
    pub fn close_write(&self) {
        if let State::Allocated { write, .. } = &mut *self.state.lock().unwrap() {
            write.take();
        }
    }

    /// Take the read end, for a caller that drains the pipe itself. The
    /// coordinator then reports no captured bytes at join time.
    pub fn take_read_end(&self) -> Option<File> {
        match &mut *self.state.lock().unwrap() {
            State::Allocated { read, .. } => read.take(),
            _ => None,
        }
    }

    /// If the pipe was allocated (and its read end not taken), start a
    /// background thread reading it to EOF.
    pub fn start_drain(&self) {
        let mut state = self.state.lock().unwrap();
        if let State::Allocated { read, .. } = &mut *state {
            if let Some(mut read) = read.take() {
                let thread = std::thread::spawn(move || {
                    let mut collected = Vec::new();
                    read.read_to_end(&mut collected)?;
                    Ok(collected)
                });
                *state = State::Draining(Some(thread));
            }
        }
    }

    /// Join the drain thread and return the collected bytes, or `None` if
    /// no capture pipe was ever allocated or the caller took the read end.
    pub fn join_drain(&self) -> io::Result<Option<Vec<u8>>> {
        let mut state = self.state.lock().unwrap();
        match &mut *state {
            State::Unused | State::Allocated { .. } => Ok(None),
            State::Draining(thread) => {
                let thread = thread.take().expect("drain thread taken but state not updated");
                let result = thread.join().expect("capture drain thread panicked");
                let ret = clone_drain_result(&result);
                *state = State::Drained(result);
                ret
            }
            State::Drained(result) => clone_drain_result(result),
        }
    }
}

// io::Error isn't Clone; rebuild it from kind and message for repeat joins.
fn clone_drain_result(result: &io::Result<Vec<u8>>) -> io::Result<Option<Vec<u8>>> {
    match result {
        Ok(bytes) => Ok(Some(bytes.clone())),
        Err(err) => Err(io::Error::new(err.kind(), err.to_string())),
    }
}
