use std::io::prelude::*;
use std::time::{Duration, Instant};

use super::common::{shell, status_error};
use crate::cmd;

#[test]
fn start_then_wait() {
    let handle = cmd!("true").start().unwrap();
    let output = handle.wait().unwrap();
    assert!(output.status.success());
    // Waiting again returns the same result.
    let again = handle.wait().unwrap();
    assert!(again.status.success());
}

#[test]
fn wait_collects_capture() {
    let handle = shell("echo hi").stdout_capture().start().unwrap();
    let output = handle.wait().unwrap();
    assert_eq!(output.stdout.as_deref(), Some(&b"hi\n"[..]));
}

#[test]
fn try_wait_does_not_block() {
    let handle = cmd!("sleep", "60").unchecked().start().unwrap();
    assert!(handle.try_wait().unwrap().is_none());
    handle.kill().unwrap();
    // After the kill, the status is available without blocking.
    let output = handle.try_wait().unwrap().expect("killed child not done");
    assert!(!output.status.success());
    #[cfg(unix)]
    assert_eq!(output.status.signal(), Some(libc::SIGKILL));
}

#[test]
fn kill_is_idempotent() {
    let handle = cmd!("sleep", "60").unchecked().start().unwrap();
    handle.kill().unwrap();
    handle.kill().unwrap();
    assert!(!handle.wait().unwrap().status.success());
}

#[test]
fn kill_then_wait_is_a_status_error() {
    let handle = cmd!("sleep", "60").start().unwrap();
    handle.kill().unwrap();
    let err = handle.wait().unwrap_err();
    assert!(!status_error(&err).output.status.success());
}

#[test]
fn pids_in_pipeline_order() {
    let handle = cmd!("sleep", "60")
        .pipe(cmd!("sleep", "60"))
        .unchecked()
        .start()
        .unwrap();
    let pids = handle.pids();
    assert_eq!(pids.len(), 2);
    assert_ne!(pids[0], pids[1]);
    handle.kill().unwrap();
    handle.wait().unwrap();
}

#[test]
fn input_writer_absorbs_broken_pipe() {
    // 100 KB into a child that reads nothing: the writer thread blocks on
    // the pipe, the child exits, and the resulting broken pipe must not
    // surface as an error.
    let output = cmd!("true")
        .stdin_bytes(vec![0u8; 100 * 1000])
        .run()
        .unwrap();
    assert!(output.status.success());
}

#[test]
fn reader_streams_stdout() {
    let mut reader = cmd!("echo", "hi").reader().unwrap();
    let mut out = String::new();
    reader.read_to_string(&mut out).unwrap();
    assert_eq!(out, "hi\n");
}

#[test]
fn reader_surfaces_status_errors_at_eof() {
    let mut reader = shell("echo hi; exit 1").reader().unwrap();
    let mut out = Vec::new();
    let err = reader.read_to_end(&mut out).unwrap_err();
    status_error(&err);
}

#[test]
fn reader_try_wait() {
    let mut reader = cmd!("echo", "hi").reader().unwrap();
    let mut out = String::new();
    reader.read_to_string(&mut out).unwrap();
    assert!(reader.try_wait().unwrap().is_some());
}

#[test]
fn kill_with_grandchild_returns_promptly() {
    // The grandchild sleeps on, holding a copy of the output pipe. Kill
    // must not wait for that pipe to drain, and a read after the kill must
    // report the status instead of blocking on the pipe.
    let mut reader = shell("sleep 60 & echo started; wait").reader().unwrap();
    let mut prefix = [0u8; 8];
    reader.read_exact(&mut prefix).unwrap();
    assert_eq!(&prefix, b"started\n");

    let start = Instant::now();
    reader.kill().unwrap();
    assert!(start.elapsed() < Duration::from_secs(10));

    let mut rest = Vec::new();
    let err = reader.read_to_end(&mut rest).unwrap_err();
    assert!(!status_error(&err).output.status.success());
}

#[test]
fn dropping_a_reader_kills_the_expression() {
    let start = Instant::now();
    let reader = cmd!("sleep", "60").unchecked().reader().unwrap();
    drop(reader);
    assert!(start.elapsed() < Duration::from_secs(10));
}

#[test]
fn concurrent_waits_agree() {
    let handle = shell("echo hi").stdout_capture().start().unwrap();
    std::thread::scope(|scope| {
        let threads: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| handle.wait().unwrap().clone()))
            .collect();
        for thread in threads {
            let output = thread.join().unwrap();
            assert_eq!(output.stdout.as_deref(), Some(&b"hi\n"[..]));
        }
    });
}
