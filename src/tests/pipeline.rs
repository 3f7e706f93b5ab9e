use std::io::ErrorKind;

use super::common::{shell, status_error};
use crate::cmd;

#[test]
fn simple_pipe() {
    let out = cmd!("echo", "hi").pipe(cmd!("sed", "s/i/o/")).read().unwrap();
    assert_eq!(out, "ho");
}

#[test]
fn nested_pipes() {
    let out = cmd!("echo", "hi")
        .pipe(cmd!("tr", "i", "o").pipe(cmd!("tr", "h", "j")))
        .read()
        .unwrap();
    assert_eq!(out, "jo");
}

#[test]
fn pipe_with_input() {
    let out = cmd!("head", "-c", "3")
        .pipe(cmd!("tr", "x", "a"))
        .stdin_bytes("xxxxxxxxxx")
        .read()
        .unwrap();
    assert_eq!(out, "aaa");
}

#[test]
fn left_side_hit_by_sigpipe() {
    // The left side writes forever and dies of SIGPIPE when the right side
    // stops reading. That's a non-zero status, so it has to be unchecked.
    let out = cmd!("yes")
        .unchecked()
        .pipe(cmd!("head", "-c", "5"))
        .read()
        .unwrap();
    assert_eq!(out, "y\ny\ny");
}

#[test]
fn checked_failure_on_either_side_wins() {
    // Right side fails.
    let err = cmd!("true").pipe(cmd!("false")).run().unwrap_err();
    assert_eq!(status_error(&err).output.status.code(), Some(1));

    // Left side fails.
    let err = cmd!("false").pipe(cmd!("true")).run().unwrap_err();
    assert_eq!(status_error(&err).output.status.code(), Some(1));

    // Both sides fail: the right error code takes precedence.
    let err = cmd!("false").pipe(shell("exit 3")).run().unwrap_err();
    assert_eq!(status_error(&err).output.status.code(), Some(3));
}

#[test]
fn unchecked_left_does_not_mask_success() {
    // No checked failure anywhere; the left (unchecked, non-zero) status
    // is what comes back.
    let output = cmd!("false").unchecked().pipe(cmd!("true")).run().unwrap();
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn unchecked_right_does_not_mask_checked_left() {
    let err = cmd!("false")
        .pipe(cmd!("true").unchecked())
        .run()
        .unwrap_err();
    assert_eq!(status_error(&err).output.status.code(), Some(1));
}

#[test]
fn unchecked_whole_pipeline_keeps_rightmost_nonzero() {
    let output = cmd!("true")
        .pipe(shell("exit 3"))
        .unchecked()
        .run()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn right_spawn_failure_reaps_the_left_side() {
    // The left side would sleep for a minute; a failed right spawn has to
    // kill and reap it before the error comes back, promptly.
    let start = std::time::Instant::now();
    let err = cmd!("sleep", "60")
        .pipe(cmd!("tubes_test_no_such_program"))
        .start()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(start.elapsed() < std::time::Duration::from_secs(10));
}

#[test]
fn capture_inside_a_pipeline_shares_the_evaluation_pipe() {
    // The stderr capture sits on the left sub-expression, but the bytes
    // come back on the pipeline's own Output.
    let output = shell("echo err 1>&2; echo out")
        .stderr_capture()
        .pipe(cmd!("cat"))
        .stdout_capture()
        .run()
        .unwrap();
    assert_eq!(output.stdout.as_deref(), Some(&b"out\n"[..]));
    assert_eq!(output.stderr.as_deref(), Some(&b"err\n"[..]));
}

#[test]
fn large_outputs_do_not_deadlock() {
    // Well past the OS pipe buffer.
    let output = shell("head -c 100000 /dev/zero")
        .stdout_capture()
        .run()
        .unwrap();
    assert_eq!(output.stdout.map(|bytes| bytes.len()), Some(100000));
}
