use std::collections::HashMap;
use std::ffi::OsString;

use crate::child::Child;
use crate::posix;
use crate::spawn::{self, SpawnConfig, StdioValue};

fn spawn_child(argv: &[&str]) -> Child {
    let argv: Vec<OsString> = argv.iter().map(|arg| arg.into()).collect();
    let env: HashMap<OsString, OsString> = std::env::vars_os().collect();
    spawn::spawn(
        SpawnConfig::new(argv),
        (
            StdioValue::ParentStdin,
            StdioValue::ParentStdout,
            StdioValue::ParentStderr,
        ),
        &env,
        None,
    )
    .unwrap()
}

#[test]
fn wait_returns_the_exit_status() {
    let child = spawn_child(&["sh", "-c", "exit 42"]);
    let status = child.wait().unwrap();
    assert_eq!(status.code(), Some(42));
    assert!(!status.success());
}

#[test]
fn try_wait_on_a_running_child() {
    let child = spawn_child(&["sleep", "60"]);
    assert!(child.try_wait().unwrap().is_none());
    child.kill().unwrap();
    let status = child.wait().unwrap();
    assert_eq!(status.signal(), Some(libc::SIGKILL));
}

#[test]
fn kill_after_exit_is_a_no_op() {
    let child = spawn_child(&["true"]);
    let status = child.wait().unwrap();
    assert!(status.success());
    // The child is reaped; kill must not signal anything.
    child.kill().unwrap();
    child.kill().unwrap();
}

#[test]
fn kill_before_reaping_does_not_lose_the_status() {
    let child = spawn_child(&["true"]);
    // Let the child exit without reaping it.
    posix::wait_without_reaping(child.pid()).unwrap();
    // The pid still names our zombie, so this signal is safe, and the
    // status stored at reap time is the real one.
    child.kill().unwrap();
    let status = child.wait().unwrap();
    assert!(status.success());
}

#[test]
fn wait_poll_race() {
    // Spawn a short-lived child, let it exit unreaped, then race a
    // blocking wait against a non-blocking probe. The probe must never
    // observe "still running": by the time it holds the status lock the
    // child has exited, and any wait that finished storing the status did
    // so under that same lock.
    for _ in 0..100 {
        let child = spawn_child(&["true"]);
        posix::wait_without_reaping(child.pid()).unwrap();
        std::thread::scope(|scope| {
            let waiter = scope.spawn(|| child.wait().unwrap());
            let polled = child.try_wait().unwrap();
            assert!(
                polled.is_some(),
                "try_wait saw a still-running child after its exit"
            );
            let waited = waiter.join().unwrap();
            assert_eq!(polled.unwrap(), waited);
        });
    }
}

#[test]
fn concurrent_waits_reap_exactly_once() {
    let child = spawn_child(&["true"]);
    std::thread::scope(|scope| {
        let threads: Vec<_> = (0..8).map(|_| scope.spawn(|| child.wait().unwrap())).collect();
        for thread in threads {
            assert!(thread.join().unwrap().success());
        }
    });
}
