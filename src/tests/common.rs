use crate::{Expression, ExitStatus, Handle, Output, ReaderHandle, SpawnConfig, StatusError};

/// Run a short script through the system shell.
#[cfg(unix)]
pub fn shell(script: &str) -> Expression {
    crate::cmd("sh", ["-c", script])
}

#[cfg(windows)]
pub fn shell(script: &str) -> Expression {
    crate::cmd("cmd.exe", ["/c", script])
}

/// Recover the typed status error carried by an `io::Error`.
pub fn status_error(err: &std::io::Error) -> &StatusError {
    err.get_ref()
        .expect("error carries no inner payload")
        .downcast_ref()
        .expect("error payload is not a StatusError")
}

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn public_types_are_send_and_sync() {
    assert_send_sync::<Expression>();
    assert_send_sync::<Handle>();
    assert_send_sync::<ReaderHandle>();
    assert_send_sync::<Output>();
    assert_send_sync::<ExitStatus>();
    assert_send_sync::<StatusError>();
    assert_send_sync::<SpawnConfig>();
}
