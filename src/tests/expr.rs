use std::collections::HashMap;
use std::fs::{self, File};
use std::io::ErrorKind;
use std::path::Path;

use tempfile::TempDir;

use super::common::shell;
use crate::{Expression, cmd};

#[test]
fn hello_world() {
    let out = cmd!("echo", "hi").read().unwrap();
    assert_eq!(out, "hi");
}

#[test]
fn read_strips_a_single_trailing_newline() {
    let out = shell("printf 'hi\\n\\n'").read().unwrap();
    assert_eq!(out, "hi\n");
}

#[test]
fn read_unicode() {
    let out = cmd!("echo", "日本語").read().unwrap();
    assert_eq!(out, "日本語");
}

#[test]
fn read_rejects_invalid_utf8() {
    let err = shell("printf '\\303\\050'").read().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidData);
}

#[test]
fn run_with_capture() {
    let output = shell("echo more stuff").stdout_capture().run().unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout.as_deref(), Some(&b"more stuff\n"[..]));
    assert_eq!(output.stderr, None);
}

#[test]
fn output_is_absent_without_capture() {
    let output = cmd!("true").run().unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout, None);
    assert_eq!(output.stderr, None);
}

#[test]
fn stdin_bytes() {
    let out = cmd!("tr", "o", "a").stdin_bytes("foo").read().unwrap();
    assert_eq!(out, "faa");
}

#[test]
fn stdin_path_and_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("input");
    fs::write(&path, "foo").unwrap();
    let out = cmd!("cat").stdin_path(&path).read().unwrap();
    assert_eq!(out, "foo");
    let out = cmd!("cat")
        .stdin_file(File::open(&path).unwrap())
        .read()
        .unwrap();
    assert_eq!(out, "foo");
}

#[test]
fn stdin_null() {
    let out = cmd!("cat").stdin_null().read().unwrap();
    assert_eq!(out, "");
}

#[test]
fn stdout_path_and_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("by_path");
    cmd!("echo", "hi").stdout_path(&path).run().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "hi\n");

    let path = temp.path().join("by_file");
    let file = File::create(&path).unwrap();
    cmd!("echo", "hi").stdout_file(file).run().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "hi\n");
}

#[test]
fn stdout_null() {
    let out = shell("echo hi").stdout_null().read().unwrap();
    assert_eq!(out, "");
}

#[test]
fn stderr_path() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("errors");
    shell("echo hi 1>&2").stderr_path(&path).run().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "hi\n");
}

#[test]
fn stdout_to_stderr() {
    let output = shell("echo hi")
        .stdout_to_stderr()
        .stdout_capture()
        .stderr_capture()
        .run()
        .unwrap();
    assert_eq!(output.stdout.as_deref(), Some(&b""[..]));
    assert_eq!(output.stderr.as_deref(), Some(&b"hi\n"[..]));
}

#[test]
fn stderr_to_stdout_joins_the_redirected_stdout() {
    // stderr must join where stdout points *now* (the capture pipe), not
    // where it pointed before the redirect.
    let out = shell("echo hi 1>&2").stderr_to_stdout().read().unwrap();
    assert_eq!(out, "hi");
}

#[test]
fn swap_then_capture() {
    let output = shell("echo out; echo err 1>&2")
        .stdout_stderr_swap()
        .stdout_capture()
        .stderr_capture()
        .run()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(output.stdout.as_deref(), Some(&b"err\n"[..]));
    assert_eq!(output.stderr.as_deref(), Some(&b"out\n"[..]));
}

#[test]
fn env() {
    let out = shell("echo $x").env("x", "foo").read().unwrap();
    assert_eq!(out, "foo");
}

#[test]
fn env_remove() {
    // The outer env sets the variable; the inner env_remove strips it
    // before the command sees it.
    let out = shell("echo $x")
        .env_remove("x")
        .env("x", "foo")
        .read()
        .unwrap();
    assert_eq!(out, "");
}

#[test]
fn full_env() {
    let out = shell("echo $x")
        .full_env(vec![("x", "foo")])
        .read()
        .unwrap();
    assert_eq!(out, "foo");

    // A full_env closer to the command wipes out an outer env.
    let out = shell("echo $x")
        .full_env(HashMap::<String, String>::new())
        .env("x", "foo")
        .read()
        .unwrap();
    assert_eq!(out, "");
}

#[test]
fn env_edits_do_not_leak_across_evaluations() {
    let expr = shell("echo $x").env("x", "foo");
    assert_eq!(expr.read().unwrap(), "foo");
    assert_eq!(expr.read().unwrap(), "foo");
}

#[test]
fn dir() {
    let temp = TempDir::new().unwrap();
    let expected = temp.path().canonicalize().unwrap();
    let out = cmd!("pwd").dir(temp.path()).read().unwrap();
    assert_eq!(Path::new(&out), expected);
    // The innermost dir wins.
    let other = TempDir::new().unwrap();
    let out = cmd!("pwd")
        .dir(temp.path())
        .dir(other.path())
        .read()
        .unwrap();
    assert_eq!(Path::new(&out), expected);
}

#[cfg(unix)]
fn write_script(path: &Path, body: &str) {
    use std::os::unix::fs::PermissionsExt;
    fs::write(path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    let mut perms = fs::metadata(path).unwrap().permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).unwrap();
}

#[cfg(unix)]
#[test]
fn commands_can_be_paths() {
    let temp = TempDir::new().unwrap();
    let script = temp.path().join("script.sh");
    write_script(&script, "echo some stuff");
    assert_eq!(cmd!(script.as_path()).read().unwrap(), "some stuff");
}

#[cfg(unix)]
#[test]
fn relative_exe_path_resolves_against_parent_cwd_not_dir() {
    // A relative program path containing a separator must launch the same
    // file whether or not `dir` moves the child somewhere else.
    let local = tempfile::Builder::new()
        .prefix("exe-path-test")
        .tempdir_in(".")
        .unwrap();
    let script = local.path().join("script.sh");
    write_script(&script, "echo foo");
    assert!(script.is_relative());
    let far = TempDir::new().unwrap();
    let out = cmd!(script.as_path()).dir(far.path()).read().unwrap();
    assert_eq!(out, "foo");
}

#[cfg(unix)]
#[test]
fn local_path_does_not_match_path_lookup() {
    // Path::new("echo") means ./echo, which doesn't exist here; it must
    // not fall back to the PATH search.
    let echo_path = Path::new("echo");
    assert!(!echo_path.exists(), "expected no local file named echo");
    let err = cmd!(echo_path).run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn program_not_found() {
    let err = cmd!("tubes_test_no_such_program").run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn null_byte_in_argv_is_invalid_input() {
    let err = cmd!("echo\0foo").run().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn before_spawn_appends_args_outermost_first() {
    let out = cmd!("echo")
        .before_spawn(|config| {
            config.arg("inner");
            Ok(())
        })
        .before_spawn(|config| {
            config.arg("outer");
            Ok(())
        })
        .read()
        .unwrap();
    assert_eq!(out, "outer inner");
}

#[test]
fn shared_subexpressions_evaluate_independently() {
    let shared = cmd!("echo", "hi");
    let o = shared.pipe(cmd!("tr", "i", "o")).read().unwrap();
    let a = shared.pipe(cmd!("tr", "i", "a")).read().unwrap();
    assert_eq!(o, "ho");
    assert_eq!(a, "ha");
}

#[test]
fn rendering_round_trips() {
    // Each rendering is exactly the builder syntax that produced it.
    let expressions: Vec<(Expression, &str)> = vec![
        (
            cmd!("foo").unchecked().env("a", "b"),
            r#"cmd!("foo").unchecked().env("a", "b")"#,
        ),
        (
            cmd!("foo").pipe(cmd!("bar", "x y")),
            r#"cmd!("foo").pipe(cmd!("bar", "x y"))"#,
        ),
        (
            cmd!("foo").stdin_null().stdout_to_stderr(),
            r#"cmd!("foo").stdin_null().stdout_to_stderr()"#,
        ),
        (
            cmd!("foo").stderr_null().stderr_to_stdout(),
            r#"cmd!("foo").stderr_null().stderr_to_stdout()"#,
        ),
        (cmd!("foo").dir("stuff"), r#"cmd!("foo").dir("stuff")"#),
        (
            cmd!("foo").stdin_bytes("a\nb"),
            r#"cmd!("foo").stdin_bytes(b"a\nb")"#,
        ),
        (
            cmd!("foo").full_env(vec![("a", "b")]),
            r#"cmd!("foo").full_env(vec![("a", "b")])"#,
        ),
        (
            cmd!("foo").stdout_stderr_swap().stdout_capture(),
            r#"cmd!("foo").stdout_stderr_swap().stdout_capture()"#,
        ),
        (
            cmd!("foo").env_remove("a").stdin_path("p"),
            r#"cmd!("foo").env_remove("a").stdin_path("p")"#,
        ),
    ];
    for (expression, expected) in &expressions {
        assert_eq!(&expression.to_string(), expected);
        // Debug is the same rendering.
        assert_eq!(&format!("{:?}", expression), expected);
    }
}

#[test]
fn status_error_message_contains_the_rendering() {
    let err = cmd!("false").run().unwrap_err();
    let message = err.to_string();
    assert!(message.contains(r#"cmd!("false")"#), "got: {message}");
}
