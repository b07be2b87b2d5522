//! Integration tests for `arb serve`: the stdio protocol and graceful
//! shutdown on dispose, stdin EOF and signals.

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tempfile::TempDir;

fn arb_binary() -> std::path::PathBuf {
    assert_cmd::cargo::cargo_bin!("arb").into()
}

fn spawn_serve(data_dir: &TempDir) -> Child {
    Command::new(arb_binary())
        .arg("serve")
        .env("ARB_DATA_DIR", data_dir.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn arb serve")
}

/// Wait for the pidfile to appear, indicating the bridge has started.
fn wait_for_pidfile(data_dir: &TempDir) {
    let pidfile = data_dir.path().join("arb-serve.pid");
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if pidfile.exists() {
            return;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

fn send(child: &mut Child, msg: &Value) {
    let stdin = child.stdin.as_mut().expect("stdin pipe");
    let line = serde_json::to_string(msg).unwrap();
    writeln!(stdin, "{line}").unwrap();
    stdin.flush().unwrap();
}

/// Read stdout lines until the response for `id` arrives. Returns every line
/// seen, the response last.
fn read_until_response(reader: &mut BufReader<ChildStdout>, id: u64) -> Vec<Value> {
    let mut seen = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        let n = reader.read_line(&mut line).unwrap();
        assert!(n > 0, "stdout closed before response {id}; saw {seen:?}");
        let value: Value = serde_json::from_str(line.trim()).unwrap();
        let done = value["id"] == id;
        seen.push(value);
        if done {
            return seen;
        }
    }
}

fn wait_with_deadline(child: &mut Child) -> std::process::ExitStatus {
    let deadline = Instant::now() + Duration::from_secs(3);
    loop {
        if let Some(status) = child.try_wait().expect("try_wait") {
            return status;
        }
        assert!(Instant::now() < deadline, "arb serve did not exit");
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Closing stdin before any request should still exit cleanly (code 0).
#[test]
fn serve_exits_on_early_stdin_eof() {
    let dir = TempDir::new().unwrap();
    let mut child = spawn_serve(&dir);
    wait_for_pidfile(&dir);

    drop(child.stdin.take());

    let status = wait_with_deadline(&mut child);
    assert!(status.success(), "stdin EOF should exit 0, got {status}");
}

#[test]
fn serve_answers_requests_then_exits_on_dispose() {
    let dir = TempDir::new().unwrap();
    let mut child = spawn_serve(&dir);
    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    wait_for_pidfile(&dir);

    send(
        &mut child,
        &json!({"id": 1, "method": "createAnchor", "args": {
            "name": "A",
            "transformation": [1,0,0,0, 0,1,0,0, 0,0,1,0, 1,2,3,1]
        }}),
    );
    let lines = read_until_response(&mut stdout, 1);
    assert_eq!(lines.last().unwrap()["result"], true);

    send(&mut child, &json!({"id": 2, "method": "getAnchorPose", "args": {"name": "A"}}));
    let lines = read_until_response(&mut stdout, 2);
    let matrix = lines.last().unwrap()["result"].as_array().unwrap().clone();
    assert_eq!(matrix[12], 1.0);
    assert_eq!(matrix[13], 2.0);
    assert_eq!(matrix[14], 3.0);

    send(&mut child, &json!({"id": 3, "method": "createAnchor", "args": {
        "name": "A",
        "transformation": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,0,1]
    }}));
    let lines = read_until_response(&mut stdout, 3);
    assert_eq!(lines.last().unwrap()["error"]["kind"], "DuplicateName");

    send(&mut child, &json!({"id": 4, "method": "dispose"}));
    let lines = read_until_response(&mut stdout, 4);
    assert!(lines.last().unwrap()["result"].is_null());

    let status = wait_with_deadline(&mut child);
    assert!(status.success(), "dispose should exit 0, got {status}");
}

#[test]
fn serve_replies_to_snapshot_after_a_frame() {
    let dir = TempDir::new().unwrap();
    let mut child = spawn_serve(&dir);
    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    wait_for_pidfile(&dir);

    send(&mut child, &json!({"id": 7, "method": "snapshot"}));
    let lines = read_until_response(&mut stdout, 7);
    let image = lines.last().unwrap()["result"].as_str().unwrap().to_string();
    assert!(image.starts_with("iVBORw0KGg"), "not a PNG payload: {image}");

    drop(child.stdin.take());
    assert!(wait_with_deadline(&mut child).success());
}

#[test]
fn serve_reports_malformed_lines() {
    let dir = TempDir::new().unwrap();
    let mut child = spawn_serve(&dir);
    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    wait_for_pidfile(&dir);

    {
        let stdin = child.stdin.as_mut().unwrap();
        writeln!(stdin, "{{\"id\": 5, \"args\": 1}}").unwrap();
        stdin.flush().unwrap();
    }
    let lines = read_until_response(&mut stdout, 5);
    assert_eq!(lines.last().unwrap()["error"]["kind"], "InvalidCommand");

    drop(child.stdin.take());
    assert!(wait_with_deadline(&mut child).success());
}

#[cfg(unix)]
#[test]
fn serve_exits_on_sigterm() {
    let dir = TempDir::new().unwrap();
    let mut child = spawn_serve(&dir);
    wait_for_pidfile(&dir);

    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }

    let start = Instant::now();
    wait_with_deadline(&mut child);
    assert!(start.elapsed() < Duration::from_secs(2));
}

#[test]
fn pidfile_created_and_removed_on_exit() {
    let dir = TempDir::new().unwrap();
    let pidfile = dir.path().join("arb-serve.pid");

    let mut child = spawn_serve(&dir);
    wait_for_pidfile(&dir);

    assert!(pidfile.exists(), "pidfile should exist while serving");
    let content = std::fs::read_to_string(&pidfile).unwrap();
    let file_pid: u32 = content
        .trim()
        .parse()
        .expect("pidfile should contain a PID");
    assert_eq!(file_pid, child.id(), "pidfile PID should match child PID");

    drop(child.stdin.take());
    wait_with_deadline(&mut child);

    assert!(
        !pidfile.exists(),
        "pidfile should be removed after clean shutdown"
    );
}

#[test]
fn wal_checkpoint_on_exit() {
    let dir = TempDir::new().unwrap();
    let mut child = spawn_serve(&dir);
    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    wait_for_pidfile(&dir);

    send(&mut child, &json!({"id": 1, "method": "initCloudAnchorMode"}));
    send(&mut child, &json!({"id": 2, "method": "createAnchor", "args": {
        "name": "A",
        "transformation": [1,0,0,0, 0,1,0,0, 0,0,1,0, 0,0,-1,1]
    }}));
    send(&mut child, &json!({"id": 3, "method": "hostAnchor", "args": {"name": "A"}}));
    read_until_response(&mut stdout, 3);

    // Frames tick on their own; wait for the upload event.
    let deadline = Instant::now() + Duration::from_secs(3);
    let mut line = String::new();
    loop {
        assert!(Instant::now() < deadline, "no upload event");
        line.clear();
        stdout.read_line(&mut line).unwrap();
        if line.contains("onCloudAnchorUploaded") {
            break;
        }
    }

    drop(child.stdin.take());
    wait_with_deadline(&mut child);

    let wal_path = dir.path().join("anchors.db-wal");
    if wal_path.exists() {
        let wal_size = std::fs::metadata(&wal_path).unwrap().len();
        assert_eq!(
            wal_size, 0,
            "WAL should be empty after TRUNCATE checkpoint, was {wal_size} bytes"
        );
    }
}
