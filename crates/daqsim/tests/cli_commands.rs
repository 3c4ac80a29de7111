#![cfg(all(unix, feature = "cli"))]

use std::net::TcpListener;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn daqsim() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_daqsim"));
    cmd.arg("--log-level").arg("error");
    cmd
}

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("ephemeral bind should succeed")
        .local_addr()
        .expect("bound listener has an address")
        .port()
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Option<std::process::ExitStatus> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("try_wait should succeed") {
            return Some(status);
        }
        if start.elapsed() >= timeout {
            return None;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn send_until_connected(addr: &str, extra: &[&str], timeout: Duration) -> Output {
    let start = Instant::now();
    loop {
        let output = daqsim()
            .args(["--format", "json", "send", addr])
            .args(extra)
            .output()
            .expect("send should run");
        if output.status.success() || start.elapsed() >= timeout {
            return output;
        }
        thread::sleep(Duration::from_millis(50));
    }
}

#[test]
fn version_prints_name() {
    let output = daqsim().arg("version").output().expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("daqsim "));
}

#[test]
fn extended_version_lists_features() {
    let output = daqsim()
        .args(["version", "--extended"])
        .output()
        .expect("version should run");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("name: daqsim"));
    assert!(stdout.contains("device=true"));
}

#[test]
fn loopback_run_replays_demo_sequence() {
    let output = daqsim()
        .args([
            "--format",
            "json",
            "run",
            "--transport",
            "loopback",
            "--duration",
            "300ms",
            "--seed",
            "1",
        ])
        .output()
        .expect("run should start");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"transport\":\"loopback\""));
    assert!(stdout.contains("\"frames_handled\":5"));
    assert!(stdout.contains("\"frames_rejected\":0"));
}

#[test]
fn loopback_run_without_demo_is_quiet() {
    let output = daqsim()
        .args([
            "--format",
            "json",
            "run",
            "--transport",
            "loopback",
            "--no-demo",
            "--duration",
            "100ms",
        ])
        .output()
        .expect("run should start");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"frames_received\":0"));
}

#[test]
fn tcp_device_answers_ping() {
    let port = free_port();
    let addr = format!("127.0.0.1:{port}");

    let mut child = daqsim()
        .args(["--format", "json", "run", "--listen", &addr, "--seed", "5"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("run should start");

    let output = send_until_connected(&addr, &["--command", "0x01", "--seq", "9"], Duration::from_secs(5));
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"command_name\":\"PONG\""));
    assert!(stdout.contains("\"seq\":9"));
    assert!(stdout.contains("\"type\":\"pong\""));

    let status = wait_with_timeout(&mut child, Duration::from_secs(5));
    if status.is_none() {
        let _ = child.kill();
        let _ = child.wait();
        panic!("device did not exit after host disconnect");
    }
    assert!(status.is_some_and(|s| s.success()));
}
