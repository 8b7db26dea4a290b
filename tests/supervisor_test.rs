//
//   Copyright 2026 The pidone Authors
//
//   Licensed under the Apache License, Version 2.0 (the "License");
//   you may not use this file except in compliance with the License.
//   You may obtain a copy of the License at
//
//       http://www.apache.org/licenses/LICENSE-2.0
//
//   Unless required by applicable law or agreed to in writing, software
//   distributed under the License is distributed on an "AS IS" BASIS,
//   WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//   See the License for the specific language governing permissions and
//   limitations under the License.
//

mod common;

use std::net::TcpListener;
use std::process::{Child, Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use common::{find_exec, HookServer, ReadySignal};

fn pidone(args: &[&str]) -> Command {
    let mut cmd = Command::new(find_exec("pidone"));
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    cmd
}

fn run(args: &[&str]) -> Output {
    pidone(args).output().expect("failed to run pidone")
}

/// Start pidone with `args` and wait until its command has written the ready
/// file. Returns pidone and the pid of the command.
fn spawn_ready(args: &[&str]) -> (Child, u32, ReadySignal) {
    let ready = ReadySignal::new();
    let mut cmd = pidone(args);
    ready.apply_to_command(&mut cmd);
    let child = cmd.spawn().expect("failed to spawn pidone");
    let pid = ready.wait_for_pid();
    (child, pid, ready)
}

fn signal(pid: u32, signal: Signal) {
    kill(Pid::from_raw(pid as i32), signal).expect("failed to send signal");
}

fn is_alive(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None).is_ok()
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Option<i32> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait().unwrap() {
            return status.code();
        }
        thread::sleep(Duration::from_millis(20));
    }
    None
}

#[test]
fn exits_with_command_status() {
    assert_eq!(run(&["true"]).status.code(), Some(0));
    assert_eq!(run(&["sh", "-c", "exit 3"]).status.code(), Some(3));
}

#[test]
fn killed_command_reports_128_plus_signal() {
    assert_eq!(run(&["sh", "-c", "kill -9 $$"]).status.code(), Some(137));
    assert_eq!(run(&["sh", "-c", "kill -TERM $$"]).status.code(), Some(143));
}

#[test]
fn command_output_is_passed_through() {
    let output = run(&["sh", "-c", "echo hello"]);
    assert_eq!(output.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hello\n");
}

#[test]
fn missing_command_exits_127() {
    let output = run(&["/nonexistent/pidone-test-command"]);
    assert_eq!(output.status.code(), Some(127));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("/nonexistent/pidone-test-command"),
        "error should name the command: {}",
        stderr
    );
}

#[test]
fn no_command_is_usage_error() {
    let output = run(&[]);
    assert!(!output.status.success());
}

#[test]
fn orphans_are_terminated_and_reaped() {
    let start = Instant::now();
    let output = run(&["sh", "-c", "sleep 30 & sleep 30 & exit 4"]);
    assert_eq!(output.status.code(), Some(4));
    assert!(
        start.elapsed() < Duration::from_secs(10),
        "orphans should be terminated, took {:?}",
        start.elapsed()
    );
}

#[test]
fn orphan_ignoring_sigterm_is_killed_after_timeout() {
    let start = Instant::now();
    let output = run(&[
        "--kill-timeout",
        "1",
        "sh",
        "-c",
        "(trap '' TERM; sleep 30) & sleep 0.5; exit 5",
    ]);
    assert_eq!(output.status.code(), Some(5));
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(900), "killed too early: {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(10), "not killed: {:?}", elapsed);
}

#[test]
fn signals_are_forwarded() {
    let (mut child, _pid, ready) = spawn_ready(&[
        "sh",
        "-c",
        "trap 'exit 7' USR1; echo $$ > \"$PIDONE_TEST_READY_FILE\"; while :; do sleep 0.1; done",
    ]);
    signal(child.id(), Signal::SIGUSR1);
    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    ready.cleanup();
    assert_eq!(status, Some(7));
}

#[test]
fn strict_signals_escalate_ignored_sigterm() {
    let helper = find_exec("examples/ignore_term");
    let (mut child, pid, ready) = spawn_ready(&["--thug", helper.to_str().unwrap()]);

    signal(child.id(), Signal::SIGTERM);
    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    ready.cleanup();
    assert_eq!(status, Some(137));
    assert!(!is_alive(pid));
}

#[test]
fn ignored_sigterm_is_not_escalated_by_default() {
    let helper = find_exec("examples/ignore_term");
    let (mut child, pid, ready) = spawn_ready(&[helper.to_str().unwrap()]);

    signal(child.id(), Signal::SIGTERM);
    thread::sleep(Duration::from_millis(500));
    assert!(child.try_wait().unwrap().is_none(), "pidone exited early");
    assert!(is_alive(pid), "command should ignore SIGTERM");

    signal(pid, Signal::SIGKILL);
    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    ready.cleanup();
    assert_eq!(status, Some(137));
}

#[test]
fn tty_mode_gives_command_a_terminal() {
    assert_eq!(run(&["-t", "sh", "-c", "test -t 0 && test -t 1"]).status.code(), Some(0));
    assert_eq!(run(&["sh", "-c", "test -t 0"]).status.code(), Some(1));
}

#[test]
fn bound_port_reports_running() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port().to_string();

    let output = pidone(&["--bind-port", &port, "sleep", "1"])
        .env("RUST_LOG", "pidone=info")
        .output()
        .expect("failed to run pidone");
    assert_eq!(output.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("port bound"), "stderr: {}", stderr);
    assert!(stderr.contains("state=running"), "stderr: {}", stderr);
    assert!(stderr.contains("state=crashed"), "stderr: {}", stderr);
}

#[test]
fn empty_bind_port_reports_running_at_once() {
    let output = pidone(&["--bind-port", "", "true"])
        .env("RUST_LOG", "pidone=info")
        .output()
        .expect("failed to run pidone");
    assert_eq!(output.status.code(), Some(0));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("state=running"), "stderr: {}", stderr);
    assert!(!stderr.contains("port bound"), "stderr: {}", stderr);
}

#[test]
fn web_hook_receives_each_transition() {
    let server = HookServer::start(200);
    let output = run(&["--web-hook", &server.url(), "sh", "-c", "exit 2"]);
    assert_eq!(output.status.code(), Some(2));

    for expected in ["starting", "running", "crashed"] {
        let request = server.recv();
        assert_eq!(request.method, "PUT");
        assert!(
            request.body.contains(&format!("\"status\":\"{}\"", expected)),
            "expected {} in {}",
            expected,
            request.body
        );
    }
}

#[test]
fn failing_web_hook_does_not_change_exit_status() {
    let server = HookServer::start(503);
    let output = run(&["--web-hook", &server.url(), "sh", "-c", "exit 3"]);
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("web hook notification failed"), "stderr: {}", stderr);
}
