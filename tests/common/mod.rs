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

#![allow(dead_code)]

use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

// Find an executable produced by the Cargo build
pub fn find_exec(name: &str) -> PathBuf {
    // Find the path where Cargo has placed the executables by looking at this test process's
    // executable, which was also built by Cargo.
    let this_exec = std::env::current_exe().unwrap();
    let exec_dir = this_exec.parent().unwrap().parent().unwrap();

    exec_dir.join(name)
}

fn unique_tmp_path(prefix: &str) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!(
        "{}-{}-{}-{}",
        prefix,
        std::process::id(),
        nanos,
        n
    ))
}

/// Static proc tree: 1 -> 9 -> {12, 14}, plus socket tables.
pub fn fixture_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/proc")
}

/// Handshake with a helper process: the helper writes its pid to the file
/// named by `PIDONE_TEST_READY_FILE` once it is set up.
pub struct ReadySignal {
    path: PathBuf,
}

impl ReadySignal {
    pub fn new() -> Self {
        ReadySignal {
            path: unique_tmp_path("pidone-test-ready"),
        }
    }

    pub fn apply_to_command(&self, cmd: &mut Command) {
        cmd.env("PIDONE_TEST_READY_FILE", &self.path);
    }

    /// Pid written by the helper. Panics if it doesn't show up in time.
    pub fn wait_for_pid(&self) -> u32 {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Ok(text) = fs::read_to_string(&self.path) {
                if let Ok(pid) = text.trim().parse() {
                    return pid;
                }
            }
            assert!(
                Instant::now() < deadline,
                "helper never wrote {}",
                self.path.display()
            );
            thread::sleep(Duration::from_millis(20));
        }
    }

    pub fn cleanup(&self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// A scratch proc tree: the fixture's socket tables plus per-pid fd
/// directories whose links are chosen by the test.
pub struct ScratchProc {
    root: PathBuf,
}

impl ScratchProc {
    pub fn new() -> Self {
        let root = unique_tmp_path("pidone-test-proc");
        let net = root.join("net");
        fs::create_dir_all(&net).unwrap();
        for table in ["tcp", "tcp6", "udp", "udp6"] {
            fs::copy(fixture_root().join("net").join(table), net.join(table)).unwrap();
        }
        ScratchProc { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create `<root>/<pid>/fd/<n>` links pointing at `targets[n]`.
    pub fn add_process(&self, pid: u32, targets: &[&str]) {
        let fd_dir = self.root.join(pid.to_string()).join("fd");
        fs::create_dir_all(&fd_dir).unwrap();
        for (fd, target) in targets.iter().enumerate() {
            std::os::unix::fs::symlink(target, fd_dir.join(fd.to_string())).unwrap();
        }
    }

    /// Make `<root>/<pid>/fd` unreadable, as for another user's process.
    pub fn deny_fd_access(&self, pid: u32) {
        let fd_dir = self.root.join(pid.to_string()).join("fd");
        fs::set_permissions(fd_dir, fs::Permissions::from_mode(0o000)).unwrap();
    }

    /// Replace `<root>/<pid>/fd` with a regular file.
    pub fn break_fd_dir(&self, pid: u32) {
        let pid_dir = self.root.join(pid.to_string());
        fs::create_dir_all(&pid_dir).unwrap();
        fs::write(pid_dir.join("fd"), "").unwrap();
    }

    pub fn remove_net_table(&self, table: &str) {
        fs::remove_file(self.root.join("net").join(table)).unwrap();
    }
}

impl Drop for ScratchProc {
    fn drop(&mut self) {
        // Unreadable fd directories would stop the removal.
        if let Ok(entries) = fs::read_dir(&self.root) {
            for entry in entries.flatten() {
                let fd_dir = entry.path().join("fd");
                if fd_dir.is_dir() {
                    let _ = fs::set_permissions(&fd_dir, fs::Permissions::from_mode(0o755));
                }
            }
        }
        let _ = fs::remove_dir_all(&self.root);
    }
}

/// One request as seen by [`HookServer`].
#[derive(Debug)]
pub struct HookRequest {
    pub method: String,
    pub path: String,
    pub content_type: Option<String>,
    pub body: String,
}

/// A local HTTP endpoint that answers every request with a fixed status and
/// hands the requests to the test.
pub struct HookServer {
    addr: SocketAddr,
    requests: Receiver<HookRequest>,
}

impl HookServer {
    pub fn start(status: u16) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, requests) = mpsc::channel();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let Some(request) = read_request(&stream) else {
                    continue;
                };
                let reply = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    status
                );
                let _ = (&stream).write_all(reply.as_bytes());
                if tx.send(request).is_err() {
                    break;
                }
            }
        });
        HookServer { addr, requests }
    }

    pub fn url(&self) -> String {
        format!("http://{}/hook", self.addr)
    }

    /// Next request. Panics if none arrives in time.
    pub fn recv(&self) -> HookRequest {
        self.requests
            .recv_timeout(Duration::from_secs(10))
            .expect("no request reached the hook")
    }

    pub fn try_recv(&self, timeout: Duration) -> Option<HookRequest> {
        self.requests.recv_timeout(timeout).ok()
    }
}

fn read_request(stream: &TcpStream) -> Option<HookRequest> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader.read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();

    let mut content_length: usize = 0;
    let mut content_type = None;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header).ok()? == 0 {
            return None;
        }
        let header = header.trim_end();
        if header.is_empty() {
            break;
        }
        if let Some((name, value)) = header.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().ok()?,
                "content-type" => content_type = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    let mut body = vec![0u8; content_length];
    reader.read_exact(&mut body).ok()?;
    Some(HookRequest {
        method,
        path,
        content_type,
        body: String::from_utf8(body).ok()?,
    })
}
