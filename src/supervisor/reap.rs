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

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use tracing::debug;

/// Result of reaping one child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRecord {
    pub pid: u32,
    /// Exit code, or 128 + signal number when killed by a signal.
    pub status: i32,
}

impl ExitRecord {
    /// `None` for statuses that don't end the process (stopped, continued).
    pub fn from_wait_status(status: WaitStatus) -> Option<ExitRecord> {
        match status {
            WaitStatus::Exited(pid, code) => Some(ExitRecord {
                pid: pid.as_raw() as u32,
                status: code,
            }),
            WaitStatus::Signaled(pid, signal, _) => Some(ExitRecord {
                pid: pid.as_raw() as u32,
                status: 128 + signal as i32,
            }),
            _ => None,
        }
    }
}

/// Collect exit records from `wait` until there is nothing left to reap.
///
/// `EINTR` is retried; `ECHILD` and `ESRCH` end the loop normally. Any other
/// error ends it too, after logging.
pub fn reap_with<W>(mut wait: W) -> Vec<ExitRecord>
where
    W: FnMut() -> nix::Result<WaitStatus>,
{
    let mut records = Vec::new();
    loop {
        match wait() {
            Ok(status) => {
                if let Some(record) = ExitRecord::from_wait_status(status) {
                    debug!(pid = record.pid, status = record.status, "reaped");
                    records.push(record);
                }
            }
            Err(Errno::EINTR) => continue,
            Err(Errno::ECHILD) | Err(Errno::ESRCH) => break,
            Err(e) => {
                debug!(error = %e, "wait failed");
                break;
            }
        }
    }
    records
}

/// Block until every child of this process has been reaped.
pub fn reap_all() -> Vec<ExitRecord> {
    reap_with(|| waitpid(None::<Pid>, None))
}
