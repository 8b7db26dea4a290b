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

//! Detecting which process has bound a port, by matching the socket inodes
//! in `/proc/[pid]/fd` against the socket tables in `/proc/net`.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::lifecycle::{ProcessState, StateListener};
use crate::proc::net::SocketTable;
use crate::proc::{Error, Procfs};

pub const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Who holds a bound port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binder {
    Pid(u32),
    /// Found in the socket table without a candidate list to attribute it to.
    Unknown,
}

#[derive(Debug, Clone)]
pub struct BindingDetector {
    procfs: Procfs,
}

impl BindingDetector {
    pub fn new(procfs: Procfs) -> Self {
        BindingDetector { procfs }
    }

    /// Check whether `port` (decimal) is bound.
    ///
    /// With no candidates any socket on the port counts. Otherwise the
    /// candidates are checked lowest pid first and the first one holding a
    /// socket on the port is returned. Candidates whose descriptors we may not
    /// read, or which have exited, are skipped.
    pub fn is_bound(&self, port: &str, candidates: &[u32]) -> Result<Option<Binder>, Error> {
        let table = SocketTable::build(&self.procfs)?;

        if candidates.is_empty() {
            return Ok(table
                .iter()
                .any(|s| s.local_port == port)
                .then_some(Binder::Unknown));
        }

        let mut candidates = candidates.to_vec();
        candidates.sort_unstable();
        candidates.dedup();

        for pid in candidates {
            let inodes = match self.procfs.socket_inodes(pid) {
                Ok(inodes) => inodes,
                Err(e) if e.is_permission_denied() || e.is_not_found() => {
                    debug!(pid, error = %e, "skipping binder candidate");
                    continue;
                }
                Err(e) => return Err(e),
            };
            let bound = inodes
                .iter()
                .filter_map(|inode| table.find(inode))
                .any(|s| s.local_port == port);
            if bound {
                return Ok(Some(Binder::Pid(pid)));
            }
        }
        Ok(None)
    }

    /// Poll until `port` is bound, then report [`ProcessState::Running`].
    ///
    /// With `strict` only descendants of `root_pid` are considered. The
    /// watcher gives up on the first error it cannot skip.
    pub fn watch(
        &self,
        port: &str,
        strict: bool,
        root_pid: u32,
        listener: &dyn StateListener,
    ) -> Result<Binder, Error> {
        loop {
            let candidates = if strict {
                self.procfs.descendants(root_pid)?
            } else {
                Vec::new()
            };
            if let Some(binder) = self.is_bound(port, &candidates)? {
                info!(port, ?binder, strict, "port bound");
                listener.state_changed(ProcessState::Running);
                return Ok(binder);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Run [`BindingDetector::watch`] on a detached thread.
    pub fn spawn_watcher(
        self,
        port: String,
        strict: bool,
        root_pid: u32,
        listener: Arc<dyn StateListener>,
    ) -> thread::JoinHandle<()> {
        thread::spawn(move || {
            if let Err(e) = self.watch(&port, strict, root_pid, listener.as_ref()) {
                error!(port = %port, error = %e, "port watcher stopped");
            }
        })
    }
}
