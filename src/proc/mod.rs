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

pub mod fd;
pub mod net;
pub mod signal;

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::io;
use std::path::{Path, PathBuf};

use nix::libc;
use tracing::debug;

use fd::Fd;
use signal::SignalMasks;

pub const DEFAULT_MOUNT_POINT: &str = "/proc";

/// One process as seen in `/proc/[pid]/status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcEntry {
    pub pid: u32,
    pub ppid: u32,
    pub name: String,
    /// Raw state text, e.g. `S (sleeping)`.
    pub state: String,
    /// Real uid (first field of `Uid:`).
    pub uid: Option<u32>,
}

/// Handle on a proc filesystem mount.
///
/// Everything is read relative to `root`, so tests can point it at a fixture
/// tree instead of `/proc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Procfs {
    root: PathBuf,
}

impl Default for Procfs {
    fn default() -> Self {
        Procfs::new(DEFAULT_MOUNT_POINT)
    }
}

impl Procfs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Procfs { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn pid_dir(&self, pid: u32) -> PathBuf {
        self.root.join(pid.to_string())
    }

    pub(crate) fn read_net_file(&self, name: &str) -> io::Result<String> {
        std::fs::read_to_string(self.root.join("net").join(name))
    }

    // -- /proc/[pid]/status ------------------------------------------

    /// Read the status record of `pid`.
    ///
    /// A process that exited before we got to it yields an error for which
    /// [`Error::is_not_found`] is true.
    pub fn status(&self, pid: u32) -> Result<(ProcEntry, SignalMasks), Error> {
        let status = std::fs::read_to_string(self.pid_dir(pid).join("status"))?;
        parse_status(pid, &status)
    }

    /// Current signal disposition of `pid`. Never cached: a process may
    /// change its handlers at any time.
    pub fn signal_masks(&self, pid: u32) -> Result<SignalMasks, Error> {
        self.status(pid).map(|(_, masks)| masks)
    }

    // -- Walking -----------------------------------------------------

    /// Every positive numeric entry under the root, ascending.
    pub fn pids(&self) -> Result<Vec<u32>, Error> {
        let mut pids = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) {
                if pid > 0 {
                    pids.push(pid);
                }
            }
        }
        pids.sort_unstable();
        Ok(pids)
    }

    /// Number of processes currently listed under the root.
    pub fn process_count(&self) -> Result<usize, Error> {
        Ok(self.pids()?.len())
    }

    /// Call `visit` with every process, in pid order.
    ///
    /// `visit` returns whether to keep going; an error stops the walk and is
    /// returned. Processes that disappear between the directory listing and
    /// the status read are skipped.
    pub fn walk<F>(&self, mut visit: F) -> Result<(), Error>
    where
        F: FnMut(ProcEntry) -> Result<bool, Error>,
    {
        for pid in self.pids()? {
            let entry = match self.status(pid) {
                Ok((entry, _)) => entry,
                Err(e) if e.is_not_found() => {
                    debug!(pid, "process exited during walk");
                    continue;
                }
                Err(e) => return Err(e),
            };
            if !visit(entry)? {
                break;
            }
        }
        Ok(())
    }

    /// Snapshot of the whole process tree.
    pub fn table(&self) -> Result<ProcessTable, Error> {
        let mut entries = Vec::new();
        self.walk(|entry| {
            entries.push(entry);
            Ok(true)
        })?;
        Ok(ProcessTable::new(entries))
    }

    /// Direct children of `pid`, sorted by pid.
    pub fn children(&self, pid: u32) -> Result<Vec<u32>, Error> {
        Ok(self.table()?.children_of(pid))
    }

    /// Children, grandchildren and so on of `pid`, breadth first. `pid`
    /// itself is not included.
    pub fn descendants(&self, pid: u32) -> Result<Vec<u32>, Error> {
        Ok(self.table()?.descendants_of(pid))
    }

    // -- /proc/[pid]/fd ----------------------------------------------

    pub fn fds(&self, pid: u32) -> Result<Vec<Fd>, Error> {
        Ok(fd::read_fd_dir(&self.pid_dir(pid).join("fd"))?)
    }

    /// Inodes of every socket `pid` holds open.
    pub fn socket_inodes(&self, pid: u32) -> Result<Vec<String>, Error> {
        Ok(self
            .fds(pid)?
            .iter()
            .filter_map(|fd| fd.socket_inode().map(str::to_string))
            .collect())
    }
}

/// Parse the text of a `/proc/[pid]/status` file.
pub fn parse_status(pid: u32, status: &str) -> Result<(ProcEntry, SignalMasks), Error> {
    let mut entry = ProcEntry {
        pid,
        ppid: 0,
        name: String::new(),
        state: String::new(),
        uid: None,
    };
    let mut masks = SignalMasks::default();

    let decode = |key: &str, value: &str| {
        signal::decode(value).map_err(|e| Error::in_file("status", &format!("invalid {}: {}", key, e)))
    };

    for line in status.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| Error::in_file("status", &format!("line without separator: {:?}", line)))?;
        let value = value.trim();
        match key {
            "Name" => entry.name = value.to_string(),
            "State" => entry.state = value.to_string(),
            "PPid" => {
                entry.ppid = value
                    .parse()
                    .map_err(|e| Error::in_file("status", &format!("invalid PPid: {}", e)))?
            }
            "Uid" => {
                let first = value
                    .split_whitespace()
                    .next()
                    .ok_or_else(|| Error::in_file("status", "empty Uid"))?;
                entry.uid = Some(
                    first
                        .parse()
                        .map_err(|e| Error::in_file("status", &format!("invalid Uid: {}", e)))?,
                );
            }
            "SigBlk" => masks.blocked = decode(key, value)?,
            "SigIgn" => masks.ignored = decode(key, value)?,
            "SigCgt" => masks.caught = decode(key, value)?,
            _ => {}
        }
    }

    Ok((entry, masks))
}

/// A process tree snapshot: entries indexed by pid plus a parent → children
/// index built once.
#[derive(Debug, Default)]
pub struct ProcessTable {
    entries: BTreeMap<u32, ProcEntry>,
    children: HashMap<u32, Vec<u32>>,
}

impl ProcessTable {
    pub fn new(entries: impl IntoIterator<Item = ProcEntry>) -> Self {
        let entries: BTreeMap<u32, ProcEntry> = entries.into_iter().map(|e| (e.pid, e)).collect();
        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        // BTreeMap iterates in pid order, so each child list comes out sorted.
        for entry in entries.values() {
            if entry.ppid != entry.pid {
                children.entry(entry.ppid).or_default().push(entry.pid);
            }
        }
        ProcessTable { entries, children }
    }

    pub fn get(&self, pid: u32) -> Option<&ProcEntry> {
        self.entries.get(&pid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn children_of(&self, pid: u32) -> Vec<u32> {
        self.children.get(&pid).cloned().unwrap_or_default()
    }

    pub fn descendants_of(&self, pid: u32) -> Vec<u32> {
        let mut seen = HashSet::from([pid]);
        let mut queue = VecDeque::from([pid]);
        let mut descendants = Vec::new();
        while let Some(next) = queue.pop_front() {
            for &child in self.children.get(&next).into_iter().flatten() {
                if seen.insert(child) {
                    descendants.push(child);
                    queue.push_back(child);
                }
            }
        }
        descendants
    }
}

/// Error type for proc filesystem reads.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error from the underlying files.
    #[error("{0}")]
    Io(#[from] io::Error),
    /// Error parsing procfs data.
    #[error("{0}")]
    Parse(String),
}

impl Error {
    pub fn parse(item: &str, reason: &str) -> Self {
        Error::Parse(format!("Error parsing {}: {}", item, reason))
    }
    pub fn in_file(file: &str, reason: &str) -> Self {
        Error::Parse(format!("Error parsing /proc/[pid]/{}: {}", file, reason))
    }

    /// Whether the process we were reading has gone away.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == io::ErrorKind::NotFound || e.raw_os_error() == Some(libc::ESRCH),
            Error::Parse(_) => false,
        }
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Error::Io(e) if e.kind() == io::ErrorKind::PermissionDenied)
    }
}
