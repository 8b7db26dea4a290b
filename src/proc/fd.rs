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

use std::path::{Path, PathBuf};

/// One entry of `/proc/[pid]/fd`: the descriptor number and the text of the
/// symlink it points to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fd {
    pub fd: u64,
    pub target: PathBuf,
}

impl Fd {
    /// Inode of the socket behind this descriptor, if it is one.
    pub fn socket_inode(&self) -> Option<&str> {
        let name = self.target.file_name().unwrap_or(self.target.as_os_str());
        parse_socket_inode(name.to_str()?)
    }
}

/// Extract the inode number from a `"socket:[12345]"` link text.
///
/// The inode is kept as a string: that is how the socket tables are keyed.
pub fn parse_socket_inode(link_text: &str) -> Option<&str> {
    let inner = link_text.strip_prefix("socket:[")?;
    let inner = inner.strip_suffix(']')?;
    if inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(inner)
}

/// Read every descriptor symlink under `dir` (a `/proc/[pid]/fd` directory),
/// sorted by descriptor number.
///
/// Descriptors closed between the directory listing and the readlink are
/// skipped.
pub(crate) fn read_fd_dir(dir: &Path) -> std::io::Result<Vec<Fd>> {
    let mut fds = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let Some(fd) = entry.file_name().to_str().and_then(|s| s.parse().ok()) else {
            continue;
        };
        match std::fs::read_link(entry.path()) {
            Ok(target) => fds.push(Fd { fd, target }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        }
    }
    fds.sort_by_key(|f| f.fd);
    Ok(fds)
}
