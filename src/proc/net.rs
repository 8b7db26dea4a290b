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

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tracing::debug;

use super::{Error, Procfs};

const LOCAL_ADDR_COLUMN: usize = 1;
const REMOTE_ADDR_COLUMN: usize = 2;
const INODE_COLUMN: usize = 9;

/// Protocol tables read from `<root>/net/`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Tcp6,
    Udp,
    Udp6,
}

impl Protocol {
    pub const ALL: [Protocol; 4] = [
        Protocol::Tcp,
        Protocol::Tcp6,
        Protocol::Udp,
        Protocol::Udp6,
    ];

    /// File name under `<root>/net/`.
    pub fn file_name(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Tcp6 => "tcp6",
            Protocol::Udp => "udp",
            Protocol::Udp6 => "udp6",
        }
    }

    fn is_v6(self) -> bool {
        matches!(self, Protocol::Tcp6 | Protocol::Udp6)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// One line of a `/proc/net/{tcp,tcp6,udp,udp6}` table.
///
/// Ports are decimal strings and the inode is kept verbatim, since that is
/// what `/proc/[pid]/fd` links are compared against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Socket {
    pub protocol: Protocol,
    pub local_ip: Option<IpAddr>,
    pub local_port: String,
    pub remote_ip: Option<IpAddr>,
    pub remote_port: String,
    pub inode: String,
}

// Address is printed with most-significant byte first on big-endian systems and vice-versa on
// little-endian systems, one 32-bit word at a time.
fn parse_ip(hex: &str, v6: bool) -> Option<IpAddr> {
    if v6 {
        if hex.len() != 32 {
            return None;
        }
        let mut octets = [0u8; 16];
        for (i, chunk) in hex.as_bytes().chunks_exact(8).enumerate() {
            let chunk = std::str::from_utf8(chunk).ok()?;
            let native = u32::from_str_radix(chunk, 16).ok()?;
            octets[i * 4..(i + 1) * 4].copy_from_slice(&native.to_be().to_be_bytes());
        }
        Some(IpAddr::V6(Ipv6Addr::from(octets)))
    } else {
        if hex.len() != 8 {
            return None;
        }
        let native = u32::from_str_radix(hex, 16).ok()?;
        Some(IpAddr::V4(Ipv4Addr::from(native.to_be())))
    }
}

// Split "0100007F:1538" into an address and a decimal port string. Port is always printed with
// most-significant byte first.
fn parse_endpoint(column: &str, v6: bool) -> Result<(Option<IpAddr>, String), Error> {
    let (ip, port) = column.split_once(':').ok_or_else(|| {
        Error::parse(
            "socket address",
            &format!("expected '<hex-ip>:<hex-port>', got {}", column),
        )
    })?;
    let port = u16::from_str_radix(port, 16)
        .map_err(|e| Error::parse("socket port", &format!("{}: {}", port, e)))?;
    Ok((parse_ip(ip, v6), port.to_string()))
}

fn parse_line(line: &str, protocol: Protocol) -> Result<Socket, Error> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() <= INODE_COLUMN {
        return Err(Error::parse(
            &format!("/proc/net/{}", protocol),
            &format!("expected at least {} columns, got {}", INODE_COLUMN + 1, fields.len()),
        ));
    }
    let (local_ip, local_port) = parse_endpoint(fields[LOCAL_ADDR_COLUMN], protocol.is_v6())?;
    let (remote_ip, remote_port) = parse_endpoint(fields[REMOTE_ADDR_COLUMN], protocol.is_v6())?;
    Ok(Socket {
        protocol,
        local_ip,
        local_port,
        remote_ip,
        remote_port,
        inode: fields[INODE_COLUMN].to_string(),
    })
}

fn parse_table(content: &str, protocol: Protocol) -> Result<Vec<Socket>, Error> {
    content
        .lines()
        .skip(1) // Header
        .filter(|line| !line.trim().is_empty())
        .map(|line| parse_line(line, protocol))
        .collect()
}

/// All tcp/udp sockets of a network namespace, sorted by inode.
#[derive(Debug, Default)]
pub struct SocketTable {
    sockets: Vec<Socket>,
}

impl SocketTable {
    /// Read and parse the four protocol tables under `<root>/net/`.
    ///
    /// Each file is read on its own thread. If any of them cannot be read the
    /// whole build fails.
    pub fn build(procfs: &Procfs) -> Result<SocketTable, Error> {
        let results: Vec<Result<Vec<Socket>, Error>> = std::thread::scope(|scope| {
            let handles: Vec<_> = Protocol::ALL
                .iter()
                .map(|&protocol| {
                    scope.spawn(move || -> Result<Vec<Socket>, Error> {
                        let content = procfs.read_net_file(protocol.file_name())?;
                        parse_table(&content, protocol)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| {
                    h.join()
                        .unwrap_or_else(|_| Err(Error::parse("/proc/net", "reader thread panicked")))
                })
                .collect()
        });

        let mut sockets = Vec::new();
        for result in results {
            sockets.extend(result?);
        }
        debug!(count = sockets.len(), "read socket tables");
        Ok(SocketTable::from_sockets(sockets))
    }

    /// Sort `sockets` by inode. The sort is stable, so sockets sharing an
    /// inode keep their table order.
    pub fn from_sockets(mut sockets: Vec<Socket>) -> SocketTable {
        sockets.sort_by(|a, b| a.inode.cmp(&b.inode));
        SocketTable { sockets }
    }

    /// Binary search for the socket with the given inode.
    pub fn find(&self, inode: &str) -> Option<&Socket> {
        let i = self.sockets.partition_point(|s| s.inode.as_str() < inode);
        self.sockets.get(i).filter(|s| s.inode == inode)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Socket> {
        self.sockets.iter()
    }

    pub fn len(&self) -> usize {
        self.sockets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.is_empty()
    }
}
