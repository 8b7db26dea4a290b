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

//! Lifecycle notifications over HTTP.
//!
//! Every state change is sent as a `PUT` of
//! `{"ps": {"status": ..., "net_interfaces": [...]}}` to the hook URL.

use std::time::Duration;

use nix::ifaddrs::getifaddrs;
use serde::Serialize;
use tracing::{debug, error};

use crate::lifecycle::{ProcessState, StateListener};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("web hook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("bad status code expected 200 .. 299 got {0}")]
    Status(u16),
}

#[derive(Debug, Serialize)]
pub struct HookPayload {
    pub ps: Ps,
}

#[derive(Debug, Serialize)]
pub struct Ps {
    pub status: ProcessState,
    pub net_interfaces: Vec<NetInterface>,
}

/// An interface and the last address of each family seen on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetInterface {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv6: Option<String>,
}

/// Interfaces of the current network namespace, in the order the kernel
/// lists them. An interface without addresses is still listed.
pub fn net_interfaces() -> Vec<NetInterface> {
    let addrs = match getifaddrs() {
        Ok(addrs) => addrs,
        Err(e) => {
            error!(error = %e, "cannot list network interfaces");
            return Vec::new();
        }
    };

    let mut interfaces: Vec<NetInterface> = Vec::new();
    for ifaddr in addrs {
        let index = match interfaces
            .iter()
            .position(|i| i.name == ifaddr.interface_name)
        {
            Some(index) => index,
            None => {
                interfaces.push(NetInterface {
                    name: ifaddr.interface_name.clone(),
                    ipv4: None,
                    ipv6: None,
                });
                interfaces.len() - 1
            }
        };
        let Some(address) = ifaddr.address else {
            continue;
        };
        let interface = &mut interfaces[index];
        if let Some(sin) = address.as_sockaddr_in() {
            interface.ipv4 = Some(std::net::SocketAddrV4::from(*sin).ip().to_string());
        } else if let Some(sin6) = address.as_sockaddr_in6() {
            interface.ipv6 = Some(std::net::SocketAddrV6::from(*sin6).ip().to_string());
        }
    }
    interfaces
}

/// Sends every transition to a web hook. Failures are logged and dropped.
#[derive(Debug, Clone)]
pub struct WebHookListener {
    url: String,
    client: reqwest::blocking::Client,
}

impl WebHookListener {
    pub fn new(url: impl Into<String>) -> Result<Self, Error> {
        // Certificates are not verified.
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("pidone/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(true)
            .build()?;
        Ok(WebHookListener {
            url: url.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// PUT `state` to the hook and check for a 2xx reply.
    pub fn notify(&self, state: ProcessState) -> Result<(), Error> {
        let payload = HookPayload {
            ps: Ps {
                status: state,
                net_interfaces: net_interfaces(),
            },
        };
        let response = self.client.put(&self.url).json(&payload).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status(status.as_u16()));
        }
        debug!(url = %self.url, %state, "web hook notified");
        Ok(())
    }
}

impl StateListener for WebHookListener {
    fn state_changed(&self, state: ProcessState) {
        if let Err(e) = self.notify(state) {
            error!(url = %self.url, %state, error = %e, "web hook notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_shape() {
        let payload = HookPayload {
            ps: Ps {
                status: ProcessState::Starting,
                net_interfaces: vec![
                    NetInterface {
                        name: "lo".to_string(),
                        ipv4: Some("127.0.0.1".to_string()),
                        ipv6: Some("::1".to_string()),
                    },
                    NetInterface {
                        name: "sit0".to_string(),
                        ipv4: None,
                        ipv6: None,
                    },
                ],
            },
        };
        assert_eq!(
            serde_json::to_string(&payload).unwrap(),
            r#"{"ps":{"status":"starting","net_interfaces":[{"name":"lo","ipv4":"127.0.0.1","ipv6":"::1"},{"name":"sit0"}]}}"#
        );
    }

    #[test]
    fn interfaces_are_listed_once() {
        let interfaces = net_interfaces();
        let mut names: Vec<_> = interfaces.iter().map(|i| i.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), interfaces.len());
    }
}
