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

use std::ffi::OsString;
use std::time::Duration;

use crate::proc::Procfs;

pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(5);

/// When the kill-escalation timer is armed after a child exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum KillTimer {
    /// Every time, whether or not we are PID 1.
    #[default]
    Always,
    /// Only when running as PID 1. As a subreaper the outer init is left to
    /// clean up.
    #[value(name = "pid1")]
    Pid1Only,
}

impl KillTimer {
    pub fn armed(self, is_pid1: bool) -> bool {
        match self {
            KillTimer::Always => true,
            KillTimer::Pid1Only => is_pid1,
        }
    }
}

/// Everything the supervisor and the port watcher need to run.
#[derive(Debug, Clone)]
pub struct Config {
    pub argv: Vec<OsString>,
    /// Escalate SIGINT/SIGTERM/SIGQUIT to SIGKILL when the child blocks or
    /// ignores them.
    pub strict_signals: bool,
    pub procfs: Procfs,
    /// Decimal port to watch; `None` reports running right away.
    pub bind_port: Option<String>,
    /// Only our descendants count as binders of `bind_port`.
    pub strict_port_binding: bool,
    /// URL to PUT lifecycle changes to.
    pub web_hook: Option<String>,
    pub kill_timeout: Duration,
    pub kill_timer: KillTimer,
    pub tty: bool,
    pub debug: bool,
}

impl Config {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Config {
            argv: argv.into_iter().map(Into::into).collect(),
            strict_signals: false,
            procfs: Procfs::default(),
            bind_port: None,
            strict_port_binding: false,
            web_hook: None,
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            kill_timer: KillTimer::default(),
            tty: false,
            debug: false,
        }
    }
}
