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

//! Running the supervised command: spawning it, routing signals to it, and
//! reaping it along with any orphans that end up with us.

pub mod reap;
pub mod signals;

use std::ffi::OsString;
use std::io;
use std::os::unix::process::CommandExt;
use std::process::Command;
use std::thread;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use crate::config::{Config, KillTimer};
use crate::proc::signal::SignalMasks;
use crate::proc::{self, Procfs};
use crate::tty::{self, Pty, RawMode};

use reap::ExitRecord;
use signals::Subscription;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no command given")]
    EmptyCommand,
    #[error("failed to start {command}: {source}")]
    Spawn { command: String, source: io::Error },
    #[error("failed to set up pty: {0}")]
    Pty(#[source] io::Error),
    #[error("failed to block signals: {0}")]
    Signal(#[source] nix::Error),
    #[error("failed to start thread: {0}")]
    Thread(#[source] io::Error),
    #[error("supervisor is {0:?}")]
    InvalidState(State),
    #[error("signal queue closed")]
    SignalChannelClosed,
    #[error(transparent)]
    Proc(#[from] proc::Error),
}

impl Error {
    /// Exit status a shell would use for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Spawn { source, .. } => match source.kind() {
                io::ErrorKind::NotFound => 127,
                io::ErrorKind::PermissionDenied => 126,
                _ => 1,
            },
            _ => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Spawning,
    Running,
    Terminating,
    Reaped,
}

fn is_stop_signal(signal: Signal) -> bool {
    matches!(signal, Signal::SIGINT | Signal::SIGTERM | Signal::SIGQUIT)
}

/// The signal to actually deliver for `signal`.
///
/// With `strict` set, a stop signal the child blocks or ignores becomes
/// SIGKILL. Without masks (they could not be read) the signal is passed
/// through.
pub fn decide(signal: Signal, masks: Option<&SignalMasks>, strict: bool) -> Signal {
    if !strict || !is_stop_signal(signal) {
        return signal;
    }
    match masks {
        Some(m) if m.blocked.contains_signal(signal) || m.ignored.contains_signal(signal) => {
            Signal::SIGKILL
        }
        _ => signal,
    }
}

/// Send `signal` to every descendant of `pid`. Processes that are already
/// gone are skipped.
pub fn signal_descendants(procfs: &Procfs, pid: u32, signal: Signal) {
    let descendants = match procfs.descendants(pid) {
        Ok(descendants) => descendants,
        Err(e) => {
            debug!(error = %e, "cannot list descendants");
            return;
        }
    };
    for descendant in descendants {
        match kill(Pid::from_raw(descendant as i32), signal) {
            Ok(()) => debug!(pid = descendant, %signal, "signaled descendant"),
            Err(Errno::ESRCH) => debug!(pid = descendant, "descendant already gone"),
            Err(e) => debug!(pid = descendant, %signal, error = %e, "failed to signal descendant"),
        }
    }
}

/// Owner of the supervised child.
pub struct Supervisor {
    argv: Vec<OsString>,
    tty: bool,
    pid: Option<u32>,
    state: State,
    procfs: Procfs,
    strict_signals: bool,
    kill_timeout: Duration,
    kill_timer: KillTimer,
    pty: Option<Pty>,
    // Declared after `pty` so the terminal is restored last.
    _raw_mode: Option<RawMode>,
}

impl Supervisor {
    /// A supervisor for the command in `config`, in [`State::Spawning`].
    pub fn new(config: &Config) -> Result<Supervisor, Error> {
        if config.argv.is_empty() {
            return Err(Error::EmptyCommand);
        }
        Ok(Supervisor {
            argv: config.argv.clone(),
            tty: config.tty,
            pid: None,
            state: State::Spawning,
            procfs: config.procfs.clone(),
            strict_signals: config.strict_signals,
            kill_timeout: config.kill_timeout,
            kill_timer: config.kill_timer,
            pty: None,
            _raw_mode: None,
        })
    }

    /// [`Supervisor::new`] followed by [`Supervisor::spawn`].
    pub fn start(config: &Config) -> Result<Supervisor, Error> {
        let mut supervisor = Supervisor::new(config)?;
        supervisor.spawn()?;
        Ok(supervisor)
    }

    /// Launch the command and move to [`State::Running`]. Returns its pid.
    ///
    /// The child starts with an empty signal mask. With `tty` set it gets a
    /// fresh pty as its controlling terminal and stdio. On failure the
    /// supervisor stays in Spawning.
    pub fn spawn(&mut self) -> Result<u32, Error> {
        if self.state != State::Spawning {
            return Err(Error::InvalidState(self.state));
        }
        let (program, args) = self.argv.split_first().ok_or(Error::EmptyCommand)?;
        let command_name = program.to_string_lossy().into_owned();

        let mut command = Command::new(program);
        command.args(args);

        let mut pty = if self.tty {
            let pty = Pty::open().map_err(|e| Error::Pty(e.into()))?;
            let (stdin, stdout, stderr) = pty.child_stdio().map_err(Error::Pty)?;
            command.stdin(stdin).stdout(stdout).stderr(stderr);
            Some(pty)
        } else {
            None
        };
        let tty = pty.is_some();

        // SAFETY: the hook only makes async-signal-safe calls.
        unsafe {
            command.pre_exec(move || {
                signals::reset_mask()?;
                if tty {
                    tty::acquire_controlling_terminal()?;
                }
                Ok(())
            });
        }

        debug!(command = %command_name, "spawning");
        let child = command.spawn().map_err(|source| Error::Spawn {
            command: command_name.clone(),
            source,
        })?;
        // Exit status is collected by the reap loop, not through `child`.
        let pid = child.id();
        self.pid = Some(pid);
        self.state = State::Running;
        info!(pid, command = %command_name, "started");

        if let Some(pty) = pty.as_mut() {
            pty.close_slave();
            pty.start_copying().map_err(Error::Pty)?;
            self._raw_mode = RawMode::enter().unwrap_or_else(|e| {
                warn!(error = %e, "cannot put terminal in raw mode");
                None
            });
        }
        self.pty = pty;
        Ok(pid)
    }

    /// Pid of the command, once spawned.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Route signals until the child has been reaped, then return its exit
    /// status (128 + signal number when it was killed).
    pub fn forward(&mut self, signals: &Subscription) -> Result<i32, Error> {
        let pid = match (self.state, self.pid) {
            (State::Running, Some(pid)) => pid,
            _ => return Err(Error::InvalidState(self.state)),
        };
        loop {
            let signal = signals.recv()?;
            debug!(%signal, "received signal");
            match signal {
                Signal::SIGWINCH => self.resize(),
                Signal::SIGCHLD => {
                    if let Some(record) = self.terminate(pid) {
                        info!(pid = record.pid, status = record.status, "child exited");
                        return Ok(record.status);
                    }
                }
                _ => self.deliver(pid, signal),
            }
        }
    }

    fn resize(&self) {
        if let Some(pty) = &self.pty {
            if let Err(e) = pty.resize_from_stdin() {
                debug!(error = %e, "failed to resize pty");
            }
        }
    }

    fn deliver(&self, pid: u32, signal: Signal) {
        let masks = if self.strict_signals && is_stop_signal(signal) {
            match self.procfs.signal_masks(pid) {
                Ok(masks) => Some(masks),
                Err(e) => {
                    debug!(pid, error = %e, "cannot read signal masks");
                    None
                }
            }
        } else {
            None
        };

        let delivered = decide(signal, masks.as_ref(), self.strict_signals);
        if delivered != signal {
            info!(pid, %signal, "child does not handle signal, killing it");
        }
        if let Err(e) = kill(Pid::from_raw(pid as i32), delivered) {
            debug!(pid, signal = %delivered, error = %e, "failed to forward signal");
        }
    }

    /// Ask everything below us to exit, arm the kill timer and reap. Returns
    /// the tracked child's record if it was among the reaped.
    fn terminate(&mut self, pid: u32) -> Option<ExitRecord> {
        self.state = State::Terminating;
        let self_pid = std::process::id();
        signal_descendants(&self.procfs, self_pid, Signal::SIGTERM);

        if self.kill_timer.armed(self_pid == 1) {
            let procfs = self.procfs.clone();
            let timeout = self.kill_timeout;
            let spawned = thread::Builder::new()
                .name("kill-timer".to_string())
                .spawn(move || {
                    thread::sleep(timeout);
                    signal_descendants(&procfs, self_pid, Signal::SIGKILL);
                });
            if let Err(e) = spawned {
                warn!(error = %e, "cannot start kill timer");
            }
        }

        let record = reap::reap_all()
            .into_iter()
            .find(|record| record.pid == pid);
        self.state = if record.is_some() {
            State::Reaped
        } else {
            State::Running
        };
        record
    }
}
