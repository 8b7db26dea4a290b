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

//! Running the supervised command on a pseudo-terminal.

use std::fs::File;
use std::io::{self, IsTerminal};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::process::Stdio;
use std::thread;

use nix::libc;
use nix::pty::{openpty, Winsize};
use nix::sys::termios::{self, SetArg, Termios};
use tracing::debug;

nix::ioctl_read_bad!(get_winsize, libc::TIOCGWINSZ, Winsize);
nix::ioctl_write_ptr_bad!(set_winsize, libc::TIOCSWINSZ, Winsize);
nix::ioctl_write_int_bad!(set_controlling_tty, libc::TIOCSCTTY);

fn window_size(fd: RawFd) -> nix::Result<Winsize> {
    let mut size = Winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    // SAFETY: TIOCGWINSZ writes exactly one winsize into `size`.
    unsafe { get_winsize(fd, &mut size) }?;
    Ok(size)
}

/// Size of the terminal on our stdin, if there is one.
fn stdin_size() -> Option<Winsize> {
    if !io::stdin().is_terminal() {
        return None;
    }
    window_size(libc::STDIN_FILENO).ok()
}

/// A pty pair. The slave end is handed to the child; we keep the master.
#[derive(Debug)]
pub struct Pty {
    master: OwnedFd,
    slave: Option<OwnedFd>,
}

impl Pty {
    /// Open a pty sized like our own terminal.
    pub fn open() -> nix::Result<Pty> {
        let size = stdin_size();
        let pty = openpty(size.as_ref(), None::<&Termios>)?;
        Ok(Pty {
            master: pty.master,
            slave: Some(pty.slave),
        })
    }

    /// Stdin, stdout and stderr for the child, all on the slave.
    pub fn child_stdio(&self) -> io::Result<(Stdio, Stdio, Stdio)> {
        let slave = self
            .slave
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "pty slave already closed"))?;
        Ok((
            Stdio::from(slave.try_clone()?),
            Stdio::from(slave.try_clone()?),
            Stdio::from(slave.try_clone()?),
        ))
    }

    /// Drop our copy of the slave once the child holds it, so reads on the
    /// master fail when the child goes away.
    pub fn close_slave(&mut self) {
        self.slave = None;
    }

    /// Copy our terminal's size to the pty. No-op when stdin is not a
    /// terminal.
    pub fn resize_from_stdin(&self) -> nix::Result<()> {
        if let Some(size) = stdin_size() {
            self.resize(&size)?;
        }
        Ok(())
    }

    pub fn resize(&self, size: &Winsize) -> nix::Result<()> {
        // SAFETY: TIOCSWINSZ only reads the winsize behind the pointer.
        unsafe { set_winsize(self.master.as_raw_fd(), size) }?;
        Ok(())
    }

    pub fn size(&self) -> nix::Result<Winsize> {
        window_size(self.master.as_raw_fd())
    }

    /// Shuttle bytes stdin -> master and master -> stdout on two detached
    /// threads.
    pub fn start_copying(&self) -> io::Result<()> {
        let mut input = File::from(self.master.try_clone()?);
        let mut output = File::from(self.master.try_clone()?);

        thread::Builder::new()
            .name("pty-input".to_string())
            .spawn(move || {
                if let Err(e) = io::copy(&mut io::stdin().lock(), &mut input) {
                    debug!(error = %e, "pty input copy ended");
                }
            })?;
        thread::Builder::new()
            .name("pty-output".to_string())
            .spawn(move || {
                // EIO once the last slave descriptor is closed.
                if let Err(e) = io::copy(&mut output, &mut io::stdout().lock()) {
                    debug!(error = %e, "pty output copy ended");
                }
            })?;
        Ok(())
    }
}

/// Make the slave on fd 0 our controlling terminal in a new session. Runs in
/// the child between fork and exec.
pub(crate) fn acquire_controlling_terminal() -> io::Result<()> {
    nix::unistd::setsid()?;
    // SAFETY: plain ioctl on a descriptor the child owns.
    unsafe { set_controlling_tty(libc::STDIN_FILENO, 0) }?;
    Ok(())
}

/// Our terminal in raw mode, restored on drop.
pub struct RawMode {
    saved: Termios,
}

impl RawMode {
    /// `None` when stdin is not a terminal.
    pub fn enter() -> nix::Result<Option<RawMode>> {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Ok(None);
        }
        let saved = termios::tcgetattr(&stdin)?;
        let mut raw = saved.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(&stdin, SetArg::TCSANOW, &raw)?;
        Ok(Some(RawMode { saved }))
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(e) = termios::tcsetattr(io::stdin(), SetArg::TCSANOW, &self.saved) {
            debug!(error = %e, "failed to restore terminal");
        }
    }
}
