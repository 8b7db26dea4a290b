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

// Error handling philosophy: the init must keep running for as long as its child does. Anything
// that goes wrong while looking at other processes (they vanish, we may not read their fds, a
// signal can't be delivered) is logged at debug level and skipped. Only failing to start the
// child, or losing the signal queue, ends the init early.

pub mod cli;
pub mod config;
pub mod lifecycle;
pub mod logging;
pub mod notifier;
pub mod port;
pub mod proc;
pub mod supervisor;
pub mod tty;

pub use config::{Config, KillTimer};
pub use lifecycle::{Listeners, ProcessState, StateListener};
pub use port::{Binder, BindingDetector};
pub use proc::Procfs;
pub use supervisor::{decide, Supervisor};

/// Exit status reported when `--debug` finds processes left over at exit.
pub const LEFTOVER_PROCESSES_EXIT: i32 = 999;

/// Mark this process as a child subreaper, so orphaned descendants are
/// reparented to it. Not needed as PID 1.
pub fn register_subreaper() -> nix::Result<()> {
    nix::sys::prctl::set_child_subreaper(true)
}

/// `LEFTOVER_PROCESSES_EXIT` if anything besides ourselves is still listed
/// in `procfs`, else `exit`.
pub fn check_leftovers(procfs: &Procfs, exit: i32) -> Result<i32, proc::Error> {
    let count = procfs.process_count()?;
    if count != 1 {
        tracing::warn!(count, "processes left at exit");
        return Ok(LEFTOVER_PROCESSES_EXIT);
    }
    Ok(exit)
}
