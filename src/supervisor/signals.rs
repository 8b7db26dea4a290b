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

use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::thread;

use nix::errno::Errno;
use nix::sys::signal::{SigSet, SigmaskHow, Signal};
use tracing::debug;

use super::Error;

pub const QUEUE_CAPACITY: usize = 2048;

// Signals that can't be caught, or that are raised synchronously by a fault in
// this process and must keep their default action.
const NOT_FORWARDED: [Signal; 7] = [
    Signal::SIGKILL,
    Signal::SIGSTOP,
    Signal::SIGSEGV,
    Signal::SIGBUS,
    Signal::SIGILL,
    Signal::SIGFPE,
    Signal::SIGTRAP,
];

/// The set of signals routed through the queue.
pub fn forwarded() -> SigSet {
    let mut set = SigSet::empty();
    for signal in Signal::iterator().filter(|s| !NOT_FORWARDED.contains(s)) {
        set.add(signal);
    }
    set
}

/// Signals received by this process, in arrival order.
///
/// The signals are blocked process wide and collected by a pump thread that
/// waits on them and pushes them into a bounded queue. When the queue is full
/// new signals are dropped.
pub struct Subscription {
    signals: Receiver<Signal>,
}

impl Subscription {
    /// Block the forwarded signals and start the pump.
    ///
    /// Must be called before any other thread or child exists, so that every
    /// thread inherits the mask and nothing else consumes the signals.
    pub fn start() -> Result<Subscription, Error> {
        let set = forwarded();
        set.thread_block().map_err(Error::Signal)?;

        let (tx, rx) = mpsc::sync_channel(QUEUE_CAPACITY);
        thread::Builder::new()
            .name("signal-pump".to_string())
            .spawn(move || pump(set, tx))
            .map_err(Error::Thread)?;
        Ok(Subscription { signals: rx })
    }

    /// Next signal. Fails only if the pump thread is gone.
    pub fn recv(&self) -> Result<Signal, Error> {
        self.signals.recv().map_err(|_| Error::SignalChannelClosed)
    }

    #[cfg(test)]
    pub(crate) fn from_receiver(signals: Receiver<Signal>) -> Subscription {
        Subscription { signals }
    }
}

fn pump(set: SigSet, tx: SyncSender<Signal>) {
    loop {
        let signal = match set.wait() {
            Ok(signal) => signal,
            Err(Errno::EINTR) => continue,
            Err(e) => {
                debug!(error = %e, "sigwait failed");
                continue;
            }
        };
        match tx.try_send(signal) {
            Ok(()) => {}
            Err(TrySendError::Full(signal)) => {
                debug!(%signal, "signal queue full, dropping signal");
            }
            Err(TrySendError::Disconnected(_)) => return,
        }
    }
}

/// Restore an empty signal mask. Runs in the child between fork and exec,
/// so only async-signal-safe calls are allowed here.
pub(crate) fn reset_mask() -> std::io::Result<()> {
    nix::sys::signal::sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarded_excludes_fault_signals() {
        let set = forwarded();
        for signal in NOT_FORWARDED {
            assert!(!set.contains(signal), "{} should not be forwarded", signal);
        }
        for signal in [
            Signal::SIGTERM,
            Signal::SIGINT,
            Signal::SIGQUIT,
            Signal::SIGHUP,
            Signal::SIGCHLD,
            Signal::SIGWINCH,
            Signal::SIGUSR1,
        ] {
            assert!(set.contains(signal), "{} should be forwarded", signal);
        }
    }

    #[test]
    fn closed_queue_is_an_error() {
        let (tx, rx) = mpsc::sync_channel(1);
        let subscription = Subscription::from_receiver(rx);
        tx.send(Signal::SIGHUP).unwrap();
        drop(tx);
        assert_eq!(subscription.recv().unwrap(), Signal::SIGHUP);
        assert!(matches!(
            subscription.recv(),
            Err(Error::SignalChannelClosed)
        ));
    }
}
