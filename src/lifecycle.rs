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

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

/// Coarse lifecycle of the supervised command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessState {
    Starting,
    /// The command is up, or has bound the watched port.
    Running,
    /// The command is gone, whatever its exit status.
    Crashed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Crashed => "crashed",
        })
    }
}

/// Receives lifecycle transitions. Called from the control thread and from
/// the port watcher thread.
pub trait StateListener: Send + Sync {
    fn state_changed(&self, state: ProcessState);
}

impl<F> StateListener for F
where
    F: Fn(ProcessState) + Send + Sync,
{
    fn state_changed(&self, state: ProcessState) {
        self(state)
    }
}

/// Listener that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogListener;

impl StateListener for LogListener {
    fn state_changed(&self, state: ProcessState) {
        info!(%state, "process state changed");
    }
}

/// Fans every transition out to each listener in turn.
#[derive(Default, Clone)]
pub struct Listeners(Vec<Arc<dyn StateListener>>);

impl Listeners {
    pub fn push(&mut self, listener: Arc<dyn StateListener>) {
        self.0.push(listener);
    }
}

impl StateListener for Listeners {
    fn state_changed(&self, state: ProcessState) {
        for listener in &self.0 {
            listener.state_changed(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn closures_are_listeners() {
        let seen = Mutex::new(Vec::new());
        let listener = |state: ProcessState| seen.lock().unwrap().push(state);
        listener.state_changed(ProcessState::Starting);
        listener.state_changed(ProcessState::Running);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ProcessState::Starting, ProcessState::Running]
        );
    }

    #[test]
    fn listeners_are_called_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut listeners = Listeners::default();
        for id in 0..2 {
            let seen = Arc::clone(&seen);
            listeners.push(Arc::new(move |state: ProcessState| {
                seen.lock().unwrap().push((id, state))
            }));
        }
        listeners.state_changed(ProcessState::Crashed);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(0, ProcessState::Crashed), (1, ProcessState::Crashed)]
        );
    }

    #[test]
    fn states_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&ProcessState::Running).unwrap(),
            "\"running\""
        );
    }

    #[test]
    fn state_names() {
        assert_eq!(ProcessState::Starting.to_string(), "starting");
        assert_eq!(ProcessState::Running.to_string(), "running");
        assert_eq!(ProcessState::Crashed.to_string(), "crashed");
    }
}
