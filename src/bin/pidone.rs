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

use std::process::exit;
use std::sync::Arc;

use clap::Parser;
use tracing::{debug, error, warn};

use pidone::cli::PidoneCli;
use pidone::lifecycle::LogListener;
use pidone::notifier::WebHookListener;
use pidone::supervisor::signals::Subscription;
use pidone::{BindingDetector, Config, Listeners, ProcessState, StateListener, Supervisor};

fn listeners(config: &Config) -> Listeners {
    let mut listeners = Listeners::default();
    listeners.push(Arc::new(LogListener));
    if let Some(url) = config.web_hook.as_deref().filter(|url| !url.is_empty()) {
        match WebHookListener::new(url) {
            Ok(hook) => listeners.push(Arc::new(hook)),
            Err(e) => error!(url = %url, error = %e, "web hook disabled"),
        }
    }
    listeners
}

fn run(config: Config, signals: Subscription) -> i32 {
    let listener: Arc<dyn StateListener> = Arc::new(listeners(&config));

    let self_pid = std::process::id();
    debug!(pid = self_pid, "init started");
    if self_pid != 1 {
        if let Err(e) = pidone::register_subreaper() {
            warn!(error = %e, "cannot become child subreaper, orphans will not be reaped");
        }
    }

    listener.state_changed(ProcessState::Starting);
    let mut supervisor = match Supervisor::start(&config) {
        Ok(supervisor) => supervisor,
        Err(e) => {
            error!("{}", e);
            listener.state_changed(ProcessState::Crashed);
            return e.exit_code();
        }
    };

    match config.bind_port.clone().filter(|port| !port.is_empty()) {
        Some(port) => {
            BindingDetector::new(config.procfs.clone()).spawn_watcher(
                port,
                config.strict_port_binding,
                self_pid,
                Arc::clone(&listener),
            );
        }
        None => listener.state_changed(ProcessState::Running),
    }

    let status = supervisor.forward(&signals);
    listener.state_changed(ProcessState::Crashed);
    // Restore the terminal before we print anything else.
    drop(supervisor);

    let status = match status {
        Ok(status) => status,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    if config.debug {
        match pidone::check_leftovers(&config.procfs, status) {
            Ok(status) => return status,
            Err(e) => error!("{}", e),
        }
    }
    status
}

fn main() {
    // Block signals before any thread exists so they all land in the queue.
    let signals = match Subscription::start() {
        Ok(signals) => signals,
        Err(e) => {
            eprintln!("pidone: {}", e);
            exit(1);
        }
    };

    let config: Config = PidoneCli::parse().into();
    if let Err(e) = pidone::logging::init(config.debug) {
        eprintln!("pidone: failed to initialize logging: {}", e);
    }

    exit(run(config, signals));
}
