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

// Ignores SIGTERM and sleeps until killed. Writes its pid to the file named by
// PIDONE_TEST_READY_FILE once the disposition is in place.

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::env;
use std::fs;
use std::thread;
use std::time::Duration;

fn main() {
    let ready_path =
        env::var("PIDONE_TEST_READY_FILE").expect("PIDONE_TEST_READY_FILE must be set");

    let ignored = SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty());
    // SAFETY: Installs a signal disposition before anyone signals us.
    unsafe {
        sigaction(Signal::SIGTERM, &ignored).expect("ignore SIGTERM");
    }

    // Write to a temp name and rename so readers never see a partial pid.
    let tmp = format!("{}.tmp", ready_path);
    fs::write(&tmp, std::process::id().to_string()).unwrap();
    fs::rename(&tmp, &ready_path).unwrap();

    loop {
        thread::sleep(Duration::from_millis(100));
    }
}
