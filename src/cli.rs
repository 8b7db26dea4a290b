use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::config::{Config, KillTimer};
use crate::proc::{Procfs, DEFAULT_MOUNT_POINT};

#[derive(Debug, Parser)]
#[command(
    name = "pidone",
    version,
    about = "Minimal init for containers",
    long_about = "Run COMMAND as the only child of a minimal init process. Forward signals to it, \
reap every orphaned process that ends up with the init, and exit with the status of COMMAND \
(128 plus the signal number when COMMAND was killed by a signal). When not running as PID 1 the \
init registers itself as a child subreaper.",
    trailing_var_arg = true
)]
pub struct PidoneCli {
    /// Report the command as running once PORT is bound
    ///
    /// Watch the TCP and UDP socket tables and report the command as running only once a
    /// socket is bound to PORT. Without this option the command is reported running as soon
    /// as it has started. An empty PORT is the same as leaving the option out.
    #[arg(long = "bind-port", value_name = "PORT", value_parser = parse_port)]
    pub bind_port: Option<String>,

    /// Only count descendants as binders of --bind-port
    ///
    /// With --bind-port, require the port to be bound by one of the init's descendants
    /// rather than by any process visible in the socket tables.
    #[arg(long = "strict-port-binding")]
    pub strict_port_binding: bool,

    /// Kill the command if it ignores stop signals
    ///
    /// When SIGINT, SIGTERM or SIGQUIT is received and the command blocks or ignores that
    /// signal, send it SIGKILL instead.
    #[arg(long = "strict-signals", visible_alias = "thug")]
    pub strict_signals: bool,

    /// Notify URL of every lifecycle change
    ///
    /// Send an HTTP PUT with a JSON body describing the command's state (starting, running or
    /// crashed) and the container's network interfaces to URL on every change. Failed
    /// notifications are logged and otherwise ignored.
    #[arg(long = "web-hook", value_name = "URL")]
    pub web_hook: Option<String>,

    /// Seconds to wait before killing leftover processes
    ///
    /// Once the command exits, every remaining descendant is sent SIGTERM, and SIGKILL after
    /// this many seconds.
    #[arg(long = "kill-timeout", value_name = "SECS", default_value_t = 5)]
    pub kill_timeout: u64,

    /// When to arm the SIGKILL timer
    ///
    /// "always" arms it on every exit; "pid1" only when running as PID 1.
    #[arg(long = "kill-timer", value_enum, default_value_t = KillTimer::Always)]
    pub kill_timer: KillTimer,

    /// Mount point of the proc filesystem
    #[arg(long = "procfs", value_name = "PATH", default_value = DEFAULT_MOUNT_POINT, hide = true)]
    pub procfs: PathBuf,

    /// Run the command on a pseudo-terminal
    ///
    /// Allocate a pty, make it the command's controlling terminal and stdio, and copy bytes
    /// between it and the init's own stdin and stdout.
    #[arg(short = 't', long = "tty")]
    pub tty: bool,

    /// Verbose logging
    ///
    /// Log at debug level and, on exit, check that no process other than the init is left.
    /// If one is, exit with status 999 (231 once truncated by the OS).
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,

    /// Command to run, with its arguments
    #[arg(value_name = "COMMAND", required = true, num_args = 1..)]
    pub command: Vec<OsString>,
}

/// A decimal port number, or the empty string for "no port".
fn parse_port(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Ok(String::new());
    }
    s.parse::<u16>()
        .map(|port| port.to_string())
        .map_err(|e| format!("invalid port {:?}: {}", s, e))
}

impl From<PidoneCli> for Config {
    fn from(cli: PidoneCli) -> Config {
        Config {
            argv: cli.command,
            strict_signals: cli.strict_signals,
            procfs: Procfs::new(cli.procfs),
            bind_port: cli.bind_port.filter(|port| !port.is_empty()),
            strict_port_binding: cli.strict_port_binding,
            web_hook: cli.web_hook.filter(|url| !url.is_empty()),
            kill_timeout: Duration::from_secs(cli.kill_timeout),
            kill_timer: cli.kill_timer,
            tty: cli.tty,
            debug: cli.debug,
        }
    }
}
