use roff::{bold, roman, Roff};
use std::fs;
use std::path::Path;

struct Example<'a> {
    title: &'a str,
    description: &'a str,
    code: &'a str,
}

struct ManPage<'a> {
    name: &'a str,
    about: &'a str,
    description: &'a str,
    synopsis: &'a str,
    options: &'a [(&'a str, &'a str)],
    examples: &'a [Example<'a>],
    exit_status: &'a str,
    files: &'a str,
    see_also: &'a str,
    warnings: &'a str,
}

const EXIT_STATUS: &str = "The exit status of COMMAND, or 128 plus the signal number when \
     COMMAND was killed by a signal. 127 if COMMAND was not found, 126 if it could not be \
     executed, 1 for any other failure to start it. With -d, 999 (231 once truncated by the \
     operating system) if processes other than the init are left at exit.";

const FILES: &str = "/proc/pid/status\tParent pid and signal masks of each process.
/proc/pid/fd/*\tOpen descriptors, used to find the sockets a process holds.
/proc/net/tcp, /proc/net/tcp6, /proc/net/udp, /proc/net/udp6\tSocket tables, used to \
find the port a socket is bound to.";

fn render_man_page(page: &ManPage, out_dir: &Path) {
    let version = env!("CARGO_PKG_VERSION");
    let upper_name = page.name.to_uppercase();
    let date_version = format!("{} {}", page.name, version);
    let mut roff = Roff::default();
    roff.control("TH", [upper_name.as_str(), "1", date_version.as_str()]);
    roff.control("SH", ["NAME"]);
    roff.text([roman(format!("{} - {}", page.name, page.about))]);
    roff.control("SH", ["SYNOPSIS"]);
    roff.text([bold(page.name), roman(format!(" {}", page.synopsis))]);
    roff.control("SH", ["DESCRIPTION"]);
    roff.text([roman(page.description)]);
    if !page.options.is_empty() {
        roff.control("SH", ["OPTIONS"]);
        for (flag, help) in page.options {
            roff.control("TP", []);
            roff.text([bold(*flag)]);
            roff.text([roman(*help)]);
        }
    }
    if !page.examples.is_empty() {
        roff.control("SH", ["EXAMPLES"]);
        for example in page.examples {
            roff.text([bold(example.title)]);
            roff.text([roman(example.description)]);
            roff.control("sp", [] as [&str; 0]);
            roff.control("nf", [] as [&str; 0]);
            roff.control("RS", ["4"]);
            for line in example.code.lines() {
                roff.text([roman(line)]);
            }
            roff.control("RE", [] as [&str; 0]);
            roff.control("fi", [] as [&str; 0]);
        }
    }
    if !page.exit_status.is_empty() {
        roff.control("SH", ["EXIT STATUS"]);
        roff.text([roman(page.exit_status)]);
    }
    if !page.files.is_empty() {
        roff.control("SH", ["FILES"]);
        for line in page.files.lines() {
            if let Some((path, desc)) = line.split_once('\t') {
                roff.control("TP", []);
                roff.text([roman(path)]);
                roff.text([roman(desc)]);
            } else {
                roff.text([roman(line)]);
            }
        }
    }
    if !page.warnings.is_empty() {
        roff.control("SH", ["WARNINGS"]);
        roff.text([roman(page.warnings)]);
    }
    if !page.see_also.is_empty() {
        roff.control("SH", ["SEE ALSO"]);
        roff.text([roman(page.see_also)]);
    }
    fs::write(out_dir.join(format!("{}.1", page.name)), roff.to_roff()).unwrap();
}

fn main() {
    let out_dir = Path::new("target/man");
    fs::create_dir_all(out_dir).unwrap();

    render_man_page(
        &ManPage {
            name: "pidone",
            about: "minimal init for containers",
            description: "Run COMMAND as the only child of a minimal init process meant to be \
                          PID 1 of a container. Signals received by the init are forwarded to \
                          COMMAND. When a child exits, every remaining descendant is sent \
                          SIGTERM, then SIGKILL once the kill timeout expires, and all of them \
                          are reaped. When not running as PID 1 the init registers itself as a \
                          child subreaper so orphans are reparented to it.",
            synopsis: "[--bind-port PORT [--strict-port-binding]] [--strict-signals] \
                       [--web-hook URL] [--kill-timeout SECS] [--kill-timer always|pid1] \
                       [-t] [-d] COMMAND [ARG]...",
            options: &[
                (
                    "--bind-port PORT",
                    "Report COMMAND as running only once a TCP or UDP socket is bound to \
                     PORT. The socket tables are polled every 200 milliseconds. An empty \
                     PORT is the same as leaving the option out.",
                ),
                (
                    "--strict-port-binding",
                    "With --bind-port, only count sockets held by descendants of the init.",
                ),
                (
                    "--strict-signals, --thug",
                    "When SIGINT, SIGTERM or SIGQUIT arrives and COMMAND blocks or ignores \
                     it, send SIGKILL instead.",
                ),
                (
                    "--web-hook URL",
                    "Send an HTTP PUT to URL on every state change of COMMAND (starting, \
                     running, crashed). The JSON body carries the state and the addresses \
                     of the network interfaces. Failures are logged and ignored.",
                ),
                (
                    "--kill-timeout SECS",
                    "Seconds between SIGTERM and SIGKILL for processes left once a child has \
                     exited. Defaults to 5.",
                ),
                (
                    "--kill-timer always|pid1",
                    "Arm the SIGKILL timer on every exit (always, the default) or only when \
                     running as PID 1.",
                ),
                (
                    "-t, --tty",
                    "Run COMMAND on a new pseudo-terminal and copy bytes between it and the \
                     init's standard input and output. Window size changes are passed on.",
                ),
                (
                    "-d, --debug",
                    "Log at debug level and check for leftover processes at exit.",
                ),
            ],
            examples: &[Example {
                title: "Example 1 Running a server",
                description: "Run a web server, report it running once port 8080 is bound, \
                              and kill it if it ignores SIGTERM:",
                code: "$ pidone --bind-port 8080 --strict-signals -- httpd -f",
            }],
            exit_status: EXIT_STATUS,
            files: FILES,
            see_also: "init(1), kill(1), prctl(2), wait(2), proc(5), signal(7)",
            warnings: "Every exit of a direct child, including an orphan reparented to the \
                       init, starts the termination of all remaining processes.",
        },
        out_dir,
    );

    println!("cargo:rerun-if-changed=build.rs");
}
