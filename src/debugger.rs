use std::fs;

use nix::sys::signal::{Signal, raise};
use nix::unistd::getpid;
use tracing::{debug, info};

const STATUS_FILE: &str = "/proc/self/status";

/// Whether a tracer (debugger) is attached to this process
pub fn is_attached() -> bool {
    fs::read_to_string(STATUS_FILE)
        .ok()
        .and_then(|status| tracer_pid(&status))
        .is_some_and(|pid| pid != 0)
}

fn tracer_pid(status: &str) -> Option<i64> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("TracerPid:"))
        .and_then(|value| value.trim().parse().ok())
}

/// Ask for a debugger before going any further.
///
/// Stops the process until a debugger attaches or it receives SIGCONT.
/// Best effort: does nothing when a tracer is already present or the signal
/// cannot be raised.
pub fn launch() {
    if is_attached() {
        debug!("debugger already attached");
        return;
    }
    let pid = getpid();
    println!("Waiting for debugger (pid {pid}). Attach or send SIGCONT to continue.");
    info!(%pid, "stopping for debugger");
    if let Err(err) = raise(Signal::SIGSTOP) {
        debug!(error = %err, "could not stop for debugger");
    }
}

/// Trap into the attached debugger; a no-op when nobody is tracing us
pub fn break_into() {
    if is_attached() {
        let _ = raise(Signal::SIGTRAP);
    }
}
