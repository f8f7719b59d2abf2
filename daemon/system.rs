// Process plumbing: termination signals and background (daemon) mode
use crate::service::ShutdownHandle;
use nix::sys::signal::{SigSet, Signal};
use nix::unistd::{dup2, fork, setsid, ForkResult};
use std::fs::OpenOptions;
use std::io;
use std::os::unix::io::AsRawFd;
use std::thread::{self, JoinHandle};
use tracing::{error, info};

/// Block SIGINT/SIGTERM on the calling thread. Call before spawning any
/// thread so every thread inherits the mask and only the watcher sees them.
pub fn block_termination_signals() -> io::Result<SigSet> {
    let mut set = SigSet::empty();
    set.add(Signal::SIGINT);
    set.add(Signal::SIGTERM);
    set.thread_block()?;
    Ok(set)
}

/// Wait for a blocked termination signal and trigger graceful shutdown.
pub fn spawn_signal_watcher(signals: SigSet, shutdown: ShutdownHandle) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("aesd-signals".to_string())
        .spawn(move || match signals.wait() {
            Ok(signal) => {
                info!(?signal, "Caught signal, exiting");
                shutdown.trigger();
            }
            Err(e) => error!("signal wait failed: {}", e),
        })
}

/// Detach from the terminal: fork, exit the parent, start a new session
/// and point stdio at /dev/null. Must run before any thread is spawned.
pub fn daemonize() -> io::Result<()> {
    // SAFETY: called while the process is still single-threaded
    match unsafe { fork() }? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }
    setsid()?;

    let devnull = OpenOptions::new().read(true).write(true).open("/dev/null")?;
    for fd in [libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        dup2(devnull.as_raw_fd(), fd)?;
    }
    Ok(())
}
