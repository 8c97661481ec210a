//! The launch sequence.
//!
//! Order matters and is fixed: identity first, so nothing the caller
//! controls touches the filesystem or the dynamic linker while we still
//! hold the launcher's credentials; then limits, priority, working
//! directory and environment; then the console; then exec.

use std::convert::Infallible;
use std::env;
use std::path::Path;

use nix::errno::Errno;

use crate::config::LaunchConfig;
use crate::err::{LaunchError, Result};
use crate::exec::Handoff;
use crate::identity::{Accounts, Privileged};
use crate::log_path::LogPath;
use crate::redirect::{RedirectionTarget, Redirected, StandardStreams};

/// Run the whole sequence.  Never returns `Ok`: success means this
/// process is now the job.
pub fn launch<A: Accounts>(
    privileged: Privileged,
    accounts: &mut A,
    streams: StandardStreams,
    config: &LaunchConfig,
) -> Result<Infallible> {
    match *config.redirection() {
        RedirectionTarget::Socket(ref addr) => {
            say!(302, "Redirecting console into socket {}:{}.", addr.ip, addr.port)
        }
        RedirectionTarget::File(ref t) => {
            say!(301, "Redirecting console into file {}.", t.to_string_lossy())
        }
        RedirectionTarget::None => say!(300, "Bypassing redirect of log."),
    }

    let user = config.user()?;
    let pid = std::process::id();

    // Setup checks passed; the agent watches for this line.
    say!(0, "{}", pid);

    let dropped = privileged.drop_to(accounts, user)?;
    info!("Running as {}", dropped.identity());

    config.limits().apply();
    renice(config.nice());

    if let Some(dir) = config.workdir() {
        change_directory(dir)?;
    }

    let mut environment = config.environment().clone();
    environment.translate_library_path();

    let handoff = Handoff::new(config.command(), &environment)?;
    handoff.announce();

    let _console = redirect(streams, config, pid)?;
    Err(handoff.exec())
}

/// Lower our priority.  Failure is reported and otherwise ignored.
pub fn renice(increment: i32) {
    say!(4050, "Nice: Using {}", increment);
    // nice(2) may legitimately return -1, so errno is the only signal.
    let rc = unsafe {
        Errno::clear();
        libc::nice(increment)
    };
    if rc == -1 {
        let e = Errno::last();
        if e != Errno::UnknownErrno {
            complain!(4060, "Can't set nice.: {}", e);
        }
    }
}

pub fn change_directory(dir: &Path) -> Result<()> {
    env::set_current_dir(dir).map_err(|e| LaunchError::ChdirFailed { path: dir.to_path_buf(), cause: e })?;
    say!(1120, "Changed to working dir {}", dir.display());
    Ok(())
}

fn redirect(streams: StandardStreams, config: &LaunchConfig, pid: u32) -> Result<Redirected> {
    match *config.redirection() {
        RedirectionTarget::None => Ok(streams.inherit()),
        RedirectionTarget::File(ref template) => {
            let log = LogPath::plan(template, pid)?;
            streams.to_file(&log)
        }
        RedirectionTarget::Socket(ref addr) => {
            let console = streams.to_console(addr)?;
            // Name the log file this job would have had, so the agent can
            // still find it by name.
            if let Some(template) = config.log_template() {
                match LogPath::plan(template, pid) {
                    Ok(log) => say!(1002, "CONSOLE_REDIRECT {}", log.file().display()),
                    Err(e) => warn!("Cannot name log file for {}: {}", template.to_string_lossy(), e),
                }
            }
            Ok(console)
        }
    }
}
