//! Status lines.
//!
//! The agent that starts us reads our output looking for lines of the form
//! `<code> <message>`.  Informational lines go to stdout, complaints to
//! stderr.  Once the console has been redirected, both land in the job's
//! log (or the listener's socket), which is the point.

use std::fmt;
use std::io::{self, Write};

use crate::err::LaunchError;

/// Write a status line to stdout: `say!(1120, "Changed to {}", dir)`.
#[macro_export]
macro_rules! say {
    ($code:expr, $($arg:tt)+) => {
        $crate::report::say($code, format_args!($($arg)+))
    };
}

/// Write a status line to stderr.
#[macro_export]
macro_rules! complain {
    ($code:expr, $($arg:tt)+) => {
        $crate::report::complain($code, format_args!($($arg)+))
    };
}

// A closed stdout must not take the launcher down with it, so write
// errors are dropped here.
pub fn say(code: u32, msg: fmt::Arguments) {
    let out = io::stdout();
    let mut out = out.lock();
    let _ = writeln!(out, "{} {}", code, msg);
}

pub fn complain(code: u32, msg: fmt::Arguments) {
    let _ = writeln!(io::stderr(), "{} {}", code, msg);
}

/// Push anything still buffered out to the current fds 1 and 2.
/// Must be called before those descriptors are replaced.
pub fn flush() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

/// The banner.  Its first appearance lands in the agent's log; after a
/// redirect it is the first thing written into the job's log.
pub fn version() {
    let out = io::stdout();
    let mut out = out.lock();
    let _ = writeln!(out, "050 ducc_ling Version {}", env!("CARGO_PKG_VERSION"));
    let _ = out.flush();
}

pub fn usage() {
    let err = io::stderr();
    let mut err = err.lock();
    let _ = writeln!(err, "999 Usage:");
    let _ = writeln!(err, "999   ducc_ling <-u user> [-w workingdir] [-f filepath] -- program_name [program args]");
}

/// Report a fatal error in the same format as every other status line.
pub fn failure(e: &LaunchError) {
    complain(e.code(), format_args!("{}", e));
    if e.wants_usage() {
        usage();
    }
    flush();
}
