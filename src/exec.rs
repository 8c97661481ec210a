//! Replacing ourselves with the job.

use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use nix::unistd::{execve, geteuid};

use crate::environ::Environment;
use crate::err::{LaunchError, Result};
use crate::report;

pub fn to_cstring(s: &OsStr, what: &'static str) -> Result<CString> {
    CString::new(s.as_bytes()).map_err(|_| LaunchError::InvalidArgument {
        what: what,
        value: s.to_string_lossy().into_owned(),
    })
}

/// Everything execve needs, converted up front so that the only thing
/// left to fail is the call itself.
#[derive(Debug)]
pub struct Handoff {
    program: CString,
    argv: Vec<CString>,
    envp: Vec<CString>,
}

impl Handoff {
    pub fn new(command: &[OsString], env: &Environment) -> Result<Handoff> {
        let argv = command
            .iter()
            .map(|a| to_cstring(a, "argument"))
            .collect::<Result<Vec<CString>>>()?;
        let program = match argv.first() {
            Some(p) => p.clone(),
            None => return Err(LaunchError::Usage(String::from("no program to run"))),
        };
        Ok(Handoff { program: program, argv: argv, envp: env.to_cstrings()? })
    }

    pub fn program(&self) -> &str {
        self.program.to_str().unwrap_or("<non-UTF-8 program>")
    }

    pub fn argv(&self) -> &[CString] {
        &self.argv
    }

    /// Report the command line.  Called before the console is redirected,
    /// so it lands in the agent's log rather than the job's.
    pub fn announce(&self) {
        say!(1000, "Command to exec: {}", self.program());
        for (i, arg) in self.argv.iter().enumerate().skip(1) {
            info!("    arg[{}]: {}", i, arg.to_string_lossy());
        }
    }

    /// execve.  The program path is used as given; there is no PATH
    /// search.  Only returns on failure.
    pub fn exec(self) -> LaunchError {
        if geteuid().is_root() {
            return LaunchError::RootHandoffForbidden(self.program().to_string());
        }

        say!(1001, "Command launching...");
        report::flush();

        let err = match execve(&self.program, &self.argv, &self.envp) {
            Ok(never) => match never {},
            Err(e) => e,
        };
        LaunchError::ExecFailed { program: self.program().to_string(), cause: err }
    }
}
