//! The environment the job will inherit.
//!
//! We take one snapshot of our own environment at startup and do every
//! lookup and rewrite against that snapshot; the process environment
//! itself is never consulted again.  The snapshot is what gets handed to
//! execve.

use std::env;
use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use crate::err::{LaunchError, Result};

/// Set by the agent when the job needs a private library search path.
/// Passing it under its own name keeps the dynamic linker from acting on
/// it while we are still running with the launcher's credentials.
pub const LIBRARY_PATH_OVERRIDE: &str = "DUCC_LD_LIBRARY_PATH";

#[cfg(target_os = "macos")]
pub const LIBRARY_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(not(target_os = "macos"))]
pub const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: Vec<(OsString, OsString)>,
}

impl Environment {
    pub fn capture() -> Environment {
        Environment { vars: env::vars_os().collect() }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Environment
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        Environment {
            vars: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&OsStr> {
        self.vars
            .iter()
            .find(|&&(ref k, _)| k.as_os_str() == OsStr::new(name))
            .map(|&(_, ref v)| v.as_os_str())
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|&(ref k, ref v)| (k.as_os_str(), v.as_os_str()))
    }

    /// Rename `DUCC_LD_LIBRARY_PATH` to the platform's search-path
    /// variable, keeping its value and its position.  Any search path we
    /// inherited under the real name is dropped, so the job sees exactly
    /// one.  Returns whether a rename happened.
    pub fn translate_library_path(&mut self) -> bool {
        let pos = match self
            .vars
            .iter()
            .position(|&(ref k, _)| k.as_os_str() == OsStr::new(LIBRARY_PATH_OVERRIDE))
        {
            Some(pos) => pos,
            None => {
                say!(3001, "Did not find {}, not setting {}.", LIBRARY_PATH_OVERRIDE, LIBRARY_PATH_VAR);
                return false;
            }
        };

        say!(3000, "Found {} and it is {}", LIBRARY_PATH_OVERRIDE,
             self.vars[pos].1.to_string_lossy());
        say!(3002, "Changing {} to {}", LIBRARY_PATH_OVERRIDE, LIBRARY_PATH_VAR);
        self.vars[pos].0 = OsString::from(LIBRARY_PATH_VAR);

        let mut i = 0;
        self.vars.retain(|&(ref k, _)| {
            let keep = i == pos || k.as_os_str() != OsStr::new(LIBRARY_PATH_VAR);
            i += 1;
            keep
        });
        true
    }

    /// `NAME=value` strings for execve.
    pub fn to_cstrings(&self) -> Result<Vec<CString>> {
        self.vars
            .iter()
            .map(|&(ref k, ref v)| {
                let mut entry = Vec::with_capacity(k.len() + v.len() + 1);
                entry.extend_from_slice(k.as_bytes());
                entry.push(b'=');
                entry.extend_from_slice(v.as_bytes());
                CString::new(entry).map_err(|_| LaunchError::InvalidArgument {
                    what: "environment entry",
                    value: k.to_string_lossy().into_owned(),
                })
            })
            .collect()
    }
}
