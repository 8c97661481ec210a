//! The launch configuration: the command line plus every environment
//! variable we act on, read once and not changed afterwards.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::cli::Args;
use crate::environ::Environment;
use crate::err::{LaunchError, Result};
use crate::limits::ResourceLimitSet;
use crate::redirect::{RedirectionTarget, CONSOLE_LISTENER_VAR};

/// Nice increment override.
pub const NICE_VAR: &str = "DUCC_NICE";
pub const DEFAULT_NICE: i32 = 10;

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    user: Option<String>,
    log_template: Option<OsString>,
    workdir: Option<PathBuf>,
    command: Vec<OsString>,
    redirection: RedirectionTarget,
    limits: ResourceLimitSet,
    nice: i32,
    environment: Environment,
}

impl LaunchConfig {
    pub fn new(args: Args, environment: Environment) -> Result<LaunchConfig> {
        let redirection = RedirectionTarget::select(
            environment.get(CONSOLE_LISTENER_VAR),
            args.filepath.as_deref(),
        )?;
        let limits = ResourceLimitSet::from_lookup(|name| environment.get(name))?;
        let nice = nice_increment(environment.get(NICE_VAR));

        Ok(LaunchConfig {
            user: args.user,
            log_template: args.filepath,
            workdir: args.workdir,
            command: args.command,
            redirection: redirection,
            limits: limits,
            nice: nice,
            environment: environment,
        })
    }

    /// The target user.  An empty `-u` counts as missing.
    pub fn user(&self) -> Result<&str> {
        match self.user {
            Some(ref u) if !u.is_empty() => Ok(u.as_str()),
            _ => Err(LaunchError::MissingUser),
        }
    }

    pub fn log_template(&self) -> Option<&OsStr> {
        self.log_template.as_deref()
    }

    pub fn workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    pub fn command(&self) -> &[OsString] {
        &self.command
    }

    pub fn redirection(&self) -> &RedirectionTarget {
        &self.redirection
    }

    pub fn limits(&self) -> &ResourceLimitSet {
        &self.limits
    }

    pub fn nice(&self) -> i32 {
        self.nice
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }
}

/// The renice is best effort, so a malformed override is reported and the
/// default used instead.  Surrounding whitespace is tolerated.
pub fn nice_increment(raw: Option<&OsStr>) -> i32 {
    let raw = match raw {
        Some(r) => r,
        None => return DEFAULT_NICE,
    };
    match raw.to_str().and_then(|s| s.trim().parse::<i32>().ok()) {
        Some(n) => n,
        None => {
            complain!(4070, "{} is not numeric: {}; using {}", NICE_VAR, raw.to_string_lossy(), DEFAULT_NICE);
            DEFAULT_NICE
        }
    }
}
