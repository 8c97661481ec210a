//! Error type and helper functions.
//!
//! Every fatal condition the launcher can hit has its own variant.  Each
//! variant carries the numeric marker the agent greps for, so the
//! top-level reporter can print `<code> <message>` and exit.

use std::fmt;
use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Why a console listener address was refused before we ever tried the
/// IP part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketAddressProblem {
    MissingPort,
    PortNotNumeric,
}

impl fmt::Display for SocketAddressProblem {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            SocketAddressProblem::MissingPort => f.write_str("invalid socket, missing port"),
            SocketAddressProblem::PortNotNumeric => f.write_str("port is not numeric"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("{0}")]
    Usage(String),

    #[error("missing userid")]
    MissingUser,

    #[error("Can't run ducc_ling as root")]
    RootInvocationForbidden,

    #[error("User \"{0}\" does not exist")]
    UnknownTargetUser(String),

    #[error("setuid to root not allowed (requested user \"{0}\")")]
    RootTargetForbidden(String),

    #[error("Cannot look up account {name}: {cause}")]
    AccountLookup { name: String, #[source] cause: Errno },

    #[error("Log path template {0:?} has no file name component")]
    EmptyLogTemplate(String),

    #[error("Buffer overflow: path {path:?} would exceed {limit} bytes")]
    PathTooLong { path: String, limit: usize },

    #[error("Log base {} is not a directory", .path.display())]
    NotADirectory { path: PathBuf },

    #[error("Cannot create log path component {}: {cause}", .path.display())]
    DirectoryCreateFailed { path: PathBuf, #[source] cause: io::Error },

    #[error("{var} is not numeric; limit not set: {value}")]
    InvalidLimitValue { var: &'static str, value: String },

    #[error("{problem}: {addr}")]
    InvalidSocketAddress { addr: String, problem: SocketAddressProblem },

    #[error("Can't parse IP address {0}")]
    InvalidAddress(String),

    #[error("Error connecting to console socket {addr}: {cause}")]
    ConnectFailed { addr: String, #[source] cause: io::Error },

    #[error("Cannot get local socket name: {0}")]
    LocalAddressUnavailable(#[source] io::Error),

    #[error("cannot open file {}: {cause}", .path.display())]
    LogFileOpenFailed { path: PathBuf, #[source] cause: io::Error },

    #[error("cannot duplicate console onto fd {fd}: {cause}")]
    RedirectFailed { fd: i32, #[source] cause: Errno },

    #[error("standard streams have already been redirected")]
    StreamsAlreadyClaimed,

    #[error("Unable to switch to working directory {}: {cause}", .path.display())]
    ChdirFailed { path: PathBuf, #[source] cause: io::Error },

    #[error("Invalid {what}: {value:?} contains a NUL byte")]
    InvalidArgument { what: &'static str, value: String },

    #[error("Refusing to exec {0} with effective uid 0")]
    RootHandoffForbidden(String),

    #[error("cannot exec {program}: {cause}")]
    ExecFailed { program: String, #[source] cause: Errno },
}

impl LaunchError {
    /// The status-line code this failure is reported under.
    pub fn code(&self) -> u32 {
        use self::LaunchError::*;
        match *self {
            Usage(_)                   => 999,
            MissingUser                => 200,
            RootInvocationForbidden    => 400,
            UnknownTargetUser(_)       => 820,
            AccountLookup { .. }       => 810,
            RootTargetForbidden(_)     => 900,
            RootHandoffForbidden(_)    => 910,
            ChdirFailed { .. }         => 1110,
            LogFileOpenFailed { .. }   => 1300,
            RedirectFailed { .. }      => 1310,
            StreamsAlreadyClaimed      => 1320,
            ExecFailed { .. }          => 1400,
            InvalidArgument { .. }     => 1410,
            InvalidSocketAddress { problem: SocketAddressProblem::MissingPort, .. } => 1700,
            InvalidSocketAddress { problem: SocketAddressProblem::PortNotNumeric, .. } => 1702,
            InvalidAddress(_)          => 1703,
            ConnectFailed { .. }       => 1707,
            LocalAddressUnavailable(_) => 1709,
            DirectoryCreateFailed { .. } => 2100,
            NotADirectory { .. }       => 2200,
            EmptyLogTemplate(_)        => 2300,
            PathTooLong { .. }         => 3000,
            InvalidLimitValue { .. }   => 4010,
        }
    }

    /// True for the errors that should be followed by the usage text:
    /// bad flags, and required input that was left out.
    pub fn wants_usage(&self) -> bool {
        matches!(*self, LaunchError::Usage(_) | LaunchError::MissingUser)
    }
}

pub type Result<T> = std::result::Result<T, LaunchError>;

pub fn map_mkdir_err(cause: io::Error, path: PathBuf) -> LaunchError {
    LaunchError::DirectoryCreateFailed { path: path, cause: cause }
}
pub fn map_lookup_err(cause: Errno, name: &str) -> LaunchError {
    LaunchError::AccountLookup { name: name.to_string(), cause: cause }
}
pub fn map_dup_err(cause: Errno, fd: i32) -> LaunchError {
    LaunchError::RedirectFailed { fd: fd, cause: cause }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_follow_agent_conventions() {
        assert_eq!(LaunchError::RootInvocationForbidden.code(), 400);
        assert_eq!(LaunchError::MissingUser.code(), 200);
        assert_eq!(LaunchError::RootTargetForbidden("root".into()).code(), 900);
        assert_eq!(
            LaunchError::InvalidSocketAddress {
                addr: "1.2.3.4".into(),
                problem: SocketAddressProblem::MissingPort,
            }
            .code(),
            1700
        );
        assert_eq!(
            LaunchError::ExecFailed { program: "/x".into(), cause: Errno::ENOENT }.code(),
            1400
        );
    }

    #[test]
    fn os_errors_are_rendered() {
        let e = map_mkdir_err(io::Error::from_raw_os_error(libc::EACCES), PathBuf::from("/a/b"));
        let msg = e.to_string();
        assert!(msg.contains("/a/b"), "{}", msg);
        assert!(msg.contains("denied"), "{}", msg);
    }

    #[test]
    fn missing_input_wants_usage() {
        assert!(LaunchError::Usage("x".into()).wants_usage());
        assert!(LaunchError::MissingUser.wants_usage());
        assert!(!LaunchError::RootTargetForbidden("root".into()).wants_usage());
    }
}
