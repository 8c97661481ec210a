//! Console redirection.
//!
//! The job's stdout and stderr go either into a log file or, when someone
//! is watching the job live, into a TCP connection to their listener
//! (which also gets stdin).  File descriptors 0, 1 and 2 are process-wide
//! state, so the right to replace them is a value, [`StandardStreams`],
//! that can be claimed exactly once and is consumed by the redirect.

use std::ffi::{OsStr, OsString};
use std::fs::{File, OpenOptions};
use std::net::{Ipv4Addr, SocketAddrV4, TcpStream};
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::Path;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use nix::unistd::dup2;

use crate::err::{map_dup_err, LaunchError, Result, SocketAddressProblem};
use crate::log_path::LogPath;
use crate::report;

/// Set by the agent when an interactive session is listening for the
/// job's console.  Wins over `-f`.
pub const CONSOLE_LISTENER_VAR: &str = "DUCC_CONSOLE_LISTENER";

pub const LOG_FILE_MODE: u32 = 0o644;

/// Where the listener is.  Only a literal IPv4 address is accepted: no
/// name lookups while we are setting up someone else's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl FromStr for ConsoleAddress {
    type Err = LaunchError;

    fn from_str(s: &str) -> Result<ConsoleAddress> {
        let bad = |problem| LaunchError::InvalidSocketAddress { addr: s.to_string(), problem: problem };

        let colon = s.find(':').ok_or_else(|| bad(SocketAddressProblem::MissingPort))?;
        let (host, port) = (&s[..colon], &s[colon + 1..]);

        let port = port.parse::<u16>().map_err(|_| bad(SocketAddressProblem::PortNotNumeric))?;
        let ip = host
            .parse::<Ipv4Addr>()
            .map_err(|_| LaunchError::InvalidAddress(host.to_string()))?;
        Ok(ConsoleAddress { ip: ip, port: port })
    }
}

impl From<ConsoleAddress> for SocketAddrV4 {
    fn from(a: ConsoleAddress) -> SocketAddrV4 {
        SocketAddrV4::new(a.ip, a.port)
    }
}

/// Which redirect, if any, this launch performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectionTarget {
    None,
    File(OsString),
    Socket(ConsoleAddress),
}

impl RedirectionTarget {
    /// A live listener beats a log file; neither means the job inherits
    /// our own streams.
    pub fn select(listener: Option<&OsStr>, template: Option<&OsStr>) -> Result<RedirectionTarget> {
        if let Some(addr) = listener {
            let addr = addr
                .to_str()
                .ok_or_else(|| LaunchError::InvalidAddress(addr.to_string_lossy().into_owned()))?;
            return Ok(RedirectionTarget::Socket(addr.parse()?));
        }
        Ok(match template {
            Some(t) => RedirectionTarget::File(t.to_os_string()),
            None => RedirectionTarget::None,
        })
    }
}

static CLAIMED: AtomicBool = AtomicBool::new(false);

/// The right to replace fds 0, 1 and 2.
#[derive(Debug)]
pub struct StandardStreams {
    _private: (),
}

/// Where fds 0, 1 and 2 point now.  Holds the original descriptor until
/// exec closes it.
#[derive(Debug)]
pub enum Redirected {
    Inherited,
    File(File),
    Socket(TcpStream),
}

impl StandardStreams {
    /// Succeeds once per process.
    pub fn claim() -> Option<StandardStreams> {
        if CLAIMED.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(StandardStreams { _private: () })
        }
    }

    /// Leave the streams as they are.
    pub fn inherit(self) -> Redirected {
        Redirected::Inherited
    }

    /// Create the log's directories, open the log, and point stdout and
    /// stderr at it.
    pub fn to_file(self, log: &LogPath) -> Result<Redirected> {
        let path = log.materialize()?;
        say!(1200, "Redirecting stdout and stderr to {} as uid {} euid {}",
             path.display(), nix::unistd::getuid(), nix::unistd::geteuid());

        let file = open_log_file(path)?;
        report::flush();
        cover(file.as_raw_fd(), &[libc::STDOUT_FILENO, libc::STDERR_FILENO])?;

        report::version();
        Ok(Redirected::File(file))
    }

    /// Connect to the listener and point stdin, stdout and stderr at the
    /// connection.
    pub fn to_console(self, addr: &ConsoleAddress) -> Result<Redirected> {
        say!(1701, "host[{}] port[{}]", addr.ip, addr.port);
        say!(1704, "addr: {}", addr.ip);
        say!(1705, "About to connect");
        let sock = connect(addr)?;
        say!(1706, "Connected");

        let local = sock.local_addr().map_err(LaunchError::LocalAddressUnavailable)?;
        say!(1708, "Local port is {}", local.port());

        report::flush();
        cover(sock.as_raw_fd(), &[libc::STDIN_FILENO, libc::STDOUT_FILENO, libc::STDERR_FILENO])?;

        report::version();
        Ok(Redirected::Socket(sock))
    }
}

pub fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(LOG_FILE_MODE)
        .open(path)
        .map_err(|e| LaunchError::LogFileOpenFailed { path: path.to_path_buf(), cause: e })
}

/// Blocking connect; there is no timeout.
pub fn connect(addr: &ConsoleAddress) -> Result<TcpStream> {
    TcpStream::connect(SocketAddrV4::from(*addr)).map_err(|e| LaunchError::ConnectFailed {
        addr: SocketAddrV4::from(*addr).to_string(),
        cause: e,
    })
}

fn cover(fd: RawFd, targets: &[RawFd]) -> Result<()> {
    for &target in targets {
        dup2(fd, target).map_err(|e| map_dup_err(e, target))?;
    }
    Ok(())
}
