//! Command line.
//!
//! ```text
//! ducc_ling <-u user> [-w workingdir] [-f filepath] -- program_name [program args]
//! ```

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

use crate::err::{LaunchError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "ducc_ling", disable_version_flag = true)]
pub struct Args {
    /// User to run the program as.
    #[arg(short = 'u', value_name = "user")]
    pub user: Option<String>,

    /// Log path template; `-<pid>.log` is appended to the last component.
    #[arg(short = 'f', value_name = "filepath")]
    pub filepath: Option<OsString>,

    /// Directory to change to before running the program.
    #[arg(short = 'w', value_name = "workingdir")]
    pub workdir: Option<PathBuf>,

    /// Program to run and its arguments.
    #[arg(last = true, required = true, value_name = "program")]
    pub command: Vec<OsString>,
}

impl Args {
    /// Any problem, `-h` included, is a usage error: the agent expects
    /// exit status 1 and the usage text.
    pub fn parse_from_args<I, T>(argv: I) -> Result<Args>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Args::try_parse_from(argv).map_err(|e| LaunchError::Usage(e.to_string().trim_end().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_command_line() {
        let a = Args::parse_from_args(vec![
            "ducc_ling", "-u", "alice", "-f", "/var/log/jobs/42", "-w", "/tmp",
            "--", "/bin/echo", "-n", "hello",
        ]).unwrap();
        assert_eq!(a.user.as_deref(), Some("alice"));
        assert_eq!(a.filepath, Some(OsString::from("/var/log/jobs/42")));
        assert_eq!(a.workdir, Some(PathBuf::from("/tmp")));
        assert_eq!(a.command, vec![OsString::from("/bin/echo"), OsString::from("-n"), OsString::from("hello")]);
    }

    #[test]
    fn user_is_checked_later_not_here() {
        let a = Args::parse_from_args(vec!["ducc_ling", "--", "/bin/true"]).unwrap();
        assert_eq!(a.user, None);
    }

    #[test]
    fn command_is_required() {
        for argv in &[vec!["ducc_ling", "-u", "alice"], vec!["ducc_ling", "-u", "alice", "--"]] {
            match Args::parse_from_args(argv.clone()) {
                Err(LaunchError::Usage(_)) => (),
                other => panic!("{:?}: {:?}", argv, other),
            }
        }
    }

    #[test]
    fn help_and_unknown_flags_are_usage_errors() {
        for flag in &["-h", "-x"] {
            match Args::parse_from_args(vec!["ducc_ling", *flag, "--", "/bin/true"]) {
                Err(LaunchError::Usage(_)) => (),
                other => panic!("{}: {:?}", flag, other),
            }
        }
    }
}
