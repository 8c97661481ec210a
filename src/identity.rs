//! Who we are, who the job should be, and the one-way trip between them.
//!
//! The launcher is installed so that the trusted service account can use
//! it to become any ordinary user.  Anyone else who runs it gets no
//! switch at all: the job runs as the caller.  Root never gets to use it,
//! and never gets to be the target.
//!
//! The transition is modelled as a token: [`Privileged`] is obtained once
//! at startup and [`Privileged::drop_to`] consumes it, returning a
//! [`Dropped`].  Nothing turns a `Dropped` back into a `Privileged`.

use std::ffi::CString;
use std::fmt;

use nix::errno::Errno;
use nix::unistd::{self, Gid, Uid, User};

use crate::err::{map_lookup_err, LaunchError, Result};

/// The service account the agent runs under.  Only this account gets to
/// switch identities.
pub const TRUSTED_ACCOUNT: &str = "ducc";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: Uid,
    pub gid: Gid,
    pub name: String,
}

impl From<User> for Identity {
    fn from(u: User) -> Identity {
        Identity { uid: u.uid, gid: u.gid, name: u.name }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} (uid {}, gid {})", self.name, self.uid, self.gid)
    }
}

/// Account database and credential calls.  The system implementation is
/// [`SystemAccounts`]; tests substitute their own.
pub trait Accounts {
    /// Real user and group of whoever invoked us.
    fn caller(&self) -> (Uid, Gid);
    fn by_name(&self, name: &str) -> nix::Result<Option<Identity>>;
    fn by_uid(&self, uid: Uid) -> nix::Result<Option<Identity>>;
    /// Supplementary groups for `who`.
    fn init_groups(&mut self, who: &Identity) -> nix::Result<()>;
    fn set_gid(&mut self, gid: Gid) -> nix::Result<()>;
    fn set_uid(&mut self, uid: Uid) -> nix::Result<()>;
}

#[derive(Debug, Default)]
pub struct SystemAccounts;

impl Accounts for SystemAccounts {
    fn caller(&self) -> (Uid, Gid) {
        (unistd::getuid(), unistd::getgid())
    }

    fn by_name(&self, name: &str) -> nix::Result<Option<Identity>> {
        User::from_name(name).map(|u| u.map(Identity::from))
    }

    fn by_uid(&self, uid: Uid) -> nix::Result<Option<Identity>> {
        User::from_uid(uid).map(|u| u.map(Identity::from))
    }

    #[cfg(not(target_os = "macos"))]
    fn init_groups(&mut self, who: &Identity) -> nix::Result<()> {
        let name = CString::new(who.name.as_bytes()).map_err(|_| Errno::EINVAL)?;
        unistd::initgroups(&name, who.gid)
    }

    #[cfg(target_os = "macos")]
    fn init_groups(&mut self, who: &Identity) -> nix::Result<()> {
        let name = CString::new(who.name.as_bytes()).map_err(|_| Errno::EINVAL)?;
        let rc = unsafe { libc::initgroups(name.as_ptr(), who.gid.as_raw() as libc::c_int) };
        Errno::result(rc).map(drop)
    }

    fn set_gid(&mut self, gid: Gid) -> nix::Result<()> {
        unistd::setgid(gid)
    }

    fn set_uid(&mut self, uid: Uid) -> nix::Result<()> {
        unistd::setuid(uid)
    }
}

/// Held from startup until the identity switch.  Only obtainable by a
/// caller that is not root.
#[derive(Debug)]
pub struct Privileged {
    caller: Uid,
    caller_gid: Gid,
}

/// What happened to the credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Now running as the requested user.
    Switched,
    /// No trusted account on this host; running as the caller.
    NoTrustedAccount,
    /// The caller is not the trusted account; running as the caller.
    CallerNotTrusted { trusted: Uid },
    /// At least one credential call failed.  We carry on, but we may be
    /// running as the wrong user and whoever reads the log must know.
    Degraded(PrivilegeDropDegraded),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrivilegeDropDegraded {
    pub intended: Identity,
    pub gid_error: Option<Errno>,
    pub uid_error: Option<Errno>,
}

impl fmt::Display for PrivilegeDropDegraded {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "privilege drop to {} incomplete", self.intended)?;
        if let Some(e) = self.gid_error {
            write!(f, "; setgid: {}", e)?;
        }
        if let Some(e) = self.uid_error {
            write!(f, "; setuid: {}", e)?;
        }
        Ok(())
    }
}

/// Credentials after the switch.  Proof that the switch was attempted.
#[derive(Debug)]
pub struct Dropped {
    identity: Identity,
    outcome: Outcome,
}

impl Dropped {
    /// The identity the job is meant to run as.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.outcome, Outcome::Degraded(_))
    }
}

impl Privileged {
    pub fn acquire<A: Accounts>(accounts: &A) -> Result<Privileged> {
        let (uid, gid) = accounts.caller();
        if uid.is_root() {
            return Err(LaunchError::RootInvocationForbidden);
        }
        Ok(Privileged { caller: uid, caller_gid: gid })
    }

    pub fn caller(&self) -> Uid {
        self.caller
    }

    /// Resolve the trusted account and, if the caller is that account,
    /// become `target`.  Otherwise become (or stay) the caller.
    pub fn drop_to<A: Accounts>(self, accounts: &mut A, target: &str) -> Result<Dropped> {
        let requested = accounts.by_name(target).map_err(|e| map_lookup_err(e, target))?;
        if let Some(ref t) = requested {
            if t.uid.is_root() {
                return Err(LaunchError::RootTargetForbidden(target.to_string()));
            }
        }

        let trusted = accounts
            .by_name(TRUSTED_ACCOUNT)
            .map_err(|e| map_lookup_err(e, TRUSTED_ACCOUNT))?;

        match trusted {
            None => {
                let me = self.caller_identity(accounts)?;
                say!(600, "No \"{}\" user found, running instead as {}.", TRUSTED_ACCOUNT, me.name);
                Ok(settle(accounts, me, Outcome::NoTrustedAccount))
            }
            Some(t) if t.uid != self.caller => {
                say!(700, "Caller is not {} ({}), not switching ids ... ", TRUSTED_ACCOUNT, t.uid);
                let me = self.caller_identity(accounts)?;
                say!(800, "Running instead as {}.", me.name);
                Ok(settle(accounts, me, Outcome::CallerNotTrusted { trusted: t.uid }))
            }
            Some(_) => {
                let target_id = requested.ok_or_else(|| LaunchError::UnknownTargetUser(target.to_string()))?;
                Ok(switch(accounts, target_id))
            }
        }
    }

    /// The caller's real ids.  The account database only supplies the
    /// name; the primary group there need not be the group we run under.
    fn caller_identity<A: Accounts>(&self, accounts: &A) -> Result<Identity> {
        let found = accounts
            .by_uid(self.caller)
            .map_err(|e| map_lookup_err(e, &self.caller.to_string()))?;
        Ok(Identity {
            uid: self.caller,
            gid: self.caller_gid,
            name: found.map(|u| u.name).unwrap_or_else(|| self.caller.to_string()),
        })
    }
}

/// Become `target`: groups, then gid, then uid.  Once the uid is gone we
/// could no longer change the gid.
fn switch<A: Accounts>(accounts: &mut A, target: Identity) -> Dropped {
    if let Err(e) = accounts.init_groups(&target) {
        warn!("Unable to initialise supplementary groups for {}: {}", target.name, e);
    }

    let gid_error = match accounts.set_gid(target.gid) {
        Ok(()) => {
            say!(830, "Switched to group {}.", target.gid);
            None
        }
        Err(e) => {
            complain!(1100, "Unable to switch to group id {}.: {}", target.gid, e);
            Some(e)
        }
    };

    let uid_error = match accounts.set_uid(target.uid) {
        Ok(()) => {
            say!(840, "Switched to user {}.", target.uid);
            None
        }
        Err(e) => {
            complain!(1100, "Unable to switch to user id {}.: {}", target.name, e);
            Some(e)
        }
    };

    finish(target, gid_error, uid_error, Outcome::Switched)
}

/// Reset gid and uid to the caller's own.  For an ordinary executable this
/// changes nothing; for a set-id installation it throws away the borrowed
/// effective ids.
fn settle<A: Accounts>(accounts: &mut A, me: Identity, outcome: Outcome) -> Dropped {
    let gid_error = accounts.set_gid(me.gid).err();
    if let Some(e) = gid_error {
        complain!(1100, "Unable to switch to group id {}.: {}", me.gid, e);
    }
    let uid_error = accounts.set_uid(me.uid).err();
    if let Some(e) = uid_error {
        complain!(1100, "Unable to switch to user id {}.: {}", me.name, e);
    }
    finish(me, gid_error, uid_error, outcome)
}

fn finish(identity: Identity, gid_error: Option<Errno>, uid_error: Option<Errno>, ok: Outcome) -> Dropped {
    if gid_error.is_none() && uid_error.is_none() {
        return Dropped { identity: identity, outcome: ok };
    }
    let degraded = PrivilegeDropDegraded {
        intended: identity.clone(),
        gid_error: gid_error,
        uid_error: uid_error,
    };
    warn!("{}", degraded);
    Dropped { identity: identity, outcome: Outcome::Degraded(degraded) }
}
