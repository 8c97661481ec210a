//! Resource limits requested by the agent.
//!
//! Each limit we know about has an environment variable `DUCC_RLIMIT_<NAME>`.
//! When it is set to a non-negative integer, the soft limit is set to that
//! value after the identity switch; the hard limit is left alone.  Limits
//! whose variable is unset keep whatever we inherited.

use std::ffi::OsStr;

use nix::sys::resource::{getrlimit, setrlimit, Resource};

use crate::err::{LaunchError, Result};

pub type Rlim = libc::rlim_t;

/// Every limit the agent may override, by variable name.  Limits the host
/// has no notion of are left out at compile time.
pub const LIMIT_VARS: &[(&str, Resource)] = &[
    ("DUCC_RLIMIT_CORE",       Resource::RLIMIT_CORE),
    ("DUCC_RLIMIT_CPU",        Resource::RLIMIT_CPU),
    ("DUCC_RLIMIT_DATA",       Resource::RLIMIT_DATA),
    ("DUCC_RLIMIT_FSIZE",      Resource::RLIMIT_FSIZE),
    ("DUCC_RLIMIT_MEMLOCK",    Resource::RLIMIT_MEMLOCK),
    ("DUCC_RLIMIT_NOFILE",     Resource::RLIMIT_NOFILE),
    ("DUCC_RLIMIT_NPROC",      Resource::RLIMIT_NPROC),
    ("DUCC_RLIMIT_RSS",        Resource::RLIMIT_RSS),
    ("DUCC_RLIMIT_STACK",      Resource::RLIMIT_STACK),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    ("DUCC_RLIMIT_AS",         Resource::RLIMIT_AS),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    ("DUCC_RLIMIT_LOCKS",      Resource::RLIMIT_LOCKS),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    ("DUCC_RLIMIT_SIGPENDING", Resource::RLIMIT_SIGPENDING),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    ("DUCC_RLIMIT_MSGQUEUE",   Resource::RLIMIT_MSGQUEUE),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    ("DUCC_RLIMIT_NICE",       Resource::RLIMIT_NICE),
    #[cfg(any(target_os = "linux", target_os = "android"))]
    ("DUCC_RLIMIT_RTPRIO",     Resource::RLIMIT_RTPRIO),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitOverride {
    pub var: &'static str,
    pub resource: Resource,
    pub value: Rlim,
}

impl LimitOverride {
    /// The name used in status lines: the variable minus its `DUCC_`.
    pub fn name(&self) -> &'static str {
        self.var.strip_prefix("DUCC_").unwrap_or(self.var)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceLimitSet {
    overrides: Vec<LimitOverride>,
}

impl ResourceLimitSet {
    /// Collect the overrides present in the environment, in table order.
    /// The first malformed value stops the scan.
    pub fn from_lookup<'a, F>(lookup: F) -> Result<ResourceLimitSet>
    where
        F: Fn(&str) -> Option<&'a OsStr>,
    {
        let mut overrides = Vec::new();
        for &(var, resource) in LIMIT_VARS {
            let raw = match lookup(var) {
                Some(raw) => raw,
                None => continue,
            };
            let value = raw
                .to_str()
                .and_then(|s| s.parse::<Rlim>().ok())
                .ok_or_else(|| LaunchError::InvalidLimitValue {
                    var: var,
                    value: raw.to_string_lossy().into_owned(),
                })?;
            overrides.push(LimitOverride { var: var, resource: resource, value: value });
        }
        Ok(ResourceLimitSet { overrides: overrides })
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LimitOverride> {
        self.overrides.iter()
    }

    pub fn get(&self, var: &str) -> Option<Rlim> {
        self.overrides.iter().find(|o| o.var == var).map(|o| o.value)
    }

    /// Set every soft limit in the set.  A limit the kernel refuses is
    /// reported and skipped.  Returns how many were applied.
    pub fn apply(&self) -> usize {
        self.overrides.iter().filter(|o| apply_one(o)).count()
    }
}

fn apply_one(o: &LimitOverride) -> bool {
    let name = o.name();
    say!(4000, "Setting {} to {}", name, o.value);

    let hard = match getrlimit(o.resource) {
        Ok((soft, hard)) => {
            say!(4030, "Before: {} soft[{}] hard[{}]", name, soft, hard);
            hard
        }
        Err(e) => {
            complain!(4030, "{} limit was not set: {}", o.var, e);
            return false;
        }
    };

    if let Err(e) = setrlimit(o.resource, o.value, hard) {
        complain!(4030, "{} limit was not set: {}", o.var, e);
        return false;
    }

    if let Ok((soft, hard)) = getrlimit(o.resource) {
        say!(4040, "After: {} soft[{}] hard[{}]", name, soft, hard);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environ::Environment;
    use std::collections::HashSet;

    #[test]
    fn table_has_no_duplicates() {
        let names: HashSet<&str> = LIMIT_VARS.iter().map(|&(n, _)| n).collect();
        assert_eq!(names.len(), LIMIT_VARS.len());
    }

    #[test]
    fn unset_variables_are_skipped() {
        let env = Environment::from_pairs(vec![("PATH", "/bin")]);
        let set = ResourceLimitSet::from_lookup(|n| env.get(n)).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn numeric_values_are_collected() {
        let env = Environment::from_pairs(vec![
            ("DUCC_RLIMIT_NOFILE", "256"),
            ("DUCC_RLIMIT_CORE", "0"),
        ]);
        let set = ResourceLimitSet::from_lookup(|n| env.get(n)).unwrap();
        assert_eq!(set.get("DUCC_RLIMIT_CORE"), Some(0));
        assert_eq!(set.get("DUCC_RLIMIT_NOFILE"), Some(256));
        assert_eq!(set.get("DUCC_RLIMIT_CPU"), None);
        // table order, not environment order
        let order: Vec<&str> = set.iter().map(|o| o.name()).collect();
        assert_eq!(order, vec!["RLIMIT_CORE", "RLIMIT_NOFILE"]);
    }

    #[test]
    fn malformed_values_are_configuration_errors() {
        for bad in &["12k", "-1", "", " 5"] {
            let env = Environment::from_pairs(vec![("DUCC_RLIMIT_CPU", *bad)]);
            match ResourceLimitSet::from_lookup(|n| env.get(n)) {
                Err(LaunchError::InvalidLimitValue { var, value }) => {
                    assert_eq!(var, "DUCC_RLIMIT_CPU");
                    assert_eq!(value, *bad);
                }
                other => panic!("{:?}: {:?}", bad, other),
            }
        }
    }

    #[test]
    fn apply_sets_the_soft_limit() {
        // Lowering the core limit is always permitted.
        let env = Environment::from_pairs(vec![("DUCC_RLIMIT_CORE", "0")]);
        let set = ResourceLimitSet::from_lookup(|n| env.get(n)).unwrap();
        let (_, hard_before) = getrlimit(Resource::RLIMIT_CORE).unwrap();

        assert_eq!(set.apply(), 1);
        let (soft, hard) = getrlimit(Resource::RLIMIT_CORE).unwrap();
        assert_eq!(soft, 0);
        assert_eq!(hard, hard_before);
    }
}
