//! Building the job's log file path.
//!
//! The agent hands us a template like `/var/log/jobs/42`.  Everything
//! but the last component is a directory that must exist (we create the
//! missing ones); the last component is the file stem, and the file is
//! `<stem>-<pid>.log`.
//!
//! The whole path is assembled in a bounded buffer before anything is
//! created, so an over-long template fails without leaving directories
//! behind.

use std::ffi::OsStr;
use std::fs::{self, DirBuilder};
use std::io::ErrorKind;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use crate::err::{map_mkdir_err, LaunchError, Result};

/// Longest path we will build, not counting the terminating NUL the
/// kernel wants.
pub const PATH_CAPACITY: usize = libc::PATH_MAX as usize - 1;

/// Mode for directories we create along the way.
pub const DIR_MODE: u32 = 0o750;

/// A byte buffer that refuses to grow past its capacity.  Overflow is an
/// error, never a truncation.
#[derive(Debug, Clone)]
pub struct BoundedPath {
    bytes: Vec<u8>,
    capacity: usize,
}

impl BoundedPath {
    pub fn new(capacity: usize) -> BoundedPath {
        BoundedPath { bytes: Vec::new(), capacity: capacity }
    }

    pub fn push(&mut self, piece: &[u8]) -> Result<()> {
        if self.bytes.len() + piece.len() > self.capacity {
            let mut whole = self.bytes.clone();
            whole.extend_from_slice(piece);
            return Err(LaunchError::PathTooLong {
                path: String::from_utf8_lossy(&whole).into_owned(),
                limit: self.capacity,
            });
        }
        self.bytes.extend_from_slice(piece);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_path(&self) -> &Path {
        Path::new(OsStr::from_bytes(&self.bytes))
    }
}

/// A planned log file: the directories to ensure, outermost first, and
/// the file itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogPath {
    dirs: Vec<PathBuf>,
    file: PathBuf,
}

impl LogPath {
    pub fn plan(template: &OsStr, pid: u32) -> Result<LogPath> {
        LogPath::plan_within(template, pid, PATH_CAPACITY)
    }

    pub fn plan_within(template: &OsStr, pid: u32, capacity: usize) -> Result<LogPath> {
        let raw = template.as_bytes();
        debug!("Dir: {}", template.to_string_lossy());

        let components: Vec<&[u8]> = raw.split(|&b| b == b'/').filter(|c| !c.is_empty()).collect();
        let (stem, intermediate) = match components.split_last() {
            Some(parts) => parts,
            None => {
                return Err(LaunchError::EmptyLogTemplate(template.to_string_lossy().into_owned()))
            }
        };

        let mut buf = BoundedPath::new(capacity);
        if raw.first() == Some(&b'/') {
            buf.push(b"/")?;
        }

        let mut dirs = Vec::with_capacity(intermediate.len());
        for (i, c) in intermediate.iter().enumerate() {
            debug!("Component {}: {}", i, String::from_utf8_lossy(c));
            buf.push(c)?;
            dirs.push(buf.as_path().to_path_buf());
            buf.push(b"/")?;
        }

        buf.push(stem)?;
        buf.push(format!("-{}.log", pid).as_bytes())?;

        Ok(LogPath { dirs: dirs, file: buf.as_path().to_path_buf() })
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn directories(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Make sure every directory on the way to the file exists.  The file
    /// itself is not touched.
    pub fn materialize(&self) -> Result<&Path> {
        for dir in &self.dirs {
            ensure_directory(dir)?;
        }
        Ok(&self.file)
    }
}

fn existing_directory(path: &Path, meta: &fs::Metadata) -> Result<()> {
    say!(2210, "Directory {} already exists.", path.display());
    if meta.is_dir() {
        Ok(())
    } else {
        Err(LaunchError::NotADirectory { path: path.to_path_buf() })
    }
}

/// Create `path` with mode 0750 unless it is already a directory.
pub fn ensure_directory(path: &Path) -> Result<()> {
    match fs::metadata(path) {
        Ok(meta) => return existing_directory(path, &meta),
        Err(ref e) if e.kind() == ErrorKind::NotFound => (),
        Err(e) => return Err(map_mkdir_err(e, path.to_path_buf())),
    }

    say!(2000, "Creating directory {}", path.display());
    match DirBuilder::new().mode(DIR_MODE).create(path) {
        Ok(()) => Ok(()),
        // Someone else (often the CLI, sometimes over slow NFS) got there
        // between our stat and our mkdir.  Fine, as long as it is a
        // directory.
        Err(ref e) if e.kind() == ErrorKind::AlreadyExists => {
            let meta = fs::metadata(path).map_err(|e| map_mkdir_err(e, path.to_path_buf()))?;
            existing_directory(path, &meta)
        }
        Err(e) => Err(map_mkdir_err(e, path.to_path_buf())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn absolute_template_keeps_leading_slash() {
        let lp = LogPath::plan(OsStr::new("/var/log/jobs/42"), 1234).unwrap();
        assert_eq!(lp.file(), Path::new("/var/log/jobs/42-1234.log"));
        assert_eq!(lp.directories(), &[PathBuf::from("/var"), PathBuf::from("/var/log"),
                                       PathBuf::from("/var/log/jobs")]);
    }

    #[test]
    fn relative_template_and_doubled_separators() {
        let lp = LogPath::plan(OsStr::new("logs//jp/7/"), 9).unwrap();
        assert_eq!(lp.file(), Path::new("logs/jp/7-9.log"));
        assert_eq!(lp.directories(), &[PathBuf::from("logs"), PathBuf::from("logs/jp")]);

        let bare = LogPath::plan(OsStr::new("stem"), 9).unwrap();
        assert_eq!(bare.file(), Path::new("stem-9.log"));
        assert!(bare.directories().is_empty());
    }

    #[test]
    fn template_without_components_is_rejected() {
        for t in &["", "/", "///"] {
            match LogPath::plan(OsStr::new(t), 1) {
                Err(LaunchError::EmptyLogTemplate(_)) => (),
                other => panic!("{:?}: {:?}", t, other),
            }
        }
    }

    #[test]
    fn materialize_creates_missing_directories() {
        let tmp = tempdir().unwrap();
        let template = tmp.path().join("jobs").join("sub").join("42");
        let pid = std::process::id();
        let lp = LogPath::plan(template.as_os_str(), pid).unwrap();

        let file = lp.materialize().unwrap();
        let jobs = tmp.path().join("jobs");
        let sub = jobs.join("sub");
        assert!(sub.is_dir());
        assert_eq!(fs::metadata(&jobs).unwrap().permissions().mode() & 0o7777 & !0o750, 0);
        assert!(file.file_name().unwrap().to_str().unwrap().ends_with(&format!("-{}.log", pid)));
        assert_eq!(file.parent(), Some(sub.as_path()));
        assert!(!file.exists());

        // Walking the same path again is harmless.
        lp.materialize().unwrap();
    }

    #[test]
    fn file_in_the_way_is_not_a_directory() {
        let tmp = tempdir().unwrap();
        fs::write(tmp.path().join("jobs"), b"").unwrap();
        let template = tmp.path().join("jobs").join("42");
        let lp = LogPath::plan(template.as_os_str(), 1).unwrap();
        match lp.materialize() {
            Err(LaunchError::NotADirectory { path }) => assert_eq!(path, tmp.path().join("jobs")),
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn overflow_fails_before_creating_anything() {
        let tmp = tempdir().unwrap();
        let template = tmp.path().join("a").join("b").join("a-rather-long-file-stem");
        let capacity = tmp.path().as_os_str().len() + 8;
        match LogPath::plan_within(template.as_os_str(), 77, capacity) {
            Err(LaunchError::PathTooLong { limit, .. }) => assert_eq!(limit, capacity),
            other => panic!("{:?}", other),
        }
        assert!(!tmp.path().join("a").exists());
    }

    #[test]
    fn pid_suffix_counts_against_capacity() {
        assert!(LogPath::plan_within(OsStr::new("abc"), 12, 10).is_ok());
        assert!(LogPath::plan_within(OsStr::new("abcd"), 12, 10).is_err());
    }

    #[test]
    fn bounded_path_never_truncates() {
        let mut b = BoundedPath::new(4);
        b.push(b"ab").unwrap();
        assert!(b.push(b"cde").is_err());
        assert_eq!(b.len(), 2);
        b.push(b"cd").unwrap();
        assert_eq!(b.as_path(), Path::new("abcd"));
    }
}
