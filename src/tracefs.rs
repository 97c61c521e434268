//! Access to the kernel tracing control files.
//!
//! Dynamic probes are registered by appending text lines to
//! `kprobe_events`, and every trace event exposes its numeric identifier in
//! `events/<category>/<name>/id`. The loader only ever talks to these files
//! through the [`TraceFs`] trait so that it can be pointed at a different
//! mount, or at an in-memory implementation.

use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Write},
    path::{Path, PathBuf},
};

/// The control file used to register and clear dynamic kprobes.
pub const KPROBE_EVENTS: &str = "kprobe_events";

const KNOWN_MOUNTS: [&str; 2] = ["/sys/kernel/tracing", "/sys/kernel/debug/tracing"];

/// A text based control-file protocol rooted at a tracefs mount.
///
/// All paths are relative to the root of the mount.
pub trait TraceFs {
    /// Overwrites `file` with empty content.
    fn clear(&mut self, file: &Path) -> io::Result<()>;

    /// Appends `line` followed by a newline to `file`.
    fn append_line(&mut self, file: &Path, line: &str) -> io::Result<()>;

    /// Reads at most `buf.len()` bytes from the start of `file`, returning the
    /// number of bytes read.
    fn read(&mut self, file: &Path, buf: &mut [u8]) -> io::Result<usize>;
}

impl<T: TraceFs + ?Sized> TraceFs for &mut T {
    fn clear(&mut self, file: &Path) -> io::Result<()> {
        (**self).clear(file)
    }

    fn append_line(&mut self, file: &Path, line: &str) -> io::Result<()> {
        (**self).append_line(file, line)
    }

    fn read(&mut self, file: &Path, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read(file, buf)
    }
}

/// [`TraceFs`] backed by a mounted tracefs or debugfs directory.
#[derive(Debug, Clone)]
pub struct DebugFs {
    root: PathBuf,
}

impl DebugFs {
    /// Uses the tracing directory at `root`.
    pub fn new<P: AsRef<Path>>(root: P) -> DebugFs {
        DebugFs {
            root: root.as_ref().to_owned(),
        }
    }

    /// Uses the first populated tracefs mount, falling back to
    /// `/sys/kernel/debug/tracing`.
    pub fn from_mount() -> DebugFs {
        DebugFs::new(find_tracefs_path().unwrap_or_else(|| PathBuf::from(KNOWN_MOUNTS[1])))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Default for DebugFs {
    fn default() -> Self {
        DebugFs::from_mount()
    }
}

impl TraceFs for DebugFs {
    fn clear(&mut self, file: &Path) -> io::Result<()> {
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.root.join(file))
            .map(|_| ())
    }

    fn append_line(&mut self, file: &Path, line: &str) -> io::Result<()> {
        let mut f = OpenOptions::new().append(true).open(self.root.join(file))?;
        // a single write so that the kernel parses the whole command at once
        let mut cmd = String::with_capacity(line.len() + 1);
        cmd.push_str(line);
        cmd.push('\n');
        f.write_all(cmd.as_bytes())
    }

    fn read(&mut self, file: &Path, buf: &mut [u8]) -> io::Result<usize> {
        let mut f = File::open(self.root.join(file))?;
        let mut read = 0;
        while read < buf.len() {
            match f.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(read)
    }
}

/// Finds the tracefs mount point.
///
/// `/sys/kernel/tracing` may exist without being mounted, so a mount point only
/// counts when its directory is not empty.
pub fn find_tracefs_path() -> Option<PathBuf> {
    KNOWN_MOUNTS
        .iter()
        .map(Path::new)
        .find(|mount| {
            mount
                .read_dir()
                .map(|mut entries| entries.next().is_some())
                .unwrap_or(false)
        })
        .map(Path::to_path_buf)
}

#[cfg(test)]
pub(crate) use fake::FakeTraceFs;

#[cfg(test)]
mod fake {
    use std::{
        collections::HashMap,
        io,
        path::{Path, PathBuf},
    };

    use super::TraceFs;

    /// In-memory tracefs recording every command written to it.
    #[derive(Debug, Default)]
    pub(crate) struct FakeTraceFs {
        pub(crate) files: HashMap<PathBuf, Vec<u8>>,
        pub(crate) appended: Vec<(PathBuf, String)>,
        pub(crate) cleared: Vec<PathBuf>,
        pub(crate) fail_appends: bool,
    }

    impl FakeTraceFs {
        pub(crate) fn with_file<P: AsRef<Path>>(mut self, path: P, content: &str) -> Self {
            self.files
                .insert(path.as_ref().to_owned(), content.as_bytes().to_vec());
            self
        }
    }

    impl TraceFs for FakeTraceFs {
        fn clear(&mut self, file: &Path) -> io::Result<()> {
            self.cleared.push(file.to_owned());
            self.files.insert(file.to_owned(), Vec::new());
            Ok(())
        }

        fn append_line(&mut self, file: &Path, line: &str) -> io::Result<()> {
            if self.fail_appends {
                return Err(io::Error::from_raw_os_error(libc::EINVAL));
            }
            self.appended.push((file.to_owned(), line.to_owned()));
            let content = self.files.entry(file.to_owned()).or_default();
            content.extend_from_slice(line.as_bytes());
            content.push(b'\n');
            Ok(())
        }

        fn read(&mut self, file: &Path, buf: &mut [u8]) -> io::Result<usize> {
            let content = self
                .files
                .get(file)
                .ok_or_else(|| io::Error::from_raw_os_error(libc::ENOENT))?;
            let n = content.len().min(buf.len());
            buf[..n].copy_from_slice(&content[..n]);
            Ok(n)
        }
    }
}
