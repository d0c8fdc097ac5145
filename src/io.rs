//! Byte sources and sinks referenced by option values.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// A readable source and/or writable sink.
///
/// Options such as `-o`, `-D`, `-d @key` or `-F name=@key` name an IO by key.
/// Keys registered in the [`IoMap`] resolve to the registered IO, any other
/// key is taken as a file path.
pub trait Io: fmt::Debug + Send + Sync {
    /// Read the entire content.
    fn read_all(&self) -> io::Result<Vec<u8>>;

    /// Write `data`, either appending to or replacing the current content.
    fn write(&self, data: &[u8], append: bool) -> io::Result<()>;

    /// The file behind this IO, if there is one.
    fn path(&self) -> Option<&Path> {
        None
    }
}

/// Check whether two IOs refer to the same destination.
pub(crate) fn same_io(a: &Arc<dyn Io>, b: &Arc<dyn Io>) -> bool {
    if Arc::ptr_eq(a, b) {
        return true;
    }
    match (a.path(), b.path()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// A file on disk.
///
/// Writing creates missing parent directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileIo {
    path: PathBuf,
}

impl FileIo {
    /// Create from a path, relative paths are resolved against the current directory.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let path = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
        FileIo { path }
    }
}

impl Io for FileIo {
    fn read_all(&self) -> io::Result<Vec<u8>> {
        if !self.path.is_file() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("not a readable file: {}", self.path.display()),
            ));
        }
        fs::read(&self.path)
    }

    fn write(&self, data: &[u8], append: bool) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&self.path)?;
        file.write_all(data)?;
        file.flush()
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// An in-memory buffer.
///
/// Clones share the same buffer, which makes it possible to keep a handle
/// to a sink that was registered with a [`Curl`](crate::Curl).
#[derive(Clone, Default)]
pub struct MemIo {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl MemIo {
    /// Create an empty buffer.
    pub fn new() -> Self {
        MemIo::default()
    }

    /// Create a buffer holding `data`, typically used as a source.
    pub fn from_bytes(data: impl Into<Vec<u8>>) -> Self {
        MemIo {
            buf: Arc::new(Mutex::new(data.into())),
        }
    }

    /// Copy of the current content.
    pub fn to_vec(&self) -> Vec<u8> {
        self.lock().clone()
    }

    /// Parse a header dump, as written by `--dump-header`, into name/value pairs.
    ///
    /// The status line has no colon and ends up as a name with an empty value. A
    /// repeated name keeps its first position and takes the last value.
    pub fn parse_dumped_header(&self) -> Vec<(String, String)> {
        let data = self.to_vec();
        let text = String::from_utf8_lossy(&data);

        let mut result: Vec<(String, String)> = Vec::new();

        for line in text.split(['\r', '\n']) {
            if line.trim().is_empty() {
                continue;
            }
            let (name, value) = match line.split_once(':') {
                Some((n, v)) => (n, v.trim()),
                None => (line, ""),
            };
            match result.iter_mut().find(|(k, _)| k == name) {
                Some(entry) => entry.1 = value.to_string(),
                None => result.push((name.to_string(), value.to_string())),
            }
        }

        result
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        // A panic while holding the lock can not leave a Vec half-written.
        self.buf.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Io for MemIo {
    fn read_all(&self) -> io::Result<Vec<u8>> {
        Ok(self.to_vec())
    }

    fn write(&self, data: &[u8], append: bool) -> io::Result<()> {
        let mut buf = self.lock();
        if !append {
            buf.clear();
        }
        buf.extend_from_slice(data);
        Ok(())
    }
}

impl fmt::Debug for MemIo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemIo<{} bytes>", self.lock().len())
    }
}

/// Registry of IOs by key.
#[derive(Debug, Clone, Default)]
pub struct IoMap {
    map: BTreeMap<String, Arc<dyn Io>>,
}

impl IoMap {
    /// Key of the execution's own output buffer.
    pub const STDOUT: &'static str = "-";

    /// Create an empty registry.
    pub fn new() -> Self {
        IoMap::default()
    }

    /// Register `io` under `key`, replacing any previous IO for it.
    pub fn insert(&mut self, key: impl Into<String>, io: Arc<dyn Io>) {
        self.map.insert(key.into(), io);
    }

    /// Register `io` under a generated `IO#<n>` key and return the key.
    pub fn register(&mut self, io: Arc<dyn Io>) -> String {
        let key = format!("IO#{}", self.map.len());
        self.insert(key.clone(), io);
        key
    }

    /// Look up a registered IO.
    pub fn get(&self, key: &str) -> Option<&Arc<dyn Io>> {
        self.map.get(key)
    }

    /// The registered IO for `key`, or else the file at path `key`.
    pub fn resolve(&self, key: &str) -> Arc<dyn Io> {
        match self.map.get(key) {
            Some(io) => io.clone(),
            None => Arc::new(FileIo::new(key)),
        }
    }

    /// Registered keys in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    /// Number of registered IOs.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl fmt::Display for IoMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (k, v)) in self.map.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={:?}", k, v)?;
        }
        write!(f, "}}")
    }
}
