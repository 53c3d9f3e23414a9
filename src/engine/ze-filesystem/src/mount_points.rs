use crate::path::Path;
use crate::Error;
use crate::MountPoint;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::PathBuf;
use std::sync::Arc;

/// Mount point backed by a directory of the host filesystem
pub struct StdMountPoint {
    alias: String,
    root: PathBuf,
    read_only: bool,
}

impl StdMountPoint {
    pub fn new(alias: &str, root: &std::path::Path) -> Result<Box<Self>, Error> {
        let root = root.canonicalize()?;
        Ok(Box::new(Self {
            alias: alias.to_string(),
            root,
            read_only: false,
        }))
    }

    pub fn new_read_only(alias: &str, root: &std::path::Path) -> Result<Box<Self>, Error> {
        let mut mount_point = Self::new(alias, root)?;
        mount_point.read_only = true;
        Ok(mount_point)
    }

    /// Paths never leave the root, parent segments are rejected
    fn to_fs_path(&self, path: &Path) -> Result<PathBuf, Error> {
        let mut path_buf = self.root.clone();
        for segment in path.path_segments().filter(|segment| !segment.is_empty()) {
            if segment == ".." || segment.contains(['/', '\\']) {
                return Err(Error::NotFound);
            }
            path_buf.push(segment);
        }
        Ok(path_buf)
    }
}

impl MountPoint for StdMountPoint {
    fn exists(&self, path: &Path) -> bool {
        self.to_fs_path(path)
            .map_or(false, |path| path.exists())
    }

    fn read(&self, path: &Path) -> Result<Box<dyn Read>, Error> {
        let file = File::open(self.to_fs_path(path)?)?;
        Ok(Box::new(file))
    }

    fn write(&self, path: &Path) -> Result<Box<dyn Write>, Error> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }

        let path = self.to_fs_path(path)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = File::create(path)?;
        Ok(Box::new(file))
    }

    fn alias(&self) -> &str {
        &self.alias
    }
}

type MemoryFiles = Arc<RwLock<HashMap<String, Arc<[u8]>>>>;

/// Mount point keeping its files in memory, keyed by their path inside the mount point
pub struct MemoryMountPoint {
    alias: String,
    files: MemoryFiles,
}

impl MemoryMountPoint {
    pub fn new(alias: &str) -> Box<Self> {
        Box::new(Self {
            alias: alias.to_string(),
            files: Arc::default(),
        })
    }

    pub fn insert(&self, path: &str, data: impl AsRef<[u8]>) {
        self.files
            .write()
            .insert(path.trim_start_matches('/').to_string(), Arc::from(data.as_ref()));
    }

    pub fn remove(&self, path: &str) -> bool {
        self.files
            .write()
            .remove(path.trim_start_matches('/'))
            .is_some()
    }
}

impl MountPoint for MemoryMountPoint {
    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path.path())
    }

    fn read(&self, path: &Path) -> Result<Box<dyn Read>, Error> {
        let data = self
            .files
            .read()
            .get(path.path())
            .cloned()
            .ok_or(Error::NotFound)?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn write(&self, path: &Path) -> Result<Box<dyn Write>, Error> {
        Ok(Box::new(MemoryFileWriter {
            files: self.files.clone(),
            path: path.path().to_string(),
            data: vec![],
        }))
    }

    fn alias(&self) -> &str {
        &self.alias
    }
}

/// Buffers writes and publishes the file on flush and on drop
struct MemoryFileWriter {
    files: MemoryFiles,
    path: String,
    data: Vec<u8>,
}

impl Write for MemoryFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.files
            .write()
            .insert(self.path.clone(), Arc::from(self.data.as_slice()));
        Ok(())
    }
}

impl Drop for MemoryFileWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
