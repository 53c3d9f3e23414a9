use crate::path::Path;
use parking_lot::RwLock;
use std::fmt::{Display, Formatter};
use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use ze_core::{ze_info, ze_warn};

/// Represents a filesystem, containing multiple mount points
///
/// A mount point is addressed by its alias (`/alias/some/file`). Shader sources use the alias as
/// their resource group.
pub struct FileSystem {
    mount_points: RwLock<Vec<Box<dyn MountPoint>>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    NotFound,
    PermissionDenied,
    UnknownMountPoint,
    ReadOnly,
    InvalidData,
    Io(ErrorKind),
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound => write!(f, "not found"),
            Error::PermissionDenied => write!(f, "permission denied"),
            Error::UnknownMountPoint => write!(f, "unknown mount point"),
            Error::ReadOnly => write!(f, "mount point is read-only"),
            Error::InvalidData => write!(f, "invalid data"),
            Error::Io(kind) => write!(f, "io error ({:?})", kind),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            ErrorKind::NotFound => Error::NotFound,
            ErrorKind::PermissionDenied => Error::PermissionDenied,
            ErrorKind::InvalidData => Error::InvalidData,
            kind => Error::Io(kind),
        }
    }
}

pub trait MountPoint: Send + Sync {
    fn exists(&self, path: &Path) -> bool;
    fn read(&self, path: &Path) -> Result<Box<dyn Read>, Error>;
    fn write(&self, path: &Path) -> Result<Box<dyn Write>, Error>;
    fn alias(&self) -> &str;
}

impl FileSystem {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            mount_points: RwLock::new(vec![]),
        })
    }

    pub fn mount(&self, mount_point: Box<dyn MountPoint>) {
        let mut mount_points = self.mount_points.write();
        if mount_points
            .iter()
            .any(|existing| existing.alias() == mount_point.alias())
        {
            ze_warn!(
                "Mount point \"{}\" is already mounted, the new one will shadow it",
                mount_point.alias()
            );
            mount_points.retain(|existing| existing.alias() != mount_point.alias());
        }

        ze_info!(
            "Mounted \"{alias}\": /{alias}/",
            alias = mount_point.alias()
        );
        mount_points.push(mount_point);
    }

    pub fn unmount(&self, alias: &str) -> bool {
        let mut mount_points = self.mount_points.write();
        let len = mount_points.len();
        mount_points.retain(|mount_point| mount_point.alias() != alias);
        len != mount_points.len()
    }

    pub fn is_mounted(&self, alias: &str) -> bool {
        self.mount_points
            .read()
            .iter()
            .any(|mount_point| mount_point.alias() == alias)
    }

    pub fn exists(&self, path: &Path) -> bool {
        let mount_points = self.mount_points.read();
        match Self::matching_mount_point_for_path(&mount_points, path) {
            Some(index) => mount_points[index].exists(path),
            None => false,
        }
    }

    /// Open `path` for reading. Paths without a mount point (`//file`) are searched in every
    /// mount point, in mount order.
    pub fn read(&self, path: &Path) -> Result<Box<dyn Read>, Error> {
        let mount_points = self.mount_points.read();
        if let Some(index) = Self::matching_mount_point_for_path(&mount_points, path) {
            return mount_points[index].read(path);
        }

        if path.mount_point().is_some() {
            return Err(Error::UnknownMountPoint);
        }

        for mount_point in mount_points.iter() {
            match mount_point.read(path) {
                Ok(file) => return Ok(file),
                Err(Error::NotFound) => continue,
                Err(error) => return Err(error),
            }
        }

        Err(Error::NotFound)
    }

    pub fn read_to_end(&self, path: &Path) -> Result<Vec<u8>, Error> {
        let mut data = vec![];
        self.read(path)?.read_to_end(&mut data)?;
        Ok(data)
    }

    pub fn read_to_string(&self, path: &Path) -> Result<String, Error> {
        let data = self.read_to_end(path)?;
        String::from_utf8(data).map_err(|_| Error::InvalidData)
    }

    pub fn write(&self, path: &Path) -> Result<Box<dyn Write>, Error> {
        let mount_points = self.mount_points.read();
        if let Some(index) = Self::matching_mount_point_for_path(&mount_points, path) {
            return mount_points[index].write(path);
        }

        if path.mount_point().is_some() {
            return Err(Error::UnknownMountPoint);
        }

        for mount_point in mount_points.iter() {
            match mount_point.write(path) {
                Ok(file) => return Ok(file),
                Err(Error::NotFound) | Err(Error::ReadOnly) => continue,
                Err(error) => return Err(error),
            }
        }

        Err(Error::NotFound)
    }

    pub fn write_all(&self, path: &Path, data: &[u8]) -> Result<(), Error> {
        let mut file = self.write(path)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }

    fn matching_mount_point_for_path(
        mount_points: &[Box<dyn MountPoint>],
        path: &Path,
    ) -> Option<usize> {
        let path_mount_point = path.mount_point()?;
        mount_points
            .iter()
            .position(|mount_point| mount_point.alias() == path_mount_point)
    }
}

pub mod mount_points;
pub mod path;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mount_points::MemoryMountPoint;

    #[test]
    fn read_through_alias() {
        let filesystem = FileSystem::new();
        let shaders = MemoryMountPoint::new("shaders");
        shaders.insert("common/lighting.cg", "float4 light;");
        filesystem.mount(shaders);

        let path = Path::parse("/shaders/common/lighting.cg").unwrap();
        assert!(filesystem.exists(&path));
        assert_eq!(
            filesystem.read_to_string(&path).unwrap(),
            "float4 light;"
        );

        let missing = Path::parse("/shaders/missing.cg").unwrap();
        assert!(!filesystem.exists(&missing));
        assert_eq!(
            filesystem.read_to_string(&missing).err(),
            Some(Error::NotFound)
        );
    }

    #[test]
    fn unknown_mount_point() {
        let filesystem = FileSystem::new();
        filesystem.mount(MemoryMountPoint::new("shaders"));

        let path = Path::parse("/textures/a.png").unwrap();
        assert_eq!(filesystem.read(&path).err(), Some(Error::UnknownMountPoint));
    }

    #[test]
    fn search_all_mount_points() {
        let filesystem = FileSystem::new();
        filesystem.mount(MemoryMountPoint::new("first"));
        let second = MemoryMountPoint::new("second");
        second.insert("a.cg", "second");
        filesystem.mount(second);

        let path = Path::parse("//a.cg").unwrap();
        assert_eq!(filesystem.read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn write_then_read() {
        let filesystem = FileSystem::new();
        filesystem.mount(MemoryMountPoint::new("cache"));

        let path = Path::parse("/cache/microcode.bin").unwrap();
        filesystem.write_all(&path, &[1, 2, 3]).unwrap();
        assert_eq!(filesystem.read_to_end(&path).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn remount_replaces_alias() {
        let filesystem = FileSystem::new();
        let old = MemoryMountPoint::new("assets");
        old.insert("a", "old");
        filesystem.mount(old);
        let new = MemoryMountPoint::new("assets");
        new.insert("a", "new");
        filesystem.mount(new);

        let path = Path::parse("/assets/a").unwrap();
        assert_eq!(filesystem.read_to_string(&path).unwrap(), "new");
        assert!(filesystem.unmount("assets"));
        assert!(!filesystem.is_mounted("assets"));
    }
}
