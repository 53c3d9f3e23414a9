use std::fmt;
use std::fmt::Formatter;
use std::ops::{Deref, Range};

/// Character to separate path segments
pub const PATH_SEPARATOR: char = '/';

/// Character that separate the path from the query
pub const QUERY_CHARACTER: char = '?';

/// A UTF-8 path divided into three components:
/// - Mount point
/// - Resource location
/// - Query
///
/// # Examples
///
/// - //shaders/common.cg?profile=arbfp1
/// - /assets/shaders/diffuse.cg
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Path {
    str: String,
    mount_point: Option<Range<usize>>,
    path: Range<usize>,
    query: Option<Range<usize>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParseError {
    InvalidMountPoint,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::InvalidMountPoint => write!(f, "path must start with /<mount point>/"),
        }
    }
}

impl std::error::Error for ParseError {}

impl Path {
    pub fn parse(str: &str) -> Result<Path, ParseError> {
        let rest = str
            .strip_prefix(PATH_SEPARATOR)
            .ok_or(ParseError::InvalidMountPoint)?;

        let mount_point_end = rest
            .find(PATH_SEPARATOR)
            .map(|end| end + 1)
            .ok_or(ParseError::InvalidMountPoint)?;
        let mount_point = 1..mount_point_end;

        let query_start = str.find(QUERY_CHARACTER);
        let query = query_start.map(|start| start + 1..str.len());
        let path_end = query_start.unwrap_or(str.len()).max(mount_point_end + 1);

        let mut string = str.to_string();
        let mut path = mount_point_end + 1..path_end;
        let mut query = query;

        if path.end > path.start && string[path.clone()].ends_with(PATH_SEPARATOR) {
            string.remove(path.end - 1);
            path.end -= 1;
            if let Some(query) = &mut query {
                query.start -= 1;
                query.end -= 1;
            }
        }

        Ok(Path {
            str: string,
            mount_point: if mount_point.is_empty() {
                None
            } else {
                Some(mount_point)
            },
            path,
            query,
        })
    }

    pub fn from_mount_point_and_path(mount_point: &str, path: &str) -> Result<Path, ParseError> {
        let path = path.trim_start_matches(PATH_SEPARATOR);
        Path::parse(&format!(
            "{PATH_SEPARATOR}{mount_point}{PATH_SEPARATOR}{path}"
        ))
    }

    /// Extends the path with a new path component.
    ///
    /// # Examples
    ///
    /// ```
    /// use ze_filesystem::path::Path;
    ///
    /// let mut path = Path::parse("/m/shaders/").unwrap();
    /// path.push("common.cg");
    /// assert_eq!(path.path(), "shaders/common.cg");
    /// ```
    pub fn push(&mut self, other: impl AsRef<str>) {
        let other = other.as_ref().trim_start_matches(PATH_SEPARATOR);
        let mut str = String::with_capacity(other.len() + 1);
        if !self.path.is_empty() {
            str.push(PATH_SEPARATOR);
        }
        str.push_str(other);

        self.str.insert_str(self.path.end, &str);
        self.path.end += str.len();

        if let Some(query) = &mut self.query {
            query.start += str.len();
            query.end += str.len();
        }
    }

    pub fn join(&self, other: impl AsRef<str>) -> Path {
        let mut path = self.clone();
        path.push(other);
        path
    }

    /// Last segment of the path
    ///
    /// ```
    /// use ze_filesystem::path::Path;
    ///
    /// let path = Path::parse("/assets/shaders/diffuse.cg").unwrap();
    /// assert_eq!(path.file_name(), "diffuse.cg");
    /// ```
    pub fn file_name(&self) -> &str {
        let path = self.path();
        match path.rfind(PATH_SEPARATOR) {
            Some(separator) => &path[separator + 1..],
            None => path,
        }
    }

    /// Same mount point, without the last segment and without the query
    pub fn parent(&self) -> Option<Path> {
        let path = self.path();
        if path.is_empty() {
            return None;
        }

        let parent = path.rfind(PATH_SEPARATOR).map_or("", |end| &path[..end]);
        let mount_point = self.mount_point().unwrap_or_default();
        Path::from_mount_point_and_path(mount_point, parent).ok()
    }

    pub fn path_segments(&self) -> std::str::Split<'_, char> {
        self.path().split(PATH_SEPARATOR)
    }

    pub fn as_str(&self) -> &str {
        &self.str
    }

    pub fn mount_point(&self) -> Option<&str> {
        self.mount_point
            .as_ref()
            .map(|mount_point| &self.str[mount_point.clone()])
    }

    pub fn path(&self) -> &str {
        &self.str[self.path.clone()]
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_ref().map(|range| &self.str[range.clone()])
    }
}

impl Deref for Path {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.str
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.str)
    }
}
