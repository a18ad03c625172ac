//! Mapping of a local source onto object keys

use crate::error::{UploadError, UploadResult};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Filesystem type of the upload source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    File,
    Directory,
}

/// One local file and the key it will be stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedObject {
    pub path: PathBuf,
    pub key: String,
    pub size: u64,
}

/// Every object an upload will create
#[derive(Debug, Clone)]
pub struct UploadPlan {
    pub kind: SourceKind,
    pub objects: Vec<PlannedObject>,
}

impl UploadPlan {
    /// Build the plan for `source`.
    ///
    /// A file maps to `destination` itself. A directory maps each file to
    /// `destination/relative/path`, descending into subdirectories only when
    /// `recursive` is set. The destination is used literally; a trailing slash
    /// is not collapsed.
    pub fn build(source: &Path, destination: &str, recursive: bool) -> UploadResult<Self> {
        let metadata = std::fs::metadata(source).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => UploadError::SourceMissing(source.to_path_buf()),
            _ => UploadError::Io {
                path: source.to_path_buf(),
                source: e,
            },
        })?;

        if metadata.is_file() {
            return Ok(Self {
                kind: SourceKind::File,
                objects: vec![PlannedObject {
                    path: source.to_path_buf(),
                    key: destination.to_string(),
                    size: metadata.len(),
                }],
            });
        }

        if !metadata.is_dir() {
            return Err(UploadError::NotFileOrDirectory(source.to_path_buf()));
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut objects = Vec::new();

        for entry in WalkDir::new(source)
            .min_depth(1)
            .max_depth(max_depth)
            .follow_links(true)
        {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(source).to_path_buf();
                UploadError::Io {
                    path,
                    source: e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("filesystem loop detected")),
                }
            })?;

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(source)
                .unwrap_or(entry.path());
            let size = entry
                .metadata()
                .map_err(|e| UploadError::Io {
                    path: entry.path().to_path_buf(),
                    source: e
                        .into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("unreadable metadata")),
                })?
                .len();

            objects.push(PlannedObject {
                path: entry.path().to_path_buf(),
                key: object_key(destination, relative),
                size,
            });
        }

        objects.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(Self {
            kind: SourceKind::Directory,
            objects,
        })
    }

    pub fn total_bytes(&self) -> u64 {
        self.objects.iter().map(|o| o.size).sum()
    }
}

/// Join a destination prefix and a relative path with `/`, whatever the platform separator
fn object_key(destination: &str, relative: &Path) -> String {
    let relative = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");

    if destination.is_empty() {
        relative
    } else {
        format!("{}/{}", destination, relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), "abc").unwrap();
        fs::write(dir.path().join("top.txt"), "top level").unwrap();
        fs::create_dir_all(dir.path().join("sub/deeper")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), "nested").unwrap();
        fs::write(dir.path().join("sub/deeper/c.txt"), "deepest").unwrap();
        dir
    }

    fn keys(plan: &UploadPlan) -> Vec<&str> {
        plan.objects.iter().map(|o| o.key.as_str()).collect()
    }

    #[test]
    fn test_single_file_maps_to_destination() {
        let dir = fixture();
        let plan = UploadPlan::build(&dir.path().join("a.txt"), "uploads/file.txt", false).unwrap();
        assert_eq!(plan.kind, SourceKind::File);
        assert_eq!(keys(&plan), vec!["uploads/file.txt"]);
        assert_eq!(plan.total_bytes(), 3);
    }

    #[test]
    fn test_directory_non_recursive_takes_top_level_only() {
        let dir = fixture();
        let plan = UploadPlan::build(dir.path(), "out", false).unwrap();
        assert_eq!(plan.kind, SourceKind::Directory);
        assert_eq!(keys(&plan), vec!["out/a.txt", "out/top.txt"]);
    }

    #[test]
    fn test_directory_recursive_takes_all_depths() {
        let dir = fixture();
        let plan = UploadPlan::build(dir.path(), "out", true).unwrap();
        assert_eq!(
            keys(&plan),
            vec!["out/a.txt", "out/sub/b.txt", "out/sub/deeper/c.txt", "out/top.txt"]
        );
        assert_eq!(plan.total_bytes(), 3 + 9 + 6 + 7);
    }

    #[test]
    fn test_trailing_slash_is_literal() {
        let dir = fixture();
        let plan = UploadPlan::build(dir.path(), "out/", false).unwrap();
        assert_eq!(keys(&plan), vec!["out//a.txt", "out//top.txt"]);
    }

    #[test]
    fn test_empty_destination_uses_relative_paths() {
        let dir = fixture();
        let plan = UploadPlan::build(dir.path(), "", false).unwrap();
        assert_eq!(keys(&plan), vec!["a.txt", "top.txt"]);
    }

    #[test]
    fn test_empty_directory_has_no_objects() {
        let dir = TempDir::new().unwrap();
        let plan = UploadPlan::build(dir.path(), "out", true).unwrap();
        assert_eq!(plan.kind, SourceKind::Directory);
        assert!(plan.objects.is_empty());
        assert_eq!(plan.total_bytes(), 0);
    }

    #[test]
    fn test_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = UploadPlan::build(&dir.path().join("missing"), "out", false).unwrap_err();
        assert!(matches!(err, UploadError::SourceMissing(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_special_file_is_rejected() {
        let err = UploadPlan::build(Path::new("/dev/null"), "out", false).unwrap_err();
        assert!(matches!(err, UploadError::NotFileOrDirectory(_)));
    }
}
