//! In-memory bundle filesystem
//!
//! `BundleFs` is the uniform representation every source strategy produces
//! and every provisioner consumes: an ordered map from a normalized relative
//! path to the file's bytes. Directories are implicit.
//!
//! # Path rules
//!
//! - Paths are `/`-separated and relative to the bundle root
//! - `.` components and duplicate separators are dropped
//! - `..` is resolved lexically and may never climb above the root
//! - Absolute paths are rejected

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::{CoreError, Result};

/// A filesystem tree held in memory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleFs {
    files: BTreeMap<String, Vec<u8>>,
}

impl BundleFs {
    /// Create an empty tree
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a tree from a directory on disk
    ///
    /// Symlinks are not followed; only regular files are included.
    pub fn from_dir<P: AsRef<Path>>(root: P) -> Result<Self> {
        Self::from_dir_excluding(root, &[])
    }

    /// Load a tree from a directory on disk, skipping the `excluded`
    /// relative paths and everything below them
    pub fn from_dir_excluding<P: AsRef<Path>>(root: P, excluded: &[&str]) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(CoreError::InvalidPath {
                path: root.display().to_string(),
                message: "not a directory".to_string(),
            });
        }

        let walker = walkdir::WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                let rel = relative_path(root, entry.path());
                !excluded.contains(&rel.as_str())
            });

        let mut fs = Self::new();
        for entry in walker {
            let entry = entry.map_err(|e| CoreError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let data = std::fs::read(entry.path())?;
            fs.insert(&relative_path(root, entry.path()), data)?;
        }
        Ok(fs)
    }

    /// Insert a file, returning the previous content at that path
    ///
    /// A path cannot be both a file and a directory: inserting below an
    /// existing file, or at a path that already holds files below it, fails.
    pub fn insert(&mut self, path: &str, data: impl Into<Vec<u8>>) -> Result<Option<Vec<u8>>> {
        let cleaned = clean_path(path)?;
        if cleaned.is_empty() {
            return Err(CoreError::InvalidPath {
                path: path.to_string(),
                message: "path refers to the bundle root".to_string(),
            });
        }
        if let Some(other) = self.conflict(&cleaned) {
            return Err(CoreError::InvalidPath {
                path: path.to_string(),
                message: format!("conflicts with file {:?}", other),
            });
        }
        Ok(self.files.insert(cleaned, data.into()))
    }

    /// The existing file that keeps `path` from being inserted as a file,
    /// either because it sits above `path` or because it sits below it
    pub fn conflicting_file(&self, path: &str) -> Option<&str> {
        let cleaned = clean_path(path).ok()?;
        self.conflict(&cleaned)
    }

    fn conflict(&self, cleaned: &str) -> Option<&str> {
        for (i, _) in cleaned.match_indices('/') {
            if let Some((ancestor, _)) = self.files.get_key_value(&cleaned[..i]) {
                return Some(ancestor.as_str());
            }
        }
        let prefix = format!("{}/", cleaned);
        self.files
            .range(prefix.clone()..)
            .next()
            .map(|(p, _)| p.as_str())
            .filter(|p| p.starts_with(&prefix))
    }

    /// Get the content of a file
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        let cleaned = clean_path(path).ok()?;
        self.files.get(&cleaned).map(Vec::as_slice)
    }

    /// Check whether a file exists at `path`
    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Number of files in the tree
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// All file paths in lexical order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// All files in lexical path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, d)| (p.as_str(), d.as_slice()))
    }

    /// Names of the entries directly under the root
    pub fn root_entries(&self) -> BTreeSet<&str> {
        self.files
            .keys()
            .map(|p| p.split('/').next().unwrap_or(p.as_str()))
            .collect()
    }

    /// The single top-level directory, if the root contains nothing else
    pub fn base_dir(&self) -> Option<&str> {
        let entries = self.root_entries();
        if entries.len() != 1 {
            return None;
        }
        let only = entries.into_iter().next()?;
        // A root-level file named like the entry means it is not a directory
        if self.files.contains_key(only) {
            return None;
        }
        Some(only)
    }

    /// Return a tree whose root holds exactly one directory
    ///
    /// If the root already holds a single directory the tree is returned as
    /// is; otherwise every file is moved under `name`. The receiver is never
    /// modified.
    pub fn ensure_base_dir(&self, name: &str) -> Result<BundleFs> {
        if self.base_dir().is_some() {
            return Ok(self.clone());
        }
        let base = clean_path(name)?;
        if base.is_empty() || base.contains('/') {
            return Err(CoreError::InvalidPath {
                path: name.to_string(),
                message: "base directory must be a single path component".to_string(),
            });
        }
        let files = self
            .files
            .iter()
            .map(|(p, d)| (format!("{}/{}", base, p), d.clone()))
            .collect();
        Ok(BundleFs { files })
    }

    /// Extract the subtree under `dir`, re-rooted at `dir`
    pub fn subtree(&self, dir: &str) -> Result<BundleFs> {
        let dir = clean_path(dir)?;
        if dir.is_empty() {
            return Ok(self.clone());
        }
        let prefix = format!("{}/", dir);
        let files = self
            .files
            .iter()
            .filter_map(|(p, d)| p.strip_prefix(&prefix).map(|rel| (rel.to_string(), d.clone())))
            .collect();
        Ok(BundleFs { files })
    }
}

/// Normalize a relative path lexically
///
/// Returns the empty string for the root itself.
pub fn clean_path(raw: &str) -> Result<String> {
    if raw.starts_with('/') {
        return Err(CoreError::InvalidPath {
            path: raw.to_string(),
            message: "absolute paths are not allowed".to_string(),
        });
    }

    let mut parts: Vec<&str> = Vec::new();
    for part in raw.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(CoreError::InvalidPath {
                        path: raw.to_string(),
                        message: "path escapes the bundle root".to_string(),
                    });
                }
            }
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// Paths a container runtime places in every container's root filesystem,
/// plus the unpack worker's own tool mount
///
/// These are skipped when a bundle is read from an image's root.
pub const CONTAINER_RUNTIME_PATHS: &[&str] = &[
    "proc",
    "sys",
    "dev",
    "util",
    "etc/hosts",
    "etc/hostname",
    "etc/resolv.conf",
    "run/secrets",
    "var/run/secrets",
];

fn relative_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join a directory and a file name into a normalized path
pub fn join_path(dir: &str, name: &str) -> Result<String> {
    if dir.is_empty() {
        return clean_path(name);
    }
    clean_path(&format!("{}/{}", dir, name))
}
