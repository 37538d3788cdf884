//! Staged file system access.
//!
//! All writes and removals made through a [`TransactionalFileSystem`] are buffered in
//! memory and only reach the disk on [`TransactionalFileSystem::commit`]. Reads see the
//! staged state. A commit either applies every buffered change or, if anything fails on
//! the way, restores the previous state of all touched paths.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

const STAGING_PREFIX: &str = ".cadmigrate-txn-";

#[derive(Debug, Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid relative path: \"{0}\"")]
    InvalidPath(String),
}

impl FsError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            FsError::NotFound(path.to_path_buf())
        } else {
            FsError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }
}

/// Buffered view over a directory tree on disk.
#[derive(Debug)]
pub struct TransactionalFileSystem {
    root: PathBuf,
    modified: BTreeMap<String, Vec<u8>>,
    removed_files: BTreeSet<String>,
    removed_dirs: BTreeSet<String>,
}

impl TransactionalFileSystem {
    /// Open an existing directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, FsError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(FsError::NotFound(root));
        }
        Ok(Self {
            root,
            modified: BTreeMap::new(),
            removed_files: BTreeSet::new(),
            removed_dirs: BTreeSet::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// View of a subdirectory, e.g. `sym/<uuid>`.
    pub fn dir(&mut self, path: &str) -> Result<TransactionalDirectory<'_>, FsError> {
        let prefix = normalize(path)?;
        Ok(TransactionalDirectory { fs: self, prefix })
    }

    pub fn abs_path(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |p, segment| p.join(segment))
    }

    pub fn is_dirty(&self) -> bool {
        !self.modified.is_empty() || !self.removed_files.is_empty() || !self.removed_dirs.is_empty()
    }

    pub fn file_exists(&self, path: &str) -> bool {
        let Ok(path) = normalize(path) else {
            return false;
        };
        if self.modified.contains_key(&path) {
            return true;
        }
        if self.is_removed(&path) {
            return false;
        }
        self.abs_path(&path).is_file()
    }

    pub fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let path = normalize(path)?;
        if let Some(content) = self.modified.get(&path) {
            return Ok(content.clone());
        }
        let abs = self.abs_path(&path);
        if self.is_removed(&path) {
            return Err(FsError::NotFound(abs));
        }
        std::fs::read(&abs).map_err(|e| FsError::io(&abs, e))
    }

    pub fn write(&mut self, path: &str, content: Vec<u8>) -> Result<(), FsError> {
        let path = normalize(path)?;
        if path.is_empty() {
            return Err(FsError::InvalidPath(path));
        }
        self.removed_files.remove(&path);
        self.modified.insert(path, content);
        Ok(())
    }

    /// Remove a file or a whole directory subtree.
    pub fn remove_path(&mut self, path: &str) -> Result<(), FsError> {
        let path = normalize(path)?;
        if path.is_empty() {
            return Err(FsError::InvalidPath(path));
        }
        let subtree = format!("{}/", path);
        self.modified
            .retain(|p, _| p != &path && !p.starts_with(&subtree));
        if self.abs_path(&path).is_dir() {
            self.removed_files.retain(|p| !p.starts_with(&subtree));
            self.removed_dirs.insert(path);
        } else {
            self.removed_files.insert(path);
        }
        Ok(())
    }

    /// Names of the files directly inside `dir`, sorted.
    pub fn files(&self, dir: &str) -> Result<Vec<String>, FsError> {
        self.entries(dir, false)
    }

    /// Names of the subdirectories directly inside `dir`, sorted.
    pub fn dirs(&self, dir: &str) -> Result<Vec<String>, FsError> {
        self.entries(dir, true)
    }

    /// Drop all buffered changes.
    pub fn discard(&mut self) {
        self.modified.clear();
        self.removed_files.clear();
        self.removed_dirs.clear();
    }

    /// Apply all buffered changes to the disk.
    ///
    /// New contents are first written into a staging directory inside the root. Only then
    /// are originals moved aside and the staged files renamed into place. Any failure
    /// rolls back the paths already touched, so the tree is left as before.
    pub fn commit(&mut self) -> Result<(), FsError> {
        if !self.is_dirty() {
            return Ok(());
        }
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)
            .map_err(|e| FsError::io(&self.root, e))?;

        let mut staged = Vec::with_capacity(self.modified.len());
        for (index, (path, content)) in self.modified.iter().enumerate() {
            let temp = staging.path().join(format!("new-{}", index));
            std::fs::write(&temp, content).map_err(|e| FsError::io(&temp, e))?;
            staged.push((temp, self.abs_path(path)));
        }

        let mut journal = CommitJournal::new(staging.path());
        if let Err(e) = self.apply(&staged, &mut journal) {
            journal.rollback();
            return Err(e);
        }

        tracing::debug!(
            root = %self.root.display(),
            written = self.modified.len(),
            removed = self.removed_files.len() + self.removed_dirs.len(),
            "Committed file system transaction"
        );
        self.discard();
        Ok(())
    }

    fn apply(
        &self,
        staged: &[(PathBuf, PathBuf)],
        journal: &mut CommitJournal,
    ) -> Result<(), FsError> {
        for path in self.removed_dirs.iter().chain(self.removed_files.iter()) {
            let target = self.abs_path(path);
            if target.exists() {
                journal.move_aside(&target)?;
            }
        }
        for (temp, target) in staged {
            if let Some(parent) = target.parent() {
                journal.create_dirs(parent)?;
            }
            if target.exists() {
                journal.move_aside(target)?;
            }
            std::fs::rename(temp, target).map_err(|e| FsError::io(target, e))?;
            journal.created(target);
        }
        Ok(())
    }

    fn is_removed(&self, path: &str) -> bool {
        self.removed_files.contains(path)
            || self
                .removed_dirs
                .iter()
                .any(|dir| path == dir || path.starts_with(&format!("{}/", dir)))
    }

    fn entries(&self, dir: &str, want_dirs: bool) -> Result<Vec<String>, FsError> {
        let dir = normalize(dir)?;
        let mut names = BTreeSet::new();
        let abs = self.abs_path(&dir);
        if abs.is_dir() && !self.is_removed(&dir) {
            let read_dir = std::fs::read_dir(&abs).map_err(|e| FsError::io(&abs, e))?;
            for entry in read_dir {
                let entry = entry.map_err(|e| FsError::io(&abs, e))?;
                let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                    continue;
                };
                if name.starts_with(STAGING_PREFIX) || entry.path().is_dir() != want_dirs {
                    continue;
                }
                if !self.is_removed(&join(&dir, &name)) {
                    names.insert(name);
                }
            }
        }
        let prefix = if dir.is_empty() { String::new() } else { format!("{}/", dir) };
        for path in self.modified.keys() {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((subdir, _)) if want_dirs => {
                    names.insert(subdir.to_string());
                }
                None if !want_dirs => {
                    names.insert(rest.to_string());
                }
                _ => {}
            }
        }
        Ok(names.into_iter().collect())
    }
}

/// Prefixed view into a [`TransactionalFileSystem`], one per unit of work.
#[derive(Debug)]
pub struct TransactionalDirectory<'a> {
    fs: &'a mut TransactionalFileSystem,
    prefix: String,
}

impl<'a> TransactionalDirectory<'a> {
    /// Path of this directory relative to the file system root.
    pub fn path(&self) -> &str {
        &self.prefix
    }

    pub fn abs_path(&self, path: &str) -> PathBuf {
        self.fs.abs_path(&join(&self.prefix, path))
    }

    pub fn subdir(&mut self, path: &str) -> Result<TransactionalDirectory<'_>, FsError> {
        let prefix = join(&self.prefix, &normalize(path)?);
        Ok(TransactionalDirectory {
            fs: &mut *self.fs,
            prefix,
        })
    }

    pub fn file_exists(&self, path: &str) -> bool {
        self.fs.file_exists(&join(&self.prefix, path))
    }

    pub fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
        self.fs.read(&join(&self.prefix, &normalize(path)?))
    }

    pub fn write(&mut self, path: &str, content: Vec<u8>) -> Result<(), FsError> {
        let path = join(&self.prefix, &normalize(path)?);
        self.fs.write(&path, content)
    }

    pub fn remove_path(&mut self, path: &str) -> Result<(), FsError> {
        let path = join(&self.prefix, &normalize(path)?);
        self.fs.remove_path(&path)
    }

    pub fn files(&self, path: &str) -> Result<Vec<String>, FsError> {
        self.fs.files(&join(&self.prefix, &normalize(path)?))
    }

    pub fn dirs(&self, path: &str) -> Result<Vec<String>, FsError> {
        self.fs.dirs(&join(&self.prefix, &normalize(path)?))
    }
}

/// Record of what a commit changed so far, for rollback.
struct CommitJournal {
    backup_dir: PathBuf,
    backups: Vec<(PathBuf, PathBuf)>,
    created_files: Vec<PathBuf>,
    created_dirs: Vec<PathBuf>,
}

impl CommitJournal {
    fn new(staging: &Path) -> Self {
        Self {
            backup_dir: staging.to_path_buf(),
            backups: Vec::new(),
            created_files: Vec::new(),
            created_dirs: Vec::new(),
        }
    }

    fn move_aside(&mut self, target: &Path) -> Result<(), FsError> {
        let backup = self.backup_dir.join(format!("old-{}", self.backups.len()));
        std::fs::rename(target, &backup).map_err(|e| FsError::io(target, e))?;
        self.backups.push((backup, target.to_path_buf()));
        Ok(())
    }

    fn create_dirs(&mut self, dir: &Path) -> Result<(), FsError> {
        let mut missing = Vec::new();
        let mut current = Some(dir);
        while let Some(path) = current {
            if path.exists() {
                break;
            }
            missing.push(path.to_path_buf());
            current = path.parent();
        }
        for path in missing.into_iter().rev() {
            std::fs::create_dir(&path).map_err(|e| FsError::io(&path, e))?;
            self.created_dirs.push(path);
        }
        Ok(())
    }

    fn created(&mut self, file: &Path) {
        self.created_files.push(file.to_path_buf());
    }

    fn rollback(self) {
        for file in self.created_files.iter().rev() {
            if let Err(e) = std::fs::remove_file(file) {
                tracing::warn!("Rollback could not remove {}: {}", file.display(), e);
            }
        }
        for (backup, target) in self.backups.iter().rev() {
            if let Err(e) = std::fs::rename(backup, target) {
                tracing::warn!("Rollback could not restore {}: {}", target.display(), e);
            }
        }
        for dir in self.created_dirs.iter().rev() {
            let _ = std::fs::remove_dir(dir);
        }
    }
}

/// Validate a relative path and bring it into `a/b/c` form.
fn normalize(path: &str) -> Result<String, FsError> {
    let mut segments = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::Normal(segment) => match segment.to_str() {
                Some(segment) => segments.push(segment),
                None => return Err(FsError::InvalidPath(path.to_string())),
            },
            Component::CurDir => {}
            _ => return Err(FsError::InvalidPath(path.to_string())),
        }
    }
    Ok(segments.join("/"))
}

fn join(prefix: &str, path: &str) -> String {
    match (prefix.is_empty(), path.is_empty()) {
        (true, _) => path.to_string(),
        (false, true) => prefix.to_string(),
        (false, false) => format!("{}/{}", prefix, path),
    }
}
