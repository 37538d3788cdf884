//! Migration chain shared by the CLI and library users.
//! Detects the file format of a file set and runs every applicable step in order.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::fs::{FsError, TransactionalFileSystem};
use crate::migration::{
    latest_version, registered_steps, Category, MigrationError, MigrationStep, StepContext,
};
use crate::serialization::{LocalizedNameMap, SExpression};
use crate::types::{Uuid, Version, VersionError};

#[derive(Debug, thiserror::Error)]
pub enum UpgradeError {
    #[error("Not a library, project or workspace data directory: {0}")]
    NotAFileSet(PathBuf),
    #[error("Invalid version marker {path}: {source}")]
    InvalidVersionMarker {
        path: PathBuf,
        #[source]
        source: VersionError,
    },
    #[error("No migration known for file format {version} of \"{path}\"")]
    UnknownVersion { path: String, version: Version },
    #[error("File format {version} of \"{path}\" is newer than the supported format {latest}")]
    NewerVersion {
        path: String,
        version: Version,
        latest: Version,
    },
    #[error(transparent)]
    Fs(#[from] FsError),
    #[error("Upgrading {category} \"{path}\" from {from} to {to} failed: {source}")]
    StepFailed {
        from: Version,
        to: Version,
        category: Category,
        path: String,
        #[source]
        source: MigrationError,
    },
}

/// What a directory on disk contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSetKind {
    Library,
    Project,
    WorkspaceData,
}

impl FileSetKind {
    pub const ALL: [FileSetKind; 3] = [
        FileSetKind::Library,
        FileSetKind::Project,
        FileSetKind::WorkspaceData,
    ];

    pub fn category(self) -> Category {
        match self {
            FileSetKind::Library => Category::Library,
            FileSetKind::Project => Category::Project,
            FileSetKind::WorkspaceData => Category::WorkspaceData,
        }
    }
}

impl fmt::Display for FileSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.category().as_str())
    }
}

/// When staged changes are written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// One commit for the whole file set; any failure leaves every file untouched.
    #[default]
    AllOrNothing,
    /// Commit after each library element. Elements committed before a failure stay
    /// upgraded; the library root is only upgraded if all elements succeeded.
    PerElement,
}

/// Options for upgrade runs (CLI or library users).
#[derive(Clone, Debug, Default)]
pub struct UpgradeOptions {
    pub commit_policy: CommitPolicy,
    /// Preferred locales for element names in the report, most preferred first.
    pub locale_order: Vec<String>,
    /// Run all steps but discard the result.
    pub dry_run: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStatus {
    AlreadyCurrent,
    Migrated,
    DryRun,
}

/// One upgraded unit: a library element or the file set root.
#[derive(Debug, Clone, Serialize)]
pub struct ElementReport {
    pub category: Category,
    pub path: String,
    pub uuid: Option<Uuid>,
    pub name: Option<String>,
    pub from: Version,
    pub to: Version,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpgradeReport {
    pub root: PathBuf,
    pub kind: FileSetKind,
    pub status: UpgradeStatus,
    pub from: Version,
    pub to: Version,
    pub elements: Vec<ElementReport>,
    pub warnings: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl UpgradeReport {
    pub fn is_migrated(&self) -> bool {
        self.status == UpgradeStatus::Migrated
    }
}

/// Core migration API.
pub struct MigrationCore;

impl MigrationCore {
    /// Find out what kind of file set `root` is by its version marker.
    pub fn detect_kind(root: &Path) -> Result<FileSetKind, UpgradeError> {
        FileSetKind::ALL
            .into_iter()
            .find(|kind| root.join(kind.category().version_file()).is_file())
            .ok_or_else(|| UpgradeError::NotAFileSet(root.to_path_buf()))
    }

    /// File format version of the file set root.
    pub fn detect_version(root: &Path, kind: FileSetKind) -> Result<Version, UpgradeError> {
        let fs = TransactionalFileSystem::open(root)?;
        read_version(&fs, kind.category().version_file())
    }

    /// Upgrade `root` to the latest file format.
    pub fn upgrade(
        root: &Path,
        kind: FileSetKind,
        options: &UpgradeOptions,
    ) -> Result<UpgradeReport, UpgradeError> {
        let started_at = Utc::now();
        let mut fs = TransactionalFileSystem::open(root)?;
        let from = read_version(&fs, kind.category().version_file())?;
        let mut run = Run::new(options);
        run.check_supported(".", &from)?;

        tracing::info!("Upgrading {} at {} from file format {}", kind, root.display(), from);

        let result = match kind {
            FileSetKind::Library => run.upgrade_library(&mut fs, &from),
            FileSetKind::Project | FileSetKind::WorkspaceData => {
                run.upgrade_unit(&mut fs, kind.category(), "", &from)
            }
        };
        if let Err(e) = result {
            fs.discard();
            return Err(e);
        }

        let status = if run.elements.is_empty() {
            UpgradeStatus::AlreadyCurrent
        } else if options.dry_run {
            fs.discard();
            UpgradeStatus::DryRun
        } else {
            fs.commit()?;
            UpgradeStatus::Migrated
        };

        tracing::info!(
            "Upgrade of {} finished: {:?}, {} unit(s), {} warning(s)",
            root.display(),
            status,
            run.elements.len(),
            run.warnings.len()
        );

        Ok(UpgradeReport {
            root: root.to_path_buf(),
            kind,
            status,
            from,
            to: run.latest,
            elements: run.elements,
            warnings: run.warnings,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// State of one `upgrade` call.
struct Run<'o> {
    options: &'o UpgradeOptions,
    steps: Vec<MigrationStep>,
    latest: Version,
    elements: Vec<ElementReport>,
    warnings: Vec<String>,
}

impl<'o> Run<'o> {
    fn new(options: &'o UpgradeOptions) -> Self {
        Self {
            options,
            steps: registered_steps(),
            latest: latest_version(),
            elements: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn check_supported(&self, path: &str, version: &Version) -> Result<(), UpgradeError> {
        if *version > self.latest {
            return Err(UpgradeError::NewerVersion {
                path: path.to_string(),
                version: version.clone(),
                latest: self.latest.clone(),
            });
        }
        if *version != self.latest && !self.steps.iter().any(|step| step.from == *version) {
            return Err(UpgradeError::UnknownVersion {
                path: path.to_string(),
                version: version.clone(),
            });
        }
        Ok(())
    }

    /// Every library element from its own version, the library root last.
    fn upgrade_library(
        &mut self,
        fs: &mut TransactionalFileSystem,
        root_version: &Version,
    ) -> Result<(), UpgradeError> {
        let per_element =
            self.options.commit_policy == CommitPolicy::PerElement && !self.options.dry_run;
        for category in Category::LIBRARY_ELEMENTS {
            let Some(dir_name) = category.dir_name() else {
                continue;
            };
            for name in fs.dirs(dir_name)? {
                let path = format!("{}/{}", dir_name, name);
                let marker = format!("{}/{}", path, category.version_file());
                if !fs.file_exists(&marker) {
                    tracing::debug!("Skipping {} without version marker", path);
                    continue;
                }
                let version = read_version(fs, &marker)?;
                self.check_supported(&path, &version)?;
                self.upgrade_unit(fs, category, &path, &version)?;
                if per_element {
                    fs.commit()?;
                }
            }
        }
        self.upgrade_unit(fs, Category::Library, "", root_version)
    }

    /// Run all steps starting at `from` on one unit of work.
    fn upgrade_unit(
        &mut self,
        fs: &mut TransactionalFileSystem,
        category: Category,
        path: &str,
        from: &Version,
    ) -> Result<(), UpgradeError> {
        if *from == self.latest {
            return Ok(());
        }
        let label = if path.is_empty() { "." } else { path };
        {
            let mut dir = fs.dir(path)?;
            for step in self.steps.iter().filter(|step| step.from >= *from) {
                let mut ctx = StepContext::new(step.to.clone());
                step.upgrade(category, &mut dir, &mut ctx)
                    .map_err(|source| UpgradeError::StepFailed {
                        from: step.from.clone(),
                        to: step.to.clone(),
                        category,
                        path: label.to_string(),
                        source,
                    })?;
                self.warnings.extend(ctx.into_warnings());
            }
        }
        let uuid = path.rsplit('/').next().and_then(Uuid::try_from_str);
        let name = self.element_name(fs, category, path);
        tracing::debug!("Upgraded {} {} from {} to {}", category, label, from, self.latest);
        self.elements.push(ElementReport {
            category,
            path: label.to_string(),
            uuid,
            name,
            from: from.clone(),
            to: self.latest.clone(),
        });
        Ok(())
    }

    /// Display name of the upgraded element in the preferred locale.
    fn element_name(
        &self,
        fs: &TransactionalFileSystem,
        category: Category,
        path: &str,
    ) -> Option<String> {
        let file = if path.is_empty() {
            category.main_file().to_string()
        } else {
            format!("{}/{}", path, category.main_file())
        };
        let content = fs.read(&file).ok()?;
        let root = SExpression::parse(std::str::from_utf8(&content).ok()?).ok()?;
        let names = LocalizedNameMap::from_sexpression(&root).ok()?;
        let (name, _) = names.value(&self.options.locale_order);
        Some(name.as_str().to_string())
    }
}

fn read_version(fs: &TransactionalFileSystem, path: &str) -> Result<Version, UpgradeError> {
    let content = fs.read(path)?;
    String::from_utf8_lossy(&content)
        .parse()
        .map_err(|source| UpgradeError::InvalidVersionMarker {
            path: fs.abs_path(path),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn file_set(marker: &str, version: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(marker), version).unwrap();
        dir
    }

    #[test]
    fn test_detect_kind() {
        let dir = file_set(".librepcb-project", "0.1\n");
        assert_eq!(MigrationCore::detect_kind(dir.path()).unwrap(), FileSetKind::Project);
        let empty = TempDir::new().unwrap();
        assert!(matches!(
            MigrationCore::detect_kind(empty.path()),
            Err(UpgradeError::NotAFileSet(_))
        ));
    }

    #[test]
    fn test_detect_version() {
        let dir = file_set(".librepcb-data", "0.2\n");
        let version =
            MigrationCore::detect_version(dir.path(), FileSetKind::WorkspaceData).unwrap();
        assert_eq!(version.to_string(), "0.2");
    }

    #[test]
    fn test_invalid_marker() {
        let dir = file_set(".librepcb-lib", "banana\n");
        assert!(matches!(
            MigrationCore::detect_version(dir.path(), FileSetKind::Library),
            Err(UpgradeError::InvalidVersionMarker { .. })
        ));
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let dir = file_set(".librepcb-data", "2\n");
        let err = MigrationCore::upgrade(
            dir.path(),
            FileSetKind::WorkspaceData,
            &UpgradeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, UpgradeError::NewerVersion { .. }));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let dir = file_set(".librepcb-data", "0.1.5\n");
        let err = MigrationCore::upgrade(
            dir.path(),
            FileSetKind::WorkspaceData,
            &UpgradeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, UpgradeError::UnknownVersion { .. }));
    }

    #[test]
    fn test_current_version_is_noop() {
        let dir = file_set(".librepcb-data", "1\n");
        let report = MigrationCore::upgrade(
            dir.path(),
            FileSetKind::WorkspaceData,
            &UpgradeOptions::default(),
        )
        .unwrap();
        assert_eq!(report.status, UpgradeStatus::AlreadyCurrent);
        assert!(report.elements.is_empty());
        assert!(!dir.path().join("settings.lp").exists());
    }

    #[test]
    fn test_workspace_data_upgrade() {
        let dir = file_set(".librepcb-data", "0.1\n");
        std::fs::write(
            dir.path().join("settings.lp"),
            "(librepcb_workspace_settings\n (use_opengl false)\n (repositories\n  (repository \"https://api.librepcb.org\")\n )\n)\n",
        )
        .unwrap();
        let report = MigrationCore::upgrade(
            dir.path(),
            FileSetKind::WorkspaceData,
            &UpgradeOptions::default(),
        )
        .unwrap();
        assert!(report.is_migrated());
        assert_eq!(report.from.to_string(), "0.1");
        assert_eq!(report.to.to_string(), "1");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("settings.lp")).unwrap(),
            "(librepcb_workspace_settings\n (api_endpoints\n  (url \"https://api.librepcb.org\")\n )\n (dismissed_messages)\n)\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join(".librepcb-data")).unwrap(),
            "1\n"
        );
    }

    #[test]
    fn test_report_json() {
        let dir = file_set(".librepcb-data", "0.2\n");
        std::fs::write(
            dir.path().join("settings.lp"),
            "(librepcb_workspace_settings\n)\n",
        )
        .unwrap();
        let report = MigrationCore::upgrade(
            dir.path(),
            FileSetKind::WorkspaceData,
            &UpgradeOptions::default(),
        )
        .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["kind"], "workspace_data");
        assert_eq!(json["status"], "migrated");
        assert_eq!(json["from"], "0.2");
        assert_eq!(json["elements"][0]["category"], "workspace_data");
        assert_eq!(json["elements"][0]["path"], ".");
        assert!(json["elements"][0]["uuid"].is_null());
    }
}
