//! File format migration steps.
//!
//! Each step upgrades files of exactly one format version to the next one. A step offers
//! one upgrade function per element category and keeps no state between invocations.

pub mod helpers;
pub mod index;
pub mod v01;
pub mod v02;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::fs::{FsError, TransactionalDirectory};
use crate::serialization::{ParseError, SchemaError};
use crate::types::{Uuid, Version};

/// Kinds of elements with their own directory and version marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ComponentCategory,
    PackageCategory,
    Symbol,
    Package,
    Component,
    Device,
    Library,
    Project,
    WorkspaceData,
}

impl Category {
    /// Library element categories in migration order.
    pub const LIBRARY_ELEMENTS: [Category; 6] = [
        Category::ComponentCategory,
        Category::PackageCategory,
        Category::Symbol,
        Category::Package,
        Category::Component,
        Category::Device,
    ];

    /// Subdirectory of a library holding elements of this category.
    pub fn dir_name(self) -> Option<&'static str> {
        match self {
            Category::ComponentCategory => Some("cmpcat"),
            Category::PackageCategory => Some("pkgcat"),
            Category::Symbol => Some("sym"),
            Category::Package => Some("pkg"),
            Category::Component => Some("cmp"),
            Category::Device => Some("dev"),
            Category::Library | Category::Project | Category::WorkspaceData => None,
        }
    }

    pub fn version_file(self) -> &'static str {
        match self {
            Category::ComponentCategory => ".librepcb-cmpcat",
            Category::PackageCategory => ".librepcb-pkgcat",
            Category::Symbol => ".librepcb-sym",
            Category::Package => ".librepcb-pkg",
            Category::Component => ".librepcb-cmp",
            Category::Device => ".librepcb-dev",
            Category::Library => ".librepcb-lib",
            Category::Project => ".librepcb-project",
            Category::WorkspaceData => ".librepcb-data",
        }
    }

    /// Main document of the element, relative to its directory.
    pub fn main_file(self) -> &'static str {
        match self {
            Category::ComponentCategory => "component_category.lp",
            Category::PackageCategory => "package_category.lp",
            Category::Symbol => "symbol.lp",
            Category::Package => "package.lp",
            Category::Component => "component.lp",
            Category::Device => "device.lp",
            Category::Library => "library.lp",
            Category::Project => "project/settings.lp",
            Category::WorkspaceData => "settings.lp",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::ComponentCategory => "component category",
            Category::PackageCategory => "package category",
            Category::Symbol => "symbol",
            Category::Package => "package",
            Category::Component => "component",
            Category::Device => "device",
            Category::Library => "library",
            Category::Project => "project",
            Category::WorkspaceData => "workspace data",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to parse {file}: {source}")]
    Parse {
        file: String,
        #[source]
        source: ParseError,
    },
    #[error("Invalid content in {file}: {source}")]
    Schema {
        file: String,
        #[source]
        source: SchemaError,
    },
    #[error("File {file} is not valid UTF-8")]
    Encoding { file: String },
    #[error("Broken {kind} reference {uuid} in {file}")]
    BrokenReference {
        file: String,
        kind: &'static str,
        uuid: Uuid,
    },
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Attach the offending file to schema errors.
pub trait SchemaContext<T> {
    fn in_file(self, file: &str) -> Result<T, MigrationError>;
}

impl<T> SchemaContext<T> for Result<T, SchemaError> {
    fn in_file(self, file: &str) -> Result<T, MigrationError> {
        self.map_err(|source| MigrationError::Schema {
            file: file.to_string(),
            source,
        })
    }
}

/// Per-invocation state shared by the upgrade functions of one step.
#[derive(Debug)]
pub struct StepContext {
    target: Version,
    warnings: Vec<String>,
}

impl StepContext {
    pub fn new(target: Version) -> Self {
        Self {
            target,
            warnings: Vec::new(),
        }
    }

    pub fn target(&self) -> &Version {
        &self.target
    }

    /// Record a dropped cross-link or similar non-fatal problem.
    pub fn warn(&mut self, file: &str, message: impl fmt::Display) {
        tracing::warn!("{}: {}", file, message);
        self.warnings.push(format!("{}: {}", file, message));
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn into_warnings(self) -> Vec<String> {
        self.warnings
    }
}

pub type UpgradeFn =
    fn(&mut TransactionalDirectory<'_>, &mut StepContext) -> Result<(), MigrationError>;

/// One upgrade function per category.
#[derive(Clone, Copy)]
pub struct CategoryUpgrades {
    pub component_category: UpgradeFn,
    pub package_category: UpgradeFn,
    pub symbol: UpgradeFn,
    pub package: UpgradeFn,
    pub component: UpgradeFn,
    pub device: UpgradeFn,
    pub library: UpgradeFn,
    pub project: UpgradeFn,
    pub workspace_data: UpgradeFn,
}

#[derive(Clone)]
pub struct MigrationStep {
    pub from: Version,
    pub to: Version,
    upgrades: CategoryUpgrades,
}

impl MigrationStep {
    pub fn new(from: Version, to: Version, upgrades: CategoryUpgrades) -> Self {
        Self { from, to, upgrades }
    }

    /// Upgrade the element of `category` located at `dir`.
    pub fn upgrade(
        &self,
        category: Category,
        dir: &mut TransactionalDirectory<'_>,
        ctx: &mut StepContext,
    ) -> Result<(), MigrationError> {
        let upgrade = match category {
            Category::ComponentCategory => self.upgrades.component_category,
            Category::PackageCategory => self.upgrades.package_category,
            Category::Symbol => self.upgrades.symbol,
            Category::Package => self.upgrades.package,
            Category::Component => self.upgrades.component,
            Category::Device => self.upgrades.device,
            Category::Library => self.upgrades.library,
            Category::Project => self.upgrades.project,
            Category::WorkspaceData => self.upgrades.workspace_data,
        };
        tracing::debug!(
            "Upgrading {} at \"{}\" from {} to {}",
            category,
            dir.path(),
            self.from,
            self.to
        );
        upgrade(dir, ctx)
    }
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

/// All known steps, ordered by source version.
pub fn registered_steps() -> Vec<MigrationStep> {
    vec![v01::step(), v02::step()]
}

/// Version written by the last registered step.
pub fn latest_version() -> Version {
    registered_steps()
        .last()
        .map(|step| step.to.clone())
        .unwrap_or_else(|| Version::new(&[0, 1]))
}
