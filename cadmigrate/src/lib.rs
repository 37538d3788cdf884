//! cadmigrate - file format migration for CAD libraries and projects
//!
//! Libraries, projects and workspace data are stored as trees of S-expression
//! documents. Each directory carries a version marker file. This library reads file sets
//! written by older file format versions and rewrites them into the current format,
//! keeping every cross-reference between symbols, components, gates, pads and nets intact.
//!
//! # Quick Start
//!
//! ```no_run
//! use cadmigrate::{MigrationCore, UpgradeOptions};
//! use std::path::Path;
//!
//! let root = Path::new("MyLibrary.lplib");
//! let kind = MigrationCore::detect_kind(root).unwrap();
//! let report = MigrationCore::upgrade(root, kind, &UpgradeOptions::default()).unwrap();
//!
//! for element in &report.elements {
//!     println!("{} {}: {} -> {}", element.category, element.path, element.from, element.to);
//! }
//! ```
//!
//! # Features
//!
//! - **Document tree**: lossless S-expression parser and canonical writer
//! - **Staged writes**: every change is buffered and committed atomically
//! - **Migration chain**: 0.1 → 0.2 → 1, selected by the detected version

pub mod core;
pub mod fs;
pub mod geometry;
pub mod migration;
pub mod serialization;
pub mod types;

// Re-export main types
pub use self::core::{
    CommitPolicy, ElementReport, FileSetKind, MigrationCore, UpgradeError, UpgradeOptions,
    UpgradeReport, UpgradeStatus,
};
pub use fs::{FsError, TransactionalDirectory, TransactionalFileSystem};
pub use geometry::TraceAnchor;
pub use migration::{Category, MigrationError, MigrationStep};
pub use serialization::{
    LocalizedDescriptionMap, LocalizedKeywordsMap, LocalizedNameMap, MapEvent, ParseError,
    SExpression, SchemaError,
};
pub use types::{ElementName, Uuid, Version};

/// Parse a document from text (convenience wrapper).
pub fn parse_document(text: &str) -> Result<SExpression, ParseError> {
    SExpression::parse(text)
}

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        FileSetKind, MigrationCore, SExpression, UpgradeError, UpgradeOptions, UpgradeReport,
        Uuid, Version,
    };
}
