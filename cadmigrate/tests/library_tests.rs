//! Library upgrade tests on complete file sets

use cadmigrate::{
    Category, CommitPolicy, FileSetKind, MigrationCore, UpgradeError, UpgradeOptions,
    UpgradeStatus, Uuid,
};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const LIBRARY: &str = "5a6b7c8d-9e0f-4a1b-8c2d-3e4f5a6b7c8d";
const SYMBOL: &str = "0a1b2c3d-4e5f-4a6b-8c7d-8e9f0a1b2c3d";
const CURRENT_SYMBOL: &str = "1b2c3d4e-5f60-4718-9a2b-3c4d5e6f7a8b";
const PACKAGE: &str = "2c3d4e5f-6071-4829-ab3c-4d5e6f7a8b9c";
const PACKAGE_PAD: &str = "3d4e5f60-7182-493a-bc4d-5e6f7a8b9cad";
const FOOTPRINT: &str = "4e5f6071-8293-4a4b-8d5e-6f7a8b9cadbe";
const COMPONENT: &str = "6b7c8d9e-0f1a-4b2c-9d3e-4f5a6b7c8d9e";
const SIGNAL: &str = "7c8d9e0f-1a2b-4c3d-8e4f-5a6b7c8d9e0f";

fn write(root: &Path, path: &str, content: &str) {
    let path = root.join(path);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn read(root: &Path, path: &str) -> String {
    fs::read_to_string(root.join(path)).unwrap()
}

/// Library at 0.1 with one symbol and one package at 0.1 and one symbol that is already current.
fn library() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, ".librepcb-lib", "0.1\n");
    write(
        root,
        "library.lp",
        &format!(
            "(librepcb_library {}\n (name \"Passives\")\n (name (locale \"de_DE\") \"Passive Bauteile\")\n \
             (version \"0.1\")\n (deprecated false)\n)\n",
            LIBRARY
        ),
    );

    write(root, &format!("sym/{}/.librepcb-sym", SYMBOL), "0.1\n");
    write(
        root,
        &format!("sym/{}/symbol.lp", SYMBOL),
        &format!(
            "(librepcb_symbol {}\n (name \"Resistor\")\n (name (locale \"de_DE\") \"Widerstand\")\n \
             (deprecated false)\n (grid (type lines) (interval 2.54) (unit millimeters))\n \
             (pin {} (name \"1\") (position -5.08 0.0) (rotation 0.0) (length 2.54))\n)\n",
            SYMBOL, PACKAGE_PAD
        ),
    );

    write(root, &format!("sym/{}/.librepcb-sym", CURRENT_SYMBOL), "1\n");
    write(
        root,
        &format!("sym/{}/symbol.lp", CURRENT_SYMBOL),
        &format!("(librepcb_symbol {}\n (name \"Capacitor\")\n)\n", CURRENT_SYMBOL),
    );

    write(root, &format!("pkg/{}/.librepcb-pkg", PACKAGE), "0.1\n");
    write(
        root,
        &format!("pkg/{}/package.lp", PACKAGE),
        &format!(
            "(librepcb_package {}\n (name \"THT\")\n (deprecated false)\n (pad {} (name \"1\"))\n \
             (footprint {} (name \"default\")\n  \
             (pad {} (side tht) (shape round) (position 0.0 0.0) (rotation 0.0) (size 1.6 1.6) (drill 0.8))\n \
             )\n)\n",
            PACKAGE, PACKAGE_PAD, FOOTPRINT, PACKAGE_PAD
        ),
    );
    dir
}

/// Component whose gate pin points to a signal that does not exist.
fn add_broken_component(root: &Path) {
    write(root, &format!("cmp/{}/.librepcb-cmp", COMPONENT), "0.1\n");
    write(
        root,
        &format!("cmp/{}/component.lp", COMPONENT),
        &format!(
            "(librepcb_component {}\n (name \"R\")\n (deprecated false)\n \
             (variant {}\n  (gate {} (symbol {})\n   (pin {} (signal {}) (text pin))\n  )\n )\n)\n",
            COMPONENT, FOOTPRINT, PACKAGE_PAD, SYMBOL, PACKAGE_PAD, SIGNAL
        ),
    );
}

fn snapshot(root: &Path) -> Vec<(String, String)> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                pending.push(path);
            } else {
                let relative = path.strip_prefix(root).unwrap().to_string_lossy().to_string();
                files.push((relative, fs::read_to_string(&path).unwrap()));
            }
        }
    }
    files.sort();
    files
}

#[test]
fn test_library_upgrade() {
    let dir = library();
    let root = dir.path();
    let current_before = read(root, &format!("sym/{}/symbol.lp", CURRENT_SYMBOL));

    let report =
        MigrationCore::upgrade(root, FileSetKind::Library, &UpgradeOptions::default()).unwrap();

    assert_eq!(report.status, UpgradeStatus::Migrated);
    assert_eq!(report.from.to_string(), "0.1");
    assert_eq!(report.to.to_string(), "1");
    let upgraded: Vec<(Category, &str)> = report
        .elements
        .iter()
        .map(|element| (element.category, element.path.as_str()))
        .collect();
    let symbol_path = format!("sym/{}", SYMBOL);
    let package_path = format!("pkg/{}", PACKAGE);
    assert_eq!(
        upgraded,
        vec![
            (Category::Symbol, symbol_path.as_str()),
            (Category::Package, package_path.as_str()),
            (Category::Library, "."),
        ]
    );
    assert_eq!(report.elements[0].uuid, Uuid::try_from_str(SYMBOL));
    assert_eq!(report.elements[0].name.as_deref(), Some("Resistor"));

    for marker in [
        ".librepcb-lib".to_string(),
        format!("sym/{}/.librepcb-sym", SYMBOL),
        format!("pkg/{}/.librepcb-pkg", PACKAGE),
    ] {
        assert_eq!(read(root, &marker), "1\n", "{}", marker);
    }

    let symbol = read(root, &format!("sym/{}/symbol.lp", SYMBOL));
    assert!(symbol.contains("(grid (interval 2.54) (unit millimeters))"));
    assert!(symbol.contains("(name_position 3.81 0.0)"));
    assert!(symbol.contains("(generated_by \"\")"));

    let package = read(root, &format!("pkg/{}/package.lp", PACKAGE));
    assert!(package.contains(&format!("(package_pad {})", PACKAGE_PAD)));
    assert!(package.contains("(side top)"));
    assert!(!package.contains("drill"));
    assert!(package.contains("(diameter 0.8)"));
    assert!(package.contains("(3d_position 0.0 0.0 0.0)"));

    assert_eq!(read(root, &format!("sym/{}/symbol.lp", CURRENT_SYMBOL)), current_before);
}

#[test]
fn test_library_upgrade_is_idempotent() {
    let dir = library();
    MigrationCore::upgrade(dir.path(), FileSetKind::Library, &UpgradeOptions::default()).unwrap();
    let after_first = snapshot(dir.path());

    let options = UpgradeOptions::default();
    let report = MigrationCore::upgrade(dir.path(), FileSetKind::Library, &options).unwrap();

    assert_eq!(report.status, UpgradeStatus::AlreadyCurrent);
    assert!(report.elements.is_empty());
    assert_eq!(snapshot(dir.path()), after_first);
}

#[test]
fn test_element_names_follow_locale_order() {
    let dir = library();
    let options = UpgradeOptions {
        locale_order: vec!["fr_FR".to_string(), "de_DE".to_string()],
        ..UpgradeOptions::default()
    };

    let report = MigrationCore::upgrade(dir.path(), FileSetKind::Library, &options).unwrap();

    assert_eq!(report.elements[0].name.as_deref(), Some("Widerstand"));
    assert_eq!(report.elements[1].name.as_deref(), Some("THT"));
    assert_eq!(report.elements[2].name.as_deref(), Some("Passive Bauteile"));
}

#[test]
fn test_dry_run_leaves_files_untouched() {
    let dir = library();
    let before = snapshot(dir.path());
    let options = UpgradeOptions {
        dry_run: true,
        ..UpgradeOptions::default()
    };

    let report = MigrationCore::upgrade(dir.path(), FileSetKind::Library, &options).unwrap();

    assert_eq!(report.status, UpgradeStatus::DryRun);
    assert_eq!(report.elements.len(), 3);
    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn test_failure_leaves_files_untouched() {
    let dir = library();
    add_broken_component(dir.path());
    let before = snapshot(dir.path());

    let err = MigrationCore::upgrade(dir.path(), FileSetKind::Library, &UpgradeOptions::default())
        .unwrap_err();

    match err {
        UpgradeError::StepFailed { category, path, .. } => {
            assert_eq!(category, Category::Component);
            assert_eq!(path, format!("cmp/{}", COMPONENT));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn test_per_element_commit_keeps_finished_elements() {
    let dir = library();
    let root = dir.path();
    add_broken_component(root);
    let options = UpgradeOptions {
        commit_policy: CommitPolicy::PerElement,
        ..UpgradeOptions::default()
    };

    assert!(MigrationCore::upgrade(root, FileSetKind::Library, &options).is_err());

    assert_eq!(read(root, &format!("sym/{}/.librepcb-sym", SYMBOL)), "1\n");
    assert_eq!(read(root, &format!("pkg/{}/.librepcb-pkg", PACKAGE)), "1\n");
    assert_eq!(read(root, &format!("cmp/{}/.librepcb-cmp", COMPONENT)), "0.1\n");
    assert_eq!(read(root, ".librepcb-lib"), "0.1\n");
}

#[test]
fn test_element_with_newer_version_is_rejected() {
    let dir = library();
    write(dir.path(), &format!("sym/{}/.librepcb-sym", CURRENT_SYMBOL), "7\n");
    let before = snapshot(dir.path());

    let err = MigrationCore::upgrade(dir.path(), FileSetKind::Library, &UpgradeOptions::default())
        .unwrap_err();

    assert!(matches!(err, UpgradeError::NewerVersion { .. }));
    assert_eq!(snapshot(dir.path()), before);
}
