//! Upgrade from file format 0.2 to 1.

use super::helpers::{
    append_line, ensure_token, listed_files, rewrite_document, tokens, upgrade_project_library,
    upgrade_version_file,
};
use super::{Category, CategoryUpgrades, MigrationError, MigrationStep, SchemaContext, StepContext};
use crate::fs::TransactionalDirectory;
use crate::serialization::{SExpression, SchemaError};
use crate::types::Version;

pub fn step() -> MigrationStep {
    MigrationStep::new(
        Version::new(&[0, 2]),
        Version::new(&[1]),
        CategoryUpgrades {
            component_category: upgrade_component_category,
            package_category: upgrade_package_category,
            symbol: upgrade_symbol,
            package: upgrade_package,
            component: upgrade_component,
            device: upgrade_device,
            library: upgrade_library,
            project: upgrade_project,
            workspace_data: upgrade_workspace_data,
        },
    )
}

fn upgrade_marker(
    category: Category,
    dir: &mut TransactionalDirectory<'_>,
    ctx: &StepContext,
) -> Result<(), MigrationError> {
    upgrade_version_file(dir, category.version_file(), ctx.target())
}

fn upgrade_component_category(
    dir: &mut TransactionalDirectory<'_>,
    ctx: &mut StepContext,
) -> Result<(), MigrationError> {
    upgrade_marker(Category::ComponentCategory, dir, ctx)
}

fn upgrade_package_category(
    dir: &mut TransactionalDirectory<'_>,
    ctx: &mut StepContext,
) -> Result<(), MigrationError> {
    upgrade_marker(Category::PackageCategory, dir, ctx)
}

fn upgrade_symbol(
    dir: &mut TransactionalDirectory<'_>,
    ctx: &mut StepContext,
) -> Result<(), MigrationError> {
    upgrade_marker(Category::Symbol, dir, ctx)
}

fn upgrade_package(
    dir: &mut TransactionalDirectory<'_>,
    ctx: &mut StepContext,
) -> Result<(), MigrationError> {
    upgrade_marker(Category::Package, dir, ctx)?;
    rewrite_document(dir, Category::Package.main_file(), |root, file| {
        upgrade_footprints(root).in_file(file)
    })
}

fn upgrade_component(
    dir: &mut TransactionalDirectory<'_>,
    ctx: &mut StepContext,
) -> Result<(), MigrationError> {
    upgrade_marker(Category::Component, dir, ctx)
}

fn upgrade_device(
    dir: &mut TransactionalDirectory<'_>,
    ctx: &mut StepContext,
) -> Result<(), MigrationError> {
    upgrade_marker(Category::Device, dir, ctx)
}

fn upgrade_library(
    dir: &mut TransactionalDirectory<'_>,
    ctx: &mut StepContext,
) -> Result<(), MigrationError> {
    upgrade_marker(Category::Library, dir, ctx)
}

fn upgrade_project(
    dir: &mut TransactionalDirectory<'_>,
    ctx: &mut StepContext,
) -> Result<(), MigrationError> {
    upgrade_marker(Category::Project, dir, ctx)?;
    upgrade_project_library(&step(), dir, ctx)?;
    if dir.file_exists("boards/boards.lp") {
        for path in listed_files(dir, "boards/boards.lp", "board")? {
            rewrite_document(dir, &path, |root, file| upgrade_board_devices(root).in_file(file))?;
        }
    }
    Ok(())
}

fn upgrade_workspace_data(
    dir: &mut TransactionalDirectory<'_>,
    ctx: &mut StepContext,
) -> Result<(), MigrationError> {
    upgrade_marker(Category::WorkspaceData, dir, ctx)?;
    rewrite_document(dir, Category::WorkspaceData.main_file(), |root, file| {
        if root.try_get_child("dismissed_messages").is_none() {
            append_line(root, SExpression::list("dismissed_messages")).in_file(file)?;
        }
        Ok(())
    })
}

fn upgrade_footprints(root: &mut SExpression) -> Result<(), SchemaError> {
    for footprint in root.children_named_mut("footprint") {
        if footprint.try_get_child("3d_position").is_some() {
            continue;
        }
        let position = tokens("3d_position", &["0.0", "0.0", "0.0"]);
        let rotation = tokens("3d_rotation", &["0.0", "0.0", "0.0"]);
        append_line(footprint, position)?;
        footprint.append_inline(rotation)?;
    }
    Ok(())
}

fn upgrade_board_devices(root: &mut SExpression) -> Result<(), SchemaError> {
    for device in root.children_named_mut("device") {
        ensure_token(device, "lock", "false")?;
        ensure_token(device, "glue", "true")?;
    }
    Ok(())
}
