//! Building blocks shared by the migration steps.
//!
//! The tree transforms in here only touch the node they are given.

use super::{Category, MigrationError, MigrationStep, SchemaContext, StepContext};
use crate::fs::TransactionalDirectory;
use crate::serialization::{
    LocalizedDescriptionMap, LocalizedKeywordsMap, LocalizedNameMap, SExpression, SchemaError,
};
use crate::types::Version;

/// Path of `file` relative to the file system root, for messages.
pub fn file_label(dir: &TransactionalDirectory<'_>, file: &str) -> String {
    if dir.path().is_empty() {
        file.to_string()
    } else {
        format!("{}/{}", dir.path(), file)
    }
}

pub fn load_document(
    dir: &TransactionalDirectory<'_>,
    file: &str,
) -> Result<SExpression, MigrationError> {
    let label = file_label(dir, file);
    let content = dir.read(file)?;
    let text = String::from_utf8(content).map_err(|_| MigrationError::Encoding {
        file: label.clone(),
    })?;
    SExpression::parse(&text).map_err(|source| MigrationError::Parse {
        file: label,
        source,
    })
}

pub fn save_document(
    dir: &mut TransactionalDirectory<'_>,
    file: &str,
    root: &SExpression,
) -> Result<(), MigrationError> {
    dir.write(file, root.to_file_bytes())?;
    Ok(())
}

/// Load a document, transform it and stage the result.
pub fn rewrite_document<F>(
    dir: &mut TransactionalDirectory<'_>,
    file: &str,
    transform: F,
) -> Result<(), MigrationError>
where
    F: FnOnce(&mut SExpression, &str) -> Result<(), MigrationError>,
{
    let label = file_label(dir, file);
    let mut root = load_document(dir, file)?;
    transform(&mut root, &label)?;
    save_document(dir, file, &root)
}

pub fn upgrade_version_file(
    dir: &mut TransactionalDirectory<'_>,
    file: &str,
    to: &Version,
) -> Result<(), MigrationError> {
    dir.write(file, format!("{}\n", to).into_bytes())?;
    Ok(())
}

/// Upgrade every element of a project's embedded library with `step`.
pub fn upgrade_project_library(
    step: &MigrationStep,
    dir: &mut TransactionalDirectory<'_>,
    ctx: &mut StepContext,
) -> Result<(), MigrationError> {
    for category in Category::LIBRARY_ELEMENTS {
        let Some(name) = category.dir_name() else {
            continue;
        };
        let parent = format!("library/{}", name);
        for uuid in dir.dirs(&parent)? {
            let mut element = dir.subdir(&format!("{}/{}", parent, uuid))?;
            if element.file_exists(category.version_file()) {
                step.upgrade(category, &mut element, ctx)?;
            }
        }
    }
    Ok(())
}

/// Paths listed as `(tag "path")` entries of an index document such as `boards/boards.lp`.
pub fn listed_files(
    dir: &TransactionalDirectory<'_>,
    file: &str,
    tag: &str,
) -> Result<Vec<String>, MigrationError> {
    let label = file_label(dir, file);
    let root = load_document(dir, file)?;
    root.children_named(tag)
        .map(|entry| entry.deserialize::<String>("@0"))
        .collect::<Result<Vec<_>, _>>()
        .in_file(&label)
}

/// `(grid (type lines) (interval 2.54) (unit millimeters))` →
/// `(grid (interval 2.54) (unit millimeters))`.
pub fn upgrade_grid(grid: &mut SExpression) -> Result<(), SchemaError> {
    grid.remove_children_named("type");
    grid.get_child("interval")?;
    if grid.try_get_child("unit").is_none() {
        grid.append_child(SExpression::list("unit").with_child(SExpression::token("millimeters")))?;
    }
    Ok(())
}

/// Rewrite all `hole` children of `node` into the vertex based representation:
///
/// ```text
/// (hole <uuid> (diameter d) (position x y))
/// (hole <uuid> (diameter d) (stop_mask auto)
///  (vertex (position x y) (angle 0.0))
/// )
/// ```
pub fn upgrade_holes(node: &mut SExpression) -> Result<(), SchemaError> {
    for hole in node.children_named_mut("hole") {
        if hole.try_get_child("vertex").is_some() {
            continue;
        }
        let uuid = hole.get_child("@0")?.clone();
        let diameter = hole.get_child("diameter")?.clone();
        let position = hole.get_child("position")?.clone();
        *hole = new_hole(uuid, diameter, position);
    }
    Ok(())
}

/// A hole with a single vertex at `position`.
pub fn new_hole(uuid: SExpression, diameter: SExpression, position: SExpression) -> SExpression {
    SExpression::list("hole")
        .with_child(uuid)
        .with_child(diameter)
        .with_child(SExpression::list("stop_mask").with_child(SExpression::token("auto")))
        .with_child(SExpression::line_break())
        .with_child(
            SExpression::list("vertex")
                .with_child(position)
                .with_child(SExpression::list("angle").with_child(SExpression::token("0.0"))),
        )
        .with_child(SExpression::line_break())
}

/// Canonicalize `name`, `description` and `keywords` and add the `generated_by` entry.
///
/// A missing name is an error; description and keywords are optional.
pub fn upgrade_metadata(root: &mut SExpression) -> Result<(), SchemaError> {
    LocalizedNameMap::from_sexpression(root)?.replace_in(root)?;
    if root.try_get_child("description").is_some() {
        LocalizedDescriptionMap::from_sexpression(root)?.replace_in(root)?;
    }
    if root.try_get_child("keywords").is_some() {
        LocalizedKeywordsMap::from_sexpression(root)?.replace_in(root)?;
    }
    if root.try_get_child("generated_by").is_none() {
        root.insert_after(
            "deprecated",
            SExpression::list("generated_by").with_child(SExpression::string("")),
        )?;
    }
    Ok(())
}

/// Add `(name value)` as token unless a child with that name exists. The new child goes
/// onto the last line of `node`.
pub fn ensure_token(node: &mut SExpression, name: &str, value: &str) -> Result<(), SchemaError> {
    if node.try_get_child(name).is_some() {
        return Ok(());
    }
    node.append_inline(SExpression::list(name).with_child(SExpression::token(value)))
}

/// `(name v1 v2 ...)` with unquoted values.
pub fn tokens(name: &str, values: &[&str]) -> SExpression {
    values.iter().fold(SExpression::list(name), |node, value| {
        node.with_child(SExpression::token(*value))
    })
}

/// Put `child` on a line of its own at the end of `node`.
pub fn append_line(node: &mut SExpression, child: SExpression) -> Result<(), SchemaError> {
    node.ensure_line_break()?;
    node.append_child(child)?;
    node.ensure_line_break()
}

/// Parse a length in millimeters into nanometers.
pub fn parse_nanometers(text: &str) -> Result<i64, SchemaError> {
    let invalid = || SchemaError::InvalidValue {
        expected: "length",
        value: text.to_string(),
        reason: "expected a decimal number with at most 6 fractional digits".to_string(),
    };
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if (int_part.is_empty() && frac_part.is_empty())
        || frac_part.len() > 6
        || !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    let int_value: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().map_err(|_| invalid())?
    };
    let frac_value: i64 = format!("{:0<6}", frac_part).parse().map_err(|_| invalid())?;
    let value = int_value
        .checked_mul(1_000_000)
        .and_then(|v| v.checked_add(frac_value))
        .ok_or_else(invalid)?;
    Ok(if negative { -value } else { value })
}

/// Format nanometers as millimeters with at least one fractional digit (`3.81`, `0.0`).
pub fn format_millimeters(nanometers: i64) -> String {
    let sign = if nanometers < 0 { "-" } else { "" };
    let abs = nanometers.unsigned_abs();
    let frac = format!("{:06}", abs % 1_000_000);
    let frac = frac.trim_end_matches('0');
    format!(
        "{}{}.{}",
        sign,
        abs / 1_000_000,
        if frac.is_empty() { "0" } else { frac }
    )
}
