//! Upgrade from file format 0.1 to 0.2.

use std::collections::{HashMap, HashSet};

use super::helpers::{
    append_line, ensure_token, format_millimeters, listed_files, new_hole, parse_nanometers,
    rewrite_document, tokens, upgrade_grid, upgrade_holes, upgrade_metadata,
    upgrade_project_library, upgrade_version_file,
};
use super::index::CrossReferenceIndex;
use super::{Category, CategoryUpgrades, MigrationError, MigrationStep, SchemaContext, StepContext};
use crate::fs::TransactionalDirectory;
use crate::geometry::TraceAnchor;
use crate::serialization::{FromSExpression, SExpression, SchemaError, ToSExpression};
use crate::types::{Uuid, Version};

/// Distance between the end of a pin and its name.
const PIN_NAME_OFFSET_NM: i64 = 1_270_000;

pub fn step() -> MigrationStep {
    MigrationStep::new(
        Version::new(&[0, 1]),
        Version::new(&[0, 2]),
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

type UpgradeResult = Result<(), MigrationError>;

fn upgrade_element(
    category: Category,
    dir: &mut TransactionalDirectory<'_>,
    ctx: &StepContext,
    transform: fn(&mut SExpression, &str) -> UpgradeResult,
) -> UpgradeResult {
    upgrade_version_file(dir, category.version_file(), ctx.target())?;
    rewrite_document(dir, category.main_file(), transform)
}

fn metadata_only(root: &mut SExpression, file: &str) -> UpgradeResult {
    upgrade_metadata(root).in_file(file)
}

fn upgrade_component_category(
    dir: &mut TransactionalDirectory<'_>,
    ctx: &mut StepContext,
) -> UpgradeResult {
    upgrade_element(Category::ComponentCategory, dir, ctx, metadata_only)
}

fn upgrade_package_category(
    dir: &mut TransactionalDirectory<'_>,
    ctx: &mut StepContext,
) -> UpgradeResult {
    upgrade_element(Category::PackageCategory, dir, ctx, metadata_only)
}

fn upgrade_symbol(dir: &mut TransactionalDirectory<'_>, ctx: &mut StepContext) -> UpgradeResult {
    upgrade_element(Category::Symbol, dir, ctx, |root, file| {
        upgrade_symbol_document(root).in_file(file)
    })
}

fn upgrade_package(dir: &mut TransactionalDirectory<'_>, ctx: &mut StepContext) -> UpgradeResult {
    upgrade_element(Category::Package, dir, ctx, |root, file| {
        upgrade_package_document(root).in_file(file)
    })
}

fn upgrade_component(dir: &mut TransactionalDirectory<'_>, ctx: &mut StepContext) -> UpgradeResult {
    upgrade_element(Category::Component, dir, ctx, upgrade_component_document)
}

fn upgrade_device(dir: &mut TransactionalDirectory<'_>, ctx: &mut StepContext) -> UpgradeResult {
    upgrade_element(Category::Device, dir, ctx, metadata_only)
}

fn upgrade_library(dir: &mut TransactionalDirectory<'_>, ctx: &mut StepContext) -> UpgradeResult {
    upgrade_element(Category::Library, dir, ctx, metadata_only)
}

fn upgrade_symbol_document(root: &mut SExpression) -> Result<(), SchemaError> {
    upgrade_metadata(root)?;
    if let Some(grid) = root.try_get_child_mut("grid") {
        upgrade_grid(grid)?;
    }
    for pin in root.children_named_mut("pin") {
        if pin.try_get_child("name_position").is_some() {
            continue;
        }
        let length = pin.get_child("length/@0")?.value()?;
        let name_x = parse_nanometers(length)?
            .checked_add(PIN_NAME_OFFSET_NM)
            .map(format_millimeters)
            .ok_or_else(|| SchemaError::InvalidValue {
                expected: "length",
                value: length.to_string(),
                reason: "pin is too long".to_string(),
            })?;
        pin.ensure_line_break()?;
        pin.append_child(tokens("name_position", &[name_x.as_str(), "0.0"]))?;
        pin.append_child(tokens("name_rotation", &["0.0"]))?;
        pin.append_child(tokens("name_height", &["2.5"]))?;
        pin.append_child(tokens("name_align", &["left", "center"]))?;
        pin.ensure_line_break()?;
    }
    for tag in ["text", "polygon", "circle"] {
        for node in root.children_named_mut(tag) {
            ensure_token(node, "lock", "false")?;
        }
    }
    Ok(())
}

fn upgrade_package_document(root: &mut SExpression) -> Result<(), SchemaError> {
    upgrade_metadata(root)?;
    for footprint in root.children_named_mut("footprint") {
        for pad in footprint.children_named_mut("pad") {
            upgrade_footprint_pad(pad)?;
        }
        upgrade_holes(footprint)?;
    }
    Ok(())
}

fn upgrade_footprint_pad(pad: &mut SExpression) -> Result<(), SchemaError> {
    if pad.try_get_child("package_pad").is_none() {
        let uuid = pad.get_child("@0")?.clone();
        pad.append_inline(SExpression::list("package_pad").with_child(uuid))?;
    }
    if let Some(side) = pad.try_get_child_mut("side/@0") {
        if side.value()? == "tht" {
            side.set_value("top")?;
        }
    }
    if let Some(drill) = pad.try_get_child("drill/@0").cloned() {
        let diameter = parse_nanometers(drill.value()?)?;
        pad.remove_children_named("drill");
        if diameter != 0 {
            let hole = new_hole(
                Uuid::create_random().to_sexpression(),
                SExpression::list("diameter").with_child(drill),
                tokens("position", &["0.0", "0.0"]),
            );
            append_line(pad, hole)?;
        }
    }
    Ok(())
}

fn upgrade_component_document(root: &mut SExpression, file: &str) -> UpgradeResult {
    upgrade_metadata(root).in_file(file)?;
    let signals = uuids_of(root, "signal").in_file(file)?;
    for variant in root.children_named_mut("variant") {
        for gate in variant.children_named_mut("gate") {
            for pin in gate.children_named_mut("pin") {
                let signal: Option<Uuid> = pin.deserialize("signal/@0").in_file(file)?;
                if let Some(signal) = signal {
                    if !signals.contains(&signal) {
                        return Err(broken(file, "component signal", signal));
                    }
                }
                if let Some(text) = pin.try_get_child_mut("text/@0") {
                    upgrade_pin_text(text).in_file(file)?;
                }
            }
        }
    }
    Ok(())
}

fn upgrade_pin_text(text: &mut SExpression) -> Result<(), SchemaError> {
    if matches!(text, SExpression::String(_)) {
        return Ok(());
    }
    let replacement = match text.value()? {
        "pin" => "{{PIN}}",
        "signal" => "{{SIGNAL}}",
        "pin_signal" => "{{PIN}}:{{SIGNAL}}",
        "none" => "",
        other => {
            return Err(SchemaError::InvalidValue {
                expected: "pin text",
                value: other.to_string(),
                reason: "expected pin, signal, pin_signal or none".to_string(),
            })
        }
    };
    *text = SExpression::string(replacement);
    Ok(())
}

fn upgrade_project(dir: &mut TransactionalDirectory<'_>, ctx: &mut StepContext) -> UpgradeResult {
    // All lookups read the files as they were before this step.
    let index = CrossReferenceIndex::scan_project(dir)?;

    upgrade_version_file(dir, Category::Project.version_file(), ctx.target())?;
    upgrade_project_library(&step(), dir, ctx)?;

    if dir.file_exists("project/settings.lp") {
        rewrite_document(dir, "project/settings.lp", |root, file| {
            if root.try_get_child("default_lock_component_assembly").is_none() {
                append_line(root, tokens("default_lock_component_assembly", &["false"]))
                    .in_file(file)?;
            }
            Ok(())
        })?;
    }

    if dir.file_exists("circuit/circuit.lp") {
        rewrite_document(dir, "circuit/circuit.lp", upgrade_circuit)?;
    }

    if dir.file_exists("schematics/schematics.lp") {
        for path in listed_files(dir, "schematics/schematics.lp", "schematic")? {
            rewrite_document(dir, &path, |root, file| {
                upgrade_schematic(root, file, &index, ctx)
            })?;
        }
    }

    if dir.file_exists("boards/boards.lp") {
        for path in listed_files(dir, "boards/boards.lp", "board")? {
            let mut planes = HashSet::new();
            rewrite_document(dir, &path, |root, file| {
                planes = upgrade_board(root, file, &index)?;
                Ok(())
            })?;
            let settings = sibling(&path, "settings.user.lp");
            if dir.file_exists(&settings) {
                rewrite_document(dir, &settings, |root, file| {
                    upgrade_board_user_settings(root, file, &planes, ctx)
                })?;
            }
        }
    }
    Ok(())
}

fn upgrade_circuit(root: &mut SExpression, file: &str) -> UpgradeResult {
    let nets = uuids_of(root, "netsignal").in_file(file)?;
    for component in root.children_named_mut("component") {
        for signal in component.children_named_mut("signal") {
            let net: Option<Uuid> = signal.deserialize("net/@0").in_file(file)?;
            if let Some(net) = net {
                if !nets.contains(&net) {
                    return Err(broken(file, "net signal", net));
                }
            }
        }
        if component.try_get_child("lock_assembly").is_none() {
            append_line(component, tokens("lock_assembly", &["false"])).in_file(file)?;
        }
    }
    Ok(())
}

fn upgrade_schematic(
    root: &mut SExpression,
    file: &str,
    index: &CrossReferenceIndex,
    ctx: &mut StepContext,
) -> UpgradeResult {
    if let Some(grid) = root.try_get_child_mut("grid") {
        upgrade_grid(grid).in_file(file)?;
    }
    for symbol in root.children_named_mut("symbol") {
        let uuid: Uuid = symbol.deserialize("@0").in_file(file)?;
        let component: Uuid = symbol.deserialize("component/@0").in_file(file)?;
        let gate: Uuid = symbol.deserialize("lib_gate/@0").in_file(file)?;
        let linked = symbol
            .try_get_child("lib_symbol/@0")
            .map(Uuid::from_sexpression)
            .transpose()
            .in_file(file)?;

        let (resolved, summary) = index
            .resolve_gate_symbol(component, gate)
            .map_err(|unresolved| broken(file, unresolved.kind(), unresolved.uuid()))?;
        if let Some(linked) = linked.filter(|linked| *linked != resolved) {
            ctx.warn(
                file,
                format!(
                    "symbol {} linked library symbol {} but its gate resolves to {}, link dropped",
                    uuid, linked, resolved
                ),
            );
        }
        symbol.remove_children_named("lib_symbol");
        if symbol.try_get_child("text").is_none() {
            for text in &summary.texts {
                append_line(symbol, text.to_instance_node(Uuid::create_random())).in_file(file)?;
            }
        }
    }
    for segment in root.children_named_mut("netsegment") {
        segment.rename_children("netpoint", "junction");
        segment.rename_children("netline", "line");
        for line in segment.children_named_mut("line") {
            for end in ["from", "to"] {
                if let Some(anchor) = line.try_get_child_mut(end) {
                    anchor.rename_children("netpoint", "junction");
                }
            }
        }
    }
    Ok(())
}

/// Returns the planes of the board, needed to clean up the user settings.
fn upgrade_board(
    root: &mut SExpression,
    file: &str,
    index: &CrossReferenceIndex,
) -> Result<HashSet<Uuid>, MigrationError> {
    if let Some(grid) = root.try_get_child_mut("grid") {
        upgrade_grid(grid).in_file(file)?;
    }
    upgrade_holes(root).in_file(file)?;
    let devices = library_devices(root).in_file(file)?;
    let planes = uuids_of(root, "plane").in_file(file)?;
    for segment in root.children_named_mut("netsegment") {
        segment.rename_children("netpoint", "junction");
        segment.rename_children("netline", "trace");
        let junctions = uuids_of(segment, "junction").in_file(file)?;
        let vias = uuids_of(segment, "via").in_file(file)?;
        for trace in segment.children_named_mut("trace") {
            for end in ["from", "to"] {
                let node = trace.get_child_mut(end).in_file(file)?;
                node.rename_children("netpoint", "junction");
                let anchor = TraceAnchor::from_sexpression(node).in_file(file)?;
                match anchor {
                    TraceAnchor::Junction(uuid) if !junctions.contains(&uuid) => {
                        return Err(broken(file, "junction", uuid));
                    }
                    TraceAnchor::Via(uuid) if !vias.contains(&uuid) => {
                        return Err(broken(file, "via", uuid));
                    }
                    TraceAnchor::Pad { device, pad } => {
                        let lib_device = devices
                            .get(&device)
                            .ok_or_else(|| broken(file, "device", device))?;
                        index.resolve_device_pad(*lib_device, pad).map_err(|unresolved| {
                            broken(file, unresolved.kind(), unresolved.uuid())
                        })?;
                    }
                    _ => {}
                }
                *node = anchor.to_node(end).in_file(file)?;
            }
        }
    }
    Ok(planes)
}

/// Board device uuid to library device uuid.
fn library_devices(root: &SExpression) -> Result<HashMap<Uuid, Uuid>, SchemaError> {
    let mut devices = HashMap::new();
    for device in root.children_named("device") {
        devices.insert(device.deserialize("@0")?, device.deserialize("lib_device/@0")?);
    }
    Ok(devices)
}

fn upgrade_board_user_settings(
    root: &mut SExpression,
    file: &str,
    planes: &HashSet<Uuid>,
    ctx: &mut StepContext,
) -> UpgradeResult {
    let mut kept = Vec::new();
    for plane in root.children_named("plane") {
        let uuid: Uuid = plane.deserialize("@0").in_file(file)?;
        if planes.contains(&uuid) {
            kept.push(plane.clone());
            kept.push(SExpression::line_break());
        } else {
            ctx.warn(file, format!("dropped settings of unknown plane {}", uuid));
        }
    }
    if kept.len() / 2 != root.children_named("plane").count() {
        root.replace_children_named("plane", kept).in_file(file)?;
    }
    Ok(())
}

fn upgrade_workspace_data(
    dir: &mut TransactionalDirectory<'_>,
    ctx: &mut StepContext,
) -> UpgradeResult {
    upgrade_element(Category::WorkspaceData, dir, ctx, |root, _| {
        upgrade_workspace_settings(root);
        Ok(())
    })
}

fn upgrade_workspace_settings(root: &mut SExpression) {
    root.remove_children_named("use_opengl");
    for repositories in root.children_named_mut("repositories") {
        repositories.rename_children("repository", "url");
    }
    root.rename_children("repositories", "api_endpoints");
}

fn uuids_of(node: &SExpression, tag: &str) -> Result<HashSet<Uuid>, SchemaError> {
    node.children_named(tag)
        .map(|child| child.deserialize::<Uuid>("@0"))
        .collect()
}

fn sibling(path: &str, name: &str) -> String {
    match path.rsplit_once('/') {
        Some((parent, _)) => format!("{}/{}", parent, name),
        None => name.to_string(),
    }
}

fn broken(file: &str, kind: &'static str, uuid: Uuid) -> MigrationError {
    MigrationError::BrokenReference {
        file: file.to_string(),
        kind,
        uuid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::index::{
        ComponentInstanceSummary, ComponentSummary, DeviceSummary, Gate, SymbolSummary,
        SymbolVariant, Text,
    };

    const A: &str = "0a1b2c3d-4e5f-4a6b-8c7d-8e9f0a1b2c3d";
    const B: &str = "1b2c3d4e-5f60-4718-9a2b-3c4d5e6f7a8b";
    const C: &str = "2c3d4e5f-6071-4829-ab3c-4d5e6f7a8b9c";
    const D: &str = "3d4e5f60-7182-493a-bc4d-5e6f7a8b9cad";
    const E: &str = "4e5f6071-8293-4a4b-8d5e-6f7a8b9cadbe";

    fn parse(text: &str) -> SExpression {
        SExpression::parse(text).unwrap()
    }

    fn uuid(text: &str) -> Uuid {
        text.parse().unwrap()
    }

    #[test]
    fn test_symbol_pins_and_lock() {
        let mut root = parse(&format!(
            "(librepcb_symbol {}\n (name \"R\")\n (deprecated false)\n \
             (grid (type lines) (interval 2.54) (unit millimeters))\n \
             (pin {} (name \"1\") (position -5.08 0.0) (rotation 0.0) (length 2.54))\n \
             (text {} (layer sym_names) (value \"{{{{NAME}}}}\") (align center bottom) (height 2.5) (position 0.0 3.81) (rotation 0.0))\n)",
            A, B, C
        ));
        upgrade_symbol_document(&mut root).unwrap();
        assert_eq!(
            root.get_child("grid").unwrap().to_string(),
            "(grid (interval 2.54) (unit millimeters))"
        );
        let pin = root.get_child("pin").unwrap();
        assert_eq!(pin.get_child("name_position/@0").unwrap().value().unwrap(), "3.81");
        assert_eq!(pin.get_child("name_align/@1").unwrap().value().unwrap(), "center");
        assert_eq!(
            root.get_child("text/lock/@0").unwrap().value().unwrap(),
            "false"
        );
        assert!(root.try_get_child("generated_by").is_some());
    }

    #[test]
    fn test_pin_length_at_limit() {
        let mut root = parse(&format!(
            "(librepcb_symbol {}\n (name \"R\")\n \
             (pin {} (name \"1\") (position 0.0 0.0) (rotation 0.0) (length 9223372036854.775807))\n)",
            A, B
        ));
        let err = upgrade_symbol_document(&mut root).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidValue { expected: "length", .. }));
    }

    #[test]
    fn test_package_pads_and_drills() {
        let mut root = parse(&format!(
            "(librepcb_package {}\n (name \"P\")\n (deprecated false)\n \
             (pad {} (name \"1\"))\n (pad {} (name \"2\"))\n \
             (footprint {}\n  \
             (pad {} (side tht) (shape round) (position 0.0 0.0) (rotation 0.0) (size 1.5 1.5) (drill 0.8))\n  \
             (pad {} (side top) (shape rect) (position 2.54 0.0) (rotation 0.0) (size 1.0 1.0) (drill 0.0))\n  \
             (hole {} (diameter 3.2) (position 0.0 5.0))\n \
             )\n)",
            A, B, C, D, B, C, E
        ));
        upgrade_package_document(&mut root).unwrap();
        let footprint = root.get_child("footprint").unwrap();
        let pads: Vec<&SExpression> = footprint.children_named("pad").collect();
        assert_eq!(pads[0].get_child("package_pad/@0").unwrap().value().unwrap(), B);
        assert_eq!(pads[0].get_child("side/@0").unwrap().value().unwrap(), "top");
        assert!(pads[0].try_get_child("drill").is_none());
        let hole = pads[0].get_child("hole").unwrap();
        assert!(Uuid::is_valid(hole.get_child("@0").unwrap().value().unwrap()));
        assert_eq!(hole.get_child("diameter/@0").unwrap().value().unwrap(), "0.8");
        assert_eq!(hole.get_child("vertex/position/@1").unwrap().value().unwrap(), "0.0");
        assert!(pads[1].try_get_child("drill").is_none());
        assert!(pads[1].try_get_child("hole").is_none());
        assert_eq!(
            footprint.get_child("hole/stop_mask/@0").unwrap().value().unwrap(),
            "auto"
        );
        assert_eq!(
            footprint.get_child("hole/vertex/position/@1").unwrap().value().unwrap(),
            "5.0"
        );
    }

    #[test]
    fn test_component_pin_texts() {
        let mut root = parse(&format!(
            "(librepcb_component {}\n (name \"C\")\n (deprecated false)\n \
             (signal {} (name \"1\"))\n \
             (variant {}\n  (gate {} (symbol {})\n   (pin {} (signal {}) (text pin_signal))\n   (pin {} (signal none) (text none))\n  )\n )\n)",
            A, B, C, D, E, A, B, C
        ));
        upgrade_component_document(&mut root, "cmp/component.lp").unwrap();
        let texts: Vec<String> = root
            .get_child("variant/gate")
            .unwrap()
            .children_named("pin")
            .map(|pin| pin.get_child("text/@0").unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["\"{{PIN}}:{{SIGNAL}}\"", "\"\""]);
    }

    #[test]
    fn test_component_unknown_signal_is_fatal() {
        let mut root = parse(&format!(
            "(librepcb_component {} (name \"C\")\n (variant {} (gate {} (symbol {}) (pin {} (signal {}) (text pin))))\n)",
            A, B, C, D, E, C
        ));
        let err = upgrade_component_document(&mut root, "cmp/component.lp").unwrap_err();
        assert!(matches!(
            err,
            MigrationError::BrokenReference { kind: "component signal", uuid: missing, .. }
                if missing == uuid(C)
        ));
    }

    #[test]
    fn test_pin_text_rejects_unknown_value() {
        let mut text = SExpression::token("pinname");
        assert!(upgrade_pin_text(&mut text).is_err());
    }

    fn index() -> CrossReferenceIndex {
        let mut index = CrossReferenceIndex::default();
        index.component_instances.insert(
            uuid(A),
            ComponentInstanceSummary {
                lib_component: uuid(B),
                lib_variant: uuid(C),
            },
        );
        index.components.insert(
            uuid(B),
            ComponentSummary {
                variants: vec![SymbolVariant {
                    uuid: uuid(C),
                    gates: vec![Gate {
                        uuid: uuid(D),
                        symbol: uuid(E),
                    }],
                }],
            },
        );
        index.symbols.insert(
            uuid(E),
            SymbolSummary {
                texts: vec![Text {
                    layer: "sym_names".to_string(),
                    value: "{{NAME}}".to_string(),
                    align: ("center".to_string(), "bottom".to_string()),
                    height: "2.5".to_string(),
                    position: ("0.0".to_string(), "3.81".to_string()),
                    rotation: "0.0".to_string(),
                }],
            },
        );
        index
    }

    #[test]
    fn test_schematic_symbol_resolution() {
        let mut root = parse(&format!(
            "(librepcb_schematic {}\n (grid (type lines) (interval 2.54) (unit millimeters))\n \
             (symbol {} (component {}) (lib_gate {}) (lib_symbol {})\n  (position 0.0 0.0) (rotation 0.0) (mirror false)\n )\n \
             (netsegment {}\n  (netpoint {} (position 1.0 1.0))\n  (netline {} (width 0.16) (from (netpoint {})) (to (symbol {}) (pin {})))\n )\n)",
            B, C, A, D, E, B, C, D, C, C, E
        ));
        let mut ctx = StepContext::new(Version::new(&[0, 2]));
        upgrade_schematic(&mut root, "schematics/main/schematic.lp", &index(), &mut ctx).unwrap();
        assert!(ctx.warnings().is_empty());
        let symbol = root.get_child("symbol").unwrap();
        assert!(symbol.try_get_child("lib_symbol").is_none());
        assert_eq!(symbol.get_child("text/value/@0").unwrap().value().unwrap(), "{{NAME}}");
        let segment = root.get_child("netsegment").unwrap();
        assert!(segment.try_get_child("junction").is_some());
        assert_eq!(
            segment.get_child("line/from/junction/@0").unwrap().value().unwrap(),
            C
        );
    }

    #[test]
    fn test_schematic_stale_symbol_link_warns() {
        let mut root = parse(&format!(
            "(librepcb_schematic {}\n (symbol {} (component {}) (lib_gate {}) (lib_symbol {}))\n)",
            B, C, A, D, B
        ));
        let mut ctx = StepContext::new(Version::new(&[0, 2]));
        upgrade_schematic(&mut root, "s.lp", &index(), &mut ctx).unwrap();
        assert_eq!(ctx.warnings().len(), 1);
        assert!(root.get_child("symbol").unwrap().try_get_child("lib_symbol").is_none());
    }

    #[test]
    fn test_schematic_unresolved_gate_is_fatal() {
        let mut root = parse(&format!(
            "(librepcb_schematic {}\n (symbol {} (component {}) (lib_gate {}))\n)",
            B, C, A, B
        ));
        let mut ctx = StepContext::new(Version::new(&[0, 2]));
        let err = upgrade_schematic(&mut root, "s.lp", &index(), &mut ctx).unwrap_err();
        assert!(matches!(err, MigrationError::BrokenReference { kind: "gate", .. }));
    }

    fn board_index() -> CrossReferenceIndex {
        let mut index = CrossReferenceIndex::default();
        index.devices.insert(
            uuid(C),
            DeviceSummary {
                pads: HashSet::from([uuid(D)]),
            },
        );
        index
    }

    fn board_with_pad_trace(pad: &str) -> SExpression {
        parse(&format!(
            "(librepcb_board {}\n (device {} (lib_device {}))\n \
             (netsegment {}\n  (netpoint {} (position 1.0 0.0))\n  \
             (netline {} (from (device {}) (pad {})) (to (netpoint {})))\n )\n)",
            A, B, C, E, A, D, B, pad, A
        ))
    }

    #[test]
    fn test_board_anchors() {
        let mut root = parse(&format!(
            "(librepcb_board {}\n (device {} (lib_device {}))\n (plane {} (layer top_cu))\n \
             (netsegment {}\n  (via {} (position 0.0 0.0))\n  (netpoint {} (position 1.0 0.0))\n  \
             (netline {} (from (netpoint {})) (to (via {})))\n  \
             (netline {} (from (device {}) (pad {})) (to (netpoint {})))\n )\n)",
            A, B, C, D, E, A, C, D, C, A, E, B, D, C
        ));
        let planes = upgrade_board(&mut root, "boards/default/board.lp", &board_index()).unwrap();
        assert_eq!(planes, HashSet::from([uuid(D)]));
        let segment = root.get_child("netsegment").unwrap();
        let traces: Vec<&SExpression> = segment.children_named("trace").collect();
        assert_eq!(traces.len(), 2);
        assert_eq!(
            TraceAnchor::from_sexpression(traces[0].get_child("from").unwrap()).unwrap(),
            TraceAnchor::junction(uuid(C))
        );
        assert_eq!(
            TraceAnchor::from_sexpression(traces[1].get_child("from").unwrap()).unwrap(),
            TraceAnchor::pad(uuid(B), uuid(D))
        );
    }

    #[test]
    fn test_board_missing_junction_is_fatal() {
        let mut root = parse(&format!(
            "(librepcb_board {}\n (netsegment {}\n  (netline {} (from (netpoint {})) (to (netpoint {})))\n )\n)",
            A, B, C, D, D
        ));
        let err = upgrade_board(&mut root, "board.lp", &board_index()).unwrap_err();
        assert!(matches!(err, MigrationError::BrokenReference { kind: "junction", .. }));
    }

    #[test]
    fn test_board_ambiguous_anchor_is_schema_error() {
        let mut root = parse(&format!(
            "(librepcb_board {}\n (netsegment {}\n  (via {} (position 0.0 0.0))\n  (netline {} (from (via {}) (netpoint {})) (to (via {})))\n )\n)",
            A, B, C, D, C, C, C
        ));
        let err = upgrade_board(&mut root, "board.lp", &board_index()).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::Schema { source: SchemaError::InvalidVariant { .. }, .. }
        ));
    }

    #[test]
    fn test_board_pad_anchor_resolves_through_library_device() {
        let mut root = board_with_pad_trace(D);
        upgrade_board(&mut root, "board.lp", &board_index()).unwrap();
        assert_eq!(
            root.get_child("netsegment/trace/from/pad/@0").unwrap().value().unwrap(),
            D
        );
    }

    #[test]
    fn test_board_unknown_pad_is_fatal() {
        let mut root = board_with_pad_trace(E);
        let err = upgrade_board(&mut root, "board.lp", &board_index()).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::BrokenReference { kind: "pad", uuid: missing, .. } if missing == uuid(E)
        ));
    }

    #[test]
    fn test_board_device_missing_from_library_is_fatal() {
        let mut root = board_with_pad_trace(D);
        let index = CrossReferenceIndex::default();
        let err = upgrade_board(&mut root, "board.lp", &index).unwrap_err();
        assert!(matches!(
            err,
            MigrationError::BrokenReference { kind: "library device", uuid: missing, .. }
                if missing == uuid(C)
        ));
    }

    #[test]
    fn test_board_user_settings_drop_stale_planes() {
        let mut root = parse(&format!(
            "(librepcb_board_user_settings\n (plane {} (visible true))\n (plane {} (visible false))\n)",
            A, B
        ));
        let mut ctx = StepContext::new(Version::new(&[0, 2]));
        let planes = HashSet::from([uuid(A)]);
        upgrade_board_user_settings(&mut root, "settings.user.lp", &planes, &mut ctx)
            .unwrap();
        assert_eq!(
            root.to_string(),
            format!("(librepcb_board_user_settings\n (plane {} (visible true))\n)", A)
        );
        assert_eq!(ctx.warnings().len(), 1);
    }

    #[test]
    fn test_circuit() {
        let mut root = parse(&format!(
            "(librepcb_circuit\n (netsignal {} (name \"GND\"))\n \
             (component {}\n  (lib_component {})\n  (lib_variant {})\n  (signal {} (net {}))\n )\n)",
            A, B, C, D, E, A
        ));
        upgrade_circuit(&mut root, "circuit/circuit.lp").unwrap();
        assert_eq!(
            root.get_child("component/lock_assembly/@0").unwrap().value().unwrap(),
            "false"
        );
        root.get_child_mut("netsignal/@0").unwrap().set_value(B).unwrap();
        assert!(matches!(
            upgrade_circuit(&mut root, "circuit/circuit.lp"),
            Err(MigrationError::BrokenReference { kind: "net signal", .. })
        ));
    }

    #[test]
    fn test_workspace_settings() {
        let mut root = parse(
            "(librepcb_workspace_settings\n (user \"me\")\n (use_opengl false)\n \
             (repositories\n  (repository \"https://api.librepcb.org\")\n )\n)",
        );
        upgrade_workspace_settings(&mut root);
        assert_eq!(
            root.to_string(),
            "(librepcb_workspace_settings\n (user \"me\")\n \
             (api_endpoints\n  (url \"https://api.librepcb.org\")\n )\n)"
        );
    }

    #[test]
    fn test_sibling_path() {
        assert_eq!(
            sibling("boards/default/board.lp", "settings.user.lp"),
            "boards/default/settings.user.lp"
        );
        assert_eq!(sibling("board.lp", "x"), "x");
    }
}
