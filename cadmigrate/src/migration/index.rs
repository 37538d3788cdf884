//! Lookup tables built by a scan pass before anything is rewritten.
//!
//! Lives only as long as one step invocation on one project.

use std::collections::{BTreeMap, HashMap, HashSet};

use super::helpers::{file_label, load_document, tokens};
use super::{MigrationError, SchemaContext};
use crate::fs::TransactionalDirectory;
use crate::serialization::{SExpression, SchemaError};
use crate::types::Uuid;

/// Text of a library symbol, copied into every schematic instance of the symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub layer: String,
    pub value: String,
    pub align: (String, String),
    pub height: String,
    pub position: (String, String),
    pub rotation: String,
}

impl Text {
    fn from_sexpression(node: &SExpression) -> Result<Self, SchemaError> {
        Ok(Self {
            layer: node.deserialize("layer/@0")?,
            value: node.deserialize("value/@0")?,
            align: (node.deserialize("align/@0")?, node.deserialize("align/@1")?),
            height: node.deserialize("height/@0")?,
            position: (
                node.deserialize("position/@0")?,
                node.deserialize("position/@1")?,
            ),
            rotation: node.deserialize("rotation/@0")?,
        })
    }

    /// `(text <uuid> (layer ..) (value ..) ...)` as stored in schematics.
    pub fn to_instance_node(&self, uuid: Uuid) -> SExpression {
        SExpression::list("text")
            .with_child(SExpression::token(uuid.to_str()))
            .with_child(tokens("layer", &[self.layer.as_str()]))
            .with_child(
                SExpression::list("value").with_child(SExpression::string(self.value.as_str())),
            )
            .with_child(SExpression::line_break())
            .with_child(tokens("align", &[self.align.0.as_str(), self.align.1.as_str()]))
            .with_child(tokens("height", &[self.height.as_str()]))
            .with_child(tokens("position", &[self.position.0.as_str(), self.position.1.as_str()]))
            .with_child(tokens("rotation", &[self.rotation.as_str()]))
            .with_child(SExpression::line_break())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolSummary {
    pub texts: Vec<Text>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Gate {
    pub uuid: Uuid,
    pub symbol: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolVariant {
    pub uuid: Uuid,
    pub gates: Vec<Gate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentSummary {
    pub variants: Vec<SymbolVariant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInstanceSummary {
    pub lib_component: Uuid,
    pub lib_variant: Uuid,
}

/// Pads a library device connects, by package pad uuid.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSummary {
    pub pads: HashSet<Uuid>,
}

/// Why a reference could not be followed to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    ComponentInstance(Uuid),
    Component(Uuid),
    SymbolVariant(Uuid),
    Gate(Uuid),
    Symbol(Uuid),
    Device(Uuid),
    DevicePad(Uuid),
}

impl Unresolved {
    pub fn kind(self) -> &'static str {
        match self {
            Unresolved::ComponentInstance(_) => "component instance",
            Unresolved::Component(_) => "library component",
            Unresolved::SymbolVariant(_) => "symbol variant",
            Unresolved::Gate(_) => "gate",
            Unresolved::Symbol(_) => "library symbol",
            Unresolved::Device(_) => "library device",
            Unresolved::DevicePad(_) => "pad",
        }
    }

    pub fn uuid(self) -> Uuid {
        match self {
            Unresolved::ComponentInstance(uuid)
            | Unresolved::Component(uuid)
            | Unresolved::SymbolVariant(uuid)
            | Unresolved::Gate(uuid)
            | Unresolved::Symbol(uuid)
            | Unresolved::Device(uuid)
            | Unresolved::DevicePad(uuid) => uuid,
        }
    }
}

#[derive(Debug, Default)]
pub struct CrossReferenceIndex {
    pub symbols: HashMap<Uuid, SymbolSummary>,
    pub components: HashMap<Uuid, ComponentSummary>,
    pub devices: HashMap<Uuid, DeviceSummary>,
    pub component_instances: BTreeMap<Uuid, ComponentInstanceSummary>,
}

impl CrossReferenceIndex {
    /// Scan the project library and the circuit of the project at `dir`.
    pub fn scan_project(dir: &mut TransactionalDirectory<'_>) -> Result<Self, MigrationError> {
        let mut index = Self::default();
        for uuid in dir.dirs("library/sym")? {
            let path = format!("library/sym/{}", uuid);
            let sym_dir = dir.subdir(&path)?;
            index.add_symbol(&sym_dir, "symbol.lp")?;
        }
        for uuid in dir.dirs("library/cmp")? {
            let path = format!("library/cmp/{}", uuid);
            let cmp_dir = dir.subdir(&path)?;
            index.add_component(&cmp_dir, "component.lp")?;
        }
        for uuid in dir.dirs("library/dev")? {
            let path = format!("library/dev/{}", uuid);
            let dev_dir = dir.subdir(&path)?;
            index.add_device(&dev_dir, "device.lp")?;
        }
        if dir.file_exists("circuit/circuit.lp") {
            index.add_circuit(dir, "circuit/circuit.lp")?;
        }
        tracing::debug!(
            symbols = index.symbols.len(),
            components = index.components.len(),
            devices = index.devices.len(),
            component_instances = index.component_instances.len(),
            "Built cross reference index"
        );
        Ok(index)
    }

    pub fn add_symbol(
        &mut self,
        dir: &TransactionalDirectory<'_>,
        file: &str,
    ) -> Result<(), MigrationError> {
        let label = file_label(dir, file);
        let root = load_document(dir, file)?;
        let uuid: Uuid = root.deserialize("@0").in_file(&label)?;
        let texts = root
            .children_named("text")
            .map(Text::from_sexpression)
            .collect::<Result<Vec<_>, _>>()
            .in_file(&label)?;
        self.symbols.insert(uuid, SymbolSummary { texts });
        Ok(())
    }

    pub fn add_component(
        &mut self,
        dir: &TransactionalDirectory<'_>,
        file: &str,
    ) -> Result<(), MigrationError> {
        let label = file_label(dir, file);
        let root = load_document(dir, file)?;
        let summary = Self::component_summary(&root).in_file(&label)?;
        let uuid: Uuid = root.deserialize("@0").in_file(&label)?;
        self.components.insert(uuid, summary);
        Ok(())
    }

    pub fn add_device(
        &mut self,
        dir: &TransactionalDirectory<'_>,
        file: &str,
    ) -> Result<(), MigrationError> {
        let label = file_label(dir, file);
        let root = load_document(dir, file)?;
        let uuid: Uuid = root.deserialize("@0").in_file(&label)?;
        let pads = root
            .children_named("pad")
            .map(|pad| pad.deserialize::<Uuid>("@0"))
            .collect::<Result<HashSet<_>, _>>()
            .in_file(&label)?;
        self.devices.insert(uuid, DeviceSummary { pads });
        Ok(())
    }

    pub fn add_circuit(
        &mut self,
        dir: &TransactionalDirectory<'_>,
        file: &str,
    ) -> Result<(), MigrationError> {
        let label = file_label(dir, file);
        let root = load_document(dir, file)?;
        for instance in root.children_named("component") {
            let uuid: Uuid = instance.deserialize("@0").in_file(&label)?;
            let summary = ComponentInstanceSummary {
                lib_component: instance.deserialize("lib_component/@0").in_file(&label)?,
                lib_variant: instance.deserialize("lib_variant/@0").in_file(&label)?,
            };
            self.component_instances.insert(uuid, summary);
        }
        Ok(())
    }

    fn component_summary(root: &SExpression) -> Result<ComponentSummary, SchemaError> {
        let mut variants = Vec::new();
        for variant in root.children_named("variant") {
            let mut gates = Vec::new();
            for gate in variant.children_named("gate") {
                gates.push(Gate {
                    uuid: gate.deserialize("@0")?,
                    symbol: gate.deserialize("symbol/@0")?,
                });
            }
            variants.push(SymbolVariant {
                uuid: variant.deserialize("@0")?,
                gates,
            });
        }
        Ok(ComponentSummary { variants })
    }

    /// Follow component instance → library component → symbol variant → gate → symbol.
    pub fn resolve_gate_symbol(
        &self,
        component_instance: Uuid,
        gate: Uuid,
    ) -> Result<(Uuid, &SymbolSummary), Unresolved> {
        let instance = self
            .component_instances
            .get(&component_instance)
            .ok_or(Unresolved::ComponentInstance(component_instance))?;
        let component = self
            .components
            .get(&instance.lib_component)
            .ok_or(Unresolved::Component(instance.lib_component))?;
        let variant = component
            .variants
            .iter()
            .find(|v| v.uuid == instance.lib_variant)
            .ok_or(Unresolved::SymbolVariant(instance.lib_variant))?;
        let gate = variant
            .gates
            .iter()
            .find(|g| g.uuid == gate)
            .ok_or(Unresolved::Gate(gate))?;
        let symbol = self
            .symbols
            .get(&gate.symbol)
            .ok_or(Unresolved::Symbol(gate.symbol))?;
        Ok((gate.symbol, symbol))
    }

    /// Check that `pad` belongs to the package of library device `lib_device`.
    pub fn resolve_device_pad(&self, lib_device: Uuid, pad: Uuid) -> Result<(), Unresolved> {
        let device = self
            .devices
            .get(&lib_device)
            .ok_or(Unresolved::Device(lib_device))?;
        if device.pads.contains(&pad) {
            Ok(())
        } else {
            Err(Unresolved::DevicePad(pad))
        }
    }
}
