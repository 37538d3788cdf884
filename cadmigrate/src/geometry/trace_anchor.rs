//! Endpoints of board traces.

use crate::serialization::{SExpression, SchemaError};
use crate::types::Uuid;

const JUNCTION: &str = "junction";
const VIA: &str = "via";
const DEVICE: &str = "device";
const PAD: &str = "pad";

/// What a trace end is attached to. Exactly one kind, always.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceAnchor {
    Junction(Uuid),
    Via(Uuid),
    Pad { device: Uuid, pad: Uuid },
}

impl TraceAnchor {
    pub fn junction(junction: Uuid) -> Self {
        TraceAnchor::Junction(junction)
    }

    pub fn via(via: Uuid) -> Self {
        TraceAnchor::Via(via)
    }

    pub fn pad(device: Uuid, pad: Uuid) -> Self {
        TraceAnchor::Pad { device, pad }
    }

    /// Load from a `(from ...)` / `(to ...)` node.
    ///
    /// The node must contain exactly one of `(junction <uuid>)`, `(via <uuid>)` or the
    /// pair `(device <uuid>) (pad <uuid>)`.
    pub fn from_sexpression(node: &SExpression) -> Result<Self, SchemaError> {
        let junction = node.try_get_child(JUNCTION);
        let via = node.try_get_child(VIA);
        let device = node.try_get_child(DEVICE);
        let pad = node.try_get_child(PAD);

        let kinds = [junction.is_some(), via.is_some(), device.is_some() || pad.is_some()]
            .iter()
            .filter(|present| **present)
            .count();
        if kinds != 1 {
            return Err(SchemaError::InvalidVariant {
                kind: "trace anchor",
                reason: format!(
                    "expected exactly one of junction, via or device/pad, found {}",
                    kinds
                ),
            });
        }

        if junction.is_some() {
            Ok(TraceAnchor::Junction(node.deserialize(&format!("{}/@0", JUNCTION))?))
        } else if via.is_some() {
            Ok(TraceAnchor::Via(node.deserialize(&format!("{}/@0", VIA))?))
        } else if device.is_some() && pad.is_some() {
            Ok(TraceAnchor::Pad {
                device: node.deserialize(&format!("{}/@0", DEVICE))?,
                pad: node.deserialize(&format!("{}/@0", PAD))?,
            })
        } else {
            Err(SchemaError::InvalidVariant {
                kind: "trace anchor",
                reason: "pad anchor requires both device and pad".to_string(),
            })
        }
    }

    pub fn serialize(&self, root: &mut SExpression) -> Result<(), SchemaError> {
        match self {
            TraceAnchor::Junction(junction) => {
                root.append_value(JUNCTION, *junction)?;
            }
            TraceAnchor::Via(via) => {
                root.append_value(VIA, *via)?;
            }
            TraceAnchor::Pad { device, pad } => {
                root.append_value(DEVICE, *device)?;
                root.append_value(PAD, *pad)?;
            }
        }
        Ok(())
    }

    /// Build a complete `(name ...)` anchor node.
    pub fn to_node(&self, name: &str) -> Result<SExpression, SchemaError> {
        let mut node = SExpression::list(name);
        self.serialize(&mut node)?;
        Ok(node)
    }
}
