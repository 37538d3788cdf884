use super::sexpression::{SExpression, SchemaError};
use crate::types::{ElementName, Uuid, Version};

/// Conversion of an atom node into a typed value.
pub trait FromSExpression: Sized {
    fn from_sexpression(node: &SExpression) -> Result<Self, SchemaError>;
}

/// Conversion of a typed value into an atom node.
pub trait ToSExpression {
    fn to_sexpression(&self) -> SExpression;
}

fn invalid(expected: &'static str, value: &str, reason: impl ToString) -> SchemaError {
    SchemaError::InvalidValue {
        expected,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl FromSExpression for String {
    fn from_sexpression(node: &SExpression) -> Result<Self, SchemaError> {
        node.value().map(str::to_string)
    }
}

impl ToSExpression for String {
    fn to_sexpression(&self) -> SExpression {
        SExpression::string(self.as_str())
    }
}

impl ToSExpression for &str {
    fn to_sexpression(&self) -> SExpression {
        SExpression::string(*self)
    }
}

impl FromSExpression for bool {
    fn from_sexpression(node: &SExpression) -> Result<Self, SchemaError> {
        match node.value()? {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(invalid("boolean", other, "expected true or false")),
        }
    }
}

impl ToSExpression for bool {
    fn to_sexpression(&self) -> SExpression {
        SExpression::token(if *self { "true" } else { "false" })
    }
}

impl FromSExpression for Uuid {
    fn from_sexpression(node: &SExpression) -> Result<Self, SchemaError> {
        let value = node.value()?;
        value.parse().map_err(|e| invalid("UUID", value, e))
    }
}

impl ToSExpression for Uuid {
    fn to_sexpression(&self) -> SExpression {
        SExpression::token(self.to_str())
    }
}

/// `none` or a UUID, as used by optional references like `(signal none)`.
impl FromSExpression for Option<Uuid> {
    fn from_sexpression(node: &SExpression) -> Result<Self, SchemaError> {
        match node.value()? {
            "none" => Ok(None),
            _ => Uuid::from_sexpression(node).map(Some),
        }
    }
}

impl ToSExpression for Option<Uuid> {
    fn to_sexpression(&self) -> SExpression {
        match self {
            Some(uuid) => uuid.to_sexpression(),
            None => SExpression::token("none"),
        }
    }
}

impl FromSExpression for ElementName {
    fn from_sexpression(node: &SExpression) -> Result<Self, SchemaError> {
        let value = node.value()?;
        value.parse().map_err(|e| invalid("element name", value, e))
    }
}

impl ToSExpression for ElementName {
    fn to_sexpression(&self) -> SExpression {
        SExpression::string(self.as_str())
    }
}

impl FromSExpression for Version {
    fn from_sexpression(node: &SExpression) -> Result<Self, SchemaError> {
        let value = node.value()?;
        value.parse().map_err(|e| invalid("version", value, e))
    }
}

impl ToSExpression for Version {
    fn to_sexpression(&self) -> SExpression {
        SExpression::string(self.to_string())
    }
}

impl FromSExpression for f64 {
    fn from_sexpression(node: &SExpression) -> Result<Self, SchemaError> {
        let value = node.value()?;
        value.parse().map_err(|e| invalid("number", value, e))
    }
}
