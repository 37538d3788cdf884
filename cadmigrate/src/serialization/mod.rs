pub mod convert;
pub mod localized_map;
pub mod sexpression;

pub use convert::{FromSExpression, ToSExpression};
pub use localized_map::{
    LocalizedDescriptionMap, LocalizedKeywordsMap, LocalizedMap, LocalizedNameMap, MapEvent,
    MapPolicy,
};
pub use sexpression::{ParseError, Position, SExpression, SExpressionParser, SchemaError};
