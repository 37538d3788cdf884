pub mod element_name;
pub mod uuid;
pub mod version;

pub use self::element_name::{ElementName, ElementNameError};
pub use self::uuid::{Uuid, UuidError};
pub use self::version::{Version, VersionError};
