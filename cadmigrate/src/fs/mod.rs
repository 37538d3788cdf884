pub mod transactional;

pub use transactional::{FsError, TransactionalDirectory, TransactionalFileSystem};
