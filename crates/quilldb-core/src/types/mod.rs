//! Core type definitions.

mod catalog;
mod id;
mod name;

pub use catalog::{CollectionInfo, DatabaseInfo, IndexDescriptor, IndexKind, ViewInfo};
pub use id::{CollectionId, DatabaseId, IndexId, ObjectId, TickGenerator, ViewId};
pub use name::{NameError, ObjectName};
