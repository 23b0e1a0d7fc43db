//! `QuillDB` Core
//!
//! Pure types and key encoding for the `QuillDB` storage engine. This crate
//! performs no I/O: it defines the identifier newtypes, the catalog records
//! persisted as lifecycle markers, and the ordered binary key codec that maps
//! the logical schema (databases, collections, indexes, views, documents)
//! onto a single byte-keyed keyspace.
//!
//! # Modules
//!
//! - [`types`] - identifiers, validated names, catalog records
//! - [`encoding`] - key codec and prefix bounds

pub mod encoding;
pub mod types;

pub use encoding::{KeyBounds, KeyError, KeyTag};
pub use types::{
    CollectionId, CollectionInfo, DatabaseId, DatabaseInfo, IndexDescriptor, IndexId, IndexKind,
    NameError, ObjectId, ObjectName, TickGenerator, ViewId, ViewInfo,
};
