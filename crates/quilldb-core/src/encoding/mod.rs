//! Key encoding for ordered storage.
//!
//! Every persisted entity kind gets a total, lexicographically-ordered byte
//! encoding: a one-byte type tag, big-endian fixed-width scope identifiers,
//! and (for document and index entries) the caller-supplied variable-length
//! key. Big-endian integers make numeric order coincide with byte order, so
//! a half-open [`KeyBounds`] prefix range contains exactly one scope's keys.

mod bounds;
mod document;
mod keys;


pub use bounds::KeyBounds;
pub use document::{decode_document_value, encode_document_value};
pub use keys::{
    collection_key, counter_key, database_key, decode_collection_key, decode_counter_key,
    decode_database_key, decode_document_key, decode_view_key, document_key, engine_tick_key,
    index_entry_key, replication_config_key, view_key, KeyTag,
};

/// Errors produced by the key codec.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// A scope id is already at its maximum; no exclusive upper bound exists.
    ///
    /// Unreachable in practice given 64-bit scope ids.
    #[error("cannot derive prefix bound: scope id is already maximal")]
    ScopeOverflow,

    /// A byte string does not decode as the expected key kind.
    #[error("malformed key: {0}")]
    MalformedKey(&'static str),
}
