//! Concrete storage backend implementations.

pub mod redb;

pub use self::redb::{RedbConfig, RedbEngine, RedbTransaction};
