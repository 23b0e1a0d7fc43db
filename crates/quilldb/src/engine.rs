//! Engine lifecycle orchestration and startup recovery.
//!
//! Every DDL operation is marker-first: the durable catalog marker commits
//! before any other effect, and a drop sets `deleted = true` before any
//! physical removal. The marker write is the only step that can fail the
//! caller; everything after it is best-effort, idempotent, and retried by
//! the maintenance thread and by the next startup scan.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use quilldb_core::encoding::{
    collection_key, counter_key, database_key, decode_document_key, decode_document_value,
    engine_tick_key, replication_config_key, view_key, KeyBounds,
};
use quilldb_core::{
    CollectionId, CollectionInfo, DatabaseId, DatabaseInfo, IndexDescriptor, IndexId, IndexKind,
    ObjectId, ObjectName, TickGenerator, ViewId, ViewInfo,
};
use quilldb_storage::journal::JournalConfig;
use quilldb_storage::{Cursor, StorageEngine, Transaction};

use crate::config::{EngineConfig, RecoveryMode};
use crate::counter::CounterManager;
use crate::error::{EngineError, EngineResult};
use crate::maintenance::{self, MaintenanceHandle};
use crate::registry::ObjectRegistry;
use crate::transaction::EngineTransaction;

/// Keys deleted per write transaction during range cleanup.
const CLEANUP_BATCH: usize = 1024;

/// In-memory catalog of live (and transiently soft-deleted) objects.
#[derive(Debug, Default)]
pub(crate) struct Catalog {
    databases: HashMap<DatabaseId, DatabaseInfo>,
    collections: HashMap<CollectionId, CollectionInfo>,
    views: HashMap<ViewId, ViewInfo>,
}

impl Catalog {
    fn live_database(&self, id: DatabaseId) -> Option<&DatabaseInfo> {
        self.databases.get(&id).filter(|db| !db.deleted)
    }

    fn database_by_name(&self, name: &str) -> Option<&DatabaseInfo> {
        self.databases.values().find(|db| !db.deleted && db.name.as_str() == name)
    }

    fn collection_by_name(&self, db: DatabaseId, name: &str) -> Option<&CollectionInfo> {
        self.collections
            .values()
            .find(|c| !c.deleted && c.database_id == db && c.name.as_str() == name)
    }

    fn view_by_name(&self, db: DatabaseId, name: &str) -> Option<&ViewInfo> {
        self.views.values().find(|v| !v.deleted && v.database_id == db && v.name.as_str() == name)
    }

    fn collections_of(&self, db: DatabaseId) -> Vec<CollectionInfo> {
        self.collections
            .values()
            .filter(|c| !c.deleted && c.database_id == db)
            .cloned()
            .collect()
    }

    fn views_of(&self, db: DatabaseId) -> Vec<ViewInfo> {
        self.views.values().filter(|v| !v.deleted && v.database_id == db).cloned().collect()
    }
}

/// A queued physical-cleanup unit. Each task is idempotent and safe to
/// re-run; the object ids involved are never reused.
#[derive(Debug, Clone)]
pub(crate) enum CleanupTask {
    /// Finish a collection drop: purge document and index ranges, then
    /// remove the counter record and the soft-deleted marker.
    PurgeCollection {
        database_id: DatabaseId,
        collection_id: CollectionId,
        object_id: ObjectId,
        index_object_ids: Vec<ObjectId>,
    },
    /// Purge a dropped index's entry range.
    PurgeIndex { object_id: ObjectId },
    /// Remove a soft-deleted view's marker.
    PurgeView { database_id: DatabaseId, view_id: ViewId },
    /// Finish a database drop: remaining view markers, the replication
    /// config, and the database marker itself.
    PurgeDatabase { database_id: DatabaseId },
}

/// Shared engine state, owned jointly by the [`Engine`] handle and the
/// maintenance thread.
pub(crate) struct EngineInner<E: StorageEngine> {
    pub(crate) store: E,
    pub(crate) config: EngineConfig,
    pub(crate) counters: CounterManager,
    pub(crate) registry: ObjectRegistry,
    pub(crate) ticks: TickGenerator,
    catalog: RwLock<Catalog>,
    cleanup: Mutex<VecDeque<CleanupTask>>,
    /// Serializes DDL operations so a name-uniqueness check and its marker
    /// write commit as one unit against concurrent DDL. The catalog lock
    /// itself is still never held across store I/O.
    ddl: Mutex<()>,
    /// Tick value most recently written under the engine-state key.
    persisted_tick: AtomicU64,
}

/// The storage engine layer: catalog lifecycle, document transactions,
/// counters, and recovery over an ordered key-value store.
///
/// All state is reachable from this explicitly constructed context; there
/// are no process-wide singletons.
pub struct Engine<E: StorageEngine + 'static> {
    inner: Arc<EngineInner<E>>,
    maintenance: Option<MaintenanceHandle>,
}

impl<E: StorageEngine + 'static> Engine<E> {
    /// Open the engine over `store`, running startup recovery and starting
    /// the maintenance thread.
    ///
    /// Recovery rebuilds counters from checkpoints plus journal replay,
    /// scans the catalog key ranges, re-enqueues the physical cleanup of
    /// any soft-deleted marker found, and reseeds the tick generator from
    /// every identifier observed so ids are never reused across restarts.
    pub fn open(store: E, config: EngineConfig) -> EngineResult<Self> {
        let strict = config.recovery == RecoveryMode::Strict;
        let journal_config =
            JournalConfig { sync_mode: config.journal_sync, ..JournalConfig::default() };
        let counters =
            CounterManager::recover(&store, &config.journal_path, journal_config, strict)?;

        let ticks = TickGenerator::new(0);
        ticks.observe(counters.revision());

        // The persisted high-water mark covers ticks that never show up in
        // catalog markers, like document revision tags.
        {
            let tx = store.begin_read()?;
            if let Some(bytes) = tx.get(&engine_tick_key())? {
                match bincode::serde::decode_from_slice::<u64, _>(
                    &bytes,
                    bincode::config::standard(),
                ) {
                    Ok((tick, _)) => ticks.observe(tick),
                    Err(e) if strict => {
                        return Err(EngineError::RecoveryInconsistent(format!(
                            "undecodable tick record: {e}"
                        )));
                    }
                    Err(e) => warn!(error = %e, "skipping undecodable tick record"),
                }
            }
        }

        let mut catalog = Catalog::default();
        let mut tasks = VecDeque::new();
        Self::scan_catalog(&store, strict, &ticks, &mut catalog, &mut tasks)?;

        let registry = ObjectRegistry::new();
        for coll in catalog.collections.values() {
            registry.register(coll.object_id, coll.database_id, coll.id);
        }

        let persisted_tick = AtomicU64::new(ticks.current());
        let inner = Arc::new(EngineInner {
            store,
            config,
            counters,
            registry,
            ticks,
            catalog: RwLock::new(catalog),
            cleanup: Mutex::new(tasks),
            ddl: Mutex::new(()),
            persisted_tick,
        });

        // Finish interrupted drops before accepting traffic. Failures stay
        // queued for the maintenance thread.
        inner.run_pending_cleanups();

        let maintenance =
            maintenance::spawn(Arc::clone(&inner), inner.config.checkpoint_interval)
                .map_err(quilldb_storage::StorageError::Io)?;

        info!(
            databases = inner.catalog_read().databases.len(),
            collections = inner.registry.len(),
            "engine open"
        );
        Ok(Self { inner, maintenance: Some(maintenance) })
    }

    fn scan_catalog(
        store: &E,
        strict: bool,
        ticks: &TickGenerator,
        catalog: &mut Catalog,
        tasks: &mut VecDeque<CleanupTask>,
    ) -> EngineResult<()> {
        let tx = store.begin_read()?;

        let databases: Vec<DatabaseInfo> =
            scan_markers(&tx, &KeyBounds::databases(), strict, "database")?;
        let collections: Vec<CollectionInfo> =
            scan_markers(&tx, &KeyBounds::all_collections(), strict, "collection")?;
        let views: Vec<ViewInfo> = scan_markers(&tx, &KeyBounds::all_views(), strict, "view")?;
        drop(tx);

        for db in databases {
            ticks.observe(db.id.as_u64());
            if db.deleted {
                warn!(database = %db.name.as_str(), "finishing interrupted database drop");
                tasks.push_back(CleanupTask::PurgeDatabase { database_id: db.id });
            }
            catalog.databases.insert(db.id, db);
        }

        for coll in collections {
            ticks.observe(coll.id.as_u64());
            ticks.observe(coll.object_id.as_u64());
            for ix in &coll.indexes {
                ticks.observe(ix.id.as_u64());
                ticks.observe(ix.object_id.as_u64());
            }

            let orphaned = catalog.live_database(coll.database_id).is_none();
            if coll.deleted || orphaned {
                warn!(
                    collection = %coll.name.as_str(),
                    orphaned,
                    "finishing interrupted collection drop"
                );
                tasks.push_back(CleanupTask::PurgeCollection {
                    database_id: coll.database_id,
                    collection_id: coll.id,
                    object_id: coll.object_id,
                    index_object_ids: coll.indexes.iter().map(|ix| ix.object_id).collect(),
                });
            } else {
                catalog.collections.insert(coll.id, coll);
            }
        }

        for view in views {
            ticks.observe(view.id.as_u64());
            let orphaned = catalog.live_database(view.database_id).is_none();
            if view.deleted || orphaned {
                tasks.push_back(CleanupTask::PurgeView {
                    database_id: view.database_id,
                    view_id: view.id,
                });
            } else {
                catalog.views.insert(view.id, view);
            }
        }

        // Drop soft-deleted databases from the in-memory catalog now that
        // orphan detection has run against them.
        catalog.databases.retain(|_, db| !db.deleted);
        Ok(())
    }

    // -- databases ---------------------------------------------------------

    /// Create a database. Fails with `DuplicateName` if a live database of
    /// this name exists.
    pub fn create_database(&self, name: &str) -> EngineResult<DatabaseId> {
        let _ddl = self.inner.ddl_guard();
        let name = ObjectName::new(name)?;
        if self.inner.catalog_read().database_by_name(name.as_str()).is_some() {
            return Err(EngineError::DuplicateName(name.into_string()));
        }

        let id = DatabaseId::new(self.inner.ticks.next_tick());
        let info = DatabaseInfo::new(id, name);
        self.inner.write_marker(&database_key(id), &info)?;

        self.inner.catalog_write().databases.insert(id, info);
        Ok(id)
    }

    /// Drop a database and, best-effort, everything it owns.
    ///
    /// The database marker is rewritten with `deleted = true` first; from
    /// that commit on the database and its contents are invisible. Owned
    /// collections then go through the full drop protocol each, views and
    /// the replication config are removed, and finally the database marker
    /// itself is deleted.
    pub fn drop_database(&self, id: DatabaseId) -> EngineResult<()> {
        let _ddl = self.inner.ddl_guard();
        let mut info = self
            .inner
            .catalog_read()
            .live_database(id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("database {}", id.as_u64())))?;

        info.deleted = true;
        self.inner.write_marker(&database_key(id), &info)?;

        let (collections, views) = {
            let mut catalog = self.inner.catalog_write();
            catalog.databases.remove(&id);
            let collections = catalog.collections_of(id);
            let views = catalog.views_of(id);
            catalog.collections.retain(|_, c| c.database_id != id);
            catalog.views.retain(|_, v| v.database_id != id);
            (collections, views)
        };

        for coll in collections {
            let task = self.inner.soft_delete_collection(&coll);
            match task {
                Ok(task) => self.inner.run_or_enqueue(task),
                Err(e) => {
                    // The database marker is already deleted; the orphan
                    // scan at next startup picks this collection up.
                    warn!(
                        collection = %coll.name.as_str(),
                        error = %e,
                        "collection soft-delete failed during database drop"
                    );
                }
            }
        }
        for view in views {
            self.inner.run_or_enqueue(CleanupTask::PurgeView {
                database_id: id,
                view_id: view.id,
            });
        }

        self.inner.run_or_enqueue(CleanupTask::PurgeDatabase { database_id: id });
        Ok(())
    }

    /// Look up a live database by name.
    pub fn database(&self, name: &str) -> EngineResult<DatabaseInfo> {
        self.inner
            .catalog_read()
            .database_by_name(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("database '{name}'")))
    }

    /// All live databases.
    #[must_use]
    pub fn databases(&self) -> Vec<DatabaseInfo> {
        let catalog = self.inner.catalog_read();
        catalog.databases.values().filter(|db| !db.deleted).cloned().collect()
    }

    // -- collections -------------------------------------------------------

    /// Create a collection in `db`.
    pub fn create_collection(&self, db: DatabaseId, name: &str) -> EngineResult<CollectionInfo> {
        let _ddl = self.inner.ddl_guard();
        let name = ObjectName::new(name)?;
        {
            let catalog = self.inner.catalog_read();
            if catalog.live_database(db).is_none() {
                return Err(EngineError::NotFound(format!("database {}", db.as_u64())));
            }
            if catalog.collection_by_name(db, name.as_str()).is_some() {
                return Err(EngineError::DuplicateName(name.into_string()));
            }
        }

        let id = CollectionId::new(self.inner.ticks.next_tick());
        let object_id = ObjectId::new(self.inner.ticks.next_tick());
        let info = CollectionInfo::new(id, db, object_id, name);
        self.inner.write_marker(&collection_key(db, id), &info)?;

        self.inner.registry.register(object_id, db, id);
        self.inner.catalog_write().collections.insert(id, info.clone());
        Ok(info)
    }

    /// Drop a collection: soft-delete marker first, then best-effort
    /// physical cleanup (document range, index ranges, compaction).
    ///
    /// Once the marker rewrite commits the drop is irreversible and the
    /// collection is invisible; a cleanup failure is logged and retried,
    /// never surfaced. If the marker rewrite itself fails the collection
    /// remains fully usable.
    pub fn drop_collection(&self, db: DatabaseId, name: &str) -> EngineResult<()> {
        let _ddl = self.inner.ddl_guard();
        let info = self
            .inner
            .catalog_read()
            .collection_by_name(db, name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("collection '{name}'")))?;

        let task = self.inner.soft_delete_collection(&info)?;
        self.inner.catalog_write().collections.remove(&info.id);
        self.inner.run_or_enqueue(task);
        Ok(())
    }

    /// Rename a collection. Marker rewrite only; document keys are scoped
    /// by object id, not name, so no data moves.
    pub fn rename_collection(&self, db: DatabaseId, old: &str, new: &str) -> EngineResult<()> {
        let _ddl = self.inner.ddl_guard();
        let new_name = ObjectName::new(new)?;
        let mut info = {
            let catalog = self.inner.catalog_read();
            if catalog.collection_by_name(db, new_name.as_str()).is_some() {
                return Err(EngineError::DuplicateName(new_name.into_string()));
            }
            catalog
                .collection_by_name(db, old)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(format!("collection '{old}'")))?
        };

        info.name = new_name;
        self.inner.write_marker(&collection_key(db, info.id), &info)?;
        self.inner.catalog_write().collections.insert(info.id, info);
        Ok(())
    }

    /// Look up a live collection by name.
    pub fn collection(&self, db: DatabaseId, name: &str) -> EngineResult<CollectionInfo> {
        self.inner
            .catalog_read()
            .collection_by_name(db, name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("collection '{name}'")))
    }

    /// All live collections in `db`.
    #[must_use]
    pub fn collections(&self, db: DatabaseId) -> Vec<CollectionInfo> {
        self.inner.catalog_read().collections_of(db)
    }

    // -- indexes -----------------------------------------------------------

    /// Add an index to a collection. The descriptor is stored inside the
    /// owning collection's marker and gets its own object-id key range.
    pub fn create_index(
        &self,
        db: DatabaseId,
        collection: &str,
        kind: IndexKind,
        fields: Vec<String>,
    ) -> EngineResult<IndexDescriptor> {
        let _ddl = self.inner.ddl_guard();
        let mut info = self
            .inner
            .catalog_read()
            .collection_by_name(db, collection)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("collection '{collection}'")))?;

        let descriptor = IndexDescriptor::new(
            IndexId::new(self.inner.ticks.next_tick()),
            ObjectId::new(self.inner.ticks.next_tick()),
            kind,
            fields,
        );
        info.indexes.push(descriptor.clone());
        self.inner.write_marker(&collection_key(db, info.id), &info)?;
        self.inner.catalog_write().collections.insert(info.id, info);
        Ok(descriptor)
    }

    /// Drop an index: marker rewrite first, then best-effort purge of the
    /// index entry range.
    pub fn drop_index(
        &self,
        db: DatabaseId,
        collection: &str,
        index_id: IndexId,
    ) -> EngineResult<()> {
        let _ddl = self.inner.ddl_guard();
        let mut info = self
            .inner
            .catalog_read()
            .collection_by_name(db, collection)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("collection '{collection}'")))?;

        let descriptor = info
            .index(index_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("index {}", index_id.as_u64())))?;
        info.indexes.retain(|ix| ix.id != index_id);

        self.inner.write_marker(&collection_key(db, info.id), &info)?;
        self.inner.catalog_write().collections.insert(info.id, info);

        self.inner.run_or_enqueue(CleanupTask::PurgeIndex { object_id: descriptor.object_id });
        Ok(())
    }

    // -- views -------------------------------------------------------------

    /// Create a view. The engine stores kind and properties opaquely.
    pub fn create_view(
        &self,
        db: DatabaseId,
        name: &str,
        kind: &str,
        properties: serde_json::Value,
    ) -> EngineResult<ViewInfo> {
        let _ddl = self.inner.ddl_guard();
        let name = ObjectName::new(name)?;
        {
            let catalog = self.inner.catalog_read();
            if catalog.live_database(db).is_none() {
                return Err(EngineError::NotFound(format!("database {}", db.as_u64())));
            }
            if catalog.view_by_name(db, name.as_str()).is_some() {
                return Err(EngineError::DuplicateName(name.into_string()));
            }
        }

        let id = ViewId::new(self.inner.ticks.next_tick());
        let info = ViewInfo::new(id, db, name, kind, properties);
        self.inner.write_marker(&view_key(db, id), &info)?;
        self.inner.catalog_write().views.insert(id, info.clone());
        Ok(info)
    }

    /// Drop a view: soft-delete marker first, then best-effort marker
    /// removal. Views own no bulk data.
    pub fn drop_view(&self, db: DatabaseId, name: &str) -> EngineResult<()> {
        let _ddl = self.inner.ddl_guard();
        let mut info = self
            .inner
            .catalog_read()
            .view_by_name(db, name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("view '{name}'")))?;

        info.deleted = true;
        self.inner.write_marker(&view_key(db, info.id), &info)?;
        self.inner.catalog_write().views.remove(&info.id);

        self.inner
            .run_or_enqueue(CleanupTask::PurgeView { database_id: db, view_id: info.id });
        Ok(())
    }

    /// Rename a view via marker rewrite.
    pub fn rename_view(&self, db: DatabaseId, old: &str, new: &str) -> EngineResult<()> {
        let _ddl = self.inner.ddl_guard();
        let new_name = ObjectName::new(new)?;
        let mut info = {
            let catalog = self.inner.catalog_read();
            if catalog.view_by_name(db, new_name.as_str()).is_some() {
                return Err(EngineError::DuplicateName(new_name.into_string()));
            }
            catalog
                .view_by_name(db, old)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(format!("view '{old}'")))?
        };

        info.name = new_name;
        self.inner.write_marker(&view_key(db, info.id), &info)?;
        self.inner.catalog_write().views.insert(info.id, info);
        Ok(())
    }

    /// Replace a view's properties in place via marker rewrite. Name, id,
    /// and kind stay as they are.
    pub fn update_view(
        &self,
        db: DatabaseId,
        name: &str,
        properties: serde_json::Value,
    ) -> EngineResult<ViewInfo> {
        let _ddl = self.inner.ddl_guard();
        let mut info = self
            .inner
            .catalog_read()
            .view_by_name(db, name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(format!("view '{name}'")))?;

        info.properties = properties;
        self.inner.write_marker(&view_key(db, info.id), &info)?;
        self.inner.catalog_write().views.insert(info.id, info.clone());
        Ok(info)
    }

    /// All live views in `db`.
    #[must_use]
    pub fn views(&self, db: DatabaseId) -> Vec<ViewInfo> {
        self.inner.catalog_read().views_of(db)
    }

    // -- replication config ------------------------------------------------

    /// Read the replication applier configuration for `db`, if any.
    pub fn replication_config(&self, db: DatabaseId) -> EngineResult<Option<Vec<u8>>> {
        let tx = self.inner.store.begin_read()?;
        Ok(tx.get(&replication_config_key(db))?)
    }

    /// Store the replication applier configuration for `db`. The payload
    /// is opaque to the engine.
    pub fn store_replication_config(&self, db: DatabaseId, bytes: &[u8]) -> EngineResult<()> {
        if self.inner.catalog_read().live_database(db).is_none() {
            return Err(EngineError::NotFound(format!("database {}", db.as_u64())));
        }
        let mut tx = self.inner.store.begin_write()?;
        tx.put(&replication_config_key(db), bytes)?;
        tx.commit()?;
        Ok(())
    }

    /// Remove the replication applier configuration for `db`.
    pub fn remove_replication_config(&self, db: DatabaseId) -> EngineResult<()> {
        let mut tx = self.inner.store.begin_write()?;
        tx.delete(&replication_config_key(db))?;
        tx.commit()?;
        Ok(())
    }

    // -- documents ---------------------------------------------------------

    /// Begin a logical read-write transaction.
    #[must_use]
    pub fn begin(&self) -> EngineTransaction<'_, E> {
        EngineTransaction::new(&self.inner)
    }

    /// Read one document. Returns its revision and payload.
    pub fn get_document(
        &self,
        collection: &CollectionInfo,
        user_key: &[u8],
    ) -> EngineResult<Option<(u64, Vec<u8>)>> {
        let tx = self.inner.store.begin_read()?;
        let key = quilldb_core::encoding::document_key(collection.object_id, user_key);
        match tx.get(&key)? {
            Some(bytes) => {
                let (revision, payload) = decode_document_value(&bytes)?;
                Ok(Some((revision, payload.to_vec())))
            }
            None => Ok(None),
        }
    }

    /// Scan all documents of a collection in key order. Yields
    /// `(user_key, revision, payload)` triples.
    pub fn scan_collection(
        &self,
        collection: &CollectionInfo,
    ) -> EngineResult<Vec<(Vec<u8>, u64, Vec<u8>)>> {
        let bounds = KeyBounds::documents(collection.object_id)?;
        let tx = self.inner.store.begin_read()?;
        let (low, high) = bounds.as_range();
        let mut cursor = tx.range(low, high)?;

        let mut out = Vec::new();
        while let Some((key, value)) = cursor.next()? {
            let (_, user_key) = decode_document_key(&key)?;
            let (revision, payload) = decode_document_value(&value)?;
            out.push((user_key.to_vec(), revision, payload.to_vec()));
        }
        Ok(out)
    }

    /// Exact document count of a collection.
    #[must_use]
    pub fn document_count(&self, collection: &CollectionInfo) -> u64 {
        self.inner.counters.count(collection.object_id)
    }

    /// Global revision tick of the most recent counted change.
    #[must_use]
    pub fn counter_revision(&self) -> u64 {
        self.inner.counters.revision()
    }

    /// Force a counter checkpoint now instead of waiting for the
    /// maintenance interval.
    pub fn checkpoint(&self) -> EngineResult<()> {
        self.inner.counters.checkpoint_all(&self.inner.store)?;
        self.inner.persist_tick()
    }

    /// Stop the maintenance thread, write a final counter checkpoint, and
    /// release the store.
    pub fn shutdown(mut self) -> EngineResult<()> {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> EngineResult<()> {
        if let Some(handle) = self.maintenance.take() {
            handle.stop();
            self.inner.counters.checkpoint_all(&self.inner.store)?;
            self.inner.persist_tick()?;
            info!("engine shut down");
        }
        Ok(())
    }
}

impl<E: StorageEngine + 'static> Drop for Engine<E> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown_inner() {
            warn!(error = %e, "final counter checkpoint failed during shutdown");
        }
    }
}

impl<E: StorageEngine> EngineInner<E> {
    fn catalog_read(&self) -> std::sync::RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn catalog_write(&self) -> std::sync::RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn ddl_guard(&self) -> std::sync::MutexGuard<'_, ()> {
        self.ddl.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Persist the tick high-water mark so revision tags and ids stay
    /// monotonic across restarts. A no-op when nothing new was allocated
    /// since the last write.
    pub(crate) fn persist_tick(&self) -> EngineResult<()> {
        let tick = self.ticks.current();
        if tick <= self.persisted_tick.load(Ordering::SeqCst) {
            return Ok(());
        }

        let value = bincode::serde::encode_to_vec(&tick, bincode::config::standard())
            .map_err(|e| EngineError::Serialization(e.to_string()))?;
        let mut tx = self.store.begin_write()?;
        tx.put(&engine_tick_key(), &value)?;
        tx.commit()?;

        self.persisted_tick.fetch_max(tick, Ordering::SeqCst);
        Ok(())
    }

    /// Commit a catalog marker in its own write transaction. This is the
    /// point of no return for every DDL operation.
    fn write_marker<T: Serialize>(&self, key: &[u8], record: &T) -> EngineResult<()> {
        let value = bincode::serde::encode_to_vec(record, bincode::config::standard())
            .map_err(|e| EngineError::Serialization(e.to_string()))?;

        let result = (|| {
            let mut tx = self.store.begin_write()?;
            tx.put(key, &value)?;
            tx.commit()
        })();
        result.map_err(EngineError::MarkerWriteFailed)
    }

    /// Step one of the collection drop protocol: rewrite the marker with
    /// `deleted = true` and journal the counter removal. Returns the
    /// cleanup task for the remaining steps.
    fn soft_delete_collection(&self, info: &CollectionInfo) -> EngineResult<CleanupTask> {
        let mut marked = info.clone();
        marked.deleted = true;
        self.write_marker(&collection_key(info.database_id, info.id), &marked)?;

        self.counters.remove(info.object_id)?;
        self.registry.unregister(info.object_id);

        Ok(CleanupTask::PurgeCollection {
            database_id: info.database_id,
            collection_id: info.id,
            object_id: info.object_id,
            index_object_ids: info.indexes.iter().map(|ix| ix.object_id).collect(),
        })
    }

    /// Run a cleanup task now; on failure log it and queue it for the
    /// maintenance thread.
    fn run_or_enqueue(&self, task: CleanupTask) {
        if let Err(e) = self.run_cleanup(&task) {
            warn!(task = ?task, error = %e, "cleanup failed, queued for retry");
            self.enqueue(task);
        }
    }

    fn enqueue(&self, task: CleanupTask) {
        let mut queue = self.cleanup.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        queue.push_back(task);
    }

    /// Retry every queued cleanup task once. Called by the maintenance
    /// thread each interval and once during startup.
    pub(crate) fn run_pending_cleanups(&self) {
        let tasks: Vec<CleanupTask> = {
            let mut queue =
                self.cleanup.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            queue.drain(..).collect()
        };

        for task in tasks {
            self.run_or_enqueue(task);
        }
    }

    pub(crate) fn pending_cleanups(&self) -> usize {
        let queue = self.cleanup.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        queue.len()
    }

    fn run_cleanup(&self, task: &CleanupTask) -> EngineResult<()> {
        match task {
            CleanupTask::PurgeCollection {
                database_id,
                collection_id,
                object_id,
                index_object_ids,
            } => {
                let deleted = self.delete_range(&KeyBounds::documents(*object_id)?)?;
                for ix_oid in index_object_ids {
                    self.delete_range(&KeyBounds::index_entries(*ix_oid)?)?;
                }

                let mut tx = self.store.begin_write()?;
                tx.delete(&counter_key(*object_id))?;
                tx.delete(&collection_key(*database_id, *collection_id))?;
                tx.commit()?;

                // A purge reached from the startup scan never went through
                // the runtime drop path, so the counter may still be live.
                self.counters.remove(*object_id)?;
                self.registry.unregister(*object_id);
                if let Err(e) = self.store.compact() {
                    warn!(error = %e, "post-drop compaction failed");
                }
                info!(
                    object_id = object_id.as_u64(),
                    documents = deleted,
                    "collection purge complete"
                );
                Ok(())
            }
            CleanupTask::PurgeIndex { object_id } => {
                self.delete_range(&KeyBounds::index_entries(*object_id)?)?;
                Ok(())
            }
            CleanupTask::PurgeView { database_id, view_id } => {
                let mut tx = self.store.begin_write()?;
                tx.delete(&view_key(*database_id, *view_id))?;
                tx.commit()?;
                Ok(())
            }
            CleanupTask::PurgeDatabase { database_id } => {
                self.delete_range(&KeyBounds::views(*database_id)?)?;
                let mut tx = self.store.begin_write()?;
                tx.delete(&replication_config_key(*database_id))?;
                tx.delete(&database_key(*database_id))?;
                tx.commit()?;
                Ok(())
            }
        }
    }

    /// Delete every key inside `bounds`, in batches of bounded size so no
    /// single write transaction grows with the range.
    fn delete_range(&self, bounds: &KeyBounds) -> EngineResult<u64> {
        let mut total = 0u64;
        loop {
            let keys: Vec<Vec<u8>> = {
                let tx = self.store.begin_read()?;
                let (low, high) = bounds.as_range();
                let mut cursor = tx.range(low, high)?;
                let mut keys = Vec::new();
                while keys.len() < CLEANUP_BATCH {
                    match cursor.next()? {
                        Some((key, _)) => keys.push(key),
                        None => break,
                    }
                }
                keys
            };

            if keys.is_empty() {
                break;
            }
            let batch = keys.len();

            let mut tx = self.store.begin_write()?;
            for key in &keys {
                tx.delete(key)?;
            }
            tx.commit()?;
            total += batch as u64;

            if batch < CLEANUP_BATCH {
                break;
            }
        }
        Ok(total)
    }
}

/// Scan one catalog tag range, decoding each marker. In strict mode an
/// undecodable marker aborts recovery; otherwise it is logged and skipped.
fn scan_markers<T, Tx>(
    tx: &Tx,
    bounds: &KeyBounds,
    strict: bool,
    kind: &'static str,
) -> EngineResult<Vec<T>>
where
    T: DeserializeOwned,
    Tx: Transaction,
{
    let (low, high) = bounds.as_range();
    let mut cursor = tx.range(low, high)?;
    let mut records = Vec::new();

    while let Some((key, value)) = cursor.next()? {
        match bincode::serde::decode_from_slice(&value, bincode::config::standard()) {
            Ok((record, _)) => records.push(record),
            Err(e) if strict => {
                return Err(EngineError::RecoveryInconsistent(format!(
                    "undecodable {kind} marker at key {key:02x?}: {e}"
                )));
            }
            Err(e) => {
                warn!(kind, key = ?key, error = %e, "skipping undecodable marker");
            }
        }
    }
    Ok(records)
}
