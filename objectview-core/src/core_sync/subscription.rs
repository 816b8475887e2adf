/*
    subscription.rs - View definitions

    A ViewDef is the caller's handle on one subscription. It is cheap to
    clone and shared with the coordinator, which applies registrations and
    inbound changes to it. Callers read the replica synchronously and
    build commands from it.

    Callbacks run after the state lock is released, so they may read the
    view they belong to.
*/

use super::cell::{normalize_cell, FALLBACK_CELL};
use super::hub::{DeregisterParams, RegisterParams, RegisterResponse};
use crate::config::SyncConfig;
use crate::core_view::encode::{copy_fields, encode_diff, encode_set, ChangeSet, FieldMap};
use crate::core_view::model::{ChangeEvent, ChangeMessage, Document, DocumentId, Replica};
use crate::core_view::replica::{ChangeNotifier, ReplicaChange, ReplicaEngine, TargetMode};
use crate::errors::{EncodingError, SyncResult};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;
use tracing::debug;

/// Called after every successful registration with the hub's response
pub type EstablishCallback = Arc<dyn Fn(&RegisterResponse) + Send + Sync>;

/// Called with every applied change event
pub type ChangeCallback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

struct ViewState {
    engine: ReplicaEngine,
    field_map: Option<FieldMap>,
    registering: bool,
}

struct ViewInner {
    view: String,
    cell: Option<String>,
    notify_capacity: usize,
    state: RwLock<ViewState>,
    on_establish: Option<EstablishCallback>,
    on_change: Option<ChangeCallback>,
}

/// Handle on one subscription
#[derive(Clone)]
pub struct ViewDef {
    inner: Arc<ViewInner>,
}

/// Builder for [`ViewDef`]
pub struct ViewDefBuilder {
    view: String,
    cell: Option<String>,
    mode: TargetMode,
    notify_capacity: usize,
    on_establish: Option<EstablishCallback>,
    on_change: Option<ChangeCallback>,
}

impl ViewDefBuilder {
    /// Partition to subscribe to; `"fallback"` and `"site"` are aliases
    pub fn cell(mut self, cell: impl AsRef<str>) -> Self {
        self.cell = normalize_cell(Some(cell.as_ref()));
        self
    }

    pub fn fallback_cell(mut self) -> Self {
        self.cell = Some(FALLBACK_CELL.to_string());
        self
    }

    pub fn mode(mut self, mode: TargetMode) -> Self {
        self.mode = mode;
        self
    }

    /// Keep only the sequence; registrations request no dump
    pub fn detached(self) -> Self {
        self.mode(TargetMode::Detached)
    }

    pub fn notify_capacity(mut self, capacity: usize) -> Self {
        self.notify_capacity = capacity;
        self
    }

    /// Take buffer sizes from a sync configuration
    pub fn config(self, config: &SyncConfig) -> Self {
        self.notify_capacity(config.notify_capacity)
    }

    pub fn on_establish<F>(mut self, callback: F) -> Self
    where
        F: Fn(&RegisterResponse) + Send + Sync + 'static,
    {
        self.on_establish = Some(Arc::new(callback));
        self
    }

    pub fn on_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.on_change = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> ViewDef {
        let notify_capacity = self.notify_capacity.max(1);
        let notifier = ChangeNotifier::new(notify_capacity);
        let engine = ReplicaEngine::with_notifier(self.view.clone(), self.mode, notifier);
        ViewDef {
            inner: Arc::new(ViewInner {
                view: self.view,
                cell: self.cell,
                notify_capacity,
                state: RwLock::new(ViewState { engine, field_map: None, registering: false }),
                on_establish: self.on_establish,
                on_change: self.on_change,
            }),
        }
    }
}

impl ViewDef {
    pub fn builder(view: impl Into<String>) -> ViewDefBuilder {
        ViewDefBuilder {
            view: view.into(),
            cell: None,
            mode: TargetMode::Owned,
            notify_capacity: SyncConfig::default().notify_capacity,
            on_establish: None,
            on_change: None,
        }
    }

    /// An owned-replica subscription on `view`, optionally in one cell
    pub fn new(view: impl Into<String>, cell: Option<&str>) -> Self {
        let builder = Self::builder(view);
        match cell {
            Some(cell) => builder.cell(cell).build(),
            None => builder.build(),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, ViewState> {
        self.inner.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ViewState> {
        self.inner.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn view(&self) -> &str {
        &self.inner.view
    }

    pub fn cell(&self) -> Option<&str> {
        self.inner.cell.as_deref()
    }

    pub fn mode(&self) -> TargetMode {
        self.read().engine.mode()
    }

    /// Whether registrations should request a dump
    pub fn wants_dump(&self) -> bool {
        self.read().engine.has_target()
    }

    /// Last applied sequence number
    /// Changes buffered per observer before a slow one starts lagging
    pub fn notify_capacity(&self) -> usize {
        self.inner.notify_capacity
    }

    pub fn sequence(&self) -> Option<u64> {
        self.read().engine.sequence()
    }

    /// Whether both handles refer to the same subscription
    pub fn same_as(&self, other: &ViewDef) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn register_params(&self) -> RegisterParams {
        RegisterParams::new(self.view(), self.inner.cell.clone(), self.wants_dump())
    }

    pub fn deregister_params(&self) -> DeregisterParams {
        DeregisterParams { view: self.view().to_string(), cell: self.inner.cell.clone() }
    }

    /// Set the in-flight guard; false if a registration is already running
    pub(crate) fn begin_registration(&self) -> bool {
        let mut state = self.write();
        if state.registering {
            return false;
        }
        state.registering = true;
        true
    }

    pub(crate) fn end_registration(&self) {
        self.write().registering = false;
    }

    pub fn is_registering(&self) -> bool {
        self.read().registering
    }

    pub fn field_map(&self) -> Option<FieldMap> {
        self.read().field_map.clone()
    }

    /// Whether commands can be built for this view
    pub fn is_updateable(&self) -> bool {
        self.read().field_map.is_some()
    }

    pub(crate) fn set_field_map(&self, field_map: Option<FieldMap>) {
        self.write().field_map = field_map;
    }

    /// Apply a registration response: dump first, then the trailing changes.
    ///
    /// A rejected registration applies nothing. The establish callback runs
    /// only when everything applied.
    pub fn apply_registration(&self, response: &RegisterResponse) -> SyncResult<usize> {
        if !response.is_ok() {
            return Err(response.error());
        }

        let dump = response.dump()?;
        let changes = response.changes()?;

        let mut applied = Vec::new();
        let mut state = self.write();
        state.engine.apply_dump(dump);
        let outcome = match &changes {
            Some(message) => state
                .engine
                .apply_changes(message, &mut |event: &ChangeEvent| applied.push(event.clone())),
            None => Ok(()),
        };
        drop(state);

        self.notify_changes(&applied);
        outcome?;

        if let Some(callback) = &self.inner.on_establish {
            callback(response);
        }
        Ok(applied.len())
    }

    /// Apply an inbound change message, returning how many events applied
    pub fn apply_changes(&self, message: &ChangeMessage) -> SyncResult<usize> {
        let mut applied = Vec::new();
        let outcome = self
            .write()
            .engine
            .apply_changes(message, &mut |event: &ChangeEvent| applied.push(event.clone()));

        self.notify_changes(&applied);
        outcome.map(|()| applied.len())
    }

    fn notify_changes(&self, applied: &[ChangeEvent]) {
        if let Some(callback) = &self.inner.on_change {
            for event in applied {
                callback(event);
            }
        }
    }

    /// Observe replica mutations
    pub fn subscribe_changes(&self) -> broadcast::Receiver<ReplicaChange> {
        self.read().engine.subscribe()
    }

    /// Copy of the replica, if this view keeps one
    pub fn snapshot(&self) -> Option<Replica> {
        self.read().engine.replica().cloned()
    }

    pub fn len(&self) -> usize {
        self.read().engine.replica().map_or(0, Replica::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A cached document paired with this view
    pub fn document(&self, id: &str) -> Option<DocumentRef> {
        let document = self.read().engine.replica()?.get(id)?.clone();
        Some(DocumentRef { id: id.to_string(), document, view: self.clone() })
    }

    /// Every cached document paired with this view
    pub fn documents(&self) -> Vec<DocumentRef> {
        let state = self.read();
        let Some(replica) = state.engine.replica() else {
            return Vec::new();
        };
        replica
            .iter()
            .map(|(id, doc)| DocumentRef { id: id.clone(), document: doc.clone(), view: self.clone() })
            .collect()
    }

    fn with_field_map<T>(&self, build: impl FnOnce(&FieldMap) -> Result<T, EncodingError>) -> SyncResult<T> {
        let state = self.read();
        let field_map = state
            .field_map
            .as_ref()
            .ok_or_else(|| EncodingError::NotUpdateable(self.view().to_string()))?;
        Ok(build(field_map)?)
    }

    /// Commands setting every mapped field in `values`
    pub fn set_commands(&self, id: &str, values: &Document) -> SyncResult<ChangeSet> {
        self.with_field_map(|map| encode_set(map, id, values).map(ChangeSet::new))
    }

    /// Minimal commands moving `old_values` to `new_values`
    pub fn change_commands(
        &self,
        id: &str,
        new_values: &Document,
        old_values: Option<&Document>,
    ) -> SyncResult<ChangeSet> {
        self.with_field_map(|map| encode_diff(map, id, new_values, old_values).map(ChangeSet::new))
    }

    /// Copy only the mapped fields of `values`
    pub fn copy_fields(&self, values: &Document) -> SyncResult<Document> {
        self.with_field_map(|map| Ok(copy_fields(map, values)))
    }

    /// Commands updating cached document `id` to `values`
    pub fn update(&self, id: &str, values: &Document) -> SyncResult<ChangeSet> {
        let cached = self.read().engine.replica().and_then(|r| r.get(id)).cloned();
        if cached.is_none() {
            debug!("{}: {} is not cached, encoding a full set", self.view(), id);
        }
        self.change_commands(id, values, cached.as_ref())
    }

    /// Mapped fields of cached document `id`
    pub fn copy(&self, id: &str) -> SyncResult<Option<Document>> {
        let cached = self.read().engine.replica().and_then(|r| r.get(id)).cloned();
        cached.map(|doc| self.copy_fields(&doc)).transpose()
    }
}

impl fmt::Debug for ViewDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewDef")
            .field("view", &self.inner.view)
            .field("cell", &self.inner.cell)
            .field("sequence", &self.sequence())
            .finish()
    }
}

/// A document snapshot together with the view it came from
#[derive(Debug, Clone)]
pub struct DocumentRef {
    id: DocumentId,
    document: Document,
    view: ViewDef,
}

impl DocumentRef {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn get(&self, property: &str) -> Option<&serde_json::Value> {
        self.document.get(property)
    }

    pub fn view(&self) -> &ViewDef {
        &self.view
    }

    /// Commands moving this snapshot to `values`
    pub fn update(&self, values: &Document) -> SyncResult<ChangeSet> {
        self.view.change_commands(&self.id, values, Some(&self.document))
    }

    /// Mapped fields of this snapshot
    pub fn copy(&self) -> SyncResult<Document> {
        self.view.copy_fields(&self.document)
    }

    pub fn into_document(self) -> Document {
        self.document
    }
}

impl From<DocumentRef> for serde_json::Value {
    fn from(doc: DocumentRef) -> Self {
        serde_json::Value::Object(doc.document)
    }
}
