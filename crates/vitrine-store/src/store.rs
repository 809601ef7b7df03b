//! Two-layer normalized store
//!
//! - **Confirmed layer**: everything the server has acknowledged
//! - **Optimistic overlay**: the pending optimistic updates, replayed in
//!   registration order on top of the confirmed layer
//!
//! Reads see the overlay first. Settling a mutation (commit or rollback)
//! drops its pending update and rebuilds the overlay from the ones still
//! pending, so a settled optimistic patch never lingers and never mixes with
//! the server payload that replaced it.

use crate::connection::{Connection, PageMerge};
use crate::data_id::{ConnectionKey, DataId};
use crate::error::{StoreError, StoreResult};
use crate::normalize::{normalize, NormalizeOptions};
use crate::proxy::StoreProxy;
use crate::record::Record;
use crate::source::{RecordSource, RecordState};
use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use ulid::Ulid;

/// Store mutation run by updaters
///
/// Receives a proxy onto the layer being written and the payload the update
/// belongs to (server data, or the optimistic response, or `Null`).
pub type Updater = Arc<dyn Fn(&mut StoreProxy<'_>, &Value) + Send + Sync>;

/// Identifier of one mutation invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MutationId(pub Ulid);

impl MutationId {
    /// Generate new mutation ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for MutationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MutationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optimistic response plus normalization context
#[derive(Debug, Clone)]
pub struct OptimisticPayload {
    /// Response shaped like the server's success variant
    pub data: Value,
    /// Record the payload fields belong to
    pub root: DataId,
    /// Normalization options
    pub options: NormalizeOptions,
}

impl OptimisticPayload {
    /// Payload rooted at `client:root`
    #[inline]
    #[must_use]
    pub fn new(data: Value) -> Self {
        Self {
            data,
            root: DataId::root(),
            options: NormalizeOptions::default(),
        }
    }

    /// With normalization options
    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: NormalizeOptions) -> Self {
        self.options = options;
        self
    }
}

/// One optimistic update awaiting settlement
#[derive(Clone)]
pub struct PendingUpdate {
    id: MutationId,
    response: Option<OptimisticPayload>,
    updater: Option<Updater>,
}

impl PendingUpdate {
    /// Empty update for `id`
    #[inline]
    #[must_use]
    pub fn new(id: MutationId) -> Self {
        Self {
            id,
            response: None,
            updater: None,
        }
    }

    /// With optimistic response
    #[inline]
    #[must_use]
    pub fn with_response(mut self, response: OptimisticPayload) -> Self {
        self.response = Some(response);
        self
    }

    /// With optimistic updater
    #[inline]
    #[must_use]
    pub fn with_updater(mut self, updater: Updater) -> Self {
        self.updater = Some(updater);
        self
    }

    /// Mutation id
    #[inline]
    #[must_use]
    pub fn id(&self) -> MutationId {
        self.id
    }

    /// Whether the update would change anything
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.response.is_none() && self.updater.is_none()
    }
}

impl fmt::Debug for PendingUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingUpdate")
            .field("id", &self.id)
            .field("response", &self.response)
            .field("has_updater", &self.updater.is_some())
            .finish()
    }
}

/// Pending update with its response already normalized
struct PreparedUpdate {
    id: MutationId,
    source: Option<RecordSource>,
    page_merge: PageMerge,
    data: Value,
    updater: Option<Updater>,
}

impl PreparedUpdate {
    fn replay(&self, proxy: &mut StoreProxy<'_>) {
        if let Some(source) = &self.source {
            proxy.publish(source, self.page_merge);
        }
        if let Some(updater) = &self.updater {
            updater(proxy, &self.data);
        }
    }
}

#[derive(Default)]
struct StoreState {
    confirmed: RecordSource,
    pending: Vec<PreparedUpdate>,
    overlay: RecordSource,
}

impl StoreState {
    fn rebuild_overlay(&mut self) {
        let mut overlay = RecordSource::new();
        for update in &self.pending {
            let mut proxy = StoreProxy::new(Some(&self.confirmed), &mut overlay);
            update.replay(&mut proxy);
        }
        self.overlay = overlay;
    }

    fn lookup(&self, id: &DataId) -> Option<&Record> {
        match self.overlay.get(id) {
            RecordState::Present(record) => Some(record),
            RecordState::Deleted => None,
            RecordState::Unknown => self.confirmed.record(id),
        }
    }

    fn connection(&self, key: &ConnectionKey) -> Option<&Connection> {
        match self.overlay.connection_state(key) {
            Some(state) => state,
            None => self.confirmed.connection(key),
        }
    }
}

/// Normalized client cache with an optimistic overlay
///
/// Thread-safe; share it behind an `Arc`.
pub struct Store {
    state: RwLock<StoreState>,
    version: watch::Sender<u64>,
}

impl Store {
    /// Create empty store
    #[must_use]
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: RwLock::new(StoreState::default()),
            version,
        }
    }

    /// Watch the store version; it moves on every visible change
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Current store version
    #[inline]
    #[must_use]
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    fn bump(&self) {
        self.version.send_modify(|version| *version += 1);
    }

    /// Merge a normalized source into the confirmed layer
    pub fn publish(&self, source: &RecordSource, page_merge: PageMerge) {
        {
            let mut state = self.state.write();
            StoreProxy::new(None, &mut state.confirmed).publish(source, page_merge);
            state.rebuild_overlay();
        }
        self.bump();
    }

    /// Normalize a query response and publish it
    ///
    /// # Errors
    /// Returns error if the payload does not normalize; nothing is written
    pub fn publish_response(
        &self,
        payload: &Value,
        root: &DataId,
        options: &NormalizeOptions,
    ) -> StoreResult<()> {
        let source = normalize(payload, root, options)?;
        self.publish(&source, options.page_merge());
        Ok(())
    }

    /// Publish a server payload and run `updater` on the confirmed layer
    ///
    /// Used for settled mutations and subscription events.
    ///
    /// # Errors
    /// Returns error if the payload does not normalize; nothing is written
    pub fn publish_payload(
        &self,
        payload: &Value,
        root: &DataId,
        options: &NormalizeOptions,
        updater: Option<&Updater>,
    ) -> StoreResult<()> {
        let source = normalize(payload, root, options)?;
        {
            let mut state = self.state.write();
            write_confirmed(&mut state, &source, options.page_merge(), payload, updater);
            state.rebuild_overlay();
        }
        self.bump();
        Ok(())
    }

    /// Run a local-only updater against the confirmed layer
    pub fn update<F>(&self, updater: F)
    where
        F: FnOnce(&mut StoreProxy<'_>),
    {
        {
            let mut state = self.state.write();
            updater(&mut StoreProxy::new(None, &mut state.confirmed));
            state.rebuild_overlay();
        }
        self.bump();
    }

    /// Register an optimistic update and apply it immediately
    ///
    /// # Errors
    /// - `StoreError::DuplicateMutation` if `update.id()` is already pending
    /// - `StoreError::Normalize` if the optimistic response does not normalize
    pub fn apply_optimistic(&self, update: PendingUpdate) -> StoreResult<()> {
        let PendingUpdate {
            id,
            response,
            updater,
        } = update;

        let (source, page_merge, data) = match response {
            Some(payload) => (
                Some(normalize(&payload.data, &payload.root, &payload.options)?),
                payload.options.page_merge(),
                payload.data,
            ),
            None => (None, PageMerge::default(), Value::Null),
        };
        let prepared = PreparedUpdate {
            id,
            source,
            page_merge,
            data,
            updater,
        };

        {
            let mut state = self.state.write();
            if state.pending.iter().any(|pending| pending.id == id) {
                return Err(StoreError::DuplicateMutation(id));
            }
            // later updates replay on top of earlier ones, so the new one
            // only needs to be laid over the current overlay
            let StoreState {
                confirmed,
                overlay,
                pending,
            } = &mut *state;
            prepared.replay(&mut StoreProxy::new(Some(&*confirmed), overlay));
            pending.push(prepared);
        }
        tracing::debug!(mutation = %id, "optimistic update applied");
        self.bump();
        Ok(())
    }

    /// Settle a mutation successfully
    ///
    /// Drops the pending update for `id` (if any), publishes the server
    /// payload into the confirmed layer, runs `updater` on it, and replays
    /// the remaining pending updates.
    ///
    /// # Errors
    /// Returns error if the payload does not normalize; the pending update is
    /// left in place so the caller can roll it back
    pub fn commit(
        &self,
        id: MutationId,
        payload: &Value,
        root: &DataId,
        options: &NormalizeOptions,
        updater: Option<&Updater>,
    ) -> StoreResult<()> {
        let source = normalize(payload, root, options)?;
        {
            let mut state = self.state.write();
            state.pending.retain(|pending| pending.id != id);
            write_confirmed(&mut state, &source, options.page_merge(), payload, updater);
            state.rebuild_overlay();
        }
        tracing::debug!(mutation = %id, "mutation committed");
        self.bump();
        Ok(())
    }

    /// Settle a mutation as failed, discarding its optimistic update
    ///
    /// Returns `false` if nothing was pending for `id`.
    pub fn rollback(&self, id: MutationId) -> bool {
        let removed = {
            let mut state = self.state.write();
            let before = state.pending.len();
            state.pending.retain(|pending| pending.id != id);
            let removed = state.pending.len() != before;
            if removed {
                state.rebuild_overlay();
            }
            removed
        };
        if removed {
            tracing::debug!(mutation = %id, "optimistic update rolled back");
            self.bump();
        }
        removed
    }

    /// Whether `id` has a pending optimistic update
    #[must_use]
    pub fn is_pending(&self, id: MutationId) -> bool {
        self.state.read().pending.iter().any(|pending| pending.id == id)
    }

    /// Number of pending optimistic updates
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.state.read().pending.len()
    }

    /// Record as currently visible
    #[must_use]
    pub fn lookup(&self, id: &DataId) -> Option<Record> {
        self.state.read().lookup(id).cloned()
    }

    /// Connection as currently visible
    #[must_use]
    pub fn connection(&self, key: &ConnectionKey) -> Option<Connection> {
        self.state.read().connection(key).cloned()
    }

    /// Full visible state: confirmed layer with the overlay laid on top
    #[must_use]
    pub fn snapshot(&self) -> RecordSource {
        let state = self.state.read();
        let mut snapshot = state.confirmed.clone();
        snapshot.apply_overlay(&state.overlay);
        snapshot
    }

    /// Confirmed layer only
    #[must_use]
    pub fn confirmed_snapshot(&self) -> RecordSource {
        self.state.read().confirmed.clone()
    }

    /// Evict a record from the confirmed layer
    pub fn evict(&self, id: &DataId) {
        {
            let mut state = self.state.write();
            state.confirmed.remove(id);
            state.rebuild_overlay();
        }
        self.bump();
    }

    /// Drop everything: confirmed records and pending updates
    ///
    /// Mutations still in flight will settle against an empty store.
    pub fn reset(&self) {
        {
            let mut state = self.state.write();
            state.confirmed.clear();
            state.pending.clear();
            state.overlay.clear();
        }
        tracing::debug!("store reset");
        self.bump();
    }
}

fn write_confirmed(
    state: &mut StoreState,
    source: &RecordSource,
    page_merge: PageMerge,
    payload: &Value,
    updater: Option<&Updater>,
) {
    let mut proxy = StoreProxy::new(None, &mut state.confirmed);
    proxy.publish(source, page_merge);
    if let Some(updater) = updater {
        updater(&mut proxy, payload);
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Store")
            .field("confirmed", &state.confirmed.len())
            .field("pending", &state.pending.len())
            .field("overlay", &state.overlay.len())
            .finish()
    }
}
