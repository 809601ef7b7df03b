//! Record sources
//!
//! A [`RecordSource`] is one layer of the store: the confirmed layer, the
//! optimistic overlay, or the output of normalizing a single response.
//! Overlay layers may hold tombstones (`None`) for records and connections
//! deleted by an optimistic update.

use crate::connection::Connection;
use crate::data_id::{ConnectionKey, DataId};
use crate::record::Record;
use std::collections::HashMap;

/// Lookup result within a single layer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordState<'a> {
    /// Record exists in this layer
    Present(&'a Record),
    /// Record was deleted in this layer
    Deleted,
    /// Layer knows nothing about the id
    Unknown,
}

/// One layer of records and connections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordSource {
    records: HashMap<DataId, Option<Record>>,
    connections: HashMap<ConnectionKey, Option<Connection>>,
}

impl RecordSource {
    /// Create empty source
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup a record in this layer only
    #[must_use]
    pub fn get(&self, id: &DataId) -> RecordState<'_> {
        match self.records.get(id) {
            Some(Some(record)) => RecordState::Present(record),
            Some(None) => RecordState::Deleted,
            None => RecordState::Unknown,
        }
    }

    /// Present record
    #[inline]
    #[must_use]
    pub fn record(&self, id: &DataId) -> Option<&Record> {
        self.records.get(id).and_then(Option::as_ref)
    }

    /// Mutable present record
    #[inline]
    pub fn record_mut(&mut self, id: &DataId) -> Option<&mut Record> {
        self.records.get_mut(id).and_then(Option::as_mut)
    }

    /// Whether the layer has a present record for `id`
    #[inline]
    #[must_use]
    pub fn has(&self, id: &DataId) -> bool {
        self.record(id).is_some()
    }

    /// Insert or replace a record
    #[inline]
    pub fn insert(&mut self, record: Record) {
        self.records.insert(record.id().clone(), Some(record));
    }

    /// Insert or replace a record, returning it
    pub fn insert_mut(&mut self, record: Record) -> &mut Record {
        self.records
            .entry(record.id().clone())
            .or_insert(None)
            .insert(record)
    }

    /// Merge a record into an existing one, or insert it
    pub fn merge_record(&mut self, record: Record) {
        match self.record_mut(record.id()) {
            Some(existing) => existing.merge(&record),
            None => self.insert(record),
        }
    }

    /// Mark a record deleted in this layer
    #[inline]
    pub fn tombstone(&mut self, id: DataId) {
        self.records.insert(id, None);
    }

    /// Forget everything this layer knows about `id`
    #[inline]
    pub fn remove(&mut self, id: &DataId) -> Option<Record> {
        self.records.remove(id).flatten()
    }

    /// Lookup a connection in this layer only
    ///
    /// Outer `None`: unknown. `Some(None)`: deleted.
    #[inline]
    #[must_use]
    pub fn connection_state(&self, key: &ConnectionKey) -> Option<Option<&Connection>> {
        self.connections.get(key).map(Option::as_ref)
    }

    /// Present connection
    #[inline]
    #[must_use]
    pub fn connection(&self, key: &ConnectionKey) -> Option<&Connection> {
        self.connections.get(key).and_then(Option::as_ref)
    }

    /// Mutable present connection
    #[inline]
    pub fn connection_mut(&mut self, key: &ConnectionKey) -> Option<&mut Connection> {
        self.connections.get_mut(key).and_then(Option::as_mut)
    }

    /// Insert or replace a connection
    #[inline]
    pub fn insert_connection(&mut self, connection: Connection) {
        self.connections
            .insert(connection.key().clone(), Some(connection));
    }

    /// Mark a connection deleted in this layer
    #[inline]
    pub fn tombstone_connection(&mut self, key: ConnectionKey) {
        self.connections.insert(key, None);
    }

    /// Forget everything this layer knows about `key`
    #[inline]
    pub fn remove_connection(&mut self, key: &ConnectionKey) -> Option<Connection> {
        self.connections.remove(key).flatten()
    }

    /// Iterate present records
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values().flatten()
    }

    /// Iterate present connections
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values().flatten()
    }

    /// Number of entries (tombstones included)
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len() + self.connections.len()
    }

    /// Whether the layer is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.connections.is_empty()
    }

    /// Drop every entry
    #[inline]
    pub fn clear(&mut self) {
        self.records.clear();
        self.connections.clear();
    }

    /// Lay `overlay` over this layer
    ///
    /// Present overlay entries replace ours, tombstones remove ours.
    pub fn apply_overlay(&mut self, overlay: &RecordSource) {
        for (id, entry) in &overlay.records {
            match entry {
                Some(record) => {
                    self.records.insert(id.clone(), Some(record.clone()));
                }
                None => {
                    self.records.remove(id);
                }
            }
        }
        for (key, entry) in &overlay.connections {
            match entry {
                Some(connection) => {
                    self.connections.insert(key.clone(), Some(connection.clone()));
                }
                None => {
                    self.connections.remove(key);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;
    use serde_json::json;

    fn user(id: &str, name: &str) -> Record {
        let mut record = Record::new(DataId::entity("GalleryUser", id), "GalleryUser");
        record.set("username", FieldValue::Scalar(json!(name)));
        record
    }

    #[test]
    fn states() {
        let mut source = RecordSource::new();
        let id = DataId::entity("GalleryUser", "u1");
        assert_eq!(source.get(&id), RecordState::Unknown);

        source.insert(user("u1", "ada"));
        assert!(matches!(source.get(&id), RecordState::Present(_)));

        source.tombstone(id.clone());
        assert_eq!(source.get(&id), RecordState::Deleted);
        assert!(source.record(&id).is_none());

        source.remove(&id);
        assert_eq!(source.get(&id), RecordState::Unknown);
    }

    #[test]
    fn merge_record_keeps_single_entry() {
        let mut source = RecordSource::new();
        source.merge_record(user("u1", "ada"));
        let mut extra = Record::new(DataId::entity("GalleryUser", "u1"), "GalleryUser");
        extra.set("bio", FieldValue::Scalar(json!("hi")));
        source.merge_record(extra);

        assert_eq!(source.records().count(), 1);
        let merged = source.record(&DataId::entity("GalleryUser", "u1")).unwrap();
        assert_eq!(merged.get_scalar("username"), Some(&json!("ada")));
        assert_eq!(merged.get_scalar("bio"), Some(&json!("hi")));
    }

    #[test]
    fn overlay_tombstones_remove() {
        let mut base = RecordSource::new();
        base.insert(user("u1", "ada"));
        base.insert(user("u2", "bob"));

        let mut overlay = RecordSource::new();
        overlay.tombstone(DataId::entity("GalleryUser", "u1"));
        overlay.insert(user("u2", "bobby"));

        base.apply_overlay(&overlay);
        assert!(!base.has(&DataId::entity("GalleryUser", "u1")));
        assert_eq!(
            base.record(&DataId::entity("GalleryUser", "u2"))
                .and_then(|r| r.get_scalar("username")),
            Some(&json!("bobby"))
        );
    }
}
