//! Mutable store view handed to updaters
//!
//! Reads fall through the sink to the base layer; writes copy the record
//! into the sink first. For confirmed writes there is no base and the sink
//! is the confirmed layer itself.

use crate::connection::{Connection, PageMerge};
use crate::data_id::{ConnectionKey, DataId, ROOT_TYPENAME};
use crate::record::{FieldValue, Record};
use crate::source::{RecordSource, RecordState};
use serde_json::Value;

/// Copy-on-write view over one or two layers
#[derive(Debug)]
pub struct StoreProxy<'a> {
    base: Option<&'a RecordSource>,
    sink: &'a mut RecordSource,
}

impl<'a> StoreProxy<'a> {
    /// Proxy writing into `sink`, reading through to `base`
    #[inline]
    #[must_use]
    pub fn new(base: Option<&'a RecordSource>, sink: &'a mut RecordSource) -> Self {
        Self { base, sink }
    }

    /// Record visible through this proxy
    #[must_use]
    pub fn get(&self, id: &DataId) -> Option<&Record> {
        match self.sink.get(id) {
            RecordState::Present(record) => Some(record),
            RecordState::Deleted => None,
            RecordState::Unknown => self.base.and_then(|base| base.record(id)),
        }
    }

    /// Mutable record, copied into the sink on first write
    pub fn get_mut(&mut self, id: &DataId) -> Option<&mut Record> {
        if self.sink.get(id) == RecordState::Unknown {
            let copied = self.base.and_then(|base| base.record(id)).cloned()?;
            self.sink.insert(copied);
        }
        self.sink.record_mut(id)
    }

    /// Create (or overwrite) a record
    pub fn create(&mut self, id: DataId, typename: &str) -> &mut Record {
        self.sink.insert_mut(Record::new(id, typename))
    }

    /// Existing record or a fresh one
    pub fn get_or_create(&mut self, id: &DataId, typename: &str) -> &mut Record {
        let record = self
            .get(id)
            .cloned()
            .unwrap_or_else(|| Record::new(id.clone(), typename));
        self.sink.insert_mut(record)
    }

    /// Root record, created on demand
    pub fn root(&mut self) -> &mut Record {
        self.get_or_create(&DataId::root(), ROOT_TYPENAME)
    }

    /// Delete a record
    pub fn delete(&mut self, id: &DataId) {
        if self.base.is_some() {
            self.sink.tombstone(id.clone());
        } else {
            self.sink.remove(id);
        }
    }

    /// Scalar field of a record
    #[must_use]
    pub fn get_value(&self, id: &DataId, field: &str) -> Option<&Value> {
        self.get(id).and_then(|record| record.get_scalar(field))
    }

    /// Set a scalar field; `false` if the record is not in the store
    pub fn set_value(&mut self, id: &DataId, field: &str, value: Value) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.set(field, FieldValue::from(value));
                true
            }
            None => false,
        }
    }

    /// Linked record id
    #[must_use]
    pub fn get_linked_record(&self, id: &DataId, field: &str) -> Option<&DataId> {
        self.get(id).and_then(|record| record.get_link(field))
    }

    /// Set a link; `false` if the record is not in the store
    pub fn set_linked_record(&mut self, id: &DataId, field: &str, target: DataId) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.set(field, FieldValue::Link(target));
                true
            }
            None => false,
        }
    }

    /// Linked record ids, null items skipped
    #[must_use]
    pub fn get_linked_records(&self, id: &DataId, field: &str) -> Vec<DataId> {
        self.get(id)
            .map(|record| record.get_links(field))
            .unwrap_or_default()
    }

    /// Replace a link list; `false` if the record is not in the store
    pub fn set_linked_records(&mut self, id: &DataId, field: &str, targets: Vec<DataId>) -> bool {
        match self.get_mut(id) {
            Some(record) => {
                record.set(
                    field,
                    FieldValue::Links(targets.into_iter().map(Some).collect()),
                );
                true
            }
            None => false,
        }
    }

    /// Connection visible through this proxy
    #[must_use]
    pub fn connection(&self, key: &ConnectionKey) -> Option<&Connection> {
        match self.sink.connection_state(key) {
            Some(state) => state,
            None => self.base.and_then(|base| base.connection(key)),
        }
    }

    /// Mutable connection, copied into the sink on first write
    pub fn connection_mut(&mut self, key: &ConnectionKey) -> Option<&mut Connection> {
        if self.sink.connection_state(key).is_none() {
            let copied = self.base.and_then(|base| base.connection(key)).cloned()?;
            self.sink.insert_connection(copied);
        }
        self.sink.connection_mut(key)
    }

    /// Insert or replace a connection
    #[inline]
    pub fn insert_connection(&mut self, connection: Connection) {
        self.sink.insert_connection(connection);
    }

    /// Delete a connection
    pub fn delete_connection(&mut self, key: &ConnectionKey) {
        if self.base.is_some() {
            self.sink.tombstone_connection(key.clone());
        } else {
            self.sink.remove_connection(key);
        }
    }

    /// Merge a normalized response into the sink
    pub fn publish(&mut self, source: &RecordSource, merge: PageMerge) {
        for record in source.records() {
            match self.get_mut(record.id()) {
                Some(existing) => existing.merge(record),
                None => self.sink.insert(record.clone()),
            }
        }
        for connection in source.connections() {
            match self.connection_mut(connection.key()) {
                Some(existing) => existing.merge_page(connection, merge),
                None => self.sink.insert_connection(connection.clone()),
            }
        }
    }
}
