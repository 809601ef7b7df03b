//! Normalized records
//!
//! A [`Record`] is a flat map from field name to [`FieldValue`]. Nested
//! objects are never stored inline: they become records of their own and
//! the parent keeps a link to them.

use crate::data_id::DataId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Value of a record field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    /// Explicit null
    Null,
    /// Scalar or list of scalars
    Scalar(Value),
    /// Reference to another record
    Link(DataId),
    /// Ordered references, `None` for null list items
    Links(Vec<Option<DataId>>),
}

impl FieldValue {
    /// Scalar payload
    #[inline]
    #[must_use]
    pub fn as_scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(value) => Some(value),
            _ => None,
        }
    }

    /// Linked record id
    #[inline]
    #[must_use]
    pub fn as_link(&self) -> Option<&DataId> {
        match self {
            Self::Link(id) => Some(id),
            _ => None,
        }
    }

    /// Linked record ids
    #[inline]
    #[must_use]
    pub fn as_links(&self) -> Option<&[Option<DataId>]> {
        match self {
            Self::Links(ids) => Some(ids),
            _ => None,
        }
    }

    /// Whether the field is null
    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        if value.is_null() {
            Self::Null
        } else {
            Self::Scalar(value)
        }
    }
}

/// A normalized entity
///
/// # Invariants
/// - one record per [`DataId`] in a layer
/// - `__typename` is kept out of `fields`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    id: DataId,
    typename: String,
    fields: IndexMap<String, FieldValue>,
}

impl Record {
    /// Create empty record
    #[inline]
    #[must_use]
    pub fn new(id: DataId, typename: impl Into<String>) -> Self {
        Self {
            id,
            typename: typename.into(),
            fields: IndexMap::new(),
        }
    }

    /// Record id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &DataId {
        &self.id
    }

    /// Record typename
    #[inline]
    #[must_use]
    pub fn typename(&self) -> &str {
        &self.typename
    }

    /// Field value
    #[inline]
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Scalar field value
    #[inline]
    #[must_use]
    pub fn get_scalar(&self, field: &str) -> Option<&Value> {
        self.get(field).and_then(FieldValue::as_scalar)
    }

    /// Linked record id
    #[inline]
    #[must_use]
    pub fn get_link(&self, field: &str) -> Option<&DataId> {
        self.get(field).and_then(FieldValue::as_link)
    }

    /// Linked record ids, null items skipped
    #[must_use]
    pub fn get_links(&self, field: &str) -> Vec<DataId> {
        self.get(field)
            .and_then(FieldValue::as_links)
            .map(|ids| ids.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    /// Set field value
    #[inline]
    pub fn set(&mut self, field: impl Into<String>, value: FieldValue) {
        self.fields.insert(field.into(), value);
    }

    /// Remove field
    #[inline]
    pub fn remove(&mut self, field: &str) -> Option<FieldValue> {
        self.fields.shift_remove(field)
    }

    /// Iterate fields in insertion order
    #[inline]
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields
    #[inline]
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Merge another version of the same entity into this one
    ///
    /// Fields present in `other` overwrite ours; fields it lacks are kept.
    pub fn merge(&mut self, other: &Record) {
        debug_assert_eq!(self.id, other.id);
        if !other.typename.is_empty() {
            self.typename.clone_from(&other.typename);
        }
        for (field, value) in &other.fields {
            self.fields.insert(field.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_overwrites_and_keeps() {
        let id = DataId::entity("GalleryUser", "u1");
        let mut base = Record::new(id.clone(), "GalleryUser");
        base.set("username", FieldValue::Scalar(json!("ada")));
        base.set("bio", FieldValue::Scalar(json!("old")));

        let mut update = Record::new(id, "GalleryUser");
        update.set("bio", FieldValue::Scalar(json!("new")));

        base.merge(&update);
        assert_eq!(base.get_scalar("username"), Some(&json!("ada")));
        assert_eq!(base.get_scalar("bio"), Some(&json!("new")));
    }

    #[test]
    fn links_skip_nulls() {
        let mut record = Record::new(DataId::entity("GalleryUser", "u1"), "GalleryUser");
        record.set(
            "followers",
            FieldValue::Links(vec![
                Some(DataId::entity("GalleryUser", "u2")),
                None,
                Some(DataId::entity("GalleryUser", "u3")),
            ]),
        );
        assert_eq!(record.get_links("followers").len(), 2);
        assert!(record.get_links("missing").is_empty());
    }

    #[test]
    fn equality_ignores_field_order() {
        let id = DataId::entity("Token", "t1");
        let mut a = Record::new(id.clone(), "Token");
        a.set("a", FieldValue::Null);
        a.set("b", FieldValue::Scalar(json!(1)));
        let mut b = Record::new(id, "Token");
        b.set("b", FieldValue::Scalar(json!(1)));
        b.set("a", FieldValue::Null);
        assert_eq!(a, b);
    }

    #[test]
    fn null_json_becomes_null_field() {
        assert!(FieldValue::from(Value::Null).is_null());
        assert_eq!(
            FieldValue::from(json!(3)).as_scalar(),
            Some(&json!(3))
        );
    }
}
