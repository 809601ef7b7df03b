//! Record and connection keys
//!
//! Every record in the store is addressed by a [`DataId`]:
//! - entities use `TypeName:id`
//! - the root record is `client:root`
//! - records without an identity hang off their parent as client records
//!
//! Paginated lists are addressed by a [`ConnectionKey`], built from the
//! parent record, the field name and the filter arguments.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Data id of the root record
pub const ROOT_ID: &str = "client:root";

/// Typename given to the root record
pub const ROOT_TYPENAME: &str = "__Root";

const CLIENT_PREFIX: &str = "client:";

/// Filter arguments of a connection field
///
/// A `BTreeMap` so that two argument sets with the same entries produce the
/// same key whatever order they were built in.
pub type Arguments = BTreeMap<String, Value>;

/// Stable record key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataId(String);

impl DataId {
    /// Wrap a raw key
    #[inline]
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Root record id
    #[inline]
    #[must_use]
    pub fn root() -> Self {
        Self(ROOT_ID.to_string())
    }

    /// Entity id: `TypeName:id`
    #[inline]
    #[must_use]
    pub fn entity(typename: &str, id: &str) -> Self {
        Self(format!("{typename}:{id}"))
    }

    /// Client id for an id-less object stored under `parent.field`
    #[inline]
    #[must_use]
    pub fn client(parent: &DataId, field: &str) -> Self {
        Self(format!("{CLIENT_PREFIX}{parent}:{field}"))
    }

    /// Client id for the `index`-th id-less item of a list field
    #[inline]
    #[must_use]
    pub fn client_item(parent: &DataId, field: &str, index: usize) -> Self {
        Self(format!("{CLIENT_PREFIX}{parent}:{field}:{index}"))
    }

    /// Raw key
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id was generated on the client
    #[inline]
    #[must_use]
    pub fn is_client(&self) -> bool {
        self.0.starts_with(CLIENT_PREFIX)
    }

    /// Whether this is the root record
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == ROOT_ID
    }

    /// Typename prefix of an entity id
    ///
    /// Returns `None` for client ids and keys without a `:` separator.
    #[must_use]
    pub fn typename(&self) -> Option<&str> {
        if self.is_client() {
            return None;
        }
        self.0.split_once(':').map(|(typename, _)| typename)
    }

    /// Id part of an entity id
    #[must_use]
    pub fn entity_id(&self) -> Option<&str> {
        if self.is_client() {
            return None;
        }
        self.0.split_once(':').map(|(_, id)| id)
    }
}

impl fmt::Display for DataId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DataId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for DataId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Composite key of a paginated connection
///
/// Parent id + field name + canonical serialization of the filter arguments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionKey {
    parent: DataId,
    field: String,
    args: String,
}

impl ConnectionKey {
    /// Connection key without filter arguments
    #[inline]
    #[must_use]
    pub fn new(parent: DataId, field: impl Into<String>) -> Self {
        Self::with_args(parent, field, &Arguments::new())
    }

    /// Connection key with filter arguments
    #[must_use]
    pub fn with_args(parent: DataId, field: impl Into<String>, args: &Arguments) -> Self {
        let args = if args.is_empty() {
            String::new()
        } else {
            let mut out = String::new();
            write_canonical(&Value::Object(args.clone().into_iter().collect()), &mut out);
            out
        };
        Self {
            parent,
            field: field.into(),
            args,
        }
    }

    /// Parent record
    #[inline]
    #[must_use]
    pub fn parent(&self) -> &DataId {
        &self.parent
    }

    /// Field name
    #[inline]
    #[must_use]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// Serialized filter arguments (empty when there are none)
    #[inline]
    #[must_use]
    pub fn serialized_args(&self) -> &str {
        &self.args
    }
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{CLIENT_PREFIX}{}:__{}_connection", self.parent, self.field)?;
        if !self.args.is_empty() {
            write!(f, "({})", self.args)?;
        }
        Ok(())
    }
}

/// JSON with object keys sorted at every depth
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entity_id_format() {
        let id = DataId::entity("GalleryUser", "u1");
        assert_eq!(id.as_str(), "GalleryUser:u1");
        assert_eq!(id.typename(), Some("GalleryUser"));
        assert_eq!(id.entity_id(), Some("u1"));
        assert!(!id.is_client());
    }

    #[test]
    fn client_ids() {
        let root = DataId::root();
        assert!(root.is_root());
        let child = DataId::client(&root, "viewer");
        assert_eq!(child.as_str(), "client:client:root:viewer");
        assert!(child.is_client());
        assert_eq!(child.typename(), None);

        let item = DataId::client_item(&root, "banners", 2);
        assert_eq!(item.as_str(), "client:client:root:banners:2");
    }

    #[test]
    fn connection_key_without_args() {
        let key = ConnectionKey::new(DataId::entity("Viewer", "v1"), "notifications");
        assert_eq!(key.to_string(), "client:Viewer:v1:__notifications_connection");
    }

    #[test]
    fn connection_key_args_are_order_independent() {
        let mut a = Arguments::new();
        a.insert("unseen".into(), json!(true));
        a.insert("kind".into(), json!({"b": 1, "a": 2}));

        let mut b = Arguments::new();
        b.insert("kind".into(), json!({"a": 2, "b": 1}));
        b.insert("unseen".into(), json!(true));

        let parent = DataId::entity("Viewer", "v1");
        let ka = ConnectionKey::with_args(parent.clone(), "notifications", &a);
        let kb = ConnectionKey::with_args(parent, "notifications", &b);
        assert_eq!(ka, kb);
        assert_eq!(
            ka.to_string(),
            r#"client:Viewer:v1:__notifications_connection({"kind":{"a":2,"b":1},"unseen":true})"#
        );
    }

    #[test]
    fn different_args_different_keys() {
        let parent = DataId::entity("Viewer", "v1");
        let mut args = Arguments::new();
        args.insert("unseen".into(), json!(true));
        assert_ne!(
            ConnectionKey::new(parent.clone(), "notifications"),
            ConnectionKey::with_args(parent, "notifications", &args)
        );
    }
}
