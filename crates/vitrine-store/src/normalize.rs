//! Response normalization
//!
//! Flattens a GraphQL response payload into a [`RecordSource`]:
//! - objects with an `id` become `TypeName:id` records
//! - id-less objects become client records under their parent
//! - objects with an `edges` array and a `pageInfo` object become
//!   [`Connection`]s keyed by parent, field and filter arguments
//!
//! The same entity reached through several paths ends up as one record.

use crate::connection::{Connection, Edge, PageInfo, PageMerge};
use crate::data_id::{Arguments, ConnectionKey, DataId, ROOT_TYPENAME};
use crate::error::NormalizeError;
use crate::record::{FieldValue, Record};
use crate::source::RecordSource;
use serde_json::{Map, Value};
use std::collections::HashMap;

const TYPENAME: &str = "__typename";
const CLIENT_TYPENAME: &str = "__Client";

/// Normalization options
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizeOptions {
    connection_args: HashMap<String, Arguments>,
    page_merge: PageMerge,
}

impl NormalizeOptions {
    /// Create default options
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter arguments for connections found under `field`
    #[must_use]
    pub fn with_connection_args(mut self, field: impl Into<String>, args: Arguments) -> Self {
        self.connection_args.insert(field.into(), args);
        self
    }

    /// How incoming connection pages combine with stored ones
    #[inline]
    #[must_use]
    pub fn with_page_merge(mut self, page_merge: PageMerge) -> Self {
        self.page_merge = page_merge;
        self
    }

    /// Page merge mode
    #[inline]
    #[must_use]
    pub fn page_merge(&self) -> PageMerge {
        self.page_merge
    }

    fn args_for(&self, field: &str) -> Arguments {
        self.connection_args.get(field).cloned().unwrap_or_default()
    }
}

/// Normalize `payload` as the fields of record `root`
///
/// # Errors
/// - `NormalizeError::NotAnObject` if `payload` is not an object
/// - `NormalizeError::MissingTypename` for identified objects without typename
/// - `NormalizeError::MixedList` for lists mixing objects and scalars
/// - `NormalizeError::InvalidPageInfo` for undecodable connection page info
pub fn normalize(
    payload: &Value,
    root: &DataId,
    options: &NormalizeOptions,
) -> Result<RecordSource, NormalizeError> {
    let object = payload
        .as_object()
        .ok_or_else(|| NormalizeError::NotAnObject(root.clone()))?;

    let typename = object
        .get(TYPENAME)
        .and_then(Value::as_str)
        .map_or_else(|| root_typename(root), str::to_string);

    let mut normalizer = Normalizer {
        options,
        source: RecordSource::new(),
    };
    normalizer.record(root.clone(), typename, object)?;
    Ok(normalizer.source)
}

fn root_typename(root: &DataId) -> String {
    if root.is_root() {
        ROOT_TYPENAME.to_string()
    } else {
        root.typename().unwrap_or(CLIENT_TYPENAME).to_string()
    }
}

struct Normalizer<'o> {
    options: &'o NormalizeOptions,
    source: RecordSource,
}

impl Normalizer<'_> {
    fn record(
        &mut self,
        id: DataId,
        typename: String,
        object: &Map<String, Value>,
    ) -> Result<(), NormalizeError> {
        let mut record = Record::new(id.clone(), typename);
        for (field, value) in object {
            if field == TYPENAME {
                continue;
            }
            if let Some(value) = self.field(&id, field, value)? {
                record.set(field.clone(), value);
            }
        }
        self.source.merge_record(record);
        Ok(())
    }

    /// `None` when the field was stored elsewhere (connections)
    fn field(
        &mut self,
        parent: &DataId,
        field: &str,
        value: &Value,
    ) -> Result<Option<FieldValue>, NormalizeError> {
        match value {
            Value::Null => Ok(Some(FieldValue::Null)),
            Value::Object(object) if is_connection(object) => {
                self.connection(parent, field, object)?;
                Ok(None)
            }
            Value::Object(object) => {
                let (id, typename) = identify(object, parent, field, None)?;
                self.record(id.clone(), typename, object)?;
                Ok(Some(FieldValue::Link(id)))
            }
            Value::Array(items) if items.iter().any(Value::is_object) => {
                let mut links = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    match item {
                        Value::Null => links.push(None),
                        Value::Object(object) => {
                            let (id, typename) = identify(object, parent, field, Some(index))?;
                            self.record(id.clone(), typename, object)?;
                            links.push(Some(id));
                        }
                        _ => {
                            return Err(NormalizeError::MixedList {
                                parent: parent.clone(),
                                field: field.to_string(),
                            })
                        }
                    }
                }
                Ok(Some(FieldValue::Links(links)))
            }
            scalar => Ok(Some(FieldValue::Scalar(scalar.clone()))),
        }
    }

    fn connection(
        &mut self,
        parent: &DataId,
        field: &str,
        object: &Map<String, Value>,
    ) -> Result<(), NormalizeError> {
        let key = ConnectionKey::with_args(parent.clone(), field, &self.options.args_for(field));
        let page_info: PageInfo = object
            .get("pageInfo")
            .cloned()
            .map(serde_json::from_value::<PageInfo>)
            .transpose()
            .map_err(|source| NormalizeError::InvalidPageInfo {
                key: key.to_string(),
                source,
            })?
            .unwrap_or_default();

        let mut edges = Vec::new();
        if let Some(Value::Array(raw_edges)) = object.get("edges") {
            for (index, raw_edge) in raw_edges.iter().enumerate() {
                let Some(edge) = raw_edge.as_object() else {
                    continue;
                };
                let Some(Value::Object(node)) = edge.get("node") else {
                    continue;
                };
                let (id, typename) = identify(node, parent, field, Some(index))?;
                self.record(id.clone(), typename, node)?;
                edges.push(Edge {
                    cursor: edge
                        .get("cursor")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    node: id,
                });
            }
        }

        let holder = DataId::new(key.to_string());
        let mut connection = Connection::new(key).with_edges(edges).with_page_info(page_info);
        for (name, value) in object {
            if matches!(name.as_str(), "edges" | "pageInfo" | TYPENAME) {
                continue;
            }
            if let Some(value) = self.field(&holder, name, value)? {
                connection.set_field(name.clone(), value);
            }
        }
        self.source.insert_connection(connection);
        Ok(())
    }
}

fn is_connection(object: &Map<String, Value>) -> bool {
    matches!(object.get("edges"), Some(Value::Array(_)))
        && matches!(object.get("pageInfo"), Some(Value::Object(_)))
}

fn identify(
    object: &Map<String, Value>,
    parent: &DataId,
    field: &str,
    index: Option<usize>,
) -> Result<(DataId, String), NormalizeError> {
    let typename = object.get(TYPENAME).and_then(Value::as_str);
    let raw_id = match object.get("id") {
        Some(Value::String(id)) => Some(id.clone()),
        Some(Value::Number(id)) => Some(id.to_string()),
        _ => None,
    };

    match (raw_id, typename) {
        (Some(id), Some(typename)) => Ok((DataId::entity(typename, &id), typename.to_string())),
        (Some(_), None) => Err(NormalizeError::missing_typename(parent, field)),
        (None, typename) => {
            let id = match index {
                Some(index) => DataId::client_item(parent, field, index),
                None => DataId::client(parent, field),
            };
            Ok((id, typename.unwrap_or(CLIENT_TYPENAME).to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn entities_are_normalized_once() {
        let payload = json!({
            "viewer": {
                "__typename": "Viewer",
                "id": "v1",
                "user": {"__typename": "GalleryUser", "id": "u1", "username": "ada"}
            },
            "userByUsername": {"__typename": "GalleryUser", "id": "u1", "bio": "hi"}
        });
        let source = normalize(&payload, &DataId::root(), &NormalizeOptions::new()).unwrap();

        let user = source.record(&DataId::entity("GalleryUser", "u1")).unwrap();
        assert_eq!(user.get_scalar("username"), Some(&json!("ada")));
        assert_eq!(user.get_scalar("bio"), Some(&json!("hi")));
        assert_eq!(
            source.records().filter(|r| r.typename() == "GalleryUser").count(),
            1
        );

        let root = source.record(&DataId::root()).unwrap();
        assert_eq!(root.typename(), ROOT_TYPENAME);
        assert_eq!(root.get_link("viewer"), Some(&DataId::entity("Viewer", "v1")));
    }

    #[test]
    fn id_less_objects_get_client_ids() {
        let payload = json!({
            "viewer": {
                "__typename": "Viewer",
                "id": "v1",
                "preferences": {"__typename": "Preferences", "theme": "dark"},
                "banners": [{"title": "a"}, null]
            }
        });
        let source = normalize(&payload, &DataId::root(), &NormalizeOptions::new()).unwrap();
        let viewer_id = DataId::entity("Viewer", "v1");
        let viewer = source.record(&viewer_id).unwrap();

        let prefs_id = DataId::client(&viewer_id, "preferences");
        assert_eq!(viewer.get_link("preferences"), Some(&prefs_id));
        assert_eq!(source.record(&prefs_id).unwrap().typename(), "Preferences");

        let banners = viewer.get("banners").and_then(FieldValue::as_links).unwrap();
        assert_eq!(banners.len(), 2);
        assert_eq!(banners[0], Some(DataId::client_item(&viewer_id, "banners", 0)));
        assert_eq!(banners[1], None);
    }

    #[test]
    fn scalar_lists_stay_scalar() {
        let payload = json!({"tags": ["a", "b"]});
        let source = normalize(&payload, &DataId::root(), &NormalizeOptions::new()).unwrap();
        assert_eq!(
            source.record(&DataId::root()).unwrap().get_scalar("tags"),
            Some(&json!(["a", "b"]))
        );
    }

    #[test]
    fn missing_typename_is_rejected() {
        let payload = json!({"viewer": {"id": "v1"}});
        let err = normalize(&payload, &DataId::root(), &NormalizeOptions::new()).unwrap_err();
        assert!(matches!(err, NormalizeError::MissingTypename { .. }));
    }

    #[test]
    fn mixed_lists_are_rejected() {
        let payload = json!({"items": [{"__typename": "Token", "id": "t1"}, 3]});
        let err = normalize(&payload, &DataId::root(), &NormalizeOptions::new()).unwrap_err();
        assert!(matches!(err, NormalizeError::MixedList { .. }));
    }

    #[test]
    fn non_object_payload_is_rejected() {
        let err = normalize(&json!([1]), &DataId::root(), &NormalizeOptions::new()).unwrap_err();
        assert!(matches!(err, NormalizeError::NotAnObject(_)));
    }

    #[test]
    fn connections_are_keyed_by_parent_field_and_args() {
        let payload = json!({
            "__typename": "Viewer",
            "id": "v1",
            "notifications": {
                "unseenCount": 2,
                "pageInfo": {"startCursor": "c1", "endCursor": "c2", "hasNextPage": true},
                "edges": [
                    {"cursor": "c1", "node": {"__typename": "Notification", "id": "n1", "seen": false}},
                    {"cursor": "c2", "node": {"__typename": "Notification", "id": "n2", "seen": false}}
                ]
            }
        });
        let mut args = Arguments::new();
        args.insert("unseenOnly".into(), json!(false));
        let options = NormalizeOptions::new().with_connection_args("notifications", args.clone());
        let viewer = DataId::entity("Viewer", "v1");
        let source = normalize(&payload, &viewer, &options).unwrap();

        let key = ConnectionKey::with_args(viewer.clone(), "notifications", &args);
        let connection = source.connection(&key).unwrap();
        assert_eq!(connection.edges().len(), 2);
        assert_eq!(connection.scalar("unseenCount"), Some(&json!(2)));
        assert_eq!(connection.page_info().end_cursor.as_deref(), Some("c2"));
        assert!(connection.page_info().has_next_page);
        assert!(source.has(&DataId::entity("Notification", "n2")));
        // the parent does not inline the connection
        assert!(source.record(&viewer).unwrap().get("notifications").is_none());
    }
}
