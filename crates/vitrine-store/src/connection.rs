//! Paginated connections and the connection patcher
//!
//! A [`Connection`] is an ordered edge list plus the server's page
//! boundaries. Mutation updaters reach connections through
//! [`ConnectionHandler`], which rebuilds the composite key and patches the
//! connection in place.
//!
//! # Invariants
//! - Edge order is insertion/pagination order
//! - Local edge inserts and removals never touch [`PageInfo`]; cursors are
//!   owned by the server
//! - A node appears at most once in a connection

use crate::data_id::{ConnectionKey, DataId};
use crate::proxy::StoreProxy;
use crate::record::FieldValue;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One edge of a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Server cursor, `None` for edges inserted on the client
    pub cursor: Option<String>,
    /// Node record
    pub node: DataId,
}

impl Edge {
    /// Edge with a server cursor
    #[inline]
    #[must_use]
    pub fn new(node: DataId, cursor: impl Into<String>) -> Self {
        Self {
            cursor: Some(cursor.into()),
            node,
        }
    }
}

/// Page boundaries as reported by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageInfo {
    /// Cursor of the first fetched edge
    pub start_cursor: Option<String>,
    /// Cursor of the last fetched edge
    pub end_cursor: Option<String>,
    /// More edges after `end_cursor`
    pub has_next_page: bool,
    /// More edges before `start_cursor`
    pub has_previous_page: bool,
}

/// How an incoming page combines with a stored connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageMerge {
    /// Refetch: incoming edges and page info replace ours
    #[default]
    Replace,
    /// Forward pagination: incoming edges go after ours
    Append,
    /// Backward pagination: incoming edges go before ours
    Prepend,
}

/// Paginated edge list
#[derive(Debug, Clone, PartialEq)]
pub struct Connection {
    key: ConnectionKey,
    edges: Vec<Edge>,
    page_info: PageInfo,
    fields: IndexMap<String, FieldValue>,
}

impl Connection {
    /// Create empty connection
    #[inline]
    #[must_use]
    pub fn new(key: ConnectionKey) -> Self {
        Self {
            key,
            edges: Vec::new(),
            page_info: PageInfo::default(),
            fields: IndexMap::new(),
        }
    }

    /// With edges
    #[inline]
    #[must_use]
    pub fn with_edges(mut self, edges: Vec<Edge>) -> Self {
        self.edges = edges;
        self
    }

    /// With page info
    #[inline]
    #[must_use]
    pub fn with_page_info(mut self, page_info: PageInfo) -> Self {
        self.page_info = page_info;
        self
    }

    /// With a connection-level field (e.g. `unseenCount`)
    #[inline]
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(field.into(), value);
        self
    }

    /// Composite key
    #[inline]
    #[must_use]
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Edges in order
    #[inline]
    #[must_use]
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Page boundaries
    #[inline]
    #[must_use]
    pub fn page_info(&self) -> &PageInfo {
        &self.page_info
    }

    /// Node ids in edge order
    pub fn node_ids(&self) -> impl Iterator<Item = &DataId> {
        self.edges.iter().map(|edge| &edge.node)
    }

    /// Whether `node` has an edge
    #[inline]
    #[must_use]
    pub fn contains_node(&self, node: &DataId) -> bool {
        self.edges.iter().any(|edge| &edge.node == node)
    }

    /// Connection-level field
    #[inline]
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Connection-level scalar
    #[inline]
    #[must_use]
    pub fn scalar(&self, name: &str) -> Option<&Value> {
        self.field(name).and_then(FieldValue::as_scalar)
    }

    /// Set connection-level field
    #[inline]
    pub fn set_field(&mut self, name: impl Into<String>, value: FieldValue) {
        self.fields.insert(name.into(), value);
    }

    /// Append an edge; returns `false` if the node is already present
    pub fn push_edge(&mut self, edge: Edge) -> bool {
        if self.contains_node(&edge.node) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    /// Prepend an edge; returns `false` if the node is already present
    pub fn insert_edge_front(&mut self, edge: Edge) -> bool {
        if self.contains_node(&edge.node) {
            return false;
        }
        self.edges.insert(0, edge);
        true
    }

    /// Remove every edge pointing at `node`; returns how many were removed
    pub fn remove_node(&mut self, node: &DataId) -> usize {
        let before = self.edges.len();
        self.edges.retain(|edge| &edge.node != node);
        before - self.edges.len()
    }

    /// Combine an incoming page from the server
    pub fn merge_page(&mut self, incoming: &Connection, mode: PageMerge) {
        for (name, value) in &incoming.fields {
            self.fields.insert(name.clone(), value.clone());
        }
        match mode {
            PageMerge::Replace => {
                self.edges.clone_from(&incoming.edges);
                self.page_info = incoming.page_info.clone();
            }
            PageMerge::Append => {
                for edge in &incoming.edges {
                    self.push_edge(edge.clone());
                }
                self.page_info.end_cursor = incoming.page_info.end_cursor.clone();
                self.page_info.has_next_page = incoming.page_info.has_next_page;
            }
            PageMerge::Prepend => {
                let mut merged: Vec<Edge> = incoming
                    .edges
                    .iter()
                    .filter(|edge| !self.contains_node(&edge.node))
                    .cloned()
                    .collect();
                merged.append(&mut self.edges);
                self.edges = merged;
                self.page_info.start_cursor = incoming.page_info.start_cursor.clone();
                self.page_info.has_previous_page = incoming.page_info.has_previous_page;
            }
        }
    }
}

/// Connection patcher used by mutation updaters
///
/// Every operation looks the connection up by key first. A key that does
/// not resolve (the list was never fetched in this session) makes the call
/// a no-op returning `false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionHandler;

impl ConnectionHandler {
    /// Connection for `key`, if fetched
    #[inline]
    #[must_use]
    pub fn get<'p>(proxy: &'p StoreProxy<'_>, key: &ConnectionKey) -> Option<&'p Connection> {
        proxy.connection(key)
    }

    /// Run `patch` on the connection for `key`
    pub fn patch<F>(proxy: &mut StoreProxy<'_>, key: &ConnectionKey, patch: F) -> bool
    where
        F: FnOnce(&mut Connection),
    {
        match proxy.connection_mut(key) {
            Some(connection) => {
                patch(connection);
                true
            }
            None => {
                tracing::trace!(connection = %key, "connection not in store, skipping patch");
                false
            }
        }
    }

    /// Set a connection-level scalar
    pub fn set_field(
        proxy: &mut StoreProxy<'_>,
        key: &ConnectionKey,
        field: &str,
        value: Value,
    ) -> bool {
        Self::patch(proxy, key, |connection| {
            connection.set_field(field, FieldValue::from(value));
        })
    }

    /// Add `delta` to a numeric connection-level field, clamped at zero
    ///
    /// A missing or non-numeric field counts as zero.
    pub fn increment_field(
        proxy: &mut StoreProxy<'_>,
        key: &ConnectionKey,
        field: &str,
        delta: i64,
    ) -> bool {
        Self::patch(proxy, key, |connection| {
            let current = connection
                .scalar(field)
                .and_then(Value::as_i64)
                .unwrap_or(0);
            let next = current.saturating_add(delta).max(0);
            connection.set_field(field, FieldValue::Scalar(Value::from(next)));
        })
    }

    /// Append an edge at the end of the fetched range
    pub fn insert_edge_after(proxy: &mut StoreProxy<'_>, key: &ConnectionKey, edge: Edge) -> bool {
        Self::patch(proxy, key, |connection| {
            connection.push_edge(edge);
        })
    }

    /// Insert an edge at the start of the fetched range
    pub fn insert_edge_before(
        proxy: &mut StoreProxy<'_>,
        key: &ConnectionKey,
        edge: Edge,
    ) -> bool {
        Self::patch(proxy, key, |connection| {
            connection.insert_edge_front(edge);
        })
    }

    /// Remove every edge pointing at `node`
    pub fn delete_node(proxy: &mut StoreProxy<'_>, key: &ConnectionKey, node: &DataId) -> bool {
        Self::patch(proxy, key, |connection| {
            connection.remove_node(node);
        })
    }

    /// Client-side edge for `node`, no cursor
    #[inline]
    #[must_use]
    pub fn create_edge(node: DataId) -> Edge {
        Edge { cursor: None, node }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RecordSource;
    use serde_json::json;

    fn key() -> ConnectionKey {
        ConnectionKey::new(DataId::entity("Viewer", "v1"), "notifications")
    }

    fn node(id: &str) -> DataId {
        DataId::entity("Notification", id)
    }

    fn fetched() -> Connection {
        Connection::new(key())
            .with_edges(vec![Edge::new(node("n1"), "c1"), Edge::new(node("n2"), "c2")])
            .with_page_info(PageInfo {
                start_cursor: Some("c1".into()),
                end_cursor: Some("c2".into()),
                has_next_page: true,
                has_previous_page: false,
            })
            .with_field("unseenCount", FieldValue::Scalar(json!(2)))
    }

    #[test]
    fn local_inserts_keep_page_info() {
        let mut connection = fetched();
        let before = connection.page_info().clone();
        assert!(connection.push_edge(ConnectionHandler::create_edge(node("n3"))));
        assert!(connection.insert_edge_front(ConnectionHandler::create_edge(node("n0"))));
        assert_eq!(connection.page_info(), &before);

        let order: Vec<_> = connection.node_ids().map(DataId::as_str).collect();
        assert_eq!(
            order,
            vec!["Notification:n0", "Notification:n1", "Notification:n2", "Notification:n3"]
        );
    }

    #[test]
    fn duplicate_nodes_rejected() {
        let mut connection = fetched();
        assert!(!connection.push_edge(ConnectionHandler::create_edge(node("n1"))));
        assert_eq!(connection.edges().len(), 2);
    }

    #[test]
    fn remove_boundary_edge_keeps_cursor() {
        let mut connection = fetched();
        assert_eq!(connection.remove_node(&node("n2")), 1);
        assert_eq!(connection.page_info().end_cursor.as_deref(), Some("c2"));
    }

    #[test]
    fn append_page_moves_end_cursor_only() {
        let mut connection = fetched();
        let page = Connection::new(key())
            .with_edges(vec![Edge::new(node("n2"), "c2"), Edge::new(node("n3"), "c3")])
            .with_page_info(PageInfo {
                start_cursor: Some("c2".into()),
                end_cursor: Some("c3".into()),
                has_next_page: false,
                has_previous_page: true,
            });
        connection.merge_page(&page, PageMerge::Append);

        assert_eq!(connection.edges().len(), 3);
        assert_eq!(connection.page_info().start_cursor.as_deref(), Some("c1"));
        assert_eq!(connection.page_info().end_cursor.as_deref(), Some("c3"));
        assert!(!connection.page_info().has_next_page);
    }

    #[test]
    fn prepend_page_moves_start_cursor_only() {
        let mut connection = fetched();
        let page = Connection::new(key())
            .with_edges(vec![Edge::new(node("n0"), "c0")])
            .with_page_info(PageInfo {
                start_cursor: Some("c0".into()),
                end_cursor: Some("c0".into()),
                has_next_page: true,
                has_previous_page: false,
            });
        connection.merge_page(&page, PageMerge::Prepend);

        assert_eq!(connection.node_ids().next(), Some(&node("n0")));
        assert_eq!(connection.page_info().start_cursor.as_deref(), Some("c0"));
        assert_eq!(connection.page_info().end_cursor.as_deref(), Some("c2"));
    }

    #[test]
    fn patcher_on_missing_key_is_noop() {
        let base = RecordSource::new();
        let mut sink = RecordSource::new();
        let mut proxy = StoreProxy::new(Some(&base), &mut sink);

        assert!(!ConnectionHandler::set_field(&mut proxy, &key(), "unseenCount", json!(0)));
        assert!(!ConnectionHandler::delete_node(&mut proxy, &key(), &node("n1")));
        assert!(!ConnectionHandler::increment_field(&mut proxy, &key(), "unseenCount", -1));
        drop(proxy);
        assert!(sink.is_empty());
    }

    #[test]
    fn increment_clamps_at_zero() {
        let mut base = RecordSource::new();
        base.insert_connection(fetched());
        let mut sink = RecordSource::new();
        let mut proxy = StoreProxy::new(Some(&base), &mut sink);

        assert!(ConnectionHandler::increment_field(&mut proxy, &key(), "unseenCount", -5));
        assert_eq!(
            ConnectionHandler::get(&proxy, &key()).and_then(|c| c.scalar("unseenCount")),
            Some(&json!(0))
        );
        drop(proxy);
        // base untouched, patch went to the sink
        assert_eq!(
            base.connection(&key()).and_then(|c| c.scalar("unseenCount")),
            Some(&json!(2))
        );
    }
}
