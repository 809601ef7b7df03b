//! Optimistic response construction
//!
//! Builds a best-effort copy of a mutation's success payload from data the
//! caller already knows. The shape is not validated; if the server answers
//! with something different the optimistic layer is dropped and the real
//! payload wins.
//!
//! ```rust,ignore
//! let response = OptimisticResponse::payload("followUser", "FollowUserPayload")
//!     .field("user", entity("GalleryUser", user_id).with("followers", followers))
//!     .build();
//! ```

use serde_json::{Map, Value};

const TYPENAME: &str = "__typename";

/// Object with `__typename` and `id`
#[must_use]
pub fn entity(typename: &str, id: &str) -> Entity {
    let mut fields = Map::new();
    fields.insert(TYPENAME.into(), Value::String(typename.into()));
    fields.insert("id".into(), Value::String(id.into()));
    Entity { fields }
}

/// Object under construction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Entity {
    fields: Map<String, Value>,
}

impl Entity {
    /// Object with only a `__typename`
    #[must_use]
    pub fn typed(typename: &str) -> Self {
        let mut fields = Map::new();
        fields.insert(TYPENAME.into(), Value::String(typename.into()));
        Self { fields }
    }

    /// With a field
    #[must_use]
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// With a list of entities
    #[must_use]
    pub fn with_list<I>(self, field: impl Into<String>, items: I) -> Self
    where
        I: IntoIterator<Item = Entity>,
    {
        let items: Vec<Value> = items.into_iter().map(Value::from).collect();
        self.with(field, Value::Array(items))
    }
}

impl From<Entity> for Value {
    fn from(entity: Entity) -> Self {
        Value::Object(entity.fields)
    }
}

/// Optimistic mutation response
#[derive(Debug, Clone, PartialEq)]
pub struct OptimisticResponse {
    field: String,
    payload: Entity,
}

impl OptimisticResponse {
    /// Response whose mutation field `field` returns a `typename` payload
    #[must_use]
    pub fn payload(field: impl Into<String>, typename: &str) -> Self {
        Self {
            field: field.into(),
            payload: Entity::typed(typename),
        }
    }

    /// With a payload field
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload = self.payload.with(name, value);
        self
    }

    /// With an entity payload field
    #[must_use]
    pub fn entity(self, name: impl Into<String>, entity: Entity) -> Self {
        self.field(name, entity)
    }

    /// `{ "<field>": { "__typename": ..., ... } }`
    #[must_use]
    pub fn build(self) -> Value {
        let mut root = Map::new();
        root.insert(self.field, self.payload.into());
        Value::Object(root)
    }
}

impl From<OptimisticResponse> for Value {
    fn from(response: OptimisticResponse) -> Self {
        response.build()
    }
}
