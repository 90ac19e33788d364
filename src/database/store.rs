use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

use crate::database::manager::DatabaseError;

/// Named document collections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Users,
    Cars,
}

impl Collection {
    pub const ALL: [Collection; 2] = [Collection::Users, Collection::Cars];

    /// Table name; also the `$ref` value written into links
    pub fn table_name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Cars => "cars",
        }
    }

    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.table_name() == name)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Untyped access to JSON documents keyed by UUID.
///
/// Implementations must be safe to share across request tasks. No method
/// spans more than one document, so callers composing several writes get no
/// atomicity between them.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, id: Uuid) -> Result<Option<Value>, DatabaseError>;

    /// Every document in insertion order
    async fn find_all(&self, collection: Collection) -> Result<Vec<Value>, DatabaseError>;

    /// First document whose top-level string `field` equals `value`
    async fn find_one_by(
        &self,
        collection: Collection,
        field: &str,
        value: &str,
    ) -> Result<Option<Value>, DatabaseError>;

    /// Fails with `Conflict` if the id is taken
    async fn insert(&self, collection: Collection, id: Uuid, doc: Value) -> Result<(), DatabaseError>;

    /// Insert or fully replace
    async fn upsert(&self, collection: Collection, id: Uuid, doc: Value) -> Result<(), DatabaseError>;

    /// Shallow-merge `patch` over the stored document. `None` if the id is absent.
    async fn merge_update(
        &self,
        collection: Collection,
        id: Uuid,
        patch: Map<String, Value>,
    ) -> Result<Option<Value>, DatabaseError>;

    /// `true` if a document was removed
    async fn delete(&self, collection: Collection, id: Uuid) -> Result<bool, DatabaseError>;

    async fn ping(&self) -> Result<(), DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_round_trip() {
        for collection in Collection::ALL {
            assert_eq!(Collection::from_table_name(collection.table_name()), Some(collection));
        }
        assert_eq!(Collection::from_table_name("trucks"), None);
        assert_eq!(Collection::Cars.to_string(), "cars");
    }
}
