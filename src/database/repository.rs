use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::store::{Collection, DocumentStore};

/// A type stored as one JSON document in a collection
pub trait Document: Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> Option<Uuid>;

    fn set_id(&mut self, id: Uuid);

    /// Documents this one links to that should be written with it under `WriteRule::Write`
    fn linked_documents(&self) -> Result<Vec<LinkedDocument>, DatabaseError> {
        Ok(Vec::new())
    }
}

/// Serialized form of a linked document, ready for the store
#[derive(Debug, Clone, PartialEq)]
pub struct LinkedDocument {
    pub collection: Collection,
    pub id: Uuid,
    pub body: Value,
}

/// What happens to linked documents on insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteRule {
    /// Upsert every fetched link before the owner
    Write,
    /// Store the references only
    DoNothing,
}

/// Typed access to one collection
pub struct Repository<T> {
    store: Arc<dyn DocumentStore>,
    _phantom: PhantomData<T>,
}

impl<T> Clone for Repository<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _phantom: PhantomData,
        }
    }
}

impl<T: Document> Repository<T> {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _phantom: PhantomData,
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<T>, DatabaseError> {
        self.store
            .get(T::COLLECTION, id)
            .await?
            .map(Self::decode)
            .transpose()
    }

    pub async fn find_all(&self) -> Result<Vec<T>, DatabaseError> {
        self.store
            .find_all(T::COLLECTION)
            .await?
            .into_iter()
            .map(Self::decode)
            .collect()
    }

    pub async fn find_one_by(&self, field: &str, value: &str) -> Result<Option<T>, DatabaseError> {
        self.store
            .find_one_by(T::COLLECTION, field, value)
            .await?
            .map(Self::decode)
            .transpose()
    }

    /// Assign a fresh id and store the document.
    ///
    /// With `WriteRule::Write` the linked documents are upserted first, one
    /// write each, then the owner is inserted. The sequence is not atomic: a
    /// failure on the owner insert leaves the linked writes in place.
    pub async fn insert(&self, mut doc: T, rule: WriteRule) -> Result<T, DatabaseError> {
        if rule == WriteRule::Write {
            for linked in doc.linked_documents()? {
                debug!("link-write {} {}", linked.collection, linked.id);
                self.store.upsert(linked.collection, linked.id, linked.body).await?;
            }
        }

        let id = Uuid::new_v4();
        doc.set_id(id);
        let body = serde_json::to_value(&doc)?;
        self.store.insert(T::COLLECTION, id, body).await?;
        Ok(doc)
    }

    /// Shallow-merge `fields` onto the stored document. `None` if absent.
    pub async fn merge_update(
        &self,
        id: Uuid,
        fields: Map<String, Value>,
    ) -> Result<Option<T>, DatabaseError> {
        self.store
            .merge_update(T::COLLECTION, id, fields)
            .await?
            .map(Self::decode)
            .transpose()
    }

    pub async fn delete(&self, id: Uuid) -> Result<bool, DatabaseError> {
        self.store.delete(T::COLLECTION, id).await
    }

    fn decode(value: Value) -> Result<T, DatabaseError> {
        Ok(serde_json::from_value(value)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::link::Link;
    use crate::database::memory::MemoryDocumentStore;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct Owner {
        id: Option<Uuid>,
        name: String,
    }

    impl Document for Owner {
        const COLLECTION: Collection = Collection::Users;
        fn id(&self) -> Option<Uuid> {
            self.id
        }
        fn set_id(&mut self, id: Uuid) {
            self.id = Some(id);
        }
    }

    #[derive(Debug, Serialize, Deserialize)]
    struct Owned {
        id: Option<Uuid>,
        label: String,
        owner: Link<Owner>,
    }

    impl Document for Owned {
        const COLLECTION: Collection = Collection::Cars;
        fn id(&self) -> Option<Uuid> {
            self.id
        }
        fn set_id(&mut self, id: Uuid) {
            self.id = Some(id);
        }
        fn linked_documents(&self) -> Result<Vec<LinkedDocument>, DatabaseError> {
            Ok(self.owner.to_linked_document()?.into_iter().collect())
        }
    }

    fn owner_with_id() -> Owner {
        Owner {
            id: Some(Uuid::new_v4()),
            name: "ana".to_string(),
        }
    }

    #[tokio::test]
    async fn write_rule_persists_fetched_link() {
        let store = Arc::new(MemoryDocumentStore::new());
        let owned: Repository<Owned> = Repository::new(store.clone());
        let owners: Repository<Owner> = Repository::new(store.clone());

        let owner = owner_with_id();
        let owner_id = owner.id.unwrap();
        let doc = Owned {
            id: None,
            label: "first".to_string(),
            owner: Link::fetched(owner).unwrap(),
        };

        let saved = owned.insert(doc, WriteRule::Write).await.unwrap();
        let saved_id = saved.id.expect("id assigned on insert");

        let stored_owner = owners.get(owner_id).await.unwrap().expect("linked owner written");
        assert_eq!(stored_owner.name, "ana");

        let raw = store.get(Collection::Cars, saved_id).await.unwrap().unwrap();
        assert_eq!(raw["owner"], json!({ "$ref": "users", "$id": owner_id }));

        let reloaded = owned.get(saved_id).await.unwrap().unwrap();
        assert_eq!(reloaded.owner.id(), owner_id);
        assert!(!reloaded.owner.is_fetched());
    }

    #[tokio::test]
    async fn do_nothing_rule_skips_links() {
        let store = Arc::new(MemoryDocumentStore::new());
        let owned: Repository<Owned> = Repository::new(store.clone());

        let doc = Owned {
            id: None,
            label: "solo".to_string(),
            owner: Link::fetched(owner_with_id()).unwrap(),
        };
        owned.insert(doc, WriteRule::DoNothing).await.unwrap();

        assert_eq!(store.len(Collection::Users).await, 0);
        assert_eq!(store.len(Collection::Cars).await, 1);
    }

    #[tokio::test]
    async fn link_to_wrong_collection_fails_to_decode() {
        let store = Arc::new(MemoryDocumentStore::new());
        let owned: Repository<Owned> = Repository::new(store.clone());
        let id = Uuid::new_v4();
        store
            .insert(
                Collection::Cars,
                id,
                json!({ "id": id, "label": "x", "owner": { "$ref": "cars", "$id": Uuid::new_v4() } }),
            )
            .await
            .unwrap();

        assert!(matches!(owned.get(id).await, Err(DatabaseError::Serialization(_))));
    }

    #[test]
    fn unsaved_document_cannot_be_linked() {
        let owner = Owner {
            id: None,
            name: "nobody".to_string(),
        };
        assert!(Link::fetched(owner).is_none());
    }
}
