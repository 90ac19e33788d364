use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use uuid::Uuid;

use crate::database::manager::DatabaseError;
use crate::database::repository::{Document, LinkedDocument};

/// Reference from one document to another, stored as `{"$ref": <collection>, "$id": <uuid>}`.
///
/// A link built from a loaded document keeps that document so a
/// `WriteRule::Write` insert can persist it alongside the owner. Links read
/// back from the store only carry the id.
pub struct Link<T> {
    id: Uuid,
    document: Option<T>,
}

#[derive(Serialize, Deserialize)]
struct DbRef {
    #[serde(rename = "$ref")]
    collection: String,
    #[serde(rename = "$id")]
    id: Uuid,
}

impl<T: Document> Link<T> {
    pub fn new(id: Uuid) -> Self {
        Self { id, document: None }
    }

    /// Link to a stored document. `None` if the document was never assigned an id.
    pub fn fetched(document: T) -> Option<Self> {
        let id = document.id()?;
        Some(Self {
            id,
            document: Some(document),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_fetched(&self) -> bool {
        self.document.is_some()
    }

    /// The linked document in the form the store writes, when it is held
    pub fn to_linked_document(&self) -> Result<Option<LinkedDocument>, DatabaseError> {
        let Some(document) = &self.document else {
            return Ok(None);
        };
        Ok(Some(LinkedDocument {
            collection: T::COLLECTION,
            id: self.id,
            body: serde_json::to_value(document)?,
        }))
    }
}

impl<T: Clone> Clone for Link<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            document: self.document.clone(),
        }
    }
}

impl<T> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("id", &self.id)
            .field("fetched", &self.document.is_some())
            .finish()
    }
}

// Two links are equal when they point at the same document
impl<T> PartialEq for Link<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T: Document> Serialize for Link<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        DbRef {
            collection: T::COLLECTION.table_name().to_string(),
            id: self.id,
        }
        .serialize(serializer)
    }
}

impl<'de, T: Document> Deserialize<'de> for Link<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = DbRef::deserialize(deserializer)?;
        if raw.collection != T::COLLECTION.table_name() {
            return Err(de::Error::custom(format!(
                "link points at '{}', expected '{}'",
                raw.collection,
                T::COLLECTION.table_name()
            )));
        }
        Ok(Link::new(raw.id))
    }
}
