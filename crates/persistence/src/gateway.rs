use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Result;

/// A named document collection in the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Products,
    Categories,
    Orders,
    Settings,
}

impl Collection {
    /// All collections, in a stable order.
    pub const ALL: [Collection; 4] = [
        Collection::Products,
        Collection::Categories,
        Collection::Orders,
        Collection::Settings,
    ];

    /// Returns the collection name as stored in the backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Products => "products",
            Collection::Categories => "categories",
            Collection::Orders => "orders",
            Collection::Settings => "settings",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored document: an id plus an arbitrary JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document identifier, unique within its collection.
    pub id: String,

    /// The JSON body.
    pub body: serde_json::Value,

    /// When the document was last written.
    pub updated_at: DateTime<Utc>,
}

impl Document {
    /// Deserializes the body into a concrete type.
    pub fn into_body<T: DeserializeOwned>(self) -> std::result::Result<T, serde_json::Error> {
        serde_json::from_value(self.body)
    }
}

/// Document CRUD plus atomic counters.
///
/// This is the contract the domain store mirrors its mutations to. All
/// implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait DocumentGateway: Send + Sync {
    /// Lists every document in a collection, oldest first.
    async fn list(&self, collection: Collection) -> Result<Vec<Document>>;

    /// Gets a single document, or None if it doesn't exist.
    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>>;

    /// Inserts a document, replacing any existing one with the same id.
    async fn put(&self, collection: Collection, id: &str, body: serde_json::Value) -> Result<()>;

    /// Shallow-merges `patch` into an existing document.
    ///
    /// Fails with `NotFound` if the document doesn't exist.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: serde_json::Value,
    ) -> Result<()>;

    /// Deletes a document. Returns true if it existed.
    async fn delete(&self, collection: Collection, id: &str) -> Result<bool>;

    /// Deletes every document in a collection. Returns the count deleted.
    async fn clear(&self, collection: Collection) -> Result<usize>;

    /// Atomically increments a named counter and returns the new value.
    ///
    /// A counter that has never been incremented (or was reset) yields 1.
    async fn increment_counter(&self, name: &str) -> Result<u64>;

    /// Resets a named counter so the next increment yields 1.
    async fn reset_counter(&self, name: &str) -> Result<()>;
}

/// Typed convenience methods for document gateways.
#[async_trait]
pub trait DocumentGatewayExt: DocumentGateway {
    /// Gets a document and deserializes its body.
    async fn get_as<T>(&self, collection: Collection, id: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(collection, id).await? {
            Some(doc) => Ok(Some(doc.into_body()?)),
            None => Ok(None),
        }
    }

    /// Serializes a value and stores it under `id`.
    async fn put_as<T>(&self, collection: Collection, id: &str, value: &T) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let body = serde_json::to_value(value)?;
        self.put(collection, id, body).await
    }

    /// Lists a collection and deserializes every body.
    async fn list_as<T>(&self, collection: Collection) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send,
    {
        let docs = self.list(collection).await?;
        docs.into_iter()
            .map(|doc| doc.into_body().map_err(Into::into))
            .collect()
    }
}

// Blanket implementation for all DocumentGateway implementations
impl<T: DocumentGateway + ?Sized> DocumentGatewayExt for T {}

/// Shallow-merges the top-level keys of `patch` into `target`.
///
/// Non-object patches replace the target outright.
pub(crate) fn merge_shallow(target: &mut serde_json::Value, patch: serde_json::Value) {
    match (target.as_object_mut(), patch) {
        (Some(existing), serde_json::Value::Object(fields)) => {
            for (key, value) in fields {
                existing.insert(key, value);
            }
        }
        (_, patch) => *target = patch,
    }
}
