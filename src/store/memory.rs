use super::{QueryFilter, QuerySubscription, StoredDocument, Subscribers};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

// Insertion-ordered in-memory store. Backs unit tests and embedders that
// bring their own durable layer; behavior matches SqliteStore observably.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<(String, serde_json::Value)>>>,
    subscribers: Subscribers,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matching_documents(&self, collection: &str, filter: &QueryFilter) -> AppResult<Vec<StoredDocument>> {
        let collections = self
            .collections
            .lock()
            .map_err(|_| AppError::Internal("store mutex poisoned".to_string()))?;
        let documents = collections
            .get(collection)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|(_, data)| filter.matches(data))
                    .map(|(key, data)| StoredDocument {
                        key: key.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(documents)
    }

    fn publish(&self, collection: &str) {
        self.subscribers.publish(collection, |filter| {
            self.matching_documents(collection, filter).unwrap_or_default()
        });
    }
}

#[async_trait]
impl super::DocumentStore for MemoryStore {
    async fn get_document(&self, collection: &str, key: &str) -> AppResult<Option<serde_json::Value>> {
        let collections = self
            .collections
            .lock()
            .map_err(|_| AppError::Internal("store mutex poisoned".to_string()))?;
        Ok(collections.get(collection).and_then(|entries| {
            entries
                .iter()
                .find(|(entry_key, _)| entry_key == key)
                .map(|(_, data)| data.clone())
        }))
    }

    async fn set_document(&self, collection: &str, key: &str, value: serde_json::Value) -> AppResult<()> {
        {
            let mut collections = self
                .collections
                .lock()
                .map_err(|_| AppError::Internal("store mutex poisoned".to_string()))?;
            let entries = collections.entry(collection.to_string()).or_default();
            match entries.iter_mut().find(|(entry_key, _)| entry_key == key) {
                Some((_, data)) => *data = value,
                None => entries.push((key.to_string(), value)),
            }
        }
        self.publish(collection);
        Ok(())
    }

    async fn subscribe_query(&self, collection: &str, filter: QueryFilter) -> AppResult<QuerySubscription> {
        let initial = self.matching_documents(collection, &filter)?;
        Ok(self.subscribers.register(collection, filter, initial))
    }
}
