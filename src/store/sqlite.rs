use super::{QueryFilter, QuerySubscription, StoredDocument, Subscribers};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

// Document store over a single sqlite table. Upserts keep the original
// rowid, so SELECT ... ORDER BY rowid yields stable insertion order across
// overwrites.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    subscribers: Subscribers,
}

impl SqliteStore {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Persistence(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        Self::with_connection(conn)
    }

    pub fn in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory().map_err(AppError::from)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;
        Ok(Self {
            conn: Mutex::new(conn),
            subscribers: Subscribers::default(),
        })
    }

    fn matching_documents(&self, collection: &str, filter: &QueryFilter) -> AppResult<Vec<StoredDocument>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("store mutex poisoned".to_string()))?;
        let mut statement = conn.prepare(
            "SELECT key, data_json FROM documents WHERE collection = ?1 ORDER BY rowid",
        )?;
        let rows = statement.query_map([collection], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut documents = Vec::new();
        for row in rows {
            let (key, data_json) = row?;
            let data: serde_json::Value = serde_json::from_str(&data_json)?;
            if filter.matches(&data) {
                documents.push(StoredDocument { key, data });
            }
        }
        Ok(documents)
    }

    fn publish(&self, collection: &str) {
        self.subscribers.publish(collection, |filter| {
            match self.matching_documents(collection, filter) {
                Ok(documents) => documents,
                Err(error) => {
                    tracing::warn!(error = %error, collection, "query snapshot failed");
                    Vec::new()
                }
            }
        });
    }
}

#[async_trait]
impl super::DocumentStore for SqliteStore {
    async fn get_document(&self, collection: &str, key: &str) -> AppResult<Option<serde_json::Value>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::Internal("store mutex poisoned".to_string()))?;
        let data_json: Option<String> = conn
            .query_row(
                "SELECT data_json FROM documents WHERE collection = ?1 AND key = ?2",
                params![collection, key],
                |row| row.get(0),
            )
            .optional()?;

        match data_json {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_document(&self, collection: &str, key: &str, value: serde_json::Value) -> AppResult<()> {
        {
            let conn = self
                .conn
                .lock()
                .map_err(|_| AppError::Internal("store mutex poisoned".to_string()))?;
            conn.execute(
                "INSERT INTO documents (collection, key, data_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (collection, key)
                 DO UPDATE SET data_json = excluded.data_json, updated_at = excluded.updated_at",
                params![
                    collection,
                    key,
                    serde_json::to_string(&value)?,
                    Utc::now().to_rfc3339()
                ],
            )?;
        }
        self.publish(collection);
        Ok(())
    }

    async fn subscribe_query(&self, collection: &str, filter: QueryFilter) -> AppResult<QuerySubscription> {
        let initial = self.matching_documents(collection, &filter)?;
        Ok(self.subscribers.register(collection, filter, initial))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentStore;

    #[tokio::test]
    async fn documents_round_trip_through_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("store.db");

        {
            let store = SqliteStore::new(&path).expect("open store");
            store
                .set_document("boards", "u1", serde_json::json!({"columns": {}}))
                .await
                .expect("set");
        }

        let store = SqliteStore::new(&path).expect("reopen store");
        let loaded = store.get_document("boards", "u1").await.expect("get");
        assert_eq!(loaded, Some(serde_json::json!({"columns": {}})));
    }

    #[tokio::test]
    async fn missing_document_is_absent_not_an_error() {
        let store = SqliteStore::in_memory().expect("open store");
        let loaded = store.get_document("boards", "nobody").await.expect("get");
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn overwrite_keeps_insertion_order() {
        let store = SqliteStore::in_memory().expect("open store");
        store
            .set_document("notifications", "a", serde_json::json!({"seq": 1}))
            .await
            .expect("set a");
        store
            .set_document("notifications", "b", serde_json::json!({"seq": 2}))
            .await
            .expect("set b");
        store
            .set_document("notifications", "a", serde_json::json!({"seq": 3}))
            .await
            .expect("overwrite a");

        let documents = store
            .matching_documents("notifications", &QueryFilter::new())
            .expect("snapshot");
        let keys: Vec<&str> = documents.iter().map(|doc| doc.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(documents[0].data, serde_json::json!({"seq": 3}));
    }

    #[tokio::test]
    async fn subscription_sees_initial_and_updated_snapshots() {
        let store = SqliteStore::in_memory().expect("open store");
        store
            .set_document("notifications", "n1", serde_json::json!({"userId": "u1", "read": false}))
            .await
            .expect("seed");

        let filter = QueryFilter::new().field_eq("userId", "u1").field_eq("read", false);
        let mut subscription = store
            .subscribe_query("notifications", filter)
            .await
            .expect("subscribe");

        let initial = subscription.next_snapshot().await.expect("initial");
        assert_eq!(initial.len(), 1);

        store
            .set_document("notifications", "n1", serde_json::json!({"userId": "u1", "read": true}))
            .await
            .expect("mark read");
        let updated = subscription.next_snapshot().await.expect("updated");
        assert!(updated.is_empty());
    }

    #[tokio::test]
    async fn canceled_subscription_receives_nothing_further() {
        let store = SqliteStore::in_memory().expect("open store");
        let mut subscription = store
            .subscribe_query("notifications", QueryFilter::new())
            .await
            .expect("subscribe");
        let _ = subscription.next_snapshot().await;

        subscription.cancel();
        store
            .set_document("notifications", "n1", serde_json::json!({"userId": "u1"}))
            .await
            .expect("set");
        assert!(subscription.try_snapshot().is_none());
    }
}
