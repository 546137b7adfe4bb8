mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::errors::AppResult;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const BOARDS_COLLECTION: &str = "boards";
pub const USERS_COLLECTION: &str = "users";
pub const NOTIFICATIONS_COLLECTION: &str = "notifications";
pub const QUESTIONS_COLLECTION: &str = "leetcode_questions";

// Conjunction of field-equality conditions, matched against the stored
// document's top-level fields.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    conditions: Vec<(String, serde_json::Value)>,
}

impl QueryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field_eq(mut self, field: &str, value: impl Into<serde_json::Value>) -> Self {
        self.conditions.push((field.to_string(), value.into()));
        self
    }

    pub fn matches(&self, document: &serde_json::Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub key: String,
    pub data: serde_json::Value,
}

// Live query view: one snapshot of the matching set at registration, then a
// fresh snapshot after every write that touches the collection. Dropping the
// subscription marks it canceled; the store prunes it on the next publish.
pub struct QuerySubscription {
    receiver: mpsc::UnboundedReceiver<Vec<StoredDocument>>,
    canceled: Arc<AtomicBool>,
}

impl QuerySubscription {
    pub async fn next_snapshot(&mut self) -> Option<Vec<StoredDocument>> {
        self.receiver.recv().await
    }

    pub fn try_snapshot(&mut self) -> Option<Vec<StoredDocument>> {
        self.receiver.try_recv().ok()
    }

    pub fn cancel(&mut self) {
        self.canceled.store(true, Ordering::SeqCst);
        self.receiver.close();
    }
}

impl Drop for QuerySubscription {
    fn drop(&mut self) {
        self.canceled.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, collection: &str, key: &str) -> AppResult<Option<serde_json::Value>>;

    // Full-document overwrite. Creates the document when absent.
    async fn set_document(&self, collection: &str, key: &str, value: serde_json::Value) -> AppResult<()>;

    async fn subscribe_query(&self, collection: &str, filter: QueryFilter) -> AppResult<QuerySubscription>;
}

struct SubscriberEntry {
    collection: String,
    filter: QueryFilter,
    sender: mpsc::UnboundedSender<Vec<StoredDocument>>,
    canceled: Arc<AtomicBool>,
}

impl SubscriberEntry {
    fn is_live(&self) -> bool {
        !self.canceled.load(Ordering::SeqCst) && !self.sender.is_closed()
    }
}

// Shared fan-out used by both store implementations. Snapshots are computed
// per subscriber because each carries its own filter.
#[derive(Default)]
pub(crate) struct Subscribers {
    entries: Mutex<Vec<SubscriberEntry>>,
}

impl Subscribers {
    pub(crate) fn register(
        &self,
        collection: &str,
        filter: QueryFilter,
        initial: Vec<StoredDocument>,
    ) -> QuerySubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        let canceled = Arc::new(AtomicBool::new(false));
        let _ = sender.send(initial);

        let mut entries = self.entries.lock().expect("subscriber registry lock");
        entries.push(SubscriberEntry {
            collection: collection.to_string(),
            filter,
            sender,
            canceled: canceled.clone(),
        });

        QuerySubscription { receiver, canceled }
    }

    pub(crate) fn publish<F>(&self, collection: &str, snapshot_for: F)
    where
        F: Fn(&QueryFilter) -> Vec<StoredDocument>,
    {
        let mut entries = self.entries.lock().expect("subscriber registry lock");
        entries.retain(SubscriberEntry::is_live);
        for entry in entries.iter() {
            if entry.collection != collection {
                continue;
            }
            let _ = entry.sender.send(snapshot_for(&entry.filter));
        }
    }
}
