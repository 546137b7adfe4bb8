mod board;
mod catalog;
mod errors;
mod models;
mod notifications;
mod scheduler;
mod session;
mod store;

pub use board::BoardService;
pub use catalog::{
    extract_title_slug, import_questions, is_valid_problem_link, resolve_draft, CatalogEntry,
    MetadataLookup, StoreCatalog,
};
pub use errors::{AppError, AppResult};
pub use models::{
    BoardDoc, BoardStats, Column, ColumnId, Columns, Difficulty, Item, ItemDraft, MoveRequest,
    Notification, QuestionMetadata, UserId, UserRecord,
};
pub use notifications::{NotificationFeed, NotificationStream};
pub use scheduler::{format_due_date, ReviewScheduler, DUE_POLL_INTERVAL, REVIEW_DUE_MESSAGE};
pub use session::{AuthSignal, SessionManager};
pub use store::{
    DocumentStore, MemoryStore, QueryFilter, QuerySubscription, SqliteStore, StoredDocument,
    BOARDS_COLLECTION, NOTIFICATIONS_COLLECTION, QUESTIONS_COLLECTION, USERS_COLLECTION,
};

use std::path::Path;
use std::sync::Arc;

// Composition root handed to the UI layer. All operations still take the
// user id explicitly; the session manager only decides when a user's
// background work runs.
#[derive(Clone)]
pub struct ReviewCore {
    store: Arc<dyn DocumentStore>,
    lookup: Arc<dyn MetadataLookup>,
    board: BoardService,
    feed: NotificationFeed,
    scheduler: ReviewScheduler,
    sessions: SessionManager,
}

impl ReviewCore {
    pub fn with_store(store: Arc<dyn DocumentStore>, lookup: Arc<dyn MetadataLookup>) -> Self {
        let feed = NotificationFeed::new(store.clone());
        let board = BoardService::new(store.clone(), feed.clone());
        let scheduler = ReviewScheduler::new(store.clone(), feed.clone());
        let sessions = SessionManager::new(board.clone(), scheduler.clone());
        Self {
            store,
            lookup,
            board,
            feed,
            scheduler,
            sessions,
        }
    }

    // Sqlite-backed core with the store's own question catalog as lookup.
    pub fn open(path: &Path) -> AppResult<Self> {
        let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(path)?);
        let lookup = Arc::new(StoreCatalog::new(store.clone()));
        Ok(Self::with_store(store, lookup))
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn board(&self) -> &BoardService {
        &self.board
    }

    pub fn feed(&self) -> &NotificationFeed {
        &self.feed
    }

    pub fn scheduler(&self) -> &ReviewScheduler {
        &self.scheduler
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub async fn resolve_draft(&self, link: &str) -> AppResult<ItemDraft> {
        catalog::resolve_draft(self.lookup.as_ref(), link).await
    }

    pub async fn shutdown(&self) {
        self.sessions.shutdown().await;
    }
}

// Opt-in subscriber setup for embedders without their own tracing config.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();
}
