use crate::board::BoardService;
use crate::models::UserId;
use crate::scheduler::ReviewScheduler;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

// Signed-in/signed-out signal supplied by the identity layer.
pub type AuthSignal = watch::Receiver<Option<UserId>>;

// Tracks the active user and drives session-scoped background work: the
// scheduler's catch-up check and poll start on sign-in and are torn down on
// sign-out, and cached board state never outlives its session.
#[derive(Clone)]
pub struct SessionManager {
    board: BoardService,
    scheduler: ReviewScheduler,
    active: Arc<Mutex<Option<UserId>>>,
    listener: Arc<Mutex<Option<tokio::task::AbortHandle>>>,
}

impl SessionManager {
    pub fn new(board: BoardService, scheduler: ReviewScheduler) -> Self {
        Self {
            board,
            scheduler,
            active: Arc::new(Mutex::new(None)),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    pub fn active_user(&self) -> Option<UserId> {
        self.active.lock().expect("session state lock").clone()
    }

    pub async fn handle_auth_change(&self, user: Option<UserId>) {
        let previous = {
            let mut active = self.active.lock().expect("session state lock");
            std::mem::replace(&mut *active, user.clone())
        };

        if let Some(previous_user) = previous {
            if user.as_deref() == Some(previous_user.as_str()) {
                return;
            }
            self.scheduler.deactivate(&previous_user);
            self.board.unload(&previous_user);
            tracing::debug!(user_id = %previous_user, "session deactivated");
        }

        if let Some(user_id) = user {
            self.scheduler.activate(&user_id).await;
            tracing::debug!(user_id = %user_id, "session activated");
        }
    }

    // Follow the identity signal until the sender side goes away, then tear
    // the current session down.
    pub fn watch(&self, mut signal: AuthSignal) -> JoinHandle<()> {
        let sessions = self.clone();
        let handle = tokio::spawn(async move {
            let initial = signal.borrow_and_update().clone();
            sessions.handle_auth_change(initial).await;
            while signal.changed().await.is_ok() {
                let user = signal.borrow_and_update().clone();
                sessions.handle_auth_change(user).await;
            }
            sessions.handle_auth_change(None).await;
        });

        let mut listener = self.listener.lock().expect("session listener lock");
        if let Some(previous) = listener.replace(handle.abort_handle()) {
            previous.abort();
        }
        handle
    }

    pub async fn shutdown(&self) {
        let handle = self.listener.lock().expect("session listener lock").take();
        if let Some(handle) = handle {
            handle.abort();
        }
        self.handle_auth_change(None).await;
        self.scheduler.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::NotificationFeed;
    use crate::store::{DocumentStore, MemoryStore, QueryFilter, NOTIFICATIONS_COLLECTION, USERS_COLLECTION};
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Arc;

    fn manager() -> (Arc<MemoryStore>, SessionManager) {
        let store = Arc::new(MemoryStore::new());
        let feed = NotificationFeed::new(store.clone());
        let board = BoardService::new(store.clone(), feed.clone());
        let scheduler = ReviewScheduler::new(store.clone(), feed);
        (store.clone(), SessionManager::new(board, scheduler))
    }

    async fn seed_past_schedule(store: &dyn DocumentStore, user_id: &str) {
        let record = crate::models::UserRecord {
            review_schedule: Some(Utc::now() - ChronoDuration::minutes(1)),
            rest: Default::default(),
        };
        store
            .set_document(
                USERS_COLLECTION,
                user_id,
                serde_json::to_value(&record).expect("encode"),
            )
            .await
            .expect("seed");
    }

    async fn due_count(store: &dyn DocumentStore, user_id: &str) -> usize {
        let mut subscription = store
            .subscribe_query(
                NOTIFICATIONS_COLLECTION,
                QueryFilter::new().field_eq("userId", user_id),
            )
            .await
            .expect("subscribe");
        subscription
            .next_snapshot()
            .await
            .expect("snapshot")
            .iter()
            .filter(|doc| doc.data["message"] == crate::scheduler::REVIEW_DUE_MESSAGE)
            .count()
    }

    #[tokio::test]
    async fn sign_in_runs_the_catch_up_check() {
        let (store, sessions) = manager();
        seed_past_schedule(store.as_ref(), "u1").await;

        sessions.handle_auth_change(Some("u1".to_string())).await;
        assert_eq!(sessions.active_user(), Some("u1".to_string()));
        assert_eq!(due_count(store.as_ref(), "u1").await, 1);

        sessions.shutdown().await;
    }

    #[tokio::test]
    async fn repeated_signal_for_same_user_is_ignored() {
        let (store, sessions) = manager();
        seed_past_schedule(store.as_ref(), "u1").await;

        sessions.handle_auth_change(Some("u1".to_string())).await;
        sessions.handle_auth_change(Some("u1".to_string())).await;
        assert_eq!(due_count(store.as_ref(), "u1").await, 1);

        sessions.shutdown().await;
    }

    #[tokio::test]
    async fn sign_out_deactivates_the_previous_user() {
        let (store, sessions) = manager();
        sessions.handle_auth_change(Some("u1".to_string())).await;

        // Sign out, then a reminder comes due: nothing may fire.
        sessions.handle_auth_change(None).await;
        seed_past_schedule(store.as_ref(), "u1").await;
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
        assert_eq!(due_count(store.as_ref(), "u1").await, 0);
        assert_eq!(sessions.active_user(), None);

        sessions.shutdown().await;
    }

    #[tokio::test]
    async fn watch_follows_the_identity_signal() {
        let (store, sessions) = manager();
        seed_past_schedule(store.as_ref(), "u1").await;

        let (sender, receiver) = watch::channel(None);
        let handle = sessions.watch(receiver);

        sender.send(Some("u1".to_string())).expect("send sign-in");
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
        assert_eq!(sessions.active_user(), Some("u1".to_string()));
        assert_eq!(due_count(store.as_ref(), "u1").await, 1);

        sender.send(None).expect("send sign-out");
        tokio::time::sleep(tokio::time::Duration::from_millis(200)).await;
        assert_eq!(sessions.active_user(), None);

        drop(sender);
        let _ = handle.await;
        sessions.shutdown().await;
    }
}
