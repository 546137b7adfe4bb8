use crate::errors::{AppError, AppResult};
use crate::models::{BoardDoc, BoardStats, ColumnId, Columns, Item, ItemDraft, MoveRequest};
use crate::notifications::NotificationFeed;
use crate::store::{DocumentStore, BOARDS_COLLECTION};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use uuid::Uuid;

struct BoardState {
    columns: Columns,
    // Set while the latest mutation's write-through has not landed.
    dirty: bool,
}

// Per-user board engine. Every mutation runs under the user's async lock,
// covering both the in-memory update and the full-document write, so writes
// reach the store in issuance order.
#[derive(Clone)]
pub struct BoardService {
    store: Arc<dyn DocumentStore>,
    feed: NotificationFeed,
    boards: Arc<StdMutex<HashMap<String, Arc<Mutex<Option<BoardState>>>>>>,
}

impl BoardService {
    pub fn new(store: Arc<dyn DocumentStore>, feed: NotificationFeed) -> Self {
        Self {
            store,
            feed,
            boards: Arc::new(StdMutex::new(HashMap::new())),
        }
    }

    fn slot(&self, user_id: &str) -> Arc<Mutex<Option<BoardState>>> {
        let mut boards = self.boards.lock().expect("board registry lock");
        boards
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone()
    }

    async fn ensure_loaded(&self, user_id: &str, state: &mut Option<BoardState>) -> AppResult<()> {
        if state.is_some() {
            return Ok(());
        }
        let columns = match self.store.get_document(BOARDS_COLLECTION, user_id).await? {
            Some(value) => serde_json::from_value::<BoardDoc>(value)?.columns,
            None => {
                // First use: persist the empty board before handing it out.
                let columns = Columns::empty();
                let value = serde_json::to_value(&BoardDoc {
                    columns: columns.clone(),
                })?;
                self.store
                    .set_document(BOARDS_COLLECTION, user_id, value)
                    .await?;
                columns
            }
        };
        *state = Some(BoardState {
            columns,
            dirty: false,
        });
        Ok(())
    }

    async fn write_through(&self, user_id: &str, state: &mut BoardState) -> AppResult<()> {
        state.dirty = true;
        let value = serde_json::to_value(&BoardDoc {
            columns: state.columns.clone(),
        })?;
        self.store
            .set_document(BOARDS_COLLECTION, user_id, value)
            .await?;
        state.dirty = false;
        Ok(())
    }

    pub async fn load(&self, user_id: &str) -> AppResult<Columns> {
        let slot = self.slot(user_id);
        let mut guard = slot.lock().await;
        self.ensure_loaded(user_id, &mut guard).await?;
        Ok(guard.as_ref().expect("loaded board").columns.clone())
    }

    pub async fn add_item(&self, user_id: &str, column_id: ColumnId, draft: ItemDraft) -> AppResult<Item> {
        let metadata = draft
            .metadata
            .ok_or_else(|| AppError::Validation("item draft has no resolved metadata".to_string()))?;
        let item = Item {
            id: Uuid::new_v4().to_string(),
            link: draft.link,
            title: metadata.title,
            question_number: metadata.question_number,
            difficulty: metadata.difficulty,
            topic_tags: metadata.topic_tags,
            notes: draft.notes,
            links: draft.links,
        };

        let slot = self.slot(user_id);
        let mut guard = slot.lock().await;
        self.ensure_loaded(user_id, &mut guard).await?;
        let state = guard.as_mut().expect("loaded board");
        state.columns.column_mut(column_id).items.push(item.clone());
        self.write_through(user_id, state).await?;

        if let Err(error) = self
            .feed
            .append(user_id, &format!("New question added: {}", item.title))
            .await
        {
            tracing::warn!(error = %error, user_id, "add-item notification failed");
        }
        Ok(item)
    }

    // Idempotent: an absent id removes nothing and is not an error.
    pub async fn delete_item(&self, user_id: &str, item_id: &str) -> AppResult<()> {
        let slot = self.slot(user_id);
        let mut guard = slot.lock().await;
        self.ensure_loaded(user_id, &mut guard).await?;
        let state = guard.as_mut().expect("loaded board");
        for column_id in ColumnId::ALL {
            state
                .columns
                .column_mut(column_id)
                .items
                .retain(|item| item.id != item_id);
        }
        self.write_through(user_id, state).await
    }

    // to_index addresses the destination sequence after removal, so
    // to_index == len appends and same-column moves are pure reorders.
    pub async fn move_item(&self, user_id: &str, request: MoveRequest) -> AppResult<()> {
        let slot = self.slot(user_id);
        let mut guard = slot.lock().await;
        self.ensure_loaded(user_id, &mut guard).await?;
        let state = guard.as_mut().expect("loaded board");

        let source_items = &state.columns.column(request.from_column).items;
        match source_items.get(request.from_index) {
            None => {
                return Err(AppError::Precondition(format!(
                    "source index {} out of bounds in {}",
                    request.from_index,
                    request.from_column.as_str()
                )))
            }
            Some(item) if item.id != request.item_id => {
                return Err(AppError::Precondition(format!(
                    "item at {}[{}] is not {}",
                    request.from_column.as_str(),
                    request.from_index,
                    request.item_id
                )))
            }
            Some(_) => {}
        }

        let destination_len = if request.from_column == request.to_column {
            source_items.len() - 1
        } else {
            state.columns.column(request.to_column).items.len()
        };
        if request.to_index > destination_len {
            return Err(AppError::Precondition(format!(
                "destination index {} out of bounds in {}",
                request.to_index,
                request.to_column.as_str()
            )));
        }

        let item = state
            .columns
            .column_mut(request.from_column)
            .items
            .remove(request.from_index);
        state
            .columns
            .column_mut(request.to_column)
            .items
            .insert(request.to_index, item);
        self.write_through(user_id, state).await
    }

    // Replaces notes and links in place; position and column are untouched.
    // An absent id is a no-op and nothing is persisted.
    pub async fn update_notes(
        &self,
        user_id: &str,
        item_id: &str,
        notes: String,
        links: Vec<String>,
    ) -> AppResult<()> {
        let slot = self.slot(user_id);
        let mut guard = slot.lock().await;
        self.ensure_loaded(user_id, &mut guard).await?;
        let state = guard.as_mut().expect("loaded board");

        let Some((column_id, index)) = state.columns.find_item(item_id) else {
            return Ok(());
        };
        let item = &mut state.columns.column_mut(column_id).items[index];
        item.notes = notes;
        item.links = links;
        self.write_through(user_id, state).await
    }

    // Read-only view; persisted order is untouched.
    pub async fn filter<F>(&self, user_id: &str, predicate: F) -> AppResult<Columns>
    where
        F: Fn(&Item) -> bool,
    {
        let slot = self.slot(user_id);
        let mut guard = slot.lock().await;
        self.ensure_loaded(user_id, &mut guard).await?;
        let columns = &guard.as_ref().expect("loaded board").columns;

        let mut view = columns.clone();
        for column_id in ColumnId::ALL {
            view.column_mut(column_id).items.retain(|item| predicate(item));
        }
        Ok(view)
    }

    pub async fn stats(&self, user_id: &str) -> AppResult<BoardStats> {
        let slot = self.slot(user_id);
        let mut guard = slot.lock().await;
        self.ensure_loaded(user_id, &mut guard).await?;
        let columns = &guard.as_ref().expect("loaded board").columns;

        let mut stats = BoardStats::default();
        for (column_id, column) in columns.iter() {
            stats
                .column_counts
                .insert(column_id.as_str().to_string(), column.items.len());
            for item in &column.items {
                *stats
                    .difficulty_counts
                    .entry(item.difficulty.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }
        stats.total_questions = columns.total_items();
        stats.reviewed_questions = columns.reviewed.items.len();
        stats.completion_rate = if stats.total_questions > 0 {
            stats.reviewed_questions as f64 / stats.total_questions as f64 * 100.0
        } else {
            0.0
        };
        Ok(stats)
    }

    pub async fn is_dirty(&self, user_id: &str) -> bool {
        let slot = self.slot(user_id);
        let guard = slot.lock().await;
        guard.as_ref().map(|state| state.dirty).unwrap_or(false)
    }

    pub fn unload(&self, user_id: &str) {
        let mut boards = self.boards.lock().expect("board registry lock");
        boards.remove(user_id);
    }
}
