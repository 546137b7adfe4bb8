use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type UserId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnId {
    Todo,
    Review,
    Reviewed,
}

impl ColumnId {
    pub const ALL: [ColumnId; 3] = [Self::Todo, Self::Review, Self::Reviewed];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::Review => "review",
            Self::Reviewed => "reviewed",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Todo => "To Do",
            Self::Review => "To Review",
            Self::Reviewed => "Reviewed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionMetadata {
    pub title: String,
    pub question_number: String,
    pub difficulty: Difficulty,
    pub topic_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: String,
    pub link: String,
    pub title: String,
    pub question_number: String,
    pub difficulty: Difficulty,
    pub topic_tags: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    pub link: String,
    pub metadata: Option<QuestionMetadata>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub items: Vec<Item>,
}

impl Column {
    pub fn empty(id: ColumnId) -> Self {
        Self {
            name: id.display_name().to_string(),
            items: Vec::new(),
        }
    }
}

// The three stages are structural, not a map: the fixed cardinality of the
// board is enforced by the type itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Columns {
    pub todo: Column,
    pub review: Column,
    pub reviewed: Column,
}

impl Columns {
    pub fn empty() -> Self {
        Self {
            todo: Column::empty(ColumnId::Todo),
            review: Column::empty(ColumnId::Review),
            reviewed: Column::empty(ColumnId::Reviewed),
        }
    }

    pub fn column(&self, id: ColumnId) -> &Column {
        match id {
            ColumnId::Todo => &self.todo,
            ColumnId::Review => &self.review,
            ColumnId::Reviewed => &self.reviewed,
        }
    }

    pub fn column_mut(&mut self, id: ColumnId) -> &mut Column {
        match id {
            ColumnId::Todo => &mut self.todo,
            ColumnId::Review => &mut self.review,
            ColumnId::Reviewed => &mut self.reviewed,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ColumnId, &Column)> + '_ {
        ColumnId::ALL.into_iter().map(|id| (id, self.column(id)))
    }

    pub fn total_items(&self) -> usize {
        self.iter().map(|(_, column)| column.items.len()).sum()
    }

    pub fn find_item(&self, item_id: &str) -> Option<(ColumnId, usize)> {
        for (id, column) in self.iter() {
            if let Some(index) = column.items.iter().position(|item| item.id == item_id) {
                return Some((id, index));
            }
        }
        None
    }
}

impl Default for Columns {
    fn default() -> Self {
        Self::empty()
    }
}

// Persisted board shape, collection "boards", key = userId.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardDoc {
    pub columns: Columns,
}

// User record, collection "users", key = userId. The identity layer owns
// fields beyond reviewSchedule; they must survive the read-modify-write
// cycle, hence the flattened passthrough map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    #[serde(default)]
    pub review_schedule: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub rest: BTreeMap<String, serde_json::Value>,
}

// Notification record, collection "notifications", generated key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    pub message: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub item_id: String,
    pub from_column: ColumnId,
    pub from_index: usize,
    pub to_column: ColumnId,
    pub to_index: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardStats {
    pub total_questions: usize,
    pub reviewed_questions: usize,
    pub completion_rate: f64,
    pub column_counts: BTreeMap<String, usize>,
    pub difficulty_counts: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_ids_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&ColumnId::Reviewed).expect("serialize"),
            "\"reviewed\""
        );
        let parsed: ColumnId = serde_json::from_str("\"todo\"").expect("deserialize");
        assert_eq!(parsed, ColumnId::Todo);
    }

    #[test]
    fn board_doc_round_trips_with_camel_case_items() {
        let mut columns = Columns::empty();
        columns.todo.items.push(Item {
            id: "a".to_string(),
            link: "https://leetcode.com/problems/two-sum/".to_string(),
            title: "Two Sum".to_string(),
            question_number: "1".to_string(),
            difficulty: Difficulty::Easy,
            topic_tags: vec!["Array".to_string(), "Hash Table".to_string()],
            notes: String::new(),
            links: Vec::new(),
        });
        let doc = BoardDoc { columns };

        let json = serde_json::to_value(&doc).expect("serialize");
        assert!(json["columns"]["todo"]["items"][0]["questionNumber"].is_string());
        assert_eq!(json["columns"]["review"]["name"], "To Review");

        let back: BoardDoc = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, doc);
    }

    #[test]
    fn user_record_preserves_unknown_fields() {
        let raw = serde_json::json!({
            "firstName": "Ada",
            "reviewSchedule": "2026-03-05T15:04:00Z"
        });
        let record: UserRecord = serde_json::from_value(raw).expect("deserialize");
        assert!(record.review_schedule.is_some());

        let json = serde_json::to_value(&record).expect("serialize");
        assert_eq!(json["firstName"], "Ada");
    }

    #[test]
    fn items_missing_notes_and_links_default_empty() {
        let raw = serde_json::json!({
            "id": "a",
            "link": "https://leetcode.com/problems/two-sum/",
            "title": "Two Sum",
            "questionNumber": "1",
            "difficulty": "easy",
            "topicTags": []
        });
        let item: Item = serde_json::from_value(raw).expect("deserialize");
        assert!(item.notes.is_empty());
        assert!(item.links.is_empty());
    }
}
