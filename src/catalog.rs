use crate::errors::{AppError, AppResult};
use crate::models::{ItemDraft, QuestionMetadata};
use crate::store::{DocumentStore, QUESTIONS_COLLECTION};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

static PROBLEM_LINK_RE: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"^https://leetcode\.com/problems/[a-z0-9-]+/?(?:description/?)?$")
        .expect("valid problem link regex")
});

static TITLE_SLUG_RE: Lazy<regex::Regex> = Lazy::new(|| {
    regex::Regex::new(r"/problems/([a-z0-9-]+)").expect("valid title slug regex")
});

pub fn is_valid_problem_link(link: &str) -> bool {
    PROBLEM_LINK_RE.is_match(link)
}

pub fn extract_title_slug(link: &str) -> Option<&str> {
    TITLE_SLUG_RE
        .captures(link)
        .and_then(|captures| captures.get(1))
        .map(|capture| capture.as_str())
}

#[async_trait]
pub trait MetadataLookup: Send + Sync {
    async fn lookup_by_slug(&self, slug: &str) -> AppResult<Option<QuestionMetadata>>;
}

// Catalog entry as persisted in the questions collection, keyed by slug.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub title_slug: String,
    #[serde(flatten)]
    pub metadata: QuestionMetadata,
}

// Lookup backed by the document store's question catalog.
pub struct StoreCatalog {
    store: Arc<dyn DocumentStore>,
}

impl StoreCatalog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl MetadataLookup for StoreCatalog {
    async fn lookup_by_slug(&self, slug: &str) -> AppResult<Option<QuestionMetadata>> {
        let document = self.store.get_document(QUESTIONS_COLLECTION, slug).await?;
        match document {
            Some(data) => {
                let entry: CatalogEntry = serde_json::from_value(data)?;
                Ok(Some(entry.metadata))
            }
            None => Ok(None),
        }
    }
}

// Bulk-load catalog entries, e.g. from an upstream question dump. Existing
// entries for the same slug are overwritten.
pub async fn import_questions(store: &dyn DocumentStore, entries: &[CatalogEntry]) -> AppResult<usize> {
    for entry in entries {
        let value = serde_json::to_value(entry)?;
        store
            .set_document(QUESTIONS_COLLECTION, &entry.title_slug, value)
            .await?;
    }
    tracing::info!(count = entries.len(), "question catalog imported");
    Ok(entries.len())
}

// Add-item entry point: validate the pasted link, resolve its metadata, and
// produce the draft the board accepts.
pub async fn resolve_draft(lookup: &dyn MetadataLookup, link: &str) -> AppResult<ItemDraft> {
    if !is_valid_problem_link(link) {
        return Err(AppError::Validation(format!("invalid problem link: {link}")));
    }
    let slug = extract_title_slug(link)
        .ok_or_else(|| AppError::Validation(format!("no title slug in link: {link}")))?;

    let metadata = lookup
        .lookup_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("question not found: {slug}")))?;

    Ok(ItemDraft {
        link: link.to_string(),
        metadata: Some(metadata),
        notes: String::new(),
        links: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Difficulty;
    use crate::store::MemoryStore;

    fn two_sum_entry() -> CatalogEntry {
        CatalogEntry {
            title_slug: "two-sum".to_string(),
            metadata: QuestionMetadata {
                title: "Two Sum".to_string(),
                question_number: "1".to_string(),
                difficulty: Difficulty::Easy,
                topic_tags: vec!["Array".to_string(), "Hash Table".to_string()],
            },
        }
    }

    #[test]
    fn accepts_canonical_problem_links() {
        assert!(is_valid_problem_link("https://leetcode.com/problems/two-sum/"));
        assert!(is_valid_problem_link("https://leetcode.com/problems/two-sum"));
        assert!(is_valid_problem_link(
            "https://leetcode.com/problems/two-sum/description/"
        ));
        assert!(is_valid_problem_link("https://leetcode.com/problems/3sum/"));
    }

    #[test]
    fn rejects_other_urls() {
        assert!(!is_valid_problem_link("http://leetcode.com/problems/two-sum/"));
        assert!(!is_valid_problem_link("https://leetcode.com/contest/two-sum/"));
        assert!(!is_valid_problem_link(
            "https://leetcode.com/problems/two-sum/solutions/"
        ));
        assert!(!is_valid_problem_link("https://example.com/problems/two-sum/"));
        assert!(!is_valid_problem_link("https://leetcode.com/problems/Two-Sum/"));
    }

    #[test]
    fn extracts_title_slug() {
        assert_eq!(
            extract_title_slug("https://leetcode.com/problems/two-sum/description/"),
            Some("two-sum")
        );
        assert_eq!(extract_title_slug("https://leetcode.com/explore/"), None);
    }

    #[tokio::test]
    async fn import_then_lookup_round_trips() {
        let store = Arc::new(MemoryStore::new());
        let imported = import_questions(store.as_ref(), &[two_sum_entry()])
            .await
            .expect("import");
        assert_eq!(imported, 1);

        let catalog = StoreCatalog::new(store);
        let metadata = catalog
            .lookup_by_slug("two-sum")
            .await
            .expect("lookup")
            .expect("present");
        assert_eq!(metadata.title, "Two Sum");
        assert_eq!(metadata.difficulty, Difficulty::Easy);
    }

    #[tokio::test]
    async fn catalog_entries_persist_flattened() {
        let store = Arc::new(MemoryStore::new());
        import_questions(store.as_ref(), &[two_sum_entry()])
            .await
            .expect("import");

        let raw = store
            .get_document(QUESTIONS_COLLECTION, "two-sum")
            .await
            .expect("get")
            .expect("present");
        assert_eq!(raw["titleSlug"], "two-sum");
        assert_eq!(raw["questionNumber"], "1");
        assert_eq!(raw["difficulty"], "easy");
    }

    #[tokio::test]
    async fn resolve_draft_carries_metadata() {
        let store = Arc::new(MemoryStore::new());
        import_questions(store.as_ref(), &[two_sum_entry()])
            .await
            .expect("import");
        let catalog = StoreCatalog::new(store);

        let draft = resolve_draft(&catalog, "https://leetcode.com/problems/two-sum/")
            .await
            .expect("resolve");
        assert_eq!(draft.link, "https://leetcode.com/problems/two-sum/");
        assert_eq!(draft.metadata.expect("metadata").title, "Two Sum");
    }

    #[tokio::test]
    async fn resolve_draft_rejects_bad_link() {
        let store = Arc::new(MemoryStore::new());
        let catalog = StoreCatalog::new(store);
        let error = resolve_draft(&catalog, "https://example.com/problems/two-sum/")
            .await
            .expect_err("invalid link");
        assert!(matches!(error, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn resolve_draft_surfaces_unknown_question() {
        let store = Arc::new(MemoryStore::new());
        let catalog = StoreCatalog::new(store);
        let error = resolve_draft(&catalog, "https://leetcode.com/problems/two-sum/")
            .await
            .expect_err("unknown question");
        assert!(matches!(error, AppError::NotFound(_)));
    }
}
