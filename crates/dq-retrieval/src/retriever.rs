//! Parent/child retrieval: similarity search runs over small child chunks,
//! answers are assembled from their stored parents for full context.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use dq_core::Error;

use crate::chunk::Chunk;
use crate::store::ChunkStore;

/// One ranked hit from the external vector search. `metadata` is the loose
/// map the search collaborator returns; for child chunks it includes
/// `parent_id`, `filename`, and optionally `section`.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub content: String,
    pub metadata: Value,
    pub score: f32,
}

impl SearchHit {
    pub fn new(content: impl Into<String>, metadata: Value, score: f32) -> Self {
        Self {
            content: content.into(),
            metadata,
            score,
        }
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.metadata.get("parent_id").and_then(Value::as_str)
    }

    pub fn section(&self) -> Option<&str> {
        self.metadata.get("section").and_then(Value::as_str)
    }

    pub fn filename(&self) -> Option<&str> {
        self.metadata.get("filename").and_then(Value::as_str)
    }
}

/// The external similarity-search collaborator. Embedding computation and
/// index maintenance live behind this boundary.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search(
        &self,
        query: &str,
        k: usize,
        filter: Option<Value>,
    ) -> Result<Vec<SearchHit>, Error>;
}

/// A child hit joined to its stored parent.
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    pub child_content: String,
    pub child_metadata: Value,
    pub child_score: f32,
    /// `None` when the parent was evicted from the store; not an error.
    pub parent: Option<Chunk>,
    pub section: Option<String>,
    /// Breadcrumb path: filename, then section when known.
    pub hierarchy_path: Vec<String>,
}

pub struct ParentChildRetriever {
    store: Arc<ChunkStore>,
    search: Arc<dyn SimilaritySearch>,
}

impl ParentChildRetriever {
    pub fn new(store: Arc<ChunkStore>, search: Arc<dyn SimilaritySearch>) -> Self {
        Self { store, search }
    }

    /// Search up to `k` child hits and join each to its parent, preserving
    /// the hit order returned by the search collaborator.
    pub async fn retrieve(
        &self,
        query: &str,
        k: usize,
        filter: Option<Value>,
    ) -> Result<Vec<RetrievedContext>, Error> {
        let hits = self.search.search(query, k, filter).await?;
        debug!(hits = hits.len(), "joining child hits to parents");
        Ok(self.join_parents(hits))
    }

    /// Section-scoped retrieval: over-fetches `2k` hits, filters to the
    /// requested section, then truncates to `k`. A sparse section may
    /// legitimately yield fewer than `k` results; this is accepted.
    pub async fn retrieve_by_section(
        &self,
        query: &str,
        section: &str,
        k: usize,
    ) -> Result<Vec<RetrievedContext>, Error> {
        let hits = self.search.search(query, k * 2, None).await?;
        let mut contexts = self.join_parents(hits);
        contexts.retain(|c| c.section.as_deref() == Some(section));
        contexts.truncate(k);
        Ok(contexts)
    }

    fn join_parents(&self, hits: Vec<SearchHit>) -> Vec<RetrievedContext> {
        // dedupe parent ids preserving first-seen order, one batch fetch
        let mut seen = HashSet::new();
        let mut parent_ids = Vec::new();
        for hit in &hits {
            if let Some(pid) = hit.parent_id() {
                if seen.insert(pid.to_string()) {
                    parent_ids.push(pid.to_string());
                }
            }
        }
        let by_id: HashMap<String, Chunk> = self
            .store
            .get_many(&parent_ids)
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        hits.into_iter()
            .map(|hit| {
                let parent = hit.parent_id().and_then(|pid| by_id.get(pid)).cloned();
                let section = hit
                    .section()
                    .map(str::to_string)
                    .or_else(|| parent.as_ref().and_then(|p| p.metadata.section.clone()));
                let hierarchy_path = match &parent {
                    Some(p) => {
                        let mut path = vec![p.metadata.filename.clone()];
                        if let Some(s) = &p.metadata.section {
                            path.push(s.clone());
                        }
                        path
                    }
                    None => hit
                        .filename()
                        .map(|f| vec![f.to_string()])
                        .unwrap_or_default(),
                };
                RetrievedContext {
                    child_content: hit.content,
                    child_metadata: hit.metadata,
                    child_score: hit.score,
                    parent,
                    section,
                    hierarchy_path,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkKind, ChunkMetadata, ContentType};
    use chrono::Utc;
    use serde_json::json;
    use std::sync::Mutex;

    /// Queued-response search double, FIFO like the workspace's MockClient.
    struct MockSearch {
        responses: Mutex<Vec<Vec<SearchHit>>>,
    }

    impl MockSearch {
        fn new() -> Self {
            Self {
                responses: Mutex::new(Vec::new()),
            }
        }

        fn queue(&self, hits: Vec<SearchHit>) {
            self.responses.lock().unwrap().insert(0, hits);
        }
    }

    #[async_trait]
    impl SimilaritySearch for MockSearch {
        async fn search(
            &self,
            _query: &str,
            k: usize,
            _filter: Option<Value>,
        ) -> Result<Vec<SearchHit>, Error> {
            let mut hits = self
                .responses
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| Error::search("no mock hits queued"))?;
            hits.truncate(k);
            Ok(hits)
        }
    }

    fn parent(id: &str, section: Option<&str>) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: format!("full context of {}", id),
            kind: ChunkKind::Parent,
            parent_id: None,
            child_ids: Vec::new(),
            metadata: ChunkMetadata {
                filename: "report.txt".to_string(),
                document_id: "doc-1".to_string(),
                section: section.map(str::to_string),
                hierarchy_level: 1,
                content_type: ContentType::Paragraph,
                index: 0,
                total: 1,
                char_count: 10,
                word_count: 2,
                created_at: Utc::now(),
            },
        }
    }

    fn hit(content: &str, parent_id: &str, score: f32) -> SearchHit {
        SearchHit::new(
            content,
            json!({"parent_id": parent_id, "filename": "report.txt"}),
            score,
        )
    }

    #[tokio::test]
    async fn test_retrieve_preserves_hit_order() {
        let store = Arc::new(ChunkStore::new());
        store.add(parent("p1", Some("Intro")));
        store.add(parent("p2", Some("Methods")));

        let search = Arc::new(MockSearch::new());
        search.queue(vec![
            hit("second snippet", "p2", 0.9),
            hit("first snippet", "p1", 0.8),
            hit("another from p2", "p2", 0.7),
        ]);

        let retriever = ParentChildRetriever::new(store, search);
        let results = retriever.retrieve("anything", 5, None).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].parent.as_ref().unwrap().id, "p2");
        assert_eq!(results[1].parent.as_ref().unwrap().id, "p1");
        assert_eq!(results[2].parent.as_ref().unwrap().id, "p2");
        assert_eq!(results[0].hierarchy_path, vec!["report.txt", "Methods"]);
    }

    #[tokio::test]
    async fn test_evicted_parent_is_none_not_error() {
        let store = Arc::new(ChunkStore::new());
        store.add(parent("p1", None));

        let search = Arc::new(MockSearch::new());
        search.queue(vec![hit("kept", "p1", 0.9), hit("orphan", "gone", 0.8)]);

        let retriever = ParentChildRetriever::new(store, search);
        let results = retriever.retrieve("q", 5, None).await.unwrap();

        assert_eq!(results.len(), 2);
        assert!(results[0].parent.is_some());
        assert!(results[1].parent.is_none());
        // breadcrumb still built from the hit's own metadata
        assert_eq!(results[1].hierarchy_path, vec!["report.txt"]);
    }

    #[tokio::test]
    async fn test_retrieve_by_section_may_under_return() {
        let store = Arc::new(ChunkStore::new());
        store.add(parent("p1", Some("Intro")));
        store.add(parent("p2", Some("Methods")));

        let search = Arc::new(MockSearch::new());
        // 2k = 4 hits fetched; only one lands in the requested section
        search.queue(vec![
            hit("a", "p2", 0.9),
            hit("b", "p2", 0.8),
            hit("c", "p1", 0.7),
            hit("d", "p2", 0.6),
        ]);

        let retriever = ParentChildRetriever::new(store, search);
        let results = retriever.retrieve_by_section("q", "Intro", 2).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].section.as_deref(), Some("Intro"));
    }

    #[tokio::test]
    async fn test_search_failure_propagates() {
        let store = Arc::new(ChunkStore::new());
        let search = Arc::new(MockSearch::new());
        let retriever = ParentChildRetriever::new(store, search);

        let err = retriever.retrieve("q", 5, None).await.unwrap_err();
        assert!(matches!(err, Error::Search(_)));
    }
}
