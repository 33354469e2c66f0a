//! In-memory arena of parent chunks.
//!
//! Children are owned by the external vector store; this store only ever
//! holds parents, keyed by id. Scans are linear, which is acceptable for the
//! parent volume this engine targets; callers needing more should index by
//! document or section themselves.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use tracing::warn;

use crate::chunk::Chunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    pub parent_count: usize,
    pub document_count: usize,
    pub section_count: usize,
    pub total_content_bytes: usize,
}

#[derive(Default)]
pub struct ChunkStore {
    parents: RwLock<HashMap<String, Chunk>>,
}

impl ChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one parent chunk. Non-parent chunks are logged and ignored.
    pub fn add(&self, chunk: Chunk) -> bool {
        if !chunk.is_parent() {
            warn!(id = %chunk.id, "ignoring non-parent chunk passed to store");
            return false;
        }
        self.parents.write().unwrap().insert(chunk.id.clone(), chunk);
        true
    }

    /// Add a batch of parents; returns how many were accepted.
    pub fn add_many(&self, chunks: Vec<Chunk>) -> usize {
        let mut guard = self.parents.write().unwrap();
        let mut added = 0;
        for chunk in chunks {
            if !chunk.is_parent() {
                warn!(id = %chunk.id, "ignoring non-parent chunk passed to store");
                continue;
            }
            guard.insert(chunk.id.clone(), chunk);
            added += 1;
        }
        added
    }

    pub fn get(&self, id: &str) -> Option<Chunk> {
        self.parents.read().unwrap().get(id).cloned()
    }

    /// Batch lookup under a single read guard: the result is a consistent
    /// snapshot even against concurrent deletes. Missing ids are silently
    /// omitted, never an error.
    pub fn get_many(&self, ids: &[String]) -> Vec<Chunk> {
        let guard = self.parents.read().unwrap();
        ids.iter().filter_map(|id| guard.get(id).cloned()).collect()
    }

    pub fn get_by_document(&self, document_id: &str) -> Vec<Chunk> {
        let guard = self.parents.read().unwrap();
        let mut chunks: Vec<Chunk> = guard
            .values()
            .filter(|c| c.metadata.document_id == document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.metadata.index);
        chunks
    }

    pub fn get_by_section(&self, section: &str) -> Vec<Chunk> {
        let guard = self.parents.read().unwrap();
        let mut chunks: Vec<Chunk> = guard
            .values()
            .filter(|c| c.metadata.section.as_deref() == Some(section))
            .cloned()
            .collect();
        chunks.sort_by(|a, b| {
            (a.metadata.document_id.as_str(), a.metadata.index)
                .cmp(&(b.metadata.document_id.as_str(), b.metadata.index))
        });
        chunks
    }

    pub fn delete(&self, id: &str) -> bool {
        self.parents.write().unwrap().remove(id).is_some()
    }

    /// Remove every parent belonging to a document; returns the count removed.
    pub fn delete_by_document(&self, document_id: &str) -> usize {
        let mut guard = self.parents.write().unwrap();
        let before = guard.len();
        guard.retain(|_, c| c.metadata.document_id != document_id);
        before - guard.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.parents.read().unwrap().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.parents.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.read().unwrap().is_empty()
    }

    pub fn stats(&self) -> StoreStats {
        let guard = self.parents.read().unwrap();
        let mut documents = HashSet::new();
        let mut sections = HashSet::new();
        let mut total_content_bytes = 0;
        for chunk in guard.values() {
            documents.insert(chunk.metadata.document_id.as_str());
            if let Some(section) = &chunk.metadata.section {
                sections.insert(section.as_str());
            }
            total_content_bytes += chunk.content.len();
        }
        StoreStats {
            parent_count: guard.len(),
            document_count: documents.len(),
            section_count: sections.len(),
            total_content_bytes,
        }
    }

    pub fn clear(&self) {
        self.parents.write().unwrap().clear();
    }

    /// Naive term-frequency scan, weighting matches near the start of a
    /// chunk higher. Fallback only; similarity search over children is the
    /// primary retrieval path.
    pub fn search_by_content(&self, query: &str, limit: usize) -> Vec<(Chunk, f32)> {
        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let guard = self.parents.read().unwrap();
        let mut scored: Vec<(Chunk, f32)> = guard
            .values()
            .filter_map(|chunk| {
                let haystack = chunk.content.to_lowercase();
                let len = haystack.len().max(1) as f32;
                let mut score = 0.0f32;
                for term in &terms {
                    for (pos, _) in haystack.match_indices(term.as_str()) {
                        score += 1.0 - (pos as f32 / len);
                    }
                }
                (score > 0.0).then(|| (chunk.clone(), score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkKind, ChunkMetadata, ContentType};
    use chrono::Utc;

    fn parent(id: &str, document_id: &str, section: Option<&str>, content: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            content: content.to_string(),
            kind: ChunkKind::Parent,
            parent_id: None,
            child_ids: Vec::new(),
            metadata: ChunkMetadata {
                filename: format!("{}.txt", document_id),
                document_id: document_id.to_string(),
                section: section.map(str::to_string),
                hierarchy_level: 1,
                content_type: ContentType::Paragraph,
                index: 0,
                total: 1,
                char_count: content.chars().count(),
                word_count: content.split_whitespace().count(),
                created_at: Utc::now(),
            },
        }
    }

    fn child(id: &str, parent_id: &str) -> Chunk {
        let mut chunk = parent(id, "doc", None, "child text");
        chunk.kind = ChunkKind::Child;
        chunk.parent_id = Some(parent_id.to_string());
        chunk
    }

    #[test]
    fn test_add_rejects_children() {
        let store = ChunkStore::new();
        assert!(store.add(parent("p1", "doc-1", None, "text")));
        assert!(!store.add(child("c1", "p1")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_many_omits_missing() {
        let store = ChunkStore::new();
        store.add(parent("p1", "doc-1", None, "one"));
        store.add(parent("p2", "doc-1", None, "two"));

        let ids = vec!["p1".to_string(), "ghost".to_string(), "p2".to_string()];
        let found = store.get_many(&ids);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "p1");
        assert_eq!(found[1].id, "p2");

        assert!(store.get("p1").is_some());
        assert!(store.get("ghost").is_none());
    }

    #[test]
    fn test_single_delete() {
        let store = ChunkStore::new();
        store.add(parent("p1", "doc-1", None, "a"));
        assert!(store.delete("p1"));
        assert!(!store.delete("p1"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_by_document() {
        let store = ChunkStore::new();
        store.add(parent("p1", "doc-1", None, "a"));
        store.add(parent("p2", "doc-1", None, "b"));
        store.add(parent("p3", "doc-2", None, "c"));

        assert_eq!(store.delete_by_document("doc-1"), 2);
        assert_eq!(store.len(), 1);
        assert!(store.contains("p3"));
        assert_eq!(store.delete_by_document("doc-1"), 0);
    }

    #[test]
    fn test_scans_and_stats() {
        let store = ChunkStore::new();
        store.add(parent("p1", "doc-1", Some("Intro"), "aaaa"));
        store.add(parent("p2", "doc-1", Some("Methods"), "bbbb"));
        store.add(parent("p3", "doc-2", Some("Intro"), "cc"));

        assert_eq!(store.get_by_document("doc-1").len(), 2);
        assert_eq!(store.get_by_section("Intro").len(), 2);

        let stats = store.stats();
        assert_eq!(stats.parent_count, 3);
        assert_eq!(stats.document_count, 2);
        assert_eq!(stats.section_count, 2);
        assert_eq!(stats.total_content_bytes, 10);

        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_search_by_content_position_weighting() {
        let store = ChunkStore::new();
        let filler = "lorem ipsum dolor sit amet ".repeat(10);
        store.add(parent("early", "doc-1", None, &format!("revenue {}", filler)));
        store.add(parent("late", "doc-2", None, &format!("{} revenue", filler)));

        let results = store.search_by_content("revenue", 10);
        assert_eq!(results.len(), 2);
        // the early match outranks the late one
        assert_eq!(results[0].0.id, "early");
        assert!(results[0].1 > results[1].1);

        assert!(store.search_by_content("nonexistent", 10).is_empty());
    }
}
