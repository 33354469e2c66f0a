//! Hierarchical chunking: one pass over raw text producing large parent
//! windows for context and small child windows for similarity indexing,
//! linked by id.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use dq_core::RetrievalSettings;

use crate::chunk::{classify_content, Chunk, ChunkKind, ChunkMetadata, ContentType};

/// Window sizes are measured in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    pub parent_size: usize,
    pub parent_overlap: usize,
    pub child_size: usize,
    pub child_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            parent_size: 2000,
            parent_overlap: 200,
            child_size: 400,
            child_overlap: 50,
        }
    }
}

impl ChunkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parent_window(mut self, size: usize, overlap: usize) -> Self {
        self.parent_size = size;
        self.parent_overlap = overlap;
        self
    }

    pub fn with_child_window(mut self, size: usize, overlap: usize) -> Self {
        self.child_size = size;
        self.child_overlap = overlap;
        self
    }
}

impl From<&RetrievalSettings> for ChunkerConfig {
    fn from(settings: &RetrievalSettings) -> Self {
        Self {
            parent_size: settings.parent_size,
            parent_overlap: settings.parent_overlap,
            child_size: settings.child_size,
            child_overlap: settings.child_overlap,
        }
    }
}

/// A heading found while scanning the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSection {
    pub title: String,
    pub level: u8,
    /// Byte offset of the heading line.
    pub position: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkingStats {
    pub parent_count: usize,
    pub child_count: usize,
    pub avg_children_per_parent: f64,
    /// Distinct section titles attributed to parents.
    pub section_count: usize,
    pub max_depth: u8,
    pub table_chunks: usize,
    pub list_chunks: usize,
    pub heading_chunks: usize,
    pub paragraph_chunks: usize,
}

#[derive(Debug)]
pub struct ChunkingResult {
    pub parents: Vec<Chunk>,
    pub children: Vec<Chunk>,
    pub stats: ChunkingStats,
}

pub struct HierarchicalChunker {
    config: ChunkerConfig,
}

impl Default for HierarchicalChunker {
    fn default() -> Self {
        Self::new(ChunkerConfig::default())
    }
}

impl HierarchicalChunker {
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split one document into linked parent and child chunks.
    ///
    /// Text shorter than one parent window yields exactly one parent; a
    /// parent shorter than one child window yields exactly one child.
    /// Whitespace-only input yields nothing.
    ///
    /// Section attribution matches each parent window against the scanned
    /// headings by title containment, falling back to the nearest preceding
    /// heading. A title recurring verbatim in the body can mis-attribute a
    /// window; this is inherited, documented behavior.
    pub fn chunk(&self, text: &str, document_id: &str, filename: &str) -> ChunkingResult {
        if text.trim().is_empty() {
            return ChunkingResult {
                parents: Vec::new(),
                children: Vec::new(),
                stats: ChunkingStats::default(),
            };
        }

        let sections = detect_sections(text);
        let windows = split_windows(text, self.config.parent_size, self.config.parent_overlap);
        let created_at = Utc::now();
        let parent_total = windows.len();

        let mut parents = Vec::with_capacity(parent_total);
        let mut children = Vec::new();

        for (p_idx, (start, content)) in windows.into_iter().enumerate() {
            let section = section_for(&sections, start, &content);
            let level = section.map(|s| s.level).unwrap_or(0);
            let section_title = section.map(|s| s.title.clone());
            let parent_id = format!("{}-p{}", document_id, p_idx);

            let child_windows =
                split_windows(&content, self.config.child_size, self.config.child_overlap);
            let child_total = child_windows.len();
            let mut child_ids = Vec::with_capacity(child_total);

            for (c_idx, (_, child_content)) in child_windows.into_iter().enumerate() {
                let child_id = format!("{}-c{}", parent_id, c_idx);
                child_ids.push(child_id.clone());
                children.push(Chunk {
                    id: child_id,
                    kind: ChunkKind::Child,
                    parent_id: Some(parent_id.clone()),
                    child_ids: Vec::new(),
                    metadata: ChunkMetadata {
                        filename: filename.to_string(),
                        document_id: document_id.to_string(),
                        section: section_title.clone(),
                        hierarchy_level: level + 1,
                        content_type: classify_content(&child_content),
                        index: c_idx,
                        total: child_total,
                        char_count: child_content.chars().count(),
                        word_count: child_content.split_whitespace().count(),
                        created_at,
                    },
                    content: child_content,
                });
            }

            parents.push(Chunk {
                id: parent_id,
                kind: ChunkKind::Parent,
                parent_id: None,
                child_ids,
                metadata: ChunkMetadata {
                    filename: filename.to_string(),
                    document_id: document_id.to_string(),
                    section: section_title,
                    hierarchy_level: level,
                    content_type: classify_content(&content),
                    index: p_idx,
                    total: parent_total,
                    char_count: content.chars().count(),
                    word_count: content.split_whitespace().count(),
                    created_at,
                },
                content,
            });
        }

        let stats = compute_stats(&parents, &children);
        debug!(
            document = document_id,
            parents = stats.parent_count,
            children = stats.child_count,
            sections = stats.section_count,
            "chunked document"
        );

        ChunkingResult {
            parents,
            children,
            stats,
        }
    }
}

/// Scan lines for headings using the ordered pattern classes: all-caps short
/// line, title-case line ending in a colon, numbered heading.
pub fn detect_sections(text: &str) -> Vec<DocumentSection> {
    let mut sections = Vec::new();
    let mut pos = 0usize;
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some((title, level)) = classify_heading(trimmed) {
            sections.push(DocumentSection {
                title,
                level,
                position: pos,
            });
        }
        pos += line.len() + 1;
    }
    sections
}

fn classify_heading(line: &str) -> Option<(String, u8)> {
    if line.is_empty() || line.len() > 80 {
        return None;
    }

    // all-caps short line
    if line.chars().any(|c| c.is_alphabetic())
        && !line.chars().any(|c| c.is_lowercase())
        && line.split_whitespace().count() <= 8
        && !line.ends_with('.')
    {
        return Some((line.to_string(), 1));
    }

    // title-case line ending in a colon
    if let Some(stripped) = line.strip_suffix(':') {
        if is_title_case(stripped) {
            return Some((stripped.trim().to_string(), 2));
        }
    }

    // numbered heading: "N. Title" / "N.N Title", level from numbering depth
    if let Some((title, depth)) = parse_numbered_heading(line) {
        return Some((title, depth));
    }

    None
}

fn is_title_case(text: &str) -> bool {
    let text = text.trim();
    if text.is_empty() || !text.chars().any(|c| c.is_lowercase()) {
        return false;
    }
    text.split_whitespace().all(|word| {
        word.chars()
            .next()
            .map(|c| c.is_uppercase() || c.is_numeric())
            .unwrap_or(false)
    })
}

fn parse_numbered_heading(line: &str) -> Option<(String, u8)> {
    let (prefix, rest) = line.split_once(' ')?;
    let prefix = prefix.strip_suffix('.').unwrap_or(prefix);
    if prefix.is_empty() || rest.trim().is_empty() {
        return None;
    }
    let components: Vec<&str> = prefix.split('.').collect();
    if components
        .iter()
        .any(|c| c.is_empty() || !c.chars().all(|ch| ch.is_ascii_digit()))
    {
        return None;
    }
    Some((rest.trim().to_string(), components.len() as u8))
}

/// Overlapping windows over `text`, measured in characters, each tagged with
/// its starting byte offset. The final partial window is kept.
fn split_windows(text: &str, size: usize, overlap: usize) -> Vec<(usize, String)> {
    let size = size.max(1);
    let step = size.saturating_sub(overlap).max(1);
    let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    let total = offsets.len();
    if total == 0 {
        return Vec::new();
    }

    let mut windows = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + size).min(total);
        let byte_start = offsets[start];
        let byte_end = if end == total { text.len() } else { offsets[end] };
        windows.push((byte_start, text[byte_start..byte_end].to_string()));
        if end == total {
            break;
        }
        start += step;
    }
    windows
}

/// Best-effort section attribution: the latest heading whose title appears
/// in the window, else the nearest heading starting before the window.
fn section_for<'a>(
    sections: &'a [DocumentSection],
    window_start: usize,
    window_content: &str,
) -> Option<&'a DocumentSection> {
    sections
        .iter()
        .rev()
        .find(|s| window_content.contains(&s.title))
        .or_else(|| sections.iter().rev().find(|s| s.position <= window_start))
}

fn compute_stats(parents: &[Chunk], children: &[Chunk]) -> ChunkingStats {
    let mut stats = ChunkingStats {
        parent_count: parents.len(),
        child_count: children.len(),
        avg_children_per_parent: if parents.is_empty() {
            0.0
        } else {
            children.len() as f64 / parents.len() as f64
        },
        ..ChunkingStats::default()
    };

    let mut titles = std::collections::HashSet::new();
    for chunk in parents.iter().chain(children) {
        if let Some(section) = &chunk.metadata.section {
            titles.insert(section.as_str());
        }
        stats.max_depth = stats.max_depth.max(chunk.metadata.hierarchy_level);
        match chunk.metadata.content_type {
            ContentType::Table => stats.table_chunks += 1,
            ContentType::List => stats.list_chunks += 1,
            ContentType::Heading => stats.heading_chunks += 1,
            ContentType::Paragraph => stats.paragraph_chunks += 1,
        }
    }
    stats.section_count = titles.len();
    stats
}
