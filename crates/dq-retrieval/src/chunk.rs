use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    /// Large text span retained for context; lives in the `ChunkStore`.
    Parent,
    /// Small derived span indexed for similarity search; referenced here
    /// only by id and metadata.
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Table,
    List,
    Heading,
    Paragraph,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub filename: String,
    pub document_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    pub hierarchy_level: u8,
    pub content_type: ContentType,
    /// Position within the sibling group: a parent's index within its
    /// document, a child's index within its parent.
    pub index: usize,
    pub total: usize,
    pub char_count: usize,
    pub word_count: usize,
    pub created_at: DateTime<Utc>,
}

/// One span of a source document. Parents and children cross-reference by id
/// only; a child never embeds its parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub content: String,
    pub kind: ChunkKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub child_ids: Vec<String>,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    pub fn is_parent(&self) -> bool {
        self.kind == ChunkKind::Parent
    }
}

/// Classify a span of text by ordered heuristics: tabular markers first,
/// then list markers, then short all-caps headings, else paragraph.
pub fn classify_content(text: &str) -> ContentType {
    let trimmed = text.trim();

    if trimmed.contains('|') || trimmed.lines().any(|l| l.matches('\t').count() >= 2) {
        return ContentType::Table;
    }

    let first_line = trimmed
        .lines()
        .map(str::trim_start)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    if has_list_marker(first_line) {
        return ContentType::List;
    }

    if trimmed.len() < 80
        && trimmed.chars().any(|c| c.is_alphabetic())
        && !trimmed.chars().any(|c| c.is_lowercase())
    {
        return ContentType::Heading;
    }

    ContentType::Paragraph
}

fn has_list_marker(line: &str) -> bool {
    if line.starts_with("- ") || line.starts_with("* ") || line.starts_with("\u{2022} ") {
        return true;
    }
    let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return false;
    }
    let rest = &line[digits..];
    rest.starts_with(". ") || rest.starts_with(") ")
}
