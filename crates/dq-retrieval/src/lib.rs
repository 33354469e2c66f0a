//! dq-retrieval: Hierarchical chunking and parent/child retrieval
//!
//! Raw text is split into overlapping parent windows (kept in the
//! `ChunkStore` for context) and smaller child windows (indexed by the
//! external vector store). Queries search the children and join each hit
//! back to its parent.

pub mod chunk;
pub mod chunker;
pub mod retriever;
pub mod store;

pub use chunk::{classify_content, Chunk, ChunkKind, ChunkMetadata, ContentType};
pub use chunker::{
    detect_sections, ChunkerConfig, ChunkingResult, ChunkingStats, DocumentSection,
    HierarchicalChunker,
};
pub use retriever::{ParentChildRetriever, RetrievedContext, SearchHit, SimilaritySearch};
pub use store::{ChunkStore, StoreStats};
