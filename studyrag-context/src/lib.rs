pub mod text;

// Re-export the splitter for external use
pub use text::{
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_SEPARATORS, RecursiveSplitter,
    SplitterError, TextChunk, decode_utf8_dropping_invalid,
};
