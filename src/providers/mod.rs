//! Collaborator abstractions consumed by the processing pipeline
//!
//! Trait-based seams for the external financial parser and the vector store
//! indexer, with HTTP client implementations for LlamaParse and Chroma.

pub mod indexer;
pub mod parser;

pub use indexer::{ChromaIndexer, DocumentIndexer};
pub use parser::{FinancialParser, LlamaParseClient};
