//! Knowledge base for SupportDesk.
//!
//! Ingestion splits documents into overlapping chunks, embeds them and
//! persists a [`KnowledgeStore`]. At runtime a [`Retriever`] embeds the
//! user's query and returns the top-K most similar chunks.

pub mod chunker;
pub mod embedder;
pub mod ingest;
pub mod retriever;
pub mod similarity;
pub mod store;

pub use chunker::TextSplitter;
pub use embedder::{HashingEmbedder, ProviderEmbedder};
pub use ingest::{IngestReport, Ingestor, SUPPORTED_EXTENSIONS};
pub use retriever::Retriever;
pub use store::KnowledgeStore;
