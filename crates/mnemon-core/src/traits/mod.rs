mod document_parser;
mod embedding_provider;
mod llm_provider;

pub use document_parser::DocumentParser;
pub use embedding_provider::EmbeddingProvider;
pub use llm_provider::{GenerateOptions, LlmProvider};
