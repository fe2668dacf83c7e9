pub mod chunking_strategy;
pub mod ingestion;
pub mod retriever;
