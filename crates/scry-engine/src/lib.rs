//! Hybrid retrieval over a scry index.
//!
//! A query goes through keyword extraction ([`keywords`]), expansion into a
//! single embedding input ([`expand`]), vector search, symbol-aware
//! reranking ([`rerank`]), and min-max normalization ([`pipeline`]).
//! [`Scry`] bundles the pipeline with the sync engine behind one facade.

pub mod expand;
pub mod keywords;
pub mod pipeline;
pub mod rerank;
pub mod service;

pub use keywords::{KeywordExtractor, LlmKeywordExtractor, LocalKeywordExtractor};
pub use pipeline::QueryPipeline;
pub use service::Scry;
