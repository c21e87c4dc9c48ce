//! Chunk ledger, diff engine, embedding client, and vector index adapters.
//!
//! [`sync::SyncEngine`] ties them together: it turns file contents into
//! chunk transitions and applies each transition to the vector index before
//! the ledger is rewritten.

pub mod diff;
pub mod embedding;
pub mod ledger;
pub mod normalize;
pub mod sync;
pub mod vector;

pub use diff::{ChangeSet, ChangeType, Transition};
pub use embedding::{Embedder, OpenAiEmbedder};
pub use ledger::{Ledger, LedgerStore};
pub use sync::{IndexStats, SyncEngine, SyncReport, TransitionRecord};
pub use vector::{collection_name, open_store, point_id, VectorStore};
