use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::predicate::Predicate;
use crate::types::{FindOptions, Record, TextCorpus, TextHit};

/// The four read operations the search layer needs from the document store.
/// None of them mutate.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, collection: &str, predicate: &Predicate, options: &FindOptions) -> Result<Vec<Record>>;
    /// Exact number of matches, independent of any skip/limit.
    async fn count(&self, collection: &str, predicate: &Predicate) -> Result<u64>;
    async fn find_one(&self, collection: &str, predicate: &Predicate) -> Result<Option<Record>>;
    /// Relevance-ranked hits, best first, at most `limit` of them.
    async fn text_search(&self, corpus: &TextCorpus, query: &str, limit: usize) -> Result<Vec<TextHit>>;
}

/// A live channel to the store that a pool can health-check and retire.
#[async_trait]
pub trait Connection: DocumentStore + 'static {
    async fn ping(&self) -> Result<()>;
    async fn close(&self) -> Result<()>;
}

/// Opens new connections; used by the pool at construction and on reconnect.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: Connection;

    async fn connect(&self) -> Result<Self::Conn>;

    /// Human-readable target for logs.
    fn address(&self) -> String;
}

/// Hands out a store handle per call. Handles may be shared between callers.
pub trait StoreSource: Send + Sync {
    type Store: DocumentStore;

    fn store(&self) -> Arc<Self::Store>;
}
