#![allow(dead_code)]

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::Barrier;

use formsearch_core::{
    Connection, Connector, DocumentStore, Error, FindOptions, Predicate, Record, Result, SortOrder, StoreSource,
    TextCorpus, TextHit,
};

pub const SUBMISSIONS: &str = "_dms_submissions";
pub const ATTACHMENTS: &str = "_dms_documents";

#[derive(Default)]
pub struct Calls {
    pub find: AtomicUsize,
    pub count: AtomicUsize,
    pub find_one: AtomicUsize,
    pub text_search: AtomicUsize,
}

impl Calls {
    pub fn find_one(&self) -> usize {
        self.find_one.load(Ordering::SeqCst)
    }
}

/// In-memory document store that evaluates predicates the way the real one does.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<Record>>>,
    hits: Mutex<Vec<TextHit>>,
    corpora: Mutex<Vec<(TextCorpus, usize)>>,
    fail_on: Mutex<Option<&'static str>>,
    rendezvous: Option<Arc<Barrier>>,
    pub calls: Calls,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `find` and `count` both wait on a two-party barrier, so a listing only
    /// completes when the two calls are in flight together.
    pub fn with_rendezvous(mut self) -> Self {
        self.rendezvous = Some(Arc::new(Barrier::new(2)));
        self
    }

    pub fn insert(&self, collection: &str, doc: Value) {
        let Value::Object(record) = doc else { panic!("documents are objects") };
        self.collections.lock().entry(collection.to_string()).or_default().push(record);
    }

    /// Ranked hits returned by every text search, best first.
    pub fn script_hits(&self, hits: &[(&str, f64)]) {
        *self.hits.lock() = hits.iter().map(|(k, s)| TextHit { key: k.to_string(), score: *s }).collect();
    }

    pub fn fail_on(&self, op: &'static str) {
        *self.fail_on.lock() = Some(op);
    }

    pub fn text_searches(&self) -> Vec<(TextCorpus, usize)> {
        self.corpora.lock().clone()
    }

    fn check(&self, op: &'static str) -> Result<()> {
        if *self.fail_on.lock() == Some(op) {
            return Err(Error::Store(format!("{op} failed")));
        }
        Ok(())
    }

    fn matching(&self, collection: &str, predicate: &Predicate) -> Vec<Record> {
        self.collections
            .lock()
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches(d, predicate)).cloned().collect())
            .unwrap_or_default()
    }
}

fn lookup<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}

fn compare(a: &Value, b: &Value) -> Option<CmpOrdering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn matches(record: &Record, predicate: &Predicate) -> bool {
    match predicate {
        Predicate::All => true,
        Predicate::Eq { path, value } => {
            lookup(record, path).is_some_and(|v| compare(v, value) == Some(CmpOrdering::Equal) || v == value)
        }
        Predicate::Gte { path, value } => {
            lookup(record, path).and_then(|v| compare(v, value)).is_some_and(|o| o != CmpOrdering::Less)
        }
        Predicate::Lte { path, value } => {
            lookup(record, path).and_then(|v| compare(v, value)).is_some_and(|o| o != CmpOrdering::Greater)
        }
        Predicate::And(parts) => parts.iter().all(|p| matches(record, p)),
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find(&self, collection: &str, predicate: &Predicate, options: &FindOptions) -> Result<Vec<Record>> {
        self.calls.find.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }
        self.check("find")?;
        let mut docs = self.matching(collection, predicate);
        if let Some((field, order)) = &options.sort {
            docs.sort_by(|a, b| {
                let ord = match (lookup(a, field), lookup(b, field)) {
                    (Some(x), Some(y)) => compare(x, y).unwrap_or(CmpOrdering::Equal),
                    _ => CmpOrdering::Equal,
                };
                if *order == SortOrder::Descending { ord.reverse() } else { ord }
            });
        }
        let skip = options.skip.unwrap_or(0);
        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(docs.into_iter().skip(skip).take(limit).collect())
    }

    async fn count(&self, collection: &str, predicate: &Predicate) -> Result<u64> {
        self.calls.count.fetch_add(1, Ordering::SeqCst);
        if let Some(barrier) = &self.rendezvous {
            barrier.wait().await;
        }
        self.check("count")?;
        Ok(self.matching(collection, predicate).len() as u64)
    }

    async fn find_one(&self, collection: &str, predicate: &Predicate) -> Result<Option<Record>> {
        self.calls.find_one.fetch_add(1, Ordering::SeqCst);
        self.check("find_one")?;
        Ok(self.matching(collection, predicate).into_iter().next())
    }

    async fn text_search(&self, corpus: &TextCorpus, _query: &str, limit: usize) -> Result<Vec<TextHit>> {
        self.calls.text_search.fetch_add(1, Ordering::SeqCst);
        self.check("text_search")?;
        self.corpora.lock().push((corpus.clone(), limit));
        Ok(self.hits.lock().iter().take(limit).cloned().collect())
    }
}

/// Hands out the same store on every call.
pub struct Direct(pub Arc<MemoryStore>);

impl StoreSource for Direct {
    type Store = MemoryStore;

    fn store(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.0)
    }
}

/// Pool connection backed by a shared [`MemoryStore`].
pub struct MemoryConn(Arc<MemoryStore>);

#[async_trait]
impl DocumentStore for MemoryConn {
    async fn find(&self, collection: &str, predicate: &Predicate, options: &FindOptions) -> Result<Vec<Record>> {
        self.0.find(collection, predicate, options).await
    }
    async fn count(&self, collection: &str, predicate: &Predicate) -> Result<u64> {
        self.0.count(collection, predicate).await
    }
    async fn find_one(&self, collection: &str, predicate: &Predicate) -> Result<Option<Record>> {
        self.0.find_one(collection, predicate).await
    }
    async fn text_search(&self, corpus: &TextCorpus, query: &str, limit: usize) -> Result<Vec<TextHit>> {
        self.0.text_search(corpus, query, limit).await
    }
}

#[async_trait]
impl Connection for MemoryConn {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

pub struct MemoryConnector(pub Arc<MemoryStore>);

#[async_trait]
impl Connector for MemoryConnector {
    type Conn = MemoryConn;

    async fn connect(&self) -> Result<MemoryConn> {
        Ok(MemoryConn(Arc::clone(&self.0)))
    }

    fn address(&self) -> String {
        "memory".to_string()
    }
}

/// `count` submissions for `form`, with ids `first..first + count` and
/// increasing `createdAt`.
pub fn seed_form(store: &MemoryStore, form: &str, first: u64, count: u64, data: impl Fn(u64) -> Value) {
    for id in first..first + count {
        store.insert(SUBMISSIONS, json!({"_id": id, "formId": form, "createdAt": id, "data": data(id)}));
    }
}

pub fn ids(docs: &[Record]) -> Vec<u64> {
    docs.iter().filter_map(|d| d.get("_id").and_then(Value::as_u64)).collect()
}
