use std::io;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::io::{AsyncWriteExt, BufStream};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use formsearch_core::types::id_key;
use formsearch_core::{
    Connection, Connector, DocumentStore, Error, FindOptions, Predicate, Record, Result, TextCorpus, TextHit,
};

use crate::protocol::{decode_reply, read_frame, write_frame};

/// One TCP connection to the store.
///
/// The stream carries strictly alternating request/reply frames, so every
/// exchange holds the connection's lock from write to read. Callers sharing
/// a client are served one at a time. The stream is taken out of its slot for
/// the exchange and put back only once the whole reply has been read, so an
/// I/O failure or a caller dropping the call mid-exchange leaves the client
/// closed, and every later call fails with [`Error::Closed`].
pub struct StoreClient {
    addr: String,
    stream: Mutex<Option<BufStream<TcpStream>>>,
}

impl StoreClient {
    pub async fn connect(addr: &str, timeout: Duration) -> Result<Self> {
        let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(Error::Connect { addr: addr.to_string(), source }),
            Err(_) => {
                let source = io::Error::new(io::ErrorKind::TimedOut, format!("no answer within {timeout:?}"));
                return Err(Error::Connect { addr: addr.to_string(), source });
            }
        };
        stream.set_nodelay(true)?;
        Ok(Self { addr: addr.to_string(), stream: Mutex::new(Some(BufStream::new(stream))) })
    }

    async fn request(&self, payload: Value) -> Result<Value> {
        let bytes = serde_json::to_vec(&payload)?;
        let mut guard = self.stream.lock().await;
        let mut stream = guard.take().ok_or(Error::Closed)?;
        let frame = exchange(&mut stream, &bytes).await?;
        *guard = Some(stream);
        drop(guard);

        let cmd = payload.get("cmd").and_then(Value::as_str).unwrap_or("");
        trace!(addr = %self.addr, cmd, bytes = frame.len(), "store: reply");
        decode_reply(&frame)
    }
}

async fn exchange(stream: &mut BufStream<TcpStream>, request: &[u8]) -> io::Result<Vec<u8>> {
    write_frame(stream, request).await?;
    read_frame(stream).await
}

fn into_records(data: Value) -> Result<Vec<Record>> {
    match data {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                other => Err(Error::Protocol(format!("expected a document, got {other}"))),
            })
            .collect(),
        other => Err(Error::Protocol(format!("expected a document list, got {other}"))),
    }
}

// Some stores encode integers as floats.
fn as_count(value: &Value) -> Option<u64> {
    value.as_u64().or_else(|| value.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
}

/// A ranked record as a hit. Stores that rank without exposing scores get
/// `0.0`, which keeps the store's order but carries no relevance value.
fn record_hit(record: &Record) -> Result<TextHit> {
    let key = record
        .get("_id")
        .and_then(id_key)
        .ok_or_else(|| Error::Protocol(format!("ranked record without a usable _id: {}", Value::Object(record.clone()))))?;
    let score = match record.get("_score").or_else(|| record.get("score")).and_then(Value::as_f64) {
        Some(score) => score,
        None => {
            debug!(key = %key, "store: ranked record carries no score");
            0.0
        }
    };
    Ok(TextHit { key, score })
}

#[derive(Deserialize)]
struct BlobHit {
    key: String,
    score: f64,
}

#[async_trait]
impl DocumentStore for StoreClient {
    async fn find(&self, collection: &str, predicate: &Predicate, options: &FindOptions) -> Result<Vec<Record>> {
        let mut payload = Map::new();
        payload.insert("cmd".into(), json!("find"));
        payload.insert("collection".into(), json!(collection));
        payload.insert("query".into(), predicate.to_query());
        if let Some((field, order)) = &options.sort {
            let mut sort = Map::new();
            sort.insert(field.clone(), json!(order.as_i8()));
            payload.insert("sort".into(), Value::Object(sort));
        }
        if let Some(skip) = options.skip {
            payload.insert("skip".into(), json!(skip));
        }
        if let Some(limit) = options.limit {
            payload.insert("limit".into(), json!(limit));
        }
        into_records(self.request(Value::Object(payload)).await?)
    }

    async fn count(&self, collection: &str, predicate: &Predicate) -> Result<u64> {
        let data = self.request(json!({ "cmd": "count", "collection": collection, "query": predicate })).await?;
        data.get("count")
            .and_then(as_count)
            .ok_or_else(|| Error::Protocol(format!("malformed count reply: {data}")))
    }

    async fn find_one(&self, collection: &str, predicate: &Predicate) -> Result<Option<Record>> {
        match self.request(json!({ "cmd": "find_one", "collection": collection, "query": predicate })).await? {
            Value::Null => Ok(None),
            Value::Object(record) => Ok(Some(record)),
            other => Err(Error::Protocol(format!("expected a document, got {other}"))),
        }
    }

    async fn text_search(&self, corpus: &TextCorpus, query: &str, limit: usize) -> Result<Vec<TextHit>> {
        match corpus {
            TextCorpus::Collection(collection) => {
                let data = self
                    .request(json!({ "cmd": "text_search", "collection": collection, "query": query, "limit": limit }))
                    .await?;
                into_records(data)?.iter().map(record_hit).collect()
            }
            TextCorpus::Bucket(bucket) => {
                let mut payload = json!({ "cmd": "search", "query": query, "limit": limit });
                if let Some(bucket) = bucket {
                    payload["bucket"] = json!(bucket);
                }
                let hits: Vec<BlobHit> = match self.request(payload).await? {
                    Value::Null => Vec::new(),
                    data => serde_json::from_value(data)?,
                };
                Ok(hits.into_iter().map(|h| TextHit { key: h.key, score: h.score }).collect())
            }
        }
    }
}

#[async_trait]
impl Connection for StoreClient {
    async fn ping(&self) -> Result<()> {
        self.request(json!({ "cmd": "ping" })).await.map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        let taken = self.stream.lock().await.take();
        if let Some(mut stream) = taken {
            stream.shutdown().await?;
        }
        Ok(())
    }
}

/// Where and how to reach the store. Read from the `store` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub host: String,
    pub port: u16,
    pub connect_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 4444, connect_timeout_ms: 5000 }
    }
}

impl StoreSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn connector(&self) -> TcpConnector {
        TcpConnector::new(self.addr(), Duration::from_millis(self.connect_timeout_ms))
    }
}

#[derive(Debug, Clone)]
pub struct TcpConnector {
    addr: String,
    timeout: Duration,
}

impl TcpConnector {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self { addr: addr.into(), timeout }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    type Conn = StoreClient;

    async fn connect(&self) -> Result<StoreClient> {
        StoreClient::connect(&self.addr, self.timeout).await
    }

    fn address(&self) -> String {
        self.addr.clone()
    }
}
