//! Mapping ranked text hits back to the records that own them.
//!
//! What a hit key means depends on what the store text-indexes. When the
//! submission records themselves are indexed the key is the record id. When
//! only uploaded attachments are indexed the key is a blob key, and the
//! owning record is found through the attachment's metadata document.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use formsearch_core::types::{id_key, id_value};
use formsearch_core::{DocumentStore, Predicate, Result, TextCorpus};

/// Attachment metadata field holding the blob key.
pub const BLOB_KEY_FIELD: &str = "blobKey";
/// Attachment metadata field holding the owning record id.
pub const OWNER_FIELD: &str = "submissionId";

/// Which index full-text queries run against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FtsStrategy {
    /// Text index over the submission records.
    #[default]
    Records,
    /// Blob content index over uploaded attachments.
    Attachments,
}

#[async_trait]
pub trait HitResolver: Send + Sync {
    /// Where the text search runs.
    fn corpus(&self) -> TextCorpus;

    /// True when every hit key is itself a record id, so a page can be cut
    /// from the ranked list before anything is looked up.
    fn keys_are_records(&self) -> bool;

    /// The owning record's `_id`, or `None` for an orphaned index entry.
    async fn record_id(&self, store: &dyn DocumentStore, key: &str) -> Result<Option<Value>>;
}

#[derive(Debug, Clone)]
pub struct RecordResolver {
    collection: String,
}

impl RecordResolver {
    pub fn new(collection: impl Into<String>) -> Self {
        Self { collection: collection.into() }
    }
}

#[async_trait]
impl HitResolver for RecordResolver {
    fn corpus(&self) -> TextCorpus {
        TextCorpus::Collection(self.collection.clone())
    }

    fn keys_are_records(&self) -> bool {
        true
    }

    async fn record_id(&self, _store: &dyn DocumentStore, key: &str) -> Result<Option<Value>> {
        Ok((!key.is_empty()).then(|| id_value(key)))
    }
}

#[derive(Debug, Clone)]
pub struct AttachmentResolver {
    attachments: String,
    bucket: Option<String>,
}

impl AttachmentResolver {
    pub fn new(attachments: impl Into<String>, bucket: Option<String>) -> Self {
        Self { attachments: attachments.into(), bucket: bucket.filter(|b| !b.is_empty()) }
    }
}

#[async_trait]
impl HitResolver for AttachmentResolver {
    fn corpus(&self) -> TextCorpus {
        TextCorpus::Bucket(self.bucket.clone())
    }

    fn keys_are_records(&self) -> bool {
        false
    }

    async fn record_id(&self, store: &dyn DocumentStore, key: &str) -> Result<Option<Value>> {
        let meta = store.find_one(&self.attachments, &Predicate::eq(BLOB_KEY_FIELD, key)).await?;
        Ok(meta
            .as_ref()
            .and_then(|m| m.get(OWNER_FIELD))
            .and_then(id_key)
            .map(|owner| id_value(&owner)))
    }
}
