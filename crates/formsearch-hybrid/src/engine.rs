use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use formsearch_core::{
    DocumentStore, FindOptions, Predicate, Record, Result, SearchMode, SearchRequest, SearchResult, StoreSource,
    TextHit,
};

use crate::compiler::PredicateCompiler;
use crate::resolve::{AttachmentResolver, FtsStrategy, HitResolver, RecordResolver};

/// The `search` config section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Collection holding the searchable records.
    pub submissions: String,
    /// Collection holding attachment metadata (`blobKey`, `submissionId`).
    pub attachments: String,
    pub blob_bucket: String,
    pub scope_field: String,
    pub data_prefix: String,
    /// Listing order for structured and unfiltered searches, newest first.
    pub sort_field: String,
    /// Field that carries the relevance score on text-matched records.
    pub score_field: String,
    /// Most ranked hits requested from the text index per query.
    pub ranking_cap: usize,
    pub default_limit: usize,
    pub fts_strategy: FtsStrategy,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            submissions: "_dms_submissions".to_string(),
            attachments: "_dms_documents".to_string(),
            blob_bucket: "dms_files".to_string(),
            scope_field: "formId".to_string(),
            data_prefix: "data".to_string(),
            sort_field: "createdAt".to_string(),
            score_field: "_score".to_string(),
            ranking_cap: 500,
            default_limit: 20,
            fts_strategy: FtsStrategy::Records,
        }
    }
}

impl EngineOptions {
    pub fn compiler(&self) -> PredicateCompiler {
        PredicateCompiler::new(self.scope_field.as_str(), self.data_prefix.as_str())
    }

    pub fn resolver(&self) -> Box<dyn HitResolver> {
        match self.fts_strategy {
            FtsStrategy::Records => Box::new(RecordResolver::new(self.submissions.as_str())),
            FtsStrategy::Attachments => {
                Box::new(AttachmentResolver::new(self.attachments.as_str(), Some(self.blob_bucket.clone())))
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Page {
    skip: usize,
    limit: usize,
}

impl Page {
    fn end(self) -> usize {
        self.skip.saturating_add(self.limit)
    }
}

/// Answers [`SearchRequest`]s against the store behind a [`StoreSource`].
///
/// Stateless between calls; one engine serves any number of concurrent
/// requests. Every store call takes its own handle from the source, and any
/// store error aborts the request unchanged.
pub struct HybridSearchEngine<P: StoreSource> {
    source: Arc<P>,
    options: EngineOptions,
    compiler: PredicateCompiler,
    resolver: Box<dyn HitResolver>,
}

impl<P: StoreSource> HybridSearchEngine<P> {
    pub fn new(source: Arc<P>, options: EngineOptions) -> Self {
        let compiler = options.compiler();
        let resolver = options.resolver();
        Self { source, options, compiler, resolver }
    }

    /// Run one request. The mode comes from the request shape alone:
    ///
    /// | filters | text | mode |
    /// |---|---|---|
    /// | yes | no | `structured` |
    /// | no | yes | `fts` |
    /// | yes | yes | `combined` |
    /// | no | no | `all` |
    ///
    /// `total` is exact only where [`SearchMode::total_is_exact`] says so.
    #[instrument(level = "debug", skip_all, fields(mode = %request.mode(), skip = request.skip, limit = request.limit))]
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchResult> {
        let mode = request.mode();
        let limit = if request.limit == 0 { self.options.default_limit } else { request.limit };
        let page = Page { skip: request.skip, limit };

        let (docs, total) = match mode {
            SearchMode::Structured | SearchMode::All => {
                let predicate = self.compiler.compile(request.scope(), &request.filters);
                self.listing(&predicate, page).await?
            }
            SearchMode::Fts => self.full_text(&request.text_query, page).await?,
            SearchMode::Combined => {
                let predicate = self.compiler.compile(request.scope(), &request.filters);
                self.combined(&request.text_query, &predicate, page).await?
            }
        };
        debug!(returned = docs.len(), total, "search: done");
        Ok(SearchResult { docs, total, mode })
    }

    /// Page and exact count for a predicate, issued concurrently.
    async fn listing(&self, predicate: &Predicate, page: Page) -> Result<(Vec<Record>, u64)> {
        let options = FindOptions::new()
            .sort_desc(self.options.sort_field.as_str())
            .skip(page.skip)
            .limit(page.limit);
        let finder = self.source.store();
        let counter = self.source.store();
        let collection = self.options.submissions.as_str();
        futures::try_join!(finder.find(collection, predicate, &options), counter.count(collection, predicate))
    }

    async fn ranked_hits(&self, query: &str) -> Result<Vec<TextHit>> {
        let hits = self.source.store().text_search(&self.resolver.corpus(), query, self.options.ranking_cap).await?;
        debug!(hits = hits.len(), cap = self.options.ranking_cap, "search: ranked hits");
        Ok(hits)
    }

    async fn full_text(&self, query: &str, page: Page) -> Result<(Vec<Record>, u64)> {
        let hits = self.ranked_hits(query).await?;
        let total = hits.len() as u64;
        let unfiltered = Predicate::All;

        let docs = if self.resolver.keys_are_records() {
            let window = hits.iter().skip(page.skip).take(page.limit);
            let fetched = try_join_all(window.map(|hit| self.fetch(hit, &unfiltered))).await?;
            fetched.into_iter().flatten().collect()
        } else {
            let found = self.first_matches(&hits, &unfiltered, page.end()).await?;
            found.into_iter().skip(page.skip).collect()
        };
        Ok((docs, total))
    }

    /// Text hits intersected with the structured predicate.
    ///
    /// Stops once `skip + limit` matches are found, so `total` counts matches
    /// seen before stopping rather than every match in the ranked list.
    async fn combined(&self, query: &str, predicate: &Predicate, page: Page) -> Result<(Vec<Record>, u64)> {
        let hits = self.ranked_hits(query).await?;
        let found = self.first_matches(&hits, predicate, page.end()).await?;
        let total = found.len() as u64;
        Ok((found.into_iter().skip(page.skip).collect(), total))
    }

    /// Walk hits in rank order, keeping resolved records that satisfy
    /// `predicate`, until `want` are kept.
    async fn first_matches(&self, hits: &[TextHit], predicate: &Predicate, want: usize) -> Result<Vec<Record>> {
        let mut found = Vec::new();
        for hit in hits {
            if found.len() >= want {
                break;
            }
            if let Some(record) = self.fetch(hit, predicate).await? {
                found.push(record);
            }
        }
        Ok(found)
    }

    /// The record behind one hit, if it still exists and matches `predicate`.
    async fn fetch(&self, hit: &TextHit, predicate: &Predicate) -> Result<Option<Record>> {
        let store = self.source.store();
        let Some(id) = self.resolver.record_id(&*store, &hit.key).await? else {
            debug!(key = %hit.key, "search: orphaned hit skipped");
            return Ok(None);
        };
        let lookup = Predicate::all_of(vec![Predicate::eq("_id", id), predicate.clone()]);
        let record = store.find_one(&self.options.submissions, &lookup).await?;
        Ok(record.map(|mut record| {
            record.insert(self.options.score_field.clone(), Value::from(hit.score));
            record
        }))
    }
}
