//! Domain types shared by the pool, the store client and the search engine.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A document as returned by the store: a JSON object with `_id` and the
/// record's own fields.
pub type Record = serde_json::Map<String, Value>;

/// Per-field structured filter.
///
/// On the wire this is `{value}` for equality or `{min, max}` for an inclusive
/// range where a missing bound is unbounded. `null` and `""` count as missing,
/// and a descriptor with nothing usable becomes [`FilterDescriptor::Absent`].
/// When both shapes are sent the range wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawFilter", into = "RawFilter")]
pub enum FilterDescriptor {
    Value(Value),
    Range { min: Option<Value>, max: Option<Value> },
    Absent,
}

impl FilterDescriptor {
    pub fn value(v: impl Into<Value>) -> Self {
        FilterDescriptor::Value(v.into())
    }

    pub fn range(min: Option<Value>, max: Option<Value>) -> Self {
        FilterDescriptor::Range { min, max }
    }

    pub fn at_least(min: impl Into<Value>) -> Self {
        FilterDescriptor::Range { min: Some(min.into()), max: None }
    }

    pub fn at_most(max: impl Into<Value>) -> Self {
        FilterDescriptor::Range { min: None, max: Some(max.into()) }
    }

    pub fn between(min: impl Into<Value>, max: impl Into<Value>) -> Self {
        FilterDescriptor::Range { min: Some(min.into()), max: Some(max.into()) }
    }

    /// True when the descriptor constrains nothing.
    pub fn is_absent(&self) -> bool {
        matches!(self, FilterDescriptor::Absent | FilterDescriptor::Range { min: None, max: None })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RawFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max: Option<Value>,
}

fn present(v: Option<Value>) -> Option<Value> {
    v.filter(|v| !v.is_null() && v.as_str() != Some(""))
}

impl From<RawFilter> for FilterDescriptor {
    fn from(raw: RawFilter) -> Self {
        let min = present(raw.min);
        let max = present(raw.max);
        if min.is_some() || max.is_some() {
            return FilterDescriptor::Range { min, max };
        }
        match present(raw.value) {
            Some(v) => FilterDescriptor::Value(v),
            None => FilterDescriptor::Absent,
        }
    }
}

impl From<FilterDescriptor> for RawFilter {
    fn from(f: FilterDescriptor) -> Self {
        match f {
            FilterDescriptor::Value(v) => RawFilter { value: Some(v), ..Default::default() },
            FilterDescriptor::Range { min, max } => RawFilter { value: None, min, max },
            FilterDescriptor::Absent => RawFilter::default(),
        }
    }
}

/// One incoming hybrid query. Built per request and consumed by a single
/// `search` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    #[serde(default, alias = "formId", skip_serializing_if = "Option::is_none")]
    pub scope_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, FilterDescriptor>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text_query: String,
    #[serde(default)]
    pub skip: usize,
    /// Zero means "use the engine default".
    #[serde(default)]
    pub limit: usize,
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scoped(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_id = Some(scope_id.into());
        self
    }

    pub fn filter(mut self, field: impl Into<String>, descriptor: FilterDescriptor) -> Self {
        self.filters.insert(field.into(), descriptor);
        self
    }

    pub fn text(mut self, query: impl Into<String>) -> Self {
        self.text_query = query.into();
        self
    }

    pub fn page(mut self, skip: usize, limit: usize) -> Self {
        self.skip = skip;
        self.limit = limit;
        self
    }

    /// The owning-record scope, ignoring an empty id.
    pub fn scope(&self) -> Option<&str> {
        self.scope_id.as_deref().filter(|s| !s.is_empty())
    }

    pub fn has_filters(&self) -> bool {
        !self.filters.is_empty()
    }

    pub fn has_text(&self) -> bool {
        !self.text_query.trim().is_empty()
    }

    pub fn mode(&self) -> SearchMode {
        SearchMode::select(self.has_filters(), self.has_text())
    }
}

/// Execution mode, chosen purely from the request shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Structured,
    Fts,
    Combined,
    All,
}

impl SearchMode {
    pub fn select(has_filters: bool, has_text: bool) -> Self {
        match (has_filters, has_text) {
            (true, false) => SearchMode::Structured,
            (false, true) => SearchMode::Fts,
            (true, true) => SearchMode::Combined,
            (false, false) => SearchMode::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Structured => "structured",
            SearchMode::Fts => "fts",
            SearchMode::Combined => "combined",
            SearchMode::All => "all",
        }
    }

    /// Whether `SearchResult::total` is an exact corpus count in this mode.
    ///
    /// `fts` reports the number of ranked hits, bounded by the ranking cap.
    /// `combined` reports the matches accumulated before the walk stopped,
    /// which undercounts whenever more matches exist past `skip + limit`.
    pub fn total_is_exact(&self) -> bool {
        matches!(self, SearchMode::Structured | SearchMode::All)
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniform result envelope for every mode. See [`SearchMode::total_is_exact`]
/// for what `total` means per mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub docs: Vec<Record>,
    pub total: u64,
    pub mode: SearchMode,
}

/// A ranked full-text match. `key` is the record id or blob key the text
/// index was built over; higher `score` is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextHit {
    pub key: String,
    pub score: f64,
}

/// What a text search runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextCorpus {
    /// A text index over the records of a collection.
    Collection(String),
    /// The blob store's content index, optionally restricted to one bucket.
    Bucket(Option<String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_i8(self) -> i8 {
        match self {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<(String, SortOrder)>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort_desc(mut self, field: impl Into<String>) -> Self {
        self.sort = Some((field.into(), SortOrder::Descending));
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// The store assigns numeric ids; keys that look numeric are queried as numbers.
pub fn id_value(key: &str) -> Value {
    match key.parse::<u64>() {
        Ok(n) => Value::from(n),
        Err(_) => Value::from(key),
    }
}

/// Inverse of [`id_value`]: render an `_id`-like value as a lookup key.
pub fn id_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => match n.as_u64() {
            Some(u) => Some(u.to_string()),
            None => n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| format!("{f:.0}")),
        },
        _ => None,
    }
}
