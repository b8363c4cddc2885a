#![deny(warnings)]
#![deny(dead_code)]
#![deny(unused_variables)]
#![deny(unused_imports)]

pub mod config;
pub mod error;
pub mod predicate;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use predicate::Predicate;
pub use traits::{Connection, Connector, DocumentStore, StoreSource};
pub use types::{FilterDescriptor, FindOptions, Record, SearchMode, SearchRequest, SearchResult, SortOrder, TextCorpus, TextHit};
