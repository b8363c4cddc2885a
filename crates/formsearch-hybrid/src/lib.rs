//! Hybrid search over a document store: structured predicates, ranked
//! full-text hits, or the intersection of both, behind one request type.

#![deny(warnings)]
#![deny(unused_imports)]

pub mod compiler;
pub mod engine;
pub mod resolve;

pub use compiler::PredicateCompiler;
pub use engine::{EngineOptions, HybridSearchEngine};
pub use resolve::{AttachmentResolver, FtsStrategy, HitResolver, RecordResolver};
