//! formsearch-store
//!
//! TCP client for the document store. Implements the core store traits so
//! the pool and the search engine can run against a live server.

#![deny(warnings)]
#![deny(unused_imports)]

pub mod client;
pub mod protocol;

pub use client::{StoreClient, StoreSettings, TcpConnector};
