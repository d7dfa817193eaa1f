//! An embeddable, persistent SPARQL 1.1 database.
//!
//! This crate wires together the atom table and indexed quad store
//! (`spareval`), the zero-copy parser (`spargebra`), the cost-based planner
//! (`sparopt`) and the HTTP collaborators for `LOAD`/`SERVICE` into one
//! [`Store`] type. A caller only ever touches this crate; the lower layers
//! are reusable on their own but are not meant to be assembled by hand.

mod config;
mod error;
mod loader;
mod service;
mod store;

pub use config::StoreConfig;
pub use error::Error;
pub use loader::HttpGraphLoader;
pub use service::HttpServiceExecutor;
pub use store::{Store, Transaction};

pub use oxrdf as model;
pub use spareval::{QueryOptions, QueryResults, SelectResults, Statistics, UpdateSummary};
pub use spargebra::ParseError;
