//! SPARQL query result formats: the solution envelope shared by the
//! evaluator and its callers, and a reader/writer for the W3C SPARQL
//! Query Results JSON Format used by `SERVICE` federation and CLI output.

mod error;
mod json;
mod solutions;
mod term_value;

pub use error::ParseResultsError;
pub use json::{read_json, write_json};
pub use solutions::QueryResults;
pub use term_value::{TermValue, TermValueKind};
