//! The `LOAD` collaborator: fetches a remote document over HTTP and parses
//! it into triples with `oxrdfio`. Concrete RDF syntax parsing is
//! deliberately not reimplemented here — it is delegated to the same crate
//! the rest of the ecosystem uses for it.

use std::io::Read;

use oxhttp::model::{Method, Request};
use oxrdf::Triple;
use oxrdfio::{RdfFormat, RdfParser};
use spareval::{EngineError, EngineResult, GraphLoader};

use crate::config::StoreConfig;

/// Guesses a syntax from the final path segment of an IRI, the way a
/// command-line loader would pick a parser for a file without being told
/// its format up front. Falls back to Turtle, the most common `LOAD`
/// target in the wild.
fn guess_format(iri: &str) -> RdfFormat {
    let path = iri.split(['?', '#']).next().unwrap_or(iri);
    match path.rsplit('.').next() {
        Some("nt") => RdfFormat::NTriples,
        Some("nq") => RdfFormat::NQuads,
        Some("trig") => RdfFormat::TriG,
        Some("n3") => RdfFormat::N3,
        Some("rdf") | Some("xml") => RdfFormat::RdfXml,
        _ => RdfFormat::Turtle,
    }
}

/// Fetches `iri` over HTTP GET and parses the body as RDF, honoring the
/// byte and content-length caps configured on the store.
pub struct HttpGraphLoader {
    client: oxhttp::Client,
    config: StoreConfig,
}

impl HttpGraphLoader {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            client: oxhttp::Client::new().with_redirection_limit(5),
            config,
        }
    }
}

impl GraphLoader for HttpGraphLoader {
    fn load(&self, iri: &str) -> EngineResult<Vec<Triple>> {
        let url = iri
            .parse()
            .map_err(|e| EngineError::evaluation(format!("invalid LOAD IRI <{iri}>: {e}")))?;
        let request = Request::builder(Method::GET, url).build();
        let mut response = self
            .client
            .request(request)
            .map_err(|e| EngineError::Endpoint(format!("fetching <{iri}> failed: {e}")))?;
        if !response.status().is_successful() {
            return Err(EngineError::Endpoint(format!(
                "fetching <{iri}> returned HTTP {}",
                response.status()
            )));
        }
        if self.config.enforce_content_length {
            if let (Some(max), Some(len)) = (
                self.config.max_download_bytes(),
                response.header("content-length").and_then(|v| v.to_str().ok()?.parse::<u64>().ok()),
            ) {
                if len > max {
                    return Err(EngineError::LimitExceeded(format!(
                        "<{iri}> declares Content-Length {len}, exceeding the configured limit of {max}"
                    )));
                }
            }
        }
        let body = response.into_body();
        let bytes = match self.config.max_download_bytes() {
            Some(max) => {
                let mut limited = body.take(max + 1);
                let mut buf = Vec::new();
                limited
                    .read_to_end(&mut buf)
                    .map_err(|e| EngineError::evaluation(format!("reading <{iri}> failed: {e}")))?;
                if buf.len() as u64 > max {
                    return Err(EngineError::LimitExceeded(format!(
                        "<{iri}> exceeded the configured download limit of {max} bytes"
                    )));
                }
                buf
            }
            None => {
                let mut buf = Vec::new();
                body.take(u64::MAX)
                    .read_to_end(&mut buf)
                    .map_err(|e| EngineError::evaluation(format!("reading <{iri}> failed: {e}")))?;
                buf
            }
        };

        let parser = RdfParser::from_format(guess_format(iri))
            .with_base_iri(iri)
            .map_err(|e| EngineError::evaluation(format!("invalid base IRI <{iri}>: {e}")))?;
        let mut triples = Vec::new();
        for quad in parser.for_reader(bytes.as_slice()) {
            let quad = quad.map_err(|e| EngineError::evaluation(format!("parsing <{iri}> failed: {e}")))?;
            triples.push(quad.into_triple());
            if let Some(max) = self.config.max_triple_count() {
                if triples.len() as u64 > max {
                    return Err(EngineError::LimitExceeded(format!(
                        "<{iri}> yielded more than the configured limit of {max} triples"
                    )));
                }
            }
        }
        Ok(triples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_format_from_the_final_path_segment() {
        assert_eq!(guess_format("http://example.com/data.nt"), RdfFormat::NTriples);
        assert_eq!(guess_format("http://example.com/data.nq"), RdfFormat::NQuads);
        assert_eq!(guess_format("http://example.com/data.trig"), RdfFormat::TriG);
        assert_eq!(guess_format("http://example.com/data.rdf"), RdfFormat::RdfXml);
    }

    #[test]
    fn falls_back_to_turtle_for_unknown_or_missing_extensions() {
        assert_eq!(guess_format("http://example.com/data"), RdfFormat::Turtle);
        assert_eq!(guess_format("http://example.com/data.ttl"), RdfFormat::Turtle);
    }

    #[test]
    fn ignores_query_and_fragment_when_guessing_format() {
        assert_eq!(
            guess_format("http://example.com/data.nt?version=2#frag"),
            RdfFormat::NTriples
        );
    }
}
