//! The `SERVICE` federation collaborator: issues the sub-query as a GET
//! against a remote SPARQL endpoint and decodes the SPARQL-results JSON
//! response with `sparesults`, the same codec this crate uses for its own
//! wire format.

use std::io::Read;

use oxhttp::model::{Method, Request};
use spareval::{EngineError, EngineResult, ServiceExecutor, ServiceResponse};
use sparesults::QueryResults as WireQueryResults;

use crate::config::StoreConfig;

pub struct HttpServiceExecutor {
    client: oxhttp::Client,
    config: StoreConfig,
}

impl HttpServiceExecutor {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            client: oxhttp::Client::new().with_redirection_limit(5),
            config,
        }
    }

    fn execute_once(&self, endpoint: &str, select_query: &str) -> EngineResult<ServiceResponse> {
        let url = format!(
            "{}{}query={}",
            endpoint,
            if endpoint.contains('?') { "&" } else { "?" },
            urlencode(select_query)
        );
        let url = url
            .parse()
            .map_err(|e| EngineError::Endpoint(format!("invalid SERVICE endpoint <{endpoint}>: {e}")))?;
        let request = Request::builder(Method::GET, url)
            .with_header("accept", "application/sparql-results+json")
            .map_err(|e| EngineError::Endpoint(format!("building SERVICE request failed: {e}")))?
            .build();
        let mut response = self
            .client
            .request(request)
            .map_err(|e| EngineError::Endpoint(format!("SERVICE call to <{endpoint}> failed: {e}")))?;
        if !response.status().is_successful() {
            return Err(EngineError::Endpoint(format!(
                "SERVICE call to <{endpoint}> returned HTTP {}",
                response.status()
            )));
        }
        let body = response.into_body();
        let mut bytes = Vec::new();
        match self.config.max_download_bytes() {
            Some(max) => {
                body.take(max + 1)
                    .read_to_end(&mut bytes)
                    .map_err(|e| EngineError::Endpoint(format!("reading SERVICE response failed: {e}")))?;
                if bytes.len() as u64 > max {
                    return Err(EngineError::LimitExceeded(format!(
                        "SERVICE response from <{endpoint}> exceeded the configured limit of {max} bytes"
                    )));
                }
            }
            None => {
                body.take(u64::MAX)
                    .read_to_end(&mut bytes)
                    .map_err(|e| EngineError::Endpoint(format!("reading SERVICE response failed: {e}")))?;
            }
        }
        let parsed = sparesults::read_json(bytes.as_slice())
            .map_err(|e| EngineError::Endpoint(format!("invalid SPARQL results JSON from <{endpoint}>: {e}")))?;
        let WireQueryResults::Solutions { variables, rows } = parsed else {
            return Err(EngineError::Endpoint(format!(
                "SERVICE endpoint <{endpoint}> returned a boolean result for a SELECT query"
            )));
        };
        let rows = rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| cell.as_ref().map(TryInto::try_into).transpose())
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e: sparesults::ParseResultsError| {
                EngineError::Endpoint(format!("SERVICE endpoint <{endpoint}> returned an unparseable term: {e}"))
            })?;
        Ok(ServiceResponse { variables, rows })
    }
}

impl ServiceExecutor for HttpServiceExecutor {
    fn execute(&self, endpoint: &str, select_query: &str) -> EngineResult<ServiceResponse> {
        let mut attempt = 0;
        loop {
            match self.execute_once(endpoint, select_query) {
                Ok(response) => return Ok(response),
                Err(_) if attempt < self.config.service_default_retries => {
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_unreserved_characters_untouched() {
        assert_eq!(urlencode("abcXYZ019-_.~"), "abcXYZ019-_.~");
    }

    #[test]
    fn percent_encodes_reserved_and_space_characters() {
        assert_eq!(urlencode("SELECT * WHERE { ?s ?p ?o }"), "SELECT%20%2A%20WHERE%20%7B%20%3Fs%20%3Fp%20%3Fo%20%7D");
    }
}
