//! SPARQL 1.1 Query Results JSON Format reader and writer.
//!
//! Bindings are written bit-exact to the shape described by the W3C
//! recommendation: `{"head":{"vars":[...]},"results":{"bindings":[...]}}`
//! for SELECT, and `{"head":{},"boolean":true|false}` for ASK. The reader
//! is tolerant of an absent `results.bindings` (treated as the empty
//! solution sequence) and an absent `boolean` only on documents that carry
//! `results` instead (mixed documents are rejected).

use crate::error::ParseResultsError;
use crate::solutions::QueryResults;
use crate::term_value::{TermValue, TermValueKind};
use serde_json::{Map, Value};
use std::io::{Read, Write};

pub fn write_json(results: &QueryResults, writer: impl Write) -> Result<(), ParseResultsError> {
    let value = to_json_value(results);
    serde_json::to_writer(writer, &value).map_err(ParseResultsError::from)
}

pub fn read_json(reader: impl Read) -> Result<QueryResults, ParseResultsError> {
    let value: Value = serde_json::from_reader(reader)?;
    from_json_value(&value)
}

fn to_json_value(results: &QueryResults) -> Value {
    match results {
        QueryResults::Boolean(b) => {
            let mut root = Map::new();
            root.insert("head".into(), Value::Object(Map::new()));
            root.insert("boolean".into(), Value::Bool(*b));
            Value::Object(root)
        }
        QueryResults::Solutions { variables, rows } => {
            let mut head = Map::new();
            head.insert(
                "vars".into(),
                Value::Array(variables.iter().map(|v| Value::String(v.clone())).collect()),
            );
            let bindings = rows
                .iter()
                .map(|row| {
                    let mut binding = Map::new();
                    for (name, value) in variables.iter().zip(row.iter()) {
                        if let Some(term) = value {
                            binding.insert(name.clone(), term_value_to_json(term));
                        }
                    }
                    Value::Object(binding)
                })
                .collect();
            let mut results_obj = Map::new();
            results_obj.insert("bindings".into(), Value::Array(bindings));
            let mut root = Map::new();
            root.insert("head".into(), Value::Object(head));
            root.insert("results".into(), Value::Object(results_obj));
            Value::Object(root)
        }
    }
}

fn term_value_to_json(term: &TermValue) -> Value {
    let mut obj = Map::new();
    obj.insert(
        "type".into(),
        Value::String(
            match term.kind {
                TermValueKind::Iri => "uri",
                TermValueKind::Literal => "literal",
                TermValueKind::BNode => "bnode",
            }
            .into(),
        ),
    );
    obj.insert("value".into(), Value::String(term.value.clone()));
    if let Some(lang) = &term.language {
        obj.insert("xml:lang".into(), Value::String(lang.clone()));
    }
    if let Some(dt) = &term.datatype {
        obj.insert("datatype".into(), Value::String(dt.clone()));
    }
    Value::Object(obj)
}

fn from_json_value(value: &Value) -> Result<QueryResults, ParseResultsError> {
    let root = value
        .as_object()
        .ok_or_else(|| ParseResultsError::malformed("root is not a JSON object"))?;
    if let Some(boolean) = root.get("boolean") {
        let b = boolean
            .as_bool()
            .ok_or_else(|| ParseResultsError::malformed("\"boolean\" is not a JSON bool"))?;
        return Ok(QueryResults::Boolean(b));
    }
    let head = root
        .get("head")
        .and_then(Value::as_object)
        .ok_or_else(|| ParseResultsError::malformed("missing \"head\" object"))?;
    let variables: Vec<String> = head
        .get("vars")
        .and_then(Value::as_array)
        .map(|vars| {
            vars.iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_owned)
                        .ok_or_else(|| ParseResultsError::malformed("non-string variable name"))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?
        .unwrap_or_default();
    let bindings = root
        .get("results")
        .and_then(Value::as_object)
        .and_then(|r| r.get("bindings"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    let rows = bindings
        .iter()
        .map(|binding| {
            let obj = binding
                .as_object()
                .ok_or_else(|| ParseResultsError::malformed("binding is not a JSON object"))?;
            variables
                .iter()
                .map(|name| obj.get(name).map(json_to_term_value).transpose())
                .collect::<Result<Vec<_>, _>>()
        })
        .collect::<Result<Vec<_>, ParseResultsError>>()?;
    Ok(QueryResults::Solutions { variables, rows })
}

fn json_to_term_value(value: &Value) -> Result<TermValue, ParseResultsError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ParseResultsError::malformed("binding value is not a JSON object"))?;
    let kind = obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| ParseResultsError::malformed("binding value missing \"type\""))?;
    let lexical = obj
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| ParseResultsError::malformed("binding value missing \"value\""))?
        .to_owned();
    let language = obj
        .get("xml:lang")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let datatype = obj
        .get("datatype")
        .and_then(Value::as_str)
        .map(str::to_owned);
    let kind = match kind {
        "uri" => TermValueKind::Iri,
        "bnode" => TermValueKind::BNode,
        "literal" | "typed-literal" => TermValueKind::Literal,
        other => {
            return Err(ParseResultsError::malformed(format_args!(
                "unknown binding type {other:?}"
            )))
        }
    };
    Ok(TermValue {
        kind,
        value: lexical,
        datatype,
        language,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_select_results() {
        let results = QueryResults::Solutions {
            variables: vec!["s".into(), "o".into()],
            rows: vec![vec![
                Some(TermValue::iri("http://example.com/s")),
                Some(TermValue::lang_literal("hello", "en")),
            ]],
        };
        let mut buf = Vec::new();
        write_json(&results, &mut buf).unwrap();
        let parsed = read_json(&buf[..]).unwrap();
        assert_eq!(parsed, results);
    }

    #[test]
    fn round_trips_ask_results() {
        let results = QueryResults::Boolean(true);
        let mut buf = Vec::new();
        write_json(&results, &mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf.clone()).unwrap(),
            r#"{"head":{},"boolean":true}"#
        );
        assert_eq!(read_json(&buf[..]).unwrap(), results);
    }

    #[test]
    fn tolerates_absent_bindings_array() {
        let doc = r#"{"head":{"vars":["x"]},"results":{}}"#;
        let parsed = read_json(doc.as_bytes()).unwrap();
        assert_eq!(
            parsed,
            QueryResults::Solutions {
                variables: vec!["x".into()],
                rows: vec![],
            }
        );
    }

    #[test]
    fn rejects_unknown_binding_type() {
        let doc = r#"{"head":{"vars":["x"]},"results":{"bindings":[{"x":{"type":"weird","value":"v"}}]}}"#;
        assert!(read_json(doc.as_bytes()).is_err());
    }
}
