//! Black-box coverage for the query forms and update operations not
//! already exercised by `testable_properties.rs`: CONSTRUCT, DESCRIBE,
//! aggregation, ORDER BY, UNION, variable GRAPH, sub-SELECT, DELETE WHERE
//! and CLEAR/DROP.

use oxigraph::model::{NamedNode, Term};
use oxigraph::{QueryResults, Store};

fn term_str(t: &Option<Term>) -> String {
    match t {
        Some(Term::Literal(l)) => l.value().to_owned(),
        Some(Term::NamedNode(n)) => n.as_str().to_owned(),
        Some(Term::BlankNode(b)) => b.as_str().to_owned(),
        None => String::new(),
    }
}

fn solutions(results: QueryResults) -> Vec<Vec<String>> {
    match results {
        QueryResults::Solutions(s) => s.rows.iter().map(|row| row.iter().map(term_str).collect()).collect(),
        _ => panic!("expected a SELECT result"),
    }
}

fn bare_subject(s: &oxigraph::model::NamedOrBlankNode) -> String {
    match s {
        oxigraph::model::NamedOrBlankNode::NamedNode(n) => n.as_str().to_owned(),
        oxigraph::model::NamedOrBlankNode::BlankNode(b) => b.as_str().to_owned(),
    }
}

fn graph(results: QueryResults) -> Vec<(String, String, String)> {
    match results {
        QueryResults::Graph(triples) => triples
            .into_iter()
            .map(|t| {
                (
                    bare_subject(&t.subject),
                    t.predicate.as_str().to_owned(),
                    term_str(&Some(t.object)),
                )
            })
            .collect(),
        _ => panic!("expected a CONSTRUCT/DESCRIBE result"),
    }
}

fn seed_people(store: &Store) {
    store
        .update(
            "INSERT DATA { \
                <urn:ex:Alice> <urn:ex:name> \"Alice\" . \
                <urn:ex:Alice> <urn:ex:age> 30 . \
                <urn:ex:Alice> <urn:ex:knows> <urn:ex:Bob> . \
                <urn:ex:Bob> <urn:ex:name> \"Bob\" . \
                <urn:ex:Bob> <urn:ex:age> 25 . \
                <urn:ex:Charlie> <urn:ex:name> \"Charlie\" . \
                <urn:ex:Charlie> <urn:ex:age> 35 . \
            }",
        )
        .unwrap();
}

#[test]
fn construct_instantiates_template_per_solution() {
    let store = Store::new();
    seed_people(&store);
    let triples = graph(
        store
            .query(
                "CONSTRUCT { ?p <urn:ex:hasAge> ?a } WHERE { ?p <urn:ex:age> ?a }",
            )
            .unwrap(),
    );
    assert_eq!(triples.len(), 3);
    assert!(triples
        .iter()
        .all(|(_, p, _)| p == "urn:ex:hasAge"));
}

#[test]
fn construct_deduplicates_triples() {
    let store = Store::new();
    seed_people(&store);
    // Every person matches both the `?p <name> ?n` and the bare `?p ?p2 ?p3`
    // wildcard, but the CONSTRUCT template names one fixed predicate, so a
    // person contributing two solutions must still emit one triple.
    let triples = graph(
        store
            .query(
                "CONSTRUCT { ?p <urn:ex:isPerson> <urn:ex:yes> } WHERE { \
                    ?p <urn:ex:name> ?n . ?p <urn:ex:age> ?a \
                }",
            )
            .unwrap(),
    );
    assert_eq!(triples.len(), 3);
}

#[test]
fn describe_emits_all_triples_with_resource_as_subject() {
    let store = Store::new();
    seed_people(&store);
    let triples = graph(store.query("DESCRIBE <urn:ex:Alice>").unwrap());
    assert_eq!(triples.len(), 3);
    assert!(triples.iter().all(|(s, _, _)| s == "urn:ex:Alice"));
}

#[test]
fn describe_variable_target_covers_every_binding() {
    let store = Store::new();
    seed_people(&store);
    let triples = graph(
        store
            .query("DESCRIBE ?p WHERE { ?p <urn:ex:age> ?a . FILTER(?a > 28) }")
            .unwrap(),
    );
    let subjects: std::collections::HashSet<_> = triples.iter().map(|(s, _, _)| s.clone()).collect();
    assert_eq!(subjects, ["urn:ex:Alice", "urn:ex:Charlie"].into_iter().map(str::to_owned).collect());
}

#[test]
fn group_by_count_aggregates_per_bucket() {
    let store = Store::new();
    seed_people(&store);
    store
        .update("INSERT DATA { <urn:ex:Dana> <urn:ex:age> 30 }")
        .unwrap();
    let rows = solutions(
        store
            .query("SELECT ?a (COUNT(?p) AS ?n) WHERE { ?p <urn:ex:age> ?a } GROUP BY ?a ORDER BY ?a")
            .unwrap(),
    );
    assert_eq!(rows.len(), 3);
    // age 25 -> Bob only, age 30 -> Alice + Dana, age 35 -> Charlie only.
    assert_eq!(rows[0], vec!["25".to_owned(), "1".to_owned()]);
    assert_eq!(rows[1], vec!["30".to_owned(), "2".to_owned()]);
    assert_eq!(rows[2], vec!["35".to_owned(), "1".to_owned()]);
}

#[test]
fn group_concat_joins_lexical_values_not_ntriples_syntax() {
    let store = Store::new();
    store
        .update(
            "INSERT DATA { \
                <urn:ex:Alice> <urn:ex:nick> \"Ally\" . \
                <urn:ex:Alice> <urn:ex:nick> \"Lissie\" . \
            }",
        )
        .unwrap();
    let rows = solutions(
        store
            .query("SELECT (GROUP_CONCAT(?n) AS ?ns) WHERE { <urn:ex:Alice> <urn:ex:nick> ?n }")
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    let joined = &rows[0][0];
    assert!(!joined.contains('"'), "GROUP_CONCAT must not embed N-Triples quoting: {joined}");
    let mut parts: Vec<&str> = joined.split(' ').collect();
    parts.sort_unstable();
    assert_eq!(parts, vec!["Ally", "Lissie"]);
}

#[test]
fn aggregate_without_group_by_emits_one_row_for_empty_input() {
    let store = Store::new();
    let rows = solutions(
        store
            .query("SELECT (COUNT(?x) AS ?n) WHERE { ?x <urn:ex:nonexistent> ?y }")
            .unwrap(),
    );
    assert_eq!(rows, vec![vec!["0".to_owned()]]);
}

#[test]
fn order_by_sorts_rows_by_key() {
    let store = Store::new();
    seed_people(&store);
    let rows = solutions(
        store
            .query("SELECT ?n ?a WHERE { ?p <urn:ex:name> ?n . ?p <urn:ex:age> ?a } ORDER BY ?a")
            .unwrap(),
    );
    let ages: Vec<&str> = rows.iter().map(|r| r[1].as_str()).collect();
    assert_eq!(ages, vec!["25", "30", "35"]);
}

#[test]
fn order_by_descending() {
    let store = Store::new();
    seed_people(&store);
    let rows = solutions(
        store
            .query("SELECT ?a WHERE { ?p <urn:ex:age> ?a } ORDER BY DESC(?a)")
            .unwrap(),
    );
    let ages: Vec<&str> = rows.iter().map(|r| r[0].as_str()).collect();
    assert_eq!(ages, vec!["35", "30", "25"]);
}

#[test]
fn union_concatenates_branches() {
    let store = Store::new();
    seed_people(&store);
    let rows = solutions(
        store
            .query(
                "SELECT ?x WHERE { \
                    { ?x <urn:ex:age> 30 } UNION { ?x <urn:ex:age> 25 } \
                }",
            )
            .unwrap(),
    );
    let mut names: Vec<String> = rows.into_iter().map(|r| r[0].clone()).collect();
    names.sort();
    assert_eq!(names, vec!["urn:ex:Alice", "urn:ex:Bob"]);
}

#[test]
fn graph_variable_binds_graph_name() {
    let store = Store::new();
    store
        .update(
            "INSERT DATA { GRAPH <urn:ex:g1> { <urn:ex:A> <urn:ex:p> <urn:ex:B> } }",
        )
        .unwrap();
    store
        .update(
            "INSERT DATA { GRAPH <urn:ex:g2> { <urn:ex:C> <urn:ex:p> <urn:ex:D> } }",
        )
        .unwrap();
    let rows = solutions(
        store
            .query("SELECT ?g ?s WHERE { GRAPH ?g { ?s <urn:ex:p> ?o } } ORDER BY ?g")
            .unwrap(),
    );
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0], vec!["urn:ex:g1".to_owned(), "urn:ex:A".to_owned()]);
    assert_eq!(rows[1], vec!["urn:ex:g2".to_owned(), "urn:ex:C".to_owned()]);
}

#[test]
fn graph_default_excluded_from_variable_iteration() {
    let store = Store::new();
    store
        .update("INSERT DATA { <urn:ex:A> <urn:ex:p> <urn:ex:B> }")
        .unwrap();
    store
        .update("INSERT DATA { GRAPH <urn:ex:g1> { <urn:ex:C> <urn:ex:p> <urn:ex:D> } }")
        .unwrap();
    let rows = solutions(
        store
            .query("SELECT ?g WHERE { GRAPH ?g { ?s <urn:ex:p> ?o } }")
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], "urn:ex:g1");
}

#[test]
fn subselect_limits_variables_to_its_projection() {
    let store = Store::new();
    seed_people(&store);
    let rows = solutions(
        store
            .query(
                "SELECT ?p WHERE { \
                    ?p <urn:ex:name> ?n . \
                    { SELECT ?p WHERE { ?p <urn:ex:age> ?a } ORDER BY ?a LIMIT 1 } \
                }",
            )
            .unwrap(),
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0][0], "urn:ex:Bob");
}

#[test]
fn delete_where_removes_matching_quads() {
    let store = Store::new();
    seed_people(&store);
    store
        .update("DELETE WHERE { ?p <urn:ex:age> ?a }")
        .unwrap();
    let rows = solutions(store.query("SELECT ?p ?a WHERE { ?p <urn:ex:age> ?a }").unwrap());
    assert!(rows.is_empty());
    // Unrelated predicates survive.
    let rows = solutions(store.query("SELECT ?n WHERE { ?p <urn:ex:name> ?n }").unwrap());
    assert_eq!(rows.len(), 3);
}

#[test]
fn insert_delete_where_rewrites_matching_rows() {
    let store = Store::new();
    seed_people(&store);
    store
        .update(
            "DELETE { ?p <urn:ex:age> ?a } INSERT { ?p <urn:ex:ageNextYear> ?a } WHERE { \
                ?p <urn:ex:age> ?a \
            }",
        )
        .unwrap();
    let old = solutions(store.query("SELECT ?p WHERE { ?p <urn:ex:age> ?a }").unwrap());
    assert!(old.is_empty());
    let renamed = solutions(
        store
            .query("SELECT ?p WHERE { ?p <urn:ex:ageNextYear> ?a }")
            .unwrap(),
    );
    assert_eq!(renamed.len(), 3);
}

#[test]
fn clear_graph_empties_only_that_graph() {
    let store = Store::new();
    store
        .update("INSERT DATA { GRAPH <urn:ex:g1> { <urn:ex:A> <urn:ex:p> <urn:ex:B> } }")
        .unwrap();
    store
        .update("INSERT DATA { <urn:ex:X> <urn:ex:p> <urn:ex:Y> }")
        .unwrap();
    store.update("CLEAR GRAPH <urn:ex:g1>").unwrap();
    let named = solutions(
        store
            .query("SELECT ?s WHERE { GRAPH <urn:ex:g1> { ?s ?p ?o } }")
            .unwrap(),
    );
    assert!(named.is_empty());
    let default = solutions(store.query("SELECT ?s WHERE { ?s <urn:ex:p> ?o }").unwrap());
    assert_eq!(default.len(), 1);
}

#[test]
fn drop_all_clears_every_graph() {
    let store = Store::new();
    seed_people(&store);
    store
        .update("INSERT DATA { GRAPH <urn:ex:g1> { <urn:ex:A> <urn:ex:p> <urn:ex:B> } }")
        .unwrap();
    store.update("DROP ALL").unwrap();
    assert!(store.is_empty());
}

#[test]
fn ask_reports_existence() {
    let store = Store::new();
    seed_people(&store);
    let found = matches!(
        store.query("ASK { ?p <urn:ex:age> 30 }").unwrap(),
        QueryResults::Boolean(true)
    );
    assert!(found);
    let not_found = matches!(
        store.query("ASK { ?p <urn:ex:age> 99 }").unwrap(),
        QueryResults::Boolean(false)
    );
    assert!(not_found);
}

#[test]
fn updates_disabled_rejects_writes() {
    let mut config = oxigraph::StoreConfig::default();
    config.allow_updates = false;
    let store = Store::with_config(config);
    let err = store.update("INSERT DATA { <urn:ex:A> <urn:ex:p> <urn:ex:B> }");
    assert!(matches!(err, Err(oxigraph::Error::UpdatesDisabled)));
}

#[test]
fn insert_and_remove_single_quads_bypass_sparql() {
    let store = Store::new();
    let quad = oxigraph::model::Quad::new(
        NamedNode::new("urn:ex:A").unwrap(),
        NamedNode::new("urn:ex:p").unwrap(),
        Term::NamedNode(NamedNode::new("urn:ex:B").unwrap()),
        oxigraph::model::GraphName::DefaultGraph,
    );
    assert!(store.insert(&quad).unwrap());
    assert!(!store.insert(&quad).unwrap());
    assert_eq!(store.len(), 1);
    assert!(store.remove(&quad).unwrap());
    assert!(store.is_empty());
}

#[test]
fn transaction_commits_atomically() {
    let store = Store::new();
    store
        .transaction::<(), oxigraph::Error>(|txn| {
            txn.insert(oxigraph::model::Quad::new(
                NamedNode::new("urn:ex:A").unwrap(),
                NamedNode::new("urn:ex:p").unwrap(),
                Term::NamedNode(NamedNode::new("urn:ex:B").unwrap()),
                oxigraph::model::GraphName::DefaultGraph,
            ));
            Ok(())
        })
        .unwrap();
    assert_eq!(store.len(), 1);
}

#[test]
fn construct_gives_each_solution_its_own_blank_node_but_keeps_one_per_row() {
    let store = Store::new();
    seed_people(&store);
    // Three people, each with a name, so the template blank node label
    // must produce three distinct identities -- one per solution -- while
    // the same label within one solution's two triples must stay identical.
    let triples = graph(
        store
            .query(
                "CONSTRUCT { _:x <urn:ex:nameOf> ?p . _:x <urn:ex:label> ?n } \
                 WHERE { ?p <urn:ex:name> ?n }",
            )
            .unwrap(),
    );
    assert_eq!(triples.len(), 6);
    let name_of: Vec<&(String, String, String)> =
        triples.iter().filter(|(_, p, _)| p == "urn:ex:nameOf").collect();
    let label: Vec<&(String, String, String)> =
        triples.iter().filter(|(_, p, _)| p == "urn:ex:label").collect();
    assert_eq!(name_of.len(), 3);
    assert_eq!(label.len(), 3);
    let distinct_subjects: std::collections::HashSet<&String> =
        name_of.iter().map(|(s, _, _)| s).collect();
    assert_eq!(distinct_subjects.len(), 3, "each solution must get a fresh blank node");
    for (s, _, person) in &name_of {
        assert!(
            label.iter().any(|(ls, _, lv)| ls == s && {
                let expected_name = match person.as_str() {
                    "urn:ex:Alice" => "Alice",
                    "urn:ex:Bob" => "Bob",
                    "urn:ex:Charlie" => "Charlie",
                    other => panic!("unexpected person {other}"),
                };
                lv == expected_name
            }),
            "the nameOf and label triples for one solution must share the same blank node"
        );
    }
}
