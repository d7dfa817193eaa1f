use crate::term_value::TermValue;

/// The result of executing a query, in the shape it crosses the
/// evaluator/serialization boundary (§6). A `SELECT` yields `Solutions`;
/// an unbound variable in a row is `None`, never an absent column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryResults {
    Boolean(bool),
    Solutions {
        variables: Vec<String>,
        rows: Vec<Vec<Option<TermValue>>>,
    },
}

impl QueryResults {
    pub fn is_boolean(&self) -> bool {
        matches!(self, Self::Boolean(_))
    }

    pub fn variables(&self) -> &[String] {
        match self {
            Self::Boolean(_) => &[],
            Self::Solutions { variables, .. } => variables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_results_report_no_variables() {
        let results = QueryResults::Boolean(true);
        assert!(results.is_boolean());
        assert!(results.variables().is_empty());
    }

    #[test]
    fn solutions_expose_their_variable_list() {
        let results = QueryResults::Solutions {
            variables: vec!["s".to_owned(), "p".to_owned()],
            rows: vec![vec![Some(TermValue::iri("http://example.com/")), None]],
        };
        assert!(!results.is_boolean());
        assert_eq!(results.variables(), ["s", "p"]);
    }
}
