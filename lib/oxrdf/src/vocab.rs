//! Well-known vocabulary IRIs used by the parser, evaluator and planner.

/// The [RDF](https://www.w3.org/1999/02/22-rdf-syntax-ns#) vocabulary.
pub mod rdf {
    use crate::named_node::NamedNodeRef;

    /// `rdf:type`, the alias for `a` in triple patterns and negated property sets.
    pub const TYPE: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#type");

    /// `rdf:langString`, the datatype of language-tagged literals.
    pub const LANG_STRING: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#langString");

    pub const FIRST: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#first");
    pub const REST: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#rest");
    pub const NIL: NamedNodeRef<'_> =
        NamedNodeRef::new_unchecked("http://www.w3.org/1999/02/22-rdf-syntax-ns#nil");
}

/// The [XML Schema](https://www.w3.org/2001/XMLSchema#) datatype vocabulary.
pub mod xsd {
    use crate::named_node::NamedNodeRef;

    macro_rules! xsd_type {
        ($name:ident, $suffix:expr) => {
            pub const $name: NamedNodeRef<'_> =
                NamedNodeRef::new_unchecked(concat!("http://www.w3.org/2001/XMLSchema#", $suffix));
        };
    }

    xsd_type!(STRING, "string");
    xsd_type!(BOOLEAN, "boolean");
    xsd_type!(INTEGER, "integer");
    xsd_type!(DECIMAL, "decimal");
    xsd_type!(FLOAT, "float");
    xsd_type!(DOUBLE, "double");
    xsd_type!(DATE_TIME, "dateTime");
    xsd_type!(DATE, "date");
    xsd_type!(TIME, "time");
    xsd_type!(DURATION, "duration");
    xsd_type!(DAY_TIME_DURATION, "dayTimeDuration");
    xsd_type!(YEAR_MONTH_DURATION, "yearMonthDuration");
    xsd_type!(ANY_URI, "anyURI");
}
