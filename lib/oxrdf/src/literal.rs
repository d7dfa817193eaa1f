use crate::named_node::{NamedNode, NamedNodeRef};
use crate::vocab::xsd;
use oxilangtag::{LanguageTag, LanguageTagParseError};
use std::fmt;

/// An owned RDF [literal](https://www.w3.org/TR/rdf11-concepts/#dfn-literal).
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone)]
pub struct Literal(LiteralContent);

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone)]
enum LiteralContent {
    String(String),
    LanguageTaggedString { value: String, language: String },
    Typed { value: String, datatype: NamedNode },
}

impl Literal {
    /// A simple literal (implicit `xsd:string` datatype, no language tag).
    pub fn new_simple_literal(value: impl Into<String>) -> Self {
        Self(LiteralContent::String(value.into()))
    }

    /// A literal with an explicit datatype.
    ///
    /// `xsd:string` is normalized to the simple-literal representation and
    /// `rdf:langString` without a language tag is rejected by the caller
    /// before construction (the parser enforces this, not this constructor).
    pub fn new_typed_literal(value: impl Into<String>, datatype: impl Into<NamedNode>) -> Self {
        let datatype = datatype.into();
        if datatype.as_str() == xsd::STRING.as_str() {
            return Self::new_simple_literal(value);
        }
        Self(LiteralContent::Typed {
            value: value.into(),
            datatype,
        })
    }

    /// A language-tagged string. The tag is validated as BCP 47.
    pub fn new_language_tagged_literal(
        value: impl Into<String>,
        language: impl Into<String>,
    ) -> Result<Self, LanguageTagParseError> {
        let language = language.into();
        let normalized = LanguageTag::parse(language)?.into_inner().to_ascii_lowercase();
        Ok(Self::new_language_tagged_literal_unchecked(value, normalized))
    }

    pub fn new_language_tagged_literal_unchecked(
        value: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self(LiteralContent::LanguageTaggedString {
            value: value.into(),
            language: language.into().to_ascii_lowercase(),
        })
    }

    #[inline]
    pub fn value(&self) -> &str {
        match &self.0 {
            LiteralContent::String(value)
            | LiteralContent::LanguageTaggedString { value, .. }
            | LiteralContent::Typed { value, .. } => value,
        }
    }

    #[inline]
    pub fn language(&self) -> Option<&str> {
        match &self.0 {
            LiteralContent::LanguageTaggedString { language, .. } => Some(language),
            _ => None,
        }
    }

    pub fn datatype(&self) -> NamedNodeRef<'_> {
        match &self.0 {
            LiteralContent::String(_) => xsd::STRING,
            LiteralContent::LanguageTaggedString { .. } => crate::vocab::rdf::LANG_STRING,
            LiteralContent::Typed { datatype, .. } => datatype.as_ref(),
        }
    }

    #[inline]
    pub fn is_plain(&self) -> bool {
        matches!(
            self.0,
            LiteralContent::String(_) | LiteralContent::LanguageTaggedString { .. }
        )
    }

    pub fn as_ref(&self) -> LiteralRef<'_> {
        LiteralRef(match &self.0 {
            LiteralContent::String(value) => LiteralRefContent::String(value),
            LiteralContent::LanguageTaggedString { value, language } => {
                LiteralRefContent::LanguageTaggedString { value, language }
            }
            LiteralContent::Typed { value, datatype } => LiteralRefContent::Typed {
                value,
                datatype: datatype.as_ref(),
            },
        })
    }

    /// N-Triples-style round-trip rendering, per the term-value contract.
    pub fn to_ntriples(&self) -> String {
        self.as_ref().to_ntriples()
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

impl fmt::Debug for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

/// A borrowed version of [`Literal`].
#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy)]
pub struct LiteralRef<'a>(LiteralRefContent<'a>);

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy)]
enum LiteralRefContent<'a> {
    String(&'a str),
    LanguageTaggedString {
        value: &'a str,
        language: &'a str,
    },
    Typed {
        value: &'a str,
        datatype: NamedNodeRef<'a>,
    },
}

impl<'a> LiteralRef<'a> {
    #[inline]
    pub const fn new_simple_literal(value: &'a str) -> Self {
        Self(LiteralRefContent::String(value))
    }

    #[inline]
    pub const fn new_language_tagged_literal_unchecked(value: &'a str, language: &'a str) -> Self {
        Self(LiteralRefContent::LanguageTaggedString { value, language })
    }

    #[inline]
    pub const fn new_typed_literal(value: &'a str, datatype: NamedNodeRef<'a>) -> Self {
        Self(LiteralRefContent::Typed { value, datatype })
    }

    #[inline]
    pub fn value(self) -> &'a str {
        match self.0 {
            LiteralRefContent::String(value)
            | LiteralRefContent::LanguageTaggedString { value, .. }
            | LiteralRefContent::Typed { value, .. } => value,
        }
    }

    #[inline]
    pub fn language(self) -> Option<&'a str> {
        match self.0 {
            LiteralRefContent::LanguageTaggedString { language, .. } => Some(language),
            _ => None,
        }
    }

    pub fn datatype(self) -> NamedNodeRef<'a> {
        match self.0 {
            LiteralRefContent::String(_) => xsd::STRING,
            LiteralRefContent::LanguageTaggedString { .. } => crate::vocab::rdf::LANG_STRING,
            LiteralRefContent::Typed { datatype, .. } => datatype,
        }
    }

    #[inline]
    pub fn is_plain(self) -> bool {
        matches!(
            self.0,
            LiteralRefContent::String(_) | LiteralRefContent::LanguageTaggedString { .. }
        )
    }

    pub fn into_owned(self) -> Literal {
        Literal(match self.0 {
            LiteralRefContent::String(value) => LiteralContent::String(value.to_owned()),
            LiteralRefContent::LanguageTaggedString { value, language } => {
                LiteralContent::LanguageTaggedString {
                    value: value.to_owned(),
                    language: language.to_owned(),
                }
            }
            LiteralRefContent::Typed { value, datatype } => LiteralContent::Typed {
                value: value.to_owned(),
                datatype: datatype.into_owned(),
            },
        })
    }

    pub fn to_ntriples(self) -> String {
        match self.0 {
            LiteralRefContent::String(value) => format!("\"{}\"", escape(value)),
            LiteralRefContent::LanguageTaggedString { value, language } => {
                format!("\"{}\"@{language}", escape(value))
            }
            LiteralRefContent::Typed { value, datatype } => {
                format!("\"{}\"^^{datatype}", escape(value))
            }
        }
    }
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

impl fmt::Display for LiteralRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_ntriples())
    }
}

impl fmt::Debug for LiteralRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl<'a> From<&'a Literal> for LiteralRef<'a> {
    fn from(literal: &'a Literal) -> Self {
        literal.as_ref()
    }
}

impl From<LiteralRef<'_>> for Literal {
    fn from(literal: LiteralRef<'_>) -> Self {
        literal.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_literal_normalizes_xsd_string_to_plain() {
        let l = Literal::new_typed_literal("hi", xsd::STRING.into_owned());
        assert!(l.is_plain());
        assert_eq!(l.datatype(), xsd::STRING);
    }

    #[test]
    fn language_tag_is_lowercased() {
        let l = Literal::new_language_tagged_literal("chat", "EN-GB").unwrap();
        assert_eq!(l.language(), Some("en-gb"));
    }

    #[test]
    fn invalid_language_tag_is_rejected() {
        assert!(Literal::new_language_tagged_literal("x", "not a tag!!").is_err());
    }

    #[test]
    fn to_ntriples_escapes_control_characters() {
        let l = Literal::new_simple_literal("a\"b\\c\nd");
        assert_eq!(l.to_ntriples(), "\"a\\\"b\\\\c\\nd\"");
    }

    #[test]
    fn typed_literal_round_trips_to_ntriples() {
        let l = Literal::new_typed_literal("30", xsd::INTEGER.into_owned());
        assert_eq!(l.to_ntriples(), "\"30\"^^<http://www.w3.org/2001/XMLSchema#integer>");
    }
}
