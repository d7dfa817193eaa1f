//! The flat, arena-backed algebra produced by the parser.
//!
//! Recursive group-pattern nesting is replaced by a handful of `Vec`-backed
//! arenas (`groups`, `paths`, `exprs`) addressed by small integer ids. A
//! `Query` never owns a pointer chain: every nested construct (a sub-SELECT,
//! a UNION branch, an EXISTS pattern) is an id into one of these arenas, so
//! the planner and executor can visit the whole algebra without chasing heap
//! pointers and without a heap allocation per AST node. Term references are
//! `(start, length, kind)` slices into the original query text; nothing here
//! allocates a string for a token.

use std::ops::Range;

/// A `(start, length, kind)` reference into the original query text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermRef {
    pub start: u32,
    pub length: u32,
    pub kind: TermKind,
}

impl TermRef {
    pub fn new(range: Range<usize>, kind: TermKind) -> Self {
        Self {
            start: range.start as u32,
            length: (range.end - range.start) as u32,
            kind,
        }
    }

    pub fn range(self) -> Range<usize> {
        self.start as usize..(self.start as usize + self.length as usize)
    }

    /// Resolves this reference against the source text it was parsed from.
    pub fn text<'a>(self, source: &'a str) -> &'a str {
        &source[self.range()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermKind {
    /// `<...>` full IRI reference.
    Iri,
    /// `prefix:local` reference, resolved lazily via the prologue.
    PrefixedName,
    /// A SPARQL variable, `?name` or `$name` (the `?`/`$` is excluded from
    /// the span).
    Variable,
    /// A quoted literal, including its optional `@lang` / `^^datatype`
    /// suffix within the span.
    Literal,
    /// A bare numeric literal (`42`, `3.14`, `1.0e10`).
    NumericLiteral,
    /// `true` / `false`.
    BooleanLiteral,
    /// `_:label` explicit blank node.
    BlankNode,
    /// An anonymous blank node introduced by `[...]` or `()`/`(...)` syntax.
    /// Its `TermRef` span is the unique source position of the introducing
    /// bracket, which is sufficient identity within one query: two anonymous
    /// nodes never share a position, so no text synthesis is needed to keep
    /// them distinct.
    AnonBlankNode,
    /// The `a` keyword, alias for `rdf:type`.
    KeywordA,
    /// `rdf:first`, synthesized while lowering a collection `(...)`. Never
    /// read via `text()`; the evaluator substitutes the constant IRI.
    RdfFirst,
    /// `rdf:rest`, synthesized while lowering a collection `(...)`.
    RdfRest,
    /// `rdf:nil`, synthesized for an empty collection `()` or a list's
    /// final cell.
    RdfNil,
}

/// Index into `Query::paths` / `Update::paths`.
pub type PathId = u32;
/// Index into `Query::groups` / `Update::groups`.
pub type GroupId = u32;
/// Index into `Query::exprs` / `Update::exprs`.
pub type ExprId = u32;
/// Index into `Query::sub_selects`.
pub type SubSelectId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphScope {
    Default,
    Named(TermRef),
    /// `GRAPH ?g { ... }`: iterate every named graph, binding `?g`.
    Variable(TermRef),
    /// No `GRAPH` clause in scope: default graph for non-GRAPH patterns,
    /// but a dataset with `FROM NAMED` still restricts named-graph access.
    Unscoped,
}

/// A single property-path operator. Sequence is expanded away at planning
/// time (4.7.6); everything else is evaluated by a dedicated operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathNode {
    Iri(TermRef),
    KeywordA,
    Inverse(PathId),
    Sequence(PathId, PathId),
    Alternative(PathId, PathId),
    ZeroOrMore(PathId),
    OneOrMore(PathId),
    ZeroOrOne(PathId),
    NegatedPropertySet(Vec<NegatedSetEntry>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegatedSetEntry {
    pub predicate: NegatedSetPredicate,
    pub inverse: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegatedSetPredicate {
    Iri(TermRef),
    KeywordA,
}

/// Either a plain predicate IRI/variable or a property path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateRef {
    Term(TermRef),
    Path(PathId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriplePattern {
    pub subject: TermRef,
    pub predicate: PredicateRef,
    pub object: TermRef,
}

/// A binary/unary/n-ary SPARQL function, used by both built-in calls and
/// the operators lowered to function form (`!`, `&&`, `=`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Not,
    And,
    Or,
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    UnaryPlus,
    UnaryMinus,
    Add,
    Subtract,
    Multiply,
    Divide,
    Str,
    Lang,
    LangMatches,
    Datatype,
    Bound,
    Iri,
    IsIri,
    IsLiteral,
    IsBlank,
    IsNumeric,
    SameTerm,
    Contains,
    StrStarts,
    StrEnds,
    StrBefore,
    StrAfter,
    Regex,
    Replace,
    Substr,
    StrLen,
    UCase,
    LCase,
    Concat,
    EncodeForUri,
    Abs,
    Ceil,
    Floor,
    Round,
    Year,
    Month,
    Day,
    Hours,
    Minutes,
    Seconds,
    Timezone,
    Tz,
    Now,
    Rand,
    Uuid,
    StrUuid,
    Md5,
    Sha1,
    Sha256,
    Sha384,
    Sha512,
    BNode,
    If,
    Coalesce,
    In,
    NotIn,
    /// `text:match(text, query)`, the registered extension function.
    TextMatch,
    /// Any function identified by IRI that is not one of the built-ins
    /// above; evaluation of it fails with `NotImplemented`.
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Sample,
    GroupConcat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprNode {
    Term(TermRef),
    FunctionCall {
        function: Function,
        custom_iri: Option<TermRef>,
        args: Vec<ExprId>,
    },
    Exists {
        negated: bool,
        pattern: GroupId,
    },
    /// An aggregate expression, valid only inside a SELECT projection,
    /// HAVING clause, or ORDER BY key of an aggregating query.
    Aggregate {
        function: AggregateFunction,
        distinct: bool,
        /// `None` only for `COUNT(*)`.
        arg: Option<ExprId>,
        /// `GROUP_CONCAT(... SEPARATOR "sep")`.
        separator: Option<TermRef>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderKey {
    pub expr: ExprId,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProjectClause {
    /// `SELECT *`
    All,
    /// `SELECT ?a ?b (expr AS ?c) ...`; `None` expression means a plain
    /// projected variable, `Some` means a computed column.
    Variables(Vec<(TermRef, Option<ExprId>)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionModifierFlag {
    None,
    Distinct,
    Reduced,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValuesBlock {
    pub variables: Vec<TermRef>,
    /// Each row has one entry per variable; `None` is `UNDEF`.
    pub rows: Vec<Vec<Option<TermRef>>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceClause {
    pub endpoint: PredicateEndpoint,
    pub silent: bool,
    pub pattern: GroupId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateEndpoint {
    Iri(TermRef),
    Variable(TermRef),
}

/// One member of a group graph pattern. Groups are arena-allocated
/// (`Query::groups`), so `OptionalGroup`, `MinusGroup` etc. hold an index
/// rather than a boxed sub-tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternNode {
    Triple {
        pattern: TriplePattern,
        graph: GraphScope,
    },
    Path {
        subject: TermRef,
        path: PathId,
        object: TermRef,
        graph: GraphScope,
    },
    Filter(ExprId),
    Bind {
        variable: TermRef,
        expr: ExprId,
    },
    Values(ValuesBlock),
    Optional(GroupId),
    Minus(GroupId),
    /// Each element is a branch; branches are evaluated independently and
    /// concatenated.
    Union(Vec<GroupId>),
    Graph {
        scope: GraphScope,
        pattern: GroupId,
    },
    Service(ServiceClause),
    SubSelect(SubSelectId),
}

/// A group graph pattern: an ordered list of pattern nodes evaluated as a
/// conjunction (subject to each node's own semantics, e.g. `Optional`).
pub type Group = Vec<PatternNode>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetGraph {
    Named(TermRef),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatasetClause {
    /// `FROM <iri>`: replaces the default graph with the union of these.
    pub default: Vec<TermRef>,
    /// `FROM NAMED <iri>`: restricts which named graphs are visible.
    pub named: Vec<TermRef>,
}

impl DatasetClause {
    pub fn is_empty(&self) -> bool {
        self.default.is_empty() && self.named.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionModifiers {
    pub group_by: Vec<(ExprId, Option<TermRef>)>,
    pub having: Vec<ExprId>,
    pub order_by: Vec<OrderKey>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub flag: SolutionModifierFlag,
}

impl Default for SolutionModifiers {
    fn default() -> Self {
        Self {
            group_by: Vec::new(),
            having: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
            flag: SolutionModifierFlag::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub dataset: DatasetClause,
    pub project: ProjectClause,
    pub pattern: GroupId,
    pub modifiers: SolutionModifiers,
    pub values: Option<ValuesBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AskQuery {
    pub dataset: DatasetClause,
    pub pattern: GroupId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructQuery {
    pub dataset: DatasetClause,
    pub template: Vec<TriplePattern>,
    pub pattern: GroupId,
    pub modifiers: SolutionModifiers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescribeTarget {
    Resource(TermRef),
    Variable(TermRef),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeQuery {
    pub dataset: DatasetClause,
    pub targets: Vec<DescribeTarget>,
    /// Present when DESCRIBE carries a WHERE clause.
    pub pattern: Option<GroupId>,
    pub modifiers: SolutionModifiers,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryForm {
    Select(SelectQuery),
    Ask(AskQuery),
    Construct(ConstructQuery),
    Describe(DescribeQuery),
}

/// A fully parsed query: the prologue, the arenas it references into, and
/// the top-level form. Borrows the source text for its entire lifetime;
/// nothing here is mutated after parsing completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub form: QueryForm,
    pub groups: Vec<Group>,
    pub paths: Vec<PathNode>,
    pub exprs: Vec<ExprNode>,
    pub sub_selects: Vec<SelectQuery>,
}

impl Query {
    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id as usize]
    }

    pub fn path(&self, id: PathId) -> &PathNode {
        &self.paths[id as usize]
    }

    pub fn expr(&self, id: ExprId) -> &ExprNode {
        &self.exprs[id as usize]
    }

    pub fn sub_select(&self, id: SubSelectId) -> &SelectQuery {
        &self.sub_selects[id as usize]
    }
}

/// A single graph-update operation, as produced by parsing `INSERT`,
/// `DELETE`, `LOAD`, `CLEAR` or `DROP`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphUpdateOperation {
    InsertData {
        quads: Vec<QuadPattern>,
    },
    DeleteData {
        quads: Vec<QuadPattern>,
    },
    DeleteInsert {
        delete: Vec<QuadPattern>,
        insert: Vec<QuadPattern>,
        using: DatasetClause,
        pattern: GroupId,
    },
    Load {
        silent: bool,
        source: TermRef,
        into: Option<TermRef>,
    },
    Clear {
        silent: bool,
        target: GraphTarget,
    },
    Drop {
        silent: bool,
        target: GraphTarget,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphTarget {
    Named(TermRef),
    Default,
    /// The `NAMED` keyword: every named graph, excluding the default graph.
    AllNamed,
    /// The `ALL` keyword: every graph, including the default graph.
    All,
}

/// A quad as it appears in an update template: any position may still be a
/// variable in `DeleteInsert` templates (resolved per-solution), but is
/// always ground in `InsertData`/`DeleteData`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadPattern {
    pub subject: TermRef,
    pub predicate: TermRef,
    pub object: TermRef,
    pub graph: GraphScope,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Update {
    pub operations: Vec<GraphUpdateOperation>,
    pub groups: Vec<Group>,
    pub paths: Vec<PathNode>,
    pub exprs: Vec<ExprNode>,
}

impl Update {
    pub fn group(&self, id: GroupId) -> &Group {
        &self.groups[id as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_ref_resolves_against_source_text() {
        let source = "SELECT * WHERE { ?s <http://example.com/p> ?o }";
        let term = TermRef::new(17..46, TermKind::Iri);
        assert_eq!(term.text(source), "<http://example.com/p>");
    }

    #[test]
    fn term_ref_range_round_trips_start_and_length() {
        let term = TermRef::new(10..15, TermKind::Variable);
        assert_eq!(term.range(), 10..15);
    }

    #[test]
    fn dataset_clause_is_empty_only_without_from_clauses() {
        assert!(DatasetClause::default().is_empty());
        let with_default = DatasetClause {
            default: vec![TermRef::new(0..1, TermKind::Iri)],
            named: Vec::new(),
        };
        assert!(!with_default.is_empty());
    }

    #[test]
    fn query_arena_accessors_index_into_their_vecs() {
        let query = Query {
            form: QueryForm::Ask(AskQuery {
                dataset: DatasetClause::default(),
                pattern: 0,
            }),
            groups: vec![vec![PatternNode::Filter(0)]],
            paths: vec![PathNode::KeywordA],
            exprs: vec![ExprNode::Term(TermRef::new(0..1, TermKind::BooleanLiteral))],
            sub_selects: Vec::new(),
        };
        assert_eq!(query.group(0), &vec![PatternNode::Filter(0)]);
        assert_eq!(query.path(0), &PathNode::KeywordA);
        assert!(matches!(query.expr(0), ExprNode::Term(_)));
    }

    #[test]
    fn solution_modifiers_default_has_no_flag_or_limits() {
        let modifiers = SolutionModifiers::default();
        assert_eq!(modifiers.flag, SolutionModifierFlag::None);
        assert!(modifiers.limit.is_none());
        assert!(modifiers.offset.is_none());
    }
}
