//! The recursive-descent parser (C4): one forward pass over the query text
//! producing the flat algebra buffer of `crate::algebra`. No term string is
//! ever allocated here; every term is a `(start, length, kind)` slice.

use crate::algebra::*;
use crate::error::{ParseError, ParseErrorKind};
use crate::lexer::{Lexer, Token, TokenKind};
use crate::prologue::{Prologue, PrologueDecl};

/// A fully parsed SPARQL query: the algebra buffer plus the prologue needed
/// to resolve its prefixed names, and the source text both borrow offsets
/// into.
pub struct ParsedQuery {
    pub source: String,
    pub prologue: Prologue,
    pub query: Query,
}

pub struct ParsedUpdate {
    pub source: String,
    pub prologue: Prologue,
    pub update: Update,
}

pub fn parse_query(source: &str) -> Result<ParsedQuery, ParseError> {
    let mut parser = Parser::new(source);
    let decl = parser.parse_prologue()?;
    let form = parser.parse_query_form()?;
    parser.expect_eof()?;
    Ok(ParsedQuery {
        source: source.to_owned(),
        prologue: Prologue::new(decl)?,
        query: Query {
            form,
            groups: parser.groups,
            paths: parser.paths,
            exprs: parser.exprs,
            sub_selects: parser.sub_selects,
        },
    })
}

pub fn parse_update(source: &str) -> Result<ParsedUpdate, ParseError> {
    let mut parser = Parser::new(source);
    let decl = parser.parse_prologue()?;
    let mut operations = Vec::new();
    loop {
        if parser.cur.kind == TokenKind::Eof {
            break;
        }
        operations.push(parser.parse_update_operation()?);
        if !parser.eat_punct(";")? {
            break;
        }
    }
    parser.expect_eof()?;
    Ok(ParsedUpdate {
        source: source.to_owned(),
        prologue: Prologue::new(decl)?,
        update: Update {
            operations,
            groups: parser.groups,
            paths: parser.paths,
            exprs: parser.exprs,
        },
    })
}

/// Either a plain predicate (variable or path-expressed IRI/`a`) seen at a
/// triple's predicate position.
enum Verb {
    Var(TermRef),
    Path(PathId),
}

struct Parser<'a> {
    source: &'a str,
    lexer: Lexer<'a>,
    cur: Token,
    groups: Vec<Group>,
    paths: Vec<PathNode>,
    exprs: Vec<ExprNode>,
    sub_selects: Vec<SelectQuery>,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        let mut lexer = Lexer::new(source);
        // first token primed below once we can handle the error path
        let cur = Token {
            kind: TokenKind::Eof,
            start: 0,
            end: 0,
        };
        let mut parser = Self {
            source,
            lexer,
            cur,
            groups: Vec::new(),
            paths: Vec::new(),
            exprs: Vec::new(),
            sub_selects: Vec::new(),
        };
        // SAFETY of unwrap: tokenizing at position 0 cannot fail on an
        // empty or well-formed prefix; a genuine failure surfaces on the
        // first real `bump`/`expect` call instead via `self.prime()`.
        let _ = parser.prime();
        parser
    }

    fn prime(&mut self) -> Result<(), ParseError> {
        self.cur = self.lexer.next_token()?;
        Ok(())
    }

    fn bump(&mut self) -> Result<Token, ParseError> {
        let t = self.cur;
        self.cur = self.lexer.next_token()?;
        Ok(t)
    }

    fn text(&self, t: Token) -> &'a str {
        t.text(self.source)
    }

    fn cur_text(&self) -> &'a str {
        self.cur.text(self.source)
    }

    fn is_ident(&self, kw: &str) -> bool {
        self.cur.kind == TokenKind::Ident && self.cur_text().eq_ignore_ascii_case(kw)
    }

    fn is_punct(&self, p: &str) -> bool {
        self.cur.kind == TokenKind::Punct && self.cur_text() == p
    }

    fn eat_ident(&mut self, kw: &str) -> Result<bool, ParseError> {
        if self.is_ident(kw) {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn eat_punct(&mut self, p: &str) -> Result<bool, ParseError> {
        if self.is_punct(p) {
            self.bump()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn is_keyword_a(&self) -> bool {
        self.cur.kind == TokenKind::Ident && self.cur_text() == "a"
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), ParseError> {
        if !self.eat_punct(p)? {
            return Err(self.unexpected(p));
        }
        Ok(())
    }

    fn expect_ident(&mut self, kw: &str) -> Result<(), ParseError> {
        if !self.eat_ident(kw)? {
            return Err(self.unexpected(kw));
        }
        Ok(())
    }

    fn expect_eof(&self) -> Result<(), ParseError> {
        if self.cur.kind != TokenKind::Eof {
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedToken {
                    expected: "end of input",
                    found: self.cur_text().to_owned(),
                },
                self.cur.start,
            ));
        }
        Ok(())
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        ParseError::new(
            ParseErrorKind::UnexpectedToken {
                expected,
                found: self.cur_text().to_owned(),
            },
            self.cur.start,
        )
    }

    // ---- prologue ---------------------------------------------------

    fn parse_prologue(&mut self) -> Result<PrologueDecl, ParseError> {
        let mut decl = PrologueDecl::default();
        loop {
            if self.eat_ident("BASE")? {
                let iri = self.expect_iri_token()?;
                decl.base = Some(iri.to_owned());
            } else if self.eat_ident("PREFIX")? {
                let prefix_tok = self.bump()?;
                if prefix_tok.kind != TokenKind::PrefixedName {
                    return Err(self.unexpected("prefix declaration"));
                }
                let raw = self.text(prefix_tok);
                let prefix = raw.strip_suffix(':').unwrap_or(raw).to_owned();
                let iri = self.expect_iri_token()?;
                decl.prefixes.insert(prefix, iri.to_owned());
            } else {
                break;
            }
        }
        Ok(decl)
    }

    fn expect_iri_token(&mut self) -> Result<&'a str, ParseError> {
        let t = self.bump()?;
        if t.kind != TokenKind::Iri {
            return Err(self.unexpected("IRIREF"));
        }
        let raw = self.text(t);
        Ok(&raw[1..raw.len() - 1])
    }

    // ---- top-level query forms ---------------------------------------

    fn parse_query_form(&mut self) -> Result<QueryForm, ParseError> {
        if self.eat_ident("SELECT")? {
            Ok(QueryForm::Select(self.parse_select_rest()?))
        } else if self.eat_ident("ASK")? {
            let dataset = self.parse_dataset_clauses()?;
            let pattern = self.parse_group_graph_pattern()?;
            Ok(QueryForm::Ask(AskQuery { dataset, pattern }))
        } else if self.eat_ident("CONSTRUCT")? {
            Ok(QueryForm::Construct(self.parse_construct_rest()?))
        } else if self.eat_ident("DESCRIBE")? {
            Ok(QueryForm::Describe(self.parse_describe_rest()?))
        } else {
            Err(self.unexpected("SELECT, ASK, CONSTRUCT or DESCRIBE"))
        }
    }

    fn parse_select_rest(&mut self) -> Result<SelectQuery, ParseError> {
        let mut flag = SolutionModifierFlag::None;
        if self.eat_ident("DISTINCT")? {
            flag = SolutionModifierFlag::Distinct;
        } else if self.eat_ident("REDUCED")? {
            flag = SolutionModifierFlag::Reduced;
        }
        let project = if self.eat_punct("*")? {
            ProjectClause::All
        } else {
            let mut vars = Vec::new();
            loop {
                if self.cur.kind == TokenKind::Variable {
                    let t = self.bump()?;
                    vars.push((TermRef::new(t.start + 1..t.end, TermKind::Variable), None));
                } else if self.eat_punct("(")? {
                    let expr = self.parse_expression()?;
                    self.expect_ident("AS")?;
                    let v = self.bump()?;
                    if v.kind != TokenKind::Variable {
                        return Err(self.unexpected("variable"));
                    }
                    self.expect_punct(")")?;
                    vars.push((
                        TermRef::new(v.start + 1..v.end, TermKind::Variable),
                        Some(expr),
                    ));
                } else {
                    break;
                }
            }
            ProjectClause::Variables(vars)
        };
        let dataset = self.parse_dataset_clauses()?;
        self.expect_ident("WHERE")?;
        let pattern = self.parse_group_graph_pattern()?;
        let modifiers = self.parse_solution_modifiers(flag)?;
        let values = self.parse_trailing_values()?;
        Ok(SelectQuery {
            dataset,
            project,
            pattern,
            modifiers,
            values,
        })
    }

    fn parse_construct_rest(&mut self) -> Result<ConstructQuery, ParseError> {
        if self.eat_punct("{")? {
            let mut template = Vec::new();
            self.parse_triples_template(&mut template)?;
            self.expect_punct("}")?;
            let dataset = self.parse_dataset_clauses()?;
            self.expect_ident("WHERE")?;
            let pattern = self.parse_group_graph_pattern()?;
            let modifiers = self.parse_solution_modifiers(SolutionModifierFlag::None)?;
            Ok(ConstructQuery {
                dataset,
                template,
                pattern,
                modifiers,
            })
        } else {
            // CONSTRUCT WHERE { ... } shorthand: the pattern itself is the
            // template (it must consist solely of plain triple patterns).
            let dataset = self.parse_dataset_clauses()?;
            self.expect_ident("WHERE")?;
            let pattern = self.parse_group_graph_pattern()?;
            let mut template = Vec::new();
            for node in self.groups[pattern as usize].clone() {
                if let PatternNode::Triple {
                    pattern: tp,
                    graph: GraphScope::Unscoped,
                } = node
                {
                    template.push(tp);
                }
            }
            let modifiers = self.parse_solution_modifiers(SolutionModifierFlag::None)?;
            Ok(ConstructQuery {
                dataset,
                template,
                pattern,
                modifiers,
            })
        }
    }

    fn parse_describe_rest(&mut self) -> Result<DescribeQuery, ParseError> {
        let mut targets = Vec::new();
        if self.eat_punct("*")? {
            // no explicit targets: every variable bound by the pattern
        } else {
            loop {
                if self.cur.kind == TokenKind::Variable {
                    let t = self.bump()?;
                    targets.push(DescribeTarget::Variable(TermRef::new(
                        t.start + 1..t.end,
                        TermKind::Variable,
                    )));
                } else if matches!(self.cur.kind, TokenKind::Iri | TokenKind::PrefixedName) {
                    let t = self.bump()?;
                    targets.push(DescribeTarget::Resource(self.term_ref_for(t)));
                } else {
                    break;
                }
            }
        }
        let dataset = self.parse_dataset_clauses()?;
        let pattern = if self.eat_ident("WHERE")? {
            Some(self.parse_group_graph_pattern()?)
        } else if self.is_punct("{") {
            Some(self.parse_group_graph_pattern()?)
        } else {
            None
        };
        let modifiers = self.parse_solution_modifiers(SolutionModifierFlag::None)?;
        Ok(DescribeQuery {
            dataset,
            targets,
            pattern,
            modifiers,
        })
    }

    fn term_ref_for(&self, t: Token) -> TermRef {
        match t.kind {
            TokenKind::Iri => TermRef::new(t.start..t.end, TermKind::Iri),
            TokenKind::PrefixedName => TermRef::new(t.start..t.end, TermKind::PrefixedName),
            _ => TermRef::new(t.start..t.end, TermKind::Iri),
        }
    }

    fn parse_dataset_clauses(&mut self) -> Result<DatasetClause, ParseError> {
        let mut dataset = DatasetClause::default();
        loop {
            if self.eat_ident("FROM")? {
                if self.eat_ident("NAMED")? {
                    let t = self.bump()?;
                    dataset.named.push(self.term_ref_for(t));
                } else {
                    let t = self.bump()?;
                    dataset.default.push(self.term_ref_for(t));
                }
            } else {
                break;
            }
        }
        Ok(dataset)
    }

    fn parse_solution_modifiers(
        &mut self,
        flag: SolutionModifierFlag,
    ) -> Result<SolutionModifiers, ParseError> {
        let mut modifiers = SolutionModifiers {
            flag,
            ..SolutionModifiers::default()
        };
        if self.eat_ident("GROUP")? {
            self.expect_ident("BY")?;
            loop {
                if self.cur.kind == TokenKind::Variable {
                    let t = self.bump()?;
                    let var = TermRef::new(t.start + 1..t.end, TermKind::Variable);
                    let expr = self.push_expr(ExprNode::Term(var));
                    modifiers.group_by.push((expr, None));
                } else if self.eat_punct("(")? {
                    let expr = self.parse_expression()?;
                    let alias = if self.eat_ident("AS")? {
                        let v = self.bump()?;
                        Some(TermRef::new(v.start + 1..v.end, TermKind::Variable))
                    } else {
                        None
                    };
                    self.expect_punct(")")?;
                    modifiers.group_by.push((expr, alias));
                } else {
                    break;
                }
            }
        }
        if self.eat_ident("HAVING")? {
            loop {
                modifiers.having.push(self.parse_bracketted_or_builtin()?);
                if !(self.is_punct("(") || self.cur.kind == TokenKind::Ident) {
                    break;
                }
            }
        }
        if self.eat_ident("ORDER")? {
            self.expect_ident("BY")?;
            loop {
                let descending = if self.eat_ident("DESC")? {
                    true
                } else {
                    self.eat_ident("ASC")?;
                    false
                };
                let expr = if self.is_punct("(") {
                    self.bump()?;
                    let e = self.parse_expression()?;
                    self.expect_punct(")")?;
                    e
                } else {
                    self.parse_primary_expression()?
                };
                modifiers.order_by.push(OrderKey { expr, descending });
                if !(self.cur.kind == TokenKind::Variable
                    || self.is_punct("(")
                    || self.is_ident("ASC")
                    || self.is_ident("DESC"))
                {
                    break;
                }
            }
        }
        if self.eat_ident("LIMIT")? {
            modifiers.limit = Some(self.expect_integer()?);
        }
        if self.eat_ident("OFFSET")? {
            modifiers.offset = Some(self.expect_integer()?);
        }
        // LIMIT/OFFSET may appear in either order.
        if modifiers.offset.is_none() && self.eat_ident("OFFSET")? {
            modifiers.offset = Some(self.expect_integer()?);
        }
        if modifiers.limit.is_none() && self.eat_ident("LIMIT")? {
            modifiers.limit = Some(self.expect_integer()?);
        }
        Ok(modifiers)
    }

    fn expect_integer(&mut self) -> Result<u64, ParseError> {
        let t = self.bump()?;
        if t.kind != TokenKind::Numeric {
            return Err(self.unexpected("integer"));
        }
        self.text(t)
            .parse()
            .map_err(|_| ParseError::new(ParseErrorKind::InvalidNumber(self.text(t).to_owned()), t.start))
    }

    fn parse_trailing_values(&mut self) -> Result<Option<ValuesBlock>, ParseError> {
        if self.eat_ident("VALUES")? {
            Ok(Some(self.parse_values_block()?))
        } else {
            Ok(None)
        }
    }

    // ---- group graph patterns ------------------------------------------

    fn parse_group_graph_pattern(&mut self) -> Result<GroupId, ParseError> {
        self.expect_punct("{")?;
        let group = self.parse_brace_body()?;
        self.expect_punct("}")?;
        Ok(self.push_group(group))
    }

    /// Parses the content between `{` and `}`, already consumed by the
    /// caller: either a sub-SELECT or an ordinary `GroupGraphPatternSub`.
    fn parse_brace_body(&mut self) -> Result<Vec<PatternNode>, ParseError> {
        if self.is_ident("SELECT") {
            self.bump()?;
            let sub = self.parse_select_rest()?;
            let id = self.sub_selects.len() as SubSelectId;
            self.sub_selects.push(sub);
            return Ok(vec![PatternNode::SubSelect(id)]);
        }
        let mut nodes = Vec::new();
        self.parse_group_graph_pattern_sub(&mut nodes)?;
        Ok(nodes)
    }

    fn parse_group_graph_pattern_sub(
        &mut self,
        nodes: &mut Vec<PatternNode>,
    ) -> Result<(), ParseError> {
        loop {
            if self.is_punct("}") || self.cur.kind == TokenKind::Eof {
                break;
            }
            if self.eat_punct(".")? {
                continue;
            }
            if self.is_punct("{") {
                self.parse_group_or_union(nodes)?;
            } else if self.eat_ident("OPTIONAL")? {
                let id = self.parse_group_graph_pattern()?;
                nodes.push(PatternNode::Optional(id));
            } else if self.eat_ident("MINUS")? {
                let id = self.parse_group_graph_pattern()?;
                nodes.push(PatternNode::Minus(id));
            } else if self.eat_ident("GRAPH")? {
                let scope = self.parse_graph_scope_term()?;
                let pattern = self.parse_group_graph_pattern()?;
                nodes.push(PatternNode::Graph { scope, pattern });
            } else if self.eat_ident("SERVICE")? {
                let silent = self.eat_ident("SILENT")?;
                let endpoint = if self.cur.kind == TokenKind::Variable {
                    let t = self.bump()?;
                    PredicateEndpoint::Variable(TermRef::new(t.start + 1..t.end, TermKind::Variable))
                } else {
                    let t = self.bump()?;
                    PredicateEndpoint::Iri(self.term_ref_for(t))
                };
                let pattern = self.parse_group_graph_pattern()?;
                nodes.push(PatternNode::Service(ServiceClause {
                    endpoint,
                    silent,
                    pattern,
                }));
            } else if self.eat_ident("FILTER")? {
                let expr = self.parse_bracketted_or_builtin()?;
                nodes.push(PatternNode::Filter(expr));
            } else if self.eat_ident("BIND")? {
                self.expect_punct("(")?;
                let expr = self.parse_expression()?;
                self.expect_ident("AS")?;
                let v = self.bump()?;
                if v.kind != TokenKind::Variable {
                    return Err(self.unexpected("variable"));
                }
                self.expect_punct(")")?;
                nodes.push(PatternNode::Bind {
                    variable: TermRef::new(v.start + 1..v.end, TermKind::Variable),
                    expr,
                });
            } else if self.eat_ident("VALUES")? {
                let block = self.parse_values_block()?;
                nodes.push(PatternNode::Values(block));
            } else {
                self.parse_triples_block(nodes, GraphScope::Unscoped)?;
            }
        }
        Ok(())
    }

    fn parse_group_or_union(&mut self, nodes: &mut Vec<PatternNode>) -> Result<(), ParseError> {
        let first = self.parse_group_graph_pattern()?;
        let mut branches = Vec::new();
        while self.eat_ident("UNION")? {
            branches.push(self.parse_group_graph_pattern()?);
        }
        if branches.is_empty() {
            // plain nested scoping group: flatten into the parent, which is
            // equivalent since nesting alone has no evaluation semantics.
            nodes.extend(self.groups[first as usize].clone());
        } else {
            let mut all = vec![first];
            all.append(&mut branches);
            nodes.push(PatternNode::Union(all));
        }
        Ok(())
    }

    fn parse_graph_scope_term(&mut self) -> Result<GraphScope, ParseError> {
        if self.cur.kind == TokenKind::Variable {
            let t = self.bump()?;
            Ok(GraphScope::Variable(TermRef::new(
                t.start + 1..t.end,
                TermKind::Variable,
            )))
        } else {
            let t = self.bump()?;
            Ok(GraphScope::Named(self.term_ref_for(t)))
        }
    }

    fn parse_values_block(&mut self) -> Result<ValuesBlock, ParseError> {
        let mut variables = Vec::new();
        let multi = self.eat_punct("(")?;
        if multi {
            loop {
                if self.cur.kind != TokenKind::Variable {
                    break;
                }
                let t = self.bump()?;
                variables.push(TermRef::new(t.start + 1..t.end, TermKind::Variable));
            }
            self.expect_punct(")")?;
        } else if self.cur.kind == TokenKind::Variable {
            let t = self.bump()?;
            variables.push(TermRef::new(t.start + 1..t.end, TermKind::Variable));
        } else {
            return Err(self.unexpected("variable list"));
        }
        self.expect_punct("{")?;
        let mut rows = Vec::new();
        let row_is_paren = variables.len() != 1 || self.is_punct("(");
        loop {
            if self.is_punct("}") {
                break;
            }
            let mut row = Vec::new();
            if row_is_paren {
                self.expect_punct("(")?;
                for _ in 0..variables.len() {
                    row.push(self.parse_values_entry()?);
                }
                self.expect_punct(")")?;
            } else {
                row.push(self.parse_values_entry()?);
            }
            rows.push(row);
        }
        self.expect_punct("}")?;
        Ok(ValuesBlock { variables, rows })
    }

    fn parse_values_entry(&mut self) -> Result<Option<TermRef>, ParseError> {
        if self.eat_ident("UNDEF")? {
            return Ok(None);
        }
        let t = self.bump()?;
        Ok(Some(self.term_ref_for_value(t)?))
    }

    fn term_ref_for_value(&mut self, t: Token) -> Result<TermRef, ParseError> {
        Ok(match t.kind {
            TokenKind::Iri => TermRef::new(t.start..t.end, TermKind::Iri),
            TokenKind::PrefixedName => TermRef::new(t.start..t.end, TermKind::PrefixedName),
            TokenKind::String => TermRef::new(t.start..t.end, TermKind::Literal),
            TokenKind::Numeric => TermRef::new(t.start..t.end, TermKind::NumericLiteral),
            TokenKind::BlankNode => TermRef::new(t.start..t.end, TermKind::BlankNode),
            TokenKind::Ident if self.text(t).eq_ignore_ascii_case("true")
                || self.text(t).eq_ignore_ascii_case("false") =>
            {
                TermRef::new(t.start..t.end, TermKind::BooleanLiteral)
            }
            _ => return Err(self.unexpected("RDF term")),
        })
    }

    // ---- triples --------------------------------------------------------

    fn parse_triples_template(&mut self, out: &mut Vec<TriplePattern>) -> Result<(), ParseError> {
        let mut nodes = Vec::new();
        loop {
            if self.is_punct("}") || self.cur.kind == TokenKind::Eof {
                break;
            }
            if self.eat_punct(".")? {
                continue;
            }
            self.parse_triples_block(&mut nodes, GraphScope::Unscoped)?;
        }
        for n in nodes {
            if let PatternNode::Triple { pattern, .. } = n {
                out.push(pattern);
            }
        }
        Ok(())
    }

    fn parse_triples_block(
        &mut self,
        out: &mut Vec<PatternNode>,
        graph: GraphScope,
    ) -> Result<(), ParseError> {
        loop {
            let subject = self.parse_node_term(out, graph)?;
            self.parse_property_list_path(subject, out, graph)?;
            if !self.eat_punct(".")? {
                break;
            }
            if self.is_punct("}") || self.cur.kind == TokenKind::Eof {
                break;
            }
            // another triples block may follow a '.' before a keyword like
            // OPTIONAL/FILTER; the caller's loop handles that, so stop here
            // whenever the next token does not start a subject.
            if !self.starts_term() {
                break;
            }
        }
        Ok(())
    }

    fn starts_term(&self) -> bool {
        matches!(
            self.cur.kind,
            TokenKind::Iri
                | TokenKind::PrefixedName
                | TokenKind::Variable
                | TokenKind::BlankNode
                | TokenKind::String
                | TokenKind::Numeric
        ) || self.is_punct("(")
            || self.is_punct("[")
            || self.is_keyword_a()
    }

    fn parse_property_list_path(
        &mut self,
        subject: TermRef,
        out: &mut Vec<PatternNode>,
        graph: GraphScope,
    ) -> Result<(), ParseError> {
        loop {
            let verb = self.parse_verb()?;
            loop {
                let object = self.parse_node_term(out, graph)?;
                self.emit_triple(subject, &verb, object, graph, out);
                if !self.eat_punct(",")? {
                    break;
                }
            }
            if !self.eat_punct(";")? {
                break;
            }
            if self.is_punct(".") || self.is_punct("}") || !self.starts_verb() {
                break;
            }
        }
        Ok(())
    }

    fn starts_verb(&self) -> bool {
        matches!(
            self.cur.kind,
            TokenKind::Iri | TokenKind::PrefixedName | TokenKind::Variable
        ) || self.is_keyword_a()
            || self.is_punct("^")
            || self.is_punct("!")
            || self.is_punct("(")
    }

    fn emit_triple(
        &mut self,
        subject: TermRef,
        verb: &Verb,
        object: TermRef,
        graph: GraphScope,
        out: &mut Vec<PatternNode>,
    ) {
        match verb {
            Verb::Var(v) => out.push(PatternNode::Triple {
                pattern: TriplePattern {
                    subject,
                    predicate: PredicateRef::Term(*v),
                    object,
                },
                graph,
            }),
            Verb::Path(id) => out.push(PatternNode::Path {
                subject,
                path: *id,
                object,
                graph,
            }),
        }
    }

    fn parse_verb(&mut self) -> Result<Verb, ParseError> {
        if self.cur.kind == TokenKind::Variable {
            let t = self.bump()?;
            Ok(Verb::Var(TermRef::new(t.start + 1..t.end, TermKind::Variable)))
        } else {
            let path = self.parse_path_alternative()?;
            Ok(Verb::Path(path))
        }
    }

    /// Parses subject/object position: a plain term, a collection `(...)`
    /// (expanded into an rdf:first/rdf:rest chain pushed into `out`), or a
    /// blank node property list `[...]` (expanded the same way).
    fn parse_node_term(
        &mut self,
        out: &mut Vec<PatternNode>,
        graph: GraphScope,
    ) -> Result<TermRef, ParseError> {
        if self.is_punct("(") {
            return self.parse_collection(out, graph);
        }
        if self.is_punct("[") {
            return self.parse_blank_node_property_list(out, graph);
        }
        if self.cur.kind == TokenKind::Variable {
            let t = self.bump()?;
            return Ok(TermRef::new(t.start + 1..t.end, TermKind::Variable));
        }
        if self.is_keyword_a() {
            let t = self.bump()?;
            return Ok(TermRef::new(t.start..t.end, TermKind::KeywordA));
        }
        let t = self.bump()?;
        self.term_ref_for_value(t)
    }

    fn parse_collection(
        &mut self,
        out: &mut Vec<PatternNode>,
        graph: GraphScope,
    ) -> Result<TermRef, ParseError> {
        let open = self.bump()?; // '('
        if self.eat_punct(")")? {
            return Ok(rdf_nil_ref(open.start));
        }
        let mut cell = TermRef::new(open.start..open.start + 1, TermKind::AnonBlankNode);
        let first_cell = cell;
        loop {
            let element = self.parse_node_term(out, graph)?;
            out.push(PatternNode::Triple {
                pattern: TriplePattern {
                    subject: cell,
                    predicate: PredicateRef::Term(rdf_first_ref()),
                    object: element,
                },
                graph,
            });
            if self.is_punct(")") {
                let close = self.bump()?;
                out.push(PatternNode::Triple {
                    pattern: TriplePattern {
                        subject: cell,
                        predicate: PredicateRef::Term(rdf_rest_ref()),
                        object: rdf_nil_ref(close.start),
                    },
                    graph,
                });
                break;
            }
            let next_cell = TermRef::new(self.cur.start..self.cur.start + 1, TermKind::AnonBlankNode);
            out.push(PatternNode::Triple {
                pattern: TriplePattern {
                    subject: cell,
                    predicate: PredicateRef::Term(rdf_rest_ref()),
                    object: next_cell,
                },
                graph,
            });
            cell = next_cell;
        }
        Ok(first_cell)
    }

    fn parse_blank_node_property_list(
        &mut self,
        out: &mut Vec<PatternNode>,
        graph: GraphScope,
    ) -> Result<TermRef, ParseError> {
        let open = self.bump()?; // '['
        let subject = TermRef::new(open.start..open.start + 1, TermKind::AnonBlankNode);
        if self.eat_punct("]")? {
            return Ok(subject);
        }
        self.parse_property_list_path(subject, out, graph)?;
        self.expect_punct("]")?;
        Ok(subject)
    }

    // ---- property paths ---------------------------------------------

    fn parse_path_alternative(&mut self) -> Result<PathId, ParseError> {
        let mut left = self.parse_path_sequence()?;
        while self.eat_punct("|")? {
            let right = self.parse_path_sequence()?;
            left = self.push_path(PathNode::Alternative(left, right));
        }
        Ok(left)
    }

    fn parse_path_sequence(&mut self) -> Result<PathId, ParseError> {
        let mut left = self.parse_path_elt_or_inverse()?;
        while self.eat_punct("/")? {
            let right = self.parse_path_elt_or_inverse()?;
            left = self.push_path(PathNode::Sequence(left, right));
        }
        Ok(left)
    }

    fn parse_path_elt_or_inverse(&mut self) -> Result<PathId, ParseError> {
        if self.eat_punct("^")? {
            let inner = self.parse_path_elt()?;
            Ok(self.push_path(PathNode::Inverse(inner)))
        } else {
            self.parse_path_elt()
        }
    }

    fn parse_path_elt(&mut self) -> Result<PathId, ParseError> {
        let primary = self.parse_path_primary()?;
        if self.eat_punct("*")? {
            Ok(self.push_path(PathNode::ZeroOrMore(primary)))
        } else if self.eat_punct("+")? {
            Ok(self.push_path(PathNode::OneOrMore(primary)))
        } else if self.eat_punct("?")? {
            Ok(self.push_path(PathNode::ZeroOrOne(primary)))
        } else {
            Ok(primary)
        }
    }

    fn parse_path_primary(&mut self) -> Result<PathId, ParseError> {
        if self.eat_punct("(")? {
            let inner = self.parse_path_alternative()?;
            self.expect_punct(")")?;
            return Ok(inner);
        }
        if self.eat_punct("!")? {
            let entries = self.parse_negated_property_set()?;
            return Ok(self.push_path(PathNode::NegatedPropertySet(entries)));
        }
        if self.is_keyword_a() {
            self.bump()?;
            return Ok(self.push_path(PathNode::KeywordA));
        }
        let t = self.bump()?;
        if !matches!(t.kind, TokenKind::Iri | TokenKind::PrefixedName) {
            return Err(self.unexpected("IRI, 'a', '!', or '('"));
        }
        Ok(self.push_path(PathNode::Iri(self.term_ref_for(t))))
    }

    fn parse_negated_property_set(&mut self) -> Result<Vec<NegatedSetEntry>, ParseError> {
        if self.eat_punct("(")? {
            let mut entries = Vec::new();
            if !self.is_punct(")") {
                loop {
                    entries.push(self.parse_negated_entry()?);
                    if !self.eat_punct("|")? {
                        break;
                    }
                }
            }
            self.expect_punct(")")?;
            Ok(entries)
        } else {
            Ok(vec![self.parse_negated_entry()?])
        }
    }

    fn parse_negated_entry(&mut self) -> Result<NegatedSetEntry, ParseError> {
        let inverse = self.eat_punct("^")?;
        if self.is_keyword_a() {
            self.bump()?;
            return Ok(NegatedSetEntry {
                predicate: NegatedSetPredicate::KeywordA,
                inverse,
            });
        }
        let t = self.bump()?;
        if !matches!(t.kind, TokenKind::Iri | TokenKind::PrefixedName) {
            return Err(self.unexpected("IRI or 'a'"));
        }
        Ok(NegatedSetEntry {
            predicate: NegatedSetPredicate::Iri(self.term_ref_for(t)),
            inverse,
        })
    }

    // ---- expressions ------------------------------------------------

    fn push_expr(&mut self, node: ExprNode) -> ExprId {
        self.exprs.push(node);
        (self.exprs.len() - 1) as ExprId
    }

    fn push_path(&mut self, node: PathNode) -> PathId {
        self.paths.push(node);
        (self.paths.len() - 1) as PathId
    }

    fn push_group(&mut self, group: Group) -> GroupId {
        self.groups.push(group);
        (self.groups.len() - 1) as GroupId
    }

    fn call(&mut self, function: Function, args: Vec<ExprId>) -> ExprId {
        self.push_expr(ExprNode::FunctionCall {
            function,
            custom_iri: None,
            args,
        })
    }

    /// FILTER's argument and HAVING entries: either `( Expression )` or a
    /// bare built-in call (`FILTER EXISTS {...}`, `FILTER regex(...)`, etc).
    fn parse_bracketted_or_builtin(&mut self) -> Result<ExprId, ParseError> {
        if self.is_punct("(") {
            self.bump()?;
            let e = self.parse_expression()?;
            self.expect_punct(")")?;
            Ok(e)
        } else {
            self.parse_primary_expression()
        }
    }

    fn parse_expression(&mut self) -> Result<ExprId, ParseError> {
        self.parse_conditional_or()
    }

    fn parse_conditional_or(&mut self) -> Result<ExprId, ParseError> {
        let mut left = self.parse_conditional_and()?;
        while self.eat_punct("||")? {
            let right = self.parse_conditional_and()?;
            left = self.call(Function::Or, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_conditional_and(&mut self) -> Result<ExprId, ParseError> {
        let mut left = self.parse_value_logical()?;
        while self.eat_punct("&&")? {
            let right = self.parse_value_logical()?;
            left = self.call(Function::And, vec![left, right]);
        }
        Ok(left)
    }

    fn parse_value_logical(&mut self) -> Result<ExprId, ParseError> {
        let left = self.parse_numeric_expression()?;
        let op = if self.eat_punct("=")? {
            Some(Function::Equal)
        } else if self.eat_punct("!=")? {
            Some(Function::NotEqual)
        } else if self.eat_punct("<=")? {
            Some(Function::LessOrEqual)
        } else if self.eat_punct(">=")? {
            Some(Function::GreaterOrEqual)
        } else if self.is_punct("<") {
            self.bump()?;
            Some(Function::Less)
        } else if self.is_punct(">") {
            self.bump()?;
            Some(Function::Greater)
        } else {
            None
        };
        if let Some(f) = op {
            let right = self.parse_numeric_expression()?;
            return Ok(self.call(f, vec![left, right]));
        }
        if self.eat_ident("IN")? {
            let args = self.parse_expr_list_parenthesized()?;
            let mut all = vec![left];
            all.extend(args);
            return Ok(self.call(Function::In, all));
        }
        if self.is_ident("NOT") {
            let save = self.cur;
            self.bump()?;
            if self.eat_ident("IN")? {
                let args = self.parse_expr_list_parenthesized()?;
                let mut all = vec![left];
                all.extend(args);
                return Ok(self.call(Function::NotIn, all));
            }
            // not actually "NOT IN": nothing else starts with bare NOT here,
            // so this would be a genuine syntax error upstream; surface it.
            return Err(ParseError::new(
                ParseErrorKind::UnexpectedToken {
                    expected: "IN",
                    found: self.text(save).to_owned(),
                },
                save.start,
            ));
        }
        Ok(left)
    }

    fn parse_expr_list_parenthesized(&mut self) -> Result<Vec<ExprId>, ParseError> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        if !self.is_punct(")") {
            loop {
                args.push(self.parse_expression()?);
                if !self.eat_punct(",")? {
                    break;
                }
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    fn parse_numeric_expression(&mut self) -> Result<ExprId, ParseError> {
        let mut left = self.parse_multiplicative_expression()?;
        loop {
            if self.eat_punct("+")? {
                let right = self.parse_multiplicative_expression()?;
                left = self.call(Function::Add, vec![left, right]);
            } else if self.eat_punct("-")? {
                let right = self.parse_multiplicative_expression()?;
                left = self.call(Function::Subtract, vec![left, right]);
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_multiplicative_expression(&mut self) -> Result<ExprId, ParseError> {
        let mut left = self.parse_unary_expression()?;
        loop {
            if self.eat_punct("*")? {
                let right = self.parse_unary_expression()?;
                left = self.call(Function::Multiply, vec![left, right]);
            } else if self.eat_punct("/")? {
                let right = self.parse_unary_expression()?;
                left = self.call(Function::Divide, vec![left, right]);
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_unary_expression(&mut self) -> Result<ExprId, ParseError> {
        if self.eat_punct("!")? {
            let inner = self.parse_unary_expression()?;
            Ok(self.call(Function::Not, vec![inner]))
        } else if self.eat_punct("+")? {
            let inner = self.parse_unary_expression()?;
            Ok(self.call(Function::UnaryPlus, vec![inner]))
        } else if self.eat_punct("-")? {
            let inner = self.parse_unary_expression()?;
            Ok(self.call(Function::UnaryMinus, vec![inner]))
        } else {
            self.parse_primary_expression()
        }
    }

    fn parse_primary_expression(&mut self) -> Result<ExprId, ParseError> {
        if self.is_punct("(") {
            self.bump()?;
            let e = self.parse_expression()?;
            self.expect_punct(")")?;
            return Ok(e);
        }
        if self.cur.kind == TokenKind::Variable {
            let t = self.bump()?;
            return Ok(self.push_expr(ExprNode::Term(TermRef::new(
                t.start + 1..t.end,
                TermKind::Variable,
            ))));
        }
        if matches!(
            self.cur.kind,
            TokenKind::String | TokenKind::Numeric
        ) {
            let t = self.bump()?;
            let kind = if t.kind == TokenKind::Numeric {
                TermKind::NumericLiteral
            } else {
                TermKind::Literal
            };
            return Ok(self.push_expr(ExprNode::Term(TermRef::new(t.start..t.end, kind))));
        }
        if self.is_ident("true") || self.is_ident("false") {
            let t = self.bump()?;
            return Ok(self.push_expr(ExprNode::Term(TermRef::new(
                t.start..t.end,
                TermKind::BooleanLiteral,
            ))));
        }
        if self.eat_ident("NOT")? {
            self.expect_ident("EXISTS")?;
            let pattern = self.parse_group_graph_pattern()?;
            return Ok(self.push_expr(ExprNode::Exists {
                negated: true,
                pattern,
            }));
        }
        if self.eat_ident("EXISTS")? {
            let pattern = self.parse_group_graph_pattern()?;
            return Ok(self.push_expr(ExprNode::Exists {
                negated: false,
                pattern,
            }));
        }
        if matches!(self.cur.kind, TokenKind::Iri | TokenKind::PrefixedName) {
            // could be a bare IRI term, or `prefix:fn(...)` custom function
            // call, or one of the spelled-out built-ins that are lexed as a
            // prefixed/iri token only when written `<...>(args)`.
            let t = self.bump()?;
            if self.is_punct("(") {
                let args = self.parse_expr_list_parenthesized()?;
                return Ok(self.push_expr(ExprNode::FunctionCall {
                    function: Self::classify_custom(self.text(t)),
                    custom_iri: Some(self.term_ref_for(t)),
                    args,
                }));
            }
            return Ok(self.push_expr(ExprNode::Term(self.term_ref_for(t))));
        }
        if self.cur.kind == TokenKind::Ident {
            return self.parse_builtin_call();
        }
        Err(self.unexpected("expression"))
    }

    fn classify_custom(text: &str) -> Function {
        if text.eq_ignore_ascii_case("text:match") {
            Function::TextMatch
        } else {
            Function::Custom
        }
    }

    fn parse_builtin_call(&mut self) -> Result<ExprId, ParseError> {
        let name_tok = self.bump()?;
        let name = self.text(name_tok);
        macro_rules! simple {
            ($f:expr) => {{
                let args = self.parse_expr_list_parenthesized()?;
                Ok(self.call($f, args))
            }};
        }
        if name.eq_ignore_ascii_case("COUNT")
            || name.eq_ignore_ascii_case("SUM")
            || name.eq_ignore_ascii_case("AVG")
            || name.eq_ignore_ascii_case("MIN")
            || name.eq_ignore_ascii_case("MAX")
            || name.eq_ignore_ascii_case("SAMPLE")
            || name.eq_ignore_ascii_case("GROUP_CONCAT")
        {
            return self.parse_aggregate(name);
        }
        match () {
            _ if name.eq_ignore_ascii_case("STR") => simple!(Function::Str),
            _ if name.eq_ignore_ascii_case("LANG") => simple!(Function::Lang),
            _ if name.eq_ignore_ascii_case("LANGMATCHES") => simple!(Function::LangMatches),
            _ if name.eq_ignore_ascii_case("DATATYPE") => simple!(Function::Datatype),
            _ if name.eq_ignore_ascii_case("BOUND") => simple!(Function::Bound),
            _ if name.eq_ignore_ascii_case("IRI") || name.eq_ignore_ascii_case("URI") => {
                simple!(Function::Iri)
            }
            _ if name.eq_ignore_ascii_case("isIRI") || name.eq_ignore_ascii_case("isURI") => {
                simple!(Function::IsIri)
            }
            _ if name.eq_ignore_ascii_case("isLITERAL") => simple!(Function::IsLiteral),
            _ if name.eq_ignore_ascii_case("isBLANK") => simple!(Function::IsBlank),
            _ if name.eq_ignore_ascii_case("isNUMERIC") => simple!(Function::IsNumeric),
            _ if name.eq_ignore_ascii_case("sameTerm") => simple!(Function::SameTerm),
            _ if name.eq_ignore_ascii_case("CONTAINS") => simple!(Function::Contains),
            _ if name.eq_ignore_ascii_case("STRSTARTS") => simple!(Function::StrStarts),
            _ if name.eq_ignore_ascii_case("STRENDS") => simple!(Function::StrEnds),
            _ if name.eq_ignore_ascii_case("STRBEFORE") => simple!(Function::StrBefore),
            _ if name.eq_ignore_ascii_case("STRAFTER") => simple!(Function::StrAfter),
            _ if name.eq_ignore_ascii_case("REGEX") => simple!(Function::Regex),
            _ if name.eq_ignore_ascii_case("REPLACE") => simple!(Function::Replace),
            _ if name.eq_ignore_ascii_case("SUBSTR") => simple!(Function::Substr),
            _ if name.eq_ignore_ascii_case("STRLEN") => simple!(Function::StrLen),
            _ if name.eq_ignore_ascii_case("UCASE") => simple!(Function::UCase),
            _ if name.eq_ignore_ascii_case("LCASE") => simple!(Function::LCase),
            _ if name.eq_ignore_ascii_case("CONCAT") => simple!(Function::Concat),
            _ if name.eq_ignore_ascii_case("ENCODE_FOR_URI") => simple!(Function::EncodeForUri),
            _ if name.eq_ignore_ascii_case("ABS") => simple!(Function::Abs),
            _ if name.eq_ignore_ascii_case("CEIL") => simple!(Function::Ceil),
            _ if name.eq_ignore_ascii_case("FLOOR") => simple!(Function::Floor),
            _ if name.eq_ignore_ascii_case("ROUND") => simple!(Function::Round),
            _ if name.eq_ignore_ascii_case("YEAR") => simple!(Function::Year),
            _ if name.eq_ignore_ascii_case("MONTH") => simple!(Function::Month),
            _ if name.eq_ignore_ascii_case("DAY") => simple!(Function::Day),
            _ if name.eq_ignore_ascii_case("HOURS") => simple!(Function::Hours),
            _ if name.eq_ignore_ascii_case("MINUTES") => simple!(Function::Minutes),
            _ if name.eq_ignore_ascii_case("SECONDS") => simple!(Function::Seconds),
            _ if name.eq_ignore_ascii_case("TIMEZONE") => simple!(Function::Timezone),
            _ if name.eq_ignore_ascii_case("TZ") => simple!(Function::Tz),
            _ if name.eq_ignore_ascii_case("NOW") => simple!(Function::Now),
            _ if name.eq_ignore_ascii_case("RAND") => simple!(Function::Rand),
            _ if name.eq_ignore_ascii_case("UUID") => simple!(Function::Uuid),
            _ if name.eq_ignore_ascii_case("STRUUID") => simple!(Function::StrUuid),
            _ if name.eq_ignore_ascii_case("MD5") => simple!(Function::Md5),
            _ if name.eq_ignore_ascii_case("SHA1") => simple!(Function::Sha1),
            _ if name.eq_ignore_ascii_case("SHA256") => simple!(Function::Sha256),
            _ if name.eq_ignore_ascii_case("SHA384") => simple!(Function::Sha384),
            _ if name.eq_ignore_ascii_case("SHA512") => simple!(Function::Sha512),
            _ if name.eq_ignore_ascii_case("BNODE") => simple!(Function::BNode),
            _ if name.eq_ignore_ascii_case("IF") => simple!(Function::If),
            _ if name.eq_ignore_ascii_case("COALESCE") => simple!(Function::Coalesce),
            _ => Err(ParseError::new(
                ParseErrorKind::UnexpectedToken {
                    expected: "built-in function",
                    found: name.to_owned(),
                },
                name_tok.start,
            )),
        }
    }

    fn parse_aggregate(&mut self, name: &str) -> Result<ExprId, ParseError> {
        let function = if name.eq_ignore_ascii_case("COUNT") {
            AggregateFunction::Count
        } else if name.eq_ignore_ascii_case("SUM") {
            AggregateFunction::Sum
        } else if name.eq_ignore_ascii_case("AVG") {
            AggregateFunction::Avg
        } else if name.eq_ignore_ascii_case("MIN") {
            AggregateFunction::Min
        } else if name.eq_ignore_ascii_case("MAX") {
            AggregateFunction::Max
        } else if name.eq_ignore_ascii_case("SAMPLE") {
            AggregateFunction::Sample
        } else {
            AggregateFunction::GroupConcat
        };
        self.expect_punct("(")?;
        let distinct = self.eat_ident("DISTINCT")?;
        let arg = if self.eat_punct("*")? {
            None
        } else {
            Some(self.parse_expression()?)
        };
        let separator = if function == AggregateFunction::GroupConcat && self.eat_ident("SEPARATOR")? {
            self.expect_punct(";")?;
            let t = self.bump()?;
            if t.kind != TokenKind::String {
                return Err(self.unexpected("string literal"));
            }
            Some(TermRef::new(t.start..t.end, TermKind::Literal))
        } else {
            None
        };
        self.expect_punct(")")?;
        Ok(self.push_expr(ExprNode::Aggregate {
            function,
            distinct,
            arg,
            separator,
        }))
    }

    // ---- updates ------------------------------------------------------

    fn parse_update_operation(&mut self) -> Result<GraphUpdateOperation, ParseError> {
        if self.eat_ident("INSERT")? {
            if self.eat_ident("DATA")? {
                self.expect_punct("{")?;
                let quads = self.parse_quad_data()?;
                self.expect_punct("}")?;
                return Ok(GraphUpdateOperation::InsertData { quads });
            }
            let insert = self.parse_quad_template()?;
            self.expect_ident("WHERE")?;
            let (using, pattern) = self.parse_using_and_pattern()?;
            return Ok(GraphUpdateOperation::DeleteInsert {
                delete: Vec::new(),
                insert,
                using,
                pattern,
            });
        }
        if self.eat_ident("DELETE")? {
            if self.eat_ident("DATA")? {
                self.expect_punct("{")?;
                let quads = self.parse_quad_data()?;
                self.expect_punct("}")?;
                return Ok(GraphUpdateOperation::DeleteData { quads });
            }
            if self.eat_ident("WHERE")? {
                let pattern_start_nodes = self.parse_quad_pattern_group()?;
                let delete = pattern_start_nodes.clone();
                let group = self.push_group(self.quads_as_patterns(&pattern_start_nodes));
                return Ok(GraphUpdateOperation::DeleteInsert {
                    delete,
                    insert: Vec::new(),
                    using: DatasetClause::default(),
                    pattern: group,
                });
            }
            let delete = self.parse_quad_template()?;
            let mut insert = Vec::new();
            if self.eat_ident("INSERT")? {
                insert = self.parse_quad_template()?;
            }
            self.expect_ident("WHERE")?;
            let (using, pattern) = self.parse_using_and_pattern()?;
            return Ok(GraphUpdateOperation::DeleteInsert {
                delete,
                insert,
                using,
                pattern,
            });
        }
        if self.eat_ident("LOAD")? {
            let silent = self.eat_ident("SILENT")?;
            let t = self.bump()?;
            let source = self.term_ref_for(t);
            let into = if self.eat_ident("INTO")? {
                self.expect_ident("GRAPH")?;
                let g = self.bump()?;
                Some(self.term_ref_for(g))
            } else {
                None
            };
            return Ok(GraphUpdateOperation::Load {
                silent,
                source,
                into,
            });
        }
        if self.eat_ident("CLEAR")? {
            let silent = self.eat_ident("SILENT")?;
            let target = self.parse_graph_target()?;
            return Ok(GraphUpdateOperation::Clear { silent, target });
        }
        if self.eat_ident("DROP")? {
            let silent = self.eat_ident("SILENT")?;
            let target = self.parse_graph_target()?;
            return Ok(GraphUpdateOperation::Drop { silent, target });
        }
        Err(self.unexpected("INSERT, DELETE, LOAD, CLEAR or DROP"))
    }

    fn parse_graph_target(&mut self) -> Result<GraphTarget, ParseError> {
        if self.eat_ident("DEFAULT")? {
            Ok(GraphTarget::Default)
        } else if self.eat_ident("NAMED")? {
            Ok(GraphTarget::AllNamed)
        } else if self.eat_ident("ALL")? {
            Ok(GraphTarget::All)
        } else {
            self.eat_ident("GRAPH")?;
            let t = self.bump()?;
            Ok(GraphTarget::Named(self.term_ref_for(t)))
        }
    }

    fn parse_using_and_pattern(&mut self) -> Result<(DatasetClause, GroupId), ParseError> {
        let mut using = DatasetClause::default();
        loop {
            if self.eat_ident("USING")? {
                if self.eat_ident("NAMED")? {
                    let t = self.bump()?;
                    using.named.push(self.term_ref_for(t));
                } else {
                    let t = self.bump()?;
                    using.default.push(self.term_ref_for(t));
                }
            } else {
                break;
            }
        }
        let pattern = self.parse_group_graph_pattern()?;
        Ok((using, pattern))
    }

    /// Parses a `{ quad pattern }` block used by `DELETE WHERE`, returning
    /// the flat quad list (every position may be a variable).
    fn parse_quad_pattern_group(&mut self) -> Result<Vec<QuadPattern>, ParseError> {
        self.expect_punct("{")?;
        let quads = self.parse_quad_template_body()?;
        self.expect_punct("}")?;
        Ok(quads)
    }

    fn quads_as_patterns(&self, quads: &[QuadPattern]) -> Group {
        quads
            .iter()
            .map(|q| PatternNode::Triple {
                pattern: TriplePattern {
                    subject: q.subject,
                    predicate: PredicateRef::Term(q.predicate),
                    object: q.object,
                },
                graph: q.graph,
            })
            .collect()
    }

    fn parse_quad_template(&mut self) -> Result<Vec<QuadPattern>, ParseError> {
        self.expect_punct("{")?;
        let quads = self.parse_quad_template_body()?;
        self.expect_punct("}")?;
        Ok(quads)
    }

    fn parse_quad_data(&mut self) -> Result<Vec<QuadPattern>, ParseError> {
        self.parse_quad_template_body()
    }

    fn parse_quad_template_body(&mut self) -> Result<Vec<QuadPattern>, ParseError> {
        let mut quads = Vec::new();
        loop {
            if self.is_punct("}") || self.cur.kind == TokenKind::Eof {
                break;
            }
            if self.eat_punct(".")? {
                continue;
            }
            if self.eat_ident("GRAPH")? {
                let g = self.bump()?;
                let graph = GraphScope::Named(self.term_ref_for(g));
                self.expect_punct("{")?;
                self.parse_quad_triples_into(&mut quads, graph)?;
                self.expect_punct("}")?;
            } else {
                self.parse_quad_triples_into(&mut quads, GraphScope::Default)?;
            }
        }
        Ok(quads)
    }

    fn parse_quad_triples_into(
        &mut self,
        quads: &mut Vec<QuadPattern>,
        graph: GraphScope,
    ) -> Result<(), ParseError> {
        let mut nodes = Vec::new();
        loop {
            if self.is_punct("}") || self.cur.kind == TokenKind::Eof {
                break;
            }
            if self.eat_punct(".")? {
                continue;
            }
            self.parse_triples_block(&mut nodes, graph)?;
        }
        for n in nodes {
            if let PatternNode::Triple { pattern, graph } = n {
                if let PredicateRef::Term(p) = pattern.predicate {
                    quads.push(QuadPattern {
                        subject: pattern.subject,
                        predicate: p,
                        object: pattern.object,
                        graph,
                    });
                }
            }
        }
        Ok(())
    }
}

// ---- synthetic term refs used only while lowering RDF collections -----
//
// `rdf:first`/`rdf:rest`/`rdf:nil` never need source text (the evaluator
// matches on `TermKind` directly, the same convention as `KeywordA`), so
// their span is a zero-length marker at a position unique enough to not
// collide with a real term reference.

fn rdf_first_ref() -> TermRef {
    TermRef::new(0..0, TermKind::RdfFirst)
}

fn rdf_rest_ref() -> TermRef {
    TermRef::new(0..0, TermKind::RdfRest)
}

fn rdf_nil_ref(at: usize) -> TermRef {
    TermRef::new(at..at, TermKind::RdfNil)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> ParsedQuery {
        parse_query(src).unwrap_or_else(|e| panic!("parse failed: {e} in {src}"))
    }

    #[test]
    fn parses_basic_select() {
        let p = parse("SELECT ?s ?p WHERE { ?s ?p <http://example.com/o> }");
        match &p.query.form {
            QueryForm::Select(q) => {
                assert!(matches!(q.project, ProjectClause::Variables(ref v) if v.len() == 2));
                assert_eq!(p.query.group(q.pattern).len(), 1);
            }
            _ => panic!("expected SELECT"),
        }
    }

    #[test]
    fn parses_prefixed_names_with_prologue() {
        let p = parse("PREFIX ex: <http://example.com/> SELECT * WHERE { ex:a ex:b ex:c }");
        assert_eq!(
            p.prologue.resolve_prefixed_name("ex:a").unwrap(),
            "http://example.com/a"
        );
    }

    #[test]
    fn parses_optional_union_minus() {
        let p = parse(
            "SELECT * WHERE { ?s ?p ?o OPTIONAL { ?s ?p2 ?o2 } { ?a ?b ?c } UNION { ?d ?e ?f } MINUS { ?s ?p ?o } }",
        );
        match &p.query.form {
            QueryForm::Select(q) => {
                let group = p.query.group(q.pattern);
                assert!(group.iter().any(|n| matches!(n, PatternNode::Optional(_))));
                assert!(group.iter().any(|n| matches!(n, PatternNode::Union(_))));
                assert!(group.iter().any(|n| matches!(n, PatternNode::Minus(_))));
            }
            _ => panic!("expected SELECT"),
        }
    }

    #[test]
    fn parses_property_path() {
        let p = parse("SELECT ?x WHERE { <http://a> (<http://knows>)* ?x }");
        match &p.query.form {
            QueryForm::Select(q) => {
                let group = p.query.group(q.pattern);
                assert!(group
                    .iter()
                    .any(|n| matches!(n, PatternNode::Path { .. })));
            }
            _ => panic!("expected SELECT"),
        }
    }

    #[test]
    fn parses_insert_data_update() {
        let u = parse_update(
            "PREFIX ex: <http://example.com/> INSERT DATA { ex:a ex:b ex:c }",
        )
        .unwrap();
        assert_eq!(u.update.operations.len(), 1);
        assert!(matches!(
            u.update.operations[0],
            GraphUpdateOperation::InsertData { .. }
        ));
    }
}
