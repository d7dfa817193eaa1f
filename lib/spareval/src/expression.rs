//! The filter/expression evaluator (C6): walks `Query::exprs`, resolving
//! `Variable` leaves against the current row and constant leaves against
//! the query source text, producing a [`Value`] or a type error.
//!
//! Three-valued logic applies throughout: a type error from a subexpression
//! does not abort the query, it propagates as an error that `FILTER`
//! downgrades to "drop this solution" and `BIND` downgrades to "leave the
//! variable unbound". Only `COALESCE`, `IF` and the logical connectives
//! interpret an error specially (per their short-circuit rules); everywhere
//! else an error in an argument makes the whole call fail.

use std::cell::RefCell;
use std::sync::Arc;

use oxrdf::vocab::xsd;
use oxrdf::{BlankNode, Literal, NamedNode, Term};
use oxsdatatypes::{Boolean, DateTime, Decimal, Double, Float, Integer, Numeric};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use spargebra::algebra::{ExprId, ExprNode, Function};
use spargebra::Prologue;

use crate::atom::{AtomId, AtomTable};
use crate::binding::{Row, VariableSlots};
use crate::eval_error::{EngineError, EngineResult};
use crate::operators::PatternEvaluator;
use crate::term_resolve::resolve_term;

/// An expression's intermediate value. Distinct from `oxrdf::Term` so
/// arithmetic, string and date functions operate on typed Rust values
/// instead of re-parsing a lexical form on every operator application.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Iri(String),
    BlankNode(String),
    Simple(String),
    Lang(String, String),
    Boolean(bool),
    Numeric(Numeric),
    DateTime(DateTime),
    /// A literal whose datatype this evaluator does not model natively;
    /// carried through as lexical form + datatype IRI so `sameTerm`/`=`
    /// and passthrough functions (`STR`, `DATATYPE`) still work.
    OtherTyped(String, String),
}

impl Value {
    pub fn from_term(term: &Term) -> Self {
        match term {
            Term::NamedNode(n) => Self::Iri(n.as_str().to_owned()),
            Term::BlankNode(b) => Self::BlankNode(b.as_str().to_owned()),
            Term::Literal(l) => {
                if l.is_plain() {
                    return match l.language() {
                        Some(lang) => Self::Lang(l.value().to_owned(), lang.to_owned()),
                        None => Self::Simple(l.value().to_owned()),
                    };
                }
                let dt = l.datatype();
                if dt == xsd::BOOLEAN {
                    if let Ok(b) = l.value().parse::<Boolean>() {
                        return Self::Boolean(b.is_true());
                    }
                } else if dt == xsd::INTEGER {
                    if let Ok(i) = l.value().parse::<Integer>() {
                        return Self::Numeric(Numeric::Integer(i));
                    }
                } else if dt == xsd::DECIMAL {
                    if let Ok(d) = l.value().parse::<Decimal>() {
                        return Self::Numeric(Numeric::Decimal(d));
                    }
                } else if dt == xsd::FLOAT {
                    if let Ok(f) = l.value().parse::<Float>() {
                        return Self::Numeric(Numeric::Float(f));
                    }
                } else if dt == xsd::DOUBLE {
                    if let Ok(d) = l.value().parse::<Double>() {
                        return Self::Numeric(Numeric::Double(d));
                    }
                } else if dt == xsd::DATE_TIME {
                    if let Ok(dt) = l.value().parse::<DateTime>() {
                        return Self::DateTime(dt);
                    }
                }
                Self::OtherTyped(l.value().to_owned(), dt.as_str().to_owned())
            }
        }
    }

    pub fn to_term(&self) -> Term {
        match self {
            Self::Iri(iri) => Term::NamedNode(NamedNode::new_unchecked(iri)),
            Self::BlankNode(id) => Term::BlankNode(BlankNode::new_unchecked(id)),
            Self::Simple(s) => Term::Literal(Literal::new_simple_literal(s)),
            Self::Lang(s, lang) => {
                Term::Literal(Literal::new_language_tagged_literal_unchecked(s, lang))
            }
            Self::Boolean(b) => Term::Literal(Literal::new_typed_literal(
                if *b { "true" } else { "false" },
                xsd::BOOLEAN,
            )),
            Self::Numeric(n) => {
                let datatype = match n {
                    Numeric::Integer(_) => xsd::INTEGER,
                    Numeric::Decimal(_) => xsd::DECIMAL,
                    Numeric::Float(_) => xsd::FLOAT,
                    Numeric::Double(_) => xsd::DOUBLE,
                };
                Term::Literal(Literal::new_typed_literal(n.to_string(), datatype))
            }
            Self::DateTime(dt) => {
                Term::Literal(Literal::new_typed_literal(dt.to_string(), xsd::DATE_TIME))
            }
            Self::OtherTyped(lexical, datatype) => Term::Literal(Literal::new_typed_literal(
                lexical,
                NamedNode::new_unchecked(datatype),
            )),
        }
    }

    pub(crate) fn lexical(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Self::Iri(s) | Self::BlankNode(s) | Self::Simple(s) | Self::OtherTyped(s, _) => {
                std::borrow::Cow::Borrowed(s)
            }
            Self::Lang(s, _) => std::borrow::Cow::Borrowed(s),
            Self::Boolean(b) => std::borrow::Cow::Owned(b.to_string()),
            Self::Numeric(n) => std::borrow::Cow::Owned(n.to_string()),
            Self::DateTime(dt) => std::borrow::Cow::Owned(dt.to_string()),
        }
    }

    fn is_string_like(&self) -> bool {
        matches!(self, Self::Simple(_) | Self::Lang(..))
    }

    fn numeric(&self) -> EngineResult<Numeric> {
        match self {
            Self::Numeric(n) => Ok(*n),
            _ => Err(EngineError::evaluation("not a numeric value")),
        }
    }
}

/// Per-evaluation context: everything an expression needs to resolve a
/// variable, a constant, a hash function, or a nondeterministic built-in.
pub struct ExprContext<'a> {
    pub atoms: &'a AtomTable,
    pub source: &'a str,
    pub prologue: &'a Prologue,
    pub exprs: &'a [ExprNode],
    pub slots: &'a VariableSlots,
    pub row: &'a Row,
    pub now: DateTime,
    pub patterns: Option<&'a PatternEvaluator<'a>>,
    rng: RefCell<StdRng>,
}

impl<'a> ExprContext<'a> {
    pub fn new(
        atoms: &'a AtomTable,
        source: &'a str,
        prologue: &'a Prologue,
        exprs: &'a [ExprNode],
        slots: &'a VariableSlots,
        row: &'a Row,
        now: DateTime,
    ) -> Self {
        Self {
            atoms,
            source,
            prologue,
            exprs,
            slots,
            row,
            now,
            patterns: None,
            rng: RefCell::new(StdRng::from_entropy()),
        }
    }

    pub fn eval(&self, id: ExprId) -> EngineResult<Value> {
        match &self.exprs[id as usize] {
            ExprNode::Term(term) => {
                if term.kind == spargebra::algebra::TermKind::Variable {
                    let name = term.text(self.source);
                    let slot = self
                        .slots
                        .try_slot(name)
                        .ok_or_else(|| EngineError::evaluation(format!("unbound variable ?{name}")))?;
                    let atom = self
                        .row
                        .get(slot)
                        .ok_or_else(|| EngineError::evaluation(format!("unbound variable ?{name}")))?;
                    return Ok(Value::from_term(&self.atoms.resolve_term(atom)));
                }
                Ok(Value::from_term(&resolve_term(*term, self.source, self.prologue)?))
            }
            ExprNode::FunctionCall {
                function,
                custom_iri,
                args,
            } => self.eval_call(*function, *custom_iri, args),
            ExprNode::Exists { negated, pattern } => {
                let found = self
                    .patterns
                    .ok_or_else(|| EngineError::not_implemented("EXISTS outside a pattern context"))?
                    .exists(*pattern, self.row)?;
                Ok(Value::Boolean(found != *negated))
            }
            ExprNode::Aggregate { .. } => {
                // `group_rows` pre-computes every aggregate expression once
                // per group and stores the result in a synthetic slot so
                // that it can be referenced like any other bound variable
                // from a projection, ORDER BY or HAVING expression.
                let slot_name = format!("__agg{id}");
                let slot = self.slots.try_slot(&slot_name).ok_or_else(|| {
                    EngineError::evaluation("aggregate expression evaluated outside a GROUP BY context")
                })?;
                let atom = self.row.get(slot).ok_or_else(|| {
                    EngineError::evaluation("aggregate expression has no value for this group")
                })?;
                Ok(Value::from_term(&self.atoms.resolve_term(atom)))
            }
        }
    }

    fn arg(&self, args: &[ExprId], index: usize) -> EngineResult<Value> {
        self.eval(args[index])
    }

    fn eval_call(
        &self,
        function: Function,
        custom_iri: Option<spargebra::algebra::TermRef>,
        args: &[ExprId],
    ) -> EngineResult<Value> {
        use Function as F;
        Ok(match function {
            F::Not => Value::Boolean(!self.ebv(args[0])?),
            F::And => {
                let left = self.ebv(args[0]);
                let right = self.ebv(args[1]);
                match (left, right) {
                    (Ok(false), _) | (_, Ok(false)) => Value::Boolean(false),
                    (Ok(true), Ok(true)) => Value::Boolean(true),
                    (Err(e), _) | (_, Err(e)) => return Err(e),
                }
            }
            F::Or => {
                let left = self.ebv(args[0]);
                let right = self.ebv(args[1]);
                match (left, right) {
                    (Ok(true), _) | (_, Ok(true)) => Value::Boolean(true),
                    (Ok(false), Ok(false)) => Value::Boolean(false),
                    (Err(e), _) | (_, Err(e)) => return Err(e),
                }
            }
            F::Equal => Value::Boolean(self.term_equals(args)?),
            F::NotEqual => Value::Boolean(!self.term_equals(args)?),
            F::Less | F::LessOrEqual | F::Greater | F::GreaterOrEqual => {
                Value::Boolean(self.compare(function, args)?)
            }
            F::UnaryPlus => Value::Numeric(self.arg(args, 0)?.numeric()?),
            F::UnaryMinus => Value::Numeric(numeric_neg(self.arg(args, 0)?.numeric()?)?),
            F::Add => Value::Numeric(numeric_op(
                self.arg(args, 0)?.numeric()?,
                self.arg(args, 1)?.numeric()?,
                Op::Add,
            )?),
            F::Subtract => Value::Numeric(numeric_op(
                self.arg(args, 0)?.numeric()?,
                self.arg(args, 1)?.numeric()?,
                Op::Sub,
            )?),
            F::Multiply => Value::Numeric(numeric_op(
                self.arg(args, 0)?.numeric()?,
                self.arg(args, 1)?.numeric()?,
                Op::Mul,
            )?),
            F::Divide => Value::Numeric(numeric_op(
                self.arg(args, 0)?.numeric()?,
                self.arg(args, 1)?.numeric()?,
                Op::Div,
            )?),
            F::Str => Value::Simple(self.arg(args, 0)?.lexical().into_owned()),
            F::Lang => match self.arg(args, 0)? {
                Value::Lang(_, lang) => Value::Simple(lang),
                _ => Value::Simple(String::new()),
            },
            F::LangMatches => {
                let lang = self.arg(args, 0)?.lexical().to_lowercase();
                let range = self.arg(args, 1)?.lexical().to_lowercase();
                Value::Boolean(lang_matches(&lang, &range))
            }
            F::Datatype => Value::Iri(self.datatype_of(&self.arg(args, 0)?)),
            F::Bound => {
                let ExprNode::Term(term) = &self.exprs[args[0] as usize] else {
                    return Err(EngineError::evaluation("BOUND expects a variable"));
                };
                let name = term.text(self.source);
                Value::Boolean(
                    self.slots
                        .try_slot(name)
                        .and_then(|slot| self.row.get(slot))
                        .is_some(),
                )
            }
            F::Iri => {
                let lexical = self.arg(args, 0)?.lexical().into_owned();
                let resolved = self
                    .prologue
                    .resolve_iri(&lexical)
                    .unwrap_or(lexical);
                Value::Iri(resolved)
            }
            F::IsIri => Value::Boolean(matches!(self.arg(args, 0)?, Value::Iri(_))),
            F::IsLiteral => Value::Boolean(!matches!(
                self.arg(args, 0)?,
                Value::Iri(_) | Value::BlankNode(_)
            )),
            F::IsBlank => Value::Boolean(matches!(self.arg(args, 0)?, Value::BlankNode(_))),
            F::IsNumeric => Value::Boolean(matches!(self.arg(args, 0)?, Value::Numeric(_))),
            F::SameTerm => Value::Boolean(self.arg(args, 0)? == self.arg(args, 1)?),
            F::Contains => Value::Boolean(self.arg(args, 0)?.lexical().contains(&*self.arg(args, 1)?.lexical())),
            F::StrStarts => Value::Boolean(self.arg(args, 0)?.lexical().starts_with(&*self.arg(args, 1)?.lexical())),
            F::StrEnds => Value::Boolean(self.arg(args, 0)?.lexical().ends_with(&*self.arg(args, 1)?.lexical())),
            F::StrBefore => {
                let haystack = self.arg(args, 0)?.lexical().into_owned();
                let needle = self.arg(args, 1)?.lexical().into_owned();
                Value::Simple(haystack.find(&needle).map(|i| haystack[..i].to_owned()).unwrap_or_default())
            }
            F::StrAfter => {
                let haystack = self.arg(args, 0)?.lexical().into_owned();
                let needle = self.arg(args, 1)?.lexical().into_owned();
                Value::Simple(
                    haystack
                        .find(&needle)
                        .map(|i| haystack[i + needle.len()..].to_owned())
                        .unwrap_or_default(),
                )
            }
            F::Regex => {
                let text = self.arg(args, 0)?.lexical().into_owned();
                let pattern = self.arg(args, 1)?.lexical().into_owned();
                let flags = args.get(2).map(|a| self.eval(*a)).transpose()?.map(|v| v.lexical().into_owned()).unwrap_or_default();
                Value::Boolean(build_regex(&pattern, &flags)?.is_match(&text))
            }
            F::Replace => {
                let text = self.arg(args, 0)?.lexical().into_owned();
                let pattern = self.arg(args, 1)?.lexical().into_owned();
                let replacement = self.arg(args, 2)?.lexical().into_owned();
                let flags = args.get(3).map(|a| self.eval(*a)).transpose()?.map(|v| v.lexical().into_owned()).unwrap_or_default();
                let re = build_regex(&pattern, &flags)?;
                Value::Simple(re.replace_all(&text, replacement.as_str()).into_owned())
            }
            F::Substr => {
                let text = self.arg(args, 0)?.lexical().into_owned();
                let start = self.arg(args, 1)?.numeric()?.to_double().as_inner();
                let chars: Vec<char> = text.chars().collect();
                let start_idx = ((start - 1.0).max(0.0)) as usize;
                let len = args
                    .get(2)
                    .map(|a| self.eval(*a))
                    .transpose()?
                    .map(|v| v.numeric().map(|n| n.to_double().as_inner()))
                    .transpose()?
                    .map(|l| l as usize)
                    .unwrap_or(chars.len());
                let end_idx = (start_idx + len).min(chars.len());
                let start_idx = start_idx.min(chars.len());
                Value::Simple(chars[start_idx..end_idx].iter().collect())
            }
            F::StrLen => Value::Numeric(Numeric::Integer(Integer::new(
                self.arg(args, 0)?.lexical().chars().count() as i64,
            ))),
            F::UCase => Value::Simple(self.arg(args, 0)?.lexical().to_uppercase()),
            F::LCase => Value::Simple(self.arg(args, 0)?.lexical().to_lowercase()),
            F::Concat => {
                let mut out = String::new();
                for a in args {
                    out.push_str(&self.eval(*a)?.lexical());
                }
                Value::Simple(out)
            }
            F::EncodeForUri => Value::Simple(percent_encode(&self.arg(args, 0)?.lexical())),
            F::Abs => Value::Numeric(numeric_unary(self.arg(args, 0)?.numeric()?, |n| n.abs(), |n| n.abs(), |n| n.abs(), |n| n.abs())),
            F::Ceil => Value::Numeric(numeric_unary(self.arg(args, 0)?.numeric()?, |n| n, |n| n.ceil(), |n| n.ceil(), |n| n.ceil())),
            F::Floor => Value::Numeric(numeric_unary(self.arg(args, 0)?.numeric()?, |n| n, |n| n.floor(), |n| n.floor(), |n| n.floor())),
            F::Round => Value::Numeric(numeric_unary(self.arg(args, 0)?.numeric()?, |n| n, |n| n.round(), |n| n.round(), |n| n.round())),
            F::Year => Value::Numeric(Numeric::Integer(Integer::new(i64::from(self.date_time(args)?.year())))),
            F::Month => Value::Numeric(Numeric::Integer(Integer::new(i64::from(self.date_time(args)?.month())))),
            F::Day => Value::Numeric(Numeric::Integer(Integer::new(i64::from(self.date_time(args)?.day())))),
            F::Hours => Value::Numeric(Numeric::Integer(Integer::new(i64::from(self.date_time(args)?.hour())))),
            F::Minutes => Value::Numeric(Numeric::Integer(Integer::new(i64::from(self.date_time(args)?.minute())))),
            F::Seconds => Value::Numeric(Numeric::Decimal(self.date_time(args)?.second())),
            F::Timezone => {
                let tz = self
                    .date_time(args)?
                    .timezone()
                    .ok_or_else(|| EngineError::evaluation("no timezone"))?;
                Value::OtherTyped(
                    format_day_time_duration(tz.minutes()),
                    xsd::DAY_TIME_DURATION.as_str().to_owned(),
                )
            }
            F::Tz => Value::Simple(
                self.date_time(args)?
                    .timezone()
                    .map(|tz| tz.to_string())
                    .unwrap_or_default(),
            ),
            F::Now => Value::DateTime(self.now),
            F::Rand => Value::Numeric(Numeric::Double(Double::new(self.rng.borrow_mut().gen::<f64>()))),
            F::Uuid => Value::Iri(format!("urn:uuid:{}", random_uuid(&self.rng))),
            F::StrUuid => Value::Simple(random_uuid(&self.rng)),
            F::Md5 => Value::Simple(hash_hex::<md5::Md5>(&self.arg(args, 0)?.lexical())),
            F::Sha1 => Value::Simple(hash_hex::<sha1::Sha1>(&self.arg(args, 0)?.lexical())),
            F::Sha256 => Value::Simple(hash_hex::<sha2::Sha256>(&self.arg(args, 0)?.lexical())),
            F::Sha384 => Value::Simple(hash_hex::<sha2::Sha384>(&self.arg(args, 0)?.lexical())),
            F::Sha512 => Value::Simple(hash_hex::<sha2::Sha512>(&self.arg(args, 0)?.lexical())),
            F::BNode => match args.first() {
                Some(a) => Value::BlankNode(format!("bn{}", self.eval(*a)?.lexical().chars().map(|c| c as u32).sum::<u32>())),
                None => Value::BlankNode(BlankNode::default().into_string()),
            },
            F::If => {
                if self.ebv(args[0])? {
                    self.arg(args, 1)?
                } else {
                    self.arg(args, 2)?
                }
            }
            F::Coalesce => {
                let mut result = None;
                for a in args {
                    if let Ok(v) = self.eval(*a) {
                        result = Some(v);
                        break;
                    }
                }
                result.ok_or_else(|| EngineError::evaluation("COALESCE: all arguments unbound or erroring"))?
            }
            F::In | F::NotIn => {
                let needle = self.arg(args, 0)?;
                let mut found = false;
                for a in &args[1..] {
                    if self.eval(*a).map(|v| v == needle).unwrap_or(false) {
                        found = true;
                        break;
                    }
                }
                Value::Boolean(if function == F::In { found } else { !found })
            }
            F::TextMatch => {
                let text = self.arg(args, 0)?.lexical().into_owned();
                let query = self.arg(args, 1)?.lexical().into_owned();
                Value::Boolean(text.to_lowercase().contains(&query.to_lowercase()))
            }
            F::Custom => {
                let iri = custom_iri
                    .map(|t| t.text(self.source).to_owned())
                    .unwrap_or_default();
                return Err(EngineError::not_implemented(format!(
                    "custom function <{iri}>"
                )));
            }
        })
    }

    pub fn ebv(&self, id: ExprId) -> EngineResult<bool> {
        effective_boolean_value(&self.eval(id)?)
    }

    fn term_equals(&self, args: &[ExprId]) -> EngineResult<bool> {
        let left = self.arg(args, 0)?;
        let right = self.arg(args, 1)?;
        if left.is_string_like() && right.is_string_like() {
            return Ok(left == right);
        }
        if let (Value::Numeric(a), Value::Numeric(b)) = (&left, &right) {
            let (a, b) = a.promote(*b);
            return Ok(numeric_partial_cmp(a, b) == Some(std::cmp::Ordering::Equal));
        }
        Ok(left == right)
    }

    fn compare(&self, function: Function, args: &[ExprId]) -> EngineResult<bool> {
        let left = self.arg(args, 0)?;
        let right = self.arg(args, 1)?;
        let ordering = if let (Value::Numeric(a), Value::Numeric(b)) = (&left, &right) {
            let (a, b) = a.promote(*b);
            numeric_partial_cmp(a, b)
        } else if left.is_string_like() && right.is_string_like() {
            left.lexical().partial_cmp(&right.lexical())
        } else if let (Value::DateTime(a), Value::DateTime(b)) = (&left, &right) {
            a.partial_cmp(b)
        } else {
            return Err(EngineError::evaluation("values are not order-comparable"));
        };
        let ordering = ordering.ok_or_else(|| EngineError::evaluation("incomparable values"))?;
        Ok(match function {
            Function::Less => ordering.is_lt(),
            Function::LessOrEqual => ordering.is_le(),
            Function::Greater => ordering.is_gt(),
            Function::GreaterOrEqual => ordering.is_ge(),
            _ => unreachable!(),
        })
    }

    fn datatype_of(&self, value: &Value) -> String {
        match value {
            Value::Iri(_) | Value::BlankNode(_) => String::new(),
            Value::Simple(_) => xsd::STRING.as_str().to_owned(),
            Value::Lang(..) => oxrdf::vocab::rdf::LANG_STRING.as_str().to_owned(),
            Value::Boolean(_) => xsd::BOOLEAN.as_str().to_owned(),
            Value::Numeric(n) => match n {
                Numeric::Integer(_) => xsd::INTEGER.as_str().to_owned(),
                Numeric::Decimal(_) => xsd::DECIMAL.as_str().to_owned(),
                Numeric::Float(_) => xsd::FLOAT.as_str().to_owned(),
                Numeric::Double(_) => xsd::DOUBLE.as_str().to_owned(),
            },
            Value::DateTime(_) => xsd::DATE_TIME.as_str().to_owned(),
            Value::OtherTyped(_, dt) => dt.clone(),
        }
    }

    fn date_time(&self, args: &[ExprId]) -> EngineResult<DateTime> {
        match self.arg(args, 0)? {
            Value::DateTime(dt) => Ok(dt),
            other => other
                .lexical()
                .parse::<DateTime>()
                .map_err(|e| EngineError::evaluation(e.to_string())),
        }
    }
}

impl PartialEq for AtomId {
    fn eq(&self, other: &Self) -> bool {
        self.as_u32() == other.as_u32()
    }
}

impl Eq for AtomId {}

fn lang_matches(lang: &str, range: &str) -> bool {
    if range == "*" {
        return !lang.is_empty();
    }
    lang == range || lang.starts_with(&format!("{range}-"))
}

enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

fn numeric_op(a: Numeric, b: Numeric, op: Op) -> EngineResult<Numeric> {
    let (a, b) = a.promote(b);
    Ok(match (a, b, op) {
        (Numeric::Integer(a), Numeric::Integer(b), Op::Add) => Numeric::Integer(
            a.checked_add(b).ok_or_else(|| EngineError::evaluation("integer overflow"))?,
        ),
        (Numeric::Integer(a), Numeric::Integer(b), Op::Sub) => Numeric::Integer(
            a.checked_sub(b).ok_or_else(|| EngineError::evaluation("integer overflow"))?,
        ),
        (Numeric::Integer(a), Numeric::Integer(b), Op::Mul) => Numeric::Integer(
            a.checked_mul(b).ok_or_else(|| EngineError::evaluation("integer overflow"))?,
        ),
        (Numeric::Integer(a), Numeric::Integer(b), Op::Div) => Numeric::Decimal(
            Decimal::from(a)
                .checked_div(Decimal::from(b))
                .ok_or_else(|| EngineError::evaluation("division by zero"))?,
        ),
        (Numeric::Decimal(a), Numeric::Decimal(b), Op::Add) => Numeric::Decimal(
            a.checked_add(b).ok_or_else(|| EngineError::evaluation("decimal overflow"))?,
        ),
        (Numeric::Decimal(a), Numeric::Decimal(b), Op::Sub) => Numeric::Decimal(
            a.checked_sub(b).ok_or_else(|| EngineError::evaluation("decimal overflow"))?,
        ),
        (Numeric::Decimal(a), Numeric::Decimal(b), Op::Mul) => Numeric::Decimal(
            a.checked_mul(b).ok_or_else(|| EngineError::evaluation("decimal overflow"))?,
        ),
        (Numeric::Decimal(a), Numeric::Decimal(b), Op::Div) => Numeric::Decimal(
            a.checked_div(b).ok_or_else(|| EngineError::evaluation("division by zero"))?,
        ),
        (Numeric::Float(a), Numeric::Float(b), Op::Add) => Numeric::Float(a + b),
        (Numeric::Float(a), Numeric::Float(b), Op::Sub) => Numeric::Float(a - b),
        (Numeric::Float(a), Numeric::Float(b), Op::Mul) => Numeric::Float(a * b),
        (Numeric::Float(a), Numeric::Float(b), Op::Div) => Numeric::Float(a / b),
        (Numeric::Double(a), Numeric::Double(b), Op::Add) => Numeric::Double(a + b),
        (Numeric::Double(a), Numeric::Double(b), Op::Sub) => Numeric::Double(a - b),
        (Numeric::Double(a), Numeric::Double(b), Op::Mul) => Numeric::Double(a * b),
        (Numeric::Double(a), Numeric::Double(b), Op::Div) => Numeric::Double(a / b),
        _ => unreachable!("promote() always yields matching variants"),
    })
}

fn numeric_neg(n: Numeric) -> EngineResult<Numeric> {
    Ok(match n {
        Numeric::Integer(i) => Numeric::Integer(
            i.checked_neg().ok_or_else(|| EngineError::evaluation("integer overflow"))?,
        ),
        Numeric::Decimal(d) => Numeric::Decimal(
            d.checked_neg().ok_or_else(|| EngineError::evaluation("decimal overflow"))?,
        ),
        Numeric::Float(f) => Numeric::Float(-f),
        Numeric::Double(d) => Numeric::Double(-d),
    })
}

fn numeric_unary(
    n: Numeric,
    on_integer: impl Fn(Integer) -> Integer,
    on_decimal: impl Fn(Decimal) -> Decimal,
    on_float: impl Fn(Float) -> Float,
    on_double: impl Fn(Double) -> Double,
) -> Numeric {
    match n {
        Numeric::Integer(i) => Numeric::Integer(on_integer(i)),
        Numeric::Decimal(d) => Numeric::Decimal(on_decimal(d)),
        Numeric::Float(f) => Numeric::Float(on_float(f)),
        Numeric::Double(d) => Numeric::Double(on_double(d)),
    }
}

fn numeric_partial_cmp(a: Numeric, b: Numeric) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Numeric::Integer(a), Numeric::Integer(b)) => a.partial_cmp(&b),
        (Numeric::Decimal(a), Numeric::Decimal(b)) => a.partial_cmp(&b),
        (Numeric::Float(a), Numeric::Float(b)) => a.partial_cmp(&b),
        (Numeric::Double(a), Numeric::Double(b)) => a.partial_cmp(&b),
        _ => None,
    }
}

/// `ORDER BY` ranking (4.8.5): unbound < blank node < IRI < literal; within
/// literals, numeric/date values compare by promoted value and everything
/// else falls back to lexical (Unicode codepoint) order. Used by the
/// `OrderBy` operator and by `MIN`/`MAX` aggregation.
pub fn order_compare(atoms: &AtomTable, left: Option<AtomId>, right: Option<AtomId>) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    let (left, right) = match (left, right) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(l), Some(r)) => (l, r),
    };
    let left_term = atoms.resolve_term(left);
    let right_term = atoms.resolve_term(right);
    let rank = |t: &Term| match t {
        Term::BlankNode(_) => 0,
        Term::NamedNode(_) => 1,
        Term::Literal(_) => 2,
    };
    let (lr, rr) = (rank(&left_term), rank(&right_term));
    if lr != rr {
        return lr.cmp(&rr);
    }
    if lr != 2 {
        return left_term.to_ntriples().cmp(&right_term.to_ntriples());
    }
    let (lv, rv) = (Value::from_term(&left_term), Value::from_term(&right_term));
    if let (Value::Numeric(a), Value::Numeric(b)) = (&lv, &rv) {
        let (a, b) = a.promote(*b);
        if let Some(o) = numeric_partial_cmp(a, b) {
            return o;
        }
    }
    if let (Value::DateTime(a), Value::DateTime(b)) = (&lv, &rv) {
        if let Some(o) = a.partial_cmp(b) {
            return o;
        }
    }
    lv.lexical().cmp(&rv.lexical())
}

/// SPARQL's Effective Boolean Value coercion: unknown/incomparable inputs
/// are a type error, not `false`.
pub fn effective_boolean_value(value: &Value) -> EngineResult<bool> {
    Ok(match value {
        Value::Boolean(b) => *b,
        Value::Simple(s) => !s.is_empty(),
        Value::Lang(s, _) => !s.is_empty(),
        Value::Numeric(Numeric::Integer(i)) => i.as_i64() != 0,
        Value::Numeric(Numeric::Decimal(d)) => !d.is_zero(),
        Value::Numeric(Numeric::Float(f)) => !f.is_nan() && f.as_inner() != 0.0,
        Value::Numeric(Numeric::Double(d)) => !d.is_nan() && d.as_inner() != 0.0,
        Value::Iri(_) | Value::BlankNode(_) | Value::DateTime(_) | Value::OtherTyped(..) => {
            return Err(EngineError::evaluation("value has no effective boolean value"))
        }
    })
}

fn build_regex(pattern: &str, flags: &str) -> EngineResult<Regex> {
    let mut builder = regex::RegexBuilder::new(pattern);
    builder.case_insensitive(flags.contains('i'));
    builder.dot_matches_new_line(flags.contains('s'));
    builder.multi_line(flags.contains('m'));
    builder
        .build()
        .map_err(|e| EngineError::evaluation(format!("invalid regular expression: {e}")))
}

fn percent_encode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

fn format_day_time_duration(minutes: i16) -> String {
    if minutes == 0 {
        return "PT0S".to_owned();
    }
    let sign = if minutes < 0 { "-" } else { "" };
    let abs = minutes.unsigned_abs();
    format!("{sign}PT{}H{}M", abs / 60, abs % 60)
}

fn random_uuid(rng: &RefCell<StdRng>) -> String {
    let bytes: [u8; 16] = rng.borrow_mut().gen();
    let mut s = String::with_capacity(36);
    for (i, b) in bytes.iter().enumerate() {
        if [4, 6, 8, 10].contains(&i) {
            s.push('-');
        }
        s.push_str(&format!("{b:02x}"));
    }
    s
}

fn hash_hex<D: sha2::Digest>(input: &str) -> String {
    hex::encode(D::digest(input.as_bytes()))
}

/// A stand-in name so `hash_hex::<md5::Md5>` resolves to the `md-5` crate,
/// whose library name (`md_5`) cannot itself be written as a type path
/// segment.
mod md5 {
    pub use md_5::Md5;
}

#[cfg(test)]
mod tests {
    use super::*;
    use spargebra::algebra::{TermKind, TermRef};
    use spargebra::PrologueDecl;
    use std::ops::Range;

    fn term_ref(range: Range<usize>, kind: TermKind) -> TermRef<'static> {
        TermRef::new(range, kind)
    }

    #[test]
    fn ebv_of_empty_string_is_false() {
        assert_eq!(effective_boolean_value(&Value::Simple(String::new())).unwrap(), false);
    }

    #[test]
    fn ebv_of_zero_integer_is_false() {
        let v = Value::Numeric(Numeric::Integer(Integer::new(0)));
        assert_eq!(effective_boolean_value(&v).unwrap(), false);
    }

    #[test]
    fn ebv_of_iri_is_type_error() {
        assert!(effective_boolean_value(&Value::Iri("http://e/".into())).is_err());
    }

    #[test]
    fn numeric_add_promotes_to_double() {
        let result = numeric_op(
            Numeric::Integer(Integer::new(2)),
            Numeric::Double(Double::new(1.5)),
            Op::Add,
        )
        .unwrap();
        assert_eq!(result, Numeric::Double(Double::new(3.5)));
    }

    #[test]
    fn lang_matches_wildcard_requires_nonempty() {
        assert!(lang_matches("en", "*"));
        assert!(!lang_matches("", "*"));
    }

    #[test]
    fn lang_matches_prefix_range() {
        assert!(lang_matches("en-us", "en"));
        assert!(!lang_matches("fr", "en"));
    }

    #[test]
    fn unused_helpers_reference_prologue_and_term_ref() {
        // Keeps the helper imports exercised without depending on a full
        // parsed query in this unit test file.
        let _ = Prologue::new(PrologueDecl::default()).unwrap();
        let _ = term_ref(0..1, TermKind::Variable);
    }
}
