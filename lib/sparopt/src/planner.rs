//! Join reordering and filter pushdown (spec.md §4.7, steps 2–4).
//!
//! A group's pattern list is split into maximal runs of `Triple`/`Path`/
//! `Filter` nodes, separated by "barrier" nodes (`Bind`, `Values`,
//! `Optional`, `Minus`, `Union`, `Graph`, `Service`, `SubSelect`) that are
//! never reordered or moved across. Within each run, scans are sorted by
//! ascending estimated cardinality (ties broken by variables shared with
//! already-placed scans) and filters are slid to the earliest scan after
//! which every variable they reference is bound. A filter whose expression
//! contains `EXISTS`/`NOT EXISTS` or an aggregate is conservatively treated
//! as needing every variable in the run, which leaves it exactly where the
//! unoptimized executor already puts it: at the far end of the run.

use rustc_hash::FxHashSet;
use spareval::{resolve_term, AtomId, AtomTable, Statistics};
use spargebra::algebra::{
    ExprId, ExprNode, Group, PathId, PathNode, PatternNode, PredicateRef, Query, TermKind,
    TermRef, TriplePattern, Update,
};
use spargebra::Prologue;

/// Returns a `Query` with every group's pattern list reordered. `query`'s
/// arena indices (`GroupId`/`PathId`/`ExprId`/`SubSelectId`) are untouched,
/// so sub-SELECTs and nested groups keep referring to the same slots.
pub fn optimize_query(
    query: &Query,
    source: &str,
    prologue: &Prologue,
    atoms: &AtomTable,
    stats: &Statistics,
) -> Query {
    let mut optimized = query.clone();
    let exprs = optimized.exprs.clone();
    let paths = optimized.paths.clone();
    let ctx = PlanContext {
        source,
        prologue,
        atoms,
        stats,
        exprs: &exprs,
        paths: &paths,
    };
    for group in &mut optimized.groups {
        reorder_group(group, &ctx);
    }
    optimized
}

/// Same as [`optimize_query`] but for `UPDATE`'s `DELETE/INSERT WHERE`
/// clauses; `LOAD`/`CLEAR`/`DROP`/`INSERT DATA`/`DELETE DATA` carry no
/// pattern to plan and pass through unchanged.
pub fn optimize_update(
    update: &Update,
    source: &str,
    prologue: &Prologue,
    atoms: &AtomTable,
    stats: &Statistics,
) -> Update {
    let mut optimized = update.clone();
    let exprs = optimized.exprs.clone();
    let paths = optimized.paths.clone();
    let ctx = PlanContext {
        source,
        prologue,
        atoms,
        stats,
        exprs: &exprs,
        paths: &paths,
    };
    for group in &mut optimized.groups {
        reorder_group(group, &ctx);
    }
    optimized
}

struct PlanContext<'a> {
    source: &'a str,
    prologue: &'a Prologue,
    atoms: &'a AtomTable,
    stats: &'a Statistics,
    exprs: &'a [ExprNode],
    paths: &'a [PathNode],
}

/// A `Triple`/`Path` node pulled out of a run, ready to be sorted.
struct ScanItem {
    orig_idx: usize,
    vars: FxHashSet<String>,
    cardinality: f64,
}

/// A `Filter` node pulled out of a run. `needed` is `None` when the filter
/// must stay at the end of the run (EXISTS/aggregate inside it).
struct FilterItem {
    orig_idx: usize,
    needed: Option<FxHashSet<String>>,
}

fn is_barrier(node: &PatternNode) -> bool {
    !matches!(node, PatternNode::Triple { .. } | PatternNode::Path { .. } | PatternNode::Filter(_))
}

fn reorder_group(group: &mut Group, ctx: &PlanContext) {
    let mut result = Vec::with_capacity(group.len());
    let mut run_start = 0;
    while run_start < group.len() {
        if is_barrier(&group[run_start]) {
            result.push(group[run_start].clone());
            run_start += 1;
            continue;
        }
        let mut run_end = run_start;
        while run_end < group.len() && !is_barrier(&group[run_end]) {
            run_end += 1;
        }
        result.extend(plan_run(&group[run_start..run_end], ctx));
        run_start = run_end;
    }
    *group = result;
}

fn plan_run(run: &[PatternNode], ctx: &PlanContext) -> Vec<PatternNode> {
    let mut scans = Vec::new();
    let mut filters = Vec::new();
    for (i, node) in run.iter().enumerate() {
        match node {
            PatternNode::Triple { pattern, .. } => scans.push(ScanItem {
                orig_idx: i,
                vars: triple_vars(pattern, ctx.source),
                cardinality: estimate_triple(pattern, ctx),
            }),
            PatternNode::Path { subject, path, object, .. } => scans.push(ScanItem {
                orig_idx: i,
                vars: path_vars(*subject, *object, ctx.source),
                cardinality: estimate_path(*subject, *path, *object, ctx),
            }),
            PatternNode::Filter(expr) => filters.push(FilterItem {
                orig_idx: i,
                needed: expr_vars(ctx.exprs, *expr, ctx.source),
            }),
            _ => unreachable!("barriers are split off by reorder_group"),
        }
    }

    let new_order = greedy_order(scans);

    // `bound_after[k]` = union of variables bound by the first `k` scans of
    // `new_order`.
    let mut bound_after: Vec<FxHashSet<String>> = Vec::with_capacity(new_order.len() + 1);
    bound_after.push(FxHashSet::default());
    for item in &new_order {
        let mut next = bound_after.last().unwrap().clone();
        next.extend(item.vars.iter().cloned());
        bound_after.push(next);
    }

    // Slot `k` (0..=new_order.len()) holds the filters placed right after
    // the first `k` scans, in their original relative order.
    let mut filter_slots: Vec<Vec<usize>> = vec![Vec::new(); new_order.len() + 1];
    for filter in &filters {
        let slot = match &filter.needed {
            None => new_order.len(),
            Some(needed) => bound_after
                .iter()
                .position(|bound| needed.is_subset(bound))
                .unwrap_or(new_order.len()),
        };
        filter_slots[slot].push(filter.orig_idx);
    }

    let mut out = Vec::with_capacity(run.len());
    for idx in &filter_slots[0] {
        out.push(run[*idx].clone());
    }
    for (k, scan) in new_order.iter().enumerate() {
        out.push(run[scan.orig_idx].clone());
        for idx in &filter_slots[k + 1] {
            out.push(run[*idx].clone());
        }
    }
    out
}

/// Greedily picks, at each step, the unplaced scan with the lowest estimated
/// cardinality; ties are broken toward the scan sharing the most variables
/// with whatever has already been placed (spec.md §4.7 step 2).
fn greedy_order(mut remaining: Vec<ScanItem>) -> Vec<ScanItem> {
    let mut placed_vars: FxHashSet<String> = FxHashSet::default();
    let mut order = Vec::with_capacity(remaining.len());
    while !remaining.is_empty() {
        let mut best = 0;
        let mut best_shared = remaining[0].vars.intersection(&placed_vars).count();
        for i in 1..remaining.len() {
            let shared = remaining[i].vars.intersection(&placed_vars).count();
            let better = remaining[i].cardinality < remaining[best].cardinality
                || (remaining[i].cardinality == remaining[best].cardinality && shared > best_shared);
            if better {
                best = i;
                best_shared = shared;
            }
        }
        let item = remaining.remove(best);
        placed_vars.extend(item.vars.iter().cloned());
        order.push(item);
    }
    order
}

fn triple_vars(pattern: &TriplePattern, source: &str) -> FxHashSet<String> {
    let mut out = FxHashSet::default();
    push_var(pattern.subject, source, &mut out);
    push_var(pattern.object, source, &mut out);
    if let PredicateRef::Term(t) = pattern.predicate {
        push_var(t, source, &mut out);
    }
    out
}

fn path_vars(subject: TermRef, object: TermRef, source: &str) -> FxHashSet<String> {
    let mut out = FxHashSet::default();
    push_var(subject, source, &mut out);
    push_var(object, source, &mut out);
    out
}

fn push_var(term: TermRef, source: &str, out: &mut FxHashSet<String>) {
    if term.kind == TermKind::Variable {
        out.insert(term.text(source).to_owned());
    }
}

/// `None` means the expression contains `EXISTS`/`NOT EXISTS` or an
/// aggregate and is conservatively treated as needing every bound variable
/// in the run (see module docs).
fn expr_vars(exprs: &[ExprNode], id: ExprId, source: &str) -> Option<FxHashSet<String>> {
    let mut out = FxHashSet::default();
    if collect_expr_vars(exprs, id, source, &mut out) {
        None
    } else {
        Some(out)
    }
}

/// Returns `true` if the walk hit an `EXISTS` or `Aggregate` node.
fn collect_expr_vars(exprs: &[ExprNode], id: ExprId, source: &str, out: &mut FxHashSet<String>) -> bool {
    match &exprs[id as usize] {
        ExprNode::Term(t) => {
            push_var(*t, source, out);
            false
        }
        ExprNode::FunctionCall { args, .. } => {
            let mut bail = false;
            for arg in args {
                bail |= collect_expr_vars(exprs, *arg, source, out);
            }
            bail
        }
        ExprNode::Exists { .. } => true,
        ExprNode::Aggregate { arg, .. } => {
            if let Some(arg) = arg {
                collect_expr_vars(exprs, *arg, source, out);
            }
            true
        }
    }
}

fn term_atom(term: TermRef, ctx: &PlanContext) -> Option<AtomId> {
    if term.kind == TermKind::Variable {
        return None;
    }
    resolve_term(term, ctx.source, ctx.prologue)
        .ok()
        .and_then(|t| ctx.atoms.try_lookup(&t))
}

fn estimate_triple(pattern: &TriplePattern, ctx: &PlanContext) -> f64 {
    let s = term_atom(pattern.subject, ctx);
    let o = term_atom(pattern.object, ctx);
    let p = match pattern.predicate {
        PredicateRef::Term(t) => term_atom(t, ctx),
        PredicateRef::Path(_) => None,
    };
    ctx.stats.estimate_triple_cardinality(s, p, o)
}

/// Property paths are a reachability closure, not a single index scan, so
/// this is a heuristic rather than a true cardinality: it estimates as if
/// the path were its first `Iri` step, which is accurate for the common
/// single-predicate case (`foaf:knows+`) and only loses precision for
/// compound paths, which still get a usable (if coarser) ordering signal.
fn estimate_path(subject: TermRef, path: PathId, object: TermRef, ctx: &PlanContext) -> f64 {
    let s = term_atom(subject, ctx);
    let o = term_atom(object, ctx);
    let p = match &ctx.paths[path as usize] {
        PathNode::Iri(t) => term_atom(*t, ctx),
        _ => None,
    };
    ctx.stats.estimate_triple_cardinality(s, p, o)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxrdf::{GraphName, Literal, NamedNode, Quad};
    use spareval::QuadStore;
    use spargebra::parse_query;

    fn store_with(triples: &[(&str, &str, &str)]) -> QuadStore {
        let store = QuadStore::new();
        let quads: Vec<Quad> = triples
            .iter()
            .map(|(s, p, o)| {
                Quad::new(
                    NamedNode::new(*s).unwrap(),
                    NamedNode::new(*p).unwrap(),
                    Literal::new_simple_literal(*o),
                    GraphName::DefaultGraph,
                )
            })
            .collect();
        store.apply(&quads, &[]).unwrap();
        store
    }

    #[test]
    fn cheaper_predicate_scan_moves_first() {
        // <p1> has a single match, <p2> has two: the plan should place the
        // `?x <p1> ?y` pattern first regardless of source order.
        let store = store_with(&[
            ("http://e/s1", "http://e/p2", "a"),
            ("http://e/s2", "http://e/p2", "b"),
            ("http://e/s3", "http://e/p1", "c"),
        ]);
        let parsed =
            parse_query("SELECT * WHERE { ?x <http://e/p2> ?y . ?x <http://e/p1> ?z }").unwrap();
        let stats = store.statistics();
        let optimized =
            optimize_query(&parsed.query, &parsed.source, &parsed.prologue, store.atoms(), &stats);
        let spargebra::algebra::QueryForm::Select(select) = &optimized.form else {
            panic!("expected SELECT");
        };
        let group = optimized.group(select.pattern);
        let PatternNode::Triple { pattern, .. } = &group[0] else {
            panic!("expected a triple pattern first");
        };
        let PredicateRef::Term(pred) = pattern.predicate else {
            panic!("expected a constant predicate");
        };
        assert_eq!(pred.text(&parsed.source), "http://e/p1");
    }

    #[test]
    fn filter_moves_before_unrelated_later_pattern() {
        let store = store_with(&[("http://e/s1", "http://e/p1", "a")]);
        let parsed = parse_query(
            "SELECT * WHERE { ?x <http://e/p1> ?y . ?a <http://e/p1> ?b . FILTER(?y = \"a\") }",
        )
        .unwrap();
        let stats = store.statistics();
        let optimized =
            optimize_query(&parsed.query, &parsed.source, &parsed.prologue, store.atoms(), &stats);
        let spargebra::algebra::QueryForm::Select(select) = &optimized.form else {
            panic!("expected SELECT");
        };
        let group = optimized.group(select.pattern);
        // The filter only needs `?y`, bound by the first pattern, so it
        // should sit right after it rather than after both patterns.
        assert!(matches!(group[1], PatternNode::Filter(_)));
    }
}
