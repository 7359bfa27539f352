//! Builds the join chain that replaces an eligible FLWR.
//!
//! Each group becomes a subquery returning one `<tuple>` per group tuple,
//! with a field per variable and a field per key operand. Subqueries are
//! chained left-deep in group order and a final FLWR over the chain projects
//! the original return clause onto the tuple fields.
use super::equality::{Classified, CrossEquality, Endpoint};
use super::forest::Forest;
use super::validate::yields_attributes;
use super::{Phase, Rejection};
use crate::ast::{Axis, Binding, Cond, Flwr, Join, RelPath, Xq};
use smallvec::SmallVec;
use std::collections::HashSet;

/// Element name of subquery results and join outputs.
const TUPLE: &str = "tuple";
/// Key field name when the operand path does not end in a tag.
const KEY: &str = "key";

type Tags = SmallVec<[String; 4]>;

/// Allocator for field and variable names that must not collide.
#[derive(Debug, Default)]
struct Names {
    used: HashSet<String>,
}

impl Names {
    fn fresh(&mut self, base: &str) -> String {
        if self.used.insert(base.to_owned()) {
            return base.to_owned();
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}_{n}");
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

/// Key fields of every group, allocated while the joins are planned.
struct Keys {
    names: Names,
    fields: Vec<Vec<(Xq, String)>>,
}

impl Keys {
    fn tag(&mut self, endpoint: &Endpoint) -> Result<String, Rejection> {
        if let Xq::Variable(var) = &endpoint.expr {
            // the variable field doubles as the key
            return Ok(var.clone());
        }
        if yields_attributes(&endpoint.expr) {
            return Err(Rejection { phase: Phase::Optimize, reason: "join key selects attributes" });
        }
        let fields = &mut self.fields[endpoint.group];
        if let Some((_, tag)) = fields.iter().find(|(expr, _)| *expr == endpoint.expr) {
            return Ok(tag.clone());
        }
        let base = match &endpoint.expr {
            Xq::Children(_, path) | Xq::DescendantOrSelf(_, path) => path.last_tag().unwrap_or(KEY),
            _ => KEY,
        };
        let tag = self.names.fresh(base);
        fields.push((endpoint.expr.clone(), tag.clone()));
        Ok(tag)
    }
}

pub(crate) fn assemble(flwr: &Flwr, forest: &Forest, classified: Classified) -> Result<Xq, Rejection> {
    let Classified { free, restrictions, local, cross } = classified;
    let mut names = Names::default();
    collect_names(flwr, &mut names.used);
    let mut keys = Keys { names, fields: vec![Vec::new(); forest.len()] };

    let (steps, leftovers) = plan_joins(forest.len(), cross, &mut keys)?;
    if !leftovers.is_empty() {
        tracing::debug!(count = leftovers.len(), "equalities kept after the join");
    }

    let mut subqueries = Vec::with_capacity(forest.len());
    for group in 0..forest.len() {
        let condition = Cond::conjunction(
            free.iter().chain(&restrictions[group]).chain(&local[group]).cloned(),
        );
        let bindings: Vec<Binding> = forest.members(group).map(|i| flwr.bindings[i].clone()).collect();
        subqueries.push(group_query(bindings, condition, &keys.fields[group])?);
    }

    let mut subqueries = subqueries.into_iter();
    let first = subqueries.next().ok_or(Rejection { phase: Phase::Optimize, reason: "no groups" })?;
    let chain = subqueries.zip(steps).fold(first, |acc, (right, (left_tags, right_tags))| {
        Xq::Join(Box::new(Join {
            left: acc,
            right,
            left_tags: left_tags.into_vec(),
            right_tags: right_tags.into_vec(),
        }))
    });

    let tuple = keys.names.fresh(TUPLE);
    let vars: HashSet<&str> = flwr.bindings.iter().map(|b| b.var.as_str()).collect();
    let projection = Projection { tuple: &tuple, vars: &vars };
    let condition = leftovers
        .iter()
        .map(|eq| projection.cond(&eq.source))
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(groups = forest.len(), "flwr rewritten into joins");
    Ok(Xq::Flwr(Box::new(Flwr {
        bindings: vec![Binding::new(tuple.as_str(), chain)],
        lets: Vec::new(),
        condition: Cond::conjunction(condition),
        result: projection.xq(&flwr.result),
    })))
}

/// Positional key tags for joining each group after the first, and the
/// equalities no join consumed.
fn plan_joins(
    groups: usize,
    mut cross: Vec<CrossEquality>,
    keys: &mut Keys,
) -> Result<(Vec<(Tags, Tags)>, Vec<CrossEquality>), Rejection> {
    let mut steps = Vec::with_capacity(groups.saturating_sub(1));
    for group in 1..groups {
        let mut left = Tags::new();
        let mut right = Tags::new();
        let mut remaining = Vec::with_capacity(cross.len());
        for equality in cross {
            match equality.orient(group) {
                Some((joined, new)) => {
                    left.push(keys.tag(joined)?);
                    right.push(keys.tag(new)?);
                }
                None => remaining.push(equality),
            }
        }
        cross = remaining;
        steps.push((left, right));
    }
    Ok((steps, cross))
}

fn group_query(
    bindings: Vec<Binding>,
    condition: Option<Cond>,
    keys: &[(Xq, String)],
) -> Result<Xq, Rejection> {
    let fields = bindings
        .iter()
        .map(|b| Xq::tag(b.var.as_str(), Xq::var(b.var.as_str())))
        .chain(keys.iter().map(|(expr, tag)| Xq::tag(tag.as_str(), expr.clone())));
    let body = Xq::sequence(fields).ok_or(Rejection { phase: Phase::Optimize, reason: "empty group" })?;
    Ok(Xq::Flwr(Box::new(Flwr { bindings, lets: Vec::new(), condition, result: Xq::tag(TUPLE, body) })))
}

/// Rewrites references to the FLWR's variables as `$tuple/v/*`.
struct Projection<'a> {
    tuple: &'a str,
    vars: &'a HashSet<&'a str>,
}

impl Projection<'_> {
    fn xq(&self, query: &Xq) -> Xq {
        match query {
            Xq::Variable(name) if self.vars.contains(name.as_str()) => Xq::Children(
                Box::new(Xq::var(self.tuple)),
                RelPath::tag(name.as_str()).step(Axis::Child, RelPath::Wildcard),
            ),
            Xq::Parentheses(inner) => Xq::Parentheses(Box::new(self.xq(inner))),
            Xq::Pair(a, b) => Xq::pair(self.xq(a), self.xq(b)),
            Xq::Children(base, path) => Xq::Children(Box::new(self.xq(base)), path.clone()),
            Xq::DescendantOrSelf(base, path) => Xq::DescendantOrSelf(Box::new(self.xq(base)), path.clone()),
            Xq::Tag(name, body) => Xq::tag(name.as_str(), self.xq(body)),
            other => other.clone(),
        }
    }

    /// Leftover equalities only ever hold value equalities over operands
    /// that passed the where check.
    fn cond(&self, cond: &Cond) -> Result<Cond, Rejection> {
        let Cond::ValueEq(a, b) = cond else {
            return Err(Rejection { phase: Phase::RewriteReturn, reason: "unexpected leftover condition" });
        };
        if walks_to_parent(a) || walks_to_parent(b) {
            return Err(Rejection {
                phase: Phase::RewriteReturn,
                reason: "leftover equality walks to a parent",
            });
        }
        Ok(Cond::ValueEq(self.xq(a), self.xq(b)))
    }
}

fn walks_to_parent(query: &Xq) -> bool {
    match query {
        Xq::Children(base, path) | Xq::DescendantOrSelf(base, path) => {
            path.uses_parent() || walks_to_parent(base)
        }
        Xq::Parentheses(inner) => walks_to_parent(inner),
        _ => false,
    }
}

fn collect_names(flwr: &Flwr, out: &mut HashSet<String>) {
    for binding in &flwr.bindings {
        out.insert(binding.var.clone());
        collect_xq(&binding.source, out);
    }
    if let Some(cond) = &flwr.condition {
        collect_cond(cond, out);
    }
    collect_xq(&flwr.result, out);
}

fn collect_xq(query: &Xq, out: &mut HashSet<String>) {
    match query {
        Xq::Variable(name) => {
            out.insert(name.clone());
        }
        Xq::Constant(_) | Xq::AbsolutePath(_) => {}
        Xq::Parentheses(inner)
        | Xq::Children(inner, _)
        | Xq::DescendantOrSelf(inner, _)
        | Xq::Tag(_, inner) => collect_xq(inner, out),
        Xq::Pair(a, b) => {
            collect_xq(a, out);
            collect_xq(b, out);
        }
        Xq::Join(join) => {
            collect_xq(&join.left, out);
            collect_xq(&join.right, out);
        }
        Xq::Let(bindings, body) => {
            for binding in bindings {
                out.insert(binding.var.clone());
                collect_xq(&binding.source, out);
            }
            collect_xq(body, out);
        }
        Xq::Flwr(flwr) => {
            for binding in flwr.bindings.iter().chain(&flwr.lets) {
                out.insert(binding.var.clone());
                collect_xq(&binding.source, out);
            }
            if let Some(cond) = &flwr.condition {
                collect_cond(cond, out);
            }
            collect_xq(&flwr.result, out);
        }
    }
}

fn collect_cond(cond: &Cond, out: &mut HashSet<String>) {
    match cond {
        Cond::ValueEq(a, b) | Cond::IdentityEq(a, b) => {
            collect_xq(a, out);
            collect_xq(b, out);
        }
        Cond::Empty(query) => collect_xq(query, out),
        Cond::Some(bindings, body) => {
            for binding in bindings {
                out.insert(binding.var.clone());
                collect_xq(&binding.source, out);
            }
            collect_cond(body, out);
        }
        Cond::Parentheses(inner) | Cond::Not(inner) => collect_cond(inner, out),
        Cond::And(a, b) | Cond::Or(a, b) => {
            collect_cond(a, out);
            collect_cond(b, out);
        }
    }
}
