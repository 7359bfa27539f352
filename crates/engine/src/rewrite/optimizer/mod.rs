//! Rewrites FLWR expressions over independent sources into explicit joins.
//!
//! Every FLWR of the query is tried; one that fails a check is left as it was
//! and its sub-expressions are searched instead. The input is expected to be
//! renamed so that no two bindings share a name.
mod assemble;
mod equality;
mod forest;
mod validate;

use crate::ast::{Binding, Cond, Flwr, Join, Xq};

/// Progress of one FLWR through the rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Initial,
    CheckFor,
    CheckWhere,
    CheckReturn,
    Optimize,
    RewriteReturn,
    Done,
    PassThrough,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Initial => "initial",
            Phase::CheckFor => "check-for",
            Phase::CheckWhere => "check-where",
            Phase::CheckReturn => "check-return",
            Phase::Optimize => "optimize",
            Phase::RewriteReturn => "rewrite-return",
            Phase::Done => "done",
            Phase::PassThrough => "pass-through",
        }
    }
}

/// Why a FLWR was left unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    pub phase: Phase,
    pub reason: &'static str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeOutcome {
    pub query: Xq,
    /// Number of FLWR expressions replaced by join chains.
    pub rewritten: usize,
}

/// Optimizes every FLWR of `query`.
pub fn optimize(query: &Xq) -> OptimizeOutcome {
    let mut rewritten = 0;
    let query = xq(query, &mut rewritten);
    OptimizeOutcome { query, rewritten }
}

/// Rewrites a single FLWR, or reports the phase that refused it.
pub fn rewrite_flwr(flwr: &Flwr) -> Result<Xq, Rejection> {
    tracing::trace!(phase = Phase::Initial.as_str(), bindings = flwr.bindings.len(), "trying flwr");
    let parents = validate::check_for(flwr)?;
    let equalities = validate::check_where(flwr)?;
    validate::check_return(&flwr.result)?;
    let forest = forest::plan(&parents)?;
    let classified = equality::classify(equalities, &forest);
    let query = assemble::assemble(flwr, &forest, classified)?;
    tracing::trace!(phase = Phase::Done.as_str(), "flwr rewritten");
    Ok(query)
}

fn xq(query: &Xq, rewritten: &mut usize) -> Xq {
    match query {
        Xq::Variable(_) | Xq::Constant(_) | Xq::AbsolutePath(_) => query.clone(),
        Xq::Parentheses(inner) => Xq::Parentheses(Box::new(xq(inner, rewritten))),
        Xq::Pair(a, b) => Xq::pair(xq(a, rewritten), xq(b, rewritten)),
        Xq::Children(base, path) => Xq::Children(Box::new(xq(base, rewritten)), path.clone()),
        Xq::DescendantOrSelf(base, path) => {
            Xq::DescendantOrSelf(Box::new(xq(base, rewritten)), path.clone())
        }
        Xq::Tag(name, body) => Xq::tag(name.as_str(), xq(body, rewritten)),
        Xq::Join(join) => Xq::Join(Box::new(Join {
            left: xq(&join.left, rewritten),
            right: xq(&join.right, rewritten),
            left_tags: join.left_tags.clone(),
            right_tags: join.right_tags.clone(),
        })),
        Xq::Let(bindings, body) => Xq::Let(self::bindings(bindings, rewritten), Box::new(xq(body, rewritten))),
        Xq::Flwr(flwr) => match rewrite_flwr(flwr) {
            Ok(query) => {
                *rewritten += 1;
                query
            }
            Err(rejection) => {
                tracing::debug!(
                    phase = rejection.phase.as_str(),
                    next = Phase::PassThrough.as_str(),
                    reason = rejection.reason,
                    "flwr left unchanged"
                );
                Xq::Flwr(Box::new(Flwr {
                    bindings: self::bindings(&flwr.bindings, rewritten),
                    lets: self::bindings(&flwr.lets, rewritten),
                    condition: flwr.condition.as_ref().map(|c| cond(c, rewritten)),
                    result: xq(&flwr.result, rewritten),
                }))
            }
        },
    }
}

fn bindings(bindings: &[Binding], rewritten: &mut usize) -> Vec<Binding> {
    bindings.iter().map(|b| Binding::new(b.var.as_str(), xq(&b.source, rewritten))).collect()
}

fn cond(c: &Cond, rewritten: &mut usize) -> Cond {
    match c {
        Cond::ValueEq(a, b) => Cond::ValueEq(xq(a, rewritten), xq(b, rewritten)),
        Cond::IdentityEq(a, b) => Cond::IdentityEq(xq(a, rewritten), xq(b, rewritten)),
        Cond::Empty(query) => Cond::Empty(xq(query, rewritten)),
        Cond::Some(bs, body) => Cond::Some(bindings(bs, rewritten), Box::new(cond(body, rewritten))),
        Cond::Parentheses(inner) => Cond::Parentheses(Box::new(cond(inner, rewritten))),
        Cond::And(a, b) => Cond::And(Box::new(cond(a, rewritten)), Box::new(cond(b, rewritten))),
        Cond::Or(a, b) => Cond::Or(Box::new(cond(a, rewritten)), Box::new(cond(b, rewritten))),
        Cond::Not(inner) => Cond::Not(Box::new(cond(inner, rewritten))),
    }
}
