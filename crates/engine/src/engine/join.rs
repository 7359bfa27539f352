//! Equi-join of two tuple sequences.
//!
//! Each input item is a tuple element whose children are tagged fields. For
//! key tag `k`, the key of a tuple is the set of serialized components of
//! its `k` children; two tuples match on `k` when those sets intersect. The
//! right input is indexed on the first key pair and the remaining pairs are
//! verified per candidate, so the output keeps nested-loop order (left major,
//! right minor).
use super::{Env, Evaluator};
use crate::ast::Join;
use crate::model::Node;
use crate::runtime::{Error, Result};
use smallvec::SmallVec;
use std::collections::{HashMap, HashSet};

const TUPLE_TAG: &str = "tuple";

type KeySet = HashSet<String>;
type TupleKeys = SmallVec<[KeySet; 4]>;

impl Evaluator<'_> {
    pub(crate) fn evaluate_join(&self, join: &Join, env: Env<'_>) -> Result<Vec<Node>> {
        if join.left_tags.len() != join.right_tags.len() {
            return Err(Error::JoinArity { left: join.left_tags.len(), right: join.right_tags.len() });
        }
        let left = self.evaluate(&join.left, env)?;
        let right = self.evaluate(&join.right, env)?;
        let matches = match_tuples(&left, &right, &join.left_tags, &join.right_tags);
        tracing::debug!(
            left = left.len(),
            right = right.len(),
            output = matches.len(),
            keys = join.left_tags.len(),
            "join evaluated"
        );
        Ok(matches
            .into_iter()
            .map(|(l, r)| {
                let mut fields = left[l].children();
                fields.extend(right[r].children());
                self.arena().create_element(TUPLE_TAG, &fields)
            })
            .collect())
    }
}

fn keys_of(tuple: &Node, tags: &[String]) -> TupleKeys {
    tags.iter()
        .map(|tag| {
            tuple
                .children()
                .iter()
                .filter(|field| field.is_element_named(tag))
                .flat_map(|field| field.attributes().into_iter().chain(field.children()))
                .map(|component| component.value_key())
                .collect()
        })
        .collect()
}

/// Index pairs `(left, right)` of matching tuples in nested-loop order.
pub(crate) fn match_tuples(
    left: &[Node],
    right: &[Node],
    left_tags: &[String],
    right_tags: &[String],
) -> Vec<(usize, usize)> {
    if left_tags.is_empty() {
        return (0..left.len()).flat_map(|l| (0..right.len()).map(move |r| (l, r))).collect();
    }

    let right_keys: Vec<TupleKeys> = right.iter().map(|t| keys_of(t, right_tags)).collect();
    let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
    for (position, keys) in right_keys.iter().enumerate() {
        for key in &keys[0] {
            index.entry(key.as_str()).or_default().push(position);
        }
    }

    let mut out = Vec::new();
    for (l, tuple) in left.iter().enumerate() {
        let left_keys = keys_of(tuple, left_tags);
        let mut candidates: Vec<usize> = left_keys[0]
            .iter()
            .filter_map(|key| index.get(key.as_str()))
            .flatten()
            .copied()
            .collect();
        candidates.sort_unstable();
        candidates.dedup();
        for r in candidates {
            let verified = left_keys
                .iter()
                .zip(&right_keys[r])
                .skip(1)
                .all(|(lk, rk)| !lk.is_disjoint(rk));
            if verified {
                out.push((l, r));
            }
        }
    }
    out
}
