//! Dependency forest over the `for` bindings of one FLWR.
//!
//! A binding whose source steps off an earlier binding of the same FLWR
//! belongs to that binding's group. Every other binding is a root and opens
//! a new group. Groups are numbered in root order.
use super::{Phase, Rejection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Forest {
    group_of: Vec<usize>,
    groups: usize,
}

impl Forest {
    /// `parents[i]` is the earlier binding that binding `i` depends on.
    pub(crate) fn build(parents: &[Option<usize>]) -> Self {
        let mut group_of = Vec::with_capacity(parents.len());
        let mut groups = 0;
        for parent in parents {
            let group = match parent {
                Some(parent) => group_of[*parent],
                None => {
                    groups += 1;
                    groups - 1
                }
            };
            group_of.push(group);
        }
        Self { group_of, groups }
    }

    pub(crate) fn len(&self) -> usize {
        self.groups
    }

    pub(crate) fn group_of(&self, binding: usize) -> usize {
        self.group_of[binding]
    }

    /// Binding indices of `group` in `for` order.
    pub(crate) fn members(&self, group: usize) -> impl Iterator<Item = usize> + '_ {
        self.group_of.iter().enumerate().filter(move |(_, g)| **g == group).map(|(i, _)| i)
    }

    /// True when every group occupies one run of the `for` list.
    pub(crate) fn is_contiguous(&self) -> bool {
        self.group_of.windows(2).all(|w| w[0] <= w[1])
    }
}

/// Builds the forest and rejects shapes the join rewrite cannot improve or
/// would reorder.
pub(crate) fn plan(parents: &[Option<usize>]) -> Result<Forest, Rejection> {
    let forest = Forest::build(parents);
    if forest.len() < 2 {
        return Err(Rejection { phase: Phase::Optimize, reason: "single source group" });
    }
    if !forest.is_contiguous() {
        return Err(Rejection { phase: Phase::Optimize, reason: "source groups interleave" });
    }
    Ok(forest)
}
