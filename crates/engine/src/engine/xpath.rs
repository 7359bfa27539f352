use super::distinct;
use crate::ast::{Axis, Filter, RelPath};
use crate::model::{Node, NodeKind};
use std::collections::HashSet;

/// Applies `axis` + `path` to a context sequence, as in `ctx/path` or
/// `ctx//path`. The result is duplicate-free.
pub fn evaluate_step(axis: Axis, context: &[Node], path: &RelPath) -> Vec<Node> {
    match axis {
        Axis::Child => distinct(evaluate_relative(path, context)),
        Axis::DescendantOrSelf => {
            let expanded = distinct(context.iter().flat_map(Node::descendants_or_self).collect());
            distinct(evaluate_relative(path, &expanded))
        }
    }
}

/// Evaluates a relative path with `context` as the set of context nodes.
pub fn evaluate_relative(path: &RelPath, context: &[Node]) -> Vec<Node> {
    match path {
        RelPath::Tag(name) => context
            .iter()
            .flat_map(Node::children)
            .filter(|child| child.is_element_named(name))
            .collect(),
        RelPath::Wildcard => context.iter().flat_map(Node::children).collect(),
        RelPath::Current => context.to_vec(),
        RelPath::Parent => distinct(context.iter().filter_map(Node::parent).collect()),
        RelPath::Text => context
            .iter()
            .flat_map(Node::children)
            .filter(|child| child.kind() == NodeKind::Text)
            .collect(),
        RelPath::Attribute(name) => context.iter().filter_map(|n| n.attribute(name)).collect(),
        RelPath::Parentheses(inner) => evaluate_relative(inner, context),
        RelPath::Children(left, right) => {
            let base = evaluate_relative(left, context);
            evaluate_step(Axis::Child, &base, right)
        }
        RelPath::DescendantOrSelf(left, right) => {
            let base = evaluate_relative(left, context);
            evaluate_step(Axis::DescendantOrSelf, &base, right)
        }
        RelPath::Filter(inner, filter) => evaluate_relative(inner, context)
            .into_iter()
            .filter(|node| filter_holds(filter, node))
            .collect(),
        RelPath::Pair(left, right) => {
            let mut out = evaluate_relative(left, context);
            out.extend(evaluate_relative(right, context));
            out
        }
    }
}

/// Truth value of a filter with `node` as the sole context node.
pub fn filter_holds(filter: &Filter, node: &Node) -> bool {
    let context = std::slice::from_ref(node);
    match filter {
        Filter::Path(path) => !evaluate_relative(path, context).is_empty(),
        Filter::ValueEq(left, right) => {
            let left = evaluate_relative(left, context);
            let right = evaluate_relative(right, context);
            any_value_equal(&left, &right)
        }
        Filter::IdentityEq(left, right) => {
            let left = evaluate_relative(left, context);
            let right: HashSet<Node> = evaluate_relative(right, context).into_iter().collect();
            left.iter().any(|n| right.contains(n))
        }
        Filter::ConstantEq(path, value) => {
            evaluate_relative(path, context).iter().any(|n| n.string_value() == *value)
        }
        Filter::Parentheses(inner) => filter_holds(inner, node),
        Filter::And(a, b) => filter_holds(a, node) && filter_holds(b, node),
        Filter::Or(a, b) => filter_holds(a, node) || filter_holds(b, node),
        Filter::Not(inner) => !filter_holds(inner, node),
    }
}

/// True when some node of `left` is value-equal to some node of `right`.
pub(crate) fn any_value_equal(left: &[Node], right: &[Node]) -> bool {
    if left.is_empty() || right.is_empty() {
        return false;
    }
    let keys: HashSet<String> = right.iter().map(Node::value_key).collect();
    left.iter().any(|n| keys.contains(&n.value_key()))
}
