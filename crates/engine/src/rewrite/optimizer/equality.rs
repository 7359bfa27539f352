//! Classification of where-clause equalities against the dependency forest.
use super::forest::Forest;
use crate::ast::{Cond, Xq};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Operand {
    /// A `for` variable of the FLWR or a path off one; `owner` is the index
    /// of its binding.
    Var { owner: usize, expr: Xq },
    Constant(String),
}

/// One `a = b` conjunct of an eligible where clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Equality {
    pub left: Operand,
    pub right: Operand,
    pub source: Cond,
}

/// Operand of a cross-group equality, located by group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    pub group: usize,
    pub expr: Xq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CrossEquality {
    pub left: Endpoint,
    pub right: Endpoint,
    pub source: Cond,
}

impl CrossEquality {
    /// `(joined side, new side)` when this equality links `group` to a group
    /// that precedes it.
    pub(crate) fn orient(&self, group: usize) -> Option<(&Endpoint, &Endpoint)> {
        if self.right.group == group && self.left.group < group {
            Some((&self.left, &self.right))
        } else if self.left.group == group && self.right.group < group {
            Some((&self.right, &self.left))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Classified {
    /// Constant against constant; independent of every tuple.
    pub free: Vec<Cond>,
    /// Per group, variable against constant.
    pub restrictions: Vec<Vec<Cond>>,
    /// Per group, variable against variable inside the group.
    pub local: Vec<Vec<Cond>>,
    /// Variable against variable across groups, in where order.
    pub cross: Vec<CrossEquality>,
}

pub(crate) fn classify(equalities: Vec<Equality>, forest: &Forest) -> Classified {
    let mut out = Classified {
        restrictions: vec![Vec::new(); forest.len()],
        local: vec![Vec::new(); forest.len()],
        ..Classified::default()
    };
    for equality in equalities {
        match (equality.left, equality.right) {
            (Operand::Constant(_), Operand::Constant(_)) => out.free.push(equality.source),
            (Operand::Var { owner, .. }, Operand::Constant(_))
            | (Operand::Constant(_), Operand::Var { owner, .. }) => {
                out.restrictions[forest.group_of(owner)].push(equality.source);
            }
            (Operand::Var { owner: a, expr: left }, Operand::Var { owner: b, expr: right }) => {
                let (ga, gb) = (forest.group_of(a), forest.group_of(b));
                if ga == gb {
                    out.local[ga].push(equality.source);
                } else {
                    out.cross.push(CrossEquality {
                        left: Endpoint { group: ga, expr: left },
                        right: Endpoint { group: gb, expr: right },
                        source: equality.source,
                    });
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Flwr;
    use crate::parser::parse_xquery;
    use crate::rewrite::optimizer::validate::{check_for, check_where};
    use rstest::rstest;

    fn classified(src: &str) -> Classified {
        let Xq::Flwr(flwr) = parse_xquery(src).unwrap() else { panic!("expected flwr") };
        let flwr: Flwr = *flwr;
        let forest = Forest::build(&check_for(&flwr).unwrap());
        classify(check_where(&flwr).unwrap(), &forest)
    }

    #[rstest]
    fn conjuncts_land_in_their_buckets() {
        let c = classified(
            r#"for $a in doc("f")/a, $b in $a/b, $c in doc("g")/c
               where $a/k = $c/j and $b = "1" and "x" = "x" and $a/k = $b/k and $c/j = $b/m
               return $a"#,
        );
        assert_eq!(c.free.len(), 1);
        assert_eq!(c.restrictions.iter().map(Vec::len).collect::<Vec<_>>(), vec![1, 0]);
        assert_eq!(c.local.iter().map(Vec::len).collect::<Vec<_>>(), vec![1, 0]);
        assert_eq!(c.cross.len(), 2);
        assert_eq!((c.cross[1].left.group, c.cross[1].right.group), (1, 0));
    }

    #[rstest]
    fn orientation_puts_the_joined_side_first() {
        let c = classified(r#"for $a in doc("f")/a, $c in doc("g")/c where $c/j = $a/k return $a"#);
        let (joined, new) = c.cross[0].orient(1).unwrap();
        assert_eq!((joined.group, new.group), (0, 1));
        assert!(c.cross[0].orient(0).is_none());
    }
}
