//! Eligibility checks run before a FLWR is rewritten.
use super::equality::{Equality, Operand};
use super::{Phase, Rejection};
use crate::ast::{Cond, Flwr, RelPath, Xq};

type Check<T> = Result<T, Rejection>;

fn reject<T>(phase: Phase, reason: &'static str) -> Check<T> {
    Err(Rejection { phase, reason })
}

/// For each binding, the index of the earlier binding its source steps off,
/// or `None` for a root (document or outer variable).
pub(crate) fn check_for(flwr: &Flwr) -> Check<Vec<Option<usize>>> {
    if !flwr.lets.is_empty() {
        return reject(Phase::CheckFor, "let clause present");
    }
    let mut parents = Vec::with_capacity(flwr.bindings.len());
    for (index, binding) in flwr.bindings.iter().enumerate() {
        let earlier = &flwr.bindings[..index];
        if earlier.iter().any(|b| b.var == binding.var) {
            return reject(Phase::CheckFor, "variable bound twice");
        }
        let parent = match &binding.source {
            Xq::AbsolutePath(ap) => {
                ensure_node_producing(&ap.path)?;
                None
            }
            Xq::Children(base, path) | Xq::DescendantOrSelf(base, path) => {
                let Xq::Variable(var) = base.as_ref() else {
                    return reject(Phase::CheckFor, "source is not a path off a variable");
                };
                ensure_node_producing(path)?;
                earlier.iter().position(|b| b.var == *var)
            }
            _ => return reject(Phase::CheckFor, "unsupported source expression"),
        };
        parents.push(parent);
    }
    Ok(parents)
}

fn ensure_node_producing(path: &RelPath) -> Check<()> {
    if last_steps_allowed(path) {
        Ok(())
    } else {
        reject(Phase::CheckFor, "source may end in an attribute, current or parent step")
    }
}

fn last_steps_allowed(path: &RelPath) -> bool {
    match path {
        RelPath::Tag(_) | RelPath::Wildcard | RelPath::Text => true,
        RelPath::Current | RelPath::Parent | RelPath::Attribute(_) => false,
        RelPath::Children(_, last) | RelPath::DescendantOrSelf(_, last) => last_steps_allowed(last),
        RelPath::Filter(inner, _) | RelPath::Parentheses(inner) => last_steps_allowed(inner),
        RelPath::Pair(a, b) => last_steps_allowed(a) && last_steps_allowed(b),
    }
}

/// Splits the where clause into its value equalities.
pub(crate) fn check_where(flwr: &Flwr) -> Check<Vec<Equality>> {
    let mut out = Vec::new();
    if let Some(cond) = &flwr.condition {
        collect_equalities(cond, flwr, &mut out)?;
    }
    Ok(out)
}

fn collect_equalities(cond: &Cond, flwr: &Flwr, out: &mut Vec<Equality>) -> Check<()> {
    match cond {
        Cond::And(a, b) => {
            collect_equalities(a, flwr, out)?;
            collect_equalities(b, flwr, out)
        }
        Cond::Parentheses(inner) => collect_equalities(inner, flwr, out),
        Cond::ValueEq(a, b) => {
            let (Some(left), Some(right)) = (operand(a, flwr), operand(b, flwr)) else {
                return reject(Phase::CheckWhere, "unsupported equality operand");
            };
            out.push(Equality { left, right, source: cond.clone() });
            Ok(())
        }
        _ => reject(Phase::CheckWhere, "condition is not a conjunction of value equalities"),
    }
}

fn operand(query: &Xq, flwr: &Flwr) -> Option<Operand> {
    let query = query.unparenthesized();
    if let Xq::Constant(value) = query {
        return Some(Operand::Constant(value.clone()));
    }
    let owner = path_owner(query)?;
    let index = flwr.bindings.iter().position(|b| b.var == owner)?;
    Some(Operand::Var { owner: index, expr: query.clone() })
}

/// Variable at the head of `$v`, `$v/rp`, `$v//rp` chains.
pub(crate) fn path_owner(query: &Xq) -> Option<&str> {
    match query {
        Xq::Variable(name) => Some(name.as_str()),
        Xq::Children(base, _) | Xq::DescendantOrSelf(base, _) => path_owner(base),
        Xq::Parentheses(inner) => path_owner(inner),
        _ => None,
    }
}

pub(crate) fn check_return(query: &Xq) -> Check<()> {
    match query {
        Xq::Variable(_) => Ok(()),
        Xq::Parentheses(inner) | Xq::Tag(_, inner) => check_return(inner),
        Xq::Pair(a, b) => {
            check_return(a)?;
            check_return(b)
        }
        Xq::Children(base, path) | Xq::DescendantOrSelf(base, path) => {
            if path.uses_parent() {
                return reject(Phase::CheckReturn, "return path walks to a parent");
            }
            if !projectable_base(base) {
                return reject(Phase::CheckReturn, "return path starts at a sequence");
            }
            check_return(base)
        }
        _ => reject(Phase::CheckReturn, "unsupported return expression"),
    }
}

/// Steps may only follow a single variable, a path, or a constructor; a
/// step after a sequence would deduplicate nodes the rewrite copies apart.
fn projectable_base(base: &Xq) -> bool {
    match base {
        Xq::Variable(_) | Xq::Children(..) | Xq::DescendantOrSelf(..) | Xq::Tag(..) => true,
        Xq::Parentheses(inner) => projectable_base(inner),
        _ => false,
    }
}

/// True when `query`'s last step can yield attribute nodes.
pub(crate) fn yields_attributes(query: &Xq) -> bool {
    fn path(rp: &RelPath) -> bool {
        match rp {
            RelPath::Attribute(_) => true,
            RelPath::Children(_, last) | RelPath::DescendantOrSelf(_, last) => path(last),
            RelPath::Filter(inner, _) | RelPath::Parentheses(inner) => path(inner),
            RelPath::Pair(a, b) => path(a) || path(b),
            _ => false,
        }
    }
    match query {
        Xq::Children(_, rp) | Xq::DescendantOrSelf(_, rp) => path(rp),
        Xq::Parentheses(inner) => yields_attributes(inner),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_xquery;
    use rstest::rstest;

    fn flwr(src: &str) -> Flwr {
        match parse_xquery(src).unwrap() {
            Xq::Flwr(f) => *f,
            other => panic!("expected flwr, got {other:?}"),
        }
    }

    #[rstest]
    fn dependencies_point_to_earlier_bindings() {
        let f = flwr(r#"for $a in doc("f")/a, $b in $a/b, $c in $o/c, $d in $b//d return $a"#);
        assert_eq!(check_for(&f).unwrap(), vec![None, Some(0), None, Some(1)]);
    }

    #[rstest]
    #[case(r#"for $a in doc("f")/a/@id return $a"#)]
    #[case(r#"for $a in doc("f")/a, $b in $a/.. return $a"#)]
    #[case(r#"for $a in doc("f")/a, $b in $a/. return $a"#)]
    #[case(r#"for $a in doc("f")/a let $b := $a return $a"#)]
    #[case(r#"for $a in <x>{"1"}</x> return $a"#)]
    #[case(r#"for $a in doc("f")/a, $a in doc("g")/b return $a"#)]
    fn ineligible_sources(#[case] src: &str) {
        assert_eq!(check_for(&flwr(src)).unwrap_err().phase, Phase::CheckFor);
    }

    #[rstest]
    fn where_clause_splits_into_equalities() {
        let f = flwr(
            r#"for $a in doc("f")/a, $b in doc("g")/b where ($a/k = $b/j and $a = "x") and "p" eq "p" return $a"#,
        );
        let eqs = check_where(&f).unwrap();
        assert_eq!(eqs.len(), 3);
        assert!(matches!(eqs[0].left, Operand::Var { owner: 0, .. }));
        assert!(matches!(eqs[0].right, Operand::Var { owner: 1, .. }));
        assert!(matches!(eqs[1].right, Operand::Constant(ref s) if s == "x"));
    }

    #[rstest]
    #[case(r#"for $a in doc("f")/a where $a/k = $b return $a"#)]
    #[case(r#"for $a in doc("f")/a where $a/k == $a/j return $a"#)]
    #[case(r#"for $a in doc("f")/a where $a/k = "1" or $a/k = "2" return $a"#)]
    #[case(r#"for $a in doc("f")/a where not $a/k = "1" return $a"#)]
    #[case(r#"for $a in doc("f")/a where empty($a/k) return $a"#)]
    #[case(r#"for $a in doc("f")/a where $a/k = doc("g")/k return $a"#)]
    fn ineligible_conditions(#[case] src: &str) {
        assert_eq!(check_where(&flwr(src)).unwrap_err().phase, Phase::CheckWhere);
    }

    #[rstest]
    #[case(r#"<p>{$a, ($b/k, <q>{$a//m}</q>)}</p>"#, true)]
    #[case(r#"$a/k/.."#, false)]
    #[case(r#"$a/k[../j]"#, false)]
    #[case(r#"($a, $b)/k"#, false)]
    #[case(r#""text""#, false)]
    #[case(r#"doc("f")/a"#, false)]
    #[case(r#"for $x in $a return $x"#, false)]
    fn return_shapes(#[case] src: &str, #[case] accepted: bool) {
        assert_eq!(check_return(&parse_xquery(src).unwrap()).is_ok(), accepted);
    }
}
