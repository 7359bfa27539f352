//! Alpha-renaming of query variables.
//!
//! Every binding site gets a fresh name `v1`, `v2`, ... so that no two
//! bindings share a name and shadowing disappears. Scopes are copied on entry,
//! so a binding never leaks into sibling expressions.
use crate::ast::{Binding, Cond, Flwr, Join, Xq};
use crate::runtime::{Error, Result};
use std::collections::HashMap;

/// Name given to references that no enclosing binding declares.
pub const UNDEFINED: &str = "Undefined";

type Scope = HashMap<String, String>;

#[derive(Debug, Default)]
pub struct Renamer {
    counter: usize,
    strict: bool,
}

impl Renamer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects unbound references instead of mapping them to [`UNDEFINED`].
    pub fn strict() -> Self {
        Self { counter: 0, strict: true }
    }

    pub fn rename(&mut self, query: &Xq) -> Result<Xq> {
        self.xq(query, &Scope::new())
    }

    fn fresh(&mut self) -> String {
        self.counter += 1;
        format!("v{}", self.counter)
    }

    fn lookup(&self, name: &str, scope: &Scope) -> Result<String> {
        match scope.get(name) {
            Some(renamed) => Ok(renamed.clone()),
            None if self.strict => Err(Error::UnboundVariable(name.to_owned())),
            None => {
                tracing::debug!(variable = name, "unbound variable reference");
                Ok(UNDEFINED.to_owned())
            }
        }
    }

    fn xq(&mut self, query: &Xq, scope: &Scope) -> Result<Xq> {
        Ok(match query {
            Xq::Variable(name) => Xq::Variable(self.lookup(name, scope)?),
            Xq::Constant(_) | Xq::AbsolutePath(_) => query.clone(),
            Xq::Parentheses(inner) => Xq::Parentheses(Box::new(self.xq(inner, scope)?)),
            Xq::Pair(a, b) => Xq::pair(self.xq(a, scope)?, self.xq(b, scope)?),
            Xq::Children(base, path) => Xq::Children(Box::new(self.xq(base, scope)?), path.clone()),
            Xq::DescendantOrSelf(base, path) => {
                Xq::DescendantOrSelf(Box::new(self.xq(base, scope)?), path.clone())
            }
            Xq::Tag(name, body) => Xq::tag(name.clone(), self.xq(body, scope)?),
            Xq::Join(join) => Xq::Join(Box::new(Join {
                left: self.xq(&join.left, scope)?,
                right: self.xq(&join.right, scope)?,
                left_tags: join.left_tags.clone(),
                right_tags: join.right_tags.clone(),
            })),
            Xq::Let(bindings, body) => {
                // sources are renamed against the outer scope only
                let mut inner = scope.clone();
                let mut renamed = Vec::with_capacity(bindings.len());
                for binding in bindings {
                    let source = self.xq(&binding.source, scope)?;
                    let var = self.fresh();
                    inner.insert(binding.var.clone(), var.clone());
                    renamed.push(Binding { var, source });
                }
                Xq::Let(renamed, Box::new(self.xq(body, &inner)?))
            }
            Xq::Flwr(flwr) => {
                let mut inner = scope.clone();
                let bindings = self.sequential(&flwr.bindings, &mut inner)?;
                let lets = self.sequential(&flwr.lets, &mut inner)?;
                let condition = flwr.condition.as_ref().map(|c| self.cond(c, &inner)).transpose()?;
                let result = self.xq(&flwr.result, &inner)?;
                Xq::Flwr(Box::new(Flwr { bindings, lets, condition, result }))
            }
        })
    }

    /// Bindings where each source sees the variables bound before it.
    fn sequential(&mut self, bindings: &[Binding], scope: &mut Scope) -> Result<Vec<Binding>> {
        bindings
            .iter()
            .map(|binding| {
                let source = self.xq(&binding.source, scope)?;
                let var = self.fresh();
                scope.insert(binding.var.clone(), var.clone());
                Ok(Binding { var, source })
            })
            .collect()
    }

    fn cond(&mut self, cond: &Cond, scope: &Scope) -> Result<Cond> {
        Ok(match cond {
            Cond::ValueEq(a, b) => Cond::ValueEq(self.xq(a, scope)?, self.xq(b, scope)?),
            Cond::IdentityEq(a, b) => Cond::IdentityEq(self.xq(a, scope)?, self.xq(b, scope)?),
            Cond::Empty(query) => Cond::Empty(self.xq(query, scope)?),
            Cond::Some(bindings, body) => {
                let mut inner = scope.clone();
                let bindings = self.sequential(bindings, &mut inner)?;
                Cond::Some(bindings, Box::new(self.cond(body, &inner)?))
            }
            Cond::Parentheses(inner) => Cond::Parentheses(Box::new(self.cond(inner, scope)?)),
            Cond::And(a, b) => Cond::And(Box::new(self.cond(a, scope)?), Box::new(self.cond(b, scope)?)),
            Cond::Or(a, b) => Cond::Or(Box::new(self.cond(a, scope)?), Box::new(self.cond(b, scope)?)),
            Cond::Not(inner) => Cond::Not(Box::new(self.cond(inner, scope)?)),
        })
    }
}

/// Renames with a fresh permissive [`Renamer`].
pub fn rename(query: &Xq) -> Xq {
    let mut renamer = Renamer::new();
    // a permissive renamer never reports unbound variables
    renamer.rename(query).unwrap_or_else(|_| query.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::format_inline;
    use crate::parser::parse_xquery;
    use rstest::rstest;

    fn renamed(src: &str) -> String {
        format_inline(&rename(&parse_xquery(src).unwrap()))
    }

    #[rstest]
    fn bindings_get_fresh_names_in_order() {
        assert_eq!(
            renamed(r#"for $a in doc("f")/a, $b in $a/b where $a = $b return ($a, $b)"#),
            r#"for $v1 in doc("f")/a, $v2 in $v1/b where $v1 = $v2 return ($v1, $v2)"#
        );
    }

    #[rstest]
    fn shadowing_is_removed() {
        assert_eq!(
            renamed(r#"for $x in doc("f")/a return for $x in $x/b return $x"#),
            r#"for $v1 in doc("f")/a return for $v2 in $v1/b return $v2"#
        );
    }

    #[rstest]
    fn scopes_do_not_leak_into_siblings() {
        assert_eq!(
            renamed(r#"<r>{for $x in doc("f")/a return $x, $x}</r>"#),
            r#"<r>{for $v1 in doc("f")/a return $v1, $v1}</r>"#,
            "the return clause owns the whole comma sequence"
        );
        assert_eq!(
            renamed(r#"<r>{(for $x in doc("f")/a return $x), $x}</r>"#),
            r#"<r>{(for $v1 in doc("f")/a return $v1), $Undefined}</r>"#
        );
    }

    #[rstest]
    fn let_sources_use_the_outer_scope() {
        assert_eq!(
            renamed(r#"let $x := doc("f")/a, $y := $x $y"#),
            r#"let $v1 := doc("f")/a, $v2 := $Undefined $v2"#
        );
    }

    #[rstest]
    fn some_bindings_scope_their_condition() {
        assert_eq!(
            renamed(r#"for $a in doc("f")/a where some $a in $a/b satisfies $a = "1" return $a"#),
            r#"for $v1 in doc("f")/a where some $v2 in $v1/b satisfies $v2 = "1" return $v1"#
        );
    }

    #[rstest]
    fn strict_mode_rejects_free_variables() {
        let query = parse_xquery("<r>{$free}</r>").unwrap();
        assert_eq!(Renamer::strict().rename(&query), Err(Error::UnboundVariable("free".into())));
    }
}
