use super::xpath::{any_value_equal, evaluate_step};
use super::{Env, Evaluator, Frame};
use crate::ast::{Axis, Binding, Cond, Flwr, Xq};
use crate::model::Node;
use crate::runtime::{Error, Result};
use std::collections::HashSet;
use std::ops::ControlFlow;

type Visit<'v> = dyn for<'e> FnMut(Env<'e>) -> Result<ControlFlow<()>> + 'v;

impl Evaluator<'_> {
    /// Evaluates a whole query with no variables in scope.
    pub fn evaluate_query(&self, query: &Xq) -> Result<Vec<Node>> {
        self.evaluate(query, Env::default())
    }

    pub(crate) fn evaluate(&self, query: &Xq, env: Env<'_>) -> Result<Vec<Node>> {
        match query {
            Xq::Variable(name) => env
                .lookup(name)
                .map(<[Node]>::to_vec)
                .ok_or_else(|| Error::UnboundVariable(name.clone())),
            Xq::Constant(value) => Ok(vec![self.arena().create_text(value.as_str())]),
            Xq::AbsolutePath(ap) => self.evaluate_absolute(ap),
            Xq::Parentheses(inner) => self.evaluate(inner, env),
            Xq::Pair(left, right) => {
                let mut out = self.evaluate(left, env)?;
                out.extend(self.evaluate(right, env)?);
                Ok(out)
            }
            Xq::Children(base, path) => {
                Ok(evaluate_step(Axis::Child, &self.evaluate(base, env)?, path))
            }
            Xq::DescendantOrSelf(base, path) => {
                Ok(evaluate_step(Axis::DescendantOrSelf, &self.evaluate(base, env)?, path))
            }
            Xq::Tag(name, body) => {
                let content = self.evaluate(body, env)?;
                Ok(vec![self.arena().create_element(name.as_str(), &content)])
            }
            Xq::Join(join) => self.evaluate_join(join, env),
            Xq::Let(bindings, body) => {
                // every source sees only the enclosing scope
                let mut frame = Frame::new(env);
                for binding in bindings {
                    frame.bind(&binding.var, self.evaluate(&binding.source, env)?);
                }
                self.evaluate(body, frame.env())
            }
            Xq::Flwr(flwr) => self.evaluate_flwr(flwr, env),
        }
    }

    fn evaluate_flwr(&self, flwr: &Flwr, env: Env<'_>) -> Result<Vec<Node>> {
        let mut out = Vec::new();
        let mut tuples = 0usize;
        self.for_each_tuple(&flwr.bindings, env, &mut |tuple| {
            tuples += 1;
            self.with_lets(&flwr.lets, tuple, &mut |scope| {
                let keep = match &flwr.condition {
                    Some(cond) => self.holds(cond, scope)?,
                    None => true,
                };
                if keep {
                    out.extend(self.evaluate(&flwr.result, scope)?);
                }
                Ok(ControlFlow::Continue(()))
            })
        })?;
        tracing::trace!(tuples, items = out.len(), "flwr evaluated");
        Ok(out)
    }

    /// Calls `visit` once per tuple of the cartesian product of `bindings`,
    /// left to right, each source evaluated with the earlier variables bound.
    fn for_each_tuple(
        &self,
        bindings: &[Binding],
        env: Env<'_>,
        visit: &mut Visit<'_>,
    ) -> Result<ControlFlow<()>> {
        let Some((first, rest)) = bindings.split_first() else {
            return visit(env);
        };
        for item in self.evaluate(&first.source, env)? {
            let frame = Frame::single(env, &first.var, vec![item]);
            if self.for_each_tuple(rest, frame.env(), visit)?.is_break() {
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    /// FLWR lets are sequential: each source sees the previous bindings.
    fn with_lets(
        &self,
        lets: &[Binding],
        env: Env<'_>,
        visit: &mut Visit<'_>,
    ) -> Result<ControlFlow<()>> {
        let Some((first, rest)) = lets.split_first() else {
            return visit(env);
        };
        let frame = Frame::single(env, &first.var, self.evaluate(&first.source, env)?);
        self.with_lets(rest, frame.env(), visit)
    }

    pub(crate) fn holds(&self, cond: &Cond, env: Env<'_>) -> Result<bool> {
        match cond {
            Cond::ValueEq(left, right) => self.value_eq(left, right, env),
            Cond::IdentityEq(left, right) => {
                let left = self.evaluate(left, env)?;
                let right: HashSet<Node> = self.evaluate(right, env)?.into_iter().collect();
                Ok(left.iter().any(|n| right.contains(n)))
            }
            Cond::Empty(query) => Ok(self.evaluate(query, env)?.is_empty()),
            Cond::Some(bindings, body) => {
                let found = self.for_each_tuple(bindings, env, &mut |tuple| {
                    Ok(if self.holds(body, tuple)? {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    })
                })?;
                Ok(found.is_break())
            }
            Cond::Parentheses(inner) => self.holds(inner, env),
            Cond::And(a, b) => Ok(self.holds(a, env)? && self.holds(b, env)?),
            Cond::Or(a, b) => Ok(self.holds(a, env)? || self.holds(b, env)?),
            Cond::Not(inner) => Ok(!self.holds(inner, env)?),
        }
    }

    /// Existential value equality; a string constant operand compares by
    /// string value instead of structure.
    fn value_eq(&self, left: &Xq, right: &Xq, env: Env<'_>) -> Result<bool> {
        match (left.unparenthesized(), right.unparenthesized()) {
            (Xq::Constant(a), Xq::Constant(b)) => Ok(a == b),
            (Xq::Constant(value), other) | (other, Xq::Constant(value)) => {
                Ok(self.evaluate(other, env)?.iter().any(|n| n.string_value() == *value))
            }
            _ => {
                let left = self.evaluate(left, env)?;
                let right = self.evaluate(right, env)?;
                Ok(any_value_equal(&left, &right))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::Evaluator;
    use crate::model::Node;
    use crate::parser::parse_xquery;
    use crate::runtime::{Error, MemoryResolver};
    use crate::xml::to_compact_string;
    use rstest::{fixture, rstest};

    #[fixture]
    fn resolver() -> MemoryResolver {
        MemoryResolver::new()
            .with_text("f.xml", "<r><a><k>1</k></a><a><k>2</k></a><a><k>3</k></a></r>")
            .with_text("g.xml", "<s><b><j>2</j></b><b><j>3</j></b><b><j>3</j></b></s>")
    }

    fn run(resolver: &MemoryResolver, src: &str) -> Result<Vec<String>, Error> {
        let query = parse_xquery(src)?;
        let eval = Evaluator::new(resolver);
        Ok(eval.evaluate_query(&query)?.iter().map(to_compact_string).collect())
    }

    #[rstest]
    fn tag_constructor_wraps_copies(resolver: MemoryResolver) {
        let out = run(&resolver, r#"for $a in doc("f.xml")/r/a return <x>{$a/k/text()}</x>"#).unwrap();
        assert_eq!(out, vec!["<x>1</x>", "<x>2</x>", "<x>3</x>"]);
    }

    #[rstest]
    fn flwr_tuples_are_lexicographic(resolver: MemoryResolver) {
        let out = run(
            &resolver,
            r#"for $a in doc("f.xml")/r/a, $b in doc("g.xml")/s/b where $a/k/text() = $b/j/text() return <p>{$a/k, $b/j}</p>"#,
        )
        .unwrap();
        assert_eq!(
            out,
            vec![
                "<p><k>2</k><j>2</j></p>",
                "<p><k>3</k><j>3</j></p>",
                "<p><k>3</k><j>3</j></p>"
            ]
        );
    }

    #[rstest]
    fn constants_compare_by_string_value(resolver: MemoryResolver) {
        let out = run(&resolver, r#"for $a in doc("f.xml")/r/a where $a/k = "2" return $a"#).unwrap();
        assert_eq!(out, vec!["<a><k>2</k></a>"]);
        let none = run(&resolver, r#"for $a in doc("f.xml")/r/a where "x" eq "y" return $a"#).unwrap();
        assert!(none.is_empty());
    }

    #[rstest]
    fn standalone_let_sources_do_not_see_each_other(resolver: MemoryResolver) {
        let src = r#"let $x := doc("f.xml")/r, $y := $x/a $y"#;
        assert_eq!(run(&resolver, src), Err(Error::UnboundVariable("x".into())));
    }

    #[rstest]
    fn flwr_lets_are_sequential(resolver: MemoryResolver) {
        let src = r#"for $r in doc("f.xml")/r let $a := $r/a, $k := $a/k return <n>{$k}</n>"#;
        assert_eq!(run(&resolver, src).unwrap(), vec!["<n><k>1</k><k>2</k><k>3</k></n>"]);
    }

    #[rstest]
    fn some_and_empty(resolver: MemoryResolver) {
        let src = r#"for $a in doc("f.xml")/r/a where some $b in doc("g.xml")/s/b satisfies $b/j/text() = $a/k/text() return $a/k"#;
        assert_eq!(run(&resolver, src).unwrap(), vec!["<k>2</k>", "<k>3</k>"]);
        let src = r#"for $a in doc("f.xml")/r/a where empty($a/z) and not $a/k = "1" return $a/k"#;
        assert_eq!(run(&resolver, src).unwrap(), vec!["<k>2</k>", "<k>3</k>"]);
    }

    #[rstest]
    fn identity_distinguishes_copies(resolver: MemoryResolver) {
        let src = r#"for $a in doc("f.xml")/r/a, $b in doc("f.xml")/r/a where $a == $b return $a/k"#;
        assert_eq!(run(&resolver, src).unwrap().len(), 3);
        let src = r#"for $a in doc("f.xml")/r/a let $c := <a>{$a/k}</a> where $a is $c return $a"#;
        assert!(run(&resolver, src).unwrap().is_empty());
        let src = r#"for $a in doc("f.xml")/r/a let $c := <a>{$a/k}</a> where $a = $c return $a"#;
        assert_eq!(run(&resolver, src).unwrap().len(), 3);
    }

    #[rstest]
    fn constructed_elements_have_no_parent(resolver: MemoryResolver) {
        let out = run(&resolver, r#"<w>{"t"}</w>/.."#).unwrap();
        assert!(out.is_empty());
        let out = run(&resolver, r#"<w>{<v>{"t"}</v>}</w>/v/.."#).unwrap();
        assert_eq!(out, vec!["<w><v>t</v></w>"]);
    }

    #[rstest]
    fn unbound_variable_is_an_error(resolver: MemoryResolver) {
        assert_eq!(run(&resolver, "$nope"), Err(Error::UnboundVariable("nope".into())));
    }

    #[rstest]
    fn documents_are_loaded_once_per_evaluation(resolver: MemoryResolver) {
        let query = parse_xquery(r#"for $a in doc("f.xml")/r, $b in doc("f.xml")/r where $a == $b return $a"#)
            .unwrap();
        let eval = Evaluator::new(&resolver);
        let out: Vec<Node> = eval.evaluate_query(&query).unwrap();
        assert_eq!(out.len(), 1);
    }
}
