use crate::ast::{AbsolutePath, Axis, Binding, Cond, Filter, Flwr, Join, RelPath, Xq};
use crate::runtime::{Error, Result};
use pest::Parser;
use pest::error::LineColLocation;
use pest::iterators::Pair;

#[derive(pest_derive::Parser)]
#[grammar = "xquery.pest"]
pub struct XQueryParser;

/// Parses an absolute XPath expression such as `doc("f.xml")//a[b]`.
pub fn parse_xpath(input: &str) -> Result<AbsolutePath> {
    let mut pairs = XQueryParser::parse(Rule::xpath, input).map_err(syntax_error)?;
    let root = expect(&mut pairs, "xpath")?;
    let ap = expect(&mut significant(root), "absolute path")?;
    build_ap(ap)
}

/// Parses an XQuery expression.
pub fn parse_xquery(input: &str) -> Result<Xq> {
    let mut pairs = XQueryParser::parse(Rule::query, input).map_err(syntax_error)?;
    let root = expect(&mut pairs, "query")?;
    let xq = expect(&mut significant(root), "query body")?;
    build_xq(xq)
}

fn syntax_error(err: pest::error::Error<Rule>) -> Error {
    let (line, column) = match err.line_col {
        LineColLocation::Pos(pos) => pos,
        LineColLocation::Span(start, _) => start,
    };
    Error::Syntax { line, column, message: err.variant.message().into_owned() }
}

fn internal(what: &str) -> Error {
    Error::Syntax { line: 0, column: 0, message: format!("malformed parse tree: missing {what}") }
}

fn expect<'i>(it: &mut impl Iterator<Item = Pair<'i, Rule>>, what: &str) -> Result<Pair<'i, Rule>> {
    it.next().ok_or_else(|| internal(what))
}

fn is_keyword(rule: Rule) -> bool {
    matches!(
        rule,
        Rule::K_DOC
            | Rule::K_FOR
            | Rule::K_IN
            | Rule::K_LET
            | Rule::K_WHERE
            | Rule::K_RETURN
            | Rule::K_JOIN
            | Rule::K_SOME
            | Rule::K_SATISFIES
            | Rule::K_EMPTY
            | Rule::K_AND
            | Rule::K_OR
            | Rule::K_NOT
            | Rule::K_EQ
            | Rule::K_IS
            | Rule::EOI
    )
}

/// Inner pairs without keyword tokens.
fn significant<'i>(pair: Pair<'i, Rule>) -> impl Iterator<Item = Pair<'i, Rule>> {
    pair.into_inner().filter(|p| !is_keyword(p.as_rule()))
}

fn axis_of(pair: &Pair<'_, Rule>) -> Result<Axis> {
    match pair.as_rule() {
        Rule::slash => Ok(Axis::Child),
        Rule::dslash => Ok(Axis::DescendantOrSelf),
        _ => Err(internal("path separator")),
    }
}

fn build_identifier(pair: Pair<'_, Rule>) -> Result<String> {
    // variable and attribute_step wrap an identifier; bare identifiers are used as-is
    match pair.as_rule() {
        Rule::identifier => Ok(pair.as_str().to_owned()),
        _ => Ok(expect(&mut pair.into_inner(), "identifier")?.as_str().to_owned()),
    }
}

fn build_string(pair: Pair<'_, Rule>) -> String {
    pair.into_inner().next().map(|p| p.as_str().to_owned()).unwrap_or_default()
}

// ===== XPath =====

fn build_ap(pair: Pair<'_, Rule>) -> Result<AbsolutePath> {
    let mut it = significant(pair);
    let doc_call = expect(&mut it, "doc call")?;
    let literal = expect(&mut significant(doc_call), "document name")?;
    let axis = axis_of(&expect(&mut it, "path separator")?)?;
    let path = build_rp(expect(&mut it, "relative path")?)?;
    Ok(AbsolutePath { document: build_string(literal), axis, path })
}

fn build_rp(pair: Pair<'_, Rule>) -> Result<RelPath> {
    let mut it = pair.into_inner();
    let mut acc = build_rp_path(expect(&mut it, "path")?)?;
    for next in it {
        acc = RelPath::Pair(Box::new(acc), Box::new(build_rp_path(next)?));
    }
    Ok(acc)
}

fn build_rp_path(pair: Pair<'_, Rule>) -> Result<RelPath> {
    let mut it = pair.into_inner();
    let mut acc = build_rp_filtered(expect(&mut it, "step")?)?;
    while let Some(op) = it.next() {
        let axis = axis_of(&op)?;
        let step = build_rp_filtered(expect(&mut it, "step")?)?;
        acc = acc.step(axis, step);
    }
    Ok(acc)
}

fn build_rp_filtered(pair: Pair<'_, Rule>) -> Result<RelPath> {
    let mut it = pair.into_inner();
    let mut acc = build_rp_atom(expect(&mut it, "step")?)?;
    for filter in it {
        acc = acc.filtered(build_filter(filter)?);
    }
    Ok(acc)
}

fn build_rp_atom(pair: Pair<'_, Rule>) -> Result<RelPath> {
    let atom = expect(&mut pair.into_inner(), "step")?;
    Ok(match atom.as_rule() {
        Rule::text_test => RelPath::Text,
        Rule::parent_step => RelPath::Parent,
        Rule::current_step => RelPath::Current,
        Rule::wildcard => RelPath::Wildcard,
        Rule::attribute_step => RelPath::Attribute(build_identifier(atom)?),
        Rule::rp_paren => {
            RelPath::Parentheses(Box::new(build_rp(expect(&mut atom.into_inner(), "path")?)?))
        }
        Rule::tag_step => RelPath::Tag(build_identifier(atom)?),
        _ => return Err(internal("step")),
    })
}

fn build_filter(pair: Pair<'_, Rule>) -> Result<Filter> {
    match pair.as_rule() {
        Rule::filter | Rule::f_primary => build_filter(expect(&mut pair.into_inner(), "filter")?),
        Rule::f_or => fold_filter(pair, |a, b| Filter::Or(Box::new(a), Box::new(b))),
        Rule::f_and => fold_filter(pair, |a, b| Filter::And(Box::new(a), Box::new(b))),
        Rule::f_not => {
            let inner = expect(&mut significant(pair), "filter")?;
            match inner.as_rule() {
                Rule::f_not => Ok(Filter::Not(Box::new(build_filter(inner)?))),
                _ => build_filter(inner),
            }
        }
        Rule::f_constant_eq => {
            let mut it = pair.into_inner();
            let rp = build_rp(expect(&mut it, "path")?)?;
            let _op = expect(&mut it, "operator")?;
            Ok(Filter::ConstantEq(rp, build_string(expect(&mut it, "string")?)))
        }
        Rule::f_compare => {
            let mut it = pair.into_inner();
            let left = build_rp(expect(&mut it, "path")?)?;
            let op = expect(&mut it, "operator")?;
            let right = build_rp(expect(&mut it, "path")?)?;
            Ok(match op.as_rule() {
                Rule::identity_op => Filter::IdentityEq(left, right),
                _ => Filter::ValueEq(left, right),
            })
        }
        Rule::f_paren => {
            Ok(Filter::Parentheses(Box::new(build_filter(expect(&mut pair.into_inner(), "filter")?)?)))
        }
        Rule::f_path => Ok(Filter::Path(build_rp(expect(&mut pair.into_inner(), "path")?)?)),
        _ => Err(internal("filter")),
    }
}

fn fold_filter(pair: Pair<'_, Rule>, join: impl Fn(Filter, Filter) -> Filter) -> Result<Filter> {
    let mut it = significant(pair);
    let mut acc = build_filter(expect(&mut it, "filter")?)?;
    for next in it {
        acc = join(acc, build_filter(next)?);
    }
    Ok(acc)
}

// ===== XQuery =====

fn build_xq(pair: Pair<'_, Rule>) -> Result<Xq> {
    let mut it = pair.into_inner();
    let mut acc = build_xq_single(expect(&mut it, "expression")?)?;
    for next in it {
        acc = Xq::pair(acc, build_xq_single(next)?);
    }
    Ok(acc)
}

fn build_xq_single(pair: Pair<'_, Rule>) -> Result<Xq> {
    let inner = expect(&mut pair.into_inner(), "expression")?;
    match inner.as_rule() {
        Rule::flwr => build_flwr(inner),
        Rule::let_expr => {
            let mut it = inner.into_inner();
            let bindings = build_bindings(expect(&mut it, "let clause")?)?;
            let body = build_xq(expect(&mut it, "let body")?)?;
            Ok(Xq::Let(bindings, Box::new(body)))
        }
        Rule::xq_path => {
            let mut it = inner.into_inner();
            let primary = build_xq_primary(expect(&mut it, "expression")?)?;
            match it.next() {
                Some(op) => {
                    let axis = axis_of(&op)?;
                    Ok(primary.step(axis, build_rp(expect(&mut it, "relative path")?)?))
                }
                None => Ok(primary),
            }
        }
        _ => Err(internal("expression")),
    }
}

fn build_xq_primary(pair: Pair<'_, Rule>) -> Result<Xq> {
    let inner = expect(&mut pair.into_inner(), "expression")?;
    match inner.as_rule() {
        Rule::ap => Ok(Xq::AbsolutePath(build_ap(inner)?)),
        Rule::variable => Ok(Xq::Variable(build_identifier(inner)?)),
        Rule::string_literal => Ok(Xq::Constant(build_string(inner))),
        Rule::xq_paren => {
            Ok(Xq::Parentheses(Box::new(build_xq(expect(&mut inner.into_inner(), "expression")?)?)))
        }
        Rule::tag_ctor => {
            let mut it = inner.into_inner();
            let open = build_identifier(expect(&mut it, "tag name")?)?;
            let body = build_xq(expect(&mut it, "constructor body")?)?;
            let close = build_identifier(expect(&mut it, "closing tag name")?)?;
            if open != close {
                return Err(Error::TagMismatch { open, close });
            }
            Ok(Xq::tag(open, body))
        }
        Rule::join_expr => {
            let mut it = significant(inner);
            let left = build_xq_single(expect(&mut it, "join input")?)?;
            let right = build_xq_single(expect(&mut it, "join input")?)?;
            let left_tags = build_tag_list(expect(&mut it, "tag list")?)?;
            let right_tags = build_tag_list(expect(&mut it, "tag list")?)?;
            Ok(Xq::Join(Box::new(Join { left, right, left_tags, right_tags })))
        }
        _ => Err(internal("expression")),
    }
}

fn build_tag_list(pair: Pair<'_, Rule>) -> Result<Vec<String>> {
    pair.into_inner().map(build_identifier).collect()
}

fn build_binding(pair: Pair<'_, Rule>) -> Result<Binding> {
    let mut it = significant(pair);
    let var = build_identifier(expect(&mut it, "variable")?)?;
    let source = build_xq_single(expect(&mut it, "binding source")?)?;
    Ok(Binding { var, source })
}

/// Bindings of a `for`, `let` or `some` clause.
fn build_bindings(pair: Pair<'_, Rule>) -> Result<Vec<Binding>> {
    significant(pair).map(build_binding).collect()
}

fn build_flwr(pair: Pair<'_, Rule>) -> Result<Xq> {
    let mut bindings = Vec::new();
    let mut lets = Vec::new();
    let mut condition = None;
    let mut result = None;
    for clause in pair.into_inner() {
        match clause.as_rule() {
            Rule::for_clause => bindings = build_bindings(clause)?,
            Rule::let_clause => lets = build_bindings(clause)?,
            Rule::where_clause => {
                condition = Some(build_cond(expect(&mut significant(clause), "condition")?)?);
            }
            Rule::return_clause => {
                result = Some(build_xq(expect(&mut significant(clause), "return body")?)?);
            }
            _ => return Err(internal("flwr clause")),
        }
    }
    let result = result.ok_or_else(|| internal("return clause"))?;
    Ok(Xq::Flwr(Box::new(Flwr { bindings, lets, condition, result })))
}

fn build_cond(pair: Pair<'_, Rule>) -> Result<Cond> {
    match pair.as_rule() {
        Rule::cond | Rule::c_primary => build_cond(expect(&mut pair.into_inner(), "condition")?),
        Rule::c_or => fold_cond(pair, |a, b| Cond::Or(Box::new(a), Box::new(b))),
        Rule::c_and => fold_cond(pair, |a, b| Cond::And(Box::new(a), Box::new(b))),
        Rule::c_not => {
            let inner = expect(&mut significant(pair), "condition")?;
            match inner.as_rule() {
                Rule::c_not => Ok(Cond::Not(Box::new(build_cond(inner)?))),
                _ => build_cond(inner),
            }
        }
        Rule::c_empty => Ok(Cond::Empty(build_xq(expect(&mut significant(pair), "expression")?)?)),
        Rule::c_some => {
            let mut bindings = Vec::new();
            let mut body = None;
            for part in significant(pair) {
                match part.as_rule() {
                    Rule::in_binding => bindings.push(build_binding(part)?),
                    _ => body = Some(build_cond(part)?),
                }
            }
            let body = body.ok_or_else(|| internal("satisfies clause"))?;
            Ok(Cond::Some(bindings, Box::new(body)))
        }
        Rule::c_compare => {
            let mut it = pair.into_inner();
            let left = build_xq_single(expect(&mut it, "operand")?)?;
            let op = expect(&mut it, "operator")?;
            let right = build_xq_single(expect(&mut it, "operand")?)?;
            Ok(match op.as_rule() {
                Rule::identity_op => Cond::IdentityEq(left, right),
                _ => Cond::ValueEq(left, right),
            })
        }
        Rule::c_paren => {
            Ok(Cond::Parentheses(Box::new(build_cond(expect(&mut pair.into_inner(), "condition")?)?)))
        }
        _ => Err(internal("condition")),
    }
}

fn fold_cond(pair: Pair<'_, Rule>, join: impl Fn(Cond, Cond) -> Cond) -> Result<Cond> {
    let mut it = significant(pair);
    let mut acc = build_cond(expect(&mut it, "condition")?)?;
    for next in it {
        acc = join(acc, build_cond(next)?);
    }
    Ok(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn tag(name: &str) -> RelPath {
        RelPath::tag(name)
    }

    #[rstest]
    fn absolute_path_with_filter() {
        let ap = parse_xpath(r#"doc("j_caesar.xml")//ACT[TITLE]/SCENE"#).unwrap();
        assert_eq!(ap.document, "j_caesar.xml");
        assert_eq!(ap.axis, Axis::DescendantOrSelf);
        assert_eq!(
            ap.path,
            tag("ACT").filtered(Filter::Path(tag("TITLE"))).step(Axis::Child, tag("SCENE"))
        );
    }

    #[rstest]
    #[case("a, b/c", RelPath::Pair(Box::new(tag("a")), Box::new(tag("b").step(Axis::Child, tag("c")))))]
    #[case("a/b//c", tag("a").step(Axis::Child, tag("b")).step(Axis::DescendantOrSelf, tag("c")))]
    #[case("(a)", RelPath::Parentheses(Box::new(tag("a"))))]
    #[case("@id", RelPath::Attribute("id".into()))]
    #[case("text()", RelPath::Text)]
    #[case("..", RelPath::Parent)]
    #[case("*", RelPath::Wildcard)]
    fn relative_path_shapes(#[case] src: &str, #[case] expected: RelPath) {
        let ap = parse_xpath(&format!("doc(\"f\")/{src}")).unwrap();
        assert_eq!(ap.path, expected);
    }

    #[rstest]
    fn filter_precedence_binds_and_tighter_than_or() {
        let ap = parse_xpath(r#"doc("f")/a[b or c and not d]"#).unwrap();
        let RelPath::Filter(_, f) = ap.path else { panic!("expected filter") };
        assert_eq!(
            *f,
            Filter::Or(
                Box::new(Filter::Path(tag("b"))),
                Box::new(Filter::And(
                    Box::new(Filter::Path(tag("c"))),
                    Box::new(Filter::Not(Box::new(Filter::Path(tag("d")))))
                ))
            )
        );
    }

    #[rstest]
    #[case(r#"a[b = "x"]"#, Filter::ConstantEq(tag("b"), "x".into()))]
    #[case("a[b eq c]", Filter::ValueEq(tag("b"), tag("c")))]
    #[case("a[b == c]", Filter::IdentityEq(tag("b"), tag("c")))]
    #[case("a[b is c]", Filter::IdentityEq(tag("b"), tag("c")))]
    #[case("a[(b)]", Filter::Parentheses(Box::new(Filter::Path(tag("b")))))]
    fn filter_comparisons(#[case] src: &str, #[case] expected: Filter) {
        let ap = parse_xpath(&format!("doc(\"f\")/{src}")).unwrap();
        assert_eq!(ap.path, tag("a").filtered(expected));
    }

    #[rstest]
    fn document_keyword_is_accepted() {
        assert_eq!(parse_xpath(r#"document("x.xml")/a"#).unwrap().document, "x.xml");
    }

    #[rstest]
    fn flwr_with_all_clauses() {
        let q = parse_xquery(
            r#"for $a in doc("f")/r/a, $b in $a/k let $c := $b where $c = "1" and empty($a/z) return <t>{$a, $c}</t>"#,
        )
        .unwrap();
        let Xq::Flwr(f) = q else { panic!("expected flwr") };
        assert_eq!(f.bindings.len(), 2);
        assert_eq!(f.bindings[1].source, Xq::var("a").step(Axis::Child, tag("k")));
        assert_eq!(f.lets, vec![Binding::new("c", Xq::var("b"))]);
        assert!(matches!(f.condition, Some(Cond::And(_, _))));
        assert_eq!(f.result, Xq::tag("t", Xq::pair(Xq::var("a"), Xq::var("c"))));
    }

    #[rstest]
    fn join_expression() {
        let q = parse_xquery(r#"join(doc("a")/x, doc("b")/y, [k, m], [j, n])"#).unwrap();
        let Xq::Join(j) = q else { panic!("expected join") };
        assert_eq!(j.left_tags, vec!["k", "m"]);
        assert_eq!(j.right_tags, vec!["j", "n"]);
    }

    #[rstest]
    fn standalone_let_and_some() {
        let q = parse_xquery(
            r#"let $x := doc("f")/a, $y := "c" for $z in $x where some $w in $z/b satisfies $w = $y return $z"#,
        )
        .unwrap();
        let Xq::Let(bindings, body) = q else { panic!("expected let") };
        assert_eq!(bindings.len(), 2);
        let Xq::Flwr(f) = *body else { panic!("expected flwr") };
        assert!(matches!(f.condition, Some(Cond::Some(ref b, _)) if b.len() == 1));
    }

    #[rstest]
    fn tag_mismatch_is_reported() {
        let err = parse_xquery("<a>{\"x\"}</b>").unwrap_err();
        assert_eq!(err, Error::TagMismatch { open: "a".into(), close: "b".into() });
    }

    #[rstest]
    #[case("for $x in doc(\"f\")/a")]
    #[case("doc(\"f\")/")]
    #[case("$x ==")]
    fn syntax_errors_carry_positions(#[case] src: &str) {
        let err = parse_xquery(src).unwrap_err();
        assert!(matches!(err, Error::Syntax { line: 1, column, .. } if column > 0), "{err:?}");
    }

    #[rstest]
    fn comma_after_path_starts_a_new_expression() {
        let q = parse_xquery(r#"<r>{$x/a, for $y in $x return $y}</r>"#).unwrap();
        let Xq::Tag(_, body) = q else { panic!("expected tag") };
        assert!(matches!(*body, Xq::Pair(_, ref right) if matches!(**right, Xq::Flwr(_))));
    }
}
