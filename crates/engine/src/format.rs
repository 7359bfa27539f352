//! Pretty printing of query trees back to source text.
//!
//! The printer adds parentheses only where precedence or an open-ended tail
//! (`for`, `let`, `some`) would otherwise change the parse, and keeps every
//! explicit parenthesized node. Formatting a parsed formatted query yields the
//! same text again.
use crate::ast::{AbsolutePath, Binding, Cond, Filter, Flwr, Join, RelPath, Xq};
use itertools::Itertools;
use std::fmt;

const INDENT: &str = "  ";
/// Longest expression kept on one line by [`format_query`].
const MAX_INLINE: usize = 40;

/// Multi-line layout of a query.
pub fn format_query(query: &Xq) -> String {
    Printer { pretty: true }.xq(query, 0)
}

/// One-line layout of a query.
pub fn format_inline(query: &Xq) -> String {
    Printer { pretty: false }.xq(query, 0)
}

pub fn format_xpath(path: &AbsolutePath) -> String {
    ap(path)
}

impl fmt::Display for Xq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_inline(self))
    }
}

impl fmt::Display for AbsolutePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&ap(self))
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&rp(self, 0))
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&Printer { pretty: false }.cond(self, 0))
    }
}

// ===== XPath =====

fn rp_precedence(path: &RelPath) -> u8 {
    match path {
        RelPath::Pair(..) => 0,
        RelPath::Children(..) | RelPath::DescendantOrSelf(..) => 1,
        RelPath::Filter(..) => 2,
        _ => 3,
    }
}

fn rp(path: &RelPath, min: u8) -> String {
    if rp_precedence(path) < min {
        return format!("({})", rp(path, 0));
    }
    match path {
        RelPath::Tag(name) => name.clone(),
        RelPath::Wildcard => "*".into(),
        RelPath::Current => ".".into(),
        RelPath::Parent => "..".into(),
        RelPath::Text => "text()".into(),
        RelPath::Attribute(name) => format!("@{name}"),
        RelPath::Parentheses(inner) => format!("({})", rp(inner, 0)),
        RelPath::Children(a, b) => format!("{}/{}", rp(a, 1), rp(b, 2)),
        RelPath::DescendantOrSelf(a, b) => format!("{}//{}", rp(a, 1), rp(b, 2)),
        RelPath::Filter(inner, f) => format!("{}[{}]", rp(inner, 2), filter(f, 0)),
        RelPath::Pair(a, b) => format!("{}, {}", rp(a, 0), rp(b, 1)),
    }
}

fn filter_precedence(f: &Filter) -> u8 {
    match f {
        Filter::Or(..) => 0,
        Filter::And(..) => 1,
        Filter::Not(..) => 2,
        _ => 3,
    }
}

fn filter(f: &Filter, min: u8) -> String {
    if filter_precedence(f) < min {
        return format!("({})", filter(f, 0));
    }
    match f {
        Filter::Path(path) => rp(path, 1),
        Filter::ValueEq(a, b) => format!("{} = {}", rp(a, 1), rp(b, 1)),
        Filter::IdentityEq(a, b) => format!("{} == {}", rp(a, 1), rp(b, 1)),
        Filter::ConstantEq(path, value) => format!("{} = \"{value}\"", rp(path, 1)),
        Filter::Parentheses(inner) => format!("({})", filter(inner, 0)),
        Filter::And(a, b) => format!("{} and {}", filter(a, 1), filter(b, 2)),
        Filter::Or(a, b) => format!("{} or {}", filter(a, 0), filter(b, 1)),
        Filter::Not(inner) => format!("not {}", filter(inner, 2)),
    }
}

fn ap(path: &AbsolutePath) -> String {
    format!("doc(\"{}\"){}{}", path.document, path.axis.as_str(), rp(&path.path, 1))
}

// ===== XQuery =====

fn xq_precedence(query: &Xq) -> u8 {
    match query {
        Xq::Pair(..) => 0,
        Xq::Flwr(..) | Xq::Let(..) => 1,
        Xq::Children(..) | Xq::DescendantOrSelf(..) => 2,
        _ => 3,
    }
}

/// Expressions whose trailing clause would swallow a following `,` or
/// operator.
fn open_ended(query: &Xq) -> bool {
    match query {
        Xq::Flwr(..) | Xq::Let(..) => true,
        Xq::Pair(_, right) => open_ended(right),
        _ => false,
    }
}

fn cond_precedence(cond: &Cond) -> u8 {
    match cond {
        Cond::Or(..) => 0,
        Cond::And(..) => 1,
        Cond::Not(..) => 2,
        _ => 3,
    }
}

fn open_ended_cond(cond: &Cond) -> bool {
    match cond {
        Cond::Some(..) => true,
        Cond::And(_, right) | Cond::Or(_, right) => open_ended_cond(right),
        Cond::Not(inner) => open_ended_cond(inner),
        _ => false,
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|line| format!("{INDENT}{line}")).join("\n")
}

struct Printer {
    pretty: bool,
}

impl Printer {
    fn inline(&self) -> Printer {
        Printer { pretty: false }
    }

    fn paren(&self, inner: String) -> String {
        if self.pretty && inner.contains('\n') {
            format!("(\n{}\n)", indent(&inner))
        } else {
            format!("({inner})")
        }
    }

    fn xq(&self, query: &Xq, min: u8) -> String {
        if xq_precedence(query) < min {
            return self.paren(self.xq(query, 0));
        }
        if self.pretty {
            let flat = self.inline().xq(query, min);
            if flat.len() <= MAX_INLINE {
                return flat;
            }
        }
        match query {
            Xq::Variable(name) => format!("${name}"),
            Xq::Constant(value) => format!("\"{value}\""),
            Xq::AbsolutePath(path) => ap(path),
            Xq::Parentheses(inner) => self.paren(self.xq(inner, 0)),
            Xq::Pair(a, b) => {
                let left = if open_ended(a) { self.paren(self.xq(a, 0)) } else { self.xq(a, 0) };
                let sep = if self.pretty { ",\n" } else { ", " };
                format!("{left}{sep}{}", self.xq(b, 1))
            }
            Xq::Children(base, path) => format!("{}/{}", self.xq(base, 2), rp(path, 1)),
            Xq::DescendantOrSelf(base, path) => format!("{}//{}", self.xq(base, 2), rp(path, 1)),
            Xq::Tag(name, body) => {
                let body = self.xq(body, 0);
                if self.pretty {
                    format!("<{name}>{{\n{}\n}}</{name}>", indent(&body))
                } else {
                    format!("<{name}>{{{body}}}</{name}>")
                }
            }
            Xq::Join(join) => self.join(join),
            Xq::Let(bindings, body) => {
                let head = self.bindings("let ", " := ", bindings);
                let body = self.xq(body, 0);
                if self.pretty { format!("{head}\n{body}") } else { format!("{head} {body}") }
            }
            Xq::Flwr(flwr) => self.flwr(flwr),
        }
    }

    /// A binding source, join input or comparison operand.
    fn single(&self, query: &Xq) -> String {
        if open_ended(query) || xq_precedence(query) < 1 {
            self.paren(self.xq(query, 0))
        } else {
            self.xq(query, 1)
        }
    }

    fn bindings(&self, keyword: &str, op: &str, bindings: &[Binding]) -> String {
        let sep = if self.pretty { ",\n    " } else { ", " };
        let body = bindings
            .iter()
            .map(|b| {
                let source = self.single(&b.source);
                let source = if self.pretty { source.replace('\n', "\n    ") } else { source };
                format!("${}{op}{source}", b.var)
            })
            .join(sep);
        format!("{keyword}{body}")
    }

    fn join(&self, join: &Join) -> String {
        let parts = [
            self.single(&join.left),
            self.single(&join.right),
            format!("[{}]", join.left_tags.join(", ")),
            format!("[{}]", join.right_tags.join(", ")),
        ];
        if self.pretty {
            format!("join(\n{}\n)", parts.iter().map(|p| indent(p)).join(",\n"))
        } else {
            format!("join({})", parts.join(", "))
        }
    }

    fn flwr(&self, flwr: &Flwr) -> String {
        let mut clauses = vec![self.bindings("for ", " in ", &flwr.bindings)];
        if !flwr.lets.is_empty() {
            clauses.push(self.bindings("let ", " := ", &flwr.lets));
        }
        if let Some(cond) = &flwr.condition {
            clauses.push(format!("where {}", self.cond(cond, 0)));
        }
        let result = self.xq(&flwr.result, 0);
        if self.pretty {
            clauses.push(format!("return\n{}", indent(&result)));
            clauses.join("\n")
        } else {
            clauses.push(format!("return {result}"));
            clauses.join(" ")
        }
    }

    fn cond(&self, cond: &Cond, min: u8) -> String {
        if cond_precedence(cond) < min {
            return format!("({})", self.cond(cond, 0));
        }
        // conditions always stay on one line; nested queries inside them too
        let p = self.inline();
        match cond {
            Cond::ValueEq(a, b) => format!("{} = {}", p.single(a), p.single(b)),
            Cond::IdentityEq(a, b) => format!("{} == {}", p.single(a), p.single(b)),
            Cond::Empty(query) => format!("empty({})", p.xq(query, 0)),
            Cond::Some(bindings, body) => {
                format!("{} satisfies {}", p.bindings("some ", " in ", bindings), p.cond(body, 0))
            }
            Cond::Parentheses(inner) => format!("({})", p.cond(inner, 0)),
            Cond::And(a, b) => format!("{} and {}", p.cond_operand(a, 1), p.cond(b, 2)),
            Cond::Or(a, b) => format!("{} or {}", p.cond_operand(a, 0), p.cond(b, 1)),
            Cond::Not(inner) => format!("not {}", p.cond(inner, 2)),
        }
    }

    fn cond_operand(&self, cond: &Cond, min: u8) -> String {
        if open_ended_cond(cond) {
            format!("({})", self.cond(cond, 0))
        } else {
            self.cond(cond, min)
        }
    }
}
