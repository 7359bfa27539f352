//! Abstract syntax for the XPath subset (absolute/relative paths, filters)
//! and the XQuery subset (FLWR, let, constructors, join, conditions).
//!
//! Trees are immutable values; the rewrite passes always produce new trees.

/// Separator between a path head and its continuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    /// `/`
    Child,
    /// `//`
    DescendantOrSelf,
}

impl Axis {
    pub fn as_str(self) -> &'static str {
        match self {
            Axis::Child => "/",
            Axis::DescendantOrSelf => "//",
        }
    }
}

/// `doc("name")/rp` or `doc("name")//rp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsolutePath {
    pub document: String,
    pub axis: Axis,
    pub path: RelPath,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelPath {
    Tag(String),
    Wildcard,
    Current,
    Parent,
    Text,
    Attribute(String),
    Parentheses(Box<RelPath>),
    Children(Box<RelPath>, Box<RelPath>),
    DescendantOrSelf(Box<RelPath>, Box<RelPath>),
    Filter(Box<RelPath>, Box<Filter>),
    Pair(Box<RelPath>, Box<RelPath>),
}

impl RelPath {
    pub fn tag(name: impl Into<String>) -> Self {
        RelPath::Tag(name.into())
    }

    pub fn step(self, axis: Axis, next: RelPath) -> Self {
        match axis {
            Axis::Child => RelPath::Children(Box::new(self), Box::new(next)),
            Axis::DescendantOrSelf => RelPath::DescendantOrSelf(Box::new(self), Box::new(next)),
        }
    }

    pub fn filtered(self, filter: Filter) -> Self {
        RelPath::Filter(Box::new(self), Box::new(filter))
    }

    /// True when any step of the path, filters included, is `..`.
    pub fn uses_parent(&self) -> bool {
        match self {
            RelPath::Parent => true,
            RelPath::Tag(_)
            | RelPath::Wildcard
            | RelPath::Current
            | RelPath::Text
            | RelPath::Attribute(_) => false,
            RelPath::Parentheses(inner) => inner.uses_parent(),
            RelPath::Children(a, b) | RelPath::DescendantOrSelf(a, b) | RelPath::Pair(a, b) => {
                a.uses_parent() || b.uses_parent()
            }
            RelPath::Filter(rp, f) => rp.uses_parent() || f.uses_parent(),
        }
    }

    /// Name of the last tag step, if the path ends in one.
    pub fn last_tag(&self) -> Option<&str> {
        match self {
            RelPath::Tag(name) => Some(name),
            RelPath::Parentheses(inner) | RelPath::Filter(inner, _) => inner.last_tag(),
            RelPath::Children(_, b) | RelPath::DescendantOrSelf(_, b) => b.last_tag(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    Path(RelPath),
    ValueEq(RelPath, RelPath),
    IdentityEq(RelPath, RelPath),
    ConstantEq(RelPath, String),
    Parentheses(Box<Filter>),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    fn uses_parent(&self) -> bool {
        match self {
            Filter::Path(rp) | Filter::ConstantEq(rp, _) => rp.uses_parent(),
            Filter::ValueEq(a, b) | Filter::IdentityEq(a, b) => a.uses_parent() || b.uses_parent(),
            Filter::Parentheses(f) | Filter::Not(f) => f.uses_parent(),
            Filter::And(a, b) | Filter::Or(a, b) => a.uses_parent() || b.uses_parent(),
        }
    }
}

/// One `$var in source` or `$var := source` binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub var: String,
    pub source: Xq,
}

impl Binding {
    pub fn new(var: impl Into<String>, source: Xq) -> Self {
        Self { var: var.into(), source }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub left: Xq,
    pub right: Xq,
    pub left_tags: Vec<String>,
    pub right_tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flwr {
    pub bindings: Vec<Binding>,
    pub lets: Vec<Binding>,
    pub condition: Option<Cond>,
    pub result: Xq,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Xq {
    Variable(String),
    Constant(String),
    AbsolutePath(AbsolutePath),
    Parentheses(Box<Xq>),
    Pair(Box<Xq>, Box<Xq>),
    Children(Box<Xq>, RelPath),
    DescendantOrSelf(Box<Xq>, RelPath),
    Tag(String, Box<Xq>),
    Join(Box<Join>),
    Let(Vec<Binding>, Box<Xq>),
    Flwr(Box<Flwr>),
}

impl Xq {
    pub fn var(name: impl Into<String>) -> Self {
        Xq::Variable(name.into())
    }

    pub fn tag(name: impl Into<String>, body: Xq) -> Self {
        Xq::Tag(name.into(), Box::new(body))
    }

    pub fn pair(left: Xq, right: Xq) -> Self {
        Xq::Pair(Box::new(left), Box::new(right))
    }

    pub fn step(self, axis: Axis, path: RelPath) -> Self {
        match axis {
            Axis::Child => Xq::Children(Box::new(self), path),
            Axis::DescendantOrSelf => Xq::DescendantOrSelf(Box::new(self), path),
        }
    }

    /// Left-nested comma sequence of `items`; `None` when empty.
    pub fn sequence(items: impl IntoIterator<Item = Xq>) -> Option<Self> {
        items.into_iter().reduce(Xq::pair)
    }

    /// Strips redundant parentheses.
    pub fn unparenthesized(&self) -> &Xq {
        match self {
            Xq::Parentheses(inner) => inner.unparenthesized(),
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cond {
    ValueEq(Xq, Xq),
    IdentityEq(Xq, Xq),
    Empty(Xq),
    Some(Vec<Binding>, Box<Cond>),
    Parentheses(Box<Cond>),
    And(Box<Cond>, Box<Cond>),
    Or(Box<Cond>, Box<Cond>),
    Not(Box<Cond>),
}

impl Cond {
    pub fn and(self, other: Cond) -> Cond {
        Cond::And(Box::new(self), Box::new(other))
    }

    /// Left-nested conjunction; `None` when empty.
    pub fn conjunction(items: impl IntoIterator<Item = Cond>) -> Option<Cond> {
        items.into_iter().reduce(Cond::and)
    }
}
