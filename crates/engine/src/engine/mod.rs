//! Evaluation of parsed expressions against documents.
//!
//! An [`Evaluator`] lives for one top-level evaluation: it owns the
//! construction arena for new elements and memoizes `doc(...)` lookups so
//! repeated references to the same name see the same node identities.
pub mod join;
pub mod xpath;
pub mod xquery;

use crate::ast::AbsolutePath;
use crate::model::{Document, Node};
use crate::runtime::{DocumentResolver, Result};
use itertools::Itertools;
use std::cell::RefCell;
use std::collections::HashMap;

pub struct Evaluator<'r> {
    resolver: &'r dyn DocumentResolver,
    documents: RefCell<HashMap<String, Document>>,
    arena: Document,
}

impl<'r> Evaluator<'r> {
    pub fn new(resolver: &'r dyn DocumentResolver) -> Self {
        Self { resolver, documents: RefCell::new(HashMap::new()), arena: Document::construction() }
    }

    /// Arena holding every element and text constructed by this evaluation.
    pub fn arena(&self) -> &Document {
        &self.arena
    }

    pub(crate) fn document(&self, uri: &str) -> Result<Node> {
        if let Some(doc) = self.documents.borrow().get(uri) {
            return Ok(doc.root());
        }
        let doc = self.resolver.resolve(uri)?;
        let root = doc.root();
        self.documents.borrow_mut().insert(uri.to_owned(), doc);
        Ok(root)
    }

    /// `doc(name)/rp` or `doc(name)//rp`.
    pub fn evaluate_absolute(&self, ap: &AbsolutePath) -> Result<Vec<Node>> {
        let root = self.document(&ap.document)?;
        let result = xpath::evaluate_step(ap.axis, std::slice::from_ref(&root), &ap.path);
        tracing::trace!(document = %ap.document, items = result.len(), "absolute path evaluated");
        Ok(result)
    }
}

/// Removes repeated nodes, keeping the first occurrence of each.
pub(crate) fn distinct(nodes: Vec<Node>) -> Vec<Node> {
    nodes.into_iter().unique().collect()
}

/// One scope level: a set of variable bindings layered over a parent scope.
pub(crate) struct Frame<'a> {
    bindings: Vec<(&'a str, Vec<Node>)>,
    parent: Env<'a>,
}

impl<'a> Frame<'a> {
    pub(crate) fn new(parent: Env<'a>) -> Self {
        Self { bindings: Vec::new(), parent }
    }

    pub(crate) fn single(parent: Env<'a>, name: &'a str, value: Vec<Node>) -> Self {
        Self { bindings: vec![(name, value)], parent }
    }

    pub(crate) fn bind(&mut self, name: &'a str, value: Vec<Node>) {
        self.bindings.push((name, value));
    }

    pub(crate) fn env(&self) -> Env<'_> {
        Env { frame: Some(self) }
    }
}

/// Variable environment: a borrowed chain of frames, innermost first.
#[derive(Clone, Copy, Default)]
pub(crate) struct Env<'a> {
    frame: Option<&'a Frame<'a>>,
}

impl<'a> Env<'a> {
    pub(crate) fn lookup(&self, name: &str) -> Option<&'a [Node]> {
        let mut current = self.frame;
        while let Some(frame) = current {
            if let Some((_, value)) = frame.bindings.iter().rev().find(|(n, _)| *n == name) {
                return Some(value);
            }
            current = frame.parent.frame;
        }
        None
    }
}
