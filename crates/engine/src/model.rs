//! Arena-backed XML document model.
//!
//! A [`Document`] owns every node record it ever allocated; a [`Node`] is a
//! cheap handle (shared arena + slot index). Node identity is the pair
//! (arena, slot), so two handles compare equal only when they denote the same
//! record. Constructed elements live in a per-evaluation construction arena
//! and are deep copies of their content, which keeps source documents
//! untouched.
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Attribute,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct Record {
    kind: NodeKind,
    name: Option<String>,
    value: Option<String>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attributes: Vec<NodeId>,
}

impl Record {
    fn new(kind: NodeKind, name: Option<String>, value: Option<String>, parent: Option<NodeId>) -> Self {
        Self { kind, name, value, parent, children: Vec::new(), attributes: Vec::new() }
    }
}

struct Arena {
    uri: Option<String>,
    records: RwLock<Vec<Record>>,
}

impl Arena {
    fn read(&self) -> RwLockReadGuard<'_, Vec<Record>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Record>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Detached description of a subtree, used to build documents and to take
/// deep copies across arenas without holding two locks at once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeSpec {
    Element { name: String, attributes: Vec<(String, String)>, children: Vec<NodeSpec> },
    Attribute { name: String, value: String },
    Text(String),
}

/// Shared handle to one document arena.
#[derive(Clone)]
pub struct Document {
    arena: Arc<Arena>,
}

impl Document {
    fn with_uri(uri: Option<String>) -> Self {
        let root = Record::new(NodeKind::Document, None, None, None);
        Self { arena: Arc::new(Arena { uri, records: RwLock::new(vec![root]) }) }
    }

    /// Fresh arena holding only a document node; used for constructed content.
    pub fn construction() -> Self {
        Self::with_uri(None)
    }

    /// Builds a document whose root children are materialized from `children`.
    pub fn from_specs(uri: Option<String>, children: &[NodeSpec]) -> Self {
        let doc = Self::with_uri(uri);
        {
            let mut records = doc.arena.write();
            for spec in children {
                materialize(&mut records, spec, NodeId(0));
            }
        }
        doc
    }

    pub fn uri(&self) -> Option<&str> {
        self.arena.uri.as_deref()
    }

    pub fn root(&self) -> Node {
        Node { arena: Arc::clone(&self.arena), id: NodeId(0) }
    }

    /// Number of records allocated in this arena, document node included.
    pub fn len(&self) -> usize {
        self.arena.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Creates a parentless text node in this arena.
    pub fn create_text(&self, value: impl Into<String>) -> Node {
        let mut records = self.arena.write();
        let id = NodeId(records.len());
        records.push(Record::new(NodeKind::Text, None, Some(value.into()), None));
        Node { arena: Arc::clone(&self.arena), id }
    }

    /// Creates a parentless element whose content is a deep copy of `items`.
    ///
    /// Attribute items become attributes of the new element (a later attribute
    /// with the same name replaces an earlier one). Document items contribute
    /// their children.
    pub fn create_element(&self, name: impl Into<String>, items: &[Node]) -> Node {
        let specs: Vec<NodeSpec> = items
            .iter()
            .flat_map(|item| match item.kind() {
                NodeKind::Document => item.children().iter().map(Node::to_spec).collect(),
                _ => vec![item.to_spec()],
            })
            .collect();

        let mut records = self.arena.write();
        let id = NodeId(records.len());
        records.push(Record::new(NodeKind::Element, Some(name.into()), None, None));
        for spec in &specs {
            materialize(&mut records, spec, id);
        }
        Node { arena: Arc::clone(&self.arena), id }
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document").field("uri", &self.arena.uri).field("nodes", &self.len()).finish()
    }
}

fn materialize(records: &mut Vec<Record>, spec: &NodeSpec, parent: NodeId) {
    match spec {
        NodeSpec::Element { name, attributes, children } => {
            let id = NodeId(records.len());
            records.push(Record::new(NodeKind::Element, Some(name.clone()), None, Some(parent)));
            records[parent.0].children.push(id);
            for (attr_name, value) in attributes {
                set_attribute(records, id, attr_name, value);
            }
            for child in children {
                materialize(records, child, id);
            }
        }
        NodeSpec::Attribute { name, value } => {
            if records[parent.0].kind == NodeKind::Element {
                set_attribute(records, parent, name, value);
            }
        }
        NodeSpec::Text(value) => {
            let id = NodeId(records.len());
            records.push(Record::new(NodeKind::Text, None, Some(value.clone()), Some(parent)));
            records[parent.0].children.push(id);
        }
    }
}

fn set_attribute(records: &mut Vec<Record>, owner: NodeId, name: &str, value: &str) {
    let existing = records[owner.0]
        .attributes
        .iter()
        .copied()
        .find(|attr| records[attr.0].name.as_deref() == Some(name));
    if let Some(attr) = existing {
        records[attr.0].value = Some(value.to_owned());
        return;
    }
    let id = NodeId(records.len());
    records.push(Record::new(
        NodeKind::Attribute,
        Some(name.to_owned()),
        Some(value.to_owned()),
        Some(owner),
    ));
    records[owner.0].attributes.push(id);
}

#[derive(Clone)]
pub struct Node {
    arena: Arc<Arena>,
    id: NodeId,
}

impl Node {
    fn sibling(&self, id: NodeId) -> Node {
        Node { arena: Arc::clone(&self.arena), id }
    }

    fn with_record<R>(&self, f: impl FnOnce(&Record) -> R) -> R {
        let records = self.arena.read();
        f(&records[self.id.0])
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.with_record(|r| r.kind)
    }

    /// Element or attribute name.
    pub fn name(&self) -> Option<String> {
        self.with_record(|r| r.name.clone())
    }

    pub fn is_element_named(&self, name: &str) -> bool {
        self.with_record(|r| r.kind == NodeKind::Element && r.name.as_deref() == Some(name))
    }

    /// Text content of a text node or value of an attribute.
    pub fn value(&self) -> Option<String> {
        self.with_record(|r| r.value.clone())
    }

    pub fn parent(&self) -> Option<Node> {
        self.with_record(|r| r.parent).map(|id| self.sibling(id))
    }

    /// Element and text children in document order.
    pub fn children(&self) -> Vec<Node> {
        let ids = self.with_record(|r| r.children.clone());
        ids.into_iter().map(|id| self.sibling(id)).collect()
    }

    pub fn attributes(&self) -> Vec<Node> {
        let ids = self.with_record(|r| r.attributes.clone());
        ids.into_iter().map(|id| self.sibling(id)).collect()
    }

    pub fn attribute(&self, name: &str) -> Option<Node> {
        let records = self.arena.read();
        records[self.id.0]
            .attributes
            .iter()
            .copied()
            .find(|id| records[id.0].name.as_deref() == Some(name))
            .map(|id| self.sibling(id))
    }

    /// The node itself followed by all descendant elements and texts, preorder.
    pub fn descendants_or_self(&self) -> Vec<Node> {
        let records = self.arena.read();
        let mut out = Vec::new();
        let mut stack = vec![self.id];
        while let Some(id) = stack.pop() {
            out.push(self.sibling(id));
            stack.extend(records[id.0].children.iter().rev().copied());
        }
        out
    }

    /// Concatenated text of the subtree; the value for attributes and texts.
    pub fn string_value(&self) -> String {
        let records = self.arena.read();
        let record = &records[self.id.0];
        match record.kind {
            NodeKind::Attribute | NodeKind::Text => record.value.clone().unwrap_or_default(),
            NodeKind::Document | NodeKind::Element => {
                let mut out = String::new();
                collect_text(&records, self.id, &mut out);
                out
            }
        }
    }

    /// Detached snapshot of this subtree.
    pub fn to_spec(&self) -> NodeSpec {
        let records = self.arena.read();
        snapshot(&records, self.id)
    }

    /// Structural key: two nodes are value-equal exactly when their keys match.
    pub fn value_key(&self) -> String {
        crate::xml::to_compact_string(self)
    }

    pub fn value_eq(&self, other: &Node) -> bool {
        self == other || self.value_key() == other.value_key()
    }
}

fn collect_text(records: &[Record], id: NodeId, out: &mut String) {
    let record = &records[id.0];
    if record.kind == NodeKind::Text {
        if let Some(value) = &record.value {
            out.push_str(value);
        }
        return;
    }
    for child in &record.children {
        collect_text(records, *child, out);
    }
}

fn snapshot(records: &[Record], id: NodeId) -> NodeSpec {
    let record = &records[id.0];
    match record.kind {
        NodeKind::Text => NodeSpec::Text(record.value.clone().unwrap_or_default()),
        NodeKind::Attribute => NodeSpec::Attribute {
            name: record.name.clone().unwrap_or_default(),
            value: record.value.clone().unwrap_or_default(),
        },
        NodeKind::Element | NodeKind::Document => NodeSpec::Element {
            name: record.name.clone().unwrap_or_default(),
            attributes: record
                .attributes
                .iter()
                .map(|a| {
                    let attr = &records[a.0];
                    (attr.name.clone().unwrap_or_default(), attr.value.clone().unwrap_or_default())
                })
                .collect(),
            children: record.children.iter().map(|c| snapshot(records, *c)).collect(),
        },
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.arena, &other.arena) && self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Arc::as_ptr(&self.arena).hash(state);
        self.id.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind(), crate::xml::to_compact_string(self))
    }
}

// ===== Builders =====

/// Builder for element specs, mainly for tests and in-memory documents.
#[derive(Debug, Clone, Default)]
pub struct ElementBuilder {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<NodeSpec>,
}

impl ElementBuilder {
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    pub fn child(mut self, child: impl Into<NodeSpec>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn children<I, C>(mut self, children: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<NodeSpec>,
    {
        self.children.extend(children.into_iter().map(Into::into));
        self
    }
}

impl From<ElementBuilder> for NodeSpec {
    fn from(b: ElementBuilder) -> Self {
        NodeSpec::Element { name: b.name, attributes: b.attributes, children: b.children }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentBuilder {
    uri: Option<String>,
    children: Vec<NodeSpec>,
}

impl DocumentBuilder {
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    pub fn child(mut self, child: impl Into<NodeSpec>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn build(self) -> Document {
        Document::from_specs(self.uri, &self.children)
    }
}

pub fn doc() -> DocumentBuilder {
    DocumentBuilder::default()
}

pub fn elem(name: impl Into<String>) -> ElementBuilder {
    ElementBuilder { name: name.into(), ..ElementBuilder::default() }
}

pub fn text(value: impl Into<String>) -> NodeSpec {
    NodeSpec::Text(value.into())
}
