//! XML loading (roxmltree) and result serialization.
use crate::model::{Document, Node, NodeKind, NodeSpec};
use crate::runtime::Error;
use quick_xml::escape::escape;
use std::fmt::Write;
use std::path::Path;

/// Parses XML text into a fresh document arena.
///
/// Whitespace-only text nodes, comments and processing instructions are
/// dropped so that indentation in source files does not leak into results.
/// A DOCTYPE declaration is accepted and ignored.
pub fn load_str(uri: Option<&str>, text: &str) -> Result<Document, Error> {
    let options = roxmltree::ParsingOptions { allow_dtd: true, ..roxmltree::ParsingOptions::default() };
    let parsed = roxmltree::Document::parse_with_options(text, options).map_err(|e| Error::Xml {
        uri: uri.unwrap_or("<inline>").to_owned(),
        message: e.to_string(),
    })?;
    let children: Vec<NodeSpec> = parsed.root().children().filter_map(|n| convert(&n)).collect();
    tracing::trace!(uri = uri.unwrap_or("<inline>"), "document parsed");
    Ok(Document::from_specs(uri.map(str::to_owned), &children))
}

/// Reads and parses an XML file; the document URI is the path as given.
pub fn load_file(path: impl AsRef<Path>) -> Result<Document, Error> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::Resource { path: display.clone(), message: e.to_string() })?;
    load_str(Some(&display), &text)
}

fn convert(node: &roxmltree::Node<'_, '_>) -> Option<NodeSpec> {
    if node.is_element() {
        let attributes =
            node.attributes().map(|a| (a.name().to_owned(), a.value().to_owned())).collect();
        let children = node.children().filter_map(|c| convert(&c)).collect();
        return Some(NodeSpec::Element {
            name: node.tag_name().name().to_owned(),
            attributes,
            children,
        });
    }
    if node.is_text() {
        let text = node.text().unwrap_or_default();
        if text.trim().is_empty() {
            return None;
        }
        return Some(NodeSpec::Text(text.to_owned()));
    }
    None
}

/// Single-line serialization used as the value-equality key.
pub fn to_compact_string(node: &Node) -> String {
    let mut out = String::new();
    write_compact(&node.to_spec_with_kind(), &mut out);
    out
}

/// Compact form of one result item; attributes print as `@name="value"`
/// like the indented layout.
fn to_compact_item(node: &Node) -> String {
    match node.to_spec_with_kind() {
        Spec::Node(NodeSpec::Attribute { name, value }) => format!("@{name}=\"{}\"", escape(value.as_str())),
        spec => {
            let mut out = String::new();
            write_compact(&spec, &mut out);
            out
        }
    }
}

fn write_compact(spec: &Spec, out: &mut String) {
    match spec {
        Spec::Document(children) => {
            for child in children {
                write_compact_node(child, out);
            }
        }
        Spec::Node(node) => write_compact_node(node, out),
    }
}

fn write_compact_node(spec: &NodeSpec, out: &mut String) {
    match spec {
        NodeSpec::Text(value) => out.push_str(&escape(value.as_str())),
        NodeSpec::Attribute { name, value } => {
            let _ = write!(out, "{name}=\"{}\"", escape(value.as_str()));
        }
        NodeSpec::Element { name, attributes, children } => {
            open_tag(name, attributes, children.is_empty(), out);
            if !children.is_empty() {
                for child in children {
                    write_compact_node(child, out);
                }
                let _ = write!(out, "</{name}>");
            }
        }
    }
}

fn open_tag(name: &str, attributes: &[(String, String)], empty: bool, out: &mut String) {
    out.push('<');
    out.push_str(name);
    for (attr, value) in attributes {
        let _ = write!(out, " {attr}=\"{}\"", escape(value.as_str()));
    }
    out.push_str(if empty { "/>" } else { ">" });
}

enum Spec {
    Document(Vec<NodeSpec>),
    Node(NodeSpec),
}

impl Node {
    fn to_spec_with_kind(&self) -> Spec {
        match self.kind() {
            NodeKind::Document => Spec::Document(self.children().iter().map(Node::to_spec).collect()),
            _ => Spec::Node(self.to_spec()),
        }
    }
}

/// Indented serialization of one node. Attribute nodes print as
/// `@name="value"`.
pub fn to_pretty_string(node: &Node) -> String {
    let mut out = String::new();
    match node.to_spec_with_kind() {
        Spec::Document(children) => {
            for child in &children {
                write_pretty(child, 0, &mut out);
            }
        }
        Spec::Node(NodeSpec::Attribute { name, value }) => {
            let _ = writeln!(out, "@{name}=\"{}\"", escape(value.as_str()));
        }
        Spec::Node(spec) => write_pretty(&spec, 0, &mut out),
    }
    out
}

fn write_pretty(spec: &NodeSpec, depth: usize, out: &mut String) {
    let pad = "  ".repeat(depth);
    match spec {
        NodeSpec::Text(value) => {
            let _ = writeln!(out, "{pad}{}", escape(value.as_str()));
        }
        NodeSpec::Attribute { name, value } => {
            let _ = writeln!(out, "{pad}@{name}=\"{}\"", escape(value.as_str()));
        }
        NodeSpec::Element { name, attributes, children } => {
            out.push_str(&pad);
            let has_elements = children.iter().any(|c| matches!(c, NodeSpec::Element { .. }));
            if has_elements {
                open_tag(name, attributes, false, out);
                out.push('\n');
                for child in children {
                    write_pretty(child, depth + 1, out);
                }
                let _ = writeln!(out, "{pad}</{name}>");
            } else {
                write_compact_node(spec, out);
                out.push('\n');
            }
        }
    }
}

/// Layout of a serialized result sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializeOptions {
    /// Adds a node count header and a marker comment before each item.
    pub verbose: bool,
    /// Indents nested elements; otherwise each item is one compact line.
    pub indent: bool,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self { verbose: false, indent: true }
    }
}

/// Renders a result sequence, each item serialized on its own and
/// terminated by a newline.
pub fn serialize(nodes: &[Node], options: &SerializeOptions) -> String {
    let mut out = String::new();
    if options.verbose {
        let _ = writeln!(out, "<!-- Number of nodes: {} -->", nodes.len());
    }
    for (index, node) in nodes.iter().enumerate() {
        if options.verbose {
            let _ = writeln!(out, "<!-- Node #{} -->", index + 1);
        }
        if options.indent {
            out.push_str(&to_pretty_string(node));
        } else {
            out.push_str(&to_compact_item(node));
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{doc, elem, text};
    use rstest::rstest;

    #[rstest]
    fn whitespace_text_is_dropped() {
        let d = load_str(Some("t.xml"), "<r>\n  <a id=\"1\">x &amp; y</a>\n</r>").unwrap();
        let r = d.root().children()[0].clone();
        assert_eq!(r.children().len(), 1);
        assert_eq!(to_compact_string(&r), "<r><a id=\"1\">x &amp; y</a></r>");
    }

    #[rstest]
    fn doctype_is_accepted() {
        let src = "<?xml version=\"1.0\"?>\n<!DOCTYPE r [<!ELEMENT r (#PCDATA)>]>\n<r>t</r>";
        let d = load_str(None, src).unwrap();
        assert_eq!(d.root().string_value(), "t");
    }

    #[rstest]
    fn malformed_input_reports_xml_error() {
        let err = load_str(Some("bad.xml"), "<r><a></r>").unwrap_err();
        assert!(matches!(err, Error::Xml { ref uri, .. } if uri == "bad.xml"));
    }

    #[rstest]
    fn pretty_layout_indents_element_content() {
        let d = doc().child(elem("a").child(elem("k").child(text("1"))).child(elem("e"))).build();
        let a = d.root().children()[0].clone();
        assert_eq!(to_pretty_string(&a), "<a>\n  <k>1</k>\n  <e/>\n</a>\n");
    }

    #[rstest]
    fn verbose_results_carry_markers() {
        let d = doc().child(elem("a").attr("id", "7")).build();
        let a = d.root().children()[0].clone();
        let id = a.attribute("id").unwrap();
        let out = serialize(&[a, id], &SerializeOptions { verbose: true, indent: true });
        assert_eq!(
            out,
            "<!-- Number of nodes: 2 -->\n<!-- Node #1 -->\n<a id=\"7\"/>\n<!-- Node #2 -->\n@id=\"7\"\n"
        );
    }

    #[rstest]
    fn compact_results_mark_attributes() {
        let d = doc().child(elem("a").attr("id", "7")).build();
        let a = d.root().children()[0].clone();
        let id = a.attribute("id").unwrap();
        assert_eq!(to_compact_string(&id), "id=\"7\"");
        let out = serialize(&[a, id], &SerializeOptions { verbose: true, indent: false });
        assert_eq!(
            out,
            "<!-- Number of nodes: 2 -->\n<!-- Node #1 -->\n<a id=\"7\"/>\n<!-- Node #2 -->\n@id=\"7\"\n"
        );
    }

    #[rstest]
    fn compact_layout_puts_each_item_on_one_line() {
        let d = doc().child(elem("a").child(elem("k").child(text("1")))).child(elem("b")).build();
        let items = d.root().children();
        let out = serialize(&items, &SerializeOptions { verbose: false, indent: false });
        assert_eq!(out, "<a><k>1</k></a>\n<b/>\n");
        assert_eq!(serialize(&[], &SerializeOptions::default()), "");
    }

    #[rstest]
    fn files_load_with_their_path_as_uri() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.xml");
        std::fs::write(&path, "<r><a/></r>").unwrap();
        let d = load_file(&path).unwrap();
        assert_eq!(d.uri(), Some(path.display().to_string().as_str()));
        let missing = load_file(dir.path().join("none.xml")).unwrap_err();
        assert!(matches!(missing, Error::Resource { .. }));
    }
}
