use std::collections::BTreeMap;

use ego_tree::NodeRef;
use scraper::node::Node as HtmlNode;
use scraper::{ElementRef, Html, Selector};

/// Index of a node inside its [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// One item of a node's ordered content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Element(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    content: Vec<Content>,
}

impl Node {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn content(&self) -> &[Content] {
        &self.content
    }

    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.content.iter().filter_map(|item| match item {
            Content::Element(id) => Some(*id),
            Content::Text(_) => None,
        })
    }

    /// Concatenation of the text segments owned by this node, untrimmed.
    pub fn direct_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|item| match item {
                Content::Text(text) => Some(text.as_str()),
                Content::Element(_) => None,
            })
            .collect()
    }
}

/// What a rewrite pass does with an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Rewrite {
    Keep,
    /// Drop the element and its subtree.
    Remove,
    /// Drop the element, splice its content into the parent.
    Unwrap,
}

/// Arena-backed element tree built once per scan.
///
/// Nodes are addressed by [`NodeId`]; children are explicit index lists and
/// there are no parent links. Rewrites detach nodes without freeing them, so
/// every traversal starts at the root and only sees reachable nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    nodes: Vec<Node>,
    root: Option<NodeId>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses markup and keeps the `<body>` subtree, or the root element when
    /// the parser produced no body.
    pub fn parse_body(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        Self::from_html(&parsed)
    }

    fn from_html(parsed: &Html) -> Self {
        let body = Selector::parse("body")
            .ok()
            .and_then(|sel| parsed.select(&sel).next())
            .unwrap_or_else(|| parsed.root_element());
        let mut document = Self::new();
        document.import_element(body);
        document
    }

    /// Adds a detached element. The first node added becomes the root.
    pub fn add_node(&mut self, tag: &str) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            tag: tag.to_ascii_lowercase(),
            attrs: BTreeMap::new(),
            content: Vec::new(),
        });
        if self.root.is_none() {
            self.root = Some(id);
        }
        id
    }

    pub fn set_attr(&mut self, id: NodeId, name: &str, value: &str) {
        self.nodes[id.0]
            .attrs
            .insert(name.to_ascii_lowercase(), value.to_string());
    }

    pub fn push_text(&mut self, id: NodeId, text: &str) {
        self.nodes[id.0].content.push(Content::Text(text.to_string()));
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[parent.0].content.push(Content::Element(child));
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    /// Reachable nodes in document (pre-)order, root first.
    pub fn descendants(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack: Vec<NodeId> = self.root.into_iter().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            let children: Vec<NodeId> = self.nodes[id.0].children().collect();
            stack.extend(children.into_iter().rev());
        }
        order
    }

    /// Full rendered text of a subtree, in document order.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    /// Full rendered text of the whole document.
    pub fn full_text(&self) -> String {
        self.root.map(|root| self.text(root)).unwrap_or_default()
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        for item in &self.nodes[id.0].content {
            match item {
                Content::Text(text) => out.push_str(text),
                Content::Element(child) => self.collect_text(*child, out),
            }
        }
    }

    /// Applies `decide` to every element below the root. The root itself is
    /// always kept.
    pub(crate) fn rewrite(&mut self, decide: &dyn Fn(&Node) -> Rewrite) {
        if let Some(root) = self.root {
            self.rewrite_content(root, decide);
        }
    }

    fn rewrite_content(&mut self, id: NodeId, decide: &dyn Fn(&Node) -> Rewrite) {
        let content = std::mem::take(&mut self.nodes[id.0].content);
        let mut rebuilt = Vec::with_capacity(content.len());
        for item in content {
            match item {
                Content::Text(text) => rebuilt.push(Content::Text(text)),
                Content::Element(child) => match decide(&self.nodes[child.0]) {
                    Rewrite::Remove => {}
                    Rewrite::Keep => {
                        self.rewrite_content(child, decide);
                        rebuilt.push(Content::Element(child));
                    }
                    Rewrite::Unwrap => {
                        self.rewrite_content(child, decide);
                        rebuilt.append(&mut self.nodes[child.0].content);
                    }
                },
            }
        }
        self.nodes[id.0].content = rebuilt;
    }

    fn import_element(&mut self, element: ElementRef<'_>) -> NodeId {
        let id = self.add_node(element.value().name());
        for (name, value) in element.value().attrs() {
            self.set_attr(id, name, value);
        }
        for child in element.children() {
            self.import_node(id, child);
        }
        id
    }

    fn import_node(&mut self, parent: NodeId, node: NodeRef<'_, HtmlNode>) {
        match node.value() {
            HtmlNode::Text(text) => self.push_text(parent, text),
            HtmlNode::Element(_) => {
                if let Some(element) = ElementRef::wrap(node) {
                    let child = self.import_element(element);
                    self.append_child(parent, child);
                }
            }
            // comments, doctypes and processing instructions carry no page text
            _ => {}
        }
    }
}

/// A rendered page snapshot: its `<title>` plus the body document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub title: Option<String>,
    pub document: Document,
}

impl Page {
    pub fn parse(html: &str) -> Self {
        let parsed = Html::parse_document(html);
        let title = Selector::parse("title")
            .ok()
            .and_then(|sel| parsed.select(&sel).next().map(|t| t.text().collect::<String>()))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self {
            title,
            document: Document::from_html(&parsed),
        }
    }

    /// Title for display and storage; pages without one are named by url.
    pub fn title_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.title.as_deref().unwrap_or(fallback)
    }
}
