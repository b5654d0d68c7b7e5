//! Flat DOM arena.
//!
//! Nodes live in a `Vec` and refer to each other by [`NodeId`]. Scoring keeps
//! its per-node data in side tables indexed the same way, so the tree itself
//! stays immutable after construction.

use scraper::{Html, Node as HtmlNode};

/// Index of a node inside a [`Dom`].
pub type NodeId = usize;

/// Tags dropped, with their whole subtree, while building the arena.
pub const IGNORED_TAGS: &[&str] = &["option", "script", "noscript", "style", "iframe", "head"];

#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Document,
    Element {
        name: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
    Comment(String),
}

#[derive(Debug, Clone)]
pub struct DomNode {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub data: NodeData,
}

/// Arena-backed document tree. Node `0` is always the document root.
#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<DomNode>,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    pub const ROOT: NodeId = 0;

    /// An empty document containing only the root.
    pub fn new() -> Self {
        Self {
            nodes: vec![DomNode {
                parent: None,
                children: Vec::new(),
                data: NodeData::Document,
            }],
        }
    }

    /// Convert a parsed HTML document, purging ignored tags, inline-hidden
    /// elements and stylesheet links on the way.
    pub fn from_html(html: &Html) -> Self {
        let mut dom = Self::new();
        let mut stack = Vec::new();
        for child in html.tree.root().children().rev() {
            stack.push((child, Self::ROOT));
        }

        while let Some((node, parent)) = stack.pop() {
            let id = match node.value() {
                HtmlNode::Element(el) => {
                    let name = el.name().to_ascii_lowercase();
                    let attrs: Vec<(String, String)> = el
                        .attrs()
                        .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                        .collect();
                    if is_purged(&name, &attrs) {
                        continue;
                    }
                    dom.append(parent, NodeData::Element { name, attrs })
                }
                HtmlNode::Text(text) => {
                    dom.append_text(parent, &text.text);
                    continue;
                }
                HtmlNode::Comment(comment) => {
                    dom.append(parent, NodeData::Comment(comment.comment.to_string()));
                    continue;
                }
                // Fragment roots and templates flatten into their parent.
                HtmlNode::Fragment | HtmlNode::Document => parent,
                _ => continue,
            };
            for child in node.children().rev() {
                stack.push((child, id));
            }
        }
        dom
    }

    fn append(&mut self, parent: NodeId, data: NodeData) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(DomNode {
            parent: Some(parent),
            children: Vec::new(),
            data,
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Append an element with the given attributes under `parent`.
    pub fn append_element(&mut self, parent: NodeId, name: &str, attrs: &[(&str, &str)]) -> NodeId {
        let attrs = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.append(
            parent,
            NodeData::Element {
                name: name.to_ascii_lowercase(),
                attrs,
            },
        )
    }

    /// Append a text node under `parent`.
    pub fn append_text(&mut self, parent: NodeId, text: &str) -> NodeId {
        self.append(parent, NodeData::Text(text.to_string()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes[Self::ROOT].children.is_empty()
    }

    pub fn node(&self, id: NodeId) -> &DomNode {
        &self.nodes[id]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id].parent
    }

    /// Tag name of an element, `None` for every other node kind.
    pub fn tag_name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.tag_name(id).is_some()
    }

    pub fn attr(&self, id: NodeId, key: &str) -> Option<&str> {
        match &self.nodes[id].data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Tag name, every class and the id: the strings pattern checks run against.
    pub fn identifiers(&self, id: NodeId) -> Vec<&str> {
        let Some(name) = self.tag_name(id) else {
            return Vec::new();
        };
        let mut idents = vec![name];
        if let Some(class) = self.attr(id, "class") {
            idents.extend(class.split_whitespace());
        }
        if let Some(ident) = self.attr(id, "id") {
            idents.push(ident);
        }
        idents
    }

    /// Every node reachable from `from`, in document (preorder) order.
    pub fn preorder(&self, from: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev());
        }
        order
    }

    /// Descendant elements of `from` with the given tag, in document order.
    pub fn find_all(&self, from: NodeId, tag: &str) -> Vec<NodeId> {
        self.preorder(from)
            .into_iter()
            .filter(|&id| id != from && self.tag_name(id) == Some(tag))
            .collect()
    }

    /// Concatenated text of every text node below `id`, comments excluded.
    pub fn text(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.preorder(id) {
            if let NodeData::Text(text) = &self.nodes[node].data {
                out.push_str(text);
            }
        }
        out
    }
}

fn is_purged(name: &str, attrs: &[(String, String)]) -> bool {
    if IGNORED_TAGS.contains(&name) {
        return true;
    }
    let attr = |key: &str| {
        attrs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    };
    if attr("style").is_some_and(is_hidden_style) {
        return true;
    }
    name == "link"
        && (attr("type").is_some_and(|t| t.eq_ignore_ascii_case("text/css"))
            || attr("rel").is_some_and(|r| r.eq_ignore_ascii_case("stylesheet")))
}

/// Inline styles that hide the element from readers.
fn is_hidden_style(style: &str) -> bool {
    style.split(';').any(|decl| {
        let decl: String = decl
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        decl == "display:none" || decl == "visibility:hidden"
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> Dom {
        Dom::from_html(&Html::parse_document(html))
    }

    #[test]
    fn test_purge_removes_scripts_and_head() {
        let dom = parse(
            "<html><head><title>t</title></head><body><script>var a;</script><p>x</p></body></html>",
        );
        let root = Dom::ROOT;
        assert!(dom.find_all(root, "script").is_empty());
        assert!(dom.find_all(root, "head").is_empty());
        assert_eq!(dom.find_all(root, "p").len(), 1);
    }

    #[test]
    fn test_purge_hidden_elements() {
        let dom = parse(
            r#"<body><div style="display:none">a</div><div style="color: red; display: none">b</div>
            <div style="visibility:hidden">c</div><div>d</div></body>"#,
        );
        assert_eq!(dom.find_all(Dom::ROOT, "div").len(), 1);
        assert_eq!(dom.text(Dom::ROOT).trim(), "d");
    }

    #[test]
    fn test_comments_are_not_text() {
        let dom = parse("<body><p>a<!-- hidden -->b</p></body>");
        assert_eq!(dom.text(Dom::ROOT), "ab");
    }

    #[test]
    fn test_preorder_follows_document_order() {
        let mut dom = Dom::new();
        let p = dom.append_element(Dom::ROOT, "p", &[]);
        let h1 = dom.append_element(p, "h1", &[]);
        let div = dom.append_element(p, "div", &[]);
        dom.append_text(h1, "2");
        let late = dom.append_text(p, "4");
        let inner = dom.append_text(div, "3");
        let order = dom.preorder(Dom::ROOT);
        let pos = |id| order.iter().position(|&n| n == id).unwrap();
        assert!(pos(inner) < pos(late));
    }

    #[test]
    fn test_identifiers() {
        let dom = parse(r#"<body><div class="post  body" id="main">x</div></body>"#);
        let div = dom.find_all(Dom::ROOT, "div")[0];
        assert_eq!(dom.identifiers(div), vec!["div", "post", "body", "main"]);
    }
}
