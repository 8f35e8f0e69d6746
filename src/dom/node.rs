//! Live tree nodes.
//!
//! Nodes are shared, single-threaded handles (`Rc<RefCell<_>>`). Every node
//! carries a process-unique [`NodeId`] so that side tables can associate
//! state with a node without owning it.

use bitflags::bitflags;
use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identity of a node. Never reused.
pub type NodeId = u64;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Elements that never have children or a closing tag.
pub(crate) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source",
    "track", "wbr",
];

/// Check whether `tag` is a void element.
pub(crate) fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.iter().any(|v| v.eq_ignore_ascii_case(tag))
}

bitflags! {
    /// Per-node flags that are not part of the markup.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u8 {
        /// Node must never be removed by a patch (e.g. a cursor sentinel).
        const IGNORED = 0b0000_0001;
    }
}

/// What a node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// An element with a tag name and ordered attributes.
    Element {
        /// Lowercase tag name.
        tag: String,
        /// Attributes in source order.
        attrs: Vec<(String, String)>,
    },
    /// A run of text.
    Text(String),
    /// A comment.
    Comment(String),
}

impl NodeKind {
    /// Check whether two kinds can be morphed into each other without
    /// rewriting the node (same element tag, or both text, or both comment).
    pub fn same_shape(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Element { tag: a, .. }, Self::Element { tag: b, .. }) => a == b,
            (Self::Text(_), Self::Text(_)) | (Self::Comment(_), Self::Comment(_)) => true,
            _ => false,
        }
    }
}

#[derive(Debug)]
struct NodeData {
    id: NodeId,
    kind: NodeKind,
    flags: NodeFlags,
    children: Vec<NodeRef>,
}

/// Shared handle to a live node.
///
/// Cloning the handle does not clone the node; use [`NodeRef::deep_clone`]
/// for that. Identity is compared with [`NodeRef::ptr_eq`].
#[derive(Clone)]
pub struct NodeRef(Rc<RefCell<NodeData>>);

/// Non-owning handle to a node.
#[derive(Clone, Debug, Default)]
pub struct WeakNode(Weak<RefCell<NodeData>>);

impl WeakNode {
    /// Get the node back if it is still alive.
    pub fn upgrade(&self) -> Option<NodeRef> {
        self.0.upgrade().map(NodeRef)
    }

    /// Check whether the node has been dropped.
    pub fn is_dead(&self) -> bool {
        self.0.strong_count() == 0
    }
}

impl NodeRef {
    fn from_kind(kind: NodeKind) -> Self {
        Self(Rc::new(RefCell::new(NodeData {
            id: next_id(),
            kind,
            flags: NodeFlags::empty(),
            children: Vec::new(),
        })))
    }

    /// Create an element with no attributes or children.
    pub fn element(tag: &str) -> Self {
        Self::from_kind(NodeKind::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    /// Create a text node.
    pub fn text(text: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Text(text.into()))
    }

    /// Create a comment node.
    pub fn comment(text: impl Into<String>) -> Self {
        Self::from_kind(NodeKind::Comment(text.into()))
    }

    /// Builder: add an attribute.
    #[must_use]
    pub fn with_attr(self, name: &str, value: &str) -> Self {
        self.set_attr(name, value);
        self
    }

    /// Builder: append a child.
    #[must_use]
    pub fn with_child(self, child: Self) -> Self {
        self.append_child(child);
        self
    }

    /// Builder: mark the node as protected from removal.
    #[must_use]
    pub fn ignored(self) -> Self {
        self.insert_flags(NodeFlags::IGNORED);
        self
    }

    /// Unique identity of this node.
    pub fn id(&self) -> NodeId {
        self.0.borrow().id
    }

    /// Borrow the node kind.
    pub fn kind(&self) -> Ref<'_, NodeKind> {
        Ref::map(self.0.borrow(), |d| &d.kind)
    }

    /// Replace the node kind in place. Identity and children are kept.
    pub fn set_kind(&self, kind: NodeKind) {
        self.0.borrow_mut().kind = kind;
    }

    /// Tag name if this is an element.
    pub fn tag(&self) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Element { tag, .. } => Some(tag.clone()),
            _ => None,
        }
    }

    /// Check whether this is an element.
    pub fn is_element(&self) -> bool {
        matches!(self.0.borrow().kind, NodeKind::Element { .. })
    }

    /// Text content if this is a text node.
    pub fn text_content(&self) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Text(t) => Some(t.clone()),
            _ => None,
        }
    }

    /// Concatenated text of this node and all descendants.
    pub fn deep_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        let data = self.0.borrow();
        if let NodeKind::Text(t) = &data.kind {
            out.push_str(t);
        }
        for child in &data.children {
            child.collect_text(out);
        }
    }

    /// Get an attribute value.
    pub fn attr(&self, name: &str) -> Option<String> {
        match &self.0.borrow().kind {
            NodeKind::Element { attrs, .. } => attrs
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone()),
            _ => None,
        }
    }

    /// Set an attribute, keeping its position if it already exists.
    /// No-op on non-elements.
    pub fn set_attr(&self, name: &str, value: &str) {
        if let NodeKind::Element { attrs, .. } = &mut self.0.borrow_mut().kind {
            if let Some(slot) = attrs.iter_mut().find(|(n, _)| n == name) {
                if slot.1 != value {
                    value.clone_into(&mut slot.1);
                }
            } else {
                attrs.push((name.to_owned(), value.to_owned()));
            }
        }
    }

    /// Remove an attribute. Returns the old value.
    pub fn remove_attr(&self, name: &str) -> Option<String> {
        if let NodeKind::Element { attrs, .. } = &mut self.0.borrow_mut().kind {
            let idx = attrs.iter().position(|(n, _)| n == name)?;
            return Some(attrs.remove(idx).1);
        }
        None
    }

    /// Snapshot of the attributes (empty for non-elements).
    pub fn attrs(&self) -> Vec<(String, String)> {
        match &self.0.borrow().kind {
            NodeKind::Element { attrs, .. } => attrs.clone(),
            _ => Vec::new(),
        }
    }

    /// Current flags.
    pub fn flags(&self) -> NodeFlags {
        self.0.borrow().flags
    }

    /// Add flags.
    pub fn insert_flags(&self, flags: NodeFlags) {
        self.0.borrow_mut().flags.insert(flags);
    }

    /// Remove flags.
    pub fn remove_flags(&self, flags: NodeFlags) {
        self.0.borrow_mut().flags.remove(flags);
    }

    /// Check whether the node is protected from removal.
    pub fn is_ignored(&self) -> bool {
        self.flags().contains(NodeFlags::IGNORED)
    }

    /// Number of direct children.
    pub fn child_count(&self) -> usize {
        self.0.borrow().children.len()
    }

    /// Child at `index`.
    pub fn child(&self, index: usize) -> Option<Self> {
        self.0.borrow().children.get(index).cloned()
    }

    /// Snapshot of the direct children.
    pub fn children(&self) -> Vec<Self> {
        self.0.borrow().children.clone()
    }

    /// Append a child.
    pub fn append_child(&self, child: Self) {
        self.0.borrow_mut().children.push(child);
    }

    /// Insert a child at `index` (clamped to the child count).
    pub fn insert_child(&self, index: usize, child: Self) {
        let mut data = self.0.borrow_mut();
        let index = index.min(data.children.len());
        data.children.insert(index, child);
    }

    /// Remove the child at `index`.
    pub fn remove_child(&self, index: usize) -> Option<Self> {
        let mut data = self.0.borrow_mut();
        (index < data.children.len()).then(|| data.children.remove(index))
    }

    /// Remove the last child.
    pub fn pop_child(&self) -> Option<Self> {
        self.0.borrow_mut().children.pop()
    }

    /// Replace all children.
    pub fn set_children(&self, children: Vec<Self>) {
        self.0.borrow_mut().children = children;
    }

    /// Remove every child that is not protected from removal.
    pub fn clear_children(&self) {
        self.0.borrow_mut().children.retain(Self::is_ignored);
    }

    /// Clone this node and its subtree. Clones get fresh identities.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        let data = self.0.borrow();
        let clone = Self::from_kind(data.kind.clone());
        clone.0.borrow_mut().flags = data.flags;
        clone.0.borrow_mut().children = data.children.iter().map(Self::deep_clone).collect();
        clone
    }

    /// Check whether two handles point at the same node.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Create a weak handle.
    pub fn downgrade(&self) -> WeakNode {
        WeakNode(Rc::downgrade(&self.0))
    }

    /// Serialize this node and its subtree.
    pub fn outer_markup(&self) -> String {
        let mut out = String::new();
        self.write_markup(&mut out);
        out
    }

    /// Serialize only the children.
    pub fn inner_markup(&self) -> String {
        let mut out = String::new();
        for child in &self.0.borrow().children {
            child.write_markup(&mut out);
        }
        out
    }

    fn write_markup(&self, out: &mut String) {
        let data = self.0.borrow();
        match &data.kind {
            NodeKind::Text(t) => escape_text(t, out),
            NodeKind::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
            NodeKind::Element { tag, attrs } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_attr(value, out);
                    out.push('"');
                }
                out.push('>');
                if is_void(tag) {
                    return;
                }
                for child in &data.children {
                    child.write_markup(out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id())
            .field("markup", &self.outer_markup())
            .finish()
    }
}

/// Escape text content.
pub fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
}

/// Escape an attribute value for a double-quoted attribute.
pub fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            _ => out.push(ch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = NodeRef::element("p");
        let b = NodeRef::element("p");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_serialize_nested() {
        let p = NodeRef::element("P")
            .with_attr("class", "a\"b")
            .with_child(NodeRef::text("x < y & z"))
            .with_child(NodeRef::element("br"));

        assert_eq!(
            p.outer_markup(),
            "<p class=\"a&quot;b\">x &lt; y &amp; z<br></p>"
        );
        assert_eq!(p.inner_markup(), "x &lt; y &amp; z<br>");
    }

    #[test]
    fn test_attr_update_keeps_order() {
        let el = NodeRef::element("a")
            .with_attr("href", "/x")
            .with_attr("id", "l");
        el.set_attr("href", "/y");
        assert_eq!(
            el.attrs(),
            vec![("href".into(), "/y".into()), ("id".into(), "l".into())]
        );
        assert_eq!(el.remove_attr("href"), Some("/y".into()));
        assert_eq!(el.attr("href"), None);
    }

    #[test]
    fn test_deep_clone_fresh_identity() {
        let p = NodeRef::element("p")
            .with_child(NodeRef::text("hi"))
            .ignored();
        let c = p.deep_clone();

        assert!(!c.ptr_eq(&p));
        assert_ne!(c.id(), p.id());
        assert!(!c.child(0).unwrap().ptr_eq(&p.child(0).unwrap()));
        assert_eq!(c.outer_markup(), p.outer_markup());
        assert!(c.is_ignored());
    }

    #[test]
    fn test_child_mutation() {
        let root = NodeRef::element("div");
        root.append_child(NodeRef::text("a"));
        root.append_child(NodeRef::text("c"));
        root.insert_child(1, NodeRef::text("b"));
        assert_eq!(root.deep_text(), "abc");

        assert!(root.remove_child(5).is_none());
        assert_eq!(root.remove_child(0).unwrap().text_content(), Some("a".into()));
        assert_eq!(root.pop_child().unwrap().text_content(), Some("c".into()));
        assert_eq!(root.child_count(), 1);
    }

    #[test]
    fn test_clear_children_keeps_ignored() {
        let root = NodeRef::element("div");
        root.append_child(NodeRef::element("p"));
        root.append_child(NodeRef::element("span").ignored());
        root.clear_children();

        assert_eq!(root.child_count(), 1);
        assert!(root.child(0).unwrap().is_ignored());
    }

    #[test]
    fn test_weak_node() {
        let node = NodeRef::element("div");
        let weak = node.downgrade();
        assert!(weak.upgrade().unwrap().ptr_eq(&node));

        drop(node);
        assert!(weak.is_dead());
        assert!(weak.upgrade().is_none());
    }
}
