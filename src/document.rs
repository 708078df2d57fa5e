//! Arena-backed document tree.
//!
//! The document owns an `indextree::Arena` of [`Node`]s and the id of the
//! synthetic root. Children are owned through the arena links; the parent
//! link is non-owning. Nodes bound into a schema field without being appended
//! stay alive through that binding and are released together with their
//! owner by [`Document::free`].

use crate::err::{Error, Result};
use crate::node::Node;
use crate::value::Value;
use indextree::{Arena, NodeEdge, NodeId};
use log::{debug, trace};
use std::ops::{Index, IndexMut};

pub struct Document {
    arena: Arena<Node>,
    root: NodeId,
    data_as_children: bool,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("root", &self.root)
            .field("live_nodes", &self.live_nodes())
            .finish()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Document {
    /// `data_as_children` is the default policy for elements created here.
    pub fn new(data_as_children: bool) -> Self {
        let mut arena = Arena::new();
        let root = arena.new_node(Node::root(data_as_children));
        Document {
            arena,
            root,
            data_as_children,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn default_data_as_children(&self) -> bool {
        self.data_as_children
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.arena.get(id).is_some() && !id.is_removed(&self.arena)
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        if !self.contains(id) {
            return None;
        }
        self.arena.get(id).map(|n| n.get())
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        if !self.contains(id) {
            return None;
        }
        self.arena.get_mut(id).map(|n| n.get_mut())
    }

    pub(crate) fn try_node(&self, id: NodeId) -> Result<&Node> {
        self.node(id).ok_or_else(|| stale(id))
    }

    pub(crate) fn try_node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.node_mut(id).ok_or_else(|| stale(id))
    }

    /// Number of nodes currently alive in the arena, root included.
    pub fn live_nodes(&self) -> usize {
        self.arena.iter().filter(|n| !n.is_removed()).count()
    }

    pub fn insert(&mut self, node: Node) -> NodeId {
        self.arena.new_node(node)
    }

    /// A detached generic element; the name is trimmed and upper-cased.
    pub fn create_element(&mut self, name: &str) -> NodeId {
        let name = name.trim().to_ascii_uppercase();
        self.insert(Node::element(Some(name), self.data_as_children))
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.insert(Node::text_node(text))
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id).and_then(|n| n.parent())
    }

    pub fn is_attached(&self, id: NodeId) -> bool {
        self.parent(id).is_some()
    }

    /// Whether `id` is held by a live owner's schema field.
    pub fn is_bound(&self, id: NodeId) -> bool {
        self.node(id)
            .and_then(|n| n.bound_to)
            .is_some_and(|owner| self.contains(owner))
    }

    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        id.children(&self.arena)
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        if !self.contains(id) {
            return None;
        }
        self.children(id).nth(index)
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.node(id).map_or(0, |n| n.child_count)
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.arena.get(id).and_then(|n| n.last_child())
    }

    /// Appends `child` as the last child of `parent`, detaching it from any
    /// previous parent first.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<NodeId> {
        if self.try_node(parent)?.is_text() {
            return Err(Error::TextNodeMutation {
                action: "add elements",
            });
        }
        self.try_node(child)?;
        if child == self.root || parent.ancestors(&self.arena).any(|a| a == child) {
            return Err(invalid_append(parent, child, "node is an ancestor of the target"));
        }

        if let Some(previous) = self.parent(child) {
            self.remove_child(previous, child)?;
        }

        parent
            .checked_append(child, &mut self.arena)
            .map_err(|e| invalid_append(parent, child, &e.to_string()))?;
        self.try_node_mut(parent)?.child_count += 1;
        trace!("appended {} under {}", child, parent);
        Ok(child)
    }

    /// Detaches `child` from `parent`.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<NodeId> {
        self.try_node(parent)?;
        if !self.contains(child) || self.parent(child) != Some(parent) {
            return Err(Error::NotAChild);
        }
        child.detach(&mut self.arena);
        let node = self.try_node_mut(parent)?;
        node.child_count = node.child_count.saturating_sub(1);
        Ok(child)
    }

    /// Detaches `id` from its parent, if it has one.
    pub fn remove(&mut self, id: NodeId) -> Result<()> {
        if let Some(parent) = self.parent(id) {
            self.remove_child(parent, id)?;
        }
        Ok(())
    }

    /// Drops every child of `id`. Children still bound into `id`'s fields
    /// stay alive, the rest are freed.
    pub fn clean_children(&mut self, id: NodeId) -> Result<()> {
        let children: Vec<NodeId> = self.children(id).collect();
        for child in children {
            self.remove_child(id, child)?;
            self.free(child);
        }
        self.try_node_mut(id)?.cursor = 0;
        Ok(())
    }

    /// Releases a detached, unowned subtree together with the nodes that are
    /// reachable only through its schema fields.
    ///
    /// Returns `false` (and keeps the node) for the root, attached nodes and
    /// nodes still bound to a live owner.
    pub fn free(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.contains(id) || self.is_attached(id) || self.is_bound(id) {
            return false;
        }

        let mut doomed = vec![id];
        let mut cursor = 0;
        while cursor < doomed.len() {
            let top = doomed[cursor];
            cursor += 1;
            for node in top.descendants(&self.arena) {
                let Some(entry) = self.node(node) else {
                    continue;
                };
                for (_, field) in entry.fields() {
                    for value in field.as_list() {
                        if let Value::Node(bound) = value {
                            // Appended bindings go away with the subtree.
                            if self.contains(*bound) && self.parent(*bound).is_none() {
                                doomed.push(*bound);
                            }
                        }
                    }
                }
            }
        }

        debug!("freeing {} detached subtree(s) rooted at {}", doomed.len(), id);
        for node in doomed {
            if self.contains(node) {
                node.remove_subtree(&mut self.arena);
            }
        }
        true
    }

    /// Binds `child` into `owner`'s schema field `name`.
    pub(crate) fn bind_field(&mut self, owner: NodeId, name: &str, child: NodeId) -> Result<()> {
        self.try_node_mut(owner)?
            .set_field(name, Value::Node(child))?;
        self.try_node_mut(child)?.bound_to = Some(owner);
        Ok(())
    }

    pub fn current_child(&self, id: NodeId) -> Option<NodeId> {
        let cursor = self.node(id)?.cursor;
        self.child(id, cursor)
    }

    /// Advances the cursor, then returns the child under it.
    pub fn next_child(&mut self, id: NodeId) -> Option<NodeId> {
        let count = self.child_count(id);
        let node = self.node_mut(id)?;
        if node.cursor > count {
            return None;
        }
        node.cursor += 1;
        self.current_child(id)
    }

    /// Returns the child under the cursor, then advances.
    pub fn iterate_child(&mut self, id: NodeId) -> Option<NodeId> {
        let current = self.current_child(id);
        let count = self.child_count(id);
        if let Some(node) = self.node_mut(id) {
            if node.cursor <= count {
                node.cursor += 1;
            }
        }
        current
    }

    pub fn reset_child(&mut self, id: NodeId) -> Option<NodeId> {
        self.node_mut(id)?.cursor = 0;
        self.current_child(id)
    }

    /// All descendants of `id` (not `id` itself) named `name`, in document order.
    pub fn get_elements_by_tag_name(&self, id: NodeId, name: &str, normalize: bool) -> Vec<NodeId> {
        let query = if normalize {
            name.trim().to_ascii_uppercase()
        } else {
            name.to_string()
        };
        self.descendants(id)
            .filter(|d| self.node(*d).and_then(Node::name) == Some(query.as_str()))
            .collect()
    }

    /// First descendant of `id` in document order whose `id` attribute is `value`.
    pub fn get_element_by_id(&self, id: NodeId, value: &str) -> Option<NodeId> {
        self.descendants(id)
            .find(|d| self.node(*d).and_then(|n| n.attribute("id")) == Some(value))
    }

    fn descendants(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let live = self.contains(id);
        id.descendants(&self.arena).skip(1).filter(move |_| live)
    }

    /// Start/end edges of the subtree under `id`, `id` included.
    pub(crate) fn traverse(&self, id: NodeId) -> impl Iterator<Item = NodeEdge> + '_ {
        let live = self.contains(id);
        id.traverse(&self.arena).filter(move |_| live)
    }

    /// Own raw text followed by every descendant's text, in document order.
    pub fn text_contents(&self, id: NodeId) -> String {
        let mut out = String::new();
        if !self.contains(id) {
            return out;
        }
        for edge in id.traverse(&self.arena) {
            if let NodeEdge::Start(node) = edge {
                if let Some(text) = self.node(node).and_then(Node::text) {
                    out.push_str(text);
                }
            }
        }
        out
    }

    /// Routes `raw` through `owner`'s declared entry `name`.
    pub fn append_expected_value(&mut self, owner: NodeId, name: &str, raw: String) -> Result<()> {
        self.try_node_mut(owner)?.append_expected_value(name, raw)
    }

    /// Runs the finalize lifecycle of `id`: data sub-parser, `validate`,
    /// `post_process`, then the discard check.
    ///
    /// `Ok(false)` asks the caller to detach the node.
    pub fn finalize(&mut self, id: NodeId) -> Result<bool> {
        let node = self.try_node(id)?;
        let data_parser = node.data_parser().cloned();
        let prototype = node.prototype().cloned();

        if let Some(parse) = data_parser {
            let raw = self.try_node(id)?.text().unwrap_or_default().to_string();
            let parsed = parse(self, &raw).ok_or(Error::DataParserReturnedNoNode)?;
            self.append_child(id, parsed)?;
        }

        if let Some(prototype) = prototype {
            if !prototype.validate(self, id) {
                debug!("node {} failed validation", id);
                return Ok(false);
            }
            if !prototype.post_process(self, id) {
                debug!("node {} failed post-processing", id);
                return Ok(false);
            }
        }

        Ok(!self.try_node(id)?.discard_on_finalize())
    }
}

impl Index<NodeId> for Document {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        self.arena[id].get()
    }
}

impl IndexMut<NodeId> for Document {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        self.arena[id].get_mut()
    }
}

fn stale(id: NodeId) -> Error {
    Error::StaleNode { id: id.to_string() }
}

fn invalid_append(parent: NodeId, child: NodeId, reason: &str) -> Error {
    Error::InvalidAppend {
        parent: parent.to_string(),
        child: child.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expected::Expected;
    use crate::value::ValueType;
    use pretty_assertions::assert_eq;

    fn names(doc: &Document, ids: &[NodeId]) -> Vec<String> {
        ids.iter()
            .map(|id| doc[*id].name().unwrap_or("#text").to_string())
            .collect()
    }

    /// root > A(id=1) > [B(id=2) > [C], C(id=2)]
    fn sample() -> (Document, NodeId, NodeId, NodeId, NodeId) {
        let mut doc = Document::default();
        let root = doc.root();
        let a = doc.create_element("a");
        let b = doc.create_element("b");
        let c1 = doc.create_element("c");
        let c2 = doc.create_element("c");
        doc[a].set_attribute("id", "1").unwrap();
        doc[b].set_attribute("id", "2").unwrap();
        doc[c2].set_attribute("ID", "2").unwrap();
        doc.append_child(root, a).unwrap();
        doc.append_child(a, b).unwrap();
        doc.append_child(b, c1).unwrap();
        doc.append_child(a, c2).unwrap();
        (doc, a, b, c1, c2)
    }

    #[test]
    fn test_remove_child_precondition_and_count() {
        let (mut doc, a, b, c1, c2) = sample();
        assert_eq!(doc.child_count(a), 2);

        let err = doc.remove_child(a, c1).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to execute 'removeChild' on 'Node': The node to be removed is not a child of this node."
        );
        assert_eq!(doc.child_count(a), 2);

        doc.remove_child(a, c2).unwrap();
        assert_eq!(doc.child_count(a), 1);
        assert_eq!(doc.parent(c2), None);
        assert_eq!(doc.last_child(a), Some(b));
    }

    #[test]
    fn test_append_moves_between_parents() {
        let (mut doc, a, b, c1, _) = sample();
        doc.append_child(a, c1).unwrap();
        assert_eq!(doc.child_count(b), 0);
        assert_eq!(doc.child_count(a), 3);
        assert_eq!(doc.parent(c1), Some(a));
        assert!(doc.append_child(c1, a).is_err());

        let text = doc.create_text("x");
        assert!(matches!(
            doc.append_child(text, b),
            Err(Error::TextNodeMutation { .. })
        ));
    }

    #[test]
    fn test_search_in_document_order() {
        let (doc, a, b, _, c2) = sample();
        let found = doc.get_elements_by_tag_name(doc.root(), " c ", true);
        assert_eq!(names(&doc, &found), vec!["C", "C"]);
        assert_eq!(found[1], c2);
        assert!(doc.get_elements_by_tag_name(doc.root(), "c", false).is_empty());
        assert!(doc.get_elements_by_tag_name(a, "A", true).is_empty());

        assert_eq!(doc.get_element_by_id(doc.root(), "2"), Some(b));
        assert_eq!(doc.get_element_by_id(doc.root(), "1"), Some(a));
        assert_eq!(doc.get_element_by_id(a, "1"), None);
        assert_eq!(doc.get_element_by_id(doc.root(), "3"), None);
    }

    #[test]
    fn test_cursor_navigation() {
        let (mut doc, a, b, _, c2) = sample();
        assert_eq!(doc.current_child(a), Some(b));
        assert_eq!(doc.iterate_child(a), Some(b));
        assert_eq!(doc.iterate_child(a), Some(c2));
        assert_eq!(doc.iterate_child(a), None);
        assert_eq!(doc.reset_child(a), Some(b));
        assert_eq!(doc.next_child(a), Some(c2));
        assert_eq!(doc.next_child(a), None);
        assert_eq!(doc.child(a, 1), Some(c2));
        assert_eq!(doc.child(a, 5), None);
    }

    #[test]
    fn test_text_contents_in_document_order() {
        let (mut doc, a, b, c1, c2) = sample();
        doc[a].set_text(Some("a".to_string()));
        doc[b].set_text(Some("b".to_string()));
        doc[c1].set_text(Some("c1".to_string()));
        doc[c2].set_text(Some("c2".to_string()));
        assert_eq!(doc.text_contents(doc.root()), "abc1c2");
        assert_eq!(doc.text_contents(b), "bc1");
    }

    #[test]
    fn test_free_releases_detached_subtree_and_bound_nodes() {
        let (mut doc, a, _, _, _) = sample();
        doc[a]
            .expects(
                Expected::new("meta", ValueType::Prototype)
                    .prototype_name("META")
                    .unwrap(),
            )
            .unwrap();
        let meta = doc.create_element("meta");
        doc.bind_field(a, "META", meta).unwrap();
        assert_eq!(doc.live_nodes(), 6);

        assert!(!doc.free(a), "attached nodes are kept");
        assert!(!doc.free(meta), "bound nodes are kept");

        doc.remove(a).unwrap();
        assert!(doc.free(a));
        assert_eq!(doc.live_nodes(), 1);
        assert!(!doc.contains(meta));
    }

    #[test]
    fn test_finalize_runs_data_parser_and_discard() {
        let mut doc = Document::default();
        let root = doc.root();
        let list = doc.create_element("list");
        doc.append_child(root, list).unwrap();
        doc[list].set_text(Some("a,b".to_string()));
        doc[list].use_data_parser(|doc: &mut Document, raw: &str| {
            let items = doc.create_element("items");
            for part in raw.split(',') {
                let item = doc.create_element("item");
                doc[item].set_text(Some(part.to_string()));
                doc.append_child(items, item).ok()?;
            }
            Some(items)
        });
        assert!(doc.finalize(list).unwrap());
        assert_eq!(doc.get_elements_by_tag_name(list, "item", true).len(), 2);

        doc[list].set_discard_on_finalize(true);
        doc[list].use_data_parser(|_: &mut Document, _: &str| None);
        assert!(matches!(
            doc.finalize(list),
            Err(Error::DataParserReturnedNoNode)
        ));
    }
}
