// SPDX-License-Identifier: Apache-2.0

//! Comment tracking across filter rewrites.
//!
//! Filters produce new nodes, so comment attachment cannot survive a pass
//! by identity. The raw comment list from the parser is invariant; the map
//! from node identity to comments is rebuilt from it after every filter
//! pass using the current tree's locations.

use crate::ast::{Child, Node, NodeId};
use crate::ast::SourceBuffer;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;

/// A single comment as delivered by the parser: raw text (including the
/// `#` or `=begin` introducer) plus its buffer and range.
#[derive(Debug, Clone)]
pub struct Comment {
    pub buffer: Arc<SourceBuffer>,
    pub range: Range<usize>,
    pub text: String,
}

impl Comment {
    /// True for `=begin`/`=end` block comments.
    pub fn is_block(&self) -> bool {
        self.text.starts_with("=begin")
    }
}

#[derive(Debug, Default)]
pub struct CommentMap {
    /// The full comment list from the parser, in source order.
    raw: Vec<Comment>,
    /// Node identity → comments preceding that node.
    leading: HashMap<NodeId, Vec<Comment>>,
    /// Node identity → comments on the same line, after the node's end.
    trailing: HashMap<NodeId, Vec<Comment>>,
    /// Comments that follow the last located node.
    orphan: Vec<Comment>,
}

impl CommentMap {
    pub fn new(raw: Vec<Comment>) -> CommentMap {
        CommentMap {
            raw,
            ..CommentMap::default()
        }
    }

    pub fn raw(&self) -> &[Comment] {
        &self.raw
    }

    pub fn leading(&self, id: NodeId) -> &[Comment] {
        self.leading.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn trailing(&self, id: NodeId) -> &[Comment] {
        self.trailing.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn orphans(&self) -> &[Comment] {
        &self.orphan
    }

    /// Register an explicitly empty entry, so a synthesized node (like the
    /// pipeline's wrapper root) does not inherit comments from its first
    /// child on the next re-association.
    pub fn register_empty(&mut self, id: NodeId) {
        self.leading.entry(id).or_default();
    }

    /// Redistribute the raw comments over the current tree.
    pub fn reassociate(&mut self, root: &Node) {
        self.leading.retain(|_, comments| {
            comments.clear();
            true
        });
        self.trailing.clear();
        self.orphan.clear();

        let mut anchors = Vec::new();
        collect_anchors(root, &mut anchors);
        // Stable by start offset; preorder supplies outermost-first ties.
        anchors.sort_by_key(|anchor| anchor.start);

        for comment in self.raw.clone() {
            match place(&comment, &anchors) {
                Placement::Leading(id) => self.leading.entry(id).or_default().push(comment),
                Placement::Trailing(id) => self.trailing.entry(id).or_default().push(comment),
                Placement::Orphan => self.orphan.push(comment),
            }
        }
    }
}

struct Anchor {
    id: NodeId,
    start: usize,
    end: usize,
    end_line: usize,
    buffer: Arc<SourceBuffer>,
}

enum Placement {
    Leading(NodeId),
    Trailing(NodeId),
    Orphan,
}

fn collect_anchors(node: &Node, anchors: &mut Vec<Anchor>) {
    if let Some(loc) = node.loc() {
        let end_line = loc
            .buffer
            .line_col(loc.range.end.saturating_sub(1).max(loc.range.start))
            .0;
        anchors.push(Anchor {
            id: node.id(),
            start: loc.range.start,
            end: loc.range.end,
            end_line,
            buffer: loc.buffer.clone(),
        });
    }
    for child in node.children() {
        if let Child::Node(child) = child {
            collect_anchors(child, anchors);
        }
    }
}

fn place(comment: &Comment, anchors: &[Anchor]) -> Placement {
    let same_buffer =
        |anchor: &Anchor| anchor.buffer.name() == comment.buffer.name();
    let comment_line = comment.buffer.line_col(comment.range.start).0;

    // Trailing rule: same line as, and after, a node's end. The outermost
    // node ending closest before the comment wins.
    let trailing = anchors
        .iter()
        .filter(|anchor| same_buffer(anchor))
        .filter(|anchor| anchor.end <= comment.range.start)
        .filter(|anchor| anchor.end_line == comment_line)
        .max_by_key(|anchor| anchor.end);
    if let Some(anchor) = trailing {
        return Placement::Trailing(anchor.id);
    }

    // Otherwise the nearest following node by start offset.
    let following = anchors
        .iter()
        .filter(|anchor| same_buffer(anchor))
        .filter(|anchor| anchor.start >= comment.range.end)
        .min_by_key(|anchor| anchor.start);
    match following {
        Some(anchor) => Placement::Leading(anchor.id),
        None => Placement::Orphan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Location, NodeType};

    fn located(typ: NodeType, buffer: &Arc<SourceBuffer>, range: Range<usize>) -> Node {
        Node::with_loc(typ, vec![], Some(Location::new(buffer.clone(), range)))
    }

    fn comment(buffer: &Arc<SourceBuffer>, range: Range<usize>) -> Comment {
        let text = buffer.source()[range.clone()].to_string();
        Comment {
            buffer: buffer.clone(),
            range,
            text,
        }
    }

    #[test]
    fn comment_attaches_to_nearest_following_node() {
        let buffer = SourceBuffer::new("app.rb", "# leading\na = 1\n");
        let assign = located(NodeType::Lvasgn, &buffer, 10..15);
        let root = Node::new(NodeType::Begin, vec![Child::Node(assign.clone())]);

        let mut map = CommentMap::new(vec![comment(&buffer, 0..9)]);
        map.reassociate(&root);
        assert_eq!(map.leading(assign.id()).len(), 1);
        assert!(map.orphans().is_empty());
    }

    #[test]
    fn same_line_comment_becomes_trailing() {
        let buffer = SourceBuffer::new("app.rb", "a = 1 # note\nb = 2\n");
        let first = located(NodeType::Lvasgn, &buffer, 0..5);
        let second = located(NodeType::Lvasgn, &buffer, 13..18);
        let root = Node::new(
            NodeType::Begin,
            vec![Child::Node(first.clone()), Child::Node(second.clone())],
        );

        let mut map = CommentMap::new(vec![comment(&buffer, 6..12)]);
        map.reassociate(&root);
        assert_eq!(map.trailing(first.id()).len(), 1);
        assert!(map.leading(second.id()).is_empty());
    }

    #[test]
    fn comment_after_last_node_is_orphan() {
        let buffer = SourceBuffer::new("app.rb", "a = 1\n# done\n");
        let assign = located(NodeType::Lvasgn, &buffer, 0..5);
        let root = Node::new(NodeType::Begin, vec![Child::Node(assign.clone())]);

        let mut map = CommentMap::new(vec![comment(&buffer, 6..12)]);
        map.reassociate(&root);
        assert_eq!(map.orphans().len(), 1);
    }

    #[test]
    fn buffer_mismatch_prevents_pairing() {
        let code = SourceBuffer::new("app.rb", "a = 1\n");
        let other = SourceBuffer::new("other.rb", "# elsewhere\n");
        let assign = located(NodeType::Lvasgn, &code, 0..5);
        let root = Node::new(NodeType::Begin, vec![Child::Node(assign.clone())]);

        let mut map = CommentMap::new(vec![comment(&other, 0..11)]);
        map.reassociate(&root);
        assert!(map.leading(assign.id()).is_empty());
        assert_eq!(map.orphans().len(), 1);
    }
}
