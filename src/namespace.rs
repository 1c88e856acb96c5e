// SPDX-License-Identifier: Apache-2.0

//! Class and module identity tracking across nested definitions.
//!
//! A namespace is a stack of scope frames, each frame the resolved relative
//! path pushed by one `enter`, plus a side map keyed by fully-qualified path
//! carrying the members seen so far. Re-entering a path that is already in
//! the side map is the sole signal that a class or module is being reopened.
//!
//! All operations are total. A namespace is owned by a single compile.

use crate::ast::{Child, Node, NodeType};
use indexmap::IndexMap;
use tracing::trace;

/// Kind of member recorded for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member {
    Method,
    StaticMethod,
    Attr,
    Ivar,
    Cvar,
    Const,
}

pub type Members = IndexMap<String, Member>;

#[derive(Debug, Default)]
pub struct Namespace {
    /// Stack of frames; each frame is the (possibly multi-component)
    /// relative path pushed by one `enter`.
    active: Vec<Vec<String>>,
    /// Fully-qualified path → member inventory.
    seen: IndexMap<Vec<String>, Members>,
}

impl Namespace {
    pub fn new() -> Namespace {
        Namespace::default()
    }

    /// Resolve a chain of `const` nodes rooted at nil (`A::B::C` is
    /// `const(const(const(nil, A), B), C)`) to `[A, B, C]`. Non-const
    /// children terminate the walk.
    pub fn resolve(const_ref: &Node) -> Vec<String> {
        let mut path = Vec::new();
        let mut cursor = Some(const_ref);
        while let Some(node) = cursor {
            if node.typ() != NodeType::Const {
                break;
            }
            if let Some(name) = node.sym_at(1) {
                path.push(name.to_string());
            }
            cursor = match node.child(0) {
                Some(Child::Node(scope)) => Some(scope),
                _ => None,
            };
        }
        path.reverse();
        path
    }

    fn full_path(&self) -> Vec<String> {
        self.active.iter().flatten().cloned().collect()
    }

    /// Push the resolved relative path. Returns the previously recorded
    /// member set when the resulting fully-qualified path has been entered
    /// before: the reopen signal.
    pub fn enter(&mut self, const_ref: &Node) -> Option<Members> {
        let relative = Self::resolve(const_ref);
        self.active.push(relative);
        let full = self.full_path();
        trace!(path = ?full, "namespace enter");
        match self.seen.get(&full) {
            Some(members) => Some(members.clone()),
            None => {
                self.seen.insert(full, Members::new());
                None
            }
        }
    }

    /// Pop one frame.
    pub fn leave(&mut self) {
        let frame = self.active.pop();
        trace!(frame = ?frame, "namespace leave");
    }

    /// Merge members into the current scope.
    pub fn define(&mut self, props: impl IntoIterator<Item = (String, Member)>) {
        let full = self.full_path();
        let members = self.seen.entry(full).or_default();
        for (name, member) in props {
            members.insert(name, member);
        }
    }

    /// Search from the deepest enclosing frame outward; first hit wins.
    /// Returns an empty map on miss.
    pub fn find(&self, const_ref: &Node) -> Members {
        let name = Self::resolve(const_ref);
        let mut prefix = self.full_path();
        loop {
            let mut candidate = prefix.clone();
            candidate.extend(name.iter().cloned());
            if let Some(members) = self.seen.get(&candidate) {
                return members.clone();
            }
            if prefix.pop().is_none() {
                return Members::new();
            }
        }
    }

    /// Members of the current scope, or of a named subscope of it.
    pub fn own(&self, name: Option<&str>) -> Members {
        let mut path = self.full_path();
        if let Some(name) = name {
            path.push(name.to_string());
        }
        self.seen.get(&path).cloned().unwrap_or_default()
    }

    /// Fully-qualified dotted name of the current scope.
    pub fn current_path(&self) -> Vec<String> {
        self.full_path()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Child;
    use crate::s;

    fn const_ref(names: &[&str]) -> Node {
        let mut node: Option<Node> = None;
        for name in names {
            node = Some(s!(Const, Child::from(node), crate::ast::sym(*name)));
        }
        node.unwrap()
    }

    #[test]
    fn resolves_nested_const_chains() {
        assert_eq!(Namespace::resolve(&const_ref(&["A"])), vec!["A"]);
        assert_eq!(
            Namespace::resolve(&const_ref(&["A", "B", "C"])),
            vec!["A", "B", "C"]
        );
    }

    #[test]
    fn enter_signals_reopen() {
        let mut namespace = Namespace::new();
        assert!(namespace.enter(&const_ref(&["A"])).is_none());
        namespace.define([("m".to_string(), Member::Method)]);
        namespace.leave();

        let prior = namespace.enter(&const_ref(&["A"])).expect("reopen");
        assert_eq!(prior.get("m"), Some(&Member::Method));
        namespace.leave();
    }

    #[test]
    fn find_searches_outward() {
        let mut namespace = Namespace::new();
        namespace.enter(&const_ref(&["M"]));
        namespace.enter(&const_ref(&["Inner"]));
        namespace.define([("helper".to_string(), Member::Method)]);
        namespace.leave();

        // From inside M, Inner resolves to M::Inner.
        namespace.enter(&const_ref(&["Deep"]));
        let found = namespace.find(&const_ref(&["Inner"]));
        assert_eq!(found.get("helper"), Some(&Member::Method));

        // A miss yields an empty map, never a sentinel.
        assert!(namespace.find(&const_ref(&["Absent"])).is_empty());
    }

    #[test]
    fn own_reads_current_or_named_subscope() {
        let mut namespace = Namespace::new();
        namespace.enter(&const_ref(&["A"]));
        namespace.define([("x".to_string(), Member::Ivar)]);
        assert_eq!(namespace.own(None).get("x"), Some(&Member::Ivar));
        namespace.leave();
        assert_eq!(namespace.own(Some("A")).get("x"), Some(&Member::Ivar));
    }
}
