// SPDX-License-Identifier: Apache-2.0

//! The uniform tagged-node AST shared by the parser adapter, the filter
//! pipeline, and the converter.
//!
//! Nodes are immutable; rewrites produce new nodes via [`Node::updated`],
//! which preserves the original location unless one is supplied. Equality
//! and hashing are structural over `(type, children)` and ignore location.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Named character source referenced by locations. Used for source maps,
/// caret diagnostics, and timestamp collection.
#[derive(Debug)]
pub struct SourceBuffer {
    name: PathBuf,
    source: String,
    /// Byte offset of the start of each line.
    line_starts: Vec<usize>,
}

impl SourceBuffer {
    pub fn new(name: impl Into<PathBuf>, source: impl Into<String>) -> Arc<SourceBuffer> {
        let source = source.into();
        let mut line_starts = vec![0];
        for (idx, byte) in source.bytes().enumerate() {
            if byte == b'\n' {
                line_starts.push(idx + 1);
            }
        }
        Arc::new(SourceBuffer {
            name: name.into(),
            source,
            line_starts,
        })
    }

    pub fn name(&self) -> &Path {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// 1-based line and 0-based column for a byte offset.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(idx) => idx,
            Err(idx) => idx - 1,
        };
        (line + 1, offset - self.line_starts[line])
    }

    /// The full text of the line containing `offset`, without its newline.
    pub fn line_text(&self, offset: usize) -> &str {
        let (line, _) = self.line_col(offset);
        let start = self.line_starts[line - 1];
        let end = self
            .line_starts
            .get(line)
            .map(|next| next - 1)
            .unwrap_or(self.source.len());
        &self.source[start..end]
    }

    /// Render a `file:line` prefixed diagnostic with a caret under the range.
    pub fn caret_diagnostic(&self, range: &Range<usize>, message: &str) -> String {
        let (line, col) = self.line_col(range.start);
        let text = self.line_text(range.start);
        let width = range.end.saturating_sub(range.start).max(1);
        let width = width.min(text.len().saturating_sub(col).max(1));
        format!(
            "{}:{}:{}: {}\n{}\n{}{}",
            self.name.display(),
            line,
            col + 1,
            message,
            text,
            " ".repeat(col),
            "^".repeat(width)
        )
    }
}

/// Source location of a node. `range` covers the whole expression;
/// `selector` covers a `send`'s message selector and `name` a definition's
/// name, when the parser recorded them.
#[derive(Debug, Clone)]
pub struct Location {
    pub buffer: Arc<SourceBuffer>,
    pub range: Range<usize>,
    pub selector: Option<Range<usize>>,
    pub name: Option<Range<usize>>,
}

impl Location {
    pub fn new(buffer: Arc<SourceBuffer>, range: Range<usize>) -> Location {
        Location {
            buffer,
            range,
            selector: None,
            name: None,
        }
    }

    /// 1-based line of the start offset.
    pub fn line(&self) -> usize {
        self.buffer.line_col(self.range.start).0
    }

    /// 0-based column of the start offset.
    pub fn col(&self) -> usize {
        self.buffer.line_col(self.range.start).1
    }

    /// Rendered `file:line:col` for error messages.
    pub fn render(&self) -> String {
        let (line, col) = self.buffer.line_col(self.range.start);
        format!("{}:{}:{}", self.buffer.name().display(), line, col + 1)
    }

    /// True when the byte immediately after the selector is `(`, i.e. the
    /// send was written as a parenthesized method call.
    pub fn selector_followed_by_paren(&self) -> bool {
        let Some(selector) = &self.selector else {
            return false;
        };
        self.buffer.source().as_bytes().get(selector.end) == Some(&b'(')
    }
}

/// Tag vocabulary. The parser produces the lexical subset; filters may
/// synthesize the rest (`import`, `export`, `autoreturn`, `xnode`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    // Literals
    Int,
    Float,
    Str,
    Sym,
    Dstr,
    Dsym,
    Regexp,
    Regopt,
    Xstr,
    Array,
    Hash,
    Pair,
    Kwsplat,
    Splat,
    Irange,
    Erange,
    Nil,
    True,
    False,
    SelfNode,
    // Variables
    Lvar,
    Ivar,
    Cvar,
    Gvar,
    Const,
    // Assignment
    Lvasgn,
    Ivasgn,
    Cvasgn,
    Gvasgn,
    Casgn,
    Masgn,
    Mlhs,
    OpAsgn,
    OrAsgn,
    AndAsgn,
    // Calls
    Send,
    Csend,
    Attr,
    AwaitAttr,
    Call,
    Block,
    Blockpass,
    Yield,
    Super,
    Zsuper,
    // Definitions
    Def,
    Defs,
    Class,
    Module,
    Arg,
    Args,
    Optarg,
    Restarg,
    Kwarg,
    Kwoptarg,
    Kwrestarg,
    Blockarg,
    // Statements and control flow
    Begin,
    Kwbegin,
    If,
    Case,
    When,
    CaseMatch,
    InPattern,
    MatchVar,
    ArrayPattern,
    HashPattern,
    While,
    Until,
    WhilePost,
    UntilPost,
    For,
    Break,
    Next,
    Return,
    And,
    Or,
    Not,
    Defined,
    Rescue,
    Resbody,
    Ensure,
    // Synthesized by filters
    Import,
    Export,
    Autoreturn,
    Xnode,
}

impl NodeType {
    /// The parser-side tag name, as it appears in diagnostics.
    pub fn name(self) -> &'static str {
        use NodeType::*;
        match self {
            Int => "int",
            Float => "float",
            Str => "str",
            Sym => "sym",
            Dstr => "dstr",
            Dsym => "dsym",
            Regexp => "regexp",
            Regopt => "regopt",
            Xstr => "xstr",
            Array => "array",
            Hash => "hash",
            Pair => "pair",
            Kwsplat => "kwsplat",
            Splat => "splat",
            Irange => "irange",
            Erange => "erange",
            Nil => "nil",
            True => "true",
            False => "false",
            SelfNode => "self",
            Lvar => "lvar",
            Ivar => "ivar",
            Cvar => "cvar",
            Gvar => "gvar",
            Const => "const",
            Lvasgn => "lvasgn",
            Ivasgn => "ivasgn",
            Cvasgn => "cvasgn",
            Gvasgn => "gvasgn",
            Casgn => "casgn",
            Masgn => "masgn",
            Mlhs => "mlhs",
            OpAsgn => "op_asgn",
            OrAsgn => "or_asgn",
            AndAsgn => "and_asgn",
            Send => "send",
            Csend => "csend",
            Attr => "attr",
            AwaitAttr => "await_attr",
            Call => "call",
            Block => "block",
            Blockpass => "blockpass",
            Yield => "yield",
            Super => "super",
            Zsuper => "zsuper",
            Def => "def",
            Defs => "defs",
            Class => "class",
            Module => "module",
            Arg => "arg",
            Args => "args",
            Optarg => "optarg",
            Restarg => "restarg",
            Kwarg => "kwarg",
            Kwoptarg => "kwoptarg",
            Kwrestarg => "kwrestarg",
            Blockarg => "blockarg",
            Begin => "begin",
            Kwbegin => "kwbegin",
            If => "if",
            Case => "case",
            When => "when",
            CaseMatch => "case_match",
            InPattern => "in_pattern",
            MatchVar => "match_var",
            ArrayPattern => "array_pattern",
            HashPattern => "hash_pattern",
            While => "while",
            Until => "until",
            WhilePost => "while_post",
            UntilPost => "until_post",
            For => "for",
            Break => "break",
            Next => "next",
            Return => "return",
            And => "and",
            Or => "or",
            Not => "not",
            Defined => "defined?",
            Rescue => "rescue",
            Resbody => "resbody",
            Ensure => "ensure",
            Import => "import",
            Export => "export",
            Autoreturn => "autoreturn",
            Xnode => "xnode",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A child slot: a nested node or a primitive. `Nil` is the distinguished
/// absent-child value produced by the parser; it is distinct from the `nil`
/// literal node.
#[derive(Debug, Clone)]
pub enum Child {
    Node(Node),
    Str(String),
    Sym(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Nil,
}

impl Child {
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Child::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_sym(&self) -> Option<&str> {
        match self {
            Child::Sym(name) => Some(name),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Child::Str(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Child::Nil)
    }
}

impl PartialEq for Child {
    fn eq(&self, other: &Child) -> bool {
        match (self, other) {
            (Child::Node(a), Child::Node(b)) => a == b,
            (Child::Str(a), Child::Str(b)) => a == b,
            (Child::Sym(a), Child::Sym(b)) => a == b,
            (Child::Int(a), Child::Int(b)) => a == b,
            (Child::Float(a), Child::Float(b)) => a.to_bits() == b.to_bits(),
            (Child::Bool(a), Child::Bool(b)) => a == b,
            (Child::Nil, Child::Nil) => true,
            _ => false,
        }
    }
}

impl Eq for Child {}

impl Hash for Child {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Child::Node(node) => {
                0u8.hash(state);
                node.hash(state);
            }
            Child::Str(text) => {
                1u8.hash(state);
                text.hash(state);
            }
            Child::Sym(name) => {
                2u8.hash(state);
                name.hash(state);
            }
            Child::Int(value) => {
                3u8.hash(state);
                value.hash(state);
            }
            Child::Float(value) => {
                4u8.hash(state);
                value.to_bits().hash(state);
            }
            Child::Bool(value) => {
                5u8.hash(state);
                value.hash(state);
            }
            Child::Nil => 6u8.hash(state),
        }
    }
}

impl From<Node> for Child {
    fn from(node: Node) -> Child {
        Child::Node(node)
    }
}

impl From<&Node> for Child {
    fn from(node: &Node) -> Child {
        Child::Node(node.clone())
    }
}

impl From<String> for Child {
    fn from(text: String) -> Child {
        Child::Str(text)
    }
}

impl From<&str> for Child {
    fn from(text: &str) -> Child {
        Child::Str(text.to_string())
    }
}

impl From<i64> for Child {
    fn from(value: i64) -> Child {
        Child::Int(value)
    }
}

impl From<f64> for Child {
    fn from(value: f64) -> Child {
        Child::Float(value)
    }
}

impl From<bool> for Child {
    fn from(value: bool) -> Child {
        Child::Bool(value)
    }
}

impl From<Option<Node>> for Child {
    fn from(node: Option<Node>) -> Child {
        match node {
            Some(node) => Child::Node(node),
            None => Child::Nil,
        }
    }
}

/// Symbol child constructor, for the common `s!(Send, recv, sym("map"))`
/// shape in filters.
pub fn sym(name: impl Into<String>) -> Child {
    Child::Sym(name.into())
}

struct NodeInner {
    typ: NodeType,
    children: Vec<Child>,
    loc: Option<Location>,
}

/// Immutable tagged AST node. Cheap to clone; subtree sharing between
/// rewrites is encouraged.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

/// Stable per-compile identity used to key the comment map. Derived from the
/// shared allocation, so clones of one node share an id while structurally
/// equal rewrites do not.
pub type NodeId = usize;

impl Node {
    pub fn new(typ: NodeType, children: Vec<Child>) -> Node {
        Node {
            inner: Arc::new(NodeInner {
                typ,
                children,
                loc: None,
            }),
        }
    }

    pub fn with_loc(typ: NodeType, children: Vec<Child>, loc: Option<Location>) -> Node {
        Node {
            inner: Arc::new(NodeInner { typ, children, loc }),
        }
    }

    /// Copy-with-updates. Preserves the original location unless `loc` is
    /// supplied.
    pub fn updated(&self, typ: Option<NodeType>, children: Option<Vec<Child>>) -> Node {
        Node {
            inner: Arc::new(NodeInner {
                typ: typ.unwrap_or(self.inner.typ),
                children: children.unwrap_or_else(|| self.inner.children.clone()),
                loc: self.inner.loc.clone(),
            }),
        }
    }

    pub fn typ(&self) -> NodeType {
        self.inner.typ
    }

    pub fn children(&self) -> &[Child] {
        &self.inner.children
    }

    pub fn loc(&self) -> Option<&Location> {
        self.inner.loc.as_ref()
    }

    pub fn id(&self) -> NodeId {
        Arc::as_ptr(&self.inner) as NodeId
    }

    pub fn child(&self, index: usize) -> Option<&Child> {
        self.inner.children.get(index)
    }

    pub fn node_at(&self, index: usize) -> Option<&Node> {
        self.child(index).and_then(Child::as_node)
    }

    pub fn sym_at(&self, index: usize) -> Option<&str> {
        self.child(index).and_then(Child::as_sym)
    }

    pub fn str_at(&self, index: usize) -> Option<&str> {
        self.child(index).and_then(Child::as_str)
    }

    /// Rendered `file:line:col`, or a placeholder for synthesized nodes.
    pub fn location(&self) -> String {
        match self.loc() {
            Some(loc) => loc.render(),
            None => "(synthesized)".to_string(),
        }
    }

    /// Whether a reference to this node should become a call rather than a
    /// property access: true for `call`; true for a `send` written with
    /// parentheses; true for `def`/`defs` whose name ends in `!`/`?` or that
    /// take arguments; false for `attr` and `await_attr`.
    pub fn is_method(&self) -> bool {
        match self.typ() {
            NodeType::Call => true,
            NodeType::Attr | NodeType::AwaitAttr => false,
            NodeType::Send | NodeType::Csend => self
                .loc()
                .is_some_and(Location::selector_followed_by_paren),
            NodeType::Def => {
                let name = self.sym_at(0).unwrap_or_default();
                name.ends_with('!')
                    || name.ends_with('?')
                    || self
                        .node_at(1)
                        .is_some_and(|args| !args.children().is_empty())
            }
            NodeType::Defs => {
                let name = self.sym_at(1).unwrap_or_default();
                name.ends_with('!')
                    || name.ends_with('?')
                    || self
                        .node_at(2)
                        .is_some_and(|args| !args.children().is_empty())
            }
            _ => false,
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Node) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
            || (self.inner.typ == other.inner.typ && self.inner.children == other.inner.children)
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.typ.hash(state);
        self.inner.children.hash(state);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.typ())?;
        for child in self.children() {
            match child {
                Child::Node(node) => write!(f, " {node:?}")?,
                Child::Str(text) => write!(f, " {text:?}")?,
                Child::Sym(name) => write!(f, " :{name}")?,
                Child::Int(value) => write!(f, " {value}")?,
                Child::Float(value) => write!(f, " {value}")?,
                Child::Bool(value) => write!(f, " {value}")?,
                Child::Nil => write!(f, " nil")?,
            }
        }
        write!(f, ")")
    }
}

/// S-expression constructor: `s!(Send, recv, sym("map"))`.
#[macro_export]
macro_rules! s {
    ($typ:ident) => {
        $crate::ast::Node::new($crate::ast::NodeType::$typ, vec![])
    };
    ($typ:ident, $($child:expr),+ $(,)?) => {
        $crate::ast::Node::new(
            $crate::ast::NodeType::$typ,
            vec![$($crate::ast::Child::from($child)),+],
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_equality_ignores_location() {
        let buffer = SourceBuffer::new("test.rb", "a + 1");
        let with_loc = Node::with_loc(
            NodeType::Int,
            vec![Child::Int(1)],
            Some(Location::new(buffer, 4..5)),
        );
        let without = s!(Int, 1i64);
        assert_eq!(with_loc, without);
    }

    #[test]
    fn updated_preserves_location() {
        let buffer = SourceBuffer::new("test.rb", "foo");
        let node = Node::with_loc(
            NodeType::Lvar,
            vec![sym("foo")],
            Some(Location::new(buffer, 0..3)),
        );
        let renamed = node.updated(None, Some(vec![sym("bar")]));
        assert!(renamed.loc().is_some());
        assert_eq!(renamed.typ(), NodeType::Lvar);
        assert_ne!(node, renamed);
    }

    #[test]
    fn is_method_for_defs() {
        let bang = s!(Def, sym("save!"), s!(Args), Child::Nil);
        assert!(bang.is_method());
        let plain = s!(Def, sym("area"), s!(Args), Child::Nil);
        assert!(!plain.is_method());
        let with_args = s!(Def, sym("scale"), s!(Args, s!(Arg, sym("n"))), Child::Nil);
        assert!(with_args.is_method());
    }

    #[test]
    fn line_col_lookup() {
        let buffer = SourceBuffer::new("test.rb", "a = 1\nb = 2\n");
        assert_eq!(buffer.line_col(0), (1, 0));
        assert_eq!(buffer.line_col(6), (2, 0));
        assert_eq!(buffer.line_col(10), (2, 4));
    }
}
