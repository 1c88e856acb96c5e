// SPDX-License-Identifier: Apache-2.0

//! Filter runtime: composable, re-entrant AST rewriting.
//!
//! Filters compose by chained dispatch. The stack holds the filters
//! outermost-first; `process` starts at index 0 and a handler's call to
//! [`Chain::process`] ("super") dispatches the same node at index + 1.
//! Past the last filter, the default rewrite reconstructs the node from its
//! recursively processed children, restarting the chain at the top for each
//! child. A handler therefore always observes the rewrite produced by the
//! layers below it.

mod camel_case;
mod erb;
mod esm;
mod functions;
mod return_;
mod strict;

pub use camel_case::CamelCase;
pub use erb::Erb;
pub use esm::Esm;
pub use functions::Functions;
pub use return_::Return;
pub use strict::Strict;

use crate::ast::{Child, Node, NodeId, NodeType};
use crate::comments::CommentMap;
use crate::error::Error;
use crate::namespace::Namespace;
use crate::options::Options;
use indexmap::IndexSet;
use tracing::debug;

/// Shared per-compile state every filter handler can reach.
pub struct FilterContext<'o> {
    pub options: &'o Options,
    pub namespace: Namespace,
    pub comments: CommentMap,
    /// Nodes to splice ahead of the final AST: imports, `"use strict"`.
    pub prepend: Vec<Node>,
    pub disable_autoimports: bool,
    pub disable_autoexports: bool,
    /// Identity of the tree root, set by the pipeline before the run.
    pub root: Option<NodeId>,
    /// Identifiers already auto-imported in this compile.
    pub autoimported: IndexSet<String>,
}

impl<'o> FilterContext<'o> {
    pub fn new(options: &'o Options, comments: CommentMap) -> FilterContext<'o> {
        FilterContext {
            options,
            namespace: Namespace::new(),
            comments,
            prepend: Vec::new(),
            disable_autoimports: false,
            disable_autoexports: false,
            root: None,
            autoimported: IndexSet::new(),
        }
    }

    pub fn is_root(&self, node: &Node) -> bool {
        self.root == Some(node.id())
    }

    /// Push a node onto the prepend list. Duplicates are removed by the
    /// pipeline when the list is spliced.
    pub fn prepend(&mut self, node: Node) {
        self.prepend.push(node);
    }

    /// Build a `FilterFailure` for a node, carrying its location.
    pub fn fail(&self, filter: &str, node: &Node, message: impl Into<String>) -> Error {
        Error::FilterFailure {
            filter: filter.to_string(),
            location: node.location(),
            message: message.into(),
        }
    }
}

/// Handle to the rest of the filter stack, one index deep.
#[derive(Clone, Copy)]
pub struct Chain<'s> {
    stack: &'s FilterStack,
    next: usize,
}

impl Chain<'_> {
    /// Delegate the node upward: the analogue of `super`.
    pub fn process(&self, node: &Node, ctx: &mut FilterContext) -> Result<Option<Node>, Error> {
        self.stack.dispatch(self.next, node, ctx)
    }

    /// Re-enter the full stack from the top, for children a handler
    /// constructs itself.
    pub fn rewrite(&self, node: &Node, ctx: &mut FilterContext) -> Result<Option<Node>, Error> {
        self.stack.dispatch(0, node, ctx)
    }
}

macro_rules! tag_handlers {
    ($($method:ident),+ $(,)?) => {
        $(
            fn $method(
                &self,
                node: &Node,
                ctx: &mut FilterContext,
                chain: Chain,
            ) -> Result<Option<Node>, Error> {
                chain.process(node, ctx)
            }
        )+
    };
}

/// An AST rewriter. Per-tag handlers default to delegating upward; a filter
/// overrides the tags it cares about and may return a new node, delegate,
/// or return `None` to elide the node entirely.
pub trait Filter {
    fn name(&self) -> &'static str;

    /// Permute the filter list before composition. Applied to fixpoint.
    fn reorder(&self, names: Vec<String>) -> Vec<String> {
        names
    }

    /// Lifecycle hook run once before the tree is processed.
    fn begin_compile(&self, _ctx: &mut FilterContext) -> Result<(), Error> {
        Ok(())
    }

    /// Split mixed Ruby/template sources at a terminator sentinel. The head
    /// is parsed as Ruby; the tail is handed to [`Filter::lower_template`].
    fn split_source<'a>(&self, _source: &'a str) -> Option<(&'a str, &'a str)> {
        None
    }

    /// Compile a template tail into an expression tree to be spliced after
    /// the head's statements.
    fn lower_template(&self, _tail: &str, _options: &Options) -> Result<Option<Node>, Error> {
        Ok(None)
    }

    fn handle(
        &self,
        node: &Node,
        ctx: &mut FilterContext,
        chain: Chain,
    ) -> Result<Option<Node>, Error> {
        match node.typ() {
            NodeType::Send => self.on_send(node, ctx, chain),
            NodeType::Csend => self.on_csend(node, ctx, chain),
            NodeType::Block => self.on_block(node, ctx, chain),
            NodeType::Def => self.on_def(node, ctx, chain),
            NodeType::Defs => self.on_defs(node, ctx, chain),
            NodeType::Class => self.on_class(node, ctx, chain),
            NodeType::Module => self.on_module(node, ctx, chain),
            NodeType::Begin => self.on_begin(node, ctx, chain),
            NodeType::Kwbegin => self.on_kwbegin(node, ctx, chain),
            NodeType::Lvar => self.on_lvar(node, ctx, chain),
            NodeType::Lvasgn => self.on_lvasgn(node, ctx, chain),
            NodeType::Ivar => self.on_ivar(node, ctx, chain),
            NodeType::Ivasgn => self.on_ivasgn(node, ctx, chain),
            NodeType::Cvar => self.on_cvar(node, ctx, chain),
            NodeType::Cvasgn => self.on_cvasgn(node, ctx, chain),
            NodeType::Gvar => self.on_gvar(node, ctx, chain),
            NodeType::Gvasgn => self.on_gvasgn(node, ctx, chain),
            NodeType::Const => self.on_const(node, ctx, chain),
            NodeType::Casgn => self.on_casgn(node, ctx, chain),
            NodeType::Masgn => self.on_masgn(node, ctx, chain),
            NodeType::OpAsgn => self.on_op_asgn(node, ctx, chain),
            NodeType::OrAsgn => self.on_or_asgn(node, ctx, chain),
            NodeType::AndAsgn => self.on_and_asgn(node, ctx, chain),
            NodeType::Arg => self.on_arg(node, ctx, chain),
            NodeType::Optarg => self.on_optarg(node, ctx, chain),
            NodeType::Restarg => self.on_restarg(node, ctx, chain),
            NodeType::Kwarg => self.on_kwarg(node, ctx, chain),
            NodeType::Kwoptarg => self.on_kwoptarg(node, ctx, chain),
            NodeType::Blockarg => self.on_blockarg(node, ctx, chain),
            NodeType::If => self.on_if(node, ctx, chain),
            NodeType::Case => self.on_case(node, ctx, chain),
            NodeType::While => self.on_while(node, ctx, chain),
            NodeType::Until => self.on_until(node, ctx, chain),
            NodeType::For => self.on_for(node, ctx, chain),
            NodeType::Return => self.on_return(node, ctx, chain),
            NodeType::Yield => self.on_yield(node, ctx, chain),
            NodeType::Dstr => self.on_dstr(node, ctx, chain),
            NodeType::Xstr => self.on_xstr(node, ctx, chain),
            NodeType::Pair => self.on_pair(node, ctx, chain),
            NodeType::Sym => self.on_sym(node, ctx, chain),
            NodeType::Defined => self.on_defined(node, ctx, chain),
            _ => self.on_other(node, ctx, chain),
        }
    }

    tag_handlers!(
        on_send, on_csend, on_block, on_def, on_defs, on_class, on_module, on_begin,
        on_kwbegin, on_lvar, on_lvasgn, on_ivar, on_ivasgn, on_cvar, on_cvasgn, on_gvar,
        on_gvasgn, on_const, on_casgn, on_masgn, on_op_asgn, on_or_asgn, on_and_asgn,
        on_arg, on_optarg, on_restarg, on_kwarg, on_kwoptarg, on_blockarg, on_if, on_case,
        on_while, on_until, on_for, on_return, on_yield, on_dstr, on_xstr, on_pair, on_sym,
        on_defined, on_other,
    );
}

/// The composed filter stack, outermost filter first.
pub struct FilterStack {
    filters: Vec<Box<dyn Filter>>,
}

impl FilterStack {
    /// Compose a user-ordered filter list: the rightmost filter becomes the
    /// outermost visitor.
    pub fn compose(mut filters: Vec<Box<dyn Filter>>) -> FilterStack {
        filters.reverse();
        FilterStack { filters }
    }

    pub fn filters(&self) -> &[Box<dyn Filter>] {
        &self.filters
    }

    pub fn begin_compile(&self, ctx: &mut FilterContext) -> Result<(), Error> {
        for filter in &self.filters {
            filter.begin_compile(ctx)?;
        }
        Ok(())
    }

    /// Rewrite a tree through the whole stack.
    pub fn process(&self, node: &Node, ctx: &mut FilterContext) -> Result<Option<Node>, Error> {
        self.dispatch(0, node, ctx)
    }

    fn dispatch(
        &self,
        index: usize,
        node: &Node,
        ctx: &mut FilterContext,
    ) -> Result<Option<Node>, Error> {
        match self.filters.get(index) {
            Some(filter) => {
                let chain = Chain {
                    stack: self,
                    next: index + 1,
                };
                filter.handle(node, ctx, chain)
            }
            None => self.rebuild(node, ctx),
        }
    }

    /// Default rewrite: reconstruct the node with processed children. An
    /// elided child vanishes from statement lists and becomes the nil value
    /// elsewhere.
    fn rebuild(&self, node: &Node, ctx: &mut FilterContext) -> Result<Option<Node>, Error> {
        let mut children = Vec::with_capacity(node.children().len());
        let mut changed = false;
        let statement_list = matches!(node.typ(), NodeType::Begin | NodeType::Kwbegin);
        for child in node.children() {
            match child {
                Child::Node(inner) => match self.process(inner, ctx)? {
                    Some(rewritten) => {
                        if rewritten.id() != inner.id() {
                            changed = true;
                        }
                        children.push(Child::Node(rewritten));
                    }
                    None => {
                        changed = true;
                        if !statement_list {
                            children.push(Child::Nil);
                        }
                    }
                },
                other => children.push(other.clone()),
            }
        }
        if changed {
            Ok(Some(node.updated(None, Some(children))))
        } else {
            Ok(Some(node.clone()))
        }
    }
}

type FilterFactory = fn() -> Box<dyn Filter>;

/// The registered filter table: name → constructor.
pub fn registry() -> &'static [(&'static str, FilterFactory)] {
    &[
        ("return", || Box::new(Return)),
        ("functions", || Box::new(Functions)),
        ("camelCase", || Box::new(CamelCase)),
        ("esm", || Box::new(Esm)),
        ("strict", || Box::new(Strict)),
        ("erb", || Box::new(Erb)),
    ]
}

/// Instantiate filters by name, preserving order. Unknown names are
/// configuration errors.
pub fn build(names: &[String]) -> Result<Vec<Box<dyn Filter>>, Error> {
    let table = registry();
    let mut filters = Vec::with_capacity(names.len());
    for name in names {
        let factory = table
            .iter()
            .find(|(registered, _)| registered == name)
            .map(|(_, factory)| factory)
            .ok_or_else(|| Error::config(format!("unrecognized filter {name:?}")))?;
        filters.push(factory());
    }
    Ok(filters)
}

/// Apply each filter's `reorder` hint until the order stops changing.
pub fn reorder(filters: Vec<Box<dyn Filter>>) -> Result<Vec<Box<dyn Filter>>, Error> {
    let mut names: Vec<String> = filters
        .iter()
        .map(|filter| filter.name().to_string())
        .collect();
    let limit = names.len().saturating_mul(names.len()).max(1);
    for _ in 0..limit {
        let mut next = names.clone();
        for filter in &filters {
            next = filter.reorder(next);
        }
        if next == names {
            break;
        }
        names = next;
    }
    debug!(order = ?names, "filter order after reorder hints");

    let mut pool: Vec<Option<Box<dyn Filter>>> = filters.into_iter().map(Some).collect();
    let mut ordered = Vec::with_capacity(pool.len());
    for name in &names {
        let slot = pool
            .iter_mut()
            .find(|slot| slot.as_deref().is_some_and(|filter| filter.name() == name))
            .ok_or_else(|| Error::config(format!("reorder produced unknown filter {name:?}")))?;
        ordered.push(slot.take().expect("slot checked above"));
    }
    Ok(ordered)
}
