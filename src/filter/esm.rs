// SPDX-License-Identifier: Apache-2.0

//! ES-module surface: lowers `require`/`require_relative` into `import`
//! nodes on the prepend list, auto-imports identifiers named in the
//! `autoimports` table, and auto-exports top-level definitions.
//!
//! Carries a `reorder` hint so it composes outermost: filters that
//! introduce `import` nodes must run before the module surface is fixed up.

use super::{Chain, Filter, FilterContext};
use crate::ast::{sym, Child, Node, NodeType};
use crate::error::Error;
use crate::options::AutoExports;
use crate::s;
use tracing::debug;

pub struct Esm;

fn import_side_effect(path: &str) -> Node {
    s!(Import, path)
}

fn import_named(path: &str, name: &str) -> Node {
    s!(Import, path, s!(Array, crate::ast::sym(name)))
}

fn exportable(node: &Node) -> bool {
    matches!(
        node.typ(),
        NodeType::Class | NodeType::Module | NodeType::Def | NodeType::Casgn
    )
}

impl Esm {
    fn autoimport(&self, name: &str, ctx: &mut FilterContext) {
        if ctx.disable_autoimports {
            return;
        }
        let Some(path) = ctx.options.autoimports.get(name) else {
            return;
        };
        if !ctx.autoimported.insert(name.to_string()) {
            return;
        }
        debug!(name, path, "autoimport");
        ctx.prepend(import_named(path, name));
    }

    fn export_wrap(&self, statements: Vec<Node>, ctx: &FilterContext) -> Vec<Node> {
        let mode = ctx.options.autoexports;
        if ctx.disable_autoexports || mode == AutoExports::Off {
            return statements;
        }
        let exportable_count = statements.iter().filter(|node| exportable(node)).count();
        statements
            .into_iter()
            .map(|node| {
                if !exportable(&node) {
                    return node;
                }
                if mode == AutoExports::Default && exportable_count == 1 {
                    Node::new(
                        NodeType::Export,
                        vec![sym("default"), Child::Node(node)],
                    )
                } else {
                    Node::new(NodeType::Export, vec![Child::Node(node)])
                }
            })
            .collect()
    }
}

impl Filter for Esm {
    fn name(&self) -> &'static str {
        "esm"
    }

    /// Compose outermost: rightmost in the filter list.
    fn reorder(&self, mut names: Vec<String>) -> Vec<String> {
        if let Some(index) = names.iter().position(|name| name == "esm") {
            if index != names.len() - 1 {
                let esm = names.remove(index);
                names.push(esm);
            }
        }
        names
    }

    fn on_send(
        &self,
        node: &Node,
        ctx: &mut FilterContext,
        chain: Chain,
    ) -> Result<Option<Node>, Error> {
        let Some(processed) = chain.process(node, ctx)? else {
            return Ok(None);
        };
        if processed.typ() != NodeType::Send {
            return Ok(Some(processed));
        }
        let receiver_nil = processed.child(0).is_some_and(Child::is_nil);
        match processed.sym_at(1) {
            Some("require" | "require_relative") if receiver_nil => {
                if let Some(path) = processed.node_at(2).filter(|arg| arg.typ() == NodeType::Str) {
                    let path = path.str_at(0).unwrap_or_default();
                    ctx.prepend(import_side_effect(path));
                    return Ok(None);
                }
                Ok(Some(processed))
            }
            Some(name) if receiver_nil => {
                self.autoimport(name, ctx);
                Ok(Some(processed))
            }
            _ => Ok(Some(processed)),
        }
    }

    fn on_const(
        &self,
        node: &Node,
        ctx: &mut FilterContext,
        chain: Chain,
    ) -> Result<Option<Node>, Error> {
        let Some(processed) = chain.process(node, ctx)? else {
            return Ok(None);
        };
        if processed.typ() == NodeType::Const && processed.child(0).is_some_and(Child::is_nil) {
            if let Some(name) = processed.sym_at(1) {
                let name = name.to_string();
                // A constant defined in this compile wins over an autoimport.
                if processed.loc().is_some()
                    && ctx.namespace.find(&processed).is_empty()
                {
                    self.autoimport(&name, ctx);
                }
            }
        }
        Ok(Some(processed))
    }

    fn on_begin(
        &self,
        node: &Node,
        ctx: &mut FilterContext,
        chain: Chain,
    ) -> Result<Option<Node>, Error> {
        let at_root = ctx.is_root(node);
        let Some(processed) = chain.process(node, ctx)? else {
            return Ok(None);
        };
        if !at_root || processed.typ() != NodeType::Begin {
            return Ok(Some(processed));
        }
        let statements: Vec<Node> = processed
            .children()
            .iter()
            .filter_map(Child::as_node)
            .cloned()
            .collect();
        let exported = self.export_wrap(statements, ctx);
        Ok(Some(processed.updated(
            None,
            Some(exported.into_iter().map(Child::Node).collect()),
        )))
    }

    fn on_class(
        &self,
        node: &Node,
        ctx: &mut FilterContext,
        chain: Chain,
    ) -> Result<Option<Node>, Error> {
        let at_root = ctx.is_root(node);
        let Some(processed) = chain.process(node, ctx)? else {
            return Ok(None);
        };
        if at_root && exportable(&processed) {
            let mut wrapped = self.export_wrap(vec![processed], ctx);
            return Ok(wrapped.pop());
        }
        Ok(Some(processed))
    }

    fn on_module(
        &self,
        node: &Node,
        ctx: &mut FilterContext,
        chain: Chain,
    ) -> Result<Option<Node>, Error> {
        let at_root = ctx.is_root(node);
        let Some(processed) = chain.process(node, ctx)? else {
            return Ok(None);
        };
        if at_root && exportable(&processed) {
            let mut wrapped = self.export_wrap(vec![processed], ctx);
            return Ok(wrapped.pop());
        }
        Ok(Some(processed))
    }

    fn on_def(
        &self,
        node: &Node,
        ctx: &mut FilterContext,
        chain: Chain,
    ) -> Result<Option<Node>, Error> {
        let at_root = ctx.is_root(node);
        let Some(processed) = chain.process(node, ctx)? else {
            return Ok(None);
        };
        if at_root && exportable(&processed) {
            let mut wrapped = self.export_wrap(vec![processed], ctx);
            return Ok(wrapped.pop());
        }
        Ok(Some(processed))
    }
}
