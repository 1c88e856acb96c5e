// SPDX-License-Identifier: Apache-2.0

//! Implicit `return` insertion.
//!
//! Wraps the last expression of method and block bodies in an `autoreturn`
//! node; the converter's `autoreturn` handler pushes the return through
//! `if`, `case`, `begin`, and `rescue` forms at emit time.

use super::{Chain, Filter, FilterContext};
use crate::ast::{Child, Node, NodeType};
use crate::error::Error;

pub struct Return;

fn wrap_body(body: &Child) -> Child {
    match body {
        Child::Node(node) => match node.typ() {
            NodeType::Return | NodeType::Autoreturn => Child::Node(node.clone()),
            NodeType::Begin => {
                let mut children = node.children().to_vec();
                if let Some(last) = children.pop() {
                    children.push(wrap_body(&last));
                }
                Child::Node(node.updated(None, Some(children)))
            }
            NodeType::Ensure => {
                // `ensure` runs after the returned value is produced.
                let mut children = node.children().to_vec();
                if let Some(first) = children.first().cloned() {
                    children[0] = wrap_body(&first);
                }
                Child::Node(node.updated(None, Some(children)))
            }
            _ => Child::Node(Node::new(
                NodeType::Autoreturn,
                vec![Child::Node(node.clone())],
            )),
        },
        other => other.clone(),
    }
}

fn with_wrapped_body(node: &Node, body_index: usize) -> Node {
    let mut children = node.children().to_vec();
    if let Some(body) = children.get(body_index).cloned() {
        children[body_index] = wrap_body(&body);
    }
    node.updated(None, Some(children))
}

impl Filter for Return {
    fn name(&self) -> &'static str {
        "return"
    }

    fn on_def(
        &self,
        node: &Node,
        ctx: &mut FilterContext,
        chain: Chain,
    ) -> Result<Option<Node>, Error> {
        let Some(processed) = chain.process(node, ctx)? else {
            return Ok(None);
        };
        if processed.typ() != NodeType::Def {
            return Ok(Some(processed));
        }
        Ok(Some(with_wrapped_body(&processed, 2)))
    }

    fn on_defs(
        &self,
        node: &Node,
        ctx: &mut FilterContext,
        chain: Chain,
    ) -> Result<Option<Node>, Error> {
        let Some(processed) = chain.process(node, ctx)? else {
            return Ok(None);
        };
        if processed.typ() != NodeType::Defs {
            return Ok(Some(processed));
        }
        Ok(Some(with_wrapped_body(&processed, 3)))
    }

    fn on_block(
        &self,
        node: &Node,
        ctx: &mut FilterContext,
        chain: Chain,
    ) -> Result<Option<Node>, Error> {
        let Some(processed) = chain.process(node, ctx)? else {
            return Ok(None);
        };
        if processed.typ() != NodeType::Block {
            return Ok(Some(processed));
        }
        // `each`-style iteration blocks are statements, not value producers;
        // the converter may lower them to `for ... of` where `return` would
        // be illegal.
        let iteration = processed
            .node_at(0)
            .and_then(|call| call.sym_at(1))
            .is_some_and(|name| matches!(name, "each" | "forEach" | "times" | "each_with_index"));
        if iteration {
            return Ok(Some(processed));
        }
        Ok(Some(with_wrapped_body(&processed, 2)))
    }
}
