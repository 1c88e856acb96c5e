// SPDX-License-Identifier: Apache-2.0

//! `begin`/`rescue`/`ensure` emission as `try`/`catch`/`finally`, with
//! `instanceof` guards for typed handlers.

use super::{Converter, Ctx};
use crate::ast::{Child, Node, NodeType};
use crate::error::Error;

/// The binding name used when handlers need dispatch on exception class.
const EXCEPTION: &str = "$EXCEPTION";

/// Exception classes that catch everything, needing no `instanceof` guard.
fn catches_all(class_ref: &Node) -> bool {
    class_ref.typ() == NodeType::Const
        && class_ref.child(0).is_some_and(Child::is_nil)
        && matches!(class_ref.sym_at(1), Some("Exception" | "StandardError"))
}

impl Converter<'_> {
    pub(crate) fn on_begin(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        match ctx {
            Ctx::Statement => self.statement_list(node.children()),
            Ctx::Expression => {
                self.out.put("(");
                self.parse_all(node.children(), ", ", Ctx::Expression)?;
                self.out.put(")");
                Ok(())
            }
        }
    }

    pub(crate) fn on_kwbegin(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        let has_handlers = node
            .children()
            .iter()
            .filter_map(Child::as_node)
            .any(|child| matches!(child.typ(), NodeType::Rescue | NodeType::Ensure));
        match ctx {
            Ctx::Statement => self.statement_list(node.children()),
            Ctx::Expression if has_handlers => self.statement_as_iife(node),
            Ctx::Expression => {
                self.out.put("(");
                self.parse_all(node.children(), ", ", Ctx::Expression)?;
                self.out.put(")");
                Ok(())
            }
        }
    }

    pub(crate) fn on_rescue(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if ctx != Ctx::Statement {
            return self.statement_as_iife(node);
        }
        self.emit_try(node, None)
    }

    pub(crate) fn on_ensure(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if ctx != Ctx::Statement {
            return self.statement_as_iife(node);
        }
        let inner = node.child(0).cloned().unwrap_or(Child::Nil);
        let finally = node.node_at(1).cloned();

        if let Child::Node(inner_node) = &inner {
            if inner_node.typ() == NodeType::Rescue {
                return self.emit_try(inner_node, finally.as_ref());
            }
        }

        self.out.put("try ");
        let wrap = self.out.wrap_open();
        self.conditionally(|converter| converter.branch_statements(&inner))?;
        self.out.wrap_close(wrap, false);
        self.out.put(" finally ");
        let wrap = self.out.wrap_open();
        match &finally {
            Some(body) => {
                let body = body.clone();
                self.conditionally(|converter| {
                    converter.branch_statements(&Child::Node(body))
                })?;
            }
            None => {}
        }
        self.out.wrap_close(wrap, false);
        Ok(())
    }

    fn emit_try(&mut self, rescue: &Node, finally: Option<&Node>) -> Result<(), Error> {
        let body = rescue.child(0).cloned().unwrap_or(Child::Nil);
        let mut resbodies: Vec<Node> = Vec::new();
        let mut else_body: Option<Node> = None;
        for child in rescue.children()[1..].iter().filter_map(Child::as_node) {
            if child.typ() == NodeType::Resbody {
                resbodies.push(child.clone());
            } else {
                else_body = Some(child.clone());
            }
        }

        self.out.put("try ");
        let wrap = self.out.wrap_open();
        let sep = self.out.sep();
        self.conditionally(|converter| {
            converter.branch_statements(&body)?;
            // The no-exception branch runs after the protected body.
            if let Some(else_body) = &else_body {
                if !Self::elided(&Child::Node(else_body.clone())) {
                    converter.out.put(&sep);
                    converter.branch_statements(&Child::Node(else_body.clone()))?;
                }
            }
            Ok(())
        })?;
        self.out.wrap_close(wrap, false);

        if !resbodies.is_empty() {
            self.emit_catch(&resbodies)?;
        }

        if let Some(finally_body) = finally {
            self.out.put(" finally ");
            let wrap = self.out.wrap_open();
            let finally_body = finally_body.clone();
            self.conditionally(|converter| {
                converter.branch_statements(&Child::Node(finally_body))
            })?;
            self.out.wrap_close(wrap, false);
        }
        Ok(())
    }

    fn emit_catch(&mut self, resbodies: &[Node]) -> Result<(), Error> {
        let untyped = |resbody: &Node| match resbody.node_at(0) {
            None => true,
            Some(classes) => classes
                .children()
                .iter()
                .filter_map(Child::as_node)
                .all(catches_all),
        };

        // A single untyped handler binds its variable as the catch param.
        if resbodies.len() == 1 && untyped(&resbodies[0]) {
            let resbody = &resbodies[0];
            let name = resbody
                .node_at(1)
                .and_then(|var| var.sym_at(0))
                .unwrap_or(EXCEPTION)
                .to_string();
            let body = resbody.child(2).cloned().unwrap_or(Child::Nil);
            self.out.put(&format!(" catch ({name}) "));
            let wrap = self.out.wrap_open();
            self.with_jscope(&[name], |converter| {
                converter.conditionally(|converter| converter.branch_statements(&body))
            })?;
            self.out.wrap_close(wrap, false);
            return Ok(());
        }

        // Dispatch on exception class inside the catch block, re-throwing
        // anything unmatched.
        self.out.put(&format!(" catch ({EXCEPTION}) "));
        let wrap = self.out.wrap_open();
        let sep = self.out.sep();
        let keyword = if self.options.eslevel.es2015() {
            "let"
        } else {
            "var"
        };
        let mut first = true;
        let mut caught_all = false;
        let resbodies = resbodies.to_vec();
        for resbody in &resbodies {
            let body = resbody.child(2).cloned().unwrap_or(Child::Nil);
            let var = resbody
                .node_at(1)
                .and_then(|var| var.sym_at(0))
                .map(str::to_string);

            if untyped(resbody) {
                caught_all = true;
                if first {
                    // No typed handlers before it: plain body.
                    self.emit_handler_body(&var, &body, keyword, &sep)?;
                } else {
                    self.out.put(" else ");
                    let inner = self.out.wrap_open();
                    self.emit_handler_body(&var, &body, keyword, &sep)?;
                    self.out.wrap_close(inner, false);
                }
                break;
            }

            if !first {
                self.out.put(" else ");
            }
            first = false;
            self.out.put("if (");
            let mut first_class = true;
            let classes: Vec<Node> = resbody
                .node_at(0)
                .map(|classes| {
                    classes
                        .children()
                        .iter()
                        .filter_map(Child::as_node)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            for class_ref in &classes {
                if !first_class {
                    self.out.put(" || ");
                }
                first_class = false;
                self.out.put(&format!("{EXCEPTION} instanceof "));
                self.parse(class_ref, Ctx::Expression)?;
            }
            self.out.put(") ");
            let inner = self.out.wrap_open();
            self.emit_handler_body(&var, &body, keyword, &sep)?;
            self.out.wrap_close(inner, false);
        }

        if !caught_all && !first {
            self.out.put(" else ");
            let inner = self.out.wrap_open();
            self.out.put(&format!("throw {EXCEPTION}"));
            self.out.wrap_close(inner, false);
        }
        self.out.wrap_close(wrap, false);
        Ok(())
    }

    fn emit_handler_body(
        &mut self,
        var: &Option<String>,
        body: &Child,
        keyword: &str,
        sep: &str,
    ) -> Result<(), Error> {
        if let Some(name) = var {
            self.out.put(&format!("{keyword} {name} = {EXCEPTION}"));
            if !Self::elided(body) {
                self.out.put(sep);
            }
            let name = name.clone();
            let body = body.clone();
            return self.with_jscope(&[name], |converter| {
                converter.conditionally(|converter| converter.branch_statements(&body))
            });
        }
        self.conditionally(|converter| converter.branch_statements(body))
    }
}
