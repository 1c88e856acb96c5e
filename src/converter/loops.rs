// SPDX-License-Identifier: Apache-2.0

//! Loop emission: `while`, `until`, post-test loops as `do ... while`,
//! `for` over ranges and collections, `break`, and `next`.

use super::{Converter, Ctx, ScopeState};
use crate::ast::{Child, Node, NodeType};
use crate::error::Error;

impl Converter<'_> {
    fn loop_body(&mut self, body: &Child) -> Result<(), Error> {
        let wrap = self.out.wrap_open();
        self.loop_depth += 1;
        let result = self.conditionally(|converter| match body {
            Child::Nil => Ok(()),
            Child::Node(node) if node.typ() == NodeType::Begin => {
                converter.statement_list(node.children())
            }
            Child::Node(node) if node.typ() == NodeType::Kwbegin => {
                converter.statement_list(node.children())
            }
            Child::Node(node) => converter.statement_list(&[Child::Node(node.clone())]),
            _ => Ok(()),
        });
        self.loop_depth -= 1;
        result?;
        self.out.wrap_close(wrap, false);
        Ok(())
    }

    pub(crate) fn on_while(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if ctx != Ctx::Statement {
            return Err(self.illegal(node, "loop in expression position"));
        }
        let Some(cond) = node.node_at(0) else {
            return Err(self.unknown(node));
        };
        let cond = cond.clone();
        let body = node.child(1).cloned().unwrap_or(Child::Nil);
        self.out.put("while (");
        if node.typ() == NodeType::Until {
            self.negated_condition(&cond)?;
        } else {
            self.condition(&cond)?;
        }
        self.out.put(") ");
        self.loop_body(&body)
    }

    pub(crate) fn on_while_post(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if ctx != Ctx::Statement {
            return Err(self.illegal(node, "loop in expression position"));
        }
        let Some(cond) = node.node_at(0) else {
            return Err(self.unknown(node));
        };
        let cond = cond.clone();
        let body = node.child(1).cloned().unwrap_or(Child::Nil);
        self.out.put("do ");
        self.loop_body(&body)?;
        self.out.put(" while (");
        if node.typ() == NodeType::UntilPost {
            self.negated_condition(&cond)?;
        } else {
            self.condition(&cond)?;
        }
        self.out.put(")");
        Ok(())
    }

    pub(crate) fn on_for(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if ctx != Ctx::Statement {
            return Err(self.illegal(node, "for in expression position"));
        }
        let (Some(var), Some(value)) = (node.node_at(0), node.node_at(1)) else {
            return Err(self.unknown(node));
        };
        let var = var.clone();
        let value = value.clone();
        let body = node.child(2).cloned().unwrap_or(Child::Nil);

        // Ranges lower to counted loops.
        if matches!(value.typ(), NodeType::Irange | NodeType::Erange) {
            return self.counted_for(node, &var, &value, &body);
        }

        if self.options.eslevel.es2015() {
            // A parsed `for` leaks its variable past the loop; a
            // synthesized one (from an iteration block) does not.
            let parsed = node.loc().is_some();
            let keyword = if parsed { "let " } else { "const " };
            self.out.put("for (");
            self.out.put(keyword);
            let name = self.for_var_name(&var)?;
            self.out.put(" of ");
            self.parse(&value, Ctx::Expression)?;
            self.out.put(") ");
            self.with_jscope(&[name], |converter| converter.loop_body(&body))
        } else {
            // ES5 fallback: iterate through `forEach`.
            self.parse(&value, Ctx::Expression)?;
            self.out.put(".forEach(function (");
            let name = self.for_var_name(&var)?;
            self.out.put(") ");
            let wrap = self.out.wrap_open();
            let result = self.with_state(ScopeState::BlockBody, |converter| {
                converter.with_scope(true, true, &[name.clone()], |converter| {
                    match &body {
                        Child::Node(inner) if inner.typ() == NodeType::Begin => {
                            converter.statement_list(inner.children())
                        }
                        Child::Node(inner) => {
                            converter.statement_list(&[Child::Node(inner.clone())])
                        }
                        _ => Ok(()),
                    }
                })
            });
            result?;
            self.out.wrap_close(wrap, false);
            self.out.put(")");
            Ok(())
        }
    }

    /// Emit the loop variable (or destructuring pattern) and return the
    /// primary name for scope seeding.
    fn for_var_name(&mut self, var: &Node) -> Result<String, Error> {
        match var.typ() {
            NodeType::Lvasgn => {
                let name = var.sym_at(0).unwrap_or_default().to_string();
                self.out.put(&name);
                Ok(name)
            }
            NodeType::Mlhs => {
                self.out.put("[");
                let mut first = true;
                let mut primary = String::new();
                for item in var.children().iter().filter_map(Child::as_node) {
                    if !first {
                        self.out.put(", ");
                    }
                    first = false;
                    let name = item.sym_at(0).unwrap_or_default().to_string();
                    if primary.is_empty() {
                        primary = name.clone();
                    }
                    self.out.put(&name);
                }
                self.out.put("]");
                Ok(primary)
            }
            _ => Err(self.unknown(var)),
        }
    }

    fn counted_for(
        &mut self,
        node: &Node,
        var: &Node,
        range: &Node,
        body: &Child,
    ) -> Result<(), Error> {
        let name = match var.typ() {
            NodeType::Lvasgn => var.sym_at(0).unwrap_or_default().to_string(),
            _ => return Err(self.unknown(node)),
        };
        let (Some(begin), Some(end)) = (range.node_at(0), range.node_at(1)) else {
            return Err(self.unknown(range));
        };
        let begin = begin.clone();
        let end = end.clone();
        let keyword = if self.options.eslevel.es2015() {
            "let "
        } else {
            "var "
        };
        self.out.put("for (");
        self.out.put(keyword);
        self.out.put(&name);
        self.out.put(" = ");
        self.parse(&begin, Ctx::Expression)?;
        self.out.put("; ");
        self.out.put(&name);
        self.out
            .put(if range.typ() == NodeType::Irange { " <= " } else { " < " });
        self.parse(&end, Ctx::Expression)?;
        self.out.put("; ");
        self.out.put(&name);
        self.out.put("++) ");
        self.with_jscope(&[name], |converter| converter.loop_body(body))
    }

    pub(crate) fn on_break_next(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if ctx != Ctx::Statement {
            return Err(self.illegal(node, "loop control in expression position"));
        }
        let breaking = node.typ() == NodeType::Break;
        if self.loop_depth > 0 {
            self.out.put(if breaking { "break" } else { "continue" });
            return Ok(());
        }
        if self.state() == ScopeState::BlockBody {
            if breaking {
                // A callback function cannot break out of its caller.
                return Err(self.illegal(node, "break inside an iteration function"));
            }
            self.out.put("return");
            if let Some(Child::Node(value)) = node.child(0) {
                let value = value.clone();
                self.out.put(" ");
                self.parse(&value, Ctx::Expression)?;
            }
            return Ok(());
        }
        Err(self.illegal(
            node,
            if breaking {
                "break outside of a loop"
            } else {
                "next outside of a loop or block"
            },
        ))
    }
}
