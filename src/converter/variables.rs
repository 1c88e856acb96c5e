// SPDX-License-Identifier: Apache-2.0

//! Variable references and assignment forms, including declaration
//! tracking for `let`/`var` hoisting.

use super::{op_precedence, Converter, Ctx, VarState};
use crate::ast::{Child, Node, NodeType};
use crate::error::Error;

impl Converter<'_> {
    /// Instance-variable property name: a leading underscore marks the
    /// member private (`#name` on ES2022 unless `underscored_private`).
    pub(crate) fn ivar_property(&self, name: &str) -> String {
        match name.strip_prefix('_') {
            Some(private_name)
                if self.options.eslevel.es2022() && !self.options.underscored_private =>
            {
                format!("#{private_name}")
            }
            Some(private_name) => format!("_{private_name}"),
            None => name.to_string(),
        }
    }

    fn class_variable_target(&self, node: &Node) -> Result<String, Error> {
        match self.classes.last() {
            Some(frame) => Ok(frame.name.clone()),
            None => Err(self.illegal(node, "class variable outside of a class")),
        }
    }

    pub(crate) fn on_variable(&mut self, node: &Node, _ctx: Ctx) -> Result<(), Error> {
        match node.typ() {
            NodeType::Lvar => {
                let name = node.sym_at(0).unwrap_or_default().to_string();
                self.out.put(&name);
                Ok(())
            }
            NodeType::Ivar => {
                let name = node.sym_at(0).unwrap_or_default().to_string();
                self.out.put("this.");
                let property = self.ivar_property(&name);
                self.out.put(&property);
                Ok(())
            }
            NodeType::Cvar => {
                let name = node.sym_at(0).unwrap_or_default().to_string();
                let target = self.class_variable_target(node)?;
                self.out.put(&target);
                self.out.put(".");
                self.out.put(&name);
                Ok(())
            }
            NodeType::Gvar => {
                let name = node.sym_at(0).unwrap_or_default().to_string();
                self.out.put(&format!("${name}"));
                Ok(())
            }
            NodeType::Const => {
                if let Some(scope) = node.node_at(0) {
                    let scope = scope.clone();
                    self.parse(&scope, Ctx::Expression)?;
                    self.out.put(".");
                }
                let name = node.sym_at(1).unwrap_or_default().to_string();
                self.out.put(&name);
                Ok(())
            }
            _ => Err(self.unknown(node)),
        }
    }

    pub(crate) fn on_assignment(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        match node.typ() {
            NodeType::Lvasgn => {
                let name = node.sym_at(0).unwrap_or_default().to_string();
                let value = node.node_at(1).cloned();
                let Some(value) = value else {
                    // A bare target (inside mlhs or a loop header).
                    self.out.put(&name);
                    return Ok(());
                };
                if !self.var_known(&name) {
                    if self.may_declare_inline(ctx) {
                        let keyword = if self.options.eslevel.es2015() {
                            "let "
                        } else {
                            "var "
                        };
                        self.out.put(keyword);
                        self.record_var(&name, VarState::Declared);
                    } else {
                        self.record_var(&name, VarState::Pending);
                    }
                }
                self.out.put(&name);
                self.out.put(" = ");
                self.parse(&value, Ctx::Expression)
            }
            NodeType::Ivasgn => {
                let name = node.sym_at(0).unwrap_or_default().to_string();
                self.out.put("this.");
                let property = self.ivar_property(&name);
                self.out.put(&property);
                if let Some(value) = node.node_at(1).cloned() {
                    self.out.put(" = ");
                    self.parse(&value, Ctx::Expression)?;
                }
                Ok(())
            }
            NodeType::Cvasgn => {
                let name = node.sym_at(0).unwrap_or_default().to_string();
                let target = self.class_variable_target(node)?;
                self.out.put(&target);
                self.out.put(".");
                self.out.put(&name);
                if let Some(value) = node.node_at(1).cloned() {
                    self.out.put(" = ");
                    self.parse(&value, Ctx::Expression)?;
                }
                Ok(())
            }
            NodeType::Gvasgn => {
                let name = node.sym_at(0).unwrap_or_default().to_string();
                self.out.put(&format!("${name}"));
                if let Some(value) = node.node_at(1).cloned() {
                    self.out.put(" = ");
                    self.parse(&value, Ctx::Expression)?;
                }
                Ok(())
            }
            NodeType::Casgn => {
                let scope = node.node_at(0).cloned();
                let name = node.sym_at(1).unwrap_or_default().to_string();
                let value = node.node_at(2).cloned();
                match scope {
                    Some(scope) => {
                        self.parse(&scope, Ctx::Expression)?;
                        self.out.put(".");
                        self.out.put(&name);
                    }
                    None => {
                        let keyword = if self.options.eslevel.es2015() {
                            "const "
                        } else {
                            "var "
                        };
                        if ctx == Ctx::Statement {
                            self.out.put(keyword);
                        }
                        self.out.put(&name);
                    }
                }
                if let Some(value) = value {
                    self.out.put(" = ");
                    self.parse(&value, Ctx::Expression)?;
                }
                Ok(())
            }
            _ => Err(self.unknown(node)),
        }
    }

    pub(crate) fn on_masgn(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        let (Some(mlhs), Some(value)) = (node.node_at(0), node.node_at(1)) else {
            return Err(self.unknown(node));
        };
        let mlhs = mlhs.clone();
        let value = value.clone();
        let targets: Vec<Node> = mlhs
            .children()
            .iter()
            .filter_map(Child::as_node)
            .cloned()
            .collect();

        if !self.options.eslevel.es2015() {
            return self.masgn_es5(node, &targets, &value, ctx);
        }

        let all_new_locals = targets.iter().all(|target| {
            target.typ() == NodeType::Lvasgn
                && !self.var_known(target.sym_at(0).unwrap_or_default())
        });
        if all_new_locals && self.may_declare_inline(ctx) {
            self.out.put("let ");
            for target in &targets {
                self.record_var(target.sym_at(0).unwrap_or_default(), VarState::Declared);
            }
        } else {
            for target in &targets {
                if target.typ() == NodeType::Lvasgn {
                    let name = target.sym_at(0).unwrap_or_default().to_string();
                    if !self.var_known(&name) {
                        self.record_var(&name, VarState::Pending);
                    }
                }
            }
        }

        self.out.put("[");
        let mut first = true;
        for target in &targets {
            if !first {
                self.out.put(", ");
            }
            first = false;
            self.masgn_target(target)?;
        }
        self.out.put("] = ");
        self.parse(&value, Ctx::Expression)
    }

    fn masgn_target(&mut self, target: &Node) -> Result<(), Error> {
        match target.typ() {
            NodeType::Lvasgn => {
                self.out.put(target.sym_at(0).unwrap_or_default());
                Ok(())
            }
            NodeType::Ivasgn => {
                self.out.put("this.");
                let property = self.ivar_property(target.sym_at(0).unwrap_or_default());
                self.out.put(&property);
                Ok(())
            }
            NodeType::Splat => {
                self.out.put("...");
                match target.node_at(0) {
                    Some(inner) => {
                        let inner = inner.clone();
                        self.masgn_target(&inner)
                    }
                    None => Ok(()),
                }
            }
            NodeType::Mlhs => {
                self.out.put("[");
                let inner: Vec<Node> = target
                    .children()
                    .iter()
                    .filter_map(Child::as_node)
                    .cloned()
                    .collect();
                let mut first = true;
                for item in &inner {
                    if !first {
                        self.out.put(", ");
                    }
                    first = false;
                    self.masgn_target(item)?;
                }
                self.out.put("]");
                Ok(())
            }
            _ => Err(self.unknown(target)),
        }
    }

    /// ES5 multiple assignment through an index temporary.
    fn masgn_es5(
        &mut self,
        node: &Node,
        targets: &[Node],
        value: &Node,
        ctx: Ctx,
    ) -> Result<(), Error> {
        if ctx != Ctx::Statement {
            return Err(self.illegal(node, "multiple assignment in expression position"));
        }
        let sep = self.out.sep();
        self.out.put("var $_ = ");
        self.parse(value, Ctx::Expression)?;
        for (index, target) in targets.iter().enumerate() {
            self.out.put(&sep);
            match target.typ() {
                NodeType::Lvasgn => {
                    let name = target.sym_at(0).unwrap_or_default().to_string();
                    if !self.var_known(&name) {
                        self.out.put("var ");
                        self.record_var(&name, VarState::Declared);
                    }
                    self.out.put(&name);
                }
                NodeType::Splat => {
                    if let Some(inner) = target.node_at(0) {
                        let inner = inner.clone();
                        self.masgn_target(&inner)?;
                    }
                    self.out.put(&format!(" = $_.slice({index})"));
                    continue;
                }
                _ => self.masgn_target(target)?,
            }
            self.out.put(&format!(" = $_[{index}]"));
        }
        Ok(())
    }

    pub(crate) fn on_op_asgn(&mut self, node: &Node, _ctx: Ctx) -> Result<(), Error> {
        let Some(target) = node.node_at(0) else {
            return Err(self.unknown(node));
        };
        let target = target.clone();

        // A read-modify-write of an undeclared local still needs a
        // declaration hoisted to scope top.
        if target.typ() == NodeType::Lvasgn {
            let name = target.sym_at(0).unwrap_or_default().to_string();
            if !self.var_known(&name) {
                self.record_var(&name, VarState::Pending);
            }
        }

        match node.typ() {
            NodeType::OpAsgn => {
                let op = node.sym_at(1).unwrap_or_default().to_string();
                let Some(value) = node.node_at(2) else {
                    return Err(self.unknown(node));
                };
                let value = value.clone();
                if op == "**" && !self.options.eslevel.es2016() {
                    self.emit_lvalue(&target)?;
                    self.out.put(" = Math.pow(");
                    self.emit_lvalue(&target)?;
                    self.out.put(", ");
                    self.parse(&value, Ctx::Expression)?;
                    self.out.put(")");
                    return Ok(());
                }
                self.emit_lvalue(&target)?;
                self.out.put(&format!(" {op}= "));
                self.parse(&value, Ctx::Expression)
            }
            NodeType::OrAsgn | NodeType::AndAsgn => {
                let Some(value) = node.node_at(1) else {
                    return Err(self.unknown(node));
                };
                let value = value.clone();
                let logical = if node.typ() == NodeType::OrAsgn {
                    match self.options.or {
                        crate::options::OrMode::Nullish => "??",
                        crate::options::OrMode::Auto => "||",
                    }
                } else {
                    "&&"
                };
                if self.options.eslevel.es2021() {
                    self.emit_lvalue(&target)?;
                    self.out.put(&format!(" {logical}= "));
                    self.parse(&value, Ctx::Expression)
                } else {
                    self.emit_lvalue(&target)?;
                    self.out.put(" = ");
                    self.emit_lvalue(&target)?;
                    self.out.put(&format!(" {logical} "));
                    self.operand(&value, op_precedence(logical) + 1)
                }
            }
            _ => Err(self.unknown(node)),
        }
    }

    /// Emit an assignment target (no value): a bare name, `this.x`, a
    /// property, or an index.
    pub(crate) fn emit_lvalue(&mut self, target: &Node) -> Result<(), Error> {
        match target.typ() {
            NodeType::Lvasgn => {
                self.out.put(target.sym_at(0).unwrap_or_default());
                Ok(())
            }
            NodeType::Ivasgn => {
                self.out.put("this.");
                let property = self.ivar_property(target.sym_at(0).unwrap_or_default());
                self.out.put(&property);
                Ok(())
            }
            NodeType::Cvasgn => {
                let target_name = self.class_variable_target(target)?;
                self.out.put(&target_name);
                self.out.put(".");
                self.out.put(target.sym_at(0).unwrap_or_default());
                Ok(())
            }
            NodeType::Gvasgn => {
                self.out
                    .put(&format!("${}", target.sym_at(0).unwrap_or_default()));
                Ok(())
            }
            NodeType::Casgn => {
                if let Some(scope) = target.node_at(0) {
                    let scope = scope.clone();
                    self.parse(&scope, Ctx::Expression)?;
                    self.out.put(".");
                }
                self.out.put(target.sym_at(1).unwrap_or_default());
                Ok(())
            }
            NodeType::Send | NodeType::Attr => {
                let Some(receiver) = target.node_at(0) else {
                    return Err(self.unknown(target));
                };
                let receiver = receiver.clone();
                let selector = target.sym_at(1).unwrap_or_default().to_string();
                if selector == "[]" {
                    self.parse(&receiver, Ctx::Expression)?;
                    self.out.put("[");
                    self.parse_all(&target.children()[2..], ", ", Ctx::Expression)?;
                    self.out.put("]");
                } else {
                    self.parse(&receiver, Ctx::Expression)?;
                    self.out.put(".");
                    self.out.put(&selector);
                }
                Ok(())
            }
            _ => Err(self.unknown(target)),
        }
    }

    pub(crate) fn on_defined(&mut self, node: &Node, _ctx: Ctx) -> Result<(), Error> {
        let Some(operand) = node.node_at(0) else {
            return Err(self.unknown(node));
        };
        let operand = operand.clone();
        self.out.put("typeof ");
        self.operand(&operand, op_precedence("typeof"))?;
        self.out.put(" !== \"undefined\"");
        Ok(())
    }
}
