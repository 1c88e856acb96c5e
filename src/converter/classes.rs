// SPDX-License-Identifier: Apache-2.0

//! Class and module emission across ES levels, including reopened classes.
//!
//! The namespace decides whether a definition is fresh or a reopen: a
//! fresh class becomes a `class` declaration (or constructor function on
//! ES5); a reopen emits member assignments against the existing binding so
//! each resolved path is declared exactly once per compile.

use super::{Converter, Ctx, ScopeState};
use crate::ast::{Child, Node, NodeType};
use crate::error::Error;
use crate::namespace::{Member, Namespace};

/// Split a class/module body into its member statements.
fn body_members(body: &Child) -> Vec<Node> {
    match body {
        Child::Node(node) if node.typ() == NodeType::Begin => node
            .children()
            .iter()
            .filter_map(Child::as_node)
            .cloned()
            .collect(),
        Child::Node(node) => vec![node.clone()],
        _ => Vec::new(),
    }
}

fn collect_ivars(node: &Node, ivars: &mut Vec<String>) {
    if matches!(node.typ(), NodeType::Ivasgn | NodeType::Ivar) {
        if let Some(name) = node.sym_at(0) {
            if !ivars.iter().any(|existing| existing == name) {
                ivars.push(name.to_string());
            }
        }
    }
    for child in node.children() {
        if let Child::Node(child) = child {
            collect_ivars(child, ivars);
        }
    }
}

/// The member inventory a class/module body defines, as the namespace
/// records it.
fn member_inventory(members: &[Node]) -> Vec<(String, Member)> {
    let mut inventory = Vec::new();
    for member in members {
        match member.typ() {
            NodeType::Def => {
                if let Some(name) = member.sym_at(0) {
                    inventory.push((name.to_string(), Member::Method));
                }
            }
            NodeType::Defs => {
                if let Some(name) = member.sym_at(1) {
                    inventory.push((name.to_string(), Member::StaticMethod));
                }
            }
            NodeType::Casgn => {
                if let Some(name) = member.sym_at(1) {
                    inventory.push((name.to_string(), Member::Const));
                }
            }
            NodeType::Cvasgn => {
                if let Some(name) = member.sym_at(0) {
                    inventory.push((name.to_string(), Member::Cvar));
                }
            }
            NodeType::Send => {
                // attr_accessor and friends: the properties already exist
                // on the instance, so they only enter the inventory.
                if member.child(0).is_some_and(Child::is_nil)
                    && matches!(
                        member.sym_at(1),
                        Some("attr_accessor" | "attr_reader" | "attr_writer")
                    )
                {
                    for arg in member.children()[2..].iter().filter_map(Child::as_node) {
                        if let Some(name) = arg.sym_at(0) {
                            inventory.push((name.to_string(), Member::Attr));
                        }
                    }
                }
            }
            _ => {}
        }
        let mut ivars = Vec::new();
        collect_ivars(member, &mut ivars);
        for ivar in ivars {
            inventory.push((ivar, Member::Ivar));
        }
    }
    inventory
}

fn is_attr_declaration(member: &Node) -> bool {
    member.typ() == NodeType::Send
        && member.child(0).is_some_and(Child::is_nil)
        && matches!(
            member.sym_at(1),
            Some("attr_accessor" | "attr_reader" | "attr_writer")
        )
}

impl Converter<'_> {
    /// Rendered JavaScript reference for a class/module name node.
    pub(crate) fn const_display(&mut self, name: &Node) -> Result<String, Error> {
        let path = Namespace::resolve(name);
        Ok(path.join("."))
    }

    pub(crate) fn on_class(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if ctx != Ctx::Statement {
            return Err(self.illegal(node, "class definition in expression position"));
        }
        let Some(name) = node.node_at(0) else {
            return Err(self.unknown(node));
        };
        let name = name.clone();
        let superclass = node.node_at(1).cloned();
        let body = node.child(2).cloned().unwrap_or(Child::Nil);
        let members = body_members(&body);

        let display = self.const_display(&name)?;
        let reopened = self.namespace.enter(&name).is_some();
        self.namespace.define(member_inventory(&members));
        self.classes.push(super::ClassFrame {
            name: display.clone(),
            superclass: superclass.clone(),
        });

        let result = if reopened {
            self.reopen_members(&display, &members)
        } else if self.options.eslevel.es2015() {
            self.class_declaration(&display, superclass.as_ref(), &members)
        } else {
            self.class_es5(&display, superclass.as_ref(), &members)
        };

        self.classes.pop();
        self.namespace.leave();
        result
    }

    /// `class Name extends Super { ... }`.
    fn class_declaration(
        &mut self,
        display: &str,
        superclass: Option<&Node>,
        members: &[Node],
    ) -> Result<(), Error> {
        let scoped = display.contains('.');
        let mark = self.out.compact_start();
        if scoped {
            self.out.put(&format!("{display} = class "));
        } else {
            self.out.put(&format!("class {display} "));
        }
        if let Some(superclass) = superclass {
            self.out.put("extends ");
            self.receiver_expr(superclass)?;
            self.out.put(" ");
        }
        self.out.puts("{");

        let mut static_assignments: Vec<Node> = Vec::new();
        let mut post_statements: Vec<Node> = Vec::new();
        self.with_state(ScopeState::ClassBody, |converter| {
            for member in members {
                match member.typ() {
                    NodeType::Def | NodeType::Defs => {
                        converter.parse_statement(member)?;
                        converter.out.newline();
                    }
                    NodeType::Cvasgn => {
                        if converter.options.eslevel.es2022() {
                            converter.out.put("static ");
                            converter.out.put(member.sym_at(0).unwrap_or_default());
                            converter.out.put(" = ");
                            if let Some(value) = member.node_at(1) {
                                let value = value.clone();
                                converter.parse(&value, Ctx::Expression)?;
                            }
                            converter.out.newline();
                        } else {
                            static_assignments.push(member.clone());
                        }
                    }
                    NodeType::Casgn => static_assignments.push(member.clone()),
                    _ if is_attr_declaration(member) => {}
                    // Executable class-body statements run after the
                    // declaration exists.
                    _ => post_statements.push(member.clone()),
                }
            }
            Ok(())
        })?;
        self.out.put("}");
        self.out.compact_end(mark);

        // Class-level constants and pre-ES2022 statics attach afterwards.
        let sep = self.out.sep();
        for assignment in static_assignments {
            self.out.put(&sep);
            self.static_assignment(display, &assignment)?;
        }
        for statement in post_statements {
            self.out.put(&sep);
            self.parse_statement(&statement)?;
        }
        Ok(())
    }

    fn static_assignment(&mut self, display: &str, member: &Node) -> Result<(), Error> {
        let name = match member.typ() {
            NodeType::Casgn => member.sym_at(1).unwrap_or_default(),
            _ => member.sym_at(0).unwrap_or_default(),
        };
        self.out.put(&format!("{display}.{name} = "));
        let value = match member.typ() {
            NodeType::Casgn => member.node_at(2),
            _ => member.node_at(1),
        };
        match value {
            Some(value) => {
                let value = value.clone();
                self.parse(&value, Ctx::Expression)
            }
            None => {
                self.out.put("undefined");
                Ok(())
            }
        }
    }

    /// Reopened class: members assign onto the existing binding.
    fn reopen_members(&mut self, display: &str, members: &[Node]) -> Result<(), Error> {
        let sep = self.out.sep();
        let mut first = true;
        for member in members {
            if is_attr_declaration(member) {
                continue;
            }
            if !first {
                self.out.put(&sep);
            }
            first = false;
            match member.typ() {
                NodeType::Def => {
                    let name = member.sym_at(0).unwrap_or_default().to_string();
                    let Some(args) = member.node_at(1).cloned() else {
                        return Err(self.unknown(member));
                    };
                    let body = member.child(2).cloned().unwrap_or(Child::Nil);
                    self.out.put(&format!("{display}.prototype.{name} = function "));
                    self.method_names.push(name);
                    let result = self.function_tail(
                        &args,
                        &body,
                        ScopeState::MethodBody,
                        false,
                        false,
                        true,
                    );
                    self.method_names.pop();
                    result?;
                }
                NodeType::Defs => {
                    let name = member.sym_at(1).unwrap_or_default().to_string();
                    let Some(args) = member.node_at(2).cloned() else {
                        return Err(self.unknown(member));
                    };
                    let body = member.child(3).cloned().unwrap_or(Child::Nil);
                    self.out.put(&format!("{display}.{name} = function "));
                    self.method_names.push(name);
                    let result = self.function_tail(
                        &args,
                        &body,
                        ScopeState::MethodBody,
                        false,
                        false,
                        true,
                    );
                    self.method_names.pop();
                    result?;
                }
                NodeType::Casgn | NodeType::Cvasgn => {
                    self.static_assignment(display, member)?;
                }
                _ => self.parse_statement(member)?,
            }
        }
        Ok(())
    }

    /// ES5 lowering: constructor function plus prototype assignments.
    fn class_es5(
        &mut self,
        display: &str,
        superclass: Option<&Node>,
        members: &[Node],
    ) -> Result<(), Error> {
        let sep = self.out.sep();
        let scoped = display.contains('.');

        let constructor = members
            .iter()
            .find(|member| member.typ() == NodeType::Def && member.sym_at(0) == Some("initialize"));
        if scoped {
            self.out.put(&format!("{display} = function "));
        } else {
            self.out.put(&format!("function {display}"));
        }
        match constructor {
            Some(ctor) => {
                let Some(args) = ctor.node_at(1).cloned() else {
                    return Err(self.unknown(ctor));
                };
                let body = ctor.child(2).cloned().unwrap_or(Child::Nil);
                self.method_names.push("constructor".to_string());
                let result = self.function_tail(
                    &args,
                    &body,
                    ScopeState::MethodBody,
                    false,
                    false,
                    false,
                );
                self.method_names.pop();
                result?;
            }
            None => self.out.put("() {}"),
        }

        if let Some(superclass) = superclass {
            self.out.put(&sep);
            self.out.put(&format!("{display}.prototype = Object.create("));
            self.receiver_expr(superclass)?;
            self.out.put(".prototype)");
            self.out.put(&sep);
            self.out
                .put(&format!("{display}.prototype.constructor = {display}"));
        }

        for member in members {
            match member.typ() {
                NodeType::Def if member.sym_at(0) == Some("initialize") => {}
                NodeType::Def | NodeType::Defs | NodeType::Casgn | NodeType::Cvasgn => {
                    self.out.put(&sep);
                    self.reopen_members(display, std::slice::from_ref(member))?;
                }
                _ if is_attr_declaration(member) => {}
                _ => {
                    self.out.put(&sep);
                    self.parse_statement(member)?;
                }
            }
        }
        Ok(())
    }

    // ---- modules ---------------------------------------------------------

    pub(crate) fn on_module(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if ctx != Ctx::Statement {
            return Err(self.illegal(node, "module definition in expression position"));
        }
        let Some(name) = node.node_at(0) else {
            return Err(self.unknown(node));
        };
        let name = name.clone();
        let body = node.child(1).cloned().unwrap_or(Child::Nil);
        let members = body_members(&body);

        let display = self.const_display(&name)?;
        self.namespace.enter(&name);
        self.namespace.define(member_inventory(&members));

        let methods_only = members
            .iter()
            .all(|member| matches!(member.typ(), NodeType::Def | NodeType::Defs));
        let result = if methods_only {
            self.module_object(&display, &members)
        } else {
            self.module_iife(&display, &members)
        };

        self.namespace.leave();
        result
    }

    /// A module of methods becomes an object literal.
    fn module_object(&mut self, display: &str, members: &[Node]) -> Result<(), Error> {
        let keyword = if self.options.eslevel.es2015() {
            "const"
        } else {
            "var"
        };
        let scoped = display.contains('.');
        let mark = self.out.compact_start();
        if scoped {
            self.out.put(&format!("{display} = "));
        } else {
            self.out.put(&format!("{keyword} {display} = "));
        }
        self.out.puts("{");
        let es2015 = self.options.eslevel.es2015();
        let mut first = true;
        for member in members {
            if !first {
                self.out.puts(",");
            }
            first = false;
            let (method_name, args, body) = match member.typ() {
                NodeType::Def => (
                    member.sym_at(0).unwrap_or_default().to_string(),
                    member.node_at(1).cloned(),
                    member.child(2).cloned().unwrap_or(Child::Nil),
                ),
                _ => (
                    member.sym_at(1).unwrap_or_default().to_string(),
                    member.node_at(2).cloned(),
                    member.child(3).cloned().unwrap_or(Child::Nil),
                ),
            };
            let Some(args) = args else {
                return Err(self.unknown(member));
            };
            if es2015 {
                self.out.put(&method_name);
            } else {
                self.out.put(&format!("{method_name}: function "));
            }
            self.method_names.push(method_name);
            let result =
                self.function_tail(&args, &body, ScopeState::MethodBody, false, true, true);
            self.method_names.pop();
            result?;
        }
        self.out.sput("}");
        self.out.compact_end(mark);
        Ok(())
    }

    /// A module with nested definitions wraps in an immediately invoked
    /// function that returns its public members.
    fn module_iife(&mut self, display: &str, members: &[Node]) -> Result<(), Error> {
        let es2015 = self.options.eslevel.es2015();
        let keyword = if es2015 { "const" } else { "var" };
        let scoped = display.contains('.');
        if scoped {
            self.out.put(&format!("{display} = "));
        } else {
            self.out.put(&format!("{keyword} {display} = "));
        }
        self.out
            .put(if es2015 { "(() => " } else { "(function () " });

        let wrap = self.out.wrap_open();
        let sep = self.out.sep();
        let mut exported: Vec<String> = Vec::new();
        self.with_scope(true, false, &[], |converter| {
            let mut first = true;
            for member in members {
                if !first {
                    converter.out.put(&sep);
                }
                first = false;
                match member.typ() {
                    NodeType::Class | NodeType::Module => {
                        if let Some(name) = member.node_at(0) {
                            exported.push(Namespace::resolve(name).join("."));
                        }
                        converter.parse_statement(member)?;
                    }
                    NodeType::Casgn => {
                        if let Some(name) = member.sym_at(1) {
                            exported.push(name.to_string());
                        }
                        converter.parse_statement(member)?;
                    }
                    NodeType::Def => {
                        if let Some(name) = member.sym_at(0) {
                            exported.push(name.to_string());
                        }
                        converter.parse_statement(member)?;
                    }
                    NodeType::Defs => {
                        if let Some(name) = member.sym_at(1) {
                            exported.push(name.to_string());
                        }
                        converter.parse_statement(member)?;
                    }
                    _ => converter.parse_statement(member)?,
                }
            }
            if !first {
                converter.out.put(&sep);
            }
            converter.out.put("return {");
            converter.out.put(&exported.join(", "));
            converter.out.put("}");
            Ok(())
        })?;
        self.out.wrap_close(wrap, false);
        self.out.put(")()");
        Ok(())
    }
}
