// SPDX-License-Identifier: Apache-2.0

//! Function-shaped emission: method definitions, blocks as arrows or
//! function expressions, parameters across ES levels, `yield`, `super`,
//! `return`, and the `autoreturn` distribution handler.

use super::{Converter, Ctx, ScopeState};
use crate::ast::{Child, Node, NodeType};
use crate::error::Error;

/// Name of the implicit block parameter that `yield` calls.
pub(crate) const IMPLICIT_BLOCK: &str = "_implicitBlockYield";

/// Whether a method body yields, not counting nested method definitions
/// (blocks share the enclosing method's block).
pub(crate) fn contains_yield(child: &Child) -> bool {
    match child {
        Child::Node(node) => match node.typ() {
            NodeType::Yield => true,
            NodeType::Def | NodeType::Defs => false,
            _ => node.children().iter().any(contains_yield),
        },
        _ => false,
    }
}

fn contains_return(child: &Child) -> bool {
    match child {
        Child::Node(node) => match node.typ() {
            NodeType::Return => true,
            NodeType::Def | NodeType::Defs | NodeType::Block => false,
            _ => node.children().iter().any(contains_return),
        },
        _ => false,
    }
}

/// Names a parameter list introduces into scope.
pub(crate) fn param_names(args: &Node) -> Vec<String> {
    let mut names = Vec::new();
    for param in args.children().iter().filter_map(Child::as_node) {
        match param.typ() {
            NodeType::Mlhs => names.extend(param_names(param)),
            _ => {
                if let Some(name) = param.sym_at(0) {
                    names.push(name.to_string());
                }
            }
        }
    }
    names
}

fn is_kwarg(param: &Node) -> bool {
    matches!(
        param.typ(),
        NodeType::Kwarg | NodeType::Kwoptarg | NodeType::Kwrestarg
    )
}

impl Converter<'_> {
    // ---- parameter lists -------------------------------------------------

    /// Emit the parenthesized parameter list for the current ES level.
    fn emit_params(&mut self, args: &Node, implicit_block: bool) -> Result<(), Error> {
        let es2015 = self.options.eslevel.es2015();
        let params: Vec<Node> = args
            .children()
            .iter()
            .filter_map(Child::as_node)
            .cloned()
            .collect();
        let (kwargs, positional): (Vec<Node>, Vec<Node>) =
            params.into_iter().partition(|param| is_kwarg(param));

        let mut first = true;
        let mut separate = |converter: &mut Self| {
            if !first {
                converter.out.put(", ");
            }
            first = false;
        };

        for param in &positional {
            match param.typ() {
                NodeType::Arg => {
                    separate(self);
                    self.out.put(param.sym_at(0).unwrap_or_default());
                }
                NodeType::Optarg => {
                    separate(self);
                    self.out.put(param.sym_at(0).unwrap_or_default());
                    if es2015 {
                        self.out.put(" = ");
                        if let Some(default) = param.node_at(1) {
                            let default = default.clone();
                            self.parse(&default, Ctx::Expression)?;
                        }
                    }
                }
                NodeType::Restarg => {
                    if es2015 {
                        separate(self);
                        self.out.put("...");
                        self.out.put(param.sym_at(0).unwrap_or("args"));
                    }
                    // ES5 rest parameters come from `arguments` in the
                    // prologue instead.
                }
                NodeType::Blockarg => {
                    separate(self);
                    self.out.put(param.sym_at(0).unwrap_or_default());
                }
                NodeType::Mlhs => {
                    separate(self);
                    self.out.put("[");
                    let inner = param.clone();
                    let mut inner_first = true;
                    for name in param_names(&inner) {
                        if !inner_first {
                            self.out.put(", ");
                        }
                        inner_first = false;
                        self.out.put(&name);
                    }
                    self.out.put("]");
                }
                _ => return Err(self.unknown(param)),
            }
        }

        if !kwargs.is_empty() {
            separate(self);
            if es2015 {
                self.out.put("{ ");
                let mut kw_first = true;
                let mut all_optional = true;
                for param in &kwargs {
                    if !kw_first {
                        self.out.put(", ");
                    }
                    kw_first = false;
                    match param.typ() {
                        NodeType::Kwarg => {
                            all_optional = false;
                            self.out.put(param.sym_at(0).unwrap_or_default());
                        }
                        NodeType::Kwoptarg => {
                            self.out.put(param.sym_at(0).unwrap_or_default());
                            self.out.put(" = ");
                            if let Some(default) = param.node_at(1) {
                                let default = default.clone();
                                self.parse(&default, Ctx::Expression)?;
                            }
                        }
                        NodeType::Kwrestarg => {
                            self.out.put("...");
                            self.out.put(param.sym_at(0).unwrap_or("options"));
                        }
                        _ => return Err(self.unknown(param)),
                    }
                }
                self.out.put(" }");
                if all_optional {
                    self.out.put(" = {}");
                }
            } else {
                self.out.put("_options");
            }
        }

        if implicit_block {
            separate(self);
            self.out.put(IMPLICIT_BLOCK);
        }
        Ok(())
    }

    /// ES5 fixups emitted at the top of a function body: optional-argument
    /// defaults, rest arguments, keyword unpacking.
    fn emit_param_prologue(&mut self, args: &Node) -> Result<(), Error> {
        if self.options.eslevel.es2015() {
            return Ok(());
        }
        let sep = self.out.sep();
        let params: Vec<Node> = args
            .children()
            .iter()
            .filter_map(Child::as_node)
            .cloned()
            .collect();
        let positional_count = params
            .iter()
            .filter(|param| {
                matches!(
                    param.typ(),
                    NodeType::Arg | NodeType::Optarg | NodeType::Blockarg
                )
            })
            .count();

        let has_kwargs = params.iter().any(is_kwarg);
        if has_kwargs {
            self.out.put("_options = _options || {}");
            self.out.put(&sep);
        }
        for param in &params {
            match param.typ() {
                NodeType::Optarg => {
                    let name = param.sym_at(0).unwrap_or_default().to_string();
                    self.out
                        .put(&format!("if (typeof {name} === \"undefined\") {name} = "));
                    if let Some(default) = param.node_at(1) {
                        let default = default.clone();
                        self.parse(&default, Ctx::Expression)?;
                    }
                    self.out.put(&sep);
                }
                NodeType::Restarg => {
                    let name = param.sym_at(0).unwrap_or("args").to_string();
                    self.out.put(&format!(
                        "var {name} = Array.prototype.slice.call(arguments, {positional_count})"
                    ));
                    self.out.put(&sep);
                }
                NodeType::Kwarg | NodeType::Kwoptarg => {
                    let name = param.sym_at(0).unwrap_or_default().to_string();
                    self.out.put(&format!("var {name} = _options.{name}"));
                    if param.typ() == NodeType::Kwoptarg {
                        self.out
                            .put(&format!("{sep}if (typeof {name} === \"undefined\") {name} = "));
                        if let Some(default) = param.node_at(1) {
                            let default = default.clone();
                            self.parse(&default, Ctx::Expression)?;
                        }
                    }
                    self.out.put(&sep);
                }
                _ => {}
            }
        }
        Ok(())
    }

    // ---- function bodies -------------------------------------------------

    /// Emit the statements of a function body.
    pub(crate) fn body_statements(&mut self, body: &Child) -> Result<(), Error> {
        match body {
            Child::Nil => Ok(()),
            Child::Node(node) if node.typ() == NodeType::Begin => {
                self.statement_list(node.children())
            }
            Child::Node(node) => self.statement_list(&[Child::Node(node.clone())]),
            _ => Ok(()),
        }
    }

    /// The common tail of every function form: parameter list, then the
    /// braced (or concise) body in a fresh scope and state.
    ///
    /// With `autoreturn`, the body's final expression is wrapped so the
    /// `autoreturn` handler emits its `return` even when no filter did.
    pub(crate) fn function_tail(
        &mut self,
        args: &Node,
        body: &Child,
        state: ScopeState,
        arrow: bool,
        pad: bool,
        autoreturn: bool,
    ) -> Result<(), Error> {
        let wrapped;
        let body = if autoreturn {
            wrapped = autoreturn_body(body);
            &wrapped
        } else {
            body
        };
        let implicit_block = state == ScopeState::MethodBody && contains_yield(body);
        let mut names = param_names(args);
        if implicit_block {
            names.push(IMPLICIT_BLOCK.to_string());
        }

        self.out.put("(");
        self.emit_params(args, implicit_block)?;
        self.out.put(")");
        self.out.put(if arrow { " => " } else { " " });

        // Concise arrow body for a lone returned expression.
        if arrow && self.options.eslevel.es2015() {
            if let Child::Node(node) = body {
                if node.typ() == NodeType::Autoreturn {
                    if let Some(expr) = node.node_at(0) {
                        if is_concise_safe(expr) {
                            let expr = expr.clone();
                            let saved_loops = std::mem::take(&mut self.loop_depth);
                            let transparent = state == ScopeState::BlockBody;
                            let result = self.with_state(state, |converter| {
                                converter.with_scope(true, transparent, &names, |converter| {
                                    converter.parse(&expr, Ctx::Expression)
                                })
                            });
                            self.loop_depth = saved_loops;
                            return result;
                        }
                    }
                }
            }
        }

        let wrap = self.out.wrap_open();
        let saved_loops = std::mem::take(&mut self.loop_depth);
        let transparent = state == ScopeState::BlockBody;
        let result = self.with_state(state, |converter| {
            converter.with_scope(true, transparent, &names, |converter| {
                converter.emit_param_prologue(args)?;
                converter.body_statements(body)
            })
        });
        self.loop_depth = saved_loops;
        result?;
        self.out.wrap_close(wrap, pad);
        Ok(())
    }

    /// A function expression (or arrow) for blocks and prototype
    /// assignments.
    pub(crate) fn fn_expression(
        &mut self,
        args: &Node,
        body: &Child,
        state: ScopeState,
        autoreturn: bool,
    ) -> Result<(), Error> {
        if self.options.eslevel.es2015() {
            self.function_tail(args, body, state, true, false, autoreturn)
        } else {
            self.out.put("function ");
            self.function_tail(args, body, state, false, false, autoreturn)
        }
    }

    // ---- definitions -----------------------------------------------------

    pub(crate) fn on_def(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if ctx != Ctx::Statement {
            return Err(self.illegal(node, "method definition in expression position"));
        }
        let name = node.sym_at(0).unwrap_or_default().to_string();
        let Some(args) = node.node_at(1).cloned() else {
            return Err(self.unknown(node));
        };
        let body = node.child(2).cloned().unwrap_or(Child::Nil);

        match self.state() {
            ScopeState::ClassBody => self.class_method(node, &name, &args, &body, false),
            _ => {
                self.out.put("function ");
                self.out.put(&name);
                self.method_names.push(name.clone());
                let result = self.function_tail(
                    &args,
                    &body,
                    ScopeState::MethodBody,
                    false,
                    false,
                    true,
                );
                self.method_names.pop();
                result
            }
        }
    }

    pub(crate) fn on_defs(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if ctx != Ctx::Statement {
            return Err(self.illegal(node, "method definition in expression position"));
        }
        let name = node.sym_at(1).unwrap_or_default().to_string();
        let Some(args) = node.node_at(2).cloned() else {
            return Err(self.unknown(node));
        };
        let body = node.child(3).cloned().unwrap_or(Child::Nil);

        match self.state() {
            ScopeState::ClassBody => self.class_method(node, &name, &args, &body, true),
            _ => {
                // `def obj.name` outside a class assigns a property.
                let Some(object) = node.node_at(0) else {
                    return Err(self.unknown(node));
                };
                let object = object.clone();
                self.receiver_expr(&object)?;
                self.out.put(".");
                self.out.put(&name);
                self.out.put(" = ");
                self.method_names.push(name.clone());
                let result = self.fn_expression(&args, &body, ScopeState::MethodBody, true);
                self.method_names.pop();
                result
            }
        }
    }

    /// A method inside a `class` body: shorthand, getter/setter, or
    /// `static`, with padded braces.
    pub(crate) fn class_method(
        &mut self,
        _node: &Node,
        name: &str,
        args: &Node,
        body: &Child,
        is_static: bool,
    ) -> Result<(), Error> {
        if is_static {
            self.out.put("static ");
        }
        let display = if name == "initialize" && !is_static {
            "constructor"
        } else if let Some(property) = name.strip_suffix('=') {
            self.out.put("set ");
            property
        } else {
            name
        };
        self.out.put(display);
        // Constructors and setters may not return a value.
        let autoreturn = display != "constructor" && !name.ends_with('=');
        self.method_names.push(display.to_string());
        let result =
            self.function_tail(args, body, ScopeState::MethodBody, false, true, autoreturn);
        self.method_names.pop();
        result
    }

    // ---- blocks ----------------------------------------------------------

    pub(crate) fn on_block(&mut self, node: &Node, _ctx: Ctx) -> Result<(), Error> {
        let (Some(call), Some(args)) = (node.node_at(0), node.node_at(1)) else {
            return Err(self.unknown(node));
        };
        let call = call.clone();
        let args = args.clone();
        let body = node.child(2).cloned().unwrap_or(Child::Nil);

        // `lambda { }` and `proc { }` are bare function expressions.
        if call.children().len() == 2
            && call.child(0).is_some_and(Child::is_nil)
            && matches!(call.sym_at(1), Some("lambda" | "proc"))
        {
            return self.fn_expression(&args, &body, ScopeState::BlockBody, false);
        }

        // Iteration blocks lower to `for ... of` when the body does not
        // need to be a function.
        if self.options.eslevel.es2015()
            && call.sym_at(1) == Some("forEach")
            && call.children().len() == 2
            && args.children().len() == 1
            && args.node_at(0).is_some_and(|arg| arg.typ() == NodeType::Arg)
            && !contains_return(&body)
        {
            if let Some(receiver) = call.node_at(0) {
                let receiver = receiver.clone();
                let var = args
                    .node_at(0)
                    .and_then(|arg| arg.sym_at(0))
                    .unwrap_or("item")
                    .to_string();
                self.out.put("for (const ");
                self.out.put(&var);
                self.out.put(" of ");
                self.parse(&receiver, Ctx::Expression)?;
                self.out.put(") ");
                let wrap = self.out.wrap_open();
                self.loop_depth += 1;
                let result = self.with_jscope(&[var], |converter| {
                    converter.body_statements(&body)
                });
                self.loop_depth -= 1;
                result?;
                self.out.wrap_close(wrap, false);
                return Ok(());
            }
        }

        // General form: the block becomes the call's final argument.
        match call.child(0) {
            Some(Child::Node(receiver)) => {
                let receiver = receiver.clone();
                self.receiver_expr(&receiver)?;
                self.out
                    .put(if call.typ() == NodeType::Csend { "?." } else { "." });
            }
            _ => {}
        }
        self.out.put(call.sym_at(1).unwrap_or_default());
        self.out.put("(");
        let call_args: Vec<Child> = call.children()[2..].to_vec();
        self.parse_all(&call_args, ", ", Ctx::Expression)?;
        if call.children().len() > 2 {
            self.out.put(", ");
        }
        self.fn_expression(&args, &body, ScopeState::BlockBody, false)?;
        self.out.put(")");
        Ok(())
    }

    // ---- control transfers ----------------------------------------------

    pub(crate) fn on_yield(&mut self, node: &Node, _ctx: Ctx) -> Result<(), Error> {
        if !self.in_method() {
            return Err(self.illegal(node, "yield outside of a method"));
        }
        self.out.put(IMPLICIT_BLOCK);
        self.out.put("(");
        self.parse_all(node.children(), ", ", Ctx::Expression)?;
        self.out.put(")");
        Ok(())
    }

    pub(crate) fn on_return(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if !self.in_method() && self.state() != ScopeState::BlockBody {
            return Err(self.illegal(node, "return outside of a method"));
        }
        if ctx != Ctx::Statement {
            return Err(self.illegal(node, "return in expression position"));
        }
        self.out.put("return");
        if let Some(Child::Node(value)) = node.child(0) {
            let value = value.clone();
            self.out.put(" ");
            self.parse(&value, Ctx::Expression)?;
        }
        Ok(())
    }

    pub(crate) fn on_super(&mut self, node: &Node, _ctx: Ctx) -> Result<(), Error> {
        let Some(frame) = self.classes.last() else {
            return Err(self.illegal(node, "super outside of a class"));
        };
        let superclass = frame.superclass.clone();
        let Some(superclass) = superclass else {
            return Err(self.illegal(node, "super in a class with no superclass"));
        };
        let method = self
            .method_names
            .last()
            .cloned()
            .unwrap_or_else(|| "constructor".to_string());
        let in_constructor = method == "constructor";
        let es2015 = self.options.eslevel.es2015();
        let zsuper = node.typ() == NodeType::Zsuper;

        if es2015 {
            self.out.put("super");
            if !in_constructor {
                self.out.put(".");
                self.out.put(&method);
            }
            self.out.put("(");
            if zsuper {
                self.out.put("...arguments");
            } else {
                self.parse_all(node.children(), ", ", Ctx::Expression)?;
            }
            self.out.put(")");
            return Ok(());
        }

        // ES5: call through the superclass function object.
        self.parse(&superclass, Ctx::Expression)?;
        if !in_constructor {
            self.out.put(".prototype.");
            self.out.put(&method);
        }
        if zsuper {
            self.out.put(".apply(this, arguments)");
        } else {
            self.out.put(".call(this");
            for child in node.children() {
                if let Child::Node(arg) = child {
                    let arg = arg.clone();
                    self.out.put(", ");
                    self.parse(&arg, Ctx::Expression)?;
                }
            }
            self.out.put(")");
        }
        Ok(())
    }

    // ---- autoreturn ------------------------------------------------------

    /// Emit `return` for the final expression of a body, distributing
    /// through control-flow forms.
    pub(crate) fn on_autoreturn(&mut self, node: &Node, _ctx: Ctx) -> Result<(), Error> {
        let Some(child) = node.node_at(0) else {
            return Ok(());
        };
        let child = child.clone();
        match child.typ() {
            NodeType::Return | NodeType::Break | NodeType::Next => {
                self.parse(&child, Ctx::Statement)
            }
            // Loops produce no value; emit them as plain statements.
            NodeType::While
            | NodeType::Until
            | NodeType::WhilePost
            | NodeType::UntilPost
            | NodeType::For => self.parse(&child, Ctx::Statement),
            // A trailing assignment stays an assignment; its value is not
            // returned.
            NodeType::Lvasgn
            | NodeType::Ivasgn
            | NodeType::Cvasgn
            | NodeType::Gvasgn
            | NodeType::Casgn
            | NodeType::Masgn
            | NodeType::OpAsgn
            | NodeType::OrAsgn
            | NodeType::AndAsgn
            | NodeType::Import
            | NodeType::Export
            | NodeType::Class
            | NodeType::Module
            | NodeType::Def
            | NodeType::Defs => self.parse(&child, Ctx::Statement),
            NodeType::If => {
                let mut children = child.children().to_vec();
                for index in [1, 2] {
                    if let Some(Child::Node(branch)) = children.get(index).cloned() {
                        children[index] = Child::Node(autoreturn_wrap(branch));
                    }
                }
                self.parse(&child.updated(None, Some(children)), Ctx::Statement)
            }
            NodeType::Case | NodeType::CaseMatch => {
                let mut children = child.children().to_vec();
                for item in children.iter_mut().skip(1) {
                    let Child::Node(clause) = item else { continue };
                    match clause.typ() {
                        NodeType::When | NodeType::InPattern => {
                            let mut inner = clause.children().to_vec();
                            if let Some(Child::Node(body)) = inner.last().cloned() {
                                let last = inner.len() - 1;
                                inner[last] = Child::Node(autoreturn_wrap(body));
                            }
                            *item = Child::Node(clause.updated(None, Some(inner)));
                        }
                        // The trailing else body.
                        _ => *item = Child::Node(autoreturn_wrap(clause.clone())),
                    }
                }
                self.parse(&child.updated(None, Some(children)), Ctx::Statement)
            }
            NodeType::Begin | NodeType::Kwbegin => {
                let mut children = child.children().to_vec();
                if let Some(Child::Node(last)) = children.last().cloned() {
                    let index = children.len() - 1;
                    children[index] = Child::Node(autoreturn_wrap(last));
                }
                self.parse(&child.updated(None, Some(children)), Ctx::Statement)
            }
            NodeType::Rescue => {
                let mut children = child.children().to_vec();
                if let Some(Child::Node(body)) = children.first().cloned() {
                    children[0] = Child::Node(autoreturn_wrap(body));
                }
                for item in children.iter_mut().skip(1) {
                    let Child::Node(clause) = item else { continue };
                    if clause.typ() == NodeType::Resbody {
                        let mut inner = clause.children().to_vec();
                        if let Some(Child::Node(body)) = inner.get(2).cloned() {
                            inner[2] = Child::Node(autoreturn_wrap(body));
                        }
                        *item = Child::Node(clause.updated(None, Some(inner)));
                    }
                }
                self.parse(&child.updated(None, Some(children)), Ctx::Statement)
            }
            NodeType::Ensure => {
                let mut children = child.children().to_vec();
                if let Some(Child::Node(inner)) = children.first().cloned() {
                    children[0] = Child::Node(autoreturn_wrap(inner));
                }
                self.parse(&child.updated(None, Some(children)), Ctx::Statement)
            }
            _ => {
                self.out.put("return ");
                self.parse(&child, Ctx::Expression)
            }
        }
    }
}

/// Wrap a node in `autoreturn` unless it already transfers control.
fn autoreturn_wrap(node: Node) -> Node {
    match node.typ() {
        NodeType::Return | NodeType::Autoreturn | NodeType::Break | NodeType::Next => node,
        _ => Node::new(NodeType::Autoreturn, vec![Child::Node(node)]),
    }
}

/// Wrap a method body's final expression in `autoreturn`, reaching through
/// statement lists and `ensure`. A body the return filter already wrapped
/// passes through unchanged.
fn autoreturn_body(body: &Child) -> Child {
    match body {
        Child::Node(node) => match node.typ() {
            NodeType::Return | NodeType::Autoreturn => Child::Node(node.clone()),
            NodeType::Begin => {
                let mut children = node.children().to_vec();
                if let Some(Child::Node(last)) = children.last().cloned() {
                    let index = children.len() - 1;
                    children[index] = Child::Node(autoreturn_wrap(last));
                }
                Child::Node(node.updated(None, Some(children)))
            }
            NodeType::Ensure => {
                let mut children = node.children().to_vec();
                if let Some(first) = children.first().cloned() {
                    children[0] = autoreturn_body(&first);
                }
                Child::Node(node.updated(None, Some(children)))
            }
            _ => Child::Node(autoreturn_wrap(node.clone())),
        },
        other => other.clone(),
    }
}

/// Expressions safe as a concise arrow body: statement-shaped forms need
/// braces, and so does anything assigning locals, whose hoisted
/// declarations have nowhere to go in a concise body.
fn is_concise_safe(expr: &Node) -> bool {
    !matches!(
        expr.typ(),
        NodeType::Hash
            | NodeType::Begin
            | NodeType::Kwbegin
            | NodeType::If
            | NodeType::Case
            | NodeType::CaseMatch
            | NodeType::While
            | NodeType::Until
            | NodeType::For
            | NodeType::Rescue
            | NodeType::Ensure
    ) && !contains_assignment(expr)
}

fn contains_assignment(node: &Node) -> bool {
    if matches!(
        node.typ(),
        NodeType::Lvasgn
            | NodeType::Masgn
            | NodeType::OpAsgn
            | NodeType::OrAsgn
            | NodeType::AndAsgn
    ) {
        return true;
    }
    node.children().iter().any(|child| match child {
        Child::Node(inner) => contains_assignment(inner),
        _ => false,
    })
}
