// SPDX-License-Identifier: Apache-2.0

//! Method call, property access, and operator emission.

use super::{is_operator, op_precedence, unwrap_begin, Converter, Ctx, ScopeState};
use crate::ast::{Child, Node, NodeType};
use crate::error::Error;
use crate::namespace::Member;
use crate::options::OrMode;

impl Converter<'_> {
    pub(crate) fn on_send(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        let Some(receiver) = node.child(0).cloned() else {
            return Err(self.unknown(node));
        };
        let Some(selector) = node.sym_at(1).map(str::to_string) else {
            return Err(self.unknown(node));
        };
        let args: Vec<Node> = node.children()[2..]
            .iter()
            .filter_map(Child::as_node)
            .cloned()
            .collect();

        if node.typ() == NodeType::AwaitAttr {
            self.out.put("await ");
        }

        // Binary operator forms.
        if args.len() == 1 && is_operator(&selector) {
            return self.binary(node, &receiver, &selector, &args[0]);
        }

        match (&receiver, selector.as_str()) {
            // Unary minus/plus/bitwise-not.
            (Child::Node(operand), "-@" | "+@" | "~") if args.is_empty() => {
                let op = match selector.as_str() {
                    "-@" => "-",
                    "+@" => "+",
                    _ => "~",
                };
                self.out.put(op);
                let operand = operand.clone();
                return self.operand(&operand, op_precedence("!"));
            }
            (Child::Node(operand), "!") if args.is_empty() => {
                let operand = operand.clone();
                return self.negated_condition(&operand);
            }
            // Indexing and slicing.
            (Child::Node(object), "[]") => {
                let object = object.clone();
                return self.index(node, &object, &args);
            }
            (Child::Node(object), "[]=") => {
                let object = object.clone();
                let (indexes, value) = args.split_at(args.len().saturating_sub(1));
                self.receiver_expr(&object)?;
                self.out.put("[");
                let indexes: Vec<Child> =
                    indexes.iter().cloned().map(Child::Node).collect();
                self.parse_all(&indexes, ", ", Ctx::Expression)?;
                self.out.put("] = ");
                return self.parse(&value[0], Ctx::Expression);
            }
            // Constructor calls.
            (Child::Node(class), "new") => {
                let class = class.clone();
                self.out.put("new ");
                self.receiver_expr(&class)?;
                self.out.put("(");
                let args: Vec<Child> = args.into_iter().map(Child::Node).collect();
                self.parse_all(&args, ", ", Ctx::Expression)?;
                self.out.put(")");
                return Ok(());
            }
            // Exception raising.
            (Child::Nil, "raise") => return self.raise(node, &args, ctx),
            _ => {}
        }

        // Tagged template literals.
        if receiver.is_nil()
            && self.options.eslevel.es2015()
            && args.len() == 1
            && self
                .options
                .template_literal_tags
                .iter()
                .any(|tag| tag == &selector)
            && matches!(args[0].typ(), NodeType::Str | NodeType::Dstr)
        {
            self.out.put(&selector);
            self.out.put("`");
            match args[0].typ() {
                NodeType::Str => {
                    let chunk = Node::new(
                        NodeType::Dstr,
                        vec![Child::Node(args[0].clone())],
                    );
                    self.emit_template_parts(&chunk)?;
                }
                _ => self.emit_template_parts(&args[0])?,
            }
            self.out.put("`");
            return Ok(());
        }

        // Setter: `recv.name = value`.
        if selector.ends_with('=')
            && !selector.ends_with("==")
            && selector.len() > 1
            && args.len() == 1
        {
            let property = selector.trim_end_matches('=');
            match &receiver {
                Child::Node(object) => {
                    let object = object.clone();
                    self.receiver_expr(&object)?;
                    self.out.put(".");
                }
                _ => {}
            }
            self.out.put(property);
            self.out.put(" = ");
            return self.parse(&args[0], Ctx::Expression);
        }

        // Optional chaining below ES2020 lowers to a guard.
        if node.typ() == NodeType::Csend && !self.options.eslevel.es2020() {
            if let Child::Node(object) = &receiver {
                let object = object.clone();
                self.operand(&object, op_precedence("&&"))?;
                self.out.put(" && ");
                let plain = node.updated(Some(NodeType::Send), None);
                return self.operand(&plain, op_precedence("&&") + 1);
            }
        }

        // Receiver prefix.
        let mut member_method = false;
        match &receiver {
            Child::Node(object) => {
                let object = object.clone();
                self.receiver_expr(&object)?;
                if node.typ() == NodeType::Csend {
                    self.out.put("?.");
                } else {
                    self.out.put(".");
                }
            }
            Child::Nil => {
                // Bare references to known members of the enclosing class
                // need a `this.` prefix; member methods are calls even
                // without parentheses.
                if self.state() == ScopeState::MethodBody && !self.var_known(&selector) {
                    match self.namespace.own(None).get(selector.as_str()) {
                        Some(Member::Method | Member::StaticMethod) => {
                            self.out.put("this.");
                            member_method = true;
                        }
                        Some(Member::Attr) => self.out.put("this."),
                        _ => {}
                    }
                }
            }
            _ => return Err(self.unknown(node)),
        }

        self.out.put(&selector);

        let is_call = node.typ() == NodeType::Call
            || !args.is_empty()
            || node.is_method()
            || member_method;
        if is_call {
            // A trailing block-pass argument becomes an ordinary function
            // argument.
            self.out.put("(");
            let mut first = true;
            for arg in &args {
                if !first {
                    self.out.put(", ");
                }
                first = false;
                if arg.typ() == NodeType::Blockpass {
                    self.blockpass_arg(arg)?;
                } else {
                    self.parse(arg, Ctx::Expression)?;
                }
            }
            self.out.put(")");
        }
        Ok(())
    }

    /// Emit a receiver, parenthesizing forms that would misparse before a
    /// `.` or `[`: negative numbers, operators, ternaries, arrow heads.
    pub(crate) fn receiver_expr(&mut self, node: &Node) -> Result<(), Error> {
        let node = unwrap_begin(node);
        let needs_group = match node.typ() {
            NodeType::Int => matches!(node.child(0), Some(Child::Int(value)) if *value < 0),
            NodeType::Float => {
                matches!(node.child(0), Some(Child::Float(value)) if *value < 0.0)
            }
            _ => self.precedence_of(node).is_some(),
        };
        if needs_group {
            self.out.put("(");
            self.parse(node, Ctx::Expression)?;
            self.out.put(")");
        } else {
            self.parse(node, Ctx::Expression)?;
        }
        Ok(())
    }

    fn binary(
        &mut self,
        node: &Node,
        receiver: &Child,
        selector: &str,
        arg: &Node,
    ) -> Result<(), Error> {
        let Child::Node(left) = receiver else {
            return Err(self.unknown(node));
        };
        let left = left.clone();
        let op = self.mapped_operator(selector);

        if op == "**" && !self.options.eslevel.es2016() {
            self.out.put("Math.pow(");
            self.parse(&left, Ctx::Expression)?;
            self.out.put(", ");
            self.parse(arg, Ctx::Expression)?;
            self.out.put(")");
            return Ok(());
        }

        let prec = op_precedence(&op);
        let left = unwrap_begin(&left).clone();
        let right = unwrap_begin(arg).clone();
        // Left-associative: equal precedence needs no parens on the left.
        self.operand(&left, prec)?;
        self.out.put(&format!(" {op} "));
        // Right side of a left-associative operator binds one tighter;
        // exponentiation associates rightward.
        let right_min = if op == "**" { prec } else { prec + 1 };
        self.operand(&right, right_min)
    }

    fn index(&mut self, _node: &Node, object: &Node, args: &[Node]) -> Result<(), Error> {
        // Range subscripts become slices.
        if args.len() == 1
            && matches!(args[0].typ(), NodeType::Irange | NodeType::Erange)
        {
            let range = &args[0];
            let begin = range.node_at(0).cloned();
            let end = range.node_at(1).cloned();
            self.receiver_expr(object)?;
            self.out.put(".slice(");
            match begin {
                Some(begin) => self.parse(&begin, Ctx::Expression)?,
                None => self.out.put("0"),
            }
            if let Some(end) = end {
                self.out.put(", ");
                if range.typ() == NodeType::Irange {
                    // Inclusive upper bound.
                    if let (NodeType::Int, Some(Child::Int(value))) =
                        (end.typ(), end.child(0))
                    {
                        self.out.put(&(value + 1).to_string());
                    } else {
                        self.operand(&end, op_precedence("+"))?;
                        self.out.put(" + 1");
                    }
                } else {
                    self.parse(&end, Ctx::Expression)?;
                }
            }
            self.out.put(")");
            return Ok(());
        }

        self.receiver_expr(object)?;
        self.out.put("[");
        let args: Vec<Child> = args.iter().cloned().map(Child::Node).collect();
        self.parse_all(&args, ", ", Ctx::Expression)?;
        self.out.put("]");
        Ok(())
    }

    fn raise(&mut self, node: &Node, args: &[Node], ctx: Ctx) -> Result<(), Error> {
        if ctx != Ctx::Statement {
            return Err(self.illegal(node, "raise in expression position"));
        }
        self.out.put("throw ");
        match args {
            [] => {
                self.out.put("$EXCEPTION");
                Ok(())
            }
            [message] if matches!(message.typ(), NodeType::Str | NodeType::Dstr) => {
                self.out.put("new Error(");
                self.parse(message, Ctx::Expression)?;
                self.out.put(")");
                Ok(())
            }
            [class_ref] => self.parse(class_ref, Ctx::Expression),
            [class_ref, message] => {
                self.out.put("new ");
                self.parse(class_ref, Ctx::Expression)?;
                self.out.put("(");
                self.parse(message, Ctx::Expression)?;
                self.out.put(")");
                Ok(())
            }
            _ => Err(self.unknown(node)),
        }
    }

    /// `&block` arguments: a symbol becomes a trivial arrow, anything else
    /// passes through.
    fn blockpass_arg(&mut self, node: &Node) -> Result<(), Error> {
        let Some(inner) = node.node_at(0) else {
            return Err(self.unknown(node));
        };
        let inner = inner.clone();
        if inner.typ() == NodeType::Sym {
            let name = inner.sym_at(0).unwrap_or_default().to_string();
            if self.options.eslevel.es2015() {
                self.out.put(&format!("(item) => item.{name}()"));
            } else {
                self.out
                    .put(&format!("function (item) {{return item.{name}()}}"));
            }
            return Ok(());
        }
        self.parse(&inner, Ctx::Expression)
    }

    pub(crate) fn on_blockpass(&mut self, node: &Node, _ctx: Ctx) -> Result<(), Error> {
        self.blockpass_arg(node)
    }

    pub(crate) fn on_logical(&mut self, node: &Node, _ctx: Ctx) -> Result<(), Error> {
        let (Some(left), Some(right)) = (node.node_at(0), node.node_at(1)) else {
            return Err(self.unknown(node));
        };
        let left = unwrap_begin(left).clone();
        let right = unwrap_begin(right).clone();
        let op = match node.typ() {
            NodeType::And => "&&",
            _ => match self.options.or {
                // `??` only where the operands are known non-boolean.
                OrMode::Nullish
                    if !self.boolean_ish(&left) && !self.boolean_ish(&right) =>
                {
                    "??"
                }
                _ => "||",
            },
        };
        // `??` may not mix bare with `||`/`&&`; parenthesize any logical
        // operand rather than track the legality matrix.
        let prec = op_precedence(op);
        let (left_min, right_min) = if op == "??" {
            (op_precedence("&&") + 1, op_precedence("&&") + 1)
        } else {
            (prec, prec + 1)
        };
        self.operand(&left, left_min)?;
        self.out.put(&format!(" {op} "));
        self.operand(&right, right_min)
    }

    pub(crate) fn on_not(&mut self, node: &Node, _ctx: Ctx) -> Result<(), Error> {
        let Some(operand) = node.node_at(0) else {
            return Err(self.unknown(node));
        };
        let operand = operand.clone();
        self.negated_condition(&operand)
    }
}
