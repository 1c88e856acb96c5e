// SPDX-License-Identifier: Apache-2.0

//! Lowering from the Tree-Sitter concrete syntax tree to the tagged AST.
//!
//! The lowerer tracks a static local-variable environment, mirroring the
//! way Ruby itself distinguishes a bare identifier that names a local from
//! one that names a method: assignments, parameters, rescue variables, and
//! `for` loop variables introduce locals; `def` and class bodies start a
//! fresh environment while blocks see the enclosing one.

use super::literals::{
    common_margin, parse_float, parse_int, strip_margin, unescape_double, unescape_single,
};
use crate::ast::{sym, Child, Location, Node, NodeType, SourceBuffer};
use crate::error::Error;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tree_sitter::Node as TsNode;

struct Frame {
    names: HashSet<String>,
    barrier: bool,
}

pub(crate) struct Lowerer<'t> {
    buffer: Arc<SourceBuffer>,
    scopes: Vec<Frame>,
    pending_heredocs: VecDeque<TsNode<'t>>,
}

impl<'t> Lowerer<'t> {
    pub(crate) fn new(buffer: Arc<SourceBuffer>) -> Lowerer<'t> {
        Lowerer {
            buffer,
            scopes: vec![Frame {
                names: HashSet::new(),
                barrier: true,
            }],
            pending_heredocs: VecDeque::new(),
        }
    }

    pub(crate) fn lower_program(&mut self, root: TsNode<'t>) -> Result<Node, Error> {
        collect_heredoc_bodies(root, &mut self.pending_heredocs);
        let statements = self.lower_statements(self.named(root))?;
        Ok(self.begin_or_single(statements, root))
    }

    // ---- environment ----------------------------------------------------

    fn push_scope(&mut self, barrier: bool) {
        self.scopes.push(Frame {
            names: HashSet::new(),
            barrier,
        });
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str) {
        if let Some(frame) = self.scopes.last_mut() {
            frame.names.insert(name.to_string());
        }
    }

    fn is_local(&self, name: &str) -> bool {
        for frame in self.scopes.iter().rev() {
            if frame.names.contains(name) {
                return true;
            }
            if frame.barrier {
                break;
            }
        }
        false
    }

    // ---- tree helpers ---------------------------------------------------

    fn text(&self, ts: TsNode<'t>) -> &str {
        &self.buffer.source()[ts.start_byte()..ts.end_byte()]
    }

    fn loc(&self, ts: TsNode<'t>) -> Location {
        Location::new(self.buffer.clone(), ts.start_byte()..ts.end_byte())
    }

    fn unsupported(&self, ts: TsNode<'t>) -> Error {
        Error::Syntax {
            diagnostic: self.buffer.caret_diagnostic(
                &(ts.start_byte()..ts.end_byte()),
                &format!("unsupported construct ({})", ts.kind()),
            ),
        }
    }

    /// Named children, minus comments and floating heredoc bodies.
    fn named(&self, ts: TsNode<'t>) -> Vec<TsNode<'t>> {
        let mut cursor = ts.walk();
        ts.named_children(&mut cursor)
            .filter(|child| {
                !matches!(
                    child.kind(),
                    "comment" | "heredoc_body" | "empty_statement" | "uninterpreted"
                )
            })
            .collect()
    }

    fn lower_statements(&mut self, nodes: Vec<TsNode<'t>>) -> Result<Vec<Node>, Error> {
        nodes.into_iter().map(|node| self.lower(node)).collect()
    }

    fn begin_or_single(&self, mut statements: Vec<Node>, ts: TsNode<'t>) -> Node {
        match statements.len() {
            1 => statements.pop().expect("len checked"),
            _ => Node::with_loc(
                NodeType::Begin,
                statements.into_iter().map(Child::Node).collect(),
                Some(self.loc(ts)),
            ),
        }
    }

    fn lower_opt(&mut self, ts: Option<TsNode<'t>>) -> Result<Child, Error> {
        match ts {
            Some(ts) => Ok(Child::Node(self.lower(ts)?)),
            None => Ok(Child::Nil),
        }
    }

    /// Lower a body-ish container (`then`, `else`, `do`, `block_body`) to a
    /// single node, or `Nil` when empty.
    fn lower_body(&mut self, ts: Option<TsNode<'t>>) -> Result<Child, Error> {
        let Some(ts) = ts else {
            return Ok(Child::Nil);
        };
        match ts.kind() {
            "then" | "else" | "do" | "block_body" => {
                let statements = self.lower_statements(self.named(ts))?;
                if statements.is_empty() {
                    Ok(Child::Nil)
                } else {
                    Ok(Child::Node(self.begin_or_single(statements, ts)))
                }
            }
            "body_statement" => self.lower_body_statement(ts),
            _ => Ok(Child::Node(self.lower(ts)?)),
        }
    }

    /// Lower a `body_statement`, folding `rescue`/`else`/`ensure` clauses
    /// into the `rescue`/`ensure` node structure.
    fn lower_body_statement(&mut self, ts: TsNode<'t>) -> Result<Child, Error> {
        let mut main = Vec::new();
        let mut resbodies = Vec::new();
        let mut else_body = Child::Nil;
        let mut ensure_body = None;
        for child in self.named(ts) {
            match child.kind() {
                "rescue" => resbodies.push(self.lower_rescue_clause(child)?),
                "else" => else_body = self.lower_body(Some(child))?,
                "ensure" => {
                    let statements = self.lower_statements(self.named(child))?;
                    ensure_body = Some(self.begin_or_single(statements, child));
                }
                _ => main.push(self.lower(child)?),
            }
        }

        let main_node = if main.is_empty() {
            Child::Nil
        } else {
            Child::Node(self.begin_or_single(main, ts))
        };

        let mut result = if resbodies.is_empty() && else_body.is_nil() {
            main_node
        } else {
            let mut children = vec![main_node];
            children.extend(resbodies.into_iter().map(Child::Node));
            children.push(else_body);
            Child::Node(Node::with_loc(
                NodeType::Rescue,
                children,
                Some(self.loc(ts)),
            ))
        };

        if let Some(ensure_body) = ensure_body {
            result = Child::Node(Node::with_loc(
                NodeType::Ensure,
                vec![result, Child::Node(ensure_body)],
                Some(self.loc(ts)),
            ));
        }
        Ok(result)
    }

    fn lower_rescue_clause(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let exceptions = match ts.child_by_field_name("exceptions") {
            Some(list) => {
                let classes = self.lower_statements(self.named(list))?;
                Child::Node(Node::with_loc(
                    NodeType::Array,
                    classes.into_iter().map(Child::Node).collect(),
                    Some(self.loc(list)),
                ))
            }
            None => Child::Nil,
        };
        let variable = match ts.child_by_field_name("variable") {
            Some(var) => {
                let inner = self.named(var).into_iter().next().unwrap_or(var);
                let name = self.text(inner).to_string();
                self.declare(&name);
                Child::Node(Node::with_loc(
                    NodeType::Lvasgn,
                    vec![sym(name)],
                    Some(self.loc(inner)),
                ))
            }
            None => Child::Nil,
        };
        let body = self.lower_body(ts.child_by_field_name("body"))?;
        Ok(Node::with_loc(
            NodeType::Resbody,
            vec![exceptions, variable, body],
            Some(self.loc(ts)),
        ))
    }

    // ---- dispatch -------------------------------------------------------

    pub(crate) fn lower(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        match ts.kind() {
            "parenthesized_statements" => {
                let statements = self.lower_statements(self.named(ts))?;
                Ok(Node::with_loc(
                    NodeType::Begin,
                    statements.into_iter().map(Child::Node).collect(),
                    Some(self.loc(ts)),
                ))
            }

            // Literals
            "integer" => {
                let value = parse_int(self.text(ts))
                    .ok_or_else(|| self.unsupported(ts))?;
                Ok(Node::with_loc(
                    NodeType::Int,
                    vec![Child::Int(value)],
                    Some(self.loc(ts)),
                ))
            }
            "float" => {
                let value = parse_float(self.text(ts))
                    .ok_or_else(|| self.unsupported(ts))?;
                Ok(Node::with_loc(
                    NodeType::Float,
                    vec![Child::Float(value)],
                    Some(self.loc(ts)),
                ))
            }
            "nil" => Ok(Node::with_loc(NodeType::Nil, vec![], Some(self.loc(ts)))),
            "true" => Ok(Node::with_loc(NodeType::True, vec![], Some(self.loc(ts)))),
            "false" => Ok(Node::with_loc(NodeType::False, vec![], Some(self.loc(ts)))),
            "self" => Ok(Node::with_loc(
                NodeType::SelfNode,
                vec![],
                Some(self.loc(ts)),
            )),
            "string" => self.lower_string(ts),
            "character" => {
                let text = self.text(ts);
                let ch = text.strip_prefix('?').unwrap_or(text);
                let decoded = if ch.starts_with('\\') {
                    unescape_double(ch)
                } else {
                    ch.to_string()
                };
                Ok(Node::with_loc(
                    NodeType::Str,
                    vec![Child::Str(decoded)],
                    Some(self.loc(ts)),
                ))
            }
            "heredoc_beginning" => self.lower_heredoc(ts),
            "simple_symbol" => {
                let name = self.text(ts).trim_start_matches(':').to_string();
                Ok(Node::with_loc(
                    NodeType::Sym,
                    vec![sym(name)],
                    Some(self.loc(ts)),
                ))
            }
            "delimited_symbol" => self.lower_delimited_symbol(ts),
            "regex" => self.lower_regex(ts),
            "subshell" => self.lower_xstr(ts),
            "string_array" => {
                let items = self
                    .named(ts)
                    .into_iter()
                    .map(|item| {
                        Child::Node(Node::with_loc(
                            NodeType::Str,
                            vec![Child::Str(self.text(item).to_string())],
                            Some(self.loc(item)),
                        ))
                    })
                    .collect();
                Ok(Node::with_loc(NodeType::Array, items, Some(self.loc(ts))))
            }
            "symbol_array" => {
                let items = self
                    .named(ts)
                    .into_iter()
                    .map(|item| {
                        Child::Node(Node::with_loc(
                            NodeType::Sym,
                            vec![sym(self.text(item))],
                            Some(self.loc(item)),
                        ))
                    })
                    .collect();
                Ok(Node::with_loc(NodeType::Array, items, Some(self.loc(ts))))
            }
            "array" => {
                let items = self
                    .named(ts)
                    .into_iter()
                    .map(|item| self.lower_argument(item))
                    .collect::<Result<Vec<Node>, Error>>()?;
                Ok(Node::with_loc(
                    NodeType::Array,
                    items.into_iter().map(Child::Node).collect(),
                    Some(self.loc(ts)),
                ))
            }
            "hash" => {
                let pairs = self
                    .named(ts)
                    .into_iter()
                    .map(|pair| self.lower_argument(pair))
                    .collect::<Result<Vec<Node>, Error>>()?;
                Ok(Node::with_loc(
                    NodeType::Hash,
                    pairs.into_iter().map(Child::Node).collect(),
                    Some(self.loc(ts)),
                ))
            }
            "pair" => self.lower_pair(ts),
            "range" => self.lower_range(ts),

            // Variables
            "identifier" => {
                let name = self.text(ts).to_string();
                if self.is_local(&name) {
                    Ok(Node::with_loc(
                        NodeType::Lvar,
                        vec![sym(name)],
                        Some(self.loc(ts)),
                    ))
                } else {
                    let mut loc = self.loc(ts);
                    loc.selector = Some(ts.start_byte()..ts.end_byte());
                    Ok(Node::with_loc(
                        NodeType::Send,
                        vec![Child::Nil, sym(name)],
                        Some(loc),
                    ))
                }
            }
            "instance_variable" => {
                let name = self.text(ts).trim_start_matches('@').to_string();
                Ok(Node::with_loc(
                    NodeType::Ivar,
                    vec![sym(name)],
                    Some(self.loc(ts)),
                ))
            }
            "class_variable" => {
                let name = self.text(ts).trim_start_matches('@').to_string();
                Ok(Node::with_loc(
                    NodeType::Cvar,
                    vec![sym(name)],
                    Some(self.loc(ts)),
                ))
            }
            "global_variable" => {
                let name = self.text(ts).trim_start_matches('$').to_string();
                Ok(Node::with_loc(
                    NodeType::Gvar,
                    vec![sym(name)],
                    Some(self.loc(ts)),
                ))
            }
            "constant" => Ok(Node::with_loc(
                NodeType::Const,
                vec![Child::Nil, sym(self.text(ts))],
                Some(self.loc(ts)),
            )),
            "scope_resolution" => {
                let scope = self.lower_opt(ts.child_by_field_name("scope"))?;
                let name = ts
                    .child_by_field_name("name")
                    .ok_or_else(|| self.unsupported(ts))?;
                Ok(Node::with_loc(
                    NodeType::Const,
                    vec![scope, sym(self.text(name))],
                    Some(self.loc(ts)),
                ))
            }

            // Assignment
            "assignment" => self.lower_assignment(ts),
            "operator_assignment" => self.lower_operator_assignment(ts),

            // Operators
            "binary" => self.lower_binary(ts),
            "unary" => self.lower_unary(ts),
            "conditional" => {
                let condition = self.lower_opt(ts.child_by_field_name("condition"))?;
                let consequence = self.lower_opt(ts.child_by_field_name("consequence"))?;
                let alternative = self.lower_opt(ts.child_by_field_name("alternative"))?;
                Ok(Node::with_loc(
                    NodeType::If,
                    vec![condition, consequence, alternative],
                    Some(self.loc(ts)),
                ))
            }

            // Calls
            "call" => self.lower_call(ts),
            "element_reference" => self.lower_element_reference(ts),
            "super" => Ok(Node::with_loc(
                NodeType::Zsuper,
                vec![],
                Some(self.loc(ts)),
            )),
            "yield" => {
                let args = match self.named(ts).into_iter().next() {
                    Some(list) if list.kind() == "argument_list" => self.lower_call_args(list)?,
                    Some(expr) => vec![Child::Node(self.lower(expr)?)],
                    None => vec![],
                };
                Ok(Node::with_loc(NodeType::Yield, args, Some(self.loc(ts))))
            }
            "lambda" => self.lower_lambda(ts),
            "block_argument" => {
                let value = self.lower_opt(self.named(ts).into_iter().next())?;
                Ok(Node::with_loc(
                    NodeType::Blockpass,
                    vec![value],
                    Some(self.loc(ts)),
                ))
            }
            "splat_argument" => {
                let value = self.lower_opt(self.named(ts).into_iter().next())?;
                Ok(Node::with_loc(
                    NodeType::Splat,
                    vec![value],
                    Some(self.loc(ts)),
                ))
            }
            "hash_splat_argument" => {
                let value = self.lower_opt(self.named(ts).into_iter().next())?;
                Ok(Node::with_loc(
                    NodeType::Kwsplat,
                    vec![value],
                    Some(self.loc(ts)),
                ))
            }

            // Control flow
            "if" | "unless" | "elsif" => self.lower_if(ts),
            "if_modifier" => {
                let body = self.lower_opt(ts.child_by_field_name("body"))?;
                let condition = self.lower_opt(ts.child_by_field_name("condition"))?;
                Ok(Node::with_loc(
                    NodeType::If,
                    vec![condition, body, Child::Nil],
                    Some(self.loc(ts)),
                ))
            }
            "unless_modifier" => {
                let body = self.lower_opt(ts.child_by_field_name("body"))?;
                let condition = self.lower_opt(ts.child_by_field_name("condition"))?;
                Ok(Node::with_loc(
                    NodeType::If,
                    vec![condition, Child::Nil, body],
                    Some(self.loc(ts)),
                ))
            }
            "case" => self.lower_case(ts),
            "case_match" => self.lower_case_match(ts),
            "while" | "until" => {
                let typ = if ts.kind() == "while" {
                    NodeType::While
                } else {
                    NodeType::Until
                };
                let condition = self.lower_opt(ts.child_by_field_name("condition"))?;
                let body = self.lower_body(ts.child_by_field_name("body"))?;
                Ok(Node::with_loc(
                    typ,
                    vec![condition, body],
                    Some(self.loc(ts)),
                ))
            }
            "while_modifier" | "until_modifier" => {
                let post = ts
                    .child_by_field_name("body")
                    .is_some_and(|body| body.kind() == "begin");
                let typ = match (ts.kind(), post) {
                    ("while_modifier", false) => NodeType::While,
                    ("while_modifier", true) => NodeType::WhilePost,
                    (_, false) => NodeType::Until,
                    (_, true) => NodeType::UntilPost,
                };
                let condition = self.lower_opt(ts.child_by_field_name("condition"))?;
                let body = self.lower_opt(ts.child_by_field_name("body"))?;
                Ok(Node::with_loc(
                    typ,
                    vec![condition, body],
                    Some(self.loc(ts)),
                ))
            }
            "for" => self.lower_for(ts),
            "break" | "next" | "return" => {
                let typ = match ts.kind() {
                    "break" => NodeType::Break,
                    "next" => NodeType::Next,
                    _ => NodeType::Return,
                };
                let args = match self.named(ts).into_iter().next() {
                    Some(list) if list.kind() == "argument_list" => self.lower_call_args(list)?,
                    Some(expr) => vec![Child::Node(self.lower(expr)?)],
                    None => vec![],
                };
                let children = match args.len() {
                    0 | 1 => args,
                    _ => vec![Child::Node(Node::new(NodeType::Array, args))],
                };
                Ok(Node::with_loc(typ, children, Some(self.loc(ts))))
            }
            "begin" => self.lower_kwbegin(ts),
            "rescue_modifier" => {
                let body = self.lower_opt(ts.child_by_field_name("body"))?;
                let handler = self.lower_opt(ts.child_by_field_name("handler"))?;
                let resbody = Node::new(NodeType::Resbody, vec![Child::Nil, Child::Nil, handler]);
                Ok(Node::with_loc(
                    NodeType::Rescue,
                    vec![body, Child::Node(resbody), Child::Nil],
                    Some(self.loc(ts)),
                ))
            }

            // Definitions
            "method" => self.lower_method(ts),
            "singleton_method" => self.lower_singleton_method(ts),
            "class" => self.lower_class(ts),
            "module" => self.lower_module(ts),

            other => {
                tracing::trace!(kind = other, "no lowering for node kind");
                Err(self.unsupported(ts))
            }
        }
    }

    // ---- strings and friends --------------------------------------------

    fn string_is_single_quoted(&self, ts: TsNode<'t>) -> bool {
        let text = self.text(ts);
        text.starts_with('\'') || text.starts_with("%q")
    }

    /// Build literal/interpolation parts from a string-like node's named
    /// children.
    fn lower_parts(
        &mut self,
        ts: TsNode<'t>,
        single_quoted: bool,
    ) -> Result<Vec<StringPart>, Error> {
        let mut parts = Vec::new();
        for child in self.named(ts) {
            match child.kind() {
                "string_content" | "heredoc_content" => {
                    // Content nodes may nest escape sequences.
                    let inner = self.named(child);
                    if inner.is_empty() {
                        parts.push(StringPart::Lit(self.text(child).to_string()));
                    } else {
                        let mut cursor = child.start_byte();
                        for esc in inner {
                            if esc.start_byte() > cursor {
                                parts.push(StringPart::Lit(
                                    self.buffer.source()[cursor..esc.start_byte()].to_string(),
                                ));
                            }
                            parts.push(StringPart::Lit(self.decode_escape(esc, single_quoted)));
                            cursor = esc.end_byte();
                        }
                        if cursor < child.end_byte() {
                            parts.push(StringPart::Lit(
                                self.buffer.source()[cursor..child.end_byte()].to_string(),
                            ));
                        }
                    }
                }
                "escape_sequence" => {
                    parts.push(StringPart::Lit(self.decode_escape(child, single_quoted)));
                }
                "interpolation" => {
                    let statements = self.lower_statements(self.named(child))?;
                    let begin = Node::with_loc(
                        NodeType::Begin,
                        statements.into_iter().map(Child::Node).collect(),
                        Some(self.loc(child)),
                    );
                    parts.push(StringPart::Interp(begin));
                }
                "heredoc_end" => {}
                _ => return Err(self.unsupported(child)),
            }
        }
        Ok(parts)
    }

    fn decode_escape(&self, ts: TsNode<'t>, single_quoted: bool) -> String {
        let text = self.text(ts);
        if single_quoted {
            unescape_single(text)
        } else {
            unescape_double(text)
        }
    }

    fn parts_to_node(
        &self,
        parts: Vec<StringPart>,
        typ: NodeType,
        plain: NodeType,
        ts: TsNode<'t>,
    ) -> Node {
        let interpolated = parts
            .iter()
            .any(|part| matches!(part, StringPart::Interp(_)));
        if !interpolated {
            let text: String = parts
                .into_iter()
                .map(|part| match part {
                    StringPart::Lit(text) => text,
                    StringPart::Interp(_) => unreachable!(),
                })
                .collect();
            return Node::with_loc(plain, vec![Child::Str(text)], Some(self.loc(ts)));
        }

        // Merge adjacent literal runs, then interleave.
        let mut children = Vec::new();
        let mut run = String::new();
        for part in parts {
            match part {
                StringPart::Lit(text) => run.push_str(&text),
                StringPart::Interp(node) => {
                    if !run.is_empty() {
                        children.push(Child::Node(Node::new(
                            NodeType::Str,
                            vec![Child::Str(std::mem::take(&mut run))],
                        )));
                    }
                    children.push(Child::Node(node));
                }
            }
        }
        if !run.is_empty() {
            children.push(Child::Node(Node::new(
                NodeType::Str,
                vec![Child::Str(run)],
            )));
        }
        Node::with_loc(typ, children, Some(self.loc(ts)))
    }

    fn lower_string(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let single = self.string_is_single_quoted(ts);
        let parts = self.lower_parts(ts, single)?;
        Ok(self.parts_to_node(parts, NodeType::Dstr, NodeType::Str, ts))
    }

    fn lower_delimited_symbol(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let parts = self.lower_parts(ts, false)?;
        let interpolated = parts
            .iter()
            .any(|part| matches!(part, StringPart::Interp(_)));
        if interpolated {
            Ok(self.parts_to_node(parts, NodeType::Dsym, NodeType::Sym, ts))
        } else {
            let text: String = parts
                .into_iter()
                .map(|part| match part {
                    StringPart::Lit(text) => text,
                    StringPart::Interp(_) => unreachable!(),
                })
                .collect();
            Ok(Node::with_loc(
                NodeType::Sym,
                vec![sym(text)],
                Some(self.loc(ts)),
            ))
        }
    }

    fn lower_xstr(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let parts = self.lower_parts(ts, false)?;
        let mut children = Vec::new();
        for part in parts {
            match part {
                StringPart::Lit(text) => {
                    children.push(Child::Node(Node::new(NodeType::Str, vec![Child::Str(text)])))
                }
                StringPart::Interp(node) => children.push(Child::Node(node)),
            }
        }
        Ok(Node::with_loc(NodeType::Xstr, children, Some(self.loc(ts))))
    }

    fn lower_regex(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let text = self.text(ts).to_string();
        let flags = text
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .chars()
            .filter(|ch| ch.is_ascii_alphabetic())
            .map(|ch| sym(ch.to_string()))
            .collect::<Vec<Child>>();
        let regopt = Node::new(NodeType::Regopt, flags);

        let mut children: Vec<Child> = Vec::new();
        let inner = self.named(ts);
        if inner.is_empty() {
            let pattern = text
                .strip_prefix('/')
                .and_then(|rest| rest.rsplit_once('/'))
                .map(|(pattern, _)| pattern.to_string())
                .unwrap_or_else(|| text.to_string());
            children.push(Child::Node(Node::new(
                NodeType::Str,
                vec![Child::Str(pattern)],
            )));
        } else {
            // Interpolated pattern: literal gaps interleave with children.
            let mut cursor = ts.start_byte() + 1;
            for child in &inner {
                if child.start_byte() > cursor {
                    children.push(Child::Node(Node::new(
                        NodeType::Str,
                        vec![Child::Str(
                            self.buffer.source()[cursor..child.start_byte()].to_string(),
                        )],
                    )));
                }
                match child.kind() {
                    "interpolation" => {
                        let statements = self.lower_statements(self.named(*child))?;
                        children.push(Child::Node(self.begin_or_single(statements, *child)));
                    }
                    _ => children.push(Child::Node(Node::new(
                        NodeType::Str,
                        vec![Child::Str(self.text(*child).to_string())],
                    ))),
                }
                cursor = child.end_byte();
            }
            let close = text.rfind('/').map(|idx| ts.start_byte() + idx);
            if let Some(close) = close {
                if close > cursor {
                    children.push(Child::Node(Node::new(
                        NodeType::Str,
                        vec![Child::Str(self.buffer.source()[cursor..close].to_string())],
                    )));
                }
            }
        }
        children.push(Child::Node(regopt));
        Ok(Node::with_loc(
            NodeType::Regexp,
            children,
            Some(self.loc(ts)),
        ))
    }

    fn lower_heredoc(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let opener = self.text(ts);
        let squiggly = opener.starts_with("<<~");
        let single = opener.contains('\'');
        let body = self
            .pending_heredocs
            .pop_front()
            .ok_or_else(|| self.unsupported(ts))?;
        let mut parts = self.lower_parts(body, single)?;
        if squiggly {
            let margin = common_margin(&self.heredoc_text(body));
            parts = dedent_parts(parts, margin);
        }
        Ok(self.parts_to_node(parts, NodeType::Dstr, NodeType::Str, ts))
    }

    /// Body text without the terminator line, for margin measurement.
    fn heredoc_text(&self, body: TsNode<'t>) -> String {
        let end = self
            .named(body)
            .into_iter()
            .find(|child| child.kind() == "heredoc_end")
            .map(|child| child.start_byte())
            .unwrap_or(body.end_byte());
        self.buffer.source()[body.start_byte()..end].to_string()
    }

    // ---- containers ------------------------------------------------------

    fn lower_pair(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let key_ts = ts
            .child_by_field_name("key")
            .ok_or_else(|| self.unsupported(ts))?;
        let key = match key_ts.kind() {
            "hash_key_symbol" => Node::with_loc(
                NodeType::Sym,
                vec![sym(self.text(key_ts))],
                Some(self.loc(key_ts)),
            ),
            _ => self.lower(key_ts)?,
        };
        let value = self.lower_opt(ts.child_by_field_name("value"))?;
        Ok(Node::with_loc(
            NodeType::Pair,
            vec![Child::Node(key), value],
            Some(self.loc(ts)),
        ))
    }

    fn lower_range(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let mut operator = None;
        let mut cursor = ts.walk();
        for child in ts.children(&mut cursor) {
            if matches!(child.kind(), ".." | "...") {
                operator = Some((child.kind().to_string(), child.start_byte()));
            }
        }
        let (op, at) = operator.ok_or_else(|| self.unsupported(ts))?;
        let mut begin = Child::Nil;
        let mut end = Child::Nil;
        for child in self.named(ts) {
            if child.end_byte() <= at {
                begin = Child::Node(self.lower(child)?);
            } else if child.start_byte() >= at {
                end = Child::Node(self.lower(child)?);
            }
        }
        let typ = if op == "..." {
            NodeType::Erange
        } else {
            NodeType::Irange
        };
        Ok(Node::with_loc(typ, vec![begin, end], Some(self.loc(ts))))
    }

    // ---- assignment ------------------------------------------------------

    fn lower_assignment(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let left = ts
            .child_by_field_name("left")
            .ok_or_else(|| self.unsupported(ts))?;
        let right_ts = ts
            .child_by_field_name("right")
            .ok_or_else(|| self.unsupported(ts))?;

        // Multiple assignment first: its targets also declare locals.
        if left.kind() == "left_assignment_list" {
            let mlhs = self.lower_mlhs(left)?;
            let right = if right_ts.kind() == "right_assignment_list" {
                let items = self.lower_statements(self.named(right_ts))?;
                Child::Node(Node::with_loc(
                    NodeType::Array,
                    items.into_iter().map(Child::Node).collect(),
                    Some(self.loc(right_ts)),
                ))
            } else {
                Child::Node(self.lower(right_ts)?)
            };
            return Ok(Node::with_loc(
                NodeType::Masgn,
                vec![Child::Node(mlhs), right],
                Some(self.loc(ts)),
            ));
        }

        // Declare before lowering the right side: Ruby treats the name as a
        // local from the assignment onward.
        if left.kind() == "identifier" {
            self.declare(self.text(left).to_string().as_str());
        }
        let right = Child::Node(self.lower(right_ts)?);

        match left.kind() {
            "identifier" => Ok(Node::with_loc(
                NodeType::Lvasgn,
                vec![sym(self.text(left)), right],
                Some(self.loc(ts)),
            )),
            "instance_variable" => Ok(Node::with_loc(
                NodeType::Ivasgn,
                vec![sym(self.text(left).trim_start_matches('@')), right],
                Some(self.loc(ts)),
            )),
            "class_variable" => Ok(Node::with_loc(
                NodeType::Cvasgn,
                vec![sym(self.text(left).trim_start_matches('@')), right],
                Some(self.loc(ts)),
            )),
            "global_variable" => Ok(Node::with_loc(
                NodeType::Gvasgn,
                vec![sym(self.text(left).trim_start_matches('$')), right],
                Some(self.loc(ts)),
            )),
            "constant" => Ok(Node::with_loc(
                NodeType::Casgn,
                vec![Child::Nil, sym(self.text(left)), right],
                Some(self.loc(ts)),
            )),
            "scope_resolution" => {
                let scope = self.lower_opt(left.child_by_field_name("scope"))?;
                let name = left
                    .child_by_field_name("name")
                    .ok_or_else(|| self.unsupported(left))?;
                Ok(Node::with_loc(
                    NodeType::Casgn,
                    vec![scope, sym(self.text(name)), right],
                    Some(self.loc(ts)),
                ))
            }
            "element_reference" => {
                let target = self.lower_element_reference(left)?;
                let mut children = target.children().to_vec();
                children[1] = sym("[]=");
                children.push(right);
                Ok(target.updated(None, Some(children)))
            }
            "call" => {
                let target = self.lower_call(left)?;
                let selector = target.sym_at(1).unwrap_or_default().to_string();
                let mut children = target.children().to_vec();
                children[1] = sym(format!("{selector}="));
                children.push(right);
                Ok(target.updated(None, Some(children)))
            }
            _ => Err(self.unsupported(left)),
        }
    }

    fn lower_mlhs(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let mut items = Vec::new();
        for child in self.named(ts) {
            match child.kind() {
                "identifier" => {
                    let name = self.text(child).to_string();
                    self.declare(&name);
                    items.push(Child::Node(Node::with_loc(
                        NodeType::Lvasgn,
                        vec![sym(name)],
                        Some(self.loc(child)),
                    )));
                }
                "instance_variable" => items.push(Child::Node(Node::with_loc(
                    NodeType::Ivasgn,
                    vec![sym(self.text(child).trim_start_matches('@'))],
                    Some(self.loc(child)),
                ))),
                "rest_assignment" => {
                    let inner = match self.named(child).into_iter().next() {
                        Some(name) => {
                            let text = self.text(name).to_string();
                            self.declare(&text);
                            Child::Node(Node::with_loc(
                                NodeType::Lvasgn,
                                vec![sym(text)],
                                Some(self.loc(name)),
                            ))
                        }
                        None => Child::Nil,
                    };
                    items.push(Child::Node(Node::with_loc(
                        NodeType::Splat,
                        vec![inner],
                        Some(self.loc(child)),
                    )));
                }
                "destructured_left_assignment" => {
                    items.push(Child::Node(self.lower_mlhs(child)?));
                }
                _ => return Err(self.unsupported(child)),
            }
        }
        Ok(Node::with_loc(NodeType::Mlhs, items, Some(self.loc(ts))))
    }

    /// An assignment target without its value, as used inside `op_asgn`,
    /// `or_asgn`, and `and_asgn` nodes.
    fn lower_asgn_target(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        match ts.kind() {
            "identifier" => {
                let name = self.text(ts).to_string();
                self.declare(&name);
                Ok(Node::with_loc(
                    NodeType::Lvasgn,
                    vec![sym(name)],
                    Some(self.loc(ts)),
                ))
            }
            "instance_variable" => Ok(Node::with_loc(
                NodeType::Ivasgn,
                vec![sym(self.text(ts).trim_start_matches('@'))],
                Some(self.loc(ts)),
            )),
            "class_variable" => Ok(Node::with_loc(
                NodeType::Cvasgn,
                vec![sym(self.text(ts).trim_start_matches('@'))],
                Some(self.loc(ts)),
            )),
            "global_variable" => Ok(Node::with_loc(
                NodeType::Gvasgn,
                vec![sym(self.text(ts).trim_start_matches('$'))],
                Some(self.loc(ts)),
            )),
            "constant" => Ok(Node::with_loc(
                NodeType::Casgn,
                vec![Child::Nil, sym(self.text(ts))],
                Some(self.loc(ts)),
            )),
            "element_reference" => self.lower_element_reference(ts),
            "call" => self.lower_call(ts),
            _ => Err(self.unsupported(ts)),
        }
    }

    fn lower_operator_assignment(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let left = ts
            .child_by_field_name("left")
            .ok_or_else(|| self.unsupported(ts))?;
        let operator = ts
            .child_by_field_name("operator")
            .map(|op| self.text(op).to_string())
            .or_else(|| {
                let mut cursor = ts.walk();
                ts.children(&mut cursor)
                    .find(|child| !child.is_named() && self.text(*child).ends_with('='))
                    .map(|child| self.text(child).to_string())
            })
            .ok_or_else(|| self.unsupported(ts))?;
        let target = self.lower_asgn_target(left)?;
        let right = self.lower_opt(ts.child_by_field_name("right"))?;

        match operator.as_str() {
            "||=" => Ok(Node::with_loc(
                NodeType::OrAsgn,
                vec![Child::Node(target), right],
                Some(self.loc(ts)),
            )),
            "&&=" => Ok(Node::with_loc(
                NodeType::AndAsgn,
                vec![Child::Node(target), right],
                Some(self.loc(ts)),
            )),
            op => {
                let op = op.trim_end_matches('=');
                Ok(Node::with_loc(
                    NodeType::OpAsgn,
                    vec![Child::Node(target), sym(op), right],
                    Some(self.loc(ts)),
                ))
            }
        }
    }

    // ---- operators -------------------------------------------------------

    fn lower_binary(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let left = self.lower_opt(ts.child_by_field_name("left"))?;
        let right = self.lower_opt(ts.child_by_field_name("right"))?;
        let operator = ts
            .child_by_field_name("operator")
            .map(|op| self.text(op).to_string())
            .ok_or_else(|| self.unsupported(ts))?;
        match operator.as_str() {
            "&&" | "and" => Ok(Node::with_loc(
                NodeType::And,
                vec![left, right],
                Some(self.loc(ts)),
            )),
            "||" | "or" => Ok(Node::with_loc(
                NodeType::Or,
                vec![left, right],
                Some(self.loc(ts)),
            )),
            op => {
                let mut loc = self.loc(ts);
                if let Some(operator) = ts.child_by_field_name("operator") {
                    loc.selector = Some(operator.start_byte()..operator.end_byte());
                }
                Ok(Node::with_loc(
                    NodeType::Send,
                    vec![left, sym(op), right],
                    Some(loc),
                ))
            }
        }
    }

    fn lower_unary(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let operand_ts = ts
            .child_by_field_name("operand")
            .or_else(|| self.named(ts).into_iter().next())
            .ok_or_else(|| self.unsupported(ts))?;
        let operator = ts
            .child_by_field_name("operator")
            .map(|op| self.text(op).to_string())
            .unwrap_or_else(|| {
                let text = self.text(ts);
                let tail = &self.buffer.source()[operand_ts.start_byte()..ts.end_byte()];
                text[..text.len() - tail.len()].trim().to_string()
            });

        match operator.as_str() {
            "!" | "not" => {
                let operand = self.lower(operand_ts)?;
                Ok(Node::with_loc(
                    NodeType::Not,
                    vec![Child::Node(operand)],
                    Some(self.loc(ts)),
                ))
            }
            "defined?" => {
                let operand = self.lower(operand_ts)?;
                Ok(Node::with_loc(
                    NodeType::Defined,
                    vec![Child::Node(operand)],
                    Some(self.loc(ts)),
                ))
            }
            "-" => match operand_ts.kind() {
                "integer" => {
                    let value = parse_int(self.text(operand_ts))
                        .ok_or_else(|| self.unsupported(operand_ts))?;
                    Ok(Node::with_loc(
                        NodeType::Int,
                        vec![Child::Int(-value)],
                        Some(self.loc(ts)),
                    ))
                }
                "float" => {
                    let value = parse_float(self.text(operand_ts))
                        .ok_or_else(|| self.unsupported(operand_ts))?;
                    Ok(Node::with_loc(
                        NodeType::Float,
                        vec![Child::Float(-value)],
                        Some(self.loc(ts)),
                    ))
                }
                _ => {
                    let operand = self.lower(operand_ts)?;
                    Ok(Node::with_loc(
                        NodeType::Send,
                        vec![Child::Node(operand), sym("-@")],
                        Some(self.loc(ts)),
                    ))
                }
            },
            "+" => self.lower(operand_ts),
            "~" => {
                let operand = self.lower(operand_ts)?;
                Ok(Node::with_loc(
                    NodeType::Send,
                    vec![Child::Node(operand), sym("~")],
                    Some(self.loc(ts)),
                ))
            }
            _ => Err(self.unsupported(ts)),
        }
    }

    // ---- calls -----------------------------------------------------------

    fn lower_call_args(&mut self, list: TsNode<'t>) -> Result<Vec<Child>, Error> {
        let mut args: Vec<Child> = Vec::new();
        let mut trailing_pairs: Vec<Child> = Vec::new();
        for child in self.named(list) {
            match child.kind() {
                "pair" => trailing_pairs.push(Child::Node(self.lower_pair(child)?)),
                "hash_splat_argument" => trailing_pairs.push(Child::Node(self.lower(child)?)),
                _ => args.push(Child::Node(self.lower_argument(child)?)),
            }
        }
        if !trailing_pairs.is_empty() {
            args.push(Child::Node(Node::new(NodeType::Hash, trailing_pairs)));
        }
        Ok(args)
    }

    fn lower_argument(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        self.lower(ts)
    }

    fn lower_call(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let receiver = self.lower_opt(ts.child_by_field_name("receiver"))?;
        let method_ts = ts.child_by_field_name("method");
        let method = method_ts
            .map(|method| self.text(method).to_string())
            .unwrap_or_default();

        // `super(...)` parses as a call whose target is the keyword.
        let super_call = method == "super"
            || (method.is_empty()
                && self
                    .named(ts)
                    .first()
                    .is_some_and(|child| child.kind() == "super"));
        if receiver.is_nil() && super_call {
            let args = match ts.child_by_field_name("arguments") {
                Some(list) => self.lower_call_args(list)?,
                None => vec![],
            };
            return Ok(Node::with_loc(NodeType::Super, args, Some(self.loc(ts))));
        }
        if method.is_empty() {
            return Err(self.unsupported(ts));
        }

        let csend = {
            let mut cursor = ts.walk();
            ts.children(&mut cursor)
                .any(|child| !child.is_named() && self.text(child) == "&.")
        };

        let args = match ts.child_by_field_name("arguments") {
            Some(list) => self.lower_call_args(list)?,
            None => vec![],
        };

        let mut loc = self.loc(ts);
        if let Some(method) = method_ts {
            loc.selector = Some(method.start_byte()..method.end_byte());
        }

        let typ = if csend { NodeType::Csend } else { NodeType::Send };
        let mut children = vec![receiver, sym(method.as_str())];
        children.extend(args);
        let call = Node::with_loc(typ, children, Some(loc));

        match ts.child_by_field_name("block") {
            Some(block) => self.lower_block(call, block),
            None => Ok(call),
        }
    }

    fn lower_block(&mut self, call: Node, block: TsNode<'t>) -> Result<Node, Error> {
        self.push_scope(false);
        let args = match block.child_by_field_name("parameters") {
            Some(params) => self.lower_block_parameters(params)?,
            None => Node::new(NodeType::Args, vec![]),
        };
        let body = self.lower_body(block.child_by_field_name("body"))?;
        self.pop_scope();
        Ok(Node::with_loc(
            NodeType::Block,
            vec![Child::Node(call), Child::Node(args), body],
            Some(self.loc(block)),
        ))
    }

    fn lower_block_parameters(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let mut params = Vec::new();
        for child in self.named(ts) {
            match child.kind() {
                "identifier" => {
                    let name = self.text(child).to_string();
                    self.declare(&name);
                    params.push(Child::Node(Node::with_loc(
                        NodeType::Arg,
                        vec![sym(name)],
                        Some(self.loc(child)),
                    )));
                }
                "splat_parameter" => {
                    let name = self
                        .named(child)
                        .into_iter()
                        .next()
                        .map(|name| self.text(name).to_string());
                    if let Some(name) = &name {
                        self.declare(name);
                    }
                    let children = match name {
                        Some(name) => vec![sym(name)],
                        None => vec![],
                    };
                    params.push(Child::Node(Node::with_loc(
                        NodeType::Restarg,
                        children,
                        Some(self.loc(child)),
                    )));
                }
                "destructured_parameter" => {
                    let mut items = Vec::new();
                    for inner in self.named(child) {
                        let name = self.text(inner).to_string();
                        self.declare(&name);
                        items.push(Child::Node(Node::with_loc(
                            NodeType::Arg,
                            vec![sym(name)],
                            Some(self.loc(inner)),
                        )));
                    }
                    params.push(Child::Node(Node::with_loc(
                        NodeType::Mlhs,
                        items,
                        Some(self.loc(child)),
                    )));
                }
                _ => return Err(self.unsupported(child)),
            }
        }
        Ok(Node::with_loc(NodeType::Args, params, Some(self.loc(ts))))
    }

    fn lower_element_reference(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let object_ts = ts
            .child_by_field_name("object")
            .ok_or_else(|| self.unsupported(ts))?;
        let object = self.lower(object_ts)?;
        let mut children = vec![Child::Node(object), sym("[]")];
        for child in self.named(ts) {
            if child.id() == object_ts.id() {
                continue;
            }
            children.push(Child::Node(self.lower_argument(child)?));
        }
        Ok(Node::with_loc(
            NodeType::Send,
            children,
            Some(self.loc(ts)),
        ))
    }

    fn lower_lambda(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        self.push_scope(false);
        let args = match ts.child_by_field_name("parameters") {
            Some(params) => self.lower_method_parameters(params)?,
            None => Node::new(NodeType::Args, vec![]),
        };
        let body = match ts.child_by_field_name("body") {
            Some(body) => match body.kind() {
                "block" | "do_block" => self.lower_body(body.child_by_field_name("body"))?,
                _ => self.lower_body(Some(body))?,
            },
            None => Child::Nil,
        };
        self.pop_scope();
        let target = Node::new(NodeType::Send, vec![Child::Nil, sym("lambda")]);
        Ok(Node::with_loc(
            NodeType::Block,
            vec![Child::Node(target), Child::Node(args), body],
            Some(self.loc(ts)),
        ))
    }

    // ---- control flow ----------------------------------------------------

    fn lower_if(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let condition = self.lower_opt(ts.child_by_field_name("condition"))?;
        let consequence = self.lower_body(ts.child_by_field_name("consequence"))?;
        let alternative = match ts.child_by_field_name("alternative") {
            Some(alternative) => match alternative.kind() {
                "else" => self.lower_body(Some(alternative))?,
                "elsif" => Child::Node(self.lower_if(alternative)?),
                _ => Child::Node(self.lower(alternative)?),
            },
            None => Child::Nil,
        };
        let children = if ts.kind() == "unless" {
            vec![condition, alternative, consequence]
        } else {
            vec![condition, consequence, alternative]
        };
        Ok(Node::with_loc(NodeType::If, children, Some(self.loc(ts))))
    }

    fn lower_case(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let value = self.lower_opt(ts.child_by_field_name("value"))?;
        let mut children = vec![value];
        let mut else_body = Child::Nil;
        for child in self.named(ts) {
            match child.kind() {
                "when" => {
                    let mut when_children = Vec::new();
                    let mut cursor = child.walk();
                    let patterns: Vec<TsNode> = child
                        .children_by_field_name("pattern", &mut cursor)
                        .collect();
                    for pattern in patterns {
                        let inner = self
                            .named(pattern)
                            .into_iter()
                            .next()
                            .unwrap_or(pattern);
                        when_children.push(Child::Node(self.lower(inner)?));
                    }
                    when_children.push(self.lower_body(child.child_by_field_name("body"))?);
                    children.push(Child::Node(Node::with_loc(
                        NodeType::When,
                        when_children,
                        Some(self.loc(child)),
                    )));
                }
                "else" => else_body = self.lower_body(Some(child))?,
                _ => {}
            }
        }
        children.push(else_body);
        Ok(Node::with_loc(NodeType::Case, children, Some(self.loc(ts))))
    }

    fn lower_case_match(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let value = self.lower_opt(ts.child_by_field_name("value"))?;
        let mut children = vec![value];
        let mut else_body = Child::Nil;
        for child in self.named(ts) {
            match child.kind() {
                "in_clause" => {
                    let pattern = child
                        .child_by_field_name("pattern")
                        .ok_or_else(|| self.unsupported(child))?;
                    let pattern = self.lower_pattern(pattern)?;
                    let guard = match child.child_by_field_name("guard") {
                        Some(guard) => {
                            let condition = self
                                .named(guard)
                                .into_iter()
                                .next()
                                .ok_or_else(|| self.unsupported(guard))?;
                            let lowered = self.lower(condition)?;
                            if guard.kind() == "unless_guard" {
                                Child::Node(Node::new(
                                    NodeType::Not,
                                    vec![Child::Node(lowered)],
                                ))
                            } else {
                                Child::Node(lowered)
                            }
                        }
                        None => Child::Nil,
                    };
                    let body = self.lower_body(child.child_by_field_name("body"))?;
                    children.push(Child::Node(Node::with_loc(
                        NodeType::InPattern,
                        vec![Child::Node(pattern), guard, body],
                        Some(self.loc(child)),
                    )));
                }
                "else" => else_body = self.lower_body(Some(child))?,
                _ => {}
            }
        }
        children.push(else_body);
        Ok(Node::with_loc(
            NodeType::CaseMatch,
            children,
            Some(self.loc(ts)),
        ))
    }

    fn lower_pattern(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        match ts.kind() {
            "identifier" => {
                let name = self.text(ts).to_string();
                self.declare(&name);
                Ok(Node::with_loc(
                    NodeType::MatchVar,
                    vec![sym(name)],
                    Some(self.loc(ts)),
                ))
            }
            "array_pattern" => {
                let items = self
                    .named(ts)
                    .into_iter()
                    .map(|item| self.lower_pattern(item).map(Child::Node))
                    .collect::<Result<Vec<Child>, Error>>()?;
                Ok(Node::with_loc(
                    NodeType::ArrayPattern,
                    items,
                    Some(self.loc(ts)),
                ))
            }
            "hash_pattern" => {
                let mut pairs = Vec::new();
                for child in self.named(ts) {
                    match child.kind() {
                        "keyword_pattern" => {
                            let key = child
                                .child_by_field_name("key")
                                .ok_or_else(|| self.unsupported(child))?;
                            let key_name = self.text(key).trim_end_matches(':').to_string();
                            let value = match child.child_by_field_name("value") {
                                Some(value) => self.lower_pattern(value)?,
                                None => {
                                    self.declare(&key_name);
                                    Node::new(NodeType::MatchVar, vec![sym(key_name.as_str())])
                                }
                            };
                            let key_node = Node::with_loc(
                                NodeType::Sym,
                                vec![sym(key_name)],
                                Some(self.loc(key)),
                            );
                            pairs.push(Child::Node(Node::with_loc(
                                NodeType::Pair,
                                vec![Child::Node(key_node), Child::Node(value)],
                                Some(self.loc(child)),
                            )));
                        }
                        _ => return Err(self.unsupported(child)),
                    }
                }
                Ok(Node::with_loc(
                    NodeType::HashPattern,
                    pairs,
                    Some(self.loc(ts)),
                ))
            }
            // Literal and constant patterns compare by value.
            _ => self.lower(ts),
        }
    }

    fn lower_for(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let pattern = ts
            .child_by_field_name("pattern")
            .ok_or_else(|| self.unsupported(ts))?;
        let var = match pattern.kind() {
            "identifier" => {
                let name = self.text(pattern).to_string();
                self.declare(&name);
                Node::with_loc(
                    NodeType::Lvasgn,
                    vec![sym(name)],
                    Some(self.loc(pattern)),
                )
            }
            "left_assignment_list" => self.lower_mlhs(pattern)?,
            _ => return Err(self.unsupported(pattern)),
        };
        let value_ts = ts
            .child_by_field_name("value")
            .ok_or_else(|| self.unsupported(ts))?;
        let value_ts = if value_ts.kind() == "in" {
            self.named(value_ts)
                .into_iter()
                .next()
                .ok_or_else(|| self.unsupported(value_ts))?
        } else {
            value_ts
        };
        let value = self.lower(value_ts)?;
        let body = self.lower_body(ts.child_by_field_name("body"))?;
        Ok(Node::with_loc(
            NodeType::For,
            vec![Child::Node(var), Child::Node(value), body],
            Some(self.loc(ts)),
        ))
    }

    fn lower_kwbegin(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let body = self.lower_body_statement(ts)?;
        let children = match body {
            Child::Nil => vec![],
            Child::Node(node)
                if node.typ() == NodeType::Begin && node.loc().is_none() =>
            {
                node.children().to_vec()
            }
            other => vec![other],
        };
        Ok(Node::with_loc(
            NodeType::Kwbegin,
            children,
            Some(self.loc(ts)),
        ))
    }

    // ---- definitions -----------------------------------------------------

    fn lower_method_parameters(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let mut params = Vec::new();
        for child in self.named(ts) {
            let param = match child.kind() {
                "identifier" => {
                    let name = self.text(child).to_string();
                    self.declare(&name);
                    Node::with_loc(NodeType::Arg, vec![sym(name)], Some(self.loc(child)))
                }
                "optional_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .ok_or_else(|| self.unsupported(child))?;
                    let name_text = self.text(name).to_string();
                    self.declare(&name_text);
                    let value = self.lower_opt(child.child_by_field_name("value"))?;
                    Node::with_loc(
                        NodeType::Optarg,
                        vec![sym(name_text), value],
                        Some(self.loc(child)),
                    )
                }
                "splat_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .or_else(|| self.named(child).into_iter().next());
                    let children = match name {
                        Some(name) => {
                            let text = self.text(name).to_string();
                            self.declare(&text);
                            vec![sym(text)]
                        }
                        None => vec![],
                    };
                    Node::with_loc(NodeType::Restarg, children, Some(self.loc(child)))
                }
                "hash_splat_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .or_else(|| self.named(child).into_iter().next());
                    let children = match name {
                        Some(name) => {
                            let text = self.text(name).to_string();
                            self.declare(&text);
                            vec![sym(text)]
                        }
                        None => vec![],
                    };
                    Node::with_loc(NodeType::Kwrestarg, children, Some(self.loc(child)))
                }
                "block_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .or_else(|| self.named(child).into_iter().next())
                        .ok_or_else(|| self.unsupported(child))?;
                    let text = self.text(name).to_string();
                    self.declare(&text);
                    Node::with_loc(NodeType::Blockarg, vec![sym(text)], Some(self.loc(child)))
                }
                "keyword_parameter" => {
                    let name = child
                        .child_by_field_name("name")
                        .ok_or_else(|| self.unsupported(child))?;
                    let text = self.text(name).to_string();
                    self.declare(&text);
                    match child.child_by_field_name("value") {
                        Some(value) => {
                            let value = self.lower(value)?;
                            Node::with_loc(
                                NodeType::Kwoptarg,
                                vec![sym(text), Child::Node(value)],
                                Some(self.loc(child)),
                            )
                        }
                        None => Node::with_loc(
                            NodeType::Kwarg,
                            vec![sym(text)],
                            Some(self.loc(child)),
                        ),
                    }
                }
                _ => return Err(self.unsupported(child)),
            };
            params.push(Child::Node(param));
        }
        Ok(Node::with_loc(NodeType::Args, params, Some(self.loc(ts))))
    }

    fn method_pieces(
        &mut self,
        ts: TsNode<'t>,
    ) -> Result<(String, std::ops::Range<usize>, Node, Child), Error> {
        let name_ts = ts
            .child_by_field_name("name")
            .ok_or_else(|| self.unsupported(ts))?;
        let name = self.text(name_ts).to_string();

        self.push_scope(true);
        let args = match ts.child_by_field_name("parameters") {
            Some(params) => self.lower_method_parameters(params)?,
            None => Node::new(NodeType::Args, vec![]),
        };
        let body = match ts.child_by_field_name("body") {
            Some(body) if body.kind() == "body_statement" => self.lower_body_statement(body)?,
            // Endless methods carry a bare expression body.
            Some(body) => Child::Node(self.lower(body)?),
            None => Child::Nil,
        };
        self.pop_scope();
        Ok((name, name_ts.start_byte()..name_ts.end_byte(), args, body))
    }

    fn lower_method(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let (name, name_range, args, body) = self.method_pieces(ts)?;
        let mut loc = self.loc(ts);
        loc.name = Some(name_range);
        Ok(Node::with_loc(
            NodeType::Def,
            vec![sym(name), Child::Node(args), body],
            Some(loc),
        ))
    }

    fn lower_singleton_method(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let object = ts
            .child_by_field_name("object")
            .ok_or_else(|| self.unsupported(ts))?;
        let object = self.lower(object)?;
        let (name, name_range, args, body) = self.method_pieces(ts)?;
        let mut loc = self.loc(ts);
        loc.name = Some(name_range);
        Ok(Node::with_loc(
            NodeType::Defs,
            vec![Child::Node(object), sym(name), Child::Node(args), body],
            Some(loc),
        ))
    }

    fn lower_class(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let name = ts
            .child_by_field_name("name")
            .ok_or_else(|| self.unsupported(ts))?;
        let name = self.lower(name)?;
        let superclass = match ts.child_by_field_name("superclass") {
            Some(superclass) => {
                let inner = self
                    .named(superclass)
                    .into_iter()
                    .next()
                    .ok_or_else(|| self.unsupported(superclass))?;
                Child::Node(self.lower(inner)?)
            }
            None => Child::Nil,
        };
        self.push_scope(true);
        let body = self.lower_body(ts.child_by_field_name("body"))?;
        self.pop_scope();
        Ok(Node::with_loc(
            NodeType::Class,
            vec![Child::Node(name), superclass, body],
            Some(self.loc(ts)),
        ))
    }

    fn lower_module(&mut self, ts: TsNode<'t>) -> Result<Node, Error> {
        let name = ts
            .child_by_field_name("name")
            .ok_or_else(|| self.unsupported(ts))?;
        let name = self.lower(name)?;
        self.push_scope(true);
        let body = self.lower_body(ts.child_by_field_name("body"))?;
        self.pop_scope();
        Ok(Node::with_loc(
            NodeType::Module,
            vec![Child::Node(name), body],
            Some(self.loc(ts)),
        ))
    }
}

enum StringPart {
    Lit(String),
    Interp(Node),
}

/// Collect floating heredoc bodies in document order so each
/// `heredoc_beginning` can claim the next one.
fn collect_heredoc_bodies<'t>(node: TsNode<'t>, pending: &mut VecDeque<TsNode<'t>>) {
    let mut cursor = node.walk();
    let children: Vec<TsNode<'t>> = node.children(&mut cursor).collect();
    for child in children {
        if child.kind() == "heredoc_body" {
            pending.push_back(child);
        }
        collect_heredoc_bodies(child, pending);
    }
}

/// Strip a common margin from literal parts at line starts.
fn dedent_parts(parts: Vec<StringPart>, margin: usize) -> Vec<StringPart> {
    if margin == 0 {
        return parts;
    }
    let mut at_line_start = true;
    parts
        .into_iter()
        .map(|part| match part {
            StringPart::Lit(text) => {
                let mut out = String::new();
                let mut segment = 0;
                while segment < text.len() {
                    let end = text[segment..]
                        .find('\n')
                        .map(|idx| segment + idx + 1)
                        .unwrap_or(text.len());
                    let line = &text[segment..end];
                    if at_line_start {
                        out.push_str(&strip_margin(line, margin));
                    } else {
                        out.push_str(line);
                    }
                    at_line_start = line.ends_with('\n');
                    segment = end;
                }
                StringPart::Lit(out)
            }
            StringPart::Interp(node) => {
                at_line_start = false;
                StringPart::Interp(node)
            }
        })
        .collect()
}
