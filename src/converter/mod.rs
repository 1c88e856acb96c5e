// SPDX-License-Identifier: Apache-2.0

//! Converter: a handler-dispatched AST walker that emits JavaScript text
//! through the line-buffered serializer.
//!
//! One handler per tag; a scope stack tracks variable declaration state
//! for `let`/`var` hoisting; a state stack tracks the lexical region
//! (outer, class body, method body, block body) to police `break`/`next`/
//! `return`/`yield`; a location cursor threads source positions through to
//! the serializer for the source map.

mod blocks;
mod classes;
mod exceptions;
mod flow;
mod literals;
mod loops;
mod modules;
mod send;
mod variables;

use crate::ast::{Child, Node, NodeType};
use crate::comments::{Comment, CommentMap};
use crate::error::Error;
use crate::namespace::Namespace;
use crate::options::{Comparison, Options};
use crate::serializer::{Mapping, Mark, Origin, Serializer};
use indexmap::IndexMap;
use tracing::debug;

/// Emission context: a statement may carry comments and end in a separator;
/// an expression is embedded in a larger form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ctx {
    Statement,
    Expression,
}

/// Lexical region state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopeState {
    Outer,
    ClassBody,
    MethodBody,
    BlockBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VarState {
    /// Seen as an assignment target in a position where no declaration
    /// could be emitted; needs a declaration at scope top.
    Pending,
    Declared,
}

pub(crate) struct Scope {
    vars: IndexMap<String, VarState>,
    mark: Mark,
    /// `scope` hoists pending vars at exit; `jscope` leaks them outward.
    hoist: bool,
    /// Block scopes see the enclosing function's variables.
    transparent: bool,
    /// Conditional nesting depth within this scope; declarations are only
    /// emitted inline at depth zero.
    conditional: usize,
}

/// Enclosing class context for `super` and class-variable emission.
pub(crate) struct ClassFrame {
    pub(crate) name: String,
    pub(crate) superclass: Option<Node>,
}

pub struct Converter<'a> {
    pub(crate) out: Serializer,
    pub(crate) options: &'a Options,
    pub(crate) namespace: Namespace,
    pub(crate) comments: CommentMap,
    scopes: Vec<Scope>,
    states: Vec<ScopeState>,
    pub(crate) loop_depth: usize,
    pub(crate) classes: Vec<ClassFrame>,
    /// Names of the methods currently being emitted, innermost last; used
    /// by `super` emission.
    pub(crate) method_names: Vec<String>,
    /// Set when the last statement ended in a `//` comment, so the next
    /// separator must be a bare newline.
    line_comment_pending: bool,
}

/// Walk the final AST and produce the JavaScript string plus source map.
pub fn convert_ast(
    ast: &Node,
    options: &Options,
    namespace: Namespace,
    comments: CommentMap,
    vertical: bool,
) -> Result<(String, Vec<Mapping>), Error> {
    let mut out = Serializer::new(options.width);
    if vertical {
        out.enable_vertical_whitespace();
    }
    let mut converter = Converter {
        out,
        options,
        namespace,
        comments,
        scopes: Vec::new(),
        states: vec![ScopeState::Outer],
        loop_depth: 0,
        classes: Vec::new(),
        method_names: Vec::new(),
        line_comment_pending: false,
    };

    let binding: Vec<String> = options.binding.clone();
    converter.with_scope(true, false, &binding, |converter| {
        match ast.typ() {
            NodeType::Begin => converter.statement_list(ast.children()),
            _ => converter.parse_statement(ast),
        }
    })?;

    let orphans: Vec<Comment> = converter.comments.orphans().to_vec();
    for comment in &orphans {
        converter.out.newline();
        converter.emit_comment_text(comment);
    }

    let (output, mappings) = converter.out.serialize();
    debug!(bytes = output.len(), mappings = mappings.len(), "emitted");
    Ok((output, mappings))
}

impl<'a> Converter<'a> {
    // ---- dispatch -------------------------------------------------------

    /// Dispatch to the handler for a node's tag, threading the source
    /// location cursor for the source map.
    pub(crate) fn parse(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        let restore = node.loc().map(|loc| {
            self.out.set_origin(Some(Origin {
                buffer: loc.buffer.clone(),
                offset: loc.range.start,
            }))
        });
        let result = self.emit_node(node, ctx);
        if let Some(previous) = restore {
            self.out.set_origin(previous);
        }
        result
    }

    fn emit_node(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        use NodeType::*;
        match node.typ() {
            Int | Float | Str | Sym | Dstr | Dsym | Regexp | Array | Hash | Kwsplat | Splat
            | Nil | True | False | SelfNode => self.on_literal(node, ctx),
            Irange | Erange => Err(self.unknown(node)),
            Pair => Err(self.unknown(node)),
            Lvar | Ivar | Cvar | Gvar | Const => self.on_variable(node, ctx),
            Lvasgn | Ivasgn | Cvasgn | Gvasgn | Casgn => self.on_assignment(node, ctx),
            Masgn => self.on_masgn(node, ctx),
            OpAsgn | OrAsgn | AndAsgn => self.on_op_asgn(node, ctx),
            Defined => self.on_defined(node, ctx),
            Send | Csend | Attr | AwaitAttr | Call => self.on_send(node, ctx),
            And | Or => self.on_logical(node, ctx),
            Not => self.on_not(node, ctx),
            Block => self.on_block(node, ctx),
            Blockpass => self.on_blockpass(node, ctx),
            Def => self.on_def(node, ctx),
            Defs => self.on_defs(node, ctx),
            Yield => self.on_yield(node, ctx),
            Super | Zsuper => self.on_super(node, ctx),
            Return => self.on_return(node, ctx),
            Autoreturn => self.on_autoreturn(node, ctx),
            Class => self.on_class(node, ctx),
            Module => self.on_module(node, ctx),
            If => self.on_if(node, ctx),
            Case => self.on_case(node, ctx),
            CaseMatch => self.on_case_match(node, ctx),
            While | Until => self.on_while(node, ctx),
            WhilePost | UntilPost => self.on_while_post(node, ctx),
            For => self.on_for(node, ctx),
            Break | Next => self.on_break_next(node, ctx),
            Begin => self.on_begin(node, ctx),
            Kwbegin => self.on_kwbegin(node, ctx),
            Rescue => self.on_rescue(node, ctx),
            Ensure => self.on_ensure(node, ctx),
            Import => self.on_import(node, ctx),
            Export => self.on_export(node, ctx),
            Xstr => self.on_xstr(node, ctx),
            Xnode => self.on_xnode(node, ctx),
            _ => Err(self.unknown(node)),
        }
    }

    // ---- statements -----------------------------------------------------

    /// True for nodes that emit nothing at statement level, so separators
    /// around them are suppressed.
    pub(crate) fn elided(child: &Child) -> bool {
        match child {
            Child::Nil => true,
            Child::Node(node) => match node.typ() {
                NodeType::Begin | NodeType::Kwbegin => {
                    node.children().iter().all(Self::elided)
                }
                _ => false,
            },
            _ => true,
        }
    }

    /// Emit a statement sequence separated by the serializer's statement
    /// separator (`; ` inline, `;\n` vertical).
    pub(crate) fn statement_list(&mut self, items: &[Child]) -> Result<(), Error> {
        let sep = self.out.sep();
        let mut first = true;
        for item in items {
            if Self::elided(item) {
                continue;
            }
            let Child::Node(node) = item else { continue };
            if !first {
                if self.line_comment_pending {
                    self.out.newline();
                } else {
                    self.out.put(&sep);
                }
            }
            first = false;
            self.line_comment_pending = false;
            self.parse_statement(node)?;
        }
        Ok(())
    }

    /// Emit a single statement, with its attached comments.
    pub(crate) fn parse_statement(&mut self, node: &Node) -> Result<(), Error> {
        let leading: Vec<Comment> = self.comments.leading(node.id()).to_vec();
        for comment in &leading {
            self.emit_comment_text(comment);
            self.out.newline();
        }
        self.parse(node, Ctx::Statement)?;
        let trailing: Vec<Comment> = self.comments.trailing(node.id()).to_vec();
        for comment in &trailing {
            self.out.put(" ");
            self.emit_comment_text(comment);
            if !comment.is_block() {
                self.line_comment_pending = true;
            }
        }
        Ok(())
    }

    /// Render one comment: `#` comments as `//`, block comments as
    /// `/* ... */` with embedded terminators defused.
    pub(crate) fn emit_comment_text(&mut self, comment: &Comment) {
        if comment.is_block() {
            let inner = comment
                .text
                .trim_start_matches("=begin")
                .trim_end_matches("=end")
                .replace("*/", "*\\/");
            self.out.put("/*");
            self.out.put(&inner);
            self.out.put("*/");
        } else {
            for (index, line) in comment.text.lines().enumerate() {
                if index > 0 {
                    self.out.newline();
                }
                let rendered = line.strip_prefix('#').map(|rest| format!("//{rest}"));
                match rendered {
                    Some(text) => self.out.put(&text),
                    None => self.out.put(line),
                }
            }
        }
    }

    // ---- expressions ----------------------------------------------------

    /// Emit a sequence of expressions with a join string, suppressing the
    /// join around elided items.
    pub(crate) fn parse_all(&mut self, items: &[Child], join: &str, ctx: Ctx) -> Result<(), Error> {
        let mut first = true;
        for item in items {
            if Self::elided(item) {
                continue;
            }
            let Child::Node(node) = item else { continue };
            if !first {
                self.out.put(join);
            }
            first = false;
            self.parse(node, ctx)?;
        }
        Ok(())
    }

    /// Parenthesize an expression unless it is already its own delimited
    /// form.
    pub(crate) fn group(&mut self, node: &Node) -> Result<(), Error> {
        if self.is_delimited(node) {
            self.parse(node, Ctx::Expression)
        } else {
            self.out.put("(");
            self.parse(node, Ctx::Expression)?;
            self.out.put(")");
            Ok(())
        }
    }

    fn is_delimited(&self, node: &Node) -> bool {
        match node.typ() {
            NodeType::Str | NodeType::Sym | NodeType::Array | NodeType::Hash | NodeType::Lvar
            | NodeType::Ivar | NodeType::Const | NodeType::Regexp | NodeType::Nil
            | NodeType::True | NodeType::False | NodeType::SelfNode => true,
            NodeType::Dstr => self.options.eslevel.es2015(),
            NodeType::Int => !matches!(node.child(0), Some(Child::Int(value)) if *value < 0),
            NodeType::Float => {
                !matches!(node.child(0), Some(Child::Float(value)) if *value < 0.0)
            }
            // Property and call chains are postfix forms, atomic on the
            // left of any operator.
            NodeType::Send | NodeType::Csend | NodeType::Attr | NodeType::Call => {
                self.precedence_of(node).is_none()
            }
            _ => false,
        }
    }

    /// Emit an operand of a binary/unary form, parenthesizing when the
    /// operand's operator binds more loosely than `min` requires.
    pub(crate) fn operand(&mut self, node: &Node, min: u8) -> Result<(), Error> {
        match self.precedence_of(node) {
            Some(prec) if prec < min => {
                self.out.put("(");
                self.parse(node, Ctx::Expression)?;
                self.out.put(")");
                Ok(())
            }
            _ => self.parse(node, Ctx::Expression),
        }
    }

    /// The precedence of the operator a node emits at its top level, if it
    /// emits an operator form at all.
    pub(crate) fn precedence_of(&self, node: &Node) -> Option<u8> {
        match node.typ() {
            NodeType::And => Some(op_precedence("&&")),
            NodeType::Or => {
                let operands_boolean = node
                    .children()
                    .iter()
                    .filter_map(Child::as_node)
                    .any(|child| self.boolean_ish(child));
                let nullish = self.options.or == crate::options::OrMode::Nullish
                    && !operands_boolean;
                Some(op_precedence(if nullish { "??" } else { "||" }))
            }
            NodeType::Not => Some(op_precedence("!")),
            NodeType::If => Some(op_precedence("?:")),
            // `defined?` emits a `typeof ... !== "undefined"` comparison.
            NodeType::Defined => Some(op_precedence("==")),
            NodeType::Lvasgn | NodeType::Ivasgn | NodeType::Cvasgn | NodeType::Gvasgn
            | NodeType::Casgn | NodeType::OpAsgn | NodeType::OrAsgn | NodeType::AndAsgn
            | NodeType::Masgn => Some(op_precedence("=")),
            NodeType::Send | NodeType::Csend => {
                let selector = node.sym_at(1)?;
                if node.children().len() == 3 && is_operator(selector) {
                    Some(op_precedence(self.mapped_operator(selector).as_str()))
                } else if selector == "-@" || selector == "+@" || selector == "~" {
                    Some(op_precedence("!"))
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Apply the `comparison` option to an operator.
    pub(crate) fn mapped_operator(&self, op: &str) -> String {
        match (op, self.options.comparison) {
            ("==", Comparison::Identity) => "===".to_string(),
            ("!=", Comparison::Identity) => "!==".to_string(),
            _ => op.to_string(),
        }
    }

    // ---- conditions -----------------------------------------------------

    /// True when a node already produces a boolean under JavaScript rules,
    /// so `truthy=ruby` need not wrap it.
    pub(crate) fn boolean_ish(&self, node: &Node) -> bool {
        match node.typ() {
            NodeType::True | NodeType::False | NodeType::Not | NodeType::Defined => true,
            NodeType::And | NodeType::Or => node
                .children()
                .iter()
                .filter_map(Child::as_node)
                .all(|child| self.boolean_ish(child)),
            NodeType::Send | NodeType::Csend => match node.sym_at(1) {
                Some(op) if matches!(
                    op,
                    "==" | "!=" | "===" | "!==" | "<" | "<=" | ">" | ">=" | "instanceof"
                ) => true,
                Some(name) => name.ends_with('?'),
                None => false,
            },
            NodeType::Begin if node.children().len() == 1 => node
                .node_at(0)
                .is_some_and(|inner| self.boolean_ish(inner)),
            _ => false,
        }
    }

    /// Emit a condition, honoring the `truthy` option: under `ruby`, values
    /// that JavaScript would treat as falsy (`0`, `""`) test as present via
    /// an explicit `!= null` form.
    pub(crate) fn condition(&mut self, node: &Node) -> Result<(), Error> {
        let node = unwrap_begin(node);
        if self.options.truthy == crate::options::Truthy::Ruby && !self.boolean_ish(node) {
            self.operand(node, op_precedence("==") + 1)?;
            self.out.put(" != null");
            Ok(())
        } else {
            self.parse(node, Ctx::Expression)
        }
    }

    /// Emit the negation of a condition, collapsing `!(a < b)` to
    /// `a >= b` via the inverted-comparison pair table.
    pub(crate) fn negated_condition(&mut self, node: &Node) -> Result<(), Error> {
        let node = unwrap_begin(node);
        if let NodeType::Send = node.typ() {
            if node.children().len() == 3 {
                if let Some(inverse) = node.sym_at(1).and_then(invert_operator) {
                    let inverse = self.mapped_operator(inverse);
                    let prec = op_precedence(&inverse);
                    let (Some(left), Some(right)) = (node.node_at(0), node.node_at(2).cloned())
                    else {
                        return Err(self.unknown(node));
                    };
                    let left = left.clone();
                    self.operand(&left, prec)?;
                    self.out.put(&format!(" {inverse} "));
                    return self.operand(&right, prec + 1);
                }
            }
        }
        self.out.put("!");
        self.operand(node, op_precedence("!"))
    }

    // ---- scopes ---------------------------------------------------------

    /// Enter a hoisting lexical scope: variables still pending at exit get
    /// one declaration inserted at the scope's top.
    pub(crate) fn with_scope<F>(
        &mut self,
        hoist: bool,
        transparent: bool,
        args: &[String],
        body: F,
    ) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        let mark = self.out.mark();
        let mut vars = IndexMap::new();
        for arg in args {
            vars.insert(arg.clone(), VarState::Declared);
        }
        self.scopes.push(Scope {
            vars,
            mark,
            hoist,
            transparent,
            conditional: 0,
        });
        let result = body(self);
        let scope = self.scopes.pop().expect("scope pushed above");
        if result.is_err() {
            return result;
        }

        let pending: Vec<String> = scope
            .vars
            .iter()
            .filter(|(_, state)| **state == VarState::Pending)
            .map(|(name, _)| name.clone())
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        if scope.hoist {
            let keyword = if self.options.eslevel.es2015() {
                "let"
            } else {
                "var"
            };
            let declaration = format!("{keyword} {}", pending.join(", "));
            if self.out.is_vertical() {
                self.out.insert_line(scope.mark, &format!("{declaration};"));
            } else {
                self.out.insert_token(scope.mark, &format!("{declaration}; "));
            }
        } else if let Some(parent) = self.scopes.last_mut() {
            for name in pending {
                parent.vars.entry(name).or_insert(VarState::Pending);
            }
        }
        Ok(())
    }

    /// Like `with_scope` but without hoisting: pending variables leak to
    /// the parent scope.
    pub(crate) fn with_jscope<F>(&mut self, args: &[String], body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        self.with_scope(false, true, args, body)
    }

    /// Run a body in conditional position: first assignments inside cannot
    /// emit declarations and go pending instead.
    pub(crate) fn conditionally<F>(&mut self, body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        if let Some(scope) = self.scopes.last_mut() {
            scope.conditional += 1;
        }
        let result = body(self);
        if let Some(scope) = self.scopes.last_mut() {
            scope.conditional -= 1;
        }
        result
    }

    /// Whether a variable is visible from the current scope.
    pub(crate) fn var_known(&self, name: &str) -> bool {
        for scope in self.scopes.iter().rev() {
            if scope.vars.contains_key(name) {
                return true;
            }
            if !scope.transparent {
                break;
            }
        }
        false
    }

    /// Whether a declaration may be emitted inline here: statement context
    /// at the scope's own (unconditional) level.
    pub(crate) fn may_declare_inline(&self, ctx: Ctx) -> bool {
        ctx == Ctx::Statement
            && self
                .scopes
                .last()
                .map(|scope| scope.conditional == 0)
                .unwrap_or(false)
    }

    pub(crate) fn record_var(&mut self, name: &str, state: VarState) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.vars.insert(name.to_string(), state);
        }
    }

    // ---- state machine --------------------------------------------------

    pub(crate) fn state(&self) -> ScopeState {
        *self.states.last().expect("state stack is never empty")
    }

    pub(crate) fn with_state<F>(&mut self, state: ScopeState, body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Self) -> Result<(), Error>,
    {
        self.states.push(state);
        let result = body(self);
        self.states.pop();
        result
    }

    /// Whether we are anywhere inside a method (possibly via blocks).
    pub(crate) fn in_method(&self) -> bool {
        self.states
            .iter()
            .rev()
            .copied()
            .find(|state| *state != ScopeState::BlockBody)
            == Some(ScopeState::MethodBody)
    }

    // ---- errors ---------------------------------------------------------

    pub(crate) fn unknown(&self, node: &Node) -> Error {
        Error::UnknownNode {
            tag: node.typ().to_string(),
            location: node.location(),
        }
    }

    pub(crate) fn illegal(&self, node: &Node, what: &str) -> Error {
        Error::IllegalControl {
            what: what.to_string(),
            location: node.location(),
        }
    }
}

/// Unwrap a single-statement `begin` for positions that add their own
/// delimiters (conditions, receivers).
pub(crate) fn unwrap_begin(node: &Node) -> &Node {
    if node.typ() == NodeType::Begin && node.children().len() == 1 {
        if let Some(inner) = node.node_at(0) {
            return unwrap_begin(inner);
        }
    }
    node
}

/// JavaScript operator precedence, consulted for parenthesization.
pub(crate) fn op_precedence(op: &str) -> u8 {
    match op {
        "," => 1,
        "=" => 3,
        "?:" => 4,
        "??" => 5,
        "||" => 6,
        "&&" => 7,
        "|" => 8,
        "^" => 9,
        "&" => 10,
        "==" | "!=" | "===" | "!==" => 11,
        "<" | "<=" | ">" | ">=" | "instanceof" | "in" => 12,
        "<<" | ">>" | ">>>" => 13,
        "+" | "-" => 14,
        "*" | "/" | "%" => 15,
        "**" => 16,
        "!" | "~" | "typeof" | "void" | "await" => 17,
        _ => 20,
    }
}

/// Binary operators emitted as JavaScript operators rather than method
/// calls.
pub(crate) fn is_operator(op: &str) -> bool {
    matches!(
        op,
        "+" | "-"
            | "*"
            | "/"
            | "%"
            | "**"
            | "<<"
            | ">>"
            | "&"
            | "|"
            | "^"
            | "<"
            | "<="
            | ">"
            | ">="
            | "=="
            | "!="
            | "==="
            | "!=="
            | "??"
            | "instanceof"
    )
}

/// Fixed pair table for inverted comparisons.
pub(crate) fn invert_operator(op: &str) -> Option<&'static str> {
    match op {
        "<" => Some(">="),
        ">" => Some("<="),
        "<=" => Some(">"),
        ">=" => Some("<"),
        "==" => Some("!="),
        "!=" => Some("=="),
        "===" => Some("!=="),
        "!==" => Some("==="),
        _ => None,
    }
}

/// Whether a name prints as a bare JavaScript identifier.
pub(crate) fn valid_identifier(name: &str) -> bool {
    use regex::Regex;
    use std::sync::OnceLock;
    static IDENTIFIER: OnceLock<Regex> = OnceLock::new();
    let identifier = IDENTIFIER
        .get_or_init(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("static pattern"));
    identifier.is_match(name)
}
