// SPDX-License-Identifier: Apache-2.0

//! Conditionals: `if`/`elsif`/`else`, ternaries, `case`/`when` as `switch`
//! or comparison chains, and `case`/`in` pattern matching.

use super::{op_precedence, unwrap_begin, Converter, Ctx, ScopeState, VarState};
use crate::ast::{Child, Node, NodeType};
use crate::error::Error;

/// Nodes that can stand as a single expression in a ternary arm.
fn is_expression(node: &Node) -> bool {
    !matches!(
        node.typ(),
        NodeType::Def
            | NodeType::Defs
            | NodeType::Class
            | NodeType::Module
            | NodeType::While
            | NodeType::Until
            | NodeType::WhilePost
            | NodeType::UntilPost
            | NodeType::For
            | NodeType::Return
            | NodeType::Break
            | NodeType::Next
            | NodeType::Rescue
            | NodeType::Ensure
            | NodeType::Kwbegin
            | NodeType::Case
            | NodeType::CaseMatch
            | NodeType::Import
            | NodeType::Export
    ) && !(node.typ() == NodeType::Begin && node.children().len() != 1)
}

/// Switch-compatible `when` pattern: a literal compared by value.
fn switch_literal(node: &Node) -> bool {
    matches!(
        node.typ(),
        NodeType::Int | NodeType::Str | NodeType::Sym | NodeType::True | NodeType::False
            | NodeType::Nil | NodeType::Float
    )
}

impl Converter<'_> {
    pub(crate) fn on_if(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        let Some(cond) = node.node_at(0) else {
            return Err(self.unknown(node));
        };
        let cond = cond.clone();
        let then_branch = node.child(1).cloned().unwrap_or(Child::Nil);
        let else_branch = node.child(2).cloned().unwrap_or(Child::Nil);

        if ctx == Ctx::Expression {
            return self.if_expression(&cond, &then_branch, &else_branch);
        }

        // `unless`-shaped: no then branch.
        if Self::elided(&then_branch) && !Self::elided(&else_branch) {
            self.out.put("if (");
            self.negated_condition(&cond)?;
            self.out.put(") ");
            return self.branch(&else_branch);
        }

        self.out.put("if (");
        self.condition(&cond)?;
        self.out.put(") ");
        self.branch(&then_branch)?;

        if !Self::elided(&else_branch) {
            self.out.put(" else ");
            if let Child::Node(else_node) = &else_branch {
                if else_node.typ() == NodeType::If {
                    let else_node = else_node.clone();
                    return self.parse(&else_node, Ctx::Statement);
                }
            }
            self.branch(&else_branch)?;
        }
        Ok(())
    }

    /// A braced conditional branch, emitted in conditional position so
    /// first assignments inside hoist rather than declare.
    fn branch(&mut self, body: &Child) -> Result<(), Error> {
        let wrap = self.out.wrap_open();
        self.conditionally(|converter| converter.branch_statements(body))?;
        self.out.wrap_close(wrap, false);
        Ok(())
    }

    pub(super) fn branch_statements(&mut self, body: &Child) -> Result<(), Error> {
        match body {
            Child::Nil => Ok(()),
            Child::Node(node) if node.typ() == NodeType::Begin => {
                self.statement_list(node.children())
            }
            Child::Node(node) => self.statement_list(&[Child::Node(node.clone())]),
            _ => Ok(()),
        }
    }

    fn if_expression(
        &mut self,
        cond: &Node,
        then_branch: &Child,
        else_branch: &Child,
    ) -> Result<(), Error> {
        let ternary_safe = |branch: &Child| match branch {
            Child::Nil => true,
            Child::Node(node) => is_expression(unwrap_begin(node)),
            _ => false,
        };
        if !(ternary_safe(then_branch) && ternary_safe(else_branch)) {
            let rebuilt = Node::new(
                NodeType::If,
                vec![
                    Child::Node(cond.clone()),
                    then_branch.clone(),
                    else_branch.clone(),
                ],
            );
            return self.statement_as_iife(&rebuilt);
        }

        let prec = op_precedence("?:");
        self.operand(cond, prec + 1)?;
        self.out.put(" ? ");
        match then_branch {
            Child::Node(branch) => {
                let branch = unwrap_begin(branch).clone();
                self.operand(&branch, prec)?;
            }
            _ => self.out.put("null"),
        }
        self.out.put(" : ");
        match else_branch {
            Child::Node(branch) => {
                let branch = unwrap_begin(branch).clone();
                self.operand(&branch, prec)?;
            }
            _ => self.out.put("null"),
        }
        Ok(())
    }

    /// Emit a statement-shaped node in expression position via an
    /// immediately invoked function.
    pub(crate) fn statement_as_iife(&mut self, node: &Node) -> Result<(), Error> {
        let autoreturned = Node::new(
            NodeType::Autoreturn,
            vec![Child::Node(node.clone())],
        );
        if self.options.eslevel.es2015() {
            self.out.put("(() => ");
        } else {
            self.out.put("(function () ");
        }
        let wrap = self.out.wrap_open();
        self.with_state(ScopeState::BlockBody, |converter| {
            converter.with_scope(true, true, &[], |converter| {
                converter.parse_statement(&autoreturned)
            })
        })?;
        self.out.wrap_close(wrap, false);
        self.out.put(")()");
        Ok(())
    }

    // ---- case/when -------------------------------------------------------

    pub(crate) fn on_case(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if ctx == Ctx::Expression {
            return self.statement_as_iife(node);
        }
        let subject = node.node_at(0).cloned();
        let clauses: Vec<Node> = node.children()[1..]
            .iter()
            .filter_map(Child::as_node)
            .cloned()
            .collect();
        let (whens, else_body): (Vec<Node>, Option<Node>) = {
            let mut whens = Vec::new();
            let mut else_body = None;
            for clause in clauses {
                if clause.typ() == NodeType::When {
                    whens.push(clause);
                } else {
                    else_body = Some(clause);
                }
            }
            (whens, else_body)
        };

        let switchable = subject.is_some()
            && whens.iter().all(|when| {
                when.children()[..when.children().len().saturating_sub(1)]
                    .iter()
                    .filter_map(Child::as_node)
                    .all(switch_literal)
            });
        if switchable {
            return self.case_switch(&subject.expect("checked above"), &whens, else_body);
        }
        self.case_chain(subject.as_ref(), &whens, else_body)
    }

    fn case_switch(
        &mut self,
        subject: &Node,
        whens: &[Node],
        else_body: Option<Node>,
    ) -> Result<(), Error> {
        self.out.put("switch (");
        self.parse(subject, Ctx::Expression)?;
        self.out.put(") ");
        let wrap = self.out.wrap_open();
        let sep = self.out.sep();
        for when in whens {
            let patterns = &when.children()[..when.children().len() - 1];
            for pattern in patterns.iter().filter_map(Child::as_node) {
                self.out.put("case ");
                self.parse(pattern, Ctx::Expression)?;
                self.out.puts(":");
            }
            let body = when.children().last().cloned().unwrap_or(Child::Nil);
            let transfers = ends_in_transfer(&body);
            self.conditionally(|converter| converter.branch_statements(&body))?;
            if !transfers {
                if !Self::elided(&body) {
                    self.out.put(&sep);
                }
                self.out.put("break");
            }
            self.out.newline();
        }
        if let Some(else_body) = else_body {
            self.out.puts("default:");
            self.conditionally(|converter|

                converter.branch_statements(&Child::Node(else_body.clone())))?;
            self.out.newline();
        }
        self.out.wrap_close(wrap, false);
        Ok(())
    }

    fn case_chain(
        &mut self,
        subject: Option<&Node>,
        whens: &[Node],
        else_body: Option<Node>,
    ) -> Result<(), Error> {
        // Simple subjects re-emit at each comparison; anything else binds
        // to a temporary once.
        let simple = subject.is_some_and(|node| {
            matches!(node.typ(), NodeType::Lvar | NodeType::Ivar | NodeType::Const)
        });
        let sep = self.out.sep();
        let mut bound: Option<String> = None;
        if let Some(node) = subject {
            if !simple {
                let keyword = if self.options.eslevel.es2015() {
                    "let"
                } else {
                    "var"
                };
                self.out.put(&format!("{keyword} $case = "));
                self.parse(node, Ctx::Expression)?;
                self.out.put(&sep);
                bound = Some("$case".to_string());
            }
        }

        let mut first = true;
        for when in whens {
            if !first {
                self.out.put(" else ");
            }
            first = false;
            self.out.put("if (");
            let patterns = &when.children()[..when.children().len() - 1];
            let mut first_pattern = true;
            for pattern in patterns.iter().filter_map(Child::as_node) {
                if !first_pattern {
                    self.out.put(" || ");
                }
                first_pattern = false;
                self.when_test(subject, bound.as_deref(), pattern)?;
            }
            self.out.put(") ");
            let body = when.children().last().cloned().unwrap_or(Child::Nil);
            self.branch(&body)?;
        }
        if let Some(else_body) = else_body {
            if first {
                // Only an else: emit its statements directly.
                return self.branch_statements(&Child::Node(else_body));
            }
            self.out.put(" else ");
            self.branch(&Child::Node(else_body))?;
        }
        Ok(())
    }

    /// One `when` pattern test against the subject.
    fn when_test(
        &mut self,
        subject: Option<&Node>,
        bound: Option<&str>,
        pattern: &Node,
    ) -> Result<(), Error> {
        let emit_subject = |converter: &mut Self| -> Result<(), Error> {
            match (bound, subject) {
                (Some(name), _) => {
                    converter.out.put(name);
                    Ok(())
                }
                (None, Some(node)) => {
                    let node = node.clone();
                    converter.parse(&node, Ctx::Expression)
                }
                (None, None) => Ok(()),
            }
        };

        // Without a subject, the pattern itself is the condition.
        if subject.is_none() {
            return self.condition(pattern);
        }

        match pattern.typ() {
            NodeType::Irange | NodeType::Erange => {
                let begin = pattern.node_at(0).cloned();
                let end = pattern.node_at(1).cloned();
                if let Some(begin) = begin {
                    emit_subject(self)?;
                    self.out.put(" >= ");
                    self.operand(&begin, op_precedence(">=") + 1)?;
                }
                if let Some(end) = end {
                    if pattern.node_at(0).is_some() {
                        self.out.put(" && ");
                    }
                    emit_subject(self)?;
                    self.out
                        .put(if pattern.typ() == NodeType::Irange { " <= " } else { " < " });
                    self.operand(&end, op_precedence("<=") + 1)?;
                }
                Ok(())
            }
            _ => {
                let eq = self.mapped_operator("==");
                emit_subject(self)?;
                self.out.put(&format!(" {eq} "));
                self.operand(pattern, op_precedence(&eq) + 1)
            }
        }
    }

    // ---- case/in ---------------------------------------------------------

    pub(crate) fn on_case_match(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if ctx == Ctx::Expression {
            return self.statement_as_iife(node);
        }
        let Some(subject) = node.node_at(0) else {
            return Err(self.unknown(node));
        };
        let subject = subject.clone();
        let clauses: Vec<Node> = node.children()[1..]
            .iter()
            .filter_map(Child::as_node)
            .cloned()
            .collect();

        let sep = self.out.sep();
        let keyword = if self.options.eslevel.es2015() {
            "let"
        } else {
            "var"
        };
        let simple = matches!(subject.typ(), NodeType::Lvar);
        let target = if simple {
            subject.sym_at(0).unwrap_or_default().to_string()
        } else {
            self.out.put(&format!("{keyword} $case = "));
            self.parse(&subject, Ctx::Expression)?;
            self.out.put(&sep);
            "$case".to_string()
        };

        let mut first = true;
        for clause in clauses {
            match clause.typ() {
                NodeType::InPattern => {
                    let Some(pattern) = clause.node_at(0) else {
                        return Err(self.unknown(&clause));
                    };
                    let pattern = pattern.clone();
                    let guard = clause.node_at(1).cloned();
                    let body = clause.child(2).cloned().unwrap_or(Child::Nil);

                    let mut tests: Vec<String> = Vec::new();
                    let mut bindings: Vec<(String, String)> = Vec::new();
                    self.pattern_tests(&pattern, &target, &mut tests, &mut bindings)?;

                    let unconditional = tests.is_empty() && guard.is_none();
                    if unconditional && first {
                        for (name, expr) in &bindings {
                            self.declare_binding(name, expr)?;
                            self.out.put(&sep);
                        }
                        return self.branch_statements(&body);
                    }

                    if !first {
                        self.out.put(" else ");
                    }
                    first = false;
                    if unconditional {
                        // Catch-all arm.
                        let wrap = self.out.wrap_open();
                        self.conditionally(|converter| {
                            for (name, expr) in &bindings {
                                converter.declare_binding_pending(name, expr);
                                converter.out.put(&sep);
                            }
                            converter.branch_statements(&body)
                        })?;
                        self.out.wrap_close(wrap, false);
                        continue;
                    }

                    self.out.put("if (");
                    let mut first_test = true;
                    for test in &tests {
                        if !first_test {
                            self.out.put(" && ");
                        }
                        first_test = false;
                        self.out.put(test);
                    }
                    // Bindings ride along in the condition so guards and
                    // bodies see them; the declarations hoist.
                    for (name, expr) in &bindings {
                        if !first_test {
                            self.out.put(" && ");
                        }
                        first_test = false;
                        self.record_var(name, VarState::Pending);
                        self.out.put(&format!("(({name} = {expr}), true)"));
                    }
                    if let Some(guard) = guard {
                        if !first_test {
                            self.out.put(" && ");
                        }
                        self.operand(&guard, op_precedence("&&"))?;
                    }
                    self.out.put(") ");
                    self.branch(&body)?;
                }
                // Trailing else body.
                _ => {
                    self.out.put(" else ");
                    self.branch(&Child::Node(clause))?;
                }
            }
        }
        Ok(())
    }

    fn declare_binding(&mut self, name: &str, expr: &str) -> Result<(), Error> {
        if self.var_known(name) {
            self.out.put(&format!("{name} = {expr}"));
        } else if self.may_declare_inline(Ctx::Statement) {
            let keyword = if self.options.eslevel.es2015() {
                "let"
            } else {
                "var"
            };
            self.record_var(name, VarState::Declared);
            self.out.put(&format!("{keyword} {name} = {expr}"));
        } else {
            self.declare_binding_pending(name, expr);
        }
        Ok(())
    }

    fn declare_binding_pending(&mut self, name: &str, expr: &str) {
        if !self.var_known(name) {
            self.record_var(name, VarState::Pending);
        }
        self.out.put(&format!("{name} = {expr}"));
    }

    /// Decompose a pattern into comparison tests and variable bindings
    /// against a subject expression.
    fn pattern_tests(
        &mut self,
        pattern: &Node,
        target: &str,
        tests: &mut Vec<String>,
        bindings: &mut Vec<(String, String)>,
    ) -> Result<(), Error> {
        let eq = self.mapped_operator("==");
        match pattern.typ() {
            NodeType::MatchVar => {
                let name = pattern.sym_at(0).unwrap_or_default().to_string();
                bindings.push((name, target.to_string()));
                Ok(())
            }
            NodeType::ArrayPattern => {
                let items: Vec<Node> = pattern
                    .children()
                    .iter()
                    .filter_map(Child::as_node)
                    .cloned()
                    .collect();
                tests.push(format!("Array.isArray({target})"));
                tests.push(format!("{target}.length {eq} {}", items.len()));
                for (index, item) in items.iter().enumerate() {
                    self.pattern_tests(item, &format!("{target}[{index}]"), tests, bindings)?;
                }
                Ok(())
            }
            NodeType::HashPattern => {
                tests.push(format!("{target} != null"));
                for pair in pattern.children().iter().filter_map(Child::as_node) {
                    let (Some(key), Some(value)) = (pair.node_at(0), pair.node_at(1)) else {
                        return Err(self.unknown(pair));
                    };
                    let key = key.sym_at(0).unwrap_or_default().to_string();
                    let value = value.clone();
                    tests.push(format!("\"{key}\" in {target}"));
                    self.pattern_tests(&value, &format!("{target}.{key}"), tests, bindings)?;
                }
                Ok(())
            }
            // Constants test by instanceof; literals by equality.
            NodeType::Const => {
                let mut name = String::new();
                let mut cursor = Some(pattern.clone());
                let mut parts = Vec::new();
                while let Some(node) = cursor {
                    if node.typ() != NodeType::Const {
                        break;
                    }
                    parts.push(node.sym_at(1).unwrap_or_default().to_string());
                    cursor = node.node_at(0).cloned();
                }
                parts.reverse();
                name.push_str(&parts.join("."));
                tests.push(format!("{target} instanceof {name}"));
                Ok(())
            }
            NodeType::Int | NodeType::Float | NodeType::Str | NodeType::Sym | NodeType::True
            | NodeType::False | NodeType::Nil => {
                let literal = self.capture_expression(pattern)?;
                tests.push(format!("{target} {eq} {literal}"));
                Ok(())
            }
            _ => Err(self.unknown(pattern)),
        }
    }

    /// Render an expression to a string through the serializer's capture.
    pub(crate) fn capture_expression(&mut self, node: &Node) -> Result<String, Error> {
        let mark = self.out.mark();
        self.parse(node, Ctx::Expression)?;
        Ok(self.out.capture_end(mark))
    }
}

/// Whether a body's last statement already transfers control.
fn ends_in_transfer(body: &Child) -> bool {
    match body {
        Child::Node(node) => match node.typ() {
            NodeType::Return | NodeType::Break | NodeType::Next | NodeType::Autoreturn => true,
            NodeType::Begin => node
                .children()
                .last()
                .map(ends_in_transfer)
                .unwrap_or(false),
            _ => false,
        },
        _ => false,
    }
}
