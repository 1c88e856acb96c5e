// SPDX-License-Identifier: Apache-2.0

//! Literal emission: numbers, strings, symbols, interpolation, regexps,
//! arrays, and hashes.

use super::{op_precedence, unwrap_begin, valid_identifier, Converter, Ctx};
use crate::ast::{Child, Node, NodeType};
use crate::error::Error;

/// Double-quoted JavaScript string literal.
pub(crate) fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            ch if (ch as u32) < 0x20 => quoted.push_str(&format!("\\u{:04x}", ch as u32)),
            ch => quoted.push(ch),
        }
    }
    quoted.push('"');
    quoted
}

/// Template-literal chunk: backticks, `${`, and backslashes need escapes;
/// real newlines become `\n` escapes so the line buffer stays coherent.
fn template_chunk(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '`' => escaped.push_str("\\`"),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '$' if chars.peek() == Some(&'{') => escaped.push_str("\\$"),
            ch => escaped.push(ch),
        }
    }
    escaped
}

pub(crate) fn format_float(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

impl Converter<'_> {
    pub(crate) fn on_literal(&mut self, node: &Node, _ctx: Ctx) -> Result<(), Error> {
        match node.typ() {
            NodeType::Int => {
                let Some(Child::Int(value)) = node.child(0) else {
                    return Err(self.unknown(node));
                };
                self.out.put(&value.to_string());
                Ok(())
            }
            NodeType::Float => {
                let Some(Child::Float(value)) = node.child(0) else {
                    return Err(self.unknown(node));
                };
                self.out.put(&format_float(*value));
                Ok(())
            }
            NodeType::Str => {
                let text = node.str_at(0).unwrap_or_default().to_string();
                self.out.put(&quote(&text));
                Ok(())
            }
            // Symbols are strings on the JavaScript side.
            NodeType::Sym => {
                let name = node.sym_at(0).unwrap_or_default().to_string();
                self.out.put(&quote(&name));
                Ok(())
            }
            NodeType::Dstr | NodeType::Dsym => self.on_dstr(node),
            NodeType::Regexp => self.on_regexp(node),
            NodeType::Array => self.on_array(node),
            NodeType::Hash => self.on_hash(node),
            NodeType::Splat => self.on_splat(node),
            NodeType::Kwsplat => self.on_splat(node),
            NodeType::Nil => {
                self.out.put("null");
                Ok(())
            }
            NodeType::True => {
                self.out.put("true");
                Ok(())
            }
            NodeType::False => {
                self.out.put("false");
                Ok(())
            }
            NodeType::SelfNode => {
                self.out.put("this");
                Ok(())
            }
            _ => Err(self.unknown(node)),
        }
    }

    /// Interpolated string: template literal on ES2015+, `+` concatenation
    /// below.
    pub(crate) fn on_dstr(&mut self, node: &Node) -> Result<(), Error> {
        if self.options.eslevel.es2015() {
            self.out.put("`");
            self.emit_template_parts(node)?;
            self.out.put("`");
            return Ok(());
        }

        // ES5: string concatenation. Lead with a string part so `+` means
        // concatenation from the first operand on.
        let parts: Vec<&Node> = node.children().iter().filter_map(Child::as_node).collect();
        let leads_with_string = parts
            .first()
            .is_some_and(|part| part.typ() == NodeType::Str);
        if !leads_with_string {
            self.out.put("\"\" + ");
        }
        let mut first = true;
        for part in parts {
            if !first {
                self.out.put(" + ");
            }
            first = false;
            match part.typ() {
                NodeType::Str => {
                    let text = part.str_at(0).unwrap_or_default().to_string();
                    self.out.put(&quote(&text));
                }
                _ => {
                    let inner = unwrap_begin(part).clone();
                    self.operand(&inner, op_precedence("+") + 1)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn emit_template_parts(&mut self, node: &Node) -> Result<(), Error> {
        for part in node.children().iter().filter_map(Child::as_node) {
            match part.typ() {
                NodeType::Str => {
                    let text = part.str_at(0).unwrap_or_default().to_string();
                    self.out.put(&template_chunk(&text));
                }
                _ => {
                    self.out.put("${");
                    let inner = unwrap_begin(part).clone();
                    self.parse(&inner, Ctx::Expression)?;
                    self.out.put("}");
                }
            }
        }
        Ok(())
    }

    fn on_regexp(&mut self, node: &Node) -> Result<(), Error> {
        let mut flags = String::new();
        let mut parts: Vec<&Node> = Vec::new();
        for child in node.children().iter().filter_map(Child::as_node) {
            if child.typ() == NodeType::Regopt {
                for flag in child.children() {
                    if let Child::Sym(name) = flag {
                        flags.push_str(name);
                    }
                }
            } else {
                parts.push(child);
            }
        }

        let literal = parts.len() == 1 && parts[0].typ() == NodeType::Str;
        if literal {
            let pattern = parts[0].str_at(0).unwrap_or_default();
            self.out.put(&format!("/{pattern}/{flags}"));
            return Ok(());
        }

        // Interpolated pattern: build through the RegExp constructor.
        let parts: Vec<Node> = parts.into_iter().cloned().collect();
        self.out.put("new RegExp(");
        let dstr = Node::new(
            NodeType::Dstr,
            parts.into_iter().map(Child::Node).collect(),
        );
        self.on_dstr(&dstr)?;
        if !flags.is_empty() {
            self.out.put(", ");
            self.out.put(&quote(&flags));
        }
        self.out.put(")");
        Ok(())
    }

    fn on_array(&mut self, node: &Node) -> Result<(), Error> {
        let has_splat = node
            .children()
            .iter()
            .filter_map(Child::as_node)
            .any(|child| child.typ() == NodeType::Splat);
        if has_splat && !self.options.eslevel.es2015() {
            return self.on_array_concat(node);
        }
        self.out.put("[");
        self.parse_all(node.children(), ", ", Ctx::Expression)?;
        self.out.put("]");
        Ok(())
    }

    /// ES5 splat fallback: `[a].concat(rest, [b])`.
    fn on_array_concat(&mut self, node: &Node) -> Result<(), Error> {
        let mut segments: Vec<(bool, Vec<Node>)> = Vec::new();
        for child in node.children().iter().filter_map(Child::as_node) {
            if child.typ() == NodeType::Splat {
                let inner = child.node_at(0).cloned();
                if let Some(inner) = inner {
                    segments.push((true, vec![inner]));
                }
            } else {
                match segments.last_mut() {
                    Some((false, run)) => run.push(child.clone()),
                    _ => segments.push((false, vec![child.clone()])),
                }
            }
        }

        let mut iter = segments.into_iter();
        let head = iter.next();
        match head {
            Some((false, run)) => {
                self.out.put("[");
                let children: Vec<Child> = run.into_iter().map(Child::Node).collect();
                self.parse_all(&children, ", ", Ctx::Expression)?;
                self.out.put("]");
            }
            Some((true, run)) => {
                self.parse(&run[0], Ctx::Expression)?;
            }
            None => {
                self.out.put("[]");
                return Ok(());
            }
        }
        for (splat, run) in iter {
            self.out.put(".concat(");
            if splat {
                self.parse(&run[0], Ctx::Expression)?;
            } else {
                self.out.put("[");
                let children: Vec<Child> = run.into_iter().map(Child::Node).collect();
                self.parse_all(&children, ", ", Ctx::Expression)?;
                self.out.put("]");
            }
            self.out.put(")");
        }
        Ok(())
    }

    fn on_hash(&mut self, node: &Node) -> Result<(), Error> {
        let has_kwsplat = node
            .children()
            .iter()
            .filter_map(Child::as_node)
            .any(|child| child.typ() == NodeType::Kwsplat);
        if has_kwsplat && !self.options.eslevel.es2018() {
            return self.on_hash_assign(node);
        }

        self.out.put("{");
        let mut first = true;
        for child in node.children().iter().filter_map(Child::as_node) {
            if !first {
                self.out.put(", ");
            }
            first = false;
            match child.typ() {
                NodeType::Pair => self.on_pair(child)?,
                NodeType::Kwsplat => {
                    self.out.put("...");
                    if let Some(inner) = child.node_at(0) {
                        let inner = inner.clone();
                        self.parse(&inner, Ctx::Expression)?;
                    }
                }
                _ => return Err(self.unknown(child)),
            }
        }
        self.out.put("}");
        Ok(())
    }

    /// Pre-ES2018 kwsplat fallback through `Object.assign`.
    fn on_hash_assign(&mut self, node: &Node) -> Result<(), Error> {
        self.out.put("Object.assign({}, ");
        let mut first = true;
        let mut run: Vec<Node> = Vec::new();
        let children: Vec<Node> = node
            .children()
            .iter()
            .filter_map(Child::as_node)
            .cloned()
            .collect();
        for child in children {
            if child.typ() == NodeType::Kwsplat {
                if !run.is_empty() {
                    if !first {
                        self.out.put(", ");
                    }
                    first = false;
                    let pairs = Node::new(
                        NodeType::Hash,
                        std::mem::take(&mut run).into_iter().map(Child::Node).collect(),
                    );
                    self.on_hash(&pairs)?;
                }
                if !first {
                    self.out.put(", ");
                }
                first = false;
                if let Some(inner) = child.node_at(0) {
                    let inner = inner.clone();
                    self.parse(&inner, Ctx::Expression)?;
                }
            } else {
                run.push(child);
            }
        }
        if !run.is_empty() {
            if !first {
                self.out.put(", ");
            }
            let pairs = Node::new(
                NodeType::Hash,
                run.into_iter().map(Child::Node).collect(),
            );
            self.on_hash(&pairs)?;
        }
        self.out.put(")");
        Ok(())
    }

    pub(crate) fn on_pair(&mut self, node: &Node) -> Result<(), Error> {
        let (Some(key), Some(value)) = (node.node_at(0), node.node_at(1)) else {
            return Err(self.unknown(node));
        };
        let key = key.clone();
        let value = value.clone();

        match key.typ() {
            NodeType::Sym => {
                let name = key.sym_at(0).unwrap_or_default().to_string();
                // ES2015 shorthand when the value prints identically.
                if self.options.eslevel.es2015() && prints_as(&value, &name) {
                    self.out.put(&name);
                    return Ok(());
                }
                if valid_identifier(&name) {
                    self.out.put(&name);
                } else {
                    self.out.put(&quote(&name));
                }
            }
            NodeType::Str => {
                let text = key.str_at(0).unwrap_or_default().to_string();
                self.out.put(&quote(&text));
            }
            _ if self.options.eslevel.es2015() => {
                self.out.put("[");
                self.parse(&key, Ctx::Expression)?;
                self.out.put("]");
            }
            _ => return Err(self.unknown(&key)),
        }
        self.out.put(": ");
        self.parse(&value, Ctx::Expression)
    }

    fn on_splat(&mut self, node: &Node) -> Result<(), Error> {
        self.out.put("...");
        if let Some(inner) = node.node_at(0) {
            let inner = inner.clone();
            self.group(&inner)?;
        }
        Ok(())
    }
}

/// Whether a value node prints exactly as `name` (for hash shorthand).
fn prints_as(value: &Node, name: &str) -> bool {
    match value.typ() {
        NodeType::Lvar => value.sym_at(0) == Some(name),
        NodeType::Send | NodeType::Attr => {
            value.children().len() == 2
                && value.child(0).is_some_and(Child::is_nil)
                && value.sym_at(1) == Some(name)
                && !value.is_method()
        }
        _ => false,
    }
}
