// SPDX-License-Identifier: Apache-2.0

//! Method-form rewrites: map selected Ruby methods onto their JavaScript
//! counterparts, and parenthesize bare zero-arg calls whose JavaScript
//! namesakes are methods.
//!
//! Rewrites are gated per Ruby method name by the `include`, `exclude`, and
//! `include_only` options; a couple of hazardous names stay off unless
//! opted in.

use super::{Chain, Filter, FilterContext};
use crate::ast::{sym, Child, Node, NodeType};
use crate::error::Error;
use crate::s;

pub struct Functions;

/// Methods not rewritten unless explicitly included.
const DEFAULT_EXCLUDED: &[&str] = &["call", "class"];

/// Zero-arg methods whose JavaScript namesakes exist and need parentheses.
const VANILLA_METHODS: &[&str] = &["pop", "shift", "sort", "reverse", "trim"];

fn included(name: &str, ctx: &FilterContext) -> bool {
    let contains = |list: &[String]| list.iter().any(|entry| entry == name);
    if let Some(only) = &ctx.options.include_only {
        return only.iter().any(|entry| entry == name);
    }
    if contains(&ctx.options.exclude) {
        return false;
    }
    if DEFAULT_EXCLUDED.contains(&name) && !contains(&ctx.options.include) {
        return false;
    }
    true
}

fn attr(receiver: Child, name: &str) -> Node {
    Node::new(NodeType::Attr, vec![receiver, sym(name)])
}

fn call(receiver: Child, name: &str, args: Vec<Child>) -> Node {
    let mut children = vec![receiver, sym(name)];
    children.extend(args);
    Node::new(NodeType::Call, children)
}

fn console_log(args: Vec<Child>) -> Node {
    call(Child::Node(attr(Child::Nil, "console")), "log", args)
}

fn math(name: &str, args: Vec<Child>) -> Node {
    call(Child::Node(attr(Child::Nil, "Math")), name, args)
}

fn retag(node: &Node, selector: &str) -> Node {
    let mut children = node.children().to_vec();
    children[1] = sym(selector);
    node.updated(None, Some(children))
}

/// Negate the final expression of a block body, pushing through `begin`.
fn negate_last(body: &Child) -> Child {
    match body {
        Child::Node(node) if node.typ() == NodeType::Begin => {
            let mut children = node.children().to_vec();
            if let Some(last) = children.pop() {
                children.push(negate_last(&last));
            }
            Child::Node(node.updated(None, Some(children)))
        }
        Child::Node(node) => Child::Node(Node::new(
            NodeType::Not,
            vec![Child::Node(node.clone())],
        )),
        other => other.clone(),
    }
}

impl Functions {
    fn rewrite_send(&self, node: &Node, ctx: &mut FilterContext) -> Option<Node> {
        let receiver = node.child(0)?.clone();
        let selector = node.sym_at(1)?.to_string();
        if !included(&selector, ctx) {
            return None;
        }
        let args: Vec<Child> = node.children()[2..].to_vec();
        let es = ctx.options.eslevel;

        let rewritten = match (selector.as_str(), args.len()) {
            ("puts", _) if receiver.is_nil() => console_log(args),
            ("first", 0) => s!(Send, receiver, sym("[]"), 0i64),
            ("first", 1) => call(receiver, "slice", vec![Child::Int(0), args[0].clone()]),
            ("last", 0) => {
                if es.es2022() {
                    call(receiver, "at", vec![Child::Int(-1)])
                } else {
                    let length = attr(receiver.clone(), "length");
                    let index = s!(Send, length, sym("-"), 1i64);
                    s!(Send, receiver, sym("[]"), index)
                }
            }
            ("size" | "length" | "count", 0) => attr(receiver, "length"),
            ("empty?", 0) => {
                let length = attr(receiver, "length");
                s!(Send, length, sym("=="), 0i64)
            }
            ("include?", 1) => {
                if es.es2016() {
                    call(receiver, "includes", args)
                } else {
                    let index_of = call(receiver, "indexOf", args);
                    s!(Send, index_of, sym("!="), -1i64)
                }
            }
            ("nil?", 0) => s!(Send, receiver, sym("=="), s!(Nil)),
            ("to_s", 0) => {
                if ctx.options.nullish_to_s {
                    let fallback = s!(Str, "");
                    s!(Begin, s!(Send, receiver, sym("??"), fallback))
                } else {
                    call(receiver, "toString", vec![])
                }
            }
            ("to_i", _) => call(Child::Nil, "parseInt", {
                let mut all = vec![receiver];
                all.extend(args);
                all
            }),
            ("to_f", 0) => call(Child::Nil, "parseFloat", vec![receiver]),
            ("to_json" | "inspect", 0) => call(
                Child::Node(attr(Child::Nil, "JSON")),
                "stringify",
                vec![receiver],
            ),
            ("keys", 0) => call(Child::Node(attr(Child::Nil, "Object")), "keys", vec![receiver]),
            ("values", 0) => call(
                Child::Node(attr(Child::Nil, "Object")),
                "values",
                vec![receiver],
            ),
            ("strip", 0) => call(receiver, "trim", vec![]),
            ("lstrip", 0) => call(receiver, "trimStart", vec![]),
            ("rstrip", 0) => call(receiver, "trimEnd", vec![]),
            ("upcase", 0) => call(receiver, "toUpperCase", vec![]),
            ("downcase", 0) => call(receiver, "toLowerCase", vec![]),
            ("start_with?", _) => call(receiver, "startsWith", args),
            ("end_with?", _) => call(receiver, "endsWith", args),
            ("sub", 2) => call(receiver, "replace", args),
            ("gsub", 2) => {
                let pattern = args[0].clone();
                match &pattern {
                    Child::Node(node) if node.typ() == NodeType::Regexp => {
                        let global = add_regexp_flag(node, "g");
                        call(
                            receiver,
                            "replace",
                            vec![Child::Node(global), args[1].clone()],
                        )
                    }
                    _ if es.es2021() => call(receiver, "replaceAll", args),
                    _ => return None,
                }
            }
            ("max", 0) if es.es2015() => math("max", vec![Child::Node(s!(Splat, receiver))]),
            ("min", 0) if es.es2015() => math("min", vec![Child::Node(s!(Splat, receiver))]),
            ("floor" | "ceil" | "round" | "abs", 0) => math(&selector, vec![receiver]),
            ("rand", 0) if receiver.is_nil() => math("random", vec![]),
            ("=~", 1) => call(receiver, "match", args),
            ("!~", 1) => {
                let matched = call(receiver, "match", args);
                s!(Not, matched)
            }
            ("call", _) => {
                // `fn.call(...)` → `fn(...)` when the receiver is a plain
                // variable; anything fancier is left alone.
                match &receiver {
                    Child::Node(target) if target.typ() == NodeType::Lvar => {
                        let name = target.sym_at(0)?.to_string();
                        call(Child::Nil, &name, args)
                    }
                    _ => return None,
                }
            }
            (name, 0) if VANILLA_METHODS.contains(&name) && !node.is_method() => {
                retag(node, name).updated(Some(NodeType::Call), None)
            }
            _ => return None,
        };
        Some(rewritten)
    }
}

fn add_regexp_flag(regexp: &Node, flag: &str) -> Node {
    let mut children = regexp.children().to_vec();
    if let Some(Child::Node(regopt)) = children.last() {
        if regopt.typ() == NodeType::Regopt {
            let mut flags = regopt.children().to_vec();
            if !flags.iter().any(|child| child.as_sym() == Some(flag)) {
                flags.push(sym(flag));
            }
            let updated = regopt.updated(None, Some(flags));
            let last = children.len() - 1;
            children[last] = Child::Node(updated);
        }
    }
    regexp.updated(None, Some(children))
}

impl Filter for Functions {
    fn name(&self) -> &'static str {
        "functions"
    }

    /// Matches on the incoming node, before renaming filters lower in the
    /// stack touch the selector; a rewrite re-enters the full stack so the
    /// other filters still see it.
    fn on_send(
        &self,
        node: &Node,
        ctx: &mut FilterContext,
        chain: Chain,
    ) -> Result<Option<Node>, Error> {
        if let Some(rewritten) = self.rewrite_send(node, ctx) {
            return chain.rewrite(&rewritten, ctx);
        }
        // Plain renames that keep the send shape (and its location, hence
        // its method-ness).
        let renamed = match node.sym_at(1) {
            Some("collect") if included("collect", ctx) => retag(node, "map"),
            Some("select") if included("select", ctx) => retag(node, "filter"),
            Some("detect") if included("detect", ctx) => retag(node, "find"),
            Some("inject") if included("inject", ctx) => retag(node, "reduce"),
            _ => return chain.process(node, ctx),
        };
        chain.rewrite(&renamed, ctx)
    }

    fn on_block(
        &self,
        node: &Node,
        ctx: &mut FilterContext,
        chain: Chain,
    ) -> Result<Option<Node>, Error> {
        let Some(target) = node.node_at(0) else {
            return chain.process(node, ctx);
        };
        let Some(selector) = target.sym_at(1).map(str::to_string) else {
            return chain.process(node, ctx);
        };
        if !included(&selector, ctx) {
            return chain.process(node, ctx);
        }

        let rewritten = match selector.as_str() {
            "each" | "each_with_index" => {
                let mut children = node.children().to_vec();
                children[0] = Child::Node(retag(target, "forEach"));
                node.updated(None, Some(children))
            }
            "times" => {
                // `n.times { |i| ... }` → counted loop over `0...n`.
                let args = node.node_at(1);
                let var = args
                    .and_then(|args| args.node_at(0))
                    .and_then(|arg| arg.sym_at(0))
                    .unwrap_or("_i");
                let upper = target.child(0).cloned().unwrap_or(Child::Nil);
                let range = s!(Erange, 0i64, upper);
                let assign = Node::new(NodeType::Lvasgn, vec![sym(var)]);
                let body = node.child(2).cloned().unwrap_or(Child::Nil);
                Node::new(
                    NodeType::For,
                    vec![Child::Node(assign), Child::Node(range), body],
                )
            }
            "reject" => {
                let mut children = node.children().to_vec();
                children[0] = Child::Node(retag(target, "filter"));
                children[2] = negate_last(&children[2]);
                node.updated(None, Some(children))
            }
            _ => return chain.process(node, ctx),
        };
        chain.rewrite(&rewritten, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;

    fn context(options: &Options) -> FilterContext<'_> {
        FilterContext::new(options, crate::comments::CommentMap::default())
    }

    #[test]
    fn include_only_wins() {
        let mut options = Options::default();
        options.include_only = Some(vec!["first".to_string()]);
        let ctx = context(&options);
        assert!(included("first", &ctx));
        assert!(!included("last", &ctx));
    }

    #[test]
    fn default_exclusions_need_opt_in() {
        let options = Options::default();
        let ctx = context(&options);
        assert!(!included("call", &ctx));

        let mut options = Options::default();
        options.include = vec!["call".to_string()];
        let ctx = context(&options);
        assert!(included("call", &ctx));
    }

    #[test]
    fn exclude_switches_a_method_off() {
        let mut options = Options::default();
        options.exclude = vec!["first".to_string()];
        let ctx = context(&options);
        assert!(!included("first", &ctx));
    }
}
