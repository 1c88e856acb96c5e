// SPDX-License-Identifier: Apache-2.0

//! Template lowering for mixed Ruby/markup sources.
//!
//! The source splits at the `__END__` sentinel: the head is ordinary Ruby,
//! the tail an ERB-style template. Literal chunks and `<%= %>`
//! interpolations compile into an interpolated-string tree wrapped in a
//! `render` method, which the pipeline splices after the head's statements.
//! `<%# %>` comments are dropped; statement tags are not supported.

use super::Filter;
use crate::ast::{sym, Child, Node, NodeType};
use crate::error::Error;
use crate::options::Options;
use crate::parser;
use crate::s;

pub struct Erb;

const SENTINEL: &str = "\n__END__\n";

impl Filter for Erb {
    fn name(&self) -> &'static str {
        "erb"
    }

    fn split_source<'a>(&self, source: &'a str) -> Option<(&'a str, &'a str)> {
        source
            .find(SENTINEL)
            .map(|at| (&source[..at + 1], &source[at + SENTINEL.len()..]))
    }

    fn lower_template(&self, tail: &str, options: &Options) -> Result<Option<Node>, Error> {
        let mut parts: Vec<Child> = Vec::new();
        let mut rest = tail;
        while let Some(open) = rest.find("<%") {
            if !rest[..open].is_empty() {
                parts.push(Child::Node(s!(Str, &rest[..open])));
            }
            let after = &rest[open + 2..];
            let close = after.find("%>").ok_or_else(|| Error::FilterFailure {
                filter: "erb".to_string(),
                location: "(template)".to_string(),
                message: "unterminated <% tag".to_string(),
            })?;
            let tag = &after[..close];
            if let Some(expr) = tag.strip_prefix('=') {
                let (ast, _) = parser::parse(expr.trim(), options)?;
                parts.push(Child::Node(Node::new(
                    NodeType::Begin,
                    vec![Child::Node(ast)],
                )));
            } else if !tag.starts_with('#') {
                return Err(Error::FilterFailure {
                    filter: "erb".to_string(),
                    location: "(template)".to_string(),
                    message: "statement tags (<% %>) are not supported; use <%= %>".to_string(),
                });
            }
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            parts.push(Child::Node(s!(Str, rest)));
        }

        let body = if parts.is_empty() {
            s!(Str, "")
        } else if parts.len() == 1
            && matches!(&parts[0], Child::Node(node) if node.typ() == NodeType::Str)
        {
            match parts.remove(0) {
                Child::Node(node) => node,
                _ => unreachable!(),
            }
        } else {
            Node::new(NodeType::Dstr, parts)
        };

        Ok(Some(Node::new(
            NodeType::Def,
            vec![
                sym("render"),
                Child::Node(Node::new(NodeType::Args, vec![])),
                Child::Node(Node::new(
                    NodeType::Autoreturn,
                    vec![Child::Node(body)],
                )),
            ],
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_the_sentinel() {
        let erb = Erb;
        let source = "x = 1\n__END__\n<p><%= x %></p>\n";
        let (head, tail) = erb.split_source(source).expect("sentinel present");
        assert_eq!(head, "x = 1\n");
        assert_eq!(tail, "<p><%= x %></p>\n");
    }

    #[test]
    fn template_compiles_to_a_render_method() {
        let erb = Erb;
        let node = erb
            .lower_template("<p><%= name %></p>", &Options::default())
            .unwrap()
            .unwrap();
        assert_eq!(node.typ(), NodeType::Def);
        assert_eq!(node.sym_at(0), Some("render"));
    }

    #[test]
    fn statement_tags_are_rejected() {
        let erb = Erb;
        let err = erb
            .lower_template("<% if x %>hi<% end %>", &Options::default())
            .unwrap_err();
        assert!(matches!(err, Error::FilterFailure { .. }));
    }
}
