// SPDX-License-Identifier: Apache-2.0

//! `snake_case` → `camelCase` renaming for method names, local variables,
//! arguments, and instance/class/global variables. Leading underscores are
//! reserved-like markers and survive untouched; ALL_CAPS names are left
//! alone.

use super::{Chain, Filter, FilterContext};
use crate::ast::{sym, Node, NodeType};
use crate::error::Error;
use regex::Regex;
use std::sync::OnceLock;

pub struct CamelCase;

fn camel(name: &str) -> String {
    static SNAKE_REGEX: OnceLock<Regex> = OnceLock::new();
    let snake_regex =
        SNAKE_REGEX.get_or_init(|| Regex::new(r"_([a-z\d])").expect("static pattern"));

    let trimmed = name.trim_start_matches('_');
    let prefix = &name[..name.len() - trimmed.len()];
    if !trimmed.contains('_') || trimmed.chars().all(|ch| !ch.is_ascii_lowercase()) {
        return name.to_string();
    }
    // A trailing `?`/`!`/`=` survives as-is; only interior runs convert.
    let converted = snake_regex.replace_all(trimmed, |caps: &regex::Captures| {
        caps[1].to_ascii_uppercase()
    });
    format!("{prefix}{converted}")
}

fn rename_sym_at(node: &Node, index: usize) -> Option<Node> {
    let name = node.sym_at(index)?;
    let renamed = camel(name);
    if renamed == name {
        return None;
    }
    let mut children = node.children().to_vec();
    children[index] = sym(renamed);
    Some(node.updated(None, Some(children)))
}

/// Delegate upward, then rename the symbol child at `index` if the node
/// kept its shape.
fn process_renaming(
    node: &Node,
    ctx: &mut FilterContext,
    chain: Chain,
    typ: NodeType,
    index: usize,
) -> Result<Option<Node>, Error> {
    let Some(processed) = chain.process(node, ctx)? else {
        return Ok(None);
    };
    if processed.typ() != typ {
        return Ok(Some(processed));
    }
    Ok(Some(
        rename_sym_at(&processed, index).unwrap_or(processed),
    ))
}

macro_rules! renaming_handler {
    ($($method:ident => ($typ:ident, $index:expr)),+ $(,)?) => {
        $(
            fn $method(
                &self,
                node: &Node,
                ctx: &mut FilterContext,
                chain: Chain,
            ) -> Result<Option<Node>, Error> {
                process_renaming(node, ctx, chain, NodeType::$typ, $index)
            }
        )+
    };
}

impl Filter for CamelCase {
    fn name(&self) -> &'static str {
        "camelCase"
    }

    renaming_handler!(
        on_send => (Send, 1),
        on_csend => (Csend, 1),
        on_lvar => (Lvar, 0),
        on_lvasgn => (Lvasgn, 0),
        on_ivar => (Ivar, 0),
        on_ivasgn => (Ivasgn, 0),
        on_cvar => (Cvar, 0),
        on_cvasgn => (Cvasgn, 0),
        on_gvar => (Gvar, 0),
        on_gvasgn => (Gvasgn, 0),
        on_arg => (Arg, 0),
        on_optarg => (Optarg, 0),
        on_restarg => (Restarg, 0),
        on_kwarg => (Kwarg, 0),
        on_kwoptarg => (Kwoptarg, 0),
        on_blockarg => (Blockarg, 0),
        on_def => (Def, 0),
    );

    fn on_defs(
        &self,
        node: &Node,
        ctx: &mut FilterContext,
        chain: Chain,
    ) -> Result<Option<Node>, Error> {
        process_renaming(node, ctx, chain, NodeType::Defs, 1)
    }

    // `attr`/`call` nodes synthesized by earlier filters share the send
    // shape and rename the same way.
    fn on_other(
        &self,
        node: &Node,
        ctx: &mut FilterContext,
        chain: Chain,
    ) -> Result<Option<Node>, Error> {
        match node.typ() {
            NodeType::Attr | NodeType::Call => {
                process_renaming(node, ctx, chain, node.typ(), 1)
            }
            _ => chain.process(node, ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_interior_underscores() {
        assert_eq!(camel("foo_bar"), "fooBar");
        assert_eq!(camel("foo_bar_baz"), "fooBarBaz");
        assert_eq!(camel("each_with_index"), "eachWithIndex");
    }

    #[test]
    fn preserves_leading_underscore_markers() {
        assert_eq!(camel("_private_name"), "_privateName");
        assert_eq!(camel("__double"), "__double");
    }

    #[test]
    fn leaves_constants_and_plain_names_alone() {
        assert_eq!(camel("MAX_WIDTH"), "MAX_WIDTH");
        assert_eq!(camel("simple"), "simple");
        assert_eq!(camel("=="), "==");
    }

    #[test]
    fn keeps_predicate_suffix() {
        assert_eq!(camel("valid_name?"), "validName?");
    }
}
