// SPDX-License-Identifier: Apache-2.0

//! Parser boundary: Ruby source in, tagged AST and comment list out.
//!
//! Parsing itself is delegated to Tree-Sitter with the Ruby grammar; this
//! module lowers the concrete syntax tree into the tag vocabulary the rest
//! of the compiler consumes. Nothing downstream of [`parse`] depends on
//! Tree-Sitter: the core only requires the `(ast, comments)` contract.

mod literals;
mod lower;

use crate::ast::{Node, SourceBuffer};
use crate::comments::Comment;
use crate::error::Error;
use crate::options::Options;
use std::sync::Arc;
use streaming_iterator::StreamingIterator;
use tracing::debug;
use tree_sitter::{Language, Parser, Query, QueryCursor};

pub(crate) use lower::Lowerer;

const COMMENT_QUERY: &str = "(comment) @comment";

/// Parse source text into the tagged AST plus the raw comment list, in
/// source order.
pub fn parse(source: &str, options: &Options) -> Result<(Node, Vec<Comment>), Error> {
    let buffer = SourceBuffer::new(options.buffer_name(), source);
    parse_buffer(buffer)
}

pub(crate) fn parse_buffer(buffer: Arc<SourceBuffer>) -> Result<(Node, Vec<Comment>), Error> {
    let language: Language = tree_sitter_ruby::LANGUAGE.into();
    let mut parser = Parser::new();
    parser
        .set_language(&language)
        .map_err(|err| Error::config(format!("load Ruby grammar: {err}")))?;

    let source_bytes = buffer.source().as_bytes();
    let tree = parser
        .parse(source_bytes, None)
        .ok_or_else(|| Error::Syntax {
            diagnostic: format!("{}: parser returned no tree", buffer.name().display()),
        })?;

    if tree.root_node().has_error() {
        return Err(syntax_error(&buffer, tree.root_node()));
    }

    let comments = extract_comments(&language, &buffer, tree.root_node())?;
    debug!(
        file = %buffer.name().display(),
        comments = comments.len(),
        "parsed source buffer"
    );

    let mut lowerer = Lowerer::new(buffer.clone());
    let ast = lowerer.lower_program(tree.root_node())?;
    Ok((ast, comments))
}

/// Render a caret diagnostic for the first ERROR or MISSING node.
fn syntax_error(buffer: &Arc<SourceBuffer>, root: tree_sitter::Node) -> Error {
    let node = find_error_node(root).unwrap_or(root);
    let message = if node.is_missing() {
        format!("missing {}", node.kind())
    } else {
        "unexpected token".to_string()
    };
    Error::Syntax {
        diagnostic: buffer.caret_diagnostic(&(node.start_byte()..node.end_byte()), &message),
    }
}

fn find_error_node(node: tree_sitter::Node) -> Option<tree_sitter::Node> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<tree_sitter::Node> = node.children(&mut cursor).collect();
    children.into_iter().find_map(find_error_node)
}

/// Collect `(comment)` nodes with a query, in source order.
fn extract_comments(
    language: &Language,
    buffer: &Arc<SourceBuffer>,
    root: tree_sitter::Node,
) -> Result<Vec<Comment>, Error> {
    let query = Query::new(language, COMMENT_QUERY)
        .map_err(|err| Error::config(format!("compile comment query: {err}")))?;

    let mut comments = Vec::new();
    let mut cursor = QueryCursor::new();
    let mut matches = cursor.matches(&query, root, buffer.source().as_bytes());
    while let Some(matched) = matches.next() {
        for capture in matched.captures {
            let range = capture.node.start_byte()..capture.node.end_byte();
            let text = buffer.source()[range.clone()].to_string();
            comments.push(Comment {
                buffer: buffer.clone(),
                range,
                text,
            });
        }
    }
    comments.sort_by_key(|comment| comment.range.start);
    Ok(comments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NodeType;

    fn parse_ok(source: &str) -> Node {
        let (ast, _) = parse(source, &Options::default()).expect("parse");
        ast
    }

    #[test]
    fn lowers_simple_assignment() {
        let ast = parse_ok("a = 1");
        assert_eq!(ast.typ(), NodeType::Lvasgn);
        assert_eq!(ast.sym_at(0), Some("a"));
    }

    #[test]
    fn multiple_statements_wrap_in_begin() {
        let ast = parse_ok("a = 1\nb = 2");
        assert_eq!(ast.typ(), NodeType::Begin);
        assert_eq!(ast.children().len(), 2);
    }

    #[test]
    fn assigned_identifier_is_lvar_not_send() {
        let ast = parse_ok("a = 1\na");
        let last = ast.node_at(1).unwrap();
        assert_eq!(last.typ(), NodeType::Lvar);
    }

    #[test]
    fn unassigned_identifier_is_send() {
        let ast = parse_ok("name");
        assert_eq!(ast.typ(), NodeType::Send);
        assert!(ast.child(0).unwrap().is_nil());
        assert_eq!(ast.sym_at(1), Some("name"));
    }

    #[test]
    fn comments_are_extracted_in_order() {
        let (_, comments) = parse("# one\na = 1 # two\n", &Options::default()).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].text, "# one");
        assert_eq!(comments[1].text, "# two");
    }

    #[test]
    fn syntax_errors_render_a_caret() {
        let err = parse("def f(\n", &Options::default()).unwrap_err();
        match err {
            Error::Syntax { diagnostic } => assert!(diagnostic.contains('^')),
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn parenthesized_call_is_method() {
        let ast = parse_ok("a.pop()");
        assert_eq!(ast.typ(), NodeType::Send);
        assert!(ast.is_method());
        let bare = parse_ok("a.pop");
        assert!(!bare.is_method());
    }
}
