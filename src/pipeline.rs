// SPDX-License-Identifier: Apache-2.0

//! Pipeline orchestration: filter composition and execution, comment
//! re-association, prepend-list splicing, conversion, and result assembly.

use crate::ast::{Child, Node, NodeType};
use crate::comments::CommentMap;
use crate::converter;
use crate::error::Error;
use crate::filter::{self, FilterContext, FilterStack};
use crate::namespace::Namespace;
use crate::options::Options;
use crate::parser;
use crate::serializer::Mapping;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::debug;

/// The result of one compile.
#[derive(Debug)]
pub struct Conversion {
    /// Emitted JavaScript.
    pub js: String,
    /// The AST after filtering, as handed to the converter.
    pub ast: Node,
    /// Last-modified time for every source buffer referenced via
    /// locations; `None` when the buffer does not name a readable file.
    pub timestamps: Vec<(PathBuf, Option<SystemTime>)>,
    /// Line-accurate source map entries, when any located node was
    /// emitted.
    pub sourcemap: Option<Vec<Mapping>>,
    /// The lowered template body, when a filter split the source at a
    /// template sentinel.
    pub template: Option<Node>,
}

/// Compile Ruby source text to JavaScript.
pub fn convert(source: &str, options: &Options) -> Result<Conversion, Error> {
    let filters = filter::build(&options.filters)?;
    let filters = filter::reorder(filters)?;

    // Template lowering: split mixed sources at the sentinel and compile
    // the tail through the same machinery.
    let mut head = source;
    let mut template = None;
    for candidate in &filters {
        if let Some((ruby, tail)) = candidate.split_source(source) {
            head = ruby;
            template = candidate.lower_template(tail, options)?;
            break;
        }
    }

    let (ast, raw_comments) = parser::parse(head, options)?;
    let ast = match &template {
        Some(template) => append_statement(ast, template.clone()),
        None => ast,
    };
    let ast = if options.ivars.is_empty() {
        ast
    } else {
        substitute_ivars(&ast, &options.ivars)
    };

    let stack = FilterStack::compose(filters);
    let mut ctx = FilterContext::new(options, CommentMap::new(raw_comments));
    ctx.root = Some(ast.id());
    stack.begin_compile(&mut ctx)?;
    let processed = stack
        .process(&ast, &mut ctx)?
        .unwrap_or_else(|| Node::new(NodeType::Begin, vec![]));
    debug!("filter pass complete");

    // Sibling definitions of one class merge into a single declaration
    // when their bodies allow it; other reopens emit member assignments.
    let processed = merge_sibling_classes(processed);

    let FilterContext {
        mut comments,
        prepend,
        namespace,
        disable_autoimports,
        ..
    } = ctx;

    let root = splice_prepend(processed, prepend, disable_autoimports);
    comments.reassociate(&root);
    comments.register_empty(root.id());

    let vertical = source.contains('\n');
    let (js, mappings) =
        converter::convert_ast(&root, options, namespace, comments, vertical)?;

    let timestamps = collect_timestamps(&root);
    let sourcemap = if mappings.is_empty() {
        None
    } else {
        Some(mappings)
    };
    Ok(Conversion {
        js,
        ast: root,
        timestamps,
        sourcemap,
        template,
    })
}

fn append_statement(ast: Node, statement: Node) -> Node {
    if ast.typ() == NodeType::Begin {
        let mut children = ast.children().to_vec();
        children.push(Child::Node(statement));
        ast.updated(None, Some(children))
    } else {
        Node::new(
            NodeType::Begin,
            vec![Child::Node(ast), Child::Node(statement)],
        )
    }
}

/// Replace `@name` references with caller-supplied literal values.
fn substitute_ivars(node: &Node, ivars: &IndexMap<String, crate::options::IvarValue>) -> Node {
    if node.typ() == NodeType::Ivar {
        if let Some(value) = node.sym_at(0).and_then(|name| ivars.get(name)) {
            return value.to_node();
        }
    }
    let children = node
        .children()
        .iter()
        .map(|child| match child {
            Child::Node(inner) => Child::Node(substitute_ivars(inner, ivars)),
            other => other.clone(),
        })
        .collect();
    node.updated(None, Some(children))
}

/// Merge sibling same-path class definitions whose bodies are member-only,
/// so one compile emits one declaration.
fn merge_sibling_classes(root: Node) -> Node {
    if root.typ() != NodeType::Begin {
        return root;
    }
    let mut merged: Vec<Child> = Vec::new();
    let mut class_index: HashMap<Vec<String>, usize> = HashMap::new();
    for child in root.children() {
        if let Child::Node(node) = child {
            if node.typ() == NodeType::Class {
                let path = node.node_at(0).map(Namespace::resolve).unwrap_or_default();
                if let Some(&index) = class_index.get(&path) {
                    if let Child::Node(existing) = merged[index].clone() {
                        if members_only(&existing) && members_only(node) {
                            merged[index] = Child::Node(merge_class_bodies(&existing, node));
                            continue;
                        }
                    }
                } else {
                    class_index.insert(path, merged.len());
                }
            }
        }
        merged.push(child.clone());
    }
    root.updated(None, Some(merged))
}

fn class_body_statements(class: &Node) -> Vec<Child> {
    match class.child(2) {
        Some(Child::Node(body)) if body.typ() == NodeType::Begin => body.children().to_vec(),
        Some(Child::Node(body)) => vec![Child::Node(body.clone())],
        _ => Vec::new(),
    }
}

fn members_only(class: &Node) -> bool {
    class_body_statements(class).iter().all(|child| match child {
        Child::Node(node) => matches!(
            node.typ(),
            NodeType::Def | NodeType::Defs | NodeType::Casgn | NodeType::Cvasgn
        ),
        _ => false,
    })
}

fn merge_class_bodies(first: &Node, second: &Node) -> Node {
    let mut body = class_body_statements(first);
    body.extend(class_body_statements(second));
    let mut children = first.children().to_vec();
    children[2] = Child::Node(Node::new(NodeType::Begin, body));
    first.updated(None, Some(children))
}

/// Order and splice the prepend list ahead of the AST: the `"use strict"`
/// directive first, then imports, then everything else in insertion order;
/// duplicates dropped; imports dropped entirely when autoimports are
/// disabled.
fn splice_prepend(ast: Node, prepend: Vec<Node>, disable_autoimports: bool) -> Node {
    let mut seen: Vec<Node> = Vec::new();
    let mut strict: Vec<Node> = Vec::new();
    let mut imports: Vec<Node> = Vec::new();
    let mut others: Vec<Node> = Vec::new();
    for node in prepend {
        if seen.contains(&node) {
            continue;
        }
        seen.push(node.clone());
        if node.typ() == NodeType::Str && node.str_at(0) == Some("use strict") {
            strict.push(node);
        } else if node.typ() == NodeType::Import {
            if !disable_autoimports {
                imports.push(node);
            }
        } else {
            others.push(node);
        }
    }

    let mut prepended: Vec<Child> = Vec::new();
    prepended.extend(strict.into_iter().map(Child::Node));
    prepended.extend(imports.into_iter().map(Child::Node));
    prepended.extend(others.into_iter().map(Child::Node));
    if prepended.is_empty() {
        return ast;
    }

    if ast.typ() == NodeType::Begin {
        prepended.extend(ast.children().iter().cloned());
    } else {
        prepended.push(Child::Node(ast));
    }
    Node::new(NodeType::Begin, prepended)
}

/// File-modification timestamps for every buffer referenced by a location
/// in the final tree.
fn collect_timestamps(root: &Node) -> Vec<(PathBuf, Option<SystemTime>)> {
    let mut names: Vec<PathBuf> = Vec::new();
    collect_buffers(root, &mut names);
    names
        .into_iter()
        .map(|name| {
            let modified = std::fs::metadata(&name)
                .and_then(|meta| meta.modified())
                .ok();
            (name, modified)
        })
        .collect()
}

fn collect_buffers(node: &Node, names: &mut Vec<PathBuf>) {
    if let Some(loc) = node.loc() {
        let name = loc.buffer.name().to_path_buf();
        if !names.contains(&name) {
            names.push(name);
        }
    }
    for child in node.children() {
        if let Child::Node(inner) = child {
            collect_buffers(inner, names);
        }
    }
}
