// SPDX-License-Identifier: Apache-2.0

//! Module-surface emission: `import`/`export` under both module kinds,
//! plus `xstr` and raw `xnode` passthrough.

use super::literals::quote;
use super::{Converter, Ctx};
use crate::ast::{Child, Node, NodeType};
use crate::error::Error;
use crate::options::ModuleKind;

impl Converter<'_> {
    /// `import` node shapes:
    /// - `[path]` — side-effect import
    /// - `[path, sym]` — default import
    /// - `[path, array-of-syms]` — named imports
    pub(crate) fn on_import(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if ctx != Ctx::Statement {
            return Err(self.illegal(node, "import in expression position"));
        }
        let Some(path) = node.str_at(0) else {
            return Err(self.unknown(node));
        };
        let path = quote(path);
        let esm = self.options.module == ModuleKind::Esm;

        match node.child(1) {
            None | Some(Child::Nil) => {
                if esm {
                    self.out.put(&format!("import {path}"));
                } else {
                    self.out.put(&format!("require({path})"));
                }
                Ok(())
            }
            Some(Child::Sym(name)) => {
                let name = name.clone();
                if esm {
                    self.out.put(&format!("import {name} from {path}"));
                } else {
                    self.out.put(&format!("const {name} = require({path})"));
                }
                Ok(())
            }
            Some(Child::Node(names)) if names.typ() == NodeType::Array => {
                let list: Vec<String> = names
                    .children()
                    .iter()
                    .filter_map(|child| match child {
                        Child::Sym(name) => Some(name.clone()),
                        Child::Str(name) => Some(name.clone()),
                        Child::Node(node) => node
                            .sym_at(0)
                            .map(str::to_string)
                            .or_else(|| node.str_at(0).map(str::to_string)),
                        _ => None,
                    })
                    .collect();
                let list = list.join(", ");
                if esm {
                    self.out.put(&format!("import {{ {list} }} from {path}"));
                } else {
                    self.out
                        .put(&format!("const {{ {list} }} = require({path})"));
                }
                Ok(())
            }
            _ => Err(self.unknown(node)),
        }
    }

    /// `export` node shapes: `[decl]` and `[sym "default", decl]`.
    pub(crate) fn on_export(&mut self, node: &Node, ctx: Ctx) -> Result<(), Error> {
        if ctx != Ctx::Statement {
            return Err(self.illegal(node, "export in expression position"));
        }
        let default = node.sym_at(0) == Some("default");
        let decl = if default {
            node.node_at(1)
        } else {
            node.node_at(0)
        };
        let Some(decl) = decl.cloned() else {
            return Err(self.unknown(node));
        };

        if self.options.module == ModuleKind::Esm {
            self.out
                .put(if default { "export default " } else { "export " });
            return self.parse(&decl, Ctx::Statement);
        }

        // CommonJS: emit the declaration, then attach it to the exports
        // object.
        self.parse(&decl, Ctx::Statement)?;
        let name = exported_name(&decl);
        let Some(name) = name else {
            return Err(self.unknown(node));
        };
        let sep = self.out.sep();
        self.out.put(&sep);
        if default {
            self.out.put(&format!("module.exports = {name}"));
        } else {
            self.out.put(&format!("module.exports.{name} = {name}"));
        }
        Ok(())
    }

    /// Backtick strings: a tagged template literal when a tag is
    /// configured, otherwise a call to the host-configured function.
    pub(crate) fn on_xstr(&mut self, node: &Node, _ctx: Ctx) -> Result<(), Error> {
        let es2015 = self.options.eslevel.es2015();
        if es2015 {
            if let Some(tag) = self.options.template_literal_tags.first() {
                let tag = tag.clone();
                self.out.put(&tag);
                self.out.put("`");
                self.emit_template_parts(node)?;
                self.out.put("`");
                return Ok(());
            }
        }
        let function = self
            .options
            .xstr_function
            .clone()
            .unwrap_or_else(|| "eval".to_string());
        self.out.put(&function);
        self.out.put("(");
        let dstr = Node::new(NodeType::Dstr, node.children().to_vec());
        self.on_dstr(&dstr)?;
        self.out.put(")");
        Ok(())
    }

    /// Raw JavaScript escape hatch: string children emit verbatim, node
    /// children recurse.
    pub(crate) fn on_xnode(&mut self, node: &Node, _ctx: Ctx) -> Result<(), Error> {
        for child in node.children() {
            match child {
                Child::Str(text) => self.out.put(text),
                Child::Node(inner) => {
                    let inner = inner.clone();
                    self.parse(&inner, Ctx::Expression)?;
                }
                Child::Sym(name) => self.out.put(name),
                _ => {}
            }
        }
        Ok(())
    }
}

/// The binding name a declaration introduces, for CommonJS export
/// attachment.
fn exported_name(decl: &Node) -> Option<String> {
    match decl.typ() {
        NodeType::Class | NodeType::Module => decl
            .node_at(0)
            .map(|name| crate::namespace::Namespace::resolve(name).join(".")),
        NodeType::Def => decl.sym_at(0).map(str::to_string),
        NodeType::Casgn => decl.sym_at(1).map(str::to_string),
        _ => None,
    }
}
