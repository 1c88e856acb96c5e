// SPDX-License-Identifier: Apache-2.0

//! Compile options. One [`Options`] value parameterizes one compile; nothing
//! here is global. The struct derives `Deserialize` so build-tool callers can
//! read it straight from configuration files.

use crate::ast::{Node, NodeType};
use crate::error::Error;
use crate::s;
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::PathBuf;

/// Target ECMAScript edition, selected by year (`5`, `2015`..`2022`).
/// Governs which syntactic lowerings are available to the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(try_from = "u16")]
pub struct EsLevel(u16);

impl EsLevel {
    pub const ES5: EsLevel = EsLevel(5);
    pub const ES2015: EsLevel = EsLevel(2015);
    pub const ES2016: EsLevel = EsLevel(2016);
    pub const ES2017: EsLevel = EsLevel(2017);
    pub const ES2018: EsLevel = EsLevel(2018);
    pub const ES2019: EsLevel = EsLevel(2019);
    pub const ES2020: EsLevel = EsLevel(2020);
    pub const ES2021: EsLevel = EsLevel(2021);
    pub const ES2022: EsLevel = EsLevel(2022);

    pub fn new(year: u16) -> Result<EsLevel, Error> {
        match year {
            5 | 2015..=2022 => Ok(EsLevel(year)),
            other => Err(Error::config(format!(
                "unsupported eslevel {other}; expected 5 or 2015..2022"
            ))),
        }
    }

    pub fn year(self) -> u16 {
        self.0
    }

    pub fn es2015(self) -> bool {
        self.0 >= 2015
    }

    pub fn es2016(self) -> bool {
        self.0 >= 2016
    }

    pub fn es2017(self) -> bool {
        self.0 >= 2017
    }

    pub fn es2018(self) -> bool {
        self.0 >= 2018
    }

    pub fn es2019(self) -> bool {
        self.0 >= 2019
    }

    pub fn es2020(self) -> bool {
        self.0 >= 2020
    }

    pub fn es2021(self) -> bool {
        self.0 >= 2021
    }

    pub fn es2022(self) -> bool {
        self.0 >= 2022
    }
}

impl Default for EsLevel {
    fn default() -> EsLevel {
        EsLevel::ES2015
    }
}

impl TryFrom<u16> for EsLevel {
    type Error = String;

    fn try_from(year: u16) -> Result<EsLevel, String> {
        EsLevel::new(year).map_err(|err| err.to_string())
    }
}

/// Mapping of Ruby `==`/`!=` onto JavaScript equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    /// `==` → `==`, `===` → `===`.
    #[default]
    Equality,
    /// `==` → `===`, `!=` → `!==`.
    Identity,
}

/// Mapping of Ruby `||` onto JavaScript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrMode {
    /// Always `||`.
    #[default]
    Auto,
    /// `??` where the operands are known non-boolean, `||` elsewhere.
    Nullish,
}

/// Truthiness policy for emitted conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Truthy {
    /// Pass Ruby truthiness through to JavaScript truthiness directly.
    #[default]
    Js,
    /// Wrap conditions that would treat `0` or `""` as true in an explicit
    /// `!= null` form.
    Ruby,
}

/// Module surface for emitted import/export statements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    #[default]
    Esm,
    Cjs,
}

/// Automatic exporting of top-level definitions by the `esm` filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutoExports {
    #[default]
    Off,
    /// Export every top-level class, module, method, and constant.
    On,
    /// Export the sole top-level definition as the default export.
    Default,
}

impl<'de> Deserialize<'de> for AutoExports {
    fn deserialize<D>(deserializer: D) -> Result<AutoExports, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Flag(bool),
            Word(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Flag(true) => Ok(AutoExports::On),
            Repr::Flag(false) => Ok(AutoExports::Off),
            Repr::Word(word) if word == "default" => Ok(AutoExports::Default),
            Repr::Word(word) => Err(serde::de::Error::custom(format!(
                "autoexports must be a boolean or \"default\", got {word:?}"
            ))),
        }
    }
}

/// Literal value substituted for an instance variable via
/// [`Options::ivars`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IvarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl IvarValue {
    pub fn to_node(&self) -> Node {
        match self {
            IvarValue::Bool(true) => Node::new(NodeType::True, vec![]),
            IvarValue::Bool(false) => Node::new(NodeType::False, vec![]),
            IvarValue::Int(value) => s!(Int, *value),
            IvarValue::Float(value) => s!(Float, *value),
            IvarValue::Str(value) => s!(Str, value.as_str()),
        }
    }
}

/// Options recognized by [`crate::convert`]. Field semantics follow the
/// table in the external interface contract; defaults match it.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Target ECMAScript year: 5 or 2015..2022.
    pub eslevel: EsLevel,

    /// Prepend `"use strict"`.
    pub strict: bool,

    pub comparison: Comparison,

    pub or: OrMode,

    pub truthy: Truthy,

    /// When set, `.to_s` on a possibly-null expression becomes `?? ""`.
    pub nullish_to_s: bool,

    pub module: ModuleKind,

    /// Emit `_name` rather than `#name` for private members even on ES2022+.
    pub underscored_private: bool,

    /// Target line width for the serializer's wrap/compact decisions.
    pub width: usize,

    /// Ordered list of filter names; resolved against the filter registry.
    pub filters: Vec<String>,

    /// Method-form filter opt-ins for methods excluded by default.
    pub include: Vec<String>,

    /// Method-form filter opt-outs.
    pub exclude: Vec<String>,

    /// When present, the method-form filter rewrites only these methods.
    pub include_only: Option<Vec<String>>,

    /// Identifier → module path table for implicit imports.
    pub autoimports: IndexMap<String, String>,

    pub autoexports: AutoExports,

    /// Variable names supplied by the caller's environment; treated as
    /// already declared so no `let`/`var` is emitted for them.
    pub binding: Vec<String>,

    /// Instance-variable substitution table: `@name` references are replaced
    /// by these literal values before filtering.
    pub ivars: IndexMap<String, IvarValue>,

    /// Source file name used for locations, diagnostics, and timestamps.
    pub file: Option<PathBuf>,

    /// Method names whose single string argument is emitted as a tagged
    /// template literal; also used for `xstr` lowering.
    pub template_literal_tags: Vec<String>,

    /// Host function receiving `xstr` (backtick) bodies when no template
    /// literal tag applies.
    pub xstr_function: Option<String>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            eslevel: EsLevel::default(),
            strict: false,
            comparison: Comparison::default(),
            or: OrMode::default(),
            truthy: Truthy::default(),
            nullish_to_s: false,
            module: ModuleKind::default(),
            underscored_private: false,
            width: 80,
            filters: Vec::new(),
            include: Vec::new(),
            exclude: Vec::new(),
            include_only: None,
            autoimports: IndexMap::new(),
            autoexports: AutoExports::default(),
            binding: Vec::new(),
            ivars: IndexMap::new(),
            file: None,
            template_literal_tags: Vec::new(),
            xstr_function: None,
        }
    }
}

impl Options {
    /// The buffer name used for locations when no file was supplied.
    pub fn buffer_name(&self) -> PathBuf {
        self.file
            .clone()
            .unwrap_or_else(|| PathBuf::from("(string)"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eslevel_rejects_unknown_years() {
        assert!(EsLevel::new(2015).is_ok());
        assert!(EsLevel::new(5).is_ok());
        assert!(EsLevel::new(1999).is_err());
        assert!(EsLevel::new(2023).is_err());
    }

    #[test]
    fn eslevel_predicates_are_monotonic() {
        assert!(EsLevel::ES2020.es2015());
        assert!(EsLevel::ES2020.es2020());
        assert!(!EsLevel::ES2020.es2021());
        assert!(!EsLevel::ES5.es2015());
    }

    #[test]
    fn options_deserialize_from_json_shape() {
        let options: Options = serde_json::from_value(serde_json::json!({
            "eslevel": 2017,
            "comparison": "identity",
            "or": "nullish",
            "autoexports": "default"
        }))
        .unwrap();
        assert_eq!(options.eslevel, EsLevel::ES2017);
        assert_eq!(options.comparison, Comparison::Identity);
        assert_eq!(options.or, OrMode::Nullish);
        assert_eq!(options.autoexports, AutoExports::Default);
    }
}
