// SPDX-License-Identifier: Apache-2.0

//! Ruby-to-JavaScript source-to-source compiler.
//!
//! The crate accepts a pragmatic subset of Ruby syntax and rewrites it as
//! idiomatic JavaScript targeting a selectable ECMAScript level. Four
//! subsystems make up the core: the tagged-node AST ([`ast`]), the
//! composable filter pipeline ([`filter`]), the class/module namespace
//! tracker ([`namespace`]), and the handler-dispatched converter
//! ([`converter`]) emitting through a line-buffered serializer
//! ([`serializer`]).
//!
//! ```no_run
//! use rb2js::{convert, Options};
//!
//! let options = Options::default();
//! let result = convert("a = 1; b = a + 2", &options)?;
//! assert_eq!(result.js, "let a = 1; let b = a + 2");
//! # Ok::<(), rb2js::Error>(())
//! ```

pub mod ast;
pub mod comments;
pub mod converter;
pub mod error;
pub mod filter;
pub mod namespace;
pub mod options;
pub mod parser;
pub mod pipeline;
pub mod serializer;

pub use error::Error;
pub use options::{
    AutoExports, Comparison, EsLevel, IvarValue, ModuleKind, Options, OrMode, Truthy,
};
pub use parser::parse;
pub use pipeline::{convert, Conversion};
