// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the compiler core.
//!
//! Every error carries a rendered source location whenever one is known.
//! Errors are never swallowed; retries are a caller concern.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Raised at the parser boundary. Carries a diagnostic with the source
    /// range and a rendered caret line.
    #[error("syntax error: {diagnostic}")]
    Syntax { diagnostic: String },

    /// A handler is absent for an encountered tag. Fatal.
    #[error("unknown node {tag} at {location}")]
    UnknownNode { tag: String, location: String },

    /// `break` outside a loop, `next` outside a block, `return` at top level
    /// under a module form that forbids it.
    #[error("illegal {what} at {location}")]
    IllegalControl { what: String, location: String },

    /// A filter raised during rewrite. Propagated with the failing node's
    /// location; never recovered.
    #[error("filter {filter} failed at {location}: {message}")]
    FilterFailure {
        filter: String,
        location: String,
        message: String,
    },

    /// A malformed option, such as an unrecognized filter name or an
    /// unsupported ECMAScript level. No partial compile takes place.
    #[error("configuration error: {message}")]
    Config { message: String },
}

impl Error {
    pub fn config(message: impl Into<String>) -> Error {
        Error::Config {
            message: message.into(),
        }
    }
}
