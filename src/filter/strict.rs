// SPDX-License-Identifier: Apache-2.0

//! Injects the `"use strict"` directive through the prepend list when the
//! `strict` option is set. The pipeline keeps the directive ahead of
//! imports so it stays the first statement.

use super::{Filter, FilterContext};
use crate::error::Error;
use crate::s;

pub struct Strict;

impl Filter for Strict {
    fn name(&self) -> &'static str {
        "strict"
    }

    fn begin_compile(&self, ctx: &mut FilterContext) -> Result<(), Error> {
        if ctx.options.strict {
            ctx.prepend(s!(Str, "use strict"));
        }
        Ok(())
    }
}
