// SPDX-License-Identifier: Apache-2.0

//! Line-buffered output serializer.
//!
//! The buffer is a sequence of lines, each a sequence of string tokens.
//! `capture` lets the converter speculatively emit code, measure it, and
//! take it back; `insert` places text at a previously recorded mark (used
//! for hoisted declarations); `wrap` and `compact` collapse short braced
//! regions onto one line. Tokens carry optional source origins, which
//! [`Serializer::serialize`] turns into source-map entries.

use crate::ast::SourceBuffer;
use crate::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

/// Source position a token was emitted for.
#[derive(Debug, Clone)]
pub struct Origin {
    pub buffer: Arc<SourceBuffer>,
    pub offset: usize,
}

/// One source-map entry: an output position paired with the original
/// source position it was emitted from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mapping {
    /// 1-based output line.
    pub emit_line: usize,
    /// 0-based output column.
    pub emit_col: usize,
    pub src_file: PathBuf,
    /// 1-based source line.
    pub src_line: usize,
    /// 0-based source column.
    pub src_col: usize,
}

#[derive(Debug, Clone)]
struct Token {
    text: String,
    origin: Option<Origin>,
}

#[derive(Debug, Clone, Default)]
struct Line {
    tokens: Vec<Token>,
    indent: usize,
}

impl Line {
    fn width(&self) -> usize {
        self.tokens.iter().map(|token| token.text.len()).sum()
    }

    fn text(&self) -> String {
        self.tokens.iter().map(|token| token.text.as_str()).collect()
    }

    fn is_empty(&self) -> bool {
        self.tokens.iter().all(|token| token.text.is_empty())
    }

    fn starts_with_comment(&self) -> bool {
        self.tokens
            .iter()
            .find(|token| !token.text.is_empty())
            .is_some_and(|token| token.text.starts_with("//"))
    }
}

/// A recorded buffer position, used by `insert` and internally by
/// `capture`/`wrap`/`compact`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    line: usize,
    token: usize,
}

/// Open-brace state carried between `wrap_open` and `wrap_close`.
#[derive(Debug, Clone, Copy)]
pub struct WrapMark {
    mark: Mark,
    head: usize,
}

#[derive(Debug)]
pub struct Serializer {
    lines: Vec<Line>,
    width: usize,
    vertical: bool,
    sep: String,
    nl: String,
    ws: String,
    origin: Option<Origin>,
}

impl Serializer {
    pub fn new(width: usize) -> Serializer {
        Serializer {
            lines: vec![Line::default()],
            width,
            vertical: false,
            sep: "; ".to_string(),
            nl: String::new(),
            ws: " ".to_string(),
            origin: None,
        }
    }

    /// Switch from the compact `; `-separated form to one statement per
    /// line. Called when the input source itself is written vertically.
    pub fn enable_vertical_whitespace(&mut self) {
        self.vertical = true;
        self.sep = ";\n".to_string();
        self.nl = "\n".to_string();
        self.ws = "\n".to_string();
    }

    pub fn is_vertical(&self) -> bool {
        self.vertical
    }

    /// Statement separator in the current mode.
    pub fn sep(&self) -> String {
        self.sep.clone()
    }

    /// Optional vertical whitespace between major regions.
    pub fn nl(&self) -> String {
        self.nl.clone()
    }

    /// A space in inline mode, a newline in vertical mode.
    pub fn ws(&self) -> String {
        self.ws.clone()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// The token origin attached to subsequent `put`s. The converter points
    /// this at the node being emitted and restores it afterwards.
    pub fn set_origin(&mut self, origin: Option<Origin>) -> Option<Origin> {
        std::mem::replace(&mut self.origin, origin)
    }

    fn current_line(&mut self) -> &mut Line {
        self.lines.last_mut().expect("buffer always has a line")
    }

    /// Append a token to the current line. Embedded newlines split the
    /// token across physical lines.
    pub fn put(&mut self, text: &str) {
        let origin = self.origin.clone();
        let mut parts = text.split('\n');
        if let Some(first) = parts.next() {
            if !first.is_empty() {
                self.current_line().tokens.push(Token {
                    text: first.to_string(),
                    origin: origin.clone(),
                });
            }
        }
        for part in parts {
            self.lines.push(Line::default());
            if !part.is_empty() {
                self.current_line().tokens.push(Token {
                    text: part.to_string(),
                    origin: origin.clone(),
                });
            }
        }
    }

    /// Append a token and start a new line.
    pub fn puts(&mut self, text: &str) {
        self.put(text);
        self.newline();
    }

    /// Start a new line and append a token.
    pub fn sput(&mut self, text: &str) {
        self.newline();
        self.put(text);
    }

    pub fn newline(&mut self) {
        self.lines.push(Line::default());
    }

    /// Current end-of-buffer position.
    pub fn mark(&self) -> Mark {
        Mark {
            line: self.lines.len() - 1,
            token: self.lines.last().map(|line| line.tokens.len()).unwrap_or(0),
        }
    }

    /// Width of the line the cursor is on.
    pub fn current_width(&self) -> usize {
        self.lines.last().map(Line::width).unwrap_or(0)
    }

    /// Insert a token at a previously recorded mark without disturbing
    /// subsequent tokens on that line.
    pub fn insert_token(&mut self, mark: Mark, text: &str) {
        let line = &mut self.lines[mark.line];
        let at = mark.token.min(line.tokens.len());
        line.tokens.insert(
            at,
            Token {
                text: text.to_string(),
                origin: None,
            },
        );
    }

    /// Insert a whole line before the line a mark points into, preserving
    /// that line's indentation.
    pub fn insert_line(&mut self, mark: Mark, text: &str) {
        let indent = self.lines.get(mark.line).map(|line| line.indent).unwrap_or(0);
        self.lines.insert(
            mark.line,
            Line {
                tokens: vec![Token {
                    text: text.to_string(),
                    origin: None,
                }],
                indent,
            },
        );
    }

    /// Remove and return everything emitted after a mark, restoring the
    /// cursor. The second phase of `capture`; nestable.
    pub fn capture_end(&mut self, mark: Mark) -> String {
        let mut captured = String::new();
        let tail: Vec<Token> = self.lines[mark.line].tokens.split_off(mark.token);
        for token in &tail {
            captured.push_str(&token.text);
        }
        for line in self.lines.drain(mark.line + 1..) {
            captured.push('\n');
            captured.push_str(&line.text());
        }
        captured
    }

    /// Run a block, then remove and return everything it emitted. The
    /// cursor is restored to its position before the block. Nestable.
    pub fn capture<F>(&mut self, body: F) -> Result<String, Error>
    where
        F: FnOnce(&mut Serializer) -> Result<(), Error>,
    {
        let mark = self.mark();
        body(self)?;
        Ok(self.capture_end(mark))
    }

    fn region_lines(&self, mark: Mark) -> Vec<String> {
        let mut region = Vec::new();
        let first: String = self.lines[mark.line].tokens[mark.token..]
            .iter()
            .map(|token| token.text.as_str())
            .collect();
        if !first.is_empty() {
            region.push(first);
        }
        for line in &self.lines[mark.line + 1..] {
            region.push(line.text());
        }
        region
    }

    /// Drop the region after `mark` from the buffer.
    fn truncate_to(&mut self, mark: Mark) {
        self.lines.truncate(mark.line + 1);
        self.lines[mark.line].tokens.truncate(mark.token);
    }

    /// Add one level of indentation to every line strictly after the mark's
    /// line, plus the closing-line adjustments the caller owns.
    fn indent_region(&mut self, mark: Mark, upto: usize) {
        for line in &mut self.lines[mark.line + 1..upto] {
            line.indent += 1;
        }
    }

    fn trim_trailing_blank_lines(&mut self, mark: Mark) {
        while self.lines.len() > mark.line + 1 && self.lines.last().is_some_and(Line::is_empty) {
            self.lines.pop();
        }
    }

    /// Emit `{` and start the braced region. The caller lays statements
    /// out one per line and finishes with [`Serializer::wrap_close`].
    pub fn wrap_open(&mut self) -> WrapMark {
        let head = self.current_width();
        self.put("{");
        let mark = self.mark();
        self.newline();
        WrapMark { mark, head }
    }

    /// Close a braced region: collapse onto one line when it spans no more
    /// than three statement lines and the whole line, including whatever
    /// preceded the `{`, fits the configured width; otherwise emit the
    /// closing `}` on its own line.
    pub fn wrap_close(&mut self, wrap: WrapMark, pad: bool) {
        let WrapMark { mark, head } = wrap;
        self.trim_trailing_blank_lines(mark);
        let statements: Vec<String> = self
            .region_lines(mark)
            .into_iter()
            .filter(|line| !line.is_empty())
            .collect();
        let has_comment = self.lines[mark.line + 1..]
            .iter()
            .any(Line::starts_with_comment);
        let joined = join_statements(&statements, pad);
        if statements.len() <= 3 && !has_comment && head + joined.len() + 2 <= self.width {
            self.truncate_to(mark);
            self.put(&joined);
            self.put("}");
        } else {
            let upto = self.lines.len();
            self.indent_region(mark, upto);
            self.sput("}");
        }
    }

    /// Emit `{`, run the block (which lays its statements out one per
    /// line), then either collapse the braces onto one line or leave the
    /// closing `}` on its own line.
    pub fn wrap<F>(&mut self, pad: bool, body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Serializer) -> Result<(), Error>,
    {
        let wrap = self.wrap_open();
        body(self)?;
        self.wrap_close(wrap, pad);
        Ok(())
    }

    /// Start a region to be measured by [`Serializer::compact_end`].
    pub fn compact_start(&self) -> Mark {
        self.mark()
    }

    /// If the region after `mark` is under `width - 10` characters and
    /// contains no line-leading `//`, rejoin it as one line; otherwise
    /// indent its interior.
    pub fn compact_end(&mut self, mark: Mark) {
        self.trim_trailing_blank_lines(mark);
        let region: Vec<String> = self
            .region_lines(mark)
            .into_iter()
            .filter(|line| !line.is_empty())
            .collect();
        if region.len() < 2 {
            return;
        }
        let has_comment = self.lines[mark.line + 1..]
            .iter()
            .any(Line::starts_with_comment);
        let total: usize = region.iter().map(String::len).sum::<usize>() + region.len() - 1;
        if has_comment || total + 10 > self.width {
            let upto = self.lines.len();
            self.indent_region(mark, upto);
            // Closing lines keep the outer level.
            if let Some(last) = self.lines.last_mut() {
                if last.text().starts_with('}') && last.indent > 0 {
                    last.indent -= 1;
                }
            }
            return;
        }
        self.truncate_to(mark);
        self.put(&region.join(" "));
    }

    /// Measure the multi-line region a block produced; if it is under
    /// `width - 10` characters and contains no line-leading `//`, rejoin it
    /// as one line.
    pub fn compact<F>(&mut self, body: F) -> Result<(), Error>
    where
        F: FnOnce(&mut Serializer) -> Result<(), Error>,
    {
        let mark = self.compact_start();
        body(self)?;
        self.compact_end(mark);
        Ok(())
    }

    /// Produce the final string and the source map collected from token
    /// origins.
    pub fn serialize(&self) -> (String, Vec<Mapping>) {
        let mut output = String::new();
        let mut mappings = Vec::new();
        let mut emit_line = 0usize;
        let last_meaningful = self
            .lines
            .iter()
            .rposition(|line| !line.is_empty())
            .unwrap_or(0);
        for line in &self.lines[..=last_meaningful] {
            if emit_line > 0 {
                output.push('\n');
            }
            emit_line += 1;
            if line.is_empty() {
                continue;
            }
            let indent = "  ".repeat(line.indent);
            output.push_str(&indent);
            let mut emit_col = indent.len();
            for token in &line.tokens {
                if let Some(origin) = &token.origin {
                    let (src_line, src_col) = origin.buffer.line_col(origin.offset);
                    let mapping = Mapping {
                        emit_line,
                        emit_col,
                        src_file: origin.buffer.name().to_path_buf(),
                        src_line,
                        src_col,
                    };
                    if mappings.last() != Some(&mapping) {
                        mappings.push(mapping);
                    }
                }
                output.push_str(&token.text);
                emit_col += token.text.len();
            }
        }
        (output, mappings)
    }
}

/// Join statement lines for a collapsed braced region: trailing statement
/// separators are stripped and replaced by inline `; `.
fn join_statements(statements: &[String], pad: bool) -> String {
    let joined = statements
        .iter()
        .map(|statement| statement.trim_end_matches(';').trim_end())
        .collect::<Vec<_>>()
        .join("; ");
    if joined.is_empty() {
        String::new()
    } else if pad {
        format!(" {joined} ")
    } else {
        joined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emit_error_free(body: impl FnOnce(&mut Serializer)) -> Serializer {
        let mut serializer = Serializer::new(80);
        body(&mut serializer);
        serializer
    }

    #[test]
    fn put_splits_embedded_newlines() {
        let serializer = emit_error_free(|s| s.put("a;\nb"));
        let (output, _) = serializer.serialize();
        assert_eq!(output, "a;\nb");
    }

    #[test]
    fn capture_removes_and_returns_output() {
        let mut serializer = Serializer::new(80);
        serializer.put("before");
        let captured = serializer.capture(|s| {
            s.put("inside");
            Ok(())
        })
        .unwrap();
        assert_eq!(captured, "inside");
        let (output, _) = serializer.serialize();
        assert_eq!(output, "before");
    }

    #[test]
    fn capture_is_nestable() {
        let mut serializer = Serializer::new(80);
        let outer = serializer.capture(|s| {
            s.put("x");
            let inner = s.capture(|s| {
                s.put("y");
                Ok(())
            })?;
            assert_eq!(inner, "y");
            s.put("z");
            Ok(())
        })
        .unwrap();
        assert_eq!(outer, "xz");
    }

    #[test]
    fn insert_token_at_mark() {
        let mut serializer = Serializer::new(80);
        let mark = serializer.mark();
        serializer.put("x = 1");
        serializer.insert_token(mark, "let x; ");
        let (output, _) = serializer.serialize();
        assert_eq!(output, "let x; x = 1");
    }

    #[test]
    fn wrap_collapses_short_bodies() {
        let mut serializer = Serializer::new(80);
        serializer.put("function f(x) ");
        serializer
            .wrap(false, |s| {
                s.puts("return x * 2");
                Ok(())
            })
            .unwrap();
        let (output, _) = serializer.serialize();
        assert_eq!(output, "function f(x) {return x * 2}");
    }

    #[test]
    fn wrap_keeps_long_bodies_vertical() {
        let mut serializer = Serializer::new(40);
        serializer.put("function f() ");
        serializer
            .wrap(false, |s| {
                s.puts("let aLongVariableName = somethingLong();");
                s.puts("return aLongVariableName + aLongVariableName");
                Ok(())
            })
            .unwrap();
        let (output, _) = serializer.serialize();
        assert_eq!(
            output,
            "function f() {\n  let aLongVariableName = somethingLong();\n  return aLongVariableName + aLongVariableName\n}"
        );
    }

    #[test]
    fn compact_rejoins_small_regions() {
        let mut serializer = Serializer::new(80);
        serializer
            .compact(|s| {
                s.puts("class A {");
                s.puts("m() { return 1 }");
                s.put("}");
                Ok(())
            })
            .unwrap();
        let (output, _) = serializer.serialize();
        assert_eq!(output, "class A { m() { return 1 } }");
    }

    #[test]
    fn compact_leaves_comment_regions_alone() {
        let mut serializer = Serializer::new(80);
        serializer
            .compact(|s| {
                s.puts("class A {");
                s.puts("// note");
                s.put("}");
                Ok(())
            })
            .unwrap();
        let (output, _) = serializer.serialize();
        assert_eq!(output, "class A {\n  // note\n}");
    }

    #[test]
    fn serialize_collects_mappings() {
        let buffer = SourceBuffer::new("app.rb", "a = 1");
        let mut serializer = Serializer::new(80);
        serializer.set_origin(Some(Origin {
            buffer: buffer.clone(),
            offset: 0,
        }));
        serializer.put("let a = 1");
        let (output, mappings) = serializer.serialize();
        assert_eq!(output, "let a = 1");
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].emit_line, 1);
        assert_eq!(mappings[0].emit_col, 0);
        assert_eq!(mappings[0].src_line, 1);
        assert_eq!(mappings[0].src_col, 0);
    }
}
