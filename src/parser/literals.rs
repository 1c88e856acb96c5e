// SPDX-License-Identifier: Apache-2.0

//! Literal decoding helpers: numeric bases, escape sequences, and heredoc
//! dedent.

/// Decode a Ruby integer literal: underscores, `0x`/`0b`/`0o` prefixes, and
/// bare leading-zero octal.
pub(crate) fn parse_int(text: &str) -> Option<i64> {
    let cleaned: String = text.chars().filter(|ch| *ch != '_').collect();
    let (digits, radix) = match cleaned.as_bytes() {
        [b'0', b'x' | b'X', ..] => (&cleaned[2..], 16),
        [b'0', b'b' | b'B', ..] => (&cleaned[2..], 2),
        [b'0', b'o' | b'O', ..] => (&cleaned[2..], 8),
        [b'0', rest @ ..] if !rest.is_empty() && rest.iter().all(u8::is_ascii_digit) => {
            (&cleaned[1..], 8)
        }
        _ => (cleaned.as_str(), 10),
    };
    i64::from_str_radix(digits, radix).ok()
}

pub(crate) fn parse_float(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|ch| *ch != '_').collect();
    cleaned.parse().ok()
}

/// Resolve one `escape_sequence` token from a double-quoted string or
/// heredoc.
pub(crate) fn unescape_double(text: &str) -> String {
    let mut chars = text.chars();
    if chars.next() != Some('\\') {
        return text.to_string();
    }
    let Some(marker) = chars.next() else {
        return String::new();
    };
    match marker {
        'n' => "\n".to_string(),
        't' => "\t".to_string(),
        'r' => "\r".to_string(),
        's' => " ".to_string(),
        '0' => "\0".to_string(),
        'a' => "\u{7}".to_string(),
        'b' => "\u{8}".to_string(),
        'e' => "\u{1b}".to_string(),
        'f' => "\u{c}".to_string(),
        'v' => "\u{b}".to_string(),
        'u' => {
            let rest: String = chars.collect();
            let digits = rest
                .trim_start_matches('{')
                .trim_end_matches('}')
                .to_string();
            u32::from_str_radix(&digits, 16)
                .ok()
                .and_then(char::from_u32)
                .map(String::from)
                .unwrap_or_else(|| text.to_string())
        }
        // `\\`, `\"`, `\'`, `\#`, and anything else resolve to the char.
        other => other.to_string(),
    }
}

/// Resolve one escape inside a single-quoted string, where only `\\` and
/// `\'` are special.
pub(crate) fn unescape_single(text: &str) -> String {
    match text {
        "\\\\" => "\\".to_string(),
        "\\'" => "'".to_string(),
        other => other.to_string(),
    }
}

/// Width of a leading whitespace run, expanding tabs to 8-column stops.
fn margin_width(line: &str) -> usize {
    let mut width = 0;
    for ch in line.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            _ => break,
        }
    }
    width
}

/// The common leading-whitespace width across the non-blank lines of a
/// squiggly heredoc body.
pub(crate) fn common_margin(body: &str) -> usize {
    body.lines()
        .filter(|line| !line.trim().is_empty())
        .map(margin_width)
        .min()
        .unwrap_or(0)
}

/// Strip `margin` display columns from the front of a line.
pub(crate) fn strip_margin(line: &str, margin: usize) -> String {
    let mut width = 0;
    let mut rest = line.char_indices();
    for (idx, ch) in rest.by_ref() {
        if width >= margin {
            return line[idx..].to_string();
        }
        match ch {
            ' ' => width += 1,
            '\t' => width = (width / 8 + 1) * 8,
            _ => return line[idx..].to_string(),
        }
    }
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_bases() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("1_000"), Some(1000));
        assert_eq!(parse_int("0xff"), Some(255));
        assert_eq!(parse_int("0b101"), Some(5));
        assert_eq!(parse_int("0o17"), Some(15));
        assert_eq!(parse_int("017"), Some(15));
    }

    #[test]
    fn escapes() {
        assert_eq!(unescape_double("\\n"), "\n");
        assert_eq!(unescape_double("\\\""), "\"");
        assert_eq!(unescape_double("\\u0041"), "A");
        assert_eq!(unescape_double("\\u{1F600}"), "\u{1F600}");
        assert_eq!(unescape_single("\\'"), "'");
        assert_eq!(unescape_single("\\n"), "\\n");
    }

    #[test]
    fn heredoc_margin_uses_tab_stops() {
        let body = "\tone\n        two\n";
        assert_eq!(common_margin(body), 8);
        assert_eq!(strip_margin("\tone", 8), "one");
        assert_eq!(strip_margin("        two", 8), "two");
    }
}
