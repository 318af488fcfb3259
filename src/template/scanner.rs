//! Placeholder scanning and invocation parsing.
//!
//! The scanner is not a grammar. It finds `{{ ... }}` spans (balancing
//! nested spans), and for each span reads a command name, an optional
//! parenthesised argument list and a trailing body.
//!
//! ```text
//! {{ name ( args ) body }}
//!    ^^^^   ^^^^   ^^^^
//!    |      |      └ everything after the closing paren, trimmed
//!    |      └ raw text, quotes may contain parentheses
//!    └ [A-Za-z0-9_.-]+
//! ```

/// A slice of template source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Piece<'a> {
    Text(&'a str),
    Placeholder {
        /// The span including its braces.
        raw: &'a str,
        /// The span without its braces.
        inner: &'a str,
    },
}

/// A parsed placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub name: &'a str,
    pub args: Option<&'a str>,
    pub body: &'a str,
}

impl<'a> Invocation<'a> {
    /// A bare name: no argument list and no body.
    pub fn is_bare(&self) -> bool {
        self.args.is_none() && self.body.is_empty()
    }

    /// Arguments split on top-level commas, with quotes removed.
    pub fn arguments(&self) -> Vec<String> {
        self.args.map(parse_args).unwrap_or_default()
    }
}

/// Split `source` into literal text and placeholders.
///
/// An unterminated `{{` and everything after it is returned as text.
pub fn scan(source: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut text_start = 0;
    let mut pos = 0;

    while let Some(offset) = source[pos..].find("{{") {
        let open = pos + offset;
        let Some(close) = closing_braces(source, open + 2) else {
            break;
        };
        if open > text_start {
            pieces.push(Piece::Text(&source[text_start..open]));
        }
        pieces.push(Piece::Placeholder {
            raw: &source[open..close + 2],
            inner: &source[open + 2..close],
        });
        pos = close + 2;
        text_start = pos;
    }

    if text_start < source.len() {
        pieces.push(Piece::Text(&source[text_start..]));
    }
    pieces
}

/// Index of the `}}` closing a span whose content starts at `from`.
fn closing_braces(source: &str, from: usize) -> Option<usize> {
    let bytes = source.as_bytes();
    let mut depth = 0usize;
    let mut i = from;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'{', b'{') => {
                depth += 1;
                i += 2;
            }
            (b'}', b'}') => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
                i += 2;
            }
            _ => i += 1,
        }
    }
    None
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Parse the inside of a placeholder. `None` means the text is not an
/// invocation at all and should be left untouched.
pub fn parse_invocation(inner: &str) -> Option<Invocation<'_>> {
    let trimmed = inner.trim();
    let name_end = trimmed
        .find(|c: char| !is_name_char(c))
        .unwrap_or(trimmed.len());
    if name_end == 0 {
        return None;
    }
    let name = &trimmed[..name_end];
    let after_name = &trimmed[name_end..];
    let rest = after_name.trim_start();

    if let Some(args) = rest.strip_prefix('(') {
        let close = matching_paren(args)?;
        return Some(Invocation {
            name,
            args: Some(args[..close].trim()),
            body: args[close + 1..].trim(),
        });
    }

    if !after_name.is_empty() && !after_name.starts_with(char::is_whitespace) {
        return None;
    }
    Some(Invocation {
        name,
        args: None,
        body: rest,
    })
}

/// Index of the `)` closing an argument list that starts right after `(`.
fn matching_paren(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in s.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => depth += 1,
            ')' if depth == 0 => return Some(i),
            ')' => depth -= 1,
            _ => {}
        }
    }
    None
}

/// Split an argument list on top-level commas, unquoting each argument.
pub fn parse_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut depth = 0usize;

    for c in args.chars() {
        if let Some(q) = quote {
            if escaped {
                current.push(c);
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            } else {
                current.push(c);
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(c);
            }
            ',' if depth == 0 => out.push(std::mem::take(&mut current).trim().to_string()),
            _ => current.push(c),
        }
    }

    let last = current.trim();
    if !last.is_empty() || !out.is_empty() {
        out.push(last.to_string());
    }
    out
}

/// Split a block body on the first whole-word `else` that is not inside a
/// nested placeholder. Both branches are trimmed.
pub fn split_else(body: &str) -> (&str, Option<&str>) {
    let bytes = body.as_bytes();
    let mut depth = 0usize;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i..].starts_with(b"{{") {
            depth += 1;
            i += 2;
            continue;
        }
        if bytes[i..].starts_with(b"}}") {
            depth = depth.saturating_sub(1);
            i += 2;
            continue;
        }
        if depth == 0 && bytes[i..].starts_with(b"else") {
            let before_ok = i == 0 || !is_word_byte(bytes[i - 1]);
            let after_ok = bytes.get(i + 4).map_or(true, |b| !is_word_byte(*b));
            if before_ok && after_ok {
                return (body[..i].trim(), Some(body[i + 4..].trim()));
            }
        }
        i += 1;
    }
    (body.trim(), None)
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
