//! Line-oriented scanner for Puppetfile `mod` declarations.
//!
//! Only `mod` declarations are interpreted. A declaration starts on a line
//! whose first token is `mod` and continues onto the following lines for as
//! long as it ends with a comma. Every other line (comments, `forge`,
//! `moduledir`, arbitrary Ruby) is skipped untouched.

use std::ops::Range;

use super::{ManifestEntry, ManifestError, Result};

/// A lexical token with its byte span in the full manifest text.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    /// Quoted string; the span covers the contents, without quotes.
    Str { value: String, span: Range<usize> },
    /// `:name`
    Symbol(String),
    /// `name:` (Ruby 1.9 hash key)
    Key(String),
    /// Bare word
    Ident(String),
    Arrow,
    Comma,
    /// Anything else (parentheses, numbers, operators)
    Other,
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// Splits one physical line into tokens. `offset` is the byte offset of the
/// line in the whole text. A `#` outside quotes ends the line.
fn lex_line(line: &str, offset: usize) -> std::result::Result<Vec<Token>, String> {
    let bytes = line.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        match b {
            b' ' | b'\t' | b'\r' => i += 1,
            b'#' => break,
            b'\'' | b'"' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end] != b {
                    // Skip escaped characters inside double-quoted strings
                    if b == b'"' && bytes[end] == b'\\' {
                        end += 1;
                    }
                    end += 1;
                }
                if end >= bytes.len() {
                    return Err(format!("unterminated string starting at column {}", i + 1));
                }
                tokens.push(Token::Str {
                    value: line[start..end].to_string(),
                    span: offset + start..offset + end,
                });
                i = end + 1;
            }
            b'=' if bytes.get(i + 1) == Some(&b'>') => {
                tokens.push(Token::Arrow);
                i += 2;
            }
            b',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            b':' if bytes.get(i + 1).is_some_and(|&n| is_word_byte(n)) => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && is_word_byte(bytes[end]) {
                    end += 1;
                }
                tokens.push(Token::Symbol(line[start..end].to_string()));
                i = end;
            }
            _ if is_word_byte(b) => {
                let start = i;
                let mut end = start;
                while end < bytes.len() && is_word_byte(bytes[end]) {
                    end += 1;
                }
                let word = line[start..end].to_string();
                // `key:` but not `Foo::Bar`
                if bytes.get(end) == Some(&b':') && bytes.get(end + 1) != Some(&b':') {
                    tokens.push(Token::Key(word));
                    i = end + 1;
                } else {
                    tokens.push(Token::Ident(word));
                    i = end;
                }
            }
            _ => {
                tokens.push(Token::Other);
                i += line[i..].chars().next().map_or(1, char::len_utf8);
            }
        }
    }

    Ok(tokens)
}

/// Whether the line's first token is the `mod` keyword.
fn starts_declaration(line: &str) -> bool {
    line.trim_start()
        .strip_prefix("mod")
        .is_some_and(|rest| rest.starts_with([' ', '\t', '(', '\'', '"']))
}

/// Scans `text` for module entries, in file order.
pub(super) fn parse_entries(text: &str) -> Result<Vec<ManifestEntry>> {
    // (line number, byte offset, content without newline)
    let mut lines = Vec::new();
    let mut offset = 0;
    for (idx, raw) in text.split_inclusive('\n').enumerate() {
        let content = raw.strip_suffix('\n').unwrap_or(raw);
        lines.push((idx + 1, offset, content));
        offset += raw.len();
    }

    let mut entries = Vec::new();
    let mut idx = 0;

    while idx < lines.len() {
        let (line_no, line_offset, content) = lines[idx];
        idx += 1;

        if !starts_declaration(content) {
            continue;
        }

        let syntax = |line: usize, message: String| ManifestError::Syntax { line, message };

        let mut tokens = lex_line(content, line_offset).map_err(|m| syntax(line_no, m))?;
        while matches!(tokens.last(), Some(Token::Comma)) && idx < lines.len() {
            let (next_no, next_offset, next) = lines[idx];
            idx += 1;
            tokens.extend(lex_line(next, next_offset).map_err(|m| syntax(next_no, m))?);
        }

        entries.push(build_entry(line_no, &tokens)?);
    }

    Ok(entries)
}

/// Interprets the tokens of one declaration.
fn build_entry(line: usize, tokens: &[Token]) -> Result<ManifestEntry> {
    // tokens[0] is `mod`; an opening parenthesis may follow
    let name = tokens
        .iter()
        .skip(1)
        .find(|t| !matches!(t, Token::Other))
        .and_then(|t| match t {
            Token::Str { value, .. } => Some(value.clone()),
            _ => None,
        })
        .ok_or_else(|| ManifestError::Syntax {
            line,
            message: "mod declaration without a quoted module name".to_string(),
        })?;

    let mut entry = ManifestEntry {
        name,
        git: None,
        git_ref: None,
        line,
        ref_span: None,
    };
    let mut branch_option = None;

    let mut i = 1;
    while i < tokens.len() {
        let (key, value_at) = match (&tokens[i], tokens.get(i + 1)) {
            (Token::Symbol(k), Some(Token::Arrow)) => (k.as_str(), i + 2),
            (Token::Key(k), _) => (k.as_str(), i + 1),
            _ => {
                i += 1;
                continue;
            }
        };
        let value = match tokens.get(value_at) {
            Some(Token::Str { value, span }) => Some((value.clone(), span.clone())),
            _ => None,
        };
        match (key, value) {
            ("git", Some((v, _))) => entry.git = Some(v),
            ("ref", Some((v, span))) => {
                entry.git_ref = Some(v);
                entry.ref_span = Some(span);
            }
            ("branch", Some(found)) => branch_option = Some(found),
            _ => {}
        }
        i = value_at + 1;
    }

    // `:ref` wins over `:branch` when both are present
    if entry.ref_span.is_none()
        && let Some((v, span)) = branch_option
    {
        entry.git_ref = Some(v);
        entry.ref_span = Some(span);
    }

    Ok(entry)
}
