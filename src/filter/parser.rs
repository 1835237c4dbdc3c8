//! Hand-written recursive-descent parser for the compact filter query
//! syntax used by `GET /sln/query?q=...`. Grammar, loosest to tightest
//! binding:
//!
//! ```text
//! or-expr   := and-expr ( "|" and-expr )*
//! and-expr  := unary ( "&" unary )*
//! unary     := "!" unary | atom
//! atom      := "(" or-expr ")"
//!            | "" (empty input)
//!            | "*"
//!            | "all"
//!            | "meta-file"
//!            | "type=" value
//!            | "links-to=" value
//!            | "linked-from=" value
//!            | "badge:" field "=" value
//!            | field "=" value
//! value     := bare-word | '"' ... '"'
//! ```
//!
//! Bare words run until whitespace or a syntax character; quoted values
//! may contain any of those verbatim. An empty query and the literal `*`
//! both compile to `Filter::All`; a bare `field=value` term (no
//! recognized prefix) is shorthand for `badge:field=value`.

use crate::error::{SlnError, SlnResult};

use super::tree::Filter;

pub fn parse(input: &str) -> SlnResult<Filter> {
    if input.trim().is_empty() {
        return Ok(Filter::All);
    }
    let mut p = Parser {
        chars: input.chars().collect(),
        pos: 0,
    };
    let filter = p.or_expr()?;
    p.skip_ws();
    if p.pos != p.chars.len() {
        return Err(SlnError::Einval(format!(
            "unexpected trailing input at offset {} in filter query",
            p.pos
        )));
    }
    Ok(filter)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn or_expr(&mut self) -> SlnResult<Filter> {
        let mut terms = vec![self.and_expr()?];
        while self.eat('|') {
            terms.push(self.and_expr()?);
        }
        Ok(if terms.len() == 1 {
            terms.pop().unwrap()
        } else {
            Filter::or(terms)
        })
    }

    fn and_expr(&mut self) -> SlnResult<Filter> {
        let mut terms = vec![self.unary()?];
        while self.eat('&') {
            terms.push(self.unary()?);
        }
        Ok(if terms.len() == 1 {
            terms.pop().unwrap()
        } else {
            Filter::and(terms)
        })
    }

    fn unary(&mut self) -> SlnResult<Filter> {
        self.skip_ws();
        if self.eat('!') {
            return Ok(Filter::not(self.unary()?));
        }
        self.atom()
    }

    fn atom(&mut self) -> SlnResult<Filter> {
        self.skip_ws();
        if self.eat('(') {
            let inner = self.or_expr()?;
            if !self.eat(')') {
                return Err(SlnError::Einval("unbalanced parentheses in filter query".into()));
            }
            return Ok(inner);
        }

        let word = self.bare_word()?;
        if word == "all" || word == "*" {
            return Ok(Filter::All);
        }
        if word == "meta-file" {
            return Ok(Filter::MetaFile);
        }
        if let Some(rest) = word.strip_prefix("type=") {
            return Ok(Filter::FileType(self.unescape(rest)));
        }
        if let Some(rest) = word.strip_prefix("links-to=") {
            return Ok(Filter::LinksTo(self.unescape(rest)));
        }
        if let Some(rest) = word.strip_prefix("linked-from=") {
            return Ok(Filter::LinkedFrom(self.unescape(rest)));
        }
        if let Some(rest) = word.strip_prefix("badge:") {
            let (field, value) = rest
                .split_once('=')
                .ok_or_else(|| SlnError::Einval(format!("malformed badge term: {word}")))?;
            return Ok(Filter::Badge {
                field: self.unescape(field),
                value: self.unescape(value),
            });
        }
        // A bare `field=value` term with none of the recognized prefixes
        // is shorthand for a badge lookup.
        if let Some((field, value)) = word.split_once('=') {
            return Ok(Filter::Badge {
                field: self.unescape(field),
                value: self.unescape(value),
            });
        }
        Err(SlnError::Einval(format!("unrecognized filter term: {word}")))
    }

    /// Reads one token: either a quoted string (returned with its
    /// recognized prefix still attached so `atom` can match on it) or a
    /// run of non-syntax characters.
    fn bare_word(&mut self) -> SlnResult<String> {
        self.skip_ws();
        let start = self.pos;
        let mut out = String::new();
        while let Some(c) = self.peek() {
            if c == '"' {
                out.push(c);
                self.pos += 1;
                while let Some(c) = self.peek() {
                    out.push(c);
                    self.pos += 1;
                    if c == '"' {
                        break;
                    }
                }
                continue;
            }
            if c.is_whitespace() || c == '(' || c == ')' || c == '&' || c == '|' || c == '!' {
                break;
            }
            out.push(c);
            self.pos += 1;
        }
        if out.is_empty() {
            return Err(SlnError::Einval(format!("expected a filter term at offset {start}")));
        }
        Ok(out)
    }

    fn unescape(&self, s: &str) -> String {
        s.trim_matches('"').to_string()
    }
}
