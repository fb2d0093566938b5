//! Tokenizer for one `n:` attribute inside a markup tag.
//!
//! The host hands over the span of its `NAttribute` token. The layer walks
//! INITIAL → AFTER_NAME → IN_VALUE → AFTER_VALUE once and then returns
//! `None`; the driver restarts it at INITIAL if text is left in the window.

use std::ops::Range;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;

use crate::lexer::{LexContext, Tokenize};
use crate::syntax_mode::SyntaxModeStack;
use crate::types::{Token, TokenKind};

static RE_ATTRIBUTE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^n:[a-zA-Z0-9_:.\-]+").unwrap());

/// The attribute that switches syntax modes.
pub const SYNTAX_ATTRIBUTE: &str = "n:syntax";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    AfterName,
    InValue,
    AfterValue,
}

#[derive(Debug)]
pub struct AttributeTokenizer {
    text: Arc<str>,
    pos: usize,
    end: usize,
    state: State,
    switches_syntax: bool,
}

impl Default for AttributeTokenizer {
    fn default() -> Self {
        Self {
            text: Arc::from(""),
            pos: 0,
            end: 0,
            state: State::AfterValue,
            switches_syntax: false,
        }
    }
}

fn whitespace_end(bytes: &[u8], from: usize, end: usize) -> usize {
    let mut i = from;
    while i < end && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn non_whitespace_end(bytes: &[u8], from: usize, end: usize) -> usize {
    let mut i = from;
    while i < end && !bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

/// Strip one pair of matching quotes and surrounding whitespace.
pub fn attribute_value_text(raw: &str) -> &str {
    let raw = raw.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|q| raw.strip_prefix(*q).and_then(|r| r.strip_suffix(*q)));
    unquoted.unwrap_or(raw).trim()
}

impl AttributeTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Where the next token would start.
    pub fn offset(&self) -> usize {
        self.pos
    }

    fn emit(&mut self, kind: TokenKind, end: usize) -> Option<Token> {
        debug_assert!(end > self.pos, "empty {kind:?} token at {}", self.pos);
        let token = Token::new(kind, self.pos, end);
        self.pos = end;
        Some(token)
    }

    fn initial(&mut self, ctx: &LexContext<'_>) -> Option<Token> {
        let text = Arc::clone(&self.text);
        let window = &text[self.pos..self.end];
        match RE_ATTRIBUTE_NAME.find(window) {
            Some(m) => {
                let name = m.as_str();
                let end = self.pos + m.end();
                self.state = State::AfterName;
                if ctx.names.is_valid_attribute(name) {
                    self.switches_syntax = name == SYNTAX_ATTRIBUTE;
                    self.emit(TokenKind::AttributeName, end)
                } else {
                    self.switches_syntax = false;
                    self.emit(TokenKind::ErrorInvalidAttributeSyntax, end)
                }
            }
            None => {
                let end = non_whitespace_end(text.as_bytes(), self.pos, self.end);
                self.emit(TokenKind::ErrorInvalidAttributeSyntax, end)
            }
        }
    }

    fn value(&mut self, ctx: &mut LexContext<'_>) -> Option<Token> {
        let text = Arc::clone(&self.text);
        let bytes = text.as_bytes();
        self.state = State::AfterValue;
        let quote = bytes[self.pos];
        let (kind, end) = if quote == b'"' || quote == b'\'' {
            match bytes[self.pos + 1..self.end].iter().position(|&b| b == quote) {
                Some(rel) => (TokenKind::AttributeValue, self.pos + 1 + rel + 1),
                None => (TokenKind::ErrorUnclosedAttributeQuotes, self.end),
            }
        } else {
            (
                TokenKind::AttributeValue,
                non_whitespace_end(bytes, self.pos, self.end),
            )
        };
        if self.switches_syntax && kind == TokenKind::AttributeValue {
            ctx.modes.set_mode(attribute_value_text(&text[self.pos..end]));
        }
        self.emit(kind, end)
    }
}

impl Tokenize for AttributeTokenizer {
    fn start(&mut self, text: Arc<str>, range: Range<usize>, _modes: &SyntaxModeStack) {
        self.text = text;
        self.pos = range.start;
        self.end = range.end;
        self.state = State::Initial;
        self.switches_syntax = false;
    }

    fn next_token(&mut self, ctx: &mut LexContext<'_>) -> Option<Token> {
        if self.pos >= self.end || self.state == State::AfterValue {
            return None;
        }
        let text = Arc::clone(&self.text);
        let bytes = text.as_bytes();
        if bytes[self.pos].is_ascii_whitespace() {
            let end = whitespace_end(bytes, self.pos, self.end);
            return self.emit(TokenKind::Whitespace, end);
        }
        match self.state {
            State::Initial => self.initial(ctx),
            State::AfterName => {
                if bytes[self.pos] == b'=' {
                    self.state = State::InValue;
                    self.emit(TokenKind::AttributeStart, self.pos + 1)
                } else {
                    self.state = State::AfterValue;
                    self.emit(TokenKind::ErrorInvalidAttributeSyntax, self.end)
                }
            }
            State::InValue => self.value(ctx),
            State::AfterValue => None,
        }
    }
}
