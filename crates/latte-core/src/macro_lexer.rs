//! Tokenizer for the inside of one `{…}` macro.
//!
//! The host emits `MacroStart` for the opening delimiter; this layer takes
//! over right after it and stops itself once it has produced `MacroEnd`.

use std::ops::Range;
use std::sync::Arc;

use crate::lexer::{LexContext, Tokenize};
use crate::syntax_mode::SyntaxModeStack;
use crate::types::{SyntaxMode, Token, TokenKind};

/// Ends a syntax scope in every mode, including `off`.
pub const SYNTAX_END: &str = "{/syntax}";

/// What a `{` at some offset opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opening {
    /// `width` is the length of the opening delimiter.
    Macro { width: usize },
    /// `{*` or `{{*`.
    Comment { width: usize },
}

/// Decide whether `bytes[pos]` starts a macro or a Latte comment in `mode`.
///
/// A `{` followed by whitespace or `}` is literal text (JavaScript, CSS).
pub fn macro_opening(bytes: &[u8], pos: usize, mode: SyntaxMode) -> Option<Opening> {
    if bytes.get(pos) != Some(&b'{') {
        return None;
    }
    if bytes[pos..].starts_with(SYNTAX_END.as_bytes()) {
        return Some(Opening::Macro { width: 1 });
    }
    let width = match mode {
        SyntaxMode::Off => return None,
        SyntaxMode::Default => 1,
        SyntaxMode::Double => {
            if bytes.get(pos + 1) != Some(&b'{') {
                return None;
            }
            2
        }
    };
    match bytes.get(pos + width) {
        Some(b'*') => Some(Opening::Comment { width }),
        Some(&b) if !b.is_ascii_whitespace() && b != b'}' => Some(Opening::Macro { width }),
        _ => None,
    }
}

/// End of an opaque `syntax off` run starting at `from`: the next `{/syntax}` or `end`.
pub fn opaque_run_end(text: &str, from: usize, end: usize) -> usize {
    text[from..end]
        .find(SYNTAX_END)
        .map_or(end, |rel| from + rel)
}

/// Closing delimiter for a macro opened with `width` braces.
pub fn closing_delimiter(width: usize) -> &'static [u8] {
    if width == 2 {
        b"}}"
    } else {
        b"}"
    }
}

pub(crate) fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

pub(crate) fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// End of the identifier starting at `pos`, if there is one.
pub(crate) fn ident_end(bytes: &[u8], pos: usize, end: usize) -> Option<usize> {
    if pos >= end || !is_ident_start(bytes[pos]) {
        return None;
    }
    let mut i = pos + 1;
    while i < end && is_ident_char(bytes[i]) {
        i += 1;
    }
    Some(i)
}

/// An identifier directly followed by one of these is an expression (`{foo()}`, `{Foo::bar}`).
fn continues_expression(bytes: &[u8], pos: usize, end: usize) -> bool {
    let rest = &bytes[pos..end];
    rest.starts_with(b"(")
        || rest.starts_with(b"::")
        || rest.starts_with(b"->")
        || rest.starts_with(b"\\")
}

/// Position just past a quoted string starting at `pos`, if it closes before
/// a newline and before `end`. Backslash escapes are honored.
pub(crate) fn skip_quoted(bytes: &[u8], pos: usize, end: usize) -> Option<usize> {
    let quote = bytes[pos];
    let mut i = pos + 1;
    while i < end {
        match bytes[i] {
            b'\\' => i += 2,
            b'\n' => return None,
            b if b == quote => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Name part of a macro body (the text between the delimiters).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroHead<'a> {
    pub closing: bool,
    /// Empty for print tags and `{/}`.
    pub name: &'a str,
    /// Everything after the name, untrimmed.
    pub rest: &'a str,
}

/// Split a macro body into its name and arguments using the same name rules
/// as [`MacroTokenizer`].
pub fn split_macro_head(body: &str) -> MacroHead<'_> {
    let bytes = body.as_bytes();
    let end = bytes.len();
    let mut pos = 0;
    while pos < end && bytes[pos].is_ascii_whitespace() {
        pos += 1;
    }
    let closing = bytes.get(pos) == Some(&b'/');
    let name_start = if closing { pos + 1 } else { pos };
    if !closing && bytes.get(pos) == Some(&b'=') {
        return MacroHead {
            closing,
            name: "=",
            rest: &body[pos + 1..],
        };
    }
    match ident_end(bytes, name_start, end) {
        Some(name_end) if closing || !continues_expression(bytes, name_end, end) => MacroHead {
            closing,
            name: &body[name_start..name_end],
            rest: &body[name_end..],
        },
        _ if closing => MacroHead {
            closing,
            name: "",
            rest: &body[name_start..],
        },
        _ => MacroHead {
            closing,
            name: "",
            rest: body,
        },
    }
}

/// Tokenizes a macro from just after its opening delimiter.
#[derive(Debug)]
pub struct MacroTokenizer {
    text: Arc<str>,
    pos: usize,
    end: usize,
    close: &'static [u8],
    opaque: bool,
    at_name: bool,
    after_pipe: bool,
    done: bool,
}

impl Default for MacroTokenizer {
    fn default() -> Self {
        Self {
            text: Arc::from(""),
            pos: 0,
            end: 0,
            close: b"}",
            opaque: false,
            at_name: true,
            after_pipe: false,
            done: true,
        }
    }
}

impl MacroTokenizer {
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

    fn at_close(&self, pos: usize) -> bool {
        self.text.as_bytes()[pos..self.end].starts_with(self.close)
    }

    /// `|` that is not part of `||`.
    fn is_pipe(&self, pos: usize) -> bool {
        let bytes = self.text.as_bytes();
        bytes[pos] == b'|'
            && bytes.get(pos + 1) != Some(&b'|')
            && (pos == 0 || bytes[pos - 1] != b'|')
    }

    /// End of a content run: the next pipe or end delimiter, quotes skipped.
    fn content_end(&self, from: usize) -> usize {
        let bytes = self.text.as_bytes();
        let mut i = from;
        while i < self.end {
            match bytes[i] {
                b'\'' | b'"' => i = skip_quoted(bytes, i, self.end).unwrap_or(i + 1),
                b'|' if self.is_pipe(i) && i > from => return i,
                _ if self.at_close(i) => return i,
                _ => i += 1,
            }
        }
        self.end
    }

    fn filter_token(&mut self, ctx: &LexContext<'_>) -> Option<Token> {
        let bytes = self.text.as_bytes();
        self.after_pipe = false;
        match ident_end(bytes, self.pos, self.end) {
            Some(name_end) => {
                let name = &self.text[self.pos..name_end];
                let kind = if ctx.names.is_valid_filter(name) {
                    TokenKind::FilterName
                } else {
                    TokenKind::ErrorUnknownFilter
                };
                self.emit(kind, name_end)
            }
            None => {
                let end = self.content_end(self.pos);
                self.emit(TokenKind::ErrorInvalidFilterSyntax, end.max(self.pos + 1))
            }
        }
    }

    fn name_token(&mut self, ctx: &LexContext<'_>) -> Option<Token> {
        let bytes = self.text.as_bytes();
        let closing = bytes[self.pos] == b'/';
        let name_start = if closing { self.pos + 1 } else { self.pos };
        let name_end = ident_end(bytes, name_start, self.end)?;
        if !closing && continues_expression(bytes, name_end, self.end) {
            return None;
        }
        let kind = if ctx.names.is_valid_macro(&self.text[name_start..name_end]) {
            TokenKind::MacroName
        } else {
            TokenKind::ErrorInvalidMacroName
        };
        self.emit(kind, name_end)
    }
}

impl Tokenize for MacroTokenizer {
    fn start(&mut self, text: Arc<str>, range: Range<usize>, modes: &SyntaxModeStack) {
        let bytes = text.as_bytes();
        let double_opening = range.start >= 2 && &bytes[range.start - 2..range.start] == b"{{";
        let width = if modes.current() == SyntaxMode::Double && double_opening {
            2
        } else {
            1
        };
        let literal_syntax_end =
            range.start >= 1 && bytes[range.start - 1..].starts_with(SYNTAX_END.as_bytes());
        self.opaque = modes.current() == SyntaxMode::Off && !literal_syntax_end;
        self.close = closing_delimiter(width);
        self.pos = range.start;
        self.end = range.end;
        self.text = text;
        self.at_name = true;
        self.after_pipe = false;
        self.done = false;
    }

    fn next_token(&mut self, ctx: &mut LexContext<'_>) -> Option<Token> {
        if self.done || self.pos >= self.end {
            return None;
        }
        if self.opaque {
            self.done = true;
            let end = opaque_run_end(&self.text, self.pos, self.end);
            if end == self.pos {
                return None;
            }
            return self.emit(TokenKind::MacroContent, end);
        }
        if self.at_close(self.pos) {
            self.done = true;
            let end = self.pos + self.close.len();
            return self.emit(TokenKind::MacroEnd, end);
        }

        let text = Arc::clone(&self.text);
        let bytes = text.as_bytes();
        if bytes[self.pos].is_ascii_whitespace() {
            let mut end = self.pos + 1;
            while end < self.end && bytes[end].is_ascii_whitespace() {
                end += 1;
            }
            return self.emit(TokenKind::MacroContent, end);
        }

        if self.after_pipe {
            return self.filter_token(ctx);
        }

        if self.at_name {
            self.at_name = false;
            if bytes[self.pos] == b'=' {
                let kind = if ctx.names.is_valid_macro("=") {
                    TokenKind::MacroName
                } else {
                    TokenKind::ErrorInvalidMacroName
                };
                return self.emit(kind, self.pos + 1);
            }
            if let Some(token) = self.name_token(ctx) {
                return Some(token);
            }
        }

        if self.is_pipe(self.pos) {
            let mut look = self.pos + 1;
            while look < self.end && bytes[look].is_ascii_whitespace() {
                look += 1;
            }
            if ident_end(bytes, look, self.end).is_some() {
                self.after_pipe = true;
                return self.emit(TokenKind::FilterPipe, self.pos + 1);
            }
            let end = self.content_end(self.pos + 1);
            return self.emit(TokenKind::ErrorInvalidFilterSyntax, end);
        }

        let end = self.content_end(self.pos);
        self.emit(TokenKind::MacroContent, end.max(self.pos + 1))
    }
}
