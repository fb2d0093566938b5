//! Host tokenizer for the HTML/XML around template constructs.
//!
//! It knows just enough markup to tell where a macro, a Latte comment or an
//! `n:` attribute begins; everything inside a macro or an `n:` attribute is
//! left to the layers registered with the [`TemplateLexer`](crate::lexer::TemplateLexer).
//!
//! All token boundaries fall on ASCII bytes, so every span is a valid `str` range.

use std::ops::Range;
use std::sync::Arc;

use crate::config::AttributeTokenization;
use crate::lexer::{HostTokenizer, LexContext, Tokenize};
use crate::macro_lexer::{macro_opening, opaque_run_end, Opening};
use crate::syntax_mode::SyntaxModeStack;
use crate::types::{SyntaxMode, Token, TokenKind};

const HTML_COMMENT_START: &[u8] = b"<!--";
const HTML_COMMENT_END: &str = "-->";
const SCRIPT_CLOSE_TAG: &[u8] = b"</script";
const STYLE_CLOSE_TAG: &[u8] = b"</style";

fn starts_with_ignore_ascii_case(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.len() >= needle.len() && haystack[..needle.len()].eq_ignore_ascii_case(needle)
}

fn is_tag_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b':' | b'.')
}

/// Characters that end an attribute name.
fn ends_attribute_name(b: u8) -> bool {
    b.is_ascii_whitespace() || matches!(b, b'=' | b'>' | b'/' | b'"' | b'\'' | b'<')
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Content,
    InTag { expect_value: bool },
    InQuotedValue(u8),
    /// `<script>` / `<style>` body up to the given close tag.
    RawText(&'static [u8]),
}

#[derive(Debug)]
pub struct MarkupTokenizer {
    text: Arc<str>,
    pos: usize,
    end: usize,
    state: State,
    /// Raw-text element whose start tag is being read.
    pending_raw: Option<&'static [u8]>,
    /// Close delimiter of the Latte comment being read.
    comment_close: Option<&'static str>,
    attributes: AttributeTokenization,
}

impl MarkupTokenizer {
    pub fn new(attributes: AttributeTokenization) -> Self {
        Self {
            text: Arc::from(""),
            pos: 0,
            end: 0,
            state: State::Content,
            pending_raw: None,
            comment_close: None,
            attributes,
        }
    }

    fn emit(&mut self, kind: TokenKind, end: usize) -> Option<Token> {
        debug_assert!(end > self.pos, "empty {kind:?} token at {}", self.pos);
        debug_assert!(self.text.is_char_boundary(end));
        let token = Token::new(kind, self.pos, end);
        self.pos = end;
        Some(token)
    }

    fn bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    fn opening_at(&self, pos: usize, mode: SyntaxMode) -> Option<Opening> {
        if pos >= self.end {
            return None;
        }
        macro_opening(&self.bytes()[..self.end], pos, mode)
    }

    /// Scan forward from `from` while `keep` holds, stopping at template openings.
    fn run_end(&self, from: usize, mode: SyntaxMode, keep: impl Fn(u8) -> bool) -> usize {
        let bytes = self.bytes();
        let mut i = from;
        while i < self.end && keep(bytes[i]) {
            if bytes[i] == b'{' && self.opening_at(i, mode).is_some() {
                break;
            }
            i += 1;
        }
        i
    }

    fn whitespace_end(&self, from: usize) -> usize {
        let bytes = self.bytes();
        let mut i = from;
        while i < self.end && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        i
    }

    fn template_opening(&mut self, opening: Opening) -> Option<Token> {
        match opening {
            Opening::Macro { width } => self.emit(TokenKind::MacroStart, self.pos + width),
            Opening::Comment { width } => {
                self.comment_close = Some(if width == 2 { "*}}" } else { "*}" });
                self.emit(TokenKind::CommentStart, self.pos + width + 1)
            }
        }
    }

    fn comment_token(&mut self, close: &'static str) -> Option<Token> {
        if self.text[self.pos..self.end].starts_with(close) {
            self.comment_close = None;
            return self.emit(TokenKind::CommentEnd, self.pos + close.len());
        }
        match self.text[self.pos..self.end].find(close) {
            Some(rel) => self.emit(TokenKind::CommentContent, self.pos + rel),
            None => {
                self.comment_close = None;
                self.emit(TokenKind::CommentContent, self.end)
            }
        }
    }

    fn content_token(&mut self, mode: SyntaxMode) -> Option<Token> {
        let text = Arc::clone(&self.text);
        let bytes = text.as_bytes();
        let rest = &bytes[self.pos..self.end];

        if rest.starts_with(HTML_COMMENT_START) {
            let body = self.pos + HTML_COMMENT_START.len();
            let end = self.text[body..self.end]
                .find(HTML_COMMENT_END)
                .map_or(self.end, |rel| body + rel + HTML_COMMENT_END.len());
            return self.emit(TokenKind::HtmlComment, end);
        }
        if rest.starts_with(b"<!") || rest.starts_with(b"<?") {
            let end = self.text[self.pos..self.end]
                .find('>')
                .map_or(self.end, |rel| self.pos + rel + 1);
            return self.emit(TokenKind::MarkupDeclaration, end);
        }
        if rest.starts_with(b"</") && rest.get(2).is_some_and(u8::is_ascii_alphabetic) {
            let name_end = self.run_end(self.pos + 2, mode, is_tag_name_char);
            self.state = State::InTag {
                expect_value: false,
            };
            return self.emit(TokenKind::EndTagOpen, name_end);
        }
        if rest.starts_with(b"<") && rest.get(1).is_some_and(u8::is_ascii_alphabetic) {
            let name_end = self.run_end(self.pos + 1, mode, is_tag_name_char);
            let name = &bytes[self.pos + 1..name_end];
            self.pending_raw = if name.eq_ignore_ascii_case(b"script") {
                Some(SCRIPT_CLOSE_TAG)
            } else if name.eq_ignore_ascii_case(b"style") {
                Some(STYLE_CLOSE_TAG)
            } else {
                None
            };
            self.state = State::InTag {
                expect_value: false,
            };
            return self.emit(TokenKind::TagOpen, name_end);
        }

        // Text up to the next tag, declaration or template opening.
        let mut i = self.pos + 1;
        while i < self.end {
            let b = bytes[i];
            let starts_markup = bytes
                .get(i + 1)
                .is_some_and(|&n| n.is_ascii_alphabetic() || matches!(n, b'/' | b'!' | b'?'));
            if b == b'<' && starts_markup {
                break;
            }
            if b == b'{' && self.opening_at(i, mode).is_some() {
                break;
            }
            i += 1;
        }
        let kind = if bytes[self.pos..i].iter().all(u8::is_ascii_whitespace) {
            TokenKind::Whitespace
        } else {
            TokenKind::Text
        };
        self.emit(kind, i)
    }

    fn raw_text_token(&mut self, close_tag: &'static [u8], mode: SyntaxMode) -> Option<Token> {
        let text = Arc::clone(&self.text);
        let bytes = text.as_bytes();
        let mut i = self.pos;
        while i < self.end {
            if bytes[i] == b'<' && starts_with_ignore_ascii_case(&bytes[i..self.end], close_tag) {
                break;
            }
            if bytes[i] == b'{' && self.opening_at(i, mode).is_some() {
                break;
            }
            i += 1;
        }
        if i == self.pos {
            // At the close tag: the end tag itself is ordinary markup.
            self.state = State::Content;
            return self.content_token(mode);
        }
        self.emit(TokenKind::Text, i)
    }

    fn tag_token(&mut self, expect_value: bool, mode: SyntaxMode) -> Option<Token> {
        let text = Arc::clone(&self.text);
        let bytes = text.as_bytes();
        let b = bytes[self.pos];

        if b.is_ascii_whitespace() {
            let end = self.whitespace_end(self.pos);
            return self.emit(TokenKind::Whitespace, end);
        }
        if b == b'>' || bytes[self.pos..self.end].starts_with(b"/>") {
            let width = if b == b'>' { 1 } else { 2 };
            self.state = match self.pending_raw.take() {
                Some(close_tag) if width == 1 => State::RawText(close_tag),
                _ => State::Content,
            };
            return self.emit(TokenKind::TagEnd, self.pos + width);
        }
        if b == b'=' {
            self.state = State::InTag { expect_value: true };
            return self.emit(TokenKind::MarkupEquals, self.pos + 1);
        }
        if expect_value {
            self.state = State::InTag {
                expect_value: false,
            };
            if b == b'"' || b == b'\'' {
                self.state = State::InQuotedValue(b);
                return self.emit(TokenKind::MarkupQuote, self.pos + 1);
            }
            let end = self.run_end(self.pos, mode, |c| !c.is_ascii_whitespace() && c != b'>');
            if end > self.pos {
                return self.emit(TokenKind::MarkupAttributeValue, end);
            }
        }
        if ends_attribute_name(b) {
            return self.emit(TokenKind::BadCharacter, self.pos + 1);
        }

        let name_end = self.run_end(self.pos, mode, |c| !ends_attribute_name(c));
        let name_end = name_end.max(self.pos + 1);
        if self.attributes == AttributeTokenization::Layered
            && bytes[self.pos..name_end].starts_with(b"n:")
        {
            let end = self.n_attribute_end(name_end);
            return self.emit(TokenKind::NAttribute, end);
        }
        self.emit(TokenKind::MarkupAttributeName, self.char_end(name_end))
    }

    /// Widen a byte position to the end of the character it falls in.
    fn char_end(&self, mut pos: usize) -> usize {
        while pos < self.end && !self.text.is_char_boundary(pos) {
            pos += 1;
        }
        pos
    }

    /// End of an `n:` attribute: name, optional `= value`, quotes included.
    fn n_attribute_end(&self, name_end: usize) -> usize {
        let bytes = self.bytes();
        let after_ws = self.whitespace_end(name_end);
        if after_ws >= self.end || bytes[after_ws] != b'=' {
            return name_end;
        }
        let value = self.whitespace_end(after_ws + 1);
        if value >= self.end {
            return value;
        }
        match bytes[value] {
            q @ (b'"' | b'\'') => bytes[value + 1..self.end]
                .iter()
                .position(|&c| c == q)
                .map_or(self.end, |rel| value + 1 + rel + 1),
            _ => {
                let mut i = value;
                while i < self.end && !bytes[i].is_ascii_whitespace() && bytes[i] != b'>' {
                    i += 1;
                }
                i
            }
        }
    }

    fn quoted_value_token(&mut self, quote: u8, mode: SyntaxMode) -> Option<Token> {
        if self.bytes()[self.pos] == quote {
            self.state = State::InTag {
                expect_value: false,
            };
            return self.emit(TokenKind::MarkupQuote, self.pos + 1);
        }
        let end = self.run_end(self.pos, mode, |c| c != quote);
        self.emit(TokenKind::MarkupAttributeValue, end)
    }
}

impl Tokenize for MarkupTokenizer {
    fn start(&mut self, text: Arc<str>, range: Range<usize>, _modes: &SyntaxModeStack) {
        self.text = text;
        self.pos = range.start;
        self.end = range.end;
        self.state = State::Content;
        self.pending_raw = None;
        self.comment_close = None;
    }

    fn next_token(&mut self, ctx: &mut LexContext<'_>) -> Option<Token> {
        if self.pos >= self.end {
            return None;
        }
        if let Some(close) = self.comment_close {
            return self.comment_token(close);
        }

        let mode = ctx.modes.current();
        if let Some(opening) = self.opening_at(self.pos, mode) {
            return self.template_opening(opening);
        }
        if mode == SyntaxMode::Off {
            let end = opaque_run_end(&self.text, self.pos, self.end);
            return self.emit(TokenKind::MacroContent, end);
        }

        match self.state {
            State::Content => self.content_token(mode),
            State::RawText(close_tag) => self.raw_text_token(close_tag, mode),
            State::InTag { expect_value } => self.tag_token(expect_value, mode),
            State::InQuotedValue(quote) => self.quoted_value_token(quote, mode),
        }
    }
}

impl HostTokenizer for MarkupTokenizer {
    fn resume_at(&mut self, offset: usize) {
        debug_assert!(offset >= self.pos);
        self.pos = offset.min(self.end);
    }

    fn splits_attributes(&self) -> bool {
        true
    }
}
