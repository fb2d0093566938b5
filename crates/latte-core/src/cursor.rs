//! What the cursor is sitting in, for completion providers.

use crate::macro_lexer::is_ident_char;
use crate::types::{CursorContext, Token, TokenKind};

/// How far back [`classify_window`] looks for an opening brace or bracket.
const WINDOW: usize = 512;

/// Classify `offset` using a token stream covering the text.
///
/// The token that ends at or contains the character before the cursor decides.
pub fn classify(tokens: &[Token], offset: usize) -> CursorContext {
    if offset == 0 {
        return CursorContext::PlainText;
    }
    let index = tokens.partition_point(|t| t.span.end < offset);
    let Some(token) = tokens.get(index).filter(|t| t.span.start < offset) else {
        return CursorContext::PlainText;
    };
    match token.kind {
        TokenKind::MacroStart | TokenKind::MacroName | TokenKind::ErrorInvalidMacroName => {
            CursorContext::MacroName
        }
        TokenKind::FilterPipe | TokenKind::FilterName | TokenKind::ErrorUnknownFilter => {
            CursorContext::FilterName
        }
        // A pipe with no filter name yet.
        TokenKind::ErrorInvalidFilterSyntax if offset == token.span.start + 1 => {
            CursorContext::FilterName
        }
        TokenKind::MacroContent | TokenKind::ErrorInvalidFilterSyntax => CursorContext::MacroContent,
        TokenKind::AttributeName | TokenKind::ErrorInvalidAttributeSyntax => {
            CursorContext::AttributeName
        }
        TokenKind::AttributeStart
        | TokenKind::AttributeValue
        | TokenKind::ErrorUnclosedAttributeQuotes => CursorContext::AttributeValue,
        _ => CursorContext::PlainText,
    }
}

/// Classify `offset` from the raw text alone, looking at most a few hundred
/// bytes back. Meant for keystroke-time queries where no fresh token stream
/// exists; it ignores syntax modes.
pub fn classify_window(text: &str, offset: usize) -> CursorContext {
    let mut offset = offset.min(text.len());
    while !text.is_char_boundary(offset) {
        offset -= 1;
    }
    let mut from = offset.saturating_sub(WINDOW);
    while !text.is_char_boundary(from) {
        from += 1;
    }
    let window = &text[from..offset];
    let bytes = window.as_bytes();

    let open = bytes.iter().rposition(|&b| b == b'{');
    let close = bytes.iter().rposition(|&b| b == b'}');
    if let Some(open) = open.filter(|&o| close.map_or(true, |c| c < o)) {
        let inner = &window[open + 1..];
        if !inner.starts_with(char::is_whitespace) {
            return macro_context(inner);
        }
    }

    let lt = bytes.iter().rposition(|&b| b == b'<');
    let gt = bytes.iter().rposition(|&b| b == b'>');
    match lt.filter(|&l| gt.map_or(true, |g| g < l)) {
        Some(lt) => tag_context(&window[lt + 1..]),
        None => CursorContext::PlainText,
    }
}

fn is_identifier(s: &str) -> bool {
    s.bytes().all(is_ident_char)
}

fn macro_context(inner: &str) -> CursorContext {
    let bytes = inner.as_bytes();
    let mut last_pipe = None;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'|' {
            if bytes.get(i + 1) == Some(&b'|') {
                i += 2;
                continue;
            }
            last_pipe = Some(i);
        }
        i += 1;
    }
    if let Some(pipe) = last_pipe {
        if is_identifier(inner[pipe + 1..].trim_start()) {
            return CursorContext::FilterName;
        }
        return CursorContext::MacroContent;
    }
    let name = inner
        .strip_prefix('/')
        .or_else(|| inner.strip_prefix('='))
        .unwrap_or(inner);
    if is_identifier(name) {
        CursorContext::MacroName
    } else {
        CursorContext::MacroContent
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagState {
    TagName,
    Between,
    Name,
    AfterName,
    AfterEquals,
    Quoted(u8),
    Unquoted,
}

fn tag_context(inside: &str) -> CursorContext {
    if inside.starts_with(['/', '!', '?']) {
        return CursorContext::PlainText;
    }
    let bytes = inside.as_bytes();
    let mut state = TagState::TagName;
    let mut name_start = 0;
    let mut name_end = 0;
    for (i, &b) in bytes.iter().enumerate() {
        state = match state {
            TagState::TagName if b.is_ascii_whitespace() => TagState::Between,
            TagState::TagName => TagState::TagName,
            TagState::Between | TagState::AfterName if b.is_ascii_whitespace() => state,
            TagState::AfterName if b == b'=' => TagState::AfterEquals,
            TagState::Between | TagState::AfterName => {
                name_start = i;
                TagState::Name
            }
            TagState::Name if b.is_ascii_whitespace() => {
                name_end = i;
                TagState::AfterName
            }
            TagState::Name if b == b'=' => {
                name_end = i;
                TagState::AfterEquals
            }
            TagState::Name => TagState::Name,
            TagState::AfterEquals if b.is_ascii_whitespace() => TagState::AfterEquals,
            TagState::AfterEquals if b == b'"' || b == b'\'' => TagState::Quoted(b),
            TagState::AfterEquals => TagState::Unquoted,
            TagState::Quoted(q) if b == q => TagState::Between,
            TagState::Quoted(q) => TagState::Quoted(q),
            TagState::Unquoted if b.is_ascii_whitespace() => TagState::Between,
            TagState::Unquoted => TagState::Unquoted,
        };
    }
    let is_n_attribute = |end: usize| inside[name_start..end].starts_with("n:");
    match state {
        TagState::Name if is_n_attribute(inside.len()) => CursorContext::AttributeName,
        TagState::AfterEquals | TagState::Quoted(_) | TagState::Unquoted if is_n_attribute(name_end) => {
            CursorContext::AttributeValue
        }
        _ => CursorContext::PlainText,
    }
}
