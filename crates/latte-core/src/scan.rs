//! Raw text scans that widen an edited region to whole macro constructs.
//!
//! These work on bytes, without the tokenizers: they have to stay cheap and
//! must not depend on a token stream that is about to be invalidated.

use crate::attribute_lexer::SYNTAX_ATTRIBUTE;
use crate::budget::{Budget, Interrupt};
use crate::error::ReparseError;
use crate::lexer::RE_INLINE_SYNTAX;
use crate::macro_lexer::{closing_delimiter, macro_opening, skip_quoted, Opening, SYNTAX_END};
use crate::names::ValidNames;
use crate::syntax_mode::SyntaxModeStack;
use crate::types::{MacroTag, Span, SyntaxMode};
use crate::validator::{macro_tag, pairing, NestingStack, Pairing};

fn find_bytes(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|rel| from + rel)
}

fn rfind_bytes(bytes: &[u8], before: usize, needle: &[u8]) -> Option<usize> {
    bytes[..before].windows(needle.len()).rposition(|w| w == needle)
}

// ---------------------------------------------------------------------------
// Backward scan
// ---------------------------------------------------------------------------

/// Offset of the construct an edit at `offset` may belong to.
///
/// Walks backwards skipping Latte comments and quoted strings, and stops at
/// the nearest `{syntax`/`{/syntax}` tag, `{{` or macro-opening `{`. Falls
/// back to 0 when nothing anchors the edit or the budget runs out.
pub fn expanded_start(text: &str, offset: usize, budget: &mut Budget) -> Result<usize, ReparseError> {
    let bytes = text.as_bytes();
    let mut i = offset.min(bytes.len());
    while i > 0 {
        match budget.tick() {
            Ok(()) => {}
            Err(Interrupt::Cancelled) => return Err(ReparseError::Cancelled),
            Err(Interrupt::Exhausted) => {
                tracing::debug!(offset, steps = budget.steps(), "backward scan exhausted, anchoring at 0");
                return Ok(0);
            }
        }
        i -= 1;
        match bytes[i] {
            b'}' if i > 0 && bytes[i - 1] == b'*' => {
                if let Some(open) = rfind_bytes(bytes, i - 1, b"{*") {
                    i = open;
                }
            }
            quote @ (b'\'' | b'"') => {
                let mut j = i;
                while j > 0 {
                    j -= 1;
                    if budget.tick().is_err() {
                        break;
                    }
                    match bytes[j] {
                        b'}' | b'\n' => break,
                        b if b == quote => {
                            i = j;
                            break;
                        }
                        _ => {}
                    }
                }
            }
            b'{' => {
                let rest = &bytes[i..];
                if rest.starts_with(b"{syntax") || rest.starts_with(SYNTAX_END.as_bytes()) {
                    return Ok(i);
                }
                if i > 0 && bytes[i - 1] == b'{' {
                    return Ok(i - 1);
                }
                if bytes
                    .get(i + 1)
                    .is_some_and(|&b| !b.is_ascii_whitespace() && b != b'}')
                {
                    return Ok(i);
                }
            }
            _ => {}
        }
    }
    Ok(0)
}

// ---------------------------------------------------------------------------
// Forward tag scan
// ---------------------------------------------------------------------------

/// Finds macro tags in raw text, tracking `{syntax}` tags and `n:syntax`
/// attributes on its own stack.
#[derive(Debug)]
pub struct TagScanner<'t> {
    text: &'t str,
    pos: usize,
    modes: SyntaxModeStack,
    last_switch: Option<usize>,
}

impl<'t> TagScanner<'t> {
    pub fn new(text: &'t str, from: usize) -> Self {
        Self::with_modes(text, from, SyntaxModeStack::new())
    }

    pub fn with_modes(text: &'t str, from: usize, modes: SyntaxModeStack) -> Self {
        Self {
            text,
            pos: from.min(text.len()),
            modes,
            last_switch: None,
        }
    }

    pub fn modes(&self) -> &SyntaxModeStack {
        &self.modes
    }

    /// Offset of the most recent mode switch the scan went through.
    pub fn last_switch(&self) -> Option<usize> {
        self.last_switch
    }

    pub fn next_tag(&mut self, budget: &mut Budget) -> Result<Option<MacroTag>, Interrupt> {
        let text = self.text;
        let bytes = text.as_bytes();
        let len = bytes.len();
        while self.pos < len {
            budget.tick()?;
            let mode = self.modes.current();
            if mode == SyntaxMode::Off {
                match find_bytes(bytes, self.pos, SYNTAX_END.as_bytes()) {
                    Some(at) => self.pos = at,
                    None => {
                        self.pos = len;
                        return Ok(None);
                    }
                }
            }
            if bytes[self.pos..].starts_with(b"<!--") {
                self.pos = find_bytes(bytes, self.pos + 4, b"-->").map_or(len, |at| at + 3);
                continue;
            }
            if let Some(width) = self.syntax_attribute() {
                self.pos += width;
                continue;
            }
            match macro_opening(bytes, self.pos, mode) {
                Some(Opening::Comment { width }) => {
                    let close: &[u8] = if width == 2 { b"*}}" } else { b"*}" };
                    self.pos = find_bytes(bytes, self.pos + width + 1, close)
                        .map_or(len, |at| at + close.len());
                }
                Some(Opening::Macro { width }) => return self.macro_at(width, budget).map(Some),
                None => self.pos += 1,
            }
        }
        Ok(None)
    }

    /// An `n:syntax="X"` attribute at the current offset: switch to `X` and
    /// return the attribute's width.
    fn syntax_attribute(&mut self) -> Option<usize> {
        let text = self.text;
        let at = self.pos;
        if !text.as_bytes()[at..].starts_with(SYNTAX_ATTRIBUTE.as_bytes())
            || !text.as_bytes()[..at].last().is_some_and(u8::is_ascii_whitespace)
        {
            return None;
        }
        let caps = RE_INLINE_SYNTAX.captures(&text[at..])?;
        let whole = caps.get(0).filter(|m| m.start() == 0)?;
        self.modes.set_mode(&caps[1]);
        self.last_switch = Some(at);
        Some(whole.end())
    }

    fn macro_at(&mut self, width: usize, budget: &mut Budget) -> Result<MacroTag, Interrupt> {
        let text = self.text;
        let bytes = text.as_bytes();
        let len = bytes.len();
        let start = self.pos;
        let close = closing_delimiter(width);
        let mut i = start + width;
        while i < len {
            budget.tick()?;
            match bytes[i] {
                b'\'' | b'"' => i = skip_quoted(bytes, i, len).unwrap_or(i + 1),
                _ if bytes[i..].starts_with(close) => break,
                _ => i += 1,
            }
        }
        let i = i.min(len);
        let terminated = i < len;
        let end = if terminated { i + close.len() } else { len };
        let tag = macro_tag(&text[start + width..i], Span::new(start, end), terminated);
        if tag.name == "syntax" {
            if tag.closing {
                self.modes.end_scope();
            } else {
                self.modes
                    .set_mode(tag.args.split_whitespace().next().unwrap_or(""));
                self.last_switch = Some(start);
            }
        }
        self.pos = end;
        Ok(tag)
    }
}

/// Offset where an edit covering `[start, end)` stops affecting nesting.
///
/// Walks tags forward from `start`. Block tags push, closing tags pop (a
/// close that matches a deeper entry pops down to it, unmatched closes are
/// ignored) and void tags are skipped; names outside the built-in catalog
/// count as void. The walk stops once the stack is empty past `end`. A stack
/// still open at end of text, or an exhausted budget, yields the text length.
///
/// A syntax switch inside `[start, end)` that is still in effect keeps the
/// walk going too: an `n:syntax` attribute has no closing tag, so the region
/// it changes ends at the `{/syntax}` that pops it or at end of text.
///
/// The scan starts in the default syntax unless `start` sits on `{{`, which
/// only anchors a backward scan in double syntax.
pub fn expanded_end(
    text: &str,
    start: usize,
    end: usize,
    names: &ValidNames,
    budget: &mut Budget,
) -> Result<usize, ReparseError> {
    let len = text.len();
    let end = end.min(len);
    let modes = if text.as_bytes().get(start..).is_some_and(|rest| rest.starts_with(b"{{")) {
        SyntaxModeStack::starting_in(SyntaxMode::Double)
    } else {
        SyntaxModeStack::new()
    };
    let base_depth = modes.depth();
    let mut scanner = TagScanner::with_modes(text, start, modes);
    let mut stack = NestingStack::new();
    let settled = |scanner: &TagScanner<'_>, stack: &NestingStack| {
        stack.is_empty()
            && (scanner.modes().depth() <= base_depth || scanner.last_switch().map_or(true, |at| at >= end))
    };
    loop {
        let settled_before = settled(&scanner, &stack);
        let tag = match scanner.next_tag(budget) {
            Ok(Some(tag)) => tag,
            Ok(None) => break,
            Err(Interrupt::Cancelled) => return Err(ReparseError::Cancelled),
            Err(Interrupt::Exhausted) => {
                tracing::debug!(start, end, steps = budget.steps(), "forward scan exhausted, extending to end of text");
                return Ok(len);
            }
        };
        if settled_before && settled(&scanner, &stack) && tag.span.start >= end {
            return Ok(end);
        }
        match pairing(&tag, names, false) {
            Pairing::Block => stack.push(&tag.name, tag.span.start),
            Pairing::Closing => {
                stack.close(&tag.name);
            }
            Pairing::Void | Pairing::Intermediate => {}
        }
        if settled(&scanner, &stack) && tag.span.end >= end {
            return Ok(tag.span.end);
        }
    }
    if settled(&scanner, &stack) {
        return Ok(end);
    }
    tracing::trace!(
        start,
        open = stack.len(),
        modes = scanner.modes().depth(),
        all_auto_closing = stack
            .entries()
            .iter()
            .all(|e| crate::catalogs::AUTO_CLOSING_MACROS.contains(e.name.as_str())),
        "blocks still open at end of text"
    );
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start_of(text: &str, offset: usize) -> usize {
        expanded_start(text, offset, &mut Budget::unlimited()).unwrap()
    }

    fn end_of(text: &str, start: usize, end: usize) -> usize {
        expanded_end(text, start, end, &ValidNames::default(), &mut Budget::unlimited()).unwrap()
    }

    const FOREACH: &str = "<div>{foreach $x as $y}A{/foreach}</div>";

    #[test]
    fn start_anchors_at_enclosing_macro() {
        assert_eq!(start_of(FOREACH, 23), 5);
        assert_eq!(start_of(FOREACH, 3), 0);
    }

    #[test]
    fn start_skips_comments() {
        assert_eq!(start_of("ab {if $a}{* c *}x", 17), 3);
        assert_eq!(start_of("ab {* c x", 8), 3);
    }

    #[test]
    fn start_skips_quoted_braces() {
        assert_eq!(start_of("ab {='{'}c", 9), 3);
    }

    #[test]
    fn start_quote_without_partner_is_plain() {
        assert_eq!(start_of("a {$x}\nit's", 11), 2);
    }

    #[test]
    fn start_anchors() {
        assert_eq!(start_of("x {{if $a}} y", 12), 2);
        assert_eq!(start_of("x {syntax off} ab", 16), 2);
        assert_eq!(start_of("a { b } c", 8), 0);
    }

    #[test]
    fn start_budget_exhaustion_is_conservative() {
        let mut budget = Budget::new(2, None, None);
        assert_eq!(expanded_start(FOREACH, 23, &mut budget), Ok(0));
    }

    #[test]
    fn end_follows_block_to_its_close() {
        assert_eq!(end_of(FOREACH, 5, 24), 34);
        assert_eq!(end_of("{if $a}{if $b}x{/if}y{/if}z", 0, 15), 26);
    }

    #[test]
    fn end_of_void_tag() {
        assert_eq!(end_of("{$x} abc", 0, 2), 4);
        assert_eq!(end_of("{$x} abc {$y}", 0, 6), 6);
    }

    #[test]
    fn end_from_double_anchor() {
        let text = "{syntax double}<p>{{$abc}}</p>";
        assert_eq!(end_of(text, 18, 24), 26);
    }

    #[test]
    fn end_of_unclosed_block_is_text_length() {
        assert_eq!(end_of("{if $a} text", 0, 8), 12);
    }

    #[test]
    fn end_skips_off_regions() {
        let text = "{syntax off}{if}{/syntax}x";
        assert_eq!(end_of(text, 0, 13), 25);
    }

    #[test]
    fn unknown_macros_do_not_nest() {
        assert_eq!(end_of("{icon a} x {$y}", 0, 3), 8);
    }

    #[test]
    fn scanner_respects_double_mode() {
        let text = "{syntax double}{if}{{if $a}}{{/if}}{/syntax}";
        let mut scanner = TagScanner::new(text, 0);
        let mut budget = Budget::unlimited();
        let mut names = Vec::new();
        while let Some(tag) = scanner.next_tag(&mut budget).unwrap() {
            names.push(format!("{}{}", if tag.closing { "/" } else { "" }, tag.name));
        }
        assert_eq!(names, vec!["syntax", "if", "/if", "/syntax"]);
        assert_eq!(scanner.modes().current(), SyntaxMode::Default);
    }

    #[test]
    fn end_covers_an_open_n_syntax_switch() {
        let text = r#"<div n:syntax="off">{if $a}x{/if}</div>"#;
        assert_eq!(end_of(text, 0, 19), text.len());
    }

    #[test]
    fn n_syntax_switch_closed_by_syntax_end() {
        let text = r#"<p n:syntax="double">{if}</p>{/syntax}{$a} tail"#;
        assert_eq!(end_of(text, 0, 10), text.find("{$a}").unwrap());
    }

    #[test]
    fn later_switches_do_not_extend() {
        let text = r#"{$a}<p n:syntax="double">x</p>{{$b}}"#;
        assert_eq!(end_of(text, 0, 4), 4);
    }

    #[test]
    fn scanner_applies_n_syntax() {
        let text = r#"<script n:syntax="off">{if}</script>{/syntax}{$x}"#;
        let mut scanner = TagScanner::new(text, 0);
        let mut budget = Budget::unlimited();
        let mut starts = Vec::new();
        while let Some(tag) = scanner.next_tag(&mut budget).unwrap() {
            starts.push(tag.span.start);
        }
        assert_eq!(starts, vec![text.find("{/syntax}").unwrap(), text.find("{$x}").unwrap()]);
        assert_eq!(scanner.last_switch(), Some(8));
    }

    #[test]
    fn cancelled_scan() {
        let cancel = crate::budget::CancelToken::new();
        cancel.cancel();
        let mut budget = Budget::new(100, None, Some(cancel));
        assert_eq!(expanded_start(FOREACH, 23, &mut budget), Err(ReparseError::Cancelled));
    }
}
