//! `{syntax X}` and `n:syntax="X"` with an unrecognized `X` silently fall
//! back to the default syntax. This rule reports them.

use latte_core::attribute_lexer::{attribute_value_text, SYNTAX_ATTRIBUTE};
use latte_core::catalogs::SYNTAX_MODE_NAMES;
use latte_core::{Span, TokenKind};

use crate::{Finding, LintContext, Rule};

pub struct SyntaxModeValue;

fn is_known_mode(value: &str) -> bool {
    SYNTAX_MODE_NAMES.iter().any(|name| name.eq_ignore_ascii_case(value))
}

fn finding(span: Span, value: &str) -> Finding {
    if value.is_empty() {
        Finding::new(span, "Syntax switch without a mode; the default syntax is used")
    } else {
        Finding::new(
            span,
            format!(
                "Unknown syntax mode \"{value}\" (expected one of {}); the default syntax is used",
                SYNTAX_MODE_NAMES.join(", ")
            ),
        )
    }
}

impl Rule for SyntaxModeValue {
    fn check(&self, cx: &LintContext<'_>, out: &mut Vec<Finding>) {
        for tag in cx.doc.tags() {
            let mode = tag.args.trim();
            if tag.name == "syntax" && !tag.closing && !is_known_mode(mode) {
                out.push(finding(tag.span, mode));
            }
        }

        // Attribute form: the name token, then the first value before the tag ends.
        let mut armed: Option<Span> = None;
        for token in &cx.doc.tokens {
            match token.kind {
                TokenKind::AttributeName | TokenKind::MarkupAttributeName => {
                    armed = (token.text(cx.text) == SYNTAX_ATTRIBUTE).then_some(token.span);
                }
                TokenKind::AttributeValue | TokenKind::MarkupAttributeValue => {
                    if let Some(name) = armed.take() {
                        let value = attribute_value_text(token.text(cx.text));
                        if !is_known_mode(value) {
                            out.push(finding(Span::new(name.start, token.span.end), value));
                        }
                    }
                }
                TokenKind::TagEnd | TokenKind::TagOpen | TokenKind::EndTagOpen => armed = None,
                _ => {}
            }
        }
    }
}
