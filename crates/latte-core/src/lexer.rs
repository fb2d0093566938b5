//! The layering driver.
//!
//! A [`TemplateLexer`] asks its host tokenizer for tokens and hands control
//! to a sub-tokenizer whenever the host produces that layer's enter token:
//!
//! | Layer                | Enter         | Runs over                   | Exit                 |
//! |----------------------|---------------|-----------------------------|----------------------|
//! | [`MacroTokenizer`]   | `MacroStart`  | text after the enter token  | `MacroEnd` (itself)  |
//! | [`AttributeTokenizer`] | `NAttribute` | the enter token's span      | end of that span     |
//!
//! The lexer owns the [`SyntaxModeStack`] and lends it to every tokenizer
//! through [`LexContext`].

use std::ops::Range;
use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;

use crate::attribute_lexer::{attribute_value_text, AttributeTokenizer, SYNTAX_ATTRIBUTE};
use crate::budget::{Budget, CancelToken, Interrupt};
use crate::config::{EngineConfig, Limits};
use crate::error::ParseFailure;
use crate::macro_lexer::MacroTokenizer;
use crate::markup::MarkupTokenizer;
use crate::names::ValidNames;
use crate::syntax_mode::SyntaxModeStack;
use crate::types::{Span, Token, TokenKind};

pub(crate) static RE_INLINE_SYNTAX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"n:syntax\s*=\s*['"]?(\w+)['"]?"#).unwrap());

/// State a tokenizer may read or change while producing one token.
pub struct LexContext<'a> {
    pub modes: &'a mut SyntaxModeStack,
    pub names: &'a ValidNames,
}

/// One tokenizer in the stack: the host or a layer.
pub trait Tokenize {
    /// Begin tokenizing `text[range]`. `modes` is the state at `range.start`.
    fn start(&mut self, text: Arc<str>, range: Range<usize>, modes: &SyntaxModeStack);

    /// The next token, or `None` once this tokenizer has nothing more to say.
    fn next_token(&mut self, ctx: &mut LexContext<'_>) -> Option<Token>;
}

/// A markup tokenizer that template layers are stacked on.
///
/// It must emit `MacroStart` for macro openings and `CommentStart` for Latte
/// comments. Emitting `NAttribute` is optional.
pub trait HostTokenizer: Tokenize + Send {
    /// Continue after a layer consumed text up to `offset`.
    fn resume_at(&mut self, offset: usize);

    /// Whether `n:` attributes arrive as separate tokens. Hosts that lump a
    /// whole tag into one token get their `n:syntax` attributes picked out
    /// of the token text instead.
    fn splits_attributes(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    Macro,
    Attribute { window_end: usize },
}

/// Host tokens whose text is never inspected for mode signals.
fn is_opaque(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::MacroContent
            | TokenKind::HtmlComment
            | TokenKind::CommentStart
            | TokenKind::CommentContent
            | TokenKind::CommentEnd
    )
}

pub struct TemplateLexer {
    host: Box<dyn HostTokenizer>,
    macros: MacroTokenizer,
    attributes: AttributeTokenizer,
    layer: Option<Layer>,
    /// Name token of the macro being read, once seen.
    macro_name: Option<Span>,
    modes: SyntaxModeStack,
    names: ValidNames,
    limits: Limits,
    cancel: Option<CancelToken>,
    budget: Budget,
    text: Arc<str>,
    pos: usize,
    end: usize,
    syntax_attribute_armed: bool,
    finished: bool,
}

impl TemplateLexer {
    pub fn new(config: &EngineConfig, names: ValidNames) -> Self {
        let host = MarkupTokenizer::new(config.attribute_tokenization);
        Self::with_host(Box::new(host), config, names)
    }

    pub fn with_host(host: Box<dyn HostTokenizer>, config: &EngineConfig, names: ValidNames) -> Self {
        let mut lexer = Self {
            host,
            macros: MacroTokenizer::new(),
            attributes: AttributeTokenizer::new(),
            layer: None,
            macro_name: None,
            modes: SyntaxModeStack::new(),
            names,
            limits: config.limits.clone(),
            cancel: None,
            budget: Budget::unlimited(),
            text: Arc::from(""),
            pos: 0,
            end: 0,
            syntax_attribute_armed: false,
            finished: true,
        };
        lexer.reset();
        lexer
    }

    /// Cancellation flag checked before every token from the next `start` on.
    pub fn set_cancel(&mut self, cancel: Option<CancelToken>) {
        self.cancel = cancel;
    }

    pub fn names(&self) -> &ValidNames {
        &self.names
    }

    pub fn set_names(&mut self, names: ValidNames) {
        self.names = names;
    }

    /// Mode state after the last produced token.
    pub fn modes(&self) -> &SyntaxModeStack {
        &self.modes
    }

    /// Offset where the next token starts.
    pub fn offset(&self) -> usize {
        self.pos
    }

    /// Tokenize `text[range]` starting from `modes`.
    pub fn start(&mut self, text: Arc<str>, range: Range<usize>, modes: SyntaxModeStack) {
        self.host.start(Arc::clone(&text), range.clone(), &modes);
        tracing::trace!(
            start = range.start,
            end = range.end,
            mode = ?modes.current(),
            "lexer started"
        );
        self.modes = modes;
        self.text = text;
        self.pos = range.start;
        self.end = range.end;
        self.layer = None;
        self.macro_name = None;
        self.syntax_attribute_armed = false;
        self.finished = false;
        self.budget = self.limits.parse_budget(self.cancel.clone());
    }

    /// Forget the previous document entirely.
    pub fn reset(&mut self) {
        self.start(Arc::from(""), 0..0, SyntaxModeStack::new());
    }

    pub fn next_token(&mut self) -> Result<Option<Token>, ParseFailure> {
        if self.finished {
            return Ok(None);
        }
        match self.budget.tick() {
            Ok(()) => {}
            Err(Interrupt::Cancelled) => {
                self.finished = true;
                return Err(ParseFailure::Cancelled);
            }
            Err(Interrupt::Exhausted) => {
                self.finished = true;
                tracing::debug!(
                    offset = self.pos,
                    steps = self.budget.steps(),
                    "token budget exhausted, rest of input is plain text"
                );
                if self.pos < self.end {
                    let rest = Token::new(TokenKind::Text, self.pos, self.end);
                    return Ok(Some(self.commit(rest)));
                }
                return Ok(None);
            }
        }

        loop {
            match self.layer {
                Some(Layer::Macro) => {
                    let mut ctx = LexContext {
                        modes: &mut self.modes,
                        names: &self.names,
                    };
                    match self.macros.next_token(&mut ctx) {
                        Some(token) => {
                            if token.kind == TokenKind::MacroName && self.macro_name.is_none() {
                                self.macro_name = Some(token.span);
                            }
                            if token.kind == TokenKind::MacroEnd {
                                self.layer = None;
                                self.host.resume_at(token.span.end);
                                self.apply_macro_signal(token.span.start);
                            }
                            return Ok(Some(self.commit(token)));
                        }
                        None => {
                            self.layer = None;
                            self.macro_name = None;
                            self.host.resume_at(self.macros.offset());
                        }
                    }
                }
                Some(Layer::Attribute { window_end }) => {
                    let mut ctx = LexContext {
                        modes: &mut self.modes,
                        names: &self.names,
                    };
                    if let Some(token) = self.attributes.next_token(&mut ctx) {
                        return Ok(Some(self.commit(token)));
                    }
                    let offset = self.attributes.offset();
                    if offset < window_end {
                        self.attributes
                            .start(Arc::clone(&self.text), offset..window_end, &self.modes);
                    } else {
                        self.layer = None;
                    }
                }
                None => {
                    let mut ctx = LexContext {
                        modes: &mut self.modes,
                        names: &self.names,
                    };
                    let Some(token) = self.host.next_token(&mut ctx) else {
                        self.finished = true;
                        return Ok(None);
                    };
                    if token.kind == TokenKind::NAttribute {
                        self.attributes.start(
                            Arc::clone(&self.text),
                            token.span.start..token.span.end,
                            &self.modes,
                        );
                        self.layer = Some(Layer::Attribute {
                            window_end: token.span.end,
                        });
                        continue;
                    }
                    self.observe_host_token(token);
                    return Ok(Some(self.commit(token)));
                }
            }
        }
    }

    pub fn tokenize_all(&mut self) -> Result<Vec<Token>, ParseFailure> {
        let mut tokens = Vec::new();
        while let Some(token) = self.next_token()? {
            tokens.push(token);
        }
        Ok(tokens)
    }

    fn commit(&mut self, token: Token) -> Token {
        debug_assert_eq!(token.span.start, self.pos, "{:?} does not continue the stream", token);
        self.pos = token.span.end;
        token
    }

    fn observe_host_token(&mut self, token: Token) {
        match token.kind {
            TokenKind::MacroStart => {
                self.macro_name = None;
                self.macros
                    .start(Arc::clone(&self.text), token.span.end..self.end, &self.modes);
                self.layer = Some(Layer::Macro);
            }
            TokenKind::MarkupAttributeName => {
                self.syntax_attribute_armed = token.text(&self.text) == SYNTAX_ATTRIBUTE;
            }
            TokenKind::MarkupAttributeValue if self.syntax_attribute_armed => {
                self.syntax_attribute_armed = false;
                let value = attribute_value_text(token.text(&self.text));
                self.modes.set_mode(value);
            }
            TokenKind::TagOpen | TokenKind::EndTagOpen | TokenKind::TagEnd => {
                self.syntax_attribute_armed = false;
            }
            kind if !self.host.splits_attributes() && !is_opaque(kind) => {
                let text = Arc::clone(&self.text);
                for caps in RE_INLINE_SYNTAX.captures_iter(token.text(&text)) {
                    self.modes.set_mode(&caps[1]);
                }
            }
            _ => {}
        }
    }

    /// `{syntax X}` and `{/syntax}` take effect once their `MacroEnd` is out.
    fn apply_macro_signal(&mut self, end_start: usize) {
        let Some(name) = self.macro_name.take() else {
            return;
        };
        match name.text(&self.text) {
            "syntax" => {
                let args = self.text[name.end..end_start].trim();
                let parameter = args.split_whitespace().next().unwrap_or("");
                self.modes.set_mode(parameter);
            }
            "/syntax" => self.modes.end_scope(),
            _ => {}
        }
    }
}

impl std::fmt::Debug for TemplateLexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateLexer")
            .field("pos", &self.pos)
            .field("end", &self.end)
            .field("modes", &self.modes)
            .field("layer", &self.layer)
            .finish()
    }
}

/// Tokenize a whole document.
pub fn tokenize(
    text: &str,
    config: &EngineConfig,
    names: &ValidNames,
) -> Result<Vec<Token>, ParseFailure> {
    let mut lexer = TemplateLexer::new(config, names.clone());
    lexer.start(Arc::from(text), 0..text.len(), SyntaxModeStack::new());
    lexer.tokenize_all()
}

/// Tokenize with the default configuration and built-in names only.
pub fn lex(text: &str) -> Vec<Token> {
    tokenize(text, &EngineConfig::default(), &ValidNames::default()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttributeTokenization;
    use crate::types::SyntaxMode;

    fn texts(text: &str, tokens: &[Token]) -> Vec<(TokenKind, String)> {
        tokens
            .iter()
            .map(|t| (t.kind, t.text(text).to_string()))
            .collect()
    }

    fn assert_total(text: &str, tokens: &[Token]) {
        let mut pos = 0;
        for token in tokens {
            assert_eq!(token.span.start, pos, "gap or overlap before {token:?}");
            assert!(token.span.end > token.span.start, "empty token {token:?}");
            pos = token.span.end;
        }
        assert_eq!(pos, text.len());
    }

    fn lexer_over(text: &str, config: &EngineConfig) -> TemplateLexer {
        let mut lexer = TemplateLexer::new(config, ValidNames::default());
        lexer.start(Arc::from(text), 0..text.len(), SyntaxModeStack::new());
        lexer
    }

    #[test]
    fn mixed_document_is_total() {
        let text = r#"<ul n:if="$items" class="list">
    {foreach $items as $item}<li>{$item->name|upper}</li>{/foreach}
</ul>{* done *}"#;
        let tokens = lex(text);
        assert_total(text, &tokens);
        assert!(tokens.iter().all(|t| !t.kind.is_error()));
        assert!(!tokens.iter().any(|t| t.kind == TokenKind::NAttribute));
    }

    #[test]
    fn macro_layer_produces_name_and_filters() {
        let text = "<p>{$x|upper}</p>";
        let tokens = lex(text);
        assert_eq!(
            texts(text, &tokens)[2..7].to_vec(),
            vec![
                (TokenKind::MacroStart, "{".to_string()),
                (TokenKind::MacroContent, "$x".to_string()),
                (TokenKind::FilterPipe, "|".to_string()),
                (TokenKind::FilterName, "upper".to_string()),
                (TokenKind::MacroEnd, "}".to_string()),
            ]
        );
    }

    #[test]
    fn attribute_layer_replaces_host_token() {
        let text = r#"<div n:foreach="$a as $b">"#;
        let tokens = lex(text);
        assert_eq!(
            texts(text, &tokens),
            vec![
                (TokenKind::TagOpen, "<div".to_string()),
                (TokenKind::Whitespace, " ".to_string()),
                (TokenKind::AttributeName, "n:foreach".to_string()),
                (TokenKind::AttributeStart, "=".to_string()),
                (TokenKind::AttributeValue, "\"$a as $b\"".to_string()),
                (TokenKind::TagEnd, ">".to_string()),
            ]
        );
    }

    #[test]
    fn double_mode_round_trip() {
        let text = "{syntax double}{a}{{if $x}}b{{/if}}{/syntax}{if $y}{/if}";
        let mut lexer = lexer_over(text, &EngineConfig::default());
        let mut seen_double = false;
        let mut tokens = Vec::new();
        while let Some(token) = lexer.next_token().unwrap() {
            if token.text(text) == "{a}" {
                seen_double = lexer.modes().current() == SyntaxMode::Double;
            }
            tokens.push(token);
        }
        assert_total(text, &tokens);
        assert!(seen_double, "{{a}} is plain text in double mode");
        let named: Vec<_> = texts(text, &tokens)
            .into_iter()
            .filter(|(k, _)| *k == TokenKind::MacroName)
            .map(|(_, t)| t)
            .collect();
        assert_eq!(named, vec!["syntax", "if", "/if", "/syntax", "if", "/if"]);
        assert_eq!(lexer.modes().current(), SyntaxMode::Default);
        assert_eq!(lexer.modes().depth(), 0);
    }

    #[test]
    fn nested_modes_restore_in_order() {
        let text = "{syntax double}{{syntax off}}{foo}{/syntax}X{/syntax}Y";
        let mut lexer = lexer_over(text, &EngineConfig::default());
        let mut mode_at_x = None;
        let mut mode_at_y = None;
        while let Some(token) = lexer.next_token().unwrap() {
            match token.text(text) {
                "X" => mode_at_x = Some(lexer.modes().current()),
                "Y" => mode_at_y = Some(lexer.modes().current()),
                _ => {}
            }
        }
        assert_eq!(mode_at_x, Some(SyntaxMode::Double));
        assert_eq!(mode_at_y, Some(SyntaxMode::Default));
    }

    #[test]
    fn off_mode_is_one_opaque_run() {
        let text = "{syntax off}{foo bar}{/syntax}";
        let tokens = lex(text);
        assert_total(text, &tokens);
        let after_off: Vec<_> = texts(text, &tokens).into_iter().skip(5).collect();
        assert_eq!(
            after_off,
            vec![
                (TokenKind::MacroContent, "{foo bar}".to_string()),
                (TokenKind::MacroStart, "{".to_string()),
                (TokenKind::MacroName, "/syntax".to_string()),
                (TokenKind::MacroEnd, "}".to_string()),
            ]
        );
    }

    #[test]
    fn unmatched_syntax_end_is_tolerated() {
        let text = "{/syntax}{/syntax}{if $a}";
        let mut lexer = lexer_over(text, &EngineConfig::default());
        let tokens = lexer.tokenize_all().unwrap();
        assert_total(text, &tokens);
        assert_eq!(lexer.modes().current(), SyntaxMode::Default);
    }

    #[test]
    fn n_syntax_attribute_layered() {
        let text = r#"<script n:syntax="double">var a = {b: 1}; {{$x}}</script>"#;
        let mut lexer = lexer_over(text, &EngineConfig::default());
        let tokens = lexer.tokenize_all().unwrap();
        assert_total(text, &tokens);
        assert_eq!(lexer.modes().current(), SyntaxMode::Double);
        assert_eq!(lexer.modes().depth(), 1, "exactly one push per attribute");
        assert_eq!(
            tokens.iter().filter(|t| t.kind == TokenKind::MacroStart).count(),
            1
        );
    }

    #[test]
    fn n_syntax_attribute_native() {
        let config = EngineConfig {
            attribute_tokenization: AttributeTokenization::Native,
            ..EngineConfig::default()
        };
        let text = r#"<div n:syntax="off">{foo}</div>"#;
        let mut lexer = lexer_over(text, &config);
        let tokens = lexer.tokenize_all().unwrap();
        assert_total(text, &tokens);
        assert_eq!(lexer.modes().current(), SyntaxMode::Off);
        assert_eq!(lexer.modes().depth(), 1);
    }

    #[test]
    fn exhausted_budget_ends_with_text() {
        let mut config = EngineConfig::default();
        config.limits.max_tokens = 3;
        let text = "{if $a}hello{/if} world";
        let mut lexer = lexer_over(text, &config);
        let tokens = lexer.tokenize_all().unwrap();
        assert_total(text, &tokens);
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[3].kind, TokenKind::Text);
        assert_eq!(tokens[3].span.end, text.len());
    }

    #[test]
    fn cancellation_is_an_error() {
        let cancel = CancelToken::new();
        let mut lexer = TemplateLexer::new(&EngineConfig::default(), ValidNames::default());
        lexer.set_cancel(Some(cancel.clone()));
        lexer.start(Arc::from("{if $a}{/if}"), 0..12, SyntaxModeStack::new());
        assert!(lexer.next_token().unwrap().is_some());
        cancel.cancel();
        assert_eq!(lexer.next_token(), Err(ParseFailure::Cancelled));
        assert_eq!(lexer.next_token(), Ok(None));
    }

    #[test]
    fn reset_forgets_modes() {
        let text = "{syntax off}";
        let mut lexer = lexer_over(text, &EngineConfig::default());
        lexer.tokenize_all().unwrap();
        assert_eq!(lexer.modes().current(), SyntaxMode::Off);
        lexer.reset();
        assert_eq!(lexer.modes().current(), SyntaxMode::Default);
        assert_eq!(lexer.next_token(), Ok(None));
    }

    #[test]
    fn restart_mid_document_with_explicit_modes() {
        let text = "{syntax double}{{if $a}}x{{/if}}";
        let mut lexer = TemplateLexer::new(&EngineConfig::default(), ValidNames::default());
        let mut modes = SyntaxModeStack::new();
        modes.set_mode("double");
        lexer.start(Arc::from(text), 15..text.len(), modes);
        let tokens = lexer.tokenize_all().unwrap();
        assert_eq!(tokens[0], Token::new(TokenKind::MacroStart, 15, 17));
        assert_eq!(tokens.last().map(|t| t.span.end), Some(text.len()));
    }
}
