use std::sync::Arc;

use serde::Serialize;

use crate::budget::{Budget, CancelToken, Interrupt};
use crate::config::EngineConfig;
use crate::error::ParseFailure;
use crate::lexer::TemplateLexer;
use crate::names::ValidNames;
use crate::syntax_mode::SyntaxModeStack;
use crate::types::*;
use crate::validator::{collect_diagnostics, collect_macros, misplaced_intermediate, NestingValidator, WalkEvent};

// ---------------------------------------------------------------------------
// Document tree
// ---------------------------------------------------------------------------

/// A parsed template: the token stream plus the macro tree built on top of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    pub tokens: Vec<Token>,
    pub nodes: Vec<Node>,
    pub diagnostics: Vec<Diagnostic>,
    /// Byte length of the source text.
    pub len: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Pair(PairNode),
    Tag(MacroTag),
    Error(ErrorNode),
}

/// An opening tag and everything up to its closing tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairNode {
    pub open: MacroTag,
    /// `None` when the block was never closed explicitly.
    pub close: Option<MacroTag>,
    pub children: Vec<Node>,
    /// Closed implicitly at end of file.
    pub auto_closed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorNode {
    pub span: Span,
    pub code: String,
    pub message: String,
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Pair(pair) => {
                let end = pair
                    .close
                    .as_ref()
                    .map(|c| c.span.end)
                    .or_else(|| pair.children.last().map(|c| c.span().end))
                    .unwrap_or(pair.open.span.end);
                Span::new(pair.open.span.start, end.max(pair.open.span.end))
            }
            Node::Tag(tag) => tag.span,
            Node::Error(error) => error.span,
        }
    }
}

impl Document {
    /// A document with no tokens, used when a parse had to be abandoned.
    pub fn empty(len: usize) -> Self {
        Self {
            len,
            ..Self::default()
        }
    }

    /// Visit every node depth-first with its block depth (top level is 0).
    pub fn walk<'a>(&'a self, visit: &mut impl FnMut(&'a Node, usize)) {
        fn go<'a>(nodes: &'a [Node], depth: usize, visit: &mut impl FnMut(&'a Node, usize)) {
            for node in nodes {
                visit(node, depth);
                if let Node::Pair(pair) = node {
                    go(&pair.children, depth + 1, visit);
                }
            }
        }
        go(&self.nodes, 0, visit);
    }

    /// Every macro tag in document order, closing tags included.
    pub fn tags(&self) -> Vec<&MacroTag> {
        let mut tags = Vec::new();
        self.walk(&mut |node, _| match node {
            Node::Pair(pair) => {
                tags.push(&pair.open);
                if let Some(close) = &pair.close {
                    tags.push(close);
                }
            }
            Node::Tag(tag) => tags.push(tag),
            Node::Error(_) => {}
        });
        tags.sort_by_key(|t| t.span.start);
        tags
    }
}

// ---------------------------------------------------------------------------
// Tree building
// ---------------------------------------------------------------------------

struct Frame {
    open: usize,
    children: Vec<Node>,
}

struct TreeBuilder<'a> {
    tags: &'a [MacroTag],
    root: Vec<Node>,
    frames: Vec<Frame>,
}

impl<'a> TreeBuilder<'a> {
    fn new(tags: &'a [MacroTag]) -> Self {
        Self {
            tags,
            root: Vec::new(),
            frames: Vec::new(),
        }
    }

    fn push(&mut self, node: Node) {
        match self.frames.last_mut() {
            Some(frame) => frame.children.push(node),
            None => self.root.push(node),
        }
    }

    fn pop(&mut self, close: Option<usize>, auto_closed: bool) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        let pair = PairNode {
            open: self.tags[frame.open].clone(),
            close: close.map(|i| self.tags[i].clone()),
            children: frame.children,
            auto_closed,
        };
        self.push(Node::Pair(pair));
    }

    fn apply(&mut self, event: &WalkEvent) {
        match event {
            WalkEvent::Open(i) => self.frames.push(Frame {
                open: *i,
                children: Vec::new(),
            }),
            WalkEvent::Void(i) | WalkEvent::UnmatchedClose(i) => {
                self.push(Node::Tag(self.tags[*i].clone()));
            }
            WalkEvent::Intermediate { tag, host: Some(_) } => {
                self.push(Node::Tag(self.tags[*tag].clone()));
            }
            WalkEvent::Intermediate { tag, host: None } => {
                let (code, message) = misplaced_intermediate(&self.tags[*tag]);
                self.push(Node::Error(ErrorNode {
                    span: self.tags[*tag].span,
                    code: code.into(),
                    message,
                }));
            }
            WalkEvent::Close { tag, .. } => self.pop(Some(*tag), false),
            WalkEvent::CrossedClose { tag, crossed, .. } => {
                for _ in crossed {
                    self.pop(None, false);
                }
                self.pop(Some(*tag), false);
            }
            WalkEvent::Unclosed { auto_closed, .. } => self.pop(None, *auto_closed),
        }
    }

    fn finish(self) -> Vec<Node> {
        debug_assert!(self.frames.is_empty(), "walk left {} frames open", self.frames.len());
        self.root
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

fn interrupted(interrupt: Interrupt, budget: &Budget) -> ParseFailure {
    match interrupt {
        Interrupt::Cancelled => ParseFailure::Cancelled,
        Interrupt::Exhausted => ParseFailure::BudgetExhausted {
            steps: budget.steps(),
        },
    }
}

/// Build a document from a complete token stream. The tokens must tile
/// `text` exactly.
pub fn parse_tokens(
    text: &str,
    tokens: Vec<Token>,
    names: &ValidNames,
    budget: &mut Budget,
) -> Result<Document, ParseFailure> {
    let mut expected = 0;
    for (i, token) in tokens.iter().enumerate() {
        if i % 4096 == 0 && budget.is_cancelled() {
            return Err(ParseFailure::Cancelled);
        }
        if token.span.start != expected {
            return Err(ParseFailure::BrokenTokenStream {
                offset: token.span.start,
                expected,
            });
        }
        expected = token.span.end;
    }
    if expected != text.len() {
        return Err(ParseFailure::Truncated {
            covered: expected,
            len: text.len(),
        });
    }

    let tags = collect_macros(text, &tokens);
    let events = NestingValidator::new(names)
        .walk(&tags, budget)
        .map_err(|interrupt| interrupted(interrupt, budget))?;

    let mut builder = TreeBuilder::new(&tags);
    for event in &events {
        builder.apply(event);
    }
    let nodes = builder.finish();
    let diagnostics = collect_diagnostics(text, &tokens, &tags, &events);

    Ok(Document {
        tokens,
        nodes,
        diagnostics,
        len: text.len(),
    })
}

/// Tokenize and parse `text` with an existing lexer.
pub fn parse_with(
    lexer: &mut TemplateLexer,
    text: &str,
    config: &EngineConfig,
    cancel: Option<CancelToken>,
) -> Result<Document, ParseFailure> {
    lexer.set_cancel(cancel.clone());
    lexer.start(Arc::from(text), 0..text.len(), SyntaxModeStack::new());
    let tokens = lexer.tokenize_all()?;
    let mut budget = config.limits.parse_budget(cancel);
    parse_tokens(text, tokens, lexer.names(), &mut budget)
}

/// Tokenize and parse `text`, failing on cancellation or an exhausted budget.
pub fn try_parse_document(
    text: &str,
    config: &EngineConfig,
    names: &ValidNames,
    cancel: Option<CancelToken>,
) -> Result<Document, ParseFailure> {
    let mut lexer = TemplateLexer::new(config, names.clone());
    parse_with(&mut lexer, text, config, cancel)
}

/// Tokenize and parse `text`. A failed parse yields an empty document.
pub fn parse_document(text: &str, config: &EngineConfig, names: &ValidNames) -> Document {
    match try_parse_document(text, config, names, None) {
        Ok(doc) => doc,
        Err(err) => {
            tracing::warn!(error = %err, len = text.len(), "parse abandoned, returning empty document");
            Document::empty(text.len())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;
    use crate::validator::{E_ELSE_OUTSIDE_IF, W_AUTO_CLOSED};
    use pretty_assertions::assert_eq;

    fn parse(text: &str) -> Document {
        parse_document(text, &EngineConfig::default(), &ValidNames::default())
    }

    fn shape(nodes: &[Node]) -> Vec<String> {
        nodes
            .iter()
            .map(|node| match node {
                Node::Pair(pair) => format!(
                    "{}[{}]{}",
                    pair.open.name,
                    shape(&pair.children).join(","),
                    if pair.close.is_some() { "" } else { "?" }
                ),
                Node::Tag(tag) if tag.closing => format!("/{}", tag.name),
                Node::Tag(tag) if tag.name.is_empty() => "print".to_string(),
                Node::Tag(tag) => tag.name.clone(),
                Node::Error(error) => format!("!{}", error.code),
            })
            .collect()
    }

    #[test]
    fn builds_nested_tree() {
        let doc = parse("<ul>{foreach $items as $i}<li>{$i}</li>{/foreach}</ul>{if $a}{var $b = 1}{else}x{/if}");
        assert_eq!(shape(&doc.nodes), vec!["foreach[print]", "if[var,else]"]);
        assert!(doc.diagnostics.is_empty());
        assert_eq!(doc.len, doc.tokens.last().unwrap().span.end);
    }

    #[test]
    fn misplaced_else_is_an_error_node() {
        let doc = parse("a{else}b");
        assert_eq!(shape(&doc.nodes), vec![format!("!{E_ELSE_OUTSIDE_IF}")]);
    }

    #[test]
    fn crossing_close_keeps_tree_consistent() {
        let doc = parse("{if $a}{foreach $b as $c}{/if}{/foreach}");
        assert_eq!(shape(&doc.nodes), vec!["if[foreach[]?]", "/foreach"]);
    }

    #[test]
    fn unclosed_blocks_at_end() {
        let doc = parse("{block content}{if $a}text");
        assert_eq!(shape(&doc.nodes), vec!["block[if[]?]?"]);
        let Node::Pair(block) = &doc.nodes[0] else {
            panic!("expected a pair");
        };
        assert!(block.auto_closed);
        assert_eq!(
            doc.diagnostics.iter().filter(|d| d.code == W_AUTO_CLOSED).count(),
            2
        );
    }

    #[test]
    fn walk_reports_depth() {
        let doc = parse("{if $a}{if $b}{$c}{/if}{/if}");
        let mut seen = Vec::new();
        doc.walk(&mut |node, depth| seen.push((node.span().start, depth)));
        assert_eq!(seen, vec![(0, 0), (7, 1), (14, 2)]);
        assert_eq!(doc.tags().len(), 5);
    }

    #[test]
    fn gap_in_token_stream_is_rejected() {
        let text = "ab{$x}";
        let mut tokens = lex(text);
        tokens.remove(1);
        let err = parse_tokens(text, tokens, &ValidNames::default(), &mut Budget::unlimited());
        assert!(matches!(err, Err(ParseFailure::BrokenTokenStream { .. })));
    }

    #[test]
    fn truncated_token_stream_is_rejected() {
        let text = "ab{$x}";
        let mut tokens = lex(text);
        tokens.pop();
        let err = parse_tokens(text, tokens, &ValidNames::default(), &mut Budget::unlimited());
        assert!(matches!(err, Err(ParseFailure::Truncated { len: 6, .. })));
    }

    #[test]
    fn cancelled_parse_falls_back_to_empty_document() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let config = EngineConfig::default();
        let result = try_parse_document("{if $a}{/if}", &config, &ValidNames::default(), Some(cancel));
        assert_eq!(result, Err(ParseFailure::Cancelled));
        assert_eq!(Document::empty(12).tokens.len(), 0);
    }

    #[test]
    fn exhausted_walk_budget() {
        let text = "{if $a}{/if}{if $b}{/if}";
        let tokens = lex(text);
        let mut budget = Budget::new(2, None, None);
        let err = parse_tokens(text, tokens, &ValidNames::default(), &mut budget);
        assert!(matches!(err, Err(ParseFailure::BudgetExhausted { .. })));
    }

    #[test]
    fn document_serializes_with_tagged_nodes() {
        let doc = parse("{if $a}x{/if}");
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["nodes"][0]["type"], "pair");
        assert_eq!(json["nodes"][0]["open"]["name"], "if");
    }
}
