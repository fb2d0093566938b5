use std::collections::HashMap;

use crate::budget::{Budget, Interrupt};
use crate::catalogs::{
    is_builtin_macro, AUTO_CLOSING_MACROS, ELSEIF_HOSTS, ELSE_HOSTS, INTERMEDIATE_MACROS,
    VOID_MACROS,
};
use crate::macro_lexer::split_macro_head;
use crate::names::ValidNames;
use crate::parser::{Document, Node};
use crate::types::*;

// ---------------------------------------------------------------------------
// Diagnostic codes
// ---------------------------------------------------------------------------

pub const E_INVALID_MACRO_NAME: &str = "LATTE-E001";
pub const E_UNCLOSED_MACRO: &str = "LATTE-E002";
pub const E_CROSSING_CLOSE: &str = "LATTE-E003";
pub const E_ELSE_OUTSIDE_IF: &str = "LATTE-E004";
pub const E_UNKNOWN_FILTER: &str = "LATTE-E005";
pub const E_INVALID_FILTER_SYNTAX: &str = "LATTE-E006";
pub const E_INVALID_ATTRIBUTE: &str = "LATTE-E007";
pub const E_UNCLOSED_ATTRIBUTE_QUOTES: &str = "LATTE-E008";
pub const E_UNTERMINATED_MACRO: &str = "LATTE-E009";
pub const E_CASE_OUTSIDE_SWITCH: &str = "LATTE-E010";
pub const W_UNMATCHED_CLOSE: &str = "LATTE-W001";
pub const W_AUTO_CLOSED: &str = "LATTE-W002";

// ---------------------------------------------------------------------------
// Macro occurrences
// ---------------------------------------------------------------------------

/// Build a [`MacroTag`] from the text between its delimiters.
pub fn macro_tag(body: &str, span: Span, terminated: bool) -> MacroTag {
    let head = split_macro_head(body);
    let self_closed = !head.closing
        && !head.name.is_empty()
        && body
            .trim_end()
            .strip_suffix('/')
            .is_some_and(|before| before.ends_with(char::is_whitespace));
    let mut args = head.rest.trim();
    if self_closed {
        args = args.strip_suffix('/').unwrap_or(args).trim_end();
    }
    MacroTag {
        name: head.name.to_string(),
        closing: head.closing,
        args: args.to_string(),
        self_closed,
        terminated,
        span,
    }
}

/// Every macro in a token stream, in document order.
pub fn collect_macros(text: &str, tokens: &[Token]) -> Vec<MacroTag> {
    let mut tags = Vec::new();
    let mut i = 0;
    while i < tokens.len() {
        let start = tokens[i];
        if start.kind != TokenKind::MacroStart {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < tokens.len() && tokens[j].kind.is_macro_part() {
            j += 1;
        }
        let terminated = tokens.get(j).is_some_and(|t| t.kind == TokenKind::MacroEnd);
        let (body_end, end) = if terminated {
            (tokens[j].span.start, tokens[j].span.end)
        } else {
            let last = tokens[j - 1].span.end;
            (last, last)
        };
        let body = &text[start.span.end..body_end];
        tags.push(macro_tag(body, Span::new(start.span.start, end), terminated));
        i = if terminated { j + 1 } else { j };
    }
    tags
}

// ---------------------------------------------------------------------------
// Nesting stack
// ---------------------------------------------------------------------------

/// Result of closing a tag against the stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    /// The innermost entry was closed.
    Matched(MacroInfo),
    /// A deeper entry was closed; `crossed` were still open above it, innermost first.
    Crossed {
        target: MacroInfo,
        crossed: Vec<MacroInfo>,
    },
    /// Nothing open by that name.
    Unmatched,
}

/// Open blocks of a forward walk.
#[derive(Debug, Clone, Default)]
pub struct NestingStack {
    entries: Vec<MacroInfo>,
}

impl NestingStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &str, open_offset: usize) {
        self.entries.push(MacroInfo {
            name: name.to_string(),
            open_offset,
        });
    }

    /// Close `name`; an empty name (`{/}`) closes the innermost entry.
    pub fn close(&mut self, name: &str) -> CloseOutcome {
        if name.is_empty() {
            return self
                .entries
                .pop()
                .map_or(CloseOutcome::Unmatched, CloseOutcome::Matched);
        }
        let Some(index) = self.entries.iter().rposition(|e| e.name == name) else {
            return CloseOutcome::Unmatched;
        };
        let mut crossed = self.entries.split_off(index + 1);
        crossed.reverse();
        let target = self.entries.remove(index);
        if crossed.is_empty() {
            CloseOutcome::Matched(target)
        } else {
            CloseOutcome::Crossed { target, crossed }
        }
    }

    pub fn top(&self) -> Option<&MacroInfo> {
        self.entries.last()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> &[MacroInfo] {
        &self.entries
    }

    /// Whatever is still open, innermost first.
    pub fn into_remaining(self) -> impl Iterator<Item = MacroInfo> {
        self.entries.into_iter().rev()
    }
}

// ---------------------------------------------------------------------------
// Pairing rules
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pairing {
    /// Stands alone.
    Void,
    /// Opens a block that a closing tag ends.
    Block,
    /// Lives inside an enclosing block (`else`, `case`).
    Intermediate,
    Closing,
}

/// How `tag` takes part in nesting. Names outside the built-in catalog pair
/// only when `closer_follows` says a matching closing tag exists later.
pub fn pairing(tag: &MacroTag, names: &ValidNames, closer_follows: bool) -> Pairing {
    let name = tag.name.as_str();
    if tag.closing {
        return Pairing::Closing;
    }
    if name.is_empty() || tag.self_closed {
        return Pairing::Void;
    }
    if name == "_" {
        return if tag.is_bare() {
            Pairing::Block
        } else {
            Pairing::Void
        };
    }
    if INTERMEDIATE_MACROS.contains(name) {
        return Pairing::Intermediate;
    }
    if VOID_MACROS.contains(name) {
        return Pairing::Void;
    }
    if is_builtin_macro(name, names.version()) || closer_follows {
        Pairing::Block
    } else {
        Pairing::Void
    }
}

/// Whether an intermediate tag may appear directly inside `host`.
pub fn accepts_intermediate(intermediate: &str, host: &str) -> bool {
    match intermediate {
        "else" => ELSE_HOSTS.contains(host),
        "elseif" | "elseifset" => ELSEIF_HOSTS.contains(host),
        "case" => host == "switch",
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Nesting walk
// ---------------------------------------------------------------------------

/// What one tag did to the nesting walk. Indices point into the tag list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkEvent {
    Open(usize),
    Void(usize),
    /// `host` is the enclosing opener, `None` if the tag is misplaced.
    Intermediate { tag: usize, host: Option<usize> },
    Close { tag: usize, opener: usize },
    /// Closed a deeper opener; `crossed` openers were still open, innermost first.
    CrossedClose {
        tag: usize,
        opener: usize,
        crossed: Vec<usize>,
    },
    UnmatchedClose(usize),
    /// Still open at end of input.
    Unclosed { opener: usize, auto_closed: bool },
}

/// Walks macro tags and reports how they pair up.
#[derive(Debug, Clone)]
pub struct NestingValidator<'a> {
    names: &'a ValidNames,
}

impl<'a> NestingValidator<'a> {
    pub fn new(names: &'a ValidNames) -> Self {
        Self { names }
    }

    pub fn walk(&self, tags: &[MacroTag], budget: &mut Budget) -> Result<Vec<WalkEvent>, Interrupt> {
        let index_of = |info: &MacroInfo| {
            tags.binary_search_by_key(&info.open_offset, |t| t.span.start)
                .unwrap_or_default()
        };

        let mut closers_ahead: HashMap<&str, usize> = HashMap::new();
        for tag in tags.iter().filter(|t| t.closing && !t.name.is_empty()) {
            *closers_ahead.entry(tag.name.as_str()).or_default() += 1;
        }

        let mut stack = NestingStack::new();
        let mut events = Vec::with_capacity(tags.len());
        for (i, tag) in tags.iter().enumerate() {
            budget.tick()?;
            if tag.closing {
                if let Some(count) = closers_ahead.get_mut(tag.name.as_str()) {
                    *count = count.saturating_sub(1);
                }
            }
            let closer_follows = closers_ahead.get(tag.name.as_str()).is_some_and(|n| *n > 0);
            match pairing(tag, self.names, closer_follows) {
                Pairing::Closing => events.push(match stack.close(&tag.name) {
                    CloseOutcome::Matched(info) => WalkEvent::Close {
                        tag: i,
                        opener: index_of(&info),
                    },
                    CloseOutcome::Crossed { target, crossed } => WalkEvent::CrossedClose {
                        tag: i,
                        opener: index_of(&target),
                        crossed: crossed.iter().map(index_of).collect(),
                    },
                    CloseOutcome::Unmatched => WalkEvent::UnmatchedClose(i),
                }),
                Pairing::Block => {
                    stack.push(&tag.name, tag.span.start);
                    events.push(WalkEvent::Open(i));
                }
                Pairing::Void => events.push(WalkEvent::Void(i)),
                Pairing::Intermediate => {
                    let host = stack
                        .top()
                        .filter(|top| accepts_intermediate(&tag.name, &top.name))
                        .map(index_of);
                    events.push(WalkEvent::Intermediate { tag: i, host });
                }
            }
        }
        for info in stack.into_remaining() {
            events.push(WalkEvent::Unclosed {
                opener: index_of(&info),
                auto_closed: AUTO_CLOSING_MACROS.contains(info.name.as_str()),
            });
        }
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

fn diagnostic(
    code: &str,
    severity: DiagnosticSeverity,
    span: Span,
    index: &LineIndex,
    message: String,
) -> Diagnostic {
    let (line, col) = index.line_col(span.start);
    Diagnostic {
        code: code.into(),
        severity,
        span,
        line,
        col,
        message,
    }
}

fn display_open(tag: &MacroTag) -> String {
    format!("{{{}}}", tag.name)
}

fn display_close(tag: &MacroTag) -> String {
    format!("{{/{}}}", tag.name)
}

/// Code and message for an intermediate tag with no suitable enclosing block.
pub fn misplaced_intermediate(tag: &MacroTag) -> (&'static str, String) {
    if tag.name == "case" {
        (
            E_CASE_OUTSIDE_SWITCH,
            "{case} must be inside a {switch} block".to_string(),
        )
    } else {
        (
            E_ELSE_OUTSIDE_IF,
            format!("{} must be inside an if block", display_open(tag)),
        )
    }
}

/// Diagnostics carried by error tokens.
fn token_diagnostics(text: &str, tokens: &[Token], index: &LineIndex) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    for token in tokens.iter().filter(|t| t.kind.is_error()) {
        let source = token.text(text);
        let (code, message) = match token.kind {
            TokenKind::ErrorInvalidMacroName => {
                (E_INVALID_MACRO_NAME, format!("Unknown macro \"{}\"", source.trim_start_matches('/')))
            }
            TokenKind::ErrorUnknownFilter => (E_UNKNOWN_FILTER, format!("Unknown filter \"{source}\"")),
            TokenKind::ErrorInvalidFilterSyntax => {
                (E_INVALID_FILTER_SYNTAX, format!("Invalid filter syntax \"{source}\""))
            }
            TokenKind::ErrorInvalidAttributeSyntax => {
                (E_INVALID_ATTRIBUTE, format!("Invalid attribute \"{source}\""))
            }
            TokenKind::ErrorUnclosedAttributeQuotes => (
                E_UNCLOSED_ATTRIBUTE_QUOTES,
                "Attribute value has no closing quote".to_string(),
            ),
            _ => continue,
        };
        out.push(diagnostic(code, DiagnosticSeverity::Error, token.span, index, message));
    }
    out
}

/// All diagnostics for one document: error tokens, unterminated macros and
/// the nesting walk. Auto-closed blocks are reported as `LATTE-W002`;
/// [`validate`] drops those unless strict.
pub fn collect_diagnostics(
    text: &str,
    tokens: &[Token],
    tags: &[MacroTag],
    events: &[WalkEvent],
) -> Vec<Diagnostic> {
    let index = LineIndex::new(text);
    let mut out = token_diagnostics(text, tokens, &index);

    for tag in tags.iter().filter(|t| !t.terminated) {
        out.push(diagnostic(
            E_UNTERMINATED_MACRO,
            DiagnosticSeverity::Error,
            tag.span,
            &index,
            format!(
                "Macro {{{}{} is missing its end delimiter",
                if tag.closing { "/" } else { "" },
                tag.name
            ),
        ));
    }

    for event in events {
        match event {
            WalkEvent::CrossedClose { tag, crossed, .. } => {
                for &open in crossed {
                    out.push(diagnostic(
                        E_CROSSING_CLOSE,
                        DiagnosticSeverity::Error,
                        tags[*tag].span,
                        &index,
                        format!(
                            "Unexpected {}, {} is still open",
                            display_close(&tags[*tag]),
                            display_open(&tags[open])
                        ),
                    ));
                }
            }
            WalkEvent::Intermediate { tag, host: None } => {
                let (code, message) = misplaced_intermediate(&tags[*tag]);
                out.push(diagnostic(code, DiagnosticSeverity::Error, tags[*tag].span, &index, message));
            }
            WalkEvent::UnmatchedClose(tag) => {
                let tag = &tags[*tag];
                let shown = if tag.name.is_empty() {
                    "{/}".to_string()
                } else {
                    display_close(tag)
                };
                out.push(diagnostic(
                    W_UNMATCHED_CLOSE,
                    DiagnosticSeverity::Warning,
                    tag.span,
                    &index,
                    format!("Closing tag {shown} has no opening tag"),
                ));
            }
            WalkEvent::Unclosed {
                opener,
                auto_closed,
            } => {
                let tag = &tags[*opener];
                let (code, severity, message) = if *auto_closed {
                    (
                        W_AUTO_CLOSED,
                        DiagnosticSeverity::Warning,
                        format!("{} is closed implicitly at end of file", display_open(tag)),
                    )
                } else {
                    (
                        E_UNCLOSED_MACRO,
                        DiagnosticSeverity::Error,
                        format!("Unclosed macro {}", display_open(tag)),
                    )
                };
                out.push(diagnostic(code, severity, tag.span, &index, message));
            }
            _ => {}
        }
    }
    out.sort_by_key(|d| (d.span.start, d.span.end));
    out
}

/// Split a document's diagnostics into errors and warnings.
pub fn validate(doc: &Document, options: &ValidateOptions) -> ValidateResult {
    let mut result = ValidateResult::default();
    for diagnostic in &doc.diagnostics {
        if diagnostic.code == W_AUTO_CLOSED && !options.strict {
            continue;
        }
        match diagnostic.severity {
            DiagnosticSeverity::Error => result.errors.push(diagnostic.clone()),
            DiagnosticSeverity::Warning => result.warnings.push(diagnostic.clone()),
        }
    }
    result
}

/// Deepest block nesting in a document tree (top-level blocks are depth 1).
pub fn max_depth(nodes: &[Node]) -> usize {
    nodes
        .iter()
        .map(|node| match node {
            Node::Pair(pair) => 1 + max_depth(&pair.children),
            _ => 0,
        })
        .max()
        .unwrap_or(0)
}
